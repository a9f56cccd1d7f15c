//! # Local Store
//!
//! A store owns one engine, the replicas placed on it and its reservation
//! ledger. Replica lookups, ledger updates and checksum records each have
//! their own lock, so traffic for different ranges does not contend.

use node_telemetry::FROZEN_REPLICAS;
use parking_lot::{Mutex, RwLock};
use shared_types::{Attributes, NodeId, RangeDescriptor, RangeId, StoreId};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use storage_engine::Engine;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::bookie::Bookie;
use crate::domain::{
    FrozenStatus, PollFrozenResponse, ReservationRequest, ReservationResponse, StoreCapacity,
    StoreConfig, StoreDescriptor, StoreError,
};
use crate::ports::Clock;
use crate::replica::Replica;

/// What one sweeper pass released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepStats {
    pub expired_reservations: usize,
    pub collected_checksums: usize,
}

/// A node-local store.
#[derive(Debug)]
pub struct Store {
    store_id: StoreId,
    node_id: NodeId,
    engine: Arc<dyn Engine>,
    config: StoreConfig,
    clock: Arc<dyn Clock>,
    replicas: RwLock<BTreeMap<RangeId, Arc<Replica>>>,
    bookie: Bookie,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    pub fn new(
        store_id: StoreId,
        node_id: NodeId,
        engine: Arc<dyn Engine>,
        config: StoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Arc<Self>, StoreError> {
        config.validate()?;
        let (shutdown, _) = watch::channel(false);
        Ok(Arc::new(Self {
            store_id,
            node_id,
            bookie: Bookie::new(store_id, config.clone(), clock.clone()),
            engine,
            config,
            clock,
            replicas: RwLock::new(BTreeMap::new()),
            shutdown,
            sweeper: Mutex::new(None),
        }))
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn attrs(&self) -> &Attributes {
        self.engine.attrs()
    }

    pub fn bookie(&self) -> &Bookie {
        &self.bookie
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the background sweeper on the current tokio runtime.
    /// Starting a running store is a no-op.
    pub fn start(self: &Arc<Self>) -> Result<(), StoreError> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| StoreError::Runtime(e.to_string()))?;

        let mut sweeper = self.sweeper.lock();
        if sweeper.is_some() {
            return Ok(());
        }
        self.shutdown.send_replace(false);

        let store = Arc::downgrade(self);
        let shutdown = self.shutdown.subscribe();
        let interval = self.config.sweep_interval;
        *sweeper = Some(handle.spawn(run_sweeper(store, shutdown, interval)));

        tracing::info!(
            store_id = %self.store_id,
            engine = %self.engine.kind(),
            attrs = %self.engine.attrs(),
            "[stores] store started"
        );
        Ok(())
    }

    /// Stop the sweeper and release outstanding reservations.
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        let released = self.bookie.clear();
        tracing::info!(
            store_id = %self.store_id,
            released_reservations = released,
            "[stores] store stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Expire reservations and collect old checksum records.
    pub fn sweep(&self) -> SweepStats {
        let now = self.clock.now();
        let expired_reservations = self.bookie.expire(now);
        let collected_checksums = self
            .replica_snapshot()
            .iter()
            .map(|replica| replica.gc_checksums(now, self.config.checksum_retention))
            .sum();
        SweepStats {
            expired_reservations,
            collected_checksums,
        }
    }

    // =========================================================================
    // Replicas
    // =========================================================================

    /// Place a replica of `desc` on this store, consuming any reservation
    /// held for it.
    pub fn add_replica(&self, desc: RangeDescriptor) -> Result<Arc<Replica>, StoreError> {
        if !desc.is_valid() {
            return Err(StoreError::InvalidRangeDescriptor(desc.range_id));
        }
        let range_id = desc.range_id;

        let replica = {
            let mut replicas = self.replicas.write();
            if replicas.contains_key(&range_id) {
                return Err(StoreError::ReplicaExists {
                    store_id: self.store_id,
                    range_id,
                });
            }
            let replica = Arc::new(Replica::new(
                self.store_id,
                desc,
                self.engine.clone(),
                self.clock.clone(),
            ));
            replicas.insert(range_id, replica.clone());
            replica
        };

        let filled = self.bookie.fill(range_id);
        tracing::info!(
            store_id = %self.store_id,
            %range_id,
            filled_reservation = filled,
            "[stores] replica added"
        );
        Ok(replica)
    }

    /// Destroy the replica of `range_id` and drop it from the store.
    pub fn remove_replica(&self, range_id: RangeId) -> Result<Arc<Replica>, StoreError> {
        let replica = self
            .replicas
            .write()
            .remove(&range_id)
            .ok_or(StoreError::RangeNotFound {
                store_id: self.store_id,
                range_id,
            })?;
        replica.mark_destroyed();
        tracing::info!(store_id = %self.store_id, %range_id, "[stores] replica removed");
        Ok(replica)
    }

    pub fn get_replica(&self, range_id: RangeId) -> Result<Arc<Replica>, StoreError> {
        self.replicas
            .read()
            .get(&range_id)
            .cloned()
            .ok_or(StoreError::RangeNotFound {
                store_id: self.store_id,
                range_id,
            })
    }

    pub fn replica_count(&self) -> usize {
        self.replicas.read().len()
    }

    /// Replicas in range id order, copied out of the map.
    fn replica_snapshot(&self) -> Vec<Arc<Replica>> {
        self.replicas.read().values().cloned().collect()
    }

    // =========================================================================
    // Protocols
    // =========================================================================

    /// Admit or reject a reservation against the engine's current free
    /// space.
    pub fn reserve(&self, req: &ReservationRequest) -> Result<ReservationResponse, StoreError> {
        let capacity = self.engine.capacity()?;
        Ok(self.bookie.reserve(req, capacity))
    }

    /// Report each replica's frozen flag. With `collect_frozen` every
    /// unfrozen replica is frozen first; a replica that cannot be frozen is
    /// reported with an error and the poll continues.
    pub fn frozen_status(&self, collect_frozen: bool) -> PollFrozenResponse {
        let results: Vec<FrozenStatus> = self
            .replica_snapshot()
            .iter()
            .map(|replica| {
                let range_id = replica.range_id();
                if collect_frozen && !replica.is_frozen() {
                    if let Err(e) = replica.freeze() {
                        tracing::warn!(
                            store_id = %self.store_id,
                            %range_id,
                            error = %e,
                            "[stores] failed to freeze replica"
                        );
                        return FrozenStatus {
                            range_id,
                            frozen: false,
                            error: Some(e.to_string()),
                        };
                    }
                }
                FrozenStatus {
                    range_id,
                    frozen: replica.is_frozen(),
                    error: None,
                }
            })
            .collect();

        let response = PollFrozenResponse { results };
        FROZEN_REPLICAS
            .with_label_values(&[&self.store_id.to_string()])
            .set(response.frozen_count() as f64);
        tracing::debug!(
            store_id = %self.store_id,
            collect_frozen,
            replicas = response.results.len(),
            frozen = response.frozen_count(),
            failed = response.failed_count(),
            "[stores] freeze poll"
        );
        response
    }

    // =========================================================================
    // Capacity
    // =========================================================================

    pub fn capacity(&self) -> Result<StoreCapacity, StoreError> {
        let engine = self.engine.capacity()?;
        Ok(StoreCapacity::new(
            engine,
            self.bookie.reserved_bytes(),
            self.bookie.outstanding(),
            self.replica_count(),
        ))
    }

    pub fn descriptor(&self) -> Result<StoreDescriptor, StoreError> {
        Ok(StoreDescriptor {
            store_id: self.store_id,
            node_id: self.node_id,
            attrs: self.engine.attrs().clone(),
            capacity: self.capacity()?,
        })
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

async fn run_sweeper(
    store: Weak<Store>,
    mut shutdown: watch::Receiver<bool>,
    every: std::time::Duration,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(store) = store.upgrade() else { break };
                let stats = store.sweep();
                if stats != SweepStats::default() {
                    tracing::debug!(
                        store_id = %store.store_id(),
                        expired_reservations = stats.expired_reservations,
                        collected_checksums = stats.collected_checksums,
                        "[stores] sweep"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RejectReason;
    use crate::ports::{ManualClock, SystemClock};
    use shared_types::{ChecksumId, StoreRequestHeader};
    use std::time::Duration;
    use storage_engine::{InMemEngine, MIN_ENGINE_SIZE_BYTES};

    fn store_with(config: StoreConfig, clock: Arc<dyn Clock>) -> Arc<Store> {
        store_numbered(StoreId(1), config, clock)
    }

    fn store_numbered(store_id: StoreId, config: StoreConfig, clock: Arc<dyn Clock>) -> Arc<Store> {
        let engine: Arc<dyn Engine> = Arc::new(InMemEngine::with_size(1 << 20).unwrap());
        Store::new(store_id, NodeId(1), engine, config, clock).unwrap()
    }

    fn store() -> Arc<Store> {
        store_with(StoreConfig::for_testing(), Arc::new(SystemClock))
    }

    fn range(id: u64, start: &[u8], end: &[u8]) -> RangeDescriptor {
        RangeDescriptor::new(RangeId(id), start, end)
    }

    fn reservation(range_id: u64, size_bytes: u64) -> ReservationRequest {
        ReservationRequest {
            header: StoreRequestHeader::new(NodeId(1), StoreId(1)),
            from_node_id: NodeId(2),
            from_store_id: StoreId(1),
            range_id: RangeId(range_id),
            size_bytes,
        }
    }

    #[test]
    fn test_invalid_config_rejected() {
        let engine: Arc<dyn Engine> = Arc::new(InMemEngine::with_size(1 << 20).unwrap());
        let config = StoreConfig {
            max_reservations: 0,
            ..StoreConfig::for_testing()
        };
        let result = Store::new(StoreId(1), NodeId(1), engine, config, Arc::new(SystemClock));
        assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
    }

    #[test]
    fn test_add_get_remove_replica() {
        let store = store();
        let replica = store.add_replica(range(1, b"a", b"m")).unwrap();
        assert!(Arc::ptr_eq(&replica, &store.get_replica(RangeId(1)).unwrap()));

        let err = store.add_replica(range(1, b"a", b"m")).unwrap_err();
        assert!(matches!(err, StoreError::ReplicaExists { .. }));

        let removed = store.remove_replica(RangeId(1)).unwrap();
        assert!(removed.is_destroyed());
        assert_eq!(
            store.get_replica(RangeId(1)).unwrap_err(),
            StoreError::RangeNotFound {
                store_id: StoreId(1),
                range_id: RangeId(1)
            }
        );
        assert!(store.remove_replica(RangeId(1)).is_err());
    }

    #[test]
    fn test_empty_span_rejected() {
        let store = store();
        let err = store.add_replica(range(1, b"m", b"a")).unwrap_err();
        assert_eq!(err, StoreError::InvalidRangeDescriptor(RangeId(1)));
    }

    #[test]
    fn test_replica_arrival_fills_reservation() {
        let store = store();
        assert!(store.reserve(&reservation(5, 1000)).unwrap().reserved);
        assert_eq!(store.capacity().unwrap().reserved_bytes, 1000);

        store.add_replica(range(5, b"a", b"b")).unwrap();
        let cap = store.capacity().unwrap();
        assert_eq!(cap.reserved_bytes, 0);
        assert_eq!(cap.reservation_count, 0);
        assert_eq!(cap.replica_count, 1);
    }

    #[test]
    fn test_nearly_full_engine_is_overloaded() {
        let engine: Arc<dyn Engine> =
            Arc::new(InMemEngine::with_size(MIN_ENGINE_SIZE_BYTES).unwrap());
        // Leaves under 5% of the ceiling free.
        let fill = vec![0u8; (MIN_ENGINE_SIZE_BYTES as usize * 96) / 100];
        engine.put(b"fill", &fill).unwrap();
        let store = Store::new(
            StoreId(1),
            NodeId(1),
            engine,
            StoreConfig::for_testing(),
            Arc::new(SystemClock),
        )
        .unwrap();

        let response = store.reserve(&reservation(1, 1)).unwrap();
        assert!(matches!(
            response.reason,
            Some(RejectReason::StoreOverloaded { .. })
        ));
    }

    #[test]
    fn test_freeze_poll_reports_partial_failure() {
        let store = store();
        store.add_replica(range(1, b"a", b"c")).unwrap();
        let broken = store.add_replica(range(2, b"c", b"e")).unwrap();
        store.add_replica(range(3, b"e", b"g")).unwrap();

        let status = store.frozen_status(false);
        assert_eq!(status.results.len(), 3);
        assert_eq!(status.frozen_count(), 0);

        broken.mark_destroyed();
        let status = store.frozen_status(true);
        let ids: Vec<RangeId> = status.results.iter().map(|s| s.range_id).collect();
        assert_eq!(ids, vec![RangeId(1), RangeId(2), RangeId(3)]);
        assert_eq!(status.frozen_count(), 2);
        assert_eq!(status.failed_count(), 1);
        let failed = status.status(RangeId(2)).unwrap();
        assert!(!failed.frozen);
        assert!(failed.error.as_deref().unwrap_or_default().contains("destroyed"));

        // Collect-only polls do not change state.
        store.get_replica(RangeId(1)).unwrap().unfreeze();
        let status = store.frozen_status(false);
        assert_eq!(status.frozen_count(), 1);
        assert_eq!(status.failed_count(), 0);
    }

    #[test]
    fn test_sweep_expires_reservations_and_checksums() {
        let clock = Arc::new(ManualClock::new());
        let store = store_with(StoreConfig::for_testing(), clock.clone());
        let replica = store.add_replica(range(9, b"a", b"z")).unwrap();
        let id = ChecksumId::new();
        replica.begin_checksum(id);
        replica.finish_checksum(id, Err("x".into()));
        assert!(store.reserve(&reservation(1, 10)).unwrap().reserved);

        assert_eq!(store.sweep(), SweepStats::default());

        clock.advance(store.config().checksum_retention);
        let stats = store.sweep();
        assert_eq!(stats.expired_reservations, 1);
        assert_eq!(stats.collected_checksums, 1);
        assert_eq!(store.bookie().outstanding(), 0);
    }

    #[test]
    fn test_start_outside_runtime_is_an_error() {
        let store = store();
        assert!(matches!(store.start(), Err(StoreError::Runtime(_))));
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn test_background_sweeper_expires_reservations() {
        let config = StoreConfig {
            reservation_ttl: Duration::from_millis(20),
            sweep_interval: Duration::from_millis(10),
            ..StoreConfig::for_testing()
        };
        let store = store_with(config, Arc::new(SystemClock));
        store.start().unwrap();
        assert!(store.is_running());
        assert!(store.reserve(&reservation(1, 10)).unwrap().reserved);

        tokio::time::timeout(Duration::from_secs(5), async {
            while store.bookie().outstanding() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        store.stop();
        assert!(!store.is_running());
    }

    #[tokio::test]
    async fn test_stop_releases_reservations() {
        let store = store();
        store.start().unwrap();
        store.reserve(&reservation(1, 10)).unwrap();
        store.stop();
        assert_eq!(store.bookie().reserved_bytes(), 0);
    }

    #[test]
    fn test_descriptor_reports_capacity() {
        let store = store();
        store.engine().put(b"k", b"vv").unwrap();
        store.add_replica(range(1, b"a", b"z")).unwrap();

        let desc = store.descriptor().unwrap();
        assert_eq!(desc.store_id, StoreId(1));
        assert_eq!(desc.node_id, NodeId(1));
        assert!(desc.attrs.contains("mem"));
        assert_eq!(desc.capacity.used, 3);
        assert_eq!(desc.capacity.capacity, 1 << 20);
        assert_eq!(desc.capacity.replica_count, 1);
    }

    #[test]
    fn test_stop_releases_reservations_without_sweeper() {
        let store = store();
        assert!(!store.is_running());
        assert!(store.reserve(&reservation(1, 1000)).unwrap().reserved);

        store.stop();
        assert_eq!(store.bookie().outstanding(), 0);
        assert_eq!(store.capacity().unwrap().reserved_bytes, 0);
    }

    #[test]
    fn test_frozen_gauge_is_per_store() {
        let first = store_numbered(StoreId(801), StoreConfig::for_testing(), Arc::new(SystemClock));
        let second = store_numbered(StoreId(802), StoreConfig::for_testing(), Arc::new(SystemClock));
        first.add_replica(range(1, b"a", b"c")).unwrap();
        first.add_replica(range(2, b"c", b"e")).unwrap();
        second.add_replica(range(3, b"a", b"c")).unwrap();

        first.frozen_status(true);
        second.frozen_status(false);

        assert_eq!(FROZEN_REPLICAS.with_label_values(&["s801"]).get(), 2.0);
        assert_eq!(FROZEN_REPLICAS.with_label_values(&["s802"]).get(), 0.0);
    }
}
