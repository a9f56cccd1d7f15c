//! # Replica
//!
//! The local copy of one range. The store core only needs three things
//! from it: its span, its frozen flag, and the checksum records produced
//! by consistency-check rounds.
//!
//! ## Checksum records
//!
//! The replication layer calls [`Replica::compute_checksum`] once the
//! consistency-check command has committed. The record is registered as
//! pending immediately and filled in from a blocking task. Readers wait on
//! a `watch` channel for the record to leave the pending state, bounded by
//! the caller's timeout.

use parking_lot::Mutex;
use sha2::{Digest, Sha512};
use shared_types::{ChecksumId, RangeDescriptor, RangeId, StoreId};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage_engine::Engine;
use tokio::sync::watch;

use crate::domain::{ChecksumResult, ComputeChecksum, RangeSnapshot, StoreError};
use crate::ports::Clock;

#[derive(Debug, Clone)]
enum ChecksumState {
    Pending,
    Ready(Arc<ChecksumResult>),
    Failed(String),
}

#[derive(Debug)]
struct ChecksumRecord {
    state: watch::Sender<ChecksumState>,
    started_at: Instant,
    completed_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct ReplicaState {
    frozen: bool,
    destroyed: bool,
}

/// One range replica hosted by a store.
#[derive(Debug)]
pub struct Replica {
    store_id: StoreId,
    desc: RangeDescriptor,
    engine: Arc<dyn Engine>,
    clock: Arc<dyn Clock>,
    state: Mutex<ReplicaState>,
    checksums: Mutex<HashMap<ChecksumId, ChecksumRecord>>,
}

impl Replica {
    pub fn new(
        store_id: StoreId,
        desc: RangeDescriptor,
        engine: Arc<dyn Engine>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store_id,
            desc,
            engine,
            clock,
            state: Mutex::new(ReplicaState::default()),
            checksums: Mutex::new(HashMap::new()),
        }
    }

    pub fn range_id(&self) -> RangeId {
        self.desc.range_id
    }

    pub fn store_id(&self) -> StoreId {
        self.store_id
    }

    pub fn descriptor(&self) -> &RangeDescriptor {
        &self.desc
    }

    // =========================================================================
    // Freeze
    // =========================================================================

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    /// Freeze the replica. Returns whether it was already frozen.
    pub fn freeze(&self) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(StoreError::ReplicaDestroyed(self.desc.range_id));
        }
        let was_frozen = state.frozen;
        state.frozen = true;
        Ok(was_frozen)
    }

    pub fn unfreeze(&self) {
        self.state.lock().frozen = false;
    }

    pub(crate) fn mark_destroyed(&self) {
        self.state.lock().destroyed = true;
    }

    // =========================================================================
    // Checksums
    // =========================================================================

    /// Start computing the checksum for `cmd.checksum_id` off the calling
    /// task. Returns false if a record for that id already exists.
    ///
    /// Must be called from within a tokio runtime.
    pub fn compute_checksum(self: &Arc<Self>, cmd: ComputeChecksum) -> bool {
        if !self.begin_checksum(cmd.checksum_id) {
            return false;
        }

        let worker = {
            let replica = Arc::clone(self);
            tokio::task::spawn_blocking(move || replica.checksum_span(cmd.snapshot))
        };
        let replica = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match worker.await {
                Ok(outcome) => outcome,
                Err(e) => Err(format!("checksum task failed: {}", e)),
            };
            replica.finish_checksum(cmd.checksum_id, outcome);
        });
        true
    }

    /// Register a pending record for `checksum_id`. Returns false if one
    /// already exists.
    pub fn begin_checksum(&self, checksum_id: ChecksumId) -> bool {
        let mut records = self.checksums.lock();
        if records.contains_key(&checksum_id) {
            return false;
        }
        let (state, _) = watch::channel(ChecksumState::Pending);
        records.insert(
            checksum_id,
            ChecksumRecord {
                state,
                started_at: self.clock.now(),
                completed_at: None,
            },
        );
        tracing::debug!(
            store_id = %self.store_id,
            range_id = %self.desc.range_id,
            %checksum_id,
            "[stores] checksum computation started"
        );
        true
    }

    /// Publish the outcome of a computation started with
    /// [`Replica::begin_checksum`]. Outcomes for unknown ids are dropped.
    pub fn finish_checksum(&self, checksum_id: ChecksumId, outcome: Result<ChecksumResult, String>) {
        let now = self.clock.now();
        let mut records = self.checksums.lock();
        let Some(record) = records.get_mut(&checksum_id) else {
            tracing::warn!(
                range_id = %self.desc.range_id,
                %checksum_id,
                "[stores] dropping checksum for unknown record"
            );
            return;
        };

        let state = match outcome {
            Ok(result) => ChecksumState::Ready(Arc::new(result)),
            Err(reason) => {
                tracing::warn!(
                    range_id = %self.desc.range_id,
                    %checksum_id,
                    %reason,
                    "[stores] checksum computation failed"
                );
                ChecksumState::Failed(reason)
            }
        };
        record.completed_at = Some(now);
        record.state.send_replace(state);
    }

    /// SHA-512 over every key/value pair of the span, optionally with a
    /// snapshot of the same pairs.
    fn checksum_span(&self, snapshot: bool) -> Result<ChecksumResult, String> {
        let mut hasher = Sha512::new();
        let mut entries = Vec::new();
        self.engine
            .iterate(&self.desc.start_key, &self.desc.end_key, &mut |key, value| {
                // Length prefixes keep ("ab","c") and ("a","bc") apart.
                hasher.update((key.len() as u64).to_be_bytes());
                hasher.update(key);
                hasher.update((value.len() as u64).to_be_bytes());
                hasher.update(value);
                if snapshot {
                    entries.push((key.to_vec(), value.to_vec()));
                }
                ControlFlow::Continue(())
            })
            .map_err(|e| e.to_string())?;

        Ok(ChecksumResult {
            checksum: hasher.finalize().to_vec(),
            snapshot: snapshot.then(|| RangeSnapshot {
                range_id: self.desc.range_id,
                start_key: self.desc.start_key.clone(),
                end_key: self.desc.end_key.clone(),
                entries,
            }),
        })
    }

    /// Fetch the result of round `checksum_id`.
    ///
    /// Unknown ids fail at once with `ChecksumNotFound`. A pending record
    /// is waited on for at most `wait`, then `ChecksumNotReady`.
    pub async fn get_checksum(
        &self,
        checksum_id: ChecksumId,
        wait: Duration,
    ) -> Result<Arc<ChecksumResult>, StoreError> {
        let range_id = self.desc.range_id;
        let subscribed = {
            let records = self.checksums.lock();
            records.get(&checksum_id).map(|record| record.state.subscribe())
        };
        let Some(mut rx) = subscribed else {
            return Err(StoreError::ChecksumNotFound {
                range_id,
                checksum_id,
            });
        };

        let settled = tokio::time::timeout(
            wait,
            rx.wait_for(|state| !matches!(state, ChecksumState::Pending)),
        )
        .await;

        let state = match settled {
            Ok(Ok(state)) => (*state).clone(),
            // The record was collected while we waited.
            Ok(Err(_)) => {
                return Err(StoreError::ChecksumNotFound {
                    range_id,
                    checksum_id,
                })
            }
            Err(_) => ChecksumState::Pending,
        };

        match state {
            ChecksumState::Ready(result) => Ok(result),
            ChecksumState::Failed(reason) => Err(StoreError::ChecksumComputationFailed {
                range_id,
                checksum_id,
                reason,
            }),
            ChecksumState::Pending => Err(StoreError::ChecksumNotReady {
                range_id,
                checksum_id,
            }),
        }
    }

    /// Drop finished records completed more than `retention` ago, and
    /// pending records started more than `retention` ago, which are
    /// treated as abandoned.
    pub fn gc_checksums(&self, now: Instant, retention: Duration) -> usize {
        let mut records = self.checksums.lock();
        let before = records.len();
        records.retain(|checksum_id, record| {
            let since = record.completed_at.unwrap_or(record.started_at);
            let keep = now.saturating_duration_since(since) < retention;
            if !keep && record.completed_at.is_none() {
                tracing::warn!(
                    range_id = %self.desc.range_id,
                    %checksum_id,
                    "[stores] abandoning checksum computation that never finished"
                );
            }
            keep
        });
        before - records.len()
    }

    /// Number of checksum records held, pending or finished.
    pub fn checksum_records(&self) -> usize {
        self.checksums.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ManualClock;
    use storage_engine::InMemEngine;

    const WAIT: Duration = Duration::from_secs(5);

    fn replica_with(start: &[u8], end: &[u8]) -> (Arc<Replica>, Arc<dyn Engine>, Arc<ManualClock>) {
        let engine: Arc<dyn Engine> = Arc::new(InMemEngine::with_size(1 << 20).unwrap());
        let clock = Arc::new(ManualClock::new());
        let replica = Arc::new(Replica::new(
            StoreId(1),
            RangeDescriptor::new(RangeId(7), start, end),
            engine.clone(),
            clock.clone(),
        ));
        (replica, engine, clock)
    }

    #[tokio::test]
    async fn test_checksum_covers_only_the_span() {
        let (replica, engine, _) = replica_with(b"b", b"d");
        engine.put(b"a", b"outside").unwrap();
        engine.put(b"b", b"1").unwrap();
        engine.put(b"c", b"2").unwrap();
        engine.put(b"d", b"outside").unwrap();

        let id = ChecksumId::new();
        assert!(replica.compute_checksum(ComputeChecksum::new(id)));
        let result = replica.get_checksum(id, WAIT).await.unwrap();

        assert_eq!(result.checksum.len(), 64);
        let keys: Vec<&[u8]> = result.snapshot.as_ref().unwrap().entries.iter().map(|(k, _)| k.as_slice()).collect();
        assert_eq!(keys, vec![b"b".as_slice(), b"c".as_slice()]);

        // Data outside the span does not affect the digest.
        engine.put(b"z", b"later").unwrap();
        let again = ChecksumId::new();
        replica.compute_checksum(ComputeChecksum::new(again));
        assert_eq!(replica.get_checksum(again, WAIT).await.unwrap().checksum, result.checksum);
    }

    #[tokio::test]
    async fn test_identical_data_gives_identical_checksums() {
        let (a, engine_a, _) = replica_with(b"a", b"z");
        let (b, engine_b, _) = replica_with(b"a", b"z");
        for engine in [&engine_a, &engine_b] {
            engine.put(b"k1", b"v1").unwrap();
            engine.put(b"k2", b"v2").unwrap();
        }

        let id = ChecksumId::new();
        a.compute_checksum(ComputeChecksum::new(id));
        b.compute_checksum(ComputeChecksum::new(id));
        assert_eq!(
            a.get_checksum(id, WAIT).await.unwrap().checksum,
            b.get_checksum(id, WAIT).await.unwrap().checksum
        );

        engine_b.put(b"k2", b"diverged").unwrap();
        let next = ChecksumId::new();
        a.compute_checksum(ComputeChecksum::new(next));
        b.compute_checksum(ComputeChecksum::new(next));
        assert_ne!(
            a.get_checksum(next, WAIT).await.unwrap().checksum,
            b.get_checksum(next, WAIT).await.unwrap().checksum
        );
    }

    #[tokio::test]
    async fn test_length_prefixing_separates_boundaries() {
        let (a, engine_a, _) = replica_with(b"a", b"z");
        let (b, engine_b, _) = replica_with(b"a", b"z");
        engine_a.put(b"ab", b"c").unwrap();
        engine_b.put(b"a", b"bc").unwrap();

        let id = ChecksumId::new();
        a.compute_checksum(ComputeChecksum::new(id));
        b.compute_checksum(ComputeChecksum::new(id));
        assert_ne!(
            a.get_checksum(id, WAIT).await.unwrap().checksum,
            b.get_checksum(id, WAIT).await.unwrap().checksum
        );
    }

    #[tokio::test]
    async fn test_unknown_id_fails_fast() {
        let (replica, _, _) = replica_with(b"a", b"z");
        let err = replica.get_checksum(ChecksumId::new(), WAIT).await.unwrap_err();
        assert!(matches!(err, StoreError::ChecksumNotFound { .. }));
    }

    #[tokio::test]
    async fn test_pending_times_out_as_not_ready() {
        let (replica, _, _) = replica_with(b"a", b"z");
        let id = ChecksumId::new();
        assert!(replica.begin_checksum(id));
        assert!(!replica.begin_checksum(id));

        let err = replica
            .get_checksum(id, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChecksumNotReady { .. }));
    }

    #[tokio::test]
    async fn test_waiter_wakes_when_result_lands() {
        let (replica, _, _) = replica_with(b"a", b"z");
        let id = ChecksumId::new();
        replica.begin_checksum(id);

        let waiter = {
            let replica = replica.clone();
            tokio::spawn(async move { replica.get_checksum(id, WAIT).await })
        };
        tokio::task::yield_now().await;
        replica.finish_checksum(
            id,
            Ok(ChecksumResult {
                checksum: vec![0xBB],
                snapshot: None,
            }),
        );

        let result = waiter.await.unwrap().unwrap();
        assert_eq!(result.checksum, vec![0xBB]);
    }

    #[tokio::test]
    async fn test_failed_computation_is_reported() {
        let (replica, _, _) = replica_with(b"a", b"z");
        let id = ChecksumId::new();
        replica.begin_checksum(id);
        replica.finish_checksum(id, Err("engine unavailable".into()));

        let err = replica.get_checksum(id, WAIT).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ChecksumComputationFailed { ref reason, .. } if reason == "engine unavailable"
        ));
    }

    #[tokio::test]
    async fn test_gc_keeps_recent_records() {
        let (replica, _, clock) = replica_with(b"a", b"z");
        let retention = Duration::from_secs(60);
        let pending = ChecksumId::new();
        replica.begin_checksum(pending);

        clock.advance(Duration::from_secs(30));
        let done = ChecksumId::new();
        replica.begin_checksum(done);
        replica.finish_checksum(done, Err("x".into()));
        assert_eq!(replica.gc_checksums(clock.now(), retention), 0);

        // The stuck pending record goes first; the finished one is kept
        // until its own retention runs out.
        clock.advance(Duration::from_secs(30));
        assert_eq!(replica.gc_checksums(clock.now(), retention), 1);
        assert_eq!(replica.checksum_records(), 1);
        let err = replica.get_checksum(pending, WAIT).await.unwrap_err();
        assert!(matches!(err, StoreError::ChecksumNotFound { .. }));

        clock.advance(Duration::from_secs(30));
        assert_eq!(replica.gc_checksums(clock.now(), retention), 1);
        assert_eq!(replica.checksum_records(), 0);
    }

    #[tokio::test]
    async fn test_checksum_only_round_keeps_no_data() {
        let (replica, engine, _) = replica_with(b"a", b"z");
        engine.put(b"k", b"v").unwrap();

        let with_data = ChecksumId::new();
        let without = ChecksumId::new();
        replica.compute_checksum(ComputeChecksum::new(with_data));
        replica.compute_checksum(ComputeChecksum::checksum_only(without));

        let full = replica.get_checksum(with_data, WAIT).await.unwrap();
        let bare = replica.get_checksum(without, WAIT).await.unwrap();
        assert_eq!(full.checksum, bare.checksum);
        assert_eq!(full.snapshot.as_ref().map(RangeSnapshot::len), Some(1));
        assert!(bare.snapshot.is_none());
    }

    #[test]
    fn test_freeze_and_destroy() {
        let (replica, _, _) = replica_with(b"a", b"z");
        assert!(!replica.is_frozen());
        assert_eq!(replica.freeze(), Ok(false));
        assert_eq!(replica.freeze(), Ok(true));
        replica.unfreeze();
        assert!(!replica.is_frozen());

        replica.mark_destroyed();
        assert_eq!(replica.freeze(), Err(StoreError::ReplicaDestroyed(RangeId(7))));
    }
}
