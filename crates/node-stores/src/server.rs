//! # Store-Addressed Dispatcher
//!
//! Every store-addressed operation passes the same admission steps:
//!
//! 1. The header's node id must equal this node's id, otherwise
//!    `MisroutedRequest` carrying both ids.
//! 2. The header's store id is resolved through the registry; lookup
//!    errors are returned unchanged.
//! 3. The operation runs against the store and its result is returned
//!    verbatim.
//!
//! The steps live in [`StoresServer::exec_store_command`]; each operation
//! only supplies the closure for step 3.

use async_trait::async_trait;
use node_telemetry::{CHECKSUM_MISMATCHES, MISROUTED_REQUESTS};
use shared_types::{NodeDescriptor, StoreRequest};
use std::future::Future;
use std::sync::Arc;

use crate::domain::{
    CollectChecksumRequest, CollectChecksumResponse, PollFrozenRequest, PollFrozenResponse,
    RangeSnapshot, ReservationRequest, ReservationResponse, StoreError,
};
use crate::ports::StoresApi;
use crate::registry::Stores;
use crate::store::Store;

/// Serves store-addressed requests for one node.
#[derive(Debug, Clone)]
pub struct StoresServer {
    descriptor: Arc<NodeDescriptor>,
    stores: Arc<Stores>,
}

impl StoresServer {
    pub fn new(descriptor: Arc<NodeDescriptor>, stores: Arc<Stores>) -> Self {
        Self { descriptor, stores }
    }

    pub fn descriptor(&self) -> &NodeDescriptor {
        &self.descriptor
    }

    pub fn stores(&self) -> &Arc<Stores> {
        &self.stores
    }

    /// Validate the request's header, resolve its store and run `command`
    /// with the store and the request.
    pub async fn exec_store_command<R, T, F, Fut>(&self, req: R, command: F) -> Result<T, StoreError>
    where
        R: StoreRequest,
        F: FnOnce(Arc<Store>, R) -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let header = *req.header();
        let local = self.descriptor.node_id;
        if header.node_id != local {
            MISROUTED_REQUESTS.inc();
            tracing::warn!(
                requested = %header.node_id,
                %local,
                store_id = %header.store_id,
                "[stores] misrouted request"
            );
            return Err(StoreError::MisroutedRequest {
                requested: header.node_id,
                local,
            });
        }

        let store = self.stores.get_store(header.store_id)?;
        command(store, req).await
    }
}

#[async_trait]
impl StoresApi for StoresServer {
    async fn poll_frozen(&self, req: PollFrozenRequest) -> Result<PollFrozenResponse, StoreError> {
        self.exec_store_command(req, |store, req| async move {
            Ok(store.frozen_status(req.collect_frozen))
        })
        .await
    }

    async fn reserve(&self, req: ReservationRequest) -> Result<ReservationResponse, StoreError> {
        self.exec_store_command(req, |store, req| async move { store.reserve(&req) })
            .await
    }

    async fn collect_checksum(
        &self,
        req: CollectChecksumRequest,
    ) -> Result<CollectChecksumResponse, StoreError> {
        self.exec_store_command(req, |store, req| async move {
            let replica = store.get_replica(req.range_id)?;
            let local = replica
                .get_checksum(req.checksum_id, store.config().checksum_wait_timeout)
                .await?;

            if local.checksum == req.checksum {
                return Ok(CollectChecksumResponse {
                    checksum: local.checksum.clone(),
                    snapshot: None,
                });
            }

            CHECKSUM_MISMATCHES.inc();
            let mismatch = StoreError::ConsistencyMismatch {
                range_id: req.range_id,
                expected: hex::encode(&req.checksum),
                actual: hex::encode(&local.checksum),
            };
            tracing::error!(
                store_id = %store.store_id(),
                range_id = %req.range_id,
                checksum_id = %req.checksum_id,
                snapshot_entries = local.snapshot.as_ref().map_or(0, RangeSnapshot::len),
                "[stores] {}",
                mismatch
            );
            Ok(CollectChecksumResponse {
                checksum: local.checksum.clone(),
                snapshot: local.snapshot.clone(),
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChecksumResult, RangeSnapshot, RejectReason, StoreConfig};
    use crate::ports::SystemClock;
    use parking_lot::Mutex;
    use shared_types::{ChecksumId, NodeId, RangeDescriptor, RangeId, StoreId, StoreRequestHeader};
    use std::io;
    use std::time::Duration;
    use storage_engine::{Engine, InMemEngine};

    const NODE: NodeId = NodeId(1);

    fn node_with(config: StoreConfig, store_ids: &[u32]) -> StoresServer {
        let stores = Arc::new(Stores::new());
        for id in store_ids {
            let engine: Arc<dyn Engine> = Arc::new(InMemEngine::with_size(1 << 20).unwrap());
            let store = Store::new(StoreId(*id), NODE, engine, config.clone(), Arc::new(SystemClock))
                .unwrap();
            stores.add_store(store).unwrap();
        }
        StoresServer::new(Arc::new(NodeDescriptor::new(NODE, "127.0.0.1:26257")), stores)
    }

    fn server() -> StoresServer {
        node_with(StoreConfig::for_testing(), &[1, 2])
    }

    fn header(node: u32, store: u32) -> StoreRequestHeader {
        StoreRequestHeader::new(NodeId(node), StoreId(store))
    }

    fn reservation(node: u32, store: u32, range_id: u64, size_bytes: u64) -> ReservationRequest {
        ReservationRequest {
            header: header(node, store),
            from_node_id: NodeId(9),
            from_store_id: StoreId(1),
            range_id: RangeId(range_id),
            size_bytes,
        }
    }

    fn ready_checksum(server: &StoresServer, checksum: &[u8]) -> ChecksumId {
        let store = server.stores().get_store(StoreId(1)).unwrap();
        let replica = store
            .add_replica(RangeDescriptor::new(RangeId(3), b"a", b"z"))
            .unwrap();
        let id = ChecksumId::new();
        replica.begin_checksum(id);
        replica.finish_checksum(
            id,
            Ok(ChecksumResult {
                checksum: checksum.to_vec(),
                snapshot: Some(RangeSnapshot {
                    range_id: RangeId(3),
                    start_key: b"a".to_vec(),
                    end_key: b"z".to_vec(),
                    entries: vec![(b"k".to_vec(), b"v".to_vec())],
                }),
            }),
        );
        id
    }

    /// Captures formatted log output for the duration of a test.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_misrouted_request_never_reaches_store() {
        let server = server();
        // Store 42 does not exist either; the node check comes first.
        for store in [1, 42] {
            let err = server.reserve(reservation(7, store, 1, 10)).await.unwrap_err();
            assert_eq!(
                err,
                StoreError::MisroutedRequest {
                    requested: NodeId(7),
                    local: NODE
                }
            );
        }
        let store = server.stores().get_store(StoreId(1)).unwrap();
        assert_eq!(store.bookie().outstanding(), 0);

        let err = server
            .poll_frozen(PollFrozenRequest {
                header: header(7, 1),
                collect_frozen: true,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MisroutedRequest { .. }));
    }

    #[tokio::test]
    async fn test_unknown_store_propagates_unchanged() {
        let server = server();
        let err = server.reserve(reservation(1, 42, 1, 10)).await.unwrap_err();
        assert_eq!(err, StoreError::StoreNotFound(StoreId(42)));

        server.stores().remove_store(StoreId(2)).unwrap();
        let err = server
            .poll_frozen(PollFrozenRequest {
                header: header(1, 2),
                collect_frozen: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::StoreRemoved(StoreId(2)));
    }

    #[tokio::test]
    async fn test_command_error_returned_verbatim() {
        let server = server();
        let err = server
            .exec_store_command(header(1, 1), |_, _| async {
                Err::<(), _>(StoreError::InvalidConfig("boom".into()))
            })
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::InvalidConfig("boom".into()));
    }

    #[tokio::test]
    async fn test_command_receives_request_and_addressed_store() {
        let server = server();
        let (store_id, range_id) = server
            .exec_store_command(reservation(1, 2, 9, 10), |store, req| async move {
                Ok((store.store_id(), req.range_id))
            })
            .await
            .unwrap();
        assert_eq!((store_id, range_id), (StoreId(2), RangeId(9)));
    }

    #[tokio::test]
    async fn test_reservations_are_per_store() {
        let config = StoreConfig {
            max_reserved_bytes: 100,
            ..StoreConfig::for_testing()
        };
        let server = node_with(config, &[1, 2]);
        assert!(server.reserve(reservation(1, 1, 1, 60)).await.unwrap().reserved);
        assert!(server.reserve(reservation(1, 2, 1, 60)).await.unwrap().reserved);

        let response = server.reserve(reservation(1, 1, 2, 60)).await.unwrap();
        assert!(matches!(
            response.reason,
            Some(RejectReason::InsufficientSpace { .. })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_concurrent_reservations_one_wins() {
        let config = StoreConfig {
            max_reserved_bytes: 100,
            ..StoreConfig::for_testing()
        };
        let server = Arc::new(node_with(config, &[1]));

        let a = {
            let server = server.clone();
            tokio::spawn(async move { server.reserve(reservation(1, 1, 10, 60)).await })
        };
        let b = {
            let server = server.clone();
            tokio::spawn(async move { server.reserve(reservation(1, 1, 11, 60)).await })
        };
        let outcomes = [a.await.unwrap().unwrap(), b.await.unwrap().unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.reserved).count(), 1);
        let rejected = outcomes.iter().find(|r| !r.reserved).unwrap();
        assert!(matches!(
            rejected.reason,
            Some(RejectReason::InsufficientSpace { .. })
        ));
        let store = server.stores().get_store(StoreId(1)).unwrap();
        assert!(store.bookie().reserved_bytes() <= 100);
    }

    #[tokio::test]
    async fn test_checksum_agreement_has_no_snapshot() {
        let server = server();
        let id = ready_checksum(&server, &[0xAA]);

        let response = server
            .collect_checksum(CollectChecksumRequest {
                header: header(1, 1),
                range_id: RangeId(3),
                checksum_id: id,
                checksum: vec![0xAA],
            })
            .await
            .unwrap();
        assert_eq!(response.checksum, vec![0xAA]);
        assert!(response.snapshot.is_none());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_attaches_snapshot_and_logs() {
        let server = server();
        let id = ready_checksum(&server, &[0xBB]);

        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let response = server
            .collect_checksum(CollectChecksumRequest {
                header: header(1, 1),
                range_id: RangeId(3),
                checksum_id: id,
                checksum: vec![0xAA],
            })
            .await
            .unwrap();

        assert_eq!(response.checksum, vec![0xBB]);
        let snapshot = response.snapshot.unwrap();
        assert_eq!(snapshot.range_id, RangeId(3));
        assert_eq!(snapshot.entries, vec![(b"k".to_vec(), b"v".to_vec())]);

        let output = logs.contents();
        assert!(output.contains("ERROR"));
        assert!(output.contains("consistency check failed on range r3"));
        assert!(output.contains("expected checksum aa, got bb"));
    }

    #[tokio::test]
    async fn test_mismatch_on_checksum_only_round_is_logged_without_data() {
        let server = server();
        let store = server.stores().get_store(StoreId(1)).unwrap();
        store.engine().put(b"k", b"v").unwrap();
        let replica = store
            .add_replica(RangeDescriptor::new(RangeId(4), b"a", b"z"))
            .unwrap();
        let id = ChecksumId::new();
        replica.compute_checksum(crate::domain::ComputeChecksum::checksum_only(id));

        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let response = server
            .collect_checksum(CollectChecksumRequest {
                header: header(1, 1),
                range_id: RangeId(4),
                checksum_id: id,
                checksum: vec![0xAA],
            })
            .await
            .unwrap();

        assert_eq!(response.checksum.len(), 64);
        assert!(!response.has_snapshot());
        assert!(logs.contents().contains("consistency check failed on range r4"));
    }

    #[tokio::test]
    async fn test_checksum_lookup_failures() {
        let config = StoreConfig {
            checksum_wait_timeout: Duration::from_millis(20),
            ..StoreConfig::for_testing()
        };
        let server = node_with(config, &[1]);
        let request = |range_id: u64, checksum_id: ChecksumId| CollectChecksumRequest {
            header: header(1, 1),
            range_id: RangeId(range_id),
            checksum_id,
            checksum: vec![0xAA],
        };

        let err = server
            .collect_checksum(request(3, ChecksumId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RangeNotFound { .. }));

        let store = server.stores().get_store(StoreId(1)).unwrap();
        let replica = store
            .add_replica(RangeDescriptor::new(RangeId(3), b"a", b"z"))
            .unwrap();

        let err = server
            .collect_checksum(request(3, ChecksumId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ChecksumNotFound { .. }));

        let pending = ChecksumId::new();
        replica.begin_checksum(pending);
        let err = server.collect_checksum(request(3, pending)).await.unwrap_err();
        assert!(matches!(err, StoreError::ChecksumNotReady { .. }));
    }

    #[tokio::test]
    async fn test_computed_checksums_agree_across_stores() {
        let server = server();
        let mut checksums = Vec::new();
        let id = ChecksumId::new();
        for store_id in [1, 2] {
            let store = server.stores().get_store(StoreId(store_id)).unwrap();
            store.engine().put(b"apple", b"red").unwrap();
            store.engine().put(b"banana", b"yellow").unwrap();
            let replica = store
                .add_replica(RangeDescriptor::new(RangeId(8), b"a", b"c"))
                .unwrap();
            replica.compute_checksum(crate::domain::ComputeChecksum::new(id));
            checksums.push(
                replica
                    .get_checksum(id, Duration::from_secs(5))
                    .await
                    .unwrap()
                    .checksum
                    .clone(),
            );
        }

        let response = server
            .collect_checksum(CollectChecksumRequest {
                header: header(1, 2),
                range_id: RangeId(8),
                checksum_id: id,
                checksum: checksums[0].clone(),
            })
            .await
            .unwrap();
        assert_eq!(response.checksum, checksums[1]);
        assert!(!response.has_snapshot());
    }

    #[tokio::test]
    async fn test_poll_frozen_through_dispatcher() {
        let server = server();
        let store = server.stores().get_store(StoreId(1)).unwrap();
        store
            .add_replica(RangeDescriptor::new(RangeId(1), b"a", b"b"))
            .unwrap();
        store
            .add_replica(RangeDescriptor::new(RangeId(2), b"b", b"c"))
            .unwrap();

        let poll = |collect_frozen| PollFrozenRequest {
            header: header(1, 1),
            collect_frozen,
        };
        assert_eq!(server.poll_frozen(poll(false)).await.unwrap().frozen_count(), 0);
        assert_eq!(server.poll_frozen(poll(true)).await.unwrap().frozen_count(), 2);
        assert_eq!(server.poll_frozen(poll(false)).await.unwrap().frozen_count(), 2);
    }
}
