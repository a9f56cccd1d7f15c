//! # Node
//!
//! A running node: its stores, the dispatcher in front of them and the
//! background tasks that report on them. Callers reach the node's parts
//! through the [`NodeServices`] capability interface.

use std::sync::Arc;
use std::time::Duration;

use node_stores::{Clock, ManualClock, StoreError, Stores, StoresServer};
use shared_types::NodeDescriptor;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::container::{NodeConfig, NodeError, StoreContainer};

/// How often the node logs a capacity summary of its stores.
const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Read access to the parts of a running node.
pub trait NodeServices: Send + Sync {
    fn descriptor(&self) -> &NodeDescriptor;
    fn stores(&self) -> &Arc<Stores>;
    fn clock(&self) -> &Arc<dyn Clock>;
    fn stores_server(&self) -> &Arc<StoresServer>;
    fn config(&self) -> &NodeConfig;
}

/// A started node.
pub struct Node {
    container: StoreContainer,
    shutdown_tx: watch::Sender<bool>,
    status_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Validate `config`, open and start every store, and begin serving.
    pub async fn start(config: NodeConfig) -> Result<Self, NodeError> {
        Ok(Self::start_inner(StoreContainer::new(config)?, STATUS_INTERVAL))
    }

    /// Like [`Node::start`] with an injected clock.
    pub async fn start_with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        Ok(Self::start_inner(
            StoreContainer::with_clock(config, clock)?,
            STATUS_INTERVAL,
        ))
    }

    /// A single-store in-memory node driven by a [`ManualClock`], which is
    /// returned alongside so tests can move time forward.
    pub async fn start_for_testing() -> Result<(Self, Arc<ManualClock>), NodeError> {
        let clock = Arc::new(ManualClock::new());
        let node = Self::start_with_clock(NodeConfig::for_testing(), clock.clone()).await?;
        Ok((node, clock))
    }

    fn start_inner(container: StoreContainer, status_interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status_task = tokio::spawn(report_status(
            container.stores.clone(),
            status_interval,
            shutdown_rx,
        ));

        info!(
            node_id = %container.descriptor.node_id,
            address = %container.descriptor.address,
            stores = container.stores.len(),
            "[node] node started"
        );

        Self {
            container,
            shutdown_tx,
            status_task: parking_lot::Mutex::new(Some(status_task)),
        }
    }

    /// Capacity and identity of every store, in id order.
    pub fn store_descriptors(&self) -> Result<Vec<node_stores::StoreDescriptor>, StoreError> {
        self.container.store_descriptors()
    }

    /// A receiver that flips to `true` once shutdown begins.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// Graceful shutdown:
    ///
    /// 1. Signal shutdown to background tasks
    /// 2. Wait for them to exit
    /// 3. Stop every store
    pub async fn shutdown(&self) {
        info!("[node] initiating graceful shutdown");
        self.shutdown_tx.send_replace(true);

        let task = self.status_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!(error = %e, "[node] status task failed");
            }
        }

        self.container.shutdown();
        info!("[node] shutdown complete");
    }
}

impl NodeServices for Node {
    fn descriptor(&self) -> &NodeDescriptor {
        &self.container.descriptor
    }

    fn stores(&self) -> &Arc<Stores> {
        &self.container.stores
    }

    fn clock(&self) -> &Arc<dyn Clock> {
        &self.container.clock
    }

    fn stores_server(&self) -> &Arc<StoresServer> {
        &self.container.server
    }

    fn config(&self) -> &NodeConfig {
        &self.container.config
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        if let Some(task) = self.status_task.get_mut().take() {
            task.abort();
        }
    }
}

async fn report_status(stores: Arc<Stores>, period: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = stores.visit_stores(|store| {
                    match store.capacity() {
                        Ok(capacity) => info!(
                            store_id = %store.store_id(),
                            available = capacity.available,
                            reserved = capacity.reserved_bytes,
                            reservations = capacity.reservation_count,
                            replicas = capacity.replica_count,
                            "[node] store status"
                        ),
                        Err(e) => error!(store_id = %store.store_id(), error = %e, "[node] capacity unavailable"),
                    }
                    Ok::<(), StoreError>(())
                });
            }
            _ = shutdown.changed() => {
                debug!("[node] status reporter stopping");
                return;
            }
        }
    }
}
