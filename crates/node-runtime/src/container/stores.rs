//! # Store Container
//!
//! Holds the node's stores and the dispatcher that serves them, and
//! manages their lifecycle.
//!
//! ## Initialization Order
//!
//! ```text
//! 1. validate NodeConfig
//! 2. open one engine per StoreSpec
//! 3. build Store s{i+1} on engine i, start its sweeper
//! 4. register it in the Stores directory
//! 5. wrap the directory in a StoresServer
//! ```
//!
//! A failure at any step stops every store started so far.

use std::sync::Arc;

use node_stores::{Clock, Store, StoreDescriptor, StoreError, Stores, StoresServer, SystemClock};
use shared_types::{NodeDescriptor, StoreId};
use storage_engine::{new_engine, EngineError};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::container::config::{ConfigError, NodeConfig};

/// Errors raised while bringing the node's stores up.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open engine for store {store_id}: {source}")]
    Engine {
        store_id: StoreId,
        #[source]
        source: EngineError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The node's stores, wired to a dispatcher.
pub struct StoreContainer {
    pub config: NodeConfig,
    pub descriptor: Arc<NodeDescriptor>,
    pub stores: Arc<Stores>,
    pub server: Arc<StoresServer>,
    pub clock: Arc<dyn Clock>,
}

impl StoreContainer {
    /// Open every configured store on the system clock.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open every configured store, with reservation deadlines driven by
    /// `clock`. Must be called within a tokio runtime.
    #[instrument(skip_all, fields(node_id = %config.node_id))]
    pub fn with_clock(config: NodeConfig, clock: Arc<dyn Clock>) -> Result<Self, NodeError> {
        config.validate()?;

        let mut descriptor = NodeDescriptor::new(config.node_id, config.address.clone());
        descriptor.attrs = config.attrs.clone();
        descriptor.locality = config.locality.clone();
        let descriptor = Arc::new(descriptor);

        let stores = Arc::new(Stores::new());
        if let Err(e) = open_stores(&config, &stores, &clock) {
            error!(error = %e, "[node] store initialization failed, stopping opened stores");
            stop_all(&stores);
            return Err(e);
        }

        let server = Arc::new(StoresServer::new(descriptor.clone(), stores.clone()));
        info!(stores = stores.len(), "[node] stores ready");

        Ok(Self {
            config,
            descriptor,
            stores,
            server,
            clock,
        })
    }

    /// Capacity and identity of every store, in id order.
    pub fn store_descriptors(&self) -> Result<Vec<StoreDescriptor>, StoreError> {
        let mut descriptors = Vec::with_capacity(self.stores.len());
        self.stores.visit_stores(|store| {
            descriptors.push(store.descriptor()?);
            Ok::<(), StoreError>(())
        })?;
        Ok(descriptors)
    }

    /// Stop every store's background work.
    pub fn shutdown(&self) {
        stop_all(&self.stores);
        info!("[node] stores stopped");
    }
}

fn open_stores(config: &NodeConfig, stores: &Stores, clock: &Arc<dyn Clock>) -> Result<(), NodeError> {
    for (index, spec) in config.stores.iter().enumerate() {
        let store_id = StoreId(index as u32 + 1);
        let engine = new_engine(spec.engine_spec())
            .map_err(|source| NodeError::Engine { store_id, source })?;
        info!(
            %store_id,
            kind = %spec.kind,
            size_bytes = spec.size_bytes,
            attrs = %spec.attrs,
            "[node] engine opened"
        );

        let store = Store::new(store_id, config.node_id, engine, config.store.clone(), clock.clone())?;
        store.start()?;
        stores.add_store(store)?;
    }
    Ok(())
}

fn stop_all(stores: &Stores) {
    let _ = stores.visit_stores(|store: &Arc<Store>| {
        store.stop();
        Ok::<(), StoreError>(())
    });
}
