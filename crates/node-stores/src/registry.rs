//! # Store Registry
//!
//! Directory of the stores hosted by this node. Read on every request,
//! written only when a store is added or taken offline, hence a
//! reader-friendly `RwLock`.
//!
//! Removed ids are remembered so that a lookup racing a removal reports
//! `StoreRemoved` rather than looking like a store that never existed.

use parking_lot::RwLock;
use shared_types::StoreId;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::StoreError;
use crate::store::Store;

#[derive(Debug, Default)]
struct Directory {
    stores: BTreeMap<StoreId, Arc<Store>>,
    removed: BTreeSet<StoreId>,
}

/// StoreId -> Store directory.
#[derive(Debug, Default)]
pub struct Stores {
    directory: RwLock<Directory>,
}

impl Stores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fully opened store.
    pub fn add_store(&self, store: Arc<Store>) -> Result<(), StoreError> {
        let store_id = store.store_id();
        let mut directory = self.directory.write();
        if directory.stores.contains_key(&store_id) {
            return Err(StoreError::StoreExists(store_id));
        }
        directory.removed.remove(&store_id);
        directory.stores.insert(store_id, store);
        tracing::info!(%store_id, stores = directory.stores.len(), "[stores] store registered");
        Ok(())
    }

    /// Take a store offline. The store is stopped after it has left the
    /// directory.
    pub fn remove_store(&self, store_id: StoreId) -> Result<Arc<Store>, StoreError> {
        let store = {
            let mut directory = self.directory.write();
            let store = directory.stores.remove(&store_id).ok_or_else(|| {
                if directory.removed.contains(&store_id) {
                    StoreError::StoreRemoved(store_id)
                } else {
                    StoreError::StoreNotFound(store_id)
                }
            })?;
            directory.removed.insert(store_id);
            store
        };
        store.stop();
        tracing::info!(%store_id, "[stores] store removed");
        Ok(store)
    }

    pub fn get_store(&self, store_id: StoreId) -> Result<Arc<Store>, StoreError> {
        let directory = self.directory.read();
        match directory.stores.get(&store_id) {
            Some(store) => Ok(store.clone()),
            None if directory.removed.contains(&store_id) => Err(StoreError::StoreRemoved(store_id)),
            None => Err(StoreError::StoreNotFound(store_id)),
        }
    }

    /// Visit every registered store in ascending id order, stopping at the
    /// first error. The set visited is fixed when the call starts; the
    /// visitor runs without the registry lock held.
    pub fn visit_stores<E, F>(&self, mut visitor: F) -> Result<(), E>
    where
        F: FnMut(&Arc<Store>) -> Result<(), E>,
    {
        let stores: Vec<Arc<Store>> = self.directory.read().stores.values().cloned().collect();
        for store in &stores {
            visitor(store)?;
        }
        Ok(())
    }

    /// The store with the lowest id.
    pub fn first_store(&self) -> Option<Arc<Store>> {
        self.directory.read().stores.values().next().cloned()
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.directory.read().stores.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.directory.read().stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
