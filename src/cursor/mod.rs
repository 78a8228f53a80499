//! Replay cursor persistence
//!
//! A replay cursor is the opaque position of the last acknowledged event.
//! [`ReplayCursorStore`] has two variants:
//!
//! - [`MemoryCursorStore`] keeps the cursor in process memory. It never
//!   fails and is lost on restart.
//! - [`PersistentCursorStore`] delegates to a named [`KeyValueStore`] in a
//!   [`StoreRegistry`] under a fixed key. Backend failures surface as
//!   [`Error::Storage`].
//!
//! [`SledStore`] is the bundled durable key/value backend.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{Error, Result};

pub mod sled_store;

pub use sled_store::SledStore;

/// Storage for the last acknowledged replay id of one subscription.
#[async_trait::async_trait]
pub trait ReplayCursorStore: Send + Sync + fmt::Debug {
    /// Returns the stored cursor, if any.
    async fn get(&self) -> Result<Option<Vec<u8>>>;

    /// Replaces the stored cursor.
    async fn set(&self, replay_id: &[u8]) -> Result<()>;
}

/// Cursor held in memory only.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    cursor: Mutex<Option<Vec<u8>>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `replay_id`.
    pub fn with_cursor(replay_id: Vec<u8>) -> Self {
        Self {
            cursor: Mutex::new(Some(replay_id)),
        }
    }
}

#[async_trait::async_trait]
impl ReplayCursorStore for MemoryCursorStore {
    async fn get(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.cursor.lock().await.clone())
    }

    async fn set(&self, replay_id: &[u8]) -> Result<()> {
        *self.cursor.lock().await = Some(replay_id.to_vec());
        Ok(())
    }
}

/// Generic key/value store used as a cursor backend.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    /// Returns the value under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`.
    async fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

/// Named key/value stores, selected by configuration.
#[derive(Debug, Default, Clone)]
pub struct StoreRegistry {
    stores: HashMap<String, Arc<dyn KeyValueStore>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `store` under `name`, replacing any previous store.
    pub fn register(&mut self, name: impl Into<String>, store: Arc<dyn KeyValueStore>) {
        self.stores.insert(name.into(), store);
    }

    /// Looks up a store by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if no store is registered under `name`.
    pub fn get(&self, name: &str) -> Result<Arc<dyn KeyValueStore>> {
        self.stores
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Storage(format!("no key/value store named {name}")))
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.stores.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Cursor kept in a named store under a fixed key.
#[derive(Debug, Clone)]
pub struct PersistentCursorStore {
    registry: Arc<StoreRegistry>,
    store_name: String,
    key: String,
}

impl PersistentCursorStore {
    pub fn new(
        registry: Arc<StoreRegistry>,
        store_name: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store_name: store_name.into(),
            key: key.into(),
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait::async_trait]
impl ReplayCursorStore for PersistentCursorStore {
    async fn get(&self) -> Result<Option<Vec<u8>>> {
        let store = self.registry.get(&self.store_name)?;
        let value = store.get(&self.key).await?;
        debug!(
            store = %self.store_name,
            key = %self.key,
            found = value.is_some(),
            "Loaded replay cursor"
        );
        Ok(value)
    }

    async fn set(&self, replay_id: &[u8]) -> Result<()> {
        let store = self.registry.get(&self.store_name)?;
        store.set(&self.key, replay_id).await
    }
}
