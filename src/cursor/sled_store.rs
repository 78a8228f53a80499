use std::fmt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use tracing::debug;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Durable key/value store backed by one sled tree.
///
/// Every [`SledStore`] opened from the same database under a different
/// name is an independent keyspace.
#[derive(Clone)]
pub struct SledStore {
    name: String,
    tree: sled::Tree,
}

impl SledStore {
    /// Opens (or creates) the tree `name` in `db`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the tree cannot be opened.
    pub fn open(db: &sled::Db, name: &str) -> Result<Self> {
        let tree = db
            .open_tree(name)
            .map_err(|e| Error::Storage(format!("failed to open store {name}: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            tree,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for SledStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SledStore")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SledStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let value = self
            .tree
            .get(key.as_bytes())
            .map_err(|e| Error::Storage(format!("read from {} failed: {e}", self.name)))?;
        Ok(value.map(|ivec| ivec.to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.tree
            .insert(key.as_bytes(), value)
            .map_err(|e| Error::Storage(format!("write to {} failed: {e}", self.name)))?;
        self.tree
            .flush_async()
            .await
            .map_err(|e| Error::Storage(format!("flush of {} failed: {e}", self.name)))?;
        debug!(store = %self.name, key = %key, "Persisted value");
        Ok(())
    }
}

/// Opens the sled database at `path`, or under the user's data directory
/// when `path` is `None`.
///
/// # Errors
///
/// Returns [`Error::Storage`] if no data directory can be determined or the
/// database cannot be opened.
pub fn open_database(path: Option<&Path>) -> Result<sled::Db> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_database_path()?,
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::Storage(format!("failed to create {}: {e}", parent.display()))
        })?;
    }

    debug!(path = %path.display(), "Opening cursor database");
    sled::open(&path)
        .map_err(|e| Error::Storage(format!("failed to open {}: {e}", path.display())))
}

/// `<data dir>/platform-events/cursors`
pub fn default_database_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "platform-events", "platform-events")
        .ok_or_else(|| Error::Storage("Could not determine data directory".to_string()))?;
    Ok(dirs.data_dir().join("cursors"))
}
