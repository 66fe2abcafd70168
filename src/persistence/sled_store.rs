use sled::Db;
use tracing::info;

use crate::config::settings::KvSettings;

/// Errors produced by the key/value recorder.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The store is disabled in configuration. Callers are expected to treat
    /// persistence as a no-op in that case.
    #[error("kv is not enabled")]
    NotEnabled,
    /// The requested key is absent.
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] sled::Error),
}

/// Ordered byte-key/byte-value store backed by an embedded sled database.
#[derive(Debug, Clone)]
pub struct Recorder {
    db: Db,
}

impl Recorder {
    /// Opens the store at the configured path. Fails with
    /// [`RecorderError::NotEnabled`] when the store is disabled.
    pub fn open(cfg: &KvSettings) -> Result<Self, RecorderError> {
        if !cfg.enabled {
            return Err(RecorderError::NotEnabled);
        }

        let db = sled::open(&cfg.dsn)?;
        info!(dsn = %cfg.dsn, "kv store initialized");
        Ok(Self { db })
    }

    /// Returns every key currently in the store, in lexicographic order.
    pub fn list_keys(&self) -> Result<Vec<Vec<u8>>, RecorderError> {
        let mut keys = Vec::new();
        for entry in self.db.iter() {
            let (key, _) = entry?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>, RecorderError> {
        match self.db.get(key)? {
            Some(val) => Ok(val.to_vec()),
            None => Err(RecorderError::NotFound),
        }
    }

    // set and delete flush before returning: a pubsub reported as persisted
    // must be on disk even if the process dies right after.
    pub fn set(&self, key: &[u8], val: &[u8]) -> Result<(), RecorderError> {
        self.db.insert(key, val)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn delete(&self, key: &[u8]) -> Result<(), RecorderError> {
        self.db.remove(key)?;
        self.db.flush()?;
        Ok(())
    }

    pub fn close(&self) -> Result<(), RecorderError> {
        info!("kv store closing");
        self.db.flush()?;
        Ok(())
    }
}
