use crate::credentials::error::{CredentialError, CredentialResult};
use crate::credentials::store::{validate_value, CredentialStore, StoredCredential};
use async_trait::async_trait;
use chrono::Utc;
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Persistent credential store using Sled embedded database
#[derive(Clone)]
pub struct SledCredentialStore {
    db: Arc<Db>,
    credentials_tree: sled::Tree,
}

impl SledCredentialStore {
    /// Open (or create) the store at the specified directory
    pub fn new<P: AsRef<Path>>(path: P) -> CredentialResult<Self> {
        let path_str = path.as_ref();
        let db = sled::open(&path).map_err(|e| {
            CredentialError::Storage(format!("Failed to open credential cache: {}", e))
        })?;

        let credentials_tree = db.open_tree("credentials").map_err(|e| {
            CredentialError::Storage(format!("Failed to open credentials tree: {}", e))
        })?;

        tracing::debug!("Opened credential cache at {:?}", path_str);

        Ok(Self {
            db: Arc::new(db),
            credentials_tree,
        })
    }

    fn serialize_entry(entry: &StoredCredential) -> CredentialResult<Vec<u8>> {
        Ok(bincode::serialize(entry)?)
    }

    fn deserialize_entry(bytes: &[u8]) -> CredentialResult<StoredCredential> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> CredentialResult<()> {
        self.db.flush_async().await.map_err(|e| {
            CredentialError::Storage(format!("Failed to flush credential cache: {}", e))
        })?;
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for SledCredentialStore {
    async fn get(&self, key: &str) -> CredentialResult<String> {
        let Some(bytes) = self.credentials_tree.get(key.as_bytes())? else {
            return Err(CredentialError::Missing(key.to_string()));
        };

        let entry = Self::deserialize_entry(&bytes)?;
        if entry.is_expired(Utc::now()) {
            // Expired entries are dropped lazily on read
            self.credentials_tree.remove(key.as_bytes())?;
            return Err(CredentialError::Missing(key.to_string()));
        }

        Ok(entry.value)
    }

    async fn set(&self, key: &str, value: &str, expire: Option<Duration>) -> CredentialResult<()> {
        validate_value(key, value)?;

        let entry = StoredCredential::new(value, expire);
        self.credentials_tree
            .insert(key.as_bytes(), Self::serialize_entry(&entry)?)?;
        self.flush().await?;

        tracing::debug!(key = key, expires_at = ?entry.expires_at, "Credential stored");
        Ok(())
    }

    async fn remove(&self, key: &str) -> CredentialResult<bool> {
        let existed = self.credentials_tree.remove(key.as_bytes())?.is_some();
        self.flush().await?;
        Ok(existed)
    }

    async fn clear(&self) -> CredentialResult<()> {
        self.credentials_tree.clear()?;
        self.flush().await?;
        Ok(())
    }
}
