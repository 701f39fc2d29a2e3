//! Credential store abstraction and the broker credentials read from it

use crate::credentials::error::{CredentialError, CredentialResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub const RABBIT_HOST: &str = "RABBIT_HOST";
pub const RABBIT_PORT: &str = "RABBIT_PORT";
pub const RABBIT_USER: &str = "RABBIT_USER";
pub const RABBIT_PASSWORD: &str = "RABBIT_PASSWORD";

/// Keys the publisher needs, in prompt order
pub const RABBIT_CREDENTIAL_KEYS: [&str; 4] = [RABBIT_HOST, RABBIT_PORT, RABBIT_USER, RABBIT_PASSWORD];

/// Key-value store for operator supplied secrets
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Get a value, failing with `Missing` when absent or expired
    async fn get(&self, key: &str) -> CredentialResult<String>;

    /// Set a value, optionally expiring after `expire`
    async fn set(&self, key: &str, value: &str, expire: Option<Duration>) -> CredentialResult<()>;

    /// Remove a value, returning whether it existed
    async fn remove(&self, key: &str) -> CredentialResult<bool>;

    /// Remove every value
    async fn clear(&self) -> CredentialResult<()>;
}

/// Value plus optional expiry, as persisted by the stores
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    pub value: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCredential {
    pub fn new(value: &str, expire: Option<Duration>) -> Self {
        let expires_at = expire
            .and_then(|ttl| chrono::Duration::from_std(ttl).ok())
            .map(|ttl| Utc::now() + ttl);

        Self {
            value: value.to_string(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Empty values are never stored
pub(crate) fn validate_value(key: &str, value: &str) -> CredentialResult<()> {
    if value.trim().is_empty() {
        return Err(CredentialError::Unsupported {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// In-memory credential store (for tests and one-shot runs)
#[derive(Clone, Default)]
pub struct InMemoryCredentialStore {
    entries: Arc<DashMap<String, StoredCredential>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with broker credentials
    pub fn with_rabbit(host: &str, port: u16, user: &str, password: &str) -> Self {
        let store = Self::new();
        for (key, value) in [
            (RABBIT_HOST, host.to_string()),
            (RABBIT_PORT, port.to_string()),
            (RABBIT_USER, user.to_string()),
            (RABBIT_PASSWORD, password.to_string()),
        ] {
            store
                .entries
                .insert(key.to_string(), StoredCredential::new(&value, None));
        }
        store
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get(&self, key: &str) -> CredentialResult<String> {
        let now = Utc::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => Ok(entry.value.clone()),
            _ => Err(CredentialError::Missing(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, expire: Option<Duration>) -> CredentialResult<()> {
        validate_value(key, value)?;
        self.entries
            .insert(key.to_string(), StoredCredential::new(value, expire));
        Ok(())
    }

    async fn remove(&self, key: &str) -> CredentialResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn clear(&self) -> CredentialResult<()> {
        self.entries.clear();
        Ok(())
    }
}

/// Broker connection credentials, read fresh for every publish attempt
#[derive(Clone, PartialEq, Eq)]
pub struct RabbitCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

impl RabbitCredentials {
    /// Read all four broker keys; the first missing key is reported
    pub async fn load(store: &dyn CredentialStore) -> CredentialResult<Self> {
        let host = store.get(RABBIT_HOST).await?;
        let port_raw = store.get(RABBIT_PORT).await?;
        let user = store.get(RABBIT_USER).await?;
        let password = store.get(RABBIT_PASSWORD).await?;

        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|e| CredentialError::Invalid {
                key: RABBIT_PORT.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            host,
            port,
            user,
            password,
        })
    }
}

impl fmt::Debug for RabbitCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RabbitCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}
