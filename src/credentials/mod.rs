//! Operator credential storage
//!
//! The publisher reads broker credentials from a [`CredentialStore`] on every
//! publish attempt, so rotating a password with `setup-rabbit` takes effect on
//! the next attempt without a restart.

mod error;
mod sled_store;
mod store;

pub use error::{CredentialError, CredentialResult};
pub use sled_store::SledCredentialStore;
pub use store::{
    CredentialStore, InMemoryCredentialStore, RabbitCredentials, StoredCredential, RABBIT_CREDENTIAL_KEYS,
    RABBIT_HOST, RABBIT_PASSWORD, RABBIT_PORT, RABBIT_USER,
};
