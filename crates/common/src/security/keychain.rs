//! Keychain provider for secure credential storage
//!
//! Thin wrapper over the platform keychain (macOS Keychain Access, Windows
//! Credential Manager, Linux Secret Service) used to persist the two session
//! slots between runs.
//!
//! ## Usage
//!
//! ```no_run
//! use cuidar_common::security::{KeychainProvider, SecretStore};
//!
//! let keychain = KeychainProvider::new("cuidar-plus");
//! keychain.set_secret("access_token", "A1")?;
//! assert_eq!(keychain.get_secret("access_token")?, Some("A1".to_string()));
//! # Ok::<(), cuidar_common::security::KeychainError>(())
//! ```

use keyring::Entry;
use thiserror::Error;
use tracing::debug;

use crate::error::CommonError;

/// Key/value secret storage.
///
/// Implemented by [`KeychainProvider`] and by the in-memory mock used in
/// tests, so the session store can be exercised without a real keychain.
pub trait SecretStore: Send + Sync {
    /// Store a secret, overwriting any previous value.
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError>;

    /// Read a secret; `Ok(None)` when no entry exists.
    fn get_secret(&self, key: &str) -> Result<Option<String>, KeychainError>;

    /// Delete a secret. Deleting a missing entry succeeds.
    fn delete_secret(&self, key: &str) -> Result<(), KeychainError>;
}

/// Keychain provider scoped to one service name
#[derive(Debug, Clone)]
pub struct KeychainProvider {
    service_name: String,
}

impl KeychainProvider {
    /// Create a new keychain provider for a specific service
    pub fn new(service_name: impl Into<String>) -> Self {
        Self { service_name: service_name.into() }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    fn create_entry(&self, account: &str) -> Result<Entry, KeychainError> {
        Entry::new(&self.service_name, account).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to create keychain entry: {e}"))
        })
    }
}

impl SecretStore for KeychainProvider {
    fn set_secret(&self, key: &str, value: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Storing secret in keychain");

        self.create_entry(key)?.set_password(value).map_err(|e| {
            KeychainError::AccessFailed(format!("Failed to store secret for {key}: {e}"))
        })
    }

    fn get_secret(&self, key: &str) -> Result<Option<String>, KeychainError> {
        debug!(service = %self.service_name, key = %key, "Retrieving secret from keychain");

        match self.create_entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(KeychainError::AccessFailed(format!(
                "Failed to retrieve secret for {key}: {e}"
            ))),
        }
    }

    fn delete_secret(&self, key: &str) -> Result<(), KeychainError> {
        debug!(service = %self.service_name, key = %key, "Deleting secret from keychain");

        match self.create_entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(KeychainError::AccessFailed(format!(
                "Failed to delete secret for {key}: {e}"
            ))),
        }
    }
}

/// Keychain error types
#[derive(Debug, Error)]
pub enum KeychainError {
    /// Keychain access failed (permission denied, not available, etc.)
    #[error("Keychain access failed: {0}")]
    AccessFailed(String),

    /// Underlying keyring library error
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

impl From<KeychainError> for CommonError {
    fn from(err: KeychainError) -> Self {
        CommonError::storage_op("keychain", err.to_string())
    }
}
