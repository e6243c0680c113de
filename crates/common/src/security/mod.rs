//! Security primitives
//!
//! Platform keychain access for the durable half of the session store.

pub mod keychain;

pub use keychain::{KeychainError, KeychainProvider, SecretStore};
