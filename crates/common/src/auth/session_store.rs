//! Session storage
//!
//! The store is the single piece of mutable shared state in the client. It
//! holds at most one [`Session`] in two fixed slots and performs no
//! validation of the tokens it keeps.

use parking_lot::RwLock;

use super::types::Session;
use crate::error::CommonResult;

/// Slot name for the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Slot name for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Holder for the current session.
///
/// Injected into the transport and the refresh coordinator so each client
/// (and each test) can own an isolated session.
pub trait SessionStore: Send + Sync {
    /// Current session, if both slots are populated.
    fn get(&self) -> CommonResult<Option<Session>>;

    /// Replace the current session.
    fn set(&self, session: &Session) -> CommonResult<()>;

    /// Remove both slots together.
    fn clear(&self) -> CommonResult<()>;

    /// Whether a session is present. Storage errors count as absent.
    fn is_authenticated(&self) -> bool {
        matches!(self.get(), Ok(Some(_)))
    }
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self { session: RwLock::new(Some(session)) }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> CommonResult<Option<Session>> {
        Ok(self.session.read().clone())
    }

    fn set(&self, session: &Session) -> CommonResult<()> {
        *self.session.write() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> CommonResult<()> {
        *self.session.write() = None;
        Ok(())
    }
}

#[cfg(feature = "platform")]
pub use durable::KeychainSessionStore;

#[cfg(feature = "platform")]
mod durable {
    use tracing::{debug, warn};

    use super::{Session, SessionStore, ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
    use crate::error::CommonResult;
    use crate::security::{KeychainProvider, SecretStore};

    /// Durable session store backed by the platform keychain.
    ///
    /// A half-written session (one slot present, the other missing) reads
    /// as no session.
    #[derive(Debug)]
    pub struct KeychainSessionStore<S = KeychainProvider> {
        secrets: S,
    }

    impl KeychainSessionStore<KeychainProvider> {
        /// Store under the given keychain service name.
        pub fn for_service(service_name: impl Into<String>) -> Self {
            Self::new(KeychainProvider::new(service_name))
        }
    }

    impl<S: SecretStore> KeychainSessionStore<S> {
        pub fn new(secrets: S) -> Self {
            Self { secrets }
        }
    }

    impl<S: SecretStore> SessionStore for KeychainSessionStore<S> {
        fn get(&self) -> CommonResult<Option<Session>> {
            let access = self.secrets.get_secret(ACCESS_TOKEN_KEY)?;
            let refresh = self.secrets.get_secret(REFRESH_TOKEN_KEY)?;

            match (access, refresh) {
                (Some(access_token), Some(refresh_token)) => {
                    Ok(Some(Session { access_token, refresh_token }))
                }
                (None, None) => Ok(None),
                _ => {
                    warn!("Session store holds only one token slot, treating as signed out");
                    Ok(None)
                }
            }
        }

        fn set(&self, session: &Session) -> CommonResult<()> {
            self.secrets.set_secret(ACCESS_TOKEN_KEY, &session.access_token)?;
            self.secrets.set_secret(REFRESH_TOKEN_KEY, &session.refresh_token)?;
            debug!("Session stored");
            Ok(())
        }

        fn clear(&self) -> CommonResult<()> {
            // Attempt both deletes even if the first fails.
            let access = self.secrets.delete_secret(ACCESS_TOKEN_KEY);
            let refresh = self.secrets.delete_secret(REFRESH_TOKEN_KEY);
            access?;
            refresh?;
            debug!("Session cleared");
            Ok(())
        }
    }
}
