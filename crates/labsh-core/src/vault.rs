//! Secret storage for session passwords.
//!
//! Every entry is keyed by `user@host`. Exactly one secret exists per pair;
//! storing again silently replaces it. Removing an entry that does not
//! exist succeeds, so dropping a half-persisted session never fails on
//! the secret side.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::paths::APP_NAME;

/// Composite key under which the secret for `(user, host)` is stored.
pub fn credentials_key(user: &str, host: &str) -> String {
    format!("{user}@{host}")
}

/// A place to keep session passwords.
pub trait SecretVault: Send + Sync {
    /// Store `secret` for `user@host`, overwriting any existing entry.
    fn store(&self, user: &str, host: &str, secret: &str) -> SessionResult<()>;

    /// Fetch the secret for `user@host`; `NotFound` if absent.
    fn fetch(&self, user: &str, host: &str) -> SessionResult<String>;

    /// Remove the secret for `user@host`. Absent entries are not an error.
    fn delete(&self, user: &str, host: &str) -> SessionResult<()>;
}

/// Vault backed by the operating system's credential store
/// (Secret Service, macOS Keychain, Windows Credential Manager).
pub struct KeyringVault {
    service: String,
}

impl KeyringVault {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, user: &str, host: &str) -> SessionResult<keyring::Entry> {
        keyring::Entry::new(&self.service, &credentials_key(user, host))
            .map_err(|e| SessionError::Vault(e.to_string()))
    }
}

impl Default for KeyringVault {
    fn default() -> Self {
        Self::new(APP_NAME)
    }
}

impl SecretVault for KeyringVault {
    fn store(&self, user: &str, host: &str, secret: &str) -> SessionResult<()> {
        self.entry(user, host)?
            .set_password(secret)
            .map_err(|e| SessionError::Vault(format!("store password in keyring: {e}")))?;
        debug!(service = %self.service, key = %credentials_key(user, host), "stored secret");
        Ok(())
    }

    fn fetch(&self, user: &str, host: &str) -> SessionResult<String> {
        match self.entry(user, host)?.get_password() {
            Ok(secret) => Ok(secret),
            Err(keyring::Error::NoEntry) => Err(SessionError::NotFound(format!(
                "secret for {}",
                credentials_key(user, host)
            ))),
            Err(e) => Err(SessionError::Vault(format!("load password from keyring: {e}"))),
        }
    }

    fn delete(&self, user: &str, host: &str) -> SessionResult<()> {
        match self.entry(user, host)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => {
                debug!(key = %credentials_key(user, host), "secret already absent");
                Ok(())
            }
            Err(e) => Err(SessionError::Vault(format!(
                "remove credentials from keyring: {e}"
            ))),
        }
    }
}

/// Process-local vault. Used by tests and anywhere an OS keyring is unavailable.
#[derive(Default)]
pub struct MemoryVault {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> SessionResult<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| SessionError::Vault("memory vault poisoned".into()))?;
        Ok(f(&mut entries))
    }
}

impl SecretVault for MemoryVault {
    fn store(&self, user: &str, host: &str, secret: &str) -> SessionResult<()> {
        self.with_entries(|e| {
            e.insert(credentials_key(user, host), secret.to_string());
        })
    }

    fn fetch(&self, user: &str, host: &str) -> SessionResult<String> {
        let key = credentials_key(user, host);
        self.with_entries(|e| e.get(&key).cloned())?
            .ok_or_else(|| SessionError::NotFound(format!("secret for {key}")))
    }

    fn delete(&self, user: &str, host: &str) -> SessionResult<()> {
        self.with_entries(|e| {
            e.remove(&credentials_key(user, host));
        })
    }
}
