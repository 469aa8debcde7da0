//! labsh-core: session storage shared by the labsh client and CLI.
//!
//! Provides the error taxonomy, the non-secret session record and its file
//! store, the secret vault abstraction (OS keyring or in-memory), and the
//! well-known paths everything else builds on.

pub mod error;
pub mod paths;
pub mod record;
pub mod vault;

pub use error::{SessionError, SessionResult};
pub use record::{SessionRecord, SessionRecordStore};
pub use vault::{credentials_key, KeyringVault, MemoryVault, SecretVault};
