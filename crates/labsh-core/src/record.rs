//! Non-secret session metadata persisted between invocations.
//!
//! One record at a time lives at `~/.labsh/sessions/session.toml`:
//!
//! ```toml
//! host = "192.168.1.10"
//! user = "admin"
//! expires_at = "2026-01-01T12:00:00Z"
//! ```
//!
//! The matching password is kept in the [`SecretVault`](crate::vault::SecretVault),
//! never in this file.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{SessionError, SessionResult};
use crate::paths;

/// Which host/user a cached session refers to, and when it stops being usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub host: String,
    pub user: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// Build a record expiring `ttl` after `now`.
    pub fn issued_at(host: &str, user: &str, now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            host: host.to_string(),
            user: user.to_string(),
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// File-backed store holding at most one [`SessionRecord`].
pub struct SessionRecordStore {
    path: PathBuf,
}

impl SessionRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default location (`~/.labsh/sessions/session.toml`).
    pub fn default_location() -> SessionResult<Self> {
        Ok(Self::new(paths::session_record_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `record`, replacing any previous one.
    pub fn save(&self, record: &SessionRecord) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_private_dir(parent)?;
        }

        let content = toml::to_string(record)?;
        fs::write(&self.path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(path = %self.path.display(), host = %record.host, user = %record.user, "saved session record");
        Ok(())
    }

    pub fn load(&self) -> SessionResult<SessionRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound("session record".into()));
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content).map_err(|e| {
            SessionError::Parse(format!("session record {}: {e}", self.path.display()))
        })
    }

    pub fn delete(&self) -> SessionResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "removed session record");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SessionError::NotFound("session record".into()))
            }
            Err(e) => Err(e.into()),
        }
    }
}
