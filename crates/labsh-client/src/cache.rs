//! Persisting an authenticated connection and bringing it back later.
//!
//! The password goes to the [`SecretVault`]; host, user and expiry go to the
//! [`SessionRecordStore`]. A restore re-reads both and performs a full
//! re-authentication. Expired records are rejected before any dial.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use labsh_core::{SecretVault, SessionError, SessionRecord, SessionRecordStore, SessionResult};

use crate::connection::Connection;
use crate::transport::Dialer;

/// How long a persisted session stays usable. Never extended by reuse.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(60 * 60);

pub struct SessionCache {
    vault: Box<dyn SecretVault>,
    store: SessionRecordStore,
    dialer: Arc<dyn Dialer>,
    ttl: Duration,
}

impl SessionCache {
    pub fn new(vault: Box<dyn SecretVault>, store: SessionRecordStore, dialer: Arc<dyn Dialer>) -> Self {
        Self {
            vault,
            store,
            dialer,
            ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Authenticate a brand-new connection with this cache's dialer.
    pub async fn open(&self, host: &str, user: &str, secret: &str) -> SessionResult<Connection> {
        Connection::open(self.dialer.as_ref(), host, user, secret).await
    }

    /// Save `connection` so a later invocation can [`restore`](Self::restore) it.
    ///
    /// The secret is written before the record. If the record cannot be
    /// written the secret is removed again, so no half-persisted session
    /// is left behind.
    pub fn persist(&self, connection: &Connection) -> SessionResult<SessionRecord> {
        let record = SessionRecord::issued_at(connection.host(), connection.user(), Utc::now(), self.ttl);

        self.vault
            .store(connection.user(), connection.host(), connection.secret())?;

        if let Err(e) = self.store.save(&record) {
            if let Err(cleanup) = self.vault.delete(connection.user(), connection.host()) {
                warn!("failed to remove orphaned secret: {cleanup}");
            }
            return Err(e);
        }

        info!(
            host = %record.host,
            user = %record.user,
            expires_at = %record.expires_at.to_rfc3339(),
            "session persisted"
        );
        Ok(record)
    }

    /// Rebuild a connection from persisted state.
    pub async fn restore(&self) -> SessionResult<Connection> {
        let record = self.store.load()?;
        if record.is_expired_at(Utc::now()) {
            debug!(expires_at = %record.expires_at.to_rfc3339(), "cached session expired");
            return Err(SessionError::Expired(record.expires_at));
        }

        let secret = self.vault.fetch(&record.user, &record.host)?;
        debug!(host = %record.host, user = %record.user, "restoring session");
        self.open(&record.host, &record.user, &secret).await
    }

    /// The persisted record, without contacting the host.
    pub fn metadata(&self) -> SessionResult<SessionRecord> {
        self.store.load()
    }

    /// Forget the cached session. Calling this with nothing cached succeeds.
    pub fn drop_session(&self) -> SessionResult<()> {
        match self.store.load() {
            Ok(record) => {
                if let Err(e) = self.vault.delete(&record.user, &record.host) {
                    warn!(host = %record.host, user = %record.user, "failed to remove secret: {e}");
                }
            }
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => warn!("session record unreadable, removing it anyway: {e}"),
        }

        match self.store.delete() {
            Ok(()) => {
                info!("cached session removed");
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDialer;
    use crate::transport::ExecEvent;
    use labsh_core::MemoryVault;

    struct Fixture {
        _tmp: tempfile::TempDir,
        dialer: MockDialer,
        cache: SessionCache,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let dialer = MockDialer::new()
            .with_account("u", "h", "s")
            .respond("true", vec![ExecEvent::Exit(0)]);
        let cache = SessionCache::new(
            Box::new(MemoryVault::new()),
            SessionRecordStore::new(tmp.path().join("sessions").join("session.toml")),
            Arc::new(dialer.clone()),
        );
        Fixture {
            _tmp: tmp,
            dialer,
            cache,
        }
    }

    /// A second cache over the same files, as a fresh process would build.
    fn reopen(fx: &Fixture, vault: Box<dyn SecretVault>) -> SessionCache {
        SessionCache::new(
            vault,
            SessionRecordStore::new(fx.cache.store.path().to_path_buf()),
            Arc::new(fx.dialer.clone()),
        )
    }

    #[tokio::test]
    async fn persist_then_restore_round_trip() {
        let fx = fixture();
        let mut conn = fx.cache.open("h", "u", "s").await.unwrap();
        let record = fx.cache.persist(&conn).unwrap();
        conn.close().await;

        assert_eq!(record.host, "h");
        assert_eq!(record.user, "u");

        let mut restored = fx.cache.restore().await.unwrap();
        assert_eq!(restored.host(), "h");
        assert_eq!(restored.user(), "u");
        assert_eq!(restored.secret(), "s");
        assert!(restored.probe().await);
        assert_eq!(fx.dialer.dial_count(), 2);
    }

    #[tokio::test]
    async fn persist_sets_expiry_from_ttl() {
        let fx = fixture();
        let cache = reopen(&fx, Box::new(MemoryVault::new())).with_ttl(Duration::from_secs(90));
        let conn = cache.open("h", "u", "s").await.unwrap();

        let before = Utc::now();
        let record = cache.persist(&conn).unwrap();
        let remaining = record.remaining_at(before);
        assert!(remaining <= Duration::from_secs(91) && remaining >= Duration::from_secs(89));
    }

    #[tokio::test]
    async fn restore_does_not_extend_expiry() {
        let fx = fixture();
        let conn = fx.cache.open("h", "u", "s").await.unwrap();
        let record = fx.cache.persist(&conn).unwrap();

        fx.cache.restore().await.unwrap();
        assert_eq!(fx.cache.metadata().unwrap().expires_at, record.expires_at);
    }

    #[tokio::test]
    async fn expired_record_fails_without_dialing() {
        let fx = fixture();
        let stale = SessionRecord::issued_at("h", "u", Utc::now() - chrono::Duration::hours(2), DEFAULT_SESSION_TTL);
        fx.cache.store.save(&stale).unwrap();
        fx.cache.vault.store("u", "h", "s").unwrap();

        let err = fx.cache.restore().await.unwrap_err();
        assert!(err.is_expired(), "got {err}");
        assert_eq!(fx.dialer.dial_count(), 0);
    }

    #[tokio::test]
    async fn restore_without_record_is_not_found() {
        let fx = fixture();
        assert!(fx.cache.restore().await.unwrap_err().is_not_found());
        assert_eq!(fx.dialer.dial_count(), 0);
    }

    #[tokio::test]
    async fn restore_with_orphaned_record_is_not_found() {
        let fx = fixture();
        let conn = fx.cache.open("h", "u", "s").await.unwrap();
        fx.cache.persist(&conn).unwrap();

        // Same record file, but a keyring that never saw the secret.
        let cache = reopen(&fx, Box::new(MemoryVault::new()));
        assert!(cache.restore().await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn restore_with_rotated_password_is_auth_error() {
        let fx = fixture();
        let conn = fx.cache.open("h", "u", "s").await.unwrap();
        fx.cache.persist(&conn).unwrap();
        fx.cache.vault.store("u", "h", "stale").unwrap();

        assert!(matches!(
            fx.cache.restore().await.unwrap_err(),
            SessionError::Auth { .. }
        ));
    }

    #[tokio::test]
    async fn drop_twice_is_fine() {
        let fx = fixture();
        let conn = fx.cache.open("h", "u", "s").await.unwrap();
        fx.cache.persist(&conn).unwrap();

        fx.cache.drop_session().unwrap();
        fx.cache.drop_session().unwrap();
        assert!(fx.cache.vault.fetch("u", "h").unwrap_err().is_not_found());
        assert!(fx.cache.metadata().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn drop_removes_unparseable_record() {
        let fx = fixture();
        let path = fx.cache.store.path().to_path_buf();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "not = [toml").unwrap();

        fx.cache.drop_session().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn end_to_end_login_restart_drop() {
        let fx = fixture();

        // Authenticate and persist, then "exit" the process.
        let mut conn = fx.cache.open("h", "u", "s").await.unwrap();
        fx.cache.persist(&conn).unwrap();
        conn.close().await;

        // A later invocation restores and finds the host alive.
        let mut restored = fx.cache.restore().await.unwrap();
        assert!(restored.probe().await);
        restored.close().await;

        fx.cache.drop_session().unwrap();
        assert!(fx.cache.restore().await.unwrap_err().is_not_found());
    }
}
