//! Pre/post hooks that bracket every protected command.
//!
//! Before the command: make sure the registry holds a live connection,
//! reusing a probe-confirmed one or restoring the cached session. After
//! the command, whatever happened: close the connection and empty the
//! registry. Commands named in the exemption list (and their
//! subcommands) bypass both hooks.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, info};

use labsh_core::{SessionError, SessionResult};

use crate::cache::SessionCache;
use crate::registry::SessionRegistry;

/// Anything that carries the process's [`SessionRegistry`].
pub trait SessionScope {
    fn registry(&mut self) -> &mut SessionRegistry;
}

impl SessionScope for SessionRegistry {
    fn registry(&mut self) -> &mut SessionRegistry {
        self
    }
}

/// Where a command sits in the command tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPath {
    pub parent: Option<String>,
    pub name: String,
}

impl CommandPath {
    /// A top-level command.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            parent: None,
            name: name.into(),
        }
    }

    /// `name` nested under `parent`.
    pub fn child(parent: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            parent: Some(parent.into()),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for CommandPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.parent {
            Some(parent) => write!(f, "{parent} {}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// The bootstrap command every gate exempts.
pub const LOGIN_COMMAND: &str = "login";

pub struct LifecycleGate {
    cache: Arc<SessionCache>,
    exempt: Vec<String>,
}

impl LifecycleGate {
    pub fn new(cache: Arc<SessionCache>) -> Self {
        Self {
            cache,
            exempt: vec![LOGIN_COMMAND.to_string()],
        }
    }

    /// Also let `command` and its subcommands run without a session.
    pub fn exempt(mut self, command: impl Into<String>) -> Self {
        self.exempt.push(command.into());
        self
    }

    pub fn is_exempt(&self, path: &CommandPath) -> bool {
        self.exempt
            .iter()
            .any(|e| *e == path.name || path.parent.as_deref() == Some(e.as_str()))
    }

    /// Ensure `registry` holds a live connection before `path` runs.
    pub async fn before(&self, registry: &mut SessionRegistry, path: &CommandPath) -> SessionResult<()> {
        if self.is_exempt(path) {
            debug!(command = %path, "session not required");
            return Ok(());
        }

        if let Some(current) = registry.get_mut() {
            if current.probe().await {
                debug!(command = %path, host = %current.host(), "reusing live connection");
                return Ok(());
            }
            debug!(host = %current.host(), "current connection is dead, discarding");
            registry.close_current().await;
        }

        let mut connection = self.cache.restore().await.map_err(|e| {
            SessionError::NotConnected(format!("{e}; run 'labsh login' first"))
        })?;

        if !connection.probe().await {
            connection.close().await;
            registry.clear();
            return Err(SessionError::NotConnected(
                "run 'labsh login' first".into(),
            ));
        }

        info!(command = %path, host = %connection.host(), user = %connection.user(), "session restored");
        registry.set(connection);
        Ok(())
    }

    /// Close and clear whatever connection `path` left in `registry`.
    pub async fn after(&self, registry: &mut SessionRegistry, path: &CommandPath) {
        if self.is_exempt(path) {
            return;
        }
        registry.close_current().await;
    }

    /// Run `command` between [`before`](Self::before) and [`after`](Self::after).
    ///
    /// The post-hook runs whether the command succeeds or fails; a failing
    /// pre-hook skips the command entirely.
    pub async fn guard<C, F, T, E>(&self, scope: &mut C, path: &CommandPath, command: F) -> Result<T, E>
    where
        C: SessionScope,
        F: for<'c> FnOnce(&'c mut C) -> Pin<Box<dyn Future<Output = Result<T, E>> + 'c>>,
        E: From<SessionError>,
    {
        self.before(scope.registry(), path).await?;
        let result = command(&mut *scope).await;
        self.after(scope.registry(), path).await;
        result
    }
}
