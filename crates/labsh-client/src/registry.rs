//! The single "current connection" slot shared by feature commands.
//!
//! There is no global: the top-level dispatcher owns one `SessionRegistry`
//! and lends it to each command handler. Commands run strictly one after
//! another, so the slot needs no locking of its own; callers that share it
//! across tasks wrap it in a `tokio::sync::Mutex`.

use labsh_core::{SessionError, SessionResult};

use crate::connection::Connection;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    current: Option<Connection>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<&Connection> {
        self.current.as_ref()
    }

    pub fn get_mut(&mut self) -> Option<&mut Connection> {
        self.current.as_mut()
    }

    /// The current connection, or `NotConnected` if the slot is empty.
    pub fn require(&mut self) -> SessionResult<&mut Connection> {
        self.current.as_mut().ok_or_else(|| {
            SessionError::NotConnected("run 'labsh login' first".into())
        })
    }

    /// Publish `connection`, handing back whatever was there before.
    pub fn set(&mut self, connection: Connection) -> Option<Connection> {
        self.current.replace(connection)
    }

    /// Empty the slot, handing back the evicted connection (if any).
    pub fn clear(&mut self) -> Option<Connection> {
        self.current.take()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Close and remove the current connection.
    pub async fn close_current(&mut self) {
        if let Some(mut connection) = self.current.take() {
            connection.close().await;
        }
    }
}
