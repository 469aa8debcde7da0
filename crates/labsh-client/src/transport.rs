//! Abstract transport seam between the session lifecycle and the wire.
//!
//! The SSH implementation lives in [`crate::ssh`]; [`crate::mock`] provides a
//! scripted host for tests. Both must satisfy these traits.

use std::future::Future;
use std::pin::Pin;

use labsh_core::SessionResult;
use tokio::sync::mpsc;

/// A boxed, sendable future borrowed for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One observation from a running remote command, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecEvent {
    /// Bytes written to standard output.
    Stdout(Vec<u8>),
    /// Bytes written to standard error.
    Stderr(Vec<u8>),
    /// The command exited with this status.
    Exit(u32),
    /// The command was killed by this signal.
    Signal(String),
}

/// Receiving end of a single logical execution channel.
///
/// The stream ends when the remote side closes the channel.
pub struct ExecChannel {
    events: mpsc::Receiver<ExecEvent>,
}

impl ExecChannel {
    pub fn new(events: mpsc::Receiver<ExecEvent>) -> Self {
        Self { events }
    }

    /// Next event, or `None` once the channel has closed.
    pub async fn next(&mut self) -> Option<ExecEvent> {
        self.events.recv().await
    }
}

/// An authenticated transport to one remote host.
pub trait Transport: Send {
    /// Open a fresh execution channel and start `command` on it.
    fn exec<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, SessionResult<ExecChannel>>;

    /// Open and immediately discard an execution channel.
    fn probe(&mut self) -> BoxFuture<'_, bool>;

    /// Release the transport.
    fn close(&mut self) -> BoxFuture<'_, SessionResult<()>>;
}

/// Something that can dial and authenticate a [`Transport`].
pub trait Dialer: Send + Sync {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        user: &'a str,
        secret: &'a str,
    ) -> BoxFuture<'a, SessionResult<Box<dyn Transport>>>;
}
