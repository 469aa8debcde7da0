//! labsh-client: the remote-session lifecycle.
//!
//! A [`Connection`] wraps one authenticated transport. The [`SessionCache`]
//! persists it between invocations and re-authenticates on restore, the
//! [`SessionRegistry`] holds the one connection feature commands share, and
//! the [`LifecycleGate`] brackets each protected command so that connection
//! is live before it runs and released afterwards.

pub mod cache;
pub mod connection;
pub mod gate;
pub mod mock;
pub mod registry;
pub mod ssh;
pub mod transport;

pub use cache::{SessionCache, DEFAULT_SESSION_TTL};
pub use connection::Connection;
pub use gate::{CommandPath, LifecycleGate, SessionScope};
pub use registry::SessionRegistry;
pub use ssh::SshDialer;
pub use transport::{Dialer, ExecChannel, ExecEvent, Transport};
