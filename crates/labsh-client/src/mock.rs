//! Scripted in-process remote host for exercising the session lifecycle
//! without a network.
//!
//! ```
//! use labsh_client::mock::MockDialer;
//! use labsh_client::transport::ExecEvent;
//!
//! let dialer = MockDialer::new()
//!     .with_account("admin", "nas.lan", "hunter2")
//!     .respond("uptime", vec![ExecEvent::Stdout(b"up 3 days\n".to_vec()), ExecEvent::Exit(0)]);
//! assert_eq!(dialer.dial_count(), 0);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use labsh_core::{credentials_key, SessionError, SessionResult};
use tokio::sync::mpsc;

use crate::transport::{BoxFuture, Dialer, ExecChannel, ExecEvent, Transport};

#[derive(Default)]
struct MockState {
    accounts: HashMap<String, String>,
    responses: HashMap<String, Vec<ExecEvent>>,
    unreachable: bool,
    refuse_channels: bool,
    dials: usize,
    generation: u64,
    executed: Vec<String>,
    closes: usize,
}

/// Dialer for a fake host. Clones share state.
#[derive(Clone, Default)]
pub struct MockDialer {
    state: Arc<Mutex<MockState>>,
}

impl MockDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `secret` for `user@host`.
    pub fn with_account(self, user: &str, host: &str, secret: &str) -> Self {
        self.lock()
            .accounts
            .insert(credentials_key(user, host), secret.to_string());
        self
    }

    /// Script the events produced when `command` runs.
    pub fn respond(self, command: &str, events: Vec<ExecEvent>) -> Self {
        self.lock().responses.insert(command.to_string(), events);
        self
    }

    /// Make every future dial fail with a network error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Accept logins but refuse every channel, so probes and commands fail.
    pub fn refuse_channels(&self, refuse: bool) {
        self.lock().refuse_channels = refuse;
    }

    /// Sever every transport dialed so far, as if the host rebooted.
    pub fn drop_connections(&self) {
        self.lock().generation += 1;
    }

    /// Number of dial attempts, successful or not.
    pub fn dial_count(&self) -> usize {
        self.lock().dials
    }

    /// Commands run across all transports, in order.
    pub fn executed(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    /// Number of transports closed explicitly.
    pub fn close_count(&self) -> usize {
        self.lock().closes
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Dialer for MockDialer {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        user: &'a str,
        secret: &'a str,
    ) -> BoxFuture<'a, SessionResult<Box<dyn Transport>>> {
        Box::pin(async move {
            let mut state = self.lock();
            state.dials += 1;

            if state.unreachable {
                return Err(SessionError::Network(format!(
                    "dial {host}:22: connection refused"
                )));
            }

            match state.accounts.get(&credentials_key(user, host)) {
                Some(expected) if expected == secret => Ok(Box::new(MockTransport {
                    state: self.state.clone(),
                    generation: state.generation,
                    closed: false,
                }) as Box<dyn Transport>),
                _ => Err(SessionError::Auth {
                    user: user.to_string(),
                    host: host.to_string(),
                }),
            }
        })
    }
}

struct MockTransport {
    state: Arc<Mutex<MockState>>,
    generation: u64,
    closed: bool,
}

impl MockTransport {
    fn alive(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        !self.closed && !state.refuse_channels && state.generation == self.generation
    }
}

impl Transport for MockTransport {
    fn exec<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, SessionResult<ExecChannel>> {
        Box::pin(async move {
            if !self.alive() {
                return Err(SessionError::Network(
                    "failed to create session: connection closed".into(),
                ));
            }

            let events = {
                let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
                state.executed.push(command.to_string());
                state.responses.get(command).cloned().unwrap_or_else(|| {
                    vec![
                        ExecEvent::Stderr(format!("sh: {command}: command not found\n").into_bytes()),
                        ExecEvent::Exit(127),
                    ]
                })
            };

            let (tx, rx) = mpsc::channel(events.len().max(1));
            for event in events {
                // Capacity covers every scripted event.
                let _ = tx.try_send(event);
            }
            Ok(ExecChannel::new(rx))
        })
    }

    fn probe(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.alive() })
    }

    fn close(&mut self) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            if !self.closed {
                self.closed = true;
                self.state.lock().unwrap_or_else(|p| p.into_inner()).closes += 1;
            }
            Ok(())
        })
    }
}
