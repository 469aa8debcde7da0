//! SSH transport built on `russh`.
//!
//! Dials port 22, checks the server's host key against the user's OpenSSH
//! `known_hosts`, and authenticates with a password. Every command runs on
//! its own session channel; a background task pumps channel messages into
//! an [`ExecChannel`].

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use labsh_core::{paths, SessionError, SessionResult};

use crate::transport::{BoxFuture, Dialer, ExecChannel, ExecEvent, Transport};

/// Standard administrative SSH port.
pub const SSH_PORT: u16 = 22;

/// Bound on dial + handshake + authentication.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Stderr stream id in SSH extended data.
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

/// Dials SSH hosts with password authentication.
#[derive(Debug, Clone)]
pub struct SshDialer {
    port: u16,
    known_hosts: PathBuf,
    accept_unknown_hosts: bool,
    timeout: Duration,
}

impl SshDialer {
    /// Verify host keys against the given known_hosts file.
    pub fn new(known_hosts: impl Into<PathBuf>) -> Self {
        Self {
            port: SSH_PORT,
            known_hosts: known_hosts.into(),
            accept_unknown_hosts: false,
            timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }

    /// Dialer using `~/.ssh/known_hosts`.
    pub fn default_location() -> SessionResult<Self> {
        Ok(Self::new(paths::known_hosts_path()?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Accept hosts that are missing from known_hosts. A changed key is
    /// still rejected.
    pub fn accept_unknown_hosts(mut self, accept: bool) -> Self {
        self.accept_unknown_hosts = accept;
        self
    }

    async fn connect(&self, host: &str, user: &str, secret: &str) -> SessionResult<SshTransport> {
        let config = Arc::new(client::Config::default());
        let rejection = Arc::new(Mutex::new(None));
        let checker = HostKeyCheck {
            host: host.to_string(),
            port: self.port,
            known_hosts: self.known_hosts.clone(),
            accept_unknown: self.accept_unknown_hosts,
            rejection: rejection.clone(),
        };

        let addr = format!("{host}:{}", self.port);
        debug!(addr = %addr, user = %user, "dialing");

        let dial = async {
            let mut handle = client::connect(config, (host.to_string(), self.port), checker).await?;
            let accepted = handle.authenticate_password(user, secret).await?;
            Ok::<_, russh::Error>((handle, accepted))
        };

        match tokio::time::timeout(self.timeout, dial).await {
            Err(_) => Err(SessionError::Network(format!(
                "dial {addr}: timed out after {}s",
                self.timeout.as_secs()
            ))),
            Ok(Err(russh::Error::UnknownKey)) => {
                let reason = rejection
                    .lock()
                    .ok()
                    .and_then(|mut r| r.take())
                    .unwrap_or_else(|| format!("{addr} is not a trusted host"));
                Err(SessionError::HostKey(reason))
            }
            Ok(Err(e)) => Err(SessionError::Network(format!("dial {addr}: {e}"))),
            Ok(Ok((_handle, false))) => Err(SessionError::Auth {
                user: user.to_string(),
                host: host.to_string(),
            }),
            Ok(Ok((handle, true))) => {
                info!(addr = %addr, user = %user, "authenticated");
                Ok(SshTransport { handle })
            }
        }
    }
}

impl Dialer for SshDialer {
    fn dial<'a>(
        &'a self,
        host: &'a str,
        user: &'a str,
        secret: &'a str,
    ) -> BoxFuture<'a, SessionResult<Box<dyn Transport>>> {
        Box::pin(async move {
            let transport = self.connect(host, user, secret).await?;
            Ok(Box::new(transport) as Box<dyn Transport>)
        })
    }
}

/// Host key verification against an OpenSSH known_hosts file.
struct HostKeyCheck {
    host: String,
    port: u16,
    known_hosts: PathBuf,
    accept_unknown: bool,
    rejection: Arc<Mutex<Option<String>>>,
}

impl HostKeyCheck {
    fn reject(&self, reason: String) -> bool {
        warn!(host = %self.host, "{reason}");
        if let Ok(mut slot) = self.rejection.lock() {
            *slot = Some(reason);
        }
        false
    }
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        match russh_keys::check_known_hosts_path(
            &self.host,
            self.port,
            server_public_key,
            &self.known_hosts,
        ) {
            Ok(true) => {
                debug!(host = %self.host, "host key verified");
                Ok(true)
            }
            Ok(false) if self.accept_unknown => {
                warn!(host = %self.host, fingerprint = %fingerprint, "accepting unknown host key");
                Ok(true)
            }
            Ok(false) => Ok(self.reject(format!(
                "host '{}' is not in {} (key fingerprint {fingerprint})",
                self.host,
                self.known_hosts.display()
            ))),
            Err(russh_keys::Error::KeyChanged { line }) => Ok(self.reject(format!(
                "REMOTE HOST IDENTIFICATION HAS CHANGED for '{}' (known_hosts line {line}, new fingerprint {fingerprint})",
                self.host
            ))),
            Err(e) => Ok(self.reject(format!(
                "cannot read {}: {e}",
                self.known_hosts.display()
            ))),
        }
    }
}

/// A live, authenticated SSH connection.
pub struct SshTransport {
    handle: Handle<HostKeyCheck>,
}

impl Transport for SshTransport {
    fn exec<'a>(&'a mut self, command: &'a str) -> BoxFuture<'a, SessionResult<ExecChannel>> {
        Box::pin(async move {
            let channel = self
                .handle
                .channel_open_session()
                .await
                .map_err(|e| SessionError::Network(format!("failed to create session: {e}")))?;
            channel
                .exec(true, command)
                .await
                .map_err(|e| SessionError::Network(format!("failed to start command: {e}")))?;

            let (tx, rx) = mpsc::channel(64);
            tokio::spawn(pump(channel, tx));
            Ok(ExecChannel::new(rx))
        })
    }

    fn probe(&mut self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match self.handle.channel_open_session().await {
                Ok(channel) => {
                    let _ = channel.close().await;
                    true
                }
                Err(e) => {
                    debug!("probe failed: {e}");
                    false
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, SessionResult<()>> {
        Box::pin(async move {
            self.handle
                .disconnect(Disconnect::ByApplication, "session closed", "en")
                .await
                .map_err(|e| SessionError::Network(format!("disconnect: {e}")))
        })
    }
}

/// Forward channel messages as [`ExecEvent`]s until the channel closes or
/// the receiver goes away.
async fn pump(mut channel: Channel<client::Msg>, tx: mpsc::Sender<ExecEvent>) {
    while let Some(msg) = channel.wait().await {
        let event = match msg {
            ChannelMsg::Data { ref data } => ExecEvent::Stdout(data.to_vec()),
            ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                ExecEvent::Stderr(data.to_vec())
            }
            ChannelMsg::ExitStatus { exit_status } => ExecEvent::Exit(exit_status),
            ChannelMsg::ExitSignal { signal_name, .. } => {
                ExecEvent::Signal(format!("{signal_name:?}"))
            }
            ChannelMsg::Close => break,
            _ => continue,
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
    debug!("exec channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialer_defaults() {
        let dialer = SshDialer::new("/tmp/known_hosts");
        assert_eq!(dialer.port, SSH_PORT);
        assert_eq!(dialer.timeout, DEFAULT_DIAL_TIMEOUT);
        assert!(!dialer.accept_unknown_hosts);
    }

    #[test]
    fn dialer_builders() {
        let dialer = SshDialer::new("/tmp/known_hosts")
            .with_timeout(Duration::from_secs(5))
            .with_port(2222)
            .accept_unknown_hosts(true);
        assert_eq!(dialer.port, 2222);
        assert_eq!(dialer.timeout, Duration::from_secs(5));
        assert!(dialer.accept_unknown_hosts);
    }

    #[tokio::test]
    async fn unreachable_host_is_network_error() {
        // Port 1 on localhost refuses connections on any sane test machine.
        let dialer = SshDialer::new("/nonexistent/known_hosts")
            .with_port(1)
            .with_timeout(Duration::from_secs(5));
        let err = dialer.dial("127.0.0.1", "admin", "pw").await.err().unwrap();
        assert!(matches!(err, SessionError::Network(_)), "got {err}");
    }
}
