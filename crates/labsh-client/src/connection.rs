//! One authenticated remote-shell connection.
//!
//! A `Connection` owns its transport exclusively. It is moved between
//! holders (a local during login, the [`SessionRegistry`](crate::SessionRegistry)
//! afterwards) and never cloned; closing it ends the transport for good.

use std::fmt;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use labsh_core::{SessionError, SessionResult};

use crate::transport::{Dialer, ExecChannel, ExecEvent, Transport};

pub struct Connection {
    host: String,
    user: String,
    secret: String,
    transport: Option<Box<dyn Transport>>,
}

impl Connection {
    /// Dial `host`, authenticate as `user`, and wrap the live transport.
    pub async fn open(dialer: &dyn Dialer, host: &str, user: &str, secret: &str) -> SessionResult<Self> {
        let transport = dialer.dial(host, user, secret).await?;
        info!(host = %host, user = %user, "connection opened");
        Ok(Self {
            host: host.to_string(),
            user: user.to_string(),
            secret: secret.to_string(),
            transport: Some(transport),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The password this connection authenticated with.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Whether [`close`](Self::close) has not yet been called.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Run `command` to completion and return stdout and stderr combined
    /// in arrival order.
    ///
    /// A non-zero exit fails with [`SessionError::Exec`] carrying whatever
    /// output was captured. The exit status itself is not exposed.
    pub async fn run(&mut self, command: &str) -> SessionResult<String> {
        debug!(host = %self.host, command = %command, "run");
        let mut channel = self.start(command).await?;

        let mut combined = Vec::new();
        let mut status = None;
        while let Some(event) = channel.next().await {
            match event {
                ExecEvent::Stdout(bytes) | ExecEvent::Stderr(bytes) => combined.extend_from_slice(&bytes),
                other => status = Some(other),
            }
        }

        let output = String::from_utf8_lossy(&combined).into_owned();
        finish(status, output.clone())?;
        Ok(output)
    }

    /// Run `command`, writing its output to `sink` as it arrives.
    ///
    /// Stderr chunks are forwarded immediately; stdout is forwarded one
    /// whole line at a time. Stdout lines keep their relative order, but
    /// how they interleave with stderr is unspecified. Output already
    /// written before a failure stays written.
    pub async fn run_stream<W>(&mut self, command: &str, sink: &mut W) -> SessionResult<()>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        debug!(host = %self.host, command = %command, "run_stream");
        let mut channel = self.start(command).await?;

        let mut pending = Vec::new();
        let mut status = None;
        while let Some(event) = channel.next().await {
            match event {
                ExecEvent::Stdout(bytes) => {
                    pending.extend_from_slice(&bytes);
                    while let Some(pos) = pending.iter().position(|b| *b == b'\n') {
                        let line: Vec<u8> = pending.drain(..=pos).collect();
                        sink.write_all(&line).await?;
                    }
                }
                ExecEvent::Stderr(bytes) => sink.write_all(&bytes).await?,
                other => status = Some(other),
            }
        }

        if !pending.is_empty() {
            pending.push(b'\n');
            sink.write_all(&pending).await?;
        }
        sink.flush().await?;

        finish(status, String::new())
    }

    /// Run `command`, copying stdout to `out` and stderr to `err` byte for
    /// byte. For binary output such as a tarball.
    pub async fn run_split<O, E>(&mut self, command: &str, out: &mut O, err: &mut E) -> SessionResult<()>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        debug!(host = %self.host, command = %command, "run_split");
        let mut channel = self.start(command).await?;

        let mut status = None;
        while let Some(event) = channel.next().await {
            match event {
                ExecEvent::Stdout(bytes) => out.write_all(&bytes).await?,
                ExecEvent::Stderr(bytes) => err.write_all(&bytes).await?,
                other => status = Some(other),
            }
        }
        out.flush().await?;
        err.flush().await?;

        finish(status, String::new())
    }

    /// Whether the transport still accepts new channels.
    ///
    /// This is the only definition of "connected"; it says nothing about
    /// whether the last command succeeded.
    pub async fn probe(&mut self) -> bool {
        match self.transport.as_mut() {
            Some(transport) => transport.probe().await,
            None => false,
        }
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                warn!(host = %self.host, "error during disconnect: {e}");
            }
            info!(host = %self.host, user = %self.user, "connection closed");
        }
    }

    async fn start(&mut self, command: &str) -> SessionResult<ExecChannel> {
        let transport = self.transport.as_mut().ok_or_else(|| {
            SessionError::Network(format!("connection to {} is closed", self.host))
        })?;
        transport.exec(command).await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .field("open", &self.is_open())
            .finish()
    }
}

/// Map the terminal event of an execution to a result.
fn finish(status: Option<ExecEvent>, output: String) -> SessionResult<()> {
    match status {
        Some(ExecEvent::Exit(0)) => Ok(()),
        Some(ExecEvent::Exit(code)) => Err(SessionError::Exec {
            reason: format!("exited with status {code}"),
            output,
        }),
        Some(ExecEvent::Signal(signal)) => Err(SessionError::Exec {
            reason: format!("killed by signal {signal}"),
            output,
        }),
        _ => Err(SessionError::Exec {
            reason: "channel closed before the command exited".into(),
            output,
        }),
    }
}
