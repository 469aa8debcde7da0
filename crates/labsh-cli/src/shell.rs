//! `labsh shell`: one connection, many commands.
//!
//! The shell obtains a connection once (restoring the cached session or
//! logging in fresh), publishes it to the registry, and then feeds each
//! input line to the same handlers the one-shot CLI uses. No lifecycle gate
//! runs per line, so every command reuses that connection. Command failures
//! are reported and the loop carries on; only `exit`, `quit`, or end of
//! input end it, and the connection is released on the way out.

use anyhow::{bail, Context, Result};
use clap::{error::ErrorKind, Args, Parser};
use tracing::{debug, info, warn};

use labsh_client::Connection;

use crate::commands::{self, App, GroupCommand};
use crate::config::{parse_target, ResolvedHost};

pub const PROMPT: &str = "labsh> ";

const HELP: &str = "\
Available commands:
  cluster <subcommand>   - Cluster management (info, status, workloads, backup, restart)
  diag bundle            - Collect a diagnostics tarball
  self info              - Remote system information
  session [status|drop]  - Show or drop the cached session
  help                   - Show this help
  exit | quit            - Leave the shell (Ctrl+D also works)
";

#[derive(Args, Debug, Default)]
pub struct ShellArgs {
    /// Host address or configured alias (default: cached session, then config)
    pub host: Option<String>,

    /// Username for a fresh login (overrides config)
    #[arg(short, long)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Disconnected,
    Connecting,
    Ready,
    Dispatching,
    Closed,
}

/// What the loop does after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// A shell line, parsed like the matching top-level command.
#[derive(Parser, Debug)]
#[command(name = "labsh", no_binary_name = true)]
struct ShellLine {
    #[command(subcommand)]
    command: GroupCommand,
}

pub struct Shell<'a> {
    app: &'a mut App,
    state: ShellState,
}

impl<'a> Shell<'a> {
    pub fn new(app: &'a mut App) -> Self {
        Self {
            app,
            state: ShellState::Disconnected,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> ShellState {
        self.state
    }

    /// Obtain the shell's connection and publish it to the registry.
    pub async fn connect(&mut self, args: ShellArgs) -> Result<()> {
        self.state = ShellState::Connecting;
        match self.obtain(args).await {
            Ok(conn) => {
                let banner = format!(
                    "Connected to {}@{}\nInteractive labsh shell - type 'help' for commands, 'exit' to quit\n\n",
                    conn.user(),
                    conn.host()
                );
                self.app.registry.set(conn);
                self.state = ShellState::Ready;
                self.app.print(&banner).await
            }
            Err(e) => {
                self.state = ShellState::Disconnected;
                Err(e)
            }
        }
    }

    /// Read and dispatch lines until `exit`, `quit`, or end of input.
    pub async fn run_loop(&mut self) -> Result<()> {
        loop {
            self.app.print(PROMPT).await?;
            let Some(line) = self.app.input.next_line().await else {
                self.app.print("\n").await?;
                return Ok(());
            };
            if self.handle_line(&line).await? == Flow::Exit {
                return Ok(());
            }
        }
    }

    /// Dispatch one input line. Errors are only returned for failures to
    /// write output; command failures are printed and swallowed.
    pub async fn handle_line(&mut self, line: &str) -> Result<Flow> {
        let line = line.trim();
        match line {
            "" => return Ok(Flow::Continue),
            "exit" | "quit" => return Ok(Flow::Exit),
            "help" => {
                self.app.print(HELP).await?;
                return Ok(Flow::Continue);
            }
            _ => {}
        }

        let words: Vec<&str> = line.split_whitespace().collect();
        if !GroupCommand::NAMES.contains(&words[0]) {
            self.app
                .eprint(&format!(
                    "unknown command: {} (type 'help' for available commands)\n",
                    words[0]
                ))
                .await?;
            return Ok(Flow::Continue);
        }

        let parsed = match ShellLine::try_parse_from(words.iter().copied()) {
            Ok(parsed) => parsed,
            Err(e) => {
                let rendered = e.render().to_string();
                match e.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => self.app.print(&rendered).await?,
                    _ => self.app.eprint(&rendered).await?,
                }
                return Ok(Flow::Continue);
            }
        };

        debug!(command = %parsed.command.path(), "dispatching");
        self.state = ShellState::Dispatching;
        let result = commands::execute(self.app, parsed.command).await;
        self.state = ShellState::Ready;

        if let Err(e) = result {
            self.app.eprint(&format!("Error: {e:#}\n")).await?;
        }
        Ok(Flow::Continue)
    }

    /// Release the connection and empty the registry.
    pub async fn close(&mut self) {
        self.app.registry.close_current().await;
        self.state = ShellState::Closed;
    }

    async fn obtain(&mut self, args: ShellArgs) -> Result<Connection> {
        let target = match &args.host {
            Some(identifier) => Some(self.resolve(identifier)?),
            None => None,
        };

        let wanted_host = target.as_ref().map(|(_, r)| r.host.as_str());
        let wanted_user = target
            .as_ref()
            .and_then(|(user, _)| user.as_deref())
            .or(args.username.as_deref());
        if let Some(conn) = self.restore(wanted_host, wanted_user).await {
            info!(host = %conn.host(), "reusing cached session");
            return Ok(conn);
        }

        let (target_user, resolved) = match target {
            Some(target) => target,
            None => {
                let Some(default) = self.app.config.default_target() else {
                    bail!("no session found and no hosts configured; run 'labsh login <host>' first");
                };
                self.app
                    .print(&format!("No active session. Using configured host: {default}\n"))
                    .await?;
                self.resolve(&default)?
            }
        };

        let user = target_user
            .or(args.username)
            .or(resolved.username)
            .context("username is required (specify with -u or set in config)")?;
        let host = resolved.host;

        let password = self
            .app
            .input
            .password(&format!("Password for {user}@{host}"))
            .await
            .context("read password")?;
        if password.is_empty() {
            bail!("password is required");
        }

        self.app
            .print(&format!("Connecting to {host} as {user}\n"))
            .await?;
        let conn = self
            .app
            .cache
            .open(&host, &user, &password)
            .await
            .context("failed to connect")?;

        if let Err(e) = self.app.cache.persist(&conn) {
            warn!("failed to save session: {e}");
            self.app
                .eprint(&format!("Warning: failed to save session: {e}\n"))
                .await?;
        }
        Ok(conn)
    }

    fn resolve(&self, identifier: &str) -> Result<(Option<String>, ResolvedHost)> {
        let (user, host) = parse_target(identifier)?;
        Ok((user, self.app.config.resolve_host(&host)))
    }

    /// The cached session, if there is a live one matching the host and user
    /// that were asked for. `None` for either matches anything.
    async fn restore(&mut self, wanted_host: Option<&str>, wanted_user: Option<&str>) -> Option<Connection> {
        if wanted_host.is_some() || wanted_user.is_some() {
            let Ok(record) = self.app.cache.metadata() else {
                return None;
            };
            let host_matches = wanted_host.map_or(true, |host| record.host == host);
            let user_matches = wanted_user.map_or(true, |user| record.user == user);
            if !(host_matches && user_matches) {
                debug!(
                    cached = %format!("{}@{}", record.user, record.host),
                    "cached session is for another account"
                );
                return None;
            }
        }

        match self.app.cache.restore().await {
            Ok(mut conn) => {
                if conn.probe().await {
                    Some(conn)
                } else {
                    conn.close().await;
                    None
                }
            }
            Err(e) => {
                debug!("no usable cached session: {e}");
                None
            }
        }
    }
}

/// Run `labsh shell` to completion.
pub async fn run(app: &mut App, args: ShellArgs) -> Result<()> {
    let mut shell = Shell::new(app);
    shell.connect(args).await?;
    let result = shell.run_loop().await;
    shell.close().await;
    result
}
