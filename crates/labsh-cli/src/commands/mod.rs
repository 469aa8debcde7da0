//! CLI subcommand implementations.
//!
//! Every handler is a plain async function over [`App`], so the one-shot CLI
//! and the interactive shell dispatch to exactly the same code.

pub mod cluster;
pub mod config_cmd;
pub mod diag;
pub mod login;
pub mod session;
pub mod system;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Subcommand;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use labsh_client::{CommandPath, LifecycleGate, SessionCache, SessionRegistry, SessionScope, SshDialer};
use labsh_core::{paths, KeyringVault, SessionRecordStore};

use crate::config::Config;
use crate::prompt::Input;

/// Where command output goes.
pub type Sink = Box<dyn AsyncWrite + Send + Unpin>;

/// Commands that do not need a live session before they run.
pub const SESSIONLESS_COMMANDS: &[&str] = &["shell", "session", "config"];

/// Command groups that operate on the current session. These are also the
/// closed set the interactive shell accepts.
#[derive(Subcommand, Debug)]
pub enum GroupCommand {
    /// Interact with the MicroK8s cluster on the current host
    Cluster {
        #[command(subcommand)]
        command: Option<cluster::ClusterCommand>,
    },

    /// Collect diagnostic bundles for troubleshooting
    Diag {
        #[command(subcommand)]
        command: Option<diag::DiagCommand>,
    },

    /// Run maintenance tasks directly on the server
    #[command(name = "self")]
    System {
        #[command(subcommand)]
        command: Option<system::SystemCommand>,
    },

    /// Inspect or remove the cached session
    Session {
        #[command(subcommand)]
        command: Option<session::SessionCommand>,
    },
}

impl GroupCommand {
    /// Names accepted as the first word of a shell line.
    pub const NAMES: &'static [&'static str] = &["cluster", "diag", "self", "session"];

    pub fn path(&self) -> CommandPath {
        let (group, sub) = match self {
            GroupCommand::Cluster { command } => ("cluster", command.as_ref().map(|c| c.name())),
            GroupCommand::Diag { command } => ("diag", command.as_ref().map(|c| c.name())),
            GroupCommand::System { command } => ("self", command.as_ref().map(|c| c.name())),
            GroupCommand::Session { command } => ("session", command.as_ref().map(|c| c.name())),
        };
        match sub {
            Some(sub) => CommandPath::child(group, sub),
            None => CommandPath::root(group),
        }
    }
}

/// Run one group command against `app`.
pub async fn execute(app: &mut App, command: GroupCommand) -> Result<()> {
    match command {
        GroupCommand::Cluster { command } => cluster::run(app, command).await,
        GroupCommand::Diag { command } => diag::run(app, command).await,
        GroupCommand::System { command } => system::run(app, command).await,
        GroupCommand::Session { command } => session::run(app, command).await,
    }
}

/// Everything a command handler can reach.
pub struct App {
    pub config: Config,
    pub config_path: PathBuf,
    pub cache: Arc<SessionCache>,
    pub registry: SessionRegistry,
    pub input: Input,
    pub out: Sink,
    pub err: Sink,
}

impl App {
    /// Wire up the OS keyring, the session file under `~/.labsh`, SSH, and
    /// the process's standard streams.
    pub fn new(config: Config, config_path: PathBuf) -> Result<Self> {
        let known_hosts = match &config.defaults.known_hosts {
            Some(path) => path.clone(),
            None => paths::known_hosts_path().context("cannot locate known_hosts")?,
        };
        let dialer = SshDialer::new(known_hosts)
            .with_timeout(config.connect_timeout())
            .accept_unknown_hosts(config.defaults.accept_unknown_hosts);
        let store = SessionRecordStore::default_location().context("cannot locate session store")?;
        let cache = SessionCache::new(Box::new(KeyringVault::default()), store, Arc::new(dialer))
            .with_ttl(config.session_ttl());

        Ok(Self::with_parts(
            config,
            config_path,
            Arc::new(cache),
            Input::stdin(),
            Box::new(tokio::io::stdout()),
            Box::new(tokio::io::stderr()),
        ))
    }

    pub fn with_parts(
        config: Config,
        config_path: PathBuf,
        cache: Arc<SessionCache>,
        input: Input,
        out: Sink,
        err: Sink,
    ) -> Self {
        Self {
            config,
            config_path,
            cache,
            registry: SessionRegistry::new(),
            input,
            out,
            err,
        }
    }

    /// The gate bracketing one-shot group commands.
    pub fn gate(&self) -> LifecycleGate {
        SESSIONLESS_COMMANDS
            .iter()
            .fold(LifecycleGate::new(self.cache.clone()), |gate, name| gate.exempt(*name))
    }

    pub async fn print(&mut self, text: &str) -> Result<()> {
        self.out.write_all(text.as_bytes()).await?;
        self.out.flush().await?;
        Ok(())
    }

    pub async fn eprint(&mut self, text: &str) -> Result<()> {
        self.err.write_all(text.as_bytes()).await?;
        self.err.flush().await?;
        Ok(())
    }
}

impl SessionScope for App {
    fn registry(&mut self) -> &mut SessionRegistry {
        &mut self.registry
    }
}
