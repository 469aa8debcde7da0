//! labsh — homelab shell.
//!
//! Logs into one remote administrative host over SSH, caches that session,
//! and runs curated maintenance workflows against it, either one command at
//! a time or from an interactive shell that keeps the connection open.

mod commands;
mod config;
mod output;
mod prompt;
mod quote;
mod shell;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use crate::commands::{App, GroupCommand};
use crate::config::Config;

/// labsh — homelab shell
#[derive(Parser)]
#[command(
    name = "labsh",
    version,
    about = "Homelab server management over cached SSH sessions"
)]
struct Cli {
    /// Config file path
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authenticate to a host and cache the session
    Login(commands::login::LoginArgs),

    /// Open an interactive labsh command shell
    Shell(shell::ShellArgs),

    /// Manage labsh configuration
    Config {
        #[command(subcommand)]
        command: Option<commands::config_cmd::ConfigCommand>,
    },

    #[command(flatten)]
    Group(GroupCommand),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with streamed output.
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("labsh=debug,labsh_cli=debug,labsh_client=debug,labsh_core=debug")
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("labsh=warn,labsh_cli=warn")
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        eprintln!("labsh: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let config = Config::load(&config_path)?;
    let mut app = App::new(config, config_path)?;

    match cli.command {
        Command::Login(args) => commands::login::run(&mut app, args).await,
        Command::Shell(args) => shell::run(&mut app, args).await,
        Command::Config { command } => commands::config_cmd::run(&mut app, command).await,
        Command::Group(group) => {
            let gate = app.gate();
            let path = group.path();
            gate.guard(&mut app, &path, move |app| Box::pin(commands::execute(app, group)))
                .await
        }
    }
}
