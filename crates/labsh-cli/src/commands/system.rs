//! `labsh self ...`: host-level operations that do not touch the cluster.

use anyhow::{Context, Result};
use clap::Subcommand;

use super::App;
use crate::output::{banner, section};

const SYSTEM_INFO: &str = "uname -a && lsb_release -a && lscpu";

#[derive(Subcommand, Debug)]
pub enum SystemCommand {
    /// Show remote OS, kernel, and hardware information
    Info,
}

impl SystemCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SystemCommand::Info => "info",
        }
    }
}

pub async fn run(app: &mut App, command: Option<SystemCommand>) -> Result<()> {
    match command {
        None => {
            let text = banner() + &section("SELF", "Use 'labsh self info' to inspect the server.");
            app.print(&text).await
        }
        Some(SystemCommand::Info) => {
            let output = app
                .registry
                .require()?
                .run(SYSTEM_INFO)
                .await
                .context("failed to fetch system info")?;
            app.print(&format!("Remote system information:\n{output}\n")).await
        }
    }
}
