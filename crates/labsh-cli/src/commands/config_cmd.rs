//! `labsh config [show|validate|init|path]`.

use anyhow::{bail, Context, Result};
use clap::Subcommand;

use super::App;
use crate::config::Config;
use crate::output::{banner, section};

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display the current configuration
    Show,

    /// Validate the configuration file
    Validate,

    /// Create a sample configuration file
    Init,

    /// Show the configuration file path
    Path,
}

pub async fn run(app: &mut App, command: Option<ConfigCommand>) -> Result<()> {
    let mut text = banner();
    let path = app.config_path.display().to_string();

    match command {
        None => {
            text += &section(
                "CONFIG",
                "Use 'labsh config show', 'labsh config validate', or 'labsh config init'",
            );
        }
        Some(ConfigCommand::Show) => {
            let rendered = toml::to_string_pretty(&app.config).context("failed to serialize config")?;
            text += &section("CONFIGURATION", &format!("Configuration file: {path}\n\n{rendered}"));
        }
        Some(ConfigCommand::Validate) => {
            if !app.config_path.exists() {
                text += &section(
                    "VALIDATION",
                    &format!("No config file found at {path}\nRun 'labsh config init' to create one."),
                );
            } else if let Err(e) = app.config.validate() {
                text += &section("VALIDATION FAILED", &e.to_string());
                app.print(&text).await?;
                bail!("config validation failed");
            } else {
                text += &section(
                    "VALIDATION SUCCESS",
                    &format!(
                        "Configuration is valid\n{} hosts configured\n{} groups defined",
                        app.config.hosts.len(),
                        app.config.groups.len()
                    ),
                );
            }
        }
        Some(ConfigCommand::Init) => {
            Config::write_sample(&app.config_path)?;
            text += &section(
                "CONFIG INITIALIZED",
                &format!("Created sample configuration at:\n{path}\n\nEdit this file to add your hosts and preferences."),
            );
        }
        Some(ConfigCommand::Path) => {
            let exists = if app.config_path.exists() { "exists" } else { "does not exist" };
            text += &section("CONFIG PATH", &format!("{path}\nStatus: {exists}"));
        }
    }

    app.print(&text).await
}
