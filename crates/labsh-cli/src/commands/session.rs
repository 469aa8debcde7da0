//! `labsh session [status|drop]`: inspect or discard the cached session.

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use clap::Subcommand;
use tracing::debug;

use super::App;
use crate::output::{banner, format_ttl, section};

#[derive(Subcommand, Debug)]
pub enum SessionCommand {
    /// Display cached session host, user, TTL, and connectivity
    Status {
        /// Drop the cached session after showing its details
        #[arg(long)]
        drop: bool,
    },

    /// Delete the cached session and its stored password
    Drop,
}

impl SessionCommand {
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::Status { .. } => "status",
            SessionCommand::Drop => "drop",
        }
    }
}

pub async fn run(app: &mut App, command: Option<SessionCommand>) -> Result<()> {
    match command {
        None => status(app, false).await,
        Some(SessionCommand::Status { drop }) => status(app, drop).await,
        Some(SessionCommand::Drop) => {
            app.print(&banner()).await?;
            drop_session(app)?;
            app.print(&section(
                "SESSION DROP",
                "Cached session removed. Run 'labsh login' to create a new one.",
            ))
            .await
        }
    }
}

async fn status(app: &mut App, then_drop: bool) -> Result<()> {
    app.print(&banner()).await?;

    let record = app
        .cache
        .metadata()
        .context("unable to read cached session")?;
    let connectivity = connectivity(app).await;

    let body = format!(
        "Host          : {}\n\
         User          : {}\n\
         Expires At    : {}\n\
         TTL Remaining : {}\n\
         Connectivity  : {connectivity}",
        record.host,
        record.user,
        record.expires_at.with_timezone(&Local).to_rfc2822(),
        format_ttl(record.remaining_at(Utc::now())),
    );
    app.print(&section("SESSION STATUS", &body)).await?;

    if then_drop {
        drop_session(app)?;
        app.print(&section("SESSION DROP", "Removed cached credentials and session file."))
            .await?;
    }
    Ok(())
}

/// `connected`, `disconnected`, or `unavailable (<reason>)`.
///
/// Inside the interactive shell the live connection is probed; otherwise the
/// cached session is restored just long enough to probe it.
async fn connectivity(app: &mut App) -> String {
    if let Some(conn) = app.registry.get_mut() {
        debug!("probing live connection");
        return label(conn.probe().await);
    }

    match app.cache.restore().await {
        Ok(mut conn) => {
            let alive = conn.probe().await;
            conn.close().await;
            label(alive)
        }
        Err(e) => format!("unavailable ({e})"),
    }
}

fn label(alive: bool) -> String {
    if alive { "connected" } else { "disconnected" }.to_string()
}

fn drop_session(app: &App) -> Result<()> {
    app.cache.drop_session().context("delete cached session")
}
