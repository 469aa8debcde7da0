//! `labsh login [user@]host`: authenticate and cache the session.
//!
//! This is the bootstrap command: it runs outside the lifecycle gate, opens
//! a fresh connection, confirms it accepts channels, persists it, and
//! releases it again.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::Args;
use tracing::info;

use super::App;
use crate::config::parse_target;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Target in [user@]host format; host may be a configured alias
    pub target: String,

    /// Username (overrides config)
    #[arg(short, long)]
    pub username: Option<String>,

    /// Password (prompted for when omitted)
    #[arg(short, long)]
    pub password: Option<String>,
}

pub async fn run(app: &mut App, args: LoginArgs) -> Result<()> {
    let (target_user, identifier) = parse_target(&args.target)?;
    let resolved = app.config.resolve_host(&identifier);
    let user = target_user
        .or(args.username)
        .or(resolved.username)
        .context("username is required (use user@host, -u, or set defaults.username in config)")?;
    let host = resolved.host;

    let password = match args.password {
        Some(password) => password,
        None => app.input.password(&format!("Password for {user}@{host}")).await?,
    };
    if password.is_empty() {
        bail!("password is required");
    }

    app.print(&format!("Logging into {user}@{host} ...\n")).await?;
    let mut conn = app
        .cache
        .open(&host, &user, &password)
        .await
        .context("failed to log in")?;

    if !conn.probe().await {
        conn.close().await;
        bail!("{host} accepted the login but refused a session channel");
    }

    let persisted = app.cache.persist(&conn);
    conn.close().await;
    let record = persisted.context("failed to save session")?;

    info!(host = %host, user = %user, "login complete");
    let until = record.expires_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S");
    app.print(&format!("Login successful. Session cached until {until}.\n"))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::{Harness, HOST, SECRET, USER};
    use crate::config::HostEntry;
    use crate::prompt::Input;
    use labsh_client::mock::MockDialer;

    fn args(target: &str, username: Option<&str>, password: Option<&str>) -> LoginArgs {
        LoginArgs {
            target: target.into(),
            username: username.map(Into::into),
            password: password.map(Into::into),
        }
    }

    #[tokio::test]
    async fn login_persists_and_releases_the_connection() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted(Vec::<String>::new()));
        run(&mut h.app, args("admin@nas.lan", None, Some(SECRET)))
            .await
            .unwrap();

        let record = h.app.cache.metadata().unwrap();
        assert_eq!((record.host.as_str(), record.user.as_str()), (HOST, USER));
        assert_eq!(h.dialer.close_count(), 1);
        assert!(h.app.registry.is_empty());
        assert!(h.out.text().contains("Login successful"));
    }

    #[tokio::test]
    async fn login_without_username_fails_before_dialing() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted(Vec::<String>::new()));
        let err = run(&mut h.app, args(HOST, None, Some(SECRET))).await.unwrap_err();
        assert!(err.to_string().contains("username is required"));
        assert_eq!(h.dialer.dial_count(), 0);
    }

    #[tokio::test]
    async fn login_reads_password_from_input() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted([SECRET]));
        run(&mut h.app, args(HOST, Some(USER), None)).await.unwrap();
        assert!(h.app.cache.metadata().is_ok());
    }

    #[tokio::test]
    async fn login_resolves_alias_and_its_username() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted(Vec::<String>::new()));
        h.app.config.hosts.insert(
            "nas".into(),
            HostEntry {
                host: HOST.into(),
                username: Some(USER.into()),
            },
        );
        run(&mut h.app, args("nas", None, Some(SECRET))).await.unwrap();
        assert_eq!(h.app.cache.metadata().unwrap().host, HOST);
    }

    #[tokio::test]
    async fn target_user_wins_over_flag() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted(Vec::<String>::new()));
        run(&mut h.app, args("admin@nas.lan", Some("someone-else"), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(h.app.cache.metadata().unwrap().user, USER);
    }

    #[tokio::test]
    async fn wrong_password_is_reported_and_nothing_cached() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted(Vec::<String>::new()));
        let err = run(&mut h.app, args("admin@nas.lan", None, Some("nope")))
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("authentication failed for admin@nas.lan"));
        assert!(h.app.cache.metadata().unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn empty_password_is_rejected() {
        let mut h = Harness::new(MockDialer::new(), Input::scripted([""]));
        let err = run(&mut h.app, args("admin@nas.lan", None, None)).await.unwrap_err();
        assert!(err.to_string().contains("password is required"));
        assert_eq!(h.dialer.dial_count(), 0);
    }
}
