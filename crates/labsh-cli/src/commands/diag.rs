//! `labsh diag bundle`: collect a diagnostics tarball on the host.

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Args, Subcommand};
use tracing::info;

use super::App;
use crate::output::{banner, section};
use crate::quote::shell_quote;

#[derive(Subcommand, Debug)]
pub enum DiagCommand {
    /// Create a tarball with kubectl output and MicroK8s diagnostics
    Bundle(BundleArgs),
}

impl DiagCommand {
    pub fn name(&self) -> &'static str {
        match self {
            DiagCommand::Bundle(_) => "bundle",
        }
    }
}

#[derive(Args, Debug)]
pub struct BundleArgs {
    /// Where to store the bundle on the server (default: /tmp/labsh-diag-<timestamp>.tar.gz)
    #[arg(long)]
    pub remote_path: Option<String>,

    /// Stream the tarball to stdout (use with shell redirection)
    #[arg(long)]
    pub stdout: bool,
}

const BUNDLE_CONTENTS: &str = "\
Contents:
- kubectl get all -A -o yaml
- kubectl get events -A --sort-by=.lastTimestamp
- kubectl describe nodes
- journalctl -u 'snap.microk8s*' --since -2h
- microk8s inspect output";

pub async fn run(app: &mut App, command: Option<DiagCommand>) -> Result<()> {
    match command {
        None => {
            let text = banner() + &section("DIAG", "Use 'labsh diag bundle' to collect support artifacts.");
            app.print(&text).await
        }
        Some(DiagCommand::Bundle(args)) => bundle(app, args).await,
    }
}

async fn bundle(app: &mut App, args: BundleArgs) -> Result<()> {
    let remote_path = args
        .remote_path
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| format!("/tmp/labsh-diag-{}.tar.gz", Local::now().format("%Y%m%d-%H%M%S")));

    info!(path = %remote_path, "building diagnostic bundle");
    let result = app
        .registry
        .require()?
        .run(&bundle_script(&remote_path))
        .await
        .context("failed to build diagnostic bundle")?;
    let path = match result.trim() {
        "" => remote_path.as_str(),
        // The script echoes the path last; anything before it is chatter.
        printed => printed.lines().last().unwrap_or(printed).trim(),
    }
    .to_string();

    if args.stdout {
        app.eprint(&format!("Streaming diagnostic bundle from {path} ...\n")).await?;
        let conn = app.registry.require()?;
        conn.run_split(&format!("cat {}", shell_quote(&path)), &mut app.out, &mut app.err)
            .await
            .context("stream bundle")?;
        return Ok(());
    }

    let summary = format!("Created bundle at {path}\n{BUNDLE_CONTENTS}");
    app.print(&section("DIAGNOSTIC BUNDLE", &summary)).await?;
    app.print(&format!("\nRetrieve it later with: scp <host>:{path} ./\n")).await
}

/// Remote script that gathers everything into a tarball at `remote_path` and
/// prints that path.
pub fn bundle_script(remote_path: &str) -> String {
    let quoted = shell_quote(remote_path);
    format!(
        r#"set -euo pipefail
TMP_DIR=$(mktemp -d /tmp/labsh-diag-XXXXXX)
cleanup() {{ rm -rf "$TMP_DIR"; }}
trap cleanup EXIT
microk8s kubectl get all -A -o yaml > "$TMP_DIR/k8s-all.yaml"
microk8s kubectl get events -A --sort-by=.lastTimestamp > "$TMP_DIR/k8s-events.txt" || true
microk8s kubectl describe nodes > "$TMP_DIR/k8s-nodes.txt" || true
sudo journalctl -u 'snap.microk8s*' --since -2h > "$TMP_DIR/microk8s-journal.txt" || true
microk8s inspect > "$TMP_DIR/microk8s-inspect.txt" || true
mkdir -p "$(dirname {quoted})"
tar -czf {quoted} -C "$TMP_DIR" .
echo {quoted}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::Harness;
    use crate::prompt::Input;
    use labsh_client::mock::MockDialer;
    use labsh_client::ExecEvent;

    const PATH: &str = "/tmp/bundle.tar.gz";

    fn harness() -> Harness {
        let dialer = MockDialer::new()
            .respond(
                &bundle_script(PATH),
                vec![ExecEvent::Stdout(format!("{PATH}\n").into_bytes()), ExecEvent::Exit(0)],
            )
            .respond(
                "cat '/tmp/bundle.tar.gz'",
                vec![
                    ExecEvent::Stdout(b"\x1f\x8b tar".to_vec()),
                    ExecEvent::Exit(0),
                ],
            );
        Harness::new(dialer, Input::scripted(Vec::<String>::new()))
    }

    #[test]
    fn script_quotes_the_path_everywhere() {
        let script = bundle_script("/tmp/it's here.tar.gz");
        assert_eq!(script.matches(r"'/tmp/it'\''s here.tar.gz'").count(), 3);
        assert!(script.starts_with("set -euo pipefail\n"));
        assert!(script.contains("trap cleanup EXIT"));
    }

    #[tokio::test]
    async fn bundle_reports_where_it_was_written() {
        let mut h = harness();
        h.connect().await;
        let args = BundleArgs {
            remote_path: Some(PATH.into()),
            stdout: false,
        };
        run(&mut h.app, Some(DiagCommand::Bundle(args))).await.unwrap();

        let out = h.out.text();
        assert!(out.contains("| Created bundle at /tmp/bundle.tar.gz"));
        assert!(out.contains("scp <host>:/tmp/bundle.tar.gz ./"));
    }

    #[tokio::test]
    async fn bundle_streams_to_stdout_with_notice_on_stderr() {
        let mut h = harness();
        h.connect().await;
        let args = BundleArgs {
            remote_path: Some(PATH.into()),
            stdout: true,
        };
        run(&mut h.app, Some(DiagCommand::Bundle(args))).await.unwrap();

        assert!(h.err.text().contains("Streaming diagnostic bundle from /tmp/bundle.tar.gz"));
        assert_eq!(h.out.text(), String::from_utf8_lossy(b"\x1f\x8b tar"));
        assert!(!h.out.text().contains("DIAGNOSTIC BUNDLE"));
    }

    #[tokio::test]
    async fn bundle_failure_surfaces_remote_output() {
        let dialer = MockDialer::new().respond(
            &bundle_script(PATH),
            vec![
                ExecEvent::Stderr(b"microk8s: command not found\n".to_vec()),
                ExecEvent::Exit(127),
            ],
        );
        let mut h = Harness::new(dialer, Input::scripted(Vec::<String>::new()));
        h.connect().await;
        let args = BundleArgs {
            remote_path: Some(PATH.into()),
            stdout: false,
        };
        let err = run(&mut h.app, Some(DiagCommand::Bundle(args))).await.unwrap_err();
        let rendered = format!("{err:#}");
        assert!(rendered.contains("failed to build diagnostic bundle"));
        assert!(rendered.contains("microk8s: command not found"));
    }
}
