//! `labsh cluster ...`: MicroK8s workflows on the current host.

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Args, Subcommand, ValueEnum};
use serde::Deserialize;
use tracing::{debug, info};

use labsh_client::Connection;

use super::App;
use crate::output::{banner, section};
use crate::quote::{join_command, shell_quote};

const ETCD_BACKUP_DIR: &str = "/var/snap/microk8s/common/var/backup";
const WAIT_READY: &str = "microk8s status --wait-ready";

#[derive(Subcommand, Debug)]
pub enum ClusterCommand {
    /// Dump Kubernetes cluster diagnostics
    Info,

    /// Summarize MicroK8s readiness and control-plane health
    Status,

    /// Inspect pods, resource usage, and CrashLoopBackOff logs
    Workloads(WorkloadsArgs),

    /// Create or list Velero/etcd snapshots
    Backup(BackupArgs),

    /// Restart a MicroK8s addon or snap service
    Restart(RestartArgs),
}

impl ClusterCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ClusterCommand::Info => "info",
            ClusterCommand::Status => "status",
            ClusterCommand::Workloads(_) => "workloads",
            ClusterCommand::Backup(_) => "backup",
            ClusterCommand::Restart(_) => "restart",
        }
    }
}

#[derive(Args, Debug)]
pub struct WorkloadsArgs {
    /// Namespace to scope workload checks (default: all)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Label selector to filter pods (e.g. app=web)
    #[arg(short = 'l', long)]
    pub selector: Option<String>,

    /// Maximum number of CrashLoopBackOff pods to inspect
    #[arg(long, default_value_t = 5)]
    pub max_crash_pods: usize,

    /// Log lines to fetch for each CrashLoopBackOff pod
    #[arg(long, default_value_t = 20)]
    pub logs_tail: usize,
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// List existing backups instead of creating new ones
    #[arg(long)]
    pub list: bool,

    /// Name for the Velero backup (default: labsh-<timestamp>)
    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub skip_velero: bool,

    #[arg(long)]
    pub skip_etcd: bool,
}

#[derive(Args, Debug)]
pub struct RestartArgs {
    /// Addon or service name
    pub target: String,

    #[arg(long = "type", value_enum, default_value_t = RestartKind::Addon)]
    pub kind: RestartKind,

    /// Wait for MicroK8s to report ready after restarting an addon
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub wait: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartKind {
    Addon,
    Service,
}

pub async fn run(app: &mut App, command: Option<ClusterCommand>) -> Result<()> {
    match command {
        None => {
            let text = banner() + &section("CLUSTER", "Use subcommands such as 'labsh cluster info'");
            app.print(&text).await
        }
        Some(ClusterCommand::Info) => info(app).await,
        Some(ClusterCommand::Status) => status(app).await,
        Some(ClusterCommand::Workloads(args)) => workloads(app, args).await,
        Some(ClusterCommand::Backup(args)) => backup(app, args).await,
        Some(ClusterCommand::Restart(args)) => restart(app, args).await,
    }
}

async fn info(app: &mut App) -> Result<()> {
    let output = app
        .registry
        .require()?
        .run("kubectl cluster-info dump")
        .await
        .context("failed to run command")?;
    app.print(&section("CLUSTER INFO", &output)).await
}

async fn status(app: &mut App) -> Result<()> {
    let steps = [
        ("MICROK8S STATUS", WAIT_READY),
        ("NODES", "microk8s kubectl get nodes -o wide"),
        ("COMPONENT HEALTH", "microk8s kubectl get componentstatuses"),
    ];

    for (title, command) in steps {
        let output = app
            .registry
            .require()?
            .run(command)
            .await
            .with_context(|| format!("{} failed", title.to_lowercase()))?;
        app.print(&section(title, &output)).await?;
    }
    Ok(())
}

async fn workloads(app: &mut App, args: WorkloadsArgs) -> Result<()> {
    let ns = namespace_arg(args.namespace.as_deref());
    let selector = selector_arg(args.selector.as_deref());
    let max_pods = if args.max_crash_pods == 0 { 5 } else { args.max_crash_pods };
    let tail = if args.logs_tail == 0 { 20 } else { args.logs_tail };

    let non_running = join_command(&[
        "microk8s kubectl get pods",
        ns.as_str(),
        selector.as_str(),
        "--field-selector=status.phase!=Running,status.phase!=Succeeded",
        "--sort-by=.status.containerStatuses[0].restartCount",
    ]);
    let output = app
        .registry
        .require()?
        .run(&non_running)
        .await
        .context("list non-running pods")?;
    app.print(&section("NON-RUNNING PODS", &output)).await?;

    let top = join_command(&["microk8s kubectl top pods", ns.as_str(), selector.as_str()]);
    let usage = match app.registry.require()?.run(&top).await {
        Ok(output) => output,
        Err(e) => format!("kubectl top pods failed: {e}"),
    };
    app.print(&section("POD RESOURCE USAGE", &usage)).await?;

    let crash_pods = match crash_loop_pods(app.registry.require()?, &ns, &selector, max_pods).await {
        Ok(pods) => pods,
        Err(e) => {
            let body = format!("failed to discover CrashLoopBackOff pods: {e:#}");
            return app.print(&section("CRASHLOOP PODS", &body)).await;
        }
    };
    if crash_pods.is_empty() {
        return app
            .print(&section("CRASHLOOP PODS", "No pods currently in CrashLoopBackOff."))
            .await;
    }

    let listing: Vec<String> = crash_pods.iter().map(PodRef::to_string).collect();
    app.print(&section("CRASHLOOP PODS", &listing.join("\n"))).await?;

    app.print("===== CRASHLOOP LOGS =====\n").await?;
    for pod in &crash_pods {
        app.print(&format!("--- {pod} ---\n")).await?;
        let logs = join_command(&[
            "microk8s kubectl logs".to_string(),
            format!("-n {}", shell_quote(&pod.namespace)),
            shell_quote(&pod.name),
            "--all-containers".to_string(),
            format!("--tail={tail}"),
        ]);
        let conn = app.registry.require()?;
        if let Err(e) = conn.run_stream(&logs, &mut app.out).await {
            app.print(&format!("failed to fetch logs: {e}\n")).await?;
        }
        app.print("\n").await?;
    }
    Ok(())
}

async fn backup(app: &mut App, args: BackupArgs) -> Result<()> {
    if args.list {
        return backup_inventory(app).await;
    }
    if args.skip_velero && args.skip_etcd {
        bail!("nothing to do: both Velero and etcd backups are disabled");
    }

    let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();

    if !args.skip_velero {
        let name = args.name.unwrap_or_else(|| format!("labsh-{stamp}"));
        info!(backup = %name, "creating velero backup");
        let command = format!("microk8s velero create backup {} --ttl 720h", shell_quote(&name));
        let output = app
            .registry
            .require()?
            .run(&command)
            .await
            .context("velero backup failed")?;
        app.print(&section("VELERO BACKUP", &output)).await?;
    }

    if !args.skip_etcd {
        let snapshot = format!("{ETCD_BACKUP_DIR}/labsh-etcd-{stamp}.db");
        let command = format!(
            "sudo mkdir -p {ETCD_BACKUP_DIR} && sudo microk8s etcd snapshot save {}",
            shell_quote(&snapshot)
        );
        let output = app
            .registry
            .require()?
            .run(&command)
            .await
            .context("etcd snapshot failed")?;
        let body = format!("{}\nSaved to: {snapshot}", output.trim_end());
        app.print(&section("ETCD SNAPSHOT", &body)).await?;
    }
    Ok(())
}

async fn backup_inventory(app: &mut App) -> Result<()> {
    let velero = match app.registry.require()?.run("microk8s velero backup get").await {
        Ok(output) => output,
        Err(e) => format!("velero backup listing failed: {e}"),
    };
    app.print(&section("VELERO BACKUPS", &velero)).await?;

    let etcd = match app.registry.require()?.run("sudo microk8s etcd snapshot list").await {
        Ok(output) => output,
        Err(e) => format!("etcd snapshot listing failed: {e}"),
    };
    app.print(&section("ETCD SNAPSHOTS", &etcd)).await
}

async fn restart(app: &mut App, args: RestartArgs) -> Result<()> {
    let target = shell_quote(&args.target);
    let command = match args.kind {
        RestartKind::Addon => format!("sudo microk8s disable {target} && sudo microk8s enable {target}"),
        RestartKind::Service => format!("sudo systemctl restart {target}"),
    };
    let kind = match args.kind {
        RestartKind::Addon => "addon",
        RestartKind::Service => "service",
    };

    debug!(target = %args.target, kind, "restarting");
    app.registry
        .require()?
        .run(&command)
        .await
        .context("restart failed")?;
    app.print(&section(
        "RESTART",
        &format!("Successfully restarted {} ({kind})", args.target),
    ))
    .await?;

    if args.wait && args.kind == RestartKind::Addon {
        let status = app
            .registry
            .require()?
            .run(WAIT_READY)
            .await
            .context("microk8s did not become ready")?;
        app.print(&section("MICROK8S STATUS", &status)).await?;
    }
    Ok(())
}

fn namespace_arg(namespace: Option<&str>) -> String {
    match namespace.filter(|n| !n.is_empty()) {
        Some(ns) => format!("-n {}", shell_quote(ns)),
        None => "-A".into(),
    }
}

fn selector_arg(selector: Option<&str>) -> String {
    match selector.filter(|s| !s.is_empty()) {
        Some(sel) => format!("--selector={}", shell_quote(sel)),
        None => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PodRef {
    namespace: String,
    name: String,
}

impl std::fmt::Display for PodRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// The slice of `kubectl get pods -o json` needed to spot crash loops.

#[derive(Deserialize, Default)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Deserialize, Default)]
struct Pod {
    #[serde(default)]
    metadata: PodMeta,
    #[serde(default)]
    status: PodStatus,
}

#[derive(Deserialize, Default)]
struct PodMeta {
    #[serde(default)]
    namespace: String,
    #[serde(default)]
    name: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Deserialize, Default)]
struct ContainerStatus {
    #[serde(default)]
    state: ContainerState,
}

#[derive(Deserialize, Default)]
struct ContainerState {
    waiting: Option<Waiting>,
}

#[derive(Deserialize, Default)]
struct Waiting {
    #[serde(default)]
    reason: String,
}

async fn crash_loop_pods(conn: &mut Connection, ns: &str, selector: &str, limit: usize) -> Result<Vec<PodRef>> {
    let command = join_command(&["microk8s kubectl get pods", ns, selector, "-o json"]) + " 2>/dev/null";
    let raw = conn.run(&command).await?;
    parse_crash_loop_pods(&raw, limit)
}

fn parse_crash_loop_pods(raw: &str, limit: usize) -> Result<Vec<PodRef>> {
    let list: PodList = serde_json::from_str(raw).context("parse kubectl json")?;
    Ok(list
        .items
        .into_iter()
        .filter(|pod| {
            pod.status.container_statuses.iter().any(|cs| {
                cs.state
                    .waiting
                    .as_ref()
                    .is_some_and(|w| w.reason == "CrashLoopBackOff")
            })
        })
        .map(|pod| PodRef {
            namespace: pod.metadata.namespace,
            name: pod.metadata.name,
        })
        .take(limit)
        .collect())
}
