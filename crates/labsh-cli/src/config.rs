//! Client configuration at `~/.labsh/config.toml`.
//!
//! Holds connection defaults, host aliases, and alias groups. A missing file
//! means defaults; CLI flags always override config values.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use labsh_core::paths::{self, APP_NAME};

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub defaults: Defaults,

    /// Host aliases, keyed by alias.
    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,

    /// Named lists of host aliases.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Vec<String>>,
}

/// Default connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Defaults {
    /// Username when neither the target nor `-u` names one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Alias or address `labsh shell` connects to when given none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// OpenSSH known_hosts file (default `~/.ssh/known_hosts`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_hosts: Option<PathBuf>,

    /// Trust hosts missing from known_hosts. Changed keys are still rejected.
    #[serde(default)]
    pub accept_unknown_hosts: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            username: None,
            host: None,
            connect_timeout_secs: default_connect_timeout(),
            session_ttl_secs: default_session_ttl(),
            known_hosts: None,
            accept_unknown_hosts: false,
        }
    }
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_session_ttl() -> u64 {
    60 * 60
}

/// One `[hosts.<alias>]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEntry {
    #[serde(default)]
    pub host: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Address and username a host identifier resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub host: String,
    pub username: Option<String>,
}

const SAMPLE_CONFIG: &str = r#"# labsh configuration

[defaults]
username = "ubuntu"
connect_timeout_secs = 30
session_ttl_secs = 3600
# known_hosts = "/home/me/.ssh/known_hosts"
# accept_unknown_hosts = false
# host = "homelab-prod"

[hosts.homelab-prod]
host = "192.168.1.10"
username = "admin"

[hosts.k8s-master]
host = "192.168.1.20"
username = "ubuntu"

[groups]
production = ["homelab-prod", "k8s-master"]
"#;

impl Config {
    /// `$XDG_CONFIG_HOME/labsh/config.toml`, else `~/.labsh/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            return Ok(PathBuf::from(xdg).join(APP_NAME).join("config.toml"));
        }
        Ok(paths::state_dir()
            .context("cannot determine config location")?
            .join("config.toml"))
    }

    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), hosts = config.hosts.len(), "loaded config");
        Ok(config)
    }

    /// Map an alias to its address and username. Anything that is not an
    /// alias is taken as a literal address.
    pub fn resolve_host(&self, identifier: &str) -> ResolvedHost {
        match self.hosts.get(identifier) {
            Some(entry) => ResolvedHost {
                host: entry.host.clone(),
                username: entry
                    .username
                    .clone()
                    .or_else(|| self.defaults.username.clone()),
            },
            None => ResolvedHost {
                host: identifier.to_string(),
                username: self.defaults.username.clone(),
            },
        }
    }

    /// The configured default host, else the first alias in sorted order.
    pub fn default_target(&self) -> Option<String> {
        self.defaults
            .host
            .clone()
            .or_else(|| self.hosts.keys().next().cloned())
    }

    pub fn validate(&self) -> Result<()> {
        for (alias, entry) in &self.hosts {
            if entry.host.trim().is_empty() {
                bail!("host '{alias}' missing required 'host' field");
            }
        }
        for (group, members) in &self.groups {
            for member in members {
                if !self.hosts.contains_key(member) {
                    bail!("group '{group}' references undefined host '{member}'");
                }
            }
        }
        if let Some(default) = &self.defaults.host {
            if default.trim().is_empty() {
                bail!("defaults.host is set but empty");
            }
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.connect_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.defaults.session_ttl_secs)
    }

    /// Write a commented sample config. Refuses to overwrite.
    pub fn write_sample(path: &Path) -> Result<()> {
        if path.exists() {
            bail!("config file already exists at {}", path.display());
        }
        if let Some(parent) = path.parent() {
            paths::ensure_private_dir(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(path, SAMPLE_CONFIG)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }
}

/// Split a `[user@]host` target into its optional user and its host.
pub fn parse_target(target: &str) -> Result<(Option<String>, String)> {
    if let Some((user, host)) = target.split_once('@') {
        if user.is_empty() {
            bail!("empty username in target '{target}'");
        }
        if host.is_empty() {
            bail!("empty host in target '{target}'");
        }
        Ok((Some(user.to_string()), host.to_string()))
    } else {
        if target.is_empty() {
            bail!("empty host");
        }
        Ok((None, target.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        toml::from_str(SAMPLE_CONFIG).unwrap()
    }

    #[test]
    fn parse_user_at_host() {
        let (user, host) = parse_target("alice@example.com").unwrap();
        assert_eq!(user.as_deref(), Some("alice"));
        assert_eq!(host, "example.com");
    }

    #[test]
    fn parse_host_only() {
        let (user, host) = parse_target("homelab-prod").unwrap();
        assert!(user.is_none());
        assert_eq!(host, "homelab-prod");
    }

    #[test]
    fn parse_empty_parts_fail() {
        assert!(parse_target("@example.com").is_err());
        assert!(parse_target("alice@").is_err());
        assert!(parse_target("").is_err());
    }

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.defaults.connect_timeout_secs, 30);
        assert_eq!(cfg.session_ttl(), Duration::from_secs(3600));
        assert!(!cfg.defaults.accept_unknown_hosts);
        assert!(cfg.hosts.is_empty());
        assert!(cfg.default_target().is_none());
    }

    #[test]
    fn sample_config_parses_and_validates() {
        let cfg = sample();
        cfg.validate().unwrap();
        assert_eq!(cfg.hosts.len(), 2);
        assert_eq!(cfg.groups["production"].len(), 2);
        assert_eq!(cfg.defaults.username.as_deref(), Some("ubuntu"));
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg: Config = toml::from_str(
            r#"
[defaults]
username = "pi"
"#,
        )
        .unwrap();
        assert_eq!(cfg.defaults.username.as_deref(), Some("pi"));
        assert_eq!(cfg.defaults.connect_timeout_secs, 30);
        assert_eq!(cfg.defaults.session_ttl_secs, 3600);
    }

    #[test]
    fn resolve_alias_uses_entry_then_default_username() {
        let mut cfg = sample();
        let prod = cfg.resolve_host("homelab-prod");
        assert_eq!(prod.host, "192.168.1.10");
        assert_eq!(prod.username.as_deref(), Some("admin"));

        cfg.hosts.get_mut("k8s-master").unwrap().username = None;
        let master = cfg.resolve_host("k8s-master");
        assert_eq!(master.host, "192.168.1.20");
        assert_eq!(master.username.as_deref(), Some("ubuntu"));
    }

    #[test]
    fn resolve_unknown_identifier_is_literal() {
        let resolved = sample().resolve_host("10.0.0.7");
        assert_eq!(resolved.host, "10.0.0.7");
        assert_eq!(resolved.username.as_deref(), Some("ubuntu"));
    }

    #[test]
    fn default_target_prefers_explicit_default() {
        let mut cfg = sample();
        assert_eq!(cfg.default_target().as_deref(), Some("homelab-prod"));
        cfg.defaults.host = Some("k8s-master".into());
        assert_eq!(cfg.default_target().as_deref(), Some("k8s-master"));
    }

    #[test]
    fn validate_rejects_missing_host_field() {
        let cfg: Config = toml::from_str(
            r#"
[hosts.broken]
username = "root"
"#,
        )
        .unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("'broken'"), "{err}");
    }

    #[test]
    fn validate_rejects_undefined_group_member() {
        let mut cfg = sample();
        cfg.groups.insert("staging".into(), vec!["staging-01".into()]);
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("staging-01"), "{err}");
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let cfg = Config::load(&tmp.path().join("absent.toml")).unwrap();
        assert!(cfg.hosts.is_empty());
    }

    #[test]
    fn load_malformed_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "[defaults\nusername = 1").unwrap();
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn write_sample_then_refuse_overwrite() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("labsh").join("config.toml");
        Config::write_sample(&path).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.hosts.len(), 2);

        let err = Config::write_sample(&path).unwrap_err().to_string();
        assert!(err.contains("already exists"));
    }

    #[cfg(unix)]
    #[test]
    fn write_sample_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("labsh").join("config.toml");
        Config::write_sample(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let cfg = sample();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.hosts.len(), cfg.hosts.len());
        assert_eq!(back.defaults.username, cfg.defaults.username);
    }
}
