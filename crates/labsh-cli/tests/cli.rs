//! End-to-end checks of the `labsh` binary that need no remote host.

use std::path::Path;

use assert_cmd::Command;

fn labsh(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("labsh").unwrap();
    cmd.env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join("config"))
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn help_lists_command_groups() {
    let home = tempfile::tempdir().unwrap();
    let output = labsh(home.path()).arg("--help").output().unwrap();
    assert!(output.status.success());

    let text = stdout(&output);
    for name in ["login", "shell", "config", "cluster", "diag", "self", "session"] {
        assert!(text.contains(name), "missing {name} in:\n{text}");
    }
}

#[test]
fn protected_command_without_login_fails() {
    let home = tempfile::tempdir().unwrap();
    let output = labsh(home.path()).args(["cluster", "info"]).output().unwrap();
    assert!(!output.status.success());

    let err = stderr(&output);
    assert!(err.contains("labsh: not connected to any server"), "{err}");
    assert!(err.contains("labsh login"), "{err}");
}

#[test]
fn login_requires_a_username() {
    let home = tempfile::tempdir().unwrap();
    let output = labsh(home.path())
        .args(["login", "example.com", "-p", "secret"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("username is required"));
}

#[test]
fn config_init_then_path() {
    let home = tempfile::tempdir().unwrap();
    let config = home.path().join("config").join("labsh").join("config.toml");

    let output = labsh(home.path()).args(["config", "path"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("Status: does not exist"));

    let output = labsh(home.path()).args(["config", "init"]).output().unwrap();
    assert!(output.status.success());
    assert!(config.exists());

    let output = labsh(home.path()).args(["config", "validate"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("2 hosts configured"));

    let output = labsh(home.path()).args(["config", "init"]).output().unwrap();
    assert!(!output.status.success());
}

#[test]
fn explicit_config_flag_is_honoured() {
    let home = tempfile::tempdir().unwrap();
    let custom = home.path().join("elsewhere.toml");

    let output = labsh(home.path())
        .args(["--config"])
        .arg(&custom)
        .args(["config", "init"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(custom.exists());
}

#[test]
fn session_commands_without_a_cached_session() {
    let home = tempfile::tempdir().unwrap();

    let output = labsh(home.path()).args(["session", "drop"]).output().unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("Cached session removed"));

    let output = labsh(home.path()).args(["session", "status"]).output().unwrap();
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unable to read cached session"));
}
