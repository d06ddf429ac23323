// Command-line surface tests

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("prometheus-agents-setup").unwrap();
    cmd.env_remove("PROCESS_CPU_AGENT_URL");
    cmd
}

#[test]
fn test_help_lists_install_flags() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--source-url"))
        .stdout(predicate::str::contains("--exporter-version"))
        .stdout(predicate::str::contains("PROCESS_CPU_AGENT_URL"));
}

#[test]
fn test_short_help_exits_zero() {
    cli().arg("-h").assert().success();
}

#[test]
fn test_unknown_flag_is_usage_error() {
    cli()
        .arg("--no-such-flag")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("--no-such-flag"));
}

#[test]
fn test_version_flag() {
    cli()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with(format!(
            "prometheus-agents-setup v{}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_build_info_flag() {
    cli()
        .arg("--build-info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Target:"))
        .stdout(predicate::str::contains("Profile:"));
}

#[test]
fn test_invalid_settings_file_fails_before_installing() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("config.yaml");
    std::fs::write(&settings, "download: [not, a, map]\n").unwrap();

    cli()
        .arg("--config")
        .arg(&settings)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("✗ Setup failed"));
}

#[test]
fn test_missing_settings_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let settings = dir.path().join("absent.yaml");

    cli()
        .arg("--config")
        .arg(&settings)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("settings file"))
        .stderr(predicate::str::contains("not found"));
}
