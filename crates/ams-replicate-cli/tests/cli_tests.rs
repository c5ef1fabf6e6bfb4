//! End-to-end checks of the CLI surface: argument parsing, help output and
//! the exit codes of the configuration error paths. Anything touching the
//! network stays in the library's unit tests.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn cmd() -> Command {
    Command::cargo_bin("ams-replicate").unwrap()
}

/// Run `health-check` against the given config text, with logs routed to a
/// scratch directory.
fn health_check_with_config(yaml: &str) -> assert_cmd::assert::Assert {
    let log_dir = tempfile::tempdir().unwrap();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap()])
        .args(["--log-dir", log_dir.path().to_str().unwrap()])
        .arg("health-check")
        .assert()
}

/// Parses fine but fails validation: source.tenant_id is empty.
const UNVALIDATABLE_CONFIG: &str = r#"
source:
  tenant_id: ""
  client_id: c1
  client_secret: s1
  subscription_id: sub1
  resource_group: rg1
  account_name: mediasrc
  location: westeurope
  storage_account_name: storagesrc
  storage_account_key: a2V5MQ==
destination:
  tenant_id: t2
  client_id: c2
  client_secret: s2
  subscription_id: sub2
  resource_group: rg2
  account_name: mediadst
  location: northeurope
  storage_account_name: storagedst
  storage_account_key: a2V5Mg==
"#;

#[test]
fn test_help_lists_commands_and_global_flags() {
    let expected = [
        "run",
        "health-check",
        "--output-json",
        "--log-format",
        "--verbosity",
        "--log-dir",
        "[default: config.yaml]",
        "[default: text]",
        "[default: info]",
        "[default: logs]",
    ];

    let mut assert = cmd().arg("--help").assert().success();
    for needle in expected {
        assert = assert.stdout(predicate::str::contains(needle));
    }
}

#[test]
fn test_run_help_shows_dry_run() {
    cmd()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ams-replicate"));
}

#[test]
fn test_short_config_flag_accepted() {
    cmd().args(["-c", "some_config.yaml", "--help"]).assert().success();
}

#[test]
fn test_no_subcommand_is_a_usage_error() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_missing_config_file_is_an_io_error() {
    let log_dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["--config", "no_such_config.yaml"])
        .args(["--log-dir", log_dir.path().to_str().unwrap()])
        .arg("health-check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_unparsable_yaml_exits_nonzero() {
    health_check_with_config("source: [not, a, mapping")
        .code(1)
        .stderr(predicate::str::contains("YAML"));
}

#[test]
fn test_validation_failure_uses_config_exit_code() {
    health_check_with_config(UNVALIDATABLE_CONFIG)
        .code(2)
        .stderr(predicate::str::contains("tenant_id"));
}
