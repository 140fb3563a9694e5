use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use vigil_reconcile::HeartbeatFile;

fn vigil_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("vigil"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("RUST_LOG");
    cmd
}

fn write_config(home: &Path, yaml: &str) {
    let path = vigil_core::config::config_path_at(home);
    fs::create_dir_all(path.parent().expect("config dir")).expect("create config dir");
    fs::write(path, yaml).expect("write config");
}

#[test]
fn plan_prints_built_ins_and_configured_services_in_order() {
    let home = TempDir::new().expect("home");
    write_config(
        home.path(),
        r#"
services:
  - id: automod
    depends_on: [monitoring]
    command: /bin/sleep
    args: ["30"]
  - id: monitoring
    priority: high
    category: monitoring
    depends_on: [heartbeat]
    command: /bin/sleep
    args: ["30"]
"#,
    );

    let assert = vigil_cmd(home.path()).arg("plan").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let ids: Vec<&str> = stdout
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();
    assert_eq!(ids, ["heartbeat", "monitoring", "automod", "control"]);
}

#[test]
fn plan_json_lists_dependencies() {
    let home = TempDir::new().expect("home");
    let assert = vigil_cmd(home.path())
        .args(["plan", "--json"])
        .assert()
        .success();
    let plan: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("plan JSON");
    assert_eq!(plan[0]["id"], "heartbeat");
    assert_eq!(plan[1]["id"], "control");
    assert_eq!(plan[1]["depends_on"][0], "heartbeat");
}

#[test]
fn plan_with_cycle_fails_and_names_the_cycle() {
    let home = TempDir::new().expect("home");
    write_config(
        home.path(),
        r#"
control_socket: false
services:
  - id: y
    depends_on: [z]
    command: /bin/true
  - id: z
    depends_on: [y]
    command: /bin/true
"#,
    );

    vigil_cmd(home.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(contains("y -> z -> y"));
}

#[test]
fn malformed_config_fails_with_path() {
    let home = TempDir::new().expect("home");
    write_config(home.path(), "services: [not, a, service");

    vigil_cmd(home.path())
        .arg("plan")
        .assert()
        .failure()
        .stderr(contains("config.yaml"));
}

#[test]
fn status_and_stop_report_not_running() {
    let home = TempDir::new().expect("home");

    vigil_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("vigil is not running"));

    vigil_cmd(home.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(contains(r#""running": false"#));

    vigil_cmd(home.path())
        .arg("stop")
        .assert()
        .success()
        .stdout(contains("vigil is not running"));
}

#[test]
fn heartbeat_reports_never_then_recent() {
    let home = TempDir::new().expect("home");

    vigil_cmd(home.path())
        .arg("heartbeat")
        .assert()
        .success()
        .stdout(contains("never").and(contains("resynchronize")));

    HeartbeatFile::open_at(home.path())
        .write(chrono::Utc::now())
        .expect("write heartbeat");

    let assert = vigil_cmd(home.path())
        .args(["heartbeat", "--json"])
        .assert()
        .success();
    let payload: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("heartbeat JSON");
    assert_eq!(payload["requires_resync"], false);
    assert_eq!(payload["threshold_secs"], 1800);
}
