use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write_fake_rc_script(path: &Path, pid_file: &Path) {
    let script = format!(
        r#"#!/usr/bin/env bash
set -euo pipefail

case "${{1:-}}" in
  start|restart)
    echo "$PPID" > "{pid}"
    echo "started"
    ;;
  stop)
    rm -f "{pid}"
    echo "stopped"
    ;;
  *)
    exit 3
    ;;
esac
"#,
        pid = pid_file.display()
    );
    fs::write(path, script).expect("write fake rc script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("chmod");
    }
}

fn setup() -> (tempfile::TempDir, PathBuf, PathBuf) {
    let tmp = tempdir().expect("tempdir");
    let pid_file = tmp.path().join("daemon.pid");
    let script = tmp.path().join("rc.cache-tier");
    write_fake_rc_script(&script, &pid_file);
    (tmp, pid_file, script)
}

fn cache_tier(home: &Path, script: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cache-tier");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("TIER_HOME", home)
        .env("TIER_SERVICE_CMD", script)
        .env("TIER_SERVICE_SETTLE_MS", "0");
    cmd
}

#[cfg(unix)]
#[test]
fn start_then_stop_reports_status_after_settle() {
    let (tmp, pid_file, script) = setup();

    let out = cache_tier(tmp.path(), &script)
        .args(["--json", "service", "start"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).expect("json");
    assert_eq!(report["command"], "service-start");
    assert_eq!(report["data"]["output"], "started");
    assert_eq!(report["data"]["probe"]["status"], "running");
    assert!(pid_file.exists());

    cache_tier(tmp.path(), &script)
        .args(["service", "stop"])
        .assert()
        .success()
        .stdout(contains("service=stopped"));
    assert!(!pid_file.exists());

    let audit = fs::read_to_string(tmp.path().join("logs/audit.log")).expect("audit");
    assert!(audit.contains("\"phase\":\"service\""));
}

#[cfg(unix)]
#[test]
fn status_treats_stale_pid_as_stopped() {
    let (tmp, pid_file, script) = setup();
    fs::write(&pid_file, "999999999\n").expect("stale pid");

    cache_tier(tmp.path(), &script)
        .arg("status")
        .env("TIER_CACHE_ROOT", tmp.path())
        .env("TIER_ARRAY_ROOT", "/nonexistent-array-root")
        .assert()
        .code(2)
        .stdout(contains("service=stopped"))
        .stdout(contains("service.pid=999999999"))
        .stdout(contains("env.TIER_SERVICE_CMD=set"))
        .stdout(contains("array root missing"));
}

#[test]
fn missing_service_command_is_reported_as_issue() {
    let tmp = tempdir().expect("tempdir");
    assert_cmd::cargo::cargo_bin_cmd!("cache-tier")
        .current_dir(tmp.path())
        .env("HOME", tmp.path())
        .env("TIER_HOME", tmp.path())
        .env_remove("TIER_SERVICE_CMD")
        .args(["service", "restart"])
        .assert()
        .code(2)
        .stdout(contains("no service command configured"));
}
