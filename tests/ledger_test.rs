use predicates::str::contains;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn cache_tier(home: &Path) -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("cache-tier");
    cmd.current_dir(home).env("HOME", home).env("TIER_HOME", home);
    cmd
}

#[test]
fn add_list_remove_round_trip() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();

    cache_tier(home)
        .args(["ledger", "add", "/mnt/cache/Movies/A.mkv", "--at", "1700000000"])
        .assert()
        .success()
        .stdout(contains("added=/mnt/cache/Movies/A.mkv"));
    cache_tier(home)
        .args(["ledger", "add", "/mnt/cache/Movies/A.mkv", "--at", "1800000000"])
        .assert()
        .success()
        .stdout(contains("already_tracked=/mnt/cache/Movies/A.mkv"));
    cache_tier(home)
        .args(["ledger", "add", "/mnt/cache/Shows/B.mkv", "--at", "1700000000.5"])
        .assert()
        .success();

    let raw = fs::read_to_string(home.join("cached_files.list")).expect("ledger");
    assert_eq!(
        raw,
        "/mnt/cache/Movies/A.mkv|1700000000\n/mnt/cache/Shows/B.mkv|1700000000.5\n"
    );

    let out = cache_tier(home)
        .args(["--json", "ledger", "list"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: Value = serde_json::from_slice(&out).expect("json");
    let entries = report["data"].as_array().expect("entries");
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["path"], "/mnt/cache/Movies/A.mkv");
    assert_eq!(entries[0]["cached_at_utc"], "2023-11-14T22:13:20Z");

    cache_tier(home)
        .args(["ledger", "remove", "/mnt/cache/Movies/A.mkv", "/mnt/cache/Nope.mkv"])
        .assert()
        .success()
        .stdout(contains("removed=1"));
    let raw = fs::read_to_string(home.join("cached_files.list")).expect("ledger");
    assert_eq!(raw, "/mnt/cache/Shows/B.mkv|1700000000.5\n");
}

#[test]
fn list_skips_malformed_lines_with_warning() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    fs::write(
        home.join("cached_files.list"),
        "/mnt/cache/a.mkv|1700000000\n\n/mnt/cache/b.mkv|not-a-time\n/mnt/cache/c.mkv\n",
    )
    .expect("ledger");

    cache_tier(home)
        .args(["ledger", "list"])
        .assert()
        .success()
        .stdout(contains("entries=2"))
        .stdout(contains("rejected_lines=1"))
        .stdout(contains("- /mnt/cache/c.mkv"))
        .stderr(contains("code=E004_LEDGER_CORRUPT"));
}

#[test]
fn clear_empties_the_ledger() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    fs::write(
        home.join("cached_files.list"),
        "/mnt/cache/a.mkv|1\n/mnt/cache/b.mkv|2\n",
    )
    .expect("ledger");

    cache_tier(home)
        .args(["ledger", "clear"])
        .assert()
        .success()
        .stdout(contains("cleared=2"));
    assert_eq!(
        fs::read_to_string(home.join("cached_files.list")).expect("ledger"),
        ""
    );
}

#[test]
fn missing_ledger_lists_empty() {
    let tmp = tempdir().expect("tempdir");
    cache_tier(tmp.path())
        .args(["ledger", "list"])
        .assert()
        .success()
        .stdout(contains("entries=0"));
}

#[test]
fn negative_timestamp_is_rejected() {
    let tmp = tempdir().expect("tempdir");
    cache_tier(tmp.path())
        .args(["ledger", "add", "/mnt/cache/a.mkv", "--at=-5"])
        .assert()
        .code(1)
        .stderr(contains("--at must be a non-negative"));
}
