use assert_cmd::Command;
use predicates::prelude::*;

const STORE_ENV: [&str; 6] = [
    "NEO4J_URI",
    "NEO4J_DATABASE",
    "NEO4J_USER",
    "NEO4J_PASSWORD",
    "HARNESS_NAMESPACE",
    "TEST_RESULTS_FILE",
];

fn roundtrip() -> Command {
    let mut cmd = Command::cargo_bin("roundtrip").unwrap();
    for var in STORE_ENV {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_subcommands() {
    roundtrip()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("fixture"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn missing_password_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    roundtrip()
        .args(["run", "--uri", "sqlite::memory:"])
        .arg("--report")
        .arg(dir.path().join("results.md"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("store.password"));
    assert!(!dir.path().join("results.md").exists());
}

#[test]
fn unreachable_store_exits_with_connectivity_code() {
    let dir = tempfile::tempdir().unwrap();
    roundtrip()
        .args(["-q", "run", "--uri", "http://127.0.0.1:1", "--password", "pw"])
        .arg("--report")
        .arg(dir.path().join("results.md"))
        .assert()
        .code(3);
}

#[test]
fn bolt_uri_is_rejected() {
    roundtrip()
        .args(["run", "--uri", "bolt://localhost:7687", "--password", "pw"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("bolt"));
}

#[test]
fn full_run_against_sqlite_passes() {
    let dir = tempfile::tempdir().unwrap();
    let report = dir.path().join("results.md");
    let uri = format!("sqlite://{}", dir.path().join("store.db").display());

    roundtrip()
        .args(["run", "--dimensions", "64", "--namespace", "cli-run"])
        .args(["--uri", &uri])
        .env("NEO4J_PASSWORD", "pw")
        .env("TEST_RESULTS_FILE", &report)
        .assert()
        .success()
        .stdout(predicate::str::contains("6/6 tests passed"));

    let written = std::fs::read_to_string(&report).unwrap();
    assert!(written.contains("| 4 | Hybrid Search | PASS |"));
    assert!(written.contains("**Namespace:** cli-run"));
    assert!(written.trim_end().lines().last().unwrap().starts_with("6/6 tests passed"));
}

#[test]
fn unwritable_report_still_surfaces_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let uri = format!("sqlite://{}", dir.path().join("store.db").display());

    roundtrip()
        .args(["-q", "run", "--dimensions", "64", "--password", "pw"])
        .args(["--uri", &uri])
        .arg("--report")
        .arg(blocker.join("results.md"))
        .assert()
        .code(6)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Multi-hop Traversal"))
        .stderr(predicate::str::contains("PASS"))
        .stderr(predicate::str::contains("6/6 tests passed"));
}

#[test]
fn fixture_prints_toml() {
    roundtrip()
        .args(["fixture", "--format", "toml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("beta-blocker-therapy"))
        .stdout(predicate::str::contains("[probes"));
}

#[test]
fn config_masks_password() {
    roundtrip()
        .args(["config", "--password", "hunter2", "--dimensions", "768"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dimensions = 768"))
        .stdout(predicate::str::contains("hunter2").not());
}
