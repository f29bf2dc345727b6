//! End-to-end integration tests for hifz-cli
//!
//! These tests run the built `hifz` binary against a throwaway database and
//! are gated behind the `integration` feature flag. Run with:
//!
//! ```sh
//! cargo test -p hifz-cli --features integration
//! ```

#![cfg(feature = "integration")]

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

const TENANT: &str = "01890a5d-ac96-774b-bcce-b302099a8057";

/// Project config pointing the CLI at a database inside `dir`
fn write_project_config(dir: &Path) {
    let db = dir.join("hifz.db");
    std::fs::write(
        dir.join("config.toml"),
        format!(
            "[storage]\npath = {:?}\n\n[rules]\nexam_passed = 75\n",
            db.to_string_lossy()
        ),
    )
    .unwrap();
}

fn hifz(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hifz"))
        .args(args)
        .env("HIFZ_PROJECT_CONFIG_DIR", dir)
        .output()
        .expect("Failed to run hifz")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Test that hifz --help works
#[test]
fn hifz_help_works() {
    let output = Command::new(env!("CARGO_BIN_EXE_hifz"))
        .arg("--help")
        .output()
        .expect("Failed to run hifz --help");

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("Points ledger and exam scoring"));
    assert!(stdout.contains("rules"));
    assert!(stdout.contains("recompute"));
}

/// Test that hifz config show merges the project config
#[test]
fn hifz_config_show_includes_project_values() {
    let dir = TempDir::new().unwrap();
    write_project_config(dir.path());

    let output = hifz(dir.path(), &["config", "show"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("[exam]"));
    assert!(stdout.contains("current_part_weight = 70"));
    assert!(stdout.contains("exam_passed = 75"));
}

/// Test that hifz config show never prints the storage token
#[test]
fn hifz_config_show_redacts_token() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("config.toml"),
        "[storage]\nurl = \"libsql://circle.turso.io\"\ntoken = \"very-secret-token\"\n",
    )
    .unwrap();

    let output = hifz(dir.path(), &["config", "show"]);

    assert!(output.status.success());
    let stdout = stdout(&output);
    assert!(stdout.contains("libsql://circle.turso.io"));
    assert!(stdout.contains("<redacted>"));
    assert!(!stdout.contains("very-secret-token"));
}

/// Test that seeding uses configured defaults and rules can be changed
#[test]
fn hifz_rules_seed_set_and_list() {
    let dir = TempDir::new().unwrap();
    write_project_config(dir.path());

    let seed = hifz(dir.path(), &["rules", "seed", "--tenant", TENANT]);
    assert!(seed.status.success());
    assert!(stdout(&seed).contains("Created 11 rule(s)"));

    let reseed = hifz(dir.path(), &["rules", "seed", "--tenant", TENANT]);
    assert!(stdout(&reseed).contains("Created 0 rule(s)"));

    let set = hifz(
        dir.path(),
        &["rules", "set", "attendance_late", "-1", "--tenant", TENANT],
    );
    assert!(set.status.success());

    let disable = hifz(
        dir.path(),
        &["rules", "disable", "EXAM_FAILED", "--tenant", TENANT],
    );
    assert!(disable.status.success());

    let list = hifz(dir.path(), &["rules", "list", "--tenant", TENANT]);
    let stdout = stdout(&list);
    assert!(stdout.contains("EXAM_PASSED"));
    assert!(stdout.contains("75"));
    assert!(stdout.contains("-1"));
    assert!(stdout.contains("disabled"));
}

/// Test that rules commands fail without a tenant
#[test]
fn hifz_rules_requires_tenant() {
    let dir = TempDir::new().unwrap();
    write_project_config(dir.path());

    let output = hifz(dir.path(), &["rules", "list"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--tenant"));
}

/// Test ledger inspection and repair on an empty student
#[test]
fn hifz_ledger_total_and_recompute_on_empty_database() {
    let dir = TempDir::new().unwrap();
    write_project_config(dir.path());
    let student = "01890a5d-ac96-774b-bcce-b302099a8058";

    let total = hifz(dir.path(), &["ledger", "total", "--student", student]);
    assert!(total.status.success());
    assert_eq!(stdout(&total).trim(), "0");

    let history = hifz(dir.path(), &["ledger", "history", "--student", student]);
    assert!(stdout(&history).contains("No transactions"));

    let recompute = hifz(dir.path(), &["recompute"]);
    assert!(recompute.status.success());
    assert!(stdout(&recompute).contains("All totals match"));
}

/// Test that reversing an unknown transaction fails
#[test]
fn hifz_ledger_reverse_unknown_transaction_fails() {
    let dir = TempDir::new().unwrap();
    write_project_config(dir.path());

    let output = hifz(
        dir.path(),
        &["ledger", "reverse", "01890a5d-ac96-774b-bcce-b302099a8059"],
    );

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}
