//! CLI tests for `slotrun run` and the admin subcommands.
//!
//! Spawns the slotrun binary and verifies exit codes, report shape, and
//! on-disk effects for successful batches, unknown sets, and admin errors.

use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use slotrun::exit_codes;
use slotrun::test_support::{seed_set, temp_sandbox};

fn slotrun(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_slotrun"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .expect("spawn slotrun")
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

#[test]
fn run_prints_report_and_archives_tabular_output() {
    let sandbox = temp_sandbox();
    seed_set(
        &sandbox,
        "demo",
        &[(1, "{{ 1 + 2 }}"), (2, "a,b\n1,2")],
    );

    let output = slotrun(sandbox.root(), &["run", "demo", "1-2"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let report = stdout_json(&output);
    assert_eq!(report["set"], "demo");
    let results = report["results"].as_array().expect("results");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["output"], "3");

    let archive_path = results[1]["archive"]["path"].as_str().expect("path");
    let stored = std::fs::read_to_string(archive_path).expect("read artifact");
    assert_eq!(stored, "a,b\n1,2");
}

#[test]
fn run_unknown_set_exits_not_found() {
    let sandbox = temp_sandbox();

    let output = slotrun(sandbox.root(), &["run", "ghost", "1"]);
    assert_eq!(output.status.code(), Some(exit_codes::NOT_FOUND));
    assert_eq!(stdout_json(&output)["code"], "unknown_set");
}

#[test]
fn run_without_valid_ids_exits_invalid() {
    let sandbox = temp_sandbox();
    seed_set(&sandbox, "demo", &[]);

    let output = slotrun(sandbox.root(), &["run", "demo", "x,y"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert_eq!(stdout_json(&output)["code"], "no_valid_ids");
}

#[test]
fn faulted_slot_still_exits_ok() {
    let sandbox = temp_sandbox();
    seed_set(&sandbox, "demo", &[(1, "{% bogus %}")]);

    let output = slotrun(sandbox.root(), &["run", "demo", "1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let report = stdout_json(&output);
    let error = report["results"][0]["error"].as_str().expect("error");
    assert!(error.starts_with("template:"), "{error}");
}

#[test]
fn admin_commands_round_trip_a_set() {
    let sandbox = temp_sandbox();
    let root = sandbox.root();

    let output = slotrun(root, &["sets", "create", "demo"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let output = slotrun(root, &["slots", "save", "demo", "1", "print"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));

    let output = slotrun(root, &["slots", "list", "demo"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "0\n1\n");

    let output = slotrun(root, &["slots", "show", "demo", "1"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "print\n");

    let output = slotrun(root, &["sets", "list"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "demo.txt\n");

    let output = slotrun(root, &["slots", "delete", "demo", "1"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let output = slotrun(root, &["slots", "list", "demo"]);
    assert_eq!(String::from_utf8_lossy(&output.stdout), "0\n");
}

#[test]
fn admin_errors_exit_invalid() {
    let sandbox = temp_sandbox();
    seed_set(&sandbox, "demo", &[]);

    let output = slotrun(sandbox.root(), &["slots", "show", "demo", "9"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
}

#[test]
fn store_seed_continues_past_a_failed_file() {
    let sandbox = temp_sandbox();
    let good = sandbox.root().join("good.csv");
    std::fs::write(&good, "a,b\n1,2\n").expect("write seed file");
    let missing = sandbox.root().join("missing.csv");

    let output = slotrun(
        sandbox.root(),
        &[
            "store",
            "seed",
            missing.to_str().expect("utf-8 path"),
            good.to_str().expect("utf-8 path"),
        ],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.csv"));
    assert!(
        String::from_utf8_lossy(&output.stdout).contains("good -> "),
        "remaining files must still be ingested"
    );
    assert!(!good.exists(), "ingested file is moved into the store");
}

#[test]
fn store_path_is_deterministic_and_creates_nothing() {
    let sandbox = temp_sandbox();

    let first = slotrun(sandbox.root(), &["store", "path", "report"]);
    let second = slotrun(sandbox.root(), &["store", "path", "report"]);
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    assert_eq!(first.stdout, second.stdout);
    assert!(
        String::from_utf8_lossy(&first.stdout)
            .trim()
            .ends_with("report.csv")
    );
    assert!(!sandbox.paths.store_dir.exists());
}
