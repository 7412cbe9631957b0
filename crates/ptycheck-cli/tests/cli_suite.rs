// Test module - relaxed lint rules
#![cfg(unix)]
#![allow(clippy::indexing_slicing)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(missing_docs)]

//! End-to-end tests for the `ptycheck` binary against `/bin/sh` suites.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

const SH_SUITE: &str = r#"
suite_version: 1
name: sh checks
aut:
  program: /bin/sh
  cli_prefix: ["-c"]
timeouts:
  terminate_grace_ms: 200
tests:
  - kind: probe
    name: json object
    args: ["printf '{\"stable\": {\"beatmap_sets\": 2}}'"]
    json:
      required_keys: [stable]
      counts: [stable.beatmap_sets]
  - kind: probe
    name: exits nonzero
    args: ["exit 3"]
  - kind: probe
    name: greeting
    args: ["echo hello"]
    stdout:
      - type: contains
        text: hello
"#;

// =============================================================================
// Helper Functions
// =============================================================================

fn ptycheck(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ptycheck"))
        .args(args)
        .current_dir(dir)
        .env_remove("PTYCHECK_AUT")
        .env_remove("PTYCHECK_AUT_CWD")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run ptycheck")
}

fn write_suite(dir: &Path, name: &str, text: &str) {
    fs::write(dir.join(name), text).unwrap();
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// =============================================================================
// Suite Runs
// =============================================================================

#[test]
fn streams_results_and_summary() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "ptycheck.yaml", SH_SUITE);

    let output = ptycheck(dir.path(), &[]);
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(1), "{text}");
    assert!(text.contains("[PASS] json object"), "{text}");
    assert!(text.contains("[FAIL] exits nonzero"), "{text}");
    assert!(text.contains("[PASS] greeting"), "{text}");
    assert!(text.contains("Total: 2 passed, 1 failed, 0 skipped out of 3"), "{text}");
    let first = text.find("json object").unwrap();
    let second = text.find("exits nonzero").unwrap();
    assert!(first < second);
}

#[test]
fn only_selects_tests_and_exits_zero() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "suite.yaml", SH_SUITE);

    let output = ptycheck(
        dir.path(),
        &["--suite", "suite.yaml", "--only", "greeting", "--only", "json object"],
    );
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(0), "{text}");
    assert!(text.contains("Total: 2 passed, 0 failed, 0 skipped out of 2"), "{text}");
    assert!(!text.contains("exits nonzero"));
}

#[test]
fn json_report_is_one_document() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "ptycheck.yaml", SH_SUITE);

    let output = ptycheck(dir.path(), &["--json"]);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(report["suite"], "sh checks");
    assert_eq!(report["exit_code"], 1);
    assert_eq!(report["summary"]["failed"], 1);
    let results = report["results"].as_array().unwrap();
    assert_eq!(results[0]["name"], "json object");
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[1]["status"], "failed");
}

#[test]
fn aut_flag_overrides_the_suite_program() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "ptycheck.yaml", SH_SUITE);

    let output = ptycheck(dir.path(), &["--aut", "/nonexistent/app", "--only", "greeting"]);
    let text = stdout(&output);

    assert_eq!(output.status.code(), Some(1), "{text}");
    assert!(text.contains("[FAIL] greeting"), "{text}");
    assert!(text.contains("E_SPAWN"), "{text}");
}

// =============================================================================
// Harness Errors
// =============================================================================

#[test]
fn invalid_suite_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "ptycheck.yaml", "suite_version: 1\nname: broken\n");

    let output = ptycheck(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(10));
    assert!(String::from_utf8_lossy(&output.stderr).contains("E_CONFIG"));
}

#[test]
fn unknown_only_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_suite(dir.path(), "ptycheck.yaml", SH_SUITE);

    let output = ptycheck(dir.path(), &["--only", "no such test"]);
    assert_eq!(output.status.code(), Some(10));
}

#[test]
fn missing_suite_file_exits_with_io_code() {
    let dir = tempfile::tempdir().unwrap();
    let output = ptycheck(dir.path(), &["--suite", "missing.yaml"]);
    assert_eq!(output.status.code(), Some(9));
}

// =============================================================================
// Subcommands
// =============================================================================

#[test]
fn default_suite_prints_loadable_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let output = ptycheck(dir.path(), &["default-suite"]);
    assert_eq!(output.status.code(), Some(0));

    let text = stdout(&output);
    let suite: serde_yml::Value = serde_yml::from_str(&text).unwrap();
    assert_eq!(suite["suite_version"].as_u64(), Some(1));
    assert!(text.contains("TUI: Smoke"));

    write_suite(dir.path(), "ptycheck.yaml", &text);
    let reload = ptycheck(dir.path(), &["--only", "CLI: Scan", "--aut", "/nonexistent/app"]);
    assert_eq!(reload.status.code(), Some(1));
}

#[test]
fn probe_checks_required_keys() {
    let dir = tempfile::tempdir().unwrap();
    let ok = ptycheck(
        dir.path(),
        &[
            "probe",
            "--aut",
            "/bin/sh",
            "--require-key",
            "lazer",
            "--",
            "-c",
            "printf '{\"lazer\": {}}'",
        ],
    );
    assert_eq!(ok.status.code(), Some(0));
    assert_eq!(stdout(&ok), "{\"lazer\": {}}");

    let missing = ptycheck(
        dir.path(),
        &[
            "probe",
            "--aut",
            "/bin/sh",
            "--require-key",
            "stable",
            "--json",
            "--",
            "-c",
            "printf '{\"lazer\": {}}'",
        ],
    );
    assert_eq!(missing.status.code(), Some(8));
    let report: serde_json::Value = serde_json::from_slice(&missing.stdout).unwrap();
    assert_eq!(report["shape_error"]["code"], "E_SHAPE");
    assert_eq!(report["exit_code"], 0);
}

#[test]
fn probe_of_missing_program_is_a_spawn_error() {
    let dir = tempfile::tempdir().unwrap();
    let output = ptycheck(dir.path(), &["probe", "--aut", "/nonexistent/app", "--", "scan"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn completions_are_generated() {
    let dir = tempfile::tempdir().unwrap();
    let output = ptycheck(dir.path(), &["completions", "bash"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("ptycheck"));
}
