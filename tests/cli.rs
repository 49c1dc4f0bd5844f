//! End-to-end tests of the declarate binary

mod common;

use assert_cmd::Command;
use common::{create_test_dir, line_count};
use predicates::prelude::*;
use std::path::Path;

fn declarate(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("declarate").unwrap();
    cmd.current_dir(dir)
        .env_remove("RUST_LOG")
        .arg("--no-color")
        .arg("--persistent-file")
        .arg(dir.join("persistent.json"));
    cmd
}

#[test]
fn test_passing_file_exits_zero() {
    let dir = create_test_dir(&[(
        "ok.yaml",
        "- name: greet\n  shell_cmd: echo hello\n  shell_response: hello\n",
    )]);

    declarate(dir.path())
        .arg("ok.yaml")
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ ok.yaml:greet"))
        .stdout(predicate::str::contains("1 passed, 0 failed, 0 skipped (1 file(s))"));
}

#[test]
fn test_failing_file_exits_one() {
    let dir = create_test_dir(&[(
        "fail.yaml",
        "- name: mismatch\n  echo_message: actual text\n  echo_response: expected text\n",
    )]);

    declarate(dir.path())
        .arg("fail.yaml")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ fail.yaml:mismatch"))
        .stdout(predicate::str::contains("expected:"))
        .stdout(predicate::str::contains("expected text"))
        .stdout(predicate::str::contains("0 passed, 1 failed"));
}

#[test]
fn test_dry_run_does_not_execute() {
    let dir = create_test_dir(&[(
        "touch.yaml",
        "- name: touch\n  shell_cmd: echo ran >> marker\n",
    )]);

    declarate(dir.path())
        .args(["--dry-run", "touch.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 file(s) valid"));
    assert_eq!(line_count(&dir.path().join("marker")), 0);
}

#[test]
fn test_var_flag_sets_variables() {
    let dir = create_test_dir(&[(
        "vars.yaml",
        "- name: greet\n  echo_message: \"hello {{$who}}\"\n  echo_response: hello cli\n",
    )]);

    declarate(dir.path())
        .args(["--var", "who=cli", "vars.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 passed"));
}

#[test]
fn test_invalid_document_reports_error() {
    let dir = create_test_dir(&[("broken.yaml", "- name: broken\n  shell:\n    cmd: ''\n")]);

    declarate(dir.path())
        .arg("broken.yaml")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error:"))
        .stderr(predicate::str::contains("cmd is empty"));
}

#[test]
fn test_settings_file_lists_tests() {
    let dir = create_test_dir(&[
        (
            "declarate.yml",
            "tests:\n  - suites\nskip:\n  - \"**/wip_*\"\nvariables:\n  greeting: hi\n",
        ),
        (
            "suites/a.yaml",
            "- name: a\n  echo_message: \"{{$greeting}}\"\n  echo_response: hi\n",
        ),
        (
            "suites/nested/b.yml",
            "- name: b\n  shell_cmd: echo b\n  shell_response: b\n",
        ),
        ("suites/wip_c.yaml", "- name: c\n  shell_cmd: exit 1\n"),
    ]);

    declarate(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("2 passed, 0 failed, 0 skipped (2 file(s))"));
}

#[test]
fn test_no_paths_without_settings() {
    let dir = create_test_dir(&[]);

    declarate(dir.path())
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No test paths given"));
}

#[test]
fn test_persistent_variables_across_runs() {
    let dir = create_test_dir(&[
        (
            "save.yaml",
            "- name: save\n  variables_persistent:\n    session: s-42\n",
        ),
        (
            "use.yaml",
            "- name: use\n  echo_message: \"{{$session}}\"\n  echo_response: s-42\n",
        ),
    ]);

    declarate(dir.path()).arg("save.yaml").assert().success();
    declarate(dir.path()).arg("use.yaml").assert().success();
    declarate(dir.path())
        .args(["--clean-persistent", "use.yaml"])
        .assert()
        .code(1);
}
