use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("cvd")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("create"))
        .stdout(predicate::str::contains("acloud"));
}

#[test]
fn test_status_with_no_groups_prints_table_header() {
    Command::cargo_bin("cvd")
        .unwrap()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("GROUP"));
}

#[test]
fn test_status_json_output_is_empty_array() {
    Command::cargo_bin("cvd")
        .unwrap()
        .args(["status", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_clear_unknown_group_fails() {
    Command::cargo_bin("cvd")
        .unwrap()
        .args(["clear", "no-such-group", "--yes"])
        .assert()
        .failure();
}
