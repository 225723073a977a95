//! CLI argument parsing tests for the `spt` binary.
//!
//! These only exercise argument parsing and immediate failures (e.g. no
//! KISS host listening); they never require a real TNC.

use assert_cmd::Command;
use predicates::prelude::*;

fn spt_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_spt"))
}

#[test]
fn test_help() {
    spt_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Simple Packet Terminal"));
}

#[test]
fn test_version() {
    spt_cmd().arg("--version").assert().success();
}

#[test]
fn test_missing_mycall_fails() {
    spt_cmd().assert().failure();
}

#[test]
fn test_invalid_callsign_fails() {
    // "THISCALLSIGNISTOOLONG" is more than 6 base characters, so this must
    // fail while parsing the callsign, before any connection is attempted.
    spt_cmd()
        .args(["THISCALLSIGNISTOOLONG"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid callsign"));
}

#[test]
fn test_connect_refused_reports_error() {
    // Port 1 is a privileged port nothing in this test environment listens on.
    spt_cmd()
        .args(["N0CALL", "NOCALL2", "127.0.0.1", "1"])
        .assert()
        .failure();
}
