//! CLI failure-path tests. Everything here must fail before a database
//! connection is attempted.

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;
use tempfile::tempdir;

fn csv2pg() -> Command {
    Command::cargo_bin("csv2pg").expect("binary exists")
}

#[test]
fn missing_input_argument_is_a_usage_error() {
    csv2pg().assert().failure();
}

#[test]
fn nonexistent_file_fails_with_a_message() {
    csv2pg()
        .args(["/no/such/file.csv", "--db", "postgres://localhost/x"])
        .assert()
        .failure()
        .stderr(contains("cannot open input"));
}

#[test]
fn unknown_compression_hint_fails_fast() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("rows.csv");
    fs::write(&input, "a,b\n1,2\n").expect("write input");

    csv2pg()
        .args([
            input.to_str().unwrap(),
            "--db",
            "postgres://localhost/x",
            "--compression",
            "zip",
        ])
        .assert()
        .failure()
        .stderr(contains("compression type not supported"));
}

#[test]
fn unsupported_file_type_is_rejected() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("events.parquet");
    fs::write(&input, "not a csv").expect("write input");

    csv2pg()
        .args([
            input.to_str().unwrap(),
            "--db",
            "postgres://localhost/x",
            "--csv",
            "false",
        ])
        .assert()
        .failure()
        .stderr(contains("file type not supported"));
}

#[test]
fn unreachable_database_fails_after_profiling() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("people.csv");
    fs::write(&input, "name,score\nJohn,10\nJane,20\n").expect("write input");

    // Profiling succeeds; the connect step then fails on a closed port.
    csv2pg()
        .args([
            input.to_str().unwrap(),
            "--db",
            "postgres://127.0.0.1:1/nowhere",
        ])
        .assert()
        .failure()
        .stderr(contains("error"));
}

#[test]
fn corrupt_gzip_input_fails() {
    let dir = tempdir().expect("temp dir");
    let input = dir.path().join("rows.csv.gz");
    fs::write(&input, "definitely not gzip").expect("write input");

    csv2pg()
        .args([input.to_str().unwrap(), "--db", "postgres://localhost/x"])
        .assert()
        .failure()
        .stderr(contains("profiling"));
}
