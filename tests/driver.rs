//! Driver behavior: suffix handling and the stdin → stdout mode.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn stdin_compiles_to_stdout() {
    Command::cargo_bin("sea")
        .unwrap()
        .write_stdin("int main(void) { return 0; }")
        .assert()
        .success()
        .stdout(predicate::str::contains("main:"))
        .stdout(predicate::str::contains("\tleave"));
}

#[test]
fn non_c_suffix_is_rejected() {
    Command::cargo_bin("sea")
        .unwrap()
        .arg("Cargo.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("filename suffix is not .c"));
}

#[test]
fn missing_input_is_rejected() {
    Command::cargo_bin("sea")
        .unwrap()
        .arg("does-not-exist.c")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot open file"));
}

#[test]
fn diagnostics_name_the_file_and_line() {
    Command::cargo_bin("sea")
        .unwrap()
        .write_stdin("int main(void) { return x; }")
        .assert()
        .failure()
        .stderr(predicate::str::contains("[ERROR]"))
        .stderr(predicate::str::contains("'x' undeclared"))
        .stderr(predicate::str::contains("stdin:1"));
}
