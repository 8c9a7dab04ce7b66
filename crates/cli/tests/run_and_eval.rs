//! Exercises the compiled `teascript` binary end-to-end rather than any
//! internal API — this crate has no library target to unit-test against.

use std::io::Write;
use std::process::Command;

fn bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_teascript"))
}

#[test]
fn eval_prints_the_expression_result() {
    let output = bin().args(["eval", "1 + 2 * 3"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "7");
}

#[test]
fn eval_matches_between_tree_and_vm_backends() {
    let tree = bin().args(["--backend", "tree", "eval", "def x := 7 x * 6"]).output().unwrap();
    let vm = bin().args(["--backend", "vm", "eval", "def x := 7 x * 6"]).output().unwrap();
    assert!(tree.status.success());
    assert!(vm.status.success());
    assert_eq!(tree.stdout, vm.stdout);
}

#[test]
fn run_executes_a_script_file_with_args() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "args[0]").unwrap();
    let output = bin().arg("run").arg(file.path()).arg("hello").output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
}

#[test]
fn unknown_identifier_is_a_reported_error() {
    let output = bin().args(["eval", "nope_not_defined"]).output().unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("nope_not_defined"));
}
