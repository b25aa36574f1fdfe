use crate::common::{P3_INPUT, TestProject};
use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("pppackage")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("update"));
}

#[test]
fn test_version() {
    Command::cargo_bin("pppackage")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_explicit_config() {
    let project = TestProject::new().unwrap();

    project
        .run_pppackage(&["--config", "absent.toml", "install", "root"], Some(P3_INPUT))
        .unwrap()
        .assert_code(1)
        .assert_stderr_contains("does not exist");
}

#[test]
fn test_config_from_environment() {
    let project = TestProject::with_chain().unwrap();
    let config = project.project_path().join("pppackage.toml");
    std::fs::rename(&config, project.project_path().join("other.toml")).unwrap();

    Command::cargo_bin("pppackage")
        .unwrap()
        .current_dir(project.project_path())
        .env("PPPACKAGE_CONFIG", "other.toml")
        .env("PPPACKAGE_NO_PROGRESS", "1")
        .args(["install", "root", "--resolve-only"])
        .write_stdin(P3_INPUT)
        .assert()
        .success()
        .stdout(predicate::str::contains("p3"));
}

#[test]
fn test_malformed_input_document() {
    let project = TestProject::with_chain().unwrap();

    project
        .install("root", "{\"requirement\": ", &[])
        .unwrap()
        .assert_code(1)
        .assert_stderr_contains("invalid input document");
}

#[test]
fn test_malformed_config() {
    let project = TestProject::new().unwrap();
    project.write_file("pppackage.toml", "[[repositories]\n").unwrap();

    project.install("root", P3_INPUT, &[]).unwrap().assert_code(1).assert_stderr_contains("failed to parse");
}

#[test]
fn test_quiet_conflicts_with_verbose() {
    let project = TestProject::with_chain().unwrap();

    let output = project.run_pppackage(&["-q", "-v", "update"], None).unwrap();
    assert!(!output.success);
    assert_eq!(output.code, Some(2));
}
