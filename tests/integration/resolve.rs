use crate::common::{CHAIN_CONFIG, FileAssert, P3_INPUT, TestProject};
use serde_json::json;

#[test]
fn test_resolve_only_prints_the_model() {
    let project = TestProject::with_chain().unwrap();

    let output = project.install("root", P3_INPUT, &["--resolve-only"]).unwrap();
    output.assert_success();

    let lines: Vec<&str> = output.stdout.lines().collect();
    assert_eq!(lines, ["p1", "p2", "p3"]);
    FileAssert::not_exists(project.project_path().join("root"));
    assert_eq!(project.cached_products(), 0);
}

#[test]
fn test_unsatisfiable_requirement_exits_with_no_model() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"and": [
        {"translator": "noop", "value": "p3"},
        {"negated": {"translator": "noop", "value": "p1"}}
    ]}}"#;

    project
        .install("root", input, &[])
        .unwrap()
        .assert_code(2)
        .assert_stderr_contains("No model found")
        .assert_stderr_contains("noop:p3");
    FileAssert::not_exists(project.project_path().join("root"));
}

#[test]
fn test_unknown_package_has_no_model() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"translator": "noop", "value": "missing"}}"#;

    project.install("root", input, &[]).unwrap().assert_code(2);
}

#[test]
fn test_versioned_translator_prefers_newest_version() {
    let project = TestProject::new().unwrap();
    let package = |version: &str| {
        json!({
            "name": format!("pacman-bash-{version}"),
            "version": version,
            "interfaces": ["bash"],
            "product": {"kind": "archive", "location": "products/bash", "installer": "simple"},
        })
    };
    project
        .write_index(&json!({
            "packages": [package("5.1.0"), package("5.2.0")],
            "translators": {"pacman-bash": [{"version": "5.1.0"}, {"version": "5.2.0"}]},
        }))
        .unwrap();
    project.write_config(&format!("{CHAIN_CONFIG}\n[translators.pacman]\nkind = \"versioned\"\n")).unwrap();

    let newest = r#"{"requirements": {"translator": "pacman", "value": "bash"}}"#;
    let output = project.install("root", newest, &["--resolve-only"]).unwrap();
    output.assert_success();
    assert_eq!(output.stdout.trim(), "pacman-bash-5.2.0");

    // An upper bound overrides the preference.
    let bounded = r#"{"requirements": {"translator": "pacman", "value": "bash<5.2"}}"#;
    let output = project.install("root", bounded, &["--resolve-only"]).unwrap();
    output.assert_success();
    assert_eq!(output.stdout.trim(), "pacman-bash-5.1.0");
}

#[test]
fn test_unknown_translator_is_reported() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"translator": "conan", "value": "zlib"}}"#;

    project.install("root", input, &["--resolve-only"]).unwrap().assert_code(1).assert_stderr_contains("conan");
}
