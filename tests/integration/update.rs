use crate::common::{FileAssert, TestProject};
use serde_json::json;

#[test]
fn test_update_reports_local_repositories() {
    let project = TestProject::with_chain().unwrap();

    project.run_pppackage(&["update"], None).unwrap().assert_success().assert_stdout_contains("Updated 1 repositories");
}

#[test]
fn test_quiet_update_prints_nothing() {
    let project = TestProject::with_chain().unwrap();

    let output = project.run_pppackage(&["--quiet", "update"], None).unwrap();
    output.assert_success();
    assert!(output.stdout.is_empty(), "unexpected stdout: {}", output.stdout);
}

#[test]
fn test_changed_index_is_picked_up() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"translator": "noop", "value": "p4"}}"#;
    project.install("root", input, &["--resolve-only"]).unwrap().assert_code(2);

    project.write_file("repo/products/p4/p4.txt", "p4").unwrap();
    project
        .write_index(&json!({
            "packages": [{
                "name": "p4",
                "version": "2.0.0",
                "interfaces": ["p4"],
                "product": {"kind": "archive", "location": "products/p4", "installer": "simple"},
            }]
        }))
        .unwrap();
    project.run_pppackage(&["update"], None).unwrap().assert_success();

    project.install("root", input, &[]).unwrap().assert_success();
    FileAssert::content(project.project_path().join("root/p4.txt"), "p4");
}
