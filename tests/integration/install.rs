use crate::common::{FileAssert, P3_INPUT, TestProject};
use std::fs;

#[test]
fn test_install_chain_into_destination() {
    let project = TestProject::with_chain().unwrap();

    project.install("root", P3_INPUT, &[]).unwrap().assert_success().assert_stdout_contains("Installed 3 packages");

    let root = project.project_path().join("root");
    for name in ["p1", "p2", "p3"] {
        FileAssert::content(root.join(format!("{name}.txt")), name);
    }
    assert_eq!(project.cached_products(), 3);
}

#[test]
fn test_input_file_instead_of_stdin() {
    let project = TestProject::with_chain().unwrap();
    project.write_file("input.json", P3_INPUT).unwrap();

    project.run_pppackage(&["install", "root", "--input", "input.json"], None).unwrap().assert_success();

    FileAssert::exists(project.project_path().join("root/p3.txt"));
}

#[test]
fn test_second_install_reuses_cached_products() {
    let project = TestProject::with_chain().unwrap();
    project.install("first", P3_INPUT, &[]).unwrap().assert_success();

    // Products are served from the cache even after the sources disappear.
    fs::remove_dir_all(project.project_path().join("repo/products")).unwrap();
    project.install("second", P3_INPUT, &[]).unwrap().assert_success();

    assert_eq!(project.cached_products(), 3);
    FileAssert::content(project.project_path().join("second/p1.txt"), "p1");
}

#[test]
fn test_install_merges_into_existing_destination() {
    let project = TestProject::with_chain().unwrap();
    project.write_file("root/keep.txt", "keep").unwrap();

    project.install("root", P3_INPUT, &[]).unwrap().assert_success();

    FileAssert::content(project.project_path().join("root/keep.txt"), "keep");
    FileAssert::exists(project.project_path().join("root/p2.txt"));
}

#[test]
fn test_failed_fetch_leaves_destination_untouched() {
    let project = TestProject::with_chain().unwrap();
    project.write_file("root/keep.txt", "keep").unwrap();
    fs::remove_dir_all(project.project_path().join("repo/products/p3")).unwrap();

    project.install("root", P3_INPUT, &[]).unwrap().assert_code(1).assert_stderr_contains("p3");

    let root = project.project_path().join("root");
    FileAssert::content(root.join("keep.txt"), "keep");
    FileAssert::not_exists(root.join("p1.txt"));
    // p1 and p2 were committed before p3 failed.
    assert_eq!(project.cached_products(), 2);
}

#[test]
fn test_graph_and_generators() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"translator": "noop", "value": "p3"}, "generators": ["products"]}"#;

    project
        .install("root", input, &["--graph", "graph.dot", "--generators-dir", "generated"])
        .unwrap()
        .assert_success();

    let dot = fs::read_to_string(project.project_path().join("graph.dot")).unwrap();
    assert!(dot.starts_with("digraph {"));
    assert!(dot.contains("label=\"p3\""));
    assert_eq!(dot.matches("->").count(), 2);

    let listing: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(project.project_path().join("generated/products.json")).unwrap())
            .unwrap();
    let packages: Vec<&str> =
        listing.as_array().unwrap().iter().map(|p| p["package"].as_str().unwrap()).collect();
    assert_eq!(packages, ["p1", "p2", "p3"]);
}

#[test]
fn test_generators_need_an_output_directory() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"translator": "noop", "value": "p3"}, "generators": ["products"]}"#;

    project.install("root", input, &[]).unwrap().assert_code(1).assert_stderr_contains("--generators-dir");
    FileAssert::not_exists(project.project_path().join("root"));
}

#[test]
fn test_unknown_generator_is_a_configuration_error() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{"requirements": {"translator": "noop", "value": "p3"}, "generators": ["cmake"]}"#;

    project
        .install("root", input, &["--generators-dir", "generated"])
        .unwrap()
        .assert_code(1)
        .assert_stderr_contains("cmake");
}

#[test]
fn test_requirement_list_with_null_options() {
    let project = TestProject::with_chain().unwrap();
    let input = r#"{
        "requirements": [{"translator": "noop", "value": "p3"}],
        "options": null,
        "build_options": null,
        "locks": {},
        "generators": null
    }"#;

    project.install("root", input, &[]).unwrap().assert_success();
    FileAssert::content(project.project_path().join("root/p3.txt"), "p3");
}
