//! Integration tests for `demokit plan --json` output.

use std::path::Path;
use std::process::Command;

fn cargo_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO"));
    cmd.args(["run", "-p", "demokit-cli", "--bin", "demokit", "--"]);
    cmd
}

fn scaffold(root: &Path, config: &str, pages: &[&str]) {
    std::fs::write(root.join("demokit.json"), config).unwrap();
    for page in pages {
        let dir = root.join("playground").join(page);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(format!("{page}.html")),
            "<html><body><%= nav %></body></html>",
        )
        .unwrap();
        std::fs::write(dir.join(format!("{page}.js")), "export {};").unwrap();
    }
}

fn run_plan(root: &Path) -> (bool, serde_json::Value) {
    let output = cargo_bin()
        .args(["--json", "--cwd"])
        .arg(root)
        .arg("plan")
        .output()
        .expect("Failed to run plan command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(
        stdout.trim().starts_with('{'),
        "stdout should begin with '{{': {stdout}"
    );
    let json = serde_json::from_str(&stdout).expect("stdout should be valid JSON");
    (output.status.success(), json)
}

#[test]
fn test_plan_json_for_two_pages() {
    let dir = tempfile::tempdir().unwrap();
    scaffold(
        dir.path(),
        r#"{"pages": ["Dropin", "Card"], "bundlePrefix": "Demo"}"#,
        &["Dropin", "Card"],
    );

    let (success, json) = run_plan(dir.path());
    assert!(success);
    assert_eq!(json["schema_version"].as_u64(), Some(1));
    assert_eq!(json["ok"], true);

    let plan = &json["plan"];
    assert_eq!(plan["pages"], serde_json::json!(["Dropin", "Card"]));

    let entries = plan["entries"].as_array().expect("entries should be array");
    assert_eq!(entries.len(), 3);
    let names: Vec<&str> = entries
        .iter()
        .map(|e| e["bundle_name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["DemoDropin", "DemoCard", "Checkout"]);

    let html = plan["html"].as_array().expect("html should be array");
    assert_eq!(html[0]["output_path"], "index.html");
    assert_eq!(html[1]["output_path"], "card/index.html");
    assert_eq!(html[1]["bound_bundle_name"], "DemoCard");

    let rules = plan["rules"]["rules"].as_array().expect("rules should be array");
    let kinds: Vec<&str> = rules.iter().map(|r| r["kind"].as_str().unwrap()).collect();
    assert_eq!(
        kinds,
        vec!["inline-image", "script", "typed-script", "style", "style-module", "fallback"]
    );
}

#[test]
fn test_plan_json_duplicate_bundle_name() {
    let dir = tempfile::tempdir().unwrap();
    scaffold(
        dir.path(),
        r#"{"pages": ["Dropin", "Checkout"], "bundlePrefix": ""}"#,
        &["Dropin", "Checkout"],
    );

    let (success, json) = run_plan(dir.path());
    assert!(!success);
    assert_eq!(json["ok"], false);
    assert_eq!(json["error"]["code"], "CONFIG_DUPLICATE_BUNDLE");
}

#[test]
fn test_plan_json_missing_page_files() {
    let dir = tempfile::tempdir().unwrap();
    scaffold(dir.path(), r#"{"pages": ["Dropin", "Card"]}"#, &["Dropin"]);

    let (success, json) = run_plan(dir.path());
    assert!(!success);
    assert_eq!(json["error"]["code"], "PAGE_FILE_MISSING");
}

#[test]
fn test_plan_json_empty_registry() {
    let dir = tempfile::tempdir().unwrap();
    scaffold(dir.path(), r#"{"pages": []}"#, &[]);

    let (success, json) = run_plan(dir.path());
    assert!(!success);
    assert_eq!(json["error"]["code"], "CONFIG_EMPTY_REGISTRY");
}

#[test]
fn test_plan_json_unparsable_config() {
    let dir = tempfile::tempdir().unwrap();
    scaffold(dir.path(), "{ not json", &[]);

    let (success, json) = run_plan(dir.path());
    assert!(!success);
    assert_eq!(json["error"]["code"], "CONFIG_PARSE");
}
