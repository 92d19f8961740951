//! End-to-end tests for the reqfix binary.

#![allow(deprecated)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const GRAPH: &str = include_str!("fixtures/graph.json");
const POLICY: &str = include_str!("fixtures/policy.toml");

fn reqfix() -> Command {
    Command::cargo_bin("reqfix").expect("reqfix binary")
}

/// Project with a two-node dependency cycle and an auto-fixing policy.
fn create_project(policy: &str) -> TempDir {
    let td = tempfile::tempdir().expect("tempdir");
    fs::write(td.path().join("requirements.json"), GRAPH).expect("write graph");
    fs::write(td.path().join("reqfix.policy.toml"), policy).expect("write policy");
    td
}

fn graph_json(root: &Path) -> serde_json::Value {
    let text = fs::read_to_string(root.join("requirements.json")).expect("read graph");
    serde_json::from_str(&text).expect("graph json")
}

fn changeset_files(root: &Path) -> usize {
    match fs::read_dir(root.join(".reqfix").join("changesets")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[test]
fn check_reports_cycle_and_blocks() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .arg("check")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("graph.cycle"))
        .stdout(predicate::str::contains("SYS-1"));
}

#[test]
fn check_json_lists_violations() {
    let temp = create_project(POLICY);

    let out = reqfix()
        .current_dir(temp.path())
        .args(["check", "--format", "json"])
        .assert()
        .code(2)
        .get_output()
        .stdout
        .clone();
    let violations: serde_json::Value = serde_json::from_slice(&out).expect("json");
    let codes: Vec<_> = violations
        .as_array()
        .expect("array")
        .iter()
        .map(|v| v["code"].as_str().expect("code").to_string())
        .collect();
    assert_eq!(codes, vec!["graph.cycle", "graph.cycle"]);
}

#[test]
fn fix_without_write_is_dry_run() {
    let temp = create_project(POLICY);
    let before = fs::read_to_string(temp.path().join("requirements.json")).expect("read");

    reqfix()
        .current_dir(temp.path())
        .arg("fix")
        .assert()
        .success()
        .stdout(predicate::str::contains("# reqfix fix"))
        .stdout(predicate::str::contains("Stopped: `fixed_point`"));

    let after = fs::read_to_string(temp.path().join("requirements.json")).expect("read");
    assert_eq!(before, after);
    assert_eq!(changeset_files(temp.path()), 0);
}

#[test]
fn fix_write_then_rollback_round_trips() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["fix", "--write"])
        .assert()
        .success();
    assert_eq!(changeset_files(temp.path()), 1);
    reqfix()
        .current_dir(temp.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("No violations"));

    reqfix()
        .current_dir(temp.path())
        .args(["changesets", "--status", "applied"])
        .assert()
        .success()
        .stdout(predicate::str::contains("applied"))
        .stdout(predicate::str::contains("G1"));

    reqfix()
        .current_dir(temp.path())
        .args(["rollback", "--write"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Rolled back: 1"));

    reqfix()
        .current_dir(temp.path())
        .arg("check")
        .assert()
        .code(2);
    reqfix()
        .current_dir(temp.path())
        .args(["changesets", "--status", "rolled-back", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"rolled_back\""));
}

#[test]
fn suggest_mode_blocks_then_apply_by_id() {
    let temp = create_project(&POLICY.replace("mode = \"strict\"", "mode = \"suggest\""));
    let before = graph_json(temp.path());

    reqfix()
        .current_dir(temp.path())
        .args(["fix", "--write"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Awaiting approval"));
    assert_eq!(graph_json(temp.path()), before);

    let out = reqfix()
        .current_dir(temp.path())
        .args(["changesets", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let sets: serde_json::Value = serde_json::from_slice(&out).expect("json");
    let id = sets[0]["id"].as_str().expect("id").to_string();
    assert_eq!(sets[0]["status"], "proposed");

    reqfix()
        .current_dir(temp.path())
        .args(["apply", "--write", &id])
        .assert()
        .success();
    assert_ne!(graph_json(temp.path()), before);
}

#[test]
fn apply_unknown_id_is_a_policy_block() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["apply", "does-not-exist"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("does-not-exist"));
}

#[test]
fn plan_write_records_proposals() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["plan", "--write"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# reqfix plan"))
        .stdout(predicate::str::contains("Change sets: 1"));
    assert_eq!(changeset_files(temp.path()), 1);
}

#[test]
fn missing_policy_is_a_tool_error() {
    let temp = create_project(POLICY);
    fs::remove_file(temp.path().join("reqfix.policy.toml")).expect("remove policy");

    reqfix()
        .current_dir(temp.path())
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("policy file not found"));
}

#[test]
fn zero_max_iterations_is_rejected() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["fix", "--max-iterations", "0"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("max_iterations"));
}

#[test]
fn config_file_supplies_paths() {
    let temp = create_project(POLICY);
    let reqs = temp.path().join("reqs");
    fs::create_dir_all(&reqs).expect("mkdir");
    fs::rename(
        temp.path().join("requirements.json"),
        reqs.join("graph.json"),
    )
    .expect("move graph");
    fs::write(
        temp.path().join("reqfix.toml"),
        "[paths]\ngraph = \"reqs/graph.json\"\n",
    )
    .expect("write config");

    reqfix()
        .args(["check", "--root"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("graph.cycle"));
}

#[test]
fn builtin_ontology_is_valid() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .arg("validate-ontology")
        .assert()
        .success()
        .stdout(predicate::str::contains("Valid: `true`"));
}

#[test]
fn broken_ontology_fails_validation() {
    let temp = create_project(POLICY);
    fs::write(
        temp.path().join("ontology.json"),
        r#"{
  "version": "1",
  "stages": [
    { "id": "goal", "name": "Goal", "level": 1, "abstractionLevel": "high", "parentStages": ["missing"] }
  ]
}"#,
    )
    .expect("write ontology");

    reqfix()
        .current_dir(temp.path())
        .args(["validate-ontology", "--ontology", "ontology.json"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Valid: `false`"));
}

#[test]
fn impact_lists_dependents() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["impact", "SYS-2", "--priority", "critical"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Impact of SYS-2"))
        .stdout(predicate::str::contains("`SYS-1`"));
}

#[test]
fn impact_unknown_requirement_fails() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["impact", "NOPE-1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("NOPE-1"));
}

#[test]
fn graph_renders_mermaid() {
    let temp = create_project(POLICY);

    reqfix()
        .current_dir(temp.path())
        .args(["graph", "SYS-1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("```mermaid"))
        .stdout(predicate::str::contains("SYS_1 --> SYS_2"));
}
