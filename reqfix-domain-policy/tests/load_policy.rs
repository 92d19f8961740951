use camino::Utf8PathBuf;
use reqfix_domain_policy::{PolicyError, load_policy};
use reqfix_types::policy::{ActionKind, PolicyMode};
use std::fs;

fn write(dir: &tempfile::TempDir, name: &str, body: &str) -> Utf8PathBuf {
    let path = Utf8PathBuf::from_path_buf(dir.path().join(name)).expect("utf8 path");
    fs::write(&path, body).expect("write policy");
    path
}

#[test]
fn missing_policy_is_fatal() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = Utf8PathBuf::from_path_buf(dir.path().join("absent.toml")).expect("utf8 path");
    let err = load_policy(&path).expect_err("missing");
    assert!(matches!(err, PolicyError::Missing { .. }));
}

#[test]
fn toml_policy_with_comments_loads() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        &dir,
        "policy.toml",
        r#"
# Strict repair for structural problems only.
policy = "structural"
mode = "strict"

[[rules]]
id = "G1"
whenViolation = "graph.cycle"   # cut the back edge
severity = "strict"
group_by = "root_cause"
actions = [{ use = "break_cycle", mode = "auto" }]

[stopping]
max_iterations = 4
"#,
    );

    let policy = load_policy(&path).expect("load");
    assert_eq!(policy.mode, PolicyMode::Strict);
    assert_eq!(policy.rules[0].actions[0].kind, ActionKind::BreakCycle);
    assert_eq!(policy.stopping.max_iterations, 4);
}

#[test]
fn unknown_field_reports_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write(
        &dir,
        "policy.json",
        r#"{"mode": "strict", "rules": [], "stoping": {"max_iterations": 3}}"#,
    );

    let err = load_policy(&path).expect_err("unknown field");
    match err {
        PolicyError::Parse { path: p, message } => {
            assert!(p.ends_with("policy.json"));
            assert!(message.contains("stoping"), "{message}");
        }
        other => panic!("unexpected error: {other}"),
    }
}
