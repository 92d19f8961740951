use chrono::{DateTime, Utc};
use proptest::prelude::*;
use reqfix_core::evaluator::{StructuralEvaluator, find_cycles};
use reqfix_core::executor::FixExecutor;
use reqfix_core::ports::RuleEvaluator;
use reqfix_domain_policy::{PolicyFormat, parse_policy_str};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::outcome::StoppedReason;
use reqfix_types::policy::FixPolicy;
use reqfix_types::requirement::{Requirement, RequirementStatus};
use reqfix_types::violation::{Violation, ViolationCode};
use std::collections::BTreeSet;

fn at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

fn cycle_policy(mode: &str, max_iterations: u32) -> FixPolicy {
    let text = format!(
        r#"
mode = "{mode}"

[[rules]]
id = "G1"
when_violation = "graph.cycle"
severity = "strict"
group_by = "root_cause"
actions = [{{ use = "break_cycle", mode = "auto" }}]

[stopping]
max_iterations = {max_iterations}
"#
    );
    parse_policy_str(&text, PolicyFormat::Toml).expect("policy")
}

fn graph_from_edges(n: usize, edges: &[(usize, usize)]) -> RequirementGraph {
    let mut reqs: Vec<Requirement> = (0..n)
        .map(|i| Requirement::new(format!("R{i}"), format!("r{i}"), "system"))
        .collect();
    for &(from, to) in edges {
        reqs[from % n].depends_on.insert(format!("R{}", to % n));
    }
    RequirementGraph::from(reqs)
}

fn ids(violations: &[Violation]) -> BTreeSet<String> {
    violations.iter().map(|v| v.id.clone()).collect()
}

#[test]
fn clean_graph_is_a_fixed_point_in_one_pass() {
    let policy = cycle_policy("strict", 5);
    let graph = graph_from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
    let outcome = FixExecutor::new(&policy)
        .with_clock(at())
        .execute(&graph, &StructuralEvaluator::default());

    assert!(outcome.success);
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.stopped_reason, StoppedReason::FixedPoint);
    assert!(outcome.applied_change_sets.is_empty());
    assert_eq!(outcome.graph, graph);
}

#[test]
fn second_run_on_a_repaired_graph_changes_nothing() {
    let policy = cycle_policy("strict", 5);
    let graph = graph_from_edges(3, &[(0, 1), (1, 2), (2, 0)]);
    let exec = FixExecutor::new(&policy).with_clock(at());

    let first = exec.execute(&graph, &StructuralEvaluator::default());
    assert_eq!(first.applied_change_sets.len(), 1);

    let second = exec.execute(&first.graph, &StructuralEvaluator::default());
    assert_eq!(second.iterations, 1);
    assert!(second.applied_change_sets.is_empty());
    assert_eq!(second.graph, first.graph);
}

/// Reports every pair of live requirements sharing a title, once from each side.
struct TitleTwins;

impl RuleEvaluator for TitleTwins {
    fn evaluate(&self, graph: &RequirementGraph) -> anyhow::Result<Vec<Violation>> {
        let live: Vec<&Requirement> = graph
            .iter()
            .filter(|r| r.status != RequirementStatus::Superseded)
            .collect();
        let mut out = Vec::new();
        for a in &live {
            for b in &live {
                if a.id != b.id && a.title == b.title {
                    out.push(
                        Violation::new(a.id.clone(), ViolationCode::DuplicateSibling, "twin")
                            .with_related(vec![b.id.clone()])
                            .with_similarity(1.0),
                    );
                }
            }
        }
        Ok(out)
    }
}

fn duplicate_policy(action: &str) -> FixPolicy {
    let text = format!(
        r#"
mode = "strict"

[[rules]]
id = "D1"
when_violation = "dup.sibling.high"
severity = "strict"
group_by = "target"
actions = [{{ use = "{action}", mode = "auto" }}]
"#
    );
    parse_policy_str(&text, PolicyFormat::Toml).expect("policy")
}

#[test]
fn symmetric_duplicates_keep_one_live_requirement() {
    for action in ["alias", "merge"] {
        let policy = duplicate_policy(action);
        let graph = RequirementGraph::from(vec![
            Requirement::new("A", "Login", "system"),
            Requirement::new("B", "Login", "system"),
        ]);
        let outcome = FixExecutor::new(&policy)
            .with_clock(at())
            .execute(&graph, &TitleTwins);

        let live: Vec<&str> = outcome
            .graph
            .iter()
            .filter(|r| r.status != RequirementStatus::Superseded)
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(live.len(), 1, "{action}: {live:?}");
        assert_eq!(outcome.applied_change_sets.len(), 1, "{action}");
        assert_eq!(outcome.apply_failures.len(), 1, "{action}");
        assert_eq!(outcome.stopped_reason, StoppedReason::FixedPoint, "{action}");
        assert!(outcome.new_violations.is_empty(), "{action}");
    }
}

proptest! {
    #[test]
    fn loop_respects_the_iteration_cap(
        n in 1usize..8,
        edges in prop::collection::vec((0usize..8, 0usize..8), 0..24),
        max in 1u32..4,
    ) {
        let policy = cycle_policy("strict", max);
        let graph = graph_from_edges(n, &edges);
        let outcome = FixExecutor::new(&policy)
            .with_clock(at())
            .execute(&graph, &StructuralEvaluator::default());

        prop_assert!(outcome.success);
        prop_assert!(outcome.iterations >= 1);
        prop_assert!(outcome.iterations <= max);
        prop_assert_ne!(outcome.stopped_reason, StoppedReason::Error);
    }

    #[test]
    fn reported_violations_match_the_final_graph(
        n in 1usize..8,
        edges in prop::collection::vec((0usize..8, 0usize..8), 0..24),
    ) {
        let policy = cycle_policy("strict", 10);
        let graph = graph_from_edges(n, &edges);
        let evaluator = StructuralEvaluator::default();
        let outcome = FixExecutor::new(&policy).with_clock(at()).execute(&graph, &evaluator);

        let fresh: Vec<_> = evaluator
            .evaluate(&outcome.graph)
            .expect("evaluate")
            .into_iter()
            .map(|v| v.normalized())
            .collect();
        prop_assert_eq!(ids(&outcome.new_violations), ids(&fresh));

        let after = ids(&outcome.new_violations);
        for fixed in &outcome.fixed_violations {
            prop_assert!(!after.contains(fixed));
        }
        if outcome.stopped_reason == StoppedReason::FixedPoint && outcome.apply_failures.is_empty() {
            prop_assert!(find_cycles(&outcome.graph).is_empty());
        }
    }

    #[test]
    fn suggest_mode_never_touches_the_graph(
        n in 1usize..8,
        edges in prop::collection::vec((0usize..8, 0usize..8), 0..24),
    ) {
        let policy = cycle_policy("suggest", 5);
        let graph = graph_from_edges(n, &edges);
        let outcome = FixExecutor::new(&policy)
            .with_clock(at())
            .execute(&graph, &StructuralEvaluator::default());

        prop_assert!(outcome.applied_change_sets.is_empty());
        prop_assert_eq!(outcome.iterations, 1);
        prop_assert_eq!(&outcome.graph, &graph);
        let has_cycles = !find_cycles(&graph).is_empty();
        prop_assert_eq!(!outcome.pending_change_sets.is_empty(), has_cycles);
    }

    #[test]
    fn rolling_back_everything_restores_the_input(
        n in 1usize..8,
        edges in prop::collection::vec((0usize..8, 0usize..8), 0..24),
    ) {
        let policy = cycle_policy("strict", 10);
        let graph = graph_from_edges(n, &edges);
        let exec = FixExecutor::new(&policy).with_clock(at());
        let outcome = exec.execute(&graph, &StructuralEvaluator::default());

        let undo = exec.rollback_all(&outcome.applied_change_sets, &outcome.graph);
        prop_assert!(undo.success);
        prop_assert_eq!(undo.rolled_back.len(), outcome.applied_change_sets.len());
        prop_assert_eq!(&undo.restored, &graph);
    }
}
