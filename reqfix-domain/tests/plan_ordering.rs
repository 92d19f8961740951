use chrono::{DateTime, Utc};
use proptest::prelude::*;
use reqfix_domain::{FixPlanner, PlanContext};
use reqfix_domain_policy::{PolicyFormat, parse_policy_str};
use reqfix_edit::ChangeEngine;
use reqfix_types::graph::RequirementGraph;
use reqfix_types::policy::FixPolicy;
use reqfix_types::requirement::Requirement;
use reqfix_types::violation::{Violation, ViolationCode};

const POLICY: &str = r#"
name = "ordering"
mode = "strict"

[[rules]]
id = "subject"
when_violation = "style.missing_subject"
priority = 3
actions = [{ use = "rewrite", mode = "auto" }]

[[rules]]
id = "atomic"
when_violation = "atomicity.low"
priority = 2
actions = [{ use = "split", mode = "auto" }]

[[rules]]
id = "cycles"
when_violation = "graph.cycle"
group_by = "root_cause"
actions = [{ use = "break_cycle", mode = "auto" }]
"#;

fn policy() -> FixPolicy {
    parse_policy_str(POLICY, PolicyFormat::Toml).expect("policy")
}

fn at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

fn graph(n: usize) -> RequirementGraph {
    (0..n)
        .map(|i| {
            Requirement::new(format!("F-{i}"), format!("feature {i}"), "system_functional")
                .with_description(format!("log in {i} and export {i}"))
                .depending_on(format!("F-{}", (i + 1) % n))
        })
        .collect()
}

fn violations(n: usize) -> Vec<Violation> {
    let cycle: Vec<String> = (0..n).map(|i| format!("F-{i}")).collect();
    let mut out = Vec::new();
    for i in 0..n {
        let id = format!("F-{i}");
        out.push(Violation::new(id.clone(), ViolationCode::MissingSubject, "no subject"));
        out.push(Violation::new(id.clone(), ViolationCode::AtomicityLow, "two concerns"));
        out.push(Violation::new(id, ViolationCode::Cycle, "on a cycle").with_cycle(cycle.clone()));
    }
    out
}

proptest! {
    #[test]
    fn plan_is_independent_of_violation_order(
        n in 2usize..6,
        seed in prop::collection::vec(any::<u32>(), 0..40),
    ) {
        let policy = policy();
        let graph = graph(n);
        let ctx = PlanContext { policy: &policy, ontology: None, iteration: 1, created_at: at() };

        let base = violations(n);
        let mut shuffled = base.clone();
        for (i, s) in seed.iter().enumerate() {
            let len = shuffled.len();
            shuffled.swap(i % len, (*s as usize) % len);
        }

        let planner = FixPlanner::new();
        let a = planner.plan(&ctx, &base, &graph);
        let b = planner.plan(&ctx, &shuffled, &graph);
        prop_assert_eq!(a, b);
    }

    #[test]
    fn every_planned_change_set_applies_to_the_snapshot(n in 2usize..6) {
        let policy = policy();
        let graph = graph(n);
        let ctx = PlanContext { policy: &policy, ontology: None, iteration: 1, created_at: at() };
        let plan = FixPlanner::new().plan(&ctx, &violations(n), &graph);

        prop_assert!(!plan.change_sets.is_empty());
        let engine = ChangeEngine::new();
        for cs in &plan.change_sets {
            let applied = engine.apply(cs, &graph);
            prop_assert!(applied.success, "{} failed: {:?}", cs.id, applied.errors);
            let rolled = engine.rollback(cs, &applied.modified);
            prop_assert_eq!(&rolled.restored, &graph);
        }
    }
}
