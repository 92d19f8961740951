use chrono::{DateTime, Utc};
use proptest::prelude::*;
use reqfix_edit::{ChangeEngine, apply_change};
use reqfix_types::changeset::{
    AbsorbedRequirement, Change, ChangeOp, ChangeSet, SplitPart, TextField,
};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::requirement::{EdgeKind, Requirement};
use reqfix_types::violation::{ViolationCode, ViolationRef};
use std::collections::BTreeSet;

fn at() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

fn build_graph(n: usize, deps: &[(usize, usize)], parents: &[(usize, usize)]) -> RequirementGraph {
    let mut reqs: Vec<Requirement> = (0..n)
        .map(|i| Requirement::new(format!("R{i}"), format!("title {i}"), "system"))
        .collect();
    for &(a, b) in deps {
        let (a, b) = (a % n, b % n);
        if a != b {
            reqs[a].depends_on.insert(format!("R{b}"));
        }
    }
    for &(a, b) in parents {
        let (a, b) = (a % n, b % n);
        if a != b {
            reqs[a].refines.insert(format!("R{b}"));
        }
    }
    RequirementGraph::from(reqs)
}

/// Build an op against the current scratch state, recording its prior values.
fn make_op(scratch: &RequirementGraph, step: usize, kind: u8, i: usize, j: usize) -> Option<ChangeOp> {
    let ids: Vec<String> = scratch.ids().cloned().collect();
    let a = scratch.get(&ids[i % ids.len()])?;
    let b = scratch.get(&ids[j % ids.len()])?;
    let op = match kind % 7 {
        0 => ChangeOp::Rewrite {
            target: a.id.clone(),
            field: TextField::Description,
            old: a.description.clone(),
            new: format!("{} v{step}", a.description),
        },
        1 => {
            let (add, remove) = if a.depends_on.contains(&b.id) {
                (BTreeSet::new(), BTreeSet::from([b.id.clone()]))
            } else {
                (BTreeSet::from([b.id.clone()]), BTreeSet::new())
            };
            ChangeOp::Rewire {
                from: a.id.clone(),
                edge: EdgeKind::DependsOn,
                add,
                remove,
            }
        }
        2 => ChangeOp::Split {
            target: a.id.clone(),
            parts: (1..=2)
                .map(|n| SplitPart {
                    id: format!("{}-S{step}{n}", a.id),
                    title: format!("part {n}"),
                    description: format!("part {n} of {}", a.id),
                })
                .collect(),
            prior_status: a.status,
            prior_supersedes: a.supersedes.clone(),
        },
        3 => ChangeOp::Alias {
            target: a.id.clone(),
            alias_for: b.id.clone(),
            prior_status: a.status,
            prior_supersedes: a.supersedes.clone(),
        },
        4 => ChangeOp::Merge {
            canonical: a.id.clone(),
            absorbed: vec![AbsorbedRequirement {
                id: b.id.clone(),
                prior_status: b.status,
                prior_supersedes: b.supersedes.clone(),
            }],
            merged_description: format!("{}\n\n{}", a.description, b.description),
            prior_description: a.description.clone(),
            prior_canonical_of: a.canonical_of.clone(),
        },
        5 => ChangeOp::BreakCycle {
            from: a.id.clone(),
            to: b.id.clone(),
            removed_from: EdgeKind::ALL
                .iter()
                .copied()
                .filter(|k| a.edges(*k).contains(&b.id))
                .collect(),
            cycle: vec![a.id.clone(), b.id.clone()],
        },
        _ => {
            let mut mid = Requirement::new(format!("M{step}"), "intermediate", "system");
            mid.refines = a.refines.clone();
            ChangeOp::Introduce {
                requirement: Box::new(mid),
                reparent: Some(a.id.clone()),
                prior_refines: a.refines.clone(),
            }
        }
    };
    Some(op)
}

fn build_change_set(graph: &RequirementGraph, steps: &[(u8, usize, usize)]) -> ChangeSet {
    let mut cs = ChangeSet::new("cs-prop", at());
    let mut scratch = graph.clone();
    for (step, &(kind, i, j)) in steps.iter().enumerate() {
        let Some(op) = make_op(&scratch, step, kind, i, j) else {
            continue;
        };
        if apply_change(&mut scratch, &op).is_ok() {
            cs.changes.push(Change {
                operation: op,
                rationale: "prop".into(),
                addresses: ViolationRef {
                    id: "v".into(),
                    code: ViolationCode::Cycle,
                    req_id: "R0".into(),
                },
                preview: Vec::new(),
            });
        }
    }
    cs.refresh_reversible();
    cs
}

proptest! {
    #[test]
    fn rollback_restores_exact_snapshot(
        n in 2usize..7,
        deps in prop::collection::vec((0usize..7, 0usize..7), 0..10),
        parents in prop::collection::vec((0usize..7, 0usize..7), 0..5),
        steps in prop::collection::vec((0u8..7, 0usize..20, 0usize..20), 1..8),
    ) {
        let graph = build_graph(n, &deps, &parents);
        let cs = build_change_set(&graph, &steps);
        prop_assume!(!cs.changes.is_empty());

        let engine = ChangeEngine::new();
        let applied = engine.apply(&cs, &graph);
        prop_assert!(applied.success, "apply failed: {:?}", applied.errors);

        let rolled = engine.rollback(&cs, &applied.modified);
        prop_assert!(rolled.success, "rollback failed: {:?}", rolled.errors);
        prop_assert_eq!(rolled.restored, graph);
    }

    #[test]
    fn failed_apply_never_changes_input(
        n in 2usize..6,
        deps in prop::collection::vec((0usize..6, 0usize..6), 0..8),
        steps in prop::collection::vec((0u8..7, 0usize..20, 0usize..20), 1..6),
    ) {
        let graph = build_graph(n, &deps, &[]);
        let cs = build_change_set(&graph, &steps);
        prop_assume!(!cs.changes.is_empty());

        // Apply twice: the second attempt hits stale preconditions on the first change.
        let engine = ChangeEngine::new();
        let once = engine.apply(&cs, &graph);
        prop_assert!(once.success);
        let twice = engine.apply(&cs, &once.modified);
        if !twice.success {
            prop_assert_eq!(twice.modified, once.modified);
        }
    }
}
