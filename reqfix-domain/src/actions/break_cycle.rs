use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::changeset::ChangeOp;
use reqfix_types::policy::ActionKind;
use reqfix_types::requirement::EdgeKind;

/// Cut the closing edge of a reported cycle: last member -> first member.
pub struct BreakCyclePlanner;

impl ActionPlanner for BreakCyclePlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::BreakCycle
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let cycle = &input.violation.cycle;
        let (Some(first), Some(last)) = (cycle.first(), cycle.last()) else {
            return Vec::new();
        };
        let Some(from) = input.graph.get(last) else {
            return Vec::new();
        };
        let removed_from: Vec<EdgeKind> = EdgeKind::ALL
            .into_iter()
            .filter(|kind| from.edges(*kind).contains(first))
            .collect();
        // Already cut, e.g. by another report of the same cycle.
        if removed_from.is_empty() {
            return Vec::new();
        }

        vec![PlannedOp {
            rationale: format!(
                "{}: cut {} -> {} to break the cycle {}",
                input.violation.code,
                last,
                first,
                cycle.join(" -> ")
            ),
            op: ChangeOp::BreakCycle {
                from: last.clone(),
                to: first.clone(),
                removed_from,
                cycle: cycle.clone(),
            },
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{run, violation};
    use pretty_assertions::assert_eq;
    use reqfix_types::graph::RequirementGraph;
    use reqfix_types::policy::ActionParams;
    use reqfix_types::requirement::Requirement;
    use reqfix_types::violation::ViolationCode;

    fn cyclic() -> RequirementGraph {
        RequirementGraph::from(vec![
            Requirement::new("A", "a", "system").depending_on("B"),
            Requirement::new("B", "b", "system").depending_on("C"),
            Requirement::new("C", "c", "system").depending_on("A"),
        ])
    }

    #[test]
    fn cuts_closing_edge() {
        let v = violation("A", ViolationCode::Cycle)
            .with_cycle(vec!["A".into(), "B".into(), "C".into()]);
        let ops = run(&BreakCyclePlanner, &cyclic(), &v, &ActionParams::default());
        assert_eq!(
            ops[0].op,
            ChangeOp::BreakCycle {
                from: "C".into(),
                to: "A".into(),
                removed_from: vec![EdgeKind::DependsOn],
                cycle: vec!["A".into(), "B".into(), "C".into()],
            }
        );
    }

    #[test]
    fn missing_cycle_evidence_plans_nothing() {
        let v = violation("A", ViolationCode::Cycle);
        assert!(run(&BreakCyclePlanner, &cyclic(), &v, &ActionParams::default()).is_empty());
    }
}
