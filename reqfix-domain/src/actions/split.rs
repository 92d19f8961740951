use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::changeset::{ChangeOp, SplitPart};
use reqfix_types::policy::ActionKind;
use tracing::debug;

const DEFAULT_MAX_PARTS: usize = 5;

/// Separators tried in order when a description has no list structure.
const CONJUNCTIONS: &[&str] = &[" and ", " or ", ", "];

pub struct SplitPlanner;

impl ActionPlanner for SplitPlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::Split
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let Some(req) = input.live_target() else {
            return Vec::new();
        };
        let max_parts = input.params.max_parts.unwrap_or(DEFAULT_MAX_PARTS).max(2);
        let texts = split_text(&req.description, max_parts);
        if texts.len() < 2 {
            return Vec::new();
        }

        let total = texts.len();
        let parts: Vec<SplitPart> = texts
            .into_iter()
            .enumerate()
            .map(|(i, description)| SplitPart {
                id: format!("{}-S{}", req.id, i + 1),
                title: format!("{} ({}/{})", req.title, i + 1, total),
                description,
            })
            .collect();

        if let Some(taken) = parts.iter().find(|p| input.graph.contains(&p.id)) {
            debug!(target_req = %req.id, id = %taken.id, "split part id already taken");
            return Vec::new();
        }

        vec![PlannedOp {
            rationale: format!(
                "{}: {} bundles {} concerns; split into separate requirements",
                input.violation.code, req.id, total
            ),
            op: ChangeOp::Split {
                target: req.id.clone(),
                parts,
                prior_status: req.status,
                prior_supersedes: req.supersedes.clone(),
            },
        }]
    }
}

/// Break a description into at most `max_parts` non-empty statements.
///
/// List structure (lines, semicolons) wins over conjunctions; with neither, the text is halved
/// at the whitespace nearest its middle. A text with no whitespace yields nothing.
pub fn split_text(text: &str, max_parts: usize) -> Vec<String> {
    let text = text.trim();
    if text.is_empty() || max_parts < 2 {
        return Vec::new();
    }

    let items: Vec<&str> = text
        .split(['\n', ';'])
        .map(|s| s.trim().trim_start_matches(['-', '*']).trim())
        .filter(|s| !s.is_empty())
        .collect();
    if items.len() >= 2 {
        return cap(items, max_parts, "; ");
    }

    for sep in CONJUNCTIONS {
        let pieces: Vec<&str> = text
            .split(sep)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if pieces.len() >= 2 {
            return cap(pieces, max_parts, sep);
        }
    }

    halve(text)
}

fn cap(pieces: Vec<&str>, max_parts: usize, sep: &str) -> Vec<String> {
    if pieces.len() <= max_parts {
        return pieces.into_iter().map(str::to_string).collect();
    }
    let (head, tail) = pieces.split_at(max_parts - 1);
    let mut out: Vec<String> = head.iter().map(|s| s.to_string()).collect();
    out.push(tail.join(sep).trim().to_string());
    out
}

fn halve(text: &str) -> Vec<String> {
    let mid = text.len() / 2;
    let cut = text
        .char_indices()
        .filter(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .min_by_key(|i| i.abs_diff(mid));
    match cut {
        Some(i) => {
            let (a, b) = text.split_at(i);
            let (a, b) = (a.trim(), b.trim());
            if a.is_empty() || b.is_empty() {
                Vec::new()
            } else {
                vec![a.to_string(), b.to_string()]
            }
        }
        None => Vec::new(),
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

    #[test]
    fn list_items_win_over_conjunctions() {
        assert_eq!(
            split_text("- log in and out\n- export reports", 5),
            vec!["log in and out", "export reports"]
        );
    }

    #[test]
    fn conjunction_split() {
        assert_eq!(
            split_text("Users log in and users export reports", 5),
            vec!["Users log in", "users export reports"]
        );
    }

    #[test]
    fn excess_parts_fold_into_last() {
        assert_eq!(split_text("a; b; c; d", 3), vec!["a", "b", "c; d"]);
    }

    #[test]
    fn single_word_cannot_split() {
        assert!(split_text("Login", 5).is_empty());
        assert_eq!(split_text("alpha beta", 5), vec!["alpha", "beta"]);
    }

    #[test]
    fn planner_names_parts_after_target() {
        let graph = RequirementGraph::from(vec![
            Requirement::new("F-1", "Access", "system_functional")
                .with_description("Users log in and users export reports"),
        ]);
        let v = violation("F-1", ViolationCode::AtomicityLow);
        let ops = run(&SplitPlanner, &graph, &v, &ActionParams::default());
        assert_eq!(ops.len(), 1);
        let ChangeOp::Split { parts, .. } = &ops[0].op else {
            panic!("expected split");
        };
        let ids: Vec<_> = parts.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["F-1-S1", "F-1-S2"]);
        assert_eq!(parts[1].title, "Access (2/2)");
    }

    #[test]
    fn taken_part_id_skips_split() {
        let graph = RequirementGraph::from(vec![
            Requirement::new("F-1", "Access", "system_functional")
                .with_description("log in and export"),
            Requirement::new("F-1-S2", "Existing", "system_functional"),
        ]);
        let v = violation("F-1", ViolationCode::AtomicityLow);
        assert!(run(&SplitPlanner, &graph, &v, &ActionParams::default()).is_empty());
    }
}
