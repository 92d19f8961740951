use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::changeset::{AbsorbedRequirement, ChangeOp};
use reqfix_types::policy::ActionKind;

pub struct MergePlanner;

impl ActionPlanner for MergePlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::Merge
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let Some(canonical) = input.live_target() else {
            return Vec::new();
        };
        let absorbed: Vec<AbsorbedRequirement> = input
            .live_related()
            .into_iter()
            .filter(|r| !canonical.canonical_of.contains(&r.id))
            .map(|r| AbsorbedRequirement {
                id: r.id.clone(),
                prior_status: r.status,
                prior_supersedes: r.supersedes.clone(),
            })
            .collect();
        if absorbed.is_empty() {
            return Vec::new();
        }

        let ids: Vec<&str> = absorbed.iter().map(|a| a.id.as_str()).collect();
        let merged_description = format!(
            "{} (merged from: {})",
            canonical.description.trim_end(),
            ids.join(", ")
        );

        vec![PlannedOp {
            rationale: format!(
                "{}: {} duplicates {}; keep {} as canonical",
                input.violation.code,
                ids.join(", "),
                canonical.id,
                canonical.id
            ),
            op: ChangeOp::Merge {
                canonical: canonical.id.clone(),
                absorbed,
                merged_description,
                prior_description: canonical.description.clone(),
                prior_canonical_of: canonical.canonical_of.clone(),
            },
        }]
    }
}
