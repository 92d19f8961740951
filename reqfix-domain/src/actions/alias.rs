use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::changeset::ChangeOp;
use reqfix_types::policy::ActionKind;

/// Retire the target in favour of the first live related requirement.
pub struct AliasPlanner;

impl ActionPlanner for AliasPlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::Alias
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let Some(target) = input.live_target() else {
            return Vec::new();
        };
        let Some(canonical) = input.live_related().into_iter().next() else {
            return Vec::new();
        };

        vec![PlannedOp {
            rationale: format!(
                "{}: {} restates {}; keep it as an alias",
                input.violation.code, target.id, canonical.id
            ),
            op: ChangeOp::Alias {
                target: target.id.clone(),
                alias_for: canonical.id.clone(),
                prior_status: target.status,
                prior_supersedes: target.supersedes.clone(),
            },
        }]
    }
}
