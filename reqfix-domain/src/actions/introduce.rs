use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::changeset::ChangeOp;
use reqfix_types::policy::ActionKind;
use reqfix_types::requirement::{Requirement, RequirementStatus};

/// Insert an intermediate requirement between the target and its parents.
///
/// The new node takes the target's parents and the target is re-pointed at it. With an ontology,
/// the node's stage is the bridging stage between the first parent and the target.
pub struct IntroducePlanner;

impl ActionPlanner for IntroducePlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::Introduce
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let Some(req) = input.live_target() else {
            return Vec::new();
        };
        let id = format!("{}-INT", req.id);
        if input.graph.contains(&id) {
            return Vec::new();
        }

        let parent = req.refines.iter().find_map(|p| input.graph.get(p));
        let stage = match (input.ontology, parent) {
            (Some(ontology), Some(parent)) => ontology
                .bridging_stage(&parent.stage, &req.stage)
                .map(|s| s.id.clone())
                .unwrap_or_else(|| req.stage.clone()),
            _ => req.stage.clone(),
        };

        let mut mid = Requirement::new(id, format!("{} (intermediate)", req.title), stage)
            .with_description(format!(
                "{} (introduced to bridge the abstraction gap above {})",
                req.description.trim_end(),
                req.id
            ))
            .with_priority(req.priority)
            .with_status(RequirementStatus::Draft);
        mid.refines = req.refines.clone();

        vec![PlannedOp {
            rationale: format!(
                "{}: insert {} between {} and its parents",
                input.violation.code, mid.id, req.id
            ),
            op: ChangeOp::Introduce {
                requirement: Box::new(mid),
                reparent: Some(req.id.clone()),
                prior_refines: req.refines.clone(),
            },
        }]
    }
}
