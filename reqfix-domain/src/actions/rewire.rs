use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::ReqId;
use reqfix_types::changeset::ChangeOp;
use reqfix_types::policy::ActionKind;
use reqfix_types::requirement::{EdgeKind, Requirement, RequirementStatus};
use reqfix_types::violation::ViolationCode;
use std::collections::BTreeSet;

/// Repairs links: drops dangling references and attaches a parent where the hierarchy needs one.
pub struct RewirePlanner;

impl ActionPlanner for RewirePlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::Rewire
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let Some(req) = input.live_target() else {
            return Vec::new();
        };
        let code = &input.violation.code;
        let mut out = Vec::new();

        for kind in EdgeKind::ALL {
            let missing: BTreeSet<ReqId> = req
                .edges(kind)
                .iter()
                .filter(|id| !input.graph.contains(id))
                .cloned()
                .collect();
            if missing.is_empty() {
                continue;
            }
            out.push(PlannedOp {
                rationale: format!(
                    "{}: drop {} reference(s) from {} to missing requirements",
                    code, kind, req.id
                ),
                op: ChangeOp::Rewire {
                    from: req.id.clone(),
                    edge: kind,
                    add: BTreeSet::new(),
                    remove: missing,
                },
            });
        }

        let needs_parent = matches!(
            code,
            ViolationCode::MissingParent
                | ViolationCode::ParentNotFound
                | ViolationCode::InvalidDerivation
        );
        if needs_parent {
            if let Some(parent) = parent_candidate(input, req) {
                // An invalid parent is replaced; a missing one was dropped above.
                let remove: BTreeSet<ReqId> = if *code == ViolationCode::InvalidDerivation {
                    req.refines
                        .iter()
                        .filter(|id| input.graph.contains(id))
                        .cloned()
                        .collect()
                } else {
                    BTreeSet::new()
                };
                out.push(PlannedOp {
                    rationale: format!("{}: attach {} under {}", code, req.id, parent.id),
                    op: ChangeOp::Rewire {
                        from: req.id.clone(),
                        edge: EdgeKind::Refines,
                        add: BTreeSet::from([parent.id.clone()]),
                        remove,
                    },
                });
            }
        }

        out
    }
}

/// First live related requirement, or failing that the single live requirement whose stage the
/// ontology allows as a parent.
fn parent_candidate<'a>(input: &ActionInput<'a>, req: &Requirement) -> Option<&'a Requirement> {
    let eligible = |r: &&Requirement| r.id != req.id && !req.refines.contains(&r.id);

    if let Some(r) = input.live_related().into_iter().find(eligible) {
        return Some(r);
    }

    let ontology = input.ontology?;
    let parent_stages = ontology.allowed_parent_stages(&req.stage);
    let mut candidates = input
        .graph
        .iter()
        .filter(|r| r.status != RequirementStatus::Superseded)
        .filter(|r| parent_stages.contains(&r.stage))
        .filter(eligible);
    match (candidates.next(), candidates.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}
