use reqfix_ontology::OntologyManager;
use reqfix_types::changeset::ChangeOp;
use reqfix_types::graph::RequirementGraph;
use reqfix_types::policy::{ActionKind, ActionParams};
use reqfix_types::requirement::{Requirement, RequirementStatus};
use reqfix_types::violation::Violation;

mod alias;
mod break_cycle;
mod introduce;
mod merge;
mod rewire;
mod rewrite;
mod split;

pub use rewrite::has_subject;
pub use split::split_text;

/// What an action planner sees for one violation.
///
/// `graph` is the scratch snapshot of the change set under construction, so it already reflects
/// changes planned earlier in the same set.
pub struct ActionInput<'a> {
    pub violation: &'a Violation,
    pub graph: &'a RequirementGraph,
    pub params: &'a ActionParams,
    pub ontology: Option<&'a OntologyManager>,
}

impl<'a> ActionInput<'a> {
    /// The violation's target, unless it is missing or already superseded.
    pub fn live_target(&self) -> Option<&'a Requirement> {
        self.graph
            .get(&self.violation.req_id)
            .filter(|r| r.status != RequirementStatus::Superseded)
    }

    /// Related ids that exist, are not superseded and are not the target.
    pub fn live_related(&self) -> Vec<&'a Requirement> {
        self.violation
            .related
            .iter()
            .filter(|id| **id != self.violation.req_id)
            .filter_map(|id| self.graph.get(id))
            .filter(|r| r.status != RequirementStatus::Superseded)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedOp {
    pub op: ChangeOp,
    pub rationale: String,
}

pub trait ActionPlanner {
    fn kind(&self) -> ActionKind;

    /// Zero or more operations that address the violation. An empty result means the action
    /// does not apply (nothing to cut, no candidate, id already taken, ...).
    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp>;
}

pub fn builtin_action_planners() -> Vec<Box<dyn ActionPlanner>> {
    vec![
        Box::new(split::SplitPlanner),
        Box::new(merge::MergePlanner),
        Box::new(rewrite::RewritePlanner),
        Box::new(rewire::RewirePlanner),
        Box::new(introduce::IntroducePlanner),
        Box::new(alias::AliasPlanner),
        Box::new(break_cycle::BreakCyclePlanner),
    ]
}
