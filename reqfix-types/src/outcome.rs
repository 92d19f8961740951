use crate::changeset::ChangeSet;
use crate::graph::RequirementGraph;
use crate::violation::Violation;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedReason {
    FixedPoint,
    MaxIterationsReached,
    Error,
}

impl StoppedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StoppedReason::FixedPoint => "fixed_point",
            StoppedReason::MaxIterationsReached => "max_iterations_reached",
            StoppedReason::Error => "error",
        }
    }
}

impl fmt::Display for StoppedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyFailure {
    pub change_set_id: String,
    pub errors: Vec<String>,
}

/// Terminal result of a fix run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub schema: String,
    pub success: bool,

    #[serde(default)]
    pub applied_change_sets: Vec<ChangeSet>,

    /// Violations found by the final revalidation.
    #[serde(default)]
    pub new_violations: Vec<Violation>,

    /// Ids of violations resolved by applied change sets.
    #[serde(default)]
    pub fixed_violations: Vec<String>,

    pub iterations: u32,
    pub stopped_reason: StoppedReason,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub graph: RequirementGraph,

    /// Proposed change sets that need a human decision.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending_change_sets: Vec<ChangeSet>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub apply_failures: Vec<ApplyFailure>,

    /// Change sets whose auto-apply verdict differs between per-change rule resolution and the
    /// first-violation-code reading.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub auto_apply_discrepancies: Vec<String>,
}

impl FixOutcome {
    pub fn new(graph: RequirementGraph) -> Self {
        Self {
            schema: crate::schema::REQFIX_OUTCOME_V1.to_string(),
            success: false,
            applied_change_sets: Vec::new(),
            new_violations: Vec::new(),
            fixed_violations: Vec::new(),
            iterations: 0,
            stopped_reason: StoppedReason::FixedPoint,
            error: None,
            graph,
            pending_change_sets: Vec::new(),
            apply_failures: Vec::new(),
            auto_apply_discrepancies: Vec::new(),
        }
    }
}

/// Result of rolling back a batch of change sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackAllResult {
    pub success: bool,

    /// Best-effort restored graph, even when some rollbacks failed.
    pub restored: RequirementGraph,

    #[serde(default)]
    pub errors: Vec<String>,

    /// Ids rolled back, in the order they were undone.
    #[serde(default)]
    pub rolled_back: Vec<String>,
}
