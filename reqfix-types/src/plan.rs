use crate::changeset::ChangeSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EstimatedImpact {
    pub requirements_affected: u64,
    pub new_requirements: u64,
    pub modified_requirements: u64,
    pub superseded_requirements: u64,
}

/// Output of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixPlan {
    #[serde(default)]
    pub change_sets: Vec<ChangeSet>,

    pub total_changes: u64,

    #[serde(default)]
    pub estimated_impact: EstimatedImpact,

    /// Rendered markdown summary of every change set.
    #[serde(default)]
    pub preview: String,
}

impl FixPlan {
    pub fn is_empty(&self) -> bool {
        self.change_sets.is_empty()
    }
}
