use crate::ReqId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementStatus {
    #[default]
    Draft,
    Proposed,
    Approved,
    InProgress,
    Completed,
    Rejected,
    OnHold,
    Superseded,
}

impl RequirementStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequirementStatus::Draft => "draft",
            RequirementStatus::Proposed => "proposed",
            RequirementStatus::Approved => "approved",
            RequirementStatus::InProgress => "in_progress",
            RequirementStatus::Completed => "completed",
            RequirementStatus::Rejected => "rejected",
            RequirementStatus::OnHold => "on_hold",
            RequirementStatus::Superseded => "superseded",
        }
    }

    /// Work has already been spent on the requirement.
    pub fn is_sunk_cost(self) -> bool {
        matches!(
            self,
            RequirementStatus::InProgress | RequirementStatus::Completed
        )
    }
}

impl fmt::Display for RequirementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn is_high(self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outgoing edge kinds carried on a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Refines,
    DependsOn,
    DerivedFrom,
    Supersedes,
    CanonicalOf,
}

impl EdgeKind {
    pub const ALL: [EdgeKind; 5] = [
        EdgeKind::Refines,
        EdgeKind::DependsOn,
        EdgeKind::DerivedFrom,
        EdgeKind::Supersedes,
        EdgeKind::CanonicalOf,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EdgeKind::Refines => "refines",
            EdgeKind::DependsOn => "depends_on",
            EdgeKind::DerivedFrom => "derived_from",
            EdgeKind::Supersedes => "supersedes",
            EdgeKind::CanonicalOf => "canonical_of",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text metrics attached by the analysis layer. Scores are in `[0, 1]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NlpMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "token_count")]
    pub token_length: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "abstraction_level")]
    pub abstraction_score: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "atomicity")]
    pub atomicity_score: Option<f64>,
}

/// A single node of the requirement graph.
///
/// `id` never changes once the node exists; edits replace every other field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: ReqId,
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub status: RequirementStatus,

    #[serde(default)]
    pub priority: Priority,

    /// Ontology stage id (`stakeholder`, `system`, `system_functional`, ...).
    #[serde(alias = "type")]
    pub stage: String,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub refines: BTreeSet<ReqId>,

    #[serde(default, alias = "dependencies", skip_serializing_if = "BTreeSet::is_empty")]
    pub depends_on: BTreeSet<ReqId>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub derived_from: BTreeSet<ReqId>,

    /// Nodes that take over once this one is superseded.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub supersedes: BTreeSet<ReqId>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub canonical_of: BTreeSet<ReqId>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "analysis")]
    pub metrics: Option<NlpMetrics>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
}

impl Requirement {
    pub fn new(id: impl Into<ReqId>, title: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: RequirementStatus::default(),
            priority: Priority::default(),
            stage: stage.into(),
            refines: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            derived_from: BTreeSet::new(),
            supersedes: BTreeSet::new(),
            canonical_of: BTreeSet::new(),
            metrics: None,
            tags: Vec::new(),
            rationale: None,
            author: None,
            assignee: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: RequirementStatus) -> Self {
        self.status = status;
        self
    }

    pub fn refining(mut self, parent: impl Into<ReqId>) -> Self {
        self.refines.insert(parent.into());
        self
    }

    pub fn depending_on(mut self, dep: impl Into<ReqId>) -> Self {
        self.depends_on.insert(dep.into());
        self
    }

    pub fn edges(&self, kind: EdgeKind) -> &BTreeSet<ReqId> {
        match kind {
            EdgeKind::Refines => &self.refines,
            EdgeKind::DependsOn => &self.depends_on,
            EdgeKind::DerivedFrom => &self.derived_from,
            EdgeKind::Supersedes => &self.supersedes,
            EdgeKind::CanonicalOf => &self.canonical_of,
        }
    }

    pub fn edges_mut(&mut self, kind: EdgeKind) -> &mut BTreeSet<ReqId> {
        match kind {
            EdgeKind::Refines => &mut self.refines,
            EdgeKind::DependsOn => &mut self.depends_on,
            EdgeKind::DerivedFrom => &mut self.derived_from,
            EdgeKind::Supersedes => &mut self.supersedes,
            EdgeKind::CanonicalOf => &mut self.canonical_of,
        }
    }

    /// Every outgoing edge as `(kind, target)`.
    pub fn outgoing(&self) -> impl Iterator<Item = (EdgeKind, &ReqId)> {
        EdgeKind::ALL
            .into_iter()
            .flat_map(move |kind| self.edges(kind).iter().map(move |to| (kind, to)))
    }

    pub fn abstraction_score(&self) -> Option<f64> {
        self.metrics.as_ref().and_then(|m| m.abstraction_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_alias_is_accepted() {
        let req: Requirement = serde_json::from_value(serde_json::json!({
            "id": "SYS-1",
            "title": "Login",
            "type": "system",
            "dependencies": ["SYS-2", "SYS-0"],
        }))
        .expect("parse requirement");

        assert_eq!(req.stage, "system");
        assert_eq!(
            req.depends_on.iter().cloned().collect::<Vec<_>>(),
            vec!["SYS-0".to_string(), "SYS-2".to_string()]
        );
        assert_eq!(req.status, RequirementStatus::Draft);
        assert_eq!(req.priority, Priority::Medium);
    }

    #[test]
    fn outgoing_lists_edges_by_kind() {
        let req = Requirement::new("F-1", "f", "system_functional")
            .refining("SYS-1")
            .depending_on("F-0");
        let edges: Vec<_> = req.outgoing().map(|(k, to)| (k, to.as_str())).collect();
        assert_eq!(
            edges,
            vec![(EdgeKind::Refines, "SYS-1"), (EdgeKind::DependsOn, "F-0")]
        );
    }

    #[test]
    fn sunk_cost_statuses() {
        assert!(RequirementStatus::InProgress.is_sunk_cost());
        assert!(RequirementStatus::Completed.is_sunk_cost());
        assert!(!RequirementStatus::Approved.is_sunk_cost());
    }
}
