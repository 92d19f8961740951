use crate::ReqId;
use crate::policy::ActionKind;
use crate::requirement::{EdgeKind, Requirement, RequirementStatus};
use crate::violation::{ViolationCode, ViolationRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPart {
    pub id: ReqId,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbsorbedRequirement {
    pub id: ReqId,
    pub prior_status: RequirementStatus,

    #[serde(default)]
    pub prior_supersedes: BTreeSet<ReqId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextField {
    Title,
    Description,
}

impl TextField {
    pub fn as_str(self) -> &'static str {
        match self {
            TextField::Title => "title",
            TextField::Description => "description",
        }
    }
}

/// Typed edit operation.
///
/// Every variant carries the prior values it overwrites so the engine can invert it without
/// consulting anything but the graph it is handed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeOp {
    /// New `<target>-S<n>` parts derived from the target, which becomes superseded.
    Split {
        target: ReqId,
        parts: Vec<SplitPart>,
        prior_status: RequirementStatus,
        #[serde(default)]
        prior_supersedes: BTreeSet<ReqId>,
    },
    /// `canonical` absorbs the others; they become superseded pointing at it.
    Merge {
        canonical: ReqId,
        absorbed: Vec<AbsorbedRequirement>,
        merged_description: String,
        prior_description: String,
        #[serde(default)]
        prior_canonical_of: BTreeSet<ReqId>,
    },
    Rewrite {
        target: ReqId,
        field: TextField,
        old: String,
        new: String,
    },
    /// Add and remove ids on one edge kind of `from`.
    Rewire {
        from: ReqId,
        edge: EdgeKind,
        #[serde(default)]
        add: BTreeSet<ReqId>,
        #[serde(default)]
        remove: BTreeSet<ReqId>,
    },
    /// Insert an intermediate node and optionally point `reparent` at it instead of its old
    /// parents.
    Introduce {
        requirement: Box<Requirement>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reparent: Option<ReqId>,
        #[serde(default)]
        prior_refines: BTreeSet<ReqId>,
    },
    Alias {
        target: ReqId,
        alias_for: ReqId,
        prior_status: RequirementStatus,
        #[serde(default)]
        prior_supersedes: BTreeSet<ReqId>,
    },
    /// Remove the edge `from -> to` from every listed edge kind.
    BreakCycle {
        from: ReqId,
        to: ReqId,
        removed_from: Vec<EdgeKind>,
        #[serde(default)]
        cycle: Vec<ReqId>,
    },
}

impl ChangeOp {
    pub fn kind(&self) -> ActionKind {
        match self {
            ChangeOp::Split { .. } => ActionKind::Split,
            ChangeOp::Merge { .. } => ActionKind::Merge,
            ChangeOp::Rewrite { .. } => ActionKind::Rewrite,
            ChangeOp::Rewire { .. } => ActionKind::Rewire,
            ChangeOp::Introduce { .. } => ActionKind::Introduce,
            ChangeOp::Alias { .. } => ActionKind::Alias,
            ChangeOp::BreakCycle { .. } => ActionKind::BreakCycle,
        }
    }

    /// The requirement the operation is "about".
    pub fn primary_target(&self) -> &str {
        match self {
            ChangeOp::Split { target, .. }
            | ChangeOp::Rewrite { target, .. }
            | ChangeOp::Alias { target, .. } => target,
            ChangeOp::Merge { canonical, .. } => canonical,
            ChangeOp::Rewire { from, .. } | ChangeOp::BreakCycle { from, .. } => from,
            ChangeOp::Introduce {
                requirement,
                reparent,
                ..
            } => reparent.as_deref().unwrap_or(requirement.id.as_str()),
        }
    }

    /// Existing requirements the operation modifies.
    pub fn targets(&self) -> Vec<ReqId> {
        match self {
            ChangeOp::Split { target, .. }
            | ChangeOp::Rewrite { target, .. }
            | ChangeOp::Alias { target, .. } => vec![target.clone()],
            ChangeOp::Merge {
                canonical,
                absorbed,
                ..
            } => std::iter::once(canonical.clone())
                .chain(absorbed.iter().map(|a| a.id.clone()))
                .collect(),
            ChangeOp::Rewire { from, .. } | ChangeOp::BreakCycle { from, .. } => {
                vec![from.clone()]
            }
            ChangeOp::Introduce { reparent, .. } => reparent.iter().cloned().collect(),
        }
    }

    /// Requirements the operation brings into existence.
    pub fn created_ids(&self) -> Vec<ReqId> {
        match self {
            ChangeOp::Split { parts, .. } => parts.iter().map(|p| p.id.clone()).collect(),
            ChangeOp::Introduce { requirement, .. } => vec![requirement.id.clone()],
            _ => Vec::new(),
        }
    }

    /// Requirements the operation moves to `superseded`.
    pub fn superseded_ids(&self) -> Vec<ReqId> {
        match self {
            ChangeOp::Split { target, .. } | ChangeOp::Alias { target, .. } => {
                vec![target.clone()]
            }
            ChangeOp::Merge { absorbed, .. } => absorbed.iter().map(|a| a.id.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Stable key used for ordering and deterministic ids.
    pub fn sort_key(&self) -> String {
        match self {
            ChangeOp::Split { target, parts, .. } => {
                format!("split|{}|{}", target, parts.len())
            }
            ChangeOp::Merge {
                canonical,
                absorbed,
                ..
            } => {
                let ids: Vec<&str> = absorbed.iter().map(|a| a.id.as_str()).collect();
                format!("merge|{}|{}", canonical, ids.join(","))
            }
            ChangeOp::Rewrite { target, field, .. } => {
                format!("rewrite|{}|{}", target, field.as_str())
            }
            ChangeOp::Rewire {
                from,
                edge,
                add,
                remove,
            } => {
                let add: Vec<&str> = add.iter().map(String::as_str).collect();
                let remove: Vec<&str> = remove.iter().map(String::as_str).collect();
                format!(
                    "rewire|{}|{}|+{}|-{}",
                    from,
                    edge,
                    add.join(","),
                    remove.join(",")
                )
            }
            ChangeOp::Introduce { requirement, .. } => format!("introduce|{}", requirement.id),
            ChangeOp::Alias {
                target, alias_for, ..
            } => format!("alias|{}|{}", target, alias_for),
            ChangeOp::BreakCycle { from, to, .. } => format!("break_cycle|{}|{}", from, to),
        }
    }

    /// Whether the recorded payload is enough to restore the prior state.
    pub fn is_reversible(&self) -> bool {
        match self {
            ChangeOp::Split { parts, .. } => !parts.is_empty(),
            ChangeOp::Merge { absorbed, .. } => !absorbed.is_empty(),
            ChangeOp::Rewire { add, remove, .. } => {
                !(add.is_empty() && remove.is_empty()) && add.is_disjoint(remove)
            }
            ChangeOp::BreakCycle { removed_from, .. } => !removed_from.is_empty(),
            ChangeOp::Rewrite { .. } | ChangeOp::Introduce { .. } | ChangeOp::Alias { .. } => {
                true
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreviewKind {
    Add,
    Remove,
    Modify,
    Rewire,
}

/// One structured before/after line of a change preview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewEntry {
    pub kind: PreviewKind,
    pub req_id: ReqId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,

    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    #[serde(flatten)]
    pub operation: ChangeOp,

    pub rationale: String,

    /// The violation this change resolves.
    pub addresses: ViolationRef,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<PreviewEntry>,
}

impl Change {
    pub fn kind(&self) -> ActionKind {
        self.operation.kind()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSetStatus {
    #[default]
    Proposed,
    Approved,
    Applied,
    RolledBack,
}

impl ChangeSetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeSetStatus::Proposed => "proposed",
            ChangeSetStatus::Approved => "approved",
            ChangeSetStatus::Applied => "applied",
            ChangeSetStatus::RolledBack => "rolled_back",
        }
    }

    pub fn can_transition_to(self, next: ChangeSetStatus) -> bool {
        matches!(
            (self, next),
            (ChangeSetStatus::Proposed, ChangeSetStatus::Approved)
                | (ChangeSetStatus::Approved, ChangeSetStatus::Applied)
                | (ChangeSetStatus::Applied, ChangeSetStatus::RolledBack)
        )
    }
}

impl fmt::Display for ChangeSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("change set {id}: illegal status transition {from} -> {to}")]
pub struct TransitionError {
    pub id: String,
    pub from: ChangeSetStatus,
    pub to: ChangeSetStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChangeSetMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,

    #[serde(default)]
    pub iteration: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,

    /// Position in the store's application history. Rollback runs newest first by this number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_seq: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
}

/// Atomic, reversible bundle of changes addressing one or more violations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub id: String,
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub violations: Vec<ViolationRef>,

    #[serde(default)]
    pub changes: Vec<Change>,

    #[serde(default)]
    pub impacted: BTreeSet<ReqId>,

    pub reversible: bool,

    #[serde(default)]
    pub status: ChangeSetStatus,

    #[serde(default)]
    pub metadata: ChangeSetMetadata,
}

impl ChangeSet {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            violations: Vec::new(),
            changes: Vec::new(),
            impacted: BTreeSet::new(),
            reversible: true,
            status: ChangeSetStatus::Proposed,
            metadata: ChangeSetMetadata::default(),
        }
    }

    pub fn transition(
        &mut self,
        next: ChangeSetStatus,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        match next {
            ChangeSetStatus::Approved => self.metadata.approved_at = Some(at),
            ChangeSetStatus::Applied => self.metadata.applied_at = Some(at),
            ChangeSetStatus::RolledBack => self.metadata.rolled_back_at = Some(at),
            ChangeSetStatus::Proposed => {}
        }
        Ok(())
    }

    pub fn approve(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(ChangeSetStatus::Approved, at)
    }

    pub fn mark_applied(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(ChangeSetStatus::Applied, at)
    }

    pub fn mark_rolled_back(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(ChangeSetStatus::RolledBack, at)
    }

    /// Distinct violation codes, in first-seen order.
    pub fn violation_codes(&self) -> Vec<ViolationCode> {
        let mut out: Vec<ViolationCode> = Vec::new();
        for v in &self.violations {
            if !out.contains(&v.code) {
                out.push(v.code.clone());
            }
        }
        out
    }

    pub fn violation_ids(&self) -> impl Iterator<Item = &str> {
        self.violations.iter().map(|v| v.id.as_str())
    }

    /// Recompute `reversible` from the changes it carries.
    pub fn refresh_reversible(&mut self) {
        self.reversible = !self.changes.is_empty()
            && self.changes.iter().all(|c| c.operation.is_reversible());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn lifecycle_is_enforced() {
        let mut cs = ChangeSet::new("cs-1", at());
        assert!(cs.mark_applied(at()).is_err());
        cs.approve(at()).expect("approve");
        cs.mark_applied(at()).expect("apply");
        cs.mark_rolled_back(at()).expect("rollback");

        let err = cs.approve(at()).expect_err("rolled back is terminal");
        assert_eq!(err.from, ChangeSetStatus::RolledBack);
        assert_eq!(err.to, ChangeSetStatus::Approved);
        assert!(err.to_string().contains("rolled_back -> approved"));
    }

    #[test]
    fn change_serializes_with_op_tag() {
        let change = Change {
            operation: ChangeOp::BreakCycle {
                from: "C".into(),
                to: "A".into(),
                removed_from: vec![EdgeKind::DependsOn],
                cycle: vec!["A".into(), "B".into(), "C".into()],
            },
            rationale: "cut cycle".into(),
            addresses: ViolationRef {
                id: "v1".into(),
                code: ViolationCode::Cycle,
                req_id: "A".into(),
            },
            preview: vec![],
        };
        let value = serde_json::to_value(&change).expect("serialize");
        assert_eq!(value["op"], "break_cycle");
        assert_eq!(value["addresses"]["code"], "graph.cycle");

        let back: Change = serde_json::from_value(value).expect("deserialize");
        assert_eq!(back, change);
    }

    #[test]
    fn degenerate_rewire_is_not_reversible() {
        let op = ChangeOp::Rewire {
            from: "A".into(),
            edge: EdgeKind::Refines,
            add: BTreeSet::new(),
            remove: BTreeSet::new(),
        };
        assert!(!op.is_reversible());
    }

    #[test]
    fn violation_codes_are_deduplicated_in_order() {
        let mut cs = ChangeSet::new("cs", at());
        for (id, code) in [
            ("1", ViolationCode::AtomicityLow),
            ("2", ViolationCode::MissingSubject),
            ("3", ViolationCode::AtomicityLow),
        ] {
            cs.violations.push(ViolationRef {
                id: id.into(),
                code,
                req_id: "R".into(),
            });
        }
        assert_eq!(
            cs.violation_codes(),
            vec![ViolationCode::AtomicityLow, ViolationCode::MissingSubject]
        );
    }
}
