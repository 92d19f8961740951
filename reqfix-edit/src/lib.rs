//! Edit engine for reqfix change sets.
//!
//! Responsibilities:
//! - Apply a change set to a graph snapshot, all or nothing.
//! - Roll an applied change set back to the exact prior snapshot.
//! - Render a diff-style preview without touching the graph.
//!
//! The engine never changes a change set's lifecycle status; callers own that.

mod error;
mod ops;

pub use error::{EditError, EditResult};
pub use ops::{apply_change, revert_change};

use reqfix_types::changeset::ChangeSet;
use reqfix_types::graph::RequirementGraph;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    pub success: bool,
    /// The post-apply graph; equal to the input on failure.
    pub modified: RequirementGraph,
    pub errors: Vec<EditError>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollbackResult {
    pub success: bool,
    /// The restored graph; equal to the input on failure.
    pub restored: RequirementGraph,
    pub errors: Vec<EditError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChangeEngine;

impl ChangeEngine {
    pub fn new() -> Self {
        Self
    }

    /// Apply every change in order to a clone of `graph`.
    ///
    /// The first failing change aborts the whole set; the input snapshot is never modified.
    pub fn apply(&self, cs: &ChangeSet, graph: &RequirementGraph) -> ApplyResult {
        match self.try_apply(cs, graph) {
            Ok(modified) => ApplyResult {
                success: true,
                modified,
                errors: Vec::new(),
            },
            Err(err) => ApplyResult {
                success: false,
                modified: graph.clone(),
                errors: vec![err],
            },
        }
    }

    pub fn try_apply(
        &self,
        cs: &ChangeSet,
        graph: &RequirementGraph,
    ) -> EditResult<RequirementGraph> {
        let mut working = graph.clone();
        for (i, change) in cs.changes.iter().enumerate() {
            if let Err(err) = apply_change(&mut working, &change.operation) {
                warn!(
                    change_set = %cs.id,
                    change = i,
                    op = %change.kind(),
                    error = %err,
                    "change set apply aborted"
                );
                return Err(err);
            }
        }
        debug!(change_set = %cs.id, changes = cs.changes.len(), "change set applied");
        Ok(working)
    }

    /// Invert the changes of an applied set, last first.
    pub fn rollback(&self, cs: &ChangeSet, graph: &RequirementGraph) -> RollbackResult {
        match self.try_rollback(cs, graph) {
            Ok(restored) => RollbackResult {
                success: true,
                restored,
                errors: Vec::new(),
            },
            Err(err) => RollbackResult {
                success: false,
                restored: graph.clone(),
                errors: vec![err],
            },
        }
    }

    pub fn try_rollback(
        &self,
        cs: &ChangeSet,
        graph: &RequirementGraph,
    ) -> EditResult<RequirementGraph> {
        if !cs.reversible || cs.changes.iter().any(|c| !c.operation.is_reversible()) {
            return Err(EditError::Irreversible { id: cs.id.clone() });
        }
        let mut working = graph.clone();
        for change in cs.changes.iter().rev() {
            revert_change(&mut working, &change.operation)?;
        }
        debug!(change_set = %cs.id, "change set rolled back");
        Ok(working)
    }

    pub fn preview(&self, cs: &ChangeSet, graph: &RequirementGraph) -> String {
        reqfix_render::render_change_set_md(cs, graph)
    }
}
