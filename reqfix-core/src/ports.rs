//! Port traits for I/O abstraction.
//!
//! The fix loop never touches the filesystem directly: graphs, change set records and
//! violations all arrive through these traits.

use reqfix_types::changeset::ChangeSet;
use reqfix_types::graph::RequirementGraph;
use reqfix_types::violation::Violation;

/// Produces the violations of a graph snapshot.
///
/// Implementations must be pure with respect to the graph: the same snapshot yields the same
/// violations. Output does not need to be ordered; ids are filled in by the caller when empty.
pub trait RuleEvaluator {
    fn evaluate(&self, graph: &RequirementGraph) -> anyhow::Result<Vec<Violation>>;
}

/// Loads and persists the requirement graph.
pub trait GraphStore {
    fn load(&self) -> anyhow::Result<RequirementGraph>;

    fn save(&self, graph: &RequirementGraph) -> anyhow::Result<()>;
}

/// Audit store for change sets.
///
/// Records are written once and then only rewritten on status transitions. There is no delete.
pub trait ChangeSetStore {
    /// Insert or overwrite the record with the same id.
    fn put(&self, cs: &ChangeSet) -> anyhow::Result<()>;

    fn get(&self, id: &str) -> anyhow::Result<Option<ChangeSet>>;

    /// Every record, oldest first (`created_at`, then id).
    fn list(&self) -> anyhow::Result<Vec<ChangeSet>>;
}
