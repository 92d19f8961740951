//! Shared DTOs (schemas-as-code) for the reqfix workspace.
//!
//! # Design constraints
//! - These types are persisted (graph files, change set audit records, run outcomes).
//! - Be conservative with breaking changes.
//! - Prefer adding optional fields over changing semantics.

pub mod changeset;
pub mod graph;
pub mod outcome;
pub mod plan;
pub mod policy;
pub mod requirement;
pub mod violation;

/// Requirement identifiers are plain strings (`SYS-001`, `FUNC-12-S1`, ...).
pub type ReqId = String;

/// Schema identifiers.
pub mod schema {
    pub const REQFIX_GRAPH_V1: &str = "reqfix.graph.v1";
    pub const REQFIX_OUTCOME_V1: &str = "reqfix.outcome.v1";
}
