//! Embeddable fix loop for requirement graphs.
//!
//! Evaluates a graph, plans change sets under a fix policy, applies the ones the policy allows
//! to run unattended, and repeats until nothing governed is left to fix.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`RuleEvaluator`](ports::RuleEvaluator) — produce violations for a graph snapshot
//! - [`GraphStore`](ports::GraphStore) — load and save the requirement graph
//! - [`ChangeSetStore`](ports::ChangeSetStore) — audit trail of change sets
//!
//! The [`adapters`] module provides filesystem and in-memory implementations, and
//! [`evaluator`] the built-in structural checks.
//!
//! # Entry points
//!
//! - [`FixExecutor`](executor::FixExecutor) — the loop itself, over in-memory values
//! - [`run_check`](pipeline::run_check), [`run_plan`](pipeline::run_plan),
//!   [`run_fix`](pipeline::run_fix), [`run_apply`](pipeline::run_apply),
//!   [`run_rollback`](pipeline::run_rollback) — settings-driven pipelines over the ports

pub mod adapters;
pub mod evaluator;
pub mod executor;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use executor::{AutoApplyDecision, FixExecutor};

// Re-export so embedders don't need reqfix-impact directly.
pub use reqfix_impact::{DependencyGraph, ImpactReport, ProposedChanges};
