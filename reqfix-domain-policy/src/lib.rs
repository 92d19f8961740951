//! Fix policy handling for reqfix planning.
//!
//! - [`load_policy`] parses a TOML or JSON policy strictly and validates it before any fix
//!   iteration runs.
//! - [`PolicyRegistry`] resolves violation codes to the rule that governs them.
//! - [`determinism`] holds the fingerprint and id helpers that keep plans reproducible.

pub mod determinism;
mod load;
mod registry;

pub use load::{PolicyError, PolicyFormat, load_policy, parse_policy_str, validate_policy};
pub use registry::{PolicyRegistry, RuleLookup};
