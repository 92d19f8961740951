//! Domain logic: turn violations + a fix policy into deterministic change sets.
//!
//! This crate owns *what* should change and why. Applying and reverting changes is the
//! `reqfix-edit` crate's job; the planner only borrows its single-operation apply to build each
//! change set against a scratch snapshot.

mod actions;
mod planner;
mod preview;

pub use actions::{
    ActionInput, ActionPlanner, PlannedOp, builtin_action_planners, has_subject, split_text,
};
pub use planner::{FixPlanner, PlanContext};
pub use preview::preview_entries;
