//! Error types for reqfix-edit.
//!
//! Every variant is a reason a change set cannot be applied or rolled back against a given
//! graph. None of them leave the graph modified: the engine only commits a fully applied clone.

use reqfix_types::ReqId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    /// A requirement the operation needs is absent.
    #[error("requirement {id} not found")]
    NotFound { id: ReqId },

    /// The operation would create a requirement whose id is already taken.
    #[error("requirement {id} already exists")]
    AlreadyExists { id: ReqId },

    /// The graph no longer holds the values recorded when the change was planned.
    #[error("precondition failed on {id}: {message}")]
    Precondition { id: ReqId, message: String },

    /// The change set is marked irreversible, or a change lacks the payload to invert it.
    #[error("change set {id} is not reversible")]
    Irreversible { id: String },

    /// The change payload is self-contradictory (e.g. a requirement aliased to itself).
    #[error("malformed change: {message}")]
    Malformed { message: String },
}

impl EditError {
    pub(crate) fn precondition(id: &str, message: impl Into<String>) -> Self {
        EditError::Precondition {
            id: id.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn not_found(id: &str) -> Self {
        EditError::NotFound { id: id.to_string() }
    }

    /// Returns true when the graph moved on since planning (re-plan rather than retry).
    pub fn is_stale(&self) -> bool {
        matches!(
            self,
            EditError::Precondition { .. } | EditError::AlreadyExists { .. }
        )
    }

    /// Recommended process exit code: 2 for a blocked change, 1 for anything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            EditError::Precondition { .. }
            | EditError::AlreadyExists { .. }
            | EditError::Irreversible { .. } => 2,
            EditError::NotFound { .. } | EditError::Malformed { .. } => 1,
        }
    }
}

pub type EditResult<T> = Result<T, EditError>;

#[cfg(test)]
mod tests {
    use super::EditError;

    #[test]
    fn stale_graph_reports_exit_code_2() {
        let err = EditError::precondition("F-1", "description changed");
        assert!(err.is_stale());
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "precondition failed on F-1: description changed"
        );
    }

    #[test]
    fn missing_requirement_reports_exit_code_1() {
        let err = EditError::not_found("F-9");
        assert!(!err.is_stale());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn irreversible_is_a_block() {
        let err = EditError::Irreversible { id: "cs".into() };
        assert_eq!(err.exit_code(), 2);
        assert!(!err.is_stale());
    }
}
