//! Fix policy document.
//!
//! Parsed strictly: every struct denies unknown fields so a typo in a policy file fails at load
//! time instead of silently falling back to a default.

use crate::violation::ViolationCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Global policy mode. Only `strict` lets anything apply without a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyMode {
    Strict,
    Suggest,
    Assist,
}

impl PolicyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyMode::Strict => "strict",
            PolicyMode::Suggest => "suggest",
            PolicyMode::Assist => "assist",
        }
    }
}

impl fmt::Display for PolicyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether violations matched by a rule drive the repair loop (`strict`) or are only reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleSeverity {
    Strict,
    #[default]
    Suggest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionMode {
    Auto,
    #[default]
    Assist,
}

/// Operation kinds an action can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    #[serde(alias = "split_requirement")]
    Split,
    #[serde(alias = "merge_requirements")]
    Merge,
    #[serde(alias = "rewrite_text")]
    Rewrite,
    #[serde(alias = "rewire_links")]
    Rewire,
    #[serde(alias = "introduce_intermediate")]
    Introduce,
    Alias,
    BreakCycle,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::Split => "split",
            ActionKind::Merge => "merge",
            ActionKind::Rewrite => "rewrite",
            ActionKind::Rewire => "rewire",
            ActionKind::Introduce => "introduce",
            ActionKind::Alias => "alias",
            ActionKind::BreakCycle => "break_cycle",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tuning knobs for the built-in action planners.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionParams {
    /// Prefix a subject phrase when the text lacks one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_subject: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_subject: Option<String>,

    /// Replace vague wording with concrete placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_ambiguous: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_parts: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixAction {
    #[serde(rename = "use")]
    pub kind: ActionKind,

    #[serde(default)]
    pub mode: ActionMode,

    #[serde(default)]
    pub params: ActionParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleGuard {
    /// Only act on requirements at these stages. Empty means any stage.
    #[serde(default, alias = "level", skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f64>,
}

/// How violations matched by one rule are bundled into change sets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    None,
    RootCause,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixRule {
    pub id: String,

    #[serde(alias = "whenViolation")]
    pub when_violation: ViolationCode,

    /// Higher runs first.
    #[serde(default)]
    pub priority: i32,

    #[serde(default)]
    pub severity: RuleSeverity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub guard: RuleGuard,

    #[serde(default)]
    pub group_by: GroupBy,

    pub actions: Vec<FixAction>,
}

impl FixRule {
    pub fn action(&self, kind: ActionKind) -> Option<&FixAction> {
        self.actions.iter().find(|a| a.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stopping {
    pub max_iterations: u32,
}

impl Default for Stopping {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Propagation {
    #[serde(default)]
    pub revalidate_after_each: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixPolicy {
    #[serde(default, alias = "policy", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub mode: PolicyMode,

    #[serde(default)]
    pub rules: Vec<FixRule>,

    #[serde(default)]
    pub stopping: Stopping,

    #[serde(default)]
    pub propagation: Propagation,
}

impl FixPolicy {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const POLICY: &str = r#"
policy = "requirements-strict"
version = "1.0"
mode = "strict"

# split non-atomic requirements
[[rules]]
id = "A1"
whenViolation = "atomicity.low"
severity = "strict"
priority = 10
actions = [{ use = "split_requirement", mode = "auto" }]

[[rules]]
id = "E1"
when_violation = "style.missing_subject"
severity = "suggest"
actions = [{ use = "rewrite_text", mode = "assist", params = { add_subject = true } }]

[stopping]
max_iterations = 3

[propagation]
revalidate_after_each = true
"#;

    #[test]
    fn parses_toml_with_aliases() {
        let policy: FixPolicy = toml::from_str(POLICY).expect("parse policy");
        assert_eq!(policy.display_name(), "requirements-strict");
        assert_eq!(policy.mode, PolicyMode::Strict);
        assert_eq!(policy.rules.len(), 2);
        assert_eq!(policy.rules[0].when_violation, ViolationCode::AtomicityLow);
        assert_eq!(policy.rules[0].actions[0].kind, ActionKind::Split);
        assert_eq!(policy.rules[0].actions[0].mode, ActionMode::Auto);
        assert_eq!(policy.rules[1].actions[0].params.add_subject, Some(true));
        assert_eq!(policy.stopping.max_iterations, 3);
        assert!(policy.propagation.revalidate_after_each);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = toml::from_str::<FixPolicy>(
            r#"
mode = "strict"
[stopping]
max_iterations = 3
max_itterations = 4
"#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn mode_is_required() {
        assert!(toml::from_str::<FixPolicy>("rules = []").is_err());
    }
}
