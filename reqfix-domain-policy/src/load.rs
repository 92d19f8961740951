use camino::Utf8Path;
use fs_err as fs;
use reqfix_types::policy::FixPolicy;
use std::collections::BTreeSet;
use thiserror::Error;
use tracing::debug;

/// A policy that cannot be used. Always fatal: the fix loop never starts.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy file not found: {path}")]
    Missing { path: String },

    #[error("read policy {path}: {message}")]
    Read { path: String, message: String },

    #[error("parse policy {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid policy: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Toml,
    Json,
}

impl PolicyFormat {
    /// `.json` is JSON; everything else is TOML.
    pub fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("json") => PolicyFormat::Json,
            _ => PolicyFormat::Toml,
        }
    }
}

pub fn load_policy(path: &Utf8Path) -> Result<FixPolicy, PolicyError> {
    if !path.exists() {
        return Err(PolicyError::Missing {
            path: path.to_string(),
        });
    }
    let text = fs::read_to_string(path).map_err(|e| PolicyError::Read {
        path: path.to_string(),
        message: e.to_string(),
    })?;

    debug!(path = %path, "loading fix policy");
    parse_policy_str(&text, PolicyFormat::from_path(path)).map_err(|e| match e {
        PolicyError::Parse { message, .. } => PolicyError::Parse {
            path: path.to_string(),
            message,
        },
        other => other,
    })
}

/// Parse and validate a policy document held in memory.
pub fn parse_policy_str(text: &str, format: PolicyFormat) -> Result<FixPolicy, PolicyError> {
    let parsed = match format {
        PolicyFormat::Toml => toml::from_str::<FixPolicy>(text).map_err(|e| e.to_string()),
        PolicyFormat::Json => serde_json::from_str::<FixPolicy>(text).map_err(|e| e.to_string()),
    };
    let policy = parsed.map_err(|message| PolicyError::Parse {
        path: "<inline>".to_string(),
        message,
    })?;
    validate_policy(&policy)?;
    Ok(policy)
}

/// Semantic checks serde cannot express.
pub fn validate_policy(policy: &FixPolicy) -> Result<(), PolicyError> {
    if policy.stopping.max_iterations < 1 {
        return Err(PolicyError::Invalid(
            "stopping.max_iterations must be at least 1".to_string(),
        ));
    }

    let mut ids = BTreeSet::new();
    for rule in &policy.rules {
        if rule.id.trim().is_empty() {
            return Err(PolicyError::Invalid("rule with empty id".to_string()));
        }
        if !ids.insert(rule.id.as_str()) {
            return Err(PolicyError::Invalid(format!("duplicate rule id '{}'", rule.id)));
        }
        if !rule.when_violation.is_registered() {
            return Err(PolicyError::Invalid(format!(
                "rule '{}': unknown violation code '{}'",
                rule.id, rule.when_violation
            )));
        }
        if rule.actions.is_empty() {
            return Err(PolicyError::Invalid(format!(
                "rule '{}' has no actions",
                rule.id
            )));
        }
        let mut kinds = BTreeSet::new();
        for action in &rule.actions {
            if !kinds.insert(action.kind.as_str()) {
                return Err(PolicyError::Invalid(format!(
                    "rule '{}' lists action '{}' more than once",
                    rule.id, action.kind
                )));
            }
        }
        for (name, value) in [
            ("min_confidence", rule.guard.min_confidence),
            ("min_similarity", rule.guard.min_similarity),
        ] {
            match value {
                Some(v) if !(0.0..=1.0).contains(&v) => {
                    return Err(PolicyError::Invalid(format!(
                        "rule '{}': guard.{} must be within [0, 1], got {}",
                        rule.id, name, v
                    )));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqfix_types::policy::PolicyMode;

    #[test]
    fn json_policy_with_camel_case_keys() {
        let policy = parse_policy_str(
            r#"{
                "policy": "demo",
                "mode": "suggest",
                "rules": [
                    {"id": "C1", "whenViolation": "graph.cycle", "severity": "strict",
                     "actions": [{"use": "break_cycle", "mode": "auto"}]}
                ],
                "stopping": {"max_iterations": 2}
            }"#,
            PolicyFormat::Json,
        )
        .expect("parse");
        assert_eq!(policy.mode, PolicyMode::Suggest);
        assert_eq!(policy.rules[0].id, "C1");
    }

    #[test]
    fn zero_iterations_is_invalid() {
        let err = parse_policy_str(
            "mode = \"strict\"\n[stopping]\nmax_iterations = 0\n",
            PolicyFormat::Toml,
        )
        .expect_err("invalid");
        assert!(matches!(err, PolicyError::Invalid(_)));
    }

    #[test]
    fn unknown_code_in_rule_is_invalid() {
        let err = parse_policy_str(
            r#"
mode = "strict"
[[rules]]
id = "X"
when_violation = "style.passive"
actions = [{ use = "rewrite" }]
"#,
            PolicyFormat::Toml,
        )
        .expect_err("invalid");
        assert!(err.to_string().contains("unknown violation code"));
    }

    #[test]
    fn guard_threshold_out_of_range_is_invalid() {
        let err = parse_policy_str(
            r#"
mode = "strict"
[[rules]]
id = "D1"
when_violation = "dup.sibling.high"
guard = { min_similarity = 1.5 }
actions = [{ use = "alias" }]
"#,
            PolicyFormat::Toml,
        )
        .expect_err("invalid");
        assert!(err.to_string().contains("min_similarity"));
    }

    #[test]
    fn repeated_action_kind_is_invalid() {
        let err = parse_policy_str(
            r#"
mode = "strict"
[[rules]]
id = "H1"
when_violation = "hierarchy.missing_parent"
actions = [{ use = "rewire", mode = "assist" }, { use = "rewire", mode = "auto" }]
"#,
            PolicyFormat::Toml,
        )
        .expect_err("invalid");
        assert!(err.to_string().contains("'rewire' more than once"));
    }

    #[test]
    fn extension_selects_format() {
        assert_eq!(
            PolicyFormat::from_path(Utf8Path::new("p.JSON")),
            PolicyFormat::Json
        );
        assert_eq!(
            PolicyFormat::from_path(Utf8Path::new("policy.toml")),
            PolicyFormat::Toml
        );
    }
}
