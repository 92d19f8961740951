//! Ontology document types.
//!
//! The document format uses camelCase keys; it is shared with editors and other tooling that
//! author ontologies by hand.

use camino::Utf8Path;
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbstractionLevel {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageDefinition {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// 1 is the most abstract.
    pub level: i64,

    pub abstraction_level: AbstractionLevel,

    #[serde(default)]
    pub can_have_children: bool,

    #[serde(default)]
    pub can_have_parent: bool,

    #[serde(default)]
    pub parent_stages: Vec<String>,

    #[serde(default)]
    pub child_stages: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationRule {
    #[serde(default)]
    pub allowed_children: Vec<String>,

    #[serde(default)]
    pub mece_required: bool,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LengthBounds {
    pub min: u32,
    pub max: u32,
    pub recommended: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBounds {
    pub min: f64,
    pub max: f64,
    pub recommended: f64,
}

impl ScoreBounds {
    pub fn contains(&self, score: f64) -> bool {
        score >= self.min && score <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranularityRule {
    pub description_length: LengthBounds,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_length: Option<LengthBounds>,

    pub abstraction_score: ScoreBounds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalValidationRules {
    pub max_depth: u32,
    pub allow_cycles: bool,
    pub require_unique_ids: bool,
}

impl Default for GlobalValidationRules {
    fn default() -> Self {
        Self {
            max_depth: 5,
            allow_cycles: false,
            require_unique_ids: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageValidationRule {
    #[serde(default)]
    pub required_fields: Vec<String>,

    #[serde(default)]
    pub optional_fields: Vec<String>,

    #[serde(default)]
    pub forbidden_fields: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRules {
    #[serde(default)]
    pub global: GlobalValidationRules,

    #[serde(default)]
    pub by_stage: BTreeMap<String, StageValidationRule>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologySchema {
    #[serde(default, rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub json_schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub version: String,

    pub stages: Vec<StageDefinition>,

    #[serde(default)]
    pub derivation_rules: BTreeMap<String, DerivationRule>,

    #[serde(default)]
    pub granularity_rules: BTreeMap<String, GranularityRule>,

    #[serde(default)]
    pub validation_rules: ValidationRules,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<SchemaMetadata>,
}

#[derive(Debug, Error)]
pub enum SchemaLoadError {
    #[error("read ontology {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse ontology {path} as JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parse ontology {path} as YAML: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

const BUILTIN: &str = include_str!("../schemas/ontology.default.json");

impl OntologySchema {
    /// Load from a `.json`, `.yaml` or `.yml` file. Anything else is parsed as JSON.
    pub fn from_path(path: &Utf8Path) -> Result<Self, SchemaLoadError> {
        let text = fs::read_to_string(path).map_err(|source| SchemaLoadError::Read {
            path: path.to_string(),
            source,
        })?;
        match path.extension() {
            Some("yaml") | Some("yml") => {
                serde_yaml::from_str(&text).map_err(|source| SchemaLoadError::Yaml {
                    path: path.to_string(),
                    source,
                })
            }
            _ => Self::from_json_str(&text).map_err(|source| SchemaLoadError::Json {
                path: path.to_string(),
                source,
            }),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Three-stage stakeholder / system / functional ontology shipped with the crate.
    pub fn builtin() -> Result<Self, serde_json::Error> {
        Self::from_json_str(BUILTIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn builtin_schema_parses() {
        let schema = OntologySchema::builtin().expect("builtin ontology");
        let ids: Vec<_> = schema.stages.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["stakeholder", "system", "system_functional"]);
        assert!(schema.validation_rules.global.require_unique_ids);
        assert_eq!(
            schema.granularity_rules["system"].abstraction_score.recommended,
            0.6
        );
    }

    #[test]
    fn yaml_files_are_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(dir.path().join("ontology.yaml")).expect("utf8");
        fs::write(
            &path,
            r#"
version: "2"
stages:
  - id: goal
    name: Goal
    level: 1
    abstractionLevel: high
    canHaveChildren: false
    canHaveParent: false
"#,
        )
        .expect("write");

        let schema = OntologySchema::from_path(&path).expect("load yaml");
        assert_eq!(schema.version, "2");
        assert_eq!(schema.stages[0].abstraction_level, AbstractionLevel::High);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = OntologySchema::from_path(Utf8Path::new("/nonexistent/ontology.json"))
            .expect_err("missing file");
        assert!(matches!(err, SchemaLoadError::Read { .. }));
    }
}
