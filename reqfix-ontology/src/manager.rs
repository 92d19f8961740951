use crate::schema::{
    DerivationRule, GlobalValidationRules, GranularityRule, LengthBounds, OntologySchema,
    StageDefinition, StageValidationRule,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OntologyErrorCode {
    InvalidParentStage,
    InvalidChildStage,
    InvalidLevel,
    DuplicateStage,
    LevelNotMonotonic,
    InvalidDerivationRule,
    InvalidDerivationChild,
    InvalidGranularityRule,
    InvalidLengthConstraint,
    InvalidScoreConstraint,
    InvalidStage,
    ParentNotFound,
    InvalidDerivation,
    MissingParent,
}

impl OntologyErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            OntologyErrorCode::InvalidParentStage => "INVALID_PARENT_STAGE",
            OntologyErrorCode::InvalidChildStage => "INVALID_CHILD_STAGE",
            OntologyErrorCode::InvalidLevel => "INVALID_LEVEL",
            OntologyErrorCode::DuplicateStage => "DUPLICATE_STAGE",
            OntologyErrorCode::LevelNotMonotonic => "LEVEL_NOT_MONOTONIC",
            OntologyErrorCode::InvalidDerivationRule => "INVALID_DERIVATION_RULE",
            OntologyErrorCode::InvalidDerivationChild => "INVALID_DERIVATION_CHILD",
            OntologyErrorCode::InvalidGranularityRule => "INVALID_GRANULARITY_RULE",
            OntologyErrorCode::InvalidLengthConstraint => "INVALID_LENGTH_CONSTRAINT",
            OntologyErrorCode::InvalidScoreConstraint => "INVALID_SCORE_CONSTRAINT",
            OntologyErrorCode::InvalidStage => "INVALID_STAGE",
            OntologyErrorCode::ParentNotFound => "PARENT_NOT_FOUND",
            OntologyErrorCode::InvalidDerivation => "INVALID_DERIVATION",
            OntologyErrorCode::MissingParent => "MISSING_PARENT",
        }
    }
}

impl fmt::Display for OntologyErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyValidationError {
    pub code: OntologyErrorCode,
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_id: Option<String>,

    /// Set by hierarchy checks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

impl OntologyValidationError {
    fn stage(code: OntologyErrorCode, stage_id: &str, message: String) -> Self {
        Self {
            code,
            message,
            stage_id: Some(stage_id.to_string()),
            node_id: None,
        }
    }

    fn bare(code: OntologyErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            stage_id: None,
            node_id: None,
        }
    }

    fn on_node(mut self, node_id: &str) -> Self {
        self.node_id = Some(node_id.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OntologyValidationResult {
    pub valid: bool,
    pub errors: Vec<OntologyValidationError>,
}

impl OntologyValidationResult {
    fn from_errors(errors: Vec<OntologyValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

/// Input row for [`OntologyManager::validate_hierarchy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyNode {
    pub id: String,
    pub stage: String,
    pub parent_id: Option<String>,
}

impl HierarchyNode {
    pub fn new(id: impl Into<String>, stage: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            id: id.into(),
            stage: stage.into(),
            parent_id,
        }
    }
}

/// Owns a stage schema and answers legality questions about it. Never repairs anything.
#[derive(Debug, Clone)]
pub struct OntologyManager {
    schema: OntologySchema,
    stages: BTreeMap<String, usize>,
}

impl OntologyManager {
    pub fn new(schema: OntologySchema) -> Self {
        let mut stages = BTreeMap::new();
        for (idx, stage) in schema.stages.iter().enumerate() {
            // First definition wins; duplicates are reported by `validate_schema`.
            stages.entry(stage.id.clone()).or_insert(idx);
        }
        tracing::debug!(
            version = %schema.version,
            stages = schema.stages.len(),
            "ontology loaded"
        );
        Self { schema, stages }
    }

    pub fn schema(&self) -> &OntologySchema {
        &self.schema
    }

    /// Structural checks over the loaded schema.
    pub fn validate_schema(&self) -> OntologyValidationResult {
        use OntologyErrorCode as C;
        let mut errors = Vec::new();

        let mut seen = HashMap::new();
        for stage in &self.schema.stages {
            let count = seen.entry(stage.id.as_str()).or_insert(0u32);
            *count += 1;
            if *count == 2 {
                errors.push(OntologyValidationError::stage(
                    C::DuplicateStage,
                    &stage.id,
                    format!("Stage \"{}\" is defined more than once", stage.id),
                ));
            }
        }

        for stage in &self.schema.stages {
            for parent in &stage.parent_stages {
                if !self.validate_stage(parent) {
                    errors.push(OntologyValidationError::stage(
                        C::InvalidParentStage,
                        &stage.id,
                        format!(
                            "Stage \"{}\" references non-existent parent stage \"{}\"",
                            stage.id, parent
                        ),
                    ));
                }
            }

            for child in &stage.child_stages {
                match self.stage_info(child) {
                    None => errors.push(OntologyValidationError::stage(
                        C::InvalidChildStage,
                        &stage.id,
                        format!(
                            "Stage \"{}\" references non-existent child stage \"{}\"",
                            stage.id, child
                        ),
                    )),
                    Some(child_def) if child_def.level <= stage.level => {
                        errors.push(OntologyValidationError::stage(
                            C::LevelNotMonotonic,
                            &stage.id,
                            format!(
                                "Child stage \"{}\" (level {}) is not below \"{}\" (level {})",
                                child, child_def.level, stage.id, stage.level
                            ),
                        ))
                    }
                    Some(_) => {}
                }
            }

            if stage.level < 1 {
                errors.push(OntologyValidationError::stage(
                    C::InvalidLevel,
                    &stage.id,
                    format!(
                        "Stage \"{}\" has invalid level {} (must be >= 1)",
                        stage.id, stage.level
                    ),
                ));
            }
        }

        for (stage_id, rule) in &self.schema.derivation_rules {
            if !self.validate_stage(stage_id) {
                errors.push(OntologyValidationError::bare(
                    C::InvalidDerivationRule,
                    format!("Derivation rule references non-existent stage \"{stage_id}\""),
                ));
            }
            for child in &rule.allowed_children {
                if !self.validate_stage(child) {
                    errors.push(OntologyValidationError::stage(
                        C::InvalidDerivationChild,
                        stage_id,
                        format!(
                            "Derivation rule for \"{stage_id}\" references non-existent child stage \"{child}\""
                        ),
                    ));
                }
            }
        }

        for (stage_id, rule) in &self.schema.granularity_rules {
            if !self.validate_stage(stage_id) {
                errors.push(OntologyValidationError::bare(
                    C::InvalidGranularityRule,
                    format!("Granularity rule references non-existent stage \"{stage_id}\""),
                ));
            }

            let lengths = std::iter::once(("description", &rule.description_length))
                .chain(rule.title_length.as_ref().map(|t| ("title", t)));
            for (what, bounds) in lengths {
                if inverted(bounds) {
                    errors.push(OntologyValidationError::stage(
                        C::InvalidLengthConstraint,
                        stage_id,
                        format!(
                            "Stage \"{stage_id}\" has invalid {what} length constraint (min > max)"
                        ),
                    ));
                }
            }

            let score = &rule.abstraction_score;
            let in_unit = |x: f64| (0.0..=1.0).contains(&x);
            if score.min > score.max || !in_unit(score.min) || !in_unit(score.max) {
                errors.push(OntologyValidationError::stage(
                    C::InvalidScoreConstraint,
                    stage_id,
                    format!(
                        "Stage \"{stage_id}\" has invalid abstraction score bounds [{}, {}]",
                        score.min, score.max
                    ),
                ));
            }
        }

        OntologyValidationResult::from_errors(errors)
    }

    pub fn validate_stage(&self, stage_id: &str) -> bool {
        self.stages.contains_key(stage_id)
    }

    /// `true` iff `child` is listed among `parent`'s child stages.
    pub fn validate_derivation(&self, parent: &str, child: &str) -> bool {
        self.stage_info(parent)
            .map(|p| p.child_stages.iter().any(|c| c == child))
            .unwrap_or(false)
    }

    /// Check declared stages and parent links of a flat node list.
    pub fn validate_hierarchy(&self, nodes: &[HierarchyNode]) -> OntologyValidationResult {
        use OntologyErrorCode as C;
        let mut by_id: HashMap<&str, &HierarchyNode> = HashMap::new();
        for node in nodes {
            by_id.entry(node.id.as_str()).or_insert(node);
        }

        let mut errors = Vec::new();
        for node in nodes {
            if !self.validate_stage(&node.stage) {
                errors.push(
                    OntologyValidationError::stage(
                        C::InvalidStage,
                        &node.stage,
                        format!(
                            "Requirement \"{}\" has invalid stage \"{}\"",
                            node.id, node.stage
                        ),
                    )
                    .on_node(&node.id),
                );
                continue;
            }

            match &node.parent_id {
                Some(parent_id) => {
                    let Some(parent) = by_id.get(parent_id.as_str()) else {
                        errors.push(
                            OntologyValidationError::bare(
                                C::ParentNotFound,
                                format!(
                                    "Requirement \"{}\" references non-existent parent \"{}\"",
                                    node.id, parent_id
                                ),
                            )
                            .on_node(&node.id),
                        );
                        continue;
                    };
                    if !self.validate_derivation(&parent.stage, &node.stage) {
                        errors.push(
                            OntologyValidationError::stage(
                                C::InvalidDerivation,
                                &node.stage,
                                format!(
                                    "Invalid derivation: \"{}\" -> \"{}\" is not allowed",
                                    parent.stage, node.stage
                                ),
                            )
                            .on_node(&node.id),
                        );
                    }
                }
                None => {
                    if self.can_have_parent(&node.stage) {
                        errors.push(
                            OntologyValidationError::stage(
                                C::MissingParent,
                                &node.stage,
                                format!(
                                    "Requirement \"{}\" of stage \"{}\" should have a parent",
                                    node.id, node.stage
                                ),
                            )
                            .on_node(&node.id),
                        );
                    }
                }
            }
        }

        OntologyValidationResult::from_errors(errors)
    }

    pub fn stage_info(&self, stage_id: &str) -> Option<&StageDefinition> {
        self.stages
            .get(stage_id)
            .and_then(|idx| self.schema.stages.get(*idx))
    }

    pub fn all_stages(&self) -> Vec<&StageDefinition> {
        self.stages
            .values()
            .filter_map(|idx| self.schema.stages.get(*idx))
            .collect()
    }

    /// Stages sorted by level, most abstract first. Ties keep id order.
    pub fn stages_by_level(&self) -> Vec<&StageDefinition> {
        let mut stages = self.all_stages();
        stages.sort_by_key(|s| s.level);
        stages
    }

    pub fn allowed_parent_stages(&self, stage_id: &str) -> &[String] {
        self.stage_info(stage_id)
            .map(|s| s.parent_stages.as_slice())
            .unwrap_or_default()
    }

    pub fn allowed_child_stages(&self, stage_id: &str) -> &[String] {
        self.stage_info(stage_id)
            .map(|s| s.child_stages.as_slice())
            .unwrap_or_default()
    }

    pub fn can_have_children(&self, stage_id: &str) -> bool {
        self.stage_info(stage_id)
            .map(|s| s.can_have_children)
            .unwrap_or(false)
    }

    pub fn can_have_parent(&self, stage_id: &str) -> bool {
        self.stage_info(stage_id)
            .map(|s| s.can_have_parent)
            .unwrap_or(false)
    }

    pub fn granularity_rule(&self, stage_id: &str) -> Option<&GranularityRule> {
        self.schema.granularity_rules.get(stage_id)
    }

    pub fn derivation_rule(&self, stage_id: &str) -> Option<&DerivationRule> {
        self.schema.derivation_rules.get(stage_id)
    }

    pub fn validation_rule(&self, stage_id: &str) -> Option<&StageValidationRule> {
        self.schema.validation_rules.by_stage.get(stage_id)
    }

    pub fn global_validation_rules(&self) -> &GlobalValidationRules {
        &self.schema.validation_rules.global
    }

    pub fn is_mece_required(&self, stage_id: &str) -> bool {
        self.derivation_rule(stage_id)
            .map(|r| r.mece_required)
            .unwrap_or(false)
    }

    pub fn root_stages(&self) -> Vec<&StageDefinition> {
        self.all_stages()
            .into_iter()
            .filter(|s| !s.can_have_parent)
            .collect()
    }

    pub fn leaf_stages(&self) -> Vec<&StageDefinition> {
        self.all_stages()
            .into_iter()
            .filter(|s| !s.can_have_children)
            .collect()
    }

    /// A stage that may sit between `parent` and `child`: a legal child of `parent` that lists
    /// `child` among its own children. Lowest level wins, then id.
    pub fn bridging_stage(&self, parent: &str, child: &str) -> Option<&StageDefinition> {
        self.allowed_child_stages(parent)
            .iter()
            .filter_map(|mid| self.stage_info(mid))
            .filter(|mid| mid.child_stages.iter().any(|c| c == child))
            .min_by(|a, b| a.level.cmp(&b.level).then_with(|| a.id.cmp(&b.id)))
    }

    pub fn export_schema(&self) -> OntologySchema {
        self.schema.clone()
    }
}

fn inverted(bounds: &LengthBounds) -> bool {
    bounds.min > bounds.max
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manager() -> OntologyManager {
        OntologyManager::new(OntologySchema::builtin().expect("builtin"))
    }

    fn codes(result: &OntologyValidationResult) -> Vec<OntologyErrorCode> {
        result.errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn builtin_schema_is_valid() {
        let result = manager().validate_schema();
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn derivation_follows_child_stages() {
        let m = manager();
        assert!(m.validate_derivation("stakeholder", "system"));
        assert!(m.validate_derivation("system", "system_functional"));
        assert!(!m.validate_derivation("stakeholder", "system_functional"));
        assert!(!m.validate_derivation("nope", "system"));
    }

    #[test]
    fn functional_without_parent_is_missing_parent() {
        let m = manager();
        let result = m.validate_hierarchy(&[HierarchyNode::new("F-1", "system_functional", None)]);
        assert!(!result.valid);
        assert_eq!(codes(&result), vec![OntologyErrorCode::MissingParent]);
        assert_eq!(result.errors[0].node_id.as_deref(), Some("F-1"));

        let result = m.validate_hierarchy(&[
            HierarchyNode::new("STK-1", "stakeholder", None),
            HierarchyNode::new("SYS-1", "system", Some("STK-1".into())),
            HierarchyNode::new("F-1", "system_functional", Some("SYS-1".into())),
        ]);
        assert!(result.valid, "{:?}", result.errors);
    }

    #[test]
    fn hierarchy_reports_unknown_stage_parent_and_bad_derivation() {
        let m = manager();
        let result = m.validate_hierarchy(&[
            HierarchyNode::new("X-1", "epic", None),
            HierarchyNode::new("SYS-1", "system", Some("STK-404".into())),
            HierarchyNode::new("STK-1", "stakeholder", None),
            HierarchyNode::new("F-1", "system_functional", Some("STK-1".into())),
        ]);
        assert_eq!(
            codes(&result),
            vec![
                OntologyErrorCode::InvalidStage,
                OntologyErrorCode::ParentNotFound,
                OntologyErrorCode::InvalidDerivation,
            ]
        );
    }

    #[test]
    fn schema_errors_are_collected() {
        let mut schema = OntologySchema::builtin().expect("builtin");
        schema.stages[0].child_stages.push("ghost".into());
        schema.stages[1].parent_stages.push("phantom".into());
        schema.stages[2].level = 0;
        schema.stages.push(schema.stages[0].clone());
        schema
            .granularity_rules
            .get_mut("system")
            .expect("system rule")
            .description_length
            .min = 1000;

        let result = OntologyManager::new(schema).validate_schema();
        let got = codes(&result);
        assert!(got.contains(&OntologyErrorCode::DuplicateStage));
        assert!(got.contains(&OntologyErrorCode::InvalidChildStage));
        assert!(got.contains(&OntologyErrorCode::InvalidParentStage));
        assert!(got.contains(&OntologyErrorCode::InvalidLevel));
        assert!(got.contains(&OntologyErrorCode::LevelNotMonotonic));
        assert!(got.contains(&OntologyErrorCode::InvalidLengthConstraint));
        assert!(!result.valid);
    }

    #[test]
    fn accessors() {
        let m = manager();
        let roots: Vec<_> = m.root_stages().iter().map(|s| s.id.as_str()).collect();
        let leaves: Vec<_> = m.leaf_stages().iter().map(|s| s.id.as_str()).collect();
        assert_eq!(roots, vec!["stakeholder"]);
        assert_eq!(leaves, vec!["system_functional"]);
        assert!(m.is_mece_required("system"));
        assert!(!m.is_mece_required("system_functional"));
        assert_eq!(m.allowed_parent_stages("system"), ["stakeholder".to_string()]);
        assert!(m.allowed_child_stages("unknown").is_empty());
        let by_level: Vec<_> = m.stages_by_level().iter().map(|s| s.level).collect();
        assert_eq!(by_level, vec![1, 2, 3]);
        assert_eq!(m.global_validation_rules().max_depth, 5);
        assert!(m.validation_rule("system").is_some());
    }

    #[test]
    fn bridging_stage_sits_between() {
        let m = manager();
        assert_eq!(
            m.bridging_stage("stakeholder", "system_functional")
                .map(|s| s.id.as_str()),
            Some("system")
        );
        assert!(m.bridging_stage("system", "system_functional").is_none());
    }
}
