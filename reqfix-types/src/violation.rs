use crate::ReqId;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Rulebook domain a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleDomain {
    Hierarchy,
    GraphHealth,
    Abstraction,
    Mece,
    QualityStyle,
}

impl RuleDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            RuleDomain::Hierarchy => "hierarchy",
            RuleDomain::GraphHealth => "graph_health",
            RuleDomain::Abstraction => "abstraction",
            RuleDomain::Mece => "mece",
            RuleDomain::QualityStyle => "quality_style",
        }
    }
}

impl fmt::Display for RuleDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    #[default]
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed set of violation codes the planner knows how to act on.
///
/// Codes emitted by an external detector that are not listed here survive as `Unregistered` so
/// they can still be reported, and are never silently matched to a rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ViolationCode {
    MissingParent,
    InvalidDerivation,
    InvalidStage,
    ParentNotFound,
    Cycle,
    DanglingReference,
    AbstractionGap,
    AbstractionOutOfRange,
    DuplicateSibling,
    MeceCoverageGap,
    AtomicityLow,
    AmbiguousTerm,
    MissingSubject,
    Unregistered(String),
}

impl ViolationCode {
    pub const REGISTERED: [ViolationCode; 13] = [
        ViolationCode::MissingParent,
        ViolationCode::InvalidDerivation,
        ViolationCode::InvalidStage,
        ViolationCode::ParentNotFound,
        ViolationCode::Cycle,
        ViolationCode::DanglingReference,
        ViolationCode::AbstractionGap,
        ViolationCode::AbstractionOutOfRange,
        ViolationCode::DuplicateSibling,
        ViolationCode::MeceCoverageGap,
        ViolationCode::AtomicityLow,
        ViolationCode::AmbiguousTerm,
        ViolationCode::MissingSubject,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            ViolationCode::MissingParent => "hierarchy.missing_parent",
            ViolationCode::InvalidDerivation => "hierarchy.invalid_derivation",
            ViolationCode::InvalidStage => "hierarchy.invalid_stage",
            ViolationCode::ParentNotFound => "hierarchy.parent_not_found",
            ViolationCode::Cycle => "graph.cycle",
            ViolationCode::DanglingReference => "graph.dangling_reference",
            ViolationCode::AbstractionGap => "abstraction.gap.invalid",
            ViolationCode::AbstractionOutOfRange => "abstraction.out_of_range",
            ViolationCode::DuplicateSibling => "dup.sibling.high",
            ViolationCode::MeceCoverageGap => "mece.coverage.gap",
            ViolationCode::AtomicityLow => "atomicity.low",
            ViolationCode::AmbiguousTerm => "style.ambiguous",
            ViolationCode::MissingSubject => "style.missing_subject",
            ViolationCode::Unregistered(code) => code.as_str(),
        }
    }

    /// Domain implied by the code. Unregistered codes fall back to their prefix.
    pub fn domain(&self) -> Option<RuleDomain> {
        let domain = match self {
            ViolationCode::MissingParent
            | ViolationCode::InvalidDerivation
            | ViolationCode::InvalidStage
            | ViolationCode::ParentNotFound => RuleDomain::Hierarchy,
            ViolationCode::Cycle | ViolationCode::DanglingReference => RuleDomain::GraphHealth,
            ViolationCode::AbstractionGap | ViolationCode::AbstractionOutOfRange => {
                RuleDomain::Abstraction
            }
            ViolationCode::DuplicateSibling | ViolationCode::MeceCoverageGap => RuleDomain::Mece,
            ViolationCode::AtomicityLow
            | ViolationCode::AmbiguousTerm
            | ViolationCode::MissingSubject => RuleDomain::QualityStyle,
            ViolationCode::Unregistered(code) => {
                let prefix = code.split('.').next().unwrap_or_default();
                return match prefix {
                    "hierarchy" => Some(RuleDomain::Hierarchy),
                    "graph" => Some(RuleDomain::GraphHealth),
                    "abstraction" => Some(RuleDomain::Abstraction),
                    "mece" | "dup" => Some(RuleDomain::Mece),
                    "style" | "atomicity" => Some(RuleDomain::QualityStyle),
                    _ => None,
                };
            }
        };
        Some(domain)
    }

    pub fn is_registered(&self) -> bool {
        !matches!(self, ViolationCode::Unregistered(_))
    }
}

impl From<&str> for ViolationCode {
    fn from(s: &str) -> Self {
        let s = s.trim();
        if let Some(code) = ViolationCode::REGISTERED.iter().find(|c| c.as_str() == s) {
            return code.clone();
        }
        // Upper-case codes produced by the ontology hierarchy check.
        match s {
            "MISSING_PARENT" => ViolationCode::MissingParent,
            "INVALID_DERIVATION" => ViolationCode::InvalidDerivation,
            "INVALID_STAGE" => ViolationCode::InvalidStage,
            "PARENT_NOT_FOUND" => ViolationCode::ParentNotFound,
            other => ViolationCode::Unregistered(other.to_string()),
        }
    }
}

impl From<String> for ViolationCode {
    fn from(s: String) -> Self {
        ViolationCode::from(s.as_str())
    }
}

impl From<ViolationCode> for String {
    fn from(code: ViolationCode) -> Self {
        code.as_str().to_string()
    }
}

impl FromStr for ViolationCode {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ViolationCode::from(s))
    }
}

impl fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rule failure for one requirement, as emitted by a rule evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Empty until [`Violation::normalized`] derives a stable id.
    #[serde(default)]
    pub id: String,

    #[serde(alias = "reqId")]
    pub req_id: ReqId,

    pub code: ViolationCode,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<RuleDomain>,

    #[serde(default, skip_serializing_if = "Option::is_none", alias = "ruleId")]
    pub rule_id: Option<String>,

    #[serde(default)]
    pub severity: Severity,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,

    /// Candidate ids the violation points at (duplicate siblings, parent candidates, ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<ReqId>,

    /// Members of a detected cycle, in traversal order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cycle: Vec<ReqId>,
}

const VIOLATION_NAMESPACE: Uuid = Uuid::from_bytes([
    0x9a, 0x1f, 0x63, 0x0e, 0x2c, 0x7b, 0x4d, 0x18, 0xb5, 0x40, 0x6e, 0x3d, 0x81, 0xc2, 0x57, 0x0a,
]);

impl Violation {
    pub fn new(req_id: impl Into<ReqId>, code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            req_id: req_id.into(),
            code,
            domain: None,
            rule_id: None,
            severity: Severity::default(),
            message: message.into(),
            confidence: None,
            similarity: None,
            details: None,
            suggestion: None,
            related: Vec::new(),
            cycle: Vec::new(),
        }
        .normalized()
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_related(mut self, related: Vec<ReqId>) -> Self {
        self.related = related;
        self
    }

    pub fn with_cycle(mut self, cycle: Vec<ReqId>) -> Self {
        self.cycle = cycle;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_similarity(mut self, similarity: f64) -> Self {
        self.similarity = Some(similarity);
        self
    }

    /// Fill in `id` and `domain` when the evaluator left them out.
    pub fn normalized(mut self) -> Self {
        if self.id.trim().is_empty() {
            let key = format!("{}|{}|{}", self.code, self.req_id, self.message);
            self.id = Uuid::new_v5(&VIOLATION_NAMESPACE, key.as_bytes()).to_string();
        }
        if self.domain.is_none() {
            self.domain = self.code.domain();
        }
        self
    }

    pub fn domain(&self) -> Option<RuleDomain> {
        self.domain.or_else(|| self.code.domain())
    }

    /// Key under which violations sharing a root cause are grouped.
    ///
    /// Cycle reports are keyed by their member set so every member's report lands together.
    pub fn root_cause_key(&self) -> String {
        if self.cycle.is_empty() {
            return self.req_id.clone();
        }
        let mut members = self.cycle.clone();
        members.sort();
        members.dedup();
        members.join(",")
    }

    pub fn to_ref(&self) -> ViolationRef {
        ViolationRef {
            id: self.id.clone(),
            code: self.code.clone(),
            req_id: self.req_id.clone(),
        }
    }
}

/// Pointer to a violation, stored on change sets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ViolationRef {
    pub id: String,
    pub code: ViolationCode,
    pub req_id: ReqId,
}
