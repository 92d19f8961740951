//! Stage ontology for requirement graphs.
//!
//! Loads a stage schema (JSON or YAML) and answers legality questions: which stages exist, which
//! parent/child pairs are allowed, and what granularity bounds apply. Repair is left to the
//! planner.

mod manager;
pub mod schema;

pub use manager::{
    HierarchyNode, OntologyErrorCode, OntologyManager, OntologyValidationError,
    OntologyValidationResult,
};
pub use schema::{
    AbstractionLevel, DerivationRule, GlobalValidationRules, GranularityRule, LengthBounds,
    OntologySchema, SchemaLoadError, ScoreBounds, StageDefinition, StageValidationRule,
    ValidationRules,
};
