//! Clap-free settings for the reqfix pipelines.

use camino::Utf8PathBuf;

/// Where the pipelines read and write.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Requirement graph file (`.json`, `.yaml` or `.yml`).
    pub graph_path: Utf8PathBuf,

    /// Fix policy (`.toml` or `.json`).
    pub policy_path: Utf8PathBuf,

    /// Stage ontology. `None` uses the built-in three-stage schema.
    pub ontology_path: Option<Utf8PathBuf>,

    /// Change set audit directory.
    pub changesets_dir: Utf8PathBuf,

    /// Violations from an external detector, merged with the structural checks.
    pub violations_path: Option<Utf8PathBuf>,

    /// Also flag statements without a subject.
    pub check_subjects: bool,

    /// Overrides `stopping.max_iterations` from the policy.
    pub max_iterations: Option<u32>,

    /// Compute everything but persist nothing.
    pub dry_run: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            graph_path: Utf8PathBuf::from("requirements.json"),
            policy_path: Utf8PathBuf::from("reqfix.policy.toml"),
            ontology_path: None,
            changesets_dir: Utf8PathBuf::from(".reqfix/changesets"),
            violations_path: None,
            check_subjects: false,
            max_iterations: None,
            dry_run: true,
        }
    }
}
