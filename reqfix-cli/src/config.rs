//! Configuration file loading for reqfix.
//!
//! Discovers and loads `reqfix.toml` from the project root.
//! Merges config file settings with CLI arguments (CLI takes precedence).

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use reqfix_core::settings::RunSettings;
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "reqfix.toml";

/// Top-level configuration from reqfix.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReqfixConfig {
    /// Input and output locations, relative to the project root.
    pub paths: PathsConfig,

    /// Loop settings.
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub graph: Option<Utf8PathBuf>,

    /// Omitted means the built-in ontology.
    pub ontology: Option<Utf8PathBuf>,

    pub policy: Option<Utf8PathBuf>,

    /// Change set audit directory.
    pub changesets: Option<Utf8PathBuf>,

    /// Violations reported by an external detector.
    pub violations: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Persist nothing unless `--write` is given.
    pub dry_run: bool,

    /// Overrides `stopping.max_iterations` from the policy.
    pub max_iterations: Option<u32>,

    pub check_subjects: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            max_iterations: None,
            check_subjects: false,
        }
    }
}

/// Discover the reqfix.toml config file.
///
/// Returns `None` if no config file is found in `root`.
pub fn discover_config(root: &Utf8Path) -> Option<Utf8PathBuf> {
    let config_path = root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path);
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path);
        None
    }
}

/// Load and parse a reqfix.toml config file.
pub fn load_config(path: &Utf8Path) -> anyhow::Result<ReqfixConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config file {}", path))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path))
}

pub fn parse_config(contents: &str) -> anyhow::Result<ReqfixConfig> {
    let config: ReqfixConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from the project root, or return default if not found.
pub fn load_or_default(root: &Utf8Path) -> anyhow::Result<ReqfixConfig> {
    match discover_config(root) {
        Some(path) => load_config(&path),
        None => Ok(ReqfixConfig::default()),
    }
}

/// Values given on the command line. `None` and `false` defer to the config file.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub graph: Option<Utf8PathBuf>,
    pub ontology: Option<Utf8PathBuf>,
    pub policy: Option<Utf8PathBuf>,
    pub changesets: Option<Utf8PathBuf>,
    pub violations: Option<Utf8PathBuf>,
    pub check_subjects: bool,
    pub max_iterations: Option<u32>,
    pub write: bool,
}

/// Builder for merging config file with CLI arguments.
pub struct ConfigMerger {
    config: ReqfixConfig,
}

impl ConfigMerger {
    pub fn new(config: ReqfixConfig) -> Self {
        Self { config }
    }

    /// Resolve the run settings. Relative paths are taken from `root`.
    ///
    /// `--write` turns off a configured dry run; `--check-subjects` can only switch the
    /// subject check on.
    pub fn merge(self, root: &Utf8Path, cli: CliOverrides) -> RunSettings {
        let defaults = RunSettings::default();
        let paths = self.config.paths;
        let resolve = |p: Utf8PathBuf| {
            if p.is_absolute() { p } else { root.join(p) }
        };

        RunSettings {
            graph_path: resolve(cli.graph.or(paths.graph).unwrap_or(defaults.graph_path)),
            policy_path: resolve(cli.policy.or(paths.policy).unwrap_or(defaults.policy_path)),
            ontology_path: cli.ontology.or(paths.ontology).map(resolve),
            changesets_dir: resolve(
                cli.changesets
                    .or(paths.changesets)
                    .unwrap_or(defaults.changesets_dir),
            ),
            violations_path: cli.violations.or(paths.violations).map(resolve),
            check_subjects: cli.check_subjects || self.config.run.check_subjects,
            max_iterations: cli.max_iterations.or(self.config.run.max_iterations),
            dry_run: self.config.run.dry_run && !cli.write,
        }
    }
}
