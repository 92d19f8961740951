//! Default filesystem-backed and in-memory port implementations.

use crate::ports::{ChangeSetStore, GraphStore, RuleEvaluator};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use fs_err as fs;
use reqfix_types::changeset::ChangeSet;
use reqfix_types::graph::{GraphDocument, RequirementGraph};
use reqfix_types::requirement::RequirementStatus;
use reqfix_types::violation::Violation;
use serde::Deserialize;
use std::cell::RefCell;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GraphFormat {
    Json,
    Yaml,
}

impl GraphFormat {
    fn from_path(path: &Utf8Path) -> Self {
        match path.extension() {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                GraphFormat::Yaml
            }
            _ => GraphFormat::Json,
        }
    }
}

/// A graph file is either the versioned envelope or a bare list of requirements.
#[derive(Deserialize)]
#[serde(untagged)]
enum GraphFile {
    Document(GraphDocument),
    List(RequirementGraph),
}

impl GraphFile {
    fn into_graph(self) -> RequirementGraph {
        match self {
            GraphFile::Document(doc) => doc.requirements,
            GraphFile::List(graph) => graph,
        }
    }
}

/// Graph stored in a single JSON or YAML file (by extension).
#[derive(Debug, Clone)]
pub struct FsGraphStore {
    pub path: Utf8PathBuf,
}

impl FsGraphStore {
    pub fn new(path: Utf8PathBuf) -> Self {
        Self { path }
    }
}

impl GraphStore for FsGraphStore {
    fn load(&self) -> anyhow::Result<RequirementGraph> {
        let text =
            fs::read_to_string(&self.path).with_context(|| format!("read graph {}", self.path))?;
        let file: GraphFile = match GraphFormat::from_path(&self.path) {
            GraphFormat::Json => serde_json::from_str(&text)
                .with_context(|| format!("parse graph {} as JSON", self.path))?,
            GraphFormat::Yaml => serde_yaml::from_str(&text)
                .with_context(|| format!("parse graph {} as YAML", self.path))?,
        };
        let graph = file.into_graph();
        debug!(path = %self.path, requirements = graph.len(), "graph loaded");
        Ok(graph)
    }

    fn save(&self, graph: &RequirementGraph) -> anyhow::Result<()> {
        let doc = GraphDocument::new(graph.clone());
        let text = match GraphFormat::from_path(&self.path) {
            GraphFormat::Json => {
                serde_json::to_string_pretty(&doc).context("serialize graph as JSON")? + "\n"
            }
            GraphFormat::Yaml => serde_yaml::to_string(&doc).context("serialize graph as YAML")?,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create parent dir for {}", self.path))?;
            }
        }
        fs::write(&self.path, text).with_context(|| format!("write graph {}", self.path))?;
        debug!(path = %self.path, requirements = graph.len(), "graph saved");
        Ok(())
    }
}

/// One `<id>.json` record per change set under a directory.
#[derive(Debug, Clone)]
pub struct FsChangeSetStore {
    pub dir: Utf8PathBuf,
}

impl FsChangeSetStore {
    pub fn new(dir: Utf8PathBuf) -> Self {
        Self { dir }
    }

    fn record_path(&self, id: &str) -> anyhow::Result<Utf8PathBuf> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            anyhow::bail!("invalid change set id '{}'", id);
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

impl ChangeSetStore for FsChangeSetStore {
    fn put(&self, cs: &ChangeSet) -> anyhow::Result<()> {
        let path = self.record_path(&cs.id)?;
        fs::create_dir_all(&self.dir).with_context(|| format!("create {}", self.dir))?;
        let text = serde_json::to_string_pretty(cs).context("serialize change set")?;
        fs::write(&path, text + "\n").with_context(|| format!("write {}", path))?;
        debug!(change_set = %cs.id, status = %cs.status, "change set recorded");
        Ok(())
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<ChangeSet>> {
        let path = self.record_path(id)?;
        if !path.exists() {
            return Ok(None);
        }
        read_record(&path).map(Some)
    }

    fn list(&self) -> anyhow::Result<Vec<ChangeSet>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).with_context(|| format!("list {}", self.dir))? {
            let entry = entry.with_context(|| format!("list {}", self.dir))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            if path.extension() != Some("json") {
                continue;
            }
            out.push(read_record(&path)?);
        }
        sort_chronologically(&mut out);
        Ok(out)
    }
}

fn read_record(path: &Utf8Path) -> anyhow::Result<ChangeSet> {
    let text = fs::read_to_string(path).with_context(|| format!("read {}", path))?;
    serde_json::from_str(&text).with_context(|| format!("parse change set {}", path))
}

fn sort_chronologically(sets: &mut [ChangeSet]) {
    sets.sort_by(|a, b| (a.created_at, &a.id).cmp(&(b.created_at, &b.id)));
}

/// In-memory graph store for embedding and testing.
#[derive(Debug, Default)]
pub struct InMemoryGraphStore {
    graph: RefCell<RequirementGraph>,
}

impl InMemoryGraphStore {
    pub fn new(graph: RequirementGraph) -> Self {
        Self {
            graph: RefCell::new(graph),
        }
    }

    pub fn snapshot(&self) -> RequirementGraph {
        self.graph.borrow().clone()
    }
}

impl GraphStore for InMemoryGraphStore {
    fn load(&self) -> anyhow::Result<RequirementGraph> {
        Ok(self.snapshot())
    }

    fn save(&self, graph: &RequirementGraph) -> anyhow::Result<()> {
        *self.graph.borrow_mut() = graph.clone();
        Ok(())
    }
}

/// In-memory change set store for embedding and testing.
#[derive(Debug, Default)]
pub struct InMemoryChangeSetStore {
    records: RefCell<BTreeMap<String, ChangeSet>>,
}

impl InMemoryChangeSetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChangeSetStore for InMemoryChangeSetStore {
    fn put(&self, cs: &ChangeSet) -> anyhow::Result<()> {
        self.records.borrow_mut().insert(cs.id.clone(), cs.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<ChangeSet>> {
        Ok(self.records.borrow().get(id).cloned())
    }

    fn list(&self) -> anyhow::Result<Vec<ChangeSet>> {
        let mut out: Vec<ChangeSet> = self.records.borrow().values().cloned().collect();
        sort_chronologically(&mut out);
        Ok(out)
    }
}

/// Violations produced by an external detector, read from a JSON or YAML report.
///
/// The report is a list of violation records, or an object with a `violations` list. The same
/// records are returned for every snapshot, except those whose target no longer exists or has
/// been superseded.
#[derive(Debug, Clone)]
pub struct ReportEvaluator {
    violations: Vec<Violation>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReportFile {
    Wrapped { violations: Vec<Violation> },
    List(Vec<Violation>),
}

impl ReportEvaluator {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self {
            violations: violations.into_iter().map(Violation::normalized).collect(),
        }
    }

    pub fn from_path(path: &Utf8Path) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("read violations {}", path))?;
        let file: ReportFile = match GraphFormat::from_path(path) {
            GraphFormat::Json => serde_json::from_str(&text)
                .with_context(|| format!("parse violations {} as JSON", path))?,
            GraphFormat::Yaml => serde_yaml::from_str(&text)
                .with_context(|| format!("parse violations {} as YAML", path))?,
        };
        let violations = match file {
            ReportFile::Wrapped { violations } | ReportFile::List(violations) => violations,
        };
        debug!(path = %path, violations = violations.len(), "external violations loaded");
        Ok(Self::new(violations))
    }
}

impl RuleEvaluator for ReportEvaluator {
    fn evaluate(&self, graph: &RequirementGraph) -> anyhow::Result<Vec<Violation>> {
        Ok(self
            .violations
            .iter()
            .filter(|v| {
                graph
                    .get(&v.req_id)
                    .is_some_and(|r| r.status != RequirementStatus::Superseded)
            })
            .cloned()
            .collect())
    }
}
