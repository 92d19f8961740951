//! Check, plan, fix, apply and rollback pipelines, extracted from the CLI.
//!
//! Graph and change set I/O goes through the port traits; only the policy, ontology and
//! external violation report are read from the paths in [`RunSettings`].

use crate::adapters::ReportEvaluator;
use crate::evaluator::{ChainEvaluator, StructuralEvaluator, SubjectEvaluator};
use crate::executor::FixExecutor;
use crate::ports::{ChangeSetStore, GraphStore, RuleEvaluator};
use crate::settings::RunSettings;
use anyhow::Context;
use reqfix_domain_policy::{PolicyRegistry, load_policy};
use reqfix_impact::{DependencyGraph, ImpactAnalyzer, ImpactReport, ProposedChanges};
use reqfix_ontology::{OntologyManager, OntologySchema};
use reqfix_types::changeset::{ChangeSet, ChangeSetStatus};
use reqfix_types::outcome::{FixOutcome, RollbackAllResult};
use reqfix_types::plan::FixPlan;
use reqfix_types::policy::FixPolicy;
use reqfix_types::violation::Violation;
use tracing::{debug, info, warn};

/// Error type for pipeline results. Exit code 2 = policy block, 1 = tool error.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("policy block")]
    PolicyBlock,
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ToolError {
    pub fn exit_code(&self) -> u8 {
        match self {
            ToolError::PolicyBlock => 2,
            ToolError::Internal(_) => 1,
        }
    }
}

/// Policy and ontology, loaded and validated once per run.
#[derive(Debug, Clone)]
pub struct Inputs {
    pub policy: FixPolicy,
    pub ontology: OntologyManager,
}

impl Inputs {
    pub fn executor(&self) -> FixExecutor<'_> {
        FixExecutor::new(&self.policy).with_ontology(Some(&self.ontology))
    }
}

pub fn load_ontology(settings: &RunSettings) -> anyhow::Result<OntologyManager> {
    let schema = match &settings.ontology_path {
        Some(path) => {
            OntologySchema::from_path(path).with_context(|| format!("load ontology {}", path))?
        }
        None => OntologySchema::builtin().context("parse built-in ontology")?,
    };
    Ok(OntologyManager::new(schema))
}

/// Load the policy and ontology. Either being unusable aborts the run before any iteration.
pub fn load_inputs(settings: &RunSettings) -> anyhow::Result<Inputs> {
    let mut policy = load_policy(&settings.policy_path).context("load fix policy")?;
    if let Some(max) = settings.max_iterations {
        if max < 1 {
            anyhow::bail!("max_iterations must be at least 1");
        }
        policy.stopping.max_iterations = max;
    }

    let ontology = load_ontology(settings)?;
    let validation = ontology.validate_schema();
    if !validation.valid {
        let errors: Vec<String> = validation
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.code, e.message))
            .collect();
        anyhow::bail!("invalid ontology: {}", errors.join("; "));
    }

    debug!(
        policy = policy.display_name(),
        mode = %policy.mode,
        rules = policy.rules.len(),
        "inputs loaded"
    );
    Ok(Inputs { policy, ontology })
}

/// Structural checks, plus the subject check and external report when configured.
pub fn build_evaluator(settings: &RunSettings, inputs: &Inputs) -> anyhow::Result<ChainEvaluator> {
    let mut chain = ChainEvaluator::new().with(StructuralEvaluator::new(Some(
        inputs.ontology.clone(),
    )));
    if settings.check_subjects {
        chain = chain.with(SubjectEvaluator);
    }
    if let Some(path) = &settings.violations_path {
        chain = chain.with(ReportEvaluator::from_path(path)?);
    }
    Ok(chain)
}

pub struct CheckOutcome {
    pub violations: Vec<Violation>,
    /// Violations whose governing rule is `strict`.
    pub strict: usize,
    pub policy_block: bool,
}

/// Evaluate the graph once.
pub fn run_check(settings: &RunSettings, graphs: &dyn GraphStore) -> Result<CheckOutcome, ToolError> {
    let inputs = load_inputs(settings)?;
    let evaluator = build_evaluator(settings, &inputs)?;
    let graph = graphs.load()?;

    let mut violations: Vec<Violation> = evaluator
        .evaluate(&graph)
        .context("evaluate rules")?
        .into_iter()
        .map(Violation::normalized)
        .collect();
    violations.sort_by(|a, b| (&a.req_id, a.code.as_str()).cmp(&(&b.req_id, b.code.as_str())));

    let registry = PolicyRegistry::new(&inputs.policy);
    let strict = violations.iter().filter(|v| registry.is_strict(v)).count();
    info!(violations = violations.len(), strict, "check finished");
    Ok(CheckOutcome {
        policy_block: strict > 0,
        violations,
        strict,
    })
}

pub struct PlanOutcome {
    pub plan: FixPlan,
    /// Records written to the store (empty on a dry run).
    pub recorded: Vec<String>,
}

/// Plan against every governed violation without touching the graph.
///
/// Unless this is a dry run the proposed sets are recorded so they can later be applied by id.
pub fn run_plan(
    settings: &RunSettings,
    graphs: &dyn GraphStore,
    store: &dyn ChangeSetStore,
) -> Result<PlanOutcome, ToolError> {
    let inputs = load_inputs(settings)?;
    let evaluator = build_evaluator(settings, &inputs)?;
    let graph = graphs.load()?;

    let plan = inputs
        .executor()
        .preview_fixes(&graph, &evaluator)
        .context("plan fixes")?;

    let mut recorded = Vec::new();
    if !settings.dry_run {
        for cs in &plan.change_sets {
            if record_proposed(store, cs)? {
                recorded.push(cs.id.clone());
            }
        }
    }
    info!(
        change_sets = plan.change_sets.len(),
        recorded = recorded.len(),
        "plan finished"
    );
    Ok(PlanOutcome { plan, recorded })
}

/// Write a proposed set unless a record with the same id has already moved on.
fn record_proposed(store: &dyn ChangeSetStore, cs: &ChangeSet) -> anyhow::Result<bool> {
    match store.get(&cs.id)? {
        Some(existing) if existing.status != ChangeSetStatus::Proposed => {
            debug!(change_set = %cs.id, status = %existing.status, "keeping existing record");
            Ok(false)
        }
        _ => {
            store.put(cs)?;
            Ok(true)
        }
    }
}

/// Store applied sets, numbering them after everything the store has seen applied.
fn record_applied(store: &dyn ChangeSetStore, applied: &[ChangeSet]) -> anyhow::Result<()> {
    let mut seq = store
        .list()?
        .iter()
        .filter_map(|cs| cs.metadata.applied_seq)
        .max()
        .unwrap_or(0);
    for cs in applied {
        seq += 1;
        let mut cs = cs.clone();
        cs.metadata.applied_seq = Some(seq);
        store.put(&cs)?;
    }
    Ok(())
}

pub struct FixRunOutcome {
    pub outcome: FixOutcome,
    pub policy_block: bool,
}

impl FixRunOutcome {
    /// The loop stopped on an evaluator error. The outcome still carries the partial graph.
    pub fn error(&self) -> Option<&str> {
        self.outcome.error.as_deref()
    }
}

/// Run the fix loop. Unless this is a dry run, the final graph is saved and every applied and
/// pending set is recorded, also when the loop stopped on an error.
pub fn run_fix(
    settings: &RunSettings,
    graphs: &dyn GraphStore,
    store: &dyn ChangeSetStore,
) -> Result<FixRunOutcome, ToolError> {
    let inputs = load_inputs(settings)?;
    let evaluator = build_evaluator(settings, &inputs)?;
    fix_with(settings, &inputs, &evaluator, graphs, store)
}

fn fix_with(
    settings: &RunSettings,
    inputs: &Inputs,
    evaluator: &dyn RuleEvaluator,
    graphs: &dyn GraphStore,
    store: &dyn ChangeSetStore,
) -> Result<FixRunOutcome, ToolError> {
    let graph = graphs.load()?;

    let outcome = inputs.executor().execute(&graph, evaluator);
    if let Some(error) = &outcome.error {
        warn!(
            error = %error,
            applied = outcome.applied_change_sets.len(),
            "fix loop stopped on an error"
        );
    }

    if !settings.dry_run {
        if !outcome.applied_change_sets.is_empty() {
            graphs.save(&outcome.graph).context("save graph")?;
        }
        record_applied(store, &outcome.applied_change_sets)?;
        for cs in &outcome.pending_change_sets {
            record_proposed(store, cs)?;
        }
    }

    let policy_block = fix_blocks(&inputs.policy, &outcome);
    Ok(FixRunOutcome {
        outcome,
        policy_block,
    })
}

/// A run blocks while strict violations remain. Apply failures alone do not block: a later set
/// in the same pass can go stale because an earlier one already repaired its target.
fn fix_blocks(policy: &FixPolicy, outcome: &FixOutcome) -> bool {
    let registry = PolicyRegistry::new(policy);
    outcome
        .new_violations
        .iter()
        .any(|v| registry.is_strict(v))
}

/// Apply recorded sets chosen by a human, in the given order.
pub fn run_apply(
    settings: &RunSettings,
    ids: &[String],
    graphs: &dyn GraphStore,
    store: &dyn ChangeSetStore,
) -> Result<FixRunOutcome, ToolError> {
    let inputs = load_inputs(settings)?;
    let graph = graphs.load()?;
    let candidates: Vec<ChangeSet> = store
        .list()?
        .into_iter()
        .filter(|cs| cs.status == ChangeSetStatus::Proposed)
        .collect();

    let outcome = inputs.executor().apply_selected(ids, &graph, &candidates);
    if !settings.dry_run {
        if !outcome.applied_change_sets.is_empty() {
            graphs.save(&outcome.graph).context("save graph")?;
        }
        record_applied(store, &outcome.applied_change_sets)?;
    }
    let policy_block = !outcome.apply_failures.is_empty();
    Ok(FixRunOutcome {
        outcome,
        policy_block,
    })
}

/// Roll back applied sets, newest first. `ids` empty means every applied set.
pub fn run_rollback(
    settings: &RunSettings,
    ids: &[String],
    graphs: &dyn GraphStore,
    store: &dyn ChangeSetStore,
) -> Result<RollbackAllResult, ToolError> {
    let inputs = load_inputs(settings)?;
    let graph = graphs.load()?;

    let mut sets: Vec<ChangeSet> = store
        .list()?
        .into_iter()
        .filter(|cs| cs.status == ChangeSetStatus::Applied)
        .filter(|cs| ids.is_empty() || ids.contains(&cs.id))
        .collect();
    for id in ids {
        if !sets.iter().any(|cs| &cs.id == id) {
            return Err(anyhow::anyhow!("no applied change set with id {}", id).into());
        }
    }
    sets.sort_by(|a, b| {
        (a.metadata.applied_seq, a.metadata.applied_at, &a.id).cmp(&(
            b.metadata.applied_seq,
            b.metadata.applied_at,
            &b.id,
        ))
    });

    let executor = inputs.executor();
    let result = executor.rollback_all(&sets, &graph);
    if !settings.dry_run && !result.rolled_back.is_empty() {
        graphs.save(&result.restored).context("save graph")?;
        let at = chrono::Utc::now();
        for cs in sets.iter_mut().filter(|cs| result.rolled_back.contains(&cs.id)) {
            cs.mark_rolled_back(at)
                .with_context(|| format!("record rollback of {}", cs.id))?;
            store.put(cs)?;
        }
    }
    Ok(result)
}

/// Impact of changing one requirement.
pub fn run_impact(
    graphs: &dyn GraphStore,
    id: &str,
    proposed: Option<&ProposedChanges>,
) -> anyhow::Result<ImpactReport> {
    let graph = graphs.load()?;
    let report = ImpactAnalyzer::new(&graph)
        .analyze_impact(id, proposed)
        .with_context(|| format!("analyze impact of {}", id))?;
    Ok(report)
}

/// Everything reachable from one requirement through `depends_on`, in either direction.
pub fn run_dependency_graph(graphs: &dyn GraphStore, id: &str) -> anyhow::Result<DependencyGraph> {
    let graph = graphs.load()?;
    let dg = ImpactAnalyzer::new(&graph)
        .dependency_graph(id)
        .with_context(|| format!("dependency graph of {}", id))?;
    Ok(dg)
}
