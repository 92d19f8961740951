//! The convergence loop: revalidate, plan, gate, apply, repeat.

use crate::ports::RuleEvaluator;
use chrono::{DateTime, Utc};
use reqfix_domain::{FixPlanner, PlanContext};
use reqfix_domain_policy::{PolicyRegistry, RuleLookup};
use reqfix_edit::ChangeEngine;
use reqfix_ontology::OntologyManager;
use reqfix_types::changeset::{ChangeSet, ChangeSetStatus};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::outcome::{ApplyFailure, FixOutcome, RollbackAllResult, StoppedReason};
use reqfix_types::plan::FixPlan;
use reqfix_types::policy::{ActionKind, ActionMode, FixPolicy, PolicyMode};
use reqfix_types::violation::{Violation, ViolationCode};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Why a change set may or may not be applied without a human.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoApplyDecision {
    Auto,
    /// The policy's global mode is not `strict`.
    ModeNotStrict(PolicyMode),
    /// No rule governs the code a change addresses.
    RuleMissing { code: ViolationCode },
    /// The governing rule has no action of the change's kind.
    ActionMissing { rule_id: String, action: ActionKind },
    /// The action exists but asks for human approval.
    NeedsApproval { rule_id: String, action: ActionKind },
    /// A set without changes is never applied automatically.
    Empty,
}

impl AutoApplyDecision {
    pub fn is_auto(&self) -> bool {
        matches!(self, AutoApplyDecision::Auto)
    }
}

pub struct FixExecutor<'a> {
    policy: &'a FixPolicy,
    registry: PolicyRegistry<'a>,
    ontology: Option<&'a OntologyManager>,
    planner: FixPlanner,
    engine: ChangeEngine,
    clock: Option<DateTime<Utc>>,
}

impl<'a> FixExecutor<'a> {
    pub fn new(policy: &'a FixPolicy) -> Self {
        Self {
            policy,
            registry: PolicyRegistry::new(policy),
            ontology: None,
            planner: FixPlanner::new(),
            engine: ChangeEngine::new(),
            clock: None,
        }
    }

    pub fn with_ontology(mut self, ontology: Option<&'a OntologyManager>) -> Self {
        self.ontology = ontology;
        self
    }

    pub fn with_planner(mut self, planner: FixPlanner) -> Self {
        self.planner = planner;
        self
    }

    /// Pin every timestamp the executor writes. Used for reproducible records.
    pub fn with_clock(mut self, at: DateTime<Utc>) -> Self {
        self.clock = Some(at);
        self
    }

    pub fn policy(&self) -> &'a FixPolicy {
        self.policy
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.unwrap_or_else(Utc::now)
    }

    fn evaluate(
        &self,
        evaluator: &dyn RuleEvaluator,
        graph: &RequirementGraph,
    ) -> anyhow::Result<Vec<Violation>> {
        let mut violations: Vec<Violation> = evaluator
            .evaluate(graph)?
            .into_iter()
            .map(Violation::normalized)
            .collect();
        violations.sort_by(|a, b| {
            (&a.req_id, a.code.as_str(), &a.id).cmp(&(&b.req_id, b.code.as_str(), &b.id))
        });
        violations.dedup_by(|a, b| a.id == b.id);
        Ok(violations)
    }

    fn strict_violations(&self, violations: &[Violation]) -> Vec<Violation> {
        violations
            .iter()
            .filter(|v| self.registry.is_strict(v))
            .cloned()
            .collect()
    }

    fn plan_with(
        &self,
        iteration: u32,
        violations: &[Violation],
        graph: &RequirementGraph,
    ) -> FixPlan {
        let ctx = PlanContext {
            policy: self.policy,
            ontology: self.ontology,
            iteration,
            created_at: self.now(),
        };
        self.planner.plan(&ctx, violations, graph)
    }

    /// Run the loop until a fixed point, the iteration cap, or an evaluator error.
    ///
    /// The input graph is never modified; the final snapshot is returned in the outcome, also
    /// when the run stops with an error.
    pub fn execute(&self, graph: &RequirementGraph, evaluator: &dyn RuleEvaluator) -> FixOutcome {
        let max_iterations = self.policy.stopping.max_iterations.max(1);
        let mut outcome = FixOutcome::new(graph.clone());
        let mut current = graph.clone();
        let mut addressed: Vec<String> = Vec::new();
        let mut last_violations: Option<Vec<Violation>> = None;

        let stopped = loop {
            if outcome.iterations >= max_iterations {
                break StoppedReason::MaxIterationsReached;
            }
            outcome.iterations += 1;
            let iteration = outcome.iterations;

            let violations = match self.evaluate(evaluator, &current) {
                Ok(v) => v,
                Err(err) => {
                    warn!(iteration, error = %format!("{err:#}"), "rule evaluation failed");
                    outcome.error = Some(format!("{err:#}"));
                    break StoppedReason::Error;
                }
            };
            let strict = self.strict_violations(&violations);
            debug!(
                iteration,
                violations = violations.len(),
                strict = strict.len(),
                "revalidated"
            );
            last_violations = Some(violations);

            if strict.is_empty() {
                break StoppedReason::FixedPoint;
            }

            let plan = self.plan_with(iteration, &strict, &current);
            if plan.is_empty() {
                debug!(iteration, "nothing actionable");
                break StoppedReason::FixedPoint;
            }

            // Only the latest plan's leftovers are offered for approval.
            outcome.pending_change_sets.clear();
            let mut applied_any = false;
            for cs in plan.change_sets {
                let decision = self.can_auto_apply(&cs);
                if self.first_violation_reading(&cs) != decision.is_auto() {
                    warn!(
                        change_set = %cs.id,
                        "auto-apply verdict differs when judged by the first violation only"
                    );
                    outcome.auto_apply_discrepancies.push(cs.id.clone());
                }
                if !decision.is_auto() {
                    debug!(change_set = %cs.id, decision = ?decision, "awaiting approval");
                    outcome.pending_change_sets.push(cs);
                    continue;
                }

                match self.apply_one(cs, &current) {
                    Ok((applied, next)) => {
                        current = next;
                        addressed.extend(applied.violation_ids().map(str::to_string));
                        outcome.applied_change_sets.push(applied);
                        applied_any = true;
                    }
                    Err(failure) => outcome.apply_failures.push(failure),
                }
            }

            if !applied_any {
                debug!(iteration, "no change set applied");
                break StoppedReason::FixedPoint;
            }
            // Every pass starts by revalidating, which covers `revalidate_after_each`.
            last_violations = None;
        };

        outcome.stopped_reason = stopped;
        outcome.success = stopped != StoppedReason::Error;

        if stopped != StoppedReason::Error {
            let remaining = match last_violations {
                Some(v) => Ok(v),
                None => self.evaluate(evaluator, &current),
            };
            match remaining {
                Ok(v) => outcome.new_violations = v,
                Err(err) => {
                    outcome.stopped_reason = StoppedReason::Error;
                    outcome.success = false;
                    outcome.error = Some(format!("{err:#}"));
                }
            }
        }

        let still_open: HashSet<&str> = outcome
            .new_violations
            .iter()
            .map(|v| v.id.as_str())
            .collect();
        let mut fixed = Vec::new();
        for id in addressed {
            if !still_open.contains(id.as_str()) && !fixed.contains(&id) {
                fixed.push(id);
            }
        }
        outcome.fixed_violations = fixed;

        outcome.graph = current;
        info!(
            iterations = outcome.iterations,
            stopped = %outcome.stopped_reason,
            applied = outcome.applied_change_sets.len(),
            pending = outcome.pending_change_sets.len(),
            remaining = outcome.new_violations.len(),
            "fix run finished"
        );
        outcome
    }

    /// Approve, apply and mark one set. The graph is untouched on failure.
    fn apply_one(
        &self,
        mut cs: ChangeSet,
        graph: &RequirementGraph,
    ) -> Result<(ChangeSet, RequirementGraph), ApplyFailure> {
        let failure = |cs: &ChangeSet, errors: Vec<String>| ApplyFailure {
            change_set_id: cs.id.clone(),
            errors,
        };
        if cs.status == ChangeSetStatus::Proposed {
            if let Err(err) = cs.approve(self.now()) {
                return Err(failure(&cs, vec![err.to_string()]));
            }
        }
        if cs.status != ChangeSetStatus::Approved {
            let message = format!("change set {} is {}, not approved", cs.id, cs.status);
            return Err(failure(&cs, vec![message]));
        }

        let result = self.engine.apply(&cs, graph);
        if !result.success {
            let errors: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
            warn!(change_set = %cs.id, errors = ?errors, "change set failed to apply");
            return Err(failure(&cs, errors));
        }
        if let Err(err) = cs.mark_applied(self.now()) {
            return Err(failure(&cs, vec![err.to_string()]));
        }
        debug!(change_set = %cs.id, changes = cs.changes.len(), "change set applied");
        Ok((cs, result.modified))
    }

    /// Gate for unattended application.
    ///
    /// Each change is judged by the rule governing the violation code it addresses. Any miss
    /// fails safe toward human approval.
    pub fn can_auto_apply(&self, cs: &ChangeSet) -> AutoApplyDecision {
        if self.policy.mode != PolicyMode::Strict {
            return AutoApplyDecision::ModeNotStrict(self.policy.mode);
        }
        if cs.changes.is_empty() {
            return AutoApplyDecision::Empty;
        }
        for change in &cs.changes {
            let decision = self.judge(&change.addresses.code, change.kind());
            if !decision.is_auto() {
                warn!(change_set = %cs.id, decision = ?decision, "change is not auto-applicable");
                return decision;
            }
        }
        AutoApplyDecision::Auto
    }

    fn judge(&self, code: &ViolationCode, kind: ActionKind) -> AutoApplyDecision {
        let rule = match self.registry.lookup(code) {
            RuleLookup::Registered(rule) => rule,
            RuleLookup::Unregistered => {
                return AutoApplyDecision::RuleMissing { code: code.clone() };
            }
        };
        match rule.action(kind) {
            None => AutoApplyDecision::ActionMissing {
                rule_id: rule.id.clone(),
                action: kind,
            },
            Some(action) if action.mode == ActionMode::Auto => AutoApplyDecision::Auto,
            Some(_) => AutoApplyDecision::NeedsApproval {
                rule_id: rule.id.clone(),
                action: kind,
            },
        }
    }

    /// Verdict when every change is judged by the set's first violation code instead of its
    /// own. Only used to flag disagreements.
    fn first_violation_reading(&self, cs: &ChangeSet) -> bool {
        if self.policy.mode != PolicyMode::Strict || cs.changes.is_empty() {
            return false;
        }
        let Some(first) = cs.violations.first() else {
            return false;
        };
        cs.changes
            .iter()
            .all(|c| self.judge(&first.code, c.kind()).is_auto())
    }

    /// Plan against every violation the policy governs and render it, without applying.
    pub fn preview_fixes(
        &self,
        graph: &RequirementGraph,
        evaluator: &dyn RuleEvaluator,
    ) -> anyhow::Result<FixPlan> {
        let violations = self.evaluate(evaluator, graph)?;
        Ok(self.plan_with(1, &violations, graph))
    }

    /// Apply explicitly approved change sets, in the order given, bypassing the auto-apply gate.
    ///
    /// Unknown ids and sets that fail to apply are reported in `apply_failures`; the rest still
    /// apply.
    pub fn apply_selected(
        &self,
        ids: &[String],
        graph: &RequirementGraph,
        candidates: &[ChangeSet],
    ) -> FixOutcome {
        let mut outcome = FixOutcome::new(graph.clone());
        let mut current = graph.clone();
        let mut fixed: Vec<String> = Vec::new();

        for id in ids {
            let Some(cs) = candidates.iter().find(|c| &c.id == id) else {
                warn!(change_set = %id, "selected change set not found");
                outcome.apply_failures.push(ApplyFailure {
                    change_set_id: id.clone(),
                    errors: vec![format!("change set {id} not found")],
                });
                continue;
            };
            match self.apply_one(cs.clone(), &current) {
                Ok((applied, next)) => {
                    current = next;
                    for vid in applied.violation_ids() {
                        if !fixed.iter().any(|f| f == vid) {
                            fixed.push(vid.to_string());
                        }
                    }
                    outcome.applied_change_sets.push(applied);
                }
                Err(failure) => outcome.apply_failures.push(failure),
            }
        }

        outcome.success = true;
        outcome.iterations = 1;
        outcome.stopped_reason = StoppedReason::FixedPoint;
        outcome.fixed_violations = fixed;
        outcome.graph = current;
        outcome
    }

    /// Roll back applied change sets, newest first.
    ///
    /// `sets` is in application order. A set that fails to roll back is skipped and reported;
    /// the returned graph reflects every rollback that did succeed.
    pub fn rollback_all(&self, sets: &[ChangeSet], graph: &RequirementGraph) -> RollbackAllResult {
        let mut current = graph.clone();
        let mut errors = Vec::new();
        let mut rolled_back = Vec::new();

        for cs in sets.iter().rev() {
            if cs.status != ChangeSetStatus::Applied {
                errors.push(format!(
                    "change set {} is {}, only applied sets can be rolled back",
                    cs.id, cs.status
                ));
                continue;
            }
            let result = self.engine.rollback(cs, &current);
            if result.success {
                current = result.restored;
                rolled_back.push(cs.id.clone());
            } else {
                for err in result.errors {
                    errors.push(format!("change set {}: {}", cs.id, err));
                }
            }
        }

        if !errors.is_empty() {
            warn!(failed = errors.len(), "rollback finished with errors");
        }
        RollbackAllResult {
            success: errors.is_empty(),
            restored: current,
            errors,
            rolled_back,
        }
    }
}
