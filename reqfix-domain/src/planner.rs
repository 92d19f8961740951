use crate::actions::{self, ActionInput, ActionPlanner};
use crate::preview::preview_entries;
use chrono::{DateTime, Utc};
use reqfix_domain_policy::PolicyRegistry;
use reqfix_domain_policy::determinism::change_set_id;
use reqfix_edit::apply_change;
use reqfix_ontology::OntologyManager;
use reqfix_types::ReqId;
use reqfix_types::changeset::{Change, ChangeSet, ChangeSetMetadata};
use reqfix_types::graph::{GraphView, RequirementGraph};
use reqfix_types::plan::{EstimatedImpact, FixPlan};
use reqfix_types::policy::{ActionKind, FixPolicy, FixRule, GroupBy};
use reqfix_types::violation::Violation;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Inputs that stay fixed for one planning pass.
#[derive(Clone, Copy)]
pub struct PlanContext<'a> {
    pub policy: &'a FixPolicy,
    pub ontology: Option<&'a OntologyManager>,
    /// 1-based fix-loop iteration; part of every change set id.
    pub iteration: u32,
    pub created_at: DateTime<Utc>,
}

pub struct FixPlanner {
    planners: Vec<Box<dyn ActionPlanner>>,
}

impl Default for FixPlanner {
    fn default() -> Self {
        Self::new()
    }
}

/// Violations that end up in one change set.
struct Group<'a> {
    rule_ids: Vec<&'a str>,
    items: Vec<(&'a FixRule, &'a Violation)>,
}

impl FixPlanner {
    pub fn new() -> Self {
        Self {
            planners: actions::builtin_action_planners(),
        }
    }

    pub fn with_planners(planners: Vec<Box<dyn ActionPlanner>>) -> Self {
        Self { planners }
    }

    pub fn plan(
        &self,
        ctx: &PlanContext<'_>,
        violations: &[Violation],
        graph: &RequirementGraph,
    ) -> FixPlan {
        let registry = PolicyRegistry::new(ctx.policy);

        // Deterministic ordering, independent of evaluator output order.
        let mut ordered: Vec<&Violation> = Vec::with_capacity(violations.len());
        let mut seen = HashSet::new();
        for v in violations {
            if seen.insert(v.id.as_str()) {
                ordered.push(v);
            }
        }
        ordered.sort_by(|a, b| {
            (a.code.as_str(), &a.req_id, &a.id).cmp(&(b.code.as_str(), &b.req_id, &b.id))
        });

        let groups = group_violations(&registry, &ordered, graph);

        let mut change_sets = Vec::new();
        for group in &groups {
            if let Some(cs) = self.build_change_set(ctx, group, graph) {
                change_sets.push(cs);
            }
        }

        debug!(
            iteration = ctx.iteration,
            violations = ordered.len(),
            change_sets = change_sets.len(),
            "fix plan built"
        );

        let preview = change_sets
            .iter()
            .map(|cs| reqfix_render::render_change_set_md(cs, graph))
            .collect::<Vec<_>>()
            .join("\n---\n\n");

        FixPlan {
            total_changes: change_sets.iter().map(|cs| cs.changes.len() as u64).sum(),
            estimated_impact: estimate(&change_sets),
            preview,
            change_sets,
        }
    }

    fn planner_for(&self, kind: ActionKind) -> Option<&dyn ActionPlanner> {
        self.planners
            .iter()
            .find(|p| p.kind() == kind)
            .map(|p| p.as_ref())
    }

    fn build_change_set(
        &self,
        ctx: &PlanContext<'_>,
        group: &Group<'_>,
        graph: &RequirementGraph,
    ) -> Option<ChangeSet> {
        let mut scratch = graph.clone();
        let mut changes: Vec<Change> = Vec::new();

        for (rule, violation) in &group.items {
            for action in &rule.actions {
                let Some(planner) = self.planner_for(action.kind) else {
                    warn!(rule = %rule.id, action = %action.kind, "no planner for action");
                    continue;
                };
                let planned = planner.plan(&ActionInput {
                    violation,
                    graph: &scratch,
                    params: &action.params,
                    ontology: ctx.ontology,
                });
                for p in planned {
                    let preview = preview_entries(&p.op, &scratch);
                    match apply_change(&mut scratch, &p.op) {
                        Ok(()) => changes.push(Change {
                            operation: p.op,
                            rationale: p.rationale,
                            addresses: violation.to_ref(),
                            preview,
                        }),
                        Err(err) => debug!(
                            rule = %rule.id,
                            violation = %violation.id,
                            error = %err,
                            "planned change does not apply; dropped"
                        ),
                    }
                }
            }
        }

        if changes.is_empty() {
            return None;
        }

        let rule_id = group.rule_ids.join("+");
        let violation_ids: Vec<&str> = group.items.iter().map(|(_, v)| v.id.as_str()).collect();
        let scope = format!("{}|{}", rule_id, violation_ids.join(","));
        let id = change_set_id(ctx.iteration, &scope, changes.iter().map(|c| &c.operation));
        let mut cs = ChangeSet::new(id.to_string(), ctx.created_at);
        cs.violations = group.items.iter().map(|(_, v)| v.to_ref()).collect();
        cs.impacted = impacted(&changes, graph);
        cs.changes = changes;
        cs.metadata = ChangeSetMetadata {
            policy: ctx.policy.name.clone(),
            rule_id: Some(rule_id),
            iteration: ctx.iteration,
            ..ChangeSetMetadata::default()
        };
        cs.refresh_reversible();
        Some(cs)
    }
}

fn group_violations<'a>(
    registry: &PolicyRegistry<'a>,
    violations: &[&'a Violation],
    graph: &RequirementGraph,
) -> Vec<Group<'a>> {
    let mut groups: Vec<Group<'a>> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for rule in registry.rules_by_priority().iter().copied() {
        for violation in violations.iter().copied() {
            if !registry.governs(rule, violation) {
                continue;
            }
            if !guard_allows(rule, violation, graph) {
                debug!(rule = %rule.id, violation = %violation.id, "guard rejected violation");
                continue;
            }

            let key = match rule.group_by {
                GroupBy::None => format!("{}|{}", rule.id, violation.id),
                GroupBy::RootCause => format!(
                    "{}|{}|{}",
                    rule.id,
                    violation.code,
                    violation.root_cause_key()
                ),
                GroupBy::Target => format!("target|{}", violation.req_id),
            };
            let slot = *index.entry(key).or_insert_with(|| {
                groups.push(Group {
                    rule_ids: Vec::new(),
                    items: Vec::new(),
                });
                groups.len() - 1
            });
            let group = &mut groups[slot];
            if !group.rule_ids.contains(&rule.id.as_str()) {
                group.rule_ids.push(rule.id.as_str());
            }
            group.items.push((rule, violation));
        }
    }
    groups
}

/// Stage filter needs the target to exist; a threshold the violation does not report fails.
fn guard_allows(rule: &FixRule, violation: &Violation, graph: &RequirementGraph) -> bool {
    let guard = &rule.guard;
    if !guard.stages.is_empty() {
        match graph.get(&violation.req_id) {
            Some(req) if guard.stages.contains(&req.stage) => {}
            _ => return false,
        }
    }
    let meets = |min: Option<f64>, value: Option<f64>| match (min, value) {
        (None, _) => true,
        (Some(min), Some(v)) => v >= min,
        (Some(_), None) => false,
    };
    meets(guard.min_confidence, violation.confidence)
        && meets(guard.min_similarity, violation.similarity)
}

/// Targets, created ids, and the direct neighbourhood (parents, dependencies, dependents) of
/// every target.
fn impacted(changes: &[Change], graph: &RequirementGraph) -> BTreeSet<ReqId> {
    let mut out = BTreeSet::new();
    for change in changes {
        out.extend(change.operation.created_ids());
        for target in change.operation.targets() {
            if let Some(req) = graph.get(&target) {
                out.extend(req.refines.iter().cloned());
                out.extend(req.depends_on.iter().cloned());
            }
            out.extend(graph.dependents(&target).into_iter().map(|r| r.id.clone()));
            out.insert(target);
        }
    }
    out
}

fn estimate(change_sets: &[ChangeSet]) -> EstimatedImpact {
    let mut affected = BTreeSet::new();
    let mut created = BTreeSet::new();
    let mut superseded = BTreeSet::new();
    let mut touched = BTreeSet::new();
    for cs in change_sets {
        affected.extend(cs.impacted.iter().cloned());
        for change in &cs.changes {
            created.extend(change.operation.created_ids());
            superseded.extend(change.operation.superseded_ids());
            touched.extend(change.operation.targets());
        }
    }
    let modified = touched.difference(&superseded).count();
    EstimatedImpact {
        requirements_affected: affected.len() as u64,
        new_requirements: created.len() as u64,
        modified_requirements: modified as u64,
        superseded_requirements: superseded.len() as u64,
    }
}
