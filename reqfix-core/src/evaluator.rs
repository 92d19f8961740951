//! Built-in rule evaluators.
//!
//! [`StructuralEvaluator`] covers the rules that need nothing but the graph and the ontology:
//! hierarchy legality, dangling references, cycles, abstraction-score bounds and orphaned split
//! parts. [`SubjectEvaluator`] is a minimal style check. Text-quality detectors plug in through
//! [`RuleEvaluator`] and compose with [`ChainEvaluator`].

use crate::ports::RuleEvaluator;
use reqfix_domain::has_subject;
use reqfix_ontology::{HierarchyNode, OntologyErrorCode, OntologyManager};
use reqfix_types::ReqId;
use reqfix_types::graph::RequirementGraph;
use reqfix_types::requirement::{EdgeKind, Requirement, RequirementStatus};
use reqfix_types::violation::{Severity, Violation, ViolationCode};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::debug;

/// Code for a split part whose source no longer lists it. Reported, never planned.
pub const ORPHANED_SPLIT_PART: &str = "graph.orphaned_split_part";

/// Edge kinds walked by cycle detection.
const CYCLE_EDGES: [EdgeKind; 2] = [EdgeKind::Refines, EdgeKind::DependsOn];

#[derive(Debug, Clone, Default)]
pub struct StructuralEvaluator {
    ontology: Option<OntologyManager>,
}

impl StructuralEvaluator {
    pub fn new(ontology: Option<OntologyManager>) -> Self {
        Self { ontology }
    }

    pub fn ontology(&self) -> Option<&OntologyManager> {
        self.ontology.as_ref()
    }

    fn check(&self, graph: &RequirementGraph) -> Vec<Violation> {
        let mut out = Vec::new();
        if let Some(ontology) = &self.ontology {
            out.extend(hierarchy_violations(ontology, graph));
            out.extend(abstraction_violations(ontology, graph));
        }
        out.extend(dangling_violations(graph, self.ontology.is_some()));
        out.extend(cycle_violations(graph));
        out.extend(orphaned_parts(graph));
        out
    }
}

impl RuleEvaluator for StructuralEvaluator {
    fn evaluate(&self, graph: &RequirementGraph) -> anyhow::Result<Vec<Violation>> {
        let violations = self.check(graph);
        debug!(
            requirements = graph.len(),
            violations = violations.len(),
            "structural evaluation"
        );
        Ok(violations)
    }
}

fn live(graph: &RequirementGraph) -> impl Iterator<Item = &Requirement> {
    graph
        .iter()
        .filter(|r| r.status != RequirementStatus::Superseded)
}

fn hierarchy_violations(ontology: &OntologyManager, graph: &RequirementGraph) -> Vec<Violation> {
    // One row per declared parent, so every link is checked.
    let mut rows = Vec::new();
    for req in graph.iter() {
        if req.refines.is_empty() {
            rows.push(HierarchyNode::new(&req.id, &req.stage, None));
        }
        for parent in &req.refines {
            rows.push(HierarchyNode::new(
                &req.id,
                &req.stage,
                Some(parent.clone()),
            ));
        }
    }

    let result = ontology.validate_hierarchy(&rows);
    let mut seen: HashSet<(ReqId, OntologyErrorCode, String)> = HashSet::new();
    let mut out = Vec::new();

    for err in result.errors {
        let Some(node_id) = err.node_id.clone() else {
            continue;
        };
        let Some(req) = graph.get(&node_id) else {
            continue;
        };
        if req.status == RequirementStatus::Superseded {
            continue;
        }
        if !seen.insert((node_id.clone(), err.code, err.message.clone())) {
            continue;
        }

        let code = match err.code {
            OntologyErrorCode::InvalidDerivation if bridges_gap(ontology, graph, req) => {
                ViolationCode::AbstractionGap
            }
            other => ViolationCode::from(other.as_str()),
        };
        let mut v = Violation::new(node_id, code.clone(), err.message).with_severity(Severity::Error);
        if matches!(
            code,
            ViolationCode::MissingParent
                | ViolationCode::ParentNotFound
                | ViolationCode::InvalidDerivation
        ) {
            v = v.with_related(parent_candidates(ontology, graph, req));
        }
        out.push(v);
    }
    out
}

/// An illegal parent link that a single intermediate stage would make legal.
fn bridges_gap(ontology: &OntologyManager, graph: &RequirementGraph, req: &Requirement) -> bool {
    req.refines
        .iter()
        .filter_map(|p| graph.get(p))
        .any(|parent| ontology.bridging_stage(&parent.stage, &req.stage).is_some())
}

/// The single live requirement whose stage may parent `req`, if exactly one exists.
fn parent_candidates(
    ontology: &OntologyManager,
    graph: &RequirementGraph,
    req: &Requirement,
) -> Vec<ReqId> {
    let stages = ontology.allowed_parent_stages(&req.stage);
    let candidates: Vec<ReqId> = live(graph)
        .filter(|r| r.id != req.id && stages.contains(&r.stage))
        .map(|r| r.id.clone())
        .collect();
    if candidates.len() == 1 {
        candidates
    } else {
        Vec::new()
    }
}

fn abstraction_violations(ontology: &OntologyManager, graph: &RequirementGraph) -> Vec<Violation> {
    let mut out = Vec::new();
    for req in live(graph) {
        let (Some(score), Some(rule)) = (
            req.abstraction_score(),
            ontology.granularity_rule(&req.stage),
        ) else {
            continue;
        };
        let bounds = rule.abstraction_score;
        if bounds.contains(score) {
            continue;
        }
        let mut v = Violation::new(
            &req.id,
            ViolationCode::AbstractionOutOfRange,
            format!(
                "Abstraction score {:.2} of \"{}\" is outside [{:.2}, {:.2}] for stage \"{}\"",
                score, req.id, bounds.min, bounds.max, req.stage
            ),
        );
        v.details = Some(format!("recommended {:.2}", bounds.recommended));
        out.push(v);
    }
    out
}

/// With an ontology, missing `refines` targets are already reported as `PARENT_NOT_FOUND`.
fn dangling_violations(graph: &RequirementGraph, hierarchy_checked: bool) -> Vec<Violation> {
    let mut by_req: BTreeMap<ReqId, Vec<(EdgeKind, ReqId)>> = BTreeMap::new();
    for (from, kind, to) in graph.dangling_references() {
        if hierarchy_checked && kind == EdgeKind::Refines {
            continue;
        }
        by_req.entry(from).or_default().push((kind, to));
    }

    let mut out = Vec::new();
    for (from, refs) in by_req {
        if graph
            .get(&from)
            .is_some_and(|r| r.status == RequirementStatus::Superseded)
        {
            continue;
        }
        let listed: Vec<String> = refs
            .iter()
            .map(|(kind, to)| format!("{kind} {to}"))
            .collect();
        let v = Violation::new(
            &from,
            ViolationCode::DanglingReference,
            format!(
                "Requirement \"{}\" references missing requirements: {}",
                from,
                listed.join(", ")
            ),
        )
        .with_severity(Severity::Error)
        .with_related(refs.into_iter().map(|(_, to)| to).collect());
        out.push(v);
    }
    out
}

/// Every elementary cycle closed by a DFS back edge over `refines` and `depends_on`.
///
/// Each cycle is reported once per member, with the member list rotated to start at its
/// smallest id so all reports of one cycle carry the same evidence.
pub fn find_cycles(graph: &RequirementGraph) -> Vec<Vec<ReqId>> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        Open,
        Done,
    }

    let successors = |id: &str| -> Vec<ReqId> {
        let Some(req) = graph.get(id) else {
            return Vec::new();
        };
        let mut next: BTreeSet<ReqId> = BTreeSet::new();
        for kind in CYCLE_EDGES {
            next.extend(req.edges(kind).iter().filter(|t| graph.contains(t)).cloned());
        }
        next.into_iter().collect()
    };

    let mut marks: BTreeMap<ReqId, Mark> = BTreeMap::new();
    let mut seen_sets: HashSet<Vec<ReqId>> = HashSet::new();
    let mut cycles = Vec::new();

    for root in graph.ids() {
        if marks.contains_key(root) {
            continue;
        }
        // Worklist of (node, remaining successors); `path` mirrors the open nodes.
        let mut stack: Vec<(ReqId, Vec<ReqId>)> = vec![(root.clone(), successors(root))];
        let mut path: Vec<ReqId> = vec![root.clone()];
        marks.insert(root.clone(), Mark::Open);

        while let Some((_, pending)) = stack.last_mut() {
            let Some(next) = pending.pop() else {
                if let Some((done, _)) = stack.pop() {
                    marks.insert(done, Mark::Done);
                    path.pop();
                }
                continue;
            };
            match marks.get(&next) {
                Some(Mark::Open) => {
                    if let Some(start) = path.iter().position(|p| *p == next) {
                        let cycle = canonical_rotation(&path[start..]);
                        let mut key = cycle.clone();
                        key.sort();
                        if seen_sets.insert(key) {
                            cycles.push(cycle);
                        }
                    }
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(next.clone(), Mark::Open);
                    path.push(next.clone());
                    let succ = successors(&next);
                    stack.push((next, succ));
                }
            }
        }
    }
    cycles
}

fn canonical_rotation(members: &[ReqId]) -> Vec<ReqId> {
    let start = members
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);
    members[start..]
        .iter()
        .chain(members[..start].iter())
        .cloned()
        .collect()
}

fn cycle_violations(graph: &RequirementGraph) -> Vec<Violation> {
    let mut out = Vec::new();
    for cycle in find_cycles(graph) {
        let path = cycle
            .iter()
            .chain(cycle.first())
            .cloned()
            .collect::<Vec<_>>()
            .join(" -> ");
        for member in &cycle {
            out.push(
                Violation::new(
                    member,
                    ViolationCode::Cycle,
                    format!("Requirement \"{member}\" is on the cycle {path}"),
                )
                .with_severity(Severity::Error)
                .with_cycle(cycle.clone()),
            );
        }
    }
    out
}

/// Live parts derived from a superseded source that no longer lists them.
fn orphaned_parts(graph: &RequirementGraph) -> Vec<Violation> {
    let mut out = Vec::new();
    for req in live(graph) {
        for source in &req.derived_from {
            let Some(src) = graph.get(source) else {
                continue;
            };
            if src.status == RequirementStatus::Superseded && !src.supersedes.contains(&req.id) {
                out.push(
                    Violation::new(
                        &req.id,
                        ViolationCode::Unregistered(ORPHANED_SPLIT_PART.to_string()),
                        format!(
                            "Requirement \"{}\" is derived from superseded \"{}\" which no longer lists it",
                            req.id, source
                        ),
                    )
                    .with_severity(Severity::Info)
                    .with_related(vec![source.clone()]),
                );
            }
        }
    }
    out
}

/// Flags live requirements whose description has no subject before its modal verb.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubjectEvaluator;

impl RuleEvaluator for SubjectEvaluator {
    fn evaluate(&self, graph: &RequirementGraph) -> anyhow::Result<Vec<Violation>> {
        Ok(live(graph)
            .filter(|r| !r.description.trim().is_empty() && !has_subject(&r.description))
            .map(|r| {
                let mut v = Violation::new(
                    &r.id,
                    ViolationCode::MissingSubject,
                    format!("Requirement \"{}\" does not name a subject", r.id),
                );
                v.suggestion = Some("Start the statement with \"The system shall\"".to_string());
                v
            })
            .collect())
    }
}

/// Runs several evaluators and concatenates their output.
#[derive(Default)]
pub struct ChainEvaluator {
    evaluators: Vec<Box<dyn RuleEvaluator>>,
}

impl ChainEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, evaluator: impl RuleEvaluator + 'static) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }

    pub fn len(&self) -> usize {
        self.evaluators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty()
    }
}

impl RuleEvaluator for ChainEvaluator {
    fn evaluate(&self, graph: &RequirementGraph) -> anyhow::Result<Vec<Violation>> {
        let mut out = Vec::new();
        for evaluator in &self.evaluators {
            out.extend(evaluator.evaluate(graph)?);
        }
        Ok(out)
    }
}
