//! Impact analysis for proposed requirement changes.
//!
//! Walks the `depends_on` relation backwards from a requirement to find what would be affected
//! by changing it, then derives an effort estimate, risks and recommendations. All traversals
//! use explicit worklists and visited sets, so cyclic graphs terminate.

mod effort;

pub use effort::{EffortEstimate, EffortUnit, base_effort_hours, estimate_effort};

use reqfix_types::ReqId;
use reqfix_types::graph::GraphView;
use reqfix_types::requirement::{Priority, Requirement, RequirementStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImpactError {
    #[error("requirement {0} not found")]
    NotFound(ReqId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpactType {
    Direct,
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AffectedRequirement {
    pub id: ReqId,
    pub title: String,
    pub impact: ImpactType,
    pub description: String,
}

/// Changes under consideration; used only to tailor recommendations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeSet<ReqId>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Risk {
    HighPriority { priority: Priority },
    WideImpact { affected: usize },
    SunkCost { status: RequirementStatus },
    /// Heuristic only: many outgoing dependencies make a cycle more likely.
    PotentialCycle { dependencies: usize },
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::HighPriority { priority } => write!(
                f,
                "{priority} priority requirement; a change is likely to have a large effect"
            ),
            Risk::WideImpact { affected } => {
                write!(f, "may affect {affected} other requirements")
            }
            Risk::SunkCost { status } => write!(
                f,
                "requirement is already {status}; changing it may be costly"
            ),
            Risk::PotentialCycle { dependencies } => write!(
                f,
                "{dependencies} dependencies; a circular dependency may exist"
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    ReviewAffected,
    RollbackPlan,
    NotifyPriorityChange { from: Priority, to: Priority },
    ReplanDependencies,
    StagedRollout,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recommendation::ReviewAffected => {
                f.write_str("review the affected requirements and prepare a test plan")
            }
            Recommendation::RollbackPlan => f.write_str(
                "requirement is completed; change it only with careful review and a rollback plan",
            ),
            Recommendation::NotifyPriorityChange { from, to } => write!(
                f,
                "priority change {from} -> {to} may shift the schedule; notify stakeholders"
            ),
            Recommendation::ReplanDependencies => {
                f.write_str("dependency changes alter implementation order; revisit the plan")
            }
            Recommendation::StagedRollout => {
                f.write_str("impact is wide; change and test in stages")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactReport {
    pub requirement_id: ReqId,
    pub affected: Vec<AffectedRequirement>,
    pub estimated_effort: EffortEstimate,
    pub risks: Vec<Risk>,
    pub recommendations: Vec<Recommendation>,
}

impl ImpactReport {
    pub fn direct(&self) -> impl Iterator<Item = &AffectedRequirement> {
        self.affected
            .iter()
            .filter(|a| a.impact == ImpactType::Direct)
    }

    pub fn indirect(&self) -> impl Iterator<Item = &AffectedRequirement> {
        self.affected
            .iter()
            .filter(|a| a.impact == ImpactType::Indirect)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: ReqId,
    pub title: String,
    pub status: RequirementStatus,
}

/// `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: ReqId,
    pub to: ReqId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

pub struct ImpactAnalyzer<'g> {
    graph: &'g dyn GraphView,
}

impl<'g> ImpactAnalyzer<'g> {
    pub fn new(graph: &'g dyn GraphView) -> Self {
        Self { graph }
    }

    pub fn analyze_impact(
        &self,
        id: &str,
        proposed: Option<&ProposedChanges>,
    ) -> Result<ImpactReport, ImpactError> {
        let requirement = self
            .graph
            .get_requirement(id)
            .ok_or_else(|| ImpactError::NotFound(id.to_string()))?;

        let direct = self.sorted_dependents(id);
        let indirect = self.indirect_dependents(id, &direct);

        let mut affected = Vec::with_capacity(direct.len() + indirect.len());
        for r in &direct {
            affected.push(AffectedRequirement {
                id: r.id.clone(),
                title: r.title.clone(),
                impact: ImpactType::Direct,
                description: format!("depends directly on {}", requirement.title),
            });
        }
        for r in &indirect {
            affected.push(AffectedRequirement {
                id: r.id.clone(),
                title: r.title.clone(),
                impact: ImpactType::Indirect,
                description: format!("depends indirectly on {}", requirement.title),
            });
        }

        debug!(
            requirement = id,
            direct = direct.len(),
            indirect = indirect.len(),
            "impact analysed"
        );

        let estimated_effort = estimate_effort(requirement.priority, affected.len());
        let risks = identify_risks(requirement, affected.len());
        let recommendations = recommend(requirement, affected.len(), proposed);

        Ok(ImpactReport {
            requirement_id: requirement.id.clone(),
            affected,
            estimated_effort,
            risks,
            recommendations,
        })
    }

    /// Nodes and edges reachable from `id` through `depends_on` in either direction.
    ///
    /// One node per visited requirement; one edge per relation traversed, so an edge seen from
    /// both of its ends is listed twice.
    pub fn dependency_graph(&self, id: &str) -> Result<DependencyGraph, ImpactError> {
        if self.graph.get_requirement(id).is_none() {
            return Err(ImpactError::NotFound(id.to_string()));
        }

        let mut out = DependencyGraph::default();
        let mut visited: HashSet<ReqId> = HashSet::new();
        let mut stack: Vec<ReqId> = vec![id.to_string()];

        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            // Dangling dependency targets get an edge but no node.
            let Some(req) = self.graph.get_requirement(&current) else {
                continue;
            };
            out.nodes.push(GraphNode {
                id: req.id.clone(),
                title: req.title.clone(),
                status: req.status,
            });

            let mut next = Vec::new();
            for dep in &req.depends_on {
                out.edges.push(GraphEdge {
                    from: req.id.clone(),
                    to: dep.clone(),
                });
                next.push(dep.clone());
            }
            for dependent in self.sorted_dependents(&current) {
                out.edges.push(GraphEdge {
                    from: dependent.id.clone(),
                    to: req.id.clone(),
                });
                next.push(dependent.id.clone());
            }
            // Reverse so the first neighbour is expanded first.
            stack.extend(next.into_iter().rev().filter(|n| !visited.contains(n)));
        }

        Ok(out)
    }

    fn sorted_dependents(&self, id: &str) -> Vec<&'g Requirement> {
        let mut deps = self.graph.dependents(id);
        deps.sort_by(|a, b| a.id.cmp(&b.id));
        deps.dedup_by(|a, b| a.id == b.id);
        deps
    }

    /// Transitive dependents beyond the direct ones, breadth first.
    fn indirect_dependents(&self, id: &str, direct: &[&'g Requirement]) -> Vec<&'g Requirement> {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(id);
        let mut queue: VecDeque<&'g Requirement> = VecDeque::new();
        for r in direct {
            if visited.insert(r.id.as_str()) {
                queue.push_back(*r);
            }
        }

        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            for dependent in self.sorted_dependents(&current.id) {
                if visited.insert(dependent.id.as_str()) {
                    out.push(dependent);
                    queue.push_back(dependent);
                }
            }
        }
        out
    }
}

fn identify_risks(requirement: &Requirement, affected: usize) -> Vec<Risk> {
    let mut risks = Vec::new();
    if requirement.priority.is_high() {
        risks.push(Risk::HighPriority {
            priority: requirement.priority,
        });
    }
    if affected > 5 {
        risks.push(Risk::WideImpact { affected });
    }
    if requirement.status.is_sunk_cost() {
        risks.push(Risk::SunkCost {
            status: requirement.status,
        });
    }
    if requirement.depends_on.len() >= 3 {
        risks.push(Risk::PotentialCycle {
            dependencies: requirement.depends_on.len(),
        });
    }
    risks
}

fn recommend(
    requirement: &Requirement,
    affected: usize,
    proposed: Option<&ProposedChanges>,
) -> Vec<Recommendation> {
    let mut out = Vec::new();
    if affected > 0 {
        out.push(Recommendation::ReviewAffected);
    }
    if requirement.status == RequirementStatus::Completed {
        out.push(Recommendation::RollbackPlan);
    }
    if let Some(proposed) = proposed {
        if let Some(to) = proposed.priority {
            if to != requirement.priority {
                out.push(Recommendation::NotifyPriorityChange {
                    from: requirement.priority,
                    to,
                });
            }
        }
        if let Some(deps) = &proposed.dependencies {
            if *deps != requirement.depends_on {
                out.push(Recommendation::ReplanDependencies);
            }
        }
    }
    if affected > 3 {
        out.push(Recommendation::StagedRollout);
    }
    out
}
