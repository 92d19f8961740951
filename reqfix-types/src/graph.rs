use crate::ReqId;
use crate::requirement::{EdgeKind, Requirement};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Read-only access to a requirement graph.
///
/// The impact analyzer and the planner only ever need this much; an external persistence layer
/// can implement it without handing over an owned snapshot.
pub trait GraphView {
    fn get_requirement(&self, id: &str) -> Option<&Requirement>;

    fn all_requirements(&self) -> Vec<&Requirement>;

    /// Every requirement whose `depends_on` contains `id`.
    fn dependents(&self, id: &str) -> Vec<&Requirement> {
        self.all_requirements()
            .into_iter()
            .filter(|r| r.depends_on.contains(id))
            .collect()
    }
}

/// Immutable-by-convention snapshot of the requirement graph.
///
/// Backed by a persistent ordered map: `clone()` is O(1) and edits on the clone share structure
/// with the original, so every fix iteration can keep its own snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<Requirement>", into = "Vec<Requirement>")]
pub struct RequirementGraph {
    nodes: OrdMap<ReqId, Requirement>,
}

impl RequirementGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Requirement> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Requirement> {
        self.nodes.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Insert or replace by id. Returns the previous value, if any.
    pub fn insert(&mut self, req: Requirement) -> Option<Requirement> {
        self.nodes.insert(req.id.clone(), req)
    }

    /// Insert a new requirement; `false` when the id is already taken.
    pub fn add_requirement(&mut self, req: Requirement) -> bool {
        if self.nodes.contains_key(req.id.as_str()) {
            return false;
        }
        self.nodes.insert(req.id.clone(), req);
        true
    }

    /// Replace an existing requirement; `false` when the id is unknown.
    pub fn update_requirement(&mut self, req: Requirement) -> bool {
        if !self.nodes.contains_key(req.id.as_str()) {
            return false;
        }
        self.nodes.insert(req.id.clone(), req);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<Requirement> {
        self.nodes.remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ReqId> {
        self.nodes.keys()
    }

    /// Requirements that refine `id`.
    pub fn children(&self, id: &str) -> Vec<&Requirement> {
        self.iter().filter(|r| r.refines.contains(id)).collect()
    }

    /// Requirements that share at least one `refines` parent with `id`, excluding itself.
    pub fn siblings(&self, id: &str) -> Vec<&Requirement> {
        let Some(req) = self.get(id) else {
            return Vec::new();
        };
        self.iter()
            .filter(|r| r.id != req.id && !r.refines.is_disjoint(&req.refines))
            .collect()
    }

    /// Edges whose target does not exist, as `(from, kind, to)` in id order.
    pub fn dangling_references(&self) -> Vec<(ReqId, EdgeKind, ReqId)> {
        let mut out = Vec::new();
        for req in self.iter() {
            for (kind, to) in req.outgoing() {
                if !self.contains(to) {
                    out.push((req.id.clone(), kind, to.clone()));
                }
            }
        }
        out
    }
}

impl GraphView for RequirementGraph {
    fn get_requirement(&self, id: &str) -> Option<&Requirement> {
        self.get(id)
    }

    fn all_requirements(&self) -> Vec<&Requirement> {
        self.iter().collect()
    }
}

impl From<Vec<Requirement>> for RequirementGraph {
    fn from(reqs: Vec<Requirement>) -> Self {
        reqs.into_iter().collect()
    }
}

impl From<RequirementGraph> for Vec<Requirement> {
    fn from(graph: RequirementGraph) -> Self {
        graph.nodes.into_iter().map(|(_, r)| r).collect()
    }
}

impl FromIterator<Requirement> for RequirementGraph {
    fn from_iter<I: IntoIterator<Item = Requirement>>(iter: I) -> Self {
        let mut graph = RequirementGraph::new();
        for req in iter {
            graph.insert(req);
        }
        graph
    }
}

/// On-disk envelope for a graph file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default = "default_graph_schema")]
    pub schema: String,

    #[serde(default)]
    pub requirements: RequirementGraph,
}

fn default_graph_schema() -> String {
    crate::schema::REQFIX_GRAPH_V1.to_string()
}

impl GraphDocument {
    pub fn new(requirements: RequirementGraph) -> Self {
        Self {
            schema: default_graph_schema(),
            requirements,
        }
    }
}
