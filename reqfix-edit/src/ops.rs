//! Single-operation apply and revert.
//!
//! Each function checks every precondition before its first write, so an `Err` leaves the graph
//! untouched even when called outside the engine.

use crate::error::{EditError, EditResult};
use reqfix_types::ReqId;
use reqfix_types::changeset::{AbsorbedRequirement, ChangeOp, SplitPart, TextField};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::requirement::{EdgeKind, Requirement, RequirementStatus};
use std::collections::BTreeSet;

/// Apply one operation in place.
pub fn apply_change(graph: &mut RequirementGraph, op: &ChangeOp) -> EditResult<()> {
    match op {
        ChangeOp::Split {
            target,
            parts,
            prior_status,
            prior_supersedes,
        } => split(graph, target, parts, *prior_status, prior_supersedes),
        ChangeOp::Merge {
            canonical,
            absorbed,
            merged_description,
            prior_description,
            prior_canonical_of,
        } => merge(
            graph,
            canonical,
            absorbed,
            merged_description,
            prior_description,
            prior_canonical_of,
        ),
        ChangeOp::Rewrite {
            target,
            field,
            old,
            new,
        } => rewrite(graph, target, *field, old, new),
        ChangeOp::Rewire {
            from,
            edge,
            add,
            remove,
        } => rewire(graph, from, *edge, add, remove, true),
        ChangeOp::Introduce {
            requirement,
            reparent,
            prior_refines,
        } => introduce(graph, requirement, reparent.as_deref(), prior_refines),
        ChangeOp::Alias {
            target,
            alias_for,
            prior_status,
            prior_supersedes,
        } => alias(graph, target, alias_for, *prior_status, prior_supersedes),
        ChangeOp::BreakCycle {
            from,
            to,
            removed_from,
            ..
        } => break_cycle(graph, from, to, removed_from),
    }
}

/// Undo one previously applied operation in place.
pub fn revert_change(graph: &mut RequirementGraph, op: &ChangeOp) -> EditResult<()> {
    match op {
        ChangeOp::Split {
            target,
            parts,
            prior_status,
            prior_supersedes,
        } => unsplit(graph, target, parts, *prior_status, prior_supersedes),
        ChangeOp::Merge {
            canonical,
            absorbed,
            merged_description,
            prior_description,
            prior_canonical_of,
        } => unmerge(
            graph,
            canonical,
            absorbed,
            merged_description,
            prior_description,
            prior_canonical_of,
        ),
        ChangeOp::Rewrite {
            target,
            field,
            old,
            new,
        } => rewrite(graph, target, *field, new, old),
        // Ids removed by the forward pass may have vanished since; restoring them is still exact.
        ChangeOp::Rewire {
            from,
            edge,
            add,
            remove,
        } => rewire(graph, from, *edge, remove, add, false),
        ChangeOp::Introduce {
            requirement,
            reparent,
            prior_refines,
        } => unintroduce(graph, &requirement.id, reparent.as_deref(), prior_refines),
        ChangeOp::Alias {
            target,
            alias_for,
            prior_status,
            prior_supersedes,
        } => unalias(graph, target, alias_for, *prior_status, prior_supersedes),
        ChangeOp::BreakCycle {
            from,
            to,
            removed_from,
            ..
        } => restore_edge(graph, from, to, removed_from),
    }
}

fn require<'a>(graph: &'a RequirementGraph, id: &str) -> EditResult<&'a Requirement> {
    graph.get(id).ok_or_else(|| EditError::not_found(id))
}

fn require_mut<'a>(graph: &'a mut RequirementGraph, id: &str) -> EditResult<&'a mut Requirement> {
    graph.get_mut(id).ok_or_else(|| EditError::not_found(id))
}

fn check_lifecycle(
    req: &Requirement,
    status: RequirementStatus,
    supersedes: &BTreeSet<ReqId>,
) -> EditResult<()> {
    if req.status != status {
        return Err(EditError::precondition(
            &req.id,
            format!("status is {}, expected {}", req.status, status),
        ));
    }
    if req.supersedes != *supersedes {
        return Err(EditError::precondition(&req.id, "supersedes changed"));
    }
    Ok(())
}

/// Surviving ends of an alias or merge must still be live when the set applies.
fn require_live<'a>(graph: &'a RequirementGraph, id: &str) -> EditResult<&'a Requirement> {
    let req = require(graph, id)?;
    if req.status == RequirementStatus::Superseded {
        return Err(EditError::precondition(id, "already superseded"));
    }
    Ok(req)
}

fn split(
    graph: &mut RequirementGraph,
    target: &str,
    parts: &[SplitPart],
    prior_status: RequirementStatus,
    prior_supersedes: &BTreeSet<ReqId>,
) -> EditResult<()> {
    if parts.is_empty() {
        return Err(EditError::Malformed {
            message: format!("split of {target} has no parts"),
        });
    }
    let template = require(graph, target)?.clone();
    check_lifecycle(&template, prior_status, prior_supersedes)?;

    let mut part_ids = BTreeSet::new();
    for part in parts {
        if part.id == target || !part_ids.insert(part.id.clone()) {
            return Err(EditError::Malformed {
                message: format!("split of {target} repeats id {}", part.id),
            });
        }
        if graph.contains(&part.id) {
            return Err(EditError::AlreadyExists {
                id: part.id.clone(),
            });
        }
    }

    for part in parts {
        let mut req = template.clone();
        req.id = part.id.clone();
        req.title = part.title.clone();
        req.description = part.description.clone();
        req.status = RequirementStatus::Draft;
        req.derived_from = BTreeSet::from([target.to_string()]);
        req.supersedes.clear();
        req.canonical_of.clear();
        req.metrics = None;
        graph.insert(req);
    }

    let t = require_mut(graph, target)?;
    t.status = RequirementStatus::Superseded;
    t.supersedes = part_ids;
    Ok(())
}

fn unsplit(
    graph: &mut RequirementGraph,
    target: &str,
    parts: &[SplitPart],
    prior_status: RequirementStatus,
    prior_supersedes: &BTreeSet<ReqId>,
) -> EditResult<()> {
    let part_ids: BTreeSet<ReqId> = parts.iter().map(|p| p.id.clone()).collect();
    let current = require(graph, target)?;
    check_lifecycle(current, RequirementStatus::Superseded, &part_ids)?;
    for id in &part_ids {
        require(graph, id)?;
    }

    for id in &part_ids {
        graph.remove(id);
    }
    let t = require_mut(graph, target)?;
    t.status = prior_status;
    t.supersedes = prior_supersedes.clone();
    Ok(())
}

fn merge(
    graph: &mut RequirementGraph,
    canonical: &str,
    absorbed: &[AbsorbedRequirement],
    merged_description: &str,
    prior_description: &str,
    prior_canonical_of: &BTreeSet<ReqId>,
) -> EditResult<()> {
    if absorbed.is_empty() {
        return Err(EditError::Malformed {
            message: format!("merge into {canonical} absorbs nothing"),
        });
    }
    let current = require_live(graph, canonical)?;
    if current.description != prior_description {
        return Err(EditError::precondition(canonical, "description changed"));
    }
    if current.canonical_of != *prior_canonical_of {
        return Err(EditError::precondition(canonical, "canonical_of changed"));
    }
    let mut seen = BTreeSet::new();
    for a in absorbed {
        if a.id == canonical || !seen.insert(a.id.as_str()) {
            return Err(EditError::Malformed {
                message: format!("merge into {canonical} repeats id {}", a.id),
            });
        }
        check_lifecycle(require(graph, &a.id)?, a.prior_status, &a.prior_supersedes)?;
    }

    let c = require_mut(graph, canonical)?;
    c.description = merged_description.to_string();
    c.canonical_of.extend(absorbed.iter().map(|a| a.id.clone()));
    for a in absorbed {
        let r = require_mut(graph, &a.id)?;
        r.status = RequirementStatus::Superseded;
        r.supersedes = BTreeSet::from([canonical.to_string()]);
    }
    Ok(())
}

fn unmerge(
    graph: &mut RequirementGraph,
    canonical: &str,
    absorbed: &[AbsorbedRequirement],
    merged_description: &str,
    prior_description: &str,
    prior_canonical_of: &BTreeSet<ReqId>,
) -> EditResult<()> {
    let current = require(graph, canonical)?;
    if current.description != merged_description {
        return Err(EditError::precondition(canonical, "merged description changed"));
    }
    let pointer = BTreeSet::from([canonical.to_string()]);
    for a in absorbed {
        check_lifecycle(require(graph, &a.id)?, RequirementStatus::Superseded, &pointer)?;
    }

    let c = require_mut(graph, canonical)?;
    c.description = prior_description.to_string();
    c.canonical_of = prior_canonical_of.clone();
    for a in absorbed {
        let r = require_mut(graph, &a.id)?;
        r.status = a.prior_status;
        r.supersedes = a.prior_supersedes.clone();
    }
    Ok(())
}

fn rewrite(
    graph: &mut RequirementGraph,
    target: &str,
    field: TextField,
    expected: &str,
    replacement: &str,
) -> EditResult<()> {
    let req = require_mut(graph, target)?;
    let slot = match field {
        TextField::Title => &mut req.title,
        TextField::Description => &mut req.description,
    };
    if slot.as_str() != expected {
        return Err(EditError::precondition(
            target,
            format!("{} changed since planning", field.as_str()),
        ));
    }
    *slot = replacement.to_string();
    Ok(())
}

fn rewire(
    graph: &mut RequirementGraph,
    from: &str,
    edge: EdgeKind,
    add: &BTreeSet<ReqId>,
    remove: &BTreeSet<ReqId>,
    added_must_exist: bool,
) -> EditResult<()> {
    if !add.is_disjoint(remove) {
        return Err(EditError::Malformed {
            message: format!("rewire of {from} adds and removes the same id"),
        });
    }
    let current = require(graph, from)?.edges(edge);
    for id in add {
        if current.contains(id) {
            return Err(EditError::precondition(
                from,
                format!("{edge} already contains {id}"),
            ));
        }
        if added_must_exist && !graph.contains(id) {
            return Err(EditError::not_found(id));
        }
    }
    for id in remove {
        if !current.contains(id) {
            return Err(EditError::precondition(
                from,
                format!("{edge} does not contain {id}"),
            ));
        }
    }

    let edges = require_mut(graph, from)?.edges_mut(edge);
    for id in remove {
        edges.remove(id);
    }
    edges.extend(add.iter().cloned());
    Ok(())
}

fn introduce(
    graph: &mut RequirementGraph,
    requirement: &Requirement,
    reparent: Option<&str>,
    prior_refines: &BTreeSet<ReqId>,
) -> EditResult<()> {
    if graph.contains(&requirement.id) {
        return Err(EditError::AlreadyExists {
            id: requirement.id.clone(),
        });
    }
    if let Some(child) = reparent {
        if child == requirement.id {
            return Err(EditError::Malformed {
                message: format!("{child} cannot be reparented onto itself"),
            });
        }
        if require(graph, child)?.refines != *prior_refines {
            return Err(EditError::precondition(child, "refines changed"));
        }
    }

    graph.insert(requirement.clone());
    if let Some(child) = reparent {
        require_mut(graph, child)?.refines = BTreeSet::from([requirement.id.clone()]);
    }
    Ok(())
}

fn unintroduce(
    graph: &mut RequirementGraph,
    id: &str,
    reparent: Option<&str>,
    prior_refines: &BTreeSet<ReqId>,
) -> EditResult<()> {
    require(graph, id)?;
    if let Some(child) = reparent {
        if require(graph, child)?.refines != BTreeSet::from([id.to_string()]) {
            return Err(EditError::precondition(
                child,
                format!("no longer refines only {id}"),
            ));
        }
    }

    if let Some(child) = reparent {
        require_mut(graph, child)?.refines = prior_refines.clone();
    }
    graph.remove(id);
    Ok(())
}

fn alias(
    graph: &mut RequirementGraph,
    target: &str,
    alias_for: &str,
    prior_status: RequirementStatus,
    prior_supersedes: &BTreeSet<ReqId>,
) -> EditResult<()> {
    if target == alias_for {
        return Err(EditError::Malformed {
            message: format!("{target} cannot alias itself"),
        });
    }
    require_live(graph, alias_for)?;
    check_lifecycle(require(graph, target)?, prior_status, prior_supersedes)?;

    let t = require_mut(graph, target)?;
    t.status = RequirementStatus::Superseded;
    t.supersedes = BTreeSet::from([alias_for.to_string()]);
    Ok(())
}

fn unalias(
    graph: &mut RequirementGraph,
    target: &str,
    alias_for: &str,
    prior_status: RequirementStatus,
    prior_supersedes: &BTreeSet<ReqId>,
) -> EditResult<()> {
    let pointer = BTreeSet::from([alias_for.to_string()]);
    check_lifecycle(
        require(graph, target)?,
        RequirementStatus::Superseded,
        &pointer,
    )?;

    let t = require_mut(graph, target)?;
    t.status = prior_status;
    t.supersedes = prior_supersedes.clone();
    Ok(())
}

fn break_cycle(
    graph: &mut RequirementGraph,
    from: &str,
    to: &str,
    removed_from: &[EdgeKind],
) -> EditResult<()> {
    if removed_from.is_empty() {
        return Err(EditError::Malformed {
            message: format!("cut {from} -> {to} names no edge kind"),
        });
    }
    let current = require(graph, from)?;
    for kind in removed_from {
        if !current.edges(*kind).contains(to) {
            return Err(EditError::precondition(
                from,
                format!("{kind} does not contain {to}"),
            ));
        }
    }

    let req = require_mut(graph, from)?;
    for kind in removed_from {
        req.edges_mut(*kind).remove(to);
    }
    Ok(())
}

fn restore_edge(
    graph: &mut RequirementGraph,
    from: &str,
    to: &str,
    removed_from: &[EdgeKind],
) -> EditResult<()> {
    let current = require(graph, from)?;
    for kind in removed_from {
        if current.edges(*kind).contains(to) {
            return Err(EditError::precondition(
                from,
                format!("{kind} already contains {to}"),
            ));
        }
    }

    let req = require_mut(graph, from)?;
    for kind in removed_from {
        req.edges_mut(*kind).insert(to.to_string());
    }
    Ok(())
}
