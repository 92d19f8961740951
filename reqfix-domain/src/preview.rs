use reqfix_types::changeset::{ChangeOp, PreviewEntry, PreviewKind};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::requirement::RequirementStatus;
use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Structured before/after lines for one operation against the graph it is about to touch.
pub fn preview_entries(op: &ChangeOp, graph: &RequirementGraph) -> Vec<PreviewEntry> {
    match op {
        ChangeOp::Split {
            target,
            parts,
            prior_status,
            ..
        } => {
            let mut out = vec![entry(
                PreviewKind::Modify,
                target,
                Some("status"),
                Some(json!(prior_status)),
                Some(json!(RequirementStatus::Superseded)),
                format!("split into {} parts", parts.len()),
            )];
            for part in parts {
                out.push(entry(
                    PreviewKind::Add,
                    &part.id,
                    None,
                    None,
                    Some(json!(part.description)),
                    format!("derived from {target}"),
                ));
            }
            out
        }
        ChangeOp::Merge {
            canonical,
            absorbed,
            merged_description,
            prior_description,
            ..
        } => {
            let mut out = vec![entry(
                PreviewKind::Modify,
                canonical,
                Some("description"),
                Some(json!(prior_description)),
                Some(json!(merged_description)),
                "canonical".to_string(),
            )];
            for a in absorbed {
                out.push(entry(
                    PreviewKind::Modify,
                    &a.id,
                    Some("status"),
                    Some(json!(a.prior_status)),
                    Some(json!(RequirementStatus::Superseded)),
                    format!("absorbed into {canonical}"),
                ));
            }
            out
        }
        ChangeOp::Rewrite {
            target,
            field,
            old,
            new,
        } => vec![entry(
            PreviewKind::Modify,
            target,
            Some(field.as_str()),
            Some(json!(old)),
            Some(json!(new)),
            String::new(),
        )],
        ChangeOp::Rewire {
            from,
            edge,
            add,
            remove,
        } => {
            let before: BTreeSet<String> = graph
                .get(from)
                .map(|r| r.edges(*edge).clone())
                .unwrap_or_default();
            let mut after = before.clone();
            for id in remove {
                after.remove(id);
            }
            after.extend(add.iter().cloned());
            vec![entry(
                PreviewKind::Rewire,
                from,
                Some(edge.as_str()),
                Some(json!(before)),
                Some(json!(after)),
                String::new(),
            )]
        }
        ChangeOp::Introduce {
            requirement,
            reparent,
            prior_refines,
        } => {
            let mut out = vec![entry(
                PreviewKind::Add,
                &requirement.id,
                None,
                None,
                Some(json!(requirement.title)),
                format!("stage {}", requirement.stage),
            )];
            if let Some(child) = reparent {
                out.push(entry(
                    PreviewKind::Rewire,
                    child,
                    Some("refines"),
                    Some(json!(prior_refines)),
                    Some(json!([requirement.id])),
                    String::new(),
                ));
            }
            out
        }
        ChangeOp::Alias {
            target,
            alias_for,
            prior_status,
            ..
        } => vec![entry(
            PreviewKind::Modify,
            target,
            Some("status"),
            Some(json!(prior_status)),
            Some(json!(RequirementStatus::Superseded)),
            format!("alias of {alias_for}"),
        )],
        ChangeOp::BreakCycle {
            from,
            to,
            removed_from,
            ..
        } => removed_from
            .iter()
            .map(|kind| {
                entry(
                    PreviewKind::Remove,
                    from,
                    Some(kind.as_str()),
                    Some(json!(to)),
                    None,
                    format!("cut {from} -> {to}"),
                )
            })
            .collect(),
    }
}

fn entry(
    kind: PreviewKind,
    req_id: &str,
    field: Option<&str>,
    before: Option<Value>,
    after: Option<Value>,
    description: String,
) -> PreviewEntry {
    PreviewEntry {
        kind,
        req_id: req_id.to_string(),
        field: field.map(str::to_string),
        before,
        after,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reqfix_types::requirement::{EdgeKind, Requirement};

    #[test]
    fn rewire_preview_shows_edge_sets() {
        let graph = RequirementGraph::from(vec![
            Requirement::new("F-1", "Login", "system_functional").refining("GONE"),
            Requirement::new("SYS-1", "Auth", "system"),
        ]);
        let op = ChangeOp::Rewire {
            from: "F-1".into(),
            edge: EdgeKind::Refines,
            add: BTreeSet::from(["SYS-1".to_string()]),
            remove: BTreeSet::from(["GONE".to_string()]),
        };
        let entries = preview_entries(&op, &graph);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field.as_deref(), Some("refines"));
        assert_eq!(entries[0].before, Some(json!(["GONE"])));
        assert_eq!(entries[0].after, Some(json!(["SYS-1"])));
    }
}
