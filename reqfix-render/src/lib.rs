//! Rendering helpers (markdown) for human-readable artifacts.

use reqfix_impact::{DependencyGraph, ImpactReport, ImpactType};
use reqfix_ontology::OntologyValidationResult;
use reqfix_types::changeset::{Change, ChangeOp, ChangeSet, PreviewEntry, PreviewKind};
use reqfix_types::graph::RequirementGraph;
use reqfix_types::outcome::{FixOutcome, RollbackAllResult};
use reqfix_types::plan::FixPlan;
use reqfix_types::violation::Violation;
use std::collections::BTreeSet;

/// Diff-style preview of one change set against the graph it would apply to.
pub fn render_change_set_md(cs: &ChangeSet, graph: &RequirementGraph) -> String {
    let mut out = String::new();
    out.push_str(&format!("## Change set {}\n\n", cs.id));
    out.push_str(&format!("- Status: `{}`\n", cs.status));
    if let Some(rule) = &cs.metadata.rule_id {
        out.push_str(&format!("- Rule: `{}`\n", rule));
    }
    let violations: Vec<String> = cs
        .violations
        .iter()
        .map(|v| format!("`{}` on `{}`", v.code, v.req_id))
        .collect();
    out.push_str(&format!("- Violations: {}\n", join_or_dash(&violations)));
    out.push_str(&format!("- Impacted requirements: {}\n", cs.impacted.len()));
    out.push_str(&format!(
        "- Reversible: {}\n\n",
        if cs.reversible { "yes" } else { "no" }
    ));

    if cs.changes.is_empty() {
        out.push_str("_No changes._\n");
        return out;
    }

    for (i, change) in cs.changes.iter().enumerate() {
        render_change(&mut out, i + 1, change, graph);
    }
    out
}

fn render_change(out: &mut String, n: usize, change: &Change, graph: &RequirementGraph) {
    let target = change.operation.primary_target();
    let known = if graph.contains(target) || change.operation.created_ids().iter().any(|id| id == target) {
        ""
    } else {
        " (missing)"
    };
    out.push_str(&format!(
        "### {}. {} `{}`{}\n\n",
        n,
        op_label(&change.operation),
        target,
        known
    ));
    out.push_str(&format!("{}\n\n", change.rationale));

    if !change.preview.is_empty() {
        for entry in &change.preview {
            out.push_str(&preview_line(entry));
        }
        out.push('\n');
    }

    if let ChangeOp::Rewrite { old, new, field, .. } = &change.operation {
        out.push_str(&format!("```diff\n{}```\n\n", text_diff(field.as_str(), old, new)));
    }
}

fn preview_line(entry: &PreviewEntry) -> String {
    let field = entry
        .field
        .as_deref()
        .map(|f| format!(".{}", f))
        .unwrap_or_default();
    let mut line = format!(
        "- {} `{}{}`",
        preview_label(entry.kind),
        entry.req_id,
        field
    );
    match (&entry.before, &entry.after) {
        (Some(before), Some(after)) => {
            line.push_str(&format!(": {} → {}", compact(before), compact(after)))
        }
        (None, Some(after)) => line.push_str(&format!(": {}", compact(after))),
        (Some(before), None) => line.push_str(&format!(": {} → (removed)", compact(before))),
        (None, None) => {}
    }
    if !entry.description.is_empty() {
        line.push_str(&format!(" ({})", entry.description));
    }
    line.push('\n');
    line
}

fn compact(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    }
}

/// Unified diff of a single text field.
pub fn text_diff(label: &str, old: &str, new: &str) -> String {
    let old = with_trailing_newline(old);
    let new = with_trailing_newline(new);
    let patch = diffy::create_patch(&old, &new);
    let body = patch.to_string();
    // diffy emits `--- original` / `+++ modified`; name the field instead.
    body.replacen("--- original", &format!("--- a/{}", label), 1)
        .replacen("+++ modified", &format!("+++ b/{}", label), 1)
}

fn with_trailing_newline(s: &str) -> String {
    if s.ends_with('\n') {
        s.to_string()
    } else {
        format!("{}\n", s)
    }
}

pub fn render_plan_md(plan: &FixPlan) -> String {
    let mut out = String::new();
    out.push_str("# reqfix plan\n\n");
    out.push_str(&format!("- Change sets: {}\n", plan.change_sets.len()));
    out.push_str(&format!("- Changes: {}\n", plan.total_changes));
    let impact = &plan.estimated_impact;
    out.push_str(&format!(
        "- Requirements affected: {} (new {}, modified {}, superseded {})\n\n",
        impact.requirements_affected,
        impact.new_requirements,
        impact.modified_requirements,
        impact.superseded_requirements
    ));

    if plan.change_sets.is_empty() {
        out.push_str("_No change sets planned._\n");
        return out;
    }

    out.push_str(&plan.preview);
    out
}

pub fn render_outcome_md(outcome: &FixOutcome) -> String {
    let mut out = String::new();
    out.push_str("# reqfix fix\n\n");
    out.push_str(&format!("- Success: `{}`\n", outcome.success));
    out.push_str(&format!("- Stopped: `{}`\n", outcome.stopped_reason));
    out.push_str(&format!("- Iterations: {}\n", outcome.iterations));
    out.push_str(&format!(
        "- Applied change sets: {}\n",
        outcome.applied_change_sets.len()
    ));
    out.push_str(&format!(
        "- Fixed violations: {}\n",
        outcome.fixed_violations.len()
    ));
    out.push_str(&format!(
        "- Remaining violations: {}\n",
        outcome.new_violations.len()
    ));
    if let Some(err) = &outcome.error {
        out.push_str(&format!("- Error: {}\n", err));
    }
    out.push('\n');

    if !outcome.applied_change_sets.is_empty() {
        out.push_str("## Applied\n\n");
        for cs in &outcome.applied_change_sets {
            out.push_str(&change_set_summary_line(cs));
        }
        out.push('\n');
    }

    if !outcome.pending_change_sets.is_empty() {
        out.push_str("## Awaiting approval\n\n");
        for cs in &outcome.pending_change_sets {
            out.push_str(&change_set_summary_line(cs));
        }
        out.push('\n');
    }

    if !outcome.apply_failures.is_empty() {
        out.push_str("## Apply failures\n\n");
        for failure in &outcome.apply_failures {
            out.push_str(&format!(
                "- `{}`: {}\n",
                failure.change_set_id,
                failure.errors.join("; ")
            ));
        }
        out.push('\n');
    }

    if !outcome.auto_apply_discrepancies.is_empty() {
        out.push_str("## Auto-apply discrepancies\n\n");
        out.push_str(
            "Per-change rule resolution and the first-violation reading disagree for:\n\n",
        );
        for id in &outcome.auto_apply_discrepancies {
            out.push_str(&format!("- `{}`\n", id));
        }
        out.push('\n');
    }

    if !outcome.new_violations.is_empty() {
        out.push_str("## Remaining violations\n\n");
        out.push_str(&violation_lines(&outcome.new_violations));
    }

    out
}

fn change_set_summary_line(cs: &ChangeSet) -> String {
    let ops: Vec<String> = cs
        .changes
        .iter()
        .map(|c| format!("{} `{}`", c.kind(), c.operation.primary_target()))
        .collect();
    format!(
        "- `{}` [{}] {}\n",
        cs.id,
        cs.metadata.rule_id.as_deref().unwrap_or("-"),
        join_or_dash(&ops)
    )
}

pub fn render_rollback_md(result: &RollbackAllResult) -> String {
    let mut out = String::new();
    out.push_str("# reqfix rollback\n\n");
    out.push_str(&format!("- Success: `{}`\n", result.success));
    out.push_str(&format!("- Rolled back: {}\n", result.rolled_back.len()));
    for id in &result.rolled_back {
        out.push_str(&format!("  - `{}`\n", id));
    }
    if !result.errors.is_empty() {
        out.push_str("\n## Errors\n\n");
        for e in &result.errors {
            out.push_str(&format!("- {}\n", e));
        }
    }
    out
}

pub fn render_violations_md(violations: &[Violation]) -> String {
    let mut out = String::new();
    out.push_str("# reqfix check\n\n");
    if violations.is_empty() {
        out.push_str("_No violations._\n");
        return out;
    }
    out.push_str(&format!("- Violations: {}\n\n", violations.len()));
    out.push_str(&violation_lines(violations));
    out
}

fn violation_lines(violations: &[Violation]) -> String {
    let mut out = String::new();
    for v in violations {
        out.push_str(&format!(
            "- **{}** `{}` on `{}`: {}\n",
            v.severity, v.code, v.req_id, v.message
        ));
        if let Some(s) = &v.suggestion {
            out.push_str(&format!("  - Suggestion: {}\n", s));
        }
    }
    out
}

pub fn render_impact_md(report: &ImpactReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Impact of {}\n\n", report.requirement_id));
    out.push_str(&format!(
        "- Estimated effort: {} ({}h)\n",
        report.estimated_effort, report.estimated_effort.hours
    ));
    out.push_str(&format!(
        "- Affected requirements: {}\n\n",
        report.affected.len()
    ));

    if !report.affected.is_empty() {
        out.push_str("## Affected\n\n");
        for a in &report.affected {
            let kind = match a.impact {
                ImpactType::Direct => "direct",
                ImpactType::Indirect => "indirect",
            };
            out.push_str(&format!("- `{}` {} ({})\n", a.id, a.title, kind));
        }
        out.push('\n');
    }

    if !report.risks.is_empty() {
        out.push_str("## Risks\n\n");
        for r in &report.risks {
            out.push_str(&format!("- {}\n", r));
        }
        out.push('\n');
    }

    if !report.recommendations.is_empty() {
        out.push_str("## Recommendations\n\n");
        for r in &report.recommendations {
            out.push_str(&format!("- {}\n", r));
        }
    }
    out
}

/// Mermaid flowchart of a dependency subgraph. Repeated edges are drawn once.
pub fn render_dependency_graph_mermaid(graph: &DependencyGraph) -> String {
    let mut out = String::from("```mermaid\ngraph LR\n");
    for node in &graph.nodes {
        out.push_str(&format!(
            "  {}[\"{}: {}\"]\n",
            mermaid_id(&node.id),
            node.id,
            node.title.replace('"', "'")
        ));
    }
    let mut seen = BTreeSet::new();
    for edge in &graph.edges {
        if seen.insert((edge.from.as_str(), edge.to.as_str())) {
            out.push_str(&format!(
                "  {} --> {}\n",
                mermaid_id(&edge.from),
                mermaid_id(&edge.to)
            ));
        }
    }
    out.push_str("```\n");
    out
}

fn mermaid_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

pub fn render_ontology_validation_md(result: &OntologyValidationResult) -> String {
    let mut out = String::new();
    out.push_str("# Ontology validation\n\n");
    out.push_str(&format!("- Valid: `{}`\n", result.valid));
    out.push_str(&format!("- Errors: {}\n", result.errors.len()));
    if !result.errors.is_empty() {
        out.push('\n');
        for e in &result.errors {
            out.push_str(&format!("- `{}` {}\n", e.code, e.message));
        }
    }
    out
}

fn op_label(op: &ChangeOp) -> &'static str {
    match op {
        ChangeOp::Split { .. } => "Split",
        ChangeOp::Merge { .. } => "Merge",
        ChangeOp::Rewrite { .. } => "Rewrite",
        ChangeOp::Rewire { .. } => "Rewire",
        ChangeOp::Introduce { .. } => "Introduce intermediate for",
        ChangeOp::Alias { .. } => "Alias",
        ChangeOp::BreakCycle { .. } => "Break cycle at",
    }
}

fn preview_label(kind: PreviewKind) -> &'static str {
    match kind {
        PreviewKind::Add => "add",
        PreviewKind::Remove => "remove",
        PreviewKind::Modify => "modify",
        PreviewKind::Rewire => "rewire",
    }
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use reqfix_types::changeset::TextField;
    use reqfix_types::requirement::Requirement;
    use reqfix_types::violation::{ViolationCode, ViolationRef};

    fn change_set(op: ChangeOp) -> ChangeSet {
        let mut cs = ChangeSet::new(
            "cs-1",
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("ts"),
        );
        cs.violations.push(ViolationRef {
            id: "v1".into(),
            code: ViolationCode::MissingSubject,
            req_id: "F-1".into(),
        });
        cs.changes.push(Change {
            operation: op,
            rationale: "add a subject".into(),
            addresses: cs.violations[0].clone(),
            preview: vec![PreviewEntry {
                kind: PreviewKind::Modify,
                req_id: "F-1".into(),
                field: Some("description".into()),
                before: Some(serde_json::json!("log in")),
                after: Some(serde_json::json!("The system shall log in")),
                description: String::new(),
            }],
        });
        cs.impacted.insert("F-1".into());
        cs
    }

    #[test]
    fn rewrite_preview_contains_unified_diff() {
        let graph = RequirementGraph::from(vec![Requirement::new("F-1", "Login", "system")]);
        let cs = change_set(ChangeOp::Rewrite {
            target: "F-1".into(),
            field: TextField::Description,
            old: "log in".into(),
            new: "The system shall log in".into(),
        });
        let md = render_change_set_md(&cs, &graph);
        assert!(md.contains("## Change set cs-1"));
        assert!(md.contains("`style.missing_subject` on `F-1`"));
        assert!(md.contains("### 1. Rewrite `F-1`"));
        assert!(md.contains("--- a/description"));
        assert!(md.contains("-log in"));
        assert!(md.contains("+The system shall log in"));
        assert!(md.contains("- modify `F-1.description`: \"log in\" → \"The system shall log in\""));
    }

    #[test]
    fn missing_target_is_flagged() {
        let graph = RequirementGraph::new();
        let cs = change_set(ChangeOp::Rewrite {
            target: "F-1".into(),
            field: TextField::Title,
            old: "a".into(),
            new: "b".into(),
        });
        assert!(render_change_set_md(&cs, &graph).contains("`F-1` (missing)"));
    }

    #[test]
    fn mermaid_edges_are_deduplicated() {
        use reqfix_impact::{GraphEdge, GraphNode};
        use reqfix_types::requirement::RequirementStatus;

        let dg = DependencyGraph {
            nodes: vec![
                GraphNode {
                    id: "A-1".into(),
                    title: "a".into(),
                    status: RequirementStatus::Draft,
                },
                GraphNode {
                    id: "B-1".into(),
                    title: "b".into(),
                    status: RequirementStatus::Draft,
                },
            ],
            edges: vec![
                GraphEdge {
                    from: "B-1".into(),
                    to: "A-1".into(),
                },
                GraphEdge {
                    from: "B-1".into(),
                    to: "A-1".into(),
                },
            ],
        };
        let md = render_dependency_graph_mermaid(&dg);
        assert_eq!(md.matches("B_1 --> A_1").count(), 1);
    }
}
