use super::{ActionInput, ActionPlanner, PlannedOp};
use reqfix_types::changeset::{ChangeOp, TextField};
use reqfix_types::policy::ActionKind;
use reqfix_types::violation::ViolationCode;

const DEFAULT_SUBJECT: &str = "The system shall";

const MODALS: &[&str] = &["shall", "must", "will", "should", "may", "can"];

/// Vague wording and the concrete placeholder that replaces it.
const AMBIGUOUS: &[(&str, &str)] = &[
    ("etc.", "(list every case explicitly)"),
    ("appropriately", "according to the defined criteria"),
    ("as needed", "when the defined trigger occurs"),
    ("as appropriate", "according to the defined criteria"),
    ("user-friendly", "meeting the defined usability criteria"),
];

pub struct RewritePlanner;

impl ActionPlanner for RewritePlanner {
    fn kind(&self) -> ActionKind {
        ActionKind::Rewrite
    }

    fn plan(&self, input: &ActionInput<'_>) -> Vec<PlannedOp> {
        let Some(req) = input.live_target() else {
            return Vec::new();
        };
        let code = &input.violation.code;
        let add_subject = input
            .params
            .add_subject
            .unwrap_or(*code == ViolationCode::MissingSubject);
        let replace_ambiguous = input
            .params
            .replace_ambiguous
            .unwrap_or(*code == ViolationCode::AmbiguousTerm);

        let mut text = req.description.clone();
        if replace_ambiguous {
            for (vague, concrete) in AMBIGUOUS {
                text = text.replace(vague, concrete);
            }
        }
        if add_subject && !text.trim().is_empty() && !has_subject(&text) {
            let subject = input
                .params
                .default_subject
                .as_deref()
                .unwrap_or(DEFAULT_SUBJECT);
            text = format!("{} {}", subject.trim_end(), lowercase_first(text.trim_start()));
        }

        if text == req.description {
            return Vec::new();
        }

        vec![PlannedOp {
            rationale: format!("{}: make the statement of {} explicit", code, req.id),
            op: ChangeOp::Rewrite {
                target: req.id.clone(),
                field: TextField::Description,
                old: req.description.clone(),
                new: text,
            },
        }]
    }
}

/// A statement has a subject when some word precedes its first modal verb.
pub fn has_subject(text: &str) -> bool {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .position(|w| MODALS.contains(&w.as_str()))
        .is_some_and(|i| i > 0)
}

fn lowercase_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        // Leave acronyms ("API returns ...") alone.
        Some(first) if !chars.clone().next().is_some_and(char::is_uppercase) => {
            first.to_lowercase().chain(chars).collect()
        }
        _ => s.to_string(),
    }
}
