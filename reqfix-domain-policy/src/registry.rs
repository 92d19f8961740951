use reqfix_types::policy::{ActionKind, ActionMode, FixAction, FixPolicy, FixRule, RuleSeverity};
use reqfix_types::violation::{Violation, ViolationCode};
use std::collections::BTreeMap;

/// Outcome of resolving a violation code against the policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RuleLookup<'a> {
    Registered(&'a FixRule),
    /// No rule governs the code, or the code itself is outside the known set.
    Unregistered,
}

impl<'a> RuleLookup<'a> {
    pub fn rule(self) -> Option<&'a FixRule> {
        match self {
            RuleLookup::Registered(rule) => Some(rule),
            RuleLookup::Unregistered => None,
        }
    }
}

/// Typed index from violation code to the governing rule.
///
/// When several rules name the same code, the highest `priority` wins and ties go to the rule
/// listed first.
#[derive(Debug, Clone)]
pub struct PolicyRegistry<'a> {
    policy: &'a FixPolicy,
    by_code: BTreeMap<ViolationCode, &'a FixRule>,
    ordered: Vec<&'a FixRule>,
}

impl<'a> PolicyRegistry<'a> {
    pub fn new(policy: &'a FixPolicy) -> Self {
        let mut ordered: Vec<&FixRule> = policy.rules.iter().collect();
        // Stable: equal priorities keep document order.
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

        let mut by_code = BTreeMap::new();
        for rule in &ordered {
            if rule.when_violation.is_registered() {
                by_code.entry(rule.when_violation.clone()).or_insert(*rule);
            }
        }
        Self {
            policy,
            by_code,
            ordered,
        }
    }

    pub fn policy(&self) -> &'a FixPolicy {
        self.policy
    }

    pub fn lookup(&self, code: &ViolationCode) -> RuleLookup<'a> {
        if !code.is_registered() {
            return RuleLookup::Unregistered;
        }
        match self.by_code.get(code) {
            Some(rule) => RuleLookup::Registered(*rule),
            None => RuleLookup::Unregistered,
        }
    }

    /// Rules by descending priority.
    pub fn rules_by_priority(&self) -> &[&'a FixRule] {
        &self.ordered
    }

    /// The rule that owns a violation, if it is the winning rule for the code.
    pub fn governs(&self, rule: &FixRule, violation: &Violation) -> bool {
        match self.lookup(&violation.code) {
            RuleLookup::Registered(winner) => winner.id == rule.id,
            RuleLookup::Unregistered => false,
        }
    }

    /// Whether the violation drives the repair loop.
    pub fn is_strict(&self, violation: &Violation) -> bool {
        self.lookup(&violation.code)
            .rule()
            .map(|r| r.severity == RuleSeverity::Strict)
            .unwrap_or(false)
    }

    /// The action of `kind` on the rule governing `code`, if any.
    pub fn action_for(&self, code: &ViolationCode, kind: ActionKind) -> Option<&'a FixAction> {
        self.lookup(code).rule().and_then(|r| r.action(kind))
    }

    pub fn is_auto(&self, code: &ViolationCode, kind: ActionKind) -> bool {
        self.action_for(code, kind)
            .map(|a| a.mode == ActionMode::Auto)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PolicyFormat, parse_policy_str};
    use pretty_assertions::assert_eq;

    const POLICY: &str = r#"
mode = "strict"

[[rules]]
id = "low"
when_violation = "atomicity.low"
severity = "suggest"
actions = [{ use = "split", mode = "assist" }]

[[rules]]
id = "high"
when_violation = "atomicity.low"
severity = "strict"
priority = 5
actions = [{ use = "split", mode = "auto" }]

[[rules]]
id = "cycle"
when_violation = "graph.cycle"
severity = "strict"
actions = [{ use = "break_cycle", mode = "assist" }]
"#;

    #[test]
    fn highest_priority_rule_governs() {
        let policy = parse_policy_str(POLICY, PolicyFormat::Toml).expect("policy");
        let registry = PolicyRegistry::new(&policy);

        let rule = registry
            .lookup(&ViolationCode::AtomicityLow)
            .rule()
            .expect("registered");
        assert_eq!(rule.id, "high");
        assert!(registry.is_auto(&ViolationCode::AtomicityLow, ActionKind::Split));
        assert!(!registry.is_auto(&ViolationCode::Cycle, ActionKind::BreakCycle));
        assert!(!registry.is_auto(&ViolationCode::Cycle, ActionKind::Rewire));

        let order: Vec<_> = registry
            .rules_by_priority()
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(order, vec!["high", "low", "cycle"]);
    }

    #[test]
    fn missing_and_unknown_codes_are_unregistered() {
        let policy = parse_policy_str(POLICY, PolicyFormat::Toml).expect("policy");
        let registry = PolicyRegistry::new(&policy);

        assert_eq!(
            registry.lookup(&ViolationCode::MissingParent),
            RuleLookup::Unregistered
        );
        assert_eq!(
            registry.lookup(&ViolationCode::Unregistered("style.passive".into())),
            RuleLookup::Unregistered
        );
    }

    #[test]
    fn strictness_follows_governing_rule() {
        let policy = parse_policy_str(POLICY, PolicyFormat::Toml).expect("policy");
        let registry = PolicyRegistry::new(&policy);

        let atomic = Violation::new("F-1", ViolationCode::AtomicityLow, "x");
        let subject = Violation::new("F-1", ViolationCode::MissingSubject, "x");
        assert!(registry.is_strict(&atomic));
        assert!(!registry.is_strict(&subject));
    }
}
