//! Mod policy evaluation
//!
//! [`evaluate`] classifies a client's reported mods against a [`Policy`].
//! Checks run in a fixed precedence order and the first one that fires
//! decides the outcome:
//!
//! 1. blacklisted mods present
//! 2. required mods missing
//! 3. whitelist mode: mods outside the allowed and optional sets
//! 4. allowed or required mods whose rules name an action
//!
//! Evaluation is pure: the same policy and mod set always produce the same
//! result, so it is safe to re-run after every handshake message.

use crate::policy::{ModRule, Policy, RuleMode, KICK_ACTION, NO_ACTION};
use shared::ModEntry;
use std::collections::BTreeMap;

use crate::policy::message_keys;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    RequiredMissing,
    Blacklisted,
    Whitelist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub kind: ViolationKind,
    /// Offending or missing mod ids
    pub mods: Vec<String>,
    /// Disconnect message with `{mod}` already substituted
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationResult {
    NoViolation,
    Violation(Violation),
    /// Non-fatal: mod id -> action to run
    AllowedActions(BTreeMap<String, String>),
}

impl EvaluationResult {
    pub fn is_violation(&self) -> bool {
        matches!(self, EvaluationResult::Violation(_))
    }
}

/// Substitutes the comma-joined mod list for `{mod}`.
pub fn render_message(template: &str, mods: &[String]) -> String {
    template.replace("{mod}", &mods.join(", "))
}

/// Whether a rule matches one client-reported mod.
///
/// Ids must be equal. With versioning on, a rule that names a version only
/// matches that exact client version. With hashing on, a client-reported
/// hash must equal the registered known-good hash; a mod with no registered
/// hash, or a client that reports none, is accepted because there is nothing
/// to compare against.
pub fn rule_matches(policy: &Policy, rule: &ModRule, client: &ModEntry) -> bool {
    if rule.mod_id != client.id {
        return false;
    }

    let config = &policy.config;

    if config.mod_versioning {
        if let Some(version) = &rule.version {
            if client.version.as_ref() != Some(version) {
                return false;
            }
        }
    }

    if config.hash_mods {
        if let Some(reported) = &client.hash {
            let expected = policy
                .known_hashes
                .get(&rule.hash_key(config.mod_versioning))
                .or_else(|| policy.known_hashes.get(&rule.mod_id))
                .or(rule.hash.as_deref());

            if let Some(expected) = expected {
                if !expected.eq_ignore_ascii_case(reported) {
                    return false;
                }
            }
        }
    }

    true
}

fn matches_any(policy: &Policy, rule: &ModRule, entries: &[ModEntry]) -> bool {
    entries.iter().any(|entry| rule_matches(policy, rule, entry))
}

fn push_unique(list: &mut Vec<String>, id: &str) {
    if !list.iter().any(|existing| existing == id) {
        list.push(id.to_string());
    }
}

fn violation(
    policy: &Policy,
    kind: ViolationKind,
    mods: Vec<String>,
    message_key: &str,
    action: String,
) -> EvaluationResult {
    let template = policy.messages.text(message_key);
    EvaluationResult::Violation(Violation {
        kind,
        message: render_message(&template, &mods),
        mods,
        action,
    })
}

/// Classifies the client's mod set against the policy.
pub fn evaluate<I, S>(policy: &Policy, mods: I) -> EvaluationResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let entries: Vec<ModEntry> = mods
        .into_iter()
        .filter_map(|raw| ModEntry::parse(raw.as_ref()))
        .collect();
    let config = &policy.config;

    if config.blacklisted_enabled {
        let mut matched = Vec::new();
        let mut action = None;
        for rule in policy.rules.rules(RuleMode::Blacklisted) {
            if matches_any(policy, rule, &entries) {
                push_unique(&mut matched, &rule.mod_id);
                action.get_or_insert_with(|| rule.action.clone());
            }
        }
        if let Some(action) = action {
            return violation(
                policy,
                ViolationKind::Blacklisted,
                matched,
                message_keys::BLACKLISTED,
                action,
            );
        }
    }

    if config.required_enabled {
        let mut missing = Vec::new();
        let mut action = None;
        for rule in policy.rules.rules(RuleMode::Required) {
            if !matches_any(policy, rule, &entries) {
                push_unique(&mut missing, &rule.mod_id);
                action.get_or_insert_with(|| rule.action.clone());
            }
        }
        if let Some(action) = action {
            return violation(
                policy,
                ViolationKind::RequiredMissing,
                missing,
                message_keys::MISSING_REQUIRED,
                action,
            );
        }
    }

    if config.whitelist_mode {
        let mut offending = Vec::new();
        for entry in entries.iter().filter(|e| !policy.is_ignored(&e.id)) {
            let permitted = policy
                .rules
                .rules(RuleMode::Allowed)
                .chain(policy.rules.rules(RuleMode::Optional))
                .any(|rule| rule_matches(policy, rule, entry));
            if !permitted {
                push_unique(&mut offending, &entry.id);
            }
        }
        if let Some(first) = offending.first() {
            let action = policy
                .rules
                .find(first)
                .map(|rule| rule.action.clone())
                .filter(|action| action != NO_ACTION)
                .unwrap_or_else(|| KICK_ACTION.to_string());
            return violation(
                policy,
                ViolationKind::Whitelist,
                offending,
                message_keys::KICK,
                action,
            );
        }
    }

    if config.whitelisted_enabled {
        let mut actions = BTreeMap::new();
        for entry in &entries {
            let triggered = policy
                .rules
                .rules(RuleMode::Allowed)
                .chain(policy.rules.rules(RuleMode::Required))
                .find(|rule| rule.action != NO_ACTION && rule_matches(policy, rule, entry));
            if let Some(rule) = triggered {
                actions
                    .entry(entry.id.clone())
                    .or_insert_with(|| rule.action.clone());
            }
        }
        if !actions.is_empty() {
            return EvaluationResult::AllowedActions(actions);
        }
    }

    EvaluationResult::NoViolation
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::policy::{PolicyConfig, RuleMode};

    fn rule(mode: RuleMode, key: &str) -> ModRule {
        ModRule::new(mode, key).unwrap()
    }

    fn policy_with(rules: Vec<ModRule>) -> Policy {
        rules
            .into_iter()
            .fold(Policy::new(PolicyConfig::default()), |p, r| p.with_rule(r))
    }

    fn violation_of(result: EvaluationResult) -> Violation {
        match result {
            EvaluationResult::Violation(v) => v,
            other => panic!("Expected violation, got {:?}", other),
        }
    }

    #[test]
    fn test_no_rules_no_violation() {
        let policy = policy_with(vec![]);
        assert_eq!(evaluate(&policy, ["alpha"]), EvaluationResult::NoViolation);
        assert_eq!(
            evaluate(&policy, Vec::<String>::new()),
            EvaluationResult::NoViolation
        );
    }

    #[test]
    fn test_required_missing() {
        let policy = policy_with(vec![rule(RuleMode::Required, "alpha")]);

        let v = violation_of(evaluate(&policy, Vec::<String>::new()));
        assert_eq!(v.kind, ViolationKind::RequiredMissing);
        assert_eq!(v.mods, vec!["alpha"]);
        assert_eq!(v.action, "kick");
        assert!(v.message.contains("alpha"));
    }

    #[test]
    fn test_required_present() {
        let policy = policy_with(vec![rule(RuleMode::Required, "alpha")]);
        assert!(!evaluate(&policy, ["alpha:1.0"]).is_violation());
    }

    #[test]
    fn test_required_disabled() {
        let mut policy = policy_with(vec![rule(RuleMode::Required, "alpha")]);
        policy.config.required_enabled = false;
        assert!(!evaluate(&policy, Vec::<String>::new()).is_violation());
    }

    #[test]
    fn test_blacklisted_mod_wins_over_allowed_mods() {
        let policy = policy_with(vec![
            rule(RuleMode::Blacklisted, "cheatmod").with_action("ban"),
            rule(RuleMode::Allowed, "alpha"),
        ]);

        let v = violation_of(evaluate(&policy, ["cheatmod", "alpha"]));
        assert_eq!(v.kind, ViolationKind::Blacklisted);
        assert_eq!(v.mods, vec!["cheatmod"]);
        assert_eq!(v.action, "ban");
    }

    #[test]
    fn test_blacklisted_precedes_required_for_same_id() {
        // Only a config file can name one id under two modes.
        let config = ConfigFile::from_json(
            r#"{
                "rules": {
                    "cheatmod": { "mode": "blacklisted", "action": "ban" },
                    "cheatmod:2.0": { "mode": "required" }
                }
            }"#,
        )
        .unwrap();
        let policy = config.policy();

        for reported in [vec!["cheatmod:2.0"], vec!["cheatmod"]] {
            let v = violation_of(evaluate(&policy, reported));
            assert_eq!(v.kind, ViolationKind::Blacklisted);
            assert_eq!(v.mods, vec!["cheatmod"]);
            assert_eq!(v.action, "ban");
        }
        assert!(!evaluate(&policy, Vec::<String>::new()).is_violation());
    }

    #[test]
    fn test_blacklist_message_template() {
        let policy = policy_with(vec![
            rule(RuleMode::Blacklisted, "a"),
            rule(RuleMode::Blacklisted, "b"),
        ]);

        let v = violation_of(evaluate(&policy, ["a", "b"]));
        assert_eq!(v.mods, vec!["a", "b"]);
        assert_eq!(v.message, "You are using blacklisted mods: a, b");
    }

    #[test]
    fn test_whitelist_mode_rejects_unknown_mod() {
        let mut policy = policy_with(vec![
            rule(RuleMode::Allowed, "alpha"),
            rule(RuleMode::Optional, "beta"),
        ]);
        policy.config.whitelist_mode = true;
        policy.config.whitelisted_enabled = false;

        let v = violation_of(evaluate(&policy, ["alpha", "beta", "gamma"]));
        assert_eq!(v.kind, ViolationKind::Whitelist);
        assert_eq!(v.mods, vec!["gamma"]);
        assert_eq!(v.action, "kick");
    }

    #[test]
    fn test_whitelist_mode_skips_ignored_mods() {
        let mut policy = policy_with(vec![rule(RuleMode::Allowed, "alpha")]).with_ignored("fabric");
        policy.config.whitelist_mode = true;

        assert!(!evaluate(&policy, ["alpha", "fabric"]).is_violation());
    }

    #[test]
    fn test_version_pinning() {
        let mut policy = policy_with(vec![rule(RuleMode::Blacklisted, "x:1.0")]);

        policy.config.mod_versioning = true;
        assert!(!evaluate(&policy, ["x:2.0"]).is_violation());
        assert!(evaluate(&policy, ["x:1.0"]).is_violation());

        policy.config.mod_versioning = false;
        assert!(evaluate(&policy, ["x:2.0"]).is_violation());
    }

    #[test]
    fn test_unversioned_rule_matches_any_version() {
        let mut policy = policy_with(vec![rule(RuleMode::Blacklisted, "x")]);
        policy.config.mod_versioning = true;
        assert!(evaluate(&policy, ["x:9.9"]).is_violation());
    }

    #[test]
    fn test_hash_mismatch_prevents_match() {
        let mut policy =
            policy_with(vec![rule(RuleMode::Required, "alpha")]).with_known_hash("alpha", "AAAA");
        policy.config.hash_mods = true;

        assert!(!evaluate(&policy, ["alpha:1.0:aaaa"]).is_violation());

        let v = violation_of(evaluate(&policy, ["alpha:1.0:bbbb"]));
        assert_eq!(v.kind, ViolationKind::RequiredMissing);
    }

    #[test]
    fn test_hash_fail_open_when_unregistered() {
        let mut policy = policy_with(vec![rule(RuleMode::Required, "alpha")]);
        policy.config.hash_mods = true;

        assert!(!evaluate(&policy, ["alpha:1.0:whatever"]).is_violation());
    }

    #[test]
    fn test_hash_skipped_when_client_reports_none() {
        let mut policy =
            policy_with(vec![rule(RuleMode::Required, "alpha")]).with_known_hash("alpha", "aaaa");
        policy.config.hash_mods = true;

        assert!(!evaluate(&policy, ["alpha:1.0"]).is_violation());
    }

    #[test]
    fn test_versioned_hash_lookup_precedes_bare() {
        let mut policy = policy_with(vec![rule(RuleMode::Required, "alpha:1.0")])
            .with_known_hash("alpha:1.0", "v1hash")
            .with_known_hash("alpha", "barehash");
        policy.config.hash_mods = true;
        policy.config.mod_versioning = true;

        assert!(!evaluate(&policy, ["alpha:1.0:v1hash"]).is_violation());
        assert!(evaluate(&policy, ["alpha:1.0:barehash"]).is_violation());

        policy.config.mod_versioning = false;
        assert!(!evaluate(&policy, ["alpha:1.0:barehash"]).is_violation());
    }

    #[test]
    fn test_rule_hash_used_as_fallback() {
        let mut policy = policy_with(vec![rule(RuleMode::Required, "alpha:1.0:cafe")]);
        policy.config.hash_mods = true;

        assert!(!evaluate(&policy, ["alpha:1.0:CAFE"]).is_violation());
        assert!(evaluate(&policy, ["alpha:1.0:beef"]).is_violation());
    }

    #[test]
    fn test_allowed_actions() {
        let policy = policy_with(vec![
            rule(RuleMode::Allowed, "alpha").with_action("greet"),
            rule(RuleMode::Allowed, "beta"),
            rule(RuleMode::Required, "gamma").with_action("reward"),
        ]);

        match evaluate(&policy, ["alpha", "beta", "gamma"]) {
            EvaluationResult::AllowedActions(actions) => {
                assert_eq!(actions.len(), 2);
                assert_eq!(actions.get("alpha").map(String::as_str), Some("greet"));
                assert_eq!(actions.get("gamma").map(String::as_str), Some("reward"));
            }
            other => panic!("Expected allowed actions, got {:?}", other),
        }
    }

    #[test]
    fn test_allowed_actions_disabled() {
        let mut policy = policy_with(vec![rule(RuleMode::Allowed, "alpha").with_action("greet")]);
        policy.config.whitelisted_enabled = false;
        assert_eq!(evaluate(&policy, ["alpha"]), EvaluationResult::NoViolation);
    }

    #[test]
    fn test_unparsable_mods_are_dropped() {
        let mut policy = policy_with(vec![rule(RuleMode::Allowed, "alpha")]);
        policy.config.whitelist_mode = true;
        assert!(!evaluate(&policy, ["alpha", "", "null", ":1.0"]).is_violation());
    }

    #[test]
    fn test_evaluation_is_deterministic() {
        let policy = policy_with(vec![
            rule(RuleMode::Blacklisted, "b"),
            rule(RuleMode::Blacklisted, "a"),
        ]);
        let first = evaluate(&policy, ["b", "a"]);
        let second = evaluate(&policy, ["a", "b"]);
        assert_eq!(first, second);
    }
}
