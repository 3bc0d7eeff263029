//! JSON configuration file
//!
//! Every field is optional. An example:
//!
//! ```json
//! {
//!   "behavior": "strict",
//!   "integrity_mode": "signed",
//!   "whitelist_mode": false,
//!   "rules": {
//!     "cheatmod": { "mode": "blacklisted", "action": "ban" },
//!     "alpha:1.0": { "mode": "required" }
//!   },
//!   "ignored_mods": ["fabric-api"],
//!   "known_hashes": { "alpha:1.0": "9f86d08..." },
//!   "actions": {
//!     "ban": { "commands": ["ban {player} {messages.ban-reason}"], "log": true }
//!   },
//!   "messages": { "ban-reason": "Blacklisted mods: {mods}" },
//!   "grace_period_ms": 3000
//! }
//! ```
//!
//! A mod id listed under several modes (e.g. `cheatmod` blacklisted and
//! `cheatmod:1.0` required) keeps only its blacklisted rules.
//!
//! With `whitelisted_enabled` on, every present allowed or required mod whose
//! action is not `none` runs that action. Required rules default to `kick`,
//! so a compliant client with a required mod runs `kick`'s commands without
//! being disconnected. Keep `kick` free of commands, or give required rules
//! `"action": "none"` before adding any.

use crate::actions::{ActionDefinition, ActionRegistry};
use crate::error::ConfigError;
use crate::nonce_registry::{DEFAULT_CAPACITY, DEFAULT_RETENTION};
use crate::policy::{
    Behavior, IntegrityMode, MessageCatalog, ModRule, Policy, PolicyConfig, RuleMode,
};
use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub mode: RuleMode,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub required_enabled: bool,
    pub blacklisted_enabled: bool,
    pub whitelisted_enabled: bool,
    pub whitelist_mode: bool,
    pub hash_mods: bool,
    pub mod_versioning: bool,
    pub behavior: Behavior,
    pub integrity_mode: IntegrityMode,
    pub rules: BTreeMap<String, RuleSpec>,
    pub ignored_mods: Vec<String>,
    pub known_hashes: HashMap<String, String>,
    pub actions: HashMap<String, ActionDefinition>,
    pub messages: HashMap<String, String>,
    pub grace_period_ms: u64,
    pub nonce_retention_secs: u64,
    pub nonce_capacity: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let policy = PolicyConfig::default();
        Self {
            required_enabled: policy.required_enabled,
            blacklisted_enabled: policy.blacklisted_enabled,
            whitelisted_enabled: policy.whitelisted_enabled,
            whitelist_mode: policy.whitelist_mode,
            hash_mods: policy.hash_mods,
            mod_versioning: policy.mod_versioning,
            behavior: policy.behavior,
            integrity_mode: policy.integrity_mode,
            rules: BTreeMap::new(),
            ignored_mods: Vec::new(),
            known_hashes: HashMap::new(),
            actions: HashMap::new(),
            messages: HashMap::new(),
            grace_period_ms: DEFAULT_GRACE_PERIOD.as_millis() as u64,
            nonce_retention_secs: DEFAULT_RETENTION.as_secs(),
            nonce_capacity: DEFAULT_CAPACITY,
        }
    }
}

/// Runtime settings that are not part of the reloadable policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub grace_period: Duration,
    pub nonce_retention: Duration,
    pub nonce_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            nonce_retention: DEFAULT_RETENTION,
            nonce_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ConfigFile {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_json(&contents)?;
        info!(
            "Loaded configuration from {} ({} rules)",
            path.display(),
            config.rules.len()
        );
        Ok(config)
    }

    pub fn settings(&self) -> ServerSettings {
        ServerSettings {
            grace_period: Duration::from_millis(self.grace_period_ms),
            nonce_retention: Duration::from_secs(self.nonce_retention_secs),
            nonce_capacity: self.nonce_capacity,
        }
    }

    /// Builds a policy snapshot, normalizing every key.
    pub fn policy(&self) -> Policy {
        let mut policy = Policy::new(PolicyConfig {
            required_enabled: self.required_enabled,
            blacklisted_enabled: self.blacklisted_enabled,
            whitelisted_enabled: self.whitelisted_enabled,
            whitelist_mode: self.whitelist_mode,
            hash_mods: self.hash_mods,
            mod_versioning: self.mod_versioning,
            behavior: self.behavior,
            integrity_mode: self.integrity_mode,
        });

        let mut parsed = Vec::with_capacity(self.rules.len());
        for (key, spec) in &self.rules {
            match ModRule::new(spec.mode, key) {
                Some(rule) => parsed.push(match &spec.action {
                    Some(action) => rule.with_action(action),
                    None => rule,
                }),
                None => warn!("Skipping rule with empty mod id: '{}'", key),
            }
        }

        // A mod id is in one mode only, and blacklisted wins regardless of
        // how the conflicting keys are spelled.
        let blacklisted: HashSet<String> = parsed
            .iter()
            .filter(|rule| rule.mode == RuleMode::Blacklisted)
            .map(|rule| rule.mod_id.clone())
            .collect();
        let (blacklist_rules, other_rules): (Vec<ModRule>, Vec<ModRule>) = parsed
            .into_iter()
            .partition(|rule| rule.mode == RuleMode::Blacklisted);

        for rule in other_rules {
            if blacklisted.contains(&rule.mod_id) {
                warn!(
                    "Mod '{}' is configured as both blacklisted and {:?}; keeping blacklisted",
                    rule.mod_id, rule.mode
                );
                continue;
            }
            policy.rules.insert(rule);
        }
        for rule in blacklist_rules {
            policy.rules.insert(rule);
        }

        for mod_id in &self.ignored_mods {
            policy = policy.with_ignored(mod_id);
        }

        for (key, hash) in &self.known_hashes {
            policy.known_hashes.insert(key, hash);
        }

        let mut actions = ActionRegistry::default();
        for (name, action) in &self.actions {
            actions.insert(ActionDefinition::new(
                name,
                action.commands.clone(),
                action.should_audit_log,
            ));
        }
        policy.actions = actions;
        policy.messages = MessageCatalog::new(self.messages.clone());

        policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{evaluate, EvaluationResult, ViolationKind};

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = ConfigFile::from_json("{}").unwrap();
        let policy = config.policy();

        assert_eq!(policy.config, PolicyConfig::default());
        assert!(policy.rules.is_empty());
        assert!(policy.actions.get("kick").is_some());
        assert_eq!(config.settings(), ServerSettings::default());
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "behavior": "strict",
            "integrity_mode": "dev",
            "whitelist_mode": true,
            "hash_mods": true,
            "rules": {
                "CheatMod": { "mode": "blacklisted", "action": "ban" },
                "alpha:1.0": { "mode": "required" },
                "beta": { "mode": "whitelisted", "action": "greet" }
            },
            "ignored_mods": [" Fabric-API "],
            "known_hashes": { "alpha:1.0": "ABCD" },
            "actions": {
                "greet": { "commands": ["say hi {player}"] }
            },
            "messages": { "kick": "Nope: {mod}" },
            "grace_period_ms": 500,
            "nonce_capacity": 10
        }"#;

        let config = ConfigFile::from_json(json).unwrap();
        let policy = config.policy();

        assert_eq!(policy.config.behavior, Behavior::Strict);
        assert_eq!(policy.config.integrity_mode, IntegrityMode::Dev);
        assert!(policy.config.whitelist_mode);

        let cheat = policy.rules.find("cheatmod").unwrap();
        assert_eq!(cheat.mode, RuleMode::Blacklisted);
        assert_eq!(cheat.action, "ban");

        let alpha = policy.rules.find("alpha").unwrap();
        assert_eq!(alpha.version.as_deref(), Some("1.0"));
        assert_eq!(alpha.action, "kick");

        assert_eq!(policy.rules.find("beta").unwrap().mode, RuleMode::Allowed);
        assert!(policy.is_ignored("fabric-api"));
        assert_eq!(policy.known_hashes.get("alpha:1.0"), Some("abcd"));

        let greet = policy.actions.get("greet").unwrap();
        assert_eq!(greet.name, "greet");
        assert!(!greet.should_audit_log);
        assert!(policy.actions.get("ban").is_some());

        assert_eq!(policy.messages.get("kick"), Some("Nope: {mod}"));

        let settings = config.settings();
        assert_eq!(settings.grace_period, Duration::from_millis(500));
        assert_eq!(settings.nonce_capacity, 10);
    }

    fn blacklist_conflict(blacklisted_key: &str, required_key: &str) -> Policy {
        let json = format!(
            r#"{{
                "integrity_mode": "dev",
                "rules": {{
                    "{}": {{ "mode": "blacklisted" }},
                    "{}": {{ "mode": "required" }}
                }}
            }}"#,
            blacklisted_key, required_key
        );
        ConfigFile::from_json(&json).unwrap().policy()
    }

    #[test]
    fn test_blacklisted_wins_over_required_for_same_id() {
        // Both key orders: the bare id sorts before the versioned one.
        for (blacklisted_key, required_key) in [("cheatmod", "cheatmod:1.0"), ("cheatmod:1.0", "cheatmod")] {
            let policy = blacklist_conflict(blacklisted_key, required_key);

            assert_eq!(policy.rules.rules(RuleMode::Blacklisted).count(), 1);
            assert_eq!(policy.rules.rules(RuleMode::Required).count(), 0);

            match evaluate(&policy, ["cheatmod:1.0"]) {
                EvaluationResult::Violation(v) => {
                    assert_eq!(v.kind, ViolationKind::Blacklisted);
                    assert_eq!(v.mods, vec!["cheatmod"]);
                }
                other => panic!("Expected blacklisted violation, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_required_kick_runs_for_compliant_clients() {
        let config = ConfigFile::from_json(
            r#"{
                "rules": {
                    "alpha": { "mode": "required" },
                    "beta": { "mode": "required", "action": "none" }
                }
            }"#,
        )
        .unwrap();
        let policy = config.policy();

        match evaluate(&policy, ["alpha", "beta"]) {
            EvaluationResult::AllowedActions(actions) => {
                assert_eq!(actions.get("alpha").map(String::as_str), Some("kick"));
                assert!(!actions.contains_key("beta"));
            }
            other => panic!("Expected allowed actions, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = ConfigFile::from_json("{ \"behavior\": \"paranoid\" }").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ConfigFile::load(Path::new("/nonexistent/modgate.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
