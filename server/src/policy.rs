//! Server-defined mod policy
//!
//! A [`Policy`] bundles everything the evaluator and dispatcher read: the
//! enforcement toggles, the rule table, ignored mods, known-good hashes, the
//! message catalog and the action registry. Policies are immutable once built;
//! a reload swaps in a whole new one through [`PolicyHandle`].

use crate::actions::ActionRegistry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared::ModEntry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Action name that triggers nothing
pub const NO_ACTION: &str = "none";
/// Action name used when a rule does not name one
pub const KICK_ACTION: &str = "kick";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleMode {
    Required,
    Blacklisted,
    #[serde(alias = "whitelisted")]
    Allowed,
    Optional,
}

impl RuleMode {
    pub fn default_action(&self) -> &'static str {
        match self {
            RuleMode::Required | RuleMode::Blacklisted => KICK_ACTION,
            RuleMode::Allowed | RuleMode::Optional => NO_ACTION,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Behavior {
    /// Clients that never report mods are disconnected
    Strict,
    /// Clients that never report mods are assumed not to speak the protocol
    #[default]
    Vanilla,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityMode {
    #[default]
    Signed,
    Dev,
}

/// Enforcement toggles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub required_enabled: bool,
    pub blacklisted_enabled: bool,
    pub whitelisted_enabled: bool,
    /// Any mod outside the allowed and optional sets is a violation
    pub whitelist_mode: bool,
    pub hash_mods: bool,
    pub mod_versioning: bool,
    pub behavior: Behavior,
    pub integrity_mode: IntegrityMode,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            required_enabled: true,
            blacklisted_enabled: true,
            whitelisted_enabled: true,
            whitelist_mode: false,
            hash_mods: false,
            mod_versioning: false,
            behavior: Behavior::default(),
            integrity_mode: IntegrityMode::default(),
        }
    }
}

/// A policy entry classifying one mod id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModRule {
    pub mod_id: String,
    pub version: Option<String>,
    pub hash: Option<String>,
    pub mode: RuleMode,
    pub action: String,
}

impl ModRule {
    /// Builds a rule from a `modid[:version[:hash]]` key with the mode's default action.
    pub fn new(mode: RuleMode, key: &str) -> Option<Self> {
        let entry = ModEntry::parse(key)?;
        Some(Self {
            mod_id: entry.id,
            version: entry.version,
            hash: entry.hash,
            mode,
            action: mode.default_action().to_string(),
        })
    }

    pub fn with_action(mut self, action: &str) -> Self {
        let action = action.trim();
        if !action.is_empty() {
            self.action = action.to_lowercase();
        }
        self
    }

    /// `modid` or `modid:version`
    pub fn key(&self) -> String {
        match &self.version {
            Some(version) => format!("{}:{}", self.mod_id, version),
            None => self.mod_id.clone(),
        }
    }

    /// Key used for known-hash lookups, versioned only when versioning is on.
    pub fn hash_key(&self, versioned: bool) -> String {
        match (&self.version, versioned) {
            (Some(version), true) => format!("{}:{}", self.mod_id, version),
            _ => self.mod_id.clone(),
        }
    }
}

/// Rules keyed by `modid[:version]`, ordered for deterministic evaluation
///
/// A mod id lives in at most one mode partition: inserting a rule drops any
/// rule for the same id under a different mode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleTable {
    rules: BTreeMap<String, ModRule>,
}

impl RuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rule: ModRule) {
        self.rules
            .retain(|_, existing| existing.mod_id != rule.mod_id || existing.mode == rule.mode);
        self.rules.insert(rule.key(), rule);
    }

    /// Removes every rule for the mod id, returning how many were dropped.
    pub fn remove(&mut self, mod_id: &str) -> usize {
        let mod_id = mod_id.trim().to_lowercase();
        let before = self.rules.len();
        self.rules.retain(|_, rule| rule.mod_id != mod_id);
        before - self.rules.len()
    }

    pub fn rules(&self, mode: RuleMode) -> impl Iterator<Item = &ModRule> {
        self.rules.values().filter(move |rule| rule.mode == mode)
    }

    /// First rule for the mod id in key order, in any partition.
    pub fn find(&self, mod_id: &str) -> Option<&ModRule> {
        self.rules.values().find(|rule| rule.mod_id == mod_id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Expected content hashes keyed by `modid` or `modid:version`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownHashes {
    hashes: HashMap<String, String>,
}

impl KnownHashes {
    pub fn insert(&mut self, key: &str, hash: &str) {
        self.hashes
            .insert(key.trim().to_lowercase(), hash.trim().to_lowercase());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.hashes.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

pub mod message_keys {
    pub const KICK: &str = "kick";
    pub const BLACKLISTED: &str = "blacklisted-mod";
    pub const MISSING_REQUIRED: &str = "missing-required";
    pub const NO_HANDSHAKE: &str = "no-handshake";
    pub const INVALID_SIGNATURE: &str = "invalid-signature";
}

fn default_message(key: &str) -> Option<&'static str> {
    let text = match key {
        message_keys::KICK => "You are using mods that are not allowed on this server: {mod}",
        message_keys::BLACKLISTED => "You are using blacklisted mods: {mod}",
        message_keys::MISSING_REQUIRED => "You are missing required mods: {mod}",
        message_keys::NO_HANDSHAKE => "This server requires the handshake client mod.",
        message_keys::INVALID_SIGNATURE => "Client integrity check failed: invalid signature.",
        "protocol-violation" => "Handshake protocol violation.",
        "replay-detected" => "Handshake replay detected.",
        "mod-list-tampered" => "Mod list integrity check failed.",
        "anti-cheat-failed" => "Anti-cheat verification failed.",
        _ => return None,
    };
    Some(text)
}

/// User-facing message templates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageCatalog {
    messages: HashMap<String, String>,
}

impl MessageCatalog {
    pub fn new(messages: HashMap<String, String>) -> Self {
        Self { messages }
    }

    /// Configured text for a key, falling back to the built-in text.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.messages
            .get(key)
            .map(String::as_str)
            .or_else(|| default_message(key))
    }

    /// Like [`get`](Self::get), but unknown keys come back as the key itself.
    pub fn text(&self, key: &str) -> String {
        self.get(key).unwrap_or(key).to_string()
    }
}

/// One complete, immutable policy snapshot
#[derive(Debug, Clone, Default)]
pub struct Policy {
    pub config: PolicyConfig,
    pub rules: RuleTable,
    /// Mod ids exempt from whitelist enforcement
    pub ignored: HashSet<String>,
    pub known_hashes: KnownHashes,
    pub messages: MessageCatalog,
    pub actions: ActionRegistry,
}

impl Policy {
    pub fn new(config: PolicyConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn with_rule(mut self, rule: ModRule) -> Self {
        self.rules.insert(rule);
        self
    }

    pub fn with_ignored(mut self, mod_id: &str) -> Self {
        self.ignored.insert(mod_id.trim().to_lowercase());
        self
    }

    pub fn with_known_hash(mut self, key: &str, hash: &str) -> Self {
        self.known_hashes.insert(key, hash);
        self
    }

    pub fn is_ignored(&self, mod_id: &str) -> bool {
        self.ignored.contains(mod_id)
    }
}

/// Shared, atomically replaceable policy
///
/// Readers take a snapshot and keep using it for the whole evaluation, so a
/// concurrent reload never exposes a half-updated table.
#[derive(Debug, Clone, Default)]
pub struct PolicyHandle {
    current: Arc<RwLock<Arc<Policy>>>,
}

impl PolicyHandle {
    pub fn new(policy: Policy) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(policy))),
        }
    }

    pub fn snapshot(&self) -> Arc<Policy> {
        Arc::clone(&self.current.read())
    }

    pub fn reload(&self, policy: Policy) {
        *self.current.write() = Arc::new(policy);
    }
}
