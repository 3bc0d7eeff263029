//! Named actions: lists of server commands run in response to policy outcomes
//!
//! Command templates support these placeholders:
//! - `{messages.KEY}` resolved from the message catalog (unknown keys are left as-is)
//! - `{player}` the player's display name
//! - `{mod}` / `{mods}` the comma-joined mod list that triggered the action
//!
//! Commands are handed to a [`CommandExecutor`]. Executor failures are logged
//! and never affect the handshake.

use crate::error::CommandError;
use crate::policy::{MessageCatalog, NO_ACTION};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default, rename = "log")]
    pub should_audit_log: bool,
}

impl ActionDefinition {
    pub fn new(name: &str, commands: Vec<String>, should_audit_log: bool) -> Self {
        Self {
            name: name.to_lowercase(),
            commands,
            should_audit_log,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionDefinition>,
}

impl Default for ActionRegistry {
    /// `kick` has no commands of its own: the disconnect is the action.
    /// `ban` bans the player by name and is audit-logged.
    fn default() -> Self {
        let mut registry = Self {
            actions: HashMap::new(),
        };
        registry.insert(ActionDefinition::new("kick", Vec::new(), false));
        registry.insert(ActionDefinition::new(
            "ban",
            vec!["ban {player} Using blacklisted mods: {mods}".to_string()],
            true,
        ));
        registry
    }
}

impl ActionRegistry {
    pub fn empty() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, action: ActionDefinition) {
        self.actions.insert(action.name.clone(), action);
    }

    pub fn get(&self, name: &str) -> Option<&ActionDefinition> {
        self.actions.get(&name.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

const MESSAGE_PREFIX: &str = "{messages.";

fn resolve_messages(template: &str, catalog: &MessageCatalog) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find(MESSAGE_PREFIX) {
        out.push_str(&rest[..start]);
        let after = &rest[start + MESSAGE_PREFIX.len()..];

        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = &after[..end];
        match catalog.get(key) {
            Some(text) => out.push_str(text),
            None => out.push_str(&rest[start..start + MESSAGE_PREFIX.len() + end + 1]),
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Expands one command template.
pub fn expand(template: &str, player: &str, mod_text: &str, catalog: &MessageCatalog) -> String {
    resolve_messages(template, catalog)
        .replace("{player}", player)
        .replace("{mods}", mod_text)
        .replace("{mod}", mod_text)
}

/// Runs expanded server commands
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str) -> Result<(), CommandError>;
}

/// Executor that only logs each command. Used when no server console is attached.
#[derive(Debug, Default)]
pub struct LoggingExecutor;

impl CommandExecutor for LoggingExecutor {
    fn execute(&self, command: &str) -> Result<(), CommandError> {
        info!("Executing server command: {}", command);
        Ok(())
    }
}

#[derive(Clone)]
pub struct ActionDispatcher {
    executor: Arc<dyn CommandExecutor>,
}

impl ActionDispatcher {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Runs the named action for a player. Returns how many commands succeeded.
    pub fn run(
        &self,
        registry: &ActionRegistry,
        catalog: &MessageCatalog,
        action_name: &str,
        player: &str,
        mods: &[String],
    ) -> usize {
        if action_name.eq_ignore_ascii_case(NO_ACTION) {
            return 0;
        }

        let Some(action) = registry.get(action_name) else {
            warn!("Unknown action '{}' requested for {}", action_name, player);
            return 0;
        };

        let mod_text = mods.join(", ");

        if action.should_audit_log {
            info!(
                target: "audit",
                "Action '{}' triggered for {} (mods: {})",
                action.name, player, mod_text
            );
        }

        let mut succeeded = 0;
        for template in &action.commands {
            let command = expand(template, player, &mod_text, catalog);
            match self.executor.execute(&command) {
                Ok(()) => succeeded += 1,
                Err(e) => error!(
                    "Action '{}' command '{}' failed for {}: {}",
                    action.name, command, player, e
                ),
            }
        }
        succeeded
    }
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher").finish_non_exhaustive()
    }
}
