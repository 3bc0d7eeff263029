//! Per-connection handshake state machine
//!
//! The orchestrator owns every compliance record and is driven from the
//! server's single event loop, so merging an update and acting on the
//! resulting decision happens without interleaving from other updates.
//!
//! A connection moves `Unverified -> Partial -> Admitted` as messages arrive
//! and are accepted, and ends in `Disconnected` on the first fatal outcome.
//! Compliance is re-checked after every accepted message and once more when
//! the connection's grace period elapses. Checks that depend on something
//! *not* having arrived (no mods reported under strict behavior, no integrity
//! message under signed mode) only apply after the grace period.

use crate::actions::{ActionDispatcher, CommandExecutor, LoggingExecutor};
use crate::compliance::{ClientComplianceRecord, HandshakeStore, RecordUpdate};
use crate::error::HandshakeError;
use crate::evaluator::{evaluate, EvaluationResult, ViolationKind};
use crate::policy::{message_keys, Behavior, IntegrityMode, Policy, PolicyHandle};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Optional platform capability: recognizes clients on an alternate protocol
/// that cannot take part in the handshake. Such clients skip compliance checks.
pub trait AlternateClientProvider: Send + Sync {
    fn is_alternate_client(&self, client_id: u32) -> bool;
}

#[derive(Debug, Default)]
pub struct NoAlternateClients;

impl AlternateClientProvider for NoAlternateClients {
    fn is_alternate_client(&self, _client_id: u32) -> bool {
        false
    }
}

/// Collaborators shared by the orchestrator and the network layer
#[derive(Clone)]
pub struct ServiceContext {
    pub policy: PolicyHandle,
    pub executor: Arc<dyn CommandExecutor>,
    pub alternate_clients: Arc<dyn AlternateClientProvider>,
}

impl ServiceContext {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy: PolicyHandle::new(policy),
            executor: Arc::new(LoggingExecutor),
            alternate_clients: Arc::new(NoAlternateClients),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_alternate_clients(mut self, provider: Arc<dyn AlternateClientProvider>) -> Self {
        self.alternate_clients = provider;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unverified,
    Partial,
    Admitted,
    Disconnected,
}

/// What the network layer should do with the connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Disconnect { reason: String },
    /// The connection is unknown or already disconnected
    Ignored,
}

#[derive(Debug)]
struct Session {
    player_name: String,
    state: ConnectionState,
    grace_elapsed: bool,
    /// (mod id, action) pairs already dispatched for allowed-mod triggers
    dispatched: HashSet<(String, String)>,
}

pub struct HandshakeOrchestrator {
    store: HandshakeStore,
    sessions: HashMap<u32, Session>,
    policy: PolicyHandle,
    dispatcher: ActionDispatcher,
    alternate_clients: Arc<dyn AlternateClientProvider>,
}

impl HandshakeOrchestrator {
    pub fn new(context: &ServiceContext) -> Self {
        Self {
            store: HandshakeStore::new(),
            sessions: HashMap::new(),
            policy: context.policy.clone(),
            dispatcher: ActionDispatcher::new(Arc::clone(&context.executor)),
            alternate_clients: Arc::clone(&context.alternate_clients),
        }
    }

    /// Starts tracking a newly admitted connection with an empty record.
    pub fn admit(&mut self, client_id: u32, player_name: &str) {
        self.store.admit(client_id);
        self.sessions.insert(
            client_id,
            Session {
                player_name: player_name.to_string(),
                state: ConnectionState::Unverified,
                grace_elapsed: false,
                dispatched: HashSet::new(),
            },
        );
    }

    pub fn remove(&mut self, client_id: u32) {
        self.store.remove(client_id);
        self.sessions.remove(&client_id);
    }

    pub fn state(&self, client_id: u32) -> Option<ConnectionState> {
        self.sessions.get(&client_id).map(|s| s.state)
    }

    pub fn record(&self, client_id: u32) -> Option<&ClientComplianceRecord> {
        self.store.get(client_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_live(&self, client_id: u32) -> bool {
        matches!(
            self.state(client_id),
            Some(state) if state != ConnectionState::Disconnected
        )
    }

    /// Merges a validated update and re-checks compliance.
    pub fn handle_update(&mut self, client_id: u32, update: RecordUpdate) -> Decision {
        if !self.is_live(client_id) {
            return Decision::Ignored;
        }
        if self.store.apply(client_id, update).is_none() {
            return Decision::Ignored;
        }
        if let Some(session) = self.sessions.get_mut(&client_id) {
            if session.state == ConnectionState::Unverified {
                session.state = ConnectionState::Partial;
            }
        }
        self.check_compliance(client_id)
    }

    /// Ends the connection after a message failed validation.
    pub fn handle_rejection(&mut self, client_id: u32, error: &HandshakeError) -> Decision {
        if !self.is_live(client_id) {
            return Decision::Ignored;
        }
        warn!(
            "Client {} failed handshake validation ({:?}): {}",
            client_id,
            error.category(),
            error
        );
        let reason = self.policy.snapshot().messages.text(error.message_key());
        self.disconnect(client_id, reason)
    }

    /// Marks the grace period as over and runs the full compliance check.
    pub fn on_grace_elapsed(&mut self, client_id: u32) -> Decision {
        match self.sessions.get_mut(&client_id) {
            Some(session) if session.state != ConnectionState::Disconnected => {
                session.grace_elapsed = true;
            }
            _ => return Decision::Ignored,
        }
        self.check_compliance(client_id)
    }

    /// Evaluates the client's current merged record and acts on the outcome.
    pub fn check_compliance(&mut self, client_id: u32) -> Decision {
        if !self.is_live(client_id) {
            return Decision::Ignored;
        }
        let Some(record) = self.store.get(client_id).cloned() else {
            return Decision::Ignored;
        };
        let Some((player_name, grace_elapsed)) = self
            .sessions
            .get(&client_id)
            .map(|s| (s.player_name.clone(), s.grace_elapsed))
        else {
            return Decision::Ignored;
        };

        if self.alternate_clients.is_alternate_client(client_id) {
            debug!("Client {} uses an alternate protocol, skipping checks", client_id);
            return self.admitted(client_id);
        }

        let policy = self.policy.snapshot();
        let config = &policy.config;

        if config.integrity_mode == IntegrityMode::Signed
            && record.has_mods()
            && !record.signature_verified
            && (record.integrity_received() || grace_elapsed)
        {
            return self.handle_rejection(client_id, &HandshakeError::InvalidSignature);
        }

        if !record.has_mods() {
            return match config.behavior {
                Behavior::Strict if grace_elapsed => {
                    let reason = policy.messages.text(message_keys::NO_HANDSHAKE);
                    self.disconnect(client_id, reason)
                }
                Behavior::Strict => Decision::Allow,
                Behavior::Vanilla => self.admitted(client_id),
            };
        }

        match evaluate(&policy, &record.mods) {
            EvaluationResult::NoViolation => self.admitted(client_id),
            EvaluationResult::Violation(violation) => {
                info!(
                    "Client {} ({}) violates mod policy ({:?}): {}",
                    client_id,
                    player_name,
                    violation.kind,
                    violation.mods.join(", ")
                );
                if violation.kind == ViolationKind::Blacklisted {
                    self.dispatcher.run(
                        &policy.actions,
                        &policy.messages,
                        &violation.action,
                        &player_name,
                        &violation.mods,
                    );
                }
                self.disconnect(client_id, violation.message)
            }
            EvaluationResult::AllowedActions(actions) => {
                for (mod_id, action) in actions {
                    let first_time = self
                        .sessions
                        .get_mut(&client_id)
                        .map(|s| s.dispatched.insert((mod_id.clone(), action.clone())))
                        .unwrap_or(false);
                    if first_time {
                        self.dispatcher.run(
                            &policy.actions,
                            &policy.messages,
                            &action,
                            &player_name,
                            &[mod_id],
                        );
                    }
                }
                self.admitted(client_id)
            }
        }
    }

    /// Passing checks before the grace period keeps the connection in its
    /// current state; only a pass after it counts as admission.
    fn admitted(&mut self, client_id: u32) -> Decision {
        if let Some(session) = self.sessions.get_mut(&client_id) {
            if session.grace_elapsed && session.state != ConnectionState::Admitted {
                debug!("Client {} ({}) admitted", client_id, session.player_name);
                session.state = ConnectionState::Admitted;
            }
        }
        Decision::Allow
    }

    fn disconnect(&mut self, client_id: u32, reason: String) -> Decision {
        if let Some(session) = self.sessions.get_mut(&client_id) {
            session.state = ConnectionState::Disconnected;
        }
        warn!("Disconnecting client {}: {}", client_id, reason);
        Decision::Disconnect { reason }
    }
}
