//! # Mod Compliance Server Library
//!
//! This library provides the server side of the mod handshake: it receives the
//! three handshake messages a modded client sends after connecting, validates
//! them, and decides whether the client may stay.
//!
//! ## Core Responsibilities
//!
//! ### Message Validation
//! Every handshake message carries a single-use nonce. Nonces are tracked
//! globally, so a message captured from one session cannot be replayed in
//! another. The mods-list is bound to its SHA-256 hash and the integrity
//! attestation is checked against the server's Ed25519 public key.
//!
//! ### Compliance Enforcement
//! Accepted messages are merged into a per-connection record. After each
//! merge, and once more when the connection's grace period elapses, the
//! record is evaluated against the active mod policy: required, blacklisted
//! and allowed rules, whitelist mode, ignored mods and known hashes.
//!
//! ### Actions
//! Policy violations and allowed-mod triggers run named actions, which
//! expand into console commands handed to a [`actions::CommandExecutor`].
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! Validation happens on the network receiver task. Everything that mutates
//! connection state runs on one event loop, so an update and the decision it
//! produces never interleave with another update for the same connection.
//!
//! ### Reloadable Policy
//! The policy is an immutable snapshot behind a [`policy::PolicyHandle`].
//! Reloading swaps the snapshot; a check in progress keeps the one it started with.
//!
//! ## Module Organization
//!
//! - `nonce_registry`: global single-use nonce set with retention and capacity bounds
//! - `signature`: integrity attestation verification
//! - `handshake`: stateless validation of incoming handshake messages
//! - `compliance`: per-connection compliance records and merge rules
//! - `policy`: rule table, toggles, message catalog and the reloadable handle
//! - `evaluator`: pure policy evaluation of a reported mod set
//! - `actions`: action registry, template expansion and dispatch
//! - `orchestrator`: per-connection state machine tying the above together
//! - `client_manager`: connection tracking and timeouts
//! - `config`: JSON configuration file
//! - `network`: UDP transport and the event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ConfigFile;
//! use server::network::Server;
//! use server::orchestrator::ServiceContext;
//! use server::signature::SignatureVerifier;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigFile::from_json(r#"{ "behavior": "strict" }"#)?;
//!     let context = ServiceContext::new(config.policy());
//!
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         32,
//!         config.settings(),
//!         SignatureVerifier::default(),
//!         context,
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod client_manager;
pub mod compliance;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod handshake;
pub mod network;
pub mod nonce_registry;
pub mod orchestrator;
pub mod policy;
pub mod signature;
