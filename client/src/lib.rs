//! # Handshake Client Library
//!
//! Reference client for the mod compliance handshake. It connects over UDP,
//! sends the three handshake messages (mods-list, integrity attestation and
//! anti-cheat report) and keeps the session alive with heartbeats.
//!
//! ## Module Organization
//!
//! ### Handshake Module (`handshake`)
//! Builds handshake packets:
//! - Fresh random nonce per message
//! - SHA-256 binding of the mods-list
//! - Ed25519 or legacy-flag integrity attestation
//!
//! ### Network Module (`network`)
//! Manages client-server communication:
//! - Connect request and the server's answer
//! - Heartbeats while the session is open
//! - Reporting the server's disconnect reason
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::handshake::{Attestation, HandshakeBuilder};
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:8080", "Steve").await?;
//!     client.connect(Duration::from_secs(5)).await?;
//!
//!     let builder = HandshakeBuilder::new(Attestation::LegacyFlag(true));
//!     let mods = vec!["fabric-api".to_string(), "sodium:0.5.3".to_string()];
//!     client
//!         .send_handshake(&builder.packets(&mods, "my-install", "anticheat-hash"))
//!         .await?;
//!
//!     let outcome = client.run(Duration::from_secs(10)).await?;
//!     println!("{:?}", outcome);
//!     Ok(())
//! }
//! ```

pub mod handshake;
pub mod network;
