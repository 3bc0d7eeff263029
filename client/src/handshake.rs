//! Builds the handshake packets a modded client sends after connecting
//!
//! Each packet gets a fresh random nonce. The mods-list is bound to its
//! SHA-256 hash, and the integrity attestation is either an Ed25519
//! signature over the installation's content hash or, for old servers,
//! a one-byte legacy flag.

use ed25519_dalek::{Signer, SigningKey};
use shared::{content_hash, Packet, MOD_LIST_SEPARATOR};
use std::path::Path;

/// Length in bytes of generated nonces before hex encoding
const NONCE_BYTES: usize = 16;

pub fn new_nonce() -> String {
    hex::encode(rand::random::<[u8; NONCE_BYTES]>())
}

/// How the client attests to the integrity of its installation
#[derive(Debug, Clone)]
pub enum Attestation {
    Signed(SigningKey),
    LegacyFlag(bool),
}

#[derive(Debug, Clone)]
pub struct HandshakeBuilder {
    attestation: Attestation,
}

impl HandshakeBuilder {
    pub fn new(attestation: Attestation) -> Self {
        Self { attestation }
    }

    /// Reads a hex-encoded 32-byte Ed25519 secret key.
    pub fn load_signing_key(path: &Path) -> Result<SigningKey, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)?;
        let bytes = hex::decode(contents.trim())?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "signing key must be 32 bytes")?;
        Ok(SigningKey::from_bytes(&bytes))
    }

    pub fn mods_list(&self, mods: &[String]) -> Packet {
        let mods = mods.join(&MOD_LIST_SEPARATOR.to_string());
        Packet::ModsList {
            mod_list_hash: content_hash(&mods),
            mods,
            nonce: new_nonce(),
        }
    }

    /// Attests to an installation described by `install_manifest`.
    pub fn integrity(&self, install_manifest: &str) -> Packet {
        let hash = content_hash(install_manifest);
        let signature = match &self.attestation {
            Attestation::Signed(key) => key.sign(hash.as_bytes()).to_bytes().to_vec(),
            Attestation::LegacyFlag(verified) => vec![u8::from(*verified)],
        };
        Packet::Integrity {
            signature,
            content_hash: hash,
            nonce: new_nonce(),
        }
    }

    pub fn anti_cheat(&self, signature_hash: &str) -> Packet {
        Packet::AntiCheat {
            signature_hash: signature_hash.to_string(),
            nonce: new_nonce(),
        }
    }

    /// All three handshake packets, in the order a client normally sends them.
    pub fn packets(&self, mods: &[String], install_manifest: &str, anti_cheat: &str) -> Vec<Packet> {
        vec![
            self.mods_list(mods),
            self.integrity(install_manifest),
            self.anti_cheat(anti_cheat),
        ]
    }
}
