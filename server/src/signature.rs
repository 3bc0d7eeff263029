//! Client integrity attestation verification
//!
//! Clients attest to the integrity of their installation by signing the
//! SHA-256 content hash of that installation. Two forms are accepted:
//!
//! - A one-byte payload is a legacy, client-asserted flag (`1` verified,
//!   anything else not). It carries no cryptographic weight.
//! - Anything longer is an Ed25519 signature over the content hash text,
//!   checked against the server's verifying key. Without a key, these always
//!   fail.
//!
//! Whether a failed verification disconnects the client is decided by the
//! orchestrator, based on the configured integrity mode.

use crate::error::ConfigError;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use log::{debug, info};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SignatureVerifier {
    public_key: Option<VerifyingKey>,
}

impl SignatureVerifier {
    pub fn new(public_key: Option<VerifyingKey>) -> Self {
        Self { public_key }
    }

    /// Parses a hex-encoded 32-byte Ed25519 verifying key.
    pub fn from_hex(key_hex: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidKey("expected 32 bytes".to_string()))?;
        let key =
            VerifyingKey::from_bytes(&bytes).map_err(|e| ConfigError::InvalidKey(e.to_string()))?;
        Ok(Self::new(Some(key)))
    }

    /// Loads a verifying key from a file holding its hex encoding.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let verifier = Self::from_hex(&contents)?;
        info!("Loaded integrity public key from {}", path.display());
        Ok(verifier)
    }

    pub fn has_key(&self) -> bool {
        self.public_key.is_some()
    }

    pub fn verify(&self, signature: &[u8], content_hash: &str) -> bool {
        if signature.is_empty() || content_hash.trim().is_empty() {
            return false;
        }

        if let [flag] = signature {
            debug!("Accepting legacy client-asserted integrity flag {}", flag);
            return *flag == 1;
        }

        let Some(key) = &self.public_key else {
            return false;
        };

        match Signature::from_slice(signature) {
            Ok(signature) => key.verify(content_hash.as_bytes(), &signature).is_ok(),
            Err(e) => {
                debug!("Rejecting malformed integrity signature: {}", e);
                false
            }
        }
    }
}
