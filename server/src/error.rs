//! Error types for handshake validation, configuration and command execution

use std::fmt;
use thiserror::Error;

/// The three handshake channels a client reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    ModsList,
    Integrity,
    AntiCheat,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::ModsList => "mods-list",
            Channel::Integrity => "integrity",
            Channel::AntiCheat => "anti-cheat",
        };
        f.write_str(name)
    }
}

/// Coarse classification of fatal handshake failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Protocol,
    Replay,
    Integrity,
}

/// Fatal handshake failures. Every variant ends the connection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("{0} message carried no nonce")]
    MissingNonce(Channel),

    #[error("{0} message reused nonce {1}")]
    Replay(Channel, String),

    #[error("malformed {0} message: {1}")]
    Malformed(Channel, String),

    #[error("mod list hash mismatch (expected {expected}, got {actual})")]
    ModListTampered { expected: String, actual: String },

    #[error("integrity signature could not be verified")]
    InvalidSignature,

    #[error("anti-cheat message carried an empty signature hash")]
    MissingAntiCheatHash,
}

impl HandshakeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            HandshakeError::MissingNonce(_) | HandshakeError::Malformed(..) => {
                ErrorCategory::Protocol
            }
            HandshakeError::Replay(..) => ErrorCategory::Replay,
            HandshakeError::ModListTampered { .. }
            | HandshakeError::InvalidSignature
            | HandshakeError::MissingAntiCheatHash => ErrorCategory::Integrity,
        }
    }

    /// Message catalog key for the text shown to the disconnected client.
    pub fn message_key(&self) -> &'static str {
        match self {
            HandshakeError::MissingNonce(_) | HandshakeError::Malformed(..) => "protocol-violation",
            HandshakeError::Replay(..) => "replay-detected",
            HandshakeError::ModListTampered { .. } => "mod-list-tampered",
            HandshakeError::InvalidSignature => "invalid-signature",
            HandshakeError::MissingAntiCheatHash => "anti-cheat-failed",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid public key: {0}")]
    InvalidKey(String),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command rejected: {0}")]
    Rejected(String),

    #[error("command executor unavailable")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            HandshakeError::MissingNonce(Channel::ModsList).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            HandshakeError::Replay(Channel::Integrity, "n".to_string()).category(),
            ErrorCategory::Replay
        );
        assert_eq!(
            HandshakeError::InvalidSignature.category(),
            ErrorCategory::Integrity
        );
        assert_eq!(
            HandshakeError::MissingAntiCheatHash.category(),
            ErrorCategory::Integrity
        );
    }

    #[test]
    fn test_replay_and_protocol_are_distinct() {
        let missing = HandshakeError::MissingNonce(Channel::AntiCheat);
        let replay = HandshakeError::Replay(Channel::AntiCheat, "abc".to_string());
        assert_ne!(missing.category(), replay.category());
        assert_ne!(missing.message_key(), replay.message_key());
    }

    #[test]
    fn test_error_display() {
        let err = HandshakeError::Replay(Channel::ModsList, "n1".to_string());
        assert_eq!(err.to_string(), "mods-list message reused nonce n1");
    }
}
