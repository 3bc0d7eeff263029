//! Stateless validation of incoming handshake messages
//!
//! Validation touches no per-connection state, so it runs on the network
//! receiver task as packets arrive. Only the resulting [`RecordUpdate`] is
//! forwarded to the authoritative loop for merging and evaluation.
//!
//! Every message goes through the same first two steps:
//! 1. the nonce must be present (protocol violation otherwise)
//! 2. the nonce must be fresh; it is recorded as it is accepted (replay otherwise)
//!
//! followed by channel-specific checks.

use crate::compliance::RecordUpdate;
use crate::error::{Channel, HandshakeError};
use crate::nonce_registry::NonceRegistry;
use crate::signature::SignatureVerifier;
use log::debug;
use shared::{content_hash, split_mod_list, Packet};

/// Upper bound on the mods a single mods-list message may report
pub const MAX_REPORTED_MODS: usize = 1024;
pub const MAX_NONCE_LEN: usize = 128;

/// A handshake message reduced to the fields validation needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeMessage {
    ModsList {
        mods: String,
        mod_list_hash: String,
        nonce: String,
    },
    Integrity {
        signature: Vec<u8>,
        content_hash: String,
        nonce: String,
    },
    AntiCheat {
        signature_hash: String,
        nonce: String,
    },
}

impl HandshakeMessage {
    /// Extracts a handshake message from a packet, if it is one.
    pub fn from_packet(packet: Packet) -> Option<Self> {
        match packet {
            Packet::ModsList {
                mods,
                mod_list_hash,
                nonce,
            } => Some(HandshakeMessage::ModsList {
                mods,
                mod_list_hash,
                nonce,
            }),
            Packet::Integrity {
                signature,
                content_hash,
                nonce,
            } => Some(HandshakeMessage::Integrity {
                signature,
                content_hash,
                nonce,
            }),
            Packet::AntiCheat {
                signature_hash,
                nonce,
            } => Some(HandshakeMessage::AntiCheat {
                signature_hash,
                nonce,
            }),
            _ => None,
        }
    }

    pub fn channel(&self) -> Channel {
        match self {
            HandshakeMessage::ModsList { .. } => Channel::ModsList,
            HandshakeMessage::Integrity { .. } => Channel::Integrity,
            HandshakeMessage::AntiCheat { .. } => Channel::AntiCheat,
        }
    }

    pub fn nonce(&self) -> &str {
        match self {
            HandshakeMessage::ModsList { nonce, .. }
            | HandshakeMessage::Integrity { nonce, .. }
            | HandshakeMessage::AntiCheat { nonce, .. } => nonce,
        }
    }
}

#[derive(Debug, Default)]
pub struct HandshakeValidator {
    nonces: NonceRegistry,
    verifier: SignatureVerifier,
}

impl HandshakeValidator {
    pub fn new(nonces: NonceRegistry, verifier: SignatureVerifier) -> Self {
        Self { nonces, verifier }
    }

    pub fn nonces(&self) -> &NonceRegistry {
        &self.nonces
    }

    pub fn validate(&self, message: HandshakeMessage) -> Result<RecordUpdate, HandshakeError> {
        let channel = message.channel();
        let nonce = message.nonce().trim().to_string();

        if nonce.is_empty() {
            return Err(HandshakeError::MissingNonce(channel));
        }
        if nonce.len() > MAX_NONCE_LEN {
            return Err(HandshakeError::Malformed(
                channel,
                format!("nonce longer than {} bytes", MAX_NONCE_LEN),
            ));
        }
        if !self.nonces.record(&nonce) {
            return Err(HandshakeError::Replay(channel, nonce));
        }

        match message {
            HandshakeMessage::ModsList {
                mods,
                mod_list_hash,
                ..
            } => {
                let expected = content_hash(&mods);
                let actual = mod_list_hash.trim().to_lowercase();
                if actual != expected {
                    return Err(HandshakeError::ModListTampered { expected, actual });
                }

                let reported = split_mod_list(&mods);
                if reported.len() > MAX_REPORTED_MODS {
                    return Err(HandshakeError::Malformed(
                        channel,
                        format!("{} mods reported", reported.len()),
                    ));
                }

                debug!("Accepted mods-list with {} entries", reported.len());
                Ok(RecordUpdate::ModsList {
                    mods: reported.into_iter().collect(),
                    nonce,
                })
            }
            HandshakeMessage::Integrity {
                signature,
                content_hash,
                ..
            } => {
                let verified = self.verifier.verify(&signature, &content_hash);
                debug!("Integrity attestation verified: {}", verified);
                Ok(RecordUpdate::Integrity { verified, nonce })
            }
            HandshakeMessage::AntiCheat { signature_hash, .. } => {
                if signature_hash.trim().is_empty() {
                    return Err(HandshakeError::MissingAntiCheatHash);
                }
                Ok(RecordUpdate::AntiCheat {
                    verified: true,
                    nonce,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;
    use ed25519_dalek::{Signer, SigningKey};
    use tokio_test::{assert_err, assert_ok};

    fn mods_list(mods: &str, nonce: &str) -> HandshakeMessage {
        HandshakeMessage::ModsList {
            mods: mods.to_string(),
            mod_list_hash: content_hash(mods),
            nonce: nonce.to_string(),
        }
    }

    #[test]
    fn test_mods_list_accepted() {
        let validator = HandshakeValidator::default();
        let update = validator.validate(mods_list("Alpha,beta:1.0", "n1")).unwrap();

        match update {
            RecordUpdate::ModsList { mods, nonce } => {
                assert_eq!(nonce, "n1");
                assert!(mods.contains("alpha"));
                assert!(mods.contains("beta:1.0"));
            }
            other => panic!("Unexpected update {:?}", other),
        }
    }

    #[test]
    fn test_uppercase_hash_accepted() {
        let validator = HandshakeValidator::default();
        let message = HandshakeMessage::ModsList {
            mods: "a,b".to_string(),
            mod_list_hash: content_hash("a,b").to_uppercase(),
            nonce: "n".to_string(),
        };
        assert_ok!(validator.validate(message));
    }

    #[test]
    fn test_hash_binding() {
        let validator = HandshakeValidator::default();
        let message = HandshakeMessage::ModsList {
            mods: "a,b".to_string(),
            mod_list_hash: content_hash("a,c"),
            nonce: "fresh".to_string(),
        };

        let err = assert_err!(validator.validate(message));
        assert!(matches!(err, HandshakeError::ModListTampered { .. }));
        assert_eq!(err.category(), ErrorCategory::Integrity);
    }

    #[test]
    fn test_missing_nonce_is_protocol_violation() {
        let validator = HandshakeValidator::default();
        let err = assert_err!(validator.validate(mods_list("a", "   ")));
        assert_eq!(err, HandshakeError::MissingNonce(Channel::ModsList));
        assert_eq!(err.category(), ErrorCategory::Protocol);
    }

    #[test]
    fn test_oversized_nonce_is_malformed() {
        let validator = HandshakeValidator::default();
        let nonce = "x".repeat(MAX_NONCE_LEN + 1);
        let err = assert_err!(validator.validate(mods_list("a", &nonce)));
        assert!(matches!(err, HandshakeError::Malformed(Channel::ModsList, _)));
    }

    #[test]
    fn test_replay_across_channels() {
        let validator = HandshakeValidator::default();
        assert_ok!(validator.validate(mods_list("a", "shared-nonce")));

        let replay = HandshakeMessage::AntiCheat {
            signature_hash: "abc".to_string(),
            nonce: "shared-nonce".to_string(),
        };
        let err = assert_err!(validator.validate(replay));
        assert_eq!(
            err,
            HandshakeError::Replay(Channel::AntiCheat, "shared-nonce".to_string())
        );
        assert_eq!(err.category(), ErrorCategory::Replay);
    }

    #[test]
    fn test_replay_same_channel() {
        let validator = HandshakeValidator::default();
        assert_ok!(validator.validate(mods_list("a", "n")));
        let err = assert_err!(validator.validate(mods_list("a", "n")));
        assert_eq!(err.category(), ErrorCategory::Replay);
    }

    #[test]
    fn test_anti_cheat_requires_hash() {
        let validator = HandshakeValidator::default();
        let message = HandshakeMessage::AntiCheat {
            signature_hash: " ".to_string(),
            nonce: "n".to_string(),
        };
        assert_eq!(
            assert_err!(validator.validate(message)),
            HandshakeError::MissingAntiCheatHash
        );

        let message = HandshakeMessage::AntiCheat {
            signature_hash: "deadbeef".to_string(),
            nonce: "n2".to_string(),
        };
        assert_eq!(
            assert_ok!(validator.validate(message)),
            RecordUpdate::AntiCheat {
                verified: true,
                nonce: "n2".to_string()
            }
        );
    }

    #[test]
    fn test_integrity_signature_result_is_recorded() {
        let signing = SigningKey::from_bytes(&[7u8; 32]);
        let verifier = SignatureVerifier::new(Some(signing.verifying_key()));
        let validator = HandshakeValidator::new(NonceRegistry::default(), verifier);

        let hash = content_hash("install");
        let good = HandshakeMessage::Integrity {
            signature: signing.sign(hash.as_bytes()).to_bytes().to_vec(),
            content_hash: hash.clone(),
            nonce: "i1".to_string(),
        };
        assert_eq!(
            validator.validate(good).unwrap(),
            RecordUpdate::Integrity {
                verified: true,
                nonce: "i1".to_string()
            }
        );

        let bad = HandshakeMessage::Integrity {
            signature: vec![0u8; 64],
            content_hash: hash,
            nonce: "i2".to_string(),
        };
        assert_eq!(
            validator.validate(bad).unwrap(),
            RecordUpdate::Integrity {
                verified: false,
                nonce: "i2".to_string()
            }
        );
    }

    #[test]
    fn test_from_packet() {
        assert!(HandshakeMessage::from_packet(Packet::Heartbeat).is_none());

        let message = HandshakeMessage::from_packet(Packet::AntiCheat {
            signature_hash: "h".to_string(),
            nonce: "n".to_string(),
        })
        .unwrap();
        assert_eq!(message.channel(), Channel::AntiCheat);
        assert_eq!(message.nonce(), "n");
    }
}
