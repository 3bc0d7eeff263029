use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const PROTOCOL_VERSION: u32 = 1;

/// Separator between mod ids in a transmitted mod list.
pub const MOD_LIST_SEPARATOR: char = ',';

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum Packet {
    Connect {
        client_version: u32,
        player_name: String,
    },
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
    Heartbeat,
    Disconnect,

    Connected {
        client_id: u32,
    },
    Disconnected {
        reason: String,
    },
}

impl Packet {
    /// True for the three handshake packets a client may send in any order.
    pub fn is_handshake(&self) -> bool {
        matches!(
            self,
            Packet::ModsList { .. } | Packet::Integrity { .. } | Packet::AntiCheat { .. }
        )
    }
}

/// Lowercase hex SHA-256 of the given text.
pub fn content_hash(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

/// Splits a comma-joined mod list into normalized, non-empty entries.
pub fn split_mod_list(mods: &str) -> Vec<String> {
    mods.split(MOD_LIST_SEPARATOR)
        .map(normalize)
        .filter(|m| !m.is_empty())
        .collect()
}

fn normalize(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn segment(raw: Option<&str>) -> Option<String> {
    let value = normalize(raw?);
    if value.is_empty() || value == "null" {
        None
    } else {
        Some(value)
    }
}

/// A client-reported mod in `modid[:version[:hash]]` form
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModEntry {
    pub id: String,
    pub version: Option<String>,
    pub hash: Option<String>,
}

impl ModEntry {
    /// Parses and normalizes a mod string.
    ///
    /// Segments are trimmed and lowercased; empty and `"null"` segments are
    /// treated as absent. Returns None when no usable mod id remains.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.splitn(3, ':');
        let id = segment(parts.next())?;
        let version = segment(parts.next());
        let hash = segment(parts.next());
        Some(Self { id, version, hash })
    }

    /// Key used for rule and known-hash lookups: `modid` or `modid:version`.
    pub fn key(&self, with_version: bool) -> String {
        match (&self.version, with_version) {
            (Some(version), true) => format!("{}:{}", self.id, version),
            _ => self.id.clone(),
        }
    }
}

impl std::fmt::Display for ModEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(version) = &self.version {
            write!(f, ":{}", version)?;
        }
        if let Some(hash) = &self.hash {
            if self.version.is_none() {
                write!(f, ":null")?;
            }
            write!(f, ":{}", hash)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_id() {
        let entry = ModEntry::parse("  Alpha ").unwrap();
        assert_eq!(entry.id, "alpha");
        assert_eq!(entry.version, None);
        assert_eq!(entry.hash, None);
    }

    #[test]
    fn test_parse_full_entry() {
        let entry = ModEntry::parse("Alpha:1.0:ABCDEF").unwrap();
        assert_eq!(entry.id, "alpha");
        assert_eq!(entry.version.as_deref(), Some("1.0"));
        assert_eq!(entry.hash.as_deref(), Some("abcdef"));
    }

    #[test]
    fn test_parse_null_segments_are_absent() {
        let entry = ModEntry::parse("alpha:null:abc").unwrap();
        assert_eq!(entry.version, None);
        assert_eq!(entry.hash.as_deref(), Some("abc"));

        let entry = ModEntry::parse("alpha::").unwrap();
        assert_eq!(entry.version, None);
        assert_eq!(entry.hash, None);
    }

    #[test]
    fn test_parse_rejects_missing_id() {
        assert!(ModEntry::parse("").is_none());
        assert!(ModEntry::parse("   ").is_none());
        assert!(ModEntry::parse("null:1.0").is_none());
        assert!(ModEntry::parse(":1.0").is_none());
    }

    #[test]
    fn test_entry_key() {
        let entry = ModEntry::parse("x:2.0").unwrap();
        assert_eq!(entry.key(true), "x:2.0");
        assert_eq!(entry.key(false), "x");

        let bare = ModEntry::parse("x").unwrap();
        assert_eq!(bare.key(true), "x");
    }

    #[test]
    fn test_entry_display_keeps_hash_position() {
        assert_eq!(ModEntry::parse("x:1:h").unwrap().to_string(), "x:1:h");
        assert_eq!(ModEntry::parse("x:null:h").unwrap().to_string(), "x:null:h");
        assert_eq!(ModEntry::parse("x").unwrap().to_string(), "x");
    }

    #[test]
    fn test_split_mod_list() {
        let mods = split_mod_list("Alpha, beta:1.0,,  ,GAMMA");
        assert_eq!(mods, vec!["alpha", "beta:1.0", "gamma"]);
        assert!(split_mod_list("").is_empty());
    }

    #[test]
    fn test_content_hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(content_hash("a,b").len(), 64);
        assert_ne!(content_hash("a,b"), content_hash("b,a"));
    }

    #[test]
    fn test_handshake_packet_classification() {
        let mods = Packet::ModsList {
            mods: "a".to_string(),
            mod_list_hash: content_hash("a"),
            nonce: "n".to_string(),
        };
        assert!(mods.is_handshake());
        assert!(!Packet::Heartbeat.is_handshake());
        assert!(!Packet::Connected { client_id: 1 }.is_handshake());
    }

    #[test]
    fn test_packet_serialization_integrity() {
        let packet = Packet::Integrity {
            signature: vec![1, 2, 3],
            content_hash: "abc".to_string(),
            nonce: "n1".to_string(),
        };
        let serialized = bincode::serialize(&packet).unwrap();
        let deserialized: Packet = bincode::deserialize(&serialized).unwrap();
        assert_eq!(packet, deserialized);
    }
}
