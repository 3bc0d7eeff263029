//! Per-connection compliance records and the store that holds them
//!
//! A record starts empty when a connection is admitted and is built up by
//! merging one validated update per handshake message. Updates only ever
//! touch their own channel's fields; everything else carries over from the
//! previous record.

use log::debug;
use std::collections::{BTreeSet, HashMap};

/// Merged handshake state for one connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientComplianceRecord {
    /// Normalized `modid[:version[:hash]]` strings reported by the client
    pub mods: BTreeSet<String>,
    pub mods_list_nonce: Option<String>,
    pub integrity_nonce: Option<String>,
    pub anti_cheat_nonce: Option<String>,
    pub signature_verified: bool,
    pub anti_cheat_verified: bool,
}

impl ClientComplianceRecord {
    pub fn has_mods(&self) -> bool {
        !self.mods.is_empty()
    }

    /// True once an integrity message has been accepted, verified or not.
    pub fn integrity_received(&self) -> bool {
        self.integrity_nonce.is_some()
    }

    /// True once any handshake message has been merged.
    pub fn is_partial(&self) -> bool {
        self.mods_list_nonce.is_some()
            || self.integrity_nonce.is_some()
            || self.anti_cheat_nonce.is_some()
    }
}

/// The field group carried by one validated handshake message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordUpdate {
    ModsList {
        mods: BTreeSet<String>,
        nonce: String,
    },
    Integrity {
        verified: bool,
        nonce: String,
    },
    AntiCheat {
        verified: bool,
        nonce: String,
    },
}

/// Applies one update to a record, producing the next record.
///
/// A mods-list update replaces the reported set: each mods-list message is a
/// complete report, not an increment.
pub fn merge(old: &ClientComplianceRecord, update: RecordUpdate) -> ClientComplianceRecord {
    let mut next = old.clone();
    match update {
        RecordUpdate::ModsList { mods, nonce } => {
            next.mods = mods;
            next.mods_list_nonce = Some(nonce);
        }
        RecordUpdate::Integrity { verified, nonce } => {
            next.signature_verified = verified;
            next.integrity_nonce = Some(nonce);
        }
        RecordUpdate::AntiCheat { verified, nonce } => {
            next.anti_cheat_verified = verified;
            next.anti_cheat_nonce = Some(nonce);
        }
    }
    next
}

/// Compliance records keyed by client id
#[derive(Debug, Default)]
pub struct HandshakeStore {
    records: HashMap<u32, ClientComplianceRecord>,
}

impl HandshakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty record for a newly admitted connection, replacing any
    /// stale record left under the same id.
    pub fn admit(&mut self, client_id: u32) {
        self.records
            .insert(client_id, ClientComplianceRecord::default());
    }

    /// Merges an update into the client's record and returns the result.
    ///
    /// Returns None if the client has no record (never admitted or already
    /// removed); the update is dropped in that case.
    pub fn apply(&mut self, client_id: u32, update: RecordUpdate) -> Option<&ClientComplianceRecord> {
        let Some(record) = self.records.get_mut(&client_id) else {
            debug!("Dropping handshake update for unknown client {}", client_id);
            return None;
        };
        *record = merge(record, update);
        Some(&*record)
    }

    pub fn get(&self, client_id: u32) -> Option<&ClientComplianceRecord> {
        self.records.get(&client_id)
    }

    pub fn remove(&mut self, client_id: u32) -> Option<ClientComplianceRecord> {
        self.records.remove(&client_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
