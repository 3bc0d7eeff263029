//! Replay protection for handshake messages
//!
//! Every handshake message carries a single-use nonce. The registry remembers
//! nonces it has accepted so that a captured message cannot be replayed, on
//! the same channel or any other. Entries are retained for a fixed window and
//! the set is capped in size, so memory stays bounded on long-lived servers.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug, Default)]
struct Seen {
    nonces: HashSet<String>,
    /// Insertion order, oldest first
    order: VecDeque<(Instant, String)>,
}

impl Seen {
    fn prune(&mut self, now: Instant, retention: Duration) {
        while let Some((inserted, _)) = self.order.front() {
            if now.duration_since(*inserted) <= retention {
                break;
            }
            if let Some((_, nonce)) = self.order.pop_front() {
                self.nonces.remove(&nonce);
            }
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((_, nonce)) = self.order.pop_front() {
            self.nonces.remove(&nonce);
        }
    }
}

/// Global set of accepted nonces, safe to share across tasks
#[derive(Debug)]
pub struct NonceRegistry {
    seen: Mutex<Seen>,
    retention: Duration,
    capacity: usize,
}

impl NonceRegistry {
    pub fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            seen: Mutex::new(Seen::default()),
            retention,
            capacity: capacity.max(1),
        }
    }

    /// Returns true if the nonce has not been accepted within the retention window.
    pub fn is_fresh(&self, nonce: &str) -> bool {
        let mut seen = self.seen.lock();
        seen.prune(Instant::now(), self.retention);
        !seen.nonces.contains(nonce)
    }

    /// Records a nonce, returning false if it was already present.
    ///
    /// The check and the insert happen under one lock, so two copies of the
    /// same message racing on different tasks cannot both be accepted.
    pub fn record(&self, nonce: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock();
        seen.prune(now, self.retention);

        if seen.nonces.contains(nonce) {
            return false;
        }

        while seen.nonces.len() >= self.capacity {
            seen.evict_oldest();
        }

        seen.nonces.insert(nonce.to_string());
        seen.order.push_back((now, nonce.to_string()));
        true
    }

    pub fn len(&self) -> usize {
        self.seen.lock().nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NonceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION, DEFAULT_CAPACITY)
    }
}
