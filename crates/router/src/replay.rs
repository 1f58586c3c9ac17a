//! Replay fingerprint cache
//!
//! Remembers the header HMAC of every packet seen within the window so a
//! duplicate is dropped before any key derivation runs. Entries must
//! outlive the maximum routing expiry (5 minutes), and the set is
//! size-capped so sustained traffic between sweeps cannot grow it without
//! bound.

use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Entry lifetime; must stay ≥ the maximum packet expiry horizon.
const DEFAULT_WINDOW: Duration = Duration::from_secs(300);

/// Default cap on tracked fingerprints.
const DEFAULT_MAX_ENTRIES: usize = 1_000_000;

/// Concurrent set of recently seen header HMAC fingerprints.
pub struct ReplayCache {
    entries: DashMap<[u8; 32], Instant>,
    window: Duration,
    max_entries: usize,
}

impl ReplayCache {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_WINDOW, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_config(window: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            window,
            max_entries,
        }
    }

    /// Atomically record a fingerprint. Returns `true` when it was absent
    /// (the packet may proceed) and `false` for a duplicate. Two concurrent
    /// calls with the same fingerprint cannot both return `true`; the
    /// entry lock makes the check-and-insert a single step.
    pub fn insert_if_absent(&self, fingerprint: [u8; 32]) -> bool {
        if self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }
        match self.entries.entry(fingerprint) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                true
            }
        }
    }

    /// Drop entries older than the window. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let window = self.window;
        self.entries.retain(|_, first_seen| first_seen.elapsed() < window);
        before.saturating_sub(self.entries.len())
    }

    /// Evict the oldest entry to stay under the cap.
    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| *entry.key());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new()
    }
}
