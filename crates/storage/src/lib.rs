//! GhostTalk Swarm Store
//!
//! TTL-bounded message storage for offline recipients. Two backends behind
//! one trait: an in-memory map and a sled key-value store keyed by
//! `(recipient, timestamp, id)` for range scans. The backend is selected
//! from configuration at startup.

mod memory;
mod persistent;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub use memory::MemoryStore;
pub use persistent::SledStore;

use ghosttalk_core::config::{StorageBackend, StorageSettings};
use ghosttalk_core::{GhostTalkError, Id, Message, Result, SessionId};

/// Store occupancy, for quota decisions and the observability surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub messages: usize,
    pub bytes: u64,
}

/// The swarm store contract.
///
/// `store` is insert-once per `(recipient, id)`: once it returns `Ok`, a
/// `retrieve` on the same node includes the message until expiry or
/// explicit deletion. Implementations are safe for concurrent use.
pub trait MessageStore: Send + Sync {
    /// Insert a message. Fails with `Expired` when the deadline has
    /// passed, `Duplicate` for a repeated `(recipient, id)`, and
    /// `QuotaExceeded` when the byte budget is full even after evicting
    /// expired rows.
    fn store(&self, msg: Message) -> Result<()>;

    /// All non-expired messages for a recipient, in insertion order.
    fn retrieve(&self, recipient: &SessionId) -> Result<Vec<Message>>;

    /// Remove one message. Idempotent; returns whether a row was removed.
    fn delete(&self, recipient: &SessionId, id: &Id) -> Result<bool>;

    /// Remove everything whose deadline is at or before `now_ms`; returns
    /// the count. The scheduled sweep passes the current clock.
    fn sweep_at(&self, now_ms: u64) -> Result<usize>;

    /// Current occupancy.
    fn usage(&self) -> StoreUsage;

    /// Sweep against the wall clock.
    fn sweep(&self) -> Result<usize> {
        self.sweep_at(now_ms())
    }
}

/// Open the backend named by the configuration.
pub fn open_store(settings: &StorageSettings) -> Result<Arc<dyn MessageStore>> {
    let max_bytes = settings.max_size_bytes();
    match settings.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new(Some(max_bytes)))),
        StorageBackend::PersistentKv => {
            let store = SledStore::open(&settings.path, Some(max_bytes))?;
            Ok(Arc::new(store))
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Shared ingest validation: deadline sanity before any backend work.
pub(crate) fn validate_ingest(msg: &Message) -> Result<()> {
    if msg.ttl_deadline <= now_ms() {
        return Err(GhostTalkError::Expired);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    use ghosttalk_core::{Message, MessageType};

    use super::now_ms;

    pub fn message(recipient: [u8; 32], id_byte: u8, ttl_ms: u64) -> Message {
        let now = now_ms();
        let mut id = [0u8; 32];
        id[0] = id_byte;
        Message {
            id,
            recipient_id: recipient,
            timestamp: now,
            ttl_deadline: now + ttl_ms,
            message_type: MessageType::Text,
            ciphertext: vec![id_byte; 64],
            replica_count: 1,
        }
    }

    /// Exercise the full contract against any backend.
    pub fn run_store_contract(store: &dyn super::MessageStore) {
        use ghosttalk_core::GhostTalkError;

        let alice = [0xa1u8; 32];
        let bob = [0xb0u8; 32];

        // Insertion order is preserved per recipient
        let m1 = message(alice, 1, 60_000);
        let m2 = message(alice, 2, 60_000);
        let m3 = message(alice, 3, 60_000);
        store.store(m1.clone()).unwrap();
        store.store(m2.clone()).unwrap();
        store.store(m3.clone()).unwrap();
        store.store(message(bob, 9, 60_000)).unwrap();

        let got = store.retrieve(&alice).unwrap();
        assert_eq!(got.iter().map(|m| m.id[0]).collect::<Vec<_>>(), vec![1, 2, 3]);

        // Duplicate by (recipient, id)
        assert!(matches!(
            store.store(m2.clone()),
            Err(GhostTalkError::Duplicate)
        ));
        // Same id under another recipient is fine
        store.store(message(bob, 2, 60_000)).unwrap();

        // Idempotent delete
        assert!(store.delete(&alice, &m2.id).unwrap());
        assert!(!store.delete(&alice, &m2.id).unwrap());
        let got = store.retrieve(&alice).unwrap();
        assert_eq!(got.iter().map(|m| m.id[0]).collect::<Vec<_>>(), vec![1, 3]);

        // Sweep at the deadline removes the rest
        let removed = store.sweep_at(m3.ttl_deadline).unwrap();
        assert!(removed >= 2);
        assert!(store.retrieve(&alice).unwrap().is_empty());
    }
}
