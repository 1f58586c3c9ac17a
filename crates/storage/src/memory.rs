//! In-memory backend: per-recipient append-only vectors under one lock.

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use ghosttalk_core::{GhostTalkError, Id, Message, Result, SessionId};

use crate::{now_ms, validate_ingest, MessageStore, StoreUsage};

struct Inner {
    messages: HashMap<SessionId, Vec<Message>>,
    bytes: u64,
}

/// Default backend; everything is lost on restart, which is acceptable for
/// TTL-bounded ciphertext (peers re-replicate on the next store).
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_bytes: Option<u64>,
}

impl MemoryStore {
    pub fn new(max_bytes: Option<u64>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                messages: HashMap::new(),
                bytes: 0,
            }),
            max_bytes,
        }
    }
}

impl MessageStore for MemoryStore {
    fn store(&self, msg: Message) -> Result<()> {
        validate_ingest(&msg)?;
        let size = msg.size_bytes() as u64;
        let mut inner = self.inner.write().expect("store lock poisoned");

        let exists = inner
            .messages
            .get(&msg.recipient_id)
            .is_some_and(|list| list.iter().any(|m| m.id == msg.id));
        if exists {
            return Err(GhostTalkError::Duplicate);
        }

        if let Some(max) = self.max_bytes {
            if inner.bytes + size > max {
                evict_expired(&mut inner, now_ms());
            }
            if inner.bytes + size > max {
                return Err(GhostTalkError::QuotaExceeded);
            }
        }

        inner.bytes += size;
        inner.messages.entry(msg.recipient_id).or_default().push(msg);
        Ok(())
    }

    fn retrieve(&self, recipient: &SessionId) -> Result<Vec<Message>> {
        let now = now_ms();
        let inner = self.inner.read().expect("store lock poisoned");
        Ok(inner
            .messages
            .get(recipient)
            .map(|list| list.iter().filter(|m| !m.is_expired(now)).cloned().collect())
            .unwrap_or_default())
    }

    fn delete(&self, recipient: &SessionId, id: &Id) -> Result<bool> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let Some(list) = inner.messages.get_mut(recipient) else {
            return Ok(false);
        };
        let Some(pos) = list.iter().position(|m| &m.id == id) else {
            return Ok(false);
        };
        let removed = list.remove(pos);
        if list.is_empty() {
            inner.messages.remove(recipient);
        }
        inner.bytes = inner.bytes.saturating_sub(removed.size_bytes() as u64);
        Ok(true)
    }

    fn sweep_at(&self, now_ms: u64) -> Result<usize> {
        let mut inner = self.inner.write().expect("store lock poisoned");
        let removed = evict_expired(&mut inner, now_ms);
        if removed > 0 {
            debug!(removed, "swept expired messages");
        }
        Ok(removed)
    }

    fn usage(&self) -> StoreUsage {
        let inner = self.inner.read().expect("store lock poisoned");
        StoreUsage {
            messages: inner.messages.values().map(Vec::len).sum(),
            bytes: inner.bytes,
        }
    }
}

fn evict_expired(inner: &mut Inner, now_ms: u64) -> usize {
    let mut removed = 0usize;
    inner.messages.retain(|_, list| {
        list.retain(|m| {
            if m.is_expired(now_ms) {
                removed += 1;
                false
            } else {
                true
            }
        });
        !list.is_empty()
    });
    // Recompute instead of tracking per-eviction deltas; sweeps are rare.
    inner.bytes = inner
        .messages
        .values()
        .flatten()
        .map(|m| m.size_bytes() as u64)
        .sum();
    removed
}
