//! Persistent backend on sled.
//!
//! Main tree: `recipient ‖ timestamp_be ‖ id → bincode(Message)` so a
//! prefix scan yields one recipient's messages in time order. Index tree:
//! `recipient ‖ id → timestamp_be`, giving insert-once semantics via
//! compare-and-swap and O(log n) deletes by id.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use ghosttalk_core::{GhostTalkError, Id, Message, Result, SessionId};

use crate::{now_ms, validate_ingest, MessageStore, StoreUsage};

const MESSAGES_TREE: &str = "messages";
const INDEX_TREE: &str = "message-ids";

pub struct SledStore {
    _db: sled::Db,
    messages: sled::Tree,
    index: sled::Tree,
    bytes: AtomicU64,
    max_bytes: Option<u64>,
}

impl SledStore {
    /// Open (or create) the store under `path`.
    pub fn open(path: &Path, max_bytes: Option<u64>) -> Result<Self> {
        let db = sled::Config::new()
            .path(path)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db, max_bytes)
    }

    /// Ephemeral store for tests.
    pub fn temporary(max_bytes: Option<u64>) -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(storage_err)?;
        Self::from_db(db, max_bytes)
    }

    fn from_db(db: sled::Db, max_bytes: Option<u64>) -> Result<Self> {
        let messages = db.open_tree(MESSAGES_TREE).map_err(storage_err)?;
        let index = db.open_tree(INDEX_TREE).map_err(storage_err)?;

        // Rebuild the byte counter from disk.
        let mut bytes = 0u64;
        for entry in messages.iter() {
            let (_, value) = entry.map_err(storage_err)?;
            let msg: Message = decode(&value)?;
            bytes += msg.size_bytes() as u64;
        }

        Ok(Self {
            _db: db,
            messages,
            index,
            bytes: AtomicU64::new(bytes),
            max_bytes,
        })
    }

    fn remove_row(&self, main_key: &[u8]) -> Result<Option<Message>> {
        let Some(value) = self.messages.remove(main_key).map_err(storage_err)? else {
            return Ok(None);
        };
        let msg: Message = decode(&value)?;
        self.index
            .remove(index_key(&msg.recipient_id, &msg.id))
            .map_err(storage_err)?;
        self.bytes
            .fetch_sub(msg.size_bytes() as u64, Ordering::Relaxed);
        Ok(Some(msg))
    }
}

impl MessageStore for SledStore {
    fn store(&self, msg: Message) -> Result<()> {
        validate_ingest(&msg)?;
        let size = msg.size_bytes() as u64;

        if let Some(max) = self.max_bytes {
            if self.bytes.load(Ordering::Relaxed) + size > max {
                self.sweep_at(now_ms())?;
            }
            if self.bytes.load(Ordering::Relaxed) + size > max {
                return Err(GhostTalkError::QuotaExceeded);
            }
        }

        // Insert-once on (recipient, id): the CAS fails for a duplicate.
        let idx_key = index_key(&msg.recipient_id, &msg.id);
        let cas = self
            .index
            .compare_and_swap(
                &idx_key,
                None as Option<&[u8]>,
                Some(msg.timestamp.to_be_bytes().to_vec()),
            )
            .map_err(storage_err)?;
        if cas.is_err() {
            return Err(GhostTalkError::Duplicate);
        }

        let value = encode(&msg)?;
        self.messages
            .insert(main_key(&msg.recipient_id, msg.timestamp, &msg.id), value)
            .map_err(storage_err)?;
        self.bytes.fetch_add(size, Ordering::Relaxed);
        Ok(())
    }

    fn retrieve(&self, recipient: &SessionId) -> Result<Vec<Message>> {
        let now = now_ms();
        let mut out = Vec::new();
        for entry in self.messages.scan_prefix(recipient) {
            let (_, value) = entry.map_err(storage_err)?;
            let msg: Message = decode(&value)?;
            if !msg.is_expired(now) {
                out.push(msg);
            }
        }
        Ok(out)
    }

    fn delete(&self, recipient: &SessionId, id: &Id) -> Result<bool> {
        let Some(ts_bytes) = self
            .index
            .get(index_key(recipient, id))
            .map_err(storage_err)?
        else {
            return Ok(false);
        };
        let timestamp = u64::from_be_bytes(
            ts_bytes
                .as_ref()
                .try_into()
                .map_err(|_| GhostTalkError::Storage("corrupt index entry".into()))?,
        );
        Ok(self.remove_row(&main_key(recipient, timestamp, id))?.is_some())
    }

    fn sweep_at(&self, now_ms: u64) -> Result<usize> {
        let mut expired_keys = Vec::new();
        for entry in self.messages.iter() {
            let (key, value) = entry.map_err(storage_err)?;
            let msg: Message = decode(&value)?;
            if msg.is_expired(now_ms) {
                expired_keys.push(key);
            }
        }
        let mut removed = 0usize;
        for key in expired_keys {
            if self.remove_row(&key)?.is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired messages");
        }
        Ok(removed)
    }

    fn usage(&self) -> StoreUsage {
        StoreUsage {
            messages: self.messages.len(),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

fn main_key(recipient: &SessionId, timestamp: u64, id: &Id) -> [u8; 72] {
    let mut key = [0u8; 72];
    key[..32].copy_from_slice(recipient);
    key[32..40].copy_from_slice(&timestamp.to_be_bytes());
    key[40..].copy_from_slice(id);
    key
}

fn index_key(recipient: &SessionId, id: &Id) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[..32].copy_from_slice(recipient);
    key[32..].copy_from_slice(id);
    key
}

fn encode(msg: &Message) -> Result<Vec<u8>> {
    bincode::serialize(msg).map_err(|e| GhostTalkError::Storage(e.to_string()))
}

fn decode(bytes: &[u8]) -> Result<Message> {
    bincode::deserialize(bytes).map_err(|e| GhostTalkError::Storage(e.to_string()))
}

fn storage_err(e: sled::Error) -> GhostTalkError {
    GhostTalkError::Storage(e.to_string())
}
