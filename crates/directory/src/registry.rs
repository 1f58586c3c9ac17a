//! Node registry with a hash-ring mirror.
//!
//! The ring reflects membership and is mutated only through the registry's
//! register/remove operations; both live under one readers-writer lock so
//! a membership change is observed atomically.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info};

use ghosttalk_core::{NodeInfo, SessionId};

use crate::ring::HashRing;

struct Inner {
    records: HashMap<String, NodeInfo>,
    ring: HashRing,
}

/// Registry of known service nodes.
pub struct Directory {
    inner: RwLock<Inner>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                records: HashMap::new(),
                ring: HashRing::new(),
            }),
        }
    }

    /// Upsert a node record. `last_seen` never moves backwards; a
    /// registration always restores health.
    pub fn register(&self, mut info: NodeInfo) {
        let mut inner = self.inner.write().expect("directory lock poisoned");
        if let Some(existing) = inner.records.get(&info.node_id) {
            info.last_seen = info.last_seen.max(existing.last_seen);
        } else {
            inner.ring.add(&info.node_id);
            info!(node_id = %info.node_id, endpoint = %info.endpoint(), "node registered");
        }
        info.healthy = true;
        inner.records.insert(info.node_id.clone(), info);
    }

    /// Drop a node entirely (operator action; health checks only mark).
    pub fn remove(&self, node_id: &str) -> bool {
        let mut inner = self.inner.write().expect("directory lock poisoned");
        inner.ring.remove(node_id);
        inner.records.remove(node_id).is_some()
    }

    /// Record a liveness contact from a node.
    pub fn touch(&self, node_id: &str) {
        let now = unix_seconds();
        let mut inner = self.inner.write().expect("directory lock poisoned");
        if let Some(record) = inner.records.get_mut(node_id) {
            record.last_seen = record.last_seen.max(now);
            record.healthy = true;
        }
    }

    /// The k nodes hosting a Session ID's swarm: healthy ring successors
    /// first, backfilled from unhealthy ones when fewer than k are healthy.
    pub fn swarm_for(&self, session_id: &SessionId, k: usize) -> Vec<NodeInfo> {
        let inner = self.inner.read().expect("directory lock poisoned");
        let ordered = inner.ring.successors(session_id, inner.ring.node_count());

        let mut healthy = Vec::new();
        let mut backfill = Vec::new();
        for node_id in ordered {
            if let Some(record) = inner.records.get(&node_id) {
                if record.healthy {
                    healthy.push(record.clone());
                } else {
                    backfill.push(record.clone());
                }
            }
        }
        healthy.extend(backfill);
        healthy.truncate(k);
        healthy
    }

    /// Mark nodes whose `last_seen` is older than `max_age` unhealthy.
    /// Returns how many flipped.
    pub fn mark_health(&self, max_age: Duration) -> usize {
        let cutoff = unix_seconds().saturating_sub(max_age.as_secs());
        let mut flipped = 0usize;
        let mut inner = self.inner.write().expect("directory lock poisoned");
        for record in inner.records.values_mut() {
            if record.healthy && record.last_seen < cutoff {
                record.healthy = false;
                flipped += 1;
                debug!(node_id = %record.node_id, "node marked unhealthy");
            }
        }
        flipped
    }

    /// Snapshot of the currently healthy nodes.
    pub fn healthy_nodes(&self) -> Vec<NodeInfo> {
        let inner = self.inner.read().expect("directory lock poisoned");
        let mut nodes: Vec<NodeInfo> =
            inner.records.values().filter(|r| r.healthy).cloned().collect();
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        nodes
    }

    pub fn get(&self, node_id: &str) -> Option<NodeInfo> {
        let inner = self.inner.read().expect("directory lock poisoned");
        inner.records.get(node_id).cloned()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("directory lock poisoned");
        inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
