//! Consistent hash ring with virtual nodes.
//!
//! Each member occupies V points at `H("id:i")`; a key's swarm is the
//! first k distinct members at or after the key's hash, wrapping at the
//! end. Membership changes move only the keys adjacent to the affected
//! points.

use sha2::{Digest, Sha256};

/// Virtual points per member.
pub const DEFAULT_VIRTUAL_NODES: usize = 3;

#[derive(Debug, Clone)]
struct RingPoint {
    hash: u32,
    /// Tie-break for equal hashes: insertion order
    seq: u64,
    node_id: String,
}

/// Sorted ring of `(hash32, node)` points.
#[derive(Debug, Clone, Default)]
pub struct HashRing {
    points: Vec<RingPoint>,
    virtual_nodes: usize,
    next_seq: u64,
}

impl HashRing {
    pub fn new() -> Self {
        Self::with_virtual_nodes(DEFAULT_VIRTUAL_NODES)
    }

    pub fn with_virtual_nodes(virtual_nodes: usize) -> Self {
        Self {
            points: Vec::new(),
            virtual_nodes: virtual_nodes.max(1),
            next_seq: 0,
        }
    }

    /// Insert a member's virtual points; a present member is left as is.
    pub fn add(&mut self, node_id: &str) {
        if self.contains(node_id) {
            return;
        }
        for i in 0..self.virtual_nodes {
            let hash = hash32(format!("{node_id}:{i}").as_bytes());
            let seq = self.next_seq;
            self.next_seq += 1;
            let point = RingPoint {
                hash,
                seq,
                node_id: node_id.to_string(),
            };
            let pos = self
                .points
                .partition_point(|p| (p.hash, p.seq) < (point.hash, point.seq));
            self.points.insert(pos, point);
        }
    }

    /// Remove every virtual point of a member.
    pub fn remove(&mut self, node_id: &str) {
        self.points.retain(|p| p.node_id != node_id);
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.points.iter().any(|p| p.node_id == node_id)
    }

    /// The first `k` distinct members at or after the key's position,
    /// wrapping around the end of the ring.
    pub fn successors(&self, key: &[u8], k: usize) -> Vec<String> {
        if self.points.is_empty() || k == 0 {
            return Vec::new();
        }
        let hash = hash32(key);
        let start = self.points.partition_point(|p| p.hash < hash);

        let mut out: Vec<String> = Vec::with_capacity(k);
        for offset in 0..self.points.len() {
            let point = &self.points[(start + offset) % self.points.len()];
            if !out.contains(&point.node_id) {
                out.push(point.node_id.clone());
                if out.len() == k {
                    break;
                }
            }
        }
        out
    }

    /// Distinct members on the ring.
    pub fn node_count(&self) -> usize {
        let mut ids: Vec<&str> = self.points.iter().map(|p| p.node_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// First four big-endian bytes of SHA-256.
fn hash32(data: &[u8]) -> u32 {
    let digest = Sha256::digest(data);
    u32::from_be_bytes(digest[..4].try_into().expect("4 bytes"))
}
