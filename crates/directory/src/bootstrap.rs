//! Signed bootstrap sets.
//!
//! A bootstrap set is the canonical JSON of `{version, timestamp, nodes}`
//! signed by the issuing node's Ed25519 key; the signature is appended
//! after signing. Canonical means the struct's fixed field order: both
//! sides serialize the same struct, so the bytes match.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use ghosttalk_core::{NodeInfo, SignedSet};
use ghosttalk_crypto::{sign_data, verify_signature, NodeIdentity};

pub const BOOTSTRAP_VERSION: u32 = 1;

/// The signed portion of a bootstrap set.
#[derive(Serialize)]
struct UnsignedSet<'a> {
    version: u32,
    timestamp: &'a str,
    nodes: &'a [NodeInfo],
}

fn canonical_bytes(version: u32, timestamp: &str, nodes: &[NodeInfo]) -> Vec<u8> {
    serde_json::to_vec(&UnsignedSet {
        version,
        timestamp,
        nodes,
    })
    .expect("bootstrap set serialization cannot fail")
}

/// Snapshot `nodes` into a set signed by `identity`.
pub fn issue_bootstrap_set(identity: &NodeIdentity, nodes: Vec<NodeInfo>) -> SignedSet {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let payload = canonical_bytes(BOOTSTRAP_VERSION, &timestamp, &nodes);
    let signature = sign_data(identity, &payload);
    SignedSet {
        version: BOOTSTRAP_VERSION,
        timestamp,
        nodes,
        signature,
    }
}

/// Verify a set against the issuing directory's public key.
pub fn verify_bootstrap_set(set: &SignedSet, issuer_public_key: &[u8; 32]) -> bool {
    let payload = canonical_bytes(set.version, &set.timestamp, &set.nodes);
    verify_signature(issuer_public_key, &payload, &set.signature)
}
