use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

/// 32-byte identifier
pub type Id = [u8; 32];

/// 32-byte public key
pub type PublicKey = [u8; 32];

/// Client-visible 32-byte identity derived from an Ed25519 public key
pub type SessionId = [u8; 32];

/// 64-byte Ed25519 signature (use BigArray for serde support)
pub type Signature = [u8; 64];

/// Hex-encoded 32-byte arrays for the JSON surface.
pub mod hex_id {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let text = String::deserialize(d)?;
        let bytes = hex::decode(&text).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 hex-encoded bytes"))
    }
}

/// Hex-encoded variable-length byte strings for the JSON surface.
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(d)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Message type carried in the payload plaintext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Attachment,
    Typing,
    ReadAck,
    DeliverAck,
}

impl MessageType {
    /// Wire byte for the payload plaintext
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Text => 0x01,
            Self::Attachment => 0x02,
            Self::Typing => 0x03,
            Self::ReadAck => 0x04,
            Self::DeliverAck => 0x05,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(Self::Text),
            0x02 => Some(Self::Attachment),
            0x03 => Some(Self::Typing),
            0x04 => Some(Self::ReadAck),
            0x05 => Some(Self::DeliverAck),
            _ => None,
        }
    }
}

/// A ciphertext message held by the swarm for an offline recipient.
///
/// `ciphertext` is opaque to the node; end-to-end encryption happens on
/// the clients. The node only enforces the TTL and uniqueness invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Random 32-byte message id, unique per recipient
    #[serde(with = "hex_id")]
    pub id: Id,
    /// Recipient Session ID
    #[serde(with = "hex_id")]
    pub recipient_id: SessionId,
    /// Client timestamp, unix milliseconds
    pub timestamp: u64,
    /// `timestamp + configured_ttl`, unix milliseconds
    pub ttl_deadline: u64,
    /// Message type from the payload plaintext
    pub message_type: MessageType,
    /// Opaque end-to-end ciphertext
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    /// Replicas known to hold this message (1 ≤ n ≤ k)
    #[serde(default = "default_replica_count")]
    pub replica_count: u8,
}

fn default_replica_count() -> u8 {
    1
}

impl Message {
    /// Whether the message has outlived its TTL at `now_ms`.
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.ttl_deadline <= now_ms
    }

    /// Stored size in bytes, used for quota accounting.
    pub fn size_bytes(&self) -> usize {
        // id + recipient + timestamps + type + replica_count + ciphertext
        32 + 32 + 8 + 8 + 1 + 1 + self.ciphertext.len()
    }
}

/// Public record of a service node, as registered with the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Node identifier (hex of the Ed25519 public key by convention)
    pub node_id: String,
    /// Long-term Ed25519 public key
    #[serde(with = "hex_id")]
    pub public_key: PublicKey,
    /// Reachable address (IP or hostname)
    pub address: String,
    /// Port of the node's HTTP surface
    pub port: u16,
    /// Unix seconds of the last registration or health probe
    pub last_seen: u64,
    /// Cleared when `last_seen` goes stale
    pub healthy: bool,
}

impl NodeInfo {
    /// "address:port" as dialed by peers.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.address, self.port)
    }
}

/// Signed snapshot of the healthy node set, served to bootstrapping peers.
///
/// The signature covers the canonical serialization of `{version,
/// timestamp, nodes}` with the signature field absent; it is appended after
/// signing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedSet {
    pub version: u32,
    /// ISO-8601 issue time
    pub timestamp: String,
    pub nodes: Vec<NodeInfo>,
    #[serde(with = "BigArray")]
    pub signature: Signature,
}
