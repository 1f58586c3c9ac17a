//! On-wire onion packet format
//!
//! A packet is exactly 1280 bytes: version, ephemeral key, header HMAC,
//! routing blob (three 205-byte slots), payload region. This module only
//! slices and validates offsets; no cryptography happens here. The sealed
//! regions are opened by the router with keys it derives per hop.
//!
//! Layout:
//!
//! ```text
//! [0]        version (0x01)
//! [1..33]    ephemeral X25519 public key
//! [33..65]   header HMAC-SHA256(ephemeral ‖ routing blob)
//! [65..680]  routing blob: 3 × 205-byte slots
//! [680..1280] payload: nonce[12] ‖ AEAD ciphertext+tag
//! ```
//!
//! All integers are big-endian.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::{GhostTalkError, Result};
use crate::types::{Id, MessageType, SessionId};

/// Total on-wire packet size.
pub const PACKET_SIZE: usize = 1280;

/// Current wire version.
pub const PACKET_VERSION: u8 = 0x01;

/// Maximum circuit length.
pub const MAX_HOPS: usize = 3;

/// AEAD nonce length (ChaCha20-Poly1305).
pub const NONCE_LEN: usize = 12;

/// AEAD authentication tag length.
pub const TAG_LEN: usize = 16;

/// Routing blob length: `MAX_HOPS` slots.
pub const ROUTING_BLOB_LEN: usize = MAX_HOPS * SLOT_STRIDE;

/// Per-hop stride in the routing blob: nonce ‖ sealed slot plaintext.
pub const SLOT_STRIDE: usize = 205;

/// Decrypted routing slot length.
pub const SLOT_PLAINTEXT_LEN: usize = SLOT_STRIDE - NONCE_LEN - TAG_LEN;

/// Payload region length on the wire.
pub const PAYLOAD_LEN: usize = 600;

/// Decrypted payload plaintext length (zero-padded frame).
pub const PAYLOAD_PLAINTEXT_LEN: usize = PAYLOAD_LEN - NONCE_LEN - TAG_LEN;

/// Payload frame header: recipient ‖ id ‖ timestamp ‖ type ‖ content length.
const PAYLOAD_HEADER_LEN: usize = 32 + 32 + 8 + 1 + 2;

/// Maximum message content length inside the payload frame.
pub const MAX_CONTENT_LEN: usize = PAYLOAD_PLAINTEXT_LEN - PAYLOAD_HEADER_LEN;

/// Per-hop dwell delay cap, milliseconds.
pub const MAX_HOP_DELAY_MS: u16 = 2000;

const EPHEMERAL_OFF: usize = 1;
const HMAC_OFF: usize = 33;
const ROUTING_OFF: usize = 65;
const PAYLOAD_OFF: usize = ROUTING_OFF + ROUTING_BLOB_LEN;

/// Borrowed view of a decoded packet; slices reference the input buffer.
#[derive(Debug, Clone, Copy)]
pub struct PacketView<'a> {
    pub version: u8,
    pub ephemeral: &'a [u8; 32],
    pub header_hmac: &'a [u8; 32],
    pub routing_blob: &'a [u8],
    pub payload: &'a [u8],
}

impl<'a> PacketView<'a> {
    /// Decode a packet, validating length and version only.
    pub fn decode(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() != PACKET_SIZE {
            return Err(GhostTalkError::InvalidPacket(format!(
                "length {} != {}",
                bytes.len(),
                PACKET_SIZE
            )));
        }
        if bytes[0] != PACKET_VERSION {
            return Err(GhostTalkError::InvalidPacket(format!(
                "unsupported version 0x{:02x}",
                bytes[0]
            )));
        }
        Ok(Self {
            version: bytes[0],
            ephemeral: bytes[EPHEMERAL_OFF..HMAC_OFF].try_into().expect("32 bytes"),
            header_hmac: bytes[HMAC_OFF..ROUTING_OFF].try_into().expect("32 bytes"),
            routing_blob: &bytes[ROUTING_OFF..PAYLOAD_OFF],
            payload: &bytes[PAYLOAD_OFF..PACKET_SIZE],
        })
    }
}

/// Assemble a packet from its regions. The version byte is pre-written.
pub fn encode_packet(
    ephemeral: &[u8; 32],
    header_hmac: &[u8; 32],
    routing_blob: &[u8; ROUTING_BLOB_LEN],
    payload: &[u8; PAYLOAD_LEN],
) -> [u8; PACKET_SIZE] {
    let mut out = [0u8; PACKET_SIZE];
    out[0] = PACKET_VERSION;
    out[EPHEMERAL_OFF..HMAC_OFF].copy_from_slice(ephemeral);
    out[HMAC_OFF..ROUTING_OFF].copy_from_slice(header_hmac);
    out[ROUTING_OFF..PAYLOAD_OFF].copy_from_slice(routing_blob);
    out[PAYLOAD_OFF..].copy_from_slice(payload);
    out
}

/// Where the packet goes after this hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// This node is the final hop; deliver the payload.
    Final,
    Ipv4,
    Ipv6,
}

impl AddressType {
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Final => 0x00,
            Self::Ipv4 => 0x04,
            Self::Ipv6 => 0x06,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x00 => Some(Self::Final),
            0x04 => Some(Self::Ipv4),
            0x06 => Some(Self::Ipv6),
            _ => None,
        }
    }
}

/// One hop's routing instructions, decrypted from the outermost slot.
///
/// `next_hmac` is the header HMAC of the packet this hop will emit; the
/// circuit builder precomputes it with the next hop's HMAC key. Zero at the
/// final hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingSlot {
    pub address_type: AddressType,
    pub address: [u8; 16],
    pub port: u16,
    /// Unix seconds after which the packet must be dropped
    pub expiry: u64,
    /// Dwell time before forwarding/delivering, milliseconds
    pub delay_ms: u16,
    pub next_hmac: [u8; 32],
}

impl RoutingSlot {
    /// Parse a decrypted slot. Rejects unknown address types and delays
    /// over the cap; expiry is checked by the router against its clock.
    pub fn decode(plain: &[u8]) -> Result<Self> {
        if plain.len() != SLOT_PLAINTEXT_LEN {
            return Err(GhostTalkError::InvalidPacket(format!(
                "slot length {} != {}",
                plain.len(),
                SLOT_PLAINTEXT_LEN
            )));
        }
        let address_type = AddressType::from_byte(plain[0]).ok_or_else(|| {
            GhostTalkError::InvalidPacket(format!("unknown address type 0x{:02x}", plain[0]))
        })?;
        let address: [u8; 16] = plain[1..17].try_into().expect("16 bytes");
        let port = u16::from_be_bytes([plain[17], plain[18]]);
        let expiry = u64::from_be_bytes(plain[19..27].try_into().expect("8 bytes"));
        let delay_ms = u16::from_be_bytes([plain[27], plain[28]]);
        if delay_ms > MAX_HOP_DELAY_MS {
            return Err(GhostTalkError::InvalidPacket(format!(
                "delay {}ms over cap",
                delay_ms
            )));
        }
        let next_hmac: [u8; 32] = plain[29..61].try_into().expect("32 bytes");
        Ok(Self {
            address_type,
            address,
            port,
            expiry,
            delay_ms,
            next_hmac,
        })
    }

    /// Serialize to the fixed slot plaintext; the reserved tail is zero.
    pub fn encode(&self) -> [u8; SLOT_PLAINTEXT_LEN] {
        let mut out = [0u8; SLOT_PLAINTEXT_LEN];
        out[0] = self.address_type.to_byte();
        out[1..17].copy_from_slice(&self.address);
        out[17..19].copy_from_slice(&self.port.to_be_bytes());
        out[19..27].copy_from_slice(&self.expiry.to_be_bytes());
        out[27..29].copy_from_slice(&self.delay_ms.to_be_bytes());
        out[29..61].copy_from_slice(&self.next_hmac);
        out
    }

    /// The next hop's socket address, `None` at the final hop.
    pub fn next_hop(&self) -> Option<SocketAddr> {
        match self.address_type {
            AddressType::Final => None,
            AddressType::Ipv4 => {
                let octets: [u8; 4] = self.address[..4].try_into().expect("4 bytes");
                Some(SocketAddr::new(IpAddr::V4(Ipv4Addr::from(octets)), self.port))
            }
            AddressType::Ipv6 => {
                Some(SocketAddr::new(IpAddr::V6(Ipv6Addr::from(self.address)), self.port))
            }
        }
    }

    /// Build a forward slot from a socket address.
    pub fn forward_to(addr: SocketAddr, expiry: u64, delay_ms: u16, next_hmac: [u8; 32]) -> Self {
        let mut address = [0u8; 16];
        let address_type = match addr.ip() {
            IpAddr::V4(v4) => {
                address[..4].copy_from_slice(&v4.octets());
                AddressType::Ipv4
            }
            IpAddr::V6(v6) => {
                address.copy_from_slice(&v6.octets());
                AddressType::Ipv6
            }
        };
        Self {
            address_type,
            address,
            port: addr.port(),
            expiry,
            delay_ms,
            next_hmac,
        }
    }

    /// Build a final-hop slot.
    pub fn terminal(expiry: u64, delay_ms: u16) -> Self {
        Self {
            address_type: AddressType::Final,
            address: [0u8; 16],
            port: 0,
            expiry,
            delay_ms,
            next_hmac: [0u8; 32],
        }
    }
}

/// Decrypted payload frame produced by the final hop.
///
/// `recipient ‖ id ‖ timestamp_ms ‖ type ‖ content_len ‖ content`,
/// zero-padded to [`PAYLOAD_PLAINTEXT_LEN`]. The content itself remains
/// end-to-end ciphertext; the frame only carries enough routing metadata
/// to store the message in the recipient's swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadFrame {
    pub recipient: SessionId,
    pub id: Id,
    pub timestamp_ms: u64,
    pub message_type: MessageType,
    pub content: Vec<u8>,
}

impl PayloadFrame {
    pub fn decode(plain: &[u8]) -> Result<Self> {
        if plain.len() != PAYLOAD_PLAINTEXT_LEN {
            return Err(GhostTalkError::InvalidPacket(format!(
                "payload frame length {} != {}",
                plain.len(),
                PAYLOAD_PLAINTEXT_LEN
            )));
        }
        let recipient: SessionId = plain[0..32].try_into().expect("32 bytes");
        let id: Id = plain[32..64].try_into().expect("32 bytes");
        let timestamp_ms = u64::from_be_bytes(plain[64..72].try_into().expect("8 bytes"));
        let message_type = MessageType::from_byte(plain[72]).ok_or_else(|| {
            GhostTalkError::InvalidPacket(format!("unknown message type 0x{:02x}", plain[72]))
        })?;
        let content_len = u16::from_be_bytes([plain[73], plain[74]]) as usize;
        if content_len > MAX_CONTENT_LEN {
            return Err(GhostTalkError::InvalidPacket(format!(
                "content length {} over cap",
                content_len
            )));
        }
        let content = plain[PAYLOAD_HEADER_LEN..PAYLOAD_HEADER_LEN + content_len].to_vec();
        Ok(Self {
            recipient,
            id,
            timestamp_ms,
            message_type,
            content,
        })
    }

    /// Serialize with consistent big-endian length framing and zero padding.
    pub fn encode(&self) -> Result<[u8; PAYLOAD_PLAINTEXT_LEN]> {
        if self.content.len() > MAX_CONTENT_LEN {
            return Err(GhostTalkError::InvalidPacket(format!(
                "content length {} over cap",
                self.content.len()
            )));
        }
        let mut out = [0u8; PAYLOAD_PLAINTEXT_LEN];
        out[0..32].copy_from_slice(&self.recipient);
        out[32..64].copy_from_slice(&self.id);
        out[64..72].copy_from_slice(&self.timestamp_ms.to_be_bytes());
        out[72] = self.message_type.to_byte();
        out[73..75].copy_from_slice(&(self.content.len() as u16).to_be_bytes());
        out[PAYLOAD_HEADER_LEN..PAYLOAD_HEADER_LEN + self.content.len()]
            .copy_from_slice(&self.content);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> [u8; PACKET_SIZE] {
        let ephemeral = [0x11u8; 32];
        let hmac = [0x22u8; 32];
        let routing = [0x33u8; ROUTING_BLOB_LEN];
        let payload = [0x44u8; PAYLOAD_LEN];
        encode_packet(&ephemeral, &hmac, &routing, &payload)
    }

    #[test]
    fn test_encode_decode_identity() {
        let bytes = sample_packet();
        let view = PacketView::decode(&bytes).unwrap();

        assert_eq!(view.version, PACKET_VERSION);
        assert_eq!(view.ephemeral, &[0x11u8; 32]);
        assert_eq!(view.header_hmac, &[0x22u8; 32]);
        assert_eq!(view.routing_blob, &[0x33u8; ROUTING_BLOB_LEN][..]);
        assert_eq!(view.payload, &[0x44u8; PAYLOAD_LEN][..]);

        let rebuilt = encode_packet(
            view.ephemeral,
            view.header_hmac,
            view.routing_blob.try_into().unwrap(),
            view.payload.try_into().unwrap(),
        );
        assert_eq!(rebuilt, bytes);
    }

    #[test]
    fn test_region_offsets_cover_packet() {
        assert_eq!(1 + 32 + 32 + ROUTING_BLOB_LEN + PAYLOAD_LEN, PACKET_SIZE);
        assert_eq!(SLOT_STRIDE, NONCE_LEN + SLOT_PLAINTEXT_LEN + TAG_LEN);
        assert_eq!(PAYLOAD_LEN, NONCE_LEN + PAYLOAD_PLAINTEXT_LEN + TAG_LEN);
    }

    #[test]
    fn test_wrong_length_rejected() {
        for len in [0usize, 1279, 1281, 4096] {
            let bytes = vec![PACKET_VERSION; len];
            assert!(PacketView::decode(&bytes).is_err(), "len {len} accepted");
        }
    }

    #[test]
    fn test_wrong_version_rejected() {
        let mut bytes = sample_packet();
        bytes[0] = 0x02;
        assert!(matches!(
            PacketView::decode(&bytes),
            Err(GhostTalkError::InvalidPacket(_))
        ));
    }

    #[test]
    fn test_routing_slot_round_trip_ipv4() {
        let slot = RoutingSlot::forward_to(
            "10.0.0.2:9000".parse().unwrap(),
            1_700_000_060,
            250,
            [0xaa; 32],
        );
        let plain = slot.encode();
        // Literal layout checks
        assert_eq!(plain[0], 0x04);
        assert_eq!(&plain[1..5], &[10, 0, 0, 2]);
        assert_eq!(&plain[17..19], &9000u16.to_be_bytes());
        assert_eq!(&plain[27..29], &250u16.to_be_bytes());
        assert_eq!(&plain[61..], &[0u8; SLOT_PLAINTEXT_LEN - 61][..]);

        let back = RoutingSlot::decode(&plain).unwrap();
        assert_eq!(back, slot);
        assert_eq!(back.next_hop().unwrap().to_string(), "10.0.0.2:9000");
    }

    #[test]
    fn test_routing_slot_round_trip_ipv6() {
        let slot = RoutingSlot::forward_to("[2001:db8::1]:443".parse().unwrap(), 60, 0, [0; 32]);
        let back = RoutingSlot::decode(&slot.encode()).unwrap();
        assert_eq!(back.address_type, AddressType::Ipv6);
        assert_eq!(back.next_hop().unwrap().to_string(), "[2001:db8::1]:443");
    }

    #[test]
    fn test_terminal_slot_has_no_next_hop() {
        let slot = RoutingSlot::terminal(1_700_000_060, 0);
        let back = RoutingSlot::decode(&slot.encode()).unwrap();
        assert_eq!(back.address_type, AddressType::Final);
        assert!(back.next_hop().is_none());
        assert_eq!(back.next_hmac, [0u8; 32]);
    }

    #[test]
    fn test_slot_rejects_unknown_address_type() {
        let mut plain = RoutingSlot::terminal(0, 0).encode();
        plain[0] = 0x05;
        assert!(RoutingSlot::decode(&plain).is_err());
    }

    #[test]
    fn test_slot_rejects_excess_delay() {
        let mut plain = RoutingSlot::terminal(0, 0).encode();
        plain[27..29].copy_from_slice(&2001u16.to_be_bytes());
        assert!(RoutingSlot::decode(&plain).is_err());
    }

    #[test]
    fn test_payload_frame_literal_layout() {
        let frame = PayloadFrame {
            recipient: [0x52; 32], // 'R'
            id: [0x07; 32],
            timestamp_ms: 0x0102030405060708,
            message_type: MessageType::Text,
            content: b"hello!".to_vec(),
        };
        let plain = frame.encode().unwrap();

        assert_eq!(&plain[0..32], &[0x52u8; 32]);
        assert_eq!(&plain[32..64], &[0x07u8; 32]);
        assert_eq!(&plain[64..72], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(plain[72], 0x01);
        // Big-endian content length on the encode side...
        assert_eq!(&plain[73..75], &[0x00, 0x06]);
        assert_eq!(&plain[75..81], b"hello!");
        assert_eq!(plain[81], 0x00);

        // ...and the decode side reads the same order back.
        let back = PayloadFrame::decode(&plain).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_payload_frame_content_cap() {
        let frame = PayloadFrame {
            recipient: [0; 32],
            id: [0; 32],
            timestamp_ms: 0,
            message_type: MessageType::Attachment,
            content: vec![0u8; MAX_CONTENT_LEN + 1],
        };
        assert!(frame.encode().is_err());

        let ok = PayloadFrame {
            content: vec![0xee; MAX_CONTENT_LEN],
            ..frame
        };
        let plain = ok.encode().unwrap();
        assert_eq!(PayloadFrame::decode(&plain).unwrap().content.len(), MAX_CONTENT_LEN);
    }

    #[test]
    fn test_payload_frame_rejects_unknown_type() {
        let frame = PayloadFrame {
            recipient: [0; 32],
            id: [0; 32],
            timestamp_ms: 0,
            message_type: MessageType::Text,
            content: vec![],
        };
        let mut plain = frame.encode().unwrap();
        plain[72] = 0x09;
        assert!(PayloadFrame::decode(&plain).is_err());
    }
}
