//! Circuit construction: the client-side inverse of the router.
//!
//! A forward pass walks the blinded ephemeral chain deriving each hop's
//! keys; a backward pass seals the routing slots innermost-out, chaining
//! each hop's precomputed header HMAC into the slot before it.

use rand::rngs::OsRng;
use std::net::SocketAddr;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use ghosttalk_core::{
    encode_packet, GhostTalkError, PayloadFrame, Result, RoutingSlot,
    MAX_HOPS, PACKET_SIZE, PAYLOAD_LEN, ROUTING_BLOB_LEN, SLOT_STRIDE,
};
use ghosttalk_crypto::{blind_point, derive_hop_keys, header_hmac, seal, HopKeys};

/// One hop of a circuit, as selected by the client from the directory.
#[derive(Debug, Clone)]
pub struct CircuitHop {
    /// The hop's X25519 public key (derived from its Ed25519 identity)
    pub encryption_public: [u8; 32],
    /// The hop's reachable packet endpoint
    pub address: SocketAddr,
    /// Routing expiry for this hop, unix seconds
    pub expiry: u64,
    /// Dwell delay for this hop, milliseconds (≤ 2000)
    pub delay_ms: u16,
}

/// Build a complete onion packet for `hops[0] → … → hops[n-1]`, the last
/// hop delivering `frame` into its swarm.
pub fn build_packet(hops: &[CircuitHop], frame: &PayloadFrame) -> Result<[u8; PACKET_SIZE]> {
    if hops.is_empty() {
        return Err(GhostTalkError::InvalidPacket("empty circuit".into()));
    }
    if hops.len() > MAX_HOPS {
        return Err(GhostTalkError::InvalidPacket(format!(
            "circuit length {} over {MAX_HOPS}",
            hops.len()
        )));
    }

    let ephemeral_secret = StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519Public::from(&ephemeral_secret).to_bytes();

    // Forward pass: per-hop keys along the blinded chain.
    //
    // Hop i sees ephemeral E_{i-1} and computes DH(x_i, E_{i-1}). From this
    // side that same secret is the plain DH against hop i's key, pushed
    // through every earlier blinding factor. Scalar multiplication
    // commutes, so the two orders meet at the same point.
    let mut ephemerals = Vec::with_capacity(hops.len()); // E_{i-1} as seen by hop i
    let mut hop_keys: Vec<HopKeys> = Vec::with_capacity(hops.len());
    let mut current_ephemeral = ephemeral_public;

    for hop in hops {
        let mut shared = *ephemeral_secret
            .diffie_hellman(&X25519Public::from(hop.encryption_public))
            .as_bytes();
        for keys in &hop_keys {
            shared = blind_point(&keys.blinding, &shared);
        }
        let keys = derive_hop_keys(&shared);

        ephemerals.push(current_ephemeral);
        current_ephemeral = blind_point(&keys.blinding, &current_ephemeral);
        hop_keys.push(keys);
    }

    // Payload sealed once, to the final hop.
    let final_keys = &hop_keys[hops.len() - 1];
    let payload_region: [u8; PAYLOAD_LEN] = seal(&final_keys.enc_key, &frame.encode()?)
        .map_err(|e| GhostTalkError::Internal(format!("payload seal: {e}")))?
        .try_into()
        .expect("sealed payload fills the region exactly");

    // Backward pass: seal slots innermost-out. Each iteration produces the
    // blob and header HMAC as hop i will see them; that HMAC is what hop
    // i-1 installs when it forwards.
    let mut blob = [0u8; ROUTING_BLOB_LEN];
    let mut next_hmac = [0u8; 32];

    for i in (0..hops.len()).rev() {
        let slot = if i == hops.len() - 1 {
            RoutingSlot::terminal(hops[i].expiry, hops[i].delay_ms)
        } else {
            RoutingSlot::forward_to(
                hops[i + 1].address,
                hops[i].expiry,
                hops[i].delay_ms,
                next_hmac,
            )
        };

        let sealed = seal(&hop_keys[i].enc_key, &slot.encode())
            .map_err(|e| GhostTalkError::Internal(format!("slot seal: {e}")))?;
        debug_assert_eq!(sealed.len(), SLOT_STRIDE);

        let mut shifted = [0u8; ROUTING_BLOB_LEN];
        shifted[..SLOT_STRIDE].copy_from_slice(&sealed);
        shifted[SLOT_STRIDE..].copy_from_slice(&blob[..ROUTING_BLOB_LEN - SLOT_STRIDE]);
        blob = shifted;

        next_hmac = header_hmac(&hop_keys[i].hmac_key, &ephemerals[i], &blob);
    }

    // After the loop `next_hmac` is hop 0's header HMAC.
    Ok(encode_packet(&ephemeral_public, &next_hmac, &blob, &payload_region))
}
