//! Per-hop unwrap pipeline
//!
//! decode → replay check → ECDH → HKDF → HMAC verify → slot decrypt →
//! validate → forward or deliver. Every failure is local: counted,
//! logged at debug, surfaced as a typed error. Nothing in here blocks;
//! the dwell delay is returned to the caller to schedule.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::debug;

use ghosttalk_core::{
    encode_packet, GhostTalkError, PacketView, Result, RoutingSlot, AddressType,
    MAX_HOP_DELAY_MS, PACKET_SIZE, ROUTING_BLOB_LEN, SLOT_STRIDE,
};
use ghosttalk_crypto::{
    blind_point, derive_hop_keys, open, verify_header_hmac, NodeIdentity,
};

use crate::replay::ReplayCache;

/// Outcome of processing one packet.
#[derive(Debug)]
pub enum Decision {
    /// Push `next_packet` to `next_address` after the dwell delay.
    Forward {
        next_address: SocketAddr,
        next_packet: Box<[u8; PACKET_SIZE]>,
        delay: Duration,
    },
    /// This node is the final hop; hand the payload frame to the swarm
    /// after the dwell delay.
    Deliver {
        plaintext: Vec<u8>,
        delay: Duration,
    },
}

/// Atomic counters over the router's lifetime.
#[derive(Debug, Default)]
pub struct RouterStats {
    pub processed: AtomicU64,
    pub forwarded: AtomicU64,
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub replays: AtomicU64,
}

/// Point-in-time copy of [`RouterStats`] for the observability surface.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub forwarded: u64,
    pub delivered: u64,
    pub dropped: u64,
    pub replays: u64,
}

impl RouterStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            replays: self.replays.load(Ordering::Relaxed),
        }
    }
}

/// One node's onion hop processor.
pub struct OnionRouter {
    identity: NodeIdentity,
    replay: ReplayCache,
    stats: RouterStats,
}

impl OnionRouter {
    pub fn new(identity: NodeIdentity) -> Self {
        Self::with_replay_cache(identity, ReplayCache::new())
    }

    pub fn with_replay_cache(identity: NodeIdentity, replay: ReplayCache) -> Self {
        Self {
            identity,
            replay,
            stats: RouterStats::default(),
        }
    }

    /// Process one inbound packet: a single hop of unwrap.
    pub fn process(&self, bytes: &[u8]) -> Result<Decision> {
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
        match self.process_inner(bytes) {
            Ok(decision) => {
                match decision {
                    Decision::Forward { .. } => {
                        self.stats.forwarded.fetch_add(1, Ordering::Relaxed)
                    }
                    Decision::Deliver { .. } => {
                        self.stats.delivered.fetch_add(1, Ordering::Relaxed)
                    }
                };
                Ok(decision)
            }
            Err(e) => {
                if matches!(e, GhostTalkError::ReplayDetected) {
                    self.stats.replays.fetch_add(1, Ordering::Relaxed);
                }
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "packet dropped");
                Err(e)
            }
        }
    }

    fn process_inner(&self, bytes: &[u8]) -> Result<Decision> {
        // 1. Shape: length and version
        let view = PacketView::decode(bytes)?;

        // 2. Replay: the header HMAC is the packet fingerprint. The insert
        //    is atomic so two concurrent copies never both pass.
        if !self.replay.insert_if_absent(*view.header_hmac) {
            return Err(GhostTalkError::ReplayDetected);
        }

        // 3–4. ECDH against the (possibly blinded) ephemeral key, then the
        //      HKDF key schedule.
        let shared_secret = self.identity.diffie_hellman(view.ephemeral);
        let keys = derive_hop_keys(&shared_secret);

        // 5. Header integrity, constant time.
        if !verify_header_hmac(&keys.hmac_key, view.ephemeral, view.routing_blob, view.header_hmac)
        {
            return Err(GhostTalkError::HmacFailed);
        }

        // 6. Open our routing slot (the first stride of the blob).
        let slot_plain = open(&keys.enc_key, &view.routing_blob[..SLOT_STRIDE])
            .map_err(|_| GhostTalkError::RoutingDecryptFailed)?;
        let slot = RoutingSlot::decode(&slot_plain)?;

        // 7. Routing validity.
        let now = unix_seconds();
        if now > slot.expiry {
            return Err(GhostTalkError::PacketExpired);
        }

        // 8. Clamp the dwell time to the scheduler-safe cap.
        let delay = Duration::from_millis(u64::from(slot.delay_ms.min(MAX_HOP_DELAY_MS)));

        // 9. Final hop: open the payload and deliver.
        if slot.address_type == AddressType::Final {
            let plaintext = open(&keys.enc_key, view.payload)
                .map_err(|_| GhostTalkError::PayloadDecryptFailed)?;
            return Ok(Decision::Deliver { plaintext, delay });
        }

        // 10. Forward: blind the ephemeral key, peel one stride off the
        //     blob, install the precomputed next-hop HMAC, re-pack. The
        //     payload region passes through untouched.
        let next_address = slot
            .next_hop()
            .ok_or_else(|| GhostTalkError::InvalidPacket("forward slot without address".into()))?;

        let next_ephemeral = blind_point(&keys.blinding, view.ephemeral);

        let mut next_blob = [0u8; ROUTING_BLOB_LEN];
        next_blob[..ROUTING_BLOB_LEN - SLOT_STRIDE]
            .copy_from_slice(&view.routing_blob[SLOT_STRIDE..]);

        let next_packet = encode_packet(
            &next_ephemeral,
            &slot.next_hmac,
            &next_blob,
            view.payload.try_into().expect("payload region is fixed size"),
        );

        Ok(Decision::Forward {
            next_address,
            next_packet: Box::new(next_packet),
            delay,
        })
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Expire old replay fingerprints; called by the background sweep.
    pub fn sweep_replay(&self) -> usize {
        self.replay.sweep()
    }
}

fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
