//! GhostTalk Onion Router
//!
//! One hop of the Sphinx-style pipeline: replay check, ECDH, HKDF key
//! schedule, constant-time header HMAC, routing-slot decryption, and the
//! forward-or-deliver decision. The circuit builder (the client-side
//! inverse) lives here too so the two directions stay in lockstep.

mod circuit;
mod replay;
mod router;

pub use circuit::{build_packet, CircuitHop};
pub use replay::ReplayCache;
pub use router::{Decision, OnionRouter, RouterStats, StatsSnapshot};
