//! GhostTalk Service Node
//!
//! Wires the core components (router, swarm store, directory, rate
//! limiter) behind the HTTP dispatcher, and runs the background sweeps
//! that reclaim replay fingerprints, expired messages, idle rate-limit
//! buckets, and stale node records.

pub mod daemon;
pub mod http;
pub mod outbound;
pub mod rate_limit;
pub mod state;

pub use daemon::run;
pub use state::AppState;
