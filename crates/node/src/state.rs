//! Process-wide state shared by every request handler.

use std::sync::Arc;

use ghosttalk_core::{NodeConfig, NodeInfo};
use ghosttalk_crypto::NodeIdentity;
use ghosttalk_directory::Directory;
use ghosttalk_router::OnionRouter;
use ghosttalk_storage::MessageStore;

use crate::outbound::OutboundClient;
use crate::rate_limit::RateLimiter;

pub struct AppState {
    pub config: NodeConfig,
    pub node_id: String,
    pub identity: NodeIdentity,
    pub router: OnionRouter,
    pub store: Arc<dyn MessageStore>,
    pub directory: Directory,
    pub limiter: RateLimiter,
    pub outbound: Arc<OutboundClient>,
}

impl AppState {
    /// This node's own directory record, advertised to peers.
    pub fn self_info(&self) -> NodeInfo {
        let advertised = self.config.advertised_address();
        let (address, port) = split_endpoint(advertised);
        NodeInfo {
            node_id: self.node_id.clone(),
            public_key: self.identity.public_key(),
            address,
            port,
            last_seen: unix_seconds(),
            healthy: true,
        }
    }
}

/// Split "host:port" into its parts; a missing or bad port falls back to
/// the default surface port.
pub fn split_endpoint(endpoint: &str) -> (String, u16) {
    match endpoint.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.trim_start_matches('[').trim_end_matches(']').to_string(), port),
            Err(_) => (endpoint.to_string(), 8080),
        },
        None => (endpoint.to_string(), 8080),
    }
}

pub fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
