//! Shared harness: spin up in-process nodes on ephemeral ports.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ghosttalk_core::config::{RateLimitSettings, SwarmSettings};
use ghosttalk_core::NodeConfig;
use ghosttalk_node::{daemon, http, AppState};

static NEXT_KEY: AtomicU64 = AtomicU64::new(0);

/// A running test node.
pub struct TestNode {
    pub state: Arc<AppState>,
    pub addr: SocketAddr,
}

impl TestNode {
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// The node's X25519 key, as a client would learn it from the
    /// directory.
    pub fn encryption_public(&self) -> [u8; 32] {
        self.state.identity.encryption_public()
    }
}

/// Start a node with the given swarm settings and an ephemeral port.
pub async fn spawn_node(swarm: SwarmSettings) -> TestNode {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let key_file = std::env::temp_dir().join(format!(
        "ghosttalk-test-{}-{}.key",
        std::process::id(),
        NEXT_KEY.fetch_add(1, Ordering::SeqCst),
    ));
    let _ = std::fs::remove_file(&key_file);

    let config = NodeConfig {
        private_key_file: key_file,
        listen_address: addr.to_string(),
        public_address: addr.to_string(),
        swarm,
        // Throttling off so tight request loops stay deterministic
        rate_limit: RateLimitSettings {
            enabled: false,
            ..RateLimitSettings::default()
        },
        ..NodeConfig::default()
    };

    let state = daemon::build_state(config).unwrap();
    let app = http::router(state.clone());
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    TestNode { state, addr }
}

pub async fn spawn_default_node() -> TestNode {
    spawn_node(SwarmSettings::default()).await
}

/// Tell `node` about `peer` through the registration endpoint.
pub async fn introduce(client: &reqwest::Client, node: &TestNode, peer: &TestNode) {
    let response = client
        .post(node.url("/v1/nodes/register"))
        .json(&peer.state.self_info())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
}

pub fn unix_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
