//! Node lifecycle: key loading, component wiring, background sweeps,
//! bootstrap, and the HTTP server with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{info, warn};

use ghosttalk_core::NodeConfig;
use ghosttalk_crypto::NodeIdentity;
use ghosttalk_directory::{verify_bootstrap_set, Directory};
use ghosttalk_router::OnionRouter;
use ghosttalk_storage::{open_store, MessageStore};

use crate::http;
use crate::outbound::{OutboundClient, DEFAULT_DEADLINE};
use crate::rate_limit::RateLimiter;
use crate::state::AppState;

/// Replay sweep and directory health-check cadence.
const REPLAY_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
/// Swarm TTL sweep cadence.
const STORE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);
/// Rate-limit bucket GC cadence and idle window.
const LIMITER_GC_INTERVAL: Duration = Duration::from_secs(600);
/// A node unseen for this long is marked unhealthy.
const NODE_STALE_AFTER: Duration = Duration::from_secs(300);

/// Build the shared state from configuration.
pub fn build_state(config: NodeConfig) -> anyhow::Result<Arc<AppState>> {
    let identity = NodeIdentity::load_or_generate(&config.private_key_file)?;
    let node_id = if config.node_id.is_empty() {
        hex::encode(identity.public_key())
    } else {
        config.node_id.clone()
    };
    info!(%node_id, "node identity loaded");

    let store = open_store(&config.storage)?;
    let limiter = RateLimiter::new(
        config.rate_limit.enabled,
        config.rate_limit.requests_per_second,
        config.rate_limit.burst,
    );

    let state = Arc::new(AppState {
        node_id,
        identity: identity.clone(),
        router: OnionRouter::new(identity),
        store,
        directory: Directory::new(),
        limiter,
        outbound: Arc::new(OutboundClient::new(DEFAULT_DEADLINE)),
        config,
    });

    // The directory always knows about this node.
    state.directory.register(state.self_info());
    Ok(state)
}

/// Run the node until ctrl-c.
pub async fn run(config: NodeConfig) -> anyhow::Result<()> {
    let state = build_state(config)?;

    bootstrap(&state).await;
    spawn_sweeps(state.clone());

    let listen: SocketAddr = state.config.listen_address.parse()?;
    let listener = TcpListener::bind(listen).await?;
    info!(address = %listen, "listening");

    let app = http::router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await?;

    info!("node stopped");
    Ok(())
}

/// Contact the configured bootstrap peers: import their signed node sets
/// and announce ourselves. Best effort; an unreachable peer is skipped.
pub async fn bootstrap(state: &Arc<AppState>) {
    let self_info = state.self_info();
    for endpoint in &state.config.bootstrap_nodes {
        match state.outbound.fetch_bootstrap(endpoint).await {
            Ok(set) => {
                // The set is self-certifying: the issuer's record carries
                // the key the signature must verify under.
                let issuer = set
                    .nodes
                    .iter()
                    .find(|n| n.endpoint() == *endpoint)
                    .map(|n| n.public_key);
                let verified = issuer.map(|key| verify_bootstrap_set(&set, &key));
                if verified != Some(true) {
                    warn!(%endpoint, "bootstrap set failed verification, skipping");
                    continue;
                }
                info!(%endpoint, nodes = set.nodes.len(), "imported bootstrap set");
                for node in set.nodes {
                    if node.node_id != state.node_id {
                        state.directory.register(node);
                    }
                }
            }
            Err(e) => warn!(%endpoint, error = %e, "bootstrap fetch failed"),
        }
        if let Err(e) = state.outbound.register_with(endpoint, &self_info).await {
            warn!(%endpoint, error = %e, "self-registration failed");
        }
    }
}

/// Periodic reclamation: replay fingerprints, expired messages, idle
/// rate-limit buckets, stale node records.
pub fn spawn_sweeps(state: Arc<AppState>) {
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(REPLAY_SWEEP_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                let removed = state.router.sweep_replay();
                let marked = state.directory.mark_health(NODE_STALE_AFTER);
                info!(replay_removed = removed, nodes_marked = marked, "periodic sweep");
            }
        });
    }
    {
        let state = state.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(STORE_SWEEP_INTERVAL);
            tick.tick().await;
            loop {
                tick.tick().await;
                match state.store.sweep() {
                    Ok(removed) => info!(removed, "ttl sweep"),
                    Err(e) => warn!(error = %e, "ttl sweep failed"),
                }
            }
        });
    }
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(LIMITER_GC_INTERVAL);
        tick.tick().await;
        loop {
            tick.tick().await;
            let purged = state.limiter.gc(LIMITER_GC_INTERVAL);
            info!(purged, "rate-limit gc");
        }
    });
}
