//! HTTP dispatcher
//!
//! Binds the transport surface to the core components and maps error
//! kinds to status codes. Crypto-stage failures share one opaque 400 body
//! so a sender cannot learn which pipeline stage rejected its packet.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use ghosttalk_core::{GhostTalkError, Message, NodeInfo, PayloadFrame, SessionId};
use ghosttalk_directory::issue_bootstrap_set;
use ghosttalk_router::Decision;
use ghosttalk_storage::MessageStore;

use crate::rate_limit::client_source;
use crate::state::{unix_millis, AppState};

/// Error wrapper carrying the HTTP status mapping.
pub struct ApiError(GhostTalkError);

impl From<GhostTalkError> for ApiError {
    fn from(e: GhostTalkError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let e = self.0;

        // One body for every crypto-stage failure: don't tell the sender
        // which check rejected the packet.
        if e.is_crypto_failure() {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "bad packet" })))
                .into_response();
        }

        match e {
            GhostTalkError::InvalidPacket(_)
            | GhostTalkError::ReplayDetected
            | GhostTalkError::PacketExpired
            | GhostTalkError::Expired => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() })))
                    .into_response()
            }
            GhostTalkError::Duplicate => {
                (StatusCode::CONFLICT, Json(json!({ "error": e.to_string() })))
                    .into_response()
            }
            GhostTalkError::QuotaExceeded => (
                StatusCode::INSUFFICIENT_STORAGE,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
            GhostTalkError::InsufficientReplicas { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                [("retry-after", "5")],
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
            GhostTalkError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                [("retry-after", "1")],
                Json(json!({ "error": e.to_string() })),
            )
                .into_response(),
            GhostTalkError::UpstreamTimeout => {
                (StatusCode::GATEWAY_TIMEOUT, Json(json!({ "error": e.to_string() })))
                    .into_response()
            }
            GhostTalkError::UpstreamUnavailable(_) => {
                (StatusCode::BAD_GATEWAY, Json(json!({ "error": e.to_string() })))
                    .into_response()
            }
            // Internal detail never leaves the node.
            other => {
                debug!(error = %other, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": "internal error" })))
                    .into_response()
            }
        }
    }
}

/// Build the full surface.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/onion", post(onion_ingest))
        .route("/v1/swarm/messages", post(swarm_store))
        .route("/v1/swarm/messages/:recipient_id", get(swarm_retrieve))
        .route("/v1/swarm/messages/:recipient_id/:id", delete(swarm_delete))
        .route("/v1/swarm/replicate", post(swarm_replicate))
        .route("/v1/nodes/bootstrap", get(nodes_bootstrap))
        .route("/v1/nodes/swarm/:recipient_id", get(nodes_swarm))
        .route("/v1/nodes/register", post(nodes_register))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(middleware::from_fn_with_state(state.clone(), throttle))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Rate-limit middleware over the whole surface.
async fn throttle(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let source = client_source(&headers, peer);
    if !state.limiter.allow(&source) {
        debug!(%source, "rate limited");
        return Err(GhostTalkError::RateLimited.into());
    }
    Ok(next.run(request).await)
}

/// POST /v1/onion: one hop of unwrap, then forward or deliver.
/// 200 delivered, 202 forwarded.
async fn onion_ingest(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    match state.router.process(&body)? {
        Decision::Forward { next_address, next_packet, delay } => {
            tokio::time::sleep(delay).await;
            state
                .outbound
                .forward_packet(next_address, next_packet.to_vec())
                .await?;
            Ok(StatusCode::ACCEPTED)
        }
        Decision::Deliver { plaintext, delay } => {
            tokio::time::sleep(delay).await;
            let frame = PayloadFrame::decode(&plaintext)?;
            let message = message_from_frame(&state, frame);
            store_with_replication(&state, message).await?;
            Ok(StatusCode::OK)
        }
    }
}

/// A delivered payload frame becomes a stored message. The client clock is
/// clamped so `timestamp ≤ now` holds even for skewed senders.
fn message_from_frame(state: &AppState, frame: PayloadFrame) -> Message {
    let now = unix_millis();
    let timestamp = frame.timestamp_ms.min(now);
    Message {
        id: frame.id,
        recipient_id: frame.recipient,
        timestamp,
        ttl_deadline: timestamp + state.config.swarm.ttl_ms(),
        message_type: frame.message_type,
        ciphertext: frame.content,
        replica_count: 1,
    }
}

/// Store locally as the primary, then push replicas until the quorum is
/// met. The quorum counts the local store and is clamped to the reachable
/// swarm size so a small network can still make progress.
async fn store_with_replication(state: &Arc<AppState>, message: Message) -> Result<(), ApiError> {
    state.store.store(message.clone())?;

    let k = state.config.swarm.replication_factor;
    let peers: Vec<NodeInfo> = state
        .directory
        .swarm_for(&message.recipient_id, k)
        .into_iter()
        .filter(|n| n.node_id != state.node_id)
        .take(k.saturating_sub(1))
        .collect();

    let required = state.config.swarm.quorum().min(peers.len() + 1);
    if required <= 1 {
        return Ok(());
    }

    let acked = state
        .outbound
        .replicate(&peers, &message, required - 1)
        .await;
    if acked + 1 < required {
        return Err(GhostTalkError::InsufficientReplicas { required, acked: acked + 1 }.into());
    }
    Ok(())
}

/// POST /v1/swarm/messages: client-facing store with replication.
async fn swarm_store(
    State(state): State<Arc<AppState>>,
    Json(mut message): Json<Message>,
) -> Result<impl IntoResponse, ApiError> {
    let now = unix_millis();
    if message.timestamp > now {
        message.timestamp = now;
    }
    if message.ttl_deadline == 0 {
        message.ttl_deadline = message.timestamp + state.config.swarm.ttl_ms();
    }
    message.replica_count = 1;

    store_with_replication(&state, message).await?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "stored" }))))
}

/// POST /v1/swarm/replicate: replica write from a peer; no fan-out.
async fn swarm_replicate(
    State(state): State<Arc<AppState>>,
    Json(message): Json<Message>,
) -> Result<impl IntoResponse, ApiError> {
    state.store.store(message)?;
    Ok((StatusCode::CREATED, Json(json!({ "status": "stored" }))))
}

/// GET /v1/swarm/messages/{recipient_id}
async fn swarm_retrieve(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let recipient = parse_session_id(&recipient_id)?;
    Ok(Json(state.store.retrieve(&recipient)?))
}

/// DELETE /v1/swarm/messages/{recipient_id}/{id}. Idempotent.
async fn swarm_delete(
    State(state): State<Arc<AppState>>,
    Path((recipient_id, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let recipient = parse_session_id(&recipient_id)?;
    let id = parse_session_id(&id)?;
    let removed = state.store.delete(&recipient, &id)?;
    debug!(removed, "swarm delete");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/nodes/bootstrap: signed snapshot of the healthy node set.
async fn nodes_bootstrap(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let set = issue_bootstrap_set(&state.identity, state.directory.healthy_nodes());
    Json(set)
}

/// GET /v1/nodes/swarm/{recipient_id}
async fn nodes_swarm(
    State(state): State<Arc<AppState>>,
    Path(recipient_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let recipient = parse_session_id(&recipient_id)?;
    let nodes = state
        .directory
        .swarm_for(&recipient, state.config.swarm.replication_factor);
    Ok(Json(json!({ "session_id": recipient_id, "nodes": nodes })))
}

/// POST /v1/nodes/register
async fn nodes_register(
    State(state): State<Arc<AppState>>,
    Json(info): Json<NodeInfo>,
) -> Result<impl IntoResponse, ApiError> {
    if info.node_id.is_empty() {
        return Err(GhostTalkError::InvalidPacket("empty node_id".into()).into());
    }
    info!(node_id = %info.node_id, "register request");
    state.directory.register(info);
    Ok((StatusCode::CREATED, Json(json!({ "status": "registered" }))))
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /metrics: plain-text counters when enabled.
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    if !state.config.metrics.enabled {
        return StatusCode::NOT_FOUND.into_response();
    }
    let stats = state.router.stats().snapshot();
    let usage = state.store.usage();
    let body = format!(
        "ghosttalk_packets_processed {}\n\
         ghosttalk_packets_forwarded {}\n\
         ghosttalk_packets_delivered {}\n\
         ghosttalk_packets_dropped {}\n\
         ghosttalk_packets_replayed {}\n\
         ghosttalk_store_messages {}\n\
         ghosttalk_store_bytes {}\n\
         ghosttalk_directory_nodes {}\n\
         ghosttalk_ratelimit_sources {}\n",
        stats.processed,
        stats.forwarded,
        stats.delivered,
        stats.dropped,
        stats.replays,
        usage.messages,
        usage.bytes,
        state.directory.len(),
        state.limiter.tracked_sources(),
    );
    body.into_response()
}

fn parse_session_id(text: &str) -> Result<SessionId, ApiError> {
    let bytes = hex::decode(text)
        .map_err(|_| GhostTalkError::InvalidPacket("malformed hex id".into()))?;
    bytes
        .try_into()
        .map_err(|_| GhostTalkError::InvalidPacket("id must be 32 bytes".into()).into())
}
