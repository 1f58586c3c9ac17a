//! Outbound inter-node client: packet forwarding and replica writes.
//!
//! Both paths carry the inbound request's deadline. Forwarding failures
//! surface to the caller (clients retry through a different circuit);
//! replica writes only count toward the quorum.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use ghosttalk_core::{GhostTalkError, Message, NodeInfo, Result};

/// Default slice of the request deadline spent on one outbound call.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(10);

pub struct OutboundClient {
    client: reqwest::Client,
}

impl OutboundClient {
    pub fn new(deadline: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(deadline)
            .build()
            .expect("reqwest client construction cannot fail");
        Self { client }
    }

    /// Push a re-wrapped onion packet to the next hop.
    pub async fn forward_packet(&self, next_hop: SocketAddr, packet: Vec<u8>) -> Result<()> {
        let url = format!("http://{next_hop}/v1/onion");
        let response = self
            .client
            .post(&url)
            .header("content-type", "application/octet-stream")
            .body(packet)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GhostTalkError::UpstreamTimeout
                } else {
                    GhostTalkError::UpstreamUnavailable(next_hop.to_string())
                }
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(GhostTalkError::UpstreamUnavailable(format!(
                "{next_hop} returned {}",
                response.status()
            )))
        }
    }

    /// Write `msg` to `peers`, waiting only until `needed` acks are in.
    /// Returns the ack count observed by then; stragglers keep running and
    /// may still land their replica afterwards. A duplicate response
    /// counts as an ack, since replica writes are idempotent by
    /// `(recipient, id)`.
    pub async fn replicate(&self, peers: &[NodeInfo], msg: &Message, needed: usize) -> usize {
        if peers.is_empty() || needed == 0 {
            return 0;
        }
        let (tx, mut rx) = mpsc::channel::<bool>(peers.len());

        for peer in peers {
            // reqwest clients are a cheap handle over one connection pool
            let client = self.client.clone();
            let endpoint = peer.endpoint();
            let node_id = peer.node_id.clone();
            let msg = msg.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let ok = replicate_one(&client, &endpoint, &msg).await;
                if !ok {
                    warn!(peer = %node_id, "replica write failed");
                }
                // Receiver may be gone once the quorum is met
                let _ = tx.send(ok).await;
            });
        }
        drop(tx);

        let mut acked = 0usize;
        while let Some(ok) = rx.recv().await {
            if ok {
                acked += 1;
                if acked >= needed {
                    break;
                }
            }
        }
        acked
    }

    /// Fetch a peer's bootstrap set during startup.
    pub async fn fetch_bootstrap(&self, endpoint: &str) -> Result<ghosttalk_core::SignedSet> {
        let url = format!("http://{endpoint}/v1/nodes/bootstrap");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GhostTalkError::UpstreamUnavailable(format!("{endpoint}: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| GhostTalkError::UpstreamUnavailable(format!("{endpoint}: {e}")))
    }

    /// Register this node with a peer.
    pub async fn register_with(&self, endpoint: &str, info: &NodeInfo) -> Result<()> {
        let url = format!("http://{endpoint}/v1/nodes/register");
        self.client
            .post(&url)
            .json(info)
            .send()
            .await
            .map_err(|e| GhostTalkError::UpstreamUnavailable(format!("{endpoint}: {e}")))?;
        Ok(())
    }
}

async fn replicate_one(client: &reqwest::Client, endpoint: &str, msg: &Message) -> bool {
    let url = format!("http://{endpoint}/v1/swarm/replicate");
    match client.post(&url).json(msg).send().await {
        Ok(response) => {
            let status = response.status();
            // 409 means the replica already holds it, which is a success
            // for quorum purposes.
            status.is_success() || status == reqwest::StatusCode::CONFLICT
        }
        Err(e) => {
            debug!(endpoint, error = %e, "replica write error");
            false
        }
    }
}
