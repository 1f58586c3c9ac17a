use thiserror::Error;

#[derive(Error, Debug)]
pub enum GhostTalkError {
    #[error("Invalid packet: {0}")]
    InvalidPacket(String),

    #[error("Replay detected")]
    ReplayDetected,

    #[error("Header HMAC verification failed")]
    HmacFailed,

    #[error("Routing slot decryption failed")]
    RoutingDecryptFailed,

    #[error("Payload decryption failed")]
    PayloadDecryptFailed,

    #[error("Packet expired")]
    PacketExpired,

    #[error("Duplicate message")]
    Duplicate,

    #[error("Message already expired on ingest")]
    Expired,

    #[error("Storage quota exceeded")]
    QuotaExceeded,

    #[error("Insufficient replicas: need {required}, got {acked}")]
    InsufficientReplicas { required: usize, acked: usize },

    #[error("Rate limited")]
    RateLimited,

    #[error("Upstream timeout")]
    UpstreamTimeout,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Key error: {0}")]
    Key(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, GhostTalkError>;

impl GhostTalkError {
    /// Whether the error is one of the crypto pipeline stages whose
    /// identity must not be leaked to the client.
    pub fn is_crypto_failure(&self) -> bool {
        matches!(
            self,
            Self::HmacFailed | Self::RoutingDecryptFailed | Self::PayloadDecryptFailed
        )
    }
}
