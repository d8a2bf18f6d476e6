use crate::engine::EngineError;
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, SignalingError>;

/// Failures surfaced by the rendezvous and negotiation layers.
///
/// None of these are fatal to the client: store trouble is retried with
/// backoff, engine trouble tears the session down and re-matches, and
/// malformed room data is logged and dropped where it is read.
#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("rendezvous store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("media engine rejected negotiation: {0}")]
    NegotiationRejected(#[from] EngineError),

    #[error("malformed message at {path}: {reason}")]
    MalformedMessage { path: String, reason: String },
}

impl SignalingError {
    pub(crate) fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        SignalingError::MalformedMessage {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
