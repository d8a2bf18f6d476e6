//! Media engine seam.
//!
//! The negotiation core never touches capture, rendering, or transport.
//! It drives whichever engine is plugged in through [`MediaSession`] and
//! reacts to the events the engine raises back. Descriptions and candidates
//! pass through as opaque artifacts.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::protocol::{IceCandidate, SessionDescription};

#[derive(Debug, Error)]
pub enum EngineError {
    /// A session could not be opened.
    #[error("media session unavailable: {0}")]
    Unavailable(String),
    /// A description could not be created or applied.
    #[error("description rejected: {0}")]
    Description(String),
    /// A remote candidate could not be applied.
    #[error("candidate rejected: {0}")]
    Candidate(String),
}

/// Events a media session raises while negotiating and running. Delivered
/// on the sink handed to [`MediaEngine::open_session`]; senders never
/// block.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Locally gathered trickle candidate, ready to relay to the partner.
    LocalCandidate(IceCandidate),
    /// The media transport reached connected state.
    Connected,
    /// The media transport failed past recovery.
    Failed,
}

#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Open a fresh session. One session per pairing; closed sessions are
    /// never reused.
    async fn open_session(
        &self,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn MediaSession>, EngineError>;
}

/// One peer-to-peer media session being negotiated.
#[async_trait]
pub trait MediaSession: Send + Sync {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError>;

    async fn create_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn set_local_description(&self, sd: SessionDescription) -> Result<(), EngineError>;

    async fn set_remote_description(&self, sd: SessionDescription) -> Result<(), EngineError>;

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;

    /// Release the session. Idempotent; never fails.
    async fn close(&self);
}
