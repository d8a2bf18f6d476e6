//! Rendezvous and session negotiation for anonymous one-to-one video chat.
//!
//! Two strangers meet through a shared rendezvous store: the first into a
//! room calls, the second answers, and the two exchange session
//! descriptions and trickle ICE candidates through the room until their
//! media transport connects. Deleting the room is the disconnect signal;
//! "next partner" is a teardown and a fresh search.
//!
//! Media itself stays outside: plug any transport in through
//! [`engine::MediaEngine`], or use the bundled [`peer::WebRtcEngine`]
//! (feature `webrtc-engine`). The store seam is [`store::RendezvousStore`];
//! [`store::MemoryStore`] serves single-process setups and tests.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod matcher;
pub mod protocol;
pub mod session;
pub mod store;

#[cfg(feature = "webrtc-engine")]
pub mod peer;

pub use config::ClientConfig;
pub use error::{Result, SignalingError};
pub use lifecycle::{ChatClient, ClientEvent};
pub use protocol::{IceCandidate, ParticipantId, Role, SessionDescription};
