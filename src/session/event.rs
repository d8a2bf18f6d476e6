use crate::protocol::{IceCandidate, ParticipantId, SessionDescription};

/// One queued input for the session actor.
///
/// Store watches, the media engine, and the lifecycle all funnel through a
/// single unbounded queue per session; the actor consumes it sequentially,
/// which is the only serialization the session state gets or needs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Partner id observed in the room.
    PartnerFound(ParticipantId),
    /// The partner's session description arrived.
    RemoteDescription(SessionDescription),
    /// One partner candidate arrived.
    RemoteCandidate(IceCandidate),
    /// The engine gathered a local candidate to relay.
    LocalCandidate(IceCandidate),
    /// The engine reports the media transport is up.
    TransportConnected,
    /// The engine reports the transport failed past recovery.
    TransportFailed,
    /// Room tombstone observed, or local disconnect.
    PartnerDisconnected,
    /// Lifecycle-driven stop.
    Shutdown,
}
