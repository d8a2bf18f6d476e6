use crate::protocol::{IceCandidate, ParticipantId, Role};

/// Where one pairing currently stands. Idle between pairings is represented
/// by there being no [`NegotiationSession`] at all; the struct only exists
/// once a role is assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Matched into a room, actor not yet consuming.
    RoleAssigned,
    /// Caller waiting for a callee to show up.
    AwaitingPartner,
    /// Callee waiting for the caller's offer.
    AwaitingOffer,
    /// Descriptions and candidates in flight.
    Negotiating,
    /// Media transport is up.
    Connected,
    Closed,
}

/// Mutable state for one pairing. Created fresh each cycle, owned by the
/// session actor alone, dropped on close.
#[derive(Debug)]
pub struct NegotiationSession {
    pub role: Role,
    pub room_id: String,
    pub phase: Phase,
    pub partner: Option<ParticipantId>,
    /// Offer once-guard: the caller offers at most once per session, no
    /// matter how often the partner notification repeats.
    pub has_sent_offer: bool,
    /// Set once the remote description was applied; gates candidate
    /// forwarding.
    pub remote_applied: bool,
    /// Remote candidates that arrived before the remote description.
    pub pending_candidates: Vec<IceCandidate>,
}

impl NegotiationSession {
    pub fn new(role: Role, room_id: String) -> Self {
        NegotiationSession {
            role,
            room_id,
            phase: Phase::RoleAssigned,
            partner: None,
            has_sent_offer: false,
            remote_applied: false,
            pending_candidates: Vec::new(),
        }
    }

    /// Enter the waiting phase for this role.
    pub fn begin(&mut self) {
        if self.phase == Phase::RoleAssigned {
            self.phase = match self.role {
                Role::Caller => Phase::AwaitingPartner,
                Role::Callee => Phase::AwaitingOffer,
            };
        }
    }

    pub fn close(&mut self) {
        self.phase = Phase::Closed;
    }

    /// Drain the buffered remote candidates for replay.
    pub fn take_pending(&mut self) -> Vec<IceCandidate> {
        std::mem::take(&mut self.pending_candidates)
    }
}
