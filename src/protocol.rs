//! Room wire contract.
//!
//! Field names here are shared with every other client implementation that
//! talks through the same store, so they are part of the interop surface and
//! must not drift. A room node looks like:
//!
//! ```json
//! {
//!   "callerId": "…",
//!   "calleeId": "…",
//!   "offer":  { "sdp": "…", "type": "offer" },
//!   "answer": { "sdp": "…", "type": "answer" },
//!   "callerCandidates": { "<push-key>": { "sdp": "…", "sdpMid": "…", "sdpMLineIndex": 0 } },
//!   "calleeCandidates": { "…": "…" }
//! }
//! ```

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Result, SignalingError};

pub const CALLER_ID: &str = "callerId";
pub const CALLEE_ID: &str = "calleeId";
pub const OFFER: &str = "offer";
pub const ANSWER: &str = "answer";
pub const CALLER_CANDIDATES: &str = "callerCandidates";
pub const CALLEE_CANDIDATES: &str = "calleeCandidates";

/// Identity of one client process. Generated locally at startup, never
/// persisted, reused across every rendezvous cycle of that process.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    pub fn generate() -> Self {
        ParticipantId(hex::encode(rand::rng().random::<[u8; 16]>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ParticipantId {
    fn from(id: String) -> Self {
        ParticipantId(id)
    }
}

impl From<&str> for ParticipantId {
    fn from(id: &str) -> Self {
        ParticipantId(id.to_string())
    }
}

/// Which side of the negotiation this client plays. Assigned by room
/// position: the room creator calls, the joiner answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Caller,
    Callee,
}

impl Role {
    /// Room field the partner's id shows up in.
    pub fn partner_id_field(self) -> &'static str {
        match self {
            Role::Caller => CALLEE_ID,
            Role::Callee => CALLER_ID,
        }
    }

    /// Description field the partner publishes and we watch.
    pub fn remote_description_field(self) -> &'static str {
        match self {
            Role::Caller => ANSWER,
            Role::Callee => OFFER,
        }
    }

    /// Candidate list the partner appends to and we watch.
    pub fn remote_candidates_field(self) -> &'static str {
        match self {
            Role::Caller => CALLEE_CANDIDATES,
            Role::Callee => CALLER_CANDIDATES,
        }
    }

    /// Candidate list we append our own candidates to.
    pub fn local_candidates_field(self) -> &'static str {
        match self {
            Role::Caller => CALLER_CANDIDATES,
            Role::Callee => CALLEE_CANDIDATES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl SdpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpKind::Offer => "offer",
            SdpKind::Answer => "answer",
        }
    }
}

/// A session description as it travels through the room. The SDP blob is
/// opaque here and round-trips verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: SdpKind,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        SessionDescription {
            sdp: sdp.into(),
            kind: SdpKind::Offer,
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        SessionDescription {
            sdp: sdp.into(),
            kind: SdpKind::Answer,
        }
    }

    /// Wire form, as stored under the room's `offer`/`answer` field.
    pub fn to_value(&self) -> Value {
        json!({ "sdp": self.sdp, "type": self.kind.as_str() })
    }
}

/// One trickle ICE candidate. All three fields are required on the wire;
/// readers skip entries missing any of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub sdp: String,
    #[serde(rename = "sdpMid")]
    pub sdp_mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub sdp_mline_index: u16,
}

impl IceCandidate {
    /// Wire form, as stored under a candidate list push key.
    pub fn to_value(&self) -> Value {
        json!({
            "sdp": self.sdp,
            "sdpMid": self.sdp_mid,
            "sdpMLineIndex": self.sdp_mline_index,
        })
    }
}

/// True when the room has a caller waiting and no callee yet.
pub fn room_is_open(room: &Value) -> bool {
    id_field(room, CALLER_ID).is_some() && id_field(room, CALLEE_ID).is_none()
}

/// Partner id visible in a room snapshot for `role`, if any.
pub fn partner_in(room: &Value, role: Role) -> Option<ParticipantId> {
    id_field(room, role.partner_id_field()).map(ParticipantId::from)
}

fn id_field<'a>(room: &'a Value, field: &str) -> Option<&'a str> {
    room.get(field)
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
}

/// Decode a description node. `Ok(None)` when the node is absent or only
/// partially written (the peer may still be publishing); `Err` when it is
/// present but unusable.
pub fn decode_description(path: &str, value: &Value) -> Result<Option<SessionDescription>> {
    if value.is_null() {
        return Ok(None);
    }
    let node = value
        .as_object()
        .ok_or_else(|| SignalingError::malformed(path, "description is not an object"))?;
    let (Some(sdp), Some(kind)) = (node.get("sdp"), node.get("type")) else {
        return Ok(None);
    };
    let sdp = sdp
        .as_str()
        .ok_or_else(|| SignalingError::malformed(path, "sdp is not a string"))?;
    let kind = match kind.as_str() {
        Some("offer") => SdpKind::Offer,
        Some("answer") => SdpKind::Answer,
        _ => return Err(SignalingError::malformed(path, "unknown description type")),
    };
    Ok(Some(SessionDescription {
        sdp: sdp.to_string(),
        kind,
    }))
}

/// Decode one candidate list entry. Entries missing any of the three
/// required fields are reported as malformed and skipped by the reader.
pub fn decode_candidate(path: &str, value: &Value) -> Result<IceCandidate> {
    let node = value
        .as_object()
        .ok_or_else(|| SignalingError::malformed(path, "candidate is not an object"))?;
    let sdp = node
        .get("sdp")
        .and_then(Value::as_str)
        .ok_or_else(|| SignalingError::malformed(path, "candidate missing sdp"))?;
    let sdp_mid = node
        .get("sdpMid")
        .and_then(Value::as_str)
        .ok_or_else(|| SignalingError::malformed(path, "candidate missing sdpMid"))?;
    let index = node
        .get("sdpMLineIndex")
        .and_then(Value::as_u64)
        .ok_or_else(|| SignalingError::malformed(path, "candidate missing sdpMLineIndex"))?;
    let sdp_mline_index = u16::try_from(index)
        .map_err(|_| SignalingError::malformed(path, "sdpMLineIndex out of range"))?;
    Ok(IceCandidate {
        sdp: sdp.to_string(),
        sdp_mid: sdp_mid.to_string(),
        sdp_mline_index,
    })
}
