//! Room matcher: one snapshot, one write.

use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::Result;
use crate::protocol::{self, ParticipantId, Role};
use crate::store::RendezvousStore;

/// Outcome of one rendezvous attempt.
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    pub role: Role,
    pub room_id: String,
}

/// Join the first open room as callee, or create a fresh room as caller.
/// Exactly one store write either way.
///
/// The scan runs on a single snapshot, so two clients working from the same
/// state can both join one room (last write wins on `calleeId`) or both
/// create rooms. Neither case is detected here; partner-loss handling and
/// user-driven re-match are the escape hatch.
pub async fn find_or_join_room(
    store: &dyn RendezvousStore,
    rooms_path: &str,
    local_id: &ParticipantId,
) -> Result<MatchOutcome> {
    let rooms = store.snapshot_once(rooms_path).await?;

    if let Some(rooms) = rooms.as_object() {
        for (room_id, room) in rooms {
            if !protocol::room_is_open(room) {
                debug!(%room_id, "room occupied, skipping");
                continue;
            }
            let path = format!("{rooms_path}/{room_id}/{}", protocol::CALLEE_ID);
            store
                .set(&path, Value::String(local_id.to_string()))
                .await?;
            info!(%room_id, "joined room as callee");
            return Ok(MatchOutcome {
                role: Role::Callee,
                room_id: room_id.clone(),
            });
        }
    }

    let room_id = store.push_key(rooms_path).await?;
    let mut room = Map::new();
    room.insert(
        protocol::CALLER_ID.to_string(),
        Value::String(local_id.to_string()),
    );
    store
        .set(&format!("{rooms_path}/{room_id}"), Value::Object(room))
        .await?;
    info!(%room_id, "created room as caller");
    Ok(MatchOutcome {
        role: Role::Caller,
        room_id,
    })
}
