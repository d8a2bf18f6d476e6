//! Negotiation channel: the room as seen from one side.
//!
//! Three continuous watches cover everything the partner can do to the
//! room: show up (root), publish a description (`offer`/`answer`), and
//! trickle candidates. Watch callbacks only enqueue into the session queue;
//! all reactions happen on the actor.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::protocol::{self, IceCandidate, Role, SessionDescription};
use crate::session::SessionEvent;
use crate::store::{RendezvousStore, WatchId};

pub struct NegotiationChannel {
    store: Arc<dyn RendezvousStore>,
    room_path: String,
    role: Role,
    events: mpsc::UnboundedSender<SessionEvent>,
    watches: Mutex<Vec<WatchId>>,
}

impl NegotiationChannel {
    /// Install the room watches and return. Deliveries arrive on `events`
    /// as the store reports them, starting with the state current at
    /// subscription time.
    pub async fn subscribe(
        store: Arc<dyn RendezvousStore>,
        rooms_path: &str,
        room_id: &str,
        role: Role,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let room_path = format!("{rooms_path}/{room_id}");
        let mut watches = Vec::with_capacity(3);

        // Room root: partner arrival, and the tombstone. An initial Null is
        // not a tombstone; the room may simply not be visible yet.
        let tx = events.clone();
        let seen = Arc::new(AtomicBool::new(false));
        let path = room_path.clone();
        watches.push(
            store
                .watch(
                    &room_path,
                    Arc::new(move |value: Value| {
                        if value.is_null() {
                            if seen.load(Ordering::SeqCst) {
                                debug!(path = %path, "room tombstone observed");
                                let _ = tx.send(SessionEvent::PartnerDisconnected);
                            }
                            return;
                        }
                        seen.store(true, Ordering::SeqCst);
                        if let Some(partner) = protocol::partner_in(&value, role) {
                            let _ = tx.send(SessionEvent::PartnerFound(partner));
                        }
                    }),
                )
                .await?,
        );

        // Partner's description: `answer` for the caller, `offer` for the
        // callee.
        let tx = events.clone();
        let path = format!("{room_path}/{}", role.remote_description_field());
        let watch_path = path.clone();
        watches.push(
            store
                .watch(
                    &path,
                    Arc::new(move |value: Value| {
                        match protocol::decode_description(&watch_path, &value) {
                            Ok(Some(sd)) => {
                                let _ = tx.send(SessionEvent::RemoteDescription(sd));
                            }
                            Ok(None) => {}
                            Err(err) => warn!(%err, "dropping malformed description"),
                        }
                    }),
                )
                .await?,
        );

        // Partner's candidate list. Children are deduplicated by push key,
        // so repeated fires over a growing list deliver each entry once, in
        // append order.
        let tx = events.clone();
        let path = format!("{room_path}/{}", role.remote_candidates_field());
        let watch_path = path.clone();
        let delivered: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        watches.push(
            store
                .watch(
                    &path,
                    Arc::new(move |value: Value| {
                        let Some(entries) = value.as_object() else {
                            return;
                        };
                        let mut delivered = delivered.lock().unwrap();
                        for (key, entry) in entries {
                            if !delivered.insert(key.clone()) {
                                continue;
                            }
                            match protocol::decode_candidate(&watch_path, entry) {
                                Ok(candidate) => {
                                    let _ = tx.send(SessionEvent::RemoteCandidate(candidate));
                                }
                                Err(err) => {
                                    warn!(%err, child = %key, "dropping malformed candidate")
                                }
                            }
                        }
                    }),
                )
                .await?,
        );

        debug!(path = %room_path, role = ?role, "subscribed to room");
        Ok(NegotiationChannel {
            store,
            room_path,
            role,
            events,
            watches: Mutex::new(watches),
        })
    }

    /// Publish the local offer at the room's `offer` field. Overwrites.
    pub async fn send_offer(&self, sd: &SessionDescription) -> Result<()> {
        self.publish_description(protocol::OFFER, sd).await
    }

    /// Publish the local answer at the room's `answer` field. Overwrites.
    pub async fn send_answer(&self, sd: &SessionDescription) -> Result<()> {
        self.publish_description(protocol::ANSWER, sd).await
    }

    async fn publish_description(&self, field: &str, sd: &SessionDescription) -> Result<()> {
        let path = format!("{}/{field}", self.room_path);
        self.store.set(&path, sd.to_value()).await?;
        debug!(path = %path, kind = ?sd.kind, "published description");
        Ok(())
    }

    /// Append a local candidate to this role's list. Each candidate gets
    /// its own push key; existing entries are never touched.
    pub async fn send_candidate(&self, candidate: &IceCandidate) -> Result<()> {
        let list_path = format!("{}/{}", self.room_path, self.role.local_candidates_field());
        let key = self.store.push_key(&list_path).await?;
        self.store
            .set(&format!("{list_path}/{key}"), candidate.to_value())
            .await?;
        debug!(path = %list_path, child = %key, "relayed local candidate");
        Ok(())
    }

    /// Delete the room and deliver the local disconnect. The partner's
    /// watch sees the tombstone; our own session gets the event directly
    /// instead of waiting on store propagation.
    pub async fn disconnect(&self) -> Result<()> {
        let result = self.store.delete(&self.room_path).await;
        let _ = self.events.send(SessionEvent::PartnerDisconnected);
        match result {
            Ok(()) => {
                info!(path = %self.room_path, "room removed");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove all watches. Runs before the room delete at teardown so our
    /// own tombstone never loops back as a partner disconnect.
    pub async fn shutdown(&self) {
        let watches = std::mem::take(&mut *self.watches.lock().unwrap());
        for id in watches {
            if let Err(err) = self.store.unwatch(id).await {
                debug!(%err, "unwatch failed during teardown");
            }
        }
    }
}
