//! Session lifecycle: rendezvous, run, tear down, repeat.
//!
//! One driver task per client owns the whole cycle. "Next partner" and
//! "partner disconnected" are the same teardown-and-restart path with
//! different triggers; "end" tears down without restarting. Teardown always
//! runs to completion before the next cycle begins: watches off, room
//! deleted, media released.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::channel::NegotiationChannel;
use crate::config::ClientConfig;
use crate::engine::{EngineEvent, MediaEngine};
use crate::matcher::{self, MatchOutcome};
use crate::protocol::{ParticipantId, Role};
use crate::session::{CloseReason, SessionEvent, SessionMachine};
use crate::store::RendezvousStore;

/// Lifecycle milestones, in the order an embedding UI wants them.
/// Serializable so embedders can forward them to a UI layer as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientEvent {
    /// Looking for a partner (fresh start, next, or after partner loss).
    Searching,
    /// Matched into a room.
    RoleAssigned { role: Role },
    /// Partner id observed; negotiation begins.
    PartnerFound { partner: ParticipantId },
    /// Media transport is up.
    Connected,
    /// Partner left; a new search follows.
    PartnerDisconnected,
    /// Transport died past recovery; a new search follows.
    ConnectionFailed,
    /// Engine or store refused negotiation; a new search follows.
    NegotiationFailed,
    /// Client stopped for good.
    Ended,
}

enum Command {
    NextPartner,
    End,
}

enum CycleEnd {
    Restart,
    Exit,
}

/// Handle to a running client. Dropping the handle does not stop the
/// driver; call [`ChatClient::end`] first.
pub struct ChatClient {
    local_id: ParticipantId,
    commands: mpsc::UnboundedSender<Command>,
    driver: tokio::task::JoinHandle<()>,
}

impl ChatClient {
    /// Spawn the client driver. It starts searching immediately; milestones
    /// stream on the returned receiver until the client ends.
    pub fn start(
        store: Arc<dyn RendezvousStore>,
        engine: Arc<dyn MediaEngine>,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let local_id = ParticipantId::generate();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();
        let driver = Driver {
            store,
            engine,
            config,
            local_id: local_id.clone(),
            events,
        };
        let task = tokio::spawn(driver.run(commands_rx));
        (
            ChatClient {
                local_id,
                commands,
                driver: task,
            },
            events_rx,
        )
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    /// Drop the current partner, if any, and search for a new one.
    pub fn next_partner(&self) {
        let _ = self.commands.send(Command::NextPartner);
    }

    /// End the current session and stop searching. Final; the driver winds
    /// down after teardown.
    pub fn end(&self) {
        let _ = self.commands.send(Command::End);
    }

    /// Wait for the driver to finish after [`ChatClient::end`].
    pub async fn join(self) {
        let _ = self.driver.await;
    }
}

struct Driver {
    store: Arc<dyn RendezvousStore>,
    engine: Arc<dyn MediaEngine>,
    config: ClientConfig,
    local_id: ParticipantId,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl Driver {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            match self.run_cycle(&mut commands).await {
                CycleEnd::Restart => continue,
                CycleEnd::Exit => break,
            }
        }
        self.emit(ClientEvent::Ended);
        info!(local_id = %self.local_id, "client ended");
    }

    async fn run_cycle(&self, commands: &mut mpsc::UnboundedReceiver<Command>) -> CycleEnd {
        // a command can land between cycles; honor it before matching
        match commands.try_recv() {
            Ok(Command::End) | Err(TryRecvError::Disconnected) => return CycleEnd::Exit,
            Ok(Command::NextPartner) | Err(TryRecvError::Empty) => {}
        }

        self.emit(ClientEvent::Searching);
        let Some(outcome) = self.rendezvous(commands).await else {
            return CycleEnd::Exit;
        };
        self.emit(ClientEvent::RoleAssigned { role: outcome.role });
        let room_path = format!("{}/{}", self.config.rooms_path, outcome.room_id);

        // every input for this session flows through one queue
        let (session_tx, session_rx) = mpsc::unbounded_channel();

        let channel = match NegotiationChannel::subscribe(
            self.store.clone(),
            &self.config.rooms_path,
            &outcome.room_id,
            outcome.role,
            session_tx.clone(),
        )
        .await
        {
            Ok(channel) => Arc::new(channel),
            Err(err) => {
                warn!(%err, "room subscribe failed, abandoning room");
                let _ = self.store.delete(&room_path).await;
                return CycleEnd::Restart;
            }
        };

        let (engine_tx, mut engine_rx) = mpsc::unbounded_channel();
        let media = match self.engine.open_session(engine_tx).await {
            Ok(media) => media,
            Err(err) => {
                warn!(%err, "media engine unavailable");
                self.emit(ClientEvent::NegotiationFailed);
                channel.shutdown().await;
                if let Err(err) = channel.disconnect().await {
                    debug!(%err, "room delete failed during teardown");
                }
                return CycleEnd::Restart;
            }
        };

        // engine events become session events
        let forward_tx = session_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = engine_rx.recv().await {
                let forwarded = match event {
                    EngineEvent::LocalCandidate(candidate) => {
                        SessionEvent::LocalCandidate(candidate)
                    }
                    EngineEvent::Connected => SessionEvent::TransportConnected,
                    EngineEvent::Failed => SessionEvent::TransportFailed,
                };
                if forward_tx.send(forwarded).is_err() {
                    break;
                }
            }
        });

        let machine = SessionMachine::new(
            outcome.role,
            outcome.room_id.clone(),
            media,
            channel.clone(),
            self.events.clone(),
        );
        let mut actor = tokio::spawn(machine.run(session_rx));

        enum CycleClose {
            Reason(CloseReason),
            UserNext,
            UserEnd,
        }

        let close = tokio::select! {
            result = &mut actor => {
                CycleClose::Reason(result.unwrap_or(CloseReason::Shutdown))
            }
            command = commands.recv() => {
                // stop the actor through its own queue, then wait it out
                let _ = session_tx.send(SessionEvent::Shutdown);
                let _ = (&mut actor).await;
                match command {
                    Some(Command::NextPartner) => CycleClose::UserNext,
                    Some(Command::End) | None => CycleClose::UserEnd,
                }
            }
        };

        // teardown, in order: watches off, then the room delete, with the
        // media session already released by the actor
        forwarder.abort();
        channel.shutdown().await;
        if let Err(err) = channel.disconnect().await {
            debug!(%err, "room delete failed during teardown");
        }

        match close {
            CycleClose::Reason(CloseReason::PartnerLost) => {
                self.emit(ClientEvent::PartnerDisconnected);
                CycleEnd::Restart
            }
            CycleClose::Reason(CloseReason::TransportFailed) => {
                self.emit(ClientEvent::ConnectionFailed);
                CycleEnd::Restart
            }
            CycleClose::Reason(CloseReason::NegotiationFailed) => {
                self.emit(ClientEvent::NegotiationFailed);
                CycleEnd::Restart
            }
            CycleClose::Reason(CloseReason::Shutdown) | CycleClose::UserNext => CycleEnd::Restart,
            CycleClose::UserEnd => CycleEnd::Exit,
        }
    }

    /// Match with backoff. `None` when an end command arrives first.
    async fn rendezvous(
        &self,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Option<MatchOutcome> {
        let mut delay = self.config.backoff.initial;
        loop {
            match matcher::find_or_join_room(
                self.store.as_ref(),
                &self.config.rooms_path,
                &self.local_id,
            )
            .await
            {
                Ok(outcome) => return Some(outcome),
                Err(err) => {
                    warn!(%err, delay_ms = delay.as_millis() as u64, "rendezvous failed, retrying");
                }
            }
            tokio::select! {
                _ = sleep(delay) => delay = self.config.backoff.next(delay),
                command = commands.recv() => match command {
                    Some(Command::NextPartner) => {}
                    Some(Command::End) | None => return None,
                },
            }
        }
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
