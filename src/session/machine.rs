use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::NegotiationChannel;
use crate::engine::MediaSession;
use crate::error::SignalingError;
use crate::lifecycle::ClientEvent;
use crate::protocol::{IceCandidate, ParticipantId, Role, SdpKind, SessionDescription};
use crate::session::{NegotiationSession, Phase, SessionEvent};

/// Why the session actor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Partner left: tombstone or local disconnect.
    PartnerLost,
    /// Media transport died past its recovery window.
    TransportFailed,
    /// The engine or the store refused a negotiation step.
    NegotiationFailed,
    /// Lifecycle asked us to stop.
    Shutdown,
}

/// Drives one pairing: reacts to queued events, calls the media session,
/// publishes through the channel. All session state lives here, on one
/// task.
pub struct SessionMachine {
    session: NegotiationSession,
    media: Box<dyn MediaSession>,
    channel: Arc<NegotiationChannel>,
    events: mpsc::UnboundedSender<ClientEvent>,
}

impl SessionMachine {
    pub fn new(
        role: Role,
        room_id: String,
        media: Box<dyn MediaSession>,
        channel: Arc<NegotiationChannel>,
        events: mpsc::UnboundedSender<ClientEvent>,
    ) -> Self {
        SessionMachine {
            session: NegotiationSession::new(role, room_id),
            media,
            channel,
            events,
        }
    }

    /// Consume the queue until the session closes, then release the media
    /// session. Events still queued after close are dropped unread.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<SessionEvent>) -> CloseReason {
        self.session.begin();
        debug!(
            room_id = %self.session.room_id,
            role = ?self.session.role,
            "session actor started"
        );
        let reason = loop {
            let Some(event) = events.recv().await else {
                break CloseReason::Shutdown;
            };
            if let Some(reason) = self.handle(event).await {
                break reason;
            }
        };
        self.session.close();
        self.media.close().await;
        info!(room_id = %self.session.room_id, reason = ?reason, "session closed");
        reason
    }

    async fn handle(&mut self, event: SessionEvent) -> Option<CloseReason> {
        match event {
            SessionEvent::PartnerFound(partner) => self.on_partner_found(partner).await,
            SessionEvent::RemoteDescription(sd) => self.on_remote_description(sd).await,
            SessionEvent::RemoteCandidate(candidate) => self.on_remote_candidate(candidate).await,
            SessionEvent::LocalCandidate(candidate) => self.on_local_candidate(candidate).await,
            SessionEvent::TransportConnected => self.on_transport_connected(),
            SessionEvent::TransportFailed => {
                warn!("media transport failed");
                Some(CloseReason::TransportFailed)
            }
            SessionEvent::PartnerDisconnected => {
                info!("partner disconnected");
                Some(CloseReason::PartnerLost)
            }
            SessionEvent::Shutdown => Some(CloseReason::Shutdown),
        }
    }

    async fn on_partner_found(&mut self, partner: ParticipantId) -> Option<CloseReason> {
        match &self.session.partner {
            None => {
                info!(partner = %partner, "partner found");
                self.session.partner = Some(partner.clone());
                self.emit(ClientEvent::PartnerFound { partner });
            }
            Some(current) if *current != partner => {
                // a join race overwrote the slot; we keep the first id
                warn!(was = %current, now = %partner, "partner id changed mid-session");
            }
            Some(_) => {}
        }
        if self.session.role == Role::Caller {
            if let Err(err) = self.publish_offer().await {
                warn!(%err, "offer exchange failed");
                return Some(CloseReason::NegotiationFailed);
            }
        }
        None
    }

    async fn publish_offer(&mut self) -> Result<(), SignalingError> {
        if self.session.has_sent_offer {
            return Ok(());
        }
        let offer = self.media.create_offer().await?;
        self.media.set_local_description(offer.clone()).await?;
        self.channel.send_offer(&offer).await?;
        self.session.has_sent_offer = true;
        self.session.phase = Phase::Negotiating;
        debug!("offer published");
        Ok(())
    }

    async fn on_remote_description(&mut self, sd: SessionDescription) -> Option<CloseReason> {
        if self.session.remote_applied {
            debug!("remote description already applied, ignoring repeat");
            return None;
        }
        debug!(kind = ?sd.kind, "remote description received");
        if let Err(err) = self.apply_remote_description(sd).await {
            warn!(%err, "remote description exchange failed");
            return Some(CloseReason::NegotiationFailed);
        }
        None
    }

    async fn apply_remote_description(&mut self, sd: SessionDescription) -> Result<(), SignalingError> {
        self.media.set_remote_description(sd.clone()).await?;
        self.session.remote_applied = true;
        self.session.phase = Phase::Negotiating;
        self.flush_pending_candidates().await;
        // an offer demands an answer; an answer completes the exchange, and
        // Connected comes from the transport, not from here
        if sd.kind == SdpKind::Offer {
            self.publish_answer().await?;
        }
        Ok(())
    }

    async fn publish_answer(&mut self) -> Result<(), SignalingError> {
        let answer = self.media.create_answer().await?;
        self.media.set_local_description(answer.clone()).await?;
        self.channel.send_answer(&answer).await?;
        debug!("answer published");
        Ok(())
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) -> Option<CloseReason> {
        if !self.session.remote_applied {
            debug!("buffering candidate until the remote description lands");
            self.session.pending_candidates.push(candidate);
            return None;
        }
        if let Err(err) = self.media.add_remote_candidate(candidate).await {
            warn!(%err, "remote candidate rejected");
        }
        None
    }

    /// Replay candidates that arrived before the remote description.
    async fn flush_pending_candidates(&mut self) {
        let pending = self.session.take_pending();
        if pending.is_empty() {
            return;
        }
        debug!(count = pending.len(), "applying buffered candidates");
        for candidate in pending {
            if let Err(err) = self.media.add_remote_candidate(candidate).await {
                warn!(%err, "buffered candidate rejected");
            }
        }
    }

    async fn on_local_candidate(&mut self, candidate: IceCandidate) -> Option<CloseReason> {
        if let Err(err) = self.channel.send_candidate(&candidate).await {
            // relay failures are not fatal; the exchange can survive a
            // dropped candidate
            warn!(%err, "failed to relay local candidate");
        }
        None
    }

    fn on_transport_connected(&mut self) -> Option<CloseReason> {
        if self.session.phase != Phase::Connected {
            self.session.phase = Phase::Connected;
            info!(room_id = %self.session.room_id, "media transport connected");
            self.emit(ClientEvent::Connected);
        }
        None
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }
}
