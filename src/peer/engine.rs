//! [`MediaEngine`] over the `webrtc` crate.
//!
//! Signaling-only: the peer connection carries a data channel so ICE has
//! something to gather for even before media tracks attach. Transport state
//! is reported through [`EngineEvent`], with a grace period between
//! `Disconnected`/`Failed` and giving up, since ICE often recovers on its
//! own within a few seconds.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, warn};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use crate::engine::{EngineError, EngineEvent, MediaEngine, MediaSession};
use crate::protocol::{IceCandidate, SdpKind, SessionDescription};

#[derive(Debug, Clone)]
pub struct WebRtcEngineConfig {
    pub stun_servers: Vec<String>,
    /// How long a `Disconnected`/`Failed` transport may flap before the
    /// session reports failure.
    pub grace_period: Duration,
}

impl Default for WebRtcEngineConfig {
    fn default() -> Self {
        WebRtcEngineConfig {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".into(),
                "stun:stun1.l.google.com:19302".into(),
            ],
            grace_period: Duration::from_secs(10),
        }
    }
}

pub struct WebRtcEngine {
    config: WebRtcEngineConfig,
}

impl WebRtcEngine {
    pub fn new(config: WebRtcEngineConfig) -> Self {
        WebRtcEngine { config }
    }

    fn rtc_config(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: vec![RTCIceServer {
                urls: self.config.stun_servers.clone(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }
}

#[async_trait]
impl MediaEngine for WebRtcEngine {
    async fn open_session(
        &self,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn MediaSession>, EngineError> {
        let api = APIBuilder::new().build();
        let pc = Arc::new(
            api.new_peer_connection(self.rtc_config())
                .await
                .map_err(|e| EngineError::Unavailable(e.to_string()))?,
        );

        // keeps ICE gathering alive with no media attached
        pc.create_data_channel("peermatch", Some(RTCDataChannelInit::default()))
            .await
            .map_err(|e| EngineError::Unavailable(e.to_string()))?;

        let tx = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            // None marks the end of gathering
            if let Some(candidate) = candidate {
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = tx.send(EngineEvent::LocalCandidate(IceCandidate {
                            sdp: init.candidate,
                            sdp_mid: init.sdp_mid.unwrap_or_default(),
                            sdp_mline_index: init.sdp_mline_index.unwrap_or(0),
                        }));
                    }
                    Err(err) => warn!(%err, "failed to serialize local candidate"),
                }
            }
            Box::pin(async {})
        }));

        let grace = self.config.grace_period;
        let fail_timer: Arc<Mutex<Option<JoinHandle<()>>>> = Arc::new(Mutex::new(None));
        let timer_slot = fail_timer.clone();
        let pc_state = pc.clone();
        let tx = events;
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            debug!(state = ?state, "peer connection state changed");
            match state {
                RTCPeerConnectionState::Connected => {
                    // recovered: cancel a pending failure report
                    if let Some(timer) = timer_slot.lock().unwrap().take() {
                        timer.abort();
                    }
                    let _ = tx.send(EngineEvent::Connected);
                }
                RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                    let mut slot = timer_slot.lock().unwrap();
                    if slot.is_some() {
                        return Box::pin(async {});
                    }
                    let pc = pc_state.clone();
                    let tx = tx.clone();
                    *slot = Some(tokio::spawn(async move {
                        debug!(seconds = grace.as_secs(), "grace period started");
                        sleep(grace).await;
                        if pc.connection_state() != RTCPeerConnectionState::Connected {
                            let _ = tx.send(EngineEvent::Failed);
                        } else {
                            debug!("transport recovered during grace period");
                        }
                    }));
                }
                RTCPeerConnectionState::Closed => {
                    if let Some(timer) = timer_slot.lock().unwrap().take() {
                        timer.abort();
                    }
                }
                _ => {}
            }
            Box::pin(async {})
        }));

        Ok(Box::new(WebRtcSession { pc, fail_timer }))
    }
}

struct WebRtcSession {
    pc: Arc<RTCPeerConnection>,
    fail_timer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl WebRtcSession {
    fn to_rtc(sd: &SessionDescription) -> Result<RTCSessionDescription, EngineError> {
        let result = match sd.kind {
            SdpKind::Offer => RTCSessionDescription::offer(sd.sdp.clone()),
            SdpKind::Answer => RTCSessionDescription::answer(sd.sdp.clone()),
        };
        result.map_err(|e| EngineError::Description(e.to_string()))
    }
}

#[async_trait]
impl MediaSession for WebRtcSession {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(&self, sd: SessionDescription) -> Result<(), EngineError> {
        self.pc
            .set_local_description(Self::to_rtc(&sd)?)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))
    }

    async fn set_remote_description(&self, sd: SessionDescription) -> Result<(), EngineError> {
        self.pc
            .set_remote_description(Self::to_rtc(&sd)?)
            .await
            .map_err(|e| EngineError::Description(e.to_string()))
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.sdp,
            sdp_mid: Some(candidate.sdp_mid),
            sdp_mline_index: Some(candidate.sdp_mline_index),
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| EngineError::Candidate(e.to_string()))
    }

    async fn close(&self) {
        if let Some(timer) = self.fail_timer.lock().unwrap().take() {
            timer.abort();
        }
        if let Err(err) = self.pc.close().await {
            debug!(%err, "peer connection close failed");
        }
    }
}
