//! Shared fixtures: a scripted media engine with per-session probes, store
//! wrappers for outage and stale-snapshot scenarios, and event-stream
//! helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use peermatch::engine::{EngineError, EngineEvent, MediaEngine, MediaSession};
use peermatch::lifecycle::ClientEvent;
use peermatch::protocol::{IceCandidate, SessionDescription};
use peermatch::store::{RendezvousStore, StoreError, WatchCallback, WatchId};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn candidate(tag: &str) -> IceCandidate {
    IceCandidate {
        sdp: format!("candidate:{tag} 1 udp 2122260223 192.168.0.2 50000 typ host"),
        sdp_mid: "0".into(),
        sdp_mline_index: 0,
    }
}

// ---- scripted media engine ----

/// Media engine that negotiates with canned SDP and exposes a probe per
/// opened session for inspection and event injection.
pub struct ScriptedEngine {
    sessions: Mutex<Vec<Arc<SessionProbe>>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        ScriptedEngine {
            sessions: Mutex::new(Vec::new()),
        }
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// Probe for the `index`-th opened session, waiting for it to open.
    pub async fn session(&self, index: usize) -> Arc<SessionProbe> {
        for _ in 0..200 {
            if let Some(probe) = self.sessions.lock().unwrap().get(index).cloned() {
                return probe;
            }
            sleep(Duration::from_millis(10)).await;
        }
        panic!("session {index} never opened");
    }
}

pub struct SessionProbe {
    seq: usize,
    events: mpsc::UnboundedSender<EngineEvent>,
    offers: AtomicUsize,
    answers: AtomicUsize,
    local_descriptions: Mutex<Vec<SessionDescription>>,
    remote_descriptions: Mutex<Vec<SessionDescription>>,
    remote_candidates: Mutex<Vec<IceCandidate>>,
    closed: AtomicBool,
}

impl SessionProbe {
    /// Inject an engine event into the owning session's queue.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    pub fn offers_created(&self) -> usize {
        self.offers.load(Ordering::SeqCst)
    }

    pub fn answers_created(&self) -> usize {
        self.answers.load(Ordering::SeqCst)
    }

    pub fn local_descriptions(&self) -> Vec<SessionDescription> {
        self.local_descriptions.lock().unwrap().clone()
    }

    pub fn remote_descriptions(&self) -> Vec<SessionDescription> {
        self.remote_descriptions.lock().unwrap().clone()
    }

    pub fn remote_candidates(&self) -> Vec<IceCandidate> {
        self.remote_candidates.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for ScriptedEngine {
    async fn open_session(
        &self,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Result<Box<dyn MediaSession>, EngineError> {
        let mut sessions = self.sessions.lock().unwrap();
        let probe = Arc::new(SessionProbe {
            seq: sessions.len(),
            events,
            offers: AtomicUsize::new(0),
            answers: AtomicUsize::new(0),
            local_descriptions: Mutex::new(Vec::new()),
            remote_descriptions: Mutex::new(Vec::new()),
            remote_candidates: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        sessions.push(probe.clone());
        Ok(Box::new(ScriptedSession { probe }))
    }
}

struct ScriptedSession {
    probe: Arc<SessionProbe>,
}

#[async_trait]
impl MediaSession for ScriptedSession {
    async fn create_offer(&self) -> Result<SessionDescription, EngineError> {
        self.probe.offers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::offer(format!(
            "v=0 scripted-offer-{}",
            self.probe.seq
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription, EngineError> {
        self.probe.answers.fetch_add(1, Ordering::SeqCst);
        Ok(SessionDescription::answer(format!(
            "v=0 scripted-answer-{}",
            self.probe.seq
        )))
    }

    async fn set_local_description(&self, sd: SessionDescription) -> Result<(), EngineError> {
        self.probe.local_descriptions.lock().unwrap().push(sd);
        Ok(())
    }

    async fn set_remote_description(&self, sd: SessionDescription) -> Result<(), EngineError> {
        self.probe.remote_descriptions.lock().unwrap().push(sd);
        Ok(())
    }

    async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        self.probe.remote_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn close(&self) {
        self.probe.closed.store(true, Ordering::SeqCst);
    }
}

// ---- store wrappers ----

/// Serves every snapshot of one path from the state captured at
/// construction time; everything else passes through. Reproduces two
/// clients racing on the same stale view.
pub struct FrozenSnapshotStore {
    inner: Arc<dyn RendezvousStore>,
    path: String,
    frozen: Value,
}

impl FrozenSnapshotStore {
    pub async fn capture(inner: Arc<dyn RendezvousStore>, path: &str) -> Self {
        let frozen = inner
            .snapshot_once(path)
            .await
            .expect("capture snapshot failed");
        FrozenSnapshotStore {
            inner,
            path: path.to_string(),
            frozen,
        }
    }
}

#[async_trait]
impl RendezvousStore for FrozenSnapshotStore {
    async fn snapshot_once(&self, path: &str) -> Result<Value, StoreError> {
        if path == self.path {
            return Ok(self.frozen.clone());
        }
        self.inner.snapshot_once(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value).await
    }

    async fn push_key(&self, path: &str) -> Result<String, StoreError> {
        self.inner.push_key(path).await
    }

    async fn watch(&self, path: &str, callback: WatchCallback) -> Result<WatchId, StoreError> {
        self.inner.watch(path, callback).await
    }

    async fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.inner.unwatch(id).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.inner.delete(path).await
    }
}

/// Fails the next `failures` snapshot reads, then recovers.
pub struct FlakyStore {
    inner: Arc<dyn RendezvousStore>,
    failures: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn RendezvousStore>, failures: u32) -> Self {
        FlakyStore {
            inner,
            failures: AtomicU32::new(failures),
        }
    }

    pub fn remaining_failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RendezvousStore for FlakyStore {
    async fn snapshot_once(&self, path: &str) -> Result<Value, StoreError> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(StoreError::Unreachable("scripted outage".into()));
        }
        self.inner.snapshot_once(path).await
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value).await
    }

    async fn push_key(&self, path: &str) -> Result<String, StoreError> {
        self.inner.push_key(path).await
    }

    async fn watch(&self, path: &str, callback: WatchCallback) -> Result<WatchId, StoreError> {
        self.inner.watch(path, callback).await
    }

    async fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.inner.unwatch(id).await
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        self.inner.delete(path).await
    }
}

// ---- event-stream helpers ----

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<ClientEvent>) -> ClientEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("no client event within 2s")
        .expect("event stream closed")
}

/// Drain events until one matches, panicking after 5s.
pub async fn wait_for(
    rx: &mut mpsc::UnboundedReceiver<ClientEvent>,
    matches: impl Fn(&ClientEvent) -> bool,
) -> ClientEvent {
    for _ in 0..50 {
        let event = timeout(Duration::from_millis(100), rx.recv()).await;
        match event {
            Ok(Some(event)) if matches(&event) => return event,
            Ok(Some(_)) => {}
            Ok(None) => panic!("event stream closed while waiting"),
            Err(_) => {}
        }
    }
    panic!("expected event never arrived");
}

/// Poll a condition until it holds, panicking after 2s.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..100 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 2s");
}
