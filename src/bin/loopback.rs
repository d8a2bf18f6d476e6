//! Two clients on one in-memory store negotiate a real WebRTC session
//! against each other. Run with `RUST_LOG=peermatch=debug` for the full
//! exchange.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::{sleep, timeout};
use tracing::{error, info};

use peermatch::config::DEFAULT_ROOMS_PATH;
use peermatch::engine::MediaEngine;
use peermatch::lifecycle::{ChatClient, ClientEvent};
use peermatch::peer::{WebRtcEngine, WebRtcEngineConfig};
use peermatch::store::{MemoryStore, RendezvousStore};
use peermatch::ClientConfig;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let store: Arc<dyn RendezvousStore> = Arc::new(MemoryStore::new());
    let engine: Arc<dyn MediaEngine> = Arc::new(WebRtcEngine::new(WebRtcEngineConfig::default()));

    let (alice, alice_events) = ChatClient::start(store.clone(), engine.clone(), ClientConfig::default());
    // let the first room land before the second client scans, so the two
    // sides pair up instead of both creating rooms
    while store
        .snapshot_once(DEFAULT_ROOMS_PATH)
        .await
        .unwrap_or_default()
        .is_null()
    {
        sleep(Duration::from_millis(10)).await;
    }
    let (bob, bob_events) = ChatClient::start(store.clone(), engine.clone(), ClientConfig::default());
    info!(alice = %alice.local_id(), bob = %bob.local_id(), "clients started");

    let alice_task = tokio::spawn(watch_until_connected("alice", alice_events));
    let bob_task = tokio::spawn(watch_until_connected("bob", bob_events));

    let deadline = Duration::from_secs(30);
    let both = async {
        alice_task.await.unwrap_or(false) && bob_task.await.unwrap_or(false)
    };
    match timeout(deadline, both).await {
        Ok(true) => info!("both sides connected"),
        Ok(false) => error!("event stream ended before connecting"),
        Err(_) => error!(seconds = deadline.as_secs(), "timed out before connecting"),
    }

    alice.end();
    bob.end();
    alice.join().await;
    bob.join().await;
    info!("loopback finished");
}

async fn watch_until_connected(name: &'static str, mut events: UnboundedReceiver<ClientEvent>) -> bool {
    while let Some(event) = events.recv().await {
        info!(client = name, event = ?event, "milestone");
        if event == ClientEvent::Connected {
            return true;
        }
    }
    false
}
