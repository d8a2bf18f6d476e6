//! Rendezvous store seam.
//!
//! The engine treats the store as an untrusted asynchronous transport: an
//! eventually consistent tree of JSON nodes shared with the partner. Writes
//! may land late, watches may fire at any time from any task, and nothing
//! orders one watch against another.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

mod memory;

pub use memory::MemoryStore;

/// Invoked on every change of a watched path, and once at subscription time
/// with the then-current value. `Value::Null` means the node is absent,
/// whether deleted or never written.
///
/// Callbacks run on whatever task performed the mutation and must not
/// block; enqueue and return.
pub type WatchCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Handle for cancelling a watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub(crate) u64);

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend cannot be reached at all.
    #[error("store unreachable: {0}")]
    Unreachable(String),
    /// Backend answered, but refused the request.
    #[error("store request rejected: {0}")]
    Rejected(String),
}

/// Hierarchical shared KV store the rendezvous runs over.
///
/// Paths are `/`-separated key sequences. A branch node reads as a JSON
/// object keyed by its children; an absent node reads as `Null`.
#[async_trait]
pub trait RendezvousStore: Send + Sync {
    /// One-shot read of the subtree at `path`.
    async fn snapshot_once(&self, path: &str) -> Result<Value, StoreError>;

    /// Write `value` at `path`, replacing the subtree there.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Reserve a fresh child key. Keys are unique and sort in creation
    /// order, so iterating a branch replays its insertion sequence.
    async fn push_key(&self, path: &str) -> Result<String, StoreError>;

    /// Watch the subtree at `path` until [`RendezvousStore::unwatch`].
    async fn watch(&self, path: &str, callback: WatchCallback) -> Result<WatchId, StoreError>;

    async fn unwatch(&self, id: WatchId) -> Result<(), StoreError>;

    /// Delete the subtree at `path`. Watches on or under it fire with
    /// `Null`; deleting an absent path is a no-op.
    async fn delete(&self, path: &str) -> Result<(), StoreError>;
}
