//! In-process store with the watch semantics of the hosted backends this
//! engine usually runs against: initial fire on subscribe, fire on every
//! observed change, `Null` tombstone on delete, push keys ordered by
//! creation, and empty branches pruned away.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rand::Rng;
use serde_json::{Map, Value};

use super::{RendezvousStore, StoreError, WatchCallback, WatchId};

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    root: Value,
    watchers: HashMap<u64, Watcher>,
    next_watch: u64,
    next_key: u64,
}

struct Watcher {
    path: String,
    callback: WatchCallback,
    last_seen: Value,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            inner: Mutex::new(Inner {
                root: Value::Object(Map::new()),
                watchers: HashMap::new(),
                next_watch: 0,
                next_key: 0,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::new()
    }
}

impl Inner {
    /// Watchers whose observed value changed since their last delivery.
    /// Called with the tree already mutated; the callbacks themselves run
    /// after the lock is released, so a callback may re-enter the store.
    ///
    /// Two tasks writing concurrently can therefore deliver to one watcher
    /// out of order. The room protocol has a single writer per path, which
    /// keeps per-path delivery sequential.
    fn changed_watchers(&mut self) -> Vec<(WatchCallback, Value)> {
        let root = &self.root;
        let mut fires = Vec::new();
        for watcher in self.watchers.values_mut() {
            let current = value_at(root, &watcher.path);
            if current != watcher.last_seen {
                watcher.last_seen = current.clone();
                fires.push((watcher.callback.clone(), current));
            }
        }
        fires
    }
}

#[async_trait]
impl RendezvousStore for MemoryStore {
    async fn snapshot_once(&self, path: &str) -> Result<Value, StoreError> {
        Ok(value_at(&self.inner.lock().unwrap().root, path))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let fires = {
            let mut inner = self.inner.lock().unwrap();
            set_at(&mut inner.root, path, value);
            inner.changed_watchers()
        };
        for (callback, value) in fires {
            callback(value);
        }
        Ok(())
    }

    async fn push_key(&self, _path: &str) -> Result<String, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let seq = inner.next_key;
        inner.next_key += 1;
        // fixed-width counter first so keys sort by creation order
        Ok(format!(
            "{:012x}{}",
            seq,
            hex::encode(rand::rng().random::<[u8; 2]>())
        ))
    }

    async fn watch(&self, path: &str, callback: WatchCallback) -> Result<WatchId, StoreError> {
        let (id, current) = {
            let mut inner = self.inner.lock().unwrap();
            let id = inner.next_watch;
            inner.next_watch += 1;
            let current = value_at(&inner.root, path);
            inner.watchers.insert(
                id,
                Watcher {
                    path: path.to_string(),
                    callback: callback.clone(),
                    last_seen: current.clone(),
                },
            );
            (id, current)
        };
        callback(current);
        Ok(WatchId(id))
    }

    async fn unwatch(&self, id: WatchId) -> Result<(), StoreError> {
        self.inner.lock().unwrap().watchers.remove(&id.0);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), StoreError> {
        let fires = {
            let mut inner = self.inner.lock().unwrap();
            delete_at(&mut inner.root, path);
            inner.changed_watchers()
        };
        for (callback, value) in fires {
            callback(value);
        }
        Ok(())
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Value at `path`, `Null` when absent.
fn value_at(root: &Value, path: &str) -> Value {
    let mut node = root;
    for key in segments(path) {
        match node.get(key) {
            Some(child) => node = child,
            None => return Value::Null,
        }
    }
    node.clone()
}

fn set_at(root: &mut Value, path: &str, value: Value) {
    let keys: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = keys.split_last() else {
        *root = value;
        return;
    };
    let mut node = root;
    for key in parents {
        node = ensure_object(node)
            .entry(key.to_string())
            .or_insert(Value::Null);
    }
    ensure_object(node).insert((*last).to_string(), value);
}

/// Coerce `node` into an object, replacing scalars.
fn ensure_object(node: &mut Value) -> &mut Map<String, Value> {
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    match node {
        Value::Object(map) => map,
        _ => unreachable!("just coerced to an object"),
    }
}

fn delete_at(root: &mut Value, path: &str) {
    let keys: Vec<&str> = segments(path).collect();
    if keys.is_empty() {
        *root = Value::Object(Map::new());
        return;
    }
    prune(root, &keys);
}

/// Remove the node at `keys`, dropping branch objects left empty so an
/// emptied branch reads as `Null`, not `{}`.
fn prune(node: &mut Value, keys: &[&str]) {
    let Some(map) = node.as_object_mut() else {
        return;
    };
    match keys {
        [] => {}
        [last] => {
            map.remove(*last);
        }
        [head, rest @ ..] => {
            if let Some(child) = map.get_mut(*head) {
                prune(child, rest);
                if child.as_object().is_some_and(|m| m.is_empty()) {
                    map.remove(*head);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    fn recording_watch() -> (WatchCallback, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: WatchCallback = Arc::new(move |value| sink.lock().unwrap().push(value));
        (callback, seen)
    }

    #[tokio::test]
    async fn set_then_snapshot_round_trips() {
        let store = MemoryStore::new();
        store
            .set("rooms/r1/callerId", json!("alice"))
            .await
            .unwrap();
        let room = store.snapshot_once("rooms/r1").await.unwrap();
        assert_eq!(room, json!({ "callerId": "alice" }));
        assert_eq!(store.snapshot_once("rooms/r2").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn watch_fires_once_with_current_value() {
        let store = MemoryStore::new();
        store.set("a/b", json!(1)).await.unwrap();
        let (callback, seen) = recording_watch();
        store.watch("a/b", callback).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![json!(1)]);

        let (callback, seen) = recording_watch();
        store.watch("a/missing", callback).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Value::Null]);
    }

    #[tokio::test]
    async fn watch_fires_on_change_not_on_equal_write() {
        let store = MemoryStore::new();
        let (callback, seen) = recording_watch();
        store.watch("k", callback).await.unwrap();

        store.set("k", json!("v1")).await.unwrap();
        store.set("k", json!("v1")).await.unwrap();
        store.set("k", json!("v2")).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Value::Null, json!("v1"), json!("v2")]
        );
    }

    #[tokio::test]
    async fn subtree_watch_sees_child_writes() {
        let store = MemoryStore::new();
        let (callback, seen) = recording_watch();
        store.watch("rooms/r1", callback).await.unwrap();

        store.set("rooms/r1/callerId", json!("a")).await.unwrap();
        store.set("rooms/r1/calleeId", json!("b")).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2], json!({ "callerId": "a", "calleeId": "b" }));
    }

    #[tokio::test]
    async fn delete_fires_null_tombstone_and_prunes() {
        let store = MemoryStore::new();
        store.set("rooms/r1/callerId", json!("a")).await.unwrap();
        let (callback, seen) = recording_watch();
        store.watch("rooms/r1", callback).await.unwrap();

        store.delete("rooms/r1").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.last(), Some(&Value::Null));
        drop(seen);
        // the emptied rooms branch is gone too
        assert_eq!(store.snapshot_once("rooms").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn delete_of_absent_path_is_a_noop() {
        let store = MemoryStore::new();
        store.set("rooms/r1/callerId", json!("a")).await.unwrap();
        store.delete("rooms/r9").await.unwrap();
        assert_ne!(store.snapshot_once("rooms").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn unwatch_stops_delivery() {
        let store = MemoryStore::new();
        let (callback, seen) = recording_watch();
        let id = store.watch("k", callback).await.unwrap();
        store.unwatch(id).await.unwrap();
        store.set("k", json!("v")).await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn push_keys_sort_in_creation_order() {
        let store = MemoryStore::new();
        let mut keys = Vec::new();
        for _ in 0..64 {
            keys.push(store.push_key("list").await.unwrap());
        }
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(
            keys.len(),
            keys.iter().collect::<std::collections::HashSet<_>>().len()
        );
    }

    #[tokio::test]
    async fn pushed_children_iterate_in_insertion_order() {
        let store = MemoryStore::new();
        for i in 0..8 {
            let key = store.push_key("list").await.unwrap();
            store.set(&format!("list/{key}"), json!(i)).await.unwrap();
        }
        let list = store.snapshot_once("list").await.unwrap();
        let values: Vec<i64> = list
            .as_object()
            .unwrap()
            .values()
            .map(|v| v.as_i64().unwrap())
            .collect();
        assert_eq!(values, (0..8).collect::<Vec<i64>>());
    }
}
