//! Versioned key-value store with per-key locking and change notification.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::time::Instant;

use crate::{clog, clog_trace, Result};

#[derive(Debug, Default)]
struct Slot {
    value: Option<Value>,
    version: u64,
}

/// One key: its value guard and the waiters parked on it.
#[derive(Debug, Default)]
struct Entry {
    slot: Mutex<Slot>,
    changed: Notify,
}

/// Summary of the store contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackboardStats {
    pub total_keys: usize,
    /// Key names, sorted.
    pub keys: Vec<String>,
    /// Rough size of all stored values as serialized JSON.
    pub approx_bytes: usize,
}

/// Shared, in-memory blackboard.
///
/// Every key owns its own guard and notifier, so writers and waiters on
/// unrelated keys never contend. The outer lock protects only the set of
/// key names: entry creation and deletion, never values.
///
/// Entries are created lazily on first access and live until deleted.
/// A namespace clear is atomic with respect to the key set but not with
/// respect to a writer that already holds an entry: such a write lands on
/// the detached entry and is lost.
#[derive(Debug, Default)]
pub struct Blackboard {
    entries: RwLock<HashMap<String, Arc<Entry>>>,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, key: &str) -> Arc<Entry> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(key) {
                return Arc::clone(entry);
            }
        }
        let mut entries = self.entries.write().await;
        Arc::clone(entries.entry(key.to_string()).or_insert_with(|| {
            clog_trace!("blackboard: created key {}", key);
            Arc::default()
        }))
    }

    /// Read a key, falling back to `default` when it has never been set.
    pub async fn get(&self, key: &str, default: Value) -> Value {
        let entry = self.entry(key).await;
        let slot = entry.slot.lock().await;
        clog_trace!("blackboard: get {} v{}", key, slot.version);
        slot.value.clone().unwrap_or(default)
    }

    /// Read a key together with its version. Version 0 means never set.
    pub async fn get_with_version(&self, key: &str) -> (Option<Value>, u64) {
        let entry = self.entry(key).await;
        let slot = entry.slot.lock().await;
        (slot.value.clone(), slot.version)
    }

    /// Write a key and wake every waiter on it. Returns the new version.
    pub async fn set(&self, key: &str, value: Value) -> u64 {
        let entry = self.entry(key).await;
        let version = {
            let mut slot = entry.slot.lock().await;
            slot.value = Some(value);
            slot.version += 1;
            slot.version
        };
        // Wake-up happens after the value guard is released.
        entry.changed.notify_waiters();
        clog_trace!("blackboard: set {} v{}", key, version);
        version
    }

    /// Atomic read-modify-write of one key under its own guard.
    pub async fn update<F>(&self, key: &str, f: F) -> (Value, u64)
    where
        F: FnOnce(Option<&Value>) -> Value,
    {
        let entry = self.entry(key).await;
        let (value, version) = {
            let mut slot = entry.slot.lock().await;
            let next = f(slot.value.as_ref());
            slot.value = Some(next.clone());
            slot.version += 1;
            (next, slot.version)
        };
        entry.changed.notify_waiters();
        clog_trace!("blackboard: update {} v{}", key, version);
        (value, version)
    }

    /// Block until the key's version exceeds `last_seen` or the timeout
    /// elapses.
    ///
    /// A timeout is not an error: the current value and version are
    /// returned unchanged.
    pub async fn wait_for_change(
        &self,
        key: &str,
        last_seen: u64,
        timeout: Option<Duration>,
    ) -> (Option<Value>, u64) {
        let entry = self.entry(key).await;
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            // Register interest before checking, so a set between the check
            // and the await is not missed.
            let notified = entry.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let slot = entry.slot.lock().await;
                if slot.version > last_seen {
                    return (slot.value.clone(), slot.version);
                }
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        clog_trace!("blackboard: wait on {} timed out", key);
                        let slot = entry.slot.lock().await;
                        return (slot.value.clone(), slot.version);
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Delete every key starting with `prefix`. Returns how many were removed.
    pub async fn clear_namespace(&self, prefix: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(prefix));
        let removed = before - entries.len();
        clog!("blackboard: cleared {}* ({} keys)", prefix, removed);
        removed
    }

    /// All keys starting with `prefix`, with their values and versions.
    pub async fn list_keys(&self, prefix: &str) -> BTreeMap<String, (Option<Value>, u64)> {
        let matching: Vec<(String, Arc<Entry>)> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(key, _)| key.starts_with(prefix))
                .map(|(key, entry)| (key.clone(), Arc::clone(entry)))
                .collect()
        };

        let mut out = BTreeMap::new();
        for (key, entry) in matching {
            let slot = entry.slot.lock().await;
            out.insert(key, (slot.value.clone(), slot.version));
        }
        out
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    pub async fn stats(&self) -> BlackboardStats {
        let snapshot = self.list_keys("").await;
        let approx_bytes = snapshot
            .values()
            .filter_map(|(value, _)| value.as_ref())
            .map(|value| value.to_string().len())
            .sum();
        BlackboardStats {
            total_keys: snapshot.len(),
            keys: snapshot.into_keys().collect(),
            approx_bytes,
        }
    }

    /// Read a key and deserialize it. `Ok(None)` when the key was never set.
    pub async fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get_with_version(key).await {
            (Some(value), _) => Ok(Some(serde_json::from_value(value)?)),
            (None, _) => Ok(None),
        }
    }

    /// Serialize and write a value.
    pub async fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<u64> {
        let value = serde_json::to_value(value)?;
        Ok(self.set(key, value).await)
    }
}
