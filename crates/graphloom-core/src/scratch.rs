//! Namespaced scratch store for intermediate pipeline state.
//!
//! Runs and workflow steps exchange intermediate values here instead of
//! threading them through call signatures. Keys live inside a
//! namespace (one per run), values are arbitrary JSON, and entries may
//! carry a TTL. Expired entries are reaped lazily on access.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

struct ScratchEntry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl ScratchEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-process namespaced key-value store.
///
/// All methods take `&self`; the store is shared across tasks behind an
/// `Arc`.
#[derive(Default)]
pub struct ScratchStore {
    namespaces: RwLock<HashMap<String, HashMap<String, ScratchEntry>>>,
}

impl ScratchStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value. A `ttl` of `None` means the entry never expires.
    pub async fn set(&self, namespace: &str, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = ScratchEntry {
            value,
            expires_at: ttl.map(|d| Utc::now() + d),
        };
        let mut namespaces = self.namespaces.write().await;
        namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), entry);
    }

    /// Read one value, reaping it first if its TTL has passed.
    pub async fn get(&self, namespace: &str, key: &str) -> Option<Value> {
        let now = Utc::now();
        let mut namespaces = self.namespaces.write().await;
        let ns = namespaces.get_mut(namespace)?;
        match ns.get(key) {
            Some(entry) if entry.is_expired(now) => {
                ns.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Read every live entry in a namespace.
    pub async fn get_all(&self, namespace: &str) -> HashMap<String, Value> {
        let now = Utc::now();
        let mut namespaces = self.namespaces.write().await;
        let Some(ns) = namespaces.get_mut(namespace) else {
            return HashMap::new();
        };
        ns.retain(|_, entry| !entry.is_expired(now));
        ns.iter()
            .map(|(k, entry)| (k.clone(), entry.value.clone()))
            .collect()
    }

    /// Remove one key. Returns true if it existed (and was live).
    pub async fn delete(&self, namespace: &str, key: &str) -> bool {
        let now = Utc::now();
        let mut namespaces = self.namespaces.write().await;
        match namespaces.get_mut(namespace) {
            Some(ns) => ns
                .remove(key)
                .is_some_and(|entry| !entry.is_expired(now)),
            None => false,
        }
    }

    /// Drop an entire namespace. Called when a run reaches a terminal
    /// status so its intermediates do not outlive it.
    pub async fn clear_namespace(&self, namespace: &str) {
        let mut namespaces = self.namespaces.write().await;
        if namespaces.remove(namespace).is_some() {
            debug!(namespace, "cleared scratch namespace");
        }
    }

    /// Number of live entries in a namespace.
    pub async fn len(&self, namespace: &str) -> usize {
        let now = Utc::now();
        let namespaces = self.namespaces.read().await;
        namespaces
            .get(namespace)
            .map(|ns| ns.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, namespace: &str) -> bool {
        self.len(namespace).await == 0
    }
}
