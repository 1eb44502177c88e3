//! Shared key-value store with per-key expiry.
//!
//! Token records, revocation markers and session versions all live in a
//! [`SessionStore`]. The trait is deliberately small: every operation the
//! token authority needs to be atomic is a single method here, so each
//! backend can implement it with one lock acquisition or one round trip.
//!
//! [`MemoryStore`] keeps everything in-process and reads expiry off tokio's
//! clock, so tests can pause and advance time. The Redis backend lives in
//! [`crate::RedisStore`] behind the `redis` feature.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::StoreError;

/// Key-value operations the session layer relies on.
pub trait SessionStore: Send + Sync + 'static {
    /// Reads one key.
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Reads several keys as one atomic snapshot, in order.
    fn get_many(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<Vec<Option<String>>, StoreError>> + Send;

    /// Writes `value` under `key`, expiring after `ttl`.
    fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Atomically reads and deletes a key. Of several concurrent callers
    /// at most one sees the value.
    fn take(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<String>, StoreError>> + Send;

    /// Deletes keys, returning how many existed.
    fn delete(
        &self,
        keys: &[String],
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Lists keys matching `pattern`. A trailing `*` matches any suffix;
    /// otherwise the match is exact.
    fn keys(
        &self,
        pattern: &str,
    ) -> impl Future<Output = Result<Vec<String>, StoreError>> + Send;

    /// Atomically increments an integer counter and clears its expiry.
    /// An absent key counts as 1, so the first call returns 2.
    fn incr_persist(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process [`SessionStore`]: one map behind one lock.
///
/// Expired entries are dropped lazily when touched. Clones share the same
/// map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.is_live(now));
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// Returns the live value at `key`, evicting it if it has expired.
fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: Instant,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn matches(pattern: &str, key: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => key.starts_with(prefix),
        None => key == pattern,
    }
}

impl SessionStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn get_many(
        &self,
        keys: &[String],
    ) -> Result<Vec<Option<String>>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(keys
            .iter()
            .map(|key| live(&mut entries, key, now).map(|e| e.value.clone()))
            .collect())
    }

    async fn set_ex(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let entry = Entry {
            value: value.to_owned(),
            expires_at: Some(Instant::now() + ttl),
        };
        self.entries.lock().await.insert(key.to_owned(), entry);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        Ok(entries
            .remove(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value))
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let removed = keys
            .iter()
            .filter_map(|key| entries.remove(key))
            .filter(|entry| entry.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.is_live(now));
        Ok(entries
            .keys()
            .filter(|key| matches(pattern, key))
            .cloned()
            .collect())
    }

    async fn incr_persist(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().await;
        let current = match live(&mut entries, key, Instant::now()) {
            Some(entry) => entry.value.parse::<i64>().map_err(|_| {
                StoreError::NotAnInteger {
                    key: key.to_owned(),
                }
            })?,
            None => 1,
        };
        let next = current + 1;
        entries.insert(
            key.to_owned(),
            Entry {
                value: next.to_string(),
                expires_at: None,
            },
        );
        Ok(next)
    }
}
