use std::{collections::HashMap, sync::Mutex, time::{Duration, Instant}};
use serenity::async_trait;
use super::{ratelimit::TokenBuckets, CoordinationError, CoordinationStore, Result};

struct Entry {
    value: String,
    expires: Option<Instant>,
}

impl Entry {
    #[inline]
    fn alive(&self, now: Instant) -> bool {
        self.expires.map_or(true, |at| at > now)
    }
}

/// Stockage de coordination propre au processus. Les entrées expirées sont purgées au fil des accès.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    buckets: TokenBuckets,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
    fn with_entries<T, F>(&self, f: F) -> Result<T>
        where F: FnOnce(&mut HashMap<String, Entry>, Instant) -> T
    {
        let mut entries = self.entries.lock().map_err(|e| CoordinationError::Backend(e.to_string()))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.alive(now));
        Ok(f(&mut entries, now))
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn try_lock(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool> {
        self.set_nx(key, owner, ttl).await
    }
    async fn unlock(&self, key: &str, owner: &str) -> Result<bool> {
        self.with_entries(|entries, _| {
            match entries.get(key) {
                Some(entry) if entry.value == owner => {
                    entries.remove(key);
                    true
                }
                _ => false,
            }
        })
    }
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.with_entries(|entries, now| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(key.to_string(), Entry { value: value.to_string(), expires: Some(now + ttl) });
            true
        })
    }
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries, _| entries.get(key).map(|entry| entry.value.clone()))
    }
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.with_entries(|entries, now| {
            entries.insert(key.to_string(), Entry { value: value.to_string(), expires: ttl.map(|ttl| now + ttl) });
        })
    }
    async fn delete(&self, key: &str) -> Result<()> {
        self.with_entries(|entries, _| {
            entries.remove(key);
        })
    }
    async fn take_token(&self, key: &str, burst: u32, period: Duration) -> Result<bool> {
        self.buckets.take(key, burst, period)
    }
}
