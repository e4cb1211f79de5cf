//! Expiring key/value cache with a running/stopped lifecycle.
//!
//! The engine starts the cache at the beginning of every build and stops it
//! at the end. Stopping clears every entry, so nothing leaks between builds.
//! While stopped, writes are dropped and reads miss.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default lifetime of a cache entry.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Entry<V> {
    value: V,
    expiry: Instant,
}

#[derive(Debug)]
struct State<K, V> {
    running: bool,
    entries: HashMap<K, Entry<V>>,
}

/// A TTL cache shared behind `&self`.
#[derive(Debug)]
pub struct ExpiringCache<K, V> {
    ttl: Duration,
    state: Mutex<State<K, V>>,
}

impl<K, V> ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// A stopped cache whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(State {
                running: false,
                entries: HashMap::new(),
            }),
        }
    }

    /// Begin accepting entries.
    pub fn start(&self) {
        self.lock().running = true;
    }

    /// Stop and drop every entry.
    pub fn stop(&self) {
        let mut state = self.lock();
        state.running = false;
        state.entries.clear();
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Value for `key`, if present and not expired. Expired entries are
    /// evicted on access.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut state = self.lock();
        if !state.running {
            return None;
        }
        let expired = match state.entries.get(key) {
            Some(entry) if entry.expiry > Instant::now() => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.remove(key);
        }
        None
    }

    /// Store `value` under `key`. Ignored while stopped.
    pub fn set(&self, key: K, value: V) {
        let mut state = self.lock();
        if !state.running {
            return;
        }
        let expiry = Instant::now() + self.ttl;
        state.entries.insert(key, Entry { value, expiry });
    }

    /// Cached value for `key`, or compute, store and return it.
    pub fn get_or_insert_with(&self, key: K, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.get(&key) {
            return value;
        }
        let value = compute();
        self.set(key, value.clone());
        value
    }

    /// Number of live (possibly expired, not yet evicted) entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State<K, V>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<K, V> Default for ExpiringCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
