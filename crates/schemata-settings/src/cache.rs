//! Request-scoped cache.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Key of a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheId(String);

impl CacheId {
    /// Creates an id that differs per display language, for entries holding
    /// translated text.
    #[must_use]
    pub fn language_aware(name: &str, language: &str) -> Self {
        Self(format!("{name}-{language}"))
    }

    /// Returns the id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An in-process cache that lives as long as one request.
#[derive(Debug)]
pub struct TransientCache<V> {
    entries: Mutex<HashMap<CacheId, V>>,
}

impl<V> Default for TransientCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TransientCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheId, V>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true if `id` has an entry.
    pub fn contains(&self, id: &CacheId) -> bool {
        self.lock().contains_key(id)
    }

    /// Returns a copy of the entry for `id`.
    pub fn fetch(&self, id: &CacheId) -> Option<V> {
        self.lock().get(id).cloned()
    }

    /// Stores `value` under `id`, replacing any previous entry.
    pub fn save(&self, id: CacheId, value: V) {
        self.lock().insert(id, value);
    }

    /// Returns the entry for `id`, computing and storing it first if absent.
    ///
    /// `compute` runs without the lock held.
    pub fn get_or_insert_with(&self, id: &CacheId, compute: impl FnOnce() -> V) -> V {
        if let Some(value) = self.fetch(id) {
            return value;
        }
        let value = compute();
        self.lock()
            .entry(id.clone())
            .or_insert(value)
            .clone()
    }

    /// Removes the entry for `id`; returns whether there was one.
    pub fn delete(&self, id: &CacheId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Removes every entry.
    pub fn flush_all(&self) {
        self.lock().clear();
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if the cache holds nothing.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
