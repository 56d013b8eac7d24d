//! Per-kind entity namespace
//!
//! Uses `DashMap` for concurrent access to entries. Patches are applied under the
//! entry's write lock after the map shard is released.

use chat_core::Entity;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};

use super::cached::Cached;
use crate::error::CacheError;

/// All cached records of one entity kind
pub struct CacheNamespace<T: Entity> {
    entries: DashMap<T::Key, Cached<T>>,
}

impl<T: Entity> Default for CacheNamespace<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> CacheNamespace<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Look up an entry
    pub fn get(&self, key: T::Key) -> Option<Cached<T>> {
        self.entries.get(&key).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, key: T::Key) -> bool {
        self.entries.contains_key(&key)
    }

    /// Merge a raw payload into the entry at `key`, creating it if absent.
    ///
    /// Only fields present in `patch` change. Readers see either the state
    /// before or after the patch, never a mix. Applying the same patch twice
    /// leaves the same state as applying it once.
    pub fn upsert(&self, key: T::Key, patch: &Value) -> Result<Cached<T>, CacheError> {
        let patch = Self::prepare(patch)?;
        if let Ok(found) = T::key_of(&patch) {
            if found != key {
                return Err(Self::mismatch(key, found));
            }
        }
        self.apply(key, &patch)
    }

    /// Merge a raw payload whose identity is read from the payload itself
    pub fn upsert_payload(&self, payload: &Value) -> Result<Cached<T>, CacheError> {
        let patch = Self::prepare(payload)?;
        let key = T::key_of(&patch)?;
        self.apply(key, &patch)
    }

    /// Merge a raw payload into an entry that is already cached.
    ///
    /// An absent entry is not created: the record is built from the payload
    /// and returned detached from the cache.
    pub fn update_payload(&self, payload: &Value) -> Result<Cached<T>, CacheError> {
        let patch = Self::prepare(payload)?;
        let key = T::key_of(&patch)?;
        match self.get(key) {
            Some(existing) => {
                Self::merge_into(key, &existing, &patch)?;
                Ok(existing)
            }
            None => Ok(Cached::new(Self::build(key, &patch)?)),
        }
    }

    /// Check that a payload builds a record, without touching the cache
    pub fn validate(&self, payload: &Value) -> Result<T::Key, CacheError> {
        let patch = Self::prepare(payload)?;
        let key = T::key_of(&patch)?;
        Self::build(key, &patch)?;
        Ok(key)
    }

    /// Store a complete record, replacing the previous state in place
    pub fn insert(&self, record: T) -> Cached<T> {
        let key = record.key();
        match self.entries.entry(key) {
            Entry::Occupied(entry) => {
                let cached = entry.get().clone();
                drop(entry);
                *cached.write() = record;
                cached
            }
            Entry::Vacant(entry) => entry.insert(Cached::new(record)).value().clone(),
        }
    }

    /// Drop an entry. Existing handles keep the last-known state.
    pub fn remove(&self, key: T::Key) -> Option<Cached<T>> {
        let removed = self.entries.remove(&key).map(|(_, cached)| cached);
        if removed.is_some() {
            tracing::trace!(kind = %T::KIND, key = %key, "Cache entry removed");
        }
        removed
    }

    /// Drop every entry matching `predicate`
    pub fn remove_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, cached| !predicate(&cached.read()));
        before - self.entries.len()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Owned copies of every record
    pub fn snapshots(&self) -> Vec<T> {
        self.entries
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
    }

    fn prepare(patch: &Value) -> Result<Map<String, Value>, CacheError> {
        let Value::Object(map) = patch else {
            return Err(CacheError::InvalidPatch(chat_core::DomainError::InvalidPatch {
                kind: T::KIND,
                reason: "patch is not an object".to_string(),
            }));
        };
        let mut map = map.clone();
        T::normalize(&mut map)?;
        Ok(map)
    }

    fn apply(&self, key: T::Key, patch: &Map<String, Value>) -> Result<Cached<T>, CacheError> {
        let existing = match self.entries.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                // Build the record before publishing so nobody sees a half-filled seed
                let record = Self::build(key, patch)?;
                tracing::trace!(kind = %T::KIND, key = %key, "Cache entry created");
                return Ok(entry.insert(Cached::new(record)).value().clone());
            }
        };
        Self::merge_into(key, &existing, patch)?;
        Ok(existing)
    }

    fn build(key: T::Key, patch: &Map<String, Value>) -> Result<T, CacheError> {
        let mut record = T::seed(key);
        record.merge(patch)?;
        Self::check_key(key, &record)?;
        Ok(record)
    }

    fn merge_into(key: T::Key, existing: &Cached<T>, patch: &Map<String, Value>) -> Result<(), CacheError> {
        let mut guard = existing.write();
        let mut next = guard.clone();
        next.merge(patch)?;
        Self::check_key(key, &next)?;
        *guard = next;
        Ok(())
    }

    fn check_key(key: T::Key, record: &T) -> Result<(), CacheError> {
        let found = record.key();
        if found == key {
            Ok(())
        } else {
            Err(Self::mismatch(key, found))
        }
    }

    fn mismatch(expected: T::Key, found: T::Key) -> CacheError {
        CacheError::KeyMismatch {
            kind: T::KIND,
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
