//! Advisory in-memory index: `key -> offset`.
//!
//! The index is never persisted and never authoritative. It exists to turn
//! most lookups into a direct seek instead of a tail scan; a miss never
//! proves a key is absent, it only means the caller must fall back to
//! scanning. Both repositories rebuild it from scratch on startup by
//! replaying their files forward, exactly the way the teacher's
//! `FileIndex` used to be rebuilt by `recovery::scanner` rather than trusted
//! blindly from disk.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::IndexError;

/// `key -> byte offset` map, guarded by a reader/writer lock so concurrent
/// `Get`s never block each other and only ever block behind a `Set`.
#[derive(Debug, Default)]
pub struct Indexer {
    map: RwLock<HashMap<String, i64>>,
}

impl Indexer {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Record (or overwrite) `key`'s offset. Takes the exclusive lock.
    pub fn index(&self, key: &str, offset: i64) {
        let mut guard = self.map.write().expect("index lock poisoned");
        guard.insert(key.to_string(), offset);
    }

    /// Look up `key`'s offset. Takes the shared lock.
    ///
    /// `Err(IndexError)` means "not indexed", never "does not exist" — every
    /// call site must fall back to a tail scan before concluding the key is
    /// absent.
    pub fn search(&self, key: &str) -> Result<i64, IndexError> {
        let guard = self.map.read().expect("index lock poisoned");
        guard.get(key).copied().ok_or(IndexError)
    }

    /// Number of indexed keys. Exposed for `info` and tests.
    pub fn len(&self) -> usize {
        self.map.read().expect("index lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
