// src/core/cache.rs

use log::debug;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::constants::HASH_TRUNCATE_LENGTH;
use crate::models::ElementTree;

/// Hex digest of `content`, truncated to `HASH_TRUNCATE_LENGTH` bytes.
pub fn content_hash(content: &[u8]) -> String {
    let hash = blake3::hash(content);
    let bytes: &[u8] = hash.as_bytes();
    hex::encode(bytes.get(..HASH_TRUNCATE_LENGTH).unwrap_or(bytes))
}

/// Hit and miss counters of a [`RenderDescriptionCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that had to build a tree.
    pub misses: u64,
    /// Trees currently stored.
    pub entries: usize,
}

/// Parsed render descriptions keyed by their exact serialized text.
///
/// The key is the content itself, so an entry can never be stale: a changed
/// description has a different key. Entries live as long as the cache.
#[derive(Debug, Default)]
pub struct RenderDescriptionCache {
    entries: RwLock<HashMap<String, Arc<ElementTree>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl RenderDescriptionCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The tree stored under `key`, without touching the counters.
    pub fn get(&self, key: &str) -> Option<Arc<ElementTree>> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(key).cloned()
    }

    /// Stores `tree` under `key`. If an entry already exists it is kept and
    /// returned, so every caller shares one tree per key.
    pub fn set(&self, key: &str, tree: ElementTree) -> Arc<ElementTree> {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tree))
            .clone()
    }

    /// Returns the cached tree for `key`, calling `build` on a miss.
    pub fn get_or_build(&self, key: &str, build: impl FnOnce() -> ElementTree) -> Arc<ElementTree> {
        if let Some(tree) = self.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return tree;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Render description cache miss ({})", content_hash(key.as_bytes()));
        self.set(key, build())
    }

    /// Counters so far, with the current entry count.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    /// Number of cached trees.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
