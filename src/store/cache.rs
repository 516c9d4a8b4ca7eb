//! Decoded chunk cache for readers.
//!
//! Chunks are keyed by the file position of their block, so a chunk shared
//! by several readers of the same file is decoded once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use parking_lot::RwLock;

/// Thread-safe cache of decoded chunks.
///
/// Uses `parking_lot::RwLock` for non-poisoning locks and `AtomicUsize`
/// for lock-free size tracking.
pub struct ChunkCache {
    cache: RwLock<HashMap<u64, Arc<Vec<u8>>>>,
    max_size: usize,
    current_size: AtomicUsize,
}

impl ChunkCache {
    /// Create a new cache with the given maximum size in bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_size,
            current_size: AtomicUsize::new(0),
        }
    }

    /// Create a cache with default size (64 MB).
    pub fn default_size() -> Self {
        Self::new(64 * 1024 * 1024)
    }

    /// Get a cached chunk if it exists.
    #[inline]
    pub fn get(&self, block_pos: u64) -> Option<Arc<Vec<u8>>> {
        self.cache.read().get(&block_pos).cloned()
    }

    /// Insert a decoded chunk and return the shared handle.
    pub fn insert(&self, block_pos: u64, data: Vec<u8>) -> Arc<Vec<u8>> {
        let size = data.len();
        let data = Arc::new(data);

        if size > self.max_size {
            return data;
        }

        if self.current_size.load(Ordering::Relaxed) + size > self.max_size {
            self.evict_some();
        }

        let mut cache = self.cache.write();
        if let Some(existing) = cache.get(&block_pos) {
            return Arc::clone(existing);
        }
        cache.insert(block_pos, Arc::clone(&data));
        self.current_size.fetch_add(size, Ordering::Relaxed);
        data
    }

    /// Evict approximately half of the cache.
    fn evict_some(&self) {
        let mut cache = self.cache.write();
        let keys: Vec<u64> = cache.keys().copied().collect();
        let evict_count = keys.len().div_ceil(2);

        let mut evicted_size = 0;
        for key in keys.into_iter().take(evict_count) {
            if let Some(chunk) = cache.remove(&key) {
                evicted_size += chunk.len();
            }
        }

        let _ = self.current_size.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
            Some(x.saturating_sub(evicted_size))
        });
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        self.cache.write().clear();
        self.current_size.store(0, Ordering::Relaxed);
    }

    /// Get the number of cached chunks.
    #[inline]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Check if cache is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get current cache size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.current_size.load(Ordering::Relaxed)
    }
}

impl Default for ChunkCache {
    fn default() -> Self {
        Self::default_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_insert_get() {
        let cache = ChunkCache::new(1024);
        cache.insert(100, vec![1, 2, 3, 4, 5]);

        let result = cache.get(100);
        assert_eq!(result.as_deref(), Some(&vec![1, 2, 3, 4, 5]));
        assert!(cache.get(200).is_none());
    }

    #[test]
    fn test_cache_clear() {
        let cache = ChunkCache::new(1024);
        cache.insert(100, vec![1, 2, 3]);
        assert!(!cache.is_empty());

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_cache_eviction() {
        let cache = ChunkCache::new(50);
        for i in 0..10u64 {
            cache.insert(i * 100, vec![0u8; 10]);
        }
        assert!(cache.len() <= 5);
        assert!(cache.size() <= 50);
    }

    #[test]
    fn test_cache_skip_large() {
        let cache = ChunkCache::new(100);
        let data = cache.insert(100, vec![0u8; 200]);
        assert_eq!(data.len(), 200);
        assert!(cache.get(100).is_none());
    }
}
