//! Process-wide page cache: the buffer layer's read-side replacement policy.
//!
//! Mirrors `file_manager::page_cache::PageCache` (an `lru::LruCache` behind
//! a `parking_lot::RwLock`, keyed by file+page). Writes are write-through (a
//! dirty page is written to disk the moment it's unpinned, following a
//! pin -> compute -> write -> mark-dirty-if-mutated -> unpin discipline), so
//! there is no deferred-flush-on-eviction path to get wrong.

use crate::page::Page;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 1000;

#[derive(Hash, Eq, PartialEq, Clone, Copy)]
struct CacheKey {
    handle: i32,
    page_id: u32,
}

#[derive(Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

pub struct PageCache {
    entries: Mutex<LruCache<CacheKey, Vec<u8>>>,
    stats: Mutex<CacheStats>,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(16);
        PageCache {
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).unwrap())),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    pub fn get(&self, handle: i32, page_id: u32) -> Option<Vec<u8>> {
        let key = CacheKey { handle, page_id };
        let mut entries = self.entries.lock();
        let hit = entries.get(&key).cloned();
        let mut stats = self.stats.lock();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    pub fn put(&self, handle: i32, page: &Page) {
        let key = CacheKey {
            handle,
            page_id: page.page_id,
        };
        self.entries.lock().put(key, page.data.clone());
    }

    /// Drop every cached page belonging to `handle`, on file close.
    pub fn invalidate_handle(&self, handle: i32) {
        let mut entries = self.entries.lock();
        let stale: Vec<CacheKey> = entries
            .iter()
            .filter(|(k, _)| k.handle == handle)
            .map(|(k, _)| *k)
            .collect();
        for key in stale {
            entries.pop(&key);
        }
    }
}

impl Default for PageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

lazy_static::lazy_static! {
    pub static ref PAGE_CACHE: PageCache = PageCache::default();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_and_miss() {
        let cache = PageCache::new(16);
        assert!(cache.get(0, 1).is_none());
        cache.put(0, &Page::from_data(1, vec![9u8; 4]));
        assert_eq!(cache.get(0, 1), Some(vec![9u8; 4]));
    }

    #[test]
    fn invalidate_drops_only_that_handle() {
        let cache = PageCache::new(16);
        cache.put(0, &Page::from_data(1, vec![1]));
        cache.put(1, &Page::from_data(1, vec![2]));
        cache.invalidate_handle(0);
        assert!(cache.get(0, 1).is_none());
        assert!(cache.get(1, 1).is_some());
    }
}
