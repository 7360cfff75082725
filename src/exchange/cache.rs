// =============================================================================
// PriceCache — LRU + TTL cache of last-known prices
// =============================================================================
//
// TTL check: `cached.timestamp.elapsed() < cached.ttl`. LRU-at-capacity
// eviction keeps the entry count bounded once the cache fills up.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::types::Symbol;

const DEFAULT_CAPACITY: usize = 1000;
const DEFAULT_TTL: Duration = Duration::from_secs(300);

struct Entry {
    value: f64,
    inserted_at: Instant,
    last_access: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct PriceCache {
    capacity: usize,
    ttl: Duration,
    entries: Mutex<HashMap<Symbol, Entry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_CAPACITY, DEFAULT_TTL)
    }

    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            entries: Mutex::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached price for `symbol` if present and not expired.
    pub fn get(&self, symbol: &Symbol) -> Option<f64> {
        let mut entries = self.entries.lock();
        match entries.get_mut(symbol) {
            Some(entry) if entry.inserted_at.elapsed() < self.ttl => {
                entry.last_access = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value)
            }
            Some(_) => {
                entries.remove(symbol);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert or refresh `symbol`'s cached price, evicting the
    /// least-recently-used entry first if this insert would exceed
    /// capacity.
    pub fn insert(&self, symbol: Symbol, value: f64) {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        if !entries.contains_key(&symbol) && entries.len() >= self.capacity {
            if let Some(lru_key) = entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&lru_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        entries.insert(
            symbol,
            Entry {
                value,
                inserted_at: now,
                last_access: now,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_hits() {
        let cache = PriceCache::new();
        let sym = Symbol::new("BTCUSDT");
        cache.insert(sym.clone(), 100.0);
        assert_eq!(cache.get(&sym), Some(100.0));
        assert_eq!(cache.stats().hits, 1);
    }

    #[test]
    fn expired_entry_counts_as_miss_and_is_evicted() {
        let cache = PriceCache::with_capacity_and_ttl(10, Duration::from_millis(1));
        let sym = Symbol::new("BTCUSDT");
        cache.insert(sym.clone(), 100.0);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.get(&sym), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn evicts_least_recently_used_at_capacity() {
        let cache = PriceCache::with_capacity_and_ttl(2, DEFAULT_TTL);
        cache.insert(Symbol::new("A"), 1.0);
        cache.insert(Symbol::new("B"), 2.0);
        // touch A so B becomes the LRU entry
        cache.get(&Symbol::new("A"));
        cache.insert(Symbol::new("C"), 3.0);

        assert_eq!(cache.get(&Symbol::new("B")), None);
        assert_eq!(cache.get(&Symbol::new("A")), Some(1.0));
        assert_eq!(cache.get(&Symbol::new("C")), Some(3.0));
        assert_eq!(cache.stats().evictions, 1);
    }
}
