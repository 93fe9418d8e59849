//! Decode cache for node records
//!
//! Decoding a node record is the hot path of every store read. This cache
//! maps the raw encoded bytes of a record to its decoded value:
//! - Keys are the exact bytes read from the store, so a hit can never be stale
//! - Bounded size with first-in first-out eviction
//! - Hit, miss and eviction statistics

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, trace};

/// Bounded decode cache keyed by encoded record bytes
pub struct DecodeCache<T> {
    /// Decoded records keyed by their store encoding
    cache: Arc<DashMap<Vec<u8>, T>>,

    /// Encodings oldest first, front is evicted next
    insertion_order: Arc<RwLock<VecDeque<Vec<u8>>>>,

    /// Record capacity, zero disables caching
    max_size: usize,

    stats: Arc<RwLock<CacheStats>>,
}

/// Counters for a [`DecodeCache`]
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Reads answered without decoding
    pub hits: u64,

    /// Reads that had to decode
    pub misses: u64,

    /// Records dropped to stay within capacity
    pub evictions: u64,

    /// Records held after the last insert or eviction
    pub current_size: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl<T: Clone> DecodeCache<T> {
    /// Create a cache holding at most `max_size` records
    pub fn new(max_size: usize) -> Self {
        debug!("Initializing node decode cache with max_size={}", max_size);

        Self {
            cache: Arc::new(DashMap::with_capacity(max_size)),
            insertion_order: Arc::new(RwLock::new(VecDeque::with_capacity(max_size))),
            max_size,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    /// Return the decoded record for `encoded`, decoding and caching on a miss
    pub fn get_or_decode<E>(
        &self,
        encoded: &[u8],
        decode: impl FnOnce(&[u8]) -> Result<T, E>,
    ) -> Result<T, E> {
        if let Some(value) = self.get(encoded) {
            return Ok(value);
        }
        let value = decode(encoded)?;
        self.put(encoded.to_vec(), value.clone());
        Ok(value)
    }

    /// Look up the record decoded from `encoded`
    pub fn get(&self, encoded: &[u8]) -> Option<T> {
        if let Some(entry) = self.cache.get(encoded) {
            let result = entry.value().clone();
            drop(entry);

            self.stats.write().hits += 1;
            Some(result)
        } else {
            self.stats.write().misses += 1;
            trace!("Node decode cache miss ({} bytes)", encoded.len());
            None
        }
    }

    /// Remember `value` as the decoding of `encoded`
    pub fn put(&self, encoded: Vec<u8>, value: T) {
        if self.max_size == 0 {
            return;
        }
        if self.cache.contains_key(&encoded) {
            return;
        }
        if self.cache.len() >= self.max_size {
            self.evict_oldest();
        }

        self.cache.insert(encoded.clone(), value);
        self.insertion_order.write().push_back(encoded);

        self.stats.write().current_size = self.cache.len();
    }

    /// Drop the record that has been held longest
    fn evict_oldest(&self) {
        let mut order = self.insertion_order.write();

        if let Some(encoded) = order.pop_front() {
            drop(order);

            if self.cache.remove(&encoded).is_some() {
                let mut stats = self.stats.write();
                stats.evictions += 1;
                stats.current_size = self.cache.len();
            }
        }
    }

    /// Number of cached records
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Forget every record, counters other than size are kept
    pub fn clear(&self) {
        self.cache.clear();
        self.insertion_order.write().clear();
        self.stats.write().current_size = 0;
    }
}
