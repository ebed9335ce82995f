//! Operation cache for MapSet computations.
//!
//! A `HashMap`-backed memo table with hit/miss counters. Because every
//! handle is canonical, caching a result by operand handles is exact.

use std::collections::HashMap;
use std::hash::Hash;

use crate::reference::MapSet;

/// Cache key for a commutative binary operation, normalized so that
/// `(a, b)` and `(b, a)` hit the same entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PairKey(MapSet, MapSet);

impl PairKey {
    pub fn commutative(a: MapSet, b: MapSet) -> Self {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }
}

/// Hit/miss counters of a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: usize,
    pub misses: usize,
}

/// A memo table with hit/miss statistics.
#[derive(Debug, Clone)]
pub struct OpCache<K, V> {
    map: HashMap<K, V>,
    hits: usize,
    misses: usize,
}

impl<K, V> Default for OpCache<K, V> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<K, V> OpCache<K, V> {
    /// Creates a cache with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: HashMap::with_capacity(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.map.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }

    /// Clears all entries. Counters are kept.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

impl<K, V> OpCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Looks up a cached result.
    #[inline]
    pub fn get(&mut self, key: &K) -> Option<V> {
        match self.map.get(key) {
            Some(v) => {
                self.hits += 1;
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Inserts a result into the cache.
    #[inline]
    pub fn insert(&mut self, key: K, value: V) {
        self.map.insert(key, value);
    }
}
