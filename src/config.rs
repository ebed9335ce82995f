//! Manager configuration.

/// Sizing knobs of a [`MapSetManager`][crate::manager::MapSetManager].
///
/// All values are initial capacities: every structure grows on demand.
///
/// ```
/// use mapset_rs::config::MapSetConfig;
///
/// let config = MapSetConfig::default().with_bucket_bits(16).with_cache_capacity(1 << 16);
/// assert_eq!(config.bucket_bits, 16);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapSetConfig {
    /// Initial capacity of the node arena.
    pub node_capacity: usize,
    /// The unique table starts with `2^bucket_bits` buckets.
    pub bucket_bits: usize,
    /// Initial capacity of the merge and count caches.
    pub cache_capacity: usize,
}

impl Default for MapSetConfig {
    fn default() -> Self {
        Self {
            node_capacity: 1024,
            bucket_bits: 10,
            cache_capacity: 4096,
        }
    }
}

impl MapSetConfig {
    pub fn with_node_capacity(mut self, node_capacity: usize) -> Self {
        self.node_capacity = node_capacity;
        self
    }

    pub fn with_bucket_bits(mut self, bucket_bits: usize) -> Self {
        assert!(bucket_bits <= 31, "Bucket bits should be in the range 0..=31");
        self.bucket_bits = bucket_bits;
        self
    }

    pub fn with_cache_capacity(mut self, cache_capacity: usize) -> Self {
        self.cache_capacity = cache_capacity;
        self
    }
}
