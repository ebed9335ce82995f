//! Node cache: the hash-consing unique table.
//!
//! Nodes are keyed by a whole sorted branch list rather than a fixed pair of
//! children, so a single table is keyed by the node's precomputed content
//! hash and the caller supplies the structural comparison.
//!
//! # Design
//!
//! - Collision chains are intrusive: `next[slot]` links nodes of one bucket.
//! - The bucket array doubles once the number of entries exceeds the number of
//!   buckets, rehashing from the stored hashes (no node needs to be touched).
//! - The table is insert-only. Interned nodes are never evicted, so a handle
//!   stays valid for the manager's lifetime.

use crate::reference::MapSet;
use crate::utils::mix64;

/// Sentinel for an empty bucket / end of a chain.
const NO_NEXT: u32 = u32::MAX;

/// Hash-consing table from node content hash to interned handle.
#[derive(Debug, Clone)]
pub struct UniqueTable {
    /// Head of each collision chain (arena slot, or `NO_NEXT`).
    buckets: Vec<u32>,

    /// Next slot in the chain of the node stored at each slot.
    next: Vec<u32>,

    /// Content hash of the node stored at each slot.
    hashes: Vec<u64>,

    /// Bitmask for bucket selection: `bucket = mix(hash) & bitmask`.
    bitmask: u64,
}

impl UniqueTable {
    /// Creates a table with `2^bits` initial buckets.
    pub fn new(bits: usize) -> Self {
        assert!(bits <= 31, "Bucket bits should be in the range 0..=31");
        let num_buckets = 1usize << bits;
        Self {
            buckets: vec![NO_NEXT; num_buckets],
            next: Vec::new(),
            hashes: Vec::new(),
            bitmask: (num_buckets - 1) as u64,
        }
    }

    #[inline]
    fn bucket_index(&self, hash: u64) -> usize {
        (mix64(hash) & self.bitmask) as usize
    }

    /// Looks up an interned node with the given content hash.
    ///
    /// `matches` is called for every handle in the chain whose stored hash
    /// equals `hash`, and decides structural equality.
    pub fn find(&self, hash: u64, mut matches: impl FnMut(MapSet) -> bool) -> Option<MapSet> {
        let mut current = self.buckets[self.bucket_index(hash)];
        while current != NO_NEXT {
            let slot = current as usize;
            if self.hashes[slot] == hash {
                let id = MapSet::from_slot(slot);
                if matches(id) {
                    return Some(id);
                }
            }
            current = self.next[slot];
        }
        None
    }

    /// Registers the node stored at the next arena slot.
    ///
    /// Slots must be inserted densely, in allocation order.
    pub fn insert(&mut self, id: MapSet, hash: u64) {
        let slot = id.slot();
        assert_eq!(slot, self.next.len(), "Unique table slots must be inserted in order");

        let bucket = self.bucket_index(hash);
        self.next.push(self.buckets[bucket]);
        self.hashes.push(hash);
        self.buckets[bucket] = slot as u32;

        if self.next.len() > self.buckets.len() {
            self.grow();
        }
    }

    /// Doubles the bucket array and relinks every chain.
    fn grow(&mut self) {
        let num_buckets = self.buckets.len() * 2;
        log::debug!("unique table: growing to {} buckets", num_buckets);
        self.buckets = vec![NO_NEXT; num_buckets];
        self.bitmask = (num_buckets - 1) as u64;
        for slot in 0..self.next.len() {
            let bucket = self.bucket_index(self.hashes[slot]);
            self.next[slot] = self.buckets[bucket];
            self.buckets[bucket] = slot as u32;
        }
    }

    /// Number of interned nodes.
    pub fn len(&self) -> usize {
        self.next.len()
    }

    /// Returns true if no node has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    /// Number of buckets currently allocated.
    pub fn num_buckets(&self) -> usize {
        self.buckets.len()
    }
}
