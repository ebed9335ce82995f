use std::hash::{Hash, Hasher};

use crate::reference::MapSet;
use crate::types::{Dim, Value};
use crate::utils::FnvHasher;

/// An interned MapSet node: a decision on one dimension.
///
/// # Fields
///
/// - `dim`: the dimension decided at this node
/// - `fallthrough`: states where `dim` is null (may be `MapSet::EMPTY`)
/// - `branches`: states where `dim` takes a non-null value, keyed by that value
///
/// # Invariants
///
/// - `branches` is non-empty (otherwise the node collapses to `fallthrough`)
/// - `branches` is sorted strictly by value and never contains the null value
/// - no branch child is `MapSet::EMPTY`
/// - every dimension mentioned below this node is greater than `dim`
///
/// # Semantics
///
/// ```text
/// S(node) = { s | s ∈ S(fallthrough) } ∪ ⋃ᵥ { s ∪ {dim = v} | s ∈ S(branches[v]) }
/// ```
#[derive(Debug, Clone)]
pub struct Node<A, V> {
    pub dim: A,
    pub fallthrough: MapSet,
    pub branches: Box<[(V, MapSet)]>,
    hash: u64,
}

impl<A: Dim, V: Value> Node<A, V> {
    pub fn new(dim: A, fallthrough: MapSet, branches: Box<[(V, MapSet)]>) -> Self {
        debug_assert!(!branches.is_empty(), "Node must have at least one non-null branch");
        debug_assert!(
            branches.windows(2).all(|w| w[0].0 < w[1].0),
            "Node branches must be strictly sorted by value"
        );
        debug_assert!(
            branches.iter().all(|(_, child)| !child.is_empty()),
            "Node branches must not point to the empty set"
        );
        let hash = Self::compute_hash(&dim, fallthrough, &branches);
        Self {
            dim,
            fallthrough,
            branches,
            hash,
        }
    }

    /// Content hash over `(dim, fallthrough, [(value, child)])`, in order.
    pub fn compute_hash(dim: &A, fallthrough: MapSet, branches: &[(V, MapSet)]) -> u64 {
        let mut hasher = FnvHasher::default();
        dim.hash(&mut hasher);
        hasher.write_u32(fallthrough.raw());
        for (value, child) in branches {
            value.hash(&mut hasher);
            hasher.write_u32(child.raw());
        }
        hasher.finish()
    }

    /// Returns the precomputed hash.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Structural equality against a candidate that has not been interned yet.
    ///
    /// Children are compared by handle, which is exact because they are
    /// already canonical.
    pub fn matches(&self, dim: &A, fallthrough: MapSet, branches: &[(V, MapSet)]) -> bool {
        self.dim == *dim && self.fallthrough == fallthrough && *self.branches == *branches
    }

    /// Iterates over every child handle, the fall-through one first.
    pub fn children(&self) -> impl Iterator<Item = MapSet> + '_ {
        std::iter::once(self.fallthrough)
            .filter(|child| !child.is_empty())
            .chain(self.branches.iter().map(|&(_, child)| child))
    }

    /// Returns every `(value, child)` pair, the null case included, sorted by value.
    pub fn pairs(&self, null: &V) -> Vec<(V, MapSet)> {
        let mut pairs = Vec::with_capacity(self.branches.len() + 1);
        let mut pending = !self.fallthrough.is_empty();
        for (value, child) in self.branches.iter() {
            if pending && null < value {
                pairs.push((null.clone(), self.fallthrough));
                pending = false;
            }
            pairs.push((value.clone(), *child));
        }
        if pending {
            pairs.push((null.clone(), self.fallthrough));
        }
        pairs
    }

    /// Looks up the child for `value` (the fall-through child for null).
    pub fn child(&self, value: &V, null: &V) -> MapSet {
        if value == null {
            return self.fallthrough;
        }
        match self.branches.binary_search_by(|(v, _)| v.cmp(value)) {
            Ok(i) => self.branches[i].1,
            Err(_) => MapSet::EMPTY,
        }
    }
}

impl<A: Dim, V: Value> PartialEq for Node<A, V> {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.matches(&other.dim, other.fallthrough, &other.branches)
    }
}

impl<A: Dim, V: Value> Eq for Node<A, V> {}
