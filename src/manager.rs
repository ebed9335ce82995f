//! The MapSet manager: owns every node and implements the set algebra.
//!
//! # Overview
//!
//! A MapSet is a set of *states*. A state binds every dimension to a value;
//! dimensions bound to the manager's null value are simply not mentioned.
//! Sets are stored as reduced, ordered, hash-consed decision diagrams:
//!
//! - each node decides one dimension, with one child per non-null value plus
//!   a fall-through child for the null value;
//! - dimensions appear in increasing `Ord` order on every path;
//! - identical nodes are shared, so equal sets have equal [`MapSet`] handles.
//!
//! # Quick Start
//!
//! ```
//! use mapset_rs::manager::MapSetManager;
//! use mapset_rs::reference::MapSet;
//! use num_bigint::BigUint;
//!
//! let mgr = MapSetManager::<&str, i32>::new();
//!
//! // {x ∈ {1, 2}} × {y ∈ {5, 6}}
//! let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2]);
//! let s = mgr.cartesian_product(s, &"y", &[5, 6]);
//! assert_eq!(mgr.count(s), BigUint::from(4u32));
//!
//! // Restrict to y = 5 (y is projected out of the result)
//! let t = mgr.get(s, &"y", &5);
//! assert_eq!(mgr.all(t, &"x"), vec![1, 2]);
//!
//! // Union is canonical: rebuilding the same states yields the same handle
//! let u = mgr.merge(mgr.add_dim(t, &"y", &5), mgr.add_dim(mgr.get(s, &"y", &6), &"y", &6));
//! assert_eq!(u, s);
//! ```

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

use log::{debug, trace};
use num_bigint::BigUint;

use crate::cache::{CacheStats, OpCache, PairKey};
use crate::config::MapSetConfig;
use crate::node::Node;
use crate::reference::MapSet;
use crate::types::{Dim, State, Value};
use crate::unique::UniqueTable;

/// The MapSet manager: owns all nodes and performs all operations.
///
/// Handles from different managers must never be mixed.
pub struct MapSetManager<A, V> {
    /// The implicit value of every dimension not mentioned on a path.
    null: V,

    /// Node arena. Handle `#n` lives at slot `n - 2`.
    nodes: RefCell<Vec<Rc<Node<A, V>>>>,

    /// Hash-consing table over the arena.
    unique: RefCell<UniqueTable>,

    /// Memoized unions, keyed by the (unordered) operand pair.
    merge_cache: RefCell<OpCache<PairKey, MapSet>>,

    /// Memoized state counts.
    count_cache: RefCell<OpCache<MapSet, BigUint>>,
}

impl<A: Dim, V: Value + Default> MapSetManager<A, V> {
    /// Creates a manager whose null value is `V::default()`.
    pub fn new() -> Self {
        Self::with_null(V::default())
    }
}

impl<A: Dim, V: Value + Default> Default for MapSetManager<A, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A, V> Debug for MapSetManager<A, V> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let unique = self.unique.borrow();
        f.debug_struct("MapSetManager")
            .field("nodes", &self.nodes.borrow().len())
            .field("buckets", &unique.num_buckets())
            .field("merge_cache", &self.merge_cache.borrow().len())
            .finish()
    }
}

impl<A: Dim, V: Value> MapSetManager<A, V> {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Creates a manager with an explicit null value.
    pub fn with_null(null: V) -> Self {
        Self::with_config(null, MapSetConfig::default())
    }

    /// Creates a manager with an explicit null value and sizing.
    pub fn with_config(null: V, config: MapSetConfig) -> Self {
        debug!("MapSetManager::with_config(null = {:?}, config = {:?})", null, config);
        Self {
            null,
            nodes: RefCell::new(Vec::with_capacity(config.node_capacity)),
            unique: RefCell::new(UniqueTable::new(config.bucket_bits)),
            merge_cache: RefCell::new(OpCache::with_capacity(config.cache_capacity)),
            count_cache: RefCell::new(OpCache::with_capacity(config.cache_capacity)),
        }
    }

    /// The null value of this manager.
    pub fn null(&self) -> &V {
        &self.null
    }

    pub fn is_null(&self, value: &V) -> bool {
        *value == self.null
    }

    /// The empty set (no states).
    pub fn empty(&self) -> MapSet {
        MapSet::EMPTY
    }

    /// The unit set (one state, every dimension null).
    pub fn unit(&self) -> MapSet {
        MapSet::UNIT
    }

    // ========================================================================
    // Node cache
    // ========================================================================

    /// Access node data.
    ///
    /// # Panics
    ///
    /// Panics if `s` is a sentinel.
    pub fn node(&self, s: MapSet) -> Rc<Node<A, V>> {
        assert!(!s.is_terminal(), "Sentinel {} has no node", s);
        Rc::clone(&self.nodes.borrow()[s.slot()])
    }

    /// Returns true if every dimension mentioned in `s` is ordered after `dim`.
    pub(crate) fn is_below(&self, s: MapSet, dim: &A) -> bool {
        s.is_terminal() || self.nodes.borrow()[s.slot()].dim > *dim
    }

    /// Interns a candidate node and returns its canonical handle.
    ///
    /// If a structurally equal node already exists, its handle is returned;
    /// otherwise the candidate is stored. A candidate without non-null
    /// branches is not a node at all and reduces to `fallthrough`.
    ///
    /// # Panics
    ///
    /// Panics if the branches are not strictly sorted, contain the null value
    /// or an empty child.
    pub fn mk_node(&self, dim: A, fallthrough: MapSet, branches: Vec<(V, MapSet)>) -> MapSet {
        if branches.is_empty() {
            return fallthrough;
        }

        assert!(
            branches.windows(2).all(|w| w[0].0 < w[1].0),
            "Branches of {:?} must be strictly sorted by value",
            dim
        );
        assert!(
            branches.iter().all(|(v, c)| !self.is_null(v) && !c.is_empty()),
            "Branches of {:?} must not contain the null value or the empty set",
            dim
        );
        debug_assert!(
            self.is_below(fallthrough, &dim) && branches.iter().all(|(_, c)| self.is_below(*c, &dim)),
            "Children of {:?} must only mention later dimensions",
            dim
        );

        let hash = Node::compute_hash(&dim, fallthrough, &branches);
        let found = {
            let unique = self.unique.borrow();
            let nodes = self.nodes.borrow();
            unique.find(hash, |id| nodes[id.slot()].matches(&dim, fallthrough, &branches))
        };
        if let Some(id) = found {
            return id;
        }

        let node = Node::new(dim, fallthrough, branches.into_boxed_slice());
        let id = {
            let mut nodes = self.nodes.borrow_mut();
            nodes.push(Rc::new(node));
            MapSet::from_slot(nodes.len() - 1)
        };
        self.unique.borrow_mut().insert(id, hash);
        trace!("mk_node: new node {}", id);
        id
    }

    /// Sorts `(value, child)` pairs and drops empty children.
    ///
    /// Pairs with equal values are merged when `merge_duplicates` is set;
    /// otherwise the caller guarantees values are distinct.
    pub(crate) fn sort_pairs(&self, mut pairs: Vec<(V, MapSet)>, merge_duplicates: bool) -> Vec<(V, MapSet)> {
        pairs.retain(|(_, c)| !c.is_empty());
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        if !merge_duplicates {
            debug_assert!(
                pairs.windows(2).all(|w| w[0].0 != w[1].0),
                "Injective mapping produced duplicate values"
            );
            return pairs;
        }
        let mut out: Vec<(V, MapSet)> = Vec::with_capacity(pairs.len());
        for (value, child) in pairs {
            match out.last_mut() {
                Some((last, merged)) if *last == value => *merged = self.merge(*merged, child),
                _ => out.push((value, child)),
            }
        }
        out
    }

    /// Splits sorted pairs into the null child and the non-null branches.
    pub(crate) fn split_null(&self, mut pairs: Vec<(V, MapSet)>) -> (MapSet, Vec<(V, MapSet)>) {
        match pairs.binary_search_by(|(v, _)| v.cmp(&self.null)) {
            Ok(i) => {
                let (_, fallthrough) = pairs.remove(i);
                (fallthrough, pairs)
            }
            Err(_) => (MapSet::EMPTY, pairs),
        }
    }

    /// Builds the set `⋃ { add_dim(child, dim, value) | (value, child) ∈ pairs }`.
    ///
    /// Children must not mention `dim`. When every child only mentions
    /// dimensions ordered after `dim`, the result is a single node; otherwise
    /// `dim` is pushed down into each child and the results are merged.
    pub fn from_branches(&self, dim: &A, pairs: Vec<(V, MapSet)>) -> MapSet {
        self.build(dim, pairs, true)
    }

    pub(crate) fn build(&self, dim: &A, pairs: Vec<(V, MapSet)>, merge_duplicates: bool) -> MapSet {
        let pairs = self.sort_pairs(pairs, merge_duplicates);
        if pairs.iter().all(|(_, c)| self.is_below(*c, dim)) {
            let (fallthrough, branches) = self.split_null(pairs);
            return self.mk_node(dim.clone(), fallthrough, branches);
        }
        trace!("build: pushing {:?} below earlier dimensions", dim);
        pairs.into_iter().fold(MapSet::EMPTY, |acc, (value, child)| {
            let child = self.add_dim(child, dim, &value);
            self.merge(acc, child)
        })
    }

    /// Rebuilds the node `n` (handle `s`) with every child mapped through `f`.
    ///
    /// `f` must not introduce dimensions ordered before `n.dim`.
    /// Returns `s` itself when no child changes.
    fn map_below(&self, s: MapSet, n: &Node<A, V>, mut f: impl FnMut(MapSet) -> MapSet) -> MapSet {
        let fallthrough = if n.fallthrough.is_empty() {
            MapSet::EMPTY
        } else {
            f(n.fallthrough)
        };
        let mut changed = fallthrough != n.fallthrough;
        let mut branches = Vec::with_capacity(n.branches.len());
        for (value, child) in n.branches.iter() {
            let mapped = f(*child);
            changed |= mapped != *child;
            if !mapped.is_empty() {
                branches.push((value.clone(), mapped));
            }
        }
        if !changed {
            return s;
        }
        self.mk_node(n.dim.clone(), fallthrough, branches)
    }

    // ========================================================================
    // Construction operations
    // ========================================================================

    /// Set union of the states of `a` and `b`.
    ///
    /// ```text
    /// merge(a, ⊥) = a        merge(a, a) = a        merge(a, b) = merge(b, a)
    /// ```
    pub fn merge(&self, a: MapSet, b: MapSet) -> MapSet {
        if a.is_empty() {
            return b;
        }
        if b.is_empty() {
            return a;
        }
        if a == b {
            return a;
        }

        let key = PairKey::commutative(a, b);
        let cached = self.merge_cache.borrow_mut().get(&key);
        if let Some(result) = cached {
            return result;
        }

        let result = if a.is_unit() {
            self.merge_unit(b)
        } else if b.is_unit() {
            self.merge_unit(a)
        } else {
            let na = self.node(a);
            let nb = self.node(b);
            match na.dim.cmp(&nb.dim) {
                Ordering::Less => {
                    // `b` does not mention na.dim: all its states take the null branch.
                    let fallthrough = self.merge(na.fallthrough, b);
                    self.mk_node(na.dim.clone(), fallthrough, na.branches.to_vec())
                }
                Ordering::Greater => {
                    let fallthrough = self.merge(a, nb.fallthrough);
                    self.mk_node(nb.dim.clone(), fallthrough, nb.branches.to_vec())
                }
                Ordering::Equal => {
                    let fallthrough = self.merge(na.fallthrough, nb.fallthrough);
                    let branches = self.merge_branches(&na.branches, &nb.branches);
                    self.mk_node(na.dim.clone(), fallthrough, branches)
                }
            }
        };

        trace!("merge({}, {}) -> {}", a, b, result);
        self.merge_cache.borrow_mut().insert(key, result);
        result
    }

    fn merge_unit(&self, s: MapSet) -> MapSet {
        let n = self.node(s);
        let fallthrough = self.merge(n.fallthrough, MapSet::UNIT);
        self.mk_node(n.dim.clone(), fallthrough, n.branches.to_vec())
    }

    /// Merge-join of two sorted branch lists.
    fn merge_branches(&self, xs: &[(V, MapSet)], ys: &[(V, MapSet)]) -> Vec<(V, MapSet)> {
        let mut out = Vec::with_capacity(xs.len() + ys.len());
        let (mut i, mut j) = (0, 0);
        while i < xs.len() && j < ys.len() {
            match xs[i].0.cmp(&ys[j].0) {
                Ordering::Less => {
                    out.push(xs[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    out.push(ys[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    out.push((xs[i].0.clone(), self.merge(xs[i].1, ys[j].1)));
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&xs[i..]);
        out.extend_from_slice(&ys[j..]);
        out
    }

    /// Every state of `s` extended with `dim = v`, for every `v` in `values`.
    ///
    /// # Panics
    ///
    /// Panics if `dim` is already mentioned in `s`.
    pub fn cartesian_product(&self, s: MapSet, dim: &A, values: &[V]) -> MapSet {
        assert!(
            !self.has_dim(s, dim),
            "Dimension {:?} is already present in {}",
            dim,
            s
        );
        self.unchecked_cartesian_product(s, dim, values)
    }

    /// Like [`cartesian_product`][Self::cartesian_product], without scanning
    /// `s` for `dim` first. The caller guarantees `dim` is fresh.
    pub fn unchecked_cartesian_product(&self, s: MapSet, dim: &A, values: &[V]) -> MapSet {
        debug!("cartesian_product(s = {}, dim = {:?}, values = {:?})", s, dim, values);
        if s.is_empty() || values.is_empty() {
            return MapSet::EMPTY;
        }
        let mut values = values.to_vec();
        values.sort();
        values.dedup();
        let has_null = values.contains(&self.null);
        values.retain(|v| !self.is_null(v));

        let mut memo = HashMap::new();
        self.product_(s, dim, has_null, &values, &mut memo)
    }

    fn product_(
        &self,
        s: MapSet,
        dim: &A,
        has_null: bool,
        values: &[V],
        memo: &mut HashMap<MapSet, MapSet>,
    ) -> MapSet {
        if s.is_empty() {
            return MapSet::EMPTY;
        }
        if self.is_below(s, dim) {
            let fallthrough = if has_null { s } else { MapSet::EMPTY };
            let branches = values.iter().map(|v| (v.clone(), s)).collect();
            return self.mk_node(dim.clone(), fallthrough, branches);
        }
        let n = self.node(s);
        assert!(n.dim != *dim, "Dimension {:?} is already present", dim);
        if let Some(&result) = memo.get(&s) {
            return result;
        }
        let result = self.map_below(s, &n, |c| self.product_(c, dim, has_null, values, memo));
        memo.insert(s, result);
        result
    }

    /// Binds `dim = value` in every state of `s`, where `dim` is absent.
    ///
    /// Binding the null value is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if `dim` is already mentioned in `s`.
    pub fn add_dim(&self, s: MapSet, dim: &A, value: &V) -> MapSet {
        if self.is_null(value) {
            debug_assert!(!self.has_dim(s, dim), "Dimension {:?} is already present", dim);
            return s;
        }
        let mut memo = HashMap::new();
        self.add_dim_(s, dim, value, &mut memo)
    }

    fn add_dim_(&self, s: MapSet, dim: &A, value: &V, memo: &mut HashMap<MapSet, MapSet>) -> MapSet {
        if s.is_empty() {
            return MapSet::EMPTY;
        }
        if self.is_below(s, dim) {
            return self.mk_node(dim.clone(), MapSet::EMPTY, vec![(value.clone(), s)]);
        }
        let n = self.node(s);
        assert!(n.dim != *dim, "Dimension {:?} is already present", dim);
        if let Some(&result) = memo.get(&s) {
            return result;
        }
        let result = self.map_below(s, &n, |c| self.add_dim_(c, dim, value, memo));
        memo.insert(s, result);
        result
    }

    /// Overwrites `dim` with `value` in every state of `s`.
    pub fn set_dim(&self, s: MapSet, dim: &A, value: &V) -> MapSet {
        let removed = self.remove(s, dim);
        self.add_dim(removed, dim, value)
    }

    // ========================================================================
    // Restriction and projection
    // ========================================================================

    /// The states of `s` where `dim == value`, with `dim` projected out.
    ///
    /// For the null value this selects the states where `dim` is absent.
    pub fn get(&self, s: MapSet, dim: &A, value: &V) -> MapSet {
        trace!("get(s = {}, dim = {:?}, value = {:?})", s, dim, value);
        let mut memo = HashMap::new();
        self.get_(s, dim, value, &mut memo)
    }

    fn get_(&self, s: MapSet, dim: &A, value: &V, memo: &mut HashMap<MapSet, MapSet>) -> MapSet {
        if s.is_empty() {
            return MapSet::EMPTY;
        }
        if self.is_below(s, dim) {
            // `dim` is null in every state of `s`.
            return if self.is_null(value) { s } else { MapSet::EMPTY };
        }
        let n = self.node(s);
        if n.dim == *dim {
            return n.child(value, &self.null);
        }
        if let Some(&result) = memo.get(&s) {
            return result;
        }
        let result = self.map_below(s, &n, |c| self.get_(c, dim, value, memo));
        memo.insert(s, result);
        result
    }

    /// Projects `dim` out: the value of `dim` is forgotten in every state.
    pub fn remove(&self, s: MapSet, dim: &A) -> MapSet {
        trace!("remove(s = {}, dim = {:?})", s, dim);
        let mut memo = HashMap::new();
        self.remove_(s, dim, &mut memo)
    }

    fn remove_(&self, s: MapSet, dim: &A, memo: &mut HashMap<MapSet, MapSet>) -> MapSet {
        if self.is_below(s, dim) {
            return s;
        }
        let n = self.node(s);
        if n.dim == *dim {
            return n.children().fold(MapSet::EMPTY, |acc, c| self.merge(acc, c));
        }
        if let Some(&result) = memo.get(&s) {
            return result;
        }
        let result = self.map_below(s, &n, |c| self.remove_(c, dim, memo));
        memo.insert(s, result);
        result
    }

    /// Projects out every dimension for which `predicate` holds.
    pub fn remove_where(&self, s: MapSet, predicate: impl Fn(&A) -> bool) -> MapSet {
        let mut memo = HashMap::new();
        self.remove_where_(s, &predicate, &mut memo)
    }

    fn remove_where_(
        &self,
        s: MapSet,
        predicate: &impl Fn(&A) -> bool,
        memo: &mut HashMap<MapSet, MapSet>,
    ) -> MapSet {
        if s.is_terminal() {
            return s;
        }
        if let Some(&result) = memo.get(&s) {
            return result;
        }
        let n = self.node(s);
        let result = if predicate(&n.dim) {
            let children: Vec<MapSet> = n.children().collect();
            children.into_iter().fold(MapSet::EMPTY, |acc, c| {
                let c = self.remove_where_(c, predicate, memo);
                self.merge(acc, c)
            })
        } else {
            self.map_below(s, &n, |c| self.remove_where_(c, predicate, memo))
        };
        memo.insert(s, result);
        result
    }

    /// Applies `f` to every child of the root of `s` and reassembles the root.
    ///
    /// Equal children are mapped once. The root dimension itself is not
    /// re-examined; `f` may introduce any dimension except it. Sentinels
    /// have no children and are returned unchanged.
    pub fn lazy_map(&self, s: MapSet, mut f: impl FnMut(MapSet) -> MapSet) -> MapSet {
        if s.is_terminal() {
            return s;
        }
        let n = self.node(s);
        let mut memo: HashMap<MapSet, MapSet> = HashMap::new();
        let mut changed = false;
        let pairs: Vec<(V, MapSet)> = n
            .pairs(&self.null)
            .into_iter()
            .map(|(value, child)| {
                let mapped = *memo.entry(child).or_insert_with(|| f(child));
                changed |= mapped != child;
                (value, mapped)
            })
            .collect();
        if !changed {
            return s;
        }
        self.from_branches(&n.dim, pairs)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Number of distinct states encoded by `s`.
    pub fn count(&self, s: MapSet) -> BigUint {
        if s.is_empty() {
            return BigUint::ZERO;
        }
        if s.is_unit() {
            return BigUint::from(1u32);
        }
        let cached = self.count_cache.borrow_mut().get(&s);
        if let Some(count) = cached {
            return count;
        }
        let n = self.node(s);
        let count = n.children().map(|c| self.count(c)).sum::<BigUint>();
        self.count_cache.borrow_mut().insert(s, count.clone());
        count
    }

    /// Sorted values `dim` takes in `s`, the null value included when some
    /// state leaves `dim` unbound.
    pub fn all(&self, s: MapSet, dim: &A) -> Vec<V> {
        let mut values = BTreeSet::new();
        let mut visited = HashSet::new();
        self.all_(s, dim, &mut values, &mut visited);
        values.into_iter().collect()
    }

    fn all_(&self, s: MapSet, dim: &A, values: &mut BTreeSet<V>, visited: &mut HashSet<MapSet>) {
        if s.is_empty() || !visited.insert(s) {
            return;
        }
        if self.is_below(s, dim) {
            values.insert(self.null.clone());
            return;
        }
        let n = self.node(s);
        if n.dim == *dim {
            if !n.fallthrough.is_empty() {
                values.insert(self.null.clone());
            }
            values.extend(n.branches.iter().map(|(v, _)| v.clone()));
            return;
        }
        for c in n.children() {
            self.all_(c, dim, values, visited);
        }
    }

    /// Returns true if some state of `s` binds `dim` to a non-null value.
    pub fn has_dim(&self, s: MapSet, dim: &A) -> bool {
        let mut visited = HashSet::new();
        self.has_dim_(s, dim, &mut visited)
    }

    fn has_dim_(&self, s: MapSet, dim: &A, visited: &mut HashSet<MapSet>) -> bool {
        if self.is_below(s, dim) || !visited.insert(s) {
            return false;
        }
        let n = self.node(s);
        n.dim == *dim || n.children().any(|c| self.has_dim_(c, dim, visited))
    }

    /// Every dimension mentioned in `s`.
    pub fn dims(&self, s: MapSet) -> BTreeSet<A> {
        let mut dims = BTreeSet::new();
        let mut visited = HashSet::new();
        let mut stack = vec![s];
        while let Some(s) = stack.pop() {
            if s.is_terminal() || !visited.insert(s) {
                continue;
            }
            let n = self.node(s);
            dims.insert(n.dim.clone());
            stack.extend(n.children());
        }
        dims
    }

    /// Every dimension mentioned in `s`, with the sorted values it takes
    /// (the null value included when some state leaves it unbound).
    pub fn dims_and_values(&self, s: MapSet) -> BTreeMap<A, Vec<V>> {
        let mut table: BTreeMap<A, BTreeSet<V>> = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut stack = vec![s];
        while let Some(s) = stack.pop() {
            if s.is_terminal() || !visited.insert(s) {
                continue;
            }
            let n = self.node(s);
            let values = table.entry(n.dim.clone()).or_default();
            if !n.fallthrough.is_empty() {
                values.insert(self.null.clone());
            }
            values.extend(n.branches.iter().map(|(v, _)| v.clone()));
            stack.extend(n.children());
        }

        // A dimension is also null in every state whose path skips it.
        let mut memo = HashMap::new();
        let required = self.required_dims(s, &mut memo);
        table
            .into_iter()
            .map(|(dim, mut values)| {
                if !required.contains(&dim) {
                    values.insert(self.null.clone());
                }
                (dim, values.into_iter().collect())
            })
            .collect()
    }

    /// Dimensions bound to a non-null value in every state of `s`.
    fn required_dims(&self, s: MapSet, memo: &mut HashMap<MapSet, Rc<BTreeSet<A>>>) -> Rc<BTreeSet<A>> {
        if s.is_terminal() {
            return Rc::new(BTreeSet::new());
        }
        if let Some(required) = memo.get(&s) {
            return Rc::clone(required);
        }
        let n = self.node(s);
        let mut required: Option<BTreeSet<A>> = None;
        for c in n.children() {
            let below = self.required_dims(c, memo);
            required = Some(match required {
                None => (*below).clone(),
                Some(acc) => acc.intersection(&below).cloned().collect(),
            });
        }
        let mut required = required.unwrap_or_default();
        if n.fallthrough.is_empty() {
            required.insert(n.dim.clone());
        }
        let required = Rc::new(required);
        memo.insert(s, Rc::clone(&required));
        required
    }

    /// Returns true if `s` contains the state given by `assignment`.
    ///
    /// Dimensions missing from `assignment` are taken to be null.
    pub fn contains(&self, s: MapSet, assignment: &[(A, V)]) -> bool {
        let bound: BTreeMap<&A, &V> = assignment
            .iter()
            .filter(|(_, v)| !self.is_null(v))
            .map(|(d, v)| (d, v))
            .collect();
        let mut consumed = 0;
        let mut current = s;
        loop {
            if current.is_empty() {
                return false;
            }
            if current.is_unit() {
                // Every bound dimension must have been decided on the path.
                return consumed == bound.len();
            }
            let n = self.node(current);
            let value = bound.get(&n.dim).copied().unwrap_or(&self.null);
            if !self.is_null(value) {
                consumed += 1;
            }
            current = n.child(value, &self.null);
        }
    }

    /// Builds the set containing exactly one explicit state.
    pub fn singleton(&self, state: &[(A, V)]) -> MapSet {
        let mut state: State<A, V> = state.iter().filter(|(_, v)| !self.is_null(v)).cloned().collect();
        state.sort_by(|a, b| b.0.cmp(&a.0));
        state.dedup_by(|a, b| a.0 == b.0);
        state
            .into_iter()
            .fold(MapSet::UNIT, |acc, (dim, value)| self.mk_node(dim, MapSet::EMPTY, vec![(value, acc)]))
    }

    /// Number of distinct nodes reachable from `s` (sentinels excluded).
    pub fn node_count(&self, s: MapSet) -> usize {
        let mut visited = HashSet::new();
        let mut stack = vec![s];
        while let Some(s) = stack.pop() {
            if s.is_terminal() || !visited.insert(s) {
                continue;
            }
            stack.extend(self.node(s).children());
        }
        visited.len()
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    /// Total number of nodes interned by the manager.
    pub fn num_nodes(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn merge_cache_stats(&self) -> CacheStats {
        self.merge_cache.borrow().stats()
    }

    pub fn count_cache_stats(&self) -> CacheStats {
        self.count_cache.borrow().stats()
    }

    /// Clears the operation caches. Interned nodes stay valid.
    pub fn clear_caches(&self) {
        self.merge_cache.borrow_mut().clear();
        self.count_cache.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    type Mgr = MapSetManager<&'static str, i32>;

    fn xy(mgr: &Mgr) -> MapSet {
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2, 3]);
        mgr.cartesian_product(s, &"y", &[0, 7])
    }

    #[test]
    fn test_sentinels() {
        let mgr = Mgr::new();
        assert_eq!(mgr.count(mgr.empty()), BigUint::ZERO);
        assert_eq!(mgr.count(mgr.unit()), BigUint::from(1u32));
        assert_eq!(mgr.all(MapSet::UNIT, &"x"), vec![0]);
        assert!(mgr.all(MapSet::EMPTY, &"x").is_empty());
    }

    #[test]
    fn test_mk_node_dedup() {
        let mgr = Mgr::new();
        let a = mgr.mk_node("x", MapSet::EMPTY, vec![(1, MapSet::UNIT)]);
        let b = mgr.mk_node("x", MapSet::EMPTY, vec![(1, MapSet::UNIT)]);
        let c = mgr.mk_node("x", MapSet::UNIT, vec![(1, MapSet::UNIT)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(mgr.num_nodes(), 2);

        // No non-null branch: collapses to the fall-through child.
        assert_eq!(mgr.mk_node("x", a, vec![]), a);
    }

    #[test]
    #[should_panic(expected = "null value")]
    fn test_mk_node_rejects_null_branch() {
        let mgr = Mgr::new();
        mgr.mk_node("x", MapSet::EMPTY, vec![(0, MapSet::UNIT)]);
    }

    #[test]
    fn test_cartesian_product_count() {
        let mgr = Mgr::new();
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[3, 1, 2, 1]);
        assert_eq!(mgr.count(s), BigUint::from(3u32));
        assert_eq!(mgr.all(s, &"x"), vec![1, 2, 3]);

        let s = xy(&mgr);
        assert_eq!(mgr.count(s), BigUint::from(6u32));
        assert_eq!(mgr.all(s, &"y"), vec![0, 7]);
    }

    #[test]
    fn test_cartesian_product_inserts_by_order() {
        let mgr = Mgr::new();
        // Build in reverse order: y first, then x.
        let a = mgr.cartesian_product(MapSet::UNIT, &"y", &[0, 7]);
        let a = mgr.cartesian_product(a, &"x", &[1, 2, 3]);
        assert_eq!(a, xy(&mgr));
        assert_eq!(mgr.node(a).dim, "x");
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn test_cartesian_product_duplicate_dim() {
        let mgr = Mgr::new();
        let s = xy(&mgr);
        mgr.cartesian_product(s, &"y", &[5]);
    }

    #[test]
    fn test_cartesian_product_with_only_null() {
        let mgr = Mgr::new();
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[0]);
        assert_eq!(s, MapSet::UNIT);
        assert_eq!(mgr.cartesian_product(MapSet::UNIT, &"x", &[]), MapSet::EMPTY);
    }

    #[test]
    fn test_merge_basics() {
        let mgr = Mgr::new();
        let a = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2]);
        let b = mgr.cartesian_product(MapSet::UNIT, &"x", &[2, 3]);
        let ab = mgr.merge(a, b);
        assert_eq!(ab, mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2, 3]));
        assert_eq!(mgr.merge(a, a), a);
        assert_eq!(mgr.merge(a, MapSet::EMPTY), a);
        assert_eq!(mgr.merge(b, a), ab);
    }

    #[test]
    fn test_merge_different_dims() {
        let mgr = Mgr::new();
        let a = mgr.cartesian_product(MapSet::UNIT, &"x", &[1]);
        let b = mgr.cartesian_product(MapSet::UNIT, &"y", &[2]);
        let ab = mgr.merge(a, b);
        assert_eq!(mgr.count(ab), BigUint::from(2u32));
        assert!(mgr.contains(ab, &[("x", 1)]));
        assert!(mgr.contains(ab, &[("y", 2)]));
        assert!(!mgr.contains(ab, &[("x", 1), ("y", 2)]));
        assert!(!mgr.contains(ab, &[]));
        assert_eq!(mgr.all(ab, &"x"), vec![0, 1]);
    }

    #[test]
    fn test_merge_with_unit() {
        let mgr = Mgr::new();
        let a = mgr.cartesian_product(MapSet::UNIT, &"x", &[1]);
        let u = mgr.merge(a, MapSet::UNIT);
        assert_eq!(u, mgr.cartesian_product(MapSet::UNIT, &"x", &[0, 1]));
        assert!(mgr.contains(u, &[]));
    }

    #[test]
    fn test_get_projects_dim_out() {
        let mgr = Mgr::new();
        let s = xy(&mgr);
        let t = mgr.get(s, &"x", &2);
        assert_eq!(t, mgr.cartesian_product(MapSet::UNIT, &"y", &[0, 7]));
        assert!(!mgr.has_dim(t, &"x"));

        assert_eq!(mgr.get(s, &"y", &7), mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2, 3]));
        assert_eq!(mgr.get(s, &"y", &0), mgr.get(s, &"y", &7));
        assert_eq!(mgr.get(s, &"x", &9), MapSet::EMPTY);
        assert_eq!(mgr.get(s, &"z", &1), MapSet::EMPTY);
        assert_eq!(mgr.get(s, &"z", &0), s);
    }

    #[test]
    fn test_remove() {
        let mgr = Mgr::new();
        let s = xy(&mgr);
        let r = mgr.remove(s, &"x");
        assert_eq!(r, mgr.cartesian_product(MapSet::UNIT, &"y", &[0, 7]));
        assert_eq!(mgr.remove(s, &"z"), s);
        assert_eq!(mgr.remove_where(s, |_| true), MapSet::UNIT);
        assert_eq!(mgr.remove_where(s, |d| *d == "y"), mgr.remove(s, &"y"));
    }

    #[test]
    fn test_add_dim_and_set_dim() {
        let mgr = Mgr::new();
        let s = mgr.cartesian_product(MapSet::UNIT, &"y", &[1, 2]);
        let t = mgr.add_dim(s, &"x", &5);
        assert_eq!(mgr.all(t, &"x"), vec![5]);
        assert_eq!(mgr.count(t), BigUint::from(2u32));
        assert_eq!(mgr.add_dim(s, &"x", &0), s);

        let u = mgr.set_dim(t, &"y", &9);
        assert_eq!(mgr.count(u), BigUint::from(1u32));
        assert!(mgr.contains(u, &[("x", 5), ("y", 9)]));
    }

    #[test]
    #[should_panic(expected = "already present")]
    fn test_add_dim_duplicate() {
        let mgr = Mgr::new();
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[1]);
        mgr.add_dim(s, &"x", &2);
    }

    #[test]
    fn test_from_branches_pushes_dim_down() {
        let mgr = Mgr::new();
        let a = mgr.cartesian_product(MapSet::UNIT, &"a", &[1]);
        let b = mgr.cartesian_product(MapSet::UNIT, &"a", &[2]);
        // Children mention "a", which is ordered before "m".
        let s = mgr.from_branches(&"m", vec![(10, a), (20, b), (10, b)]);
        assert_eq!(mgr.count(s), BigUint::from(3u32));
        assert!(mgr.contains(s, &[("a", 1), ("m", 10)]));
        assert!(mgr.contains(s, &[("a", 2), ("m", 10)]));
        assert!(mgr.contains(s, &[("a", 2), ("m", 20)]));
        assert_eq!(mgr.node(s).dim, "a");
    }

    #[test]
    fn test_lazy_map() {
        let mgr = Mgr::new();
        let s = xy(&mgr);
        assert_eq!(mgr.lazy_map(s, |c| c), s);
        let t = mgr.lazy_map(s, |c| mgr.remove(c, &"y"));
        assert_eq!(t, mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2, 3]));
        assert_eq!(mgr.lazy_map(MapSet::UNIT, |_| MapSet::EMPTY), MapSet::UNIT);
    }

    #[test]
    fn test_dims_and_values() {
        let mgr = Mgr::new();
        let a = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2]);
        let b = mgr.cartesian_product(MapSet::UNIT, &"y", &[5]);
        let s = mgr.merge(mgr.cartesian_product(a, &"y", &[5]), b);

        let table = mgr.dims_and_values(s);
        assert_eq!(table.get("x"), Some(&vec![0, 1, 2]));
        assert_eq!(table.get("y"), Some(&vec![5]));
        assert_eq!(mgr.dims(s).into_iter().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn test_singleton_and_node_count() {
        let mgr = Mgr::new();
        let s = mgr.singleton(&[("y", 2), ("x", 1), ("z", 0)]);
        assert_eq!(mgr.count(s), BigUint::from(1u32));
        assert!(mgr.contains(s, &[("x", 1), ("y", 2)]));
        assert_eq!(mgr.node_count(s), 2);
        assert_eq!(mgr.singleton(&[]), MapSet::UNIT);
    }

    #[test]
    fn test_caches() {
        let mgr = Mgr::new();
        let a = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2]);
        let b = mgr.cartesian_product(MapSet::UNIT, &"y", &[1, 2]);
        let ab = mgr.merge(a, b);
        assert_eq!(mgr.merge(b, a), ab);
        assert!(mgr.merge_cache_stats().hits >= 1);

        mgr.clear_caches();
        assert_eq!(mgr.merge_cache_stats().entries, 0);
        assert_eq!(mgr.merge(a, b), ab);
    }

    #[test]
    fn test_custom_null() {
        let mgr = MapSetManager::<&str, i32>::with_null(-1);
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[0, 1]);
        assert_eq!(mgr.count(s), BigUint::from(2u32));
        assert!(mgr.contains(s, &[("x", 0)]));
        assert_eq!(mgr.get(s, &"x", &-1), MapSet::EMPTY);
    }
}
