//! Restructuring around a single dimension.
//!
//! Every node of a MapSet decides the smallest dimension below it, so a
//! dimension deep in the order is spread over many nodes. [`Front`] is the
//! Shannon expansion of a set on one dimension: its cofactors, keyed by value,
//! with the dimension projected out. Unlike a node it is never interned; it is
//! a working view that [`MapSetManager::rebuild`] turns back into canonical
//! form.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use log::trace;

use crate::manager::MapSetManager;
use crate::reference::MapSet;
use crate::types::{Dim, Value};

/// The cofactors of a MapSet on one dimension.
///
/// `branches` is sorted by value, every child is non-empty and none of them
/// mentions `dim`. The null value appears like any other value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Front<A, V> {
    pub dim: A,
    pub branches: Vec<(V, MapSet)>,
}

impl<A, V> Front<A, V> {
    /// The values `dim` takes, in order.
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.branches.iter().map(|(v, _)| v)
    }

    /// Returns true if the expanded set was empty.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }

    /// Relabels the values. The result may contain duplicate values, which
    /// [`MapSetManager::rebuild`] merges.
    pub fn map_values(self, mut f: impl FnMut(&V) -> V) -> Self {
        let branches = self.branches.into_iter().map(|(v, c)| (f(&v), c)).collect();
        Self { dim: self.dim, branches }
    }

    /// Replaces every cofactor by `f(value, cofactor)`.
    pub fn map_children(self, mut f: impl FnMut(&V, MapSet) -> MapSet) -> Self {
        let branches = self
            .branches
            .into_iter()
            .map(|(v, c)| {
                let c = f(&v, c);
                (v, c)
            })
            .collect();
        Self { dim: self.dim, branches }
    }
}

impl<A: Dim, V: Value> MapSetManager<A, V> {
    /// Expands `s` on `dim`.
    ///
    /// ```text
    /// s = ⋃ { add_dim(child, dim, v) | (v, child) ∈ front.branches }
    /// ```
    pub fn bring_to_front(&self, s: MapSet, dim: &A) -> Front<A, V> {
        trace!("bring_to_front(s = {}, dim = {:?})", s, dim);
        let mut memo = HashMap::new();
        let branches = self.cofactors(s, dim, &mut memo);
        Front {
            dim: dim.clone(),
            branches: (*branches).clone(),
        }
    }

    fn cofactors(
        &self,
        s: MapSet,
        dim: &A,
        memo: &mut HashMap<MapSet, Rc<Vec<(V, MapSet)>>>,
    ) -> Rc<Vec<(V, MapSet)>> {
        if s.is_empty() {
            return Rc::new(Vec::new());
        }
        if self.is_below(s, dim) {
            return Rc::new(vec![(self.null().clone(), s)]);
        }
        let n = self.node(s);
        if n.dim == *dim {
            return Rc::new(n.pairs(self.null()));
        }
        if let Some(cached) = memo.get(&s) {
            return Rc::clone(cached);
        }

        // Regroup the cofactors of the children by the value of `dim`,
        // keeping this node's own decision above each group.
        let mut groups: BTreeMap<V, Vec<(V, MapSet)>> = BTreeMap::new();
        for (value, child) in n.pairs(self.null()) {
            for (cofactor_value, cofactor) in self.cofactors(child, dim, memo).iter() {
                groups
                    .entry(cofactor_value.clone())
                    .or_default()
                    .push((value.clone(), *cofactor));
            }
        }
        let result: Vec<(V, MapSet)> = groups
            .into_iter()
            .map(|(value, pairs)| {
                let (fallthrough, branches) = self.split_null(pairs);
                (value, self.mk_node(n.dim.clone(), fallthrough, branches))
            })
            .collect();

        let result = Rc::new(result);
        memo.insert(s, Rc::clone(&result));
        result
    }

    /// Reassembles a front, merging cofactors that share a value.
    pub fn rebuild(&self, front: Front<A, V>) -> MapSet {
        self.build(&front.dim, front.branches, true)
    }

    /// Reassembles a front whose values are known to be distinct.
    ///
    /// Skips the merge of equal values; passing duplicates corrupts the
    /// result (checked in debug builds only).
    pub fn rebuild_injective(&self, front: Front<A, V>) -> MapSet {
        self.build(&front.dim, front.branches, false)
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;

    type Mgr = MapSetManager<&'static str, i32>;

    fn sample(mgr: &Mgr) -> MapSet {
        // {a ∈ {1,2}, b ∈ {0,5}, c ∈ {3}}
        let s = mgr.cartesian_product(MapSet::UNIT, &"a", &[1, 2]);
        let s = mgr.cartesian_product(s, &"b", &[0, 5]);
        mgr.cartesian_product(s, &"c", &[3])
    }

    #[test]
    fn test_front_of_root_dim() {
        let mgr = Mgr::new();
        let s = sample(&mgr);
        let front = mgr.bring_to_front(s, &"a");
        assert_eq!(front.values().copied().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(mgr.rebuild(front), s);
    }

    #[test]
    fn test_front_of_inner_dim() {
        let mgr = Mgr::new();
        let s = sample(&mgr);
        let front = mgr.bring_to_front(s, &"b");
        assert_eq!(front.values().copied().collect::<Vec<_>>(), vec![0, 5]);
        for (_, child) in &front.branches {
            assert!(!mgr.has_dim(*child, &"b"));
            assert_eq!(mgr.count(*child), BigUint::from(2u32));
        }
        assert_eq!(mgr.rebuild(front), s);
    }

    #[test]
    fn test_front_of_absent_dim() {
        let mgr = Mgr::new();
        let s = sample(&mgr);
        let front = mgr.bring_to_front(s, &"z");
        assert_eq!(front.branches, vec![(0, s)]);
        assert!(mgr.bring_to_front(MapSet::EMPTY, &"a").is_empty());
    }

    #[test]
    fn test_rebuild_merges_relabeled_values() {
        let mgr = Mgr::new();
        let s = sample(&mgr);
        // Collapse a ∈ {1, 2} onto a single value.
        let front = mgr.bring_to_front(s, &"a").map_values(|_| 7);
        let t = mgr.rebuild(front);
        assert_eq!(mgr.all(t, &"a"), vec![7]);
        assert_eq!(mgr.count(t), BigUint::from(2u32));
    }

    #[test]
    fn test_rebuild_injective() {
        let mgr = Mgr::new();
        let s = sample(&mgr);
        let front = mgr.bring_to_front(s, &"c").map_values(|v| v * 10);
        let t = mgr.rebuild_injective(front);
        assert_eq!(mgr.all(t, &"c"), vec![30]);
        assert_eq!(mgr.count(t), mgr.count(s));
    }

    #[test]
    fn test_map_children() {
        let mgr = Mgr::new();
        let s = sample(&mgr);
        let front = mgr
            .bring_to_front(s, &"b")
            .map_children(|v, c| if *v == 5 { c } else { MapSet::EMPTY });
        let t = mgr.rebuild(front);
        assert_eq!(mgr.all(t, &"b"), vec![5]);
        assert_eq!(mgr.count(t), BigUint::from(2u32));
    }
}
