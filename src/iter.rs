//! Iterator for enumerating the states of a MapSet.

use crate::manager::MapSetManager;
use crate::reference::MapSet;
use crate::types::{Dim, State, Value};

/// Iterator that yields every state of a MapSet.
///
/// A state lists its non-null bindings in dimension order. States come out
/// in lexicographic order of their values.
pub struct StateIterator<'a, A, V> {
    mgr: &'a MapSetManager<A, V>,
    /// Pending subsets, each with the bindings chosen above it.
    stack: Vec<(MapSet, State<A, V>)>,
}

impl<'a, A: Dim, V: Value> StateIterator<'a, A, V> {
    pub fn new(mgr: &'a MapSetManager<A, V>, root: MapSet) -> Self {
        let mut iter = Self { mgr, stack: Vec::new() };
        if !root.is_empty() {
            iter.stack.push((root, Vec::new()));
        }
        iter
    }
}

impl<'a, A: Dim, V: Value> Iterator for StateIterator<'a, A, V> {
    type Item = State<A, V>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, state)) = self.stack.pop() {
            if id.is_unit() {
                return Some(state);
            }
            let node = self.mgr.node(id);
            // Reversed so that the smallest value is popped first
            for (value, child) in node.pairs(self.mgr.null()).into_iter().rev() {
                let mut next = state.clone();
                if !self.mgr.is_null(&value) {
                    next.push((node.dim.clone(), value));
                }
                self.stack.push((child, next));
            }
        }
        None
    }
}

impl<A: Dim, V: Value> MapSetManager<A, V> {
    /// Returns an iterator over all states of `s`.
    ///
    /// # Example
    ///
    /// ```
    /// use mapset_rs::manager::MapSetManager;
    /// use mapset_rs::reference::MapSet;
    ///
    /// let mgr = MapSetManager::<char, u8>::new();
    /// let s = mgr.cartesian_product(MapSet::UNIT, &'x', &[1, 2]);
    ///
    /// let states: Vec<_> = mgr.iter_states(s).collect();
    /// assert_eq!(states, vec![vec![('x', 1)], vec![('x', 2)]]);
    /// ```
    pub fn iter_states(&self, s: MapSet) -> StateIterator<'_, A, V> {
        StateIterator::new(self, s)
    }

    /// Returns one state of `s`, preferring the smallest value at each node.
    pub fn pick_one(&self, s: MapSet) -> Option<State<A, V>> {
        if s.is_empty() {
            return None;
        }
        let mut state = Vec::new();
        let mut current = s;
        while !current.is_terminal() {
            let node = self.node(current);
            let (value, child) = node.pairs(self.null()).swap_remove(0);
            if !self.is_null(&value) {
                state.push((node.dim.clone(), value));
            }
            current = child;
        }
        Some(state)
    }
}
