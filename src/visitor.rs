//! Lazy, resolving iteration over the states of a MapSet.
//!
//! A [`MapSetVisitor`] runs an algorithm once per *equivalence class* of
//! states rather than once per state. A dimension is split into its values
//! only when the algorithm asks for it with [`get`][MapSetVisitor::get];
//! every dimension the algorithm never reads is carried through in bulk.
//!
//! # Driving loop
//!
//! ```
//! use mapset_rs::manager::MapSetManager;
//! use mapset_rs::reference::MapSet;
//! use mapset_rs::visitor::MapSetVisitor;
//!
//! let mgr = MapSetManager::<&str, i32>::new();
//! let s = mgr.cartesian_product(MapSet::UNIT, &"a", &[1, 2, 3]);
//! let s = mgr.cartesian_product(s, &"b", &[4, 5]);
//!
//! let mut visitor = MapSetVisitor::new(&mgr, s);
//! let mut result = MapSet::EMPTY;
//! while visitor.next() {
//!     let a = visitor.get(&"a");
//!     visitor.put(&"c", a * 10);
//!     result = mgr.merge(result, visitor.current_subset());
//! }
//!
//! // "b" was never read: three passes covered all six states.
//! assert_eq!(visitor.iterations(), 3);
//! assert_eq!(mgr.all(result, &"c"), vec![10, 20, 30]);
//! assert_eq!(mgr.count(result), mgr.count(s));
//! ```
//!
//! # Resolution stack
//!
//! Each first `get` of a dimension in an iteration pushes a frame listing the
//! values it takes in the working set and picks the smallest one. `next()`
//! advances the frames like an odometer: the last frame moves to its next
//! value, exhausted frames are popped. Frames are replayed in order on the
//! following iteration, so the algorithm must query dimensions in the same
//! order whenever it reaches the same point.

use std::collections::HashMap;

use log::{debug, trace};

use crate::manager::MapSetManager;
use crate::reference::MapSet;
use crate::types::{Dim, Value};

/// Whether a dimension is mentioned in the working set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InSet {
    /// Not mentioned: removing it is a no-op.
    No,
    /// Unknown.
    Maybe,
    /// Mentioned somewhere.
    Yes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VarState<V> {
    /// Value pinned for the current iteration, if any.
    value: Option<V>,
    /// `value` still has to be written into the working set.
    dirty: bool,
    in_set: InSet,
}

impl<V> VarState<V> {
    fn unresolved() -> Self {
        Self {
            value: None,
            dirty: false,
            in_set: InSet::Maybe,
        }
    }
}

#[derive(Debug, Clone)]
struct Frame<A, V> {
    dim: A,
    values: Vec<V>,
    pos: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    NotStarted,
    Iterating,
    Done,
}

/// Stateful algorithm-execution engine over a MapSet.
///
/// Not `Clone`: use [`dup`][Self::dup] to copy the iteration state.
#[derive(Debug)]
pub struct MapSetVisitor<'a, A, V> {
    mgr: &'a MapSetManager<A, V>,
    set: MapSet,
    working: MapSet,
    stack: Vec<Frame<A, V>>,
    stack_pos: usize,
    var_state: HashMap<A, VarState<V>>,
    initial_var_state: HashMap<A, VarState<V>>,
    status: Status,
    iterations: usize,
    track_in_set: bool,
}

impl<'a, A: Dim, V: Value> MapSetVisitor<'a, A, V> {
    pub fn new(mgr: &'a MapSetManager<A, V>, set: MapSet) -> Self {
        let mut visitor = Self {
            mgr,
            set,
            working: MapSet::EMPTY,
            stack: Vec::new(),
            stack_pos: 0,
            var_state: HashMap::new(),
            initial_var_state: HashMap::new(),
            status: Status::NotStarted,
            iterations: 0,
            track_in_set: true,
        };
        visitor.reset(set);
        visitor
    }

    /// Enables or disables the presence tracking that lets the visitor skip
    /// redundant removals. Results are identical either way.
    pub fn with_in_set_tracking(mut self, enabled: bool) -> Self {
        self.track_in_set = enabled;
        self
    }

    pub fn set_in_set_tracking(&mut self, enabled: bool) {
        self.track_in_set = enabled;
    }

    /// Re-targets the visitor at `set` and rewinds it.
    pub fn reset(&mut self, set: MapSet) {
        debug!("visitor: reset to {}", set);
        self.set = set;
        self.working = MapSet::EMPTY;
        self.stack.clear();
        self.stack_pos = 0;
        self.var_state.clear();
        self.status = Status::NotStarted;
        self.iterations = 0;

        // Dimensions with a single possible value are pinned up front.
        self.initial_var_state = self
            .mgr
            .dims_and_values(set)
            .into_iter()
            .map(|(dim, values)| {
                let value = if values.len() == 1 {
                    values.into_iter().next()
                } else {
                    None
                };
                let state = VarState {
                    value,
                    dirty: false,
                    in_set: InSet::Yes,
                };
                (dim, state)
            })
            .collect();
    }

    /// Copies the full iteration state. The manager and all nodes are shared.
    pub fn dup(&self) -> Self {
        Self {
            mgr: self.mgr,
            set: self.set,
            working: self.working,
            stack: self.stack.clone(),
            stack_pos: self.stack_pos,
            var_state: self.var_state.clone(),
            initial_var_state: self.initial_var_state.clone(),
            status: self.status,
            iterations: self.iterations,
            track_in_set: self.track_in_set,
        }
    }

    /// The set being iterated.
    pub fn set(&self) -> MapSet {
        self.set
    }

    /// Number of successful `next()` calls since the last reset.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Advances to the next combination of resolved dimensions.
    ///
    /// Returns false once every combination has been visited.
    ///
    /// # Panics
    ///
    /// Panics if the previous iteration resolved fewer dimensions than were
    /// replayed from the stack.
    pub fn next(&mut self) -> bool {
        match self.status {
            Status::Done => return false,
            Status::NotStarted => {
                if self.set.is_empty() {
                    self.status = Status::Done;
                    return false;
                }
            }
            Status::Iterating => {
                assert_eq!(
                    self.stack_pos,
                    self.stack.len(),
                    "Non-deterministic iteration: {} of {} resolved dimensions were replayed",
                    self.stack_pos,
                    self.stack.len()
                );
                loop {
                    let Some(frame) = self.stack.last_mut() else {
                        debug!("visitor: done after {} iterations", self.iterations);
                        self.status = Status::Done;
                        self.working = MapSet::EMPTY;
                        return false;
                    };
                    frame.pos += 1;
                    if frame.pos < frame.values.len() {
                        trace!("visitor: advance {:?} to {:?}", frame.dim, frame.values[frame.pos]);
                        break;
                    }
                    trace!("visitor: carry over {:?}", frame.dim);
                    self.stack.pop();
                }
            }
        }

        self.status = Status::Iterating;
        self.working = self.set;
        self.stack_pos = 0;
        self.var_state = self.initial_var_state.clone();
        self.iterations += 1;
        true
    }

    fn assert_iterating(&self) {
        assert!(
            self.status == Status::Iterating && !self.working.is_empty(),
            "Visitor is not iterating"
        );
    }

    fn state(&self, dim: &A) -> VarState<V> {
        self.var_state.get(dim).cloned().unwrap_or_else(|| VarState {
            // Never seen: null in every state.
            value: Some(self.mgr.null().clone()),
            dirty: false,
            in_set: InSet::No,
        })
    }

    fn in_set(&self, state: &VarState<V>) -> InSet {
        if self.track_in_set {
            state.in_set
        } else {
            InSet::Maybe
        }
    }

    /// Returns the value of `dim` in the current iteration, resolving it if
    /// needed.
    ///
    /// # Panics
    ///
    /// Panics if the visitor is not iterating, or if this call does not
    /// match the dimension replayed at this position of the stack.
    pub fn get(&mut self, dim: &A) -> V {
        self.assert_iterating();
        if let Some(value) = self.state(dim).value {
            return value;
        }

        let value = if self.stack_pos < self.stack.len() {
            let frame = &self.stack[self.stack_pos];
            assert!(
                frame.dim == *dim,
                "Non-deterministic iteration: expected to resolve {:?}, got {:?}",
                frame.dim,
                dim
            );
            frame.values[frame.pos].clone()
        } else {
            let values = self.mgr.all(self.working, dim);
            debug!("visitor: resolve {:?} over {} values", dim, values.len());
            let first = values[0].clone();
            self.stack.push(Frame {
                dim: dim.clone(),
                values,
                pos: 0,
            });
            first
        };
        self.stack_pos += 1;

        self.working = self.mgr.get(self.working, dim, &value);
        for state in self.var_state.values_mut() {
            if state.in_set == InSet::Yes {
                state.in_set = InSet::Maybe;
            }
        }
        let dirty = !self.mgr.is_null(&value);
        self.var_state.insert(
            dim.clone(),
            VarState {
                value: Some(value.clone()),
                dirty,
                in_set: InSet::No,
            },
        );
        value
    }

    /// Returns every value `dim` may currently take, sorted.
    pub fn get_all(&self, dim: &A) -> Vec<V> {
        self.assert_iterating();
        match self.state(dim).value {
            Some(value) => vec![value],
            None => self.mgr.all(self.working, dim),
        }
    }

    /// Sets `dim` to `value` for the rest of the iteration.
    ///
    /// The write is applied lazily, except for the null value.
    pub fn put(&mut self, dim: &A, value: V) {
        self.assert_iterating();
        let mut state = self.state(dim);
        let is_null = self.mgr.is_null(&value);
        state.value = Some(value);
        state.dirty = true;
        self.var_state.insert(dim.clone(), state);
        if is_null {
            self.flush(dim);
        }
    }

    /// Writes a pending value of `dim` into the working set.
    fn flush(&mut self, dim: &A) {
        let mut state = self.state(dim);
        if !state.dirty {
            return;
        }
        let Some(value) = state.value.clone() else {
            return;
        };
        trace!("visitor: flush {:?} = {:?}", dim, value);
        if self.in_set(&state) != InSet::No {
            self.working = self.mgr.remove(self.working, dim);
        }
        self.working = self.mgr.add_dim(self.working, dim, &value);
        state.dirty = false;
        state.in_set = if self.mgr.is_null(&value) { InSet::No } else { InSet::Yes };
        self.var_state.insert(dim.clone(), state);
    }

    /// Forgets `dim` entirely, in the state and in the working set.
    fn destroy(&mut self, dim: &A) {
        let state = self.state(dim);
        if self.in_set(&state) != InSet::No {
            self.working = self.mgr.remove(self.working, dim);
        }
        self.var_state.insert(dim.clone(), VarState::unresolved());
    }

    /// Flushes every pending write and returns the working set.
    pub fn current_subset(&mut self) -> MapSet {
        self.assert_iterating();
        let mut dirty: Vec<A> = self
            .var_state
            .iter()
            .filter(|(_, state)| state.dirty)
            .map(|(dim, _)| dim.clone())
            .collect();
        dirty.sort();
        for dim in dirty.iter() {
            self.flush(dim);
        }
        self.working
    }

    /// Sets `target` to the value of `source` in every state.
    ///
    /// `source` is not resolved. With `reorder`, the copy is built from the
    /// cofactors of `source`; otherwise by re-homing its branches in place.
    pub fn copy(&mut self, source: &A, target: &A, reorder: bool) {
        self.assert_iterating();
        assert!(source != target, "Cannot copy {:?} onto itself", source);
        if let Some(value) = self.state(source).value {
            self.put(target, value);
            return;
        }
        if !reorder {
            self.injective_target_transform(source, target, |v| v.clone());
            return;
        }

        self.destroy(target);
        let mgr = self.mgr;
        let front = mgr
            .bring_to_front(self.working, source)
            .map_children(|value, child| mgr.add_dim(child, target, value));
        self.working = mgr.rebuild_injective(front);
    }

    /// Applies `f` to every value of `dim`, without resolving it.
    pub fn transform(&mut self, dim: &A, f: impl FnMut(&V) -> V) {
        self.transform_impl(dim, f, false);
    }

    /// Like [`transform`][Self::transform] for an injective `f`.
    ///
    /// A non-injective `f` corrupts the working set.
    pub fn injective_transform(&mut self, dim: &A, f: impl FnMut(&V) -> V) {
        self.transform_impl(dim, f, true);
    }

    fn transform_impl(&mut self, dim: &A, mut f: impl FnMut(&V) -> V, injective: bool) {
        self.assert_iterating();
        if let Some(value) = self.state(dim).value {
            let mapped = f(&value);
            self.put(dim, mapped);
            return;
        }
        let mgr = self.mgr;
        let front = mgr.bring_to_front(self.working, dim).map_values(f);
        self.working = if injective {
            mgr.rebuild_injective(front)
        } else {
            mgr.rebuild(front)
        };
    }

    /// Sets `output` to `f(input)` in every state, without resolving `input`.
    ///
    /// Any previous value of `output` is discarded.
    pub fn target_transform(&mut self, input: &A, output: &A, f: impl FnMut(&V) -> V) {
        self.target_transform_impl(input, output, f, false);
    }

    /// Like [`target_transform`][Self::target_transform] for an injective `f`.
    pub fn injective_target_transform(&mut self, input: &A, output: &A, f: impl FnMut(&V) -> V) {
        self.target_transform_impl(input, output, f, true);
    }

    fn target_transform_impl(&mut self, input: &A, output: &A, mut f: impl FnMut(&V) -> V, injective: bool) {
        self.assert_iterating();
        assert!(input != output, "Input and output must differ, got {:?}", input);
        if let Some(value) = self.state(input).value {
            let mapped = f(&value);
            self.put(output, mapped);
            return;
        }
        self.flush(input);
        self.destroy(output);

        let mgr = self.mgr;
        let mut memo = HashMap::new();
        self.working = Self::retarget(mgr, self.working, input, output, &mut f, injective, &mut memo);
    }

    fn retarget<F: FnMut(&V) -> V>(
        mgr: &MapSetManager<A, V>,
        s: MapSet,
        input: &A,
        output: &A,
        f: &mut F,
        injective: bool,
        memo: &mut HashMap<MapSet, MapSet>,
    ) -> MapSet {
        if s.is_empty() {
            return MapSet::EMPTY;
        }
        if let Some(&result) = memo.get(&s) {
            return result;
        }

        let result = if mgr.is_below(s, input) {
            // `input` is null throughout `s`.
            let mapped = f(mgr.null());
            mgr.add_dim(s, output, &mapped)
        } else {
            let node = mgr.node(s);
            if node.dim == *input {
                let pairs = node.pairs(mgr.null());
                if output < input {
                    // Group by output value above the input decision.
                    let grouped = pairs
                        .into_iter()
                        .map(|(value, child)| (f(&value), mgr.add_dim(child, input, &value)))
                        .collect();
                    mgr.build(output, grouped, !injective)
                } else {
                    let pairs = pairs
                        .into_iter()
                        .map(|(value, child)| {
                            let mapped = f(&value);
                            let child = mgr.add_dim(child, output, &mapped);
                            (value, child)
                        })
                        .collect();
                    mgr.build(input, pairs, false)
                }
            } else {
                mgr.lazy_map(s, |child| Self::retarget(mgr, child, input, output, f, injective, memo))
            }
        };

        memo.insert(s, result);
        result
    }

    /// Sets every `outputs[i]` to `f(inputs)[i]` in every state.
    ///
    /// `f` is called once per combination of input values present.
    ///
    /// # Panics
    ///
    /// Panics if inputs and outputs overlap, or if `f` returns the wrong
    /// number of values.
    pub fn multi_transform(&mut self, inputs: &[A], outputs: &[A], mut f: impl FnMut(&[V]) -> Vec<V>) {
        self.assert_iterating();
        for input in inputs {
            assert!(
                !outputs.contains(input),
                "Dimension {:?} is both an input and an output",
                input
            );
        }

        let resolved: Option<Vec<V>> = inputs.iter().map(|dim| self.state(dim).value).collect();
        if let Some(values) = resolved {
            let mapped = f(values.as_slice());
            assert_eq!(mapped.len(), outputs.len(), "Expected one value per output");
            for (dim, value) in outputs.iter().zip(mapped) {
                self.put(dim, value);
            }
            return;
        }

        for input in inputs {
            self.flush(input);
        }
        for output in outputs {
            self.destroy(output);
        }
        let mgr = self.mgr;
        let mut prefix = Vec::with_capacity(inputs.len());
        self.working = Self::multi(mgr, self.working, inputs, outputs, &mut f, &mut prefix);
    }

    fn multi<F: FnMut(&[V]) -> Vec<V>>(
        mgr: &MapSetManager<A, V>,
        s: MapSet,
        inputs: &[A],
        outputs: &[A],
        f: &mut F,
        prefix: &mut Vec<V>,
    ) -> MapSet {
        let Some((first, rest)) = inputs.split_first() else {
            let mapped = f(prefix.as_slice());
            assert_eq!(mapped.len(), outputs.len(), "Expected one value per output");
            return outputs
                .iter()
                .zip(mapped.iter())
                .fold(s, |acc, (dim, value)| mgr.add_dim(acc, dim, value));
        };

        let front = mgr.bring_to_front(s, first);
        let mut pairs = Vec::with_capacity(front.branches.len());
        for (value, child) in front.branches {
            prefix.push(value.clone());
            let child = Self::multi(mgr, child, rest, outputs, f, prefix);
            prefix.pop();
            pairs.push((value, child));
        }
        mgr.from_branches(first, pairs)
    }

    /// Binds `dim` to every one of `values`, multiplying the working set.
    ///
    /// A previous value of `dim` is discarded; the next `get` resolves it
    /// again over `values`.
    pub fn inject(&mut self, dim: &A, values: &[V]) {
        self.assert_iterating();
        assert!(!values.is_empty(), "Cannot inject an empty value list for {:?}", dim);
        debug!("visitor: inject {:?} = {:?}", dim, values);
        let state = self.state(dim);
        if self.in_set(&state) != InSet::No {
            self.working = self.mgr.remove(self.working, dim);
        }
        self.working = self.mgr.unchecked_cartesian_product(self.working, dim, values);
        self.var_state.insert(dim.clone(), VarState::unresolved());
    }
}

#[cfg(test)]
mod tests {
    use num_bigint::BigUint;
    use test_log::test;

    use super::*;

    type Mgr = MapSetManager<&'static str, i32>;

    fn product(mgr: &Mgr, dims: &[(&'static str, &[i32])]) -> MapSet {
        dims.iter()
            .fold(MapSet::UNIT, |s, (dim, values)| mgr.cartesian_product(s, dim, values))
    }

    #[test]
    fn test_empty_set_never_iterates() {
        let mgr = Mgr::new();
        let mut v = MapSetVisitor::new(&mgr, MapSet::EMPTY);
        assert!(!v.next());
        assert!(!v.next());
        assert_eq!(v.iterations(), 0);
    }

    #[test]
    fn test_unit_set_iterates_once() {
        let mgr = Mgr::new();
        let mut v = MapSetVisitor::new(&mgr, MapSet::UNIT);
        assert!(v.next());
        assert_eq!(v.get(&"x"), 0);
        assert_eq!(v.current_subset(), MapSet::UNIT);
        assert!(!v.next());
    }

    #[test]
    fn test_single_valued_dims_are_pinned() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[4]), ("b", &[1, 2])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        let mut count = 0;
        while v.next() {
            assert_eq!(v.get(&"a"), 4);
            count += 1;
        }
        assert_eq!(count, 1);
    }

    #[test]
    fn test_get_resolves_in_order() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[3, 1]), ("b", &[0, 7])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        let mut seen = Vec::new();
        while v.next() {
            let a = v.get(&"a");
            let b = v.get(&"b");
            seen.push((a, b));
        }
        assert_eq!(seen, vec![(1, 0), (1, 7), (3, 0), (3, 7)]);
    }

    #[test]
    fn test_get_all() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[1, 2]), ("b", &[5, 6])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        assert_eq!(v.get_all(&"b"), vec![5, 6]);
        v.get(&"b");
        assert_eq!(v.get_all(&"b"), vec![5]);
        assert_eq!(v.get_all(&"a"), vec![1, 2]);
    }

    #[test]
    fn test_put_null_removes_dim() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[1, 2]), ("b", &[5])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        v.put(&"b", 0);
        let subset = v.current_subset();
        assert!(!mgr.has_dim(subset, &"b"));
        assert_eq!(subset, product(&mgr, &[("a", &[1, 2])]));
    }

    #[test]
    fn test_put_overwrites_unresolved_dim() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[1, 2]), ("b", &[5, 6])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        v.put(&"b", 9);
        assert_eq!(v.get(&"b"), 9);
        let subset = v.current_subset();
        assert_eq!(mgr.all(subset, &"b"), vec![9]);
        assert_eq!(mgr.count(subset), BigUint::from(2u32));
        assert!(!v.next());
    }

    #[test]
    fn test_copy_both_paths() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("b", &[0, 1, 2]), ("c", &[8])]);
        for reorder in [false, true] {
            for target in ["a", "z"] {
                let mut v = MapSetVisitor::new(&mgr, s);
                assert!(v.next());
                v.copy(&"b", &target, reorder);
                let subset = v.current_subset();
                assert_eq!(mgr.count(subset), BigUint::from(3u32));
                for b in [0, 1, 2] {
                    let restricted = mgr.get(subset, &"b", &b);
                    assert_eq!(mgr.all(restricted, &target), vec![b]);
                }
            }
        }
    }

    #[test]
    fn test_copy_resolved_source() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("b", &[1, 2])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        let mut result = MapSet::EMPTY;
        while v.next() {
            v.get(&"b");
            v.copy(&"b", &"c", false);
            result = mgr.merge(result, v.current_subset());
        }
        assert_eq!(v.iterations(), 2);
        assert!(mgr.contains(result, &[("b", 1), ("c", 1)]));
        assert!(mgr.contains(result, &[("b", 2), ("c", 2)]));
    }

    #[test]
    fn test_transform_merges_collisions() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("x", &[1, 2, 3, 4]), ("y", &[5])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        v.transform(&"x", |x| x % 2);
        let subset = v.current_subset();
        assert_eq!(mgr.all(subset, &"x"), vec![0, 1]);
        assert_eq!(mgr.count(subset), BigUint::from(2u32));
    }

    #[test]
    fn test_injective_transform() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("x", &[1, 2, 3])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        v.injective_transform(&"x", |x| -x);
        assert_eq!(mgr.all(v.current_subset(), &"x"), vec![-3, -2, -1]);
    }

    #[test]
    fn test_target_transform_maps_null_input() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("x", &[0, 1, 2])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        v.target_transform(&"x", &"y", |x| x + 100);
        let subset = v.current_subset();
        assert!(mgr.contains(subset, &[("y", 100)]));
        assert!(mgr.contains(subset, &[("x", 1), ("y", 101)]));
        assert!(mgr.contains(subset, &[("x", 2), ("y", 102)]));
        assert_eq!(mgr.count(subset), BigUint::from(3u32));
    }

    #[test]
    fn test_target_transform_replaces_output() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[1, 2]), ("x", &[3, 4])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        // Output "a" is ordered before input "x" and already present.
        v.target_transform(&"x", &"a", |x| x / 4);
        let subset = v.current_subset();
        assert_eq!(mgr.count(subset), BigUint::from(2u32));
        assert!(mgr.contains(subset, &[("x", 3)]));
        assert!(mgr.contains(subset, &[("a", 1), ("x", 4)]));
    }

    #[test]
    #[should_panic(expected = "must differ")]
    fn test_target_transform_same_dim() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("x", &[1, 2])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        v.next();
        v.target_transform(&"x", &"x", |x| *x);
    }

    #[test]
    #[should_panic(expected = "both an input and an output")]
    fn test_multi_transform_overlap() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("x", &[1, 2])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        v.next();
        v.multi_transform(&["x"], &["x"], |xs| xs.to_vec());
    }

    #[test]
    fn test_multi_transform_resolved_inputs() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("x", &[1, 2]), ("y", &[10])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        let mut result = MapSet::EMPTY;
        while v.next() {
            v.get(&"x");
            v.multi_transform(&["x", "y"], &["s", "d"], |xs| vec![xs[0] + xs[1], xs[1] - xs[0]]);
            result = mgr.merge(result, v.current_subset());
        }
        assert!(mgr.contains(result, &[("x", 1), ("y", 10), ("s", 11), ("d", 9)]));
        assert!(mgr.contains(result, &[("x", 2), ("y", 10), ("s", 12), ("d", 8)]));
        assert_eq!(mgr.count(result), BigUint::from(2u32));
    }

    #[test]
    fn test_inject_then_resolve() {
        let mgr = Mgr::new();
        let mut v = MapSetVisitor::new(&mgr, MapSet::UNIT);
        let mut seen = Vec::new();
        while v.next() {
            v.inject(&"k", &[2, 1]);
            seen.push(v.get(&"k"));
        }
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    #[should_panic(expected = "not iterating")]
    fn test_get_before_next() {
        let mgr = Mgr::new();
        let mut v = MapSetVisitor::new(&mgr, MapSet::UNIT);
        v.get(&"x");
    }

    #[test]
    #[should_panic(expected = "Non-deterministic iteration")]
    fn test_replay_mismatch() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[1, 2]), ("b", &[1, 2])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        let mut flip = false;
        while v.next() {
            if flip {
                v.get(&"b");
                v.get(&"a");
            } else {
                v.get(&"a");
                v.get(&"b");
            }
            flip = !flip;
        }
    }

    #[test]
    fn test_reset_and_dup() {
        let mgr = Mgr::new();
        let s = product(&mgr, &[("a", &[1, 2, 3])]);
        let mut v = MapSetVisitor::new(&mgr, s);
        assert!(v.next());
        assert_eq!(v.get(&"a"), 1);

        let mut w = v.dup();
        assert!(w.next());
        assert_eq!(w.get(&"a"), 2);
        // The original is unaffected by advancing the copy.
        assert!(v.next());
        assert_eq!(v.get(&"a"), 2);

        v.reset(MapSet::UNIT);
        assert_eq!(v.iterations(), 0);
        assert_eq!(v.set(), MapSet::UNIT);
        assert!(v.next());
        assert!(!v.next());
    }
}
