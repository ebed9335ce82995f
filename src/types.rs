//! Trait aliases for dimension names and dimension values.
//!
//! Both are opaque to the engine: it only needs to clone, order, hash and
//! print them. The ordering of dimension names is the canonical variable
//! order of every MapSet built by a manager.

use std::fmt::Debug;
use std::hash::Hash;

/// A dimension name (the "variable" of the decision diagram).
///
/// Dimensions appear in strictly increasing `Ord` order along every path.
pub trait Dim: Clone + Ord + Hash + Debug {}

impl<T> Dim for T where T: Clone + Ord + Hash + Debug {}

/// A value a dimension can be bound to.
///
/// One distinguished value, chosen when the manager is created, acts as the
/// null value: a dimension that is not mentioned on a path is bound to it.
pub trait Value: Clone + Ord + Hash + Debug {}

impl<T> Value for T where T: Clone + Ord + Hash + Debug {}

/// A single explicit state: the non-null assignments, sorted by dimension.
pub type State<A, V> = Vec<(A, V)>;
