//! # mapset-rs: Multi-dimensional set diagrams in Rust
//!
//! **`mapset-rs`** stores large sets of *states* (assignments of values to named
//! dimensions) as reduced, ordered, hash-consed decision diagrams, and runs
//! algorithms over them without enumerating every state.
//!
//! ## What is a MapSet?
//!
//! A MapSet is a decision diagram where each node decides one dimension and
//! has one child per value that dimension takes. One value, chosen per
//! manager, is the *null* value: a dimension not mentioned on a path is
//! bound to it, so a dimension is only materialized where it is non-null.
//! With a fixed dimension order the representation is **canonical**: two
//! MapSets hold the same states exactly when their handles are equal.
//!
//! ## Key Features
//!
//! - **Manager-Centric Architecture**: All operations go through the [`MapSetManager`][crate::manager::MapSetManager], which interns every node and owns all caches.
//! - **Lightweight Handles**: [`MapSet`][crate::reference::MapSet] is a `Copy` 32-bit id; equality is O(1).
//! - **Set Algebra**: union, cartesian product, restriction, projection and restructuring around one dimension.
//! - **Lazy Visitor**: [`MapSetVisitor`][crate::visitor::MapSetVisitor] splits only the dimensions an algorithm actually reads.
//!
//! ## Basic Usage
//!
//! ```rust
//! use mapset_rs::manager::MapSetManager;
//! use mapset_rs::reference::MapSet;
//! use mapset_rs::visitor::MapSetVisitor;
//!
//! // 1. Initialize the manager (the null value is `i32::default()`, i.e. 0)
//! let mgr = MapSetManager::<&str, i32>::new();
//!
//! // 2. Build the search space: divisor ∈ {0,1,2} × dividend ∈ {0,1,2}
//! let space = mgr.cartesian_product(MapSet::UNIT, &"divisor", &[0, 1, 2]);
//! let space = mgr.cartesian_product(space, &"dividend", &[0, 1, 2]);
//!
//! // 3. Run an algorithm over it
//! let mut visitor = MapSetVisitor::new(&mgr, space);
//! let mut result = MapSet::EMPTY;
//! while visitor.next() {
//!     let divisor = visitor.get(&"divisor");
//!     if divisor != 0 {
//!         let dividend = visitor.get(&"dividend");
//!         visitor.put(&"quotient", dividend / divisor);
//!     }
//!     result = mgr.merge(result, visitor.current_subset());
//! }
//!
//! // 4. The divisor = 0 case was handled once for every dividend
//! assert_eq!(visitor.iterations(), 7);
//! let r = mgr.get(mgr.get(result, &"divisor", &2), &"dividend", &2);
//! assert_eq!(mgr.all(r, &"quotient"), vec![1]);
//! ```
//!
//! ## Core Components
//!
//! - **[`manager`]**: The node cache and the MapSet algebra.
//! - **[`front`]**: Cofactor expansion on one dimension and reassembly.
//! - **[`visitor`]**: The lazily-resolving algorithm driver.
//! - **[`dot`]**: Utilities for visualizing MapSets using Graphviz.

pub mod cache;
pub mod config;
pub mod dot;
pub mod front;
pub mod iter;
pub mod manager;
pub mod node;
pub mod reference;
pub mod types;
pub mod unique;
pub mod utils;
pub mod visitor;
