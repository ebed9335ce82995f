//! MapSet to DOT (Graphviz) conversion, and a compact textual dump.
//!
//! # DOT Format
//!
//! - **Sentinels** (⊥ and ⊤) are rendered as squares at the bottom (sink rank)
//! - **Nodes** are rendered as circles labeled with their dimension, grouped by dimension
//! - **Edges** are labeled with the branch value:
//!   - Solid lines represent non-null branches
//!   - Dashed lines represent the fall-through (null) child
//! - **Root nodes** are rendered as rectangles at the top (source rank)
//!
//! # Examples
//!
//! ```
//! use mapset_rs::manager::MapSetManager;
//! use mapset_rs::reference::MapSet;
//!
//! let mgr = MapSetManager::<&str, i32>::new();
//! let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[0, 1]);
//!
//! let dot = mgr.to_dot(&[s]).unwrap();
//! // Write to file and render with: dot -Tpng output.dot -o output.png
//! assert!(dot.starts_with("digraph {"));
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;

use crate::manager::MapSetManager;
use crate::reference::MapSet;
use crate::types::{Dim, Value};

/// Configuration options for DOT output generation.
#[derive(Debug, Clone)]
pub struct DotConfig {
    /// Shape for dimension nodes (default: "circle")
    pub node_shape: &'static str,
    /// Shape for sentinels (default: "square")
    pub terminal_shape: &'static str,
    /// Shape for root nodes (default: "rect")
    pub root_shape: &'static str,
    /// Style for non-null branches (default: "solid")
    pub branch_edge_style: &'static str,
    /// Style for the fall-through child (default: "dashed")
    pub null_edge_style: &'static str,
    /// Whether to draw edges into ⊥ (default: false; they never occur on branches)
    pub show_empty: bool,
}

impl Default for DotConfig {
    fn default() -> Self {
        Self {
            node_shape: "circle",
            terminal_shape: "square",
            root_shape: "rect",
            branch_edge_style: "solid",
            null_edge_style: "dashed",
            show_empty: false,
        }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

fn target(s: MapSet) -> String {
    if s.is_empty() {
        "zero".to_string()
    } else if s.is_unit() {
        "one".to_string()
    } else {
        format!("n{}", s.raw())
    }
}

impl<A: Dim, V: Value> MapSetManager<A, V> {
    /// Converts the MapSets rooted at `roots` to DOT format.
    ///
    /// Shared nodes are displayed once.
    pub fn to_dot(&self, roots: &[MapSet]) -> Result<String, std::fmt::Error> {
        self.to_dot_with_config(roots, &DotConfig::default())
    }

    /// Converts to DOT format with custom configuration.
    ///
    /// ```
    /// use mapset_rs::dot::DotConfig;
    /// use mapset_rs::manager::MapSetManager;
    /// use mapset_rs::reference::MapSet;
    ///
    /// let mgr = MapSetManager::<&str, i32>::new();
    /// let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2]);
    ///
    /// let config = DotConfig {
    ///     node_shape: "ellipse",
    ///     ..DotConfig::default()
    /// };
    /// let dot = mgr.to_dot_with_config(&[s], &config).unwrap();
    /// assert!(dot.contains("ellipse"));
    /// ```
    pub fn to_dot_with_config(&self, roots: &[MapSet], config: &DotConfig) -> Result<String, std::fmt::Error> {
        let mut dot = String::new();
        writeln!(dot, "digraph {{")?;
        writeln!(dot, "node [shape={}];", config.node_shape)?;

        writeln!(dot, "{{ rank=sink")?;
        writeln!(dot, "zero [shape={}, label=\"⊥\"];", config.terminal_shape)?;
        writeln!(dot, "one [shape={}, label=\"⊤\"];", config.terminal_shape)?;
        writeln!(dot, "}}")?;

        // Collect reachable nodes, grouped by dimension for ranking
        let mut visited = HashSet::new();
        let mut by_dim: BTreeMap<A, Vec<MapSet>> = BTreeMap::new();
        let mut stack: Vec<MapSet> = roots.to_vec();
        while let Some(s) = stack.pop() {
            if s.is_terminal() || !visited.insert(s) {
                continue;
            }
            let node = self.node(s);
            by_dim.entry(node.dim.clone()).or_default().push(s);
            stack.extend(node.children());
        }

        for (dim, ids) in by_dim.iter_mut() {
            ids.sort();
            let label = escape(&format!("{:?}", dim));
            writeln!(dot, "{{ rank=same")?;
            for id in ids.iter() {
                writeln!(dot, "n{} [label=\"{}\"];", id.raw(), label)?;
            }
            writeln!(dot, "}}")?;
        }

        for ids in by_dim.values() {
            for &id in ids {
                let node = self.node(id);
                if !node.fallthrough.is_empty() || config.show_empty {
                    writeln!(
                        dot,
                        "n{} -> {} [style={}, label=\"{}\"];",
                        id.raw(),
                        target(node.fallthrough),
                        config.null_edge_style,
                        escape(&format!("{:?}", self.null()))
                    )?;
                }
                for (value, child) in node.branches.iter() {
                    writeln!(
                        dot,
                        "n{} -> {} [style={}, label=\"{}\"];",
                        id.raw(),
                        target(*child),
                        config.branch_edge_style,
                        escape(&format!("{:?}", value))
                    )?;
                }
            }
        }

        writeln!(dot, "{{ rank=source")?;
        for (i, root) in roots.iter().enumerate() {
            writeln!(dot, "r{} [shape={}, label=\"{}\"];", i, config.root_shape, root)?;
        }
        writeln!(dot, "}}")?;
        for (i, &root) in roots.iter().enumerate() {
            writeln!(dot, "r{} -> {};", i, target(root))?;
        }

        writeln!(dot, "}}")?;
        Ok(dot)
    }

    /// Renders `s` as nested brackets, e.g. `x[0 => ⊤, 1 => y[5 => ⊤]]`.
    ///
    /// The null case is printed under the null value. Shared subtrees are
    /// printed in full at every occurrence, so use this on small sets only.
    pub fn to_bracket_string(&self, s: MapSet) -> String {
        let mut out = String::new();
        self.write_brackets(s, &mut out);
        out
    }

    fn write_brackets(&self, s: MapSet, out: &mut String) {
        if s.is_terminal() {
            out.push_str(&s.to_string());
            return;
        }
        let node = self.node(s);
        out.push_str(&format!("{:?}[", node.dim));
        for (i, (value, child)) in node.pairs(self.null()).into_iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{:?} => ", value));
            self.write_brackets(child, out);
        }
        out.push(']');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Mgr = MapSetManager<&'static str, i32>;

    #[test]
    fn test_to_dot_basic() {
        let mgr = Mgr::new();
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[0, 1, 2]);
        let s = mgr.cartesian_product(s, &"y", &[3]);

        let dot = mgr.to_dot(&[s]).unwrap();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.ends_with("}\n"));
        assert!(dot.contains("label=\"\\\"x\\\"\""));
        assert!(dot.contains("style=dashed"));
    }

    #[test]
    fn test_to_dot_sentinels_only() {
        let mgr = Mgr::new();
        let dot = mgr.to_dot(&[MapSet::EMPTY, MapSet::UNIT]).unwrap();
        assert!(dot.contains("r0 -> zero;"));
        assert!(dot.contains("r1 -> one;"));
    }

    #[test]
    fn test_bracket_string() {
        let mgr = Mgr::new();
        assert_eq!(mgr.to_bracket_string(MapSet::EMPTY), "⊥");
        assert_eq!(mgr.to_bracket_string(MapSet::UNIT), "⊤");

        let y = mgr.cartesian_product(MapSet::UNIT, &"y", &[5]);
        let s = mgr.merge(mgr.add_dim(y, &"x", &1), MapSet::UNIT);
        assert_eq!(mgr.to_bracket_string(s), "\"x\"[0 => ⊤, 1 => \"y\"[5 => ⊤]]");
    }

    /// Writes a DOT file for manual inspection (disabled by default)
    #[test]
    #[ignore]
    fn test_write_dot_file() {
        let mgr = Mgr::new();
        let s = mgr.cartesian_product(MapSet::UNIT, &"x", &[1, 2]);
        let s = mgr.cartesian_product(s, &"y", &[0, 3]);
        let dot = mgr.to_dot(&[s]).unwrap();
        std::fs::write("test_output.dot", &dot).unwrap();
        println!("DOT output:\n{}", dot);
    }
}
