use std::fmt::{Display, Formatter};

/// A handle to a canonical MapSet owned by a [`MapSetManager`][crate::manager::MapSetManager].
///
/// Handles are plain indices: after hash consing, two handles from the same
/// manager are equal iff they encode the same set of states.
///
/// # Sentinels
///
/// - `MapSet::EMPTY` (⊥): no states at all
/// - `MapSet::UNIT` (⊤): exactly one state, every dimension null
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct MapSet(u32);

impl MapSet {
    /// The empty set: no state matches.
    pub const EMPTY: MapSet = MapSet(0);

    /// The unit set: a single state where every dimension is null.
    pub const UNIT: MapSet = MapSet(1);

    /// Number of reserved sentinel handles preceding the first node.
    pub(crate) const RESERVED: u32 = 2;

    /// Creates a handle from a raw index.
    pub const fn new(raw: u32) -> Self {
        MapSet(raw)
    }

    /// Creates the handle of the node stored at `slot` in the manager's arena.
    pub(crate) const fn from_slot(slot: usize) -> Self {
        MapSet(slot as u32 + Self::RESERVED)
    }

    /// Returns the arena slot of a non-terminal handle.
    pub(crate) const fn slot(self) -> usize {
        debug_assert!(self.0 >= Self::RESERVED);
        (self.0 - Self::RESERVED) as usize
    }

    /// Returns the raw index value.
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns true for either sentinel.
    pub const fn is_terminal(self) -> bool {
        self.0 < Self::RESERVED
    }

    /// Returns true if no state matches.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if this is the single all-null state.
    pub const fn is_unit(self) -> bool {
        self.0 == 1
    }
}

impl Default for MapSet {
    fn default() -> Self {
        MapSet::EMPTY
    }
}

impl Display for MapSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            0 => write!(f, "⊥"),
            1 => write!(f, "⊤"),
            _ => write!(f, "#{}", self.0),
        }
    }
}
