//! Flat node identities for quadtrees and octrees.
//!
//! A [`NodeKey`] is a locational code: a single marker bit followed by the
//! Morton-interleaved grid coordinates of the node. The root is `1`; the child
//! with index `i` of key `k` is `(k << bits) | i`, where `bits` is 2 for
//! quadtrees and 3 for octrees. This lets a whole tree live in a flat map
//! without any pointer graph.

use std::fmt;

/// Branching factor of a regular spatial tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Four children per node (image pyramids, 2D tilings).
    Quad,
    /// Eight children per node (point-cloud octrees).
    Oct,
}

impl Arity {
    /// Number of key bits consumed per level.
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Arity::Quad => 2,
            Arity::Oct => 3,
        }
    }

    /// Number of children per node.
    #[must_use]
    pub const fn fanout(self) -> u8 {
        1 << self.bits()
    }

    /// Deepest level representable in a 64-bit key.
    #[must_use]
    pub const fn max_level(self) -> u8 {
        (63 / self.bits()) as u8
    }
}

/// Level and grid coordinates decoded from a [`NodeKey`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridAddress {
    /// Depth below the root (root = 0).
    pub level: u8,
    /// Column at this level.
    pub x: u32,
    /// Row at this level.
    pub y: u32,
    /// Depth slice at this level; `None` for quadtrees.
    pub z: Option<u32>,
}

/// Unique identity of a node within one tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(u64);

impl NodeKey {
    /// The root key shared by every tree.
    pub const ROOT: NodeKey = NodeKey(1);

    /// Wrap a raw key value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw key value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Depth of this key for a regular tree of the given arity.
    #[must_use]
    pub fn level(self, arity: Arity) -> u8 {
        if self.0 == 0 {
            return 0;
        }
        ((63 - self.0.leading_zeros()) / arity.bits()) as u8
    }

    /// The child at `index`, or `None` if `index` is out of range or the key
    /// is already at the deepest representable level.
    #[must_use]
    pub fn child(self, arity: Arity, index: u8) -> Option<Self> {
        if index >= arity.fanout() || self.level(arity) >= arity.max_level() {
            return None;
        }
        Some(Self((self.0 << arity.bits()) | u64::from(index)))
    }

    /// All children of this key in index order.
    pub fn children(self, arity: Arity) -> impl Iterator<Item = NodeKey> {
        (0..arity.fanout()).filter_map(move |i| self.child(arity, i))
    }

    /// The parent key, or `None` for the root.
    #[must_use]
    pub fn parent(self, arity: Arity) -> Option<Self> {
        let parent = self.0 >> arity.bits();
        (parent != 0).then_some(Self(parent))
    }

    /// Build the key of a quadtree cell.
    ///
    /// # Panics
    ///
    /// Panics if `level` is too deep or `x`/`y` fall outside the grid.
    #[must_use]
    pub fn quad(level: u8, x: u32, y: u32) -> Self {
        assert!(level <= Arity::Quad.max_level(), "level {level} too deep");
        let size = 1u64 << level;
        assert!(u64::from(x) < size && u64::from(y) < size, "({x}, {y}) outside level {level}");
        let mut code = 0u64;
        for bit in 0..u32::from(level) {
            code |= u64::from((x >> bit) & 1) << (2 * bit);
            code |= u64::from((y >> bit) & 1) << (2 * bit + 1);
        }
        Self((1u64 << (2 * u32::from(level))) | code)
    }

    /// Build the key of an octree cell.
    ///
    /// # Panics
    ///
    /// Panics if `level` is too deep or a coordinate falls outside the grid.
    #[must_use]
    pub fn oct(level: u8, x: u32, y: u32, z: u32) -> Self {
        assert!(level <= Arity::Oct.max_level(), "level {level} too deep");
        let size = 1u64 << level;
        assert!(
            u64::from(x) < size && u64::from(y) < size && u64::from(z) < size,
            "({x}, {y}, {z}) outside level {level}"
        );
        let mut code = 0u64;
        for bit in 0..u32::from(level) {
            code |= u64::from((x >> bit) & 1) << (3 * bit);
            code |= u64::from((y >> bit) & 1) << (3 * bit + 1);
            code |= u64::from((z >> bit) & 1) << (3 * bit + 2);
        }
        Self((1u64 << (3 * u32::from(level))) | code)
    }

    /// Decode level and coordinates of a key built for a tree of `arity`.
    #[must_use]
    pub fn decode(self, arity: Arity) -> GridAddress {
        let level = self.level(arity);
        let bits = arity.bits();
        let code = self.0 & !(1u64 << (bits * u32::from(level)));
        let mut coords = [0u32; 3];
        for bit in 0..u32::from(level) {
            for (axis, coord) in coords.iter_mut().enumerate().take(bits as usize) {
                let value = (code >> (bits * bit + axis as u32)) & 1;
                *coord |= (value as u32) << bit;
            }
        }
        GridAddress {
            level,
            x: coords[0],
            y: coords[1],
            z: (arity == Arity::Oct).then_some(coords[2]),
        }
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The first-level children of the root match the grid constructor.
    #[test]
    fn test_root_children_match_grid_keys() {
        assert_eq!(NodeKey::ROOT.child(Arity::Quad, 0), Some(NodeKey::quad(1, 0, 0)));
        assert_eq!(NodeKey::ROOT.child(Arity::Quad, 1), Some(NodeKey::quad(1, 1, 0)));
        assert_eq!(NodeKey::ROOT.child(Arity::Quad, 2), Some(NodeKey::quad(1, 0, 1)));
        assert_eq!(NodeKey::ROOT.child(Arity::Oct, 7), Some(NodeKey::oct(1, 1, 1, 1)));
    }

    /// Parent of every child is the original key.
    #[test]
    fn test_child_parent_roundtrip() {
        let key = NodeKey::oct(3, 5, 2, 7);
        for child in key.children(Arity::Oct) {
            assert_eq!(child.parent(Arity::Oct), Some(key));
            assert_eq!(child.level(Arity::Oct), 4);
        }
        assert_eq!(NodeKey::ROOT.parent(Arity::Quad), None);
    }

    /// Decoding recovers the level and coordinates.
    #[test]
    fn test_decode_recovers_coordinates() {
        let quad = NodeKey::quad(5, 17, 30).decode(Arity::Quad);
        assert_eq!(quad, GridAddress { level: 5, x: 17, y: 30, z: None });

        let oct = NodeKey::oct(4, 9, 0, 15).decode(Arity::Oct);
        assert_eq!(oct, GridAddress { level: 4, x: 9, y: 0, z: Some(15) });
    }

    /// Keys at the deepest representable level have no children.
    #[test]
    fn test_max_level_has_no_children() {
        let deepest = NodeKey::quad(Arity::Quad.max_level(), 0, 0);
        assert_eq!(deepest.child(Arity::Quad, 0), None);
        assert_eq!(NodeKey::ROOT.child(Arity::Quad, 4), None);
    }

    /// Distinct cells never share a key.
    #[test]
    fn test_keys_unique_across_levels() {
        let mut seen = std::collections::HashSet::new();
        for level in 0..4u8 {
            let size = 1u32 << level;
            for x in 0..size {
                for y in 0..size {
                    assert!(seen.insert(NodeKey::quad(level, x, y)));
                }
            }
        }
        assert_eq!(seen.len(), 1 + 4 + 16 + 64);
    }
}
