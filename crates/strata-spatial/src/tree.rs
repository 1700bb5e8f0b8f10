//! Flat-arena spatial tree.
//!
//! Nodes live in one map keyed by [`NodeKey`]. Regular trees (quadtrees,
//! octrees) derive child keys from the parent key; generic bounding-volume
//! trees get sequential keys from the arena.

use rustc_hash::FxHashMap;

use crate::{Arity, BoundingVolume, ContentDescriptor, GridAddress, NodeKey, SpatialNode};

/// Shape of a tree, which decides how child keys are derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TreeKind {
    /// Quadtree or octree with Morton-derived keys.
    Regular(Arity),
    /// Arbitrary bounding-volume hierarchy with arena-assigned keys.
    Generic,
}

/// Errors raised while building a tree.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TreeError {
    /// The referenced node does not exist.
    #[error("unknown node {0}")]
    UnknownNode(NodeKey),
    /// The node already has children; expansion is all-or-nothing.
    #[error("node {0} is already expanded")]
    AlreadyExpanded(NodeKey),
    /// A regular tree node must receive exactly its full set of children.
    #[error("node {parent} needs {expected} children, got {actual}")]
    PartialChildren {
        /// Node being expanded.
        parent: NodeKey,
        /// Fanout of the tree.
        expected: usize,
        /// Number of children supplied.
        actual: usize,
    },
    /// The node would exceed the deepest level a key can encode.
    #[error("node {0} is at the maximum depth")]
    TooDeep(NodeKey),
}

/// A spatial hierarchy stored as a flat map.
#[derive(Clone, Debug)]
pub struct Tree {
    kind: TreeKind,
    nodes: FxHashMap<NodeKey, SpatialNode>,
    next_id: u64,
}

impl Tree {
    /// Create a tree holding only `root`. The root's key is forced to
    /// [`NodeKey::ROOT`].
    #[must_use]
    pub fn new(kind: TreeKind, mut root: SpatialNode) -> Self {
        root.key = NodeKey::ROOT;
        root.parent = None;
        root.children.clear();
        let mut nodes = FxHashMap::default();
        nodes.insert(NodeKey::ROOT, root);
        Self {
            kind,
            nodes,
            next_id: NodeKey::ROOT.raw() + 1,
        }
    }

    /// Create a generic bounding-volume hierarchy with a single root.
    #[must_use]
    pub fn generic(root: SpatialNode) -> Self {
        Self::new(TreeKind::Generic, root)
    }

    /// Build a full quadtree of `depth` levels below the root over `bounds`.
    ///
    /// Geometric error halves with each level; every node gets a content
    /// descriptor named `level/x/y`.
    #[must_use]
    pub fn quadtree(depth: u8, bounds: BoundingVolume, root_error: f64) -> Self {
        Self::regular(Arity::Quad, depth, bounds, root_error)
    }

    /// Build a full octree of `depth` levels below the root over `bounds`.
    ///
    /// Content descriptors are named `level/x/y/z`.
    #[must_use]
    pub fn octree(depth: u8, bounds: BoundingVolume, root_error: f64) -> Self {
        Self::regular(Arity::Oct, depth, bounds, root_error)
    }

    fn regular(arity: Arity, depth: u8, bounds: BoundingVolume, root_error: f64) -> Self {
        let depth = depth.min(arity.max_level());
        let root = SpatialNode::new(NodeKey::ROOT, bounds, root_error)
            .with_content(ContentDescriptor::uri(content_name(NodeKey::ROOT.decode(arity))));
        let mut tree = Self::new(TreeKind::Regular(arity), root);

        let mut frontier = vec![NodeKey::ROOT];
        for _ in 0..depth {
            let mut next = Vec::with_capacity(frontier.len() * usize::from(arity.fanout()));
            for parent_key in frontier {
                let Some(parent) = tree.nodes.get(&parent_key) else {
                    continue;
                };
                let parent_bounds = parent.bounds;
                let child_error = parent.geometric_error * 0.5;
                let children: Vec<SpatialNode> = (0..arity.fanout())
                    .filter_map(|i| {
                        let key = parent_key.child(arity, i)?;
                        let child_bounds = match arity {
                            Arity::Quad => parent_bounds.quadrant(i),
                            Arity::Oct => parent_bounds.octant(i),
                        };
                        Some(
                            SpatialNode::new(key, child_bounds, child_error)
                                .with_content(ContentDescriptor::uri(content_name(key.decode(arity)))),
                        )
                    })
                    .collect();
                if let Ok(keys) = tree.set_children(parent_key, children) {
                    next.extend(keys);
                }
            }
            frontier = next;
        }
        tree
    }

    /// Attach `children` to `parent` and return their keys.
    ///
    /// Regular trees require the full fanout and overwrite each child's key
    /// with the Morton-derived one (in order). Generic trees accept any
    /// non-empty list and assign sequential keys.
    pub fn set_children(
        &mut self,
        parent: NodeKey,
        children: Vec<SpatialNode>,
    ) -> Result<Vec<NodeKey>, TreeError> {
        let node = self.nodes.get(&parent).ok_or(TreeError::UnknownNode(parent))?;
        if !node.children.is_empty() {
            return Err(TreeError::AlreadyExpanded(parent));
        }

        let keys: Vec<NodeKey> = match self.kind {
            TreeKind::Regular(arity) => {
                let expected = usize::from(arity.fanout());
                if children.len() != expected {
                    return Err(TreeError::PartialChildren {
                        parent,
                        expected,
                        actual: children.len(),
                    });
                }
                let keys: Vec<NodeKey> = parent.children(arity).collect();
                if keys.len() != expected {
                    return Err(TreeError::TooDeep(parent));
                }
                keys
            }
            TreeKind::Generic => {
                if children.is_empty() {
                    return Err(TreeError::PartialChildren {
                        parent,
                        expected: 1,
                        actual: 0,
                    });
                }
                let start = self.next_id;
                self.next_id += children.len() as u64;
                (start..self.next_id).map(NodeKey::from_raw).collect()
            }
        };

        for (mut child, &key) in children.into_iter().zip(&keys) {
            child.key = key;
            child.parent = Some(parent);
            child.children.clear();
            self.nodes.insert(key, child);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children = keys.clone();
        }
        Ok(keys)
    }

    /// Shape of this tree.
    #[must_use]
    pub fn kind(&self) -> TreeKind {
        self.kind
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &SpatialNode {
        &self.nodes[&NodeKey::ROOT]
    }

    /// Look up a node.
    #[must_use]
    pub fn get(&self, key: NodeKey) -> Option<&SpatialNode> {
        self.nodes.get(&key)
    }

    /// Mutable access to a node's payload fields.
    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut SpatialNode> {
        self.nodes.get_mut(&key)
    }

    /// Child keys of `key`; empty for leaves and unknown keys.
    #[must_use]
    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.nodes
            .get(&key)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    /// Parent key of `key`.
    #[must_use]
    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.nodes.get(&key).and_then(|node| node.parent)
    }

    /// Ancestors of `key`, nearest first, ending at the root.
    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = &SpatialNode> + '_ {
        let mut next = self.parent(key);
        std::iter::from_fn(move || {
            let node = self.nodes.get(&next?)?;
            next = node.parent;
            Some(node)
        })
    }

    /// Grid address of a regular-tree key; `None` for generic trees.
    #[must_use]
    pub fn address(&self, key: NodeKey) -> Option<GridAddress> {
        match self.kind {
            TreeKind::Regular(arity) if self.nodes.contains_key(&key) => Some(key.decode(arity)),
            _ => None,
        }
    }

    /// Whether `key` belongs to this tree.
    #[must_use]
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`: a tree owns at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Iterate over all nodes in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &SpatialNode> {
        self.nodes.values()
    }
}

fn content_name(address: GridAddress) -> String {
    match address.z {
        Some(z) => format!("{}/{}/{}/{}", address.level, address.x, address.y, z),
        None => format!("{}/{}/{}", address.level, address.x, address.y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn unit_box() -> BoundingVolume {
        BoundingVolume::aabb(DVec3::ZERO, DVec3::ONE)
    }

    /// A quadtree of depth 2 holds 1 + 4 + 16 nodes with halving error.
    #[test]
    fn test_quadtree_shape() {
        let tree = Tree::quadtree(2, unit_box(), 8.0);
        assert_eq!(tree.len(), 21);
        let leaf = NodeKey::quad(2, 3, 1);
        let node = tree.get(leaf).expect("leaf exists");
        assert_eq!(node.geometric_error, 2.0);
        assert_eq!(node.content[0].uri, "2/3/1");
        assert_eq!(tree.parent(leaf), Some(NodeKey::quad(1, 1, 0)));
    }

    /// Every non-root node has exactly one parent that lists it as a child.
    #[test]
    fn test_parent_child_links_consistent() {
        let tree = Tree::octree(2, unit_box(), 4.0);
        assert_eq!(tree.len(), 1 + 8 + 64);
        for node in tree.iter() {
            match node.parent() {
                None => assert_eq!(node.key, NodeKey::ROOT),
                Some(parent) => assert!(tree.children(parent).contains(&node.key)),
            }
        }
    }

    /// Ancestors are yielded nearest first.
    #[test]
    fn test_ancestors_order() {
        let tree = Tree::quadtree(3, unit_box(), 8.0);
        let keys: Vec<NodeKey> = tree.ancestors(NodeKey::quad(3, 7, 7)).map(|n| n.key).collect();
        assert_eq!(
            keys,
            vec![NodeKey::quad(2, 3, 3), NodeKey::quad(1, 1, 1), NodeKey::ROOT]
        );
    }

    /// Regular trees refuse partial expansion.
    #[test]
    fn test_partial_children_rejected() {
        let mut tree = Tree::new(
            TreeKind::Regular(Arity::Quad),
            SpatialNode::new(NodeKey::ROOT, unit_box(), 1.0),
        );
        let child = SpatialNode::new(NodeKey::ROOT, unit_box(), 0.5);
        let err = tree.set_children(NodeKey::ROOT, vec![child]).unwrap_err();
        assert_eq!(
            err,
            TreeError::PartialChildren {
                parent: NodeKey::ROOT,
                expected: 4,
                actual: 1
            }
        );
    }

    /// Generic trees assign fresh sequential keys and refuse re-expansion.
    #[test]
    fn test_generic_tree_assigns_keys() {
        let mut tree = Tree::generic(SpatialNode::new(NodeKey::ROOT, unit_box(), 1.0));
        let children = (0..3)
            .map(|_| SpatialNode::new(NodeKey::ROOT, unit_box(), 0.5))
            .collect();
        let keys = tree.set_children(NodeKey::ROOT, children).unwrap();
        assert_eq!(keys, vec![NodeKey::from_raw(2), NodeKey::from_raw(3), NodeKey::from_raw(4)]);
        assert_eq!(tree.address(keys[0]), None);
        assert_eq!(
            tree.set_children(NodeKey::ROOT, vec![SpatialNode::new(NodeKey::ROOT, unit_box(), 0.1)]),
            Err(TreeError::AlreadyExpanded(NodeKey::ROOT))
        );
    }

    /// Unknown parents are reported.
    #[test]
    fn test_unknown_parent() {
        let mut tree = Tree::generic(SpatialNode::new(NodeKey::ROOT, unit_box(), 1.0));
        let missing = NodeKey::from_raw(99);
        assert_eq!(
            tree.set_children(missing, vec![SpatialNode::new(missing, unit_box(), 1.0)]),
            Err(TreeError::UnknownNode(missing))
        );
    }
}
