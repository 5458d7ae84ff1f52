//! Tile addresses within the quadtree pyramid.

use std::cmp::Ordering;
use std::collections::BTreeSet;

/// Deepest level a [`Node`] may address.
pub const MAX_LEVEL: u32 = 24;

/// Uniquely identifies one quadrant of the recursively subdivided root.
///
/// At `level` the root is split into a `2^level × 2^level` grid and
/// `(x, y)` selects a cell of that grid. Nodes order lexicographically by
/// `(level, y, x)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Node {
    /// Subdivision depth (0 = the whole root).
    pub level: u32,
    /// Column within the grid at this level.
    pub x: u32,
    /// Row within the grid at this level.
    pub y: u32,
}

impl Node {
    /// The single node covering the whole root.
    pub const ROOT: Node = Node {
        level: 0,
        x: 0,
        y: 0,
    };

    /// Number of nodes along one axis at the given level.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`MAX_LEVEL`].
    #[must_use]
    pub fn grid_size(level: u32) -> u32 {
        assert!(
            level <= MAX_LEVEL,
            "level {level} exceeds MAX_LEVEL {MAX_LEVEL}"
        );
        1 << level
    }

    /// Construct a node, validating that `x` and `y` lie inside the grid.
    ///
    /// # Panics
    ///
    /// Panics if `level` exceeds [`MAX_LEVEL`] or if `x`/`y` are out of range.
    #[must_use]
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        let size = Self::grid_size(level);
        assert!(x < size, "x={x} out of range for level {level} (max {size})");
        assert!(y < size, "y={y} out of range for level {level} (max {size})");
        Self { level, x, y }
    }

    /// The node one level coarser that contains this one.
    ///
    /// Returns `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Node> {
        if self.level == 0 {
            return None;
        }
        Some(Node {
            level: self.level - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four nodes one level finer, ordered (0,0), (1,0), (0,1), (1,1).
    ///
    /// Returns `None` at [`MAX_LEVEL`].
    #[must_use]
    pub fn children(&self) -> Option<[Node; 4]> {
        if self.level >= MAX_LEVEL {
            return None;
        }
        let level = self.level + 1;
        let cx = self.x * 2;
        let cy = self.y * 2;
        Some([
            Node { level, x: cx, y: cy },
            Node { level, x: cx + 1, y: cy },
            Node { level, x: cx, y: cy + 1 },
            Node { level, x: cx + 1, y: cy + 1 },
        ])
    }

    /// All four children of this node's parent, including the node itself.
    ///
    /// The root is its own only sibling.
    #[must_use]
    pub fn siblings(&self) -> Vec<Node> {
        match self.parent().and_then(|p| p.children()) {
            Some(children) => children.to_vec(),
            None => vec![*self],
        }
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> Ordering {
        self.level
            .cmp(&other.level)
            .then(self.y.cmp(&other.y))
            .then(self.x.cmp(&other.x))
    }
}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(level={}, x={}, y={})", self.level, self.x, self.y)
    }
}

/// A node carrying the importance score it was evaluated with.
///
/// Ordering puts the most important node first; ties fall back to node
/// order. Equality compares importance too, so the same node scored twice
/// with different values yields two distinct entries.
#[derive(Clone, Copy, Debug)]
pub struct ImportantNode {
    /// The tile address.
    pub node: Node,
    /// Caller-defined non-negative score.
    pub importance: f64,
}

impl ImportantNode {
    /// Pair a node with its importance.
    #[must_use]
    pub fn new(node: Node, importance: f64) -> Self {
        debug_assert!(
            importance >= 0.0 || importance.is_nan(),
            "importance must be non-negative"
        );
        Self { node, importance }
    }
}

impl PartialEq for ImportantNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ImportantNode {}

impl Ord for ImportantNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .importance
            .total_cmp(&self.importance)
            .then(self.node.cmp(&other.node))
    }
}

impl PartialOrd for ImportantNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Set of nodes keyed by address.
pub type NodeSet = BTreeSet<Node>;

/// Set of scored nodes, iterated from most to least important.
pub type ImportantNodeSet = BTreeSet<ImportantNode>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_equality() {
        let a = Node::new(5, 10, 20);
        let b = Node::new(5, 10, 20);
        let c = Node::new(5, 10, 21);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_node_order_is_level_then_y_then_x() {
        let mut nodes = vec![
            Node::new(2, 3, 0),
            Node::new(1, 0, 1),
            Node::new(2, 0, 1),
            Node::new(1, 1, 0),
            Node::ROOT,
        ];
        nodes.sort();
        assert_eq!(
            nodes,
            vec![
                Node::ROOT,
                Node::new(1, 1, 0),
                Node::new(1, 0, 1),
                Node::new(2, 3, 0),
                Node::new(2, 0, 1),
            ]
        );
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_out_of_range_coordinate_panics() {
        let _ = Node::new(2, 4, 0);
    }

    #[test]
    #[should_panic(expected = "exceeds MAX_LEVEL")]
    fn test_level_beyond_max_panics() {
        let _ = Node::grid_size(MAX_LEVEL + 1);
    }

    #[test]
    fn test_parent_and_children() {
        let child = Node::new(3, 5, 6);
        let parent = child.parent().expect("level 3 has a parent");
        assert_eq!(parent, Node::new(2, 2, 3));
        let children = parent.children().expect("level 2 has children");
        assert!(children.contains(&child));
        assert_eq!(children[0], Node::new(3, 4, 6));
        assert_eq!(children[3], Node::new(3, 5, 7));
        assert!(Node::ROOT.parent().is_none());
        assert!(Node::new(MAX_LEVEL, 0, 0).children().is_none());
    }

    #[test]
    fn test_siblings_share_parent() {
        let node = Node::new(2, 1, 2);
        let siblings = node.siblings();
        assert_eq!(siblings.len(), 4);
        assert!(siblings.contains(&node));
        for s in &siblings {
            assert_eq!(s.parent(), node.parent());
        }
        assert_eq!(Node::ROOT.siblings(), vec![Node::ROOT]);
    }

    /// Iteration over an `ImportantNodeSet` yields the most important node first.
    #[test]
    fn test_important_nodes_iterate_descending() {
        let mut set = ImportantNodeSet::new();
        set.insert(ImportantNode::new(Node::new(1, 0, 0), 1.0));
        set.insert(ImportantNode::new(Node::new(1, 1, 0), 5.0));
        set.insert(ImportantNode::new(Node::ROOT, f64::INFINITY));
        set.insert(ImportantNode::new(Node::new(1, 0, 1), 1.0));
        let order: Vec<Node> = set.iter().map(|n| n.node).collect();
        assert_eq!(
            order,
            vec![
                Node::ROOT,
                Node::new(1, 1, 0),
                Node::new(1, 0, 0),
                Node::new(1, 0, 1),
            ]
        );
    }

    #[test]
    fn test_important_node_equality_includes_importance() {
        let a = ImportantNode::new(Node::new(1, 0, 0), 1.0);
        let b = ImportantNode::new(Node::new(1, 0, 0), 2.0);
        assert_ne!(a, b);
        assert_eq!(a, ImportantNode::new(Node::new(1, 0, 0), 1.0));
    }
}
