//! AVL tree ordered by available capacity: rightmost = most capacity.
//! Removal rebuilds the tree from an in-order snapshot rather than
//! implementing AVL node deletion, matching `LoadAVLTree.remove_node` in
//! the original reference implementation.

use crate::ids::NodeId;

struct Entry {
    node_id: NodeId,
    capacity: f64,
}

struct AvlNode {
    entry: Entry,
    left: Option<Box<AvlNode>>,
    right: Option<Box<AvlNode>>,
    height: i32,
}

impl AvlNode {
    fn new(node_id: NodeId, capacity: f64) -> Self {
        Self { entry: Entry { node_id, capacity }, left: None, right: None, height: 1 }
    }
}

fn height(node: &Option<Box<AvlNode>>) -> i32 {
    node.as_ref().map(|n| n.height).unwrap_or(0)
}

fn update_height(node: &mut Box<AvlNode>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

fn balance_of(node: &Box<AvlNode>) -> i32 {
    height(&node.left) - height(&node.right)
}

fn rotate_left(mut z: Box<AvlNode>) -> Box<AvlNode> {
    let mut y = z.right.take().expect("rotate_left requires a right child");
    z.right = y.left.take();
    update_height(&mut z);
    y.left = Some(z);
    update_height(&mut y);
    y
}

fn rotate_right(mut z: Box<AvlNode>) -> Box<AvlNode> {
    let mut y = z.left.take().expect("rotate_right requires a left child");
    z.left = y.right.take();
    update_height(&mut z);
    y.right = Some(z);
    update_height(&mut y);
    y
}

fn insert_recursive(node: Option<Box<AvlNode>>, node_id: NodeId, capacity: f64) -> Box<AvlNode> {
    let mut node = match node {
        None => return Box::new(AvlNode::new(node_id, capacity)),
        Some(n) => n,
    };

    if capacity < node.entry.capacity {
        node.left = Some(insert_recursive(node.left.take(), node_id, capacity));
    } else if capacity > node.entry.capacity {
        node.right = Some(insert_recursive(node.right.take(), node_id, capacity));
    } else {
        node.entry.node_id = node_id;
        return node;
    }

    update_height(&mut node);
    let bal = balance_of(&node);

    if bal > 1 {
        let left_capacity = node.left.as_ref().unwrap().entry.capacity;
        if capacity < left_capacity {
            return rotate_right(node);
        }
        node.left = Some(rotate_left(node.left.take().unwrap()));
        return rotate_right(node);
    }
    if bal < -1 {
        let right_capacity = node.right.as_ref().unwrap().entry.capacity;
        if capacity > right_capacity {
            return rotate_left(node);
        }
        node.right = Some(rotate_right(node.right.take().unwrap()));
        return rotate_left(node);
    }
    node
}

fn find_recursive(node: &Option<Box<AvlNode>>, min_capacity: f64) -> Option<NodeId> {
    let n = node.as_ref()?;
    if n.entry.capacity >= min_capacity {
        find_recursive(&n.right, min_capacity).or(Some(n.entry.node_id))
    } else {
        find_recursive(&n.right, min_capacity)
    }
}

fn in_order(node: &Option<Box<AvlNode>>, out: &mut Vec<(NodeId, f64)>) {
    if let Some(n) = node {
        in_order(&n.left, out);
        out.push((n.entry.node_id, n.entry.capacity));
        in_order(&n.right, out);
    }
}

/// Indexes nodes by available capacity so the balancer can find a
/// destination with at least `min_capacity` free in O(log n).
#[derive(Default)]
pub struct CapacityIndex {
    root: Option<Box<AvlNode>>,
}

impl CapacityIndex {
    pub fn new() -> Self {
        Self { root: None }
    }

    pub fn insert(&mut self, node_id: NodeId, capacity: f64) {
        self.root = Some(insert_recursive(self.root.take(), node_id, capacity));
    }

    /// Removes every entry with `node_id` by rebuilding the tree from an
    /// in-order snapshot, filtering the id out. O(n), matching the Python
    /// original's `remove_node`.
    pub fn remove(&mut self, node_id: NodeId) {
        let mut all = Vec::new();
        in_order(&self.root, &mut all);
        self.root = None;
        for (id, capacity) in all {
            if id != node_id {
                self.insert(id, capacity);
            }
        }
    }

    /// Equivalent to `remove` followed by `insert` with the new capacity.
    pub fn update(&mut self, node_id: NodeId, new_capacity: f64) {
        self.remove(node_id);
        self.insert(node_id, new_capacity);
    }

    /// Largest-capacity node with at least `min_capacity` available, or
    /// `None` if no node qualifies.
    pub fn find_with_capacity(&self, min_capacity: f64) -> Option<NodeId> {
        find_recursive(&self.root, min_capacity)
    }

    pub fn get_all_sorted(&self) -> Vec<(NodeId, f64)> {
        let mut out = Vec::new();
        in_order(&self.root, &mut out);
        out
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}
