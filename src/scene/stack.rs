//! Ordered child list of a scene container
//!
//! `NodeStack` keeps the children of a container node from front (top-most,
//! painted last) to back (bottom-most, painted first). Index 0 is the front.

use std::collections::HashMap;

use super::NodeId;

/// Ordered set of child nodes with O(1) membership and position lookup.
///
/// # Examples
///
/// ```
/// use overstory::scene::{stack::NodeStack, NodeId};
///
/// let mut stack = NodeStack::new();
/// stack.push_back(NodeId::from_raw(1));
/// stack.push_front(NodeId::from_raw(2));
///
/// assert_eq!(stack.front(), Some(NodeId::from_raw(2)));
/// assert_eq!(stack.back(), Some(NodeId::from_raw(1)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct NodeStack {
    /// Children ordered from front to back
    nodes: Vec<NodeId>,

    /// Fast lookup: node ID → position in stack
    positions: HashMap<NodeId, usize>,
}

impl NodeStack {
    /// Creates a new empty stack.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            positions: HashMap::new(),
        }
    }

    /// Inserts a node at the front (top) of the stack.
    ///
    /// Returns `false` if the node was already present; the order is left
    /// untouched in that case.
    pub fn push_front(&mut self, node: NodeId) -> bool {
        if self.positions.contains_key(&node) {
            return false;
        }

        self.nodes.insert(0, node);
        self.rebuild_positions();
        true
    }

    /// Appends a node at the back (bottom) of the stack.
    ///
    /// Returns `false` if the node was already present.
    pub fn push_back(&mut self, node: NodeId) -> bool {
        if self.positions.contains_key(&node) {
            return false;
        }

        self.positions.insert(node, self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Removes a node from the stack.
    ///
    /// Returns the node's previous position if it was present.
    pub fn remove(&mut self, node: NodeId) -> Option<usize> {
        let pos = self.positions.remove(&node)?;
        self.nodes.remove(pos);
        self.rebuild_positions();
        Some(pos)
    }

    /// Moves a node to the front of the stack.
    ///
    /// Returns `false` if the node is not in the stack.
    pub fn move_to_front(&mut self, node: NodeId) -> bool {
        if self.remove(node).is_some() {
            self.push_front(node)
        } else {
            false
        }
    }

    /// Moves a node to the back of the stack.
    ///
    /// Returns `false` if the node is not in the stack.
    pub fn move_to_back(&mut self, node: NodeId) -> bool {
        if self.remove(node).is_some() {
            self.push_back(node)
        } else {
            false
        }
    }

    /// Replaces the whole child order.
    ///
    /// Duplicates in `order` are dropped, keeping the first occurrence.
    pub fn set_order(&mut self, order: Vec<NodeId>) {
        self.nodes.clear();
        self.positions.clear();
        for node in order {
            self.push_back(node);
        }
    }

    /// Children from front to back.
    pub fn as_slice(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.iter()
    }

    /// The front-most (top) child.
    pub fn front(&self) -> Option<NodeId> {
        self.nodes.first().copied()
    }

    /// The back-most (bottom) child.
    pub fn back(&self) -> Option<NodeId> {
        self.nodes.last().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.positions.contains_key(&node)
    }

    /// Position of a node, 0 being the front.
    pub fn position(&self, node: NodeId) -> Option<usize> {
        self.positions.get(&node).copied()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.positions.clear();
    }

    fn rebuild_positions(&mut self) {
        self.positions.clear();
        for (i, &node) in self.nodes.iter().enumerate() {
            self.positions.insert(node, i);
        }
    }
}
