//! Scene graph: the stacking forest views are painted from
//!
//! Every output contributes one node per [`Layer`], parented to the scene root.
//! View nodes live under a layer node, either directly or inside a floating
//! container such as the always-above region. Children are ordered front
//! (top-most) to back.

pub mod stack;

use log::trace;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::output::{Layer, OutputId};
use crate::window::ViewId;
use stack::NodeStack;

/// Handle of a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(u64);

impl NodeId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// What a node represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    /// One Z-layer of an output
    Layer { output: OutputId, layer: Layer },
    /// Container whose children may be freely reordered
    Floating,
    /// The root node of a view; views are leaves of the stacking forest
    View(ViewId),
}

impl NodeKind {
    /// Whether nodes of this kind hold an ordered child list.
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeKind::View(_))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("{0} does not exist")]
    UnknownNode(NodeId),

    #[error("{0} cannot hold children")]
    NotAContainer(NodeId),

    #[error("{child} cannot be inserted below itself")]
    Cycle { child: NodeId },
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: NodeStack,
}

/// Arena-backed stacking graph.
///
/// A node has at most one parent. Inserting an already attached node detaches
/// it first, so no node is ever a child of two containers.
#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    root: NodeId,
    next_id: u64,
}

impl Scene {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                kind: NodeKind::Root,
                parent: None,
                children: NodeStack::new(),
            },
        );

        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Create a detached node.
    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                kind,
                parent: None,
                children: NodeStack::new(),
            },
        );
        trace!("Created {} ({:?})", id, kind);
        id
    }

    /// Create a detached floating container.
    pub fn create_floating(&mut self) -> NodeId {
        self.create_node(NodeKind::Floating)
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn kind(&self, node: NodeId) -> Option<NodeKind> {
        self.nodes.get(&node).map(|n| n.kind)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    /// Children of `node` from front to back; empty for unknown nodes.
    pub fn children(&self, node: NodeId) -> &[NodeId] {
        self.nodes
            .get(&node)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    /// Insert `child` at the front (top) of `parent`.
    pub fn add_front(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.insert(parent, child, true)
    }

    /// Insert `child` at the back (bottom) of `parent`.
    pub fn add_back(&mut self, parent: NodeId, child: NodeId) -> Result<(), SceneError> {
        self.insert(parent, child, false)
    }

    fn insert(&mut self, parent: NodeId, child: NodeId, front: bool) -> Result<(), SceneError> {
        let parent_kind = self.kind(parent).ok_or(SceneError::UnknownNode(parent))?;
        if !self.contains(child) {
            return Err(SceneError::UnknownNode(child));
        }
        if !parent_kind.is_container() {
            return Err(SceneError::NotAContainer(parent));
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(SceneError::Cycle { child });
        }

        self.remove_child(child);

        if let Some(node) = self.nodes.get_mut(&parent) {
            if front {
                node.children.push_front(child);
            } else {
                node.children.push_back(child);
            }
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }

        trace!(
            "Attached {} at the {} of {}",
            child,
            if front { "front" } else { "back" },
            parent
        );
        Ok(())
    }

    /// Detach `child` from its parent, returning the former parent.
    pub fn remove_child(&mut self, child: NodeId) -> Option<NodeId> {
        let parent = self.nodes.get_mut(&child)?.parent.take()?;
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.remove(child);
        }
        Some(parent)
    }

    /// Detach and drop `node`. Its children are detached and returned; they
    /// stay alive so their owners can re-home them.
    pub fn destroy(&mut self, node: NodeId) -> Vec<NodeId> {
        if node == self.root {
            return Vec::new();
        }

        self.remove_child(node);
        let Some(removed) = self.nodes.remove(&node) else {
            return Vec::new();
        };

        let orphans: Vec<NodeId> = removed.children.iter().copied().collect();
        for orphan in &orphans {
            if let Some(child) = self.nodes.get_mut(orphan) {
                child.parent = None;
            }
        }
        orphans
    }

    /// Ordered-reinsertion capability of `node`.
    ///
    /// Returns `None` for unknown nodes and for nodes that cannot hold
    /// children.
    pub fn container_mut(&mut self, node: NodeId) -> Option<ContainerMut<'_>> {
        let entry = self.nodes.get_mut(&node)?;
        if !entry.kind.is_container() {
            return None;
        }

        Some(ContainerMut {
            id: node,
            children: &mut entry.children,
        })
    }

    /// Whether `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = self.parent(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    /// Views in the subtree of `node`, front to back (depth first).
    pub fn views_under(&self, node: NodeId) -> Vec<ViewId> {
        let mut views = Vec::new();
        self.collect_views(node, &mut views);
        views
    }

    fn collect_views(&self, node: NodeId, out: &mut Vec<ViewId>) {
        let Some(entry) = self.nodes.get(&node) else {
            return;
        };

        if let NodeKind::View(view) = entry.kind {
            out.push(view);
        }
        for child in entry.children.iter() {
            self.collect_views(*child, out);
        }
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable access to the child order of a container node.
///
/// Only reorders existing children; attaching and detaching goes through
/// [`Scene`] so parent links stay consistent.
#[derive(Debug)]
pub struct ContainerMut<'a> {
    id: NodeId,
    children: &'a mut NodeStack,
}

impl ContainerMut<'_> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn children(&self) -> &[NodeId] {
        self.children.as_slice()
    }

    /// Move `child` to the end of the child list (bottom of paint order).
    pub fn lower_to_bottom(&mut self, child: NodeId) -> bool {
        self.children.move_to_back(child)
    }

    /// Move `child` to the start of the child list (top of paint order).
    pub fn raise_to_top(&mut self, child: NodeId) -> bool {
        self.children.move_to_front(child)
    }

    /// Replace the child order with a permutation of the current children.
    ///
    /// Returns `false` and leaves the order untouched if `order` is not a
    /// permutation.
    pub fn set_children_list(&mut self, order: Vec<NodeId>) -> bool {
        let mut current: Vec<NodeId> = self.children.iter().copied().collect();
        let mut proposed = order.clone();
        current.sort();
        proposed.sort();
        if current != proposed {
            return false;
        }

        self.children.set_order(order);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_node(scene: &mut Scene, raw: u64) -> NodeId {
        scene.create_node(NodeKind::View(ViewId::from_raw(raw)))
    }

    #[test]
    fn test_add_front_detaches_from_previous_parent() {
        let mut scene = Scene::new();
        let a = scene.create_floating();
        let b = scene.create_floating();
        scene.add_front(scene.root(), a).unwrap();
        scene.add_front(scene.root(), b).unwrap();

        let v = view_node(&mut scene, 1);
        scene.add_front(a, v).unwrap();
        scene.add_front(b, v).unwrap();

        assert_eq!(scene.parent(v), Some(b));
        assert!(scene.children(a).is_empty());
        assert_eq!(scene.children(b), &[v]);
    }

    #[test]
    fn test_views_cannot_hold_children() {
        let mut scene = Scene::new();
        let v = view_node(&mut scene, 1);
        let w = view_node(&mut scene, 2);

        assert_eq!(scene.add_front(v, w), Err(SceneError::NotAContainer(v)));
        assert!(scene.container_mut(v).is_none());
    }

    #[test]
    fn test_insert_into_own_subtree_is_rejected() {
        let mut scene = Scene::new();
        let outer = scene.create_floating();
        let inner = scene.create_floating();
        scene.add_front(outer, inner).unwrap();

        assert_eq!(
            scene.add_front(inner, outer),
            Err(SceneError::Cycle { child: outer })
        );
    }

    #[test]
    fn test_views_under_is_front_to_back() {
        let mut scene = Scene::new();
        let layer = scene.create_floating();
        let region = scene.create_floating();
        let v1 = view_node(&mut scene, 1);
        let v2 = view_node(&mut scene, 2);
        let v3 = view_node(&mut scene, 3);

        scene.add_back(layer, v2).unwrap();
        scene.add_back(layer, v3).unwrap();
        scene.add_front(layer, region).unwrap();
        scene.add_front(region, v1).unwrap();

        let views: Vec<u64> = scene.views_under(layer).iter().map(|v| v.raw()).collect();
        assert_eq!(views, vec![1, 2, 3]);
    }

    #[test]
    fn test_destroy_orphans_children() {
        let mut scene = Scene::new();
        let region = scene.create_floating();
        scene.add_front(scene.root(), region).unwrap();
        let v = view_node(&mut scene, 7);
        scene.add_front(region, v).unwrap();

        let orphans = scene.destroy(region);

        assert_eq!(orphans, vec![v]);
        assert_eq!(scene.parent(v), None);
        assert!(!scene.contains(region));
        assert!(scene.children(scene.root()).is_empty());
    }

    #[test]
    fn test_container_reorder_requires_permutation() {
        let mut scene = Scene::new();
        let layer = scene.create_floating();
        let v1 = view_node(&mut scene, 1);
        let v2 = view_node(&mut scene, 2);
        let stranger = view_node(&mut scene, 3);
        scene.add_back(layer, v1).unwrap();
        scene.add_back(layer, v2).unwrap();

        let mut container = scene.container_mut(layer).unwrap();
        assert!(!container.set_children_list(vec![v1, stranger]));
        assert!(container.set_children_list(vec![v2, v1]));
        assert!(container.lower_to_bottom(v2));
        assert_eq!(container.children(), &[v1, v2]);
        assert!(container.raise_to_top(v2));
        assert_eq!(container.children(), &[v2, v1]);
        assert!(!container.raise_to_top(stranger));
    }
}
