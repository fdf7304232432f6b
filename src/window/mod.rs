//! View registry
//!
//! Tracks every known view and its mutable presentation attributes. The
//! registry is plain data: requests that have side effects on the scene or
//! emit signals go through [`crate::shell::Shell`].

use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::output::{Layer, OutputId};
use crate::scene::NodeId;

/// Opaque view handle, unique for the lifetime of the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ViewId(u64);

impl ViewId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// View role classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewRole {
    /// Regular application window
    Toplevel,
    /// Panels, backgrounds, popups and anything else the user does not manage
    Other,
}

bitflags! {
    /// Screen edges a view is tiled against
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TiledEdges: u8 {
        const TOP = 1 << 0;
        const BOTTOM = 1 << 1;
        const LEFT = 1 << 2;
        const RIGHT = 1 << 3;
        const ALL = Self::TOP.bits() | Self::BOTTOM.bits() | Self::LEFT.bits() | Self::RIGHT.bits();
    }
}

bitflags! {
    /// Transient markers the window actions attach to a view
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ViewTags: u8 {
        /// The view's node sits in the always-above region
        const KEPT_ABOVE = 1 << 0;
        /// The view was minimized by show-desktop and awaits restoration
        const HIDDEN_FOR_DESKTOP = 1 << 1;
    }
}

/// A view and its attributes
#[derive(Debug, Clone, PartialEq)]
pub struct View {
    pub id: ViewId,
    pub title: String,
    pub role: ViewRole,
    pub mapped: bool,
    pub minimized: bool,
    pub tiled_edges: TiledEdges,
    pub fullscreen: bool,
    pub sticky: bool,
    pub output: OutputId,
    /// Workspace index on `output`
    pub workspace: usize,
    /// Layer the view is attached to when mapped
    pub layer: Layer,
    /// Root node of the view in the scene graph
    pub node: NodeId,
    tags: ViewTags,
}

impl View {
    pub fn is_toplevel(&self) -> bool {
        self.role == ViewRole::Toplevel
    }

    pub fn tags(&self) -> ViewTags {
        self.tags
    }

    pub fn has_tag(&self, tag: ViewTags) -> bool {
        self.tags.contains(tag)
    }

    /// Whether the view is on `workspace`; sticky views are on all of them.
    pub fn is_on_workspace(&self, workspace: usize) -> bool {
        self.sticky || self.workspace == workspace
    }
}

/// Parameters of a new view
#[derive(Debug, Clone)]
pub struct ViewSpec {
    pub title: String,
    pub role: ViewRole,
    pub output: OutputId,
    pub workspace: usize,
    pub layer: Layer,
}

impl ViewSpec {
    pub fn toplevel(title: impl Into<String>, output: OutputId) -> Self {
        Self {
            title: title.into(),
            role: ViewRole::Toplevel,
            output,
            workspace: 0,
            layer: Layer::Workspace,
        }
    }

    pub fn with_role(mut self, role: ViewRole) -> Self {
        self.role = role;
        self
    }

    pub fn on_workspace(mut self, workspace: usize) -> Self {
        self.workspace = workspace;
        self
    }

    pub fn in_layer(mut self, layer: Layer) -> Self {
        self.layer = layer;
        self
    }
}

#[derive(Debug, Default)]
pub struct ViewRegistry {
    views: BTreeMap<ViewId, View>,
    next_id: u64,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self {
            views: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Allocate the next view handle.
    pub fn next_id(&mut self) -> ViewId {
        let id = ViewId(self.next_id.max(1));
        self.next_id = id.0 + 1;
        id
    }

    /// Register an unmapped view whose scene node has already been created.
    pub fn insert(&mut self, id: ViewId, spec: ViewSpec, node: NodeId) -> &View {
        let view = View {
            id,
            title: spec.title,
            role: spec.role,
            mapped: false,
            minimized: false,
            tiled_edges: TiledEdges::empty(),
            fullscreen: false,
            sticky: false,
            output: spec.output,
            workspace: spec.workspace,
            layer: spec.layer,
            node,
            tags: ViewTags::empty(),
        };

        debug!("Registered {} ({:?}, \"{}\")", id, view.role, view.title);
        self.views.entry(id).or_insert(view)
    }

    /// Drop a view; its tags go with it.
    pub fn remove(&mut self, id: ViewId) -> Option<View> {
        self.views.remove(&id)
    }

    pub fn get(&self, id: ViewId) -> Option<&View> {
        self.views.get(&id)
    }

    pub fn get_mut(&mut self, id: ViewId) -> Option<&mut View> {
        self.views.get_mut(&id)
    }

    pub fn contains(&self, id: ViewId) -> bool {
        self.views.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &View> {
        self.views.values()
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    // === Tags ===

    pub fn has_tag(&self, id: ViewId, tag: ViewTags) -> bool {
        self.views.get(&id).is_some_and(|v| v.tags.contains(tag))
    }

    /// Set `tag` on a view. Returns `false` if the view does not exist.
    pub fn set_tag(&mut self, id: ViewId, tag: ViewTags) -> bool {
        match self.views.get_mut(&id) {
            Some(view) => {
                view.tags.insert(tag);
                true
            }
            None => false,
        }
    }

    /// Clear `tag` on a view. Returns whether the tag was present.
    pub fn clear_tag(&mut self, id: ViewId, tag: ViewTags) -> bool {
        match self.views.get_mut(&id) {
            Some(view) => {
                let had = view.tags.contains(tag);
                view.tags.remove(tag);
                had
            }
            None => false,
        }
    }

    /// Views currently carrying `tag`.
    pub fn tagged(&self, tag: ViewTags) -> Vec<ViewId> {
        self.views
            .values()
            .filter(|v| v.tags.contains(tag))
            .map(|v| v.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with_view() -> (ViewRegistry, ViewId) {
        let mut registry = ViewRegistry::new();
        let id = registry.next_id();
        registry.insert(
            id,
            ViewSpec::toplevel("term", OutputId::from_raw(1)),
            NodeId::from_raw(10),
        );
        (registry, id)
    }

    #[test]
    fn test_new_view_is_unmapped_and_untagged() {
        let (registry, id) = registry_with_view();
        let view = registry.get(id).unwrap();

        assert!(!view.mapped);
        assert!(!view.minimized);
        assert!(view.is_toplevel());
        assert_eq!(view.tags(), ViewTags::empty());
    }

    #[test]
    fn test_tags_are_independent() {
        let (mut registry, id) = registry_with_view();

        assert!(registry.set_tag(id, ViewTags::KEPT_ABOVE));
        assert!(registry.has_tag(id, ViewTags::KEPT_ABOVE));
        assert!(!registry.has_tag(id, ViewTags::HIDDEN_FOR_DESKTOP));

        assert!(!registry.clear_tag(id, ViewTags::HIDDEN_FOR_DESKTOP));
        assert!(registry.clear_tag(id, ViewTags::KEPT_ABOVE));
        assert!(!registry.has_tag(id, ViewTags::KEPT_ABOVE));
    }

    #[test]
    fn test_tags_disappear_with_the_view() {
        let (mut registry, id) = registry_with_view();
        registry.set_tag(id, ViewTags::HIDDEN_FOR_DESKTOP);

        registry.remove(id);

        assert!(!registry.has_tag(id, ViewTags::HIDDEN_FOR_DESKTOP));
        assert!(registry.tagged(ViewTags::HIDDEN_FOR_DESKTOP).is_empty());
        assert!(!registry.set_tag(id, ViewTags::KEPT_ABOVE));
    }

    #[test]
    fn test_sticky_views_are_on_every_workspace() {
        let (mut registry, id) = registry_with_view();
        assert!(registry.get(id).unwrap().is_on_workspace(0));
        assert!(!registry.get(id).unwrap().is_on_workspace(2));

        registry.get_mut(id).unwrap().sticky = true;
        assert!(registry.get(id).unwrap().is_on_workspace(2));
    }

    #[test]
    fn test_tiled_edges_all() {
        assert_eq!(
            TiledEdges::ALL,
            TiledEdges::TOP | TiledEdges::BOTTOM | TiledEdges::LEFT | TiledEdges::RIGHT
        );
    }
}
