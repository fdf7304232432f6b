//! Outputs and their Z-layers
//!
//! An output owns one scene node per layer, a row of workspaces and the
//! bookkeeping needed to answer "who may act on this output right now".

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scene::NodeId;
use crate::window::ViewId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OutputId(u32);

impl OutputId {
    pub fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "output#{}", self.0)
    }
}

/// Z-layers of an output, bottom to top
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Background,
    Workspace,
    Overlay,
}

impl Layer {
    /// All layers from front (top) to back.
    pub const FRONT_TO_BACK: [Layer; 3] = [Layer::Overlay, Layer::Workspace, Layer::Background];

    pub fn mask(self) -> LayerMask {
        match self {
            Layer::Background => LayerMask::BACKGROUND,
            Layer::Workspace => LayerMask::WORKSPACE,
            Layer::Overlay => LayerMask::OVERLAY,
        }
    }
}

bitflags! {
    /// Set of layers used in view queries
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerMask: u8 {
        const BACKGROUND = 1 << 0;
        const WORKSPACE = 1 << 1;
        const OVERLAY = 1 << 2;
        /// Layers holding views the user manages and sees on screen
        const WM = Self::WORKSPACE.bits() | Self::OVERLAY.bits();
        const ALL = Self::BACKGROUND.bits() | Self::WM.bits();
    }
}

/// Scene nodes backing an output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputNodes {
    pub background: NodeId,
    pub workspace: NodeId,
    /// Container inside the workspace layer holding the regular views
    pub workspace_views: NodeId,
    pub overlay: NodeId,
}

#[derive(Debug, Clone)]
pub struct Output {
    pub id: OutputId,
    pub name: String,
    nodes: OutputNodes,
    workspace_count: usize,
    current_workspace: usize,
    active_view: Option<ViewId>,
    /// Plugin currently holding the exclusive activation grab
    active_plugin: Option<String>,
    /// Set while e.g. a lock screen owns the output
    inhibited: bool,
}

impl Output {
    pub(crate) fn new(
        id: OutputId,
        name: impl Into<String>,
        workspace_count: usize,
        nodes: OutputNodes,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            nodes,
            workspace_count: workspace_count.max(1),
            current_workspace: 0,
            active_view: None,
            active_plugin: None,
            inhibited: false,
        }
    }

    /// Scene node of `layer`.
    pub fn node_for_layer(&self, layer: Layer) -> NodeId {
        match layer {
            Layer::Background => self.nodes.background,
            Layer::Workspace => self.nodes.workspace,
            Layer::Overlay => self.nodes.overlay,
        }
    }

    /// Container views of `layer` are attached to.
    ///
    /// For the workspace layer this is a child of the layer node, so other
    /// containers can be stacked in front of every regular view.
    pub fn view_container(&self, layer: Layer) -> NodeId {
        match layer {
            Layer::Workspace => self.nodes.workspace_views,
            other => self.node_for_layer(other),
        }
    }

    pub fn nodes(&self) -> OutputNodes {
        self.nodes
    }

    pub fn workspace_count(&self) -> usize {
        self.workspace_count
    }

    pub fn current_workspace(&self) -> usize {
        self.current_workspace
    }

    pub(crate) fn set_current_workspace(&mut self, workspace: usize) {
        self.current_workspace = workspace;
    }

    /// The view holding keyboard focus on this output.
    pub fn active_view(&self) -> Option<ViewId> {
        self.active_view
    }

    pub(crate) fn set_active_view(&mut self, view: Option<ViewId>) {
        self.active_view = view;
    }

    // === Activation rights ===

    /// Whether the plugin called `name` may act on this output.
    ///
    /// Denied while the output is inhibited or another plugin holds the
    /// activation grab.
    pub fn can_activate_plugin(&self, name: &str) -> bool {
        if self.inhibited {
            return false;
        }

        self.active_plugin.as_deref().map_or(true, |owner| owner == name)
    }

    /// Give `name` the exclusive activation grab. Fails if someone else holds it.
    pub fn activate_plugin(&mut self, name: &str) -> bool {
        if !self.can_activate_plugin(name) {
            return false;
        }
        self.active_plugin = Some(name.to_string());
        true
    }

    /// Release the grab held by `name`.
    pub fn deactivate_plugin(&mut self, name: &str) -> bool {
        if self.active_plugin.as_deref() == Some(name) {
            self.active_plugin = None;
            true
        } else {
            false
        }
    }

    pub fn active_plugin(&self) -> Option<&str> {
        self.active_plugin.as_deref()
    }

    pub fn inhibit(&mut self) {
        self.inhibited = true;
    }

    pub fn uninhibit(&mut self) {
        self.inhibited = false;
    }

    pub fn is_inhibited(&self) -> bool {
        self.inhibited
    }
}
