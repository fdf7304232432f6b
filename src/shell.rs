//! Host model: views, outputs, the scene and the signal bus in one place
//!
//! `Shell` plays the part of the compositor core plugins talk to. It applies
//! requests immediately and raises the matching signals on the bus; delivery
//! is done by [`crate::compositor::Compositor`].

use log::{debug, info, warn};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::input::BindingRegistry;
use crate::output::{Layer, LayerMask, Output, OutputId, OutputNodes};
use crate::scene::{NodeId, NodeKind, Scene};
use crate::signal::{Scope, Signal, SignalBus};
use crate::window::{TiledEdges, View, ViewId, ViewRegistry, ViewSpec};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShellError {
    #[error("{0} does not exist")]
    UnknownOutput(OutputId),

    #[error("{0} does not exist")]
    UnknownView(ViewId),

    #[error("{output} has no workspace {workspace}")]
    InvalidWorkspace { output: OutputId, workspace: usize },
}

#[derive(Debug, Default)]
pub struct Shell {
    scene: Scene,
    views: ViewRegistry,
    outputs: BTreeMap<OutputId, Output>,
    bus: SignalBus,
    bindings: BindingRegistry,
    cursor_focus: Option<ViewId>,
    focused_output: Option<OutputId>,
    next_output_id: u32,
}

impl Shell {
    pub fn new() -> Self {
        Self {
            views: ViewRegistry::new(),
            ..Self::default()
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn views(&self) -> &ViewRegistry {
        &self.views
    }

    pub fn views_mut(&mut self) -> &mut ViewRegistry {
        &mut self.views
    }

    pub fn view(&self, id: ViewId) -> Option<&View> {
        self.views.get(id)
    }

    pub fn bus(&self) -> &SignalBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SignalBus {
        &mut self.bus
    }

    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut BindingRegistry {
        &mut self.bindings
    }

    /// Raise `signal` on `scope`.
    pub fn emit(&mut self, scope: Scope, signal: Signal) {
        self.bus.emit(scope, signal);
    }

    // === Outputs ===

    /// Create an output with `workspaces` workspaces and its layer nodes.
    pub fn add_output(&mut self, name: impl Into<String>, workspaces: usize) -> OutputId {
        self.next_output_id += 1;
        let id = OutputId::from_raw(self.next_output_id);
        let root = self.scene.root();

        let background = self.scene.create_node(NodeKind::Layer {
            output: id,
            layer: Layer::Background,
        });
        let workspace = self.scene.create_node(NodeKind::Layer {
            output: id,
            layer: Layer::Workspace,
        });
        let workspace_views = self.scene.create_floating();
        let overlay = self.scene.create_node(NodeKind::Layer {
            output: id,
            layer: Layer::Overlay,
        });

        // Front to back: overlay, workspace, background
        self.attach_front(root, background);
        self.attach_front(root, workspace);
        self.attach_front(root, overlay);
        self.attach_front(workspace, workspace_views);

        let nodes = OutputNodes {
            background,
            workspace,
            workspace_views,
            overlay,
        };
        let output = Output::new(id, name, workspaces, nodes);
        info!("🖥️ Added output {} ({}) with {} workspaces", output.name, id, output.workspace_count());
        self.outputs.insert(id, output);

        if self.focused_output.is_none() {
            self.focused_output = Some(id);
        }
        id
    }

    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(&id)
    }

    pub fn output_mut(&mut self, id: OutputId) -> Option<&mut Output> {
        self.outputs.get_mut(&id)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    pub fn output_by_name(&self, name: &str) -> Option<OutputId> {
        self.outputs.values().find(|o| o.name == name).map(|o| o.id)
    }

    pub fn focused_output(&self) -> Option<OutputId> {
        self.focused_output
    }

    pub fn focus_output(&mut self, id: OutputId) -> Result<(), ShellError> {
        if !self.outputs.contains_key(&id) {
            return Err(ShellError::UnknownOutput(id));
        }
        self.focused_output = Some(id);
        Ok(())
    }

    /// Switch the current workspace of `output`.
    pub fn set_workspace(&mut self, output: OutputId, workspace: usize) -> Result<(), ShellError> {
        let out = self
            .outputs
            .get_mut(&output)
            .ok_or(ShellError::UnknownOutput(output))?;
        if workspace >= out.workspace_count() {
            return Err(ShellError::InvalidWorkspace { output, workspace });
        }

        let old = out.current_workspace();
        if old == workspace {
            return Ok(());
        }
        out.set_current_workspace(workspace);
        debug!("{} switched workspace {} -> {}", output, old, workspace);

        self.refocus(output);
        self.emit(
            Scope::Output(output),
            Signal::WorkspaceChanged {
                output,
                old,
                new: workspace,
            },
        );
        Ok(())
    }

    // === View lifecycle ===

    /// Register an unmapped view. Its scene node exists but is not attached.
    pub fn create_view(&mut self, spec: ViewSpec) -> Result<ViewId, ShellError> {
        if !self.outputs.contains_key(&spec.output) {
            return Err(ShellError::UnknownOutput(spec.output));
        }

        let id = self.views.next_id();
        let node = self.scene.create_node(NodeKind::View(id));
        self.views.insert(id, spec, node);
        Ok(id)
    }

    /// Map a view: attach it at the top of its layer and give it focus.
    pub fn map_view(&mut self, view: ViewId) -> Result<(), ShellError> {
        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        if v.mapped {
            return Ok(());
        }
        v.mapped = true;
        let (output, layer, node, toplevel) = (v.output, v.layer, v.node, v.is_toplevel());

        let container = self
            .outputs
            .get(&output)
            .map(|o| o.view_container(layer))
            .ok_or(ShellError::UnknownOutput(output))?;
        self.attach_front(container, node);

        if toplevel {
            self.focus_view(view);
        }

        debug!("Mapped {} on {}", view, output);
        self.emit(Scope::Output(output), Signal::ViewLayerAttached { view, toplevel });
        self.emit(Scope::Output(output), Signal::ViewMapped { view, toplevel });
        Ok(())
    }

    /// Unmap a view: detach its node and move focus elsewhere.
    pub fn unmap_view(&mut self, view: ViewId) -> Result<(), ShellError> {
        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        if !v.mapped {
            return Ok(());
        }
        v.mapped = false;
        let (output, node) = (v.output, v.node);

        self.scene.remove_child(node);
        if self.cursor_focus == Some(view) {
            self.cursor_focus = None;
        }
        if self.active_view(output) == Some(view) {
            self.refocus(output);
        }

        debug!("Unmapped {}", view);
        self.emit(Scope::Output(output), Signal::ViewUnmapped { view });
        Ok(())
    }

    /// Unmap and forget a view. Everything attached to it, tags included, is
    /// dropped.
    pub fn destroy_view(&mut self, view: ViewId) -> Result<(), ShellError> {
        self.unmap_view(view)?;
        if let Some(v) = self.views.remove(view) {
            self.scene.destroy(v.node);
            debug!("Destroyed {}", view);
        }
        Ok(())
    }

    // === View requests ===

    /// Minimize or restore a view.
    ///
    /// Restoring re-attaches the view at the top of its home layer, wherever
    /// its node was before.
    pub fn set_minimized(&mut self, view: ViewId, minimized: bool) -> Result<(), ShellError> {
        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        if v.minimized == minimized {
            return Ok(());
        }
        v.minimized = minimized;
        let (output, layer, node, mapped, toplevel) = (v.output, v.layer, v.node, v.mapped, v.is_toplevel());

        if minimized {
            if self.active_view(output) == Some(view) {
                self.refocus(output);
            }
        } else if mapped {
            if let Some(container) = self.outputs.get(&output).map(|o| o.view_container(layer)) {
                self.attach_front(container, node);
            }
        }

        debug!("{} minimized = {}", view, minimized);
        self.emit(
            Scope::Output(output),
            Signal::ViewMinimized {
                view,
                minimized,
                mapped,
                toplevel,
            },
        );
        Ok(())
    }

    pub fn tile_request(&mut self, view: ViewId, edges: TiledEdges) -> Result<(), ShellError> {
        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        v.tiled_edges = edges;
        let output = v.output;
        self.emit(Scope::Output(output), Signal::ViewTiled { view, edges });
        Ok(())
    }

    pub fn fullscreen_request(&mut self, view: ViewId, fullscreen: bool) -> Result<(), ShellError> {
        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        v.fullscreen = fullscreen;
        let output = v.output;
        self.emit(Scope::Output(output), Signal::ViewFullscreened { view, fullscreen });
        Ok(())
    }

    pub fn set_sticky(&mut self, view: ViewId, sticky: bool) -> Result<(), ShellError> {
        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        v.sticky = sticky;
        let output = v.output;
        self.emit(Scope::Output(output), Signal::ViewStickyChanged { view, sticky });
        Ok(())
    }

    /// Move a view to another output, onto that output's current workspace.
    pub fn move_view_to_output(&mut self, view: ViewId, new: OutputId) -> Result<(), ShellError> {
        let (new_container, new_workspace) = self
            .outputs
            .get(&new)
            .map(|o| (o.view_container(Layer::Workspace), o.current_workspace()))
            .ok_or(ShellError::UnknownOutput(new))?;

        let v = self.views.get_mut(view).ok_or(ShellError::UnknownView(view))?;
        let old = v.output;
        if old == new {
            return Ok(());
        }
        v.output = new;
        v.workspace = new_workspace;
        let (node, mapped, layer, toplevel) = (v.node, v.mapped, v.layer, v.is_toplevel());

        if mapped {
            let container = match layer {
                Layer::Workspace => Some(new_container),
                other => self.outputs.get(&new).map(|o| o.view_container(other)),
            };
            if let Some(container) = container {
                self.attach_front(container, node);
            }
        }
        if self.active_view(old) == Some(view) {
            self.refocus(old);
        }

        debug!("Moved {} from {} to {}", view, old, new);
        self.emit(Scope::Core, Signal::ViewMovedToOutput { view, old, new });
        if mapped {
            self.emit(Scope::Output(new), Signal::ViewLayerAttached { view, toplevel });
        }
        Ok(())
    }

    // === Focus ===

    /// Give keyboard focus to `view` on its output. Does not restack.
    pub fn focus_view(&mut self, view: ViewId) {
        let Some(output) = self.views.get(view).map(|v| v.output) else {
            return;
        };
        if let Some(out) = self.outputs.get_mut(&output) {
            out.set_active_view(Some(view));
            self.focused_output = Some(output);
            debug!("Focused {} on {}", view, output);
        }
    }

    pub fn active_view(&self, output: OutputId) -> Option<ViewId> {
        self.outputs.get(&output).and_then(|o| o.active_view())
    }

    /// Set the view under the pointer.
    pub fn set_cursor_focus(&mut self, view: Option<ViewId>) {
        self.cursor_focus = view.filter(|v| self.views.contains(*v));
    }

    pub fn cursor_focus_view(&self) -> Option<ViewId> {
        self.cursor_focus
    }

    /// Focus the top-most toplevel on the current workspace, or nothing.
    fn refocus(&mut self, output: OutputId) {
        let Some(workspace) = self.outputs.get(&output).map(|o| o.current_workspace()) else {
            return;
        };
        let next = self
            .views_on_workspace(output, workspace, LayerMask::WM)
            .into_iter()
            .find(|v| self.views.get(*v).is_some_and(|v| v.is_toplevel()));

        if let Some(out) = self.outputs.get_mut(&output) {
            out.set_active_view(next);
        }
    }

    // === Queries ===

    /// Mapped views in `layers` of `output`, top to bottom.
    pub fn views_in_layers(&self, output: OutputId, layers: LayerMask, include_minimized: bool) -> Vec<ViewId> {
        let Some(out) = self.outputs.get(&output) else {
            return Vec::new();
        };

        Layer::FRONT_TO_BACK
            .iter()
            .filter(|layer| layers.contains(layer.mask()))
            .flat_map(|layer| self.scene.views_under(out.node_for_layer(*layer)))
            .filter(|id| {
                self.views
                    .get(*id)
                    .is_some_and(|v| v.mapped && (include_minimized || !v.minimized))
            })
            .collect()
    }

    /// Visible views of `layers` on `workspace`, top to bottom.
    pub fn views_on_workspace(&self, output: OutputId, workspace: usize, layers: LayerMask) -> Vec<ViewId> {
        self.views_in_layers(output, layers, false)
            .into_iter()
            .filter(|id| self.views.get(*id).is_some_and(|v| v.is_on_workspace(workspace)))
            .collect()
    }

    fn attach_front(&mut self, parent: NodeId, child: NodeId) {
        if let Err(err) = self.scene.add_front(parent, child) {
            warn!("Failed to attach {} to {}: {}", child, parent, err);
        }
    }
}
