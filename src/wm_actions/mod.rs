//! Window actions
//!
//! Per-output coordinator for transient view state: the always-above region,
//! show-desktop, send-to-back and the simple per-view toggles. Commands arrive
//! through activator bindings or the `SetAboveState` signal; lifecycle
//! signals keep the always-above region consistent.

mod above;
mod showdesktop;


use anyhow::Context;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::compositor::{Plugin, PluginId};
use crate::config::BindingsConfig;
use crate::input::{ActivatorData, ActivatorSource, BindingId};
use crate::output::{Layer, LayerMask, OutputId};
use crate::scene::{NodeId, SceneError};
use crate::shell::{Shell, ShellError};
use crate::signal::{Emission, ListenerId, Scope, Signal, SignalKind};
use crate::window::{TiledEdges, ViewId, ViewTags};

use above::AboveRegion;
use showdesktop::ShowDesktop;

/// Name the coordinator holds activation rights under
pub const PLUGIN_NAME: &str = "wm-actions";

/// Commands that can be bound to an activator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WmAction {
    #[serde(rename = "toggle_showdesktop", alias = "toggle_show_desktop")]
    ToggleShowDesktop,
    Minimize,
    ToggleMaximize,
    #[serde(rename = "toggle_always_on_top", alias = "toggle_above")]
    ToggleAbove,
    ToggleFullscreen,
    ToggleSticky,
    SendToBack,
}

impl WmAction {
    pub const ALL: [WmAction; 7] = [
        WmAction::ToggleShowDesktop,
        WmAction::Minimize,
        WmAction::ToggleMaximize,
        WmAction::ToggleAbove,
        WmAction::ToggleFullscreen,
        WmAction::ToggleSticky,
        WmAction::SendToBack,
    ];

    /// Configuration key of the action.
    pub fn name(self) -> &'static str {
        match self {
            WmAction::ToggleShowDesktop => "toggle_showdesktop",
            WmAction::Minimize => "minimize",
            WmAction::ToggleMaximize => "toggle_maximize",
            WmAction::ToggleAbove => "toggle_always_on_top",
            WmAction::ToggleFullscreen => "toggle_fullscreen",
            WmAction::ToggleSticky => "toggle_sticky",
            WmAction::SendToBack => "send_to_back",
        }
    }
}

impl fmt::Display for WmAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a command did nothing
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("no view to act on")]
    NoTarget,

    #[error("{0} does not exist")]
    UnknownView(ViewId),

    #[error("{0} is not a toplevel view")]
    NotToplevel(ViewId),

    #[error("activation denied on {0}")]
    ActivationDenied(OutputId),

    #[error("{view} is not on {output}")]
    ForeignView { view: ViewId, output: OutputId },

    #[error("{0} does not exist")]
    UnknownOutput(OutputId),

    #[error("window actions are not initialised on {0}")]
    NotInitialised(OutputId),

    #[error(transparent)]
    Scene(#[from] SceneError),

    #[error(transparent)]
    Shell(#[from] ShellError),
}

/// Listeners that keep the always-above region consistent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Maintenance {
    SetAboveState,
    Unminimized,
    MovedToOutput,
    Mapped,
}

/// Window actions for one output
#[derive(Debug)]
pub struct WmActions {
    output: OutputId,
    config: BindingsConfig,
    id: Option<PluginId>,
    region: Option<AboveRegion>,
    show_desktop: ShowDesktop,
    actions: HashMap<BindingId, WmAction>,
    handlers: HashMap<ListenerId, Maintenance>,
}

impl WmActions {
    pub fn new(output: OutputId, config: BindingsConfig) -> Self {
        Self {
            output,
            config,
            id: None,
            region: None,
            show_desktop: ShowDesktop::Inactive,
            actions: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    pub fn output(&self) -> OutputId {
        self.output
    }

    /// Scene node of the always-above region, once initialised.
    pub fn region_node(&self) -> Option<NodeId> {
        self.region.as_ref().map(|r| r.node())
    }

    pub fn is_show_desktop_active(&self) -> bool {
        self.show_desktop.is_active()
    }

    /// Binding registered for `action`, if it is enabled.
    pub fn binding_for(&self, action: WmAction) -> Option<BindingId> {
        self.actions
            .iter()
            .find(|(_, a)| **a == action)
            .map(|(binding, _)| *binding)
    }

    // === Always above ===

    /// Put `view` into the always-above region or take it out.
    ///
    /// Taking out a view that is not kept above succeeds without touching it.
    /// Either way `AboveStateChanged` is raised.
    pub fn set_kept_above(
        &mut self,
        shell: &mut Shell,
        view: Option<ViewId>,
        above: bool,
    ) -> Result<(), ActionError> {
        let view = view.ok_or(ActionError::NoTarget)?;
        self.check_rights(shell)?;
        self.check_owned(shell, view)?;
        let region = self
            .region
            .as_ref()
            .ok_or(ActionError::NotInitialised(self.output))?;

        if above {
            region.insert(shell, view)?;
            shell.views_mut().set_tag(view, ViewTags::KEPT_ABOVE);
        } else if shell.views().has_tag(view, ViewTags::KEPT_ABOVE) {
            AboveRegion::restore(shell, view)?;
            shell.views_mut().clear_tag(view, ViewTags::KEPT_ABOVE);
        }

        debug!("{} kept above = {}", view, above);
        shell.emit(Scope::Output(self.output), Signal::AboveStateChanged { view, above });
        Ok(())
    }

    pub fn toggle_above(&mut self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        let above = !shell.views().has_tag(view, ViewTags::KEPT_ABOVE);
        self.set_kept_above(shell, Some(view), above)
    }

    fn reassert_above(&self, shell: &mut Shell, view: ViewId) {
        if let Some(region) = &self.region {
            region.reassert(shell, view);
        }
    }

    // === Per-view toggles ===

    pub fn minimize(&mut self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        let minimized = shell.view(view).ok_or(ActionError::UnknownView(view))?.minimized;
        shell.set_minimized(view, !minimized)?;
        Ok(())
    }

    /// Tile against every edge, or untile a fully tiled view.
    pub fn toggle_maximize(&mut self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        let edges = shell.view(view).ok_or(ActionError::UnknownView(view))?.tiled_edges;
        let edges = if edges == TiledEdges::ALL {
            TiledEdges::empty()
        } else {
            TiledEdges::ALL
        };
        shell.tile_request(view, edges)?;
        Ok(())
    }

    pub fn toggle_fullscreen(&mut self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        let fullscreen = shell.view(view).ok_or(ActionError::UnknownView(view))?.fullscreen;
        shell.fullscreen_request(view, !fullscreen)?;
        Ok(())
    }

    pub fn toggle_sticky(&mut self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        let sticky = shell.view(view).ok_or(ActionError::UnknownView(view))?.sticky;
        shell.set_sticky(view, !sticky)?;
        Ok(())
    }

    // === Send to back ===

    /// Lower `view` to the bottom of its container and focus the new top view
    /// of the current workspace. Nothing happens if it already is the bottom
    /// view.
    pub fn send_to_back(&mut self, shell: &mut Shell, view: ViewId) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        self.check_owned(shell, view)?;
        let workspace = shell
            .output(self.output)
            .map(|o| o.current_workspace())
            .ok_or(ActionError::UnknownOutput(self.output))?;

        let views = shell.views_on_workspace(self.output, workspace, LayerMask::WORKSPACE);
        match views.last() {
            Some(bottom) if *bottom != view => {}
            _ => return Ok(()),
        }

        let node = shell.view(view).map(|v| v.node).ok_or(ActionError::UnknownView(view))?;
        let lowered = shell
            .scene()
            .parent(node)
            .and_then(|parent| shell.scene_mut().container_mut(parent))
            .is_some_and(|mut container| container.lower_to_bottom(node));
        if !lowered {
            debug!("{} has no reorderable parent", view);
        }

        let views = shell.views_on_workspace(self.output, workspace, LayerMask::WORKSPACE);
        if let Some(top) = views.first() {
            shell.focus_view(*top);
        }
        Ok(())
    }

    // === Show desktop ===

    pub fn toggle_show_desktop(&mut self, shell: &mut Shell) -> Result<(), ActionError> {
        if self.show_desktop.is_active() {
            self.restore_desktop(shell)
        } else {
            self.show_desktop(shell)
        }
    }

    /// Minimize every visible toplevel. A no-op while already active.
    pub fn show_desktop(&mut self, shell: &mut Shell) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        let id = self.id.ok_or(ActionError::NotInitialised(self.output))?;
        self.show_desktop.activate(shell, id, self.output);
        Ok(())
    }

    /// Leave show-desktop, restoring the views it hid. Succeeds while
    /// inactive.
    pub fn restore_desktop(&mut self, shell: &mut Shell) -> Result<(), ActionError> {
        self.check_rights(shell)?;
        self.show_desktop.deactivate(shell, self.output);
        Ok(())
    }

    // === Command dispatch ===

    /// Run `action` on the view selected by `source`.
    pub fn run_action(
        &mut self,
        shell: &mut Shell,
        action: WmAction,
        source: ActivatorSource,
    ) -> Result<(), ActionError> {
        if action == WmAction::ToggleShowDesktop {
            return self.toggle_show_desktop(shell);
        }

        let view = self.choose_view(shell, source)?;
        match action {
            WmAction::Minimize => self.minimize(shell, view),
            WmAction::ToggleMaximize => self.toggle_maximize(shell, view),
            WmAction::ToggleAbove => self.toggle_above(shell, view),
            WmAction::ToggleFullscreen => self.toggle_fullscreen(shell, view),
            WmAction::ToggleSticky => self.toggle_sticky(shell, view),
            WmAction::SendToBack => self.send_to_back(shell, view),
            WmAction::ToggleShowDesktop => self.toggle_show_desktop(shell),
        }
    }

    /// The toplevel a command applies to: the view under the pointer for
    /// button bindings, the active view otherwise or as fallback.
    fn choose_view(&self, shell: &Shell, source: ActivatorSource) -> Result<ViewId, ActionError> {
        let pointer = match source {
            ActivatorSource::ButtonBinding => shell.cursor_focus_view().filter(|id| {
                shell
                    .view(*id)
                    .is_some_and(|v| v.output == self.output && v.is_toplevel())
            }),
            _ => None,
        };

        let view = pointer
            .or_else(|| shell.active_view(self.output))
            .ok_or(ActionError::NoTarget)?;
        match shell.view(view) {
            Some(v) if v.is_toplevel() => Ok(view),
            Some(_) => Err(ActionError::NotToplevel(view)),
            None => Err(ActionError::UnknownView(view)),
        }
    }

    fn check_rights(&self, shell: &Shell) -> Result<(), ActionError> {
        let output = shell
            .output(self.output)
            .ok_or(ActionError::UnknownOutput(self.output))?;
        if output.can_activate_plugin(PLUGIN_NAME) {
            Ok(())
        } else {
            Err(ActionError::ActivationDenied(self.output))
        }
    }

    fn check_owned(&self, shell: &Shell, view: ViewId) -> Result<(), ActionError> {
        let v = shell.view(view).ok_or(ActionError::UnknownView(view))?;
        if v.output != self.output {
            return Err(ActionError::ForeignView {
                view,
                output: self.output,
            });
        }
        Ok(())
    }
}

impl Plugin for WmActions {
    fn name(&self) -> &str {
        PLUGIN_NAME
    }

    fn init(&mut self, id: PluginId, shell: &mut Shell) -> anyhow::Result<()> {
        self.id = Some(id);
        let region = AboveRegion::create(shell, self.output)
            .with_context(|| format!("Failed to create always-above region on {}", self.output))?;
        self.region = Some(region);

        for (action, binding) in self.config.iter() {
            if binding.is_disabled() {
                continue;
            }
            let binding = shell.bindings_mut().add(id, self.output, binding.clone());
            self.actions.insert(binding, action);
        }

        let scope = Scope::Output(self.output);
        let maintenance = [
            (scope, SignalKind::SetAboveState, Maintenance::SetAboveState),
            (scope, SignalKind::ViewMinimized, Maintenance::Unminimized),
            (Scope::Core, SignalKind::ViewMovedToOutput, Maintenance::MovedToOutput),
            (scope, SignalKind::ViewMapped, Maintenance::Mapped),
        ];
        for (scope, kind, handler) in maintenance {
            let listener = shell.bus_mut().connect(id, scope, kind);
            self.handlers.insert(listener, handler);
        }

        info!(
            "🪟 Window actions ready on {} ({} bindings)",
            self.output,
            self.actions.len()
        );
        Ok(())
    }

    fn fini(&mut self, shell: &mut Shell) {
        if let Some(region) = self.region.take() {
            region.audit(shell, self.output);

            let kept: Vec<ViewId> = shell
                .views()
                .iter()
                .filter(|v| v.output == self.output && v.has_tag(ViewTags::KEPT_ABOVE))
                .map(|v| v.id)
                .collect();
            for view in kept {
                if let Err(err) = AboveRegion::restore(shell, view) {
                    warn!("Failed to restore {} from always-above region: {}", view, err);
                }
                shell.views_mut().clear_tag(view, ViewTags::KEPT_ABOVE);
                shell.emit(
                    Scope::Output(self.output),
                    Signal::AboveStateChanged { view, above: false },
                );
            }

            for orphan in region.destroy(shell) {
                warn!("⚠️ {} was left in the always-above region", orphan);
                let home = shell
                    .output(self.output)
                    .map(|o| o.view_container(Layer::Workspace));
                if let Some(home) = home {
                    if let Err(err) = shell.scene_mut().add_front(home, orphan) {
                        warn!("Failed to re-home {}: {}", orphan, err);
                    }
                }
            }
        }

        self.show_desktop.deactivate(shell, self.output);

        for (binding, _) in self.actions.drain() {
            shell.bindings_mut().remove(binding);
        }
        for (listener, _) in self.handlers.drain() {
            shell.bus_mut().disconnect(listener);
        }
        info!("🪟 Window actions released {}", self.output);
    }

    fn on_signal(&mut self, shell: &mut Shell, listener: ListenerId, emission: &Emission) {
        if self.show_desktop.owns(listener) {
            self.show_desktop.handle_signal(shell, self.output, emission);
            return;
        }

        let Some(handler) = self.handlers.get(&listener).copied() else {
            return;
        };
        match (handler, &emission.signal) {
            (Maintenance::SetAboveState, Signal::SetAboveState { view, above }) => {
                if let Err(err) = self.set_kept_above(shell, Some(*view), *above) {
                    debug!("Above request for {} failed: {}", view, err);
                }
            }
            (Maintenance::MovedToOutput, Signal::ViewMovedToOutput { view, new, .. }) => {
                if *new == self.output {
                    self.reassert_above(shell, *view);
                }
            }
            (
                Maintenance::Unminimized,
                Signal::ViewMinimized {
                    view,
                    minimized: false,
                    ..
                },
            ) => {
                if shell.view(*view).is_some_and(|v| v.output == self.output) {
                    self.reassert_above(shell, *view);
                }
            }
            (Maintenance::Mapped, Signal::ViewMapped { view, .. }) => {
                self.reassert_above(shell, *view);
            }
            _ => {}
        }
    }

    fn on_activator(&mut self, shell: &mut Shell, binding: BindingId, data: ActivatorData) -> bool {
        let Some(action) = self.actions.get(&binding).copied() else {
            return false;
        };

        match self.run_action(shell, action, data.source) {
            Ok(()) => true,
            Err(err) => {
                debug!("{} on {} did nothing: {}", action, self.output, err);
                false
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
