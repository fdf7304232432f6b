//! Show-desktop mode
//!
//! Minimizes every visible toplevel and restores exactly those views when the
//! mode ends. The hidden set is the set of views tagged `HIDDEN_FOR_DESKTOP`;
//! the cancellation listeners exist only in the `Active` state.

use log::{debug, info, warn};

use crate::compositor::PluginId;
use crate::output::{LayerMask, OutputId};
use crate::shell::Shell;
use crate::signal::{Emission, ListenerId, Scope, Signal, SignalKind};
use crate::window::{ViewId, ViewTags};

/// Signals that end show-desktop on the output
const CANCEL_ON: [SignalKind; 4] = [
    SignalKind::ViewLayerAttached,
    SignalKind::ViewMapped,
    SignalKind::WorkspaceChanged,
    SignalKind::ViewMinimized,
];

#[derive(Debug, Default, PartialEq, Eq)]
pub(super) enum ShowDesktop {
    #[default]
    Inactive,
    Active {
        listeners: [ListenerId; 4],
    },
}

impl ShowDesktop {
    pub fn is_active(&self) -> bool {
        matches!(self, ShowDesktop::Active { .. })
    }

    /// Whether `listener` is one of the cancellation listeners.
    pub fn owns(&self, listener: ListenerId) -> bool {
        match self {
            ShowDesktop::Active { listeners } => listeners.contains(&listener),
            ShowDesktop::Inactive => false,
        }
    }

    /// Hide every visible toplevel on `output`. Returns how many were hidden;
    /// does nothing if already active.
    pub fn activate(&mut self, shell: &mut Shell, owner: PluginId, output: OutputId) -> usize {
        if self.is_active() {
            debug!("Show-desktop already active on {}", output);
            return 0;
        }

        let visible: Vec<ViewId> = shell
            .views_in_layers(output, LayerMask::WM, false)
            .into_iter()
            .filter(|id| shell.view(*id).is_some_and(|v| v.is_toplevel()))
            .collect();

        for view in &visible {
            shell.views_mut().set_tag(*view, ViewTags::HIDDEN_FOR_DESKTOP);
            if let Err(err) = shell.set_minimized(*view, true) {
                warn!("Failed to hide {}: {}", view, err);
            }
        }

        let scope = Scope::Output(output);
        let listeners = CANCEL_ON.map(|kind| shell.bus_mut().connect(owner, scope, kind));
        *self = ShowDesktop::Active { listeners };

        info!("🖥️ Show-desktop on {}: hid {} views", output, visible.len());
        visible.len()
    }

    /// Restore every view hidden by show-desktop on `output`. Safe to call in
    /// any state. Returns how many views were restored.
    pub fn deactivate(&mut self, shell: &mut Shell, output: OutputId) -> usize {
        if let ShowDesktop::Active { listeners } = std::mem::take(self) {
            for listener in listeners {
                shell.bus_mut().disconnect(listener);
            }
        }

        let hidden: Vec<ViewId> = shell
            .views()
            .iter()
            .filter(|v| v.output == output && v.has_tag(ViewTags::HIDDEN_FOR_DESKTOP))
            .map(|v| v.id)
            .collect();

        for view in &hidden {
            shell.views_mut().clear_tag(*view, ViewTags::HIDDEN_FOR_DESKTOP);
            if let Err(err) = shell.set_minimized(*view, false) {
                warn!("Failed to restore {}: {}", view, err);
            }
        }

        if !hidden.is_empty() {
            info!("🖥️ Show-desktop off on {}: restored {} views", output, hidden.len());
        }
        hidden.len()
    }

    /// React to a cancellation listener. Returns whether the mode ended.
    ///
    /// Decides from the payload alone: the view may have changed again
    /// before the signal is delivered.
    pub fn handle_signal(&mut self, shell: &mut Shell, output: OutputId, emission: &Emission) -> bool {
        let cancels = match emission.signal {
            Signal::ViewLayerAttached { toplevel, .. } | Signal::ViewMapped { toplevel, .. } => toplevel,
            Signal::WorkspaceChanged { .. } => true,
            Signal::ViewMinimized {
                minimized: false,
                mapped,
                toplevel,
                ..
            } => mapped && toplevel,
            _ => false,
        };

        if cancels {
            debug!("{:?} cancels show-desktop on {}", emission.signal.kind(), output);
            self.deactivate(shell, output);
        }
        cancels
    }
}
