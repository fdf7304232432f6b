//! Typed signal bus
//!
//! Listeners are registrations `(owner, scope, kind)`; payloads are the
//! variants of [`Signal`]. The listeners of an emission are fixed when it is
//! raised: the [`crate::compositor::Compositor`] hands it to those of them
//! still connected, in registration order, before the host call that raised
//! it returns. A listener connected afterwards never sees it.

use log::trace;
use std::collections::VecDeque;
use std::fmt;

use crate::compositor::PluginId;
use crate::output::OutputId;
use crate::window::{TiledEdges, ViewId};

/// Signals raised by the host and by plugins
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// A view node was attached to one of the output's layers
    ViewLayerAttached { view: ViewId, toplevel: bool },
    ViewMapped { view: ViewId, toplevel: bool },
    ViewUnmapped { view: ViewId },
    /// `mapped` and `toplevel` describe the view when the state changed
    ViewMinimized {
        view: ViewId,
        minimized: bool,
        mapped: bool,
        toplevel: bool,
    },
    ViewTiled { view: ViewId, edges: TiledEdges },
    ViewFullscreened { view: ViewId, fullscreen: bool },
    ViewStickyChanged { view: ViewId, sticky: bool },
    /// Raised on the core scope
    ViewMovedToOutput {
        view: ViewId,
        old: OutputId,
        new: OutputId,
    },
    WorkspaceChanged {
        output: OutputId,
        old: usize,
        new: usize,
    },
    /// A view entered or left the always-above region
    AboveStateChanged { view: ViewId, above: bool },
    /// Request to put a view into or out of the always-above region
    SetAboveState { view: ViewId, above: bool },
}

/// Discriminant of [`Signal`], used to subscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    ViewLayerAttached,
    ViewMapped,
    ViewUnmapped,
    ViewMinimized,
    ViewTiled,
    ViewFullscreened,
    ViewStickyChanged,
    ViewMovedToOutput,
    WorkspaceChanged,
    AboveStateChanged,
    SetAboveState,
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::ViewLayerAttached { .. } => SignalKind::ViewLayerAttached,
            Signal::ViewMapped { .. } => SignalKind::ViewMapped,
            Signal::ViewUnmapped { .. } => SignalKind::ViewUnmapped,
            Signal::ViewMinimized { .. } => SignalKind::ViewMinimized,
            Signal::ViewTiled { .. } => SignalKind::ViewTiled,
            Signal::ViewFullscreened { .. } => SignalKind::ViewFullscreened,
            Signal::ViewStickyChanged { .. } => SignalKind::ViewStickyChanged,
            Signal::ViewMovedToOutput { .. } => SignalKind::ViewMovedToOutput,
            Signal::WorkspaceChanged { .. } => SignalKind::WorkspaceChanged,
            Signal::AboveStateChanged { .. } => SignalKind::AboveStateChanged,
            Signal::SetAboveState { .. } => SignalKind::SetAboveState,
        }
    }

    /// The view the signal is about, if any.
    pub fn view(&self) -> Option<ViewId> {
        match *self {
            Signal::ViewLayerAttached { view, .. }
            | Signal::ViewMapped { view, .. }
            | Signal::ViewUnmapped { view }
            | Signal::ViewMinimized { view, .. }
            | Signal::ViewTiled { view, .. }
            | Signal::ViewFullscreened { view, .. }
            | Signal::ViewStickyChanged { view, .. }
            | Signal::ViewMovedToOutput { view, .. }
            | Signal::AboveStateChanged { view, .. }
            | Signal::SetAboveState { view, .. } => Some(view),
            Signal::WorkspaceChanged { .. } => None,
        }
    }
}

/// Where a signal is raised and where a listener listens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Output(OutputId),
    /// Process-wide signals
    Core,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct Listener {
    id: ListenerId,
    owner: PluginId,
    scope: Scope,
    kind: SignalKind,
}

/// A raised signal awaiting delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub scope: Scope,
    pub signal: Signal,
    /// Matching listeners at the time of the emit, in registration order
    pub listeners: Vec<(ListenerId, PluginId)>,
}

#[derive(Debug, Default)]
pub struct SignalBus {
    listeners: Vec<Listener>,
    next_id: u64,
    pending: VecDeque<Emission>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `owner` to signals of `kind` raised on `scope`.
    pub fn connect(&mut self, owner: PluginId, scope: Scope, kind: SignalKind) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push(Listener {
            id,
            owner,
            scope,
            kind,
        });
        trace!("{} connected {} to {:?} on {:?}", owner, id, kind, scope);
        id
    }

    /// Remove a listener. Returns `false` if it was not connected.
    pub fn disconnect(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        before != self.listeners.len()
    }

    /// Remove every listener of `owner`, returning how many were dropped.
    pub fn disconnect_owner(&mut self, owner: PluginId) -> usize {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.owner != owner);
        before - self.listeners.len()
    }

    pub fn is_connected(&self, id: ListenerId) -> bool {
        self.listeners.iter().any(|l| l.id == id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Raise `signal` on `scope` for the listeners connected now.
    pub fn emit(&mut self, scope: Scope, signal: Signal) {
        let listeners = self.listeners_for(scope, signal.kind());
        trace!("Emitting {:?} on {:?} to {} listeners", signal, scope, listeners.len());
        self.pending.push_back(Emission {
            scope,
            signal,
            listeners,
        });
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Next signal awaiting delivery, oldest first.
    pub fn pop_pending(&mut self) -> Option<Emission> {
        self.pending.pop_front()
    }

    /// Listeners of `kind` on `scope`, in registration order.
    pub fn listeners_for(&self, scope: Scope, kind: SignalKind) -> Vec<(ListenerId, PluginId)> {
        self.listeners
            .iter()
            .filter(|l| l.kind == kind && l.scope == scope)
            .map(|l| (l.id, l.owner))
            .collect()
    }
}
