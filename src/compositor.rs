//! Plugin host
//!
//! The compositor owns the [`Shell`] and the loaded plugins. It routes input to
//! activator bindings and delivers raised signals to listeners until the queue
//! is empty, so every host call returns with all consequences settled.

use anyhow::{Context, Result};
use log::{debug, info, trace, warn};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::input::{ActivatorData, ActivatorSource, BindingId, InputEvent};
use crate::shell::Shell;
use crate::signal::{Emission, ListenerId};

/// Upper bound on deliveries per flush; a plugin pair re-raising each other's
/// signals would otherwise spin forever.
const MAX_DELIVERIES_PER_FLUSH: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(u64);

impl PluginId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin#{}", self.0)
    }
}

/// A policy module loaded into the compositor
pub trait Plugin: Any {
    /// Name used for activation rights.
    fn name(&self) -> &str;

    /// Called once after loading. Register bindings and listeners here.
    fn init(&mut self, id: PluginId, shell: &mut Shell) -> Result<()>;

    /// Called once before unloading. Must be safe in any state.
    fn fini(&mut self, shell: &mut Shell);

    /// A signal this plugin listens to was raised.
    fn on_signal(&mut self, shell: &mut Shell, listener: ListenerId, emission: &Emission);

    /// One of this plugin's activator bindings fired. Returns whether the
    /// activator was handled.
    fn on_activator(&mut self, shell: &mut Shell, binding: BindingId, data: ActivatorData) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub struct Compositor {
    shell: Shell,
    /// `None` while the plugin is lent out to one of its own callbacks
    plugins: BTreeMap<PluginId, Option<Box<dyn Plugin>>>,
    next_plugin: u64,
}

impl Compositor {
    pub fn new(shell: Shell) -> Self {
        Self {
            shell,
            plugins: BTreeMap::new(),
            next_plugin: 0,
        }
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    /// Direct access to the host. Signals raised through it are delivered on
    /// the next call that flushes; prefer [`Compositor::apply`].
    pub fn shell_mut(&mut self) -> &mut Shell {
        &mut self.shell
    }

    /// Run a host operation and deliver everything it raised.
    pub fn apply<R>(&mut self, f: impl FnOnce(&mut Shell) -> R) -> R {
        let result = f(&mut self.shell);
        self.flush_signals();
        result
    }

    // === Plugins ===

    pub fn load_plugin(&mut self, mut plugin: Box<dyn Plugin>) -> Result<PluginId> {
        self.next_plugin += 1;
        let id = PluginId(self.next_plugin);
        let name = plugin.name().to_string();

        self.plugins.insert(id, None);
        if let Err(err) = plugin.init(id, &mut self.shell) {
            self.plugins.remove(&id);
            self.shell.bus_mut().disconnect_owner(id);
            self.shell.bindings_mut().remove_owner(id);
            return Err(err).with_context(|| format!("Failed to initialise plugin `{}`", name));
        }
        self.plugins.insert(id, Some(plugin));

        info!("🔌 Loaded plugin `{}` as {}", name, id);
        self.flush_signals();
        Ok(id)
    }

    /// Finalise and drop a plugin, releasing everything it registered.
    pub fn unload_plugin(&mut self, id: PluginId) -> bool {
        self.flush_signals();
        let Some(mut plugin) = self.plugins.remove(&id).flatten() else {
            return false;
        };

        plugin.fini(&mut self.shell);
        let listeners = self.shell.bus_mut().disconnect_owner(id);
        let bindings = self.shell.bindings_mut().remove_owner(id);
        if listeners + bindings > 0 {
            debug!("{} left {} listeners and {} bindings behind", id, listeners, bindings);
        }

        info!("🔌 Unloaded plugin `{}` ({})", plugin.name(), id);
        self.flush_signals();
        true
    }

    pub fn plugin_ids(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.plugins.keys().copied()
    }

    /// A loaded plugin as its concrete type. `None` while it is running.
    pub fn plugin<P: Plugin>(&self, id: PluginId) -> Option<&P> {
        self.plugins
            .get(&id)?
            .as_ref()
            .and_then(|plugin| plugin.as_any().downcast_ref::<P>())
    }

    /// Borrow a loaded plugin as its concrete type together with the host.
    pub fn with_plugin<P: Plugin, R>(
        &mut self,
        id: PluginId,
        f: impl FnOnce(&mut P, &mut Shell) -> R,
    ) -> Option<R> {
        let mut plugin = self.plugins.get_mut(&id)?.take()?;
        let result = plugin
            .as_any_mut()
            .downcast_mut::<P>()
            .map(|concrete| f(concrete, &mut self.shell));
        self.restore(id, plugin);

        self.flush_signals();
        result
    }

    // === Input ===

    /// Route an input event to the bindings of the focused output. Returns
    /// whether any activator handled it.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        let output = self
            .shell
            .focused_output()
            .or_else(|| self.shell.outputs().next().map(|o| o.id));
        let Some(output) = output else {
            return false;
        };

        let matches = self.shell.bindings().matching(output, event);
        trace!("{:?} on {} matched {} bindings", event, output, matches.len());

        let mut handled = false;
        for (binding, _, source) in matches {
            handled |= self.call_activator(binding, source);
        }
        handled
    }

    /// Fire `binding` as if its trigger was pressed via `source`.
    pub fn call_activator(&mut self, binding: BindingId, source: ActivatorSource) -> bool {
        let Some(owner) = self.shell.bindings().owner(binding) else {
            debug!("Activator {} is not registered", binding);
            return false;
        };
        let Some(mut plugin) = self.plugins.get_mut(&owner).and_then(Option::take) else {
            return false;
        };

        let handled = plugin.on_activator(&mut self.shell, binding, ActivatorData { source });
        self.restore(owner, plugin);

        self.flush_signals();
        handled
    }

    // === Signals ===

    /// Deliver pending signals until none are left.
    ///
    /// Each emission goes to the listeners that matched it when it was
    /// raised and are still connected, in registration order. Signals raised
    /// by a handler are queued behind the current one.
    pub fn flush_signals(&mut self) {
        let mut delivered = 0;

        while let Some(emission) = self.shell.bus_mut().pop_pending() {
            for &(listener, owner) in &emission.listeners {
                if !self.shell.bus().is_connected(listener) {
                    continue;
                }
                let Some(mut plugin) = self.plugins.get_mut(&owner).and_then(Option::take) else {
                    continue;
                };

                plugin.on_signal(&mut self.shell, listener, &emission);
                self.restore(owner, plugin);

                delivered += 1;
                if delivered >= MAX_DELIVERIES_PER_FLUSH {
                    warn!("⚠️ Signal storm: dropping signals after {} deliveries", delivered);
                    while self.shell.bus_mut().pop_pending().is_some() {}
                    return;
                }
            }
        }
    }

    fn restore(&mut self, id: PluginId, plugin: Box<dyn Plugin>) {
        if let Some(slot) = self.plugins.get_mut(&id) {
            *slot = Some(plugin);
        }
    }
}

impl fmt::Debug for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compositor")
            .field("shell", &self.shell)
            .field("plugins", &self.plugins.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ActivatorBinding, Modifiers};
    use crate::signal::{Scope, Signal, SignalKind};
    use crate::window::ViewSpec;

    /// Records deliveries; on the first `ViewMapped` it raises a sticky
    /// change and disconnects its second listener.
    #[derive(Default)]
    struct Recorder {
        id: Option<PluginId>,
        seen: Vec<(ListenerId, SignalKind)>,
        second: Option<ListenerId>,
        activations: Vec<ActivatorSource>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn init(&mut self, id: PluginId, shell: &mut Shell) -> Result<()> {
            self.id = Some(id);
            let output = shell.outputs().next().map(|o| o.id).context("no output")?;
            let scope = Scope::Output(output);
            shell.bus_mut().connect(id, scope, SignalKind::ViewMapped);
            shell.bus_mut().connect(id, scope, SignalKind::ViewStickyChanged);
            self.second = Some(shell.bus_mut().connect(id, scope, SignalKind::ViewMapped));
            let binding: ActivatorBinding = "<super> KEY_R".parse()?;
            shell.bindings_mut().add(id, output, binding);
            Ok(())
        }

        fn fini(&mut self, _shell: &mut Shell) {}

        fn on_signal(&mut self, shell: &mut Shell, listener: ListenerId, emission: &Emission) {
            self.seen.push((listener, emission.signal.kind()));
            if let Signal::ViewMapped { view, .. } = emission.signal {
                if let Some(second) = self.second.take() {
                    shell.bus_mut().disconnect(second);
                    let _ = shell.set_sticky(view, true);
                }
            }
        }

        fn on_activator(&mut self, _shell: &mut Shell, _binding: BindingId, data: ActivatorData) -> bool {
            self.activations.push(data.source);
            true
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn compositor() -> (Compositor, PluginId) {
        let mut shell = Shell::new();
        shell.add_output("DP-1", 1);
        let mut compositor = Compositor::new(shell);
        let id = compositor.load_plugin(Box::new(Recorder::default())).unwrap();
        (compositor, id)
    }

    #[test]
    fn test_nested_signals_run_after_the_current_handler() {
        let (mut compositor, id) = compositor();
        let output = compositor.shell().outputs().next().unwrap().id;

        compositor.apply(|shell| {
            let view = shell.create_view(ViewSpec::toplevel("a", output)).unwrap();
            shell.map_view(view).unwrap();
        });

        let seen = compositor
            .with_plugin::<Recorder, _>(id, |p, _| p.seen.iter().map(|(_, k)| *k).collect::<Vec<_>>())
            .unwrap();
        // The second ViewMapped listener was disconnected by the first one
        assert_eq!(seen, vec![SignalKind::ViewMapped, SignalKind::ViewStickyChanged]);
        assert!(!compositor.shell().bus().has_pending());
    }

    #[test]
    fn test_input_routes_to_binding_owner() {
        let (mut compositor, id) = compositor();

        assert!(compositor.handle_input(&InputEvent::key(Modifiers::SUPER, "KEY_R")));
        assert!(!compositor.handle_input(&InputEvent::key(Modifiers::empty(), "KEY_R")));

        let recorder = compositor.plugin::<Recorder>(id).unwrap();
        assert_eq!(recorder.activations, vec![ActivatorSource::Keybinding]);
    }

    #[test]
    fn test_unload_releases_registrations() {
        let (mut compositor, id) = compositor();
        assert!(compositor.shell().bus().listener_count() > 0);

        assert!(compositor.unload_plugin(id));

        assert_eq!(compositor.shell().bus().listener_count(), 0);
        assert!(compositor.shell().bindings().is_empty());
        assert!(!compositor.unload_plugin(id));
        assert_eq!(compositor.plugin_ids().count(), 0);
    }
}
