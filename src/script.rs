//! Scenario replay
//!
//! Drives the host model from JSON lines, one step per line, and reports the
//! resulting stacking state. Used by the command line tool and in tests.
//!
//! ```text
//! {"op": "open", "title": "term"}
//! {"op": "press", "input": "<super> KEY_D"}
//! {"op": "action", "action": "send_to_back"}
//! ```

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::BufRead;

use crate::compositor::{Compositor, PluginId};
use crate::config::OverstoryConfig;
use crate::input::{ActivatorBinding, ActivatorSource, InputEvent};
use crate::output::{Layer, LayerMask, OutputId};
use crate::shell::Shell;
use crate::signal::{Scope, Signal};
use crate::window::{TiledEdges, ViewId, ViewRole, ViewSpec, ViewTags};
use crate::wm_actions::{WmAction, WmActions};

/// One scenario step. Outputs are referred to by name and default to the
/// focused output; views are referred to by title.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    /// Create a view, mapped unless `mapped` is false
    Open {
        title: String,
        #[serde(default)]
        output: Option<String>,
        #[serde(default)]
        workspace: usize,
        #[serde(default = "default_role")]
        role: ViewRole,
        #[serde(default = "default_layer")]
        layer: Layer,
        #[serde(default = "default_true")]
        mapped: bool,
    },
    Map {
        view: String,
    },
    Unmap {
        view: String,
    },
    Close {
        view: String,
    },
    /// Press every trigger of an activator string, e.g. `"<super> KEY_D"`
    Press {
        input: String,
    },
    Focus {
        view: String,
    },
    /// Put the pointer over a view, or over nothing
    Pointer {
        #[serde(default)]
        view: Option<String>,
    },
    Minimize {
        view: String,
        #[serde(default = "default_true")]
        minimized: bool,
    },
    Workspace {
        #[serde(default)]
        output: Option<String>,
        index: usize,
    },
    MoveToOutput {
        view: String,
        output: String,
    },
    /// Request above state through the `SetAboveState` signal
    Above {
        view: String,
        above: bool,
    },
    /// Run a window action directly, bypassing bindings
    Action {
        action: WmAction,
        #[serde(default)]
        output: Option<String>,
    },
    /// Inhibit or release an output, e.g. to emulate a lock screen
    Inhibit {
        #[serde(default)]
        output: Option<String>,
        #[serde(default = "default_true")]
        inhibited: bool,
    },
}

fn default_role() -> ViewRole {
    ViewRole::Toplevel
}

fn default_layer() -> Layer {
    Layer::Workspace
}

fn default_true() -> bool {
    true
}

/// Stacking state of every output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub outputs: Vec<OutputSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSnapshot {
    pub name: String,
    pub workspace: usize,
    pub active: Option<String>,
    pub show_desktop: bool,
    /// Mapped views, top to bottom, minimized ones included
    pub stacking: Vec<ViewSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewSnapshot {
    pub title: String,
    pub workspace: usize,
    pub minimized: bool,
    pub kept_above: bool,
    pub maximized: bool,
    pub fullscreen: bool,
    pub sticky: bool,
}

pub struct ScriptRunner {
    compositor: Compositor,
    views: BTreeMap<String, ViewId>,
    plugins: BTreeMap<OutputId, PluginId>,
}

impl ScriptRunner {
    /// Create the configured outputs and load the window actions on each.
    pub fn new(config: &OverstoryConfig) -> Result<Self> {
        let mut shell = Shell::new();
        let outputs: Vec<OutputId> = config
            .outputs
            .names
            .iter()
            .map(|name| shell.add_output(name.clone(), config.outputs.workspaces))
            .collect();

        let mut compositor = Compositor::new(shell);
        let mut plugins = BTreeMap::new();
        for output in outputs {
            let plugin = compositor
                .load_plugin(Box::new(WmActions::new(output, config.bindings.clone())))
                .with_context(|| format!("Failed to load window actions on {}", output))?;
            plugins.insert(output, plugin);
        }

        Ok(Self {
            compositor,
            views: BTreeMap::new(),
            plugins,
        })
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn compositor_mut(&mut self) -> &mut Compositor {
        &mut self.compositor
    }

    /// Id of the view created with `title`.
    pub fn view_id(&self, title: &str) -> Option<ViewId> {
        self.views.get(title).copied()
    }

    /// Replay every step read from `reader`. Blank lines and lines starting
    /// with `#` are skipped. Returns the number of steps run.
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<usize> {
        let mut steps = 0;
        for (index, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read script line {}", index + 1))?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let step: ScriptStep = serde_json::from_str(line)
                .with_context(|| format!("Invalid step on line {}", index + 1))?;
            self.step(step)
                .with_context(|| format!("Step on line {} failed", index + 1))?;
            steps += 1;
        }
        Ok(steps)
    }

    /// Run a single step.
    pub fn step(&mut self, step: ScriptStep) -> Result<()> {
        debug!("Script step: {:?}", step);
        match step {
            ScriptStep::Open {
                title,
                output,
                workspace,
                role,
                layer,
                mapped,
            } => {
                if self.views.contains_key(&title) {
                    bail!("A view titled `{}` already exists", title);
                }
                let output = self.resolve_output(output.as_deref())?;
                let spec = ViewSpec::toplevel(title.clone(), output)
                    .with_role(role)
                    .on_workspace(workspace)
                    .in_layer(layer);
                let view = self.compositor.apply(|shell| -> Result<ViewId> {
                    let view = shell.create_view(spec)?;
                    if mapped {
                        shell.map_view(view)?;
                    }
                    Ok(view)
                })?;
                self.views.insert(title, view);
            }
            ScriptStep::Map { view } => {
                let view = self.resolve_view(&view)?;
                self.compositor.apply(|shell| shell.map_view(view))?;
            }
            ScriptStep::Unmap { view } => {
                let view = self.resolve_view(&view)?;
                self.compositor.apply(|shell| shell.unmap_view(view))?;
            }
            ScriptStep::Close { view: title } => {
                let view = self.resolve_view(&title)?;
                self.compositor.apply(|shell| shell.destroy_view(view))?;
                self.views.remove(&title);
            }
            ScriptStep::Press { input } => {
                let binding: ActivatorBinding = input
                    .parse()
                    .with_context(|| format!("Invalid input `{}`", input))?;
                for trigger in binding.triggers() {
                    let handled = self.compositor.handle_input(&InputEvent::from(trigger));
                    debug!("`{}` handled = {}", trigger, handled);
                }
            }
            ScriptStep::Focus { view } => {
                let view = self.resolve_view(&view)?;
                self.compositor.apply(|shell| shell.focus_view(view));
            }
            ScriptStep::Pointer { view } => {
                let view = view.as_deref().map(|title| self.resolve_view(title)).transpose()?;
                self.compositor.shell_mut().set_cursor_focus(view);
            }
            ScriptStep::Minimize { view, minimized } => {
                let view = self.resolve_view(&view)?;
                self.compositor.apply(|shell| shell.set_minimized(view, minimized))?;
            }
            ScriptStep::Workspace { output, index } => {
                let output = self.resolve_output(output.as_deref())?;
                self.compositor.apply(|shell| shell.set_workspace(output, index))?;
            }
            ScriptStep::MoveToOutput { view, output } => {
                let view = self.resolve_view(&view)?;
                let output = self.resolve_output(Some(&output))?;
                self.compositor.apply(|shell| shell.move_view_to_output(view, output))?;
            }
            ScriptStep::Above { view, above } => {
                let view = self.resolve_view(&view)?;
                let output = self
                    .compositor
                    .shell()
                    .view(view)
                    .map(|v| v.output)
                    .context("View vanished")?;
                self.compositor.apply(|shell| {
                    shell.emit(Scope::Output(output), Signal::SetAboveState { view, above })
                });
            }
            ScriptStep::Action { action, output } => {
                let output = self.resolve_output(output.as_deref())?;
                let plugin = *self
                    .plugins
                    .get(&output)
                    .with_context(|| format!("No window actions on {}", output))?;
                let result = self
                    .compositor
                    .with_plugin::<WmActions, _>(plugin, |wm, shell| {
                        wm.run_action(shell, action, ActivatorSource::Plugin)
                    })
                    .with_context(|| format!("Window actions on {} are busy", output))?;
                if let Err(err) = result {
                    info!("{} did nothing: {}", action, err);
                }
            }
            ScriptStep::Inhibit { output, inhibited } => {
                let output = self.resolve_output(output.as_deref())?;
                let out = self
                    .compositor
                    .shell_mut()
                    .output_mut(output)
                    .with_context(|| format!("{} vanished", output))?;
                if inhibited {
                    out.inhibit();
                } else {
                    out.uninhibit();
                }
            }
        }
        Ok(())
    }

    /// Current stacking state of every output.
    pub fn snapshot(&self) -> Snapshot {
        let shell = self.compositor.shell();
        let title = |id: ViewId| shell.view(id).map(|v| v.title.clone());

        let outputs = shell
            .outputs()
            .map(|output| {
                let show_desktop = self
                    .plugins
                    .get(&output.id)
                    .and_then(|id| self.compositor.plugin::<WmActions>(*id))
                    .is_some_and(|wm| wm.is_show_desktop_active());
                let stacking = shell
                    .views_in_layers(output.id, LayerMask::ALL, true)
                    .into_iter()
                    .filter_map(|id| shell.view(id))
                    .map(|v| ViewSnapshot {
                        title: v.title.clone(),
                        workspace: v.workspace,
                        minimized: v.minimized,
                        kept_above: v.has_tag(ViewTags::KEPT_ABOVE),
                        maximized: v.tiled_edges == TiledEdges::ALL,
                        fullscreen: v.fullscreen,
                        sticky: v.sticky,
                    })
                    .collect();

                OutputSnapshot {
                    name: output.name.clone(),
                    workspace: output.current_workspace(),
                    active: output.active_view().and_then(title),
                    show_desktop,
                    stacking,
                }
            })
            .collect();

        Snapshot { outputs }
    }

    fn resolve_view(&self, title: &str) -> Result<ViewId> {
        self.view_id(title)
            .with_context(|| format!("No view titled `{}`", title))
    }

    fn resolve_output(&self, name: Option<&str>) -> Result<OutputId> {
        let shell = self.compositor.shell();
        match name {
            Some(name) => shell
                .output_by_name(name)
                .with_context(|| format!("No output named `{}`", name)),
            None => shell
                .focused_output()
                .or_else(|| shell.outputs().next().map(|o| o.id))
                .context("No outputs configured"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ScriptRunner {
        let mut config = OverstoryConfig::default();
        config.bindings.toggle_showdesktop = "<super> KEY_D".parse().unwrap();
        config.bindings.send_to_back = "<super> BTN_MIDDLE".parse().unwrap();
        ScriptRunner::new(&config).unwrap()
    }

    fn titles(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.outputs[0]
            .stacking
            .iter()
            .map(|v| v.title.as_str())
            .collect()
    }

    #[test]
    fn test_replay_builds_stacking_order() {
        let mut runner = runner();
        let script = r#"
# three windows, the first kept above
{"op": "open", "title": "a"}
{"op": "open", "title": "b"}
{"op": "above", "view": "a", "above": true}
{"op": "open", "title": "c"}
"#;

        assert_eq!(runner.run(script.as_bytes()).unwrap(), 4);

        let snapshot = runner.snapshot();
        assert_eq!(titles(&snapshot), vec!["a", "c", "b"]);
        assert!(snapshot.outputs[0].stacking[0].kept_above);
        assert_eq!(snapshot.outputs[0].active.as_deref(), Some("c"));
    }

    #[test]
    fn test_press_routes_through_bindings() {
        let mut runner = runner();
        runner
            .run(
                r#"{"op": "open", "title": "a"}
{"op": "press", "input": "<super> KEY_D"}"#
                    .as_bytes(),
            )
            .unwrap();

        let snapshot = runner.snapshot();
        assert!(snapshot.outputs[0].show_desktop);
        assert!(snapshot.outputs[0].stacking[0].minimized);
    }

    #[test]
    fn test_action_step_runs_without_binding() {
        let mut runner = runner();
        runner
            .run(
                r#"{"op": "open", "title": "a"}
{"op": "action", "action": "toggle_sticky"}
{"op": "action", "action": "toggle_maximize"}"#
                    .as_bytes(),
            )
            .unwrap();

        let view = &runner.snapshot().outputs[0].stacking[0];
        assert!(view.sticky);
        assert!(view.maximized);
    }

    #[test]
    fn test_inhibited_output_ignores_actions() {
        let mut runner = runner();
        runner.run(r#"{"op": "open", "title": "a"}"#.as_bytes()).unwrap();
        let output = runner.compositor().shell().outputs().next().unwrap().id;
        runner.compositor_mut().shell_mut().output_mut(output).unwrap().inhibit();

        runner
            .run(r#"{"op": "action", "action": "toggle_sticky"}"#.as_bytes())
            .unwrap();
        assert!(!runner.snapshot().outputs[0].stacking[0].sticky);

        runner
            .run(
                r#"{"op": "inhibit", "inhibited": false}
{"op": "action", "action": "toggle_sticky"}"#
                    .as_bytes(),
            )
            .unwrap();
        assert!(runner.snapshot().outputs[0].stacking[0].sticky);
    }

    #[test]
    fn test_bad_steps_report_line() {
        let mut runner = runner();
        let err = runner
            .run("{\"op\": \"open\", \"title\": \"a\"}\n{\"op\": \"map\", \"view\": \"zz\"}".as_bytes())
            .unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = runner.run("{\"op\": \"fly\"}".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Invalid step on line 1"));
    }

    #[test]
    fn test_snapshot_serializes_to_json() {
        let mut runner = runner();
        runner.step(ScriptStep::Open {
            title: "a".into(),
            output: None,
            workspace: 0,
            role: ViewRole::Toplevel,
            layer: Layer::Workspace,
            mapped: true,
        })
        .unwrap();

        let json = serde_json::to_value(runner.snapshot()).unwrap();
        assert_eq!(json["outputs"][0]["name"], "default-1");
        assert_eq!(json["outputs"][0]["stacking"][0]["title"], "a");
    }
}
