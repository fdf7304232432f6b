//! Integration tests for Overstory
//!
//! These tests drive the compositor end to end through configured key and
//! button bindings, across outputs and plugin reloads, and through scenario
//! files.

use anyhow::Result;
use std::fs::{self, File};
use std::io::BufReader;
use tempfile::tempdir;

use overstory::input::{InputEvent, Modifiers};
use overstory::output::{LayerMask, OutputId};
use overstory::window::{ViewId, ViewSpec, ViewTags};
use overstory::{Compositor, OverstoryConfig, PluginId, ScriptRunner, Shell, WmAction, WmActions};

fn config() -> Result<OverstoryConfig> {
    let mut config = OverstoryConfig::default();
    config.bindings.toggle_showdesktop = "<super> KEY_D".parse()?;
    config.bindings.minimize = "<super> KEY_N".parse()?;
    config.bindings.toggle_always_on_top = "<super> KEY_T".parse()?;
    config.bindings.send_to_back = "<super> KEY_B | <super> BTN_MIDDLE".parse()?;
    config.validate()?;
    Ok(config)
}

/// A compositor with the window actions loaded on every named output.
fn setup(names: &[&str]) -> Result<(Compositor, Vec<(OutputId, PluginId)>)> {
    let config = config()?;
    let mut shell = Shell::new();
    let outputs: Vec<OutputId> = names.iter().map(|name| shell.add_output(*name, 2)).collect();

    let mut compositor = Compositor::new(shell);
    let mut loaded = Vec::new();
    for output in outputs {
        let plugin = compositor.load_plugin(Box::new(WmActions::new(output, config.bindings.clone())))?;
        loaded.push((output, plugin));
    }
    Ok((compositor, loaded))
}

fn open(compositor: &mut Compositor, title: &str, output: OutputId) -> Result<ViewId> {
    let view = compositor.apply(|shell| -> Result<ViewId> {
        let view = shell.create_view(ViewSpec::toplevel(title, output))?;
        shell.map_view(view)?;
        Ok(view)
    })?;
    Ok(view)
}

fn order(compositor: &Compositor, output: OutputId) -> Vec<ViewId> {
    compositor.shell().views_in_layers(output, LayerMask::ALL, true)
}

fn parent(compositor: &Compositor, view: ViewId) -> Option<overstory::scene::NodeId> {
    let shell = compositor.shell();
    shell.view(view).and_then(|v| shell.scene().parent(v.node))
}

fn super_key(key: &str) -> InputEvent {
    InputEvent::key(Modifiers::SUPER, key)
}

#[test]
fn test_bindings_drive_stacking() -> Result<()> {
    let (mut compositor, loaded) = setup(&["DP-1"])?;
    let (output, plugin) = loaded[0];
    let wm = compositor.plugin::<WmActions>(plugin).expect("plugin loaded");
    let region = wm.region_node().expect("region created at init");
    assert!(wm.binding_for(WmAction::ToggleAbove).is_some());
    assert!(wm.binding_for(WmAction::ToggleSticky).is_none());

    let a = open(&mut compositor, "a", output)?;
    let b = open(&mut compositor, "b", output)?;
    let c = open(&mut compositor, "c", output)?;
    assert_eq!(order(&compositor, output), vec![c, b, a]);

    // Keep `a` above through the active view
    compositor.apply(|shell| shell.focus_view(a));
    assert!(compositor.handle_input(&super_key("KEY_T")));
    assert_eq!(parent(&compositor, a), Some(region));
    assert_eq!(order(&compositor, output), vec![a, c, b]);

    // New windows open below kept-above ones
    let d = open(&mut compositor, "d", output)?;
    assert_eq!(order(&compositor, output), vec![a, d, c, b]);

    // The button binding targets the view under the pointer
    compositor.shell_mut().set_cursor_focus(Some(d));
    assert!(compositor.handle_input(&InputEvent::button(Modifiers::SUPER, "BTN_MIDDLE")));
    assert_eq!(order(&compositor, output), vec![a, c, b, d]);
    assert_eq!(compositor.shell().active_view(output), Some(a));

    // Toggling again returns `a` to the normal stack
    assert!(compositor.handle_input(&super_key("KEY_T")));
    assert_ne!(parent(&compositor, a), Some(region));
    assert!(!compositor.shell().views().has_tag(a, ViewTags::KEPT_ABOVE));

    // Unbound input does nothing
    assert!(!compositor.handle_input(&super_key("KEY_Q")));

    Ok(())
}

#[test]
fn test_show_desktop_round_trip_by_key() -> Result<()> {
    let (mut compositor, loaded) = setup(&["DP-1"])?;
    let (output, plugin) = loaded[0];

    let a = open(&mut compositor, "a", output)?;
    let b = open(&mut compositor, "b", output)?;
    compositor.apply(|shell| shell.set_minimized(a, true))?;

    compositor.handle_input(&super_key("KEY_D"));
    let shell = compositor.shell();
    assert!(shell.view(b).is_some_and(|v| v.minimized));
    assert!(shell.views().has_tag(b, ViewTags::HIDDEN_FOR_DESKTOP));
    // Already minimized views are left out of the restore set
    assert!(!shell.views().has_tag(a, ViewTags::HIDDEN_FOR_DESKTOP));
    assert!(compositor.plugin::<WmActions>(plugin).is_some_and(|wm| wm.is_show_desktop_active()));

    compositor.handle_input(&super_key("KEY_D"));
    let shell = compositor.shell();
    assert!(shell.view(b).is_some_and(|v| !v.minimized));
    assert!(shell.view(a).is_some_and(|v| v.minimized));
    assert!(shell.views().tagged(ViewTags::HIDDEN_FOR_DESKTOP).is_empty());
    assert!(!compositor.plugin::<WmActions>(plugin).is_some_and(|wm| wm.is_show_desktop_active()));

    Ok(())
}

#[test]
fn test_input_goes_to_focused_output_only() -> Result<()> {
    let (mut compositor, loaded) = setup(&["DP-1", "DP-2"])?;
    let (left, left_plugin) = loaded[0];
    let (right, right_plugin) = loaded[1];

    let a = open(&mut compositor, "a", left)?;
    let b = open(&mut compositor, "b", right)?;

    compositor.apply(|shell| shell.focus_output(left))?;
    compositor.handle_input(&super_key("KEY_D"));

    assert!(compositor.shell().view(a).is_some_and(|v| v.minimized));
    assert!(compositor.shell().view(b).is_some_and(|v| !v.minimized));
    assert!(compositor.plugin::<WmActions>(left_plugin).is_some_and(|wm| wm.is_show_desktop_active()));
    assert!(!compositor.plugin::<WmActions>(right_plugin).is_some_and(|wm| wm.is_show_desktop_active()));

    // A kept-above view moved across outputs lands in the new output's region
    compositor.apply(|shell| shell.focus_output(right))?;
    compositor.handle_input(&super_key("KEY_T"));
    let right_region = compositor.plugin::<WmActions>(right_plugin).and_then(|wm| wm.region_node());
    assert_eq!(parent(&compositor, b), right_region);

    compositor.apply(|shell| shell.move_view_to_output(b, left))?;
    let left_region = compositor.plugin::<WmActions>(left_plugin).and_then(|wm| wm.region_node());
    assert_eq!(parent(&compositor, b), left_region);

    Ok(())
}

#[test]
fn test_unload_leaves_a_clean_scene() -> Result<()> {
    let (mut compositor, loaded) = setup(&["DP-1"])?;
    let (output, plugin) = loaded[0];

    let a = open(&mut compositor, "a", output)?;
    let b = open(&mut compositor, "b", output)?;
    compositor.handle_input(&super_key("KEY_T"));
    compositor.apply(|shell| shell.focus_view(a));
    compositor.handle_input(&super_key("KEY_D"));

    assert!(compositor.unload_plugin(plugin));

    let shell = compositor.shell();
    let container = shell.output(output).map(|o| o.view_container(overstory::output::Layer::Workspace));
    assert_eq!(parent(&compositor, b), container);
    assert!(shell.views().tagged(ViewTags::KEPT_ABOVE).is_empty());
    assert!(shell.views().tagged(ViewTags::HIDDEN_FOR_DESKTOP).is_empty());
    assert!(shell.view(a).is_some_and(|v| !v.minimized));
    assert!(shell.bindings().is_empty());
    assert_eq!(shell.bus().listener_count(), 0);

    // Nothing reacts to input any more
    assert!(!compositor.handle_input(&super_key("KEY_D")));

    Ok(())
}

#[test]
fn test_scenario_file_with_config_file() -> Result<()> {
    let dir = tempdir()?;
    let config_path = dir.path().join("overstory.toml");
    let script_path = dir.path().join("scenario.jsonl");

    fs::write(
        &config_path,
        r#"
[bindings]
toggle-above = "<super> KEY_T"
send-to-back = "<super> KEY_B"

[outputs]
workspaces = 2
names = ["DP-1"]
"#,
    )?;
    fs::write(
        &script_path,
        r#"{"op": "open", "title": "editor"}
{"op": "open", "title": "term"}
{"op": "press", "input": "<super> KEY_T"}
{"op": "open", "title": "browser"}
{"op": "open", "title": "far", "workspace": 1}
{"op": "focus", "view": "browser"}
{"op": "press", "input": "<super> KEY_B"}
"#,
    )?;

    let config = OverstoryConfig::load(&config_path)?;
    let mut runner = ScriptRunner::new(&config)?;
    let steps = runner.run(BufReader::new(File::open(&script_path)?))?;
    assert_eq!(steps, 7);

    let snapshot = runner.snapshot();
    let output = &snapshot.outputs[0];
    let titles: Vec<&str> = output.stacking.iter().map(|v| v.title.as_str()).collect();
    // `far` sits on another workspace and is not affected by send-to-back
    assert_eq!(titles, vec!["term", "far", "editor", "browser"]);
    assert_eq!(output.stacking[1].workspace, 1);
    assert!(output.stacking[0].kept_above);
    assert_eq!(output.active.as_deref(), Some("term"));
    assert_eq!(output.workspace, 0);

    Ok(())
}
