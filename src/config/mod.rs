//! Configuration management for Overstory
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files: the window action bindings, the outputs to create
//! and general settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::input::ActivatorBinding;
use crate::wm_actions::WmAction;

/// Main configuration struct containing all Overstory settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct OverstoryConfig {
    /// Window action bindings
    #[serde(default)]
    pub bindings: BindingsConfig,

    /// Outputs created at startup
    #[serde(default)]
    pub outputs: OutputsConfig,

    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,
}

/// Activator bindings of the window actions.
///
/// Each value is one or more triggers separated by `|`, for example
/// `"<super> <shift> KEY_D | <super> BTN_MIDDLE"`. `"none"` disables the
/// action.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct BindingsConfig {
    /// Minimize every visible window, or bring them back
    #[serde(alias = "toggle-show-desktop", alias = "toggle_show_desktop")]
    pub toggle_showdesktop: ActivatorBinding,

    /// Minimize or restore the selected window
    pub minimize: ActivatorBinding,

    /// Tile the selected window against every edge, or untile it
    #[serde(alias = "toggle-maximize")]
    pub toggle_maximize: ActivatorBinding,

    /// Keep the selected window above all others, or stop doing so
    #[serde(alias = "toggle-above", alias = "toggle_above")]
    pub toggle_always_on_top: ActivatorBinding,

    #[serde(alias = "toggle-fullscreen")]
    pub toggle_fullscreen: ActivatorBinding,

    /// Show the selected window on every workspace
    #[serde(alias = "toggle-sticky")]
    pub toggle_sticky: ActivatorBinding,

    /// Lower the selected window below the others of its workspace
    #[serde(alias = "send-to-back")]
    pub send_to_back: ActivatorBinding,
}

/// Outputs configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputsConfig {
    /// Workspaces per output
    pub workspaces: usize,

    /// Output names, one output each
    pub names: Vec<String>,
}

/// General settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct GeneralConfig {
    /// Enable debug logging
    pub debug: bool,
}

impl Default for OutputsConfig {
    fn default() -> Self {
        Self {
            workspaces: 4,
            names: vec!["default-1".to_string()],
        }
    }
}

impl BindingsConfig {
    /// Binding of `action`.
    pub fn get(&self, action: WmAction) -> &ActivatorBinding {
        match action {
            WmAction::ToggleShowDesktop => &self.toggle_showdesktop,
            WmAction::Minimize => &self.minimize,
            WmAction::ToggleMaximize => &self.toggle_maximize,
            WmAction::ToggleAbove => &self.toggle_always_on_top,
            WmAction::ToggleFullscreen => &self.toggle_fullscreen,
            WmAction::ToggleSticky => &self.toggle_sticky,
            WmAction::SendToBack => &self.send_to_back,
        }
    }

    pub fn set(&mut self, action: WmAction, binding: ActivatorBinding) {
        let slot = match action {
            WmAction::ToggleShowDesktop => &mut self.toggle_showdesktop,
            WmAction::Minimize => &mut self.minimize,
            WmAction::ToggleMaximize => &mut self.toggle_maximize,
            WmAction::ToggleAbove => &mut self.toggle_always_on_top,
            WmAction::ToggleFullscreen => &mut self.toggle_fullscreen,
            WmAction::ToggleSticky => &mut self.toggle_sticky,
            WmAction::SendToBack => &mut self.send_to_back,
        };
        *slot = binding;
    }

    /// Every action with its binding, enabled or not.
    pub fn iter(&self) -> impl Iterator<Item = (WmAction, &ActivatorBinding)> {
        WmAction::ALL.into_iter().map(move |action| (action, self.get(action)))
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
            Ok(Path::new(&home).join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl OverstoryConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: OverstoryConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.outputs.workspaces == 0 {
            anyhow::bail!("Invalid workspaces: every output needs at least one workspace");
        }

        if self.outputs.names.is_empty() {
            anyhow::bail!("Invalid outputs: at least one output name is required");
        }

        let mut names = HashSet::new();
        for name in &self.outputs.names {
            if name.trim().is_empty() {
                anyhow::bail!("Invalid output name: names must not be empty");
            }
            if !names.insert(name.as_str()) {
                anyhow::bail!("Duplicate output name: {}", name);
            }
        }

        // One trigger firing two actions is almost certainly a mistake
        let mut triggers = HashSet::new();
        for (action, binding) in self.bindings.iter() {
            for trigger in binding.triggers() {
                if !triggers.insert(trigger.clone()) {
                    anyhow::bail!("Trigger `{}` of {} is bound more than once", trigger, action);
                }
            }
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }

    /// Merge a partial configuration into this one
    /// Non-default sections from the partial config override this config
    pub fn merge_partial(mut self, partial: OverstoryConfig) -> Self {
        let default_config = OverstoryConfig::default();

        if partial.bindings != default_config.bindings {
            self.bindings = partial.bindings;
        }
        if partial.outputs != default_config.outputs {
            self.outputs = partial.outputs;
        }
        if partial.general != default_config.general {
            self.general = partial.general;
        }

        self
    }
}


#[cfg(test)]
mod property_tests;
