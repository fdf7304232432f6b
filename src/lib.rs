//! # Overstory
//!
//! Window actions for a layered compositor scene: keep-above, show-desktop,
//! send-to-back and the minimize/maximize/fullscreen/sticky toggles, driven
//! by configurable key and button bindings.
//!
//! ## Architecture
//!
//! - `scene`: node tree with front-to-back stacking containers
//! - `output`: per-output layers and workspace state
//! - `window`: view registry and tags
//! - `signal`: typed signals and listener registrations
//! - `input`: activator bindings and their parsing
//! - `shell`: the host model tying the above together
//! - `compositor`: plugin host, input routing and signal delivery
//! - `wm_actions`: the window-actions plugin
//! - `config`: TOML configuration
//! - `script`: scenario replay for the command line tool
//!
//! ## Usage
//!
//! ```rust,no_run
//! use overstory::{Compositor, OverstoryConfig, Shell, WmActions};
//!
//! fn main() -> overstory::Result<()> {
//!     let config = OverstoryConfig::default();
//!     let mut shell = Shell::new();
//!     let output = shell.add_output("DP-1", config.outputs.workspaces);
//!
//!     let mut compositor = Compositor::new(shell);
//!     compositor.load_plugin(Box::new(WmActions::new(output, config.bindings)))?;
//!     Ok(())
//! }
//! ```

pub mod compositor;
pub mod config;
pub mod input;
pub mod output;
pub mod scene;
pub mod script;
pub mod shell;
pub mod signal;
pub mod window;
pub mod wm_actions;

// Re-export main types for easy access
pub use compositor::{Compositor, Plugin, PluginId};
pub use config::OverstoryConfig;
pub use script::ScriptRunner;
pub use shell::{Shell, ShellError};
pub use wm_actions::{ActionError, WmAction, WmActions};

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Overstory
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
