//! Activator bindings and input routing
//!
//! An activator binding maps one or more triggers (a key or a pointer button
//! combined with modifiers) to a plugin callback. Bindings are written as
//! `"<super> <shift> KEY_D | <super> BTN_MIDDLE"`; `"none"` or an empty string
//! disables the binding.

use bitflags::bitflags;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::compositor::PluginId;
use crate::output::OutputId;

bitflags! {
    /// Keyboard modifiers held during a trigger
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const SUPER = 1 << 0;
        const ALT = 1 << 1;
        const CTRL = 1 << 2;
        const SHIFT = 1 << 3;
    }
}

impl Modifiers {
    /// Parse one `<name>` token. Accepts the aliases `logo` and `control`.
    fn from_token(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "super" | "logo" => Some(Modifiers::SUPER),
            "alt" => Some(Modifiers::ALT),
            "ctrl" | "control" => Some(Modifiers::CTRL),
            "shift" => Some(Modifiers::SHIFT),
            _ => None,
        }
    }
}

impl fmt::Display for Modifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = [
            (Modifiers::SUPER, "super"),
            (Modifiers::ALT, "alt"),
            (Modifiers::CTRL, "ctrl"),
            (Modifiers::SHIFT, "shift"),
        ];
        let mut first = true;
        for (flag, name) in names {
            if self.contains(flag) {
                if !first {
                    f.write_str(" ")?;
                }
                write!(f, "<{}>", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Raw input the compositor routes to activator bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// Key press, e.g. `KEY_D`
    Key { modifiers: Modifiers, key: String },
    /// Pointer button press, e.g. `BTN_LEFT`
    Button { modifiers: Modifiers, button: String },
}

impl InputEvent {
    pub fn key(modifiers: Modifiers, key: impl Into<String>) -> Self {
        InputEvent::Key {
            modifiers,
            key: key.into(),
        }
    }

    pub fn button(modifiers: Modifiers, button: impl Into<String>) -> Self {
        InputEvent::Button {
            modifiers,
            button: button.into(),
        }
    }
}

/// Input modality that fired an activator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivatorSource {
    Keybinding,
    ButtonBinding,
    Gesture,
    /// Invoked programmatically, e.g. from a script
    Plugin,
}

/// Payload handed to an activator callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivatorData {
    pub source: ActivatorSource,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingParseError {
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),

    #[error("trigger `{0}` has no key or button")]
    MissingKey(String),

    #[error("`{0}` is neither a KEY_* nor a BTN_* name")]
    UnknownInput(String),

    #[error("unexpected `{token}` after the key in trigger `{trigger}`")]
    TrailingToken { trigger: String, token: String },
}

/// One way of firing a binding
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Trigger {
    Key { modifiers: Modifiers, key: String },
    Button { modifiers: Modifiers, button: String },
}

impl Trigger {
    fn parse(text: &str) -> Result<Self, BindingParseError> {
        let mut modifiers = Modifiers::empty();
        let mut input: Option<&str> = None;

        for token in text.split_whitespace() {
            if input.is_some() {
                return Err(BindingParseError::TrailingToken {
                    trigger: text.to_string(),
                    token: token.to_string(),
                });
            }

            if token.starts_with('<') {
                modifiers |= parse_modifier_token(token)?;
            } else {
                input = Some(token);
            }
        }

        let input = input.ok_or_else(|| BindingParseError::MissingKey(text.to_string()))?;
        if input.starts_with("KEY_") {
            Ok(Trigger::Key {
                modifiers,
                key: input.to_string(),
            })
        } else if input.starts_with("BTN_") {
            Ok(Trigger::Button {
                modifiers,
                button: input.to_string(),
            })
        } else {
            Err(BindingParseError::UnknownInput(input.to_string()))
        }
    }

    fn matches(&self, event: &InputEvent) -> Option<ActivatorSource> {
        match (self, event) {
            (
                Trigger::Key { modifiers, key },
                InputEvent::Key {
                    modifiers: held,
                    key: pressed,
                },
            ) if modifiers == held && key == pressed => Some(ActivatorSource::Keybinding),
            (
                Trigger::Button { modifiers, button },
                InputEvent::Button {
                    modifiers: held,
                    button: pressed,
                },
            ) if modifiers == held && button == pressed => Some(ActivatorSource::ButtonBinding),
            _ => None,
        }
    }
}

impl From<&Trigger> for InputEvent {
    /// The input that fires `trigger`.
    fn from(trigger: &Trigger) -> Self {
        match trigger {
            Trigger::Key { modifiers, key } => InputEvent::key(*modifiers, key.clone()),
            Trigger::Button { modifiers, button } => InputEvent::button(*modifiers, button.clone()),
        }
    }
}

/// `<super><shift>` and `<super>` are both accepted.
fn parse_modifier_token(token: &str) -> Result<Modifiers, BindingParseError> {
    let mut modifiers = Modifiers::empty();
    let mut rest = token;

    while !rest.is_empty() {
        let inner = rest
            .strip_prefix('<')
            .and_then(|r| r.split_once('>'))
            .ok_or_else(|| BindingParseError::UnknownModifier(token.to_string()))?;
        let (name, tail) = inner;
        modifiers |= Modifiers::from_token(name)
            .ok_or_else(|| BindingParseError::UnknownModifier(name.to_string()))?;
        rest = tail;
    }

    Ok(modifiers)
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (modifiers, input) = match self {
            Trigger::Key { modifiers, key } => (modifiers, key),
            Trigger::Button { modifiers, button } => (modifiers, button),
        };
        if modifiers.is_empty() {
            f.write_str(input)
        } else {
            write!(f, "{} {}", modifiers, input)
        }
    }
}

/// A configured activator: any of its triggers fires it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActivatorBinding {
    triggers: Vec<Trigger>,
}

impl ActivatorBinding {
    /// A binding that never fires.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_disabled(&self) -> bool {
        self.triggers.is_empty()
    }

    pub fn triggers(&self) -> &[Trigger] {
        &self.triggers
    }

    /// Modality of the first trigger matching `event`.
    pub fn matches(&self, event: &InputEvent) -> Option<ActivatorSource> {
        self.triggers.iter().find_map(|t| t.matches(event))
    }
}

impl FromStr for ActivatorBinding {
    type Err = BindingParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
            return Ok(Self::disabled());
        }

        let triggers = trimmed
            .split('|')
            .map(|part| Trigger::parse(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { triggers })
    }
}

impl TryFrom<String> for ActivatorBinding {
    type Error = BindingParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ActivatorBinding> for String {
    fn from(binding: ActivatorBinding) -> Self {
        binding.to_string()
    }
}

impl fmt::Display for ActivatorBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.triggers.is_empty() {
            return f.write_str("none");
        }
        for (i, trigger) in self.triggers.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{}", trigger)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingId(u64);

impl fmt::Display for BindingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "binding#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct RegisteredBinding {
    id: BindingId,
    owner: PluginId,
    output: OutputId,
    binding: ActivatorBinding,
}

/// Activator bindings registered by plugins, per output
#[derive(Debug, Default)]
pub struct BindingRegistry {
    bindings: Vec<RegisteredBinding>,
    next_id: u64,
}

impl BindingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, owner: PluginId, output: OutputId, binding: ActivatorBinding) -> BindingId {
        self.next_id += 1;
        let id = BindingId(self.next_id);
        debug!("{} bound `{}` on {} as {}", owner, binding, output, id);
        self.bindings.push(RegisteredBinding {
            id,
            owner,
            output,
            binding,
        });
        id
    }

    pub fn remove(&mut self, id: BindingId) -> bool {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.id != id);
        before != self.bindings.len()
    }

    pub fn remove_owner(&mut self, owner: PluginId) -> usize {
        let before = self.bindings.len();
        self.bindings.retain(|b| b.owner != owner);
        before - self.bindings.len()
    }

    pub fn owner(&self, id: BindingId) -> Option<PluginId> {
        self.bindings.iter().find(|b| b.id == id).map(|b| b.owner)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Bindings on `output` fired by `event`, in registration order.
    pub fn matching(&self, output: OutputId, event: &InputEvent) -> Vec<(BindingId, PluginId, ActivatorSource)> {
        self.bindings
            .iter()
            .filter(|b| b.output == output)
            .filter_map(|b| b.binding.matches(event).map(|source| (b.id, b.owner, source)))
            .collect()
    }
}
