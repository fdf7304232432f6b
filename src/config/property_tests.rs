//! Property-based tests for configuration module
//!
//! These tests use proptest to generate random binding configurations and
//! verify serialization round-trips and validation.

use super::*;
use crate::input::{ActivatorBinding, InputEvent, Trigger};
use proptest::prelude::*;

fn modifier_tokens() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(vec!["<super>", "<alt>", "<ctrl>", "<shift>"], 0..=4)
}

// Strategy for generating a single trigger in config syntax
prop_compose! {
    fn valid_trigger()(
        modifiers in modifier_tokens(),
        input in prop_oneof![
            "[A-Z]".prop_map(|k| format!("KEY_{}", k)),
            Just("KEY_ENTER".to_string()),
            Just("KEY_LEFT".to_string()),
            Just("BTN_LEFT".to_string()),
            Just("BTN_MIDDLE".to_string()),
            Just("BTN_RIGHT".to_string()),
        ],
    ) -> String {
        let mut parts: Vec<String> = modifiers.into_iter().map(String::from).collect();
        parts.push(input);
        parts.join(" ")
    }
}

// Strategy for generating a binding string: disabled or 1-3 alternatives
prop_compose! {
    fn valid_binding_text()(
        disabled in any::<bool>(),
        triggers in prop::collection::vec(valid_trigger(), 1..4),
    ) -> String {
        if disabled {
            "none".to_string()
        } else {
            triggers.join(" | ")
        }
    }
}

prop_compose! {
    fn valid_bindings_config()(
        texts in prop::collection::vec(valid_binding_text(), 7),
    ) -> BindingsConfig {
        let mut bindings = BindingsConfig::default();
        for (action, text) in WmAction::ALL.into_iter().zip(texts) {
            if let Ok(binding) = text.parse::<ActivatorBinding>() {
                bindings.set(action, binding);
            }
        }
        bindings
    }
}

prop_compose! {
    fn valid_outputs_config()(
        workspaces in 1usize..16,
        count in 1usize..4,
    ) -> OutputsConfig {
        OutputsConfig {
            workspaces,
            names: (1..=count).map(|i| format!("DP-{}", i)).collect(),
        }
    }
}

prop_compose! {
    fn valid_overstory_config()(
        bindings in valid_bindings_config(),
        outputs in valid_outputs_config(),
        debug in any::<bool>(),
    ) -> OverstoryConfig {
        OverstoryConfig {
            bindings,
            outputs,
            general: GeneralConfig { debug },
        }
    }
}

proptest! {
    /// Every generated binding string parses
    #[test]
    fn test_binding_text_parses(text in valid_binding_text()) {
        let parsed = text.parse::<ActivatorBinding>();
        prop_assert!(parsed.is_ok(), "Failed to parse `{}`: {:?}", text, parsed.err());
    }

    /// Rendering a binding and parsing it back gives the same binding
    #[test]
    fn test_binding_display_roundtrip(text in valid_binding_text()) {
        let binding: ActivatorBinding = text.parse()?;
        let reparsed: ActivatorBinding = binding.to_string().parse()?;
        prop_assert_eq!(binding, reparsed);
    }

    /// A binding fires on the exact input of each of its triggers
    #[test]
    fn test_binding_matches_its_triggers(text in valid_binding_text()) {
        let binding: ActivatorBinding = text.parse()?;
        for trigger in binding.triggers() {
            let event = InputEvent::from(trigger);
            prop_assert!(binding.matches(&event).is_some());
        }
    }

    /// TOML serialization round-trip preserves data
    #[test]
    fn test_config_toml_roundtrip(config in valid_overstory_config()) {
        let toml_str = toml::to_string(&config)?;
        let parsed_config: OverstoryConfig = toml::from_str(&toml_str)?;

        prop_assert_eq!(config, parsed_config);
    }

    /// Validation fails exactly when a trigger is bound twice
    #[test]
    fn test_config_validation_detects_shared_triggers(config in valid_overstory_config()) {
        let all: Vec<&Trigger> = config
            .bindings
            .iter()
            .flat_map(|(_, binding)| binding.triggers())
            .collect();
        let unique: std::collections::HashSet<&Trigger> = all.iter().copied().collect();

        prop_assert_eq!(config.validate().is_ok(), unique.len() == all.len());
    }

    /// Merging a partial config replaces only the sections it changes
    #[test]
    fn test_partial_config_merge(
        base_config in valid_overstory_config(),
        outputs_override in valid_outputs_config()
    ) {
        let mut partial_config = OverstoryConfig::default();
        partial_config.outputs = outputs_override.clone();

        let base_bindings = base_config.bindings.clone();
        let base_debug = base_config.general.debug;
        let merged = base_config.merge_partial(partial_config);

        if outputs_override != OutputsConfig::default() {
            prop_assert_eq!(merged.outputs, outputs_override);
        }
        prop_assert_eq!(merged.bindings, base_bindings);
        prop_assert_eq!(merged.general.debug, base_debug);
    }
}
