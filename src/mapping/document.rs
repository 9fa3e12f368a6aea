//! Persisted form of a binding.
//!
//! The same fields serialize to TOML and JSON. Names (buttons, axes, keys,
//! chair commands) stay strings here and are checked in
//! [`BindingDocument::to_binding`].

use crate::controller::keyboard::key_code;
use crate::controller::{InputKind, InputSignature};
use crate::mapping::binding::{
    Action, AxisResponse, AxisTuning, Binding, Interaction, Timing,
};
use crate::mapping::error::BindingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Either a numeric index (buttons, axes, raw key codes) or a key name
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum InputId {
    Index(u32),
    Name(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionDocument {
    Haptic {
        effect_name: String,
        #[serde(default = "full_intensity")]
        base_intensity: u8,
        #[serde(default, skip_serializing_if = "AxisResponse::is_default")]
        response: AxisResponse,
    },
    Button {
        button: String,
    },
    Axis {
        target_axis: String,
        #[serde(default)]
        tuning: AxisTuning,
    },
    Chair {
        command: String,
    },
    Sequence {
        btn1: String,
        btn2: String,
        #[serde(default = "default_on_ms")]
        on_ms: u64,
        #[serde(default = "default_off_ms")]
        off_ms: u64,
        #[serde(default = "default_repeats")]
        repeats: u32,
    },
    Rumble {
        target_axis: String,
        intensity: f32,
        speed: f32,
        /// 0 keeps rumbling until the input is released
        #[serde(default)]
        duration_ms: u64,
    },
}

fn full_intensity() -> u8 {
    100
}

fn default_on_ms() -> u64 {
    100
}

fn default_off_ms() -> u64 {
    500
}

fn default_repeats() -> u32 {
    1
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BindingDocument {
    pub name: String,
    #[serde(default)]
    pub device_index: u32,
    pub input_type: InputKind,
    pub input_id: InputId,
    pub action: ActionDocument,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub disable_others: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable_others: Vec<String>,
    #[serde(default)]
    pub start_disabled: bool,
    #[serde(default)]
    pub start_delay_ms: u64,
    #[serde(default)]
    pub hold_time_ms: u64,
    /// Present means turbo mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turbo_rate_ms: Option<u64>,
}

impl BindingDocument {
    fn input_signature(&self) -> Result<InputSignature, BindingError> {
        match (&self.input_type, &self.input_id) {
            (InputKind::Button | InputKind::Axis, InputId::Index(code)) => Ok(InputSignature::new(
                self.device_index,
                self.input_type,
                *code,
            )),
            (InputKind::Button | InputKind::Axis, InputId::Name(name)) => Err(
                BindingError::malformed(&self.name, format!("'{}' is not a device index", name)),
            ),
            (InputKind::Key | InputKind::Mouse, InputId::Name(name)) => {
                let (kind, code) = key_code(name).ok_or_else(|| {
                    BindingError::malformed(&self.name, format!("unknown key '{}'", name))
                })?;
                Ok(InputSignature::new(0, kind, code))
            }
            // Raw virtual-key code
            (InputKind::Key | InputKind::Mouse, InputId::Index(code)) => {
                Ok(InputSignature::new(0, self.input_type, *code))
            }
        }
    }

    fn action(&self) -> Result<Action, BindingError> {
        let invalid = |reason: String| BindingError::invalid_target(&self.name, reason);

        let action = match &self.action {
            ActionDocument::Haptic {
                effect_name,
                base_intensity,
                response,
            } => Action::PlayHapticEffect {
                effect_name: effect_name.clone(),
                base_intensity: (*base_intensity).min(100),
                response: *response,
            },
            ActionDocument::Button { button } => Action::VirtualButton {
                button: button.parse().map_err(invalid)?,
            },
            ActionDocument::Axis {
                target_axis,
                tuning,
            } => Action::VirtualAxis {
                target: target_axis.parse().map_err(invalid)?,
                tuning: *tuning,
            },
            ActionDocument::Chair { command } => Action::ChairCommand {
                command: command.parse().map_err(invalid)?,
            },
            ActionDocument::Sequence {
                btn1,
                btn2,
                on_ms,
                off_ms,
                repeats,
            } => Action::ButtonPulseSequence {
                btn1: btn1.parse().map_err(invalid)?,
                btn2: btn2.parse().map_err(invalid)?,
                on: Duration::from_millis(*on_ms),
                off: Duration::from_millis(*off_ms),
                repeats: *repeats,
            },
            ActionDocument::Rumble {
                target_axis,
                intensity,
                speed,
                duration_ms,
            } => Action::Rumble {
                target: target_axis.parse().map_err(invalid)?,
                intensity: *intensity,
                speed: *speed,
                duration: (*duration_ms > 0).then(|| Duration::from_millis(*duration_ms)),
            },
        };
        Ok(action)
    }

    /// Checks names and shapes and builds the engine's view of the binding.
    pub fn to_binding(&self) -> Result<Binding, BindingError> {
        if self.name.trim().is_empty() {
            return Err(BindingError::malformed("<unnamed>", "binding has no name"));
        }

        let input = self.input_signature()?;
        let action = self.action()?;

        let axis_action = matches!(
            action,
            Action::VirtualAxis { .. } | Action::PlayHapticEffect { .. }
        );
        if input.kind == InputKind::Axis && !axis_action {
            return Err(BindingError::malformed(
                &self.name,
                format!("an axis input cannot drive a {} action", action.kind()),
            ));
        }
        if input.kind != InputKind::Axis && matches!(action, Action::VirtualAxis { .. }) {
            return Err(BindingError::malformed(
                &self.name,
                "virtual axis actions need an axis input",
            ));
        }
        if self.turbo_rate_ms == Some(0) {
            return Err(BindingError::malformed(&self.name, "turbo rate must be above 0"));
        }

        Ok(Binding {
            name: self.name.clone(),
            input,
            action,
            interaction: Interaction {
                disable_others: self.disable_others.iter().cloned().collect(),
                enable_others: self.enable_others.iter().cloned().collect(),
            },
            timing: Timing {
                start_delay: Duration::from_millis(self.start_delay_ms),
                hold_time: Duration::from_millis(self.hold_time_ms),
                turbo_rate: self.turbo_rate_ms.map(Duration::from_millis),
            },
            start_disabled: self.start_disabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chair::ChairCommand;
    use crate::output::gamepad::{AxisTarget, VirtualButton};

    fn document(input_type: InputKind, input_id: InputId, action: ActionDocument) -> BindingDocument {
        BindingDocument {
            name: "test".to_string(),
            device_index: 1,
            input_type,
            input_id,
            action,
            disable_others: Vec::new(),
            enable_others: Vec::new(),
            start_disabled: false,
            start_delay_ms: 0,
            hold_time_ms: 0,
            turbo_rate_ms: None,
        }
    }

    #[test]
    fn parses_a_toml_binding() {
        let text = r#"
            name = "fire"
            device_index = 0
            input_type = "button"
            input_id = 5
            turbo_rate_ms = 80
            disable_others = ["reload"]

            [action]
            type = "button"
            button = "XUSB_GAMEPAD_RIGHT_SHOULDER"
        "#;
        let document: BindingDocument = toml::from_str(text).unwrap();
        let binding = document.to_binding().unwrap();

        assert_eq!(binding.input, InputSignature::new(0, InputKind::Button, 5));
        assert_eq!(
            binding.action,
            Action::VirtualButton {
                button: VirtualButton::RightShoulder
            }
        );
        assert_eq!(binding.timing.turbo_rate, Some(Duration::from_millis(80)));
        assert!(binding.interaction.disable_others.contains("reload"));
    }

    #[test]
    fn key_names_resolve_to_codes() {
        let binding = document(
            InputKind::Mouse,
            InputId::Name("r_mouse".to_string()),
            ActionDocument::Chair {
                command: "park".to_string(),
            },
        )
        .to_binding()
        .unwrap();
        assert_eq!(binding.input, InputSignature::new(0, InputKind::Mouse, 0x02));
        assert_eq!(
            binding.action,
            Action::ChairCommand {
                command: ChairCommand::Park
            }
        );
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let bad_button = document(
            InputKind::Button,
            InputId::Index(0),
            ActionDocument::Button {
                button: "TURBO".to_string(),
            },
        );
        assert!(matches!(
            bad_button.to_binding(),
            Err(BindingError::ActionTargetInvalid { .. })
        ));

        let bad_key = document(
            InputKind::Key,
            InputId::Name("F13".to_string()),
            ActionDocument::Button {
                button: "A".to_string(),
            },
        );
        assert!(matches!(
            bad_key.to_binding(),
            Err(BindingError::MalformedBinding { .. })
        ));
    }

    #[test]
    fn axis_inputs_only_drive_axis_like_actions() {
        let axis_to_button = document(
            InputKind::Axis,
            InputId::Index(0),
            ActionDocument::Button {
                button: "A".to_string(),
            },
        );
        assert!(matches!(
            axis_to_button.to_binding(),
            Err(BindingError::MalformedBinding { .. })
        ));

        let axis = document(
            InputKind::Axis,
            InputId::Index(3),
            ActionDocument::Axis {
                target_axis: "right_stick_y".to_string(),
                tuning: AxisTuning::default(),
            },
        )
        .to_binding()
        .unwrap();
        assert!(axis.is_axis());
        assert!(matches!(
            axis.action,
            Action::VirtualAxis {
                target: AxisTarget::RightStickY,
                ..
            }
        ));
    }

    #[test]
    fn rumble_without_duration_runs_until_release() {
        let binding = document(
            InputKind::Button,
            InputId::Index(1),
            ActionDocument::Rumble {
                target_axis: "left_stick_x".to_string(),
                intensity: 0.3,
                speed: 4.0,
                duration_ms: 0,
            },
        )
        .to_binding()
        .unwrap();
        assert!(matches!(binding.action, Action::Rumble { duration: None, .. }));
    }

    #[test]
    fn document_round_trips_through_toml() {
        #[derive(Deserialize, Serialize, Debug, PartialEq)]
        struct Doc {
            bindings: Vec<BindingDocument>,
        }
        let mut sequence = document(
            InputKind::Button,
            InputId::Index(7),
            ActionDocument::Sequence {
                btn1: "A".to_string(),
                btn2: "B".to_string(),
                on_ms: 120,
                off_ms: 300,
                repeats: 2,
            },
        );
        sequence.enable_others = vec!["other".to_string()];
        sequence.hold_time_ms = 250;

        let mut haptic = document(
            InputKind::Axis,
            InputId::Index(4),
            ActionDocument::Haptic {
                effect_name: "front_rear_center".to_string(),
                base_intensity: 70,
                response: AxisResponse {
                    saturation: 60,
                    ..AxisResponse::default()
                },
            },
        );
        haptic.name = "throttle".to_string();
        haptic.start_disabled = true;

        let mut key = document(
            InputKind::Key,
            InputId::Name("SPACE".to_string()),
            ActionDocument::Chair {
                command: "lights_off".to_string(),
            },
        );
        key.name = "lights".to_string();
        key.turbo_rate_ms = Some(200);

        let doc = Doc {
            bindings: vec![sequence, haptic, key],
        };
        let text = toml::to_string(&doc).unwrap();
        let parsed: Doc = toml::from_str(&text).unwrap();
        assert_eq!(parsed, doc);
    }
}
