//! Haptic effect library
//!
//! Resolves an effect name plus a master intensity into timed motor frames.
//! Custom effects from the configuration are consulted before the built-in
//! registry, so a user effect with a built-in's name overrides it.
//!
//! ```text
//! resolve("name", 50) ──► EffectFrames ──► ResolvedFrame { motors[40], duration, delay }
//!                              (lazy, one pass)
//! ```

pub mod builtin;
pub mod playback;

pub use builtin::BuiltinEffect;
pub use playback::EffectPlayback;

use crate::output::haptic::{MotorIntensities, MOTOR_COUNT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("Unknown effect: {0}")]
    UnknownEffect(String),
}

/// One step of a timeline effect
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct EffectFrame {
    pub motors: Vec<i32>,
    pub intensity: i32,
    #[serde(alias = "duration")]
    pub duration_ms: u32,
    /// Wait after this frame before the next one starts
    #[serde(default, alias = "delay")]
    pub delay_ms: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HapticEffect {
    Static {
        motors: Vec<i32>,
        intensity: i32,
        #[serde(alias = "duration")]
        duration_ms: u32,
    },
    Sequence {
        frames: Vec<EffectFrame>,
    },
}

impl HapticEffect {
    pub fn frame_count(&self) -> usize {
        match self {
            HapticEffect::Static { .. } => 1,
            HapticEffect::Sequence { frames } => frames.len(),
        }
    }
}

/// Effect as stored in the configuration document
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct NamedEffect {
    pub name: String,
    #[serde(flatten)]
    pub effect: HapticEffect,
}

/// Frame ready for the vest
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedFrame {
    pub motors: MotorIntensities,
    pub duration_ms: u32,
    pub delay_ms: u32,
}

/// Builds the 40-slot array. Out-of-range indices are dropped, intensity is clamped.
pub fn motor_values(motors: &[i32], intensity: i32) -> MotorIntensities {
    let value = intensity.clamp(0, 100) as u8;
    let mut values = [0u8; MOTOR_COUNT];
    for idx in motors {
        if (0..MOTOR_COUNT as i32).contains(idx) {
            values[*idx as usize] = value;
        }
    }
    values
}

/// `round(intensity * master / 100)`, both sides clamped to 0..=100
pub fn scale_intensity(intensity: i32, master: u8) -> i32 {
    let base = intensity.clamp(0, 100) as f32;
    let master = master.min(100) as f32;
    (base * master / 100.0).round() as i32
}

/// Lazy, single-pass frame sequence for one resolution
#[derive(Debug, Clone)]
pub struct EffectFrames {
    effect: Arc<HapticEffect>,
    master: u8,
    next: usize,
}

impl Iterator for EffectFrames {
    type Item = ResolvedFrame;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = match self.effect.as_ref() {
            HapticEffect::Static {
                motors,
                intensity,
                duration_ms,
            } => (self.next == 0).then(|| ResolvedFrame {
                motors: motor_values(motors, scale_intensity(*intensity, self.master)),
                duration_ms: *duration_ms,
                delay_ms: 0,
            }),
            HapticEffect::Sequence { frames } => frames.get(self.next).map(|frame| ResolvedFrame {
                motors: motor_values(&frame.motors, scale_intensity(frame.intensity, self.master)),
                duration_ms: frame.duration_ms,
                delay_ms: frame.delay_ms,
            }),
        };
        if frame.is_some() {
            self.next += 1;
        }
        frame
    }
}

#[derive(Debug, Clone, Default)]
pub struct EffectLibrary {
    custom: HashMap<String, Arc<HapticEffect>>,
    builtin: HashMap<BuiltinEffect, Arc<HapticEffect>>,
}

impl EffectLibrary {
    pub fn new(custom_effects: &[NamedEffect]) -> Self {
        let mut custom = HashMap::new();
        for named in custom_effects {
            if custom
                .insert(named.name.clone(), Arc::new(named.effect.clone()))
                .is_some()
            {
                warn!("Custom effect '{}' defined twice, keeping the last one", named.name);
            }
            if let Some(builtin) = BuiltinEffect::from_name(&named.name) {
                info!("Custom effect '{}' overrides the built-in", builtin.name());
            }
            debug!(
                "Custom effect '{}': {} frames",
                named.name,
                named.effect.frame_count()
            );
        }

        let builtin = BuiltinEffect::ALL
            .iter()
            .map(|effect| {
                let definition = effect.definition();
                debug!(
                    "Built-in effect '{}': {} frames",
                    effect.name(),
                    definition.frame_count()
                );
                (*effect, Arc::new(definition))
            })
            .collect();

        debug!(
            "Effect library ready: {} custom, {} built-in",
            custom.len(),
            BuiltinEffect::ALL.len()
        );
        Self { custom, builtin }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    fn lookup(&self, name: &str) -> Option<Arc<HapticEffect>> {
        if let Some(effect) = self.custom.get(name) {
            return Some(effect.clone());
        }
        BuiltinEffect::from_name(name).and_then(|effect| self.builtin.get(&effect).cloned())
    }

    pub fn resolve(&self, name: &str, master_intensity: u8) -> Result<EffectFrames, EffectError> {
        let effect = self
            .lookup(name)
            .ok_or_else(|| EffectError::UnknownEffect(name.to_string()))?;
        Ok(EffectFrames {
            effect,
            master: master_intensity.min(100),
            next: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn static_effect(name: &str, motors: Vec<i32>, intensity: i32) -> NamedEffect {
        NamedEffect {
            name: name.to_string(),
            effect: HapticEffect::Static {
                motors,
                intensity,
                duration_ms: 100,
            },
        }
    }

    #[test]
    fn static_effect_scales_by_master_intensity() {
        let library = EffectLibrary::new(&[static_effect("pulse", vec![1, 2], 80)]);
        let frames: Vec<ResolvedFrame> = library.resolve("pulse", 50).unwrap().collect();

        assert_eq!(frames.len(), 1);
        let mut expected = [0u8; MOTOR_COUNT];
        expected[1] = 40;
        expected[2] = 40;
        assert_eq!(frames[0].motors, expected);
        assert_eq!(frames[0].duration_ms, 100);
    }

    #[test]
    fn out_of_range_motors_are_dropped() {
        let values = motor_values(&[-1, 0, 39, 40, 400], 150);
        assert_eq!(values[0], 100);
        assert_eq!(values[39], 100);
        assert_eq!(values.iter().filter(|v| **v > 0).count(), 2);
    }

    #[test]
    fn sequence_forwards_per_frame_delays() {
        let library = EffectLibrary::new(&[NamedEffect {
            name: "wave".to_string(),
            effect: HapticEffect::Sequence {
                frames: vec![
                    EffectFrame {
                        motors: vec![0],
                        intensity: 100,
                        duration_ms: 50,
                        delay_ms: 30,
                    },
                    EffectFrame {
                        motors: vec![20],
                        intensity: 60,
                        duration_ms: 70,
                        delay_ms: 0,
                    },
                ],
            },
        }]);

        let frames: Vec<ResolvedFrame> = library.resolve("wave", 100).unwrap().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].delay_ms, 30);
        assert_eq!(frames[1].motors[20], 60);
        assert_eq!(frames[1].duration_ms, 70);
    }

    #[test]
    fn custom_effects_override_builtins() {
        let library = EffectLibrary::new(&[static_effect("front_rear_center", vec![5], 10)]);
        let frames: Vec<ResolvedFrame> = library.resolve("front_rear_center", 100).unwrap().collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].motors[5], 10);
    }

    #[test]
    fn unknown_effect_is_reported() {
        let library = EffectLibrary::new(&[]);
        match library.resolve("nope", 100) {
            Err(EffectError::UnknownEffect(name)) => assert_eq!(name, "nope"),
            other => panic!("expected UnknownEffect, got {:?}", other),
        }
    }

    #[test]
    fn resolution_is_single_pass() {
        let library = EffectLibrary::new(&[]);
        let mut frames = library.resolve("front_inner_right_chest", 100).unwrap();
        assert!(frames.next().is_some());
        assert!(frames.next().is_none());
        assert!(frames.next().is_none());
    }

    #[test]
    fn effect_document_round_trips_through_toml() {
        #[derive(Deserialize, Serialize, Debug, PartialEq)]
        struct Doc {
            custom_effects: Vec<NamedEffect>,
        }
        let doc = Doc {
            custom_effects: vec![
                static_effect("pulse", vec![1, 2], 80),
                NamedEffect {
                    name: "sweep".to_string(),
                    effect: HapticEffect::Sequence {
                        frames: vec![EffectFrame {
                            motors: vec![3, 4],
                            intensity: 55,
                            duration_ms: 40,
                            delay_ms: 10,
                        }],
                    },
                },
            ],
        };
        let text = toml::to_string(&doc).unwrap();
        let parsed: Doc = toml::from_str(&text).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn accepts_legacy_json_effect_keys() {
        let json = r#"{"name": "hit", "type": "sequence", "frames": [
            {"motors": [0, 1], "intensity": 90, "duration": 60, "delay": 15}
        ]}"#;
        let named: NamedEffect = serde_json::from_str(json).unwrap();
        assert_eq!(named.name, "hit");
        match named.effect {
            HapticEffect::Sequence { frames } => {
                assert_eq!(frames[0].duration_ms, 60);
                assert_eq!(frames[0].delay_ms, 15);
            }
            other => panic!("expected a sequence, got {:?}", other),
        }
    }

    proptest! {
        #[test]
        fn resolved_intensities_stay_in_range(
            intensity in -50i32..200,
            master in 0u8..=100,
            motors in proptest::collection::vec(-10i32..60, 0..12),
            frames in 1usize..6,
        ) {
            let effect = HapticEffect::Sequence {
                frames: (0..frames)
                    .map(|_| EffectFrame {
                        motors: motors.clone(),
                        intensity,
                        duration_ms: 20,
                        delay_ms: 5,
                    })
                    .collect(),
            };
            let library = EffectLibrary::new(&[NamedEffect { name: "fx".to_string(), effect: effect.clone() }]);
            let resolved: Vec<ResolvedFrame> = library.resolve("fx", master).unwrap().collect();

            prop_assert_eq!(resolved.len(), effect.frame_count());
            for frame in resolved {
                prop_assert!(frame.motors.iter().all(|value| *value <= 100));
            }
        }
    }
}
