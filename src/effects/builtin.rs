//! Effects that ship with the bridge.
//!
//! All of them are defined at full intensity so the master intensity of the
//! caller passes straight through.

use super::{EffectFrame, HapticEffect};

const DEFAULT_DURATION_MS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinEffect {
    FrontRearCenter,
    FrontOuterRightChest,
    FrontRearLowerEdges,
    FrontInnerRightChest,
}

impl BuiltinEffect {
    pub const ALL: [BuiltinEffect; 4] = [
        BuiltinEffect::FrontRearCenter,
        BuiltinEffect::FrontOuterRightChest,
        BuiltinEffect::FrontRearLowerEdges,
        BuiltinEffect::FrontInnerRightChest,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "front_rear_center" => Some(BuiltinEffect::FrontRearCenter),
            // Older configs carry the misspelled name.
            "front_outer_right_chest" | "front_outter_right_chest" => {
                Some(BuiltinEffect::FrontOuterRightChest)
            }
            "front_rear_lower_edges" => Some(BuiltinEffect::FrontRearLowerEdges),
            "front_inner_right_chest" => Some(BuiltinEffect::FrontInnerRightChest),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            BuiltinEffect::FrontRearCenter => "front_rear_center",
            BuiltinEffect::FrontOuterRightChest => "front_outer_right_chest",
            BuiltinEffect::FrontRearLowerEdges => "front_rear_lower_edges",
            BuiltinEffect::FrontInnerRightChest => "front_inner_right_chest",
        }
    }

    pub fn definition(&self) -> HapticEffect {
        match self {
            BuiltinEffect::FrontRearCenter => HapticEffect::Sequence {
                frames: [18, 17, 14, 13, 10, 9, 6, 5, 2, 1]
                    .into_iter()
                    .map(|motor| EffectFrame {
                        motors: vec![motor],
                        intensity: 100,
                        duration_ms: 80,
                        delay_ms: 20,
                    })
                    .collect(),
            },
            BuiltinEffect::FrontOuterRightChest => static_full(vec![2, 3]),
            BuiltinEffect::FrontRearLowerEdges => static_full(vec![19, 18, 16, 15, 12]),
            BuiltinEffect::FrontInnerRightChest => static_full(vec![6, 7, 10, 11]),
        }
    }
}

fn static_full(motors: Vec<i32>) -> HapticEffect {
    HapticEffect::Static {
        motors,
        intensity: 100,
        duration_ms: DEFAULT_DURATION_MS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_resolve_back_to_the_same_effect() {
        for effect in BuiltinEffect::ALL {
            assert_eq!(BuiltinEffect::from_name(effect.name()), Some(effect));
        }
        assert_eq!(
            BuiltinEffect::from_name("front_outter_right_chest"),
            Some(BuiltinEffect::FrontOuterRightChest)
        );
    }

    #[test]
    fn center_sweep_has_ten_frames() {
        let definition = BuiltinEffect::FrontRearCenter.definition();
        assert_eq!(definition.frame_count(), 10);
    }
}
