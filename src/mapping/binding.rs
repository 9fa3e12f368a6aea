use crate::chair::ChairCommand;
use crate::controller::{InputKind, InputSignature};
use crate::effects::EffectLibrary;
use crate::mapping::document::BindingDocument;
use crate::output::gamepad::{AxisTarget, VirtualButton};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shaping of a raw axis level: deadzone, then clamp, then invert
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct AxisTuning {
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,
    #[serde(default = "default_clamp")]
    pub clamp: f32,
    #[serde(default)]
    pub invert: bool,
}

fn default_deadzone() -> f32 {
    0.05
}

fn default_clamp() -> f32 {
    1.0
}

impl Default for AxisTuning {
    fn default() -> Self {
        Self {
            deadzone: default_deadzone(),
            clamp: default_clamp(),
            invert: false,
        }
    }
}

impl AxisTuning {
    pub fn apply(&self, value: f32) -> f32 {
        let clamp = self.clamp.abs();
        let mut tuned = if value.abs() < self.deadzone { 0.0 } else { value };
        tuned = tuned.clamp(-clamp, clamp);
        if self.invert {
            tuned = -tuned;
        }
        tuned
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AxisDirection {
    Positive,
    Negative,
    #[default]
    Both,
}

/// Below this fraction an axis driven effect is not played at all
pub const HAPTIC_FLOOR: f32 = 0.05;

/// Input ceiling for haptic axes. Worn sticks report past the edge and wrap.
const HAPTIC_INPUT_CEILING: f32 = 0.9;

/// How an axis level turns into a haptic intensity
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct AxisResponse {
    #[serde(default = "haptic_tuning")]
    pub tuning: AxisTuning,
    #[serde(default)]
    pub direction: AxisDirection,
    /// Percent of travel that already counts as full intensity
    #[serde(default = "full_percent")]
    pub saturation: u8,
    #[serde(default = "full_percent")]
    pub max_intensity: u8,
}

fn haptic_tuning() -> AxisTuning {
    AxisTuning {
        deadzone: 0.0,
        clamp: HAPTIC_INPUT_CEILING,
        invert: false,
    }
}

fn full_percent() -> u8 {
    100
}

impl Default for AxisResponse {
    fn default() -> Self {
        Self {
            tuning: haptic_tuning(),
            direction: AxisDirection::Both,
            saturation: full_percent(),
            max_intensity: full_percent(),
        }
    }
}

impl AxisResponse {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }

    /// Fraction in `[0, 1]` to scale the effect by, `None` below the floor
    pub fn intensity(&self, level: f32) -> Option<f32> {
        let value = self.tuning.apply(level);
        let directed = match self.direction {
            AxisDirection::Positive => value.max(0.0),
            AxisDirection::Negative => (-value).max(0.0),
            AxisDirection::Both => value.abs(),
        };
        let saturation = (self.saturation as f32 / 100.0).max(0.01);
        let saturated = (directed / saturation).min(1.0);
        let fraction = saturated * (self.max_intensity.min(100) as f32 / 100.0);
        (fraction >= HAPTIC_FLOOR).then_some(fraction)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    PlayHapticEffect {
        effect_name: String,
        base_intensity: u8,
        response: AxisResponse,
    },
    VirtualButton {
        button: VirtualButton,
    },
    VirtualAxis {
        target: AxisTarget,
        tuning: AxisTuning,
    },
    ChairCommand {
        command: ChairCommand,
    },
    ButtonPulseSequence {
        btn1: VirtualButton,
        btn2: VirtualButton,
        on: Duration,
        off: Duration,
        repeats: u32,
    },
    Rumble {
        target: AxisTarget,
        intensity: f32,
        speed: f32,
        /// `None` runs until the input is released
        duration: Option<Duration>,
    },
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::PlayHapticEffect { .. } => "haptic",
            Action::VirtualButton { .. } => "button",
            Action::VirtualAxis { .. } => "axis",
            Action::ChairCommand { .. } => "chair",
            Action::ButtonPulseSequence { .. } => "sequence",
            Action::Rumble { .. } => "rumble",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Interaction {
    pub disable_others: BTreeSet<String>,
    pub enable_others: BTreeSet<String>,
}

impl Interaction {
    pub fn is_empty(&self) -> bool {
        self.disable_others.is_empty() && self.enable_others.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timing {
    pub start_delay: Duration,
    pub hold_time: Duration,
    /// `Some` puts the binding in turbo mode
    pub turbo_rate: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub name: String,
    pub input: InputSignature,
    pub action: Action,
    pub interaction: Interaction,
    pub timing: Timing,
    pub start_disabled: bool,
}

impl Binding {
    pub fn is_axis(&self) -> bool {
        self.input.kind == InputKind::Axis
    }
}

/// Validated bindings with lookup indexes. Immutable for the lifetime of a run.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    bindings: Vec<Binding>,
    by_input: HashMap<InputSignature, Vec<usize>>,
    axis_bindings: Vec<usize>,
}

impl BindingTable {
    /// Builds the table from already validated bindings.
    ///
    /// Per input, bindings are ordered by start delay, then by position.
    pub fn new(bindings: Vec<Binding>) -> Self {
        let mut by_input: HashMap<InputSignature, Vec<usize>> = HashMap::new();
        let mut axis_bindings = Vec::new();

        for (idx, binding) in bindings.iter().enumerate() {
            if binding.is_axis() {
                axis_bindings.push(idx);
            } else {
                by_input.entry(binding.input).or_default().push(idx);
            }
        }
        for indices in by_input.values_mut() {
            // sort_by_key is stable, so position breaks ties
            indices.sort_by_key(|idx| bindings[*idx].timing.start_delay);
        }

        Self {
            bindings,
            by_input,
            axis_bindings,
        }
    }

    /// Validates documents and keeps the ones that make sense.
    pub fn from_documents(documents: &[BindingDocument], library: &EffectLibrary) -> Self {
        let mut seen = HashSet::new();
        let mut bindings = Vec::with_capacity(documents.len());

        for document in documents {
            match document.to_binding() {
                Ok(binding) => {
                    if !seen.insert(binding.name.clone()) {
                        warn!("Skipping binding '{}': name already in use", binding.name);
                        continue;
                    }
                    if let Action::PlayHapticEffect { effect_name, .. } = &binding.action {
                        if !library.contains(effect_name) {
                            warn!(
                                "Binding '{}' plays unknown effect '{}'",
                                binding.name, effect_name
                            );
                        }
                    }
                    debug!(
                        "Loaded binding '{}': {} -> {}",
                        binding.name,
                        binding.input,
                        binding.action.kind()
                    );
                    bindings.push(binding);
                }
                Err(e) => warn!("Skipping binding: {}", e),
            }
        }

        let names: HashSet<&str> = bindings.iter().map(|b| b.name.as_str()).collect();
        for binding in &bindings {
            let referenced = binding
                .interaction
                .disable_others
                .iter()
                .chain(binding.interaction.enable_others.iter());
            for other in referenced {
                if !names.contains(other.as_str()) {
                    warn!(
                        "Binding '{}' interacts with unknown binding '{}'",
                        binding.name, other
                    );
                }
            }
        }

        info!(
            "Binding table ready: {} of {} bindings loaded",
            bindings.len(),
            documents.len()
        );
        Self::new(bindings)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Binding> {
        self.bindings.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    /// Bindings listening to a discrete input, in dispatch order
    pub fn matching(&self, input: &InputSignature) -> &[usize] {
        self.by_input.get(input).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn axis_bindings(&self) -> &[usize] {
        &self.axis_bindings
    }

    /// Key and mouse inputs the sampler has to poll
    pub fn polled_inputs(&self) -> BTreeSet<InputSignature> {
        self.bindings
            .iter()
            .map(|binding| binding.input)
            .filter(InputSignature::is_polled)
            .collect()
    }
}
