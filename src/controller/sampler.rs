use crate::controller::event_collector::{LEFT_TRIGGER_AXIS, RIGHT_TRIGGER_AXIS};
use crate::controller::keyboard::{KeyEdgeDetector, KeyStateSource};
use crate::controller::{DeviceEvent, InputKind, InputSignature, InputSource, SamplerError};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// One discrete press or release seen during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub input: InputSignature,
    pub pressed: bool,
}

/// Read-only view of the sampled input state
pub trait InputState {
    /// Whether the input is physically down right now
    fn is_pressed(&self, input: &InputSignature) -> bool;

    /// Last level of an axis in `[-1, 1]`, `None` if the device is gone
    fn axis_level(&self, device: u32, axis: u32) -> Option<f32>;
}

pub struct InputSampler {
    source: Box<dyn InputSource>,
    keys: Box<dyn KeyStateSource>,
    edges: KeyEdgeDetector,
    held: BTreeSet<InputSignature>,
    axes: HashMap<(u32, u32), f32>,
    devices: BTreeSet<u32>,
}

impl InputSampler {
    pub fn new(
        source: Box<dyn InputSource>,
        keys: Box<dyn KeyStateSource>,
        watched_keys: impl IntoIterator<Item = InputSignature>,
    ) -> Self {
        let devices: BTreeSet<u32> = source.connected_devices().into_iter().collect();
        let edges = KeyEdgeDetector::new(watched_keys);
        info!(
            "Input sampler ready: {} devices, {} watched keys",
            devices.len(),
            edges.watched()
        );
        Self {
            source,
            keys,
            edges,
            held: BTreeSet::new(),
            axes: HashMap::new(),
            devices,
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self, device: u32) -> bool {
        self.devices.contains(&device)
    }

    /// Reads everything that changed since the last tick.
    ///
    /// Controller transitions keep their queue order and come before the
    /// synthesized key edges. Duplicate presses from the backend are dropped.
    pub fn sample(&mut self) -> Vec<Transition> {
        let mut transitions = Vec::new();

        for event in self.source.poll_events() {
            match event {
                DeviceEvent::Button {
                    device,
                    code,
                    pressed,
                } => {
                    let input = InputSignature::new(device, InputKind::Button, code);
                    let changed = if pressed {
                        self.held.insert(input)
                    } else {
                        self.held.remove(&input)
                    };
                    if changed {
                        transitions.push(Transition { input, pressed });
                    }
                }
                DeviceEvent::Axis {
                    device,
                    code,
                    value,
                } => {
                    self.axes.insert((device, code), value.clamp(-1.0, 1.0));
                }
                DeviceEvent::Connected { device } => {
                    if self.devices.insert(device) {
                        info!("Input device {} available", device);
                    }
                }
                DeviceEvent::Disconnected { device } => {
                    transitions.extend(self.drop_device(device));
                }
            }
        }

        transitions.extend(self.edges.poll(self.keys.as_mut()));
        transitions
    }

    /// Releases whatever the vanished device still held.
    fn drop_device(&mut self, device: u32) -> Vec<Transition> {
        self.devices.remove(&device);
        self.axes.retain(|(axis_device, _), _| *axis_device != device);

        let stuck: Vec<InputSignature> = self
            .held
            .iter()
            .filter(|input| input.device_index == device)
            .copied()
            .collect();
        warn!(
            "{}, releasing {} held inputs",
            SamplerError::InputDeviceUnavailable(device),
            stuck.len()
        );
        stuck
            .into_iter()
            .map(|input| {
                self.held.remove(&input);
                debug!("Synthesized release for {}", input);
                Transition {
                    input,
                    pressed: false,
                }
            })
            .collect()
    }
}

impl InputState for InputSampler {
    fn is_pressed(&self, input: &InputSignature) -> bool {
        if input.is_polled() {
            self.edges.is_down(input)
        } else {
            self.held.contains(input)
        }
    }

    fn axis_level(&self, device: u32, axis: u32) -> Option<f32> {
        if !self.devices.contains(&device) {
            return None;
        }
        // Untouched triggers sit at -1
        let rest = if axis == LEFT_TRIGGER_AXIS || axis == RIGHT_TRIGGER_AXIS {
            -1.0
        } else {
            0.0
        };
        Some(self.axes.get(&(device, axis)).copied().unwrap_or(rest))
    }
}
