//! Merges the continuous outputs of one tick into a single pad frame.
//!
//! Base levels come from the dispatcher's axis table; every live rumble adds
//! `intensity * sin(2π * speed * elapsed)` to its axis. Sticks are scaled to i16,
//! triggers to u8 via `(v + 1) / 2`. The pad is flushed exactly once per tick.

use crate::mapping::InstanceKey;
use crate::output::gamepad::{AxisTarget, GamepadError, GamepadSink, Side, VirtualButton};
use std::collections::{BTreeSet, HashMap};
use std::f32::consts::TAU;
use std::time::Instant;
use tracing::{debug, info};

/// Synthetic oscillation on one output axis
#[derive(Debug, Clone)]
pub struct RumbleInstance {
    pub key: InstanceKey,
    pub target: AxisTarget,
    pub intensity: f32,
    pub speed: f32,
    pub started: Instant,
    /// `None` runs until the input is released
    pub ends: Option<Instant>,
}

impl RumbleInstance {
    pub fn offset(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f32();
        self.intensity * (TAU * self.speed * elapsed).sin()
    }

    pub fn expired(&self, now: Instant) -> bool {
        self.ends.is_some_and(|end| now > end)
    }
}

pub fn stick_value(level: f32) -> i16 {
    (level.clamp(-1.0, 1.0) * 32767.0) as i16
}

pub fn trigger_value(level: f32) -> u8 {
    let unit = (level.clamp(-1.0, 1.0) + 1.0) / 2.0;
    (unit * 255.0).round().clamp(0.0, 255.0) as u8
}

#[derive(Debug, Default)]
pub struct OutputComposer {
    held_buttons: BTreeSet<VirtualButton>,
}

impl OutputComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, pad: &mut dyn GamepadSink, button: VirtualButton) {
        debug!("Virtual press {}", button);
        self.held_buttons.insert(button);
        pad.press(button);
    }

    pub fn release(&mut self, pad: &mut dyn GamepadSink, button: VirtualButton) {
        debug!("Virtual release {}", button);
        self.held_buttons.remove(&button);
        pad.release(button);
    }

    pub fn is_held(&self, button: VirtualButton) -> bool {
        self.held_buttons.contains(&button)
    }

    /// Final per-axis levels for this tick, rumble offsets included
    pub fn levels(
        &self,
        now: Instant,
        axis_levels: &HashMap<AxisTarget, f32>,
        rumbles: &[RumbleInstance],
    ) -> HashMap<AxisTarget, f32> {
        let mut levels: HashMap<AxisTarget, f32> = AxisTarget::ALL
            .iter()
            .map(|axis| {
                (
                    *axis,
                    axis_levels.get(axis).copied().unwrap_or(axis.rest_level()),
                )
            })
            .collect();

        for rumble in rumbles {
            if let Some(level) = levels.get_mut(&rumble.target) {
                *level += rumble.offset(now);
            }
        }
        levels
    }

    /// Drops expired rumbles, then stages and flushes the frame.
    pub fn compose(
        &mut self,
        pad: &mut dyn GamepadSink,
        now: Instant,
        axis_levels: &HashMap<AxisTarget, f32>,
        rumbles: &mut Vec<RumbleInstance>,
    ) -> Result<(), GamepadError> {
        rumbles.retain(|rumble| !rumble.expired(now));
        let levels = self.levels(now, axis_levels, rumbles);
        let level = |axis: AxisTarget| levels.get(&axis).copied().unwrap_or(axis.rest_level());

        // Input Y grows downward, the pad's Y grows upward.
        pad.set_stick(
            Side::Left,
            stick_value(level(AxisTarget::LeftStickX)),
            stick_value(-level(AxisTarget::LeftStickY)),
        );
        pad.set_stick(
            Side::Right,
            stick_value(level(AxisTarget::RightStickX)),
            stick_value(-level(AxisTarget::RightStickY)),
        );
        pad.set_trigger(Side::Left, trigger_value(level(AxisTarget::LeftTrigger)));
        pad.set_trigger(Side::Right, trigger_value(level(AxisTarget::RightTrigger)));
        pad.flush()
    }

    /// Releases everything and centres every axis.
    pub fn neutral(&mut self, pad: &mut dyn GamepadSink) -> Result<(), GamepadError> {
        let held: Vec<VirtualButton> = self.held_buttons.iter().copied().collect();
        if !held.is_empty() {
            info!("Releasing {} held virtual buttons", held.len());
        }
        for button in held {
            self.release(pad, button);
        }
        pad.set_stick(Side::Left, 0, 0);
        pad.set_stick(Side::Right, 0, 0);
        pad.set_trigger(Side::Left, 0);
        pad.set_trigger(Side::Right, 0);
        pad.flush()
    }
}
