//! Per-tick action dispatch
//!
//! One call to [`Dispatcher::tick`] runs, in this order:
//!
//! ```text
//! transitions ─► pending ─► hold gates ─► turbos ─► axis bindings ─► sequences ─► effects ─► compose
//! ```
//!
//! Nothing here sleeps or awaits. Hold gates, turbos and delayed actions are
//! due instants in [`EngineState`], so a whole tick runs without interleaving.

use crate::chair::{ChairSink, ConnectionState};
use crate::controller::sampler::{InputState, Transition};
use crate::effects::{EffectLibrary, EffectPlayback};
use crate::mapping::binding::{Action, Binding, BindingTable};
use crate::mapping::sequence::PulseSequence;
use crate::mapping::state::{EngineState, HoldGate, InstanceKey, PendingAction, PendingKind, TurboTimer};
use crate::output::composer::{OutputComposer, RumbleInstance};
use crate::output::gamepad::GamepadSink;
use crate::output::haptic::HapticSink;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// The three device sinks the engine drives
pub struct Outputs {
    pub pad: Box<dyn GamepadSink>,
    pub haptics: Box<dyn HapticSink>,
    pub chair: Box<dyn ChairSink>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub transitions: u64,
    pub fired: u64,
}

pub struct Dispatcher {
    table: Arc<BindingTable>,
    library: EffectLibrary,
    state: EngineState,
    composer: OutputComposer,
    outputs: Outputs,
    hold_poll: Duration,
    haptic_position: u32,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(
        table: BindingTable,
        library: EffectLibrary,
        outputs: Outputs,
        hold_poll: Duration,
        haptic_position: u32,
    ) -> Self {
        let state = EngineState::new(&table);
        Self {
            table: Arc::new(table),
            library,
            state,
            composer: OutputComposer::new(),
            outputs,
            hold_poll,
            haptic_position,
            stats: DispatchStats::default(),
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn stats(&self) -> DispatchStats {
        self.stats
    }

    pub fn chair_state(&self) -> ConnectionState {
        self.outputs.chair.connection_state()
    }

    pub fn haptics(&mut self) -> &mut dyn HapticSink {
        self.outputs.haptics.as_mut()
    }

    pub fn tick(&mut self, now: Instant, transitions: &[Transition], input: &dyn InputState) {
        for transition in transitions {
            self.stats.transitions += 1;
            self.handle_transition(now, transition, input);
        }
        self.run_pending(now, input);
        self.run_hold_gates(now, input);
        self.run_turbos(now, input);
        self.run_axis_bindings(now, input);
        self.run_sequences(now);
        self.run_playbacks(now);

        if let Err(e) = self.composer.compose(
            self.outputs.pad.as_mut(),
            now,
            &self.state.axis_levels,
            &mut self.state.rumbles,
        ) {
            error!("Failed to submit gamepad frame: {}", e);
        }
    }

    fn handle_transition(&mut self, now: Instant, transition: &Transition, input: &dyn InputState) {
        let table = Arc::clone(&self.table);
        for &idx in table.matching(&transition.input) {
            let Some(binding) = table.get(idx) else {
                continue;
            };
            let key = InstanceKey {
                binding: idx,
                input: transition.input,
            };
            if transition.pressed {
                self.on_press(now, key, binding, input);
            } else {
                self.on_release(key, binding);
            }
        }
    }

    fn on_press(&mut self, now: Instant, key: InstanceKey, binding: &Binding, input: &dyn InputState) {
        if self.state.is_disabled(&binding.name) {
            debug!("Binding '{}' is disabled, ignoring press", binding.name);
            return;
        }

        let timing = &binding.timing;
        if !timing.start_delay.is_zero() {
            self.state.schedule(PendingAction {
                fire_at: now + timing.start_delay,
                key,
                kind: PendingKind::Fire,
            });
        } else if !timing.hold_time.is_zero() {
            let fire_at = now + timing.hold_time;
            self.state.hold_gates.entry(key).or_insert_with(|| {
                debug!("Hold gate for '{}' started", binding.name);
                HoldGate {
                    fire_at,
                    next_check: (now + self.hold_poll).min(fire_at),
                }
            });
        } else if timing.turbo_rate.is_some() {
            self.start_turbo(now, key, binding);
        } else {
            self.fire(now, key, binding, input);
        }
    }

    /// Release cleanup. Runs for disabled bindings too.
    fn on_release(&mut self, key: InstanceKey, binding: &Binding) {
        if self.state.hold_gates.remove(&key).is_some() {
            debug!("Hold on '{}' released early, abandoned", binding.name);
        }
        if self.state.turbos.remove(&key).is_some() {
            debug!("Turbo on '{}' stopped", binding.name);
        }

        match &binding.action {
            Action::VirtualButton { button } => {
                if self.composer.is_held(*button) {
                    self.composer.release(self.outputs.pad.as_mut(), *button);
                }
            }
            Action::Rumble { duration: None, .. } => {
                self.state
                    .rumbles
                    .retain(|rumble| !(rumble.key == key && rumble.ends.is_none()));
            }
            _ => {}
        }
    }

    fn start_turbo(&mut self, now: Instant, key: InstanceKey, binding: &Binding) {
        let Some(rate) = binding.timing.turbo_rate else {
            return;
        };
        if self.state.turbos.contains_key(&key) {
            return;
        }
        debug!("Turbo on '{}' every {:?}", binding.name, rate);
        self.state.turbos.insert(
            key,
            TurboTimer {
                next_fire: now,
                rate,
                toggled_on: false,
            },
        );
    }

    /// Applies the interaction rules, then runs the action once.
    fn fire(&mut self, now: Instant, key: InstanceKey, binding: &Binding, input: &dyn InputState) {
        self.stats.fired += 1;
        self.state
            .apply_interaction(&binding.name, &binding.interaction);
        debug!("Firing '{}' ({})", binding.name, binding.action.kind());

        match &binding.action {
            Action::PlayHapticEffect {
                effect_name,
                base_intensity,
                ..
            } => self.play_effect(now, effect_name, *base_intensity, key.binding),
            Action::VirtualButton { button } => {
                self.composer.press(self.outputs.pad.as_mut(), *button);
                // A press that arrives after its input let go becomes a tap.
                if !input.is_pressed(&key.input) {
                    self.state.schedule(PendingAction {
                        fire_at: now,
                        key,
                        kind: PendingKind::Release(*button),
                    });
                }
            }
            Action::VirtualAxis { target, .. } => {
                warn!("Axis binding '{}' fired as a button for {}", binding.name, target);
            }
            Action::ChairCommand { command } => self.outputs.chair.submit(*command),
            Action::ButtonPulseSequence {
                btn1,
                btn2,
                on,
                off,
                repeats,
            } => self.state.sequences.push(PulseSequence::new(
                key.binding,
                *btn1,
                *btn2,
                *on,
                *off,
                *repeats,
                now,
            )),
            Action::Rumble {
                target,
                intensity,
                speed,
                duration,
            } => {
                self.state.rumbles.retain(|rumble| rumble.key != key);
                self.state.rumbles.push(RumbleInstance {
                    key,
                    target: *target,
                    intensity: *intensity,
                    speed: *speed,
                    started: now,
                    ends: duration.map(|d| now + d),
                });
            }
        }
    }

    fn play_effect(&mut self, now: Instant, name: &str, intensity: u8, owner: usize) {
        match self.library.resolve(name, intensity) {
            Ok(frames) => self
                .state
                .playbacks
                .push(EffectPlayback::new(name, frames, now, Some(owner))),
            Err(e) => warn!("{}", e),
        }
    }

    fn run_pending(&mut self, now: Instant, input: &dyn InputState) {
        let table = Arc::clone(&self.table);
        for pending in self.state.take_due(now) {
            let Some(binding) = table.get(pending.key.binding) else {
                continue;
            };
            match pending.kind {
                PendingKind::Release(button) => {
                    self.composer.release(self.outputs.pad.as_mut(), button);
                }
                PendingKind::Fire => {
                    if self.state.is_disabled(&binding.name) {
                        debug!("Delayed '{}' dropped, binding disabled", binding.name);
                        continue;
                    }
                    if binding.timing.turbo_rate.is_some() && input.is_pressed(&pending.key.input) {
                        self.start_turbo(now, pending.key, binding);
                    } else {
                        self.fire(now, pending.key, binding, input);
                    }
                }
            }
        }
    }

    fn run_hold_gates(&mut self, now: Instant, input: &dyn InputState) {
        let due: Vec<InstanceKey> = self
            .state
            .hold_gates
            .iter()
            .filter(|(_, gate)| gate.next_check <= now)
            .map(|(key, _)| *key)
            .collect();
        let table = Arc::clone(&self.table);

        for key in due {
            let Some(binding) = table.get(key.binding) else {
                self.state.hold_gates.remove(&key);
                continue;
            };
            if !input.is_pressed(&key.input) {
                self.state.hold_gates.remove(&key);
                debug!("Hold on '{}' lost, abandoned", binding.name);
                continue;
            }

            let fire_at = match self.state.hold_gates.get_mut(&key) {
                Some(gate) if now < gate.fire_at => {
                    gate.next_check = (now + self.hold_poll).min(gate.fire_at);
                    continue;
                }
                Some(gate) => gate.fire_at,
                None => continue,
            };
            self.state.hold_gates.remove(&key);
            debug!("Hold on '{}' complete ({:?} late)", binding.name, now - fire_at);

            if self.state.is_disabled(&binding.name) {
                debug!("Hold on '{}' completed while disabled", binding.name);
            } else if binding.timing.turbo_rate.is_some() {
                self.start_turbo(now, key, binding);
            } else {
                self.fire(now, key, binding, input);
            }
        }
    }

    fn run_turbos(&mut self, now: Instant, input: &dyn InputState) {
        let due: Vec<InstanceKey> = self
            .state
            .turbos
            .iter()
            .filter(|(_, timer)| timer.next_fire <= now)
            .map(|(key, _)| *key)
            .collect();
        let table = Arc::clone(&self.table);

        for key in due {
            let Some(binding) = table.get(key.binding) else {
                self.state.turbos.remove(&key);
                continue;
            };
            // Backstop for a release the sampler never reported
            if !input.is_pressed(&key.input) {
                self.state.turbos.remove(&key);
                self.on_release(key, binding);
                continue;
            }

            let disabled = self.state.is_disabled(&binding.name);
            let Some(timer) = self.state.turbos.get_mut(&key) else {
                continue;
            };
            timer.next_fire = now + timer.rate;

            match &binding.action {
                Action::VirtualButton { button } => {
                    let press = !timer.toggled_on && !disabled;
                    timer.toggled_on = press;
                    if press {
                        self.stats.fired += 1;
                        self.state
                            .apply_interaction(&binding.name, &binding.interaction);
                        self.composer.press(self.outputs.pad.as_mut(), *button);
                    } else if self.composer.is_held(*button) {
                        self.composer.release(self.outputs.pad.as_mut(), *button);
                    }
                }
                _ if disabled => debug!("Turbo on '{}' skipped, binding disabled", binding.name),
                _ => self.fire(now, key, binding, input),
            }
        }
    }

    fn run_axis_bindings(&mut self, now: Instant, input: &dyn InputState) {
        let table = Arc::clone(&self.table);
        for &idx in table.axis_bindings() {
            let Some(binding) = table.get(idx) else {
                continue;
            };
            if self.state.is_disabled(&binding.name) {
                continue;
            }
            let level = input.axis_level(binding.input.device_index, binding.input.code);

            match &binding.action {
                Action::VirtualAxis { target, tuning } => match level {
                    Some(level) => {
                        self.state.axis_levels.insert(*target, tuning.apply(level));
                    }
                    None => {
                        if self.state.axis_levels.remove(target).is_some() {
                            warn!(
                                "Device {} gone, '{}' returns {} to rest",
                                binding.input.device_index, binding.name, target
                            );
                        }
                    }
                },
                Action::PlayHapticEffect {
                    effect_name,
                    base_intensity,
                    response,
                } => {
                    let Some(fraction) = level.and_then(|level| response.intensity(level)) else {
                        continue;
                    };
                    if self.state.has_playback_for(idx) {
                        continue;
                    }
                    let intensity = (fraction * *base_intensity as f32).round() as u8;
                    self.play_effect(now, effect_name, intensity, idx);
                }
                _ => {}
            }
        }
    }

    fn run_sequences(&mut self, now: Instant) {
        let composer = &mut self.composer;
        let pad = self.outputs.pad.as_mut();
        self.state
            .sequences
            .retain_mut(|sequence| sequence.advance(now, composer, pad));
    }

    fn run_playbacks(&mut self, now: Instant) {
        let haptics = self.outputs.haptics.as_mut();
        let position = self.haptic_position;
        self.state
            .playbacks
            .retain_mut(|playback| !playback.advance(now, position, haptics));
    }

    /// Cancels every timer and leaves all outputs at rest. Returns the chair
    /// task if it is still closing its connection.
    pub fn shutdown(&mut self) -> Option<JoinHandle<()>> {
        self.state.clear();
        if let Err(e) = self.composer.neutral(self.outputs.pad.as_mut()) {
            error!("Failed to neutralise virtual gamepad: {}", e);
        }
        self.outputs.haptics.stop_all();
        self.outputs.chair.close()
    }
}
