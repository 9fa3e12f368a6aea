use crate::controller::InputSignature;
use crate::effects::EffectPlayback;
use crate::mapping::binding::{BindingTable, Interaction};
use crate::mapping::sequence::PulseSequence;
use crate::output::composer::RumbleInstance;
use crate::output::gamepad::{AxisTarget, VirtualButton};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// One binding as triggered by one physical input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceKey {
    pub binding: usize,
    pub input: InputSignature,
}

#[derive(Debug, Clone)]
pub struct TurboTimer {
    pub next_fire: Instant,
    pub rate: Duration,
    /// Button turbos alternate press and release
    pub toggled_on: bool,
}

#[derive(Debug, Clone)]
pub struct HoldGate {
    pub fire_at: Instant,
    pub next_check: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingKind {
    Fire,
    /// Second half of a delayed tap
    Release(VirtualButton),
}

#[derive(Debug, Clone)]
pub struct PendingAction {
    pub fire_at: Instant,
    pub key: InstanceKey,
    pub kind: PendingKind,
}

/// Everything the dispatcher mutates during a run.
///
/// Timers are plain data with due instants; the tick loop advances them.
#[derive(Debug, Default)]
pub struct EngineState {
    pub disabled_binds: BTreeSet<String>,
    pub turbos: BTreeMap<InstanceKey, TurboTimer>,
    pub hold_gates: BTreeMap<InstanceKey, HoldGate>,
    pub sequences: Vec<PulseSequence>,
    pub rumbles: Vec<RumbleInstance>,
    /// Sorted by `fire_at`, insertion order among equals
    pub pending: Vec<PendingAction>,
    pub playbacks: Vec<EffectPlayback>,
    pub axis_levels: HashMap<AxisTarget, f32>,
}

impl EngineState {
    pub fn new(table: &BindingTable) -> Self {
        let disabled_binds: BTreeSet<String> = table
            .iter()
            .filter(|binding| binding.start_disabled)
            .map(|binding| binding.name.clone())
            .collect();
        if !disabled_binds.is_empty() {
            info!("Disabled on start: {:?}", disabled_binds);
        }
        Self {
            disabled_binds,
            ..Self::default()
        }
    }

    pub fn is_disabled(&self, name: &str) -> bool {
        self.disabled_binds.contains(name)
    }

    /// Disables first, then enables, so a name in both lists ends up enabled.
    pub fn apply_interaction(&mut self, source: &str, interaction: &Interaction) {
        if interaction.is_empty() {
            return;
        }
        for name in &interaction.disable_others {
            self.disabled_binds.insert(name.clone());
        }
        for name in &interaction.enable_others {
            self.disabled_binds.remove(name);
        }
        info!(
            "[{}] triggered, disabled binds: {:?}",
            source, self.disabled_binds
        );
    }

    pub fn schedule(&mut self, action: PendingAction) {
        let at = self
            .pending
            .partition_point(|pending| pending.fire_at <= action.fire_at);
        debug!("Scheduled {:?} for binding {}", action.kind, action.key.binding);
        self.pending.insert(at, action);
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<PendingAction> {
        let due = self.pending.partition_point(|pending| pending.fire_at <= now);
        self.pending.drain(..due).collect()
    }

    pub fn has_playback_for(&self, binding: usize) -> bool {
        self.playbacks
            .iter()
            .any(|playback| playback.owner == Some(binding))
    }

    /// Number of timers, sequences and effects still in flight
    pub fn active_count(&self) -> usize {
        self.turbos.len()
            + self.hold_gates.len()
            + self.sequences.len()
            + self.rumbles.len()
            + self.pending.len()
            + self.playbacks.len()
    }

    /// Drops every timer. Enable state and axis levels are reset too.
    pub fn clear(&mut self) {
        debug!("Clearing {} active engine entries", self.active_count());
        self.turbos.clear();
        self.hold_gates.clear();
        self.sequences.clear();
        self.rumbles.clear();
        self.pending.clear();
        self.playbacks.clear();
        self.axis_levels.clear();
        self.disabled_binds.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::InputKind;

    fn key(binding: usize) -> InstanceKey {
        InstanceKey {
            binding,
            input: InputSignature::new(0, InputKind::Button, binding as u32),
        }
    }

    #[test]
    fn pending_actions_stay_ordered() {
        let mut state = EngineState::default();
        let now = Instant::now();
        for (binding, delay) in [(0, 300), (1, 100), (2, 300), (3, 200)] {
            state.schedule(PendingAction {
                fire_at: now + Duration::from_millis(delay),
                key: key(binding),
                kind: PendingKind::Fire,
            });
        }

        let due = state.take_due(now + Duration::from_millis(250));
        let order: Vec<usize> = due.iter().map(|p| p.key.binding).collect();
        assert_eq!(order, vec![1, 3]);

        let rest: Vec<usize> = state
            .take_due(now + Duration::from_secs(1))
            .iter()
            .map(|p| p.key.binding)
            .collect();
        assert_eq!(rest, vec![0, 2]);
        assert!(state.pending.is_empty());
    }

    #[test]
    fn enable_wins_over_disable() {
        let mut state = EngineState::default();
        state.disabled_binds.insert("b".to_string());
        let interaction = Interaction {
            disable_others: ["a".to_string(), "c".to_string()].into_iter().collect(),
            enable_others: ["b".to_string(), "c".to_string()].into_iter().collect(),
        };
        state.apply_interaction("x", &interaction);
        assert!(state.is_disabled("a"));
        assert!(!state.is_disabled("b"));
        assert!(!state.is_disabled("c"));
    }
}
