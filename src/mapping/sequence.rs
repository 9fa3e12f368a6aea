use crate::output::composer::OutputComposer;
use crate::output::gamepad::{GamepadSink, VirtualButton};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseState {
    Idle,
    Press1,
    Wait1,
    Press2,
    WaitRestart,
}

/// Two-button press/release macro
#[derive(Debug, Clone)]
pub struct PulseSequence {
    pub owner: usize,
    btn1: VirtualButton,
    btn2: VirtualButton,
    on: Duration,
    off: Duration,
    repeats_left: u32,
    state: PulseState,
    next_tick: Instant,
}

impl PulseSequence {
    pub fn new(
        owner: usize,
        btn1: VirtualButton,
        btn2: VirtualButton,
        on: Duration,
        off: Duration,
        repeats: u32,
        now: Instant,
    ) -> Self {
        Self {
            owner,
            btn1,
            btn2,
            on,
            off,
            repeats_left: repeats.max(1),
            state: PulseState::Idle,
            next_tick: now,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> PulseState {
        self.state
    }

    /// Runs at most one transition. Returns `false` once the sequence is done.
    pub fn advance(
        &mut self,
        now: Instant,
        composer: &mut OutputComposer,
        pad: &mut dyn GamepadSink,
    ) -> bool {
        if now < self.next_tick {
            return true;
        }

        match self.state {
            PulseState::Idle => {
                composer.press(pad, self.btn1);
                self.state = PulseState::Press1;
                self.next_tick = now + self.on;
            }
            PulseState::Press1 => {
                composer.release(pad, self.btn1);
                self.state = PulseState::Wait1;
                self.next_tick = now + self.off;
            }
            PulseState::Wait1 => {
                composer.press(pad, self.btn2);
                self.state = PulseState::Press2;
                self.next_tick = now + self.on;
            }
            PulseState::Press2 => {
                composer.release(pad, self.btn2);
                self.repeats_left -= 1;
                if self.repeats_left == 0 {
                    debug!("Pulse sequence of binding {} finished", self.owner);
                    return false;
                }
                self.state = PulseState::WaitRestart;
                self.next_tick = now + self.off;
            }
            // No output; the press follows on the next due tick.
            PulseState::WaitRestart => {
                self.state = PulseState::Idle;
            }
        }
        true
    }
}
