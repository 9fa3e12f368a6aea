//! Input subsystem
//!
//! Turns raw device state into per-tick transitions and axis snapshots:
//!
//! 1. [`event_collector`] - gilrs backed game controller source
//! 2. [`keyboard`] - key/mouse state polling with edge synthesis
//! 3. [`sampler`] - merges both into one [`sampler::InputSampler`] per engine
//!
//! # Architecture
//!
//! ```text
//! gilrs ──► GilrsSource ──┐
//!                          ├──► InputSampler ──► Vec<Transition> + axis levels
//! GetAsyncKeyState ──► KeyEdgeDetector ──┘
//! ```

pub mod event_collector;
pub mod keyboard;
pub mod sampler;

pub use event_collector::GilrsSource;
pub use keyboard::{KeyEdgeDetector, KeyStateSource, NullKeyState};
pub use sampler::{InputSampler, InputState, Transition};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Button,
    Axis,
    Key,
    Mouse,
}

/// Identity of one physical input. Keys and mouse buttons always live on device 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InputSignature {
    pub device_index: u32,
    pub kind: InputKind,
    pub code: u32,
}

impl InputSignature {
    pub fn new(device_index: u32, kind: InputKind, code: u32) -> Self {
        Self {
            device_index,
            kind,
            code,
        }
    }

    /// Inputs that come from the absolute key state query instead of a device queue
    pub fn is_polled(&self) -> bool {
        matches!(self.kind, InputKind::Key | InputKind::Mouse)
    }
}

impl fmt::Display for InputSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}@dev{}", self.kind, self.code, self.device_index)
    }
}

/// What a device source reports between two polls
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Connected { device: u32 },
    Disconnected { device: u32 },
    Button { device: u32, code: u32, pressed: bool },
    Axis { device: u32, code: u32, value: f32 },
}

#[derive(Debug, thiserror::Error)]
pub enum SamplerError {
    #[error("Failed to initialize input source: {0}")]
    InitializationError(String),

    #[error("Input device {0} is unavailable")]
    InputDeviceUnavailable(u32),
}

/// Edge-triggered game controller backend
pub trait InputSource: Send {
    /// Drains everything that happened since the last call, in order.
    fn poll_events(&mut self) -> Vec<DeviceEvent>;

    fn connected_devices(&self) -> Vec<u32>;
}
