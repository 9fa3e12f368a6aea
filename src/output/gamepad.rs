use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Buttons of the virtual XInput pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VirtualButton {
    A,
    B,
    X,
    Y,
    LeftShoulder,
    RightShoulder,
    Back,
    Start,
    Guide,
    LeftThumb,
    RightThumb,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

const BUTTON_NAMES: [(&str, VirtualButton); 15] = [
    ("A", VirtualButton::A),
    ("B", VirtualButton::B),
    ("X", VirtualButton::X),
    ("Y", VirtualButton::Y),
    ("LEFT_SHOULDER", VirtualButton::LeftShoulder),
    ("RIGHT_SHOULDER", VirtualButton::RightShoulder),
    ("BACK", VirtualButton::Back),
    ("START", VirtualButton::Start),
    ("GUIDE", VirtualButton::Guide),
    ("LEFT_THUMB", VirtualButton::LeftThumb),
    ("RIGHT_THUMB", VirtualButton::RightThumb),
    ("DPAD_UP", VirtualButton::DPadUp),
    ("DPAD_DOWN", VirtualButton::DPadDown),
    ("DPAD_LEFT", VirtualButton::DPadLeft),
    ("DPAD_RIGHT", VirtualButton::DPadRight),
];

impl VirtualButton {
    pub fn name(&self) -> &'static str {
        BUTTON_NAMES
            .iter()
            .find(|(_, button)| button == self)
            .map(|(name, _)| *name)
            .unwrap_or("UNKNOWN")
    }
}

impl fmt::Display for VirtualButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for VirtualButton {
    type Err = String;

    /// Accepts the plain name (`DPAD_UP`) and the XUSB form (`XUSB_GAMEPAD_DPAD_UP`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let name = upper.strip_prefix("XUSB_GAMEPAD_").unwrap_or(&upper);
        BUTTON_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, button)| *button)
            .ok_or_else(|| format!("unknown virtual button '{}'", s))
    }
}

/// Continuous outputs of the virtual pad
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AxisTarget {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
}

const AXIS_NAMES: [(&str, AxisTarget); 6] = [
    ("left_stick_x", AxisTarget::LeftStickX),
    ("left_stick_y", AxisTarget::LeftStickY),
    ("right_stick_x", AxisTarget::RightStickX),
    ("right_stick_y", AxisTarget::RightStickY),
    ("left_trigger", AxisTarget::LeftTrigger),
    ("right_trigger", AxisTarget::RightTrigger),
];

impl AxisTarget {
    pub const ALL: [AxisTarget; 6] = [
        AxisTarget::LeftStickX,
        AxisTarget::LeftStickY,
        AxisTarget::RightStickX,
        AxisTarget::RightStickY,
        AxisTarget::LeftTrigger,
        AxisTarget::RightTrigger,
    ];

    pub fn is_trigger(&self) -> bool {
        matches!(self, AxisTarget::LeftTrigger | AxisTarget::RightTrigger)
    }

    /// Level an axis sits at when nothing drives it
    pub fn rest_level(&self) -> f32 {
        if self.is_trigger() {
            -1.0
        } else {
            0.0
        }
    }

    pub fn name(&self) -> &'static str {
        AXIS_NAMES
            .iter()
            .find(|(_, axis)| axis == self)
            .map(|(name, _)| *name)
            .unwrap_or("unknown")
    }
}

impl fmt::Display for AxisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for AxisTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        AXIS_NAMES
            .iter()
            .find(|(candidate, _)| *candidate == lower)
            .map(|(_, axis)| *axis)
            .ok_or_else(|| format!("unknown axis target '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, thiserror::Error)]
pub enum GamepadError {
    #[error("Virtual gamepad unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to submit gamepad frame: {0}")]
    SubmitError(String),
}

/// Virtual gamepad driver boundary.
///
/// Button and axis calls only stage state; `flush` submits the staged frame.
pub trait GamepadSink: Send {
    fn press(&mut self, button: VirtualButton);
    fn release(&mut self, button: VirtualButton);
    fn set_stick(&mut self, side: Side, x: i16, y: i16);
    fn set_trigger(&mut self, side: Side, value: u8);
    fn flush(&mut self) -> Result<(), GamepadError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
struct PadFrame {
    buttons: BTreeSet<VirtualButton>,
    left_stick: (i16, i16),
    right_stick: (i16, i16),
    left_trigger: u8,
    right_trigger: u8,
}

/// Dry-run pad that traces every frame that differs from the previous one
#[derive(Debug, Default)]
pub struct TracingGamepad {
    staged: PadFrame,
    submitted: PadFrame,
    frames: u64,
}

impl TracingGamepad {
    pub fn new() -> Self {
        info!("Using tracing virtual gamepad (no driver attached)");
        Self::default()
    }
}

impl GamepadSink for TracingGamepad {
    fn press(&mut self, button: VirtualButton) {
        self.staged.buttons.insert(button);
    }

    fn release(&mut self, button: VirtualButton) {
        self.staged.buttons.remove(&button);
    }

    fn set_stick(&mut self, side: Side, x: i16, y: i16) {
        match side {
            Side::Left => self.staged.left_stick = (x, y),
            Side::Right => self.staged.right_stick = (x, y),
        }
    }

    fn set_trigger(&mut self, side: Side, value: u8) {
        match side {
            Side::Left => self.staged.left_trigger = value,
            Side::Right => self.staged.right_trigger = value,
        }
    }

    fn flush(&mut self) -> Result<(), GamepadError> {
        self.frames += 1;
        if self.staged != self.submitted {
            debug!(
                "Pad frame #{}: buttons={:?} L=({}, {}) R=({}, {}) LT={} RT={}",
                self.frames,
                self.staged.buttons,
                self.staged.left_stick.0,
                self.staged.left_stick.1,
                self.staged.right_stick.0,
                self.staged.right_stick.1,
                self.staged.left_trigger,
                self.staged.right_trigger
            );
            self.submitted = self.staged.clone();
        }
        Ok(())
    }
}
