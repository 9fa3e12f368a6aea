//! Output side of the bridge
//!
//! Every tick ends here:
//!
//! ```text
//! Dispatcher ──► OutputComposer ──► GamepadSink (one flush per tick)
//!      │
//!      └──────► HapticSink (motor frames)
//! ```
//!
//! The device drivers themselves live outside this crate. The sinks below are the
//! boundary the engine talks to; [`gamepad::TracingGamepad`] and
//! [`haptic::TracingHapticSink`] only trace what would be submitted.

pub mod composer;
pub mod gamepad;
pub mod haptic;

pub use composer::{OutputComposer, RumbleInstance};
pub use gamepad::{AxisTarget, GamepadError, GamepadSink, Side, TracingGamepad, VirtualButton};
pub use haptic::{HapticError, HapticSink, MotorIntensities, TracingHapticSink, MOTOR_COUNT};
