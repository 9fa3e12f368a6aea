use crate::controller::{DeviceEvent, InputSource, SamplerError};
use gilrs::{Axis, Button, Event, EventType, GamepadId, Gilrs};
use tracing::{debug, error, info, warn};

/// Game controller source backed by gilrs.
///
/// Buttons are numbered in XInput order so bindings written against the
/// Windows joystick indices keep working:
///
/// | index | button | index | button |
/// |-------|--------|-------|--------|
/// | 0 | A | 8 | left thumb |
/// | 1 | B | 9 | right thumb |
/// | 2 | X | 10 | guide |
/// | 3 | Y | 11 | dpad up |
/// | 4 | LB | 12 | dpad down |
/// | 5 | RB | 13 | dpad left |
/// | 6 | back | 14 | dpad right |
/// | 7 | start | | |
///
/// Axes: LX=0, LY=1, RX=2, RY=3, LT=4, RT=5. Stick Y grows downward and
/// triggers rest at -1.
pub struct GilrsSource {
    gilrs: Gilrs,
}

pub const LEFT_TRIGGER_AXIS: u32 = 4;
pub const RIGHT_TRIGGER_AXIS: u32 = 5;

impl GilrsSource {
    pub fn create() -> Result<Self, SamplerError> {
        info!("Initializing gilrs controller interface");
        let gilrs = match Gilrs::new() {
            Ok(g) => {
                info!("Successfully initialized gilrs");
                g
            }
            Err(e) => {
                error!("Failed to initialize gilrs: {}", e);
                return Err(SamplerError::InitializationError(e.to_string()));
            }
        };

        let source = Self { gilrs };
        let devices = source.connected_devices();
        if devices.is_empty() {
            warn!("No gamepad connected, continuing with keyboard and mouse only");
        } else {
            info!("Found {} gamepads:", devices.len());
            for (id, gamepad) in source.gilrs.gamepads() {
                info!(
                    "  [{}] Name: {}, UUID: {:?}",
                    device_index(id),
                    gamepad.name(),
                    gamepad.uuid()
                );
            }
        }
        Ok(source)
    }

    fn convert_gilrs_event(device: u32, event: EventType) -> Option<DeviceEvent> {
        match event {
            EventType::ButtonPressed(button, _) => {
                map_button(button).map(|code| DeviceEvent::Button {
                    device,
                    code,
                    pressed: true,
                })
            }
            EventType::ButtonReleased(button, _) => {
                map_button(button).map(|code| DeviceEvent::Button {
                    device,
                    code,
                    pressed: false,
                })
            }
            // Analog triggers arrive as button values in 0..1 on most backends.
            EventType::ButtonChanged(Button::LeftTrigger2, value, _) => Some(DeviceEvent::Axis {
                device,
                code: LEFT_TRIGGER_AXIS,
                value: value * 2.0 - 1.0,
            }),
            EventType::ButtonChanged(Button::RightTrigger2, value, _) => Some(DeviceEvent::Axis {
                device,
                code: RIGHT_TRIGGER_AXIS,
                value: value * 2.0 - 1.0,
            }),
            EventType::AxisChanged(axis, value, _) => {
                map_axis(axis).map(|(code, flip)| DeviceEvent::Axis {
                    device,
                    code,
                    value: if flip { -value } else { value },
                })
            }
            EventType::Connected => {
                info!("Controller {} connected", device);
                Some(DeviceEvent::Connected { device })
            }
            EventType::Disconnected => {
                warn!("Controller {} disconnected", device);
                Some(DeviceEvent::Disconnected { device })
            }
            EventType::ButtonRepeated(button, _) => {
                debug!("Button repeat ignored: {:?}", button);
                None
            }
            _ => {
                debug!("Unhandled event type: {:?}", event);
                None
            }
        }
    }
}

impl InputSource for GilrsSource {
    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        let mut events = Vec::new();
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            if let Some(converted) = Self::convert_gilrs_event(device_index(id), event) {
                debug!("Captured event: {:?}", converted);
                events.push(converted);
            }
        }
        events
    }

    fn connected_devices(&self) -> Vec<u32> {
        self.gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .map(|(id, _)| device_index(id))
            .collect()
    }
}

fn device_index(id: GamepadId) -> u32 {
    usize::from(id) as u32
}

fn map_button(button: Button) -> Option<u32> {
    match button {
        Button::South => Some(0),
        Button::East => Some(1),
        Button::West => Some(2),
        Button::North => Some(3),
        Button::LeftTrigger => Some(4),
        Button::RightTrigger => Some(5),
        Button::Select => Some(6),
        Button::Start => Some(7),
        Button::LeftThumb => Some(8),
        Button::RightThumb => Some(9),
        Button::Mode => Some(10),
        Button::DPadUp => Some(11),
        Button::DPadDown => Some(12),
        Button::DPadLeft => Some(13),
        Button::DPadRight => Some(14),
        _ => None,
    }
}

/// Axis index plus whether the value must be flipped to grow downward
fn map_axis(axis: Axis) -> Option<(u32, bool)> {
    match axis {
        Axis::LeftStickX => Some((0, false)),
        Axis::LeftStickY => Some((1, true)),
        Axis::RightStickX => Some((2, false)),
        Axis::RightStickY => Some((3, true)),
        Axis::LeftZ => Some((LEFT_TRIGGER_AXIS, false)),
        Axis::RightZ => Some((RIGHT_TRIGGER_AXIS, false)),
        _ => None,
    }
}
