//! Keyboard and mouse buttons have no event queue here, only an absolute
//! "is it down right now" query. [`KeyEdgeDetector`] keeps the last seen
//! state per key and turns the difference into press/release transitions.

use crate::controller::{InputKind, InputSignature, Transition};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Virtual-key codes for the names bindings may use
const KEY_NAMES: [(&str, u32); 42] = [
    ("0", 0x30),
    ("1", 0x31),
    ("2", 0x32),
    ("3", 0x33),
    ("4", 0x34),
    ("5", 0x35),
    ("6", 0x36),
    ("7", 0x37),
    ("8", 0x38),
    ("9", 0x39),
    ("A", 0x41),
    ("B", 0x42),
    ("C", 0x43),
    ("D", 0x44),
    ("E", 0x45),
    ("F", 0x46),
    ("G", 0x47),
    ("H", 0x48),
    ("I", 0x49),
    ("J", 0x4A),
    ("K", 0x4B),
    ("L", 0x4C),
    ("M", 0x4D),
    ("N", 0x4E),
    ("O", 0x4F),
    ("P", 0x50),
    ("Q", 0x51),
    ("R", 0x52),
    ("S", 0x53),
    ("T", 0x54),
    ("U", 0x55),
    ("V", 0x56),
    ("W", 0x57),
    ("X", 0x58),
    ("Y", 0x59),
    ("Z", 0x5A),
    ("SPACE", 0x20),
    ("L_SHIFT", 0xA0),
    ("L_CTRL", 0xA2),
    ("L_MOUSE", 0x01),
    ("R_MOUSE", 0x02),
    ("M_MOUSE", 0x04),
];

/// Looks up a key name and tells whether it is a mouse button.
pub fn key_code(name: &str) -> Option<(InputKind, u32)> {
    let upper = name.trim().to_ascii_uppercase();
    KEY_NAMES
        .iter()
        .find(|(candidate, _)| *candidate == upper)
        .map(|(candidate, code)| {
            let kind = if candidate.ends_with("_MOUSE") {
                InputKind::Mouse
            } else {
                InputKind::Key
            };
            (kind, *code)
        })
}

pub fn key_name(code: u32) -> Option<&'static str> {
    KEY_NAMES
        .iter()
        .find(|(_, candidate)| *candidate == code)
        .map(|(name, _)| *name)
}

/// Absolute key state query
pub trait KeyStateSource: Send {
    fn is_down(&mut self, code: u32) -> bool;
}

/// Reports every key as up. Used where no key state backend exists.
#[derive(Debug, Default)]
pub struct NullKeyState;

impl NullKeyState {
    pub fn new() -> Self {
        info!("No key state backend on this platform, keyboard and mouse bindings stay idle");
        Self
    }
}

impl KeyStateSource for NullKeyState {
    fn is_down(&mut self, _code: u32) -> bool {
        false
    }
}

#[cfg(windows)]
#[derive(Debug, Default)]
pub struct Win32KeyState;

#[cfg(windows)]
impl KeyStateSource for Win32KeyState {
    fn is_down(&mut self, code: u32) -> bool {
        use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;
        // High bit set means the key is down right now.
        let state = unsafe { GetAsyncKeyState(code as i32) };
        (state as u16 & 0x8000) != 0
    }
}

/// Best key state backend for the current platform
pub fn platform_key_state() -> Box<dyn KeyStateSource> {
    #[cfg(windows)]
    {
        info!("Using GetAsyncKeyState for keyboard and mouse");
        Box::new(Win32KeyState)
    }
    #[cfg(not(windows))]
    {
        Box::new(NullKeyState::new())
    }
}

#[derive(Debug, Default)]
pub struct KeyEdgeDetector {
    last_state: BTreeMap<InputSignature, bool>,
}

impl KeyEdgeDetector {
    /// Only the given inputs are polled; everything else is ignored.
    pub fn new(watched: impl IntoIterator<Item = InputSignature>) -> Self {
        let last_state: BTreeMap<InputSignature, bool> = watched
            .into_iter()
            .filter(InputSignature::is_polled)
            .map(|input| (input, false))
            .collect();
        debug!("Watching {} keys", last_state.len());
        Self { last_state }
    }

    pub fn watched(&self) -> usize {
        self.last_state.len()
    }

    pub fn is_down(&self, input: &InputSignature) -> bool {
        self.last_state.get(input).copied().unwrap_or(false)
    }

    /// Emits one transition per state change since the previous poll.
    pub fn poll(&mut self, keys: &mut dyn KeyStateSource) -> Vec<Transition> {
        let mut transitions = Vec::new();
        for (input, was_down) in self.last_state.iter_mut() {
            let down = keys.is_down(input.code);
            if down != *was_down {
                *was_down = down;
                debug!(
                    "Key {} {}",
                    key_name(input.code).unwrap_or("?"),
                    if down { "down" } else { "up" }
                );
                transitions.push(Transition {
                    input: *input,
                    pressed: down,
                });
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeKeys;

    fn key(name: &str) -> InputSignature {
        let (kind, code) = key_code(name).unwrap();
        InputSignature::new(0, kind, code)
    }

    #[test]
    fn resolves_key_and_mouse_names() {
        assert_eq!(key_code("space"), Some((InputKind::Key, 0x20)));
        assert_eq!(key_code("L_MOUSE"), Some((InputKind::Mouse, 0x01)));
        assert_eq!(key_code("F13"), None);
        assert_eq!(key_name(0x5A), Some("Z"));
    }

    #[test]
    fn each_press_produces_one_edge() {
        let (mut keys, handle) = FakeKeys::new();
        let mut detector = KeyEdgeDetector::new([key("W"), key("L_MOUSE")]);

        assert!(detector.poll(&mut keys).is_empty());

        handle.set(0x57, true);
        let edges = detector.poll(&mut keys);
        assert_eq!(
            edges,
            vec![Transition {
                input: key("W"),
                pressed: true
            }]
        );

        // Held across many ticks: no repeats.
        for _ in 0..10 {
            assert!(detector.poll(&mut keys).is_empty());
        }

        handle.set(0x57, false);
        let edges = detector.poll(&mut keys);
        assert_eq!(edges.len(), 1);
        assert!(!edges[0].pressed);
    }

    #[test]
    fn unwatched_keys_are_not_polled() {
        let (mut keys, handle) = FakeKeys::new();
        let mut detector = KeyEdgeDetector::new([
            key("A"),
            InputSignature::new(0, InputKind::Button, 0x42),
        ]);
        assert_eq!(detector.watched(), 1);
        handle.set(0x42, true);
        assert!(detector.poll(&mut keys).is_empty());
    }
}
