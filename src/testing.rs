//! Recording sinks and scripted sources shared by the unit tests.

use crate::chair::{ChairCommand, ChairSink, ConnectionState};
use crate::controller::keyboard::KeyStateSource;
use crate::controller::sampler::InputState;
use crate::controller::{DeviceEvent, InputSignature, InputSource};
use crate::output::gamepad::{GamepadError, GamepadSink, Side, VirtualButton};
use crate::output::haptic::{HapticError, HapticSink, MotorIntensities};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum PadEvent {
    Press(VirtualButton),
    Release(VirtualButton),
    Stick(Side, i16, i16),
    Trigger(Side, u8),
}

#[derive(Debug, Default)]
struct PadLogInner {
    events: Vec<PadEvent>,
    flushes: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PadLog(Arc<Mutex<PadLogInner>>);

impl PadLog {
    pub fn events(&self) -> Vec<PadEvent> {
        self.0.lock().unwrap().events.clone()
    }

    pub fn flushes(&self) -> usize {
        self.0.lock().unwrap().flushes
    }

    pub fn presses(&self) -> Vec<VirtualButton> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                PadEvent::Press(button) => Some(button),
                _ => None,
            })
            .collect()
    }

    /// Press and release events only, in order
    pub fn button_events(&self) -> Vec<PadEvent> {
        self.events()
            .into_iter()
            .filter(|event| matches!(event, PadEvent::Press(_) | PadEvent::Release(_)))
            .collect()
    }

    pub fn last_stick(&self, side: Side) -> Option<(i16, i16)> {
        self.events().into_iter().rev().find_map(|event| match event {
            PadEvent::Stick(s, x, y) if s == side => Some((x, y)),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().events.clear();
    }
}

pub struct RecordingGamepad {
    log: PadLog,
}

impl RecordingGamepad {
    pub fn new() -> (Self, PadLog) {
        let log = PadLog::default();
        (Self { log: log.clone() }, log)
    }

    fn record(&self, event: PadEvent) {
        self.log.0.lock().unwrap().events.push(event);
    }
}

impl GamepadSink for RecordingGamepad {
    fn press(&mut self, button: VirtualButton) {
        self.record(PadEvent::Press(button));
    }

    fn release(&mut self, button: VirtualButton) {
        self.record(PadEvent::Release(button));
    }

    fn set_stick(&mut self, side: Side, x: i16, y: i16) {
        self.record(PadEvent::Stick(side, x, y));
    }

    fn set_trigger(&mut self, side: Side, value: u8) {
        self.record(PadEvent::Trigger(side, value));
    }

    fn flush(&mut self) -> Result<(), GamepadError> {
        self.log.0.lock().unwrap().flushes += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayedFrame {
    pub position: u32,
    pub duration_ms: u32,
    pub motors: MotorIntensities,
}

#[derive(Debug, Default)]
struct HapticLogInner {
    registered: Vec<String>,
    frames: Vec<PlayedFrame>,
    stops: usize,
}

#[derive(Debug, Clone, Default)]
pub struct HapticLog(Arc<Mutex<HapticLogInner>>);

impl HapticLog {
    pub fn frames(&self) -> Vec<PlayedFrame> {
        self.0.lock().unwrap().frames.clone()
    }

    pub fn registered(&self) -> Vec<String> {
        self.0.lock().unwrap().registered.clone()
    }

    pub fn stops(&self) -> usize {
        self.0.lock().unwrap().stops
    }
}

pub struct RecordingHaptics {
    log: HapticLog,
    fail_registration: bool,
}

impl RecordingHaptics {
    pub fn new() -> (Self, HapticLog) {
        let log = HapticLog::default();
        (
            Self {
                log: log.clone(),
                fail_registration: false,
            },
            log,
        )
    }

    pub fn failing_registration() -> (Self, HapticLog) {
        let (mut sink, log) = Self::new();
        sink.fail_registration = true;
        (sink, log)
    }
}

impl HapticSink for RecordingHaptics {
    fn register(&mut self, app_id: &str) -> Result<(), HapticError> {
        self.log.0.lock().unwrap().registered.push(app_id.to_string());
        if self.fail_registration {
            return Err(HapticError::RegistrationError("no player running".to_string()));
        }
        Ok(())
    }

    fn play_frame(&mut self, position: u32, duration_ms: u32, motors: &MotorIntensities) {
        self.log.0.lock().unwrap().frames.push(PlayedFrame {
            position,
            duration_ms,
            motors: *motors,
        });
    }

    fn stop_all(&mut self) {
        self.log.0.lock().unwrap().stops += 1;
    }
}

#[derive(Debug, Default)]
struct ChairLogInner {
    commands: Vec<ChairCommand>,
    closed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ChairLog(Arc<Mutex<ChairLogInner>>);

impl ChairLog {
    pub fn commands(&self) -> Vec<ChairCommand> {
        self.0.lock().unwrap().commands.clone()
    }

    pub fn closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }
}

pub struct RecordingChair {
    log: ChairLog,
}

impl RecordingChair {
    pub fn new() -> (Self, ChairLog) {
        let log = ChairLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl ChairSink for RecordingChair {
    fn submit(&mut self, command: ChairCommand) {
        self.log.0.lock().unwrap().commands.push(command);
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Connected
    }

    fn close(&mut self) -> Option<tokio::task::JoinHandle<()>> {
        self.log.0.lock().unwrap().closed = true;
        None
    }
}

#[derive(Debug, Default)]
struct FeedInner {
    queue: VecDeque<DeviceEvent>,
    devices: Vec<u32>,
}

/// Pushes scripted device events into a [`FakeInput`]
#[derive(Debug, Clone, Default)]
pub struct InputFeed(Arc<Mutex<FeedInner>>);

impl InputFeed {
    pub fn push(&self, event: DeviceEvent) {
        self.0.lock().unwrap().queue.push_back(event);
    }
}

pub struct FakeInput {
    feed: InputFeed,
}

impl FakeInput {
    pub fn new(devices: Vec<u32>) -> (Self, InputFeed) {
        let feed = InputFeed::default();
        feed.0.lock().unwrap().devices = devices;
        (Self { feed: feed.clone() }, feed)
    }
}

impl InputSource for FakeInput {
    fn poll_events(&mut self) -> Vec<DeviceEvent> {
        let mut inner = self.feed.0.lock().unwrap();
        let events: Vec<DeviceEvent> = inner.queue.drain(..).collect();
        for event in &events {
            match event {
                DeviceEvent::Connected { device } => inner.devices.push(*device),
                DeviceEvent::Disconnected { device } => inner.devices.retain(|d| d != device),
                _ => {}
            }
        }
        events
    }

    fn connected_devices(&self) -> Vec<u32> {
        self.feed.0.lock().unwrap().devices.clone()
    }
}

#[derive(Debug, Clone, Default)]
pub struct KeyHandle(Arc<Mutex<BTreeSet<u32>>>);

impl KeyHandle {
    pub fn set(&self, code: u32, down: bool) {
        let mut keys = self.0.lock().unwrap();
        if down {
            keys.insert(code);
        } else {
            keys.remove(&code);
        }
    }
}

pub struct FakeKeys {
    handle: KeyHandle,
}

impl FakeKeys {
    pub fn new() -> (Self, KeyHandle) {
        let handle = KeyHandle::default();
        (
            Self {
                handle: handle.clone(),
            },
            handle,
        )
    }
}

impl KeyStateSource for FakeKeys {
    fn is_down(&mut self, code: u32) -> bool {
        self.handle.0.lock().unwrap().contains(&code)
    }
}

/// Hand-driven input state for dispatcher tests
#[derive(Debug, Default)]
pub struct FakeInputState {
    pub pressed: BTreeSet<InputSignature>,
    pub axes: HashMap<(u32, u32), f32>,
    pub missing_devices: BTreeSet<u32>,
}

impl FakeInputState {
    pub fn press(&mut self, input: InputSignature) {
        self.pressed.insert(input);
    }

    pub fn release(&mut self, input: InputSignature) {
        self.pressed.remove(&input);
    }

    pub fn set_axis(&mut self, device: u32, axis: u32, value: f32) {
        self.axes.insert((device, axis), value);
    }
}

impl InputState for FakeInputState {
    fn is_pressed(&self, input: &InputSignature) -> bool {
        self.pressed.contains(input)
    }

    fn axis_level(&self, device: u32, axis: u32) -> Option<f32> {
        if self.missing_devices.contains(&device) {
            return None;
        }
        Some(self.axes.get(&(device, axis)).copied().unwrap_or(0.0))
    }
}
