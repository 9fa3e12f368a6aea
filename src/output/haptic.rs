use tracing::{debug, info};

/// Slots on the vest grid: 0-19 front, 20-39 back
pub const MOTOR_COUNT: usize = 40;

pub type MotorIntensities = [u8; MOTOR_COUNT];

#[derive(Debug, thiserror::Error)]
pub enum HapticError {
    #[error("Haptic registration failed: {0}")]
    RegistrationError(String),
}

/// Haptic vest driver boundary
pub trait HapticSink: Send {
    /// One-time registration; callers ignore failures.
    fn register(&mut self, app_id: &str) -> Result<(), HapticError>;

    fn play_frame(&mut self, position: u32, duration_ms: u32, motors: &MotorIntensities);

    fn stop_all(&mut self);
}

/// Dry-run vest that traces every frame it is handed
#[derive(Debug, Default)]
pub struct TracingHapticSink {
    frames: u64,
}

impl TracingHapticSink {
    pub fn new() -> Self {
        info!("Using tracing haptic sink (no vest driver attached)");
        Self::default()
    }
}

impl HapticSink for TracingHapticSink {
    fn register(&mut self, app_id: &str) -> Result<(), HapticError> {
        info!("Registered haptic application '{}'", app_id);
        Ok(())
    }

    fn play_frame(&mut self, position: u32, duration_ms: u32, motors: &MotorIntensities) {
        self.frames += 1;
        let active: Vec<(usize, u8)> = motors
            .iter()
            .enumerate()
            .filter(|(_, value)| **value > 0)
            .map(|(idx, value)| (idx, *value))
            .collect();
        debug!(
            "Haptic frame #{} pos={} {}ms motors={:?}",
            self.frames, position, duration_ms, active
        );
    }

    fn stop_all(&mut self) {
        info!("Stopping all haptic playback after {} frames", self.frames);
    }
}
