use crate::effects::EffectFrames;
use crate::output::haptic::HapticSink;
use std::time::{Duration, Instant};
use tracing::debug;

/// A resolved effect being played out over several ticks
#[derive(Debug)]
pub struct EffectPlayback {
    pub name: String,
    /// Binding that started it, if any
    pub owner: Option<usize>,
    frames: EffectFrames,
    next_at: Instant,
    played: usize,
}

impl EffectPlayback {
    pub fn new(name: &str, frames: EffectFrames, now: Instant, owner: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            owner,
            frames,
            next_at: now,
            played: 0,
        }
    }

    /// Plays every frame that is due. Returns `true` once the effect is exhausted.
    ///
    /// Frames with no delay before their successor go out in the same call.
    pub fn advance(&mut self, now: Instant, position: u32, sink: &mut dyn HapticSink) -> bool {
        while now >= self.next_at {
            match self.frames.next() {
                Some(frame) => {
                    sink.play_frame(position, frame.duration_ms, &frame.motors);
                    self.played += 1;
                    self.next_at += Duration::from_millis(frame.delay_ms as u64);
                }
                None => {
                    debug!("Effect '{}' finished after {} frames", self.name, self.played);
                    return true;
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectLibrary;
    use crate::testing::RecordingHaptics;

    #[test]
    fn sweep_spreads_frames_over_ticks() {
        let library = EffectLibrary::new(&[]);
        let start = Instant::now();
        let frames = library.resolve("front_rear_center", 100).unwrap();
        let mut playback = EffectPlayback::new("front_rear_center", frames, start, None);
        let (mut sink, log) = RecordingHaptics::new();

        assert!(!playback.advance(start, 0, &mut sink));
        assert_eq!(log.frames().len(), 1);
        assert_eq!(log.frames()[0].motors[18], 100);
        assert_eq!(log.frames()[0].duration_ms, 80);

        // 20 ms between frames
        assert!(!playback.advance(start + Duration::from_millis(10), 0, &mut sink));
        assert_eq!(log.frames().len(), 1);
        assert!(!playback.advance(start + Duration::from_millis(20), 0, &mut sink));
        assert_eq!(log.frames().len(), 2);
        assert_eq!(log.frames()[1].motors[17], 100);

        // Catch up on a late tick; the last frame's trailing delay must still pass.
        assert!(!playback.advance(start + Duration::from_millis(180), 0, &mut sink));
        assert_eq!(log.frames().len(), 10);
        assert!(playback.advance(start + Duration::from_millis(200), 0, &mut sink));
    }

    #[test]
    fn static_effect_plays_once_and_finishes() {
        let library = EffectLibrary::new(&[]);
        let now = Instant::now();
        let frames = library.resolve("front_outer_right_chest", 50).unwrap();
        let mut playback = EffectPlayback::new("front_outer_right_chest", frames, now, Some(3));
        let (mut sink, log) = RecordingHaptics::new();

        assert!(playback.advance(now, 2, &mut sink));
        let frames = log.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].position, 2);
        assert_eq!(frames[0].motors[2], 50);
        assert_eq!(frames[0].motors[3], 50);
    }
}
