//! Frame timing.

use std::time::{Duration, Instant};

/// Longest frame time reported by [`FrameTimer::tick`], in seconds.
///
/// Window drags and swap chain rebuilds can stall the loop for a long time;
/// without a cap the first frame afterwards would move the camera by the
/// whole stall.
pub const MAX_FRAME_TIME: f32 = 0.25;

/// Measures the time between consecutive frames.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frame_count: u64,
}

impl FrameTimer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
        }
    }

    /// Time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Seconds since the previous tick, capped at [`MAX_FRAME_TIME`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frame_count += 1;
        clamp_frame_time(delta)
    }

    /// Number of ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Restarts timing from now, e.g. after the window was minimized.
    pub fn reset(&mut self) {
        self.last_tick = Instant::now();
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_frame_time(delta: Duration) -> f32 {
    delta.as_secs_f32().min(MAX_FRAME_TIME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_frame_time() {
        assert!((clamp_frame_time(Duration::from_millis(16)) - 0.016).abs() < 1e-6);
        assert_eq!(clamp_frame_time(Duration::from_secs(3)), MAX_FRAME_TIME);
    }

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        let dt = timer.tick();
        timer.tick();
        assert!(dt >= 0.0 && dt <= MAX_FRAME_TIME);
        assert_eq!(timer.frame_count(), 2);
    }
}
