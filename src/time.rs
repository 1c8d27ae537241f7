use std::time::{Duration, Instant};

/// Longest step handed to the simulation. Longer gaps (debugger, window
/// drag) are clamped so the scene does not jump.
const MAX_STEP: Duration = Duration::from_millis(250);

/// Wall clock for the frame loop.
#[derive(Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    frame: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self { last: None, frame: 0 }
    }

    /// Seconds since the previous tick. The first tick returns zero.
    pub fn tick(&mut self) -> f64 {
        let now = Instant::now();
        let dt = self
            .last
            .map(|last| now.duration_since(last).min(MAX_STEP))
            .unwrap_or_default();
        self.last = Some(now);
        self.frame += 1;
        dt.as_secs_f64()
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_zero_and_frames_count() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick(), 0.0);
        let dt = clock.tick();
        assert!((0.0..=MAX_STEP.as_secs_f64()).contains(&dt));
        assert_eq!(clock.frame(), 2);
    }
}
