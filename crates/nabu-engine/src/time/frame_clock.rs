use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Time elapsed since the previous tick, clamped.
    pub dt: Duration,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,
}

/// Clock producing clamped deltas between ticks.
///
/// Delta time is clamped to avoid pathological values when the worker stalls
/// (long shader fetch, debugger pause) or ticks in a tight loop.
#[derive(Debug, Clone)]
pub struct FrameClock {
    last: Instant,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    /// Creates a clock with default clamps.
    ///
    /// Clamp rationale:
    /// - minimum prevents zero-dt behavior from tight loops on some platforms
    /// - maximum prevents time jumps after long stalls
    pub fn new(now: Instant) -> Self {
        Self::with_clamps(now, Duration::from_micros(100), Duration::from_millis(250))
    }

    /// Creates a clock with custom delta-time clamps.
    pub fn with_clamps(now: Instant, dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            last: now,
            dt_min,
            dt_max,
        }
    }

    /// Resets the clock baseline.
    ///
    /// Used when the loop is (re)started so the first tick does not include idle time.
    pub fn reset(&mut self, now: Instant) {
        self.last = now;
    }

    /// Widens the upper clamp so a delta of `at_least` passes unclamped.
    pub fn raise_max_delta(&mut self, at_least: Duration) {
        self.dt_max = self.dt_max.max(at_least);
    }

    pub fn max_delta(&self) -> Duration {
        self.dt_max
    }

    /// Advances the clock to `now` and returns a new `FrameTime`.
    pub fn tick(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);

        self.last = now;

        FrameTime { dt, now }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_is_clamped() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(t0);

        assert_eq!(clock.tick(t0).dt, Duration::from_micros(100));
        assert_eq!(clock.tick(t0 + Duration::from_millis(16)).dt, Duration::from_millis(16));
        assert_eq!(clock.tick(t0 + Duration::from_secs(5)).dt, Duration::from_millis(250));
    }

    #[test]
    fn raised_clamp_never_shrinks() {
        let t0 = Instant::now();
        let mut clock = FrameClock::new(t0);

        clock.raise_max_delta(Duration::from_millis(10));
        assert_eq!(clock.max_delta(), Duration::from_millis(250));

        clock.raise_max_delta(Duration::from_secs(2));
        assert_eq!(clock.tick(t0 + Duration::from_secs(2)).dt, Duration::from_secs(2));
        assert_eq!(clock.tick(t0 + Duration::from_secs(9)).dt, Duration::from_secs(2));
    }
}
