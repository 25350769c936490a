use std::time::{Duration, Instant};

use super::FrameClock;

/// Frame rate used when a caller has not chosen one.
pub const DEFAULT_FRAME_RATE: f64 = 60.0;

/// One due tick of a [`FrameLoop`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameTick {
    /// Frame counter after the increment (first tick is 1).
    pub frame: u64,
    /// Accumulated elapsed time in milliseconds.
    pub elapsed_ms: f64,
}

/// Periodic frame timer with named per-frame callbacks.
///
/// The loop owns no thread. The owner asks for [`next_deadline`](Self::next_deadline),
/// sleeps until then and calls [`advance`](Self::advance). There is at most one
/// timer: starting again replaces the period instead of stacking a second one.
///
/// Callbacks are kept in registration order; registering an existing key
/// replaces the callback in place.
#[derive(Debug)]
pub struct FrameLoop<C> {
    clock: FrameClock,
    frame: u64,
    elapsed_ms: f64,
    period: Option<Duration>,
    next_deadline: Option<Instant>,
    callbacks: Vec<(String, C)>,
}

impl<C> FrameLoop<C> {
    pub fn new(clock: FrameClock) -> Self {
        Self {
            clock,
            frame: 0,
            elapsed_ms: 0.0,
            period: None,
            next_deadline: None,
            callbacks: Vec::new(),
        }
    }

    /// (Re)starts the timer with `period`, first tick one period after `now`.
    ///
    /// Frame counter and elapsed time carry over a restart. The clock's delta
    /// clamp is widened to the period so slow rates still count full periods.
    pub fn start(&mut self, period: Duration, now: Instant) {
        let period = period.max(Duration::from_millis(1));
        self.period = Some(period);
        self.next_deadline = Some(now + period);
        self.clock.raise_max_delta(period);
        self.clock.reset(now);
    }

    pub fn stop(&mut self) {
        self.period = None;
        self.next_deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.period.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed_ms
    }

    /// Advances the loop if its deadline has passed.
    ///
    /// A late tick fires once; missed periods are skipped rather than replayed
    /// in a burst.
    pub fn advance(&mut self, now: Instant) -> Option<FrameTick> {
        let (period, deadline) = (self.period?, self.next_deadline?);
        if now < deadline {
            return None;
        }

        let mut next = deadline + period;
        if next <= now {
            next = now + period;
        }
        self.next_deadline = Some(next);

        let time = self.clock.tick(now);
        self.frame = self.frame.wrapping_add(1);
        self.elapsed_ms += time.dt.as_secs_f64() * 1000.0;

        Some(FrameTick {
            frame: self.frame,
            elapsed_ms: self.elapsed_ms,
        })
    }

    /// Registers `callback` under `key`, replacing any previous one in place.
    pub fn insert(&mut self, key: impl Into<String>, callback: C) {
        let key = key.into();
        match self.callbacks.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = callback,
            None => self.callbacks.push((key, callback)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<C> {
        let idx = self.callbacks.iter().position(|(k, _)| k == key)?;
        Some(self.callbacks.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.callbacks.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Moves the callbacks out so they can be invoked with mutable access to
    /// their owner. Pair with [`restore_callbacks`](Self::restore_callbacks).
    pub fn take_callbacks(&mut self) -> Vec<(String, C)> {
        std::mem::take(&mut self.callbacks)
    }

    /// Puts callbacks taken for invocation back.
    ///
    /// Keys registered while they were out win over the restored ones.
    pub fn restore_callbacks(&mut self, taken: Vec<(String, C)>) {
        let added = std::mem::replace(&mut self.callbacks, taken);
        for (key, callback) in added {
            self.insert(key, callback);
        }
    }

    /// Stops the timer and drops every callback.
    pub fn clear(&mut self) {
        self.stop();
        self.callbacks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn ticks_once_per_period() {
        let t0 = Instant::now();
        let mut lp: FrameLoop<()> = FrameLoop::new(FrameClock::new(t0));
        lp.start(ms(50), t0);

        assert_eq!(lp.next_deadline(), Some(t0 + ms(50)));
        assert!(lp.advance(t0 + ms(49)).is_none());

        let tick = lp.advance(t0 + ms(50)).expect("due");
        assert_eq!(tick.frame, 1);
        assert!((tick.elapsed_ms - 50.0).abs() < 1e-6);
        assert_eq!(lp.next_deadline(), Some(t0 + ms(100)));

        let tick = lp.advance(t0 + ms(100)).expect("due");
        assert_eq!(tick.frame, 2);
        assert!((tick.elapsed_ms - 100.0).abs() < 1e-6);
    }

    #[test]
    fn periods_longer_than_the_clamp_count_in_full() {
        let t0 = Instant::now();
        let mut lp: FrameLoop<()> = FrameLoop::new(FrameClock::new(t0));
        lp.start(ms(2000), t0);

        let tick = lp.advance(t0 + ms(2000)).expect("due");
        assert!((tick.elapsed_ms - 2000.0).abs() < 1e-6);

        let tick = lp.advance(t0 + ms(4000)).expect("due");
        assert!((tick.elapsed_ms - 4000.0).abs() < 1e-6);
    }

    #[test]
    fn late_tick_skips_missed_periods() {
        let t0 = Instant::now();
        let mut lp: FrameLoop<()> = FrameLoop::new(FrameClock::new(t0));
        lp.start(ms(10), t0);

        let tick = lp.advance(t0 + ms(55)).expect("due");
        assert_eq!(tick.frame, 1);
        assert_eq!(lp.next_deadline(), Some(t0 + ms(65)));
        assert!(lp.advance(t0 + ms(60)).is_none());
    }

    #[test]
    fn restart_replaces_the_timer() {
        let t0 = Instant::now();
        let mut lp: FrameLoop<()> = FrameLoop::new(FrameClock::new(t0));
        lp.start(ms(100), t0);
        lp.start(ms(20), t0 + ms(5));

        assert_eq!(lp.period(), Some(ms(20)));
        assert_eq!(lp.next_deadline(), Some(t0 + ms(25)));
    }

    #[test]
    fn stopped_loop_never_ticks() {
        let t0 = Instant::now();
        let mut lp: FrameLoop<()> = FrameLoop::new(FrameClock::new(t0));
        lp.start(ms(10), t0);
        lp.stop();
        assert!(lp.advance(t0 + ms(1000)).is_none());
        assert!(!lp.is_running());
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut lp = FrameLoop::new(FrameClock::new(Instant::now()));
        lp.insert("a", 1);
        lp.insert("b", 2);
        lp.insert("a", 3);

        let keys: Vec<_> = lp.keys().collect();
        assert_eq!(keys, ["a", "b"]);
        assert_eq!(lp.remove("a"), Some(3));
    }

    #[test]
    fn restore_keeps_keys_added_during_invocation() {
        let mut lp = FrameLoop::new(FrameClock::new(Instant::now()));
        lp.insert("paint", 1);
        lp.insert("time", 2);

        let taken = lp.take_callbacks();
        lp.insert("time", 20);
        lp.insert("extra", 3);
        lp.restore_callbacks(taken);

        let all: Vec<_> = lp.take_callbacks();
        assert_eq!(
            all,
            vec![("paint".to_string(), 1), ("time".to_string(), 20), ("extra".to_string(), 3)]
        );
    }
}
