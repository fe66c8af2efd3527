use std::time::Duration;

/// Fixed-interval clock for host loops.
///
/// Elapsed wall time is accumulated and converted into whole ticks; the
/// remainder carries over. After a stall at most `max_catch_up` ticks are
/// reported and the backlog is dropped rather than replayed.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    interval: Duration,
    accumulated: Duration,
    max_catch_up: u32,
    ticks: u64,
}

impl FixedTimestep {
    pub fn new(interval: Duration) -> Self {
        Self::with_catch_up(interval, 4)
    }

    pub fn with_catch_up(interval: Duration, max_catch_up: u32) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            accumulated: Duration::ZERO,
            max_catch_up: max_catch_up.max(1),
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Total ticks reported so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Adds `elapsed` and returns how many ticks are now due.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        self.accumulated += elapsed;

        let mut due = 0;
        while self.accumulated >= self.interval {
            self.accumulated -= self.interval;
            due += 1;
            if due == self.max_catch_up {
                self.accumulated = Duration::ZERO;
                break;
            }
        }

        self.ticks += u64::from(due);
        due
    }

    /// Time left until the next tick is due.
    pub fn until_next(&self) -> Duration {
        self.interval.saturating_sub(self.accumulated)
    }

    pub fn reset(&mut self) {
        self.accumulated = Duration::ZERO;
        self.ticks = 0;
    }
}
