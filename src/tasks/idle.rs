//! # Idle Strategies
//!
//! Background tasks and tailing readers poll shared state and must do
//! something when no progress is observed. The wait policy is injected as a
//! strategy object so the task logic stays testable: a test can supply an
//! instant strategy and drive iterations deterministically.
//!
//! Two production strategies are provided. [`StaticPause`] sleeps a fixed
//! duration per idle call and suits the preloader's tight poll.
//! [`Backoff`] escalates from spinning through yielding to sleeping, capped
//! at a maximum pause, and suits the unmapper's idle-priority cadence and
//! tailing readers that want low wake-up latency right after a burst.

use std::time::Duration;

pub trait IdleStrategy: Send {
    /// Called when an iteration made no progress.
    fn idle(&mut self);

    /// Called when an iteration made progress, so escalating strategies can
    /// rewind to their hottest state.
    fn reset(&mut self) {}
}

/// Sleeps a fixed duration on every idle call.
#[derive(Debug, Clone)]
pub struct StaticPause {
    pause: Duration,
}

impl StaticPause {
    pub fn new(pause: Duration) -> Self {
        Self { pause }
    }
}

impl IdleStrategy for StaticPause {
    fn idle(&mut self) {
        std::thread::sleep(self.pause);
    }
}

const BACKOFF_SPINS: u32 = 64;
const BACKOFF_YIELDS: u32 = 32;

/// Spins, then yields, then sleeps with doubling pauses up to `max_pause`.
#[derive(Debug, Clone)]
pub struct Backoff {
    max_pause: Duration,
    idle_count: u32,
    pause: Duration,
}

impl Backoff {
    pub fn new(max_pause: Duration) -> Self {
        Self {
            max_pause,
            idle_count: 0,
            pause: Duration::from_micros(1),
        }
    }
}

impl IdleStrategy for Backoff {
    fn idle(&mut self) {
        if self.idle_count < BACKOFF_SPINS {
            std::hint::spin_loop();
        } else if self.idle_count < BACKOFF_SPINS + BACKOFF_YIELDS {
            std::thread::yield_now();
        } else {
            std::thread::sleep(self.pause);
            self.pause = (self.pause * 2).min(self.max_pause);
        }
        self.idle_count = self.idle_count.saturating_add(1);
    }

    fn reset(&mut self) {
        self.idle_count = 0;
        self.pause = Duration::from_micros(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn static_pause_sleeps() {
        let mut idler = StaticPause::new(Duration::from_millis(5));

        let start = Instant::now();
        idler.idle();

        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn backoff_escalates_and_resets() {
        let mut idler = Backoff::new(Duration::from_millis(1));

        for _ in 0..BACKOFF_SPINS + BACKOFF_YIELDS + 4 {
            idler.idle();
        }
        assert!(idler.pause > Duration::from_micros(1));

        idler.reset();
        assert_eq!(idler.idle_count, 0);
        assert_eq!(idler.pause, Duration::from_micros(1));
    }
}
