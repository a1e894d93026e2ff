//! Per-session keepalive timer.

use std::time::Duration;

use scenee_core::StreamEvent;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// Shortest accepted heartbeat period.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Recurring keepalive owned by a single session's delivery loop.
///
/// There is no global ticker enumerating sessions: each loop owns one of
/// these, so the timer stops when the loop returns. The first tick fires one
/// full period after creation. A tick that could not be served on time (the
/// loop was busy writing) is delayed rather than burst.
pub struct Heartbeat {
    interval: Interval,
}

impl Heartbeat {
    /// Start a heartbeat with the given period.
    ///
    /// Periods shorter than [`MIN_PERIOD`] (including zero) are raised to it.
    pub fn new(period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }

    /// The heartbeat period.
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Wait for the next tick and return the keepalive frame to write.
    pub async fn tick(&mut self) -> StreamEvent {
        let _ = self.interval.tick().await;
        StreamEvent::heartbeat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scenee_core::EventKind;

    #[tokio::test(start_paused = true)]
    async fn first_tick_after_one_period() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(Duration::from_secs(30));
        let frame = hb.tick().await;
        assert_eq!(frame.kind, EventKind::Heartbeat);
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_at_fixed_period() {
        let start = Instant::now();
        let mut hb = Heartbeat::new(Duration::from_secs(10));
        for _ in 0..3 {
            let _ = hb.tick().await;
        }
        assert_eq!(start.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn late_tick_delays_following_ticks() {
        let mut hb = Heartbeat::new(Duration::from_secs(10));
        time::sleep(Duration::from_secs(25)).await;
        let late = Instant::now();
        let _ = hb.tick().await;
        assert_eq!(late.elapsed(), Duration::ZERO);
        let _ = hb.tick().await;
        assert_eq!(late.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_raised_to_minimum() {
        let mut hb = Heartbeat::new(Duration::ZERO);
        assert_eq!(hb.period(), MIN_PERIOD);
        let start = Instant::now();
        let _ = hb.tick().await;
        assert!(start.elapsed() >= MIN_PERIOD);
    }

    #[tokio::test]
    async fn reports_period() {
        let hb = Heartbeat::new(Duration::from_secs(30));
        assert_eq!(hb.period(), Duration::from_secs(30));
    }
}
