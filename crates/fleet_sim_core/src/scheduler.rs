//! Tick sources for [`crate::engine::SimulationEngine::run`].
//!
//! A scheduler decides when the next tick happens and how much real time it
//! covers. The engine awaits one tick at a time and finishes it before asking
//! for the next, so ticks never overlap.

use std::future::Future;
use std::time::Duration;

use tokio::time::{interval, Instant, Interval, MissedTickBehavior};

pub trait Scheduler {
    fn start(&mut self);

    fn stop(&mut self);

    /// Waits for the next tick and returns the real time it covers, or `None`
    /// once the scheduler is stopped or exhausted.
    fn tick(&mut self) -> impl Future<Output = Option<Duration>> + Send;
}

/// Wall-clock ticks on a tokio interval. Late ticks are delayed rather than
/// bursted, so a slow tick pushes the next one back instead of stacking up.
pub struct IntervalScheduler {
    period: Duration,
    interval: Option<Interval>,
    last: Option<Instant>,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            interval: None,
            last: None,
        }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Scheduler for IntervalScheduler {
    fn start(&mut self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(ticker);
        self.last = None;
    }

    fn stop(&mut self) {
        self.interval = None;
        self.last = None;
    }

    fn tick(&mut self) -> impl Future<Output = Option<Duration>> + Send {
        async move {
            let ticker = self.interval.as_mut()?;
            let now = ticker.tick().await;
            let elapsed = match self.last {
                Some(last) => now.saturating_duration_since(last),
                None => self.period,
            };
            self.last = Some(now);
            Some(elapsed)
        }
    }
}

/// Fixed virtual ticks with no waiting, for deterministic tests and
/// headless batch runs.
#[derive(Debug, Clone)]
pub struct VirtualScheduler {
    period: Duration,
    limit: Option<u64>,
    issued: u64,
    running: bool,
}

impl VirtualScheduler {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            limit: None,
            issued: 0,
            running: false,
        }
    }

    /// Stops issuing ticks after `limit` have been handed out.
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn issued(&self) -> u64 {
        self.issued
    }
}

impl Scheduler for VirtualScheduler {
    fn start(&mut self) {
        self.running = true;
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn tick(&mut self) -> impl Future<Output = Option<Duration>> + Send {
        let next = if !self.running || self.limit.is_some_and(|limit| self.issued >= limit) {
            None
        } else {
            self.issued += 1;
            Some(self.period)
        };
        std::future::ready(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn virtual_scheduler_honours_limit() {
        let mut scheduler = VirtualScheduler::new(Duration::from_millis(100)).with_limit(3);
        assert_eq!(scheduler.tick().await, None, "not started");

        scheduler.start();
        for _ in 0..3 {
            assert_eq!(scheduler.tick().await, Some(Duration::from_millis(100)));
        }
        assert_eq!(scheduler.tick().await, None);
        assert_eq!(scheduler.issued(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_scheduler_reports_elapsed_time() {
        let mut scheduler = IntervalScheduler::from_millis(100);
        scheduler.start();
        assert_eq!(scheduler.tick().await, Some(Duration::from_millis(100)));
        assert_eq!(scheduler.tick().await, Some(Duration::from_millis(100)));

        scheduler.stop();
        assert_eq!(scheduler.tick().await, None);
    }
}
