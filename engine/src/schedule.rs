use std::time::Duration;

use tokio::time::{Instant, Interval, MissedTickBehavior};

/// A cancellable repeating timer meant to live inside a `tokio::select!` loop.
///
/// There is at most one underlying interval at a time: `schedule` drops the
/// old one before creating the new one, so two periods can never overlap.
/// While idle, `tick` never resolves.
#[derive(Debug, Default)]
pub struct PeriodicTimer {
    interval: Option<Interval>,
    period: Option<Duration>,
}

impl PeriodicTimer {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Cancel any running period and start a fresh one. The first tick fires
    /// one full `period` from now.
    pub fn schedule(&mut self, period: Duration) {
        self.cancel();
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
        self.period = Some(period);
    }

    /// Schedule only if idle or if `period` differs from the running one.
    /// Returns whether a reschedule happened.
    pub fn ensure(&mut self, period: Duration) -> bool {
        if self.period == Some(period) {
            return false;
        }
        self.schedule(period);
        true
    }

    pub fn cancel(&mut self) {
        self.interval = None;
        self.period = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.interval.is_some()
    }

    pub fn period(&self) -> Option<Duration> {
        self.period
    }

    pub async fn tick(&mut self) {
        match self.interval.as_mut() {
            Some(interval) => {
                interval.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
