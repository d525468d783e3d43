//! Refresh scheduler
//!
//! Two periodic actions run side by side once bootstrap hands over:
//! a countdown ticking down to the next refresh (observational only) and
//! the refresh itself, which resets the countdown every time it fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::events::{EventSink, SyncEvent};
use crate::config::SyncTimings;

#[derive(Clone)]
pub struct RefreshScheduler {
    period: Duration,
    tick: Duration,
    /// When the next scheduled refresh is due; `None` until the countdown starts
    deadline: Arc<Mutex<Option<Instant>>>,
    sink: EventSink,
}

impl RefreshScheduler {
    pub fn new(period: Duration, tick: Duration, sink: EventSink) -> Self {
        Self {
            period,
            tick,
            deadline: Arc::new(Mutex::new(None)),
            sink,
        }
    }

    pub fn from_timings(timings: &SyncTimings, sink: EventSink) -> Self {
        Self::new(timings.refresh_interval, timings.countdown_tick, sink)
    }

    /// Countdown window in seconds
    pub fn window(&self) -> u64 {
        self.period.as_secs()
    }

    /// Seconds left until the next scheduled refresh, rounded up
    pub fn remaining(&self) -> u64 {
        let Some(deadline) = *self.deadline.lock() else {
            return self.window();
        };
        let left = deadline.saturating_duration_since(Instant::now());
        let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
        secs.min(self.window())
    }

    fn reset(&self) {
        *self.deadline.lock() = Some(Instant::now() + self.period);
        self.sink.emit(SyncEvent::Countdown(self.window()));
    }

    /// Tick the countdown until cancelled.
    ///
    /// The value is derived from the refresh deadline, so a tick landing on
    /// the same instant as a refresh never skews it.
    pub async fn run_countdown(&self, cancel: CancellationToken) {
        self.reset();
        let mut ticker = interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sink.emit(SyncEvent::Countdown(self.remaining()));
                }
            }
        }
        tracing::trace!("Countdown stopped");
    }

    /// Run `cycle` every period until cancelled.
    ///
    /// The countdown resets when the timer fires, whatever the cycle's
    /// outcome. The first cycle runs one full period after start.
    pub async fn run_refresh<F, Fut>(&self, cancel: CancellationToken, mut cycle: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.reset();
                    cycle().await;
                }
            }
        }
        tracing::trace!("Refresh timer stopped");
    }
}
