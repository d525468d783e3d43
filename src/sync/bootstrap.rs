//! Bootstrap poller
//!
//! The backend's scrape can lag a few seconds behind a fresh login, so an
//! empty first board is not trusted: retry with a fixed delay until the
//! board fills up or the attempt budget runs out.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::events::BootstrapOutcome;
use super::fetcher::{Snapshot, SnapshotFetcher};
use crate::config::SyncTimings;

pub struct BootstrapPoller {
    fetcher: SnapshotFetcher,
    /// Total fetches, including the first
    max_attempts: u32,
    delay: Duration,
}

impl BootstrapPoller {
    pub fn new(fetcher: SnapshotFetcher, max_attempts: u32, delay: Duration) -> Self {
        Self {
            fetcher,
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_timings(fetcher: SnapshotFetcher, timings: &SyncTimings) -> Self {
        Self::new(fetcher, timings.bootstrap_attempts, timings.bootstrap_delay)
    }

    /// Poll until a non-empty board, exhaustion or cancellation.
    ///
    /// `apply` receives every snapshot that resolved before cancellation,
    /// with its 1-based attempt number.
    pub async fn run<F>(
        &self,
        username: &str,
        cancel: &CancellationToken,
        mut apply: F,
    ) -> BootstrapOutcome
    where
        F: FnMut(u32, Snapshot),
    {
        for attempt in 1..=self.max_attempts {
            let snapshot = match self.fetcher.fetch(username, cancel).await {
                Ok(snapshot) => snapshot,
                Err(_) => {
                    return BootstrapOutcome::Cancelled { attempts: attempt };
                }
            };

            let populated = !snapshot.board.is_empty();
            tracing::debug!(attempt, populated, "Bootstrap attempt");
            apply(attempt, snapshot);

            if populated {
                return BootstrapOutcome::Populated { attempts: attempt };
            }
            if attempt == self.max_attempts {
                break;
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return BootstrapOutcome::Cancelled { attempts: attempt };
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        tracing::info!(attempts = self.max_attempts, "Board still empty after bootstrap");
        BootstrapOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}
