//! Reconciliation sweeper
//!
//! Periodic background task that force-resolves payout requests stuck in
//! a non-terminal gateway state past the configured timeout: the
//! reservation is refunded and the request marked failed. Requests are
//! claimed with a conditional update, so multiple service instances can
//! run the sweeper concurrently without double-refunding, and the start
//! of each instance's schedule is jittered so a fleet does not sweep in
//! lock-step.

use crate::payouts::engine::PayoutEngine;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Outcome of a single sweep pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    /// Stuck requests returned by the scan.
    pub examined: usize,
    /// Requests this pass claimed and refunded.
    pub refunded: usize,
    /// Requests lost to a concurrent resolver (claim returned nothing).
    pub skipped: usize,
    /// Requests whose resolution errored; retried next pass.
    pub failed: usize,
}

pub struct Sweeper {
    engine: Arc<PayoutEngine>,
    interval: Duration,
    stuck_timeout: ChronoDuration,
    batch_size: i64,
}

impl Sweeper {
    pub fn new(engine: Arc<PayoutEngine>) -> Self {
        let config = engine.config().clone();
        Self {
            engine,
            interval: Duration::from_secs(config.sweep_interval_secs),
            stuck_timeout: ChronoDuration::hours(config.stuck_timeout_hours),
            batch_size: config.sweep_batch_size,
        }
    }

    /// The last-updated instant before which a request counts as stuck.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        cutoff_before(now, self.stuck_timeout)
    }

    /// Run the sweeper forever. Intended to be spawned as a background
    /// task at service start.
    pub async fn run(self) {
        // Jitter the first pass so horizontally-scaled instances spread
        // out; the per-item claim keeps overlapping passes safe anyway.
        let jitter_secs = rand::thread_rng().gen_range(0..=self.interval.as_secs() / 10);
        if jitter_secs > 0 {
            tokio::time::sleep(Duration::from_secs(jitter_secs)).await;
        }

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;
            match self.sweep_once().await {
                Ok(summary) => {
                    if summary.examined > 0 {
                        info!(
                            examined = summary.examined,
                            refunded = summary.refunded,
                            skipped = summary.skipped,
                            failed = summary.failed,
                            "reconciliation sweep completed"
                        );
                    }
                }
                Err(e) => {
                    error!("reconciliation sweep failed to scan: {}", e);
                }
            }
        }
    }

    /// One sweep pass. Each stuck request is resolved independently: one
    /// item's failure is recorded and the pass continues.
    pub async fn sweep_once(&self) -> Result<SweepSummary, crate::error::AppError> {
        let now = Utc::now();
        let cutoff = self.cutoff(now);
        let stuck = self
            .engine
            .payout_repository()
            .find_stuck(cutoff, self.batch_size)
            .await?;

        let mut summary = SweepSummary {
            examined: stuck.len(),
            ..SweepSummary::default()
        };

        for request in stuck {
            match self.engine.fail_stuck_request(request.id, cutoff).await {
                Ok(true) => summary.refunded += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(
                        payout_request_id = %request.id,
                        "failed to resolve stuck payout request: {}",
                        e
                    );
                }
            }
        }

        Ok(summary)
    }
}

/// A request whose `updated_at` is before this instant is stuck.
fn cutoff_before(now: DateTime<Utc>, timeout: ChronoDuration) -> DateTime<Utc> {
    now - timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_is_timeout_before_now() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        let cutoff = cutoff_before(now, ChronoDuration::hours(24));
        assert_eq!(cutoff, Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap());
    }

    #[test]
    fn summary_default_is_empty() {
        let summary = SweepSummary::default();
        assert_eq!(summary.examined, 0);
        assert_eq!(summary.refunded, 0);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.failed, 0);
    }
}
