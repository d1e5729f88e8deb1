//! Background reaper loop: ticks `loadhub-coord::reap_stale` on an interval
//! so a crashed replica's held lock and orphaned RUNNING history row don't
//! wedge a loader forever (spec §4.6/§4.9's stale-lock normalization).
//!
//! The decision logic itself (which locks are stale, which histories are
//! orphaned) lives in `loadhub-coord::reap`; this crate only owns the timer
//! and the "run forever, log each tick" loop, the same shape as the
//! scheduler's heartbeat task.

use chrono::Duration as ChronoDuration;
use loadhub_coord::ReapReport;
use sqlx::PgPool;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// How often to run a reap pass.
    pub poll_interval: StdDuration,
    /// A held lock or RUNNING history row older than this is considered
    /// stale and reaped.
    pub stale_threshold: ChronoDuration,
}

impl ReaperConfig {
    pub fn new(poll_interval: StdDuration, stale_threshold: ChronoDuration) -> Self {
        Self { poll_interval, stale_threshold }
    }
}

/// Runs one reap pass against the current time. Exposed separately from
/// [`spawn`] so the CLI's `locks reap` subcommand and tests can invoke a
/// single pass without starting a timer.
pub async fn tick(pool: &PgPool, config: &ReaperConfig) -> anyhow::Result<ReapReport> {
    let now = chrono::Utc::now();
    let report = loadhub_coord::reap_stale(pool, config.stale_threshold, now).await?;
    if !report.locks_reaped.is_empty() || !report.histories_finalized.is_empty() {
        warn!(
            locks_reaped = report.locks_reaped.len(),
            histories_finalized = report.histories_finalized.len(),
            "reap pass found stale work"
        );
    }
    Ok(report)
}

/// Spawns the reaper as a detached background task — the same fire-and-forget
/// shape as the scheduler's SSE heartbeat. There is no cancellation handle;
/// the task lives as long as the process.
pub fn spawn(pool: PgPool, config: ReaperConfig) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(config.poll_interval);
        info!(poll_interval_secs = config.poll_interval.as_secs(), "reaper loop started");
        loop {
            ticker.tick().await;
            if let Err(err) = tick(&pool, &config).await {
                warn!(error = %err, "reap pass failed");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_carries_the_threshold_through_unchanged() {
        let config = ReaperConfig::new(StdDuration::from_secs(30), ChronoDuration::minutes(10));
        assert_eq!(config.poll_interval, StdDuration::from_secs(30));
        assert_eq!(config.stale_threshold, ChronoDuration::minutes(10));
    }
}
