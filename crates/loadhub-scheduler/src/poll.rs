//! Scheduler polling loop (`spec.md` §4.9): selects due ACTIVE loaders and
//! dispatches them onto a bounded worker pool. Mirrors the fire-and-forget
//! interval-loop shape of `loadhub-reaper::spawn`, gated on real scheduling
//! state instead of a bare timer.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use loadhub_executor::{execute_once, ExecutorConfig, RunOutcome};
use loadhub_schemas::state::is_backoff_elapsed;
use loadhub_schemas::{LoadStatus, Loader};
use tokio::sync::{Mutex, Semaphore};
use tracing::{info, warn};

use crate::state::AppState;

fn is_due(loader: &Loader, now: chrono::DateTime<Utc>) -> bool {
    match loader.load_status {
        LoadStatus::Failed => match loader.failed_since {
            None => true,
            Some(failed_since) => is_backoff_elapsed(loader.failed_retry_count, failed_since, now),
        },
        _ => match loader.last_load_timestamp {
            None => true,
            Some(ts) => (now - ts).num_seconds() >= loader.max_interval_seconds,
        },
    }
}

/// Spawns the polling loop as a detached background task — no cancellation
/// handle, lives as long as the process (same shape as `loadhub-reaper::spawn`).
pub fn spawn(state: Arc<AppState>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(StdDuration::from_secs(state.config.poll_interval_seconds.max(1)));
        let permits = Arc::new(Semaphore::new(state.config.worker_pool_max.max(1)));
        let active: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
        info!(poll_interval_seconds = state.config.poll_interval_seconds, "scheduler poll loop started");
        loop {
            ticker.tick().await;
            if let Err(err) = tick(&state, &permits, &active).await {
                warn!(error = %err, "scheduler tick failed");
            }
        }
    });
}

async fn tick(state: &Arc<AppState>, permits: &Arc<Semaphore>, active: &Arc<Mutex<HashSet<String>>>) -> anyhow::Result<()> {
    let now = Utc::now();
    let candidates = loadhub_db::loaders::list_schedulable(&state.db).await?;

    for loader in candidates {
        if !is_due(&loader, now) {
            continue;
        }

        {
            let mut guard = active.lock().await;
            if guard.contains(&loader.loader_code) {
                continue;
            }
            guard.insert(loader.loader_code.clone());
        }

        let Ok(permit) = Arc::clone(permits).try_acquire_owned() else {
            active.lock().await.remove(&loader.loader_code);
            break; // pool full this tick; remaining candidates wait for the next one
        };

        let state = Arc::clone(state);
        let active = Arc::clone(active);
        let loader_code = loader.loader_code.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let config = ExecutorConfig {
                query_timeout: StdDuration::from_secs(state.config.query_timeout_seconds),
                default_lookback_hours: state.config.default_lookback_hours,
            };
            let run_now = Utc::now();
            let result = execute_once(
                &state.db,
                &state.registry,
                &state.encryption_key,
                &loader,
                &state.replica_name,
                &config,
                run_now,
            )
            .await;

            match result {
                Ok(RunOutcome::Failed(message)) => warn!(loader_code = %loader_code, error = %message, "run failed"),
                Ok(_) => {}
                Err(err) => warn!(loader_code = %loader_code, error = %err, "execute_once errored"),
            }
            active.lock().await.remove(&loader_code);
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loadhub_schemas::{PurgeStrategy, VersionStatus};
    use uuid::Uuid;

    fn base_loader() -> Loader {
        Loader {
            id: Uuid::nil(),
            loader_code: "T".into(),
            loader_sql_encrypted: vec![],
            source_database_id: Uuid::nil(),
            min_interval_seconds: 60,
            max_interval_seconds: 300,
            max_query_period_seconds: 3600,
            max_parallel_executions: 1,
            source_timezone_offset_hours: 0,
            aggregation_period_seconds: None,
            purge_strategy: PurgeStrategy::SkipDuplicates,
            enabled: true,
            load_status: LoadStatus::Idle,
            last_load_timestamp: Some(Utc::now()),
            failed_since: None,
            consecutive_zero_record_runs: 0,
            failed_retry_count: 0,
            version_status: VersionStatus::Active,
            version_number: 1,
            parent_version_id: None,
            approval_status: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn never_run_loader_is_due() {
        let mut loader = base_loader();
        loader.last_load_timestamp = None;
        assert!(is_due(&loader, Utc::now()));
    }

    #[test]
    fn recently_run_loader_is_not_due() {
        let mut loader = base_loader();
        let now = Utc::now();
        loader.last_load_timestamp = Some(now - chrono::Duration::seconds(10));
        assert!(!is_due(&loader, now));
    }

    #[test]
    fn loader_past_its_interval_is_due() {
        let mut loader = base_loader();
        let now = Utc::now();
        loader.last_load_timestamp = Some(now - chrono::Duration::seconds(loader.max_interval_seconds + 1));
        assert!(is_due(&loader, now));
    }

    #[test]
    fn failed_loader_with_no_failed_since_is_due() {
        let mut loader = base_loader();
        loader.load_status = LoadStatus::Failed;
        loader.failed_since = None;
        assert!(is_due(&loader, Utc::now()));
    }

    #[test]
    fn failed_loader_within_backoff_window_is_not_due() {
        let mut loader = base_loader();
        let now = Utc::now();
        loader.load_status = LoadStatus::Failed;
        loader.failed_retry_count = 0;
        loader.failed_since = Some(now - chrono::Duration::seconds(5));
        assert!(!is_due(&loader, now));
    }

    #[test]
    fn failed_loader_past_backoff_window_is_due() {
        let mut loader = base_loader();
        let now = Utc::now();
        loader.load_status = LoadStatus::Failed;
        loader.failed_retry_count = 0;
        loader.failed_since = Some(now - chrono::Duration::seconds(31));
        assert!(is_due(&loader, now));
    }
}
