//! Typed scheduler settings, `serde(default)`-backed the way the teacher's
//! `OrchestratorConfig::test_defaults()` seeds a usable config without
//! requiring every field to be spelled out.

use serde::{Deserialize, Serialize};

fn default_poll_interval_seconds() -> u64 {
    1
}

fn default_worker_pool_min() -> usize {
    10
}

fn default_worker_pool_max() -> usize {
    50
}

fn default_lookback_hours() -> i64 {
    24
}

fn default_query_timeout_seconds() -> u64 {
    30
}

fn default_stale_lock_multiplier() -> u32 {
    2
}

fn default_purge_strategy() -> loadhub_schemas::PurgeStrategy {
    loadhub_schemas::PurgeStrategy::SkipDuplicates
}

/// Everything the scheduler daemon needs that isn't a secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    #[serde(default = "default_worker_pool_min")]
    pub worker_pool_min: usize,

    #[serde(default = "default_worker_pool_max")]
    pub worker_pool_max: usize,

    #[serde(default = "default_lookback_hours")]
    pub default_lookback_hours: i64,

    #[serde(default = "default_query_timeout_seconds")]
    pub query_timeout_seconds: u64,

    /// The stale-lock threshold is this multiplier times the per-run
    /// timeout budget (`spec.md` §4.6: "default 2x the per-run timeout").
    #[serde(default = "default_stale_lock_multiplier")]
    pub stale_lock_multiplier: u32,

    #[serde(default = "default_purge_strategy")]
    pub default_purge_strategy: loadhub_schemas::PurgeStrategy,

    #[serde(default)]
    pub bind_addr: Option<String>,
}

impl SchedulerConfig {
    pub fn test_defaults() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            worker_pool_min: default_worker_pool_min(),
            worker_pool_max: default_worker_pool_max(),
            default_lookback_hours: default_lookback_hours(),
            query_timeout_seconds: default_query_timeout_seconds(),
            stale_lock_multiplier: default_stale_lock_multiplier(),
            default_purge_strategy: default_purge_strategy(),
            bind_addr: None,
        }
    }

    /// Stale-lock threshold in seconds, derived from the query timeout per
    /// the multiplier above.
    pub fn stale_lock_threshold_seconds(&self) -> u64 {
        self.query_timeout_seconds * self.stale_lock_multiplier as u64
    }

    pub fn from_json(value: &serde_json::Value) -> anyhow::Result<Self> {
        let scheduler_section = value.get("scheduler").cloned().unwrap_or(serde_json::json!({}));
        Ok(serde_json::from_value(scheduler_section)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = SchedulerConfig::test_defaults();
        assert!(cfg.worker_pool_min <= cfg.worker_pool_max);
        assert_eq!(cfg.stale_lock_threshold_seconds(), 60);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let value = serde_json::json!({"scheduler": {"worker_pool_max": 5}});
        let cfg = SchedulerConfig::from_json(&value).unwrap();
        assert_eq!(cfg.worker_pool_max, 5);
        assert_eq!(cfg.poll_interval_seconds, 1);
    }
}
