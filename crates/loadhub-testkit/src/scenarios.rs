//! S1-S6 scenario fixtures (`spec.md` §8). Each builder returns the inputs
//! a scenario needs; the expectations it names are checked here against
//! whichever pure function owns that piece of behavior — the parts that
//! need a live database (history rows, lock rows, signal inserts) are left
//! for integration tests run against a real Postgres instance.

use chrono::{DateTime, NaiveDateTime, Utc};
use loadhub_query::{compute_window, QueryRow};
use loadhub_schemas::state::{backoff_seconds_since, is_backoff_elapsed};
use loadhub_schemas::Loader;

use crate::fixtures;

fn at(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%SZ")
        .expect("valid fixture timestamp")
        .and_utc()
}

/// S1 — first run, happy path. `L1` has never run; the window calculator
/// must start from `now - defaultLookback` and the source rows carry three
/// one-minute buckets at distinct measures and segments.
pub struct FirstRun {
    pub loader: Loader,
    pub now: DateTime<Utc>,
    pub rows: Vec<QueryRow>,
}

pub fn s1_first_run() -> FirstRun {
    let loader = fixtures::first_run_loader("L1");
    let now = at("2025-01-01T10:00:00Z");
    let rows = vec![
        QueryRow { bucket_timestamp: at("2025-01-01T09:00:00Z"), measure: 1.0, segments: vec![Some("A".into())] },
        QueryRow { bucket_timestamp: at("2025-01-01T09:01:00Z"), measure: 2.0, segments: vec![Some("A".into())] },
        QueryRow { bucket_timestamp: at("2025-01-01T09:02:00Z"), measure: 3.0, segments: vec![Some("A".into())] },
    ];
    FirstRun { loader, now, rows }
}

/// S2 — zero-record run. Same loader as S1 after its first run completed,
/// polled again an hour later with no rows back from the source.
pub fn s2_zero_record_run() -> (Loader, DateTime<Utc>) {
    let mut loader = fixtures::loader("L1");
    loader.last_load_timestamp = Some(at("2025-01-01T10:00:00Z"));
    (loader, at("2025-01-01T11:00:00Z"))
}

/// S4 — crash mid-run. A FAILED loader whose backoff has not yet elapsed,
/// plus one where it has.
pub fn s4_backoff_fixtures() -> (Loader, Loader) {
    let now = at("2025-01-01T12:00:00Z");
    let retry_count = 2;
    let backoff = backoff_seconds_since(retry_count);
    let still_backing_off = fixtures::failed_loader("L1", now - chrono::Duration::seconds(backoff - 5), retry_count);
    let eligible_again = fixtures::failed_loader("L1", now - chrono::Duration::seconds(backoff + 5), retry_count);
    (still_backing_off, eligible_again)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_window_starts_at_default_lookback_when_watermark_is_null() {
        let s1 = s1_first_run();
        let window = compute_window(s1.loader.last_load_timestamp, s1.loader.max_query_period_seconds, 24, s1.now);
        assert_eq!(window.from_time, s1.now - chrono::Duration::hours(24));
        assert_eq!(s1.rows.len(), 3);
    }

    #[test]
    fn s2_window_resumes_from_the_s1_watermark() {
        let (loader, now) = s2_zero_record_run();
        let window = compute_window(loader.last_load_timestamp, loader.max_query_period_seconds, 24, now);
        assert_eq!(window.from_time, at("2025-01-01T10:00:00Z"));
        assert_eq!(window.to_time, now);
    }

    #[test]
    fn s4_backoff_not_yet_elapsed_blocks_scheduling() {
        let (still_backing_off, _) = s4_backoff_fixtures();
        let now = at("2025-01-01T12:00:00Z");
        assert!(!is_backoff_elapsed(still_backing_off.failed_retry_count, still_backing_off.failed_since.unwrap(), now));
    }

    #[test]
    fn s4_backoff_elapsed_makes_the_loader_eligible_again() {
        let (_, eligible_again) = s4_backoff_fixtures();
        let now = at("2025-01-01T12:00:00Z");
        assert!(is_backoff_elapsed(eligible_again.failed_retry_count, eligible_again.failed_since.unwrap(), now));
    }
}
