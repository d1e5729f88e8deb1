//! Time Window Calculator (§4.2) — a pure function, no IO. Works exclusively
//! in UTC; the timezone offset is the Query Runner's concern, not this one.

use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from_time: DateTime<Utc>,
    pub to_time: DateTime<Utc>,
}

pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// `fromTime = lastLoadTimestamp` if present and not in the future
/// (clock-skew guard treats a future watermark as a first run); else
/// `now - defaultLookback`. `toTime = min(fromTime + maxQueryPeriodSeconds,
/// now)`. Degenerate windows are widened to one second so the watermark
/// stays strictly monotone even when `now` barely exceeds `fromTime`.
pub fn compute(
    last_load_timestamp: Option<DateTime<Utc>>,
    max_query_period_seconds: i64,
    default_lookback_hours: i64,
    now: DateTime<Utc>,
) -> TimeWindow {
    let from_time = match last_load_timestamp {
        Some(t) if t <= now => t,
        _ => now - Duration::hours(default_lookback_hours),
    };

    let ideal_to = from_time + Duration::seconds(max_query_period_seconds);
    let mut to_time = ideal_to.min(now);

    if from_time >= to_time {
        tracing::warn!(
            from_time = %from_time,
            to_time = %to_time,
            "degenerate query window, widening to 1s to preserve watermark monotonicity"
        );
        to_time = from_time + Duration::seconds(1);
    }

    TimeWindow { from_time, to_time }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_run_uses_default_lookback() {
        let now: DateTime<Utc> = "2025-01-01T10:00:00Z".parse().unwrap();
        let w = compute(None, 3600, 24, now);
        assert_eq!(w.from_time, now - Duration::hours(24));
        assert_eq!(w.to_time, w.from_time + Duration::seconds(3600));
    }

    #[test]
    fn caps_to_time_at_now() {
        let now: DateTime<Utc> = "2025-01-01T10:00:00Z".parse().unwrap();
        let last = now - Duration::seconds(30);
        let w = compute(Some(last), 3600, 24, now);
        assert_eq!(w.from_time, last);
        assert_eq!(w.to_time, now);
    }

    #[test]
    fn future_watermark_is_treated_as_first_run() {
        let now: DateTime<Utc> = "2025-01-01T10:00:00Z".parse().unwrap();
        let future = now + Duration::hours(1);
        let w = compute(Some(future), 3600, 24, now);
        assert_eq!(w.from_time, now - Duration::hours(24));
    }

    #[test]
    fn degenerate_window_widens_to_one_second() {
        let now: DateTime<Utc> = "2025-01-01T10:00:00Z".parse().unwrap();
        let w = compute(Some(now), 3600, 24, now);
        assert_eq!(w.from_time, now);
        assert_eq!(w.to_time, now + Duration::seconds(1));
    }
}
