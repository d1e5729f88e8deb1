//! Query Runner (§4.3): rewrites `:fromTime`/`:toTime` placeholders offset by
//! the source's timezone, enforces a read-only connection, runs under a
//! per-run timeout, and returns rows shaped to the declared convention
//! (bucket timestamp, one numeric measure, 1..10 segment strings).

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use loadhub_sources::SourcePool;
use sqlx::{ColumnIndex, Decode, Row, Type};

/// A decoded row exactly as the source returned it: `bucket_timestamp` is
/// still in the source's local time (`sourceTimezoneOffsetHours` applied on
/// the way in); the Row Transformer, not this crate, converts it back to
/// UTC (§4.4 step 1).
#[derive(Debug, Clone)]
pub struct QueryRow {
    pub bucket_timestamp: DateTime<Utc>,
    pub measure: f64,
    pub segments: Vec<Option<String>>,
}

#[derive(Debug)]
pub enum RunnerError {
    /// The privilege inspector found the connection's user can write; the
    /// run aborts before any query executes (§4.3).
    NotReadOnly,
    QueryTimeout,
    Execution(anyhow::Error),
}

impl std::fmt::Display for RunnerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerError::NotReadOnly => write!(f, "source connection is not read-only"),
            RunnerError::QueryTimeout => write!(f, "query exceeded the per-run timeout"),
            RunnerError::Execution(e) => write!(f, "query execution failed: {e}"),
        }
    }
}

impl std::error::Error for RunnerError {}

/// Textual substitution of the declared placeholders with literal timestamps
/// shifted by `tz_offset_hours`, so the source sees times in its own local
/// frame without this crate needing driver-specific bind-parameter syntax
/// for a loader-supplied SQL string.
pub fn rewrite_sql(
    sql: &str,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
    tz_offset_hours: i32,
) -> String {
    let offset = Duration::hours(tz_offset_hours as i64);
    let from_literal = (from_time + offset).format("%Y-%m-%d %H:%M:%S");
    let to_literal = (to_time + offset).format("%Y-%m-%d %H:%M:%S");
    sql.replace(":fromTime", &format!("'{from_literal}'"))
        .replace(":toTime", &format!("'{to_literal}'"))
}

/// Attempts a write inside a transaction it always rolls back. A permission
/// failure on the attempt is the expected, healthy outcome for a read-only
/// credential; success means the credential can write and the run must not
/// proceed.
pub async fn verify_read_only(pool: &SourcePool) -> Result<(), RunnerError> {
    let probe_failed = match pool {
        SourcePool::Postgresql(pg) => {
            let mut tx = pg.begin().await.map_err(|e| RunnerError::Execution(e.into()))?;
            let result = sqlx::query("create temporary table loadhub_ro_probe (x int)")
                .execute(&mut *tx)
                .await;
            let _ = tx.rollback().await;
            result.is_err()
        }
        SourcePool::Mysql(my) => {
            let mut tx = my.begin().await.map_err(|e| RunnerError::Execution(e.into()))?;
            let result = sqlx::query("create temporary table loadhub_ro_probe (x int)")
                .execute(&mut *tx)
                .await;
            let _ = tx.rollback().await;
            result.is_err()
        }
    };

    if probe_failed {
        Ok(())
    } else {
        Err(RunnerError::NotReadOnly)
    }
}

/// Runs `sql` (after placeholder rewrite) against `pool` under
/// `query_timeout`, decoding each row as `(bucketTimestamp, measure,
/// segments[0..10])` per the declared column convention.
pub async fn run(
    pool: &SourcePool,
    sql: &str,
    from_time: DateTime<Utc>,
    to_time: DateTime<Utc>,
    tz_offset_hours: i32,
    query_timeout: StdDuration,
) -> Result<Vec<QueryRow>, RunnerError> {
    verify_read_only(pool).await?;

    let rewritten = rewrite_sql(sql, from_time, to_time, tz_offset_hours);

    let rows = match pool {
        SourcePool::Postgresql(pg) => {
            let fetch = sqlx::query(&rewritten).fetch_all(pg);
            match tokio::time::timeout(query_timeout, fetch).await {
                Ok(Ok(rows)) => rows.into_iter().map(decode_row).collect(),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("postgres source query failed")),
                Err(_) => return Err(RunnerError::QueryTimeout),
            }
        }
        SourcePool::Mysql(my) => {
            let fetch = sqlx::query(&rewritten).fetch_all(my);
            match tokio::time::timeout(query_timeout, fetch).await {
                Ok(Ok(rows)) => rows.into_iter().map(decode_row).collect(),
                Ok(Err(e)) => Err(anyhow::Error::new(e).context("mysql source query failed")),
                Err(_) => return Err(RunnerError::QueryTimeout),
            }
        }
    };

    rows.map_err(RunnerError::Execution)
}

/// Generic over both drivers: column 0 is the bucket timestamp, column 1
/// the numeric measure, everything after is a nullable segment string
/// (§4.3 row convention).
fn decode_row<R>(row: R) -> anyhow::Result<QueryRow>
where
    R: Row,
    usize: ColumnIndex<R>,
    DateTime<Utc>: Type<R::Database>,
    f64: Type<R::Database>,
    Option<String>: Type<R::Database>,
    for<'r> DateTime<Utc>: Decode<'r, R::Database>,
    for<'r> f64: Decode<'r, R::Database>,
    for<'r> Option<String>: Decode<'r, R::Database>,
{
    let column_count = row.columns().len();
    let bucket_timestamp: DateTime<Utc> = row.try_get(0)?;
    let measure: f64 = row.try_get(1)?;
    let mut segments = Vec::with_capacity(column_count.saturating_sub(2));
    for i in 2..column_count {
        segments.push(row.try_get::<Option<String>, _>(i)?);
    }
    Ok(QueryRow {
        bucket_timestamp,
        measure,
        segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_sql_substitutes_both_placeholders_with_offset() {
        let from: DateTime<Utc> = "2025-01-01T09:00:00Z".parse().unwrap();
        let to: DateTime<Utc> = "2025-01-01T10:00:00Z".parse().unwrap();
        let rewritten = rewrite_sql(
            "select bucket, v from t where ts >= :fromTime and ts < :toTime",
            from,
            to,
            -5,
        );
        assert!(rewritten.contains("'2025-01-01 04:00:00'"));
        assert!(rewritten.contains("'2025-01-01 05:00:00'"));
        assert!(!rewritten.contains(":fromTime"));
        assert!(!rewritten.contains(":toTime"));
    }
}
