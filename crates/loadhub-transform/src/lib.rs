//! Row Transformer (§4.4): UTC correction, segment interning via the
//! Segment Dictionary (§4.5, `loadhub-db::segments`), and same-bucket fold.

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use loadhub_query::QueryRow;
use loadhub_schemas::{SignalsHistory, MAX_SEGMENTS};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    rec_count: i64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn seed(value: f64) -> Self {
        Self {
            rec_count: 1,
            sum: value,
            min: value,
            max: value,
        }
    }

    fn fold(&mut self, value: f64) {
        self.rec_count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    fn avg(&self) -> f64 {
        self.sum / self.rec_count as f64
    }
}

fn to_segment_array(segments: &[Option<String>]) -> [Option<String>; MAX_SEGMENTS] {
    std::array::from_fn(|i| segments.get(i).cloned().flatten())
}

/// Output of [`transform`]: the folded candidates plus the observed
/// `bucketTimestamp` range (§3 `actualFromTime`/`actualToTime`), which is
/// the min/max of the *row* data actually seen — not the query window that
/// was asked for. `None` when no rows were returned.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub candidates: Vec<SignalsHistory>,
    pub observed_from_time: Option<DateTime<Utc>>,
    pub observed_to_time: Option<DateTime<Utc>>,
}

/// Folds the rows a single run's Query Runner produced into `SignalsHistory`
/// candidates, ordered by first sighting of their `(segmentCode,
/// bucketTimestamp)` key, and tracks the min/max observed `bucketTimestamp`
/// across every row regardless of which bucket it folded into.
/// `id`/`load_history_id`/`create_time` on each candidate are placeholders —
/// the ingest transaction assigns the real values.
pub async fn transform(
    pool: &PgPool,
    loader_code: &str,
    rows: Vec<QueryRow>,
    source_timezone_offset_hours: i32,
) -> Result<TransformOutcome> {
    let offset = Duration::hours(source_timezone_offset_hours as i64);

    let mut order: Vec<(i64, i64)> = Vec::new();
    let mut accumulators: HashMap<(i64, i64), Accumulator> = HashMap::new();
    let mut observed_from_time: Option<DateTime<Utc>> = None;
    let mut observed_to_time: Option<DateTime<Utc>> = None;

    for row in rows {
        let bucket_utc: DateTime<Utc> = row.bucket_timestamp - offset;
        observed_from_time = Some(observed_from_time.map_or(bucket_utc, |t: DateTime<Utc>| t.min(bucket_utc)));
        observed_to_time = Some(observed_to_time.map_or(bucket_utc, |t: DateTime<Utc>| t.max(bucket_utc)));

        let segments = to_segment_array(&row.segments);
        let segment_code = loadhub_db::segments::intern(pool, loader_code, &segments).await?;
        let key = (segment_code, bucket_utc.timestamp());

        accumulators
            .entry(key)
            .and_modify(|a| a.fold(row.measure))
            .or_insert_with(|| {
                order.push(key);
                Accumulator::seed(row.measure)
            });
    }

    let now = Utc::now();
    let candidates = order
        .into_iter()
        .map(|key @ (segment_code, load_timestamp)| {
            let a = accumulators[&key];
            SignalsHistory {
                id: Uuid::nil(),
                loader_code: loader_code.to_string(),
                load_timestamp,
                segment_code,
                rec_count: a.rec_count,
                min_val: a.min,
                max_val: a.max,
                avg_val: a.avg(),
                sum_val: a.sum,
                load_history_id: Uuid::nil(),
                create_time: now,
            }
        })
        .collect();

    Ok(TransformOutcome { candidates, observed_from_time, observed_to_time })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_folds_min_max_sum_and_avg() {
        let mut a = Accumulator::seed(1.0);
        a.fold(2.0);
        a.fold(3.0);
        assert_eq!(a.rec_count, 3);
        assert_eq!(a.sum, 6.0);
        assert_eq!(a.min, 1.0);
        assert_eq!(a.max, 3.0);
        assert_eq!(a.avg(), 2.0);
    }

    #[test]
    fn segment_array_pads_short_inputs_with_none() {
        let arr = to_segment_array(&[Some("A".to_string())]);
        assert_eq!(arr[0].as_deref(), Some("A"));
        assert!(arr[1].is_none());
        assert_eq!(arr.len(), MAX_SEGMENTS);
    }
}
