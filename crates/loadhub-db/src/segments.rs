//! `signals_segment_combination` repository: the Segment Dictionary's
//! storage half (4.5). `intern` is safe under concurrent callers because
//! `uq_segment_combination_tuple` is the single source of truth — a losing
//! racer re-reads instead of retrying the insert.

use anyhow::{Context, Result};
use loadhub_schemas::{coalesce_segment, MAX_SEGMENTS};
use sqlx::{PgPool, Row};

fn segments_to_columns(segments: &[Option<String>; MAX_SEGMENTS]) -> [&str; MAX_SEGMENTS] {
    let mut out = [""; MAX_SEGMENTS];
    for (i, s) in segments.iter().enumerate() {
        out[i] = coalesce_segment(s.as_deref());
    }
    out
}

/// `intern(loaderCode, segments) -> segmentCode`. Tries to insert a fresh
/// row first (the common case — most tuples are new once and then hot);
/// on conflict, re-reads the existing code so both racers converge.
pub async fn intern(
    pool: &PgPool,
    loader_code: &str,
    segments: &[Option<String>; MAX_SEGMENTS],
) -> Result<i64> {
    let cols = segments_to_columns(segments);

    let existing: Option<(i64,)> = sqlx::query_as(
        r#"
        select segment_code from signals_segment_combination
        where loader_code = $1
          and coalesce(segment_1, E'\001__loadhub_null__') = $2
          and coalesce(segment_2, E'\001__loadhub_null__') = $3
          and coalesce(segment_3, E'\001__loadhub_null__') = $4
          and coalesce(segment_4, E'\001__loadhub_null__') = $5
          and coalesce(segment_5, E'\001__loadhub_null__') = $6
          and coalesce(segment_6, E'\001__loadhub_null__') = $7
          and coalesce(segment_7, E'\001__loadhub_null__') = $8
          and coalesce(segment_8, E'\001__loadhub_null__') = $9
          and coalesce(segment_9, E'\001__loadhub_null__') = $10
          and coalesce(segment_10, E'\001__loadhub_null__') = $11
        "#,
    )
    .bind(loader_code)
    .bind(cols[0])
    .bind(cols[1])
    .bind(cols[2])
    .bind(cols[3])
    .bind(cols[4])
    .bind(cols[5])
    .bind(cols[6])
    .bind(cols[7])
    .bind(cols[8])
    .bind(cols[9])
    .fetch_optional(pool)
    .await
    .context("intern existing-lookup failed")?;

    if let Some((code,)) = existing {
        return Ok(code);
    }

    let next_code: (i64,) = sqlx::query_as(
        "select coalesce(max(segment_code), 0) + 1 from signals_segment_combination where loader_code = $1",
    )
    .bind(loader_code)
    .fetch_one(pool)
    .await
    .context("intern next-code lookup failed")?;

    let result = sqlx::query(
        r#"
        insert into signals_segment_combination
            (loader_code, segment_code, segment_1, segment_2, segment_3, segment_4,
             segment_5, segment_6, segment_7, segment_8, segment_9, segment_10)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(loader_code)
    .bind(next_code.0)
    .bind(segments[0].as_deref())
    .bind(segments[1].as_deref())
    .bind(segments[2].as_deref())
    .bind(segments[3].as_deref())
    .bind(segments[4].as_deref())
    .bind(segments[5].as_deref())
    .bind(segments[6].as_deref())
    .bind(segments[7].as_deref())
    .bind(segments[8].as_deref())
    .bind(segments[9].as_deref())
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(next_code.0),
        Err(sqlx::Error::Database(db_err))
            if db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some("uq_segment_combination_tuple") =>
        {
            // Lost the race: a concurrent caller inserted the same tuple
            // first. Re-read to converge on its code (4.5 property iii).
            let row = sqlx::query(
                r#"
                select segment_code from signals_segment_combination
                where loader_code = $1
                  and coalesce(segment_1, E'\001__loadhub_null__') = $2
                  and coalesce(segment_2, E'\001__loadhub_null__') = $3
                  and coalesce(segment_3, E'\001__loadhub_null__') = $4
                  and coalesce(segment_4, E'\001__loadhub_null__') = $5
                  and coalesce(segment_5, E'\001__loadhub_null__') = $6
                  and coalesce(segment_6, E'\001__loadhub_null__') = $7
                  and coalesce(segment_7, E'\001__loadhub_null__') = $8
                  and coalesce(segment_8, E'\001__loadhub_null__') = $9
                  and coalesce(segment_9, E'\001__loadhub_null__') = $10
                  and coalesce(segment_10, E'\001__loadhub_null__') = $11
                "#,
            )
            .bind(loader_code)
            .bind(cols[0])
            .bind(cols[1])
            .bind(cols[2])
            .bind(cols[3])
            .bind(cols[4])
            .bind(cols[5])
            .bind(cols[6])
            .bind(cols[7])
            .bind(cols[8])
            .bind(cols[9])
            .fetch_one(pool)
            .await
            .context("intern conflict-reread failed")?;
            Ok(row.try_get("segment_code")?)
        }
        Err(e) => Err(anyhow::Error::new(e).context("intern insert failed")),
    }
}

pub async fn fetch_segments(
    pool: &PgPool,
    loader_code: &str,
    segment_code: i64,
) -> Result<Option<[Option<String>; MAX_SEGMENTS]>> {
    let row = sqlx::query(
        "select segment_1, segment_2, segment_3, segment_4, segment_5, segment_6, \
         segment_7, segment_8, segment_9, segment_10 \
         from signals_segment_combination where loader_code = $1 and segment_code = $2",
    )
    .bind(loader_code)
    .bind(segment_code)
    .fetch_optional(pool)
    .await
    .context("fetch_segments failed")?;

    let Some(row) = row else { return Ok(None) };
    Ok(Some([
        row.try_get("segment_1")?,
        row.try_get("segment_2")?,
        row.try_get("segment_3")?,
        row.try_get("segment_4")?,
        row.try_get("segment_5")?,
        row.try_get("segment_6")?,
        row.try_get("segment_7")?,
        row.try_get("segment_8")?,
        row.try_get("segment_9")?,
        row.try_get("segment_10")?,
    ]))
}
