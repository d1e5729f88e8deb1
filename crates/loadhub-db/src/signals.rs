//! `signals_history` repository: the three atomic purge-strategy batch
//! writes of the Ingest Service (4.8).

use anyhow::{Context, Result};
use loadhub_schemas::SignalsHistory;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestCounts {
    pub inserted: i64,
    pub skipped: i64,
    pub deleted: i64,
}

/// Insert `candidates`; if any `(loaderCode, loadTimeStamp, segmentCode)` key
/// already exists, the whole batch fails and nothing is inserted.
pub async fn fail_on_duplicate(
    pool: &PgPool,
    loader_code: &str,
    load_history_id: Uuid,
    candidates: &[SignalsHistory],
) -> Result<IngestCounts> {
    let mut tx = pool.begin().await.context("fail_on_duplicate begin tx")?;

    for c in candidates {
        let result = sqlx::query(
            r#"
            insert into signals_history
                (loader_code, load_timestamp, segment_code, rec_count, min_val, max_val, avg_val, sum_val, load_history_id)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(loader_code)
        .bind(c.load_timestamp)
        .bind(c.segment_code)
        .bind(c.rec_count)
        .bind(c.min_val)
        .bind(c.max_val)
        .bind(c.avg_val)
        .bind(c.sum_val)
        .bind(load_history_id)
        .execute(&mut *tx)
        .await;

        if let Err(sqlx::Error::Database(db_err)) = &result {
            if db_err.code().as_deref() == Some("23505")
                && db_err.constraint() == Some("uq_signals_history_key")
            {
                anyhow::bail!(
                    "FAIL_ON_DUPLICATE: candidate ({}, {}, {}) already present",
                    loader_code,
                    c.load_timestamp,
                    c.segment_code
                );
            }
        }
        result.context("fail_on_duplicate insert failed")?;
    }

    tx.commit().await.context("fail_on_duplicate commit")?;
    Ok(IngestCounts {
        inserted: candidates.len() as i64,
        ..Default::default()
    })
}

/// Delete all existing rows in `[from_epoch, to_epoch)` for this loader, then
/// insert every candidate.
pub async fn purge_and_reload(
    pool: &PgPool,
    loader_code: &str,
    load_history_id: Uuid,
    from_epoch: i64,
    to_epoch: i64,
    candidates: &[SignalsHistory],
) -> Result<IngestCounts> {
    let mut tx = pool.begin().await.context("purge_and_reload begin tx")?;

    let deleted = sqlx::query(
        "delete from signals_history where loader_code = $1 and load_timestamp >= $2 and load_timestamp < $3",
    )
    .bind(loader_code)
    .bind(from_epoch)
    .bind(to_epoch)
    .execute(&mut *tx)
    .await
    .context("purge_and_reload delete failed")?
    .rows_affected() as i64;

    for c in candidates {
        sqlx::query(
            r#"
            insert into signals_history
                (loader_code, load_timestamp, segment_code, rec_count, min_val, max_val, avg_val, sum_val, load_history_id)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(loader_code)
        .bind(c.load_timestamp)
        .bind(c.segment_code)
        .bind(c.rec_count)
        .bind(c.min_val)
        .bind(c.max_val)
        .bind(c.avg_val)
        .bind(c.sum_val)
        .bind(load_history_id)
        .execute(&mut *tx)
        .await
        .context("purge_and_reload insert failed")?;
    }

    tx.commit().await.context("purge_and_reload commit")?;
    Ok(IngestCounts {
        inserted: candidates.len() as i64,
        deleted,
        ..Default::default()
    })
}

/// Insert candidates whose key is not already present; silently drop the
/// rest.
pub async fn skip_duplicates(
    pool: &PgPool,
    loader_code: &str,
    load_history_id: Uuid,
    candidates: &[SignalsHistory],
) -> Result<IngestCounts> {
    let mut tx = pool.begin().await.context("skip_duplicates begin tx")?;
    let mut inserted = 0i64;
    let mut skipped = 0i64;

    for c in candidates {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            insert into signals_history
                (loader_code, load_timestamp, segment_code, rec_count, min_val, max_val, avg_val, sum_val, load_history_id)
            values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            on conflict (loader_code, load_timestamp, segment_code) do nothing
            returning id
            "#,
        )
        .bind(loader_code)
        .bind(c.load_timestamp)
        .bind(c.segment_code)
        .bind(c.rec_count)
        .bind(c.min_val)
        .bind(c.max_val)
        .bind(c.avg_val)
        .bind(c.sum_val)
        .bind(load_history_id)
        .fetch_optional(&mut *tx)
        .await
        .context("skip_duplicates insert failed")?;

        if row.is_some() {
            inserted += 1;
        } else {
            skipped += 1;
        }
    }

    tx.commit().await.context("skip_duplicates commit")?;
    Ok(IngestCounts {
        inserted,
        skipped,
        ..Default::default()
    })
}

pub async fn query_window(
    pool: &PgPool,
    loader_code: &str,
    from_epoch: i64,
    to_epoch: i64,
) -> Result<Vec<SignalsHistory>> {
    let rows = sqlx::query(
        r#"
        select id, loader_code, load_timestamp, segment_code, rec_count, min_val,
               max_val, avg_val, sum_val, load_history_id, create_time
        from signals_history
        where loader_code = $1 and load_timestamp >= $2 and load_timestamp < $3
        order by load_timestamp asc, segment_code asc
        "#,
    )
    .bind(loader_code)
    .bind(from_epoch)
    .bind(to_epoch)
    .fetch_all(pool)
    .await
    .context("query_window failed")?;

    rows.into_iter()
        .map(|row| {
            Ok(SignalsHistory {
                id: row.try_get("id")?,
                loader_code: row.try_get("loader_code")?,
                load_timestamp: row.try_get("load_timestamp")?,
                segment_code: row.try_get("segment_code")?,
                rec_count: row.try_get("rec_count")?,
                min_val: row.try_get("min_val")?,
                max_val: row.try_get("max_val")?,
                avg_val: row.try_get("avg_val")?,
                sum_val: row.try_get("sum_val")?,
                load_history_id: row.try_get("load_history_id")?,
                create_time: row.try_get("create_time")?,
            })
        })
        .collect()
}
