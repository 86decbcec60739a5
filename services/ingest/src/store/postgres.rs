//! Postgres backend.

use super::{AuditSink, IngestStore, StoreError};
use crate::audit::AuditEvent;
use crate::mapping::BatchAccumulator;
use crate::model::{BatchStatus, RowError, UploadBatch, UploadKind};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

const BATCH_COLUMNS: &str =
    "id, kind, original_filename, uploaded_by, uploaded_at, status, row_count, error_count";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn account_count(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM account")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn batch_from_row(row: &PgRow) -> Result<UploadBatch, StoreError> {
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    Ok(UploadBatch {
        id: row.try_get("id")?,
        kind: kind
            .parse::<UploadKind>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        original_filename: row.try_get("original_filename")?,
        uploaded_by: row.try_get("uploaded_by")?,
        uploaded_at: row.try_get("uploaded_at")?,
        status: status
            .parse::<BatchStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?,
        row_count: row.try_get("row_count")?,
        error_count: row.try_get("error_count")?,
    })
}

fn error_from_row(row: &PgRow) -> Result<RowError, StoreError> {
    Ok(RowError {
        id: row.try_get("id")?,
        batch_id: row.try_get("batch_id")?,
        row_number: row.try_get("row_number")?,
        message: row.try_get("message")?,
        row_json: row.try_get("row_json")?,
        created_at: row.try_get("created_at")?,
    })
}

/// One array per column, for `UNNEST` inserts.
fn column<R, T>(rows: &[R], f: impl Fn(&R) -> T) -> Vec<T> {
    rows.iter().map(f).collect()
}

/// Keys in the order every transaction takes their unique-index locks.
/// Concurrent batches sharing keys would otherwise deadlock.
fn lock_order(keys: &[String]) -> Vec<String> {
    let mut keys = keys.to_vec();
    keys.sort_unstable();
    keys.dedup();
    keys
}

/// Why a guarded `UPDATE ... WHERE status = 'processing'` matched nothing.
async fn not_processing(tx: &mut Transaction<'_, Postgres>, batch_id: Uuid) -> StoreError {
    let status: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT status FROM upload_batch WHERE id = $1")
            .bind(batch_id)
            .fetch_optional(&mut **tx)
            .await;
    match status {
        Ok(Some(status)) => match status.parse::<BatchStatus>() {
            Ok(status) => StoreError::BatchFinished { id: batch_id, status },
            Err(e) => StoreError::Corrupt(e.to_string()),
        },
        Ok(None) => StoreError::UnknownBatch(batch_id),
        Err(e) => e.into(),
    }
}

async fn upsert_accounts(tx: &mut Transaction<'_, Postgres>, keys: &[String]) -> Result<u64, StoreError> {
    if keys.is_empty() {
        return Ok(0);
    }
    let keys = lock_order(keys);
    let ids: Vec<Uuid> = keys.iter().map(|_| Uuid::new_v4()).collect();
    let result = sqlx::query(
        r#"
        INSERT INTO account (id, external_key)
        SELECT * FROM UNNEST($1::uuid[], $2::text[])
        ON CONFLICT (external_key) DO NOTHING
        "#,
    )
    .bind(&ids)
    .bind(&keys)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

async fn insert_actuals(tx: &mut Transaction<'_, Postgres>, acc: &BatchAccumulator) -> Result<(), StoreError> {
    let facts = &acc.facts.actuals;
    if facts.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = facts.iter().map(|f| f.id).collect();
    let geographies: Vec<String> = facts.iter().map(|f| f.geography.clone()).collect();
    let products: Vec<String> = facts.iter().map(|f| f.product.clone()).collect();
    let weeks: Vec<NaiveDate> = facts.iter().map(|f| f.week_end_date).collect();
    let volumes: Vec<f64> = facts.iter().map(|f| f.volume).collect();

    sqlx::query(
        r#"
        INSERT INTO actuals_weekly_fact (id, batch_id, geography, product, week_end_date, volume)
        SELECT id, $1, geography, product, week_end_date, volume
        FROM UNNEST($2::uuid[], $3::text[], $4::text[], $5::date[], $6::float8[])
            AS t(id, geography, product, week_end_date, volume)
        "#,
    )
    .bind(acc.batch_id())
    .bind(&ids)
    .bind(&geographies)
    .bind(&products)
    .bind(&weeks)
    .bind(&volumes)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_promotions(tx: &mut Transaction<'_, Postgres>, acc: &BatchAccumulator) -> Result<(), StoreError> {
    let rows = &acc.facts.promotions;
    if rows.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO promotions_raw (
            id, batch_id, deal_id, promo_status, promo_type, call_point, ppg,
            promo_start_date, promo_end_date, cost_start_date, cost_end_date,
            scan_back_per_cs, tr_share_of_discount, forecasted_volume,
            circana_geography, route_to_market, row_json
        )
        SELECT id, $1, deal_id, promo_status, promo_type, call_point, ppg,
               promo_start_date, promo_end_date, cost_start_date, cost_end_date,
               scan_back_per_cs, tr_share_of_discount, forecasted_volume,
               circana_geography, route_to_market, row_json
        FROM UNNEST(
            $2::uuid[], $3::text[], $4::text[], $5::text[], $6::text[], $7::text[],
            $8::date[], $9::date[], $10::date[], $11::date[],
            $12::float8[], $13::float8[], $14::float8[],
            $15::text[], $16::text[], $17::jsonb[]
        ) AS t(
            id, deal_id, promo_status, promo_type, call_point, ppg,
            promo_start_date, promo_end_date, cost_start_date, cost_end_date,
            scan_back_per_cs, tr_share_of_discount, forecasted_volume,
            circana_geography, route_to_market, row_json
        )
        "#,
    )
    .bind(acc.batch_id())
    .bind(column(rows, |r| r.id))
    .bind(column(rows, |r| r.deal_id.clone()))
    .bind(column(rows, |r| r.promo_status.clone()))
    .bind(column(rows, |r| r.promo_type.clone()))
    .bind(column(rows, |r| r.call_point.clone()))
    .bind(column(rows, |r| r.ppg.clone()))
    .bind(column(rows, |r| r.promo_start_date))
    .bind(column(rows, |r| r.promo_end_date))
    .bind(column(rows, |r| r.cost_start_date))
    .bind(column(rows, |r| r.cost_end_date))
    .bind(column(rows, |r| r.scan_back_per_cs))
    .bind(column(rows, |r| r.tr_share_of_discount))
    .bind(column(rows, |r| r.forecasted_volume))
    .bind(column(rows, |r| r.circana_geography.clone()))
    .bind(column(rows, |r| r.route_to_market.clone()))
    .bind(column(rows, |r| r.row_json.clone()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_budget(tx: &mut Transaction<'_, Postgres>, acc: &BatchAccumulator) -> Result<(), StoreError> {
    let rows = &acc.facts.budget;
    if rows.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        INSERT INTO budget_raw (
            id, batch_id, call_point, ppg_item, weeks_text, weekly_volume_per_store,
            total_cases_budgeted, tr_share_of_discount, scan_back_per_case, tr_net_revenue, row_json
        )
        SELECT id, $1, call_point, ppg_item, weeks_text, weekly_volume_per_store,
               total_cases_budgeted, tr_share_of_discount, scan_back_per_case, tr_net_revenue, row_json
        FROM UNNEST(
            $2::uuid[], $3::text[], $4::text[], $5::text[], $6::float8[],
            $7::float8[], $8::float8[], $9::float8[], $10::float8[], $11::jsonb[]
        ) AS t(
            id, call_point, ppg_item, weeks_text, weekly_volume_per_store,
            total_cases_budgeted, tr_share_of_discount, scan_back_per_case, tr_net_revenue, row_json
        )
        "#,
    )
    .bind(acc.batch_id())
    .bind(column(rows, |r| r.id))
    .bind(column(rows, |r| r.call_point.clone()))
    .bind(column(rows, |r| r.ppg_item.clone()))
    .bind(column(rows, |r| r.weeks_text.clone()))
    .bind(column(rows, |r| r.weekly_volume_per_store))
    .bind(column(rows, |r| r.total_cases_budgeted))
    .bind(column(rows, |r| r.tr_share_of_discount))
    .bind(column(rows, |r| r.scan_back_per_case))
    .bind(column(rows, |r| r.tr_net_revenue))
    .bind(column(rows, |r| r.row_json.clone()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_row_errors(tx: &mut Transaction<'_, Postgres>, acc: &BatchAccumulator) -> Result<(), StoreError> {
    if acc.errors.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = acc.errors.iter().map(|_| Uuid::new_v4()).collect();
    let row_numbers: Vec<Option<i64>> = acc.errors.iter().map(|e| e.row_number).collect();
    let messages: Vec<String> = acc.errors.iter().map(|e| e.message.clone()).collect();
    let snapshots: Vec<Option<serde_json::Value>> = acc.errors.iter().map(|e| e.row_json.clone()).collect();

    sqlx::query(
        r#"
        INSERT INTO upload_error (id, batch_id, row_number, message, row_json)
        SELECT id, $1, row_number, message, row_json
        FROM UNNEST($2::uuid[], $3::int8[], $4::text[], $5::jsonb[])
            AS t(id, row_number, message, row_json)
        "#,
    )
    .bind(acc.batch_id())
    .bind(&ids)
    .bind(&row_numbers)
    .bind(&messages)
    .bind(&snapshots)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl IngestStore for PgStore {
    #[instrument(skip(self, batch), fields(batch_id = %batch.id))]
    async fn create_batch(&self, batch: &UploadBatch) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO upload_batch (id, kind, original_filename, uploaded_by, uploaded_at, status, row_count, error_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(batch.id)
        .bind(batch.kind.as_str())
        .bind(&batch.original_filename)
        .bind(&batch.uploaded_by)
        .bind(batch.uploaded_at)
        .bind(batch.status.as_str())
        .bind(batch.row_count)
        .bind(batch.error_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self, acc), fields(batch_id = %acc.batch_id()))]
    async fn commit_batch(&self, acc: &BatchAccumulator) -> Result<UploadBatch, StoreError> {
        let mut tx = self.pool.begin().await?;

        let new_accounts = upsert_accounts(&mut tx, acc.accounts.as_slice()).await?;
        insert_actuals(&mut tx, acc).await?;
        insert_promotions(&mut tx, acc).await?;
        insert_budget(&mut tx, acc).await?;
        insert_row_errors(&mut tx, acc).await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE upload_batch
            SET status = $2, row_count = $3, error_count = $4
            WHERE id = $1 AND status = 'processing'
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(acc.batch_id())
        .bind(BatchStatus::Processed.as_str())
        .bind(acc.row_count())
        .bind(acc.error_count())
        .fetch_optional(&mut *tx)
        .await?;
        let row = match row {
            Some(row) => row,
            None => return Err(not_processing(&mut tx, acc.batch_id()).await),
        };
        let batch = batch_from_row(&row)?;

        tx.commit().await?;
        debug!(new_accounts, rows = acc.row_count(), errors = acc.error_count(), "batch committed");
        Ok(batch)
    }

    #[instrument(skip(self, message))]
    async fn fail_batch(&self, batch_id: Uuid, message: &str) -> Result<UploadBatch, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE upload_batch
            SET status = $2, row_count = 0, error_count = 0
            WHERE id = $1 AND status = 'processing'
            RETURNING {BATCH_COLUMNS}
            "#
        ))
        .bind(batch_id)
        .bind(BatchStatus::Failed.as_str())
        .fetch_optional(&mut *tx)
        .await?;
        let row = match row {
            Some(row) => row,
            None => return Err(not_processing(&mut tx, batch_id).await),
        };
        let batch = batch_from_row(&row)?;

        sqlx::query("INSERT INTO upload_error (id, batch_id, row_number, message, row_json) VALUES ($1, $2, NULL, $3, NULL)")
            .bind(Uuid::new_v4())
            .bind(batch_id)
            .bind(message)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(batch)
    }

    async fn list_batches(&self, limit: i64) -> Result<Vec<UploadBatch>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {BATCH_COLUMNS} FROM upload_batch ORDER BY uploaded_at DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(batch_from_row).collect()
    }

    async fn get_batch(&self, batch_id: Uuid) -> Result<Option<UploadBatch>, StoreError> {
        let row = sqlx::query(&format!("SELECT {BATCH_COLUMNS} FROM upload_batch WHERE id = $1"))
            .bind(batch_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(batch_from_row).transpose()
    }

    async fn batch_errors(&self, batch_id: Uuid) -> Result<Vec<RowError>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, batch_id, row_number, message, row_json, created_at
            FROM upload_error
            WHERE batch_id = $1
            ORDER BY row_number ASC NULLS FIRST, created_at ASC
            "#,
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(error_from_row).collect()
    }
}

#[async_trait]
impl AuditSink for PgStore {
    async fn record(&self, event: &AuditEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, actor_subject, actor_email, source, action, entity_type, entity_id,
                correlation_id, metadata, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(event.id)
        .bind(&event.actor_subject)
        .bind(&event.actor_email)
        .bind(event.source.as_str())
        .bind(event.action)
        .bind(event.entity_type)
        .bind(event.entity_id.to_string())
        .bind(&event.correlation_id)
        .bind(&event.metadata)
        .bind(event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
