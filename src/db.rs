use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::RiskError;
use crate::models::HistoryRecord;

pub struct HistoryStore {
    pool: SqlitePool,
    retention: usize,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub async fn connect(database_url: &str, retention: usize) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open history database")?;

        Ok(Self {
            pool,
            retention: retention.max(1),
            write_lock: Mutex::new(()),
        })
    }

    pub async fn init_db(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    // Inserts one record and, in the same transaction, evicts rows that fall
    // outside the `retention` most recent by timestamp.
    pub async fn append(&self, record: &HistoryRecord) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO assessment_history (id, recorded_at, zone_name, probability, rainfall_mm)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id)
        .bind(record.timestamp.timestamp_micros())
        .bind(&record.zone_name)
        .bind(record.probability)
        .bind(record.rainfall_mm)
        .execute(&mut *tx)
        .await?;

        let evicted = sqlx::query(
            r#"
            DELETE FROM assessment_history
            WHERE seq NOT IN (
                SELECT seq FROM assessment_history
                ORDER BY recorded_at DESC, seq DESC
                LIMIT ?
            )
            "#,
        )
        .bind(self.retention as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if evicted > 0 {
            debug!(evicted, retention = self.retention, "evicted old history rows");
        }
        debug!(zone = %record.zone_name, probability = record.probability, "history appended");
        Ok(())
    }

    pub async fn recent(&self, limit: usize) -> anyhow::Result<Vec<HistoryRecord>> {
        if limit == 0 {
            return Err(RiskError::Validation("history limit must be positive".to_string()).into());
        }

        let rows = sqlx::query(
            r#"
            SELECT id, recorded_at, zone_name, probability, rainfall_mm
            FROM assessment_history
            ORDER BY recorded_at DESC, seq DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id")?;
            let recorded_at: i64 = row.try_get("recorded_at")?;
            records.push(HistoryRecord {
                id,
                timestamp: from_micros(recorded_at)?,
                zone_name: row.try_get("zone_name")?,
                probability: row.try_get("probability")?,
                rainfall_mm: row.try_get("rainfall_mm")?,
            });
        }

        Ok(records)
    }

    pub async fn len(&self) -> anyhow::Result<usize> {
        let count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM assessment_history")
            .fetch_one(&self.pool)
            .await?
            .try_get("count")?;
        Ok(count as usize)
    }

    pub async fn close(self) {
        self.pool.close().await;
        info!("history store closed");
    }
}

fn from_micros(micros: i64) -> anyhow::Result<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    DateTime::from_timestamp(secs, nanos).context("stored timestamp out of range")
}
