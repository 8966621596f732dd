use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::{MAX_INTERVAL_MINUTES, MAX_JITTER_MINUTES};
use crate::db::models::{FetchResult, WatchItem, WatchRow};
use crate::error::{AppError, Result};
use crate::types::WatchKind;

const SELECT_COLUMNS: &str = "id, key, kind, interval_minutes, enabled, next_run_at, \
     last_run_at, last_status, last_error, last_payload_json";

/// Durable registry of watched keys. Sole writer of the `watchlist` table;
/// every operation is a single SQL statement, so concurrent API calls and the
/// scheduler never interleave a read-modify-write on the same row.
#[derive(Clone)]
pub struct WatchlistStore {
    pool: sqlx::SqlitePool,
}

impl WatchlistStore {
    pub fn new(pool: sqlx::SqlitePool) -> Self {
        Self { pool }
    }

    /// Register `key`, or update an existing registration in place.
    ///
    /// Re-registering updates kind and interval, re-enables the item and
    /// recomputes `next_run_at`; the `last_*` fields are kept. Without
    /// `start_in_minutes` the first run is delayed by a per-key jitter.
    pub async fn upsert(
        &self,
        key: &str,
        kind: WatchKind,
        interval_minutes: i64,
        start_in_minutes: Option<i64>,
    ) -> Result<WatchItem> {
        self.upsert_at(Utc::now(), key, kind, interval_minutes, start_in_minutes)
            .await
    }

    async fn upsert_at(
        &self,
        now: DateTime<Utc>,
        key: &str,
        kind: WatchKind,
        interval_minutes: i64,
        start_in_minutes: Option<i64>,
    ) -> Result<WatchItem> {
        if key.trim().is_empty() {
            return Err(AppError::InvalidArgument("key must not be empty".to_string()));
        }
        if !(1..=MAX_INTERVAL_MINUTES).contains(&interval_minutes) {
            return Err(AppError::InvalidArgument(format!(
                "interval_minutes must be between 1 and {MAX_INTERVAL_MINUTES}"
            )));
        }
        let start = match start_in_minutes {
            Some(m) if m < 0 => {
                return Err(AppError::InvalidArgument(
                    "start_in_minutes must be >= 0".to_string(),
                ))
            }
            Some(m) => m,
            None => jitter_minutes(key, interval_minutes),
        };
        let next_run_at = Duration::try_minutes(start)
            .and_then(|d| now.checked_add_signed(d))
            .ok_or_else(|| {
                AppError::InvalidArgument(format!("start_in_minutes out of range: {start}"))
            })?
            .timestamp();

        let sql = format!(
            r#"
            INSERT INTO watchlist (key, kind, interval_minutes, enabled, next_run_at)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(key) DO UPDATE SET
                kind = excluded.kind,
                interval_minutes = excluded.interval_minutes,
                enabled = 1,
                next_run_at = excluded.next_run_at
            RETURNING {SELECT_COLUMNS}
            "#
        );
        let row: WatchRow = sqlx::query_as(&sql)
            .bind(key)
            .bind(kind.as_str())
            .bind(interval_minutes)
            .bind(next_run_at)
            .fetch_one(&self.pool)
            .await?;

        info!(
            key = %key,
            kind = %kind,
            interval_minutes,
            start_in_minutes = start,
            "Watch item registered"
        );
        row.try_into()
    }

    pub async fn get(&self, key: &str) -> Result<Option<WatchItem>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM watchlist WHERE key = ?");
        let row: Option<WatchRow> = sqlx::query_as(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(WatchItem::try_from).transpose()
    }

    pub async fn set_enabled(&self, key: &str, enabled: bool) -> Result<()> {
        let res = sqlx::query("UPDATE watchlist SET enabled = ? WHERE key = ?")
            .bind(enabled)
            .bind(key)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("watch item '{key}'")));
        }
        info!(key = %key, enabled, "Watch item toggled");
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        let res = sqlx::query("DELETE FROM watchlist WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("watch item '{key}'")));
        }
        info!(key = %key, "Watch item deleted");
        Ok(())
    }

    /// Active, soon-due items first.
    pub async fn list_all(&self) -> Result<Vec<WatchItem>> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM watchlist ORDER BY enabled DESC, next_run_at ASC, id ASC"
        );
        let rows: Vec<WatchRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows.into_iter().map(WatchItem::try_from).collect()
    }

    /// Enabled items whose `next_run_at` has passed, oldest first, at most `limit`.
    pub async fn due_items(&self, limit: i64) -> Result<Vec<WatchItem>> {
        self.due_items_at(Utc::now(), limit).await
    }

    async fn due_items_at(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<WatchItem>> {
        let sql = format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM watchlist
            WHERE enabled = 1 AND next_run_at <= ?
            ORDER BY next_run_at ASC, id ASC
            LIMIT ?
            "#
        );
        let rows: Vec<WatchRow> = sqlx::query_as(&sql)
            .bind(now.timestamp())
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(WatchItem::try_from).collect()
    }

    /// Record a fetch attempt and reschedule. The interval is read and the
    /// row rewritten in one UPDATE. A key deleted mid-flight is a no-op.
    pub async fn mark_result(&self, key: &str, result: &FetchResult) -> Result<()> {
        self.mark_result_at(Utc::now(), key, result).await
    }

    async fn mark_result_at(&self, now: DateTime<Utc>, key: &str, result: &FetchResult) -> Result<()> {
        let now_s = now.timestamp();
        let payload = result
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let res = sqlx::query(
            r#"
            UPDATE watchlist
            SET last_run_at = ?,
                last_status = ?,
                last_error = ?,
                last_payload_json = ?,
                next_run_at = ? + COALESCE(?, interval_minutes) * 60
            WHERE key = ?
            "#,
        )
        .bind(now_s)
        .bind(result.status)
        .bind(result.error.as_deref())
        .bind(payload)
        .bind(now_s)
        .bind(result.force_delay_minutes)
        .bind(key)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            debug!(key = %key, "mark_result for unknown key ignored");
        }
        Ok(())
    }
}

/// Initial delay spreading registrations over `clamp(interval / 4, 1, 60)`
/// minutes. The phase comes from a stable hash of the key, so re-registering
/// the same key lands on the same offset.
pub fn jitter_minutes(key: &str, interval_minutes: i64) -> i64 {
    let window = (interval_minutes / 4).clamp(1, MAX_JITTER_MINUTES);
    (fnv1a64(key.as_bytes()) % window as u64) as i64
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |h, b| (h ^ u64::from(*b)).wrapping_mul(PRIME))
}
