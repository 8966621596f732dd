use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::types::WatchKind;

/// Raw `watchlist` row as stored by SQLite (see migrations/0001_watchlist.sql).
#[derive(Debug, sqlx::FromRow)]
pub struct WatchRow {
    pub id: i64,
    pub key: String,
    pub kind: String,
    pub interval_minutes: i64,
    pub enabled: bool,
    pub next_run_at: i64,
    pub last_run_at: Option<i64>,
    pub last_status: Option<i64>,
    pub last_error: Option<String>,
    pub last_payload_json: Option<String>,
}

/// One tracked key with its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchItem {
    /// Insertion order; breaks ties between items due at the same second.
    pub id: i64,
    pub key: String,
    pub kind: WatchKind,
    pub interval_minutes: i64,
    pub enabled: bool,
    pub next_run_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_status: Option<i64>,
    pub last_error: Option<String>,
    pub last_payload: Option<serde_json::Value>,
}

impl TryFrom<WatchRow> for WatchItem {
    type Error = AppError;

    fn try_from(r: WatchRow) -> Result<Self> {
        let last_payload = r
            .last_payload_json
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;
        Ok(Self {
            id: r.id,
            kind: r.kind.parse()?,
            key: r.key,
            interval_minutes: r.interval_minutes,
            enabled: r.enabled,
            next_run_at: from_unix(r.next_run_at),
            last_run_at: r.last_run_at.map(from_unix),
            last_status: r.last_status,
            last_error: r.last_error,
            last_payload,
        })
    }
}

/// Outcome of one fetch attempt, written back by `WatchlistStore::mark_result`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchResult {
    pub status: Option<i64>,
    pub payload: Option<serde_json::Value>,
    pub error: Option<String>,
    /// Reschedule after this many minutes instead of the item's interval.
    pub force_delay_minutes: Option<i64>,
}

impl FetchResult {
    pub fn success(status: i64, payload: serde_json::Value) -> Self {
        Self {
            status: Some(status),
            payload: Some(payload),
            ..Default::default()
        }
    }

    pub fn failure(
        status: Option<i64>,
        payload: Option<serde_json::Value>,
        error: impl Into<String>,
        delay_minutes: i64,
    ) -> Self {
        Self {
            status,
            payload,
            error: Some(error.into()),
            force_delay_minutes: Some(delay_minutes),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
