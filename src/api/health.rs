//! Shared scheduler health for the /status endpoint.
//! Written by the scheduler after every tick, read by the API.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use serde::Serialize;

use crate::db::models::from_unix;

#[derive(Default)]
pub struct HealthState {
    /// True while the scheduler loop is running.
    pub scheduler_running: AtomicBool,
    /// Unix seconds of the last completed tick (0 = none yet).
    pub last_tick_at: AtomicI64,
    pub ticks: AtomicU64,
    pub fetched_ok: AtomicU64,
    pub fetched_failed: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub scheduler_running: bool,
    pub last_tick_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ticks: u64,
    pub fetched_ok: u64,
    pub fetched_failed: u64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_running(&self, v: bool) {
        self.scheduler_running.store(v, Ordering::Relaxed);
    }

    pub fn record_tick(&self, at_secs: i64, ok: usize, failed: usize) {
        self.last_tick_at.store(at_secs, Ordering::Relaxed);
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.fetched_ok.fetch_add(ok as u64, Ordering::Relaxed);
        self.fetched_failed.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_tick_at.load(Ordering::Relaxed);
        HealthSnapshot {
            scheduler_running: self.scheduler_running.load(Ordering::Relaxed),
            last_tick_at: (last > 0).then(|| from_unix(last)),
            ticks: self.ticks.load(Ordering::Relaxed),
            fetched_ok: self.fetched_ok.load(Ordering::Relaxed),
            fetched_failed: self.fetched_failed.load(Ordering::Relaxed),
        }
    }
}
