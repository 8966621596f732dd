use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::health::HealthState;
use crate::config::cooldowns;
use crate::db::{FetchResult, WatchItem, WatchlistStore};
use crate::error::{ProviderError, Result};
use crate::pricing::{decide_quote, QuoteDecision};
use crate::providers::{ProviderRegistry, ProviderResponse, Quote};
use crate::rules::RulesStore;
use crate::types::WatchKind;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub due: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Polls due watch items on a fixed tick. Fetches run one at a time; each
/// result is committed before the next fetch starts.
pub struct Scheduler {
    store: WatchlistStore,
    providers: ProviderRegistry,
    rules: Arc<RulesStore>,
    batch_limit: i64,
    tick: Duration,
    health: Arc<HealthState>,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        store: WatchlistStore,
        providers: ProviderRegistry,
        rules: Arc<RulesStore>,
        batch_limit: i64,
        tick: Duration,
        health: Arc<HealthState>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self { store, providers, rules, batch_limit, tick, health, shutdown }
    }

    pub async fn run(mut self) {
        info!(
            batch_limit = self.batch_limit,
            tick_secs = self.tick.as_secs(),
            "Scheduler started"
        );
        self.health.set_running(true);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let result = self.run_tick().await;
            if let Ok(stats) = &result {
                self.health
                    .record_tick(chrono::Utc::now().timestamp(), stats.succeeded, stats.failed);
            }
            match result {
                Ok(stats) if stats.due > 0 => info!(
                    due = stats.due,
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    "Scheduler tick: {} due, {} ok, {} failed",
                    stats.due, stats.succeeded, stats.failed,
                ),
                Ok(_) => {}
                Err(e) => error!("Scheduler tick error: {e}"),
            }

            // Shutdown is only observed between ticks, never mid-batch.
            tokio::select! {
                _ = tokio::time::sleep(self.tick) => {}
                res = self.shutdown.changed() => {
                    if res.is_err() {
                        break;
                    }
                }
            }
        }

        self.health.set_running(false);
        info!("Scheduler stopped");
    }

    /// Process one batch of due items.
    pub async fn run_tick(&self) -> Result<TickStats> {
        let due = self.store.due_items(self.batch_limit).await?;
        let mut stats = TickStats { due: due.len(), ..Default::default() };

        for item in &due {
            let result = self.process(item).await;
            if result.is_success() {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
                warn!(
                    key = %item.key,
                    kind = %item.kind,
                    status = ?result.status,
                    error = result.error.as_deref().unwrap_or(""),
                    delay_min = ?result.force_delay_minutes,
                    "Fetch failed, rescheduled with cooldown"
                );
            }

            if let Err(e) = self.store.mark_result(&item.key, &result).await {
                error!(key = %item.key, "Failed to record fetch result: {e}");
                continue;
            }

            if let Some(payload) = result.payload.as_ref().filter(|_| result.is_success()) {
                self.log_decisions(item, payload).await;
            }
        }

        Ok(stats)
    }

    async fn process(&self, item: &WatchItem) -> FetchResult {
        let Some(provider) = self.providers.get(item.kind) else {
            return FetchResult::failure(
                None,
                None,
                "kind_not_supported_yet",
                cooldowns::UNSUPPORTED_KIND_MIN,
            );
        };
        let outcome = provider.fetch(&item.key).await;
        classify(item.kind, outcome)
    }

    /// Follow-up on a fresh quote: resolve the item's limits and log the
    /// BUY/SKIP call for its best new and used offers.
    async fn log_decisions(&self, item: &WatchItem, payload: &serde_json::Value) {
        let quote = Quote::from_payload(payload);
        if quote.new_total.is_none() && quote.used_total.is_none() {
            return;
        }
        let rules = match self.rules.load().await {
            Ok(r) => r,
            Err(e) => {
                warn!(key = %item.key, "Rules unavailable, skipping decision: {e}");
                return;
            }
        };
        let QuoteDecision { new, used } = decide_quote(&rules, Some(&item.key), &quote);
        info!(
            key = %item.key,
            new_best = ?new.best_total,
            new_limit = ?new.limit,
            new_decision = %new.decision,
            used_best = ?used.best_total,
            used_limit = ?used.limit,
            used_decision = %used.decision,
            "Quote decision | new: {} | used: {}",
            new.decision, used.decision,
        );
    }
}

/// Turn a provider outcome into the result recorded on the watch item.
pub fn classify(
    kind: WatchKind,
    outcome: std::result::Result<ProviderResponse, ProviderError>,
) -> FetchResult {
    match outcome {
        Ok(resp) if resp.is_success() => {
            let status = i64::from(resp.status);
            FetchResult::success(status, resp.payload.unwrap_or_default())
        }
        Ok(resp) => {
            let error = resp
                .payload_error()
                .unwrap_or_else(|| format!("http_{}", resp.status));
            FetchResult::failure(
                Some(i64::from(resp.status)),
                resp.payload,
                error,
                error_cooldown(kind),
            )
        }
        Err(e) => FetchResult::failure(
            None,
            None,
            format!("exception:{}", e.class()),
            cooldowns::TRANSPORT_ERROR_MIN,
        ),
    }
}

/// Cooldown after an application-level error, per source.
pub fn error_cooldown(kind: WatchKind) -> i64 {
    match kind {
        WatchKind::EbaySold => cooldowns::SOLD_STATS_ERROR_MIN,
        WatchKind::EbayItem | WatchKind::Asin | WatchKind::Isbn => cooldowns::ITEM_ERROR_MIN,
    }
}
