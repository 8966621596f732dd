//! Provider clients: one per marketplace source, keyed by `WatchKind`.
//!
//! Providers only move bytes. Deciding whether a response counts as a success
//! and how long to back off is the scheduler's job.

pub mod http;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::config::Config;
use crate::error::{ProviderError, Result};
use crate::types::WatchKind;

pub use http::HttpQuoteProvider;

/// Raw provider answer. `payload` is `None` when the body was not a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub status: u16,
    pub payload: Option<Value>,
}

impl ProviderResponse {
    /// Application-level error carried in the payload, if any.
    pub fn payload_error(&self) -> Option<String> {
        match self.payload.as_ref()?.get("error")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// 2xx, a JSON object body and no `error` field.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && self.payload.is_some() && self.payload_error().is_none()
    }
}

#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// Provider name for logging.
    fn name(&self) -> &str;

    /// Look up one key. `Err` only for transport failures.
    async fn fetch(&self, key: &str) -> std::result::Result<ProviderResponse, ProviderError>;
}

/// Normalized prices pulled out of a provider payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Quote {
    /// Cheapest total across everything in the payload.
    pub total: Option<f64>,
    pub new_total: Option<f64>,
    pub used_total: Option<f64>,
    pub currency: Option<String>,
}

impl Quote {
    /// Understands the offer-summary shape (`new.top2[0].total`,
    /// `used.top2[0].total`) and the single-listing shape (top-level `total`).
    pub fn from_payload(payload: &Value) -> Self {
        let best_of = |side: &str| {
            payload
                .get(side)
                .and_then(|s| s.get("top2"))
                .and_then(|t| t.as_array())
                .and_then(|a| a.first())
                .and_then(|o| o.get("total"))
                .and_then(as_f64)
        };
        let new_total = best_of("new");
        let used_total = best_of("used");

        let total = payload.get("total").and_then(as_f64).or_else(|| {
            [new_total, used_total]
                .into_iter()
                .flatten()
                .reduce(f64::min)
        });

        Self {
            total,
            new_total,
            used_total,
            currency: payload
                .get("currency")
                .and_then(|c| c.as_str())
                .map(|s| s.to_string()),
        }
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

/// Maps each watch kind to the client that serves it. Kinds without an entry
/// are quarantined by the scheduler as unsupported.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<WatchKind, Arc<dyn QuoteProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: WatchKind, provider: Arc<dyn QuoteProvider>) {
        self.providers.insert(kind, provider);
    }

    pub fn get(&self, kind: WatchKind) -> Option<&Arc<dyn QuoteProvider>> {
        self.providers.get(&kind)
    }

    pub fn kinds(&self) -> Vec<WatchKind> {
        let mut kinds: Vec<WatchKind> = self.providers.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// HTTP adapters for every source configured in the environment.
    pub fn from_config(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs_f64(cfg.http_timeout_secs))
            .user_agent(cfg.user_agent.clone())
            .build()?;

        let mut registry = Self::new();
        registry.register(
            WatchKind::Asin,
            Arc::new(HttpQuoteProvider::new("spapi-offers", client.clone(), &cfg.spapi_base_url, "asin")),
        );
        if let Some(url) = &cfg.ebay_item_url {
            registry.register(
                WatchKind::EbayItem,
                Arc::new(
                    HttpQuoteProvider::new("ebay-item", client.clone(), url, "item_id")
                        .with_failure_status(502),
                ),
            );
        }
        if let Some(url) = &cfg.ebay_sold_url {
            registry.register(
                WatchKind::EbaySold,
                Arc::new(
                    HttpQuoteProvider::new("ebay-sold", client.clone(), url, "keywords")
                        .with_failure_status(502),
                ),
            );
        }

        info!(kinds = ?registry.kinds(), "Provider clients configured");
        Ok(registry)
    }
}
