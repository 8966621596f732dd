use crate::error::{AppError, Result};

pub const SPAPI_BASE_URL: &str = "http://127.0.0.1/spapi/offers/top2";
pub const USER_AGENT: &str = "trackerbundle-scheduler/1.0";

/// Upper bound (minutes) of the registration jitter window.
pub const MAX_JITTER_MINUTES: i64 = 60;

/// Longest accepted polling interval: 30 days.
pub const MAX_INTERVAL_MINUTES: i64 = 30 * 24 * 60;

/// Default offer ceiling multiplier: offer ceiling = limit * multiplier.
pub const DEFAULT_OFFER_MULTIPLIER: f64 = 1.30;

/// Fixed reschedule delays (minutes) per failure class. No exponential
/// backoff: watched items are polled at minute-to-day timescales.
pub mod cooldowns {
    /// Sold-stats lookups back off an hour after an application error.
    pub const SOLD_STATS_ERROR_MIN: i64 = 60;
    /// Single-item and offer lookups back off ten minutes.
    pub const ITEM_ERROR_MIN: i64 = 10;
    /// Kind registered but no client configured for it.
    pub const UNSUPPORTED_KIND_MIN: i64 = 60;
    /// Transport exception or timeout.
    pub const TRANSPORT_ERROR_MIN: i64 = 10;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub rules_path: String,
    pub api_port: u16,
    /// Seconds between scheduler ticks (SCHED_TICK_SECONDS)
    pub tick_seconds: u64,
    /// Max due items processed per tick (SCHED_BATCH_LIMIT)
    pub batch_limit: i64,
    /// Per-request provider timeout in seconds (SCHED_HTTP_TIMEOUT)
    pub http_timeout_secs: f64,
    pub user_agent: String,
    /// Offer lookup service for `asin` items (SPAPI_BASE_URL)
    pub spapi_base_url: String,
    /// Optional eBay single-item lookup service (EBAY_ITEM_URL)
    pub ebay_item_url: Option<String>,
    /// Optional eBay sold-stats service (EBAY_SOLD_URL)
    pub ebay_sold_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cfg = Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "watchlist.db".to_string()),
            rules_path: std::env::var("RULES_PATH").unwrap_or_else(|_| "rules.json".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            tick_seconds: std::env::var("SCHED_TICK_SECONDS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .map_err(|_| AppError::Config("SCHED_TICK_SECONDS must be an integer".to_string()))?,
            batch_limit: std::env::var("SCHED_BATCH_LIMIT")
                .unwrap_or_else(|_| "4".to_string())
                .parse::<i64>()
                .map_err(|_| AppError::Config("SCHED_BATCH_LIMIT must be an integer".to_string()))?,
            http_timeout_secs: std::env::var("SCHED_HTTP_TIMEOUT")
                .unwrap_or_else(|_| "20".to_string())
                .parse::<f64>()
                .map_err(|_| AppError::Config("SCHED_HTTP_TIMEOUT must be a number".to_string()))?,
            user_agent: std::env::var("SCHED_USER_AGENT").unwrap_or_else(|_| USER_AGENT.to_string()),
            spapi_base_url: std::env::var("SPAPI_BASE_URL")
                .unwrap_or_else(|_| SPAPI_BASE_URL.to_string()),
            ebay_item_url: optional_var("EBAY_ITEM_URL"),
            ebay_sold_url: optional_var("EBAY_SOLD_URL"),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_seconds == 0 {
            return Err(AppError::Config("SCHED_TICK_SECONDS must be > 0".to_string()));
        }
        if self.batch_limit <= 0 {
            return Err(AppError::Config("SCHED_BATCH_LIMIT must be > 0".to_string()));
        }
        if !(self.http_timeout_secs.is_finite() && self.http_timeout_secs > 0.0) {
            return Err(AppError::Config("SCHED_HTTP_TIMEOUT must be > 0".to_string()));
        }
        let urls = std::iter::once(("SPAPI_BASE_URL", Some(&self.spapi_base_url)))
            .chain([
                ("EBAY_ITEM_URL", self.ebay_item_url.as_ref()),
                ("EBAY_SOLD_URL", self.ebay_sold_url.as_ref()),
            ]);
        for (name, url) in urls {
            if let Some(url) = url {
                reqwest::Url::parse(url)
                    .map_err(|e| AppError::Config(format!("{name} is not a valid URL: {e}")))?;
            }
        }
        Ok(())
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
