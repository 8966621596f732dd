use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::db::{WatchItem, WatchlistStore};
use crate::error::{AppError, Result};
use crate::pricing::quote::SideDecision;
use crate::pricing::summary::{ListingSummary, SoldSummary};
use crate::pricing::{
    analyze_listings, analyze_sold_items, calculate_all_limits, condition_sold_average,
    decide_quote, evaluate_listings, money_int, AllLimits, LimitConfig,
};
use crate::config::DEFAULT_OFFER_MULTIPLIER;
use crate::providers::{ProviderRegistry, Quote};
use crate::rules::model::{RuleDefaults, RuleOverride};
use crate::rules::{EffectiveLimit, LimitsUpdate, RulesConfig, RulesStore};
use crate::types::{ConditionType, ItemDecision, ListingItem, SoldItem, WatchKind};

#[derive(Clone)]
pub struct ApiState {
    pub store: WatchlistStore,
    pub rules: Arc<RulesStore>,
    pub providers: ProviderRegistry,
    pub health: Arc<HealthState>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/status", get(get_status))
        .route("/watchlist", get(list_watchlist).post(upsert_watch))
        .route("/watchlist/:key", patch(set_watch_enabled).delete(delete_watch))
        .route("/rules", get(get_rules))
        .route("/rules/defaults", post(update_defaults))
        .route("/rules/effective", get(get_effective_limit))
        .route(
            "/rules/:key",
            get(get_override).put(put_override).delete(delete_override),
        )
        .route("/ebay/limits", post(ebay_limits))
        .route("/ebay/decide", post(ebay_decide))
        .route("/ebay/summary", post(ebay_summary))
        .route("/ebay/sold_avg", post(ebay_sold_avg))
        .route("/decide/asin", get(decide_asin))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Key handling
// ---------------------------------------------------------------------------

/// Keep ASCII letters and digits only, upper-cased.
pub fn clean_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Guess the watch kind of a cleaned key. ISBN-10s are checked before ASINs
/// since every ISBN-10 is also a syntactically valid ASIN.
pub fn infer_kind(key: &str) -> Result<WatchKind> {
    let is_isbn_char = |c: char| c.is_ascii_digit() || c == 'X';
    match key.len() {
        10 if key.chars().all(is_isbn_char) => Ok(WatchKind::Isbn),
        10 if key.chars().all(|c| c.is_ascii_alphanumeric()) => Ok(WatchKind::Asin),
        13 if key.chars().all(|c| c.is_ascii_digit()) => Ok(WatchKind::Isbn),
        _ => Err(AppError::InvalidArgument(
            "key must be a valid ASIN(10) or ISBN(10/13)".to_string(),
        )),
    }
}

// ---------------------------------------------------------------------------
// Request structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct WatchUpsert {
    pub key: String,
    pub interval_minutes: i64,
    pub kind: Option<String>,
    pub start_in_minutes: Option<i64>,
}

#[derive(Deserialize)]
pub struct WatchEnable {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Deserialize)]
pub struct EffectiveQuery {
    #[serde(alias = "isbn")]
    pub key: Option<String>,
    pub condition: String,
}

#[derive(Deserialize)]
pub struct DecideRequest {
    pub isbn: Option<String>,
    pub new_limit: f64,
    pub good_limit: f64,
    #[serde(default)]
    pub listings: Vec<ListingItem>,
    #[serde(default = "default_true")]
    pub enable_offers: bool,
    #[serde(default = "default_offer_multiplier")]
    pub offer_multiplier: f64,
}

#[derive(Deserialize)]
pub struct SummaryRequest {
    pub isbn: String,
    pub new_limit: f64,
    pub good_limit: f64,
    #[serde(default)]
    pub listings: Vec<ListingItem>,
    #[serde(default)]
    pub sold: Vec<SoldItem>,
    #[serde(default)]
    pub detailed_sold: bool,
}

#[derive(Deserialize)]
pub struct SoldAvgRequest {
    pub condition: ConditionType,
    #[serde(default)]
    pub sold: Vec<SoldItem>,
}

#[derive(Deserialize)]
pub struct DecideAsinQuery {
    pub asin: String,
    pub isbn: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_offer_multiplier() -> f64 {
    DEFAULT_OFFER_MULTIPLIER
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub ok: bool,
    pub scheduler: HealthSnapshot,
    pub providers: Vec<WatchKind>,
    pub watch_total: usize,
    pub watch_enabled: usize,
}

#[derive(Serialize)]
pub struct WatchlistResponse {
    pub count: usize,
    pub items: Vec<WatchItem>,
}

#[derive(Serialize)]
pub struct DecideResponse {
    pub isbn: Option<String>,
    pub limits: AllLimits,
    pub decisions: Vec<ItemDecision>,
}

#[derive(Serialize)]
pub struct SummaryResponse {
    pub isbn: String,
    pub limits: AllLimits,
    pub active: ListingSummary,
    pub sold: SoldSummary,
}

#[derive(Serialize)]
pub struct SoldAvgResponse {
    pub condition: ConditionType,
    pub sold_avg_total: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct QuoteSide {
    #[serde(flatten)]
    pub decision: SideDecision,
    pub top2: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct DecideAsinResponse {
    pub asin: String,
    pub isbn: Option<String>,
    pub marketplace_id: Option<String>,
    pub new: QuoteSide,
    pub used: QuoteSide,
}

// ---------------------------------------------------------------------------
// Handlers: service
// ---------------------------------------------------------------------------

async fn get_health() -> Json<Value> {
    Json(json!({ "ok": true }))
}

async fn get_status(State(state): State<ApiState>) -> Result<Json<StatusResponse>> {
    let items = state.store.list_all().await?;
    Ok(Json(StatusResponse {
        ok: true,
        scheduler: state.health.snapshot(),
        providers: state.providers.kinds(),
        watch_total: items.len(),
        watch_enabled: items.iter().filter(|i| i.enabled).count(),
    }))
}

// ---------------------------------------------------------------------------
// Handlers: watchlist
// ---------------------------------------------------------------------------

async fn list_watchlist(State(state): State<ApiState>) -> Result<Json<WatchlistResponse>> {
    let items = state.store.list_all().await?;
    Ok(Json(WatchlistResponse { count: items.len(), items }))
}

async fn upsert_watch(
    State(state): State<ApiState>,
    Json(req): Json<WatchUpsert>,
) -> Result<Json<WatchItem>> {
    let key = clean_key(&req.key);
    let kind = match req.kind.as_deref() {
        Some(k) => k.parse()?,
        None => infer_kind(&key)?,
    };
    let item = state
        .store
        .upsert(&key, kind, req.interval_minutes, req.start_in_minutes)
        .await?;
    Ok(Json(item))
}

async fn set_watch_enabled(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Json(req): Json<WatchEnable>,
) -> Result<Json<WatchItem>> {
    let key = clean_key(&key);
    state.store.set_enabled(&key, req.enabled).await?;
    let item = state
        .store
        .get(&key)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("watch item '{key}'")))?;
    Ok(Json(item))
}

async fn delete_watch(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    let key = clean_key(&key);
    state.store.delete(&key).await?;
    Ok(Json(json!({ "ok": true, "key": key })))
}

// ---------------------------------------------------------------------------
// Handlers: rules
// ---------------------------------------------------------------------------

async fn get_rules(State(state): State<ApiState>) -> Result<Json<RulesConfig>> {
    Ok(Json(state.rules.load().await?))
}

async fn update_defaults(
    State(state): State<ApiState>,
    Json(update): Json<LimitsUpdate>,
) -> Result<Json<RuleDefaults>> {
    Ok(Json(state.rules.set_defaults(&update).await?))
}

async fn get_override(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<RuleOverride>> {
    state
        .rules
        .get_override(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("no override for '{key}'")))
}

async fn put_override(
    State(state): State<ApiState>,
    Path(key): Path<String>,
    Json(update): Json<LimitsUpdate>,
) -> Result<Json<RuleOverride>> {
    Ok(Json(state.rules.set_override(&key, &update).await?))
}

async fn delete_override(
    State(state): State<ApiState>,
    Path(key): Path<String>,
) -> Result<Json<Value>> {
    state.rules.delete_override(&key).await?;
    Ok(Json(json!({ "ok": true, "key": key })))
}

async fn get_effective_limit(
    State(state): State<ApiState>,
    Query(q): Query<EffectiveQuery>,
) -> Result<Json<EffectiveLimit>> {
    let limit = state
        .rules
        .effective_limit(q.key.as_deref(), &q.condition)
        .await?;
    Ok(Json(limit))
}

// ---------------------------------------------------------------------------
// Handlers: listing pricing
// ---------------------------------------------------------------------------

fn limits_from(new_limit: f64, good_limit: f64) -> Result<AllLimits> {
    if !(new_limit > 0.0 && good_limit > 0.0) {
        return Err(AppError::InvalidArgument(
            "new_limit and good_limit must be > 0".to_string(),
        ));
    }
    Ok(calculate_all_limits(LimitConfig { new_limit, good_limit }))
}

async fn ebay_limits(Json(cfg): Json<LimitConfig>) -> Result<Json<AllLimits>> {
    Ok(Json(limits_from(cfg.new_limit, cfg.good_limit)?))
}

async fn ebay_decide(Json(req): Json<DecideRequest>) -> Result<Json<DecideResponse>> {
    let limits = limits_from(req.new_limit, req.good_limit)?;
    let decisions = evaluate_listings(
        &req.listings,
        &limits,
        req.enable_offers,
        req.offer_multiplier,
    )?;
    Ok(Json(DecideResponse { isbn: req.isbn, limits, decisions }))
}

async fn ebay_summary(Json(req): Json<SummaryRequest>) -> Result<Json<SummaryResponse>> {
    let limits = limits_from(req.new_limit, req.good_limit)?;
    Ok(Json(SummaryResponse {
        isbn: req.isbn,
        limits,
        active: analyze_listings(&req.listings),
        sold: analyze_sold_items(&req.sold, req.detailed_sold),
    }))
}

async fn ebay_sold_avg(Json(req): Json<SoldAvgRequest>) -> Json<SoldAvgResponse> {
    Json(SoldAvgResponse {
        condition: req.condition,
        sold_avg_total: condition_sold_average(&req.sold, req.condition),
    })
}

// ---------------------------------------------------------------------------
// Handlers: live marketplace decision
// ---------------------------------------------------------------------------

async fn decide_asin(
    State(state): State<ApiState>,
    Query(q): Query<DecideAsinQuery>,
) -> Result<Json<DecideAsinResponse>> {
    let asin = clean_key(&q.asin);
    let provider = state
        .providers
        .get(WatchKind::Asin)
        .ok_or_else(|| AppError::UnsupportedKind(WatchKind::Asin.to_string()))?;

    let resp = provider.fetch(&asin).await?;
    let payload = match resp.payload {
        Some(ref p) if resp.is_success() => p.clone(),
        _ => {
            let detail = resp
                .payload_error()
                .unwrap_or_else(|| format!("http_{}", resp.status));
            return Err(AppError::Upstream(format!(
                "{} status {}: {detail}",
                provider.name(),
                resp.status
            )));
        }
    };

    // Limits are keyed by ISBN when one is given, otherwise by the ASIN.
    let rules = state.rules.load().await?;
    let rule_key = q.isbn.as_deref().unwrap_or(&asin);
    let decision = decide_quote(&rules, Some(rule_key), &Quote::from_payload(&payload));

    Ok(Json(DecideAsinResponse {
        marketplace_id: payload
            .get("marketplaceId")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        new: QuoteSide { decision: decision.new, top2: whole_unit_offers(&payload, "new") },
        used: QuoteSide { decision: decision.used, top2: whole_unit_offers(&payload, "used") },
        asin,
        isbn: q.isbn,
    }))
}

/// The side's top offers with `total`, `price` and `ship` rounded to whole units.
fn whole_unit_offers(payload: &Value, side: &str) -> Vec<Value> {
    let offers = payload
        .get(side)
        .and_then(|s| s.get("top2"))
        .and_then(|t| t.as_array())
        .cloned()
        .unwrap_or_default();

    offers
        .into_iter()
        .filter_map(|mut offer| {
            let obj = offer.as_object_mut()?;
            for field in ["total", "price", "ship"] {
                if let Some(v) = obj.get_mut(field) {
                    let rounded = v
                        .as_f64()
                        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                        .and_then(money_int);
                    *v = rounded.map_or(Value::Null, Value::from);
                }
            }
            Some(offer)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::error::ProviderError;
    use crate::providers::{ProviderResponse, QuoteProvider};
    use crate::types::DecisionType;
    use async_trait::async_trait;

    struct FixedOffers(Value);

    #[async_trait]
    impl QuoteProvider for FixedOffers {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn fetch(&self, _key: &str) -> std::result::Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse { status: 200, payload: Some(self.0.clone()) })
        }
    }

    /// Handler state over an in-memory database and a rules file in a temp
    /// dir that lives as long as the returned guard.
    async fn state(providers: ProviderRegistry) -> (ApiState, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = ApiState {
            store: WatchlistStore::new(test_pool().await),
            rules: Arc::new(RulesStore::new(dir.path().join("rules.json"))),
            providers,
            health: Arc::new(HealthState::new()),
        };
        (state, dir)
    }

    #[test]
    fn clean_key_strips_punctuation_and_upcases() {
        assert_eq!(clean_key(" 0-13-110362-x "), "013110362X");
        assert_eq!(clean_key("b00abc1234"), "B00ABC1234");
    }

    #[test]
    fn infer_kind_by_shape() {
        assert_eq!(infer_kind("013110362X").unwrap(), WatchKind::Isbn);
        assert_eq!(infer_kind("0131103628").unwrap(), WatchKind::Isbn);
        assert_eq!(infer_kind("B00ABC1234").unwrap(), WatchKind::Asin);
        assert_eq!(infer_kind("9780131103627").unwrap(), WatchKind::Isbn);
        assert!(matches!(infer_kind("978013110362X"), Err(AppError::InvalidArgument(_))));
        assert!(matches!(infer_kind("ABC"), Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn upsert_infers_kind_and_cleans_key() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        let req = WatchUpsert {
            key: "b00-abc-1234".into(),
            interval_minutes: 30,
            kind: None,
            start_in_minutes: Some(0),
        };
        let Json(item) = upsert_watch(State(st.clone()), Json(req)).await.unwrap();
        assert_eq!(item.key, "B00ABC1234");
        assert_eq!(item.kind, WatchKind::Asin);

        let Json(list) = list_watchlist(State(st)).await.unwrap();
        assert_eq!(list.count, 1);
    }

    #[tokio::test]
    async fn upsert_rejects_unknown_kind() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        let req = WatchUpsert {
            key: "B00ABC1234".into(),
            interval_minutes: 30,
            kind: Some("walmart".into()),
            start_in_minutes: None,
        };
        let err = upsert_watch(State(st), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn patch_returns_updated_item() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        st.store.upsert("B00ABC1234", WatchKind::Asin, 30, Some(0)).await.unwrap();

        let Json(item) = set_watch_enabled(
            State(st.clone()),
            Path("b00abc1234".into()),
            Json(WatchEnable { enabled: false }),
        )
        .await
        .unwrap();
        assert!(!item.enabled);
    }

    #[tokio::test]
    async fn override_round_trip_through_handlers() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        let update: LimitsUpdate = serde_json::from_value(json!({"used": {"good": 12.0}})).unwrap();
        let Json(stored) =
            put_override(State(st.clone()), Path("978-0131103627".into()), Json(update))
                .await
                .unwrap();
        assert_eq!(stored.used.good, Some(12.0));

        let Json(over) = get_override(State(st.clone()), Path("9780131103627".into()))
            .await
            .unwrap();
        assert_eq!(over.used.good, Some(12.0));

        let q = EffectiveQuery { key: Some("9780131103627".into()), condition: "Used Good".into() };
        let Json(eff) = get_effective_limit(State(st.clone()), Query(q)).await.unwrap();
        assert_eq!(eff.source, "override.used.good");

        let Json(deleted) = delete_override(State(st.clone()), Path("9780131103627".into()))
            .await
            .unwrap();
        assert_eq!(deleted["ok"], json!(true));
        let err = get_override(State(st), Path("9780131103627".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn lower_case_rule_key_applies_to_cleaned_watch_key() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        let update = LimitsUpdate { used_all_max: Some(9.0), ..Default::default() };
        let Json(stored) = put_override(State(st.clone()), Path("013110362x".into()), Json(update))
            .await
            .unwrap();
        assert_eq!(stored.used_all_max, Some(9.0));

        let watch_key = clean_key("0-13-110362-x");
        let rules = st.rules.load().await.unwrap();
        let quote = Quote { used_total: Some(8.5), ..Default::default() };
        let d = decide_quote(&rules, Some(&watch_key), &quote);
        assert_eq!(d.used.source, "override.used_all_max");
        assert_eq!(d.used.decision, DecisionType::Buy);
    }

    #[tokio::test]
    async fn deleting_unknown_key_is_not_found() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        let err = delete_watch(State(st), Path("NOPE".into())).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn ebay_decide_applies_tier_limits() {
        let req: DecideRequest = serde_json::from_value(json!({
            "isbn": "9780131103627",
            "new_limit": 50.0,
            "good_limit": 20.0,
            "listings": [
                {"item_id": "a", "condition": "used_good", "item_price": 17.0, "shipping_price": 3.0},
                {"item_id": "b", "condition": "used_acceptable", "item_price": 18.0, "make_offer_enabled": true},
                {"item_id": "c", "condition": "new", "item_price": 70.0, "make_offer_enabled": true}
            ]
        }))
        .unwrap();
        let Json(resp) = ebay_decide(Json(req)).await.unwrap();
        assert_eq!(resp.limits.used_acceptable_limit, 16.0);

        let outcomes: Vec<DecisionType> = resp.decisions.iter().map(|d| d.decision).collect();
        assert_eq!(outcomes, vec![DecisionType::Buy, DecisionType::Offer, DecisionType::Skip]);
    }

    #[tokio::test]
    async fn ebay_limits_rejects_non_positive() {
        let err = ebay_limits(Json(LimitConfig { new_limit: 0.0, good_limit: 20.0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn decide_asin_reports_whole_units() {
        let mut providers = ProviderRegistry::new();
        providers.register(
            WatchKind::Asin,
            Arc::new(FixedOffers(json!({
                "marketplaceId": "ATVPDKIKX0DER",
                "new": {"top2": [{"total": 49.6, "price": 45.6, "ship": 4.0}]},
                "used": {"top2": [{"total": 21.4, "price": 17.4, "ship": 4.0}]}
            }))),
        );
        let (st, _dir) = state(providers).await;
        let q = DecideAsinQuery { asin: "B00ABC1234".into(), isbn: None };

        let Json(resp) = decide_asin(State(st), Query(q)).await.unwrap();
        assert_eq!(resp.marketplace_id.as_deref(), Some("ATVPDKIKX0DER"));
        assert_eq!(resp.new.decision.best_total, Some(50));
        assert_eq!(resp.new.decision.decision, DecisionType::Buy);
        assert_eq!(resp.used.decision.decision, DecisionType::Skip);
        assert_eq!(resp.used.top2[0]["price"], json!(17));
    }

    #[tokio::test]
    async fn decide_asin_without_provider_is_unsupported() {
        let (st, _dir) = state(ProviderRegistry::new()).await;
        let q = DecideAsinQuery { asin: "B00ABC1234".into(), isbn: None };
        let err = decide_asin(State(st), Query(q)).await.unwrap_err();
        assert!(matches!(err, AppError::UnsupportedKind(_)));
    }
}
