use crate::error::{AppError, Result};
use crate::pricing::limits::{calculate_offer_ceiling, AllLimits};
use crate::pricing::round2;
use crate::types::{DecisionType, ItemDecision, ListingItem};

/// Outcome of comparing one observed total against one limit.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub total_price: f64,
    pub limit: f64,
    /// Set whenever offers were considered for this listing.
    pub offer_ceiling: Option<f64>,
    pub outcome: DecisionType,
    pub reason: String,
}

/// BUY when `total <= limit`; OFFER when offers are enabled and
/// `total <= round2(limit * offer_multiplier)`; SKIP otherwise.
/// Ties resolve to the cheaper outcome.
pub fn decide(
    total_price: f64,
    limit: f64,
    offer_enabled: bool,
    offer_multiplier: f64,
) -> Result<Decision> {
    // NaN fails this check too.
    if !(offer_multiplier > 1.0) {
        return Err(AppError::InvalidArgument(format!(
            "offer_multiplier must be > 1.0, got {offer_multiplier}"
        )));
    }

    let total = round2(total_price);

    if total <= limit {
        return Ok(Decision {
            total_price: total,
            limit,
            offer_ceiling: None,
            outcome: DecisionType::Buy,
            reason: format!("Total {total} <= limit {limit}"),
        });
    }

    if !offer_enabled {
        return Ok(Decision {
            total_price: total,
            limit,
            offer_ceiling: None,
            outcome: DecisionType::Skip,
            reason: "Total exceeds limit".to_string(),
        });
    }

    let ceiling = calculate_offer_ceiling(limit, offer_multiplier);
    if total <= ceiling {
        Ok(Decision {
            total_price: total,
            limit,
            offer_ceiling: Some(ceiling),
            outcome: DecisionType::Offer,
            reason: format!("Total {total} <= offer_ceiling {ceiling}"),
        })
    } else {
        Ok(Decision {
            total_price: total,
            limit,
            offer_ceiling: Some(ceiling),
            outcome: DecisionType::Skip,
            reason: "Total exceeds limit and offer ceiling".to_string(),
        })
    }
}

/// Decide every listing against tier-derived limits. A listing is only
/// offer-eligible when offers are enabled globally and on the listing itself.
pub fn evaluate_listings(
    listings: &[ListingItem],
    limits: &AllLimits,
    enable_offers: bool,
    offer_multiplier: f64,
) -> Result<Vec<ItemDecision>> {
    listings
        .iter()
        .map(|item| {
            let limit = limits.for_condition(item.condition);
            let d = decide(
                item.total_price(),
                limit,
                enable_offers && item.make_offer_enabled,
                offer_multiplier,
            )?;
            Ok(ItemDecision {
                item_id: item.item_id.clone(),
                condition: item.condition,
                total_price: d.total_price,
                limit: d.limit,
                offer_ceiling: d.offer_ceiling,
                decision: d.outcome,
                reason: d.reason,
            })
        })
        .collect()
}
