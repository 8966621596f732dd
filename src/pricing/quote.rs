use serde::Serialize;

use crate::config::DEFAULT_OFFER_MULTIPLIER;
use crate::pricing::{decide, money_int};
use crate::providers::Quote;
use crate::rules::model::RulesConfig;
use crate::rules::store::resolve;
use crate::types::DecisionType;

/// Decision for the best new or best used offer of a quote, with money
/// reported in whole units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideDecision {
    pub best_total: Option<i64>,
    pub limit: Option<i64>,
    pub source: String,
    pub decision: DecisionType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuoteDecision {
    pub new: SideDecision,
    pub used: SideDecision,
}

/// BUY/SKIP for the cheapest new and used offers against the rules-resolved
/// limits of `key`. Offers are not placed on marketplace quotes, so OFFER
/// never comes out of here. A side with no offers is SKIP.
pub fn decide_quote(rules: &RulesConfig, key: Option<&str>, quote: &Quote) -> QuoteDecision {
    let side = |best: Option<f64>, condition: &str| {
        let eff = resolve(rules, key, condition);
        let decision = best
            .and_then(|total| decide(total, eff.limit, false, DEFAULT_OFFER_MULTIPLIER).ok())
            .map_or(DecisionType::Skip, |d| d.outcome);
        SideDecision {
            best_total: best.and_then(money_int),
            limit: money_int(eff.limit),
            source: eff.source,
            decision,
        }
    };

    QuoteDecision {
        new: side(quote.new_total, "brand_new"),
        used: side(quote.used_total, "used_all"),
    }
}
