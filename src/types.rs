use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Watch kinds
// ---------------------------------------------------------------------------

/// Source type of a watched key. Determines which provider client fetches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchKind {
    /// Marketplace offer lookup by ASIN.
    Asin,
    /// Book identified by ISBN-10/13.
    Isbn,
    /// Single eBay listing lookup by item id.
    EbayItem,
    /// eBay sold-listing statistics by keywords.
    EbaySold,
}

impl WatchKind {
    pub const ALL: [WatchKind; 4] = [
        WatchKind::Asin,
        WatchKind::Isbn,
        WatchKind::EbayItem,
        WatchKind::EbaySold,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WatchKind::Asin => "asin",
            WatchKind::Isbn => "isbn",
            WatchKind::EbayItem => "ebay_item",
            WatchKind::EbaySold => "ebay_sold",
        }
    }
}

impl std::fmt::Display for WatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WatchKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WatchKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| {
                AppError::InvalidArgument(format!(
                    "kind must be 'asin'/'isbn'/'ebay_item'/'ebay_sold', got '{s}'"
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Listing conditions (pricing engine)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionType {
    New,
    UsedAcceptable,
    UsedGood,
    UsedVeryGood,
    UsedLikeNew,
}

impl ConditionType {
    pub fn is_new(&self) -> bool {
        matches!(self, ConditionType::New)
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConditionType::New => "new",
            ConditionType::UsedAcceptable => "used_acceptable",
            ConditionType::UsedGood => "used_good",
            ConditionType::UsedVeryGood => "used_very_good",
            ConditionType::UsedLikeNew => "used_like_new",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Listings and decisions
// ---------------------------------------------------------------------------

/// An active listing observed on a marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingItem {
    pub item_id: String,
    pub condition: ConditionType,
    pub item_price: f64,
    #[serde(default)]
    pub shipping_price: f64,
    #[serde(default)]
    pub make_offer_enabled: bool,
}

impl ListingItem {
    pub fn total_price(&self) -> f64 {
        crate::pricing::round2(self.item_price + self.shipping_price)
    }
}

/// A completed (sold) listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoldItem {
    pub item_id: String,
    pub condition: ConditionType,
    pub sold_price: f64,
    #[serde(default)]
    pub sold_shipping: f64,
    #[serde(default)]
    pub sold_date: Option<String>,
}

impl SoldItem {
    pub fn sold_total(&self) -> f64 {
        crate::pricing::round2(self.sold_price + self.sold_shipping)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecisionType {
    Buy,
    Offer,
    Skip,
}

impl std::fmt::Display for DecisionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DecisionType::Buy => "BUY",
            DecisionType::Offer => "OFFER",
            DecisionType::Skip => "SKIP",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemDecision {
    pub item_id: String,
    pub condition: ConditionType,
    pub total_price: f64,
    pub limit: f64,
    pub offer_ceiling: Option<f64>,
    pub decision: DecisionType,
    pub reason: String,
}
