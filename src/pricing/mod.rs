//! Price-limit derivation, BUY/OFFER/SKIP decisions and listing aggregates.
//!
//! Internal arithmetic keeps two decimal places (`round2`). Whole-unit
//! rounding (`money_int`) is applied only when a price is reported outward.

pub mod decision;
pub mod limits;
pub mod quote;
pub mod summary;

pub use decision::{decide, evaluate_listings};
pub use limits::{calculate_all_limits, AllLimits, LimitConfig};
pub use quote::{decide_quote, QuoteDecision};
pub use summary::{analyze_listings, analyze_sold_items, condition_sold_average};

/// Round to 2 decimal places.
pub fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Round to the nearest whole currency unit for display.
pub fn money_int(x: f64) -> Option<i64> {
    if x.is_finite() {
        Some(x.round() as i64)
    } else {
        None
    }
}
