use serde::Serialize;

use crate::pricing::round2;
use crate::types::{ConditionType, ListingItem, SoldItem};

/// Min/max totals of active listings, NEW vs. all used tiers.
/// An empty group reports `None` rather than zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListingSummary {
    pub new_min_total: Option<f64>,
    pub new_max_total: Option<f64>,
    pub new_count: usize,
    pub used_min_total: Option<f64>,
    pub used_max_total: Option<f64>,
    pub used_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierAverage {
    pub avg_total: Option<f64>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SoldSummary {
    pub sold_new_avg_total: Option<f64>,
    pub sold_new_count: usize,
    pub sold_used_avg_total: Option<f64>,
    pub sold_used_count: usize,
    /// Per used tier breakdown, only filled when a detailed summary is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_condition: Option<UsedTierAverages>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsedTierAverages {
    pub used_acceptable: TierAverage,
    pub used_good: TierAverage,
    pub used_very_good: TierAverage,
    pub used_like_new: TierAverage,
}

fn min_max(xs: &[f64]) -> (Option<f64>, Option<f64>) {
    let min = xs.iter().copied().reduce(f64::min).map(round2);
    let max = xs.iter().copied().reduce(f64::max).map(round2);
    (min, max)
}

fn average(xs: &[f64]) -> Option<f64> {
    if xs.is_empty() {
        None
    } else {
        Some(round2(xs.iter().sum::<f64>() / xs.len() as f64))
    }
}

fn tier_average(xs: &[f64]) -> TierAverage {
    TierAverage {
        avg_total: average(xs),
        count: xs.len(),
    }
}

pub fn analyze_listings(listings: &[ListingItem]) -> ListingSummary {
    let (new_items, used_items): (Vec<&ListingItem>, Vec<&ListingItem>) =
        listings.iter().partition(|item| item.condition.is_new());
    let new_totals: Vec<f64> = new_items.iter().map(|item| item.total_price()).collect();
    let used_totals: Vec<f64> = used_items.iter().map(|item| item.total_price()).collect();

    let (new_min_total, new_max_total) = min_max(&new_totals);
    let (used_min_total, used_max_total) = min_max(&used_totals);

    ListingSummary {
        new_min_total,
        new_max_total,
        new_count: new_totals.len(),
        used_min_total,
        used_max_total,
        used_count: used_totals.len(),
    }
}

fn sold_totals_where(sold: &[SoldItem], pred: impl Fn(ConditionType) -> bool) -> Vec<f64> {
    sold.iter()
        .filter(|s| pred(s.condition))
        .map(SoldItem::sold_total)
        .collect()
}

pub fn analyze_sold_items(sold: &[SoldItem], detailed: bool) -> SoldSummary {
    let new_totals = sold_totals_where(sold, |c| c.is_new());
    let used_totals = sold_totals_where(sold, |c| !c.is_new());

    let by_condition = detailed.then(|| UsedTierAverages {
        used_acceptable: tier_average(&sold_totals_where(sold, |c| c == ConditionType::UsedAcceptable)),
        used_good: tier_average(&sold_totals_where(sold, |c| c == ConditionType::UsedGood)),
        used_very_good: tier_average(&sold_totals_where(sold, |c| c == ConditionType::UsedVeryGood)),
        used_like_new: tier_average(&sold_totals_where(sold, |c| c == ConditionType::UsedLikeNew)),
    });

    SoldSummary {
        sold_new_avg_total: average(&new_totals),
        sold_new_count: new_totals.len(),
        sold_used_avg_total: average(&used_totals),
        sold_used_count: used_totals.len(),
        by_condition,
    }
}

/// Average sold total for a single condition tier.
pub fn condition_sold_average(sold: &[SoldItem], condition: ConditionType) -> Option<f64> {
    average(&sold_totals_where(sold, |c| c == condition))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listing(condition: ConditionType, price: f64, ship: f64) -> ListingItem {
        ListingItem {
            item_id: format!("{condition}-{price}"),
            condition,
            item_price: price,
            shipping_price: ship,
            make_offer_enabled: false,
        }
    }

    fn sold(condition: ConditionType, price: f64) -> SoldItem {
        SoldItem {
            item_id: format!("{condition}-{price}"),
            condition,
            sold_price: price,
            sold_shipping: 0.0,
            sold_date: None,
        }
    }

    #[test]
    fn listing_min_max_split_new_and_used() {
        let summary = analyze_listings(&[
            listing(ConditionType::New, 30.0, 5.0),
            listing(ConditionType::New, 25.0, 0.0),
            listing(ConditionType::UsedGood, 10.0, 3.5),
            listing(ConditionType::UsedLikeNew, 18.0, 0.0),
        ]);
        assert_eq!(summary.new_min_total, Some(25.0));
        assert_eq!(summary.new_max_total, Some(35.0));
        assert_eq!(summary.new_count, 2);
        assert_eq!(summary.used_min_total, Some(13.5));
        assert_eq!(summary.used_max_total, Some(18.0));
        assert_eq!(summary.used_count, 2);
    }

    #[test]
    fn empty_group_is_none_not_zero() {
        let summary = analyze_listings(&[listing(ConditionType::UsedGood, 10.0, 0.0)]);
        assert_eq!(summary.new_min_total, None);
        assert_eq!(summary.new_max_total, None);
        assert_eq!(summary.new_count, 0);

        let sold_summary = analyze_sold_items(&[], true);
        assert_eq!(sold_summary.sold_new_avg_total, None);
        assert_eq!(sold_summary.sold_used_avg_total, None);
        let tiers = sold_summary.by_condition.unwrap();
        assert_eq!(tiers.used_good, TierAverage { avg_total: None, count: 0 });
    }

    #[test]
    fn sold_averages_overall_and_per_tier() {
        let items = vec![
            sold(ConditionType::New, 40.0),
            sold(ConditionType::New, 45.0),
            sold(ConditionType::UsedGood, 10.0),
            sold(ConditionType::UsedGood, 11.0),
            sold(ConditionType::UsedAcceptable, 7.0),
        ];

        let basic = analyze_sold_items(&items, false);
        assert_eq!(basic.sold_new_avg_total, Some(42.5));
        assert_eq!(basic.sold_used_avg_total, Some(9.33));
        assert_eq!(basic.sold_used_count, 3);
        assert!(basic.by_condition.is_none());

        let detailed = analyze_sold_items(&items, true).by_condition.unwrap();
        assert_eq!(detailed.used_good, TierAverage { avg_total: Some(10.5), count: 2 });
        assert_eq!(detailed.used_acceptable, TierAverage { avg_total: Some(7.0), count: 1 });
        assert_eq!(detailed.used_like_new.avg_total, None);
    }

    #[test]
    fn single_condition_average() {
        let items = vec![
            sold(ConditionType::UsedVeryGood, 12.0),
            sold(ConditionType::UsedVeryGood, 13.0),
        ];
        assert_eq!(condition_sold_average(&items, ConditionType::UsedVeryGood), Some(12.5));
        assert_eq!(condition_sold_average(&items, ConditionType::New), None);
    }
}
