use serde::{Deserialize, Serialize};

use crate::pricing::round2;
use crate::types::ConditionType;

/// Used-tier multipliers applied to the "used good" anchor.
pub mod tier_multipliers {
    pub const ACCEPTABLE: f64 = 0.80;
    pub const GOOD: f64 = 1.00;
    pub const VERY_GOOD: f64 = 1.10;
    pub const LIKE_NEW: f64 = 1.20;
}

/// The two anchors every derived limit set is computed from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitConfig {
    pub new_limit: f64,
    pub good_limit: f64,
}

/// Concrete limit per condition tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AllLimits {
    pub new_limit: f64,
    pub used_acceptable_limit: f64,
    pub used_good_limit: f64,
    pub used_very_good_limit: f64,
    pub used_like_new_limit: f64,
}

impl AllLimits {
    pub fn for_condition(&self, condition: ConditionType) -> f64 {
        match condition {
            ConditionType::New => self.new_limit,
            ConditionType::UsedAcceptable => self.used_acceptable_limit,
            ConditionType::UsedGood => self.used_good_limit,
            ConditionType::UsedVeryGood => self.used_very_good_limit,
            ConditionType::UsedLikeNew => self.used_like_new_limit,
        }
    }
}

pub fn calculate_all_limits(config: LimitConfig) -> AllLimits {
    use tier_multipliers::*;

    let good = config.good_limit;
    AllLimits {
        new_limit: round2(config.new_limit),
        used_acceptable_limit: round2(good * ACCEPTABLE),
        used_good_limit: round2(good * GOOD),
        used_very_good_limit: round2(good * VERY_GOOD),
        used_like_new_limit: round2(good * LIKE_NEW),
    }
}

pub fn calculate_offer_ceiling(limit: f64, multiplier: f64) -> f64 {
    round2(limit * multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_tiers_from_anchors() {
        let limits = calculate_all_limits(LimitConfig {
            new_limit: 50.0,
            good_limit: 20.0,
        });
        assert_eq!(
            limits,
            AllLimits {
                new_limit: 50.0,
                used_acceptable_limit: 16.0,
                used_good_limit: 20.0,
                used_very_good_limit: 22.0,
                used_like_new_limit: 24.0,
            }
        );
    }

    #[test]
    fn derived_tiers_round_to_cents() {
        let limits = calculate_all_limits(LimitConfig {
            new_limit: 33.333,
            good_limit: 18.15,
        });
        assert_eq!(limits.new_limit, 33.33);
        assert_eq!(limits.used_acceptable_limit, 14.52);
        assert_eq!(limits.used_very_good_limit, 19.97);
        assert_eq!(limits.used_like_new_limit, 21.78);
    }

    #[test]
    fn lookup_by_condition() {
        let limits = calculate_all_limits(LimitConfig {
            new_limit: 40.0,
            good_limit: 10.0,
        });
        assert_eq!(limits.for_condition(ConditionType::New), 40.0);
        assert_eq!(limits.for_condition(ConditionType::UsedAcceptable), 8.0);
        assert_eq!(limits.for_condition(ConditionType::UsedLikeNew), 12.0);
    }

    #[test]
    fn offer_ceiling_rounds() {
        assert_eq!(calculate_offer_ceiling(20.0, 1.30), 26.0);
        assert_eq!(calculate_offer_ceiling(19.99, 1.15), 22.99);
    }
}
