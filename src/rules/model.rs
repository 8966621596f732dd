use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

/// Used condition tier that can carry its own limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsedTier {
    Acceptable,
    Good,
    VeryGood,
    LikeNew,
}

impl UsedTier {
    pub const ALL: [UsedTier; 4] = [
        UsedTier::Acceptable,
        UsedTier::Good,
        UsedTier::VeryGood,
        UsedTier::LikeNew,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UsedTier::Acceptable => "acceptable",
            UsedTier::Good => "good",
            UsedTier::VeryGood => "very_good",
            UsedTier::LikeNew => "like_new",
        }
    }
}

impl std::fmt::Display for UsedTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized condition a limit is resolved for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    New,
    Used(UsedTier),
    /// Generic used bucket: explicit "used"/"used_all".
    UsedAll,
}

impl Condition {
    pub fn used_tier(&self) -> Option<UsedTier> {
        match self {
            Condition::Used(tier) => Some(*tier),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted document
// ---------------------------------------------------------------------------

/// Per-tier used limits. Absent tiers fall through to the next precedence level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsedLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptable: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub very_good: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub like_new: Option<f64>,
}

impl UsedLimits {
    pub fn get(&self, tier: UsedTier) -> Option<f64> {
        match tier {
            UsedTier::Acceptable => self.acceptable,
            UsedTier::Good => self.good,
            UsedTier::VeryGood => self.very_good,
            UsedTier::LikeNew => self.like_new,
        }
    }

    pub fn set(&mut self, tier: UsedTier, value: f64) {
        let slot = match tier {
            UsedTier::Acceptable => &mut self.acceptable,
            UsedTier::Good => &mut self.good,
            UsedTier::VeryGood => &mut self.very_good,
            UsedTier::LikeNew => &mut self.like_new,
        };
        *slot = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        UsedTier::ALL.iter().all(|t| self.get(*t).is_none())
    }

    /// Write only the tiers present in `other`.
    pub fn merge(&mut self, other: &UsedLimits) {
        for tier in UsedTier::ALL {
            if let Some(v) = other.get(tier) {
                self.set(tier, v);
            }
        }
    }
}

/// Process-wide fallback limits. `new_max` and `used_all_max` are always set,
/// so limit resolution never comes back empty. Fields missing from a stored
/// document are filled from the seed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDefaults {
    pub new_max: f64,
    pub used_all_max: f64,
    pub used: UsedLimits,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            new_max: 50.0,
            used_all_max: 20.0,
            used: UsedLimits {
                acceptable: Some(15.0),
                good: Some(18.0),
                very_good: Some(19.8),
                like_new: Some(21.78),
            },
        }
    }
}

/// Per-item override; every field is optional and falls through to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_all_max: Option<f64>,
    #[serde(default, skip_serializing_if = "UsedLimits::is_empty")]
    pub used: UsedLimits,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(default)]
    pub defaults: RuleDefaults,
    #[serde(default)]
    pub overrides: BTreeMap<String, RuleOverride>,
}

/// Partial update: only the `Some` fields are written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsUpdate {
    pub new_max: Option<f64>,
    pub used_all_max: Option<f64>,
    /// Condition name → limit. Names go through condition normalization;
    /// entries that are not a used tier are ignored.
    pub used: Option<BTreeMap<String, f64>>,
}

// ---------------------------------------------------------------------------
// Resolution result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    BrandNew,
    Used,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveLimit {
    pub kind: LimitKind,
    /// Used tier the limit applies to, `used_all` for the generic bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub limit: f64,
    /// Which rule supplied the limit, e.g. `override.used.good`.
    pub source: String,
}
