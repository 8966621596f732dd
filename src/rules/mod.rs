//! Price-limit rules: seeded defaults plus per-item overrides, resolved into
//! one effective limit per item and condition.

pub mod model;
pub mod store;

pub use model::{EffectiveLimit, LimitsUpdate, RulesConfig};
pub use store::RulesStore;
