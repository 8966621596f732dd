use std::path::{Path, PathBuf};

use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::rules::model::{
    Condition, EffectiveLimit, LimitKind, LimitsUpdate, RuleDefaults, RuleOverride, RulesConfig,
    UsedLimits, UsedTier,
};

/// Canonical rule key: whitespace and hyphens removed, upper-cased so it
/// matches the cleaned watch key (`013110362x` and `013110362X` are one key).
pub fn normalize_key(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Map free-form condition text ("Brand-New", "Used Good", "very_good", ...)
/// onto the closed condition set. `None` means unrecognized; resolution
/// treats it as the generic used bucket.
pub fn normalize_condition(raw: &str) -> Option<Condition> {
    let c: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|ch| if ch == '-' || ch == ' ' { '_' } else { ch })
        .collect();
    match c.as_str() {
        "new" | "brand_new" | "brandnew" => Some(Condition::New),
        "acceptable" | "used_acceptable" => Some(Condition::Used(UsedTier::Acceptable)),
        "good" | "used_good" => Some(Condition::Used(UsedTier::Good)),
        "very_good" | "used_very_good" => Some(Condition::Used(UsedTier::VeryGood)),
        "like_new" | "used_like_new" => Some(Condition::Used(UsedTier::LikeNew)),
        "used" | "used_all" => Some(Condition::UsedAll),
        _ => None,
    }
}

/// Resolve the concrete limit for `key` + `condition`.
///
/// NEW: override `new_max` > defaults `new_max`.
/// Used family: override tier > override `used_all_max` > default tier >
/// default `used_all_max`. An item-level flat limit beats a default tier.
pub fn resolve(config: &RulesConfig, key: Option<&str>, condition: &str) -> EffectiveLimit {
    let defaults = &config.defaults;
    let over = key
        .map(normalize_key)
        .filter(|k| !k.is_empty())
        .and_then(|k| config.overrides.get(&k));
    let condition = normalize_condition(condition);

    if condition == Some(Condition::New) {
        return match over.and_then(|o| o.new_max) {
            Some(limit) => EffectiveLimit {
                kind: LimitKind::BrandNew,
                condition: None,
                limit,
                source: "override.new_max".to_string(),
            },
            None => EffectiveLimit {
                kind: LimitKind::BrandNew,
                condition: None,
                limit: defaults.new_max,
                source: "defaults.new_max".to_string(),
            },
        };
    }

    let tier = condition.and_then(|c| c.used_tier());
    let tier_name = tier.map_or("used_all", |t| t.as_str()).to_string();
    let used = |limit: f64, source: String| EffectiveLimit {
        kind: LimitKind::Used,
        condition: Some(tier_name.clone()),
        limit,
        source,
    };

    if let Some(o) = over {
        if let Some((t, limit)) = tier.and_then(|t| o.used.get(t).map(|v| (t, v))) {
            return used(limit, format!("override.used.{t}"));
        }
        if let Some(limit) = o.used_all_max {
            return used(limit, "override.used_all_max".to_string());
        }
    }

    if let Some((t, limit)) = tier.and_then(|t| defaults.used.get(t).map(|v| (t, v))) {
        return used(limit, format!("defaults.used.{t}"));
    }

    used(defaults.used_all_max, "defaults.used_all_max".to_string())
}

/// JSON-file backed rules store. Writers are serialized by an async mutex and
/// every save goes through write-to-temp + rename, so a crash never leaves a
/// half-written document behind.
pub struct RulesStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RulesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document, seeding defaults on first use.
    pub async fn load(&self) -> Result<RulesConfig> {
        let _guard = self.lock.lock().await;
        self.load_unlocked().await
    }

    pub async fn effective_limit(&self, key: Option<&str>, condition: &str) -> Result<EffectiveLimit> {
        let config = self.load().await?;
        Ok(resolve(&config, key, condition))
    }

    pub async fn get_override(&self, key: &str) -> Result<Option<RuleOverride>> {
        let config = self.load().await?;
        Ok(config.overrides.get(&normalize_key(key)).cloned())
    }

    pub async fn set_defaults(&self, update: &LimitsUpdate) -> Result<RuleDefaults> {
        validate_update(update)?;
        let _guard = self.lock.lock().await;
        let mut config = self.load_unlocked().await?;

        if let Some(v) = update.new_max {
            config.defaults.new_max = v;
        }
        if let Some(v) = update.used_all_max {
            config.defaults.used_all_max = v;
        }
        config.defaults.used.merge(&used_tiers(update));

        self.save_unlocked(&config).await?;
        info!(new_max = config.defaults.new_max, used_all_max = config.defaults.used_all_max, "Rule defaults updated");
        Ok(config.defaults)
    }

    pub async fn set_override(&self, key: &str, update: &LimitsUpdate) -> Result<RuleOverride> {
        validate_update(update)?;
        let key = normalize_key(key);
        if key.is_empty() {
            return Err(AppError::InvalidArgument("override key must not be empty".to_string()));
        }

        let _guard = self.lock.lock().await;
        let mut config = self.load_unlocked().await?;
        let over = config.overrides.entry(key.clone()).or_default();

        if let Some(v) = update.new_max {
            over.new_max = Some(v);
        }
        if let Some(v) = update.used_all_max {
            over.used_all_max = Some(v);
        }
        over.used.merge(&used_tiers(update));
        let result = over.clone();

        self.save_unlocked(&config).await?;
        info!(key = %key, "Rule override updated");
        Ok(result)
    }

    pub async fn delete_override(&self, key: &str) -> Result<()> {
        let key = normalize_key(key);
        let _guard = self.lock.lock().await;
        let mut config = self.load_unlocked().await?;
        if config.overrides.remove(&key).is_none() {
            return Err(AppError::NotFound(format!("no override for '{key}'")));
        }
        self.save_unlocked(&config).await?;
        info!(key = %key, "Rule override deleted");
        Ok(())
    }

    async fn load_unlocked(&self) -> Result<RulesConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) if raw.trim().is_empty() => self.seed().await,
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.seed().await,
            Err(e) => Err(e.into()),
        }
    }

    async fn seed(&self) -> Result<RulesConfig> {
        let config = RulesConfig::default();
        self.save_unlocked(&config).await?;
        info!(path = %self.path.display(), "Seeded default rules");
        Ok(config)
    }

    async fn save_unlocked(&self, config: &RulesConfig) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let body = serde_json::to_string_pretty(config)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), "Rules saved");
        Ok(())
    }
}

fn validate_update(update: &LimitsUpdate) -> Result<()> {
    let values = update
        .new_max
        .iter()
        .chain(update.used_all_max.iter())
        .chain(update.used.iter().flat_map(|m| m.values()));
    for v in values {
        if !(v.is_finite() && *v > 0.0) {
            return Err(AppError::InvalidArgument(format!("limits must be > 0, got {v}")));
        }
    }
    Ok(())
}

fn used_tiers(update: &LimitsUpdate) -> UsedLimits {
    let mut tiers = UsedLimits::default();
    for (name, value) in update.used.iter().flatten() {
        if let Some(tier) = normalize_condition(name).and_then(|c| c.used_tier()) {
            tiers.set(tier, *value);
        }
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    /// Rules file inside a fresh temp dir; the dir lives as long as the guard.
    fn temp_rules_path() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("rules.json");
        (dir, path)
    }

    fn four_level_config() -> RulesConfig {
        let mut config = RulesConfig {
            defaults: RuleDefaults {
                new_max: 50.0,
                used_all_max: 10.0,
                used: UsedLimits {
                    good: Some(20.0),
                    ..Default::default()
                },
            },
            overrides: BTreeMap::new(),
        };
        config.overrides.insert(
            "9780131103627".to_string(),
            RuleOverride {
                new_max: Some(60.0),
                used_all_max: Some(30.0),
                used: UsedLimits {
                    good: Some(40.0),
                    ..Default::default()
                },
            },
        );
        config
    }

    #[test]
    fn key_normalization_strips_hyphens_and_spaces() {
        assert_eq!(normalize_key(" 978-0-13-110362-7 "), "9780131103627");
        assert_eq!(normalize_key("0-13-110362-x"), "013110362X");
    }

    #[tokio::test]
    async fn override_key_is_case_insensitive() {
        let (_dir, path) = temp_rules_path();
        let store = RulesStore::new(path);
        store
            .set_override("013110362x", &LimitsUpdate { used_all_max: Some(7.0), ..Default::default() })
            .await
            .unwrap();

        let config = store.load().await.unwrap();
        assert!(config.overrides.contains_key("013110362X"));
        let r = resolve(&config, Some("013110362X"), "used");
        assert_eq!((r.limit, r.source.as_str()), (7.0, "override.used_all_max"));
    }

    #[test]
    fn condition_normalization_accepts_variants() {
        assert_eq!(normalize_condition("Brand-New"), Some(Condition::New));
        assert_eq!(normalize_condition("new"), Some(Condition::New));
        assert_eq!(normalize_condition("Used Good"), Some(Condition::Used(UsedTier::Good)));
        assert_eq!(normalize_condition("very good"), Some(Condition::Used(UsedTier::VeryGood)));
        assert_eq!(normalize_condition("LIKE-NEW"), Some(Condition::Used(UsedTier::LikeNew)));
        assert_eq!(normalize_condition("used"), Some(Condition::UsedAll));
        assert_eq!(normalize_condition("collectible"), None);
    }

    #[test]
    fn precedence_walks_all_four_levels() {
        let key = Some("978-0131103627");
        let mut config = four_level_config();

        let r = resolve(&config, key, "good");
        assert_eq!((r.limit, r.source.as_str()), (40.0, "override.used.good"));

        config.overrides.get_mut("9780131103627").unwrap().used.good = None;
        let r = resolve(&config, key, "good");
        assert_eq!((r.limit, r.source.as_str()), (30.0, "override.used_all_max"));

        config.overrides.get_mut("9780131103627").unwrap().used_all_max = None;
        let r = resolve(&config, key, "good");
        assert_eq!((r.limit, r.source.as_str()), (20.0, "defaults.used.good"));

        config.defaults.used.good = None;
        let r = resolve(&config, key, "good");
        assert_eq!((r.limit, r.source.as_str()), (10.0, "defaults.used_all_max"));
        assert_eq!(r.condition.as_deref(), Some("good"));
    }

    #[test]
    fn item_flat_beats_default_tier() {
        let mut config = four_level_config();
        config.overrides.get_mut("9780131103627").unwrap().used.good = None;
        // Default has a tier value for "good", but the item-level flat limit wins.
        let r = resolve(&config, Some("9780131103627"), "used_good");
        assert_eq!(r.source, "override.used_all_max");
        assert_eq!(r.limit, 30.0);
    }

    #[test]
    fn new_condition_uses_new_max() {
        let config = four_level_config();
        let r = resolve(&config, Some("9780131103627"), "brand_new");
        assert_eq!((r.kind, r.limit, r.source.as_str()), (LimitKind::BrandNew, 60.0, "override.new_max"));

        let r = resolve(&config, Some("0000000000"), "new");
        assert_eq!((r.limit, r.source.as_str()), (50.0, "defaults.new_max"));

        let r = resolve(&config, None, "new");
        assert_eq!(r.source, "defaults.new_max");
    }

    #[test]
    fn unrecognized_condition_is_generic_used() {
        let config = four_level_config();
        let r = resolve(&config, None, "collectible");
        assert_eq!(r.kind, LimitKind::Used);
        assert_eq!(r.condition.as_deref(), Some("used_all"));
        assert_eq!(r.source, "defaults.used_all_max");

        let r = resolve(&config, Some("9780131103627"), "used");
        assert_eq!(r.source, "override.used_all_max");
    }

    #[tokio::test]
    async fn seeds_defaults_on_first_use() {
        let (_dir, path) = temp_rules_path();
        let store = RulesStore::new(&path);
        let config = store.load().await.unwrap();
        assert_eq!(config.defaults, RuleDefaults::default());
        assert!(config.overrides.is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn partial_updates_leave_other_fields() {
        let (_dir, path) = temp_rules_path();
        let store = RulesStore::new(path);

        let defaults = store
            .set_defaults(&LimitsUpdate {
                used_all_max: Some(25.0),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(defaults.new_max, 50.0);
        assert_eq!(defaults.used_all_max, 25.0);
        assert_eq!(defaults.used.good, Some(18.0));

        let mut used = BTreeMap::new();
        used.insert("Very Good".to_string(), 22.0);
        used.insert("brand_new".to_string(), 99.0);
        store
            .set_override("978-1", &LimitsUpdate { used: Some(used), ..Default::default() })
            .await
            .unwrap();
        let over = store
            .set_override("9781", &LimitsUpdate { new_max: Some(45.0), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(over.new_max, Some(45.0));
        assert_eq!(over.used.very_good, Some(22.0));
        assert_eq!(over.used_all_max, None);
        // non-tier entries in `used` are ignored
        assert_eq!(over.used.good, None);

        let r = store.effective_limit(Some("978 1"), "very good").await.unwrap();
        assert_eq!(r.source, "override.used.very_good");
    }

    #[tokio::test]
    async fn delete_override_reports_missing_key() {
        let (_dir, path) = temp_rules_path();
        let store = RulesStore::new(path);
        store
            .set_override("123", &LimitsUpdate { new_max: Some(5.0), ..Default::default() })
            .await
            .unwrap();
        store.delete_override("1-2-3").await.unwrap();
        assert!(store.get_override("123").await.unwrap().is_none());
        assert!(matches!(store.delete_override("123").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn rejects_non_positive_limits() {
        let (_dir, path) = temp_rules_path();
        let store = RulesStore::new(path);
        let res = store
            .set_defaults(&LimitsUpdate { new_max: Some(0.0), ..Default::default() })
            .await;
        assert!(matches!(res, Err(AppError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let (_dir, path) = temp_rules_path();
        let store = RulesStore::new(&path);
        let config = four_level_config();
        {
            let _guard = store.lock.lock().await;
            store.save_unlocked(&config).await.unwrap();
        }

        let reopened = RulesStore::new(&path);
        let loaded = reopened.load().await.unwrap();
        assert_eq!(loaded, config);
        assert_eq!(
            serde_json::to_string(&loaded).unwrap(),
            serde_json::to_string(&config).unwrap()
        );

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        assert!(!PathBuf::from(tmp).exists());
    }
}
