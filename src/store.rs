use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::category::{CategoryRule, ConfigEntry, EntityConfig};
use crate::error::{Result, TallyError};

/// Category id that legacy dispatcher-only configuration is migrated under.
pub const LEGACY_CATEGORY_ID: &str = "dispatcher_earnings";

/// File-backed map of category id to entity configuration.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    categories: BTreeMap<String, EntityConfig>,
    /// Set when the file on disk could not be parsed. It is copied aside
    /// before the first save replaces it.
    unparsed: bool,
}

/// `analysis_config.json` -> `analysis_config.json.bak`
pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

impl ConfigStore {
    /// Loads the store at `path`. A missing file gives an empty store; so does
    /// an unreadable or corrupt one, with a warning.
    pub fn load(path: &Path) -> Self {
        let mut unparsed = false;
        let categories = if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(categories) => categories,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "could not parse config store, using empty config");
                        unparsed = true;
                        BTreeMap::new()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "could not read config store, using empty config");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        Self {
            path: path.to_path_buf(),
            categories,
            unparsed,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&mut self) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        if self.unparsed && self.path.is_file() {
            let backup = backup_path(&self.path);
            std::fs::copy(&self.path, &backup)?;
            warn!(path = %self.path.display(), backup = %backup.display(), "unparsable config store copied aside before overwrite");
        }
        self.unparsed = false;
        let json = serde_json::to_string_pretty(&self.categories)?;
        std::fs::write(&self.path, format!("{json}\n"))?;
        info!(path = %self.path.display(), categories = self.categories.len(), "saved config store");
        Ok(())
    }

    pub fn get(&self, category_id: &str) -> Option<&EntityConfig> {
        self.categories.get(category_id)
    }

    pub fn has(&self, category_id: &str) -> bool {
        self.get(category_id).is_some_and(|c| !c.is_empty())
    }

    pub fn category_ids(&self) -> Vec<&str> {
        self.categories.keys().map(String::as_str).collect()
    }

    pub fn set(&mut self, category_id: &str, config: EntityConfig) -> Result<()> {
        self.categories.insert(category_id.to_string(), config);
        self.save()
    }

    /// Returns whether anything was removed.
    pub fn delete(&mut self, category_id: &str) -> Result<bool> {
        if self.categories.remove(category_id).is_none() {
            return Ok(false);
        }
        self.save()?;
        Ok(true)
    }

    /// Validates `config` against `rule` as a unit and saves it only if valid.
    pub fn validate_and_save(&mut self, rule: &CategoryRule, config: EntityConfig) -> Result<()> {
        rule.validate_config(&config)?;
        self.set(&rule.id(), config)
    }

    /// Rewrites a legacy `{"Name": percentage}` file into the current shape
    /// under [`LEGACY_CATEGORY_ID`]. Existing configuration under that id is
    /// never overwritten. Returns whether a migration happened.
    pub fn migrate_legacy(&mut self, legacy_path: &Path) -> Result<bool> {
        if !legacy_path.exists() {
            return Ok(false);
        }
        if self.has(LEGACY_CATEGORY_ID) {
            info!("{LEGACY_CATEGORY_ID} already configured, skipping legacy migration");
            return Ok(false);
        }
        let content = std::fs::read_to_string(legacy_path)?;
        let legacy: BTreeMap<String, f64> = serde_json::from_str(&content).map_err(|e| {
            TallyError::Settings(format!(
                "{} is not a legacy name-to-percentage file: {e}",
                legacy_path.display()
            ))
        })?;

        let config: EntityConfig = legacy
            .into_iter()
            .map(|(name, pct)| (name, ConfigEntry::percentage(pct)))
            .collect();

        CategoryRule::dispatcher("Dispatch", Vec::new()).validate_config(&config)?;
        self.set(LEGACY_CATEGORY_ID, config)?;
        info!(from = %legacy_path.display(), "migrated legacy dispatcher config");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::EntryKind;

    fn ali_config() -> EntityConfig {
        [("Ali".to_string(), ConfigEntry::percentage(10.0))].into_iter().collect()
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::load(&dir.path().join("nope.json"));
        assert!(store.category_ids().is_empty());
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = ConfigStore::load(&path);
        assert!(store.category_ids().is_empty());
    }

    #[test]
    fn test_corrupt_file_backed_up_before_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_config.json");
        std::fs::write(&path, "{ \"driver_payments\": oops").unwrap();
        let mut store = ConfigStore::load(&path);
        store.set("dispatcher_earnings", ali_config()).unwrap();

        let backup = backup_path(&path);
        assert_eq!(backup, dir.path().join("analysis_config.json.bak"));
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "{ \"driver_payments\": oops");
        assert!(ConfigStore::load(&path).has("dispatcher_earnings"));

        // later saves leave the backup alone
        std::fs::write(&backup, "kept").unwrap();
        store.delete("dispatcher_earnings").unwrap();
        assert_eq!(std::fs::read_to_string(&backup).unwrap(), "kept");
    }

    #[test]
    fn test_valid_file_not_backed_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_config.json");
        ConfigStore::load(&path).set("dispatcher_earnings", ali_config()).unwrap();
        ConfigStore::load(&path).set("driver_payments", EntityConfig::new()).unwrap();
        assert!(!backup_path(&path).exists());
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deep").join("analysis_config.json");
        let mut store = ConfigStore::load(&path);
        store.set("dispatcher_earnings", ali_config()).unwrap();
        assert!(path.exists());

        let reloaded = ConfigStore::load(&path);
        assert!(reloaded.has("dispatcher_earnings"));
        let entry = reloaded.get("dispatcher_earnings").unwrap()["Ali"];
        assert_eq!(entry.kind, EntryKind::Percentage);
        assert_eq!(entry.value, 10.0);
    }

    #[test]
    fn test_file_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("analysis_config.json");
        let mut store = ConfigStore::load(&path);
        store.set("dispatcher_earnings", ali_config()).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["dispatcher_earnings"]["Ali"]["type"], "percentage");
        assert_eq!(raw["dispatcher_earnings"]["Ali"]["value"], 10.0);
    }

    #[test]
    fn test_empty_config_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::load(&dir.path().join("c.json"));
        store.set("broker_performance", EntityConfig::new()).unwrap();
        assert!(!store.has("broker_performance"));
        assert_eq!(store.category_ids(), vec!["broker_performance"]);
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut store = ConfigStore::load(&path);
        store.set("dispatcher_earnings", ali_config()).unwrap();
        assert!(store.delete("dispatcher_earnings").unwrap());
        assert!(!store.delete("dispatcher_earnings").unwrap());
        assert!(!ConfigStore::load(&path).has("dispatcher_earnings"));
    }

    #[test]
    fn test_invalid_submission_not_saved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut store = ConfigStore::load(&path);
        let rule = CategoryRule::dispatcher("Dispatch", vec!["Amount".into()]);
        let mut config = ali_config();
        config.insert("Sara".into(), ConfigEntry::percentage(150.0));
        assert!(store.validate_and_save(&rule, config).is_err());
        assert!(!path.exists());
        assert!(!store.has("dispatcher_earnings"));
    }

    #[test]
    fn test_save_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        // a directory where the file should be
        let path = dir.path().join("taken");
        std::fs::create_dir_all(&path).unwrap();
        let mut store = ConfigStore::load(&path);
        assert!(store.set("dispatcher_earnings", ali_config()).is_err());
    }

    #[test]
    fn test_migrate_legacy() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("dispatcher_config.json");
        std::fs::write(&legacy, r#"{"Java": 1.5, "Baxa": 1.3}"#).unwrap();
        let path = dir.path().join("analysis_config.json");
        let mut store = ConfigStore::load(&path);
        assert!(store.migrate_legacy(&legacy).unwrap());

        let reloaded = ConfigStore::load(&path);
        let config = reloaded.get(LEGACY_CATEGORY_ID).unwrap();
        assert_eq!(config["Java"], ConfigEntry::percentage(1.5));
        assert_eq!(config["Baxa"], ConfigEntry::percentage(1.3));
    }

    #[test]
    fn test_migrate_legacy_is_one_time() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("dispatcher_config.json");
        std::fs::write(&legacy, r#"{"Java": 1.5}"#).unwrap();
        let mut store = ConfigStore::load(&dir.path().join("c.json"));
        store.set(LEGACY_CATEGORY_ID, ali_config()).unwrap();
        assert!(!store.migrate_legacy(&legacy).unwrap());
        assert!(store.get(LEGACY_CATEGORY_ID).unwrap().contains_key("Ali"));
    }

    #[test]
    fn test_migrate_missing_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConfigStore::load(&dir.path().join("c.json"));
        assert!(!store.migrate_legacy(&dir.path().join("absent.json")).unwrap());
    }

    #[test]
    fn test_migrate_rejects_bad_legacy_values() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("dispatcher_config.json");
        std::fs::write(&legacy, r#"{"Java": 140}"#).unwrap();
        let mut store = ConfigStore::load(&dir.path().join("c.json"));
        assert!(store.migrate_legacy(&legacy).is_err());
        assert!(!store.has(LEGACY_CATEGORY_ID));
    }
}
