use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const STORE_ENV: &str = "TALLY_STORE";
pub const NO_ADVISOR_ENV: &str = "TALLY_NO_ADVISOR";
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_store_path")]
    pub store_path: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub advisor: AdvisorSettings,
}

fn default_true() -> bool {
    true
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_store_path() -> String {
    config_dir().join("analysis_config.json").to_string_lossy().to_string()
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            endpoint: default_endpoint(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_path: default_store_path(),
            log_level: default_log_level(),
            advisor: AdvisorSettings::default(),
        }
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("tally")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Missing or unreadable settings fall back to defaults; fields absent from
/// the file take their default values.
pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

impl Settings {
    /// Applies `TALLY_STORE` and `TALLY_NO_ADVISOR` from `var`.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(store) = var(STORE_ENV).filter(|s| !s.trim().is_empty()) {
            self.store_path = store;
        }
        if var(NO_ADVISOR_ENV).is_some_and(|v| matches!(v.trim(), "1" | "true" | "yes")) {
            self.advisor.enabled = false;
        }
        self
    }

    pub fn store_path(&self) -> PathBuf {
        PathBuf::from(expand_home(&self.store_path))
    }

    /// The credential to use, if the advisor is enabled and one is set.
    pub fn advisor_key(&self, var: impl Fn(&str) -> Option<String>) -> Option<String> {
        if !self.advisor.enabled {
            return None;
        }
        var(API_KEY_ENV).filter(|k| !k.trim().is_empty())
    }
}

pub fn expand_home(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key: &str| pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v.to_string())
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = Settings {
            store_path: "/tmp/tally/analysis_config.json".to_string(),
            log_level: "debug".to_string(),
            advisor: AdvisorSettings {
                model: "gpt-4o-mini".to_string(),
                ..AdvisorSettings::default()
            },
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        std::fs::write(&path, format!("{json}\n")).unwrap();
        let loaded: Settings = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.log_level, "warn");
        assert!(s.store_path.ends_with("analysis_config.json"));
        assert!(s.advisor.enabled);
        assert_eq!(s.advisor.model, "gpt-3.5-turbo");
        assert_eq!(s.advisor.timeout_secs, 20);
    }

    #[test]
    fn test_partial_file_merges_with_defaults() {
        let json = r#"{"log_level": "info", "advisor": {"timeout_secs": 5}}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.log_level, "info");
        assert_eq!(s.advisor.timeout_secs, 5);
        assert!(s.advisor.enabled);
        assert!(s.advisor.endpoint.starts_with("https://"));
    }

    #[test]
    fn test_env_overrides() {
        let vars = [(STORE_ENV, "/tmp/other.json"), (NO_ADVISOR_ENV, "1"), (API_KEY_ENV, "sk-test")];
        let s = Settings::default().with_env(env(&vars));
        assert_eq!(s.store_path(), PathBuf::from("/tmp/other.json"));
        assert!(!s.advisor.enabled);
        assert_eq!(s.advisor_key(env(&vars)), None);
    }

    #[test]
    fn test_advisor_key() {
        let s = Settings::default();
        assert_eq!(s.advisor_key(env(&[(API_KEY_ENV, "sk-test")])), Some("sk-test".to_string()));
        assert_eq!(s.advisor_key(env(&[(API_KEY_ENV, " ")])), None);
        assert_eq!(s.advisor_key(env(&[])), None);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path.json"), "/abs/path.json");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/x.json"), format!("{}/x.json", home.to_string_lossy()));
        }
    }
}
