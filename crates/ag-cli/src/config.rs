use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// User-level settings, loaded from `~/.agentling/config.toml`. Mirrors
/// `agtrace-runtime`'s own config idiom: defaults that work with no file on
/// disk at all, explicit `load`/`save` pairs, and a `default_path` resolver
/// callers can override in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Caps token usage accounted to a single agent invocation in
    /// `ag-patterns`; `None` leaves it unbounded.
    #[serde(default)]
    pub max_agent_tokens: Option<u64>,
    #[serde(default)]
    pub enable_result_cache: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            db_path: default_db_path(),
            max_agent_tokens: None,
            enable_result_cache: true,
        }
    }
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_db_path() -> PathBuf {
    home_dir().join(".agentling").join("agentling.db")
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        home_dir().join(".agentling").join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("agentling-config-missing-test.toml");
        let _ = std::fs::remove_file(&path);
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.default_model, "sonnet");
        assert!(config.enable_result_cache);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.default_model = "opus".to_string();
        config.max_agent_tokens = Some(50_000);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.default_model, "opus");
        assert_eq!(loaded.max_agent_tokens, Some(50_000));
    }
}
