use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use cowbull_db::db::db_path;
use cowbull_db::slot::DEFAULT_UTC_OFFSET_HOURS;

pub const DEFAULT_CONFIG_FILE: &str = "cowbull.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub db_path: Option<PathBuf>,
    pub utc_offset_hours: i32,
    pub top_cards_limit: usize,
    pub top_box_limit: usize,
    pub predict_count: usize,
    pub recent_slots: usize,
    pub min_samples: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            top_cards_limit: 12,
            top_box_limit: 5,
            predict_count: 3,
            recent_slots: 3,
            min_samples: 1,
        }
    }
}

impl AppConfig {
    /// Reads the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config {:?}", path))?;
        let config: AppConfig = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config {:?}", path))?;
        Ok(config)
    }

    pub fn resolved_db_path(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: AppConfig = serde_json::from_str(r#"{"top_cards_limit": 20, "db_path": "/tmp/x.db"}"#).unwrap();
        assert_eq!(config.top_cards_limit, 20);
        assert_eq!(config.utc_offset_hours, 7);
        assert_eq!(config.predict_count, 3);
        assert_eq!(config.resolved_db_path(), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = AppConfig::load(Path::new("/nonexistent/cowbull.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }
}
