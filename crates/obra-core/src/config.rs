use anyhow::{anyhow, Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:8000/api/chat";
pub const DEFAULT_STORAGE_KEY: &str = "obra.transcript";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Config {
    /// Chat endpoint that receives `POST {"message": ...}`.
    pub endpoint: String,
    /// Storage partition. Derived from the endpoint when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
    /// No timeout when unset; a hung request keeps the loading marker up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

fn default_storage_key() -> String {
    DEFAULT_STORAGE_KEY.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            origin: None,
            storage_key: default_storage_key(),
            database_path: None,
            request_timeout_secs: None,
        }
    }

    /// Load from the user config directory, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::get_config_path()?)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = serde_json::from_str(&config_content)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(endpoint) = std::env::var("OBRA_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.endpoint = endpoint.trim().to_string();
            }
        }
    }

    /// Storage partition: the explicit origin, else the endpoint's
    /// `scheme://host:port`.
    pub fn origin(&self) -> Result<String> {
        match &self.origin {
            Some(origin) => Ok(origin.clone()),
            None => origin_of(&self.endpoint),
        }
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::get_data_dir()?.join("transcript.db")),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("obra").join("config.json"))
    }

    pub fn get_data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("Could not determine data directory"))?;

        Ok(data_dir.join("obra"))
    }
}

pub fn origin_of(endpoint: &str) -> Result<String> {
    let url = Url::parse(endpoint).with_context(|| format!("invalid endpoint URL {endpoint}"))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(anyhow!("endpoint URL {endpoint} has no origin"));
    }
    Ok(origin.ascii_serialization())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::new());
        assert_eq!(config.storage_key, "obra.transcript");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("obra").join("config.json");

        let mut config = Config::new();
        config.endpoint = "https://pm.example.com/api/chat".to_string();
        config.request_timeout_secs = Some(30);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"endpoint":"http://10.0.0.5:9000/api/chat"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.storage_key, DEFAULT_STORAGE_KEY);
        assert_eq!(config.origin().unwrap(), "http://10.0.0.5:9000");
    }

    #[test]
    fn test_origin_of() {
        assert_eq!(
            origin_of("http://localhost:8000/api/chat").unwrap(),
            "http://localhost:8000"
        );
        assert_eq!(
            origin_of("https://pm.example.com/api/chat").unwrap(),
            "https://pm.example.com"
        );
        assert!(origin_of("not a url").is_err());
    }

    #[test]
    fn test_explicit_origin_wins() {
        let mut config = Config::new();
        config.origin = Some("site-office".to_string());
        assert_eq!(config.origin().unwrap(), "site-office");
    }
}
