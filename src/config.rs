//! Application configuration
//!
//! Read from `<config dir>/book_atlas/config.toml`, with credentials
//! overridable from the environment.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::BookError;

const CONFIG_DIR: &str = "book_atlas";
const CONFIG_FILE: &str = "config.toml";

pub const ENV_API_KEY: &str = "BOOK_ATLAS_API_KEY";
pub const ENV_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";

/// OAuth client settings for the Google sign-in flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub client_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    pub auth_url: String,
    pub token_url: String,
    pub redirect_uri: String,
    pub scope: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: None,
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            redirect_uri: "http://127.0.0.1:8765/callback".to_string(),
            scope: "openid profile email https://www.googleapis.com/auth/books".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub catalog_base_url: String,
    pub oauth: OAuthConfig,
    pub page_size: usize,
    pub page_size_options: Vec<usize>,
    pub max_cached_pages: usize,
    pub request_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            catalog_base_url: "https://www.googleapis.com".to_string(),
            oauth: OAuthConfig::default(),
            page_size: 5,
            page_size_options: vec![5, 10, 20],
            max_cached_pages: 64,
            request_timeout_secs: 30,
            data_dir: None,
        }
    }
}

impl Config {
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs_next::config_dir()
            .context("Could not determine config directory")?
            .join(CONFIG_DIR);
        Ok(dir)
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        let config: Config =
            toml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))?;

        Ok(config)
    }

    #[allow(dead_code)]
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory {:?}", dir))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).with_context(|| format!("Failed to write config to {:?}", path))?;

        Ok(())
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(id) = get(ENV_CLIENT_ID) {
            self.oauth.client_id = id;
        }
        if let Some(secret) = get(ENV_CLIENT_SECRET) {
            self.oauth.client_secret = Some(secret);
        }
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.page_size == 0 {
            return Err(BookError::Config("page_size must be greater than zero".into()));
        }
        if self.max_cached_pages == 0 {
            return Err(BookError::Config("max_cached_pages must be greater than zero".into()));
        }
        if !self.page_size_options.contains(&self.page_size) {
            return Err(BookError::Config(format!(
                "page_size {} is not one of {:?}",
                self.page_size, self.page_size_options
            )));
        }
        Ok(())
    }

    /// Where the SQLite cache lives.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        let home_dir = dirs_next::home_dir().context("Could not find home directory")?;
        Ok(home_dir.join(".book_atlas"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "page_size = 10\napi_key = \"k\"\n\n[oauth]\nclient_id = \"cid\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.api_key.as_deref(), Some("k"));
        assert_eq!(config.oauth.client_id, "cid");
        assert_eq!(config.oauth.token_url, OAuthConfig::default().token_url);
        assert_eq!(config.max_cached_pages, 64);
    }

    #[test]
    fn save_then_load_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = Config::default();
        config.page_size = 20;
        config.api_key = Some("secret".into());

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_API_KEY, "from-env"),
            (ENV_CLIENT_ID, "client"),
            (ENV_CLIENT_SECRET, "  "),
        ]);
        let mut config = Config {
            api_key: Some("from-file".into()),
            ..Config::default()
        };

        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("from-env"));
        assert_eq!(config.oauth.client_id, "client");
        assert_eq!(config.oauth.client_secret, None);
    }

    #[test]
    fn validation_rejects_bad_page_sizes() {
        let zero = Config { page_size: 0, ..Config::default() };
        assert!(zero.validate().is_err());

        let odd = Config { page_size: 7, ..Config::default() };
        assert!(odd.validate().is_err());

        let no_cache = Config { max_cached_pages: 0, ..Config::default() };
        assert!(no_cache.validate().is_err());
    }

    #[test]
    fn explicit_data_dir_wins() {
        let config = Config {
            data_dir: Some(PathBuf::from("/tmp/atlas")),
            ..Config::default()
        };
        assert_eq!(config.data_dir().unwrap(), PathBuf::from("/tmp/atlas"));
    }
}
