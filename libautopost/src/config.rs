//! Configuration management for Autopost
//!
//! Endpoints, retry policy and image settings live in a TOML file. Credentials
//! never do; see [`crate::credentials`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::types::PlatformId;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub graph: GraphConfig,
    pub twitter: TwitterConfig,
    pub relay: RelayConfig,
    pub retry: RetryConfig,
    pub image: ImageConfig,
    pub http: HttpConfig,
    pub defaults: DefaultsConfig,
}

/// Facebook Graph API, shared by the Facebook and Instagram clients
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub base_url: String,
    pub api_version: String,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com".to_string(),
            api_version: "v18.0".to_string(),
        }
    }
}

impl GraphConfig {
    /// `{base_url}/{api_version}/{node}/{edge}`
    pub fn endpoint(&self, node: &str, edge: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.api_version,
            node,
            edge
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub upload_url: String,
    pub tweet_url: String,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://upload.twitter.com/1.1/media/upload.json".to_string(),
            tweet_url: "https://api.twitter.com/2/tweets".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub upload_url: String,
    /// Optional ImageKit folder to upload into
    pub folder: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            upload_url: "https://upload.imagekit.io/api/v1/files/upload".to_string(),
            folder: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    /// Fixed delay between attempts, e.g. `"2s"`
    pub delay: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: "2s".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Result<Duration> {
        parse_duration("retry.delay", &self.delay)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// JPEG quality used when re-encoding, 1..=100
    pub quality: u8,
    /// Where prepared images are written; the system temp dir when unset
    pub scratch_dir: Option<String>,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            quality: 85,
            scratch_dir: None,
        }
    }
}

impl ImageConfig {
    pub fn scratch_dir(&self) -> PathBuf {
        match &self.scratch_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).to_string()),
            None => std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout, e.g. `"60s"`
    pub timeout: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: "60s".to_string(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Result<Duration> {
        parse_duration("http.timeout", &self.timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub platforms: Vec<PlatformId>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            platforms: PlatformId::ALL.to_vec(),
        }
    }
}

fn parse_duration(field: &str, value: &str) -> Result<Duration> {
    humantime::parse_duration(value).map_err(|e| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

impl Config {
    /// Load configuration from the default location
    ///
    /// A missing file at the default location yields the built-in defaults;
    /// a path given through `AUTOPOST_CONFIG` must exist.
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("AUTOPOST_CONFIG") {
            let path = PathBuf::from(shellexpand::tilde(&path).to_string());
            return Self::load_from_path(&path);
        }

        let config_path = resolve_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            tracing::debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "retry.max_attempts".to_string(),
                reason: "must be at least 1".to_string(),
            }
            .into());
        }
        self.retry.delay()?;
        self.http.timeout()?;

        if !(1..=100).contains(&self.image.quality) {
            return Err(ConfigError::InvalidValue {
                field: "image.quality".to_string(),
                reason: format!("{} is outside 1..=100", self.image.quality),
            }
            .into());
        }

        if self.graph.api_version.trim().is_empty() {
            return Err(ConfigError::MissingField("graph.api_version".to_string()).into());
        }

        Ok(())
    }
}

/// Resolve the configuration file path under the user config directory
pub fn resolve_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("autopost").join("config.toml"))
}
