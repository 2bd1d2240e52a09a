
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 1024;
pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_COLLECTION: &str = "knowledge-base";
pub const DEFAULT_RESULT_COUNT: usize = 3;
pub const DEFAULT_SERVER_PORT: u16 = 3000;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    pub model: String,
    /// Maximum number of embedding requests in flight at once
    pub concurrency: usize,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    #[inline]
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub collection: String,
}

impl Default for StoreConfig {
    #[inline]
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    pub result_count: usize,
}

impl Default for SearchConfig {
    #[inline]
    fn default() -> Self {
        Self {
            result_count: DEFAULT_RESULT_COUNT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    #[inline]
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_SERVER_PORT,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid concurrency: {0} (must be between 1 and 64)")]
    InvalidConcurrency(usize),
    #[error("Invalid embedding dimension: {0} (must be between 8 and 8192)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid collection name: '{0}' (letters, digits, '-', '_' and '.' only)")]
    InvalidCollection(String),
    #[error("Invalid result count: {0} (must be between 1 and 100)")]
    InvalidResultCount(usize),
    #[error("Invalid server host: '{0}'")]
    InvalidServerHost(String),
}

impl Config {
    /// Default application directory, `~/.kb-search`
    #[inline]
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".kb-search"))
            .or_else(|| dirs::data_dir().map(|data| data.join("kb-search")))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.store.validate()?;
        self.search.validate()?;
        self.server.validate()?;
        Ok(())
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.base_dir.join("config.toml")
    }

    /// Directory holding the LanceDB tables
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.base_dir.join("vectors")
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }
}

impl OllamaConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        let url = self.ollama_url()?;
        if url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::InvalidUrl(url.to_string()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if !(1..=64).contains(&self.concurrency) {
            return Err(ConfigError::InvalidConcurrency(self.concurrency));
        }

        if !(8..=8192).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl StoreConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = !self.collection.is_empty()
            && self
                .collection
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if valid {
            Ok(())
        } else {
            Err(ConfigError::InvalidCollection(self.collection.clone()))
        }
    }
}

impl SearchConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.result_count) {
            return Err(ConfigError::InvalidResultCount(self.result_count));
        }
        Ok(())
    }
}

impl ServerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidServerHost(self.host.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }
        Ok(())
    }

    /// Socket address string suitable for `TcpListener::bind`
    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
