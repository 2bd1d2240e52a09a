// Configuration management module
// Loads config.toml from the application directory and prints the effective settings

pub mod settings;

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

pub use settings::{
    Config, ConfigError, OllamaConfig, SearchConfig, ServerConfig, StoreConfig,
    DEFAULT_COLLECTION, DEFAULT_CONCURRENCY, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_RESULT_COUNT, DEFAULT_SERVER_PORT,
};

/// Get the default configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_dir()
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    match config.ollama_url() {
        Ok(url) => eprintln!("  URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  URL: {} ({})", style("Invalid").red(), e),
    }
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Concurrency: {}",
        style(config.ollama.concurrency).cyan()
    );
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    eprintln!(
        "  Request Timeout: {}s",
        style(config.ollama.timeout_secs).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Store Settings:").bold().yellow());
    eprintln!("  Collection: {}", style(&config.store.collection).cyan());
    eprintln!(
        "  Vector Data: {}",
        style(config.vector_database_path().display()).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Search Settings:").bold().yellow());
    eprintln!("  Results (K): {}", style(config.search.result_count).cyan());
    eprintln!(
        "  Server: {}",
        style(format!("http://{}", config.server.bind_address())).cyan()
    );

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}
