use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Collection '{0}' not found. Run `kb-search ingest` first")]
    CollectionNotFound(String),

    #[error("Vector index error: {0}")]
    VectorIndex(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<config::ConfigError> for KbError {
    #[inline]
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

pub mod commands;
pub mod config;
pub mod corpus;
pub mod database;
pub mod embeddings;
pub mod indexer;
pub mod search;
pub mod server;
