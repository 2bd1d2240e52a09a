use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kb_search::commands::{delete_documents, ingest, list_documents, search, serve, show_status};
use kb_search::config::{Config, get_config_dir, show_config};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::warn;

#[derive(Parser)]
#[command(name = "kb-search")]
#[command(about = "Semantic search over a small knowledge base using Ollama embeddings")]
#[command(version)]
struct Cli {
    /// Application directory holding config.toml and vector data
    #[arg(long, global = true, env = "KB_SEARCH_HOME")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the corpus and rebuild the collection
    Ingest {
        /// JSON file with an array of {id, title, content}; defaults to the built-in samples
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// List all stored documents with an embedding preview
    List,
    /// Delete all documents from the collection
    Delete,
    /// Search the collection from the terminal
    Search {
        /// Free-text query
        query: String,
        /// Number of results to return
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Start the HTTP search server
    Serve,
    /// Show Ollama and collection status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.home {
        Some(dir) => dir,
        None => get_config_dir().context("Failed to determine application directory")?,
    };

    if let Commands::Config { show } = cli.command {
        if !show {
            eprintln!("Edit {} to change settings", config_dir.join("config.toml").display());
        }
        return show_config(&config_dir);
    }

    let config = Config::load(&config_dir).context("Failed to load configuration")?;

    match cli.command {
        Commands::Ingest { file } => {
            let cancel = cancel_on_ctrl_c();
            ingest(&config, file.as_deref(), &cancel).await?;
        }
        Commands::List => {
            list_documents(&config).await?;
        }
        Commands::Delete => {
            delete_documents(&config).await?;
        }
        Commands::Search { query, limit } => {
            search(&config, &query, limit).await?;
        }
        Commands::Serve => {
            serve(&config, cancel_on_ctrl_c()).await?;
        }
        Commands::Status => {
            show_status(&config).await?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

/// Token cancelled by the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        warn!("Interrupted, shutting down");
        trigger.cancel();
    });
    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["kb-search", "list"]).expect("should parse");
        assert!(matches!(cli.command, Commands::List));
    }

    #[test]
    fn ingest_with_file() {
        let cli = Cli::try_parse_from(["kb-search", "ingest", "--file", "docs.json"])
            .expect("should parse");

        let Commands::Ingest { file } = cli.command else {
            panic!("expected ingest command");
        };
        assert_eq!(file, Some(PathBuf::from("docs.json")));
    }

    #[test]
    fn ingest_defaults_to_sample_corpus() {
        let cli = Cli::try_parse_from(["kb-search", "ingest"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Ingest { file: None }));
    }

    #[test]
    fn search_with_limit() {
        let cli = Cli::try_parse_from(["kb-search", "search", "energy savings", "--limit", "5"])
            .expect("should parse");

        let Commands::Search { query, limit } = cli.command else {
            panic!("expected search command");
        };
        assert_eq!(query, "energy savings");
        assert_eq!(limit, Some(5));
    }

    #[test]
    fn search_requires_query() {
        let err = Cli::try_parse_from(["kb-search", "search"])
            .err()
            .expect("query is required");
        assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn home_flag_is_global() {
        let cli = Cli::try_parse_from(["kb-search", "delete", "--home", "/tmp/kb"])
            .expect("should parse");
        assert!(matches!(cli.command, Commands::Delete));
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/kb")));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["kb-search", "config", "--show"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn serve_and_status_commands() {
        let serve = Cli::try_parse_from(["kb-search", "serve"]).expect("should parse");
        assert!(matches!(serve.command, Commands::Serve));

        let status = Cli::try_parse_from(["kb-search", "status"]).expect("should parse");
        assert!(matches!(status.command, Commands::Status));
    }

    #[test]
    fn invalid_command() {
        let err = Cli::try_parse_from(["kb-search", "invalid"])
            .err()
            .expect("unknown subcommand should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn help_message() {
        let err = Cli::try_parse_from(["kb-search", "--help"])
            .err()
            .expect("help exits early");
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
    }
}
