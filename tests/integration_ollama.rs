#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Integration tests that require a local Ollama instance
// Run with: cargo test --test integration_ollama -- --ignored

use kb_search::config::OllamaConfig;
use kb_search::embeddings::{BatchEmbedder, Embedder, OllamaClient};
use std::env;
use std::sync::Arc;
use tracing::{debug, info};

const TEST_MODEL: &str = "mxbai-embed-large";
const DEFAULT_OLLAMA_HOST: &str = "localhost";
const DEFAULT_OLLAMA_PORT: u16 = 11434;

fn create_integration_test_client() -> OllamaClient {
    let host = env::var("OLLAMA_HOST").unwrap_or_else(|_| DEFAULT_OLLAMA_HOST.to_string());
    let port = env::var("OLLAMA_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_OLLAMA_PORT);
    let model = env::var("OLLAMA_MODEL").unwrap_or_else(|_| TEST_MODEL.to_string());

    let config = OllamaConfig {
        host,
        port,
        model,
        timeout_secs: 120,
        ..OllamaConfig::default()
    };

    OllamaClient::new(&config).expect("Failed to create Ollama client")
}

fn init_test_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

#[tokio::test]
#[ignore = "requires a running Ollama server"]
async fn real_ollama_health_check() {
    init_test_tracing();

    let client = create_integration_test_client();

    info!("Testing health check against real Ollama instance");
    let result = client.health_check().await;

    assert!(
        result.is_ok(),
        "Health check should succeed with local Ollama: {:?}",
        result
    );
}

#[tokio::test]
#[ignore = "requires a running Ollama server"]
async fn real_ollama_list_models() {
    init_test_tracing();

    let client = create_integration_test_client();
    let models = client.list_models().await.expect("should list models");

    assert!(
        !models.is_empty(),
        "Should have at least one model available"
    );
    for model in &models {
        debug!("Available model: {} (size: {:?})", model.name, model.size);
    }
}

#[tokio::test]
#[ignore = "requires a running Ollama server"]
async fn real_ollama_single_embedding() {
    init_test_tracing();

    let client = create_integration_test_client();
    let embedding = client
        .embed_one("Smart thermostats can reduce home energy consumption.")
        .await
        .expect("embedding should succeed");

    info!("Generated embedding with {} dimensions", embedding.len());
    assert!(
        embedding.len() >= 100,
        "Embedding should have reasonable number of dimensions"
    );
}

#[tokio::test]
#[ignore = "requires a running Ollama server"]
async fn real_ollama_batch_preserves_order() {
    init_test_tracing();

    let client = Arc::new(create_integration_test_client());
    let batch = BatchEmbedder::new(Arc::clone(&client) as Arc<dyn Embedder>, 3);

    let texts: Vec<String> = [
        "Heat pumps move heat rather than generating it.",
        "LED bulbs use a fraction of the power of incandescent bulbs.",
        "Neural networks learn representations from data.",
        "Gradient descent minimises a loss function.",
    ]
    .iter()
    .map(ToString::to_string)
    .collect();

    let embeddings = batch
        .embed_batch(&texts)
        .await
        .expect("batch should succeed");
    assert_eq!(embeddings.len(), texts.len());

    // Each slot matches a direct call for the same text
    for (text, embedding) in texts.iter().zip(&embeddings) {
        let direct = client.embed_one(text).await.expect("direct call");
        let drift: f32 = direct
            .iter()
            .zip(embedding)
            .map(|(a, b)| (a - b).abs())
            .sum();
        assert!(drift < 1e-3, "embedding for {text:?} drifted by {drift}");
    }
}
