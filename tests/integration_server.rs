#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// Drives the HTTP server over a real socket with a wiremock Ollama behind it

use kb_search::corpus::Document;
use kb_search::database::{CollectionStore, LanceIndex};
use kb_search::embeddings::{BatchEmbedder, OllamaClient};
use kb_search::indexer::Indexer;
use kb_search::search::SearchService;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestServer {
    address: SocketAddr,
    indexer: Indexer,
    shutdown: CancellationToken,
    _ollama: MockServer,
    _temp_dir: TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn mock_embedding(server: &MockServer, input: &str, embedding: [f32; 2]) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .and(body_partial_json(json!({ "input": input })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [embedding]
        })))
        .mount(server)
        .await;
}

async fn start_server() -> TestServer {
    let ollama = MockServer::start().await;
    mock_embedding(&ollama, "North\n\nCold places.", [1.0, 0.0]).await;
    mock_embedding(&ollama, "East\n\nSunrise places.", [0.0, 1.0]).await;
    mock_embedding(&ollama, "polar", [0.9, 0.1]).await;

    let base_url = Url::parse(&ollama.uri()).expect("mock uri is valid");
    let client = OllamaClient::with_base_url(base_url, "test-model", Duration::from_secs(5))
        .expect("should create client");

    let temp_dir = TempDir::new().expect("should create temp dir");
    let index = LanceIndex::open(&temp_dir.path().join("vectors"))
        .await
        .expect("should open LanceDB");
    let store = CollectionStore::new(Arc::new(index), "knowledge-base", 2);
    let batch = Arc::new(BatchEmbedder::new(Arc::new(client), 2));

    let service = SearchService::new(Arc::clone(&batch), store.clone(), 3);
    let indexer = Indexer::new(batch, store);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind ephemeral port");
    let address = listener.local_addr().expect("should have address");
    let shutdown = CancellationToken::new();

    let server_shutdown = shutdown.clone();
    tokio::spawn(async move {
        kb_search::server::serve(listener, service, server_shutdown)
            .await
            .expect("server should run");
    });

    TestServer {
        address,
        indexer,
        shutdown,
        _ollama: ollama,
        _temp_dir: temp_dir,
    }
}

fn documents() -> Vec<Document> {
    vec![
        Document::new("n", "North", "Cold places."),
        Document::new("e", "East", "Sunrise places."),
    ]
}

#[tokio::test]
async fn index_page_is_served() {
    let server = start_server().await;

    let response = reqwest::get(format!("http://{}/", server.address))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    let body = response.text().await.expect("should read body");
    assert!(body.contains("Knowledge Base Search"));
}

#[tokio::test]
async fn search_before_ingest_is_service_unavailable() {
    let server = start_server().await;

    let response = reqwest::get(format!("http://{}/search?q=polar", server.address))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 503);
    let body: Value = response.json().await.expect("error body is json");
    assert_eq!(body["code"], 503);
    assert!(
        body["error"]
            .as_str()
            .expect("error is a string")
            .contains("kb-search ingest")
    );
}

#[tokio::test]
async fn missing_query_is_bad_request() {
    let server = start_server().await;

    let response = reqwest::get(format!("http://{}/search", server.address))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn search_after_ingest_returns_ranked_json() {
    let server = start_server().await;
    server
        .indexer
        .ingest(&documents())
        .await
        .expect("should ingest");

    let response = reqwest::get(format!("http://{}/search?q=polar", server.address))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 200);
    let results: Vec<Value> = response.json().await.expect("results are json");
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["id"], "n");
    assert_eq!(results[0]["title"], "North");
    assert_eq!(results[0]["document"], "North\n\nCold places.");
    assert_eq!(results[1]["id"], "e");

    let first = results[0]["distance"].as_f64().expect("distance is a number");
    let second = results[1]["distance"].as_f64().expect("distance is a number");
    assert!(first < second);
}

#[tokio::test]
async fn embedding_failure_is_internal_error() {
    let server = start_server().await;
    server
        .indexer
        .ingest(&documents())
        .await
        .expect("should ingest");

    // No mock matches this query text, so wiremock answers 404
    let response = reqwest::get(format!("http://{}/search?q=unmocked", server.address))
        .await
        .expect("request should succeed");

    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.expect("error body is json");
    assert_eq!(body["code"], 500);
}
