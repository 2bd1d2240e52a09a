// HTTP search server
// GET / serves the search page, GET /search?q= returns ranked results as JSON


use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::database::SearchResult;
use crate::search::SearchService;
use crate::{KbError, Result};

/// Error returned by a handler, rendered as `{"error", "code"}`
#[derive(Debug)]
pub struct ApiError(KbError);

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: u16,
}

impl From<KbError> for ApiError {
    #[inline]
    fn from(err: KbError) -> Self {
        Self(err)
    }
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        match self.0 {
            KbError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            KbError::CollectionNotFound(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Search request failed: {}", self.0);
        } else {
            debug!("Rejected search request: {}", self.0);
        }

        let body = ErrorBody {
            error: self.0.to_string(),
            code: status.as_u16(),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

/// Build the router around a search service
#[inline]
pub fn router(service: SearchService) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/search", get(search))
        .with_state(service)
}

/// Serve until `shutdown` fires
#[inline]
pub async fn serve(
    listener: TcpListener,
    service: SearchService,
    shutdown: CancellationToken,
) -> Result<()> {
    let address = listener.local_addr()?;
    info!("Server running at http://{}", address);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(SEARCH_PAGE)
}

async fn search(
    State(service): State<SearchService>,
    Query(params): Query<SearchParams>,
) -> std::result::Result<Json<Vec<SearchResult>>, ApiError> {
    let query = params.q.unwrap_or_default();
    debug!("Search request: {:?}", query);

    let results = service.search(&query).await.inspect_err(|e| {
        if matches!(e, KbError::CollectionNotFound(_)) {
            warn!("Search requested before ingestion: {}", e);
        }
    })?;

    Ok(Json(results))
}

const SEARCH_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>Knowledge Base Search</title>
</head>
<body>
  <h1>Knowledge Base Search</h1>
  <form id="search-form">
    <input id="q" placeholder="Search..." style="width:300px;padding:8px">
    <button type="submit">Search</button>
  </form>
  <div id="results"></div>
  <script>
    function escapeHtml(text) {
      const div = document.createElement('div');
      div.textContent = text;
      return div.innerHTML;
    }

    document.getElementById('search-form').addEventListener('submit', async (event) => {
      event.preventDefault();
      const q = document.getElementById('q').value;
      const target = document.getElementById('results');
      const res = await fetch('/search?q=' + encodeURIComponent(q));
      const data = await res.json();
      if (!res.ok) {
        target.innerHTML = '<p style="color:#b00">' + escapeHtml(data.error) + '</p>';
        return;
      }
      target.innerHTML = data.map(d =>
        '<div style="margin:20px 0;padding:10px;border:1px solid #ccc">' +
        '<h3>' + escapeHtml(d.title) + '</h3>' +
        '<p>' + escapeHtml(d.document) + '</p>' +
        '<small>Distance: ' + d.distance.toFixed(3) + '</small></div>'
      ).join('');
    });
  </script>
</body>
</html>
"#;
