use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info_span, warn, Instrument};

use super::AppState;
use crate::error::Error;
use crate::knowledge::DEFAULT_ROLE;
use crate::search::MatchResult;

/// Body of `POST /rag/chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub model: Option<String>,
    pub roles: usize,
    pub items: usize,
    pub uptime: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub roles: Vec<String>,
    pub items: usize,
}

/// Error response body: `{"error": "..."}`.
pub(super) struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::EmbeddingTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Embedding(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

pub(super) async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<MatchResult>, ApiError> {
    let request_id = uuid::Uuid::new_v4();
    let role = request
        .role
        .clone()
        .unwrap_or_else(|| DEFAULT_ROLE.to_string());
    let span = info_span!("chat", %request_id, role = %role);

    async move {
        let index = state.index().await;
        match state
            .matcher()
            .match_query(&index, &request.message, &role)
            .await
        {
            Ok(result) => {
                metrics::counter!("rag_queries_total", "outcome" => result.outcome.as_str())
                    .increment(1);
                if result.is_match() {
                    metrics::histogram!("rag_match_confidence").record(result.confidence as f64);
                }
                Ok(Json(result))
            }
            Err(e) => {
                if e.is_embedding() {
                    metrics::counter!("rag_embedding_errors_total").increment(1);
                }
                error!("Query failed: {}", e);
                Err(ApiError(e))
            }
        }
    }
    .instrument(span)
    .await
}

pub(super) async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, ApiError> {
    let index = state.reload().await.map_err(|e| {
        warn!("Reload failed, keeping current index: {}", e);
        ApiError(e)
    })?;

    Ok(Json(ReloadResponse {
        roles: index.roles().map(String::from).collect(),
        items: index.len(),
    }))
}

pub(super) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let index = state.index().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: index.model().map(String::from),
        roles: index.role_count(),
        items: index.len(),
        uptime: state.start_time.elapsed().as_secs(),
    })
}

pub(super) async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
