//! HTTP API.
//!
//! | Method | Path          | Description                              |
//! |--------|---------------|------------------------------------------|
//! | POST   | `/rag/chat`   | Answer a message for a role              |
//! | POST   | `/rag/reload` | Rebuild the index from the knowledge file |
//! | GET    | `/health`     | Liveness and index summary               |
//! | GET    | `/metrics`    | Prometheus metrics                       |

mod handlers;

pub use handlers::{ChatRequest, HealthResponse, ReloadResponse};

use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::knowledge::{InvalidRecordPolicy, KnowledgeSource};
use crate::search::{QueryMatcher, RetrievalIndex};

/// API server settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub listen_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ServerConfig::default().into()
    }
}

impl From<ServerConfig> for ApiConfig {
    fn from(config: ServerConfig) -> Self {
        Self {
            listen_address: config.listen_address,
            cors_enabled: config.cors_enabled,
            cors_origins: config.cors_origins,
        }
    }
}

/// Shared state for request handlers.
///
/// The index is held as `Arc<RetrievalIndex>` behind a lock that is only
/// written when a reload swaps in a freshly built index. Handlers clone the
/// `Arc` and release the lock before matching.
#[derive(Clone)]
pub struct AppState {
    index: Arc<RwLock<Arc<RetrievalIndex>>>,
    matcher: Arc<QueryMatcher>,
    source: Arc<dyn KnowledgeSource>,
    invalid_records: InvalidRecordPolicy,
    reload_lock: Arc<Mutex<()>>,
    pub start_time: Instant,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(
        index: RetrievalIndex,
        matcher: QueryMatcher,
        source: Arc<dyn KnowledgeSource>,
        invalid_records: InvalidRecordPolicy,
    ) -> Self {
        Self {
            index: Arc::new(RwLock::new(Arc::new(index))),
            matcher: Arc::new(matcher),
            source,
            invalid_records,
            reload_lock: Arc::new(Mutex::new(())),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Attach a Prometheus handle for `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// The index currently being served.
    pub async fn index(&self) -> Arc<RetrievalIndex> {
        Arc::clone(&*self.index.read().await)
    }

    pub fn matcher(&self) -> &QueryMatcher {
        &self.matcher
    }

    /// Re-read the knowledge source, build a new index and swap it in.
    ///
    /// The build runs on the blocking pool; readers keep serving the old
    /// index until the swap. Concurrent reloads run one after another.
    pub async fn reload(&self) -> Result<Arc<RetrievalIndex>> {
        let _guard = self.reload_lock.lock().await;

        let source = Arc::clone(&self.source);
        let provider = Arc::clone(self.matcher.provider());
        let policy = self.invalid_records;

        info!("Reloading knowledge from {}", source.describe());
        let index = tokio::task::spawn_blocking(move || {
            RetrievalIndex::from_source(source.as_ref(), policy, provider.as_ref())
        })
        .await
        .map_err(|e| Error::Index(format!("reload task failed: {}", e)))??;

        let index = Arc::new(index);
        *self.index.write().await = Arc::clone(&index);
        info!(
            "Index reloaded: {} roles, {} items",
            index.role_count(),
            index.len()
        );
        Ok(index)
    }
}

/// Build the application router.
pub fn router(state: AppState, config: &ApiConfig) -> Router {
    let router = Router::new()
        .route("/rag/chat", post(handlers::chat))
        .route("/rag/reload", post(handlers::reload))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if config.cors_enabled {
        router.layer(cors_layer(&config.cors_origins))
    } else {
        router
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// HTTP API server.
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn with_state(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), &self.config)
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = &self.config.listen_address;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Api(format!("Failed to bind {}: {}", addr, e)))?;

        info!("API server listening on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::Api(format!("Server error: {}", e)))
    }
}
