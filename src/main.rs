//! Jurify RAG service CLI
//!
//! Command-line interface for running the FAQ retrieval service.

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jurify_rag::{
    create_provider, ApiConfig, ApiServer, AppState, EmbeddingProvider, Error, HealthResponse,
    JsonFileSource, KnowledgeSource, MatchConfig, QueryMatcher, Result, RetrievalIndex,
    ServiceConfig, DEFAULT_ROLE,
};

#[derive(Parser)]
#[command(name = "jurify-rag")]
#[command(author, version, about = "Role-partitioned FAQ retrieval service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "config.toml")]
        output: String,
    },

    /// Build the index and serve the HTTP API
    Start {
        /// HTTP listen address (overrides config and PORT)
        #[arg(long)]
        listen: Option<String>,

        /// Knowledge base JSON file
        #[arg(long)]
        knowledge: Option<PathBuf>,

        /// Embedding model identifier
        #[arg(long)]
        model: Option<String>,
    },

    /// Answer a single message and print the JSON response
    Ask {
        /// The question to answer
        message: String,

        /// Role to answer for
        #[arg(long, default_value = DEFAULT_ROLE)]
        role: String,

        /// Knowledge base JSON file
        #[arg(long)]
        knowledge: Option<PathBuf>,
    },

    /// Check service health
    Health {
        /// API endpoint to check
        #[arg(long, default_value = "http://localhost:8001")]
        endpoint: String,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

fn load_config(path: &str) -> Result<ServiceConfig> {
    let mut config = if Path::new(path).exists() {
        info!("Loading configuration from: {}", path);
        ServiceConfig::load(path)?
    } else {
        info!("Using default configuration");
        ServiceConfig::default()
    };
    config.apply_env()?;
    Ok(config)
}

type Loaded = (Arc<dyn EmbeddingProvider>, Arc<dyn KnowledgeSource>, RetrievalIndex);

/// Load the embedding model and build the index, off the async workers.
async fn build_index(config: &ServiceConfig) -> Result<Loaded> {
    let model = config.retrieval.model.clone();
    let source: Arc<dyn KnowledgeSource> =
        Arc::new(JsonFileSource::new(config.knowledge.path.clone()));
    let policy = config.knowledge.invalid_records;

    let task_source = Arc::clone(&source);
    tokio::task::spawn_blocking(move || -> Result<Loaded> {
        info!("Initializing embedding model {} (downloaded on first use)...", model);
        let provider = create_provider(&model)?;
        let index = RetrievalIndex::from_source(task_source.as_ref(), policy, provider.as_ref())?;
        Ok((provider, task_source, index))
    })
    .await
    .map_err(|e| Error::Index(format!("index build task failed: {}", e)))?
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { output } => {
            info!("Writing default configuration to: {}", output);
            ServiceConfig::default().save(&output)?;
            info!("Configuration saved successfully");
        }

        Commands::Start {
            listen,
            knowledge,
            model,
        } => {
            info!("Starting Jurify RAG service...");

            let mut config = load_config(&cli.config)?;
            if let Some(listen) = listen {
                config.server.listen_address = listen;
            }
            if let Some(knowledge) = knowledge {
                config.knowledge.path = knowledge;
            }
            if let Some(model) = model {
                config.retrieval.model = model;
            }
            config.validate()?;

            let (provider, source, index) = build_index(&config).await?;
            if index.is_empty() {
                warn!("Knowledge index is empty; every query will get the fallback answer");
            } else {
                info!(
                    "Index ready: {} roles, {} items",
                    index.role_count(),
                    index.len()
                );
            }

            let matcher = QueryMatcher::new(provider, MatchConfig::from(&config.retrieval));
            let mut state = AppState::new(index, matcher, source, config.knowledge.invalid_records);

            if config.server.metrics_enabled {
                match PrometheusBuilder::new().install_recorder() {
                    Ok(handle) => state = state.with_metrics(handle),
                    Err(e) => warn!("Failed to install metrics recorder: {}", e),
                }
            }

            let server = ApiServer::with_state(ApiConfig::from(config.server.clone()), state);
            info!("Press Ctrl+C to stop");
            server
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!("Failed to listen for shutdown signal: {}", e);
                    }
                    info!("Received shutdown signal");
                })
                .await?;
            info!("Service stopped");
        }

        Commands::Ask {
            message,
            role,
            knowledge,
        } => {
            let mut config = load_config(&cli.config)?;
            if let Some(knowledge) = knowledge {
                config.knowledge.path = knowledge;
            }

            let (provider, _, index) = build_index(&config).await?;
            let matcher = QueryMatcher::new(provider, MatchConfig::from(&config.retrieval));
            let result = matcher.match_query(&index, &message, &role).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Health { endpoint } => {
            info!("Checking service health at: {}", endpoint);

            let health_url = format!("{}/health", endpoint.trim_end_matches('/'));

            match tokio::time::timeout(std::time::Duration::from_secs(5), check_health(&health_url))
                .await
            {
                Ok(Ok(response)) => {
                    info!("Service status: {}", response.status);
                    info!("Version: {}", response.version);
                    info!(
                        "Model: {}",
                        response.model.as_deref().unwrap_or("(none)")
                    );
                    info!("Roles: {} ({} items)", response.roles, response.items);
                    info!("Uptime: {} seconds", response.uptime);
                }
                Ok(Err(e)) => {
                    return Err(Error::Api(format!("Health check failed: {}", e)));
                }
                Err(_) => {
                    return Err(Error::Api("Health check timed out".to_string()));
                }
            }
        }
    }

    Ok(())
}

/// Query `/health` on a running service over a plain HTTP/1.1 connection.
async fn check_health(url: &str) -> Result<HealthResponse> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let (authority, path) = split_http_url(url)?;

    let mut stream = TcpStream::connect(authority)
        .await
        .map_err(|e| Error::Api(format!("cannot connect to {}: {}", authority, e)))?;

    let request = format!(
        "GET {} HTTP/1.1\r\nHost: {}\r\nAccept: application/json\r\nConnection: close\r\n\r\n",
        path, authority
    );
    stream.write_all(request.as_bytes()).await?;

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await?;

    parse_health_response(&String::from_utf8_lossy(&raw))
}

/// Split `http://host:port/path` into the socket authority and request path.
fn split_http_url(url: &str) -> Result<(&str, &str)> {
    let rest = url
        .strip_prefix("http://")
        .ok_or_else(|| Error::Api(format!("only http:// endpoints are supported: {}", url)))?;

    let (authority, path) = match rest.find('/') {
        Some(slash) => rest.split_at(slash),
        None => (rest, "/health"),
    };
    if authority.is_empty() {
        return Err(Error::Api(format!("missing host in {}", url)));
    }
    Ok((authority, path))
}

/// Decode a raw HTTP response from `/health`, rejecting non-2xx statuses.
fn parse_health_response(raw: &str) -> Result<HealthResponse> {
    let (head, body) = raw
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::Api("truncated HTTP response".to_string()))?;

    let status_line = head.lines().next().unwrap_or_default();
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| Error::Api(format!("malformed status line: {:?}", status_line)))?;

    if !(200..300).contains(&status) {
        return Err(Error::Api(format!(
            "service answered {}: {}",
            status,
            body.trim()
        )));
    }

    serde_json::from_str(body.trim())
        .map_err(|e| Error::Api(format!("unexpected health payload: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_http_url() {
        assert_eq!(
            split_http_url("http://localhost:8001/health").unwrap(),
            ("localhost:8001", "/health")
        );
        assert_eq!(
            split_http_url("http://127.0.0.1:9000").unwrap(),
            ("127.0.0.1:9000", "/health")
        );
        assert!(split_http_url("https://localhost:8001/health").is_err());
        assert!(split_http_url("http:///health").is_err());
    }

    #[test]
    fn test_parse_ok_response() {
        let raw = "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\n\r\n\
            {\"status\":\"ok\",\"version\":\"0.1.0\",\"model\":\"hash\",\
            \"roles\":2,\"items\":5,\"uptime\":12}";

        let health = parse_health_response(raw).unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.model.as_deref(), Some("hash"));
        assert_eq!(health.roles, 2);
        assert_eq!(health.items, 5);
    }

    #[test]
    fn test_parse_rejects_error_status() {
        let raw = "HTTP/1.1 503 Service Unavailable\r\n\r\n{\"error\":\"down\"}";

        let err = parse_health_response(raw).unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_parse_rejects_truncated_response() {
        assert!(parse_health_response("HTTP/1.1 200 OK\r\n").is_err());
        assert!(parse_health_response("garbage\r\n\r\n{}").is_err());
    }
}
