//! Error types for the retrieval service.

use thiserror::Error;

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading knowledge, building the index or
/// answering queries.
///
/// Query outcomes such as an empty message, an unknown role or a weak match
/// are not errors; they resolve to regular responses with zero confidence.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Knowledge data could not be read or parsed
    #[error("Knowledge source error: {0}")]
    KnowledgeSource(String),

    /// A knowledge record failed validation at load time
    #[error("Invalid knowledge record #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// The embedding provider failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// The embedding provider did not answer in time
    #[error("Embedding timed out after {timeout_ms}ms")]
    EmbeddingTimeout { timeout_ms: u64 },

    /// The index could not be built consistently
    #[error("Index error: {0}")]
    Index(String),

    /// HTTP API failure
    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Whether this error came from the embedding provider (failure or timeout).
    pub fn is_embedding(&self) -> bool {
        matches!(self, Error::Embedding(_) | Error::EmbeddingTimeout { .. })
    }
}
