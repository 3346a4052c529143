//! Role-partitioned semantic FAQ retrieval.
//!
//! Answers free-text questions with the closest entry of a small knowledge
//! base, scoped by the caller's role. Questions are embedded once at startup;
//! each query is embedded and compared by cosine similarity against its
//! role's entries.
//!
//! ```ignore
//! use jurify_rag::{create_provider, JsonFileSource, InvalidRecordPolicy};
//! use jurify_rag::{MatchConfig, QueryMatcher, RetrievalIndex};
//!
//! let provider = create_provider("all-MiniLM-L6-v2")?;
//! let source = JsonFileSource::new("knowledge.json");
//! let index = RetrievalIndex::from_source(&source, InvalidRecordPolicy::Skip, provider.as_ref())?;
//!
//! let matcher = QueryMatcher::new(provider, MatchConfig::default());
//! let result = matcher.match_query(&index, "How do I pay my tax?", "citizen").await?;
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod search;

pub use api::{ApiConfig, ApiServer, AppState, ChatRequest, HealthResponse};
pub use config::ServiceConfig;
pub use error::{Error, Result};
pub use knowledge::{
    load_items, Action, InvalidRecordPolicy, JsonFileSource, KnowledgeItem, KnowledgeRecord,
    KnowledgeSource, DEFAULT_ROLE,
};
pub use search::{
    augment, create_provider, Embedding, EmbeddingProvider, HashEmbedder, MatchConfig,
    MatchOutcome, MatchResult, QueryMatcher, RetrievalIndex, RolePartition,
};
