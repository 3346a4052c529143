//! Role-partitioned semantic retrieval.
//!
//! The knowledge base is split by role and every partition keeps one
//! pre-computed embedding per question. A query is embedded once and scored
//! against its role's partition with cosine similarity; the best entry is
//! returned only if it clears the match threshold.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐   build    ┌────────────────────┐
//! │ KnowledgeItem[]  │──────────▶│   RetrievalIndex    │
//! └──────────────────┘ (1 batch  │ role → RolePartition│
//!                      per role) └─────────┬──────────┘
//!                                          │
//! ┌──────────────────┐  embed     ┌────────▼─────────┐    ┌──────────┐
//! │ query + role     │──────────▶│   QueryMatcher    │───▶│ augment  │
//! └──────────────────┘            │ cosine, threshold │    │ (action) │
//!                                 └──────────────────┘    └────┬─────┘
//!                                                              ▼
//!                                                        MatchResult
//! ```
//!
//! The index is immutable once built and is shared behind an `Arc`; matching
//! never takes a lock.

pub mod action;
mod embedding;
mod index;
mod matcher;
pub mod similarity;

pub use action::augment;
pub use embedding::{
    create_provider, Embedding, EmbeddingProvider, FastEmbedProvider, HashEmbedder,
};
pub use index::{RetrievalIndex, RolePartition};
pub use matcher::{
    MatchConfig, MatchOutcome, MatchResult, QueryMatcher, EMPTY_QUERY_ANSWER, FALLBACK_ANSWER,
    NO_ROLE_ANSWER,
};

/// Default embedding model (all-MiniLM-L6-v2 - 384 dimensions, good balance of speed/quality)
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

/// Embedding dimension for the default model
pub const EMBEDDING_DIM: usize = 384;

/// Model identifier selecting the offline [`HashEmbedder`]
pub const HASH_MODEL: &str = "hash";

/// Default similarity a match has to exceed
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.35;
