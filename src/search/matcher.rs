//! Nearest-match query resolution.

use moka::future::Cache;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::action::augment;
use super::embedding::{Embedding, EmbeddingProvider};
use super::index::RetrievalIndex;
use super::similarity::best_match;
use super::DEFAULT_MATCH_THRESHOLD;
use crate::config::RetrievalConfig;
use crate::error::{Error, Result};
use crate::knowledge::{normalize_role, Action, DEFAULT_ROLE};

/// Answer for a blank query.
pub const EMPTY_QUERY_ANSWER: &str = "Please ask a question.";

/// Answer when neither the requested role nor the default role has entries.
pub const NO_ROLE_ANSWER: &str = "I don't have information for your role.";

/// Answer when no entry clears the threshold.
pub const FALLBACK_ANSWER: &str =
    "Please contact support or check your dashboard for this information.";

/// Matching parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchConfig {
    /// A match must score strictly above this similarity
    pub threshold: f32,
    /// Upper bound for one query embedding call
    pub embed_timeout: Duration,
    /// Query embeddings kept in memory; 0 disables caching
    pub cache_capacity: u64,
    /// Embedding calls allowed on the blocking pool at once
    pub max_in_flight: usize,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_MATCH_THRESHOLD,
            embed_timeout: Duration::from_secs(10),
            cache_capacity: 1024,
            max_in_flight: 16,
        }
    }
}

impl From<&RetrievalConfig> for MatchConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            threshold: config.match_threshold,
            embed_timeout: config.embed_timeout(),
            cache_capacity: config.query_cache_capacity,
            max_in_flight: config.max_concurrent_embeddings,
        }
    }
}

/// How a query was resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchOutcome {
    /// Blank query, nothing embedded
    #[default]
    EmptyQuery,
    /// The index holds no entries at all
    EmptyIndex,
    /// Neither the requested nor the default role is indexed
    NoRoleData,
    /// The role's partition has no items
    EmptyPartition,
    /// Best similarity did not clear the threshold
    BelowThreshold,
    /// An entry cleared the threshold
    Matched,
}

impl MatchOutcome {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOutcome::EmptyQuery => "empty_query",
            MatchOutcome::EmptyIndex => "empty_index",
            MatchOutcome::NoRoleData => "no_role_data",
            MatchOutcome::EmptyPartition => "empty_partition",
            MatchOutcome::BelowThreshold => "below_threshold",
            MatchOutcome::Matched => "matched",
        }
    }
}

/// Response for a query.
///
/// `confidence` is the winning similarity for a match and exactly 0.0 for
/// every other outcome. `action` is only serialized when present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub answer: String,
    pub confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(skip)]
    pub outcome: MatchOutcome,
}

impl MatchResult {
    fn unmatched(answer: &str, outcome: MatchOutcome) -> Self {
        Self {
            answer: answer.to_string(),
            confidence: 0.0,
            action: None,
            outcome,
        }
    }

    pub fn empty_query() -> Self {
        Self::unmatched(EMPTY_QUERY_ANSWER, MatchOutcome::EmptyQuery)
    }

    pub fn no_role_data() -> Self {
        Self::unmatched(NO_ROLE_ANSWER, MatchOutcome::NoRoleData)
    }

    pub fn fallback(outcome: MatchOutcome) -> Self {
        Self::unmatched(FALLBACK_ANSWER, outcome)
    }

    pub fn is_match(&self) -> bool {
        self.outcome == MatchOutcome::Matched
    }
}

/// Resolves queries against a [`RetrievalIndex`].
///
/// The index is passed per call so callers can swap it without rebuilding the
/// matcher.
pub struct QueryMatcher {
    provider: Arc<dyn EmbeddingProvider>,
    config: MatchConfig,
    cache: Option<Cache<String, Embedding>>,
    in_flight: Arc<Semaphore>,
}

impl QueryMatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: MatchConfig) -> Self {
        let cache = (config.cache_capacity > 0).then(|| Cache::new(config.cache_capacity));
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            provider,
            config,
            cache,
            in_flight,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Find the best answer for `query` within `requested_role`.
    ///
    /// Unknown roles fall back to [`DEFAULT_ROLE`]. An index without any
    /// entries answers every query with the generic fallback. Only embedding
    /// failures are errors; every other outcome is a regular result.
    pub async fn match_query(
        &self,
        index: &RetrievalIndex,
        query: &str,
        requested_role: &str,
    ) -> Result<MatchResult> {
        if query.trim().is_empty() {
            return Ok(MatchResult::empty_query());
        }

        if index.is_empty() {
            return Ok(MatchResult::fallback(MatchOutcome::EmptyIndex));
        }

        let mut role = normalize_role(requested_role);
        if !index.contains_role(&role) {
            debug!("Role {:?} not indexed, using {}", role, DEFAULT_ROLE);
            role = DEFAULT_ROLE.to_string();
        }

        let Some(partition) = index.partition(&role) else {
            return Ok(MatchResult::no_role_data());
        };

        if partition.is_empty() {
            return Ok(MatchResult::fallback(MatchOutcome::EmptyPartition));
        }

        let query_embedding = self.embed_query(query).await?;
        if let Some(first) = partition.embeddings().first() {
            if first.len() != query_embedding.len() {
                return Err(Error::Embedding(format!(
                    "query embedding has {} dimensions, index has {}",
                    query_embedding.len(),
                    first.len()
                )));
            }
        }

        match best_match(&query_embedding, partition.embeddings()) {
            Some((best, score)) if score > self.config.threshold => {
                let item = &partition.items()[best];
                info!(
                    "Role: {} | Query: {} | Match: {} | Score: {:.4}",
                    role, query, item.question, score
                );
                Ok(MatchResult {
                    answer: item.answer.clone(),
                    confidence: score,
                    action: augment(item.action.as_ref()),
                    outcome: MatchOutcome::Matched,
                })
            }
            best => {
                debug!(
                    "Role: {} | Query: {} | best score {:?} below threshold {}",
                    role,
                    query,
                    best.map(|(_, score)| score),
                    self.config.threshold
                );
                Ok(MatchResult::fallback(MatchOutcome::BelowThreshold))
            }
        }
    }

    async fn embed_query(&self, query: &str) -> Result<Embedding> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(query).await {
                return Ok(hit);
            }
        }

        let embedding = self.embed_with_timeout(query.to_string()).await?;

        if let Some(cache) = &self.cache {
            cache.insert(query.to_string(), embedding.clone()).await;
        }
        Ok(embedding)
    }

    /// Run the (blocking) provider off the async workers, bounded by the
    /// configured timeout.
    ///
    /// A blocking call cannot be cancelled. After a timeout the call keeps
    /// its pool thread and its permit until the provider returns, so at most
    /// `max_in_flight` calls ever occupy the blocking pool. Waiting for a
    /// permit counts against the same timeout.
    async fn embed_with_timeout(&self, text: String) -> Result<Embedding> {
        let provider = Arc::clone(&self.provider);
        let in_flight = Arc::clone(&self.in_flight);

        let call = async move {
            let permit = in_flight
                .acquire_owned()
                .await
                .map_err(|e| Error::Embedding(format!("embedding pool closed: {}", e)))?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                provider.embed(&text)
            })
            .await
            .map_err(|e| Error::Embedding(format!("embedding task failed: {}", e)))?
        };

        match tokio::time::timeout(self.config.embed_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::EmbeddingTimeout {
                timeout_ms: self.config.embed_timeout.as_millis() as u64,
            }),
        }
    }
}
