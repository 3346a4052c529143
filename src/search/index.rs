//! Role-partitioned embedding index.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::embedding::{Embedding, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::knowledge::{load_items, InvalidRecordPolicy, KnowledgeItem, KnowledgeSource};

/// Items of one role with their question embeddings.
///
/// `embeddings[i]` is the embedding of `items[i].question`. Fields are private
/// so a partition cannot change after it is built.
#[derive(Debug, Clone)]
pub struct RolePartition {
    items: Vec<KnowledgeItem>,
    embeddings: Vec<Embedding>,
}

impl RolePartition {
    fn new(items: Vec<KnowledgeItem>, embeddings: Vec<Embedding>) -> Result<Self> {
        if items.len() != embeddings.len() {
            return Err(Error::Index(format!(
                "embedding provider returned {} vectors for {} questions",
                embeddings.len(),
                items.len()
            )));
        }
        Ok(Self { items, embeddings })
    }

    pub fn items(&self) -> &[KnowledgeItem] {
        &self.items
    }

    pub fn embeddings(&self) -> &[Embedding] {
        &self.embeddings
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Immutable mapping from role to [`RolePartition`].
///
/// Built once, then shared read-only (typically behind an `Arc`). Reloading
/// means building a new index and swapping the whole value.
#[derive(Debug, Clone, Default)]
pub struct RetrievalIndex {
    partitions: BTreeMap<String, RolePartition>,
    model: Option<String>,
}

impl RetrievalIndex {
    /// An index with no roles; every query resolves to a fallback answer.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Group items by role and embed each group's questions in one batch.
    ///
    /// Items keep their source order inside a partition. Roles without items
    /// never appear.
    pub fn build(items: Vec<KnowledgeItem>, provider: &dyn EmbeddingProvider) -> Result<Self> {
        let mut groups: BTreeMap<String, Vec<KnowledgeItem>> = BTreeMap::new();
        for item in items {
            groups.entry(item.role.clone()).or_default().push(item);
        }

        let mut partitions = BTreeMap::new();
        for (role, role_items) in groups {
            if role_items.is_empty() {
                continue;
            }

            info!("Embedding {} items for role {}", role_items.len(), role);
            let questions: Vec<&str> = role_items.iter().map(|i| i.question.as_str()).collect();
            let embeddings = provider.embed_batch(&questions)?;

            partitions.insert(role, RolePartition::new(role_items, embeddings)?);
        }

        debug!(
            "Built retrieval index with {} roles using {}",
            partitions.len(),
            provider.model_name()
        );

        Ok(Self {
            partitions,
            model: Some(provider.model_name().to_string()),
        })
    }

    /// Load and validate records from `source`, then [`build`](Self::build).
    pub fn from_source(
        source: &dyn KnowledgeSource,
        policy: InvalidRecordPolicy,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Self> {
        let items = load_items(source, policy)?;
        Self::build(items, provider)
    }

    /// Partition for an exact (already normalized) role name.
    pub fn partition(&self, role: &str) -> Option<&RolePartition> {
        self.partitions.get(role)
    }

    pub fn contains_role(&self, role: &str) -> bool {
        self.partitions.contains_key(role)
    }

    /// Role names, sorted.
    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.partitions.keys().map(String::as_str)
    }

    pub fn role_count(&self) -> usize {
        self.partitions.len()
    }

    /// Total number of items across all roles.
    pub fn len(&self) -> usize {
        self.partitions.values().map(RolePartition::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Embedding model the index was built with, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}
