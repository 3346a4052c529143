//! Service configuration.
//!
//! Loaded from a TOML file (see `jurify-rag init`), then overridden by
//! environment variables:
//!
//! | Variable          | Field                          |
//! |-------------------|--------------------------------|
//! | `PORT`            | port of `server.listen_address` |
//! | `KNOWLEDGE_FILE`  | `knowledge.path`               |
//! | `MATCH_THRESHOLD` | `retrieval.match_threshold`    |
//! | `EMBEDDING_MODEL` | `retrieval.model`              |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::knowledge::InvalidRecordPolicy;
use crate::search::{DEFAULT_MATCH_THRESHOLD, DEFAULT_MODEL};

/// Default HTTP port, used when neither the config file nor `PORT` set one.
pub const DEFAULT_PORT: u16 = 8001;

/// Default knowledge base file.
pub const DEFAULT_KNOWLEDGE_FILE: &str = "knowledge.json";

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub knowledge: KnowledgeConfig,
    pub retrieval: RetrievalConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address to bind, e.g. `0.0.0.0:8001`
    pub listen_address: String,
    pub cors_enabled: bool,
    /// Allowed origins; empty means any origin
    pub cors_origins: Vec<String>,
    /// Expose Prometheus metrics on `/metrics`
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: format!("0.0.0.0:{}", DEFAULT_PORT),
            cors_enabled: true,
            cors_origins: Vec::new(),
            metrics_enabled: true,
        }
    }
}

/// Knowledge base settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Path to the JSON knowledge file
    pub path: PathBuf,
    /// What to do with records missing a question or answer
    pub invalid_records: InvalidRecordPolicy,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_KNOWLEDGE_FILE),
            invalid_records: InvalidRecordPolicy::default(),
        }
    }
}

/// Retrieval and embedding settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Embedding model identifier (`all-MiniLM-L6-v2`, `bge-small-en-v1.5`, `hash`, ...)
    pub model: String,
    /// A match must score strictly above this similarity
    pub match_threshold: f32,
    /// Upper bound for a single query embedding call
    pub embed_timeout_ms: u64,
    /// Number of query embeddings kept in memory (0 disables the cache)
    pub query_cache_capacity: u64,
    /// Query embedding calls allowed to run at once
    pub max_concurrent_embeddings: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            embed_timeout_ms: 10_000,
            query_cache_capacity: 1024,
            max_concurrent_embeddings: 16,
        }
    }
}

impl RetrievalConfig {
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ServiceConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {}", port)))?;
            self.server.listen_address = with_port(&self.server.listen_address, port);
        }

        if let Some(path) = lookup("KNOWLEDGE_FILE") {
            self.knowledge.path = PathBuf::from(path);
        }

        if let Some(threshold) = lookup("MATCH_THRESHOLD") {
            self.retrieval.match_threshold = threshold.trim().parse().map_err(|_| {
                Error::Config(format!("MATCH_THRESHOLD is not a number: {}", threshold))
            })?;
        }

        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.retrieval.model = model;
        }

        self.validate()
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.retrieval.match_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(Error::Config(format!(
                "match_threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.retrieval.embed_timeout_ms == 0 {
            return Err(Error::Config("embed_timeout_ms must be positive".into()));
        }
        if self.retrieval.max_concurrent_embeddings == 0 {
            return Err(Error::Config(
                "max_concurrent_embeddings must be positive".into(),
            ));
        }
        if self.retrieval.model.trim().is_empty() {
            return Err(Error::Config("retrieval.model must not be empty".into()));
        }
        Ok(())
    }
}

/// Replace (or append) the port of a `host:port` address.
fn with_port(address: &str, port: u16) -> String {
    let host = match address.rsplit_once(':') {
        Some((host, _)) => host,
        None => address,
    };
    format!("{}:{}", host, port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.server.listen_address, "0.0.0.0:8001");
        assert_eq!(config.knowledge.path, PathBuf::from("knowledge.json"));
        assert_eq!(config.retrieval.model, "all-MiniLM-L6-v2");
        assert!((config.retrieval.match_threshold - 0.35).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = ServiceConfig::default();
        config.retrieval.match_threshold = 0.5;
        config.knowledge.invalid_records = InvalidRecordPolicy::Abort;
        config.save(&path).unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[retrieval]\nmodel = \"hash\"\n").unwrap();

        let loaded = ServiceConfig::load(&path).unwrap();
        assert_eq!(loaded.retrieval.model, "hash");
        assert_eq!(loaded.server, ServerConfig::default());
        assert_eq!(loaded.retrieval.embed_timeout_ms, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let vars = env(&[
            ("PORT", "9100"),
            ("KNOWLEDGE_FILE", "/data/kb.json"),
            ("MATCH_THRESHOLD", "0.6"),
            ("EMBEDDING_MODEL", "bge-small-en-v1.5"),
        ]);
        let mut config = ServiceConfig::default();
        config
            .apply_overrides(|key| vars.get(key).cloned())
            .unwrap();

        assert_eq!(config.server.listen_address, "0.0.0.0:9100");
        assert_eq!(config.knowledge.path, PathBuf::from("/data/kb.json"));
        assert!((config.retrieval.match_threshold - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.retrieval.model, "bge-small-en-v1.5");
    }

    #[test]
    fn test_invalid_port_rejected() {
        let vars = env(&[("PORT", "not-a-port")]);
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(|key| vars.get(key).cloned())
            .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let mut config = ServiceConfig::default();
        config.retrieval.match_threshold = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_embedding_concurrency_rejected() {
        let mut config = ServiceConfig::default();
        config.retrieval.max_concurrent_embeddings = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_port() {
        assert_eq!(with_port("127.0.0.1:8001", 80), "127.0.0.1:80");
        assert_eq!(with_port("localhost", 3000), "localhost:3000");
    }
}
