//! Configuration for `commit-search`.
//!
//! Sources, later ones win:
//! 1. Built-in defaults
//! 2. TOML file (`--config`, else `./commit-search.toml` when present)
//! 3. Environment (`OPENAI_API_KEY`, `OPENAI_BASE_URL`, `.env` included)
//! 4. CLI flags

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use commit_search_embeddings::{FailurePolicy, ProviderConfig};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "commit-search.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Embedding provider settings.
    pub embedding: ProviderConfig,

    /// Where and how the cache is stored.
    pub cache: CacheConfig,

    /// Search settings.
    pub search: SearchConfig,

    /// Build settings.
    pub build: BuildConfig,
}

impl AppConfig {
    /// Load defaults, then `path` (or the default file when it exists), then
    /// the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)?
                } else {
                    Self::default()
                }
            }
        };

        Ok(config.with_env())
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Parse TOML text; missing sections keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn with_env(mut self) -> Self {
        self.embedding = self.embedding.with_env();
        self
    }
}

/// Storage backend for the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// One JSON object in a file.
    #[default]
    Json,
    /// A SQLite database.
    Sqlite,
}

impl CacheBackend {
    /// File name used when no path is configured.
    pub fn default_path(self) -> &'static str {
        match self {
            Self::Json => "embedding_cache.json",
            Self::Sqlite => "embedding_cache.db",
        }
    }
}

/// Cache location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend to use.
    pub backend: CacheBackend,

    /// File path; defaults to [`CacheBackend::default_path`].
    pub path: Option<PathBuf>,
}

impl CacheConfig {
    /// The configured path, or the backend's default file name.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.backend.default_path()))
    }
}

/// Search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of results to print.
    pub top_k: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { top_k: 3 }
    }
}

/// Build settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Abort on the first failure or skip failing commits.
    pub failure_policy: FailurePolicy,

    /// Embed only the most recent `limit` commits.
    pub limit: Option<usize>,

    /// Append each commit's diff to its message.
    pub with_diff: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.cache.backend, CacheBackend::Json);
        assert_eq!(
            config.cache.resolved_path(),
            PathBuf::from("embedding_cache.json")
        );
        assert_eq!(config.build.failure_policy, FailurePolicy::Abort);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
            [cache]
            backend = "sqlite"

            [build]
            failure_policy = "skip"
            limit = 50

            [embedding]
            model = "text-embedding-3-large"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.backend, CacheBackend::Sqlite);
        assert_eq!(
            config.cache.resolved_path(),
            PathBuf::from("embedding_cache.db")
        );
        assert_eq!(config.build.failure_policy, FailurePolicy::Skip);
        assert_eq!(config.build.limit, Some(50));
        assert_eq!(config.embedding.model, "text-embedding-3-large");
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.search.top_k, 3);
    }

    #[test]
    fn test_debug_output_hides_api_key() {
        let mut config = AppConfig::default();
        config.embedding = config.embedding.with_api_key("sk-secret-123");

        assert!(!format!("{config:?}").contains("sk-secret-123"));
    }

    #[test]
    fn test_unknown_backend_is_rejected() {
        assert!(AppConfig::from_toml_str("[cache]\nbackend = \"redis\"\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("commit-search.toml");
        std::fs::write(&path, "[search]\ntop_k = 7\n").unwrap();

        let config = AppConfig::from_file(&path).unwrap();
        assert_eq!(config.search.top_k, 7);

        assert!(AppConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }
}
