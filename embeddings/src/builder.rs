//! Populates an embedding store from a sequence of texts.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::provider::EmbeddingProvider;
use crate::store::{EmbeddingRecord, EmbeddingStore};

/// What to do when one item cannot be embedded or stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure and return it.
    #[default]
    Abort,
    /// Log the failure, remember the id and carry on.
    Skip,
}

/// One text to embed, keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceText {
    /// Record id, e.g. a commit hash.
    pub id: String,

    /// Text to embed.
    pub text: String,
}

impl SourceText {
    /// Create a new source text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// An item the builder gave up on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedItem {
    /// Id of the item.
    pub id: String,

    /// Rendered error.
    pub reason: String,
}

/// Outcome of a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Number of records written.
    pub embedded: usize,

    /// Items left out under [`FailurePolicy::Skip`].
    pub skipped: Vec<SkippedItem>,
}

impl BuildReport {
    /// Whether every item made it into the store.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Embeds texts one at a time and upserts them into a store.
pub struct CacheBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
    policy: FailurePolicy,
    limit: Option<usize>,
}

impl CacheBuilder {
    /// Create a builder that aborts on the first failure.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self {
            provider,
            store,
            policy: FailurePolicy::default(),
            limit: None,
        }
    }

    /// Set the failure policy.
    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Process at most `limit` items.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Embed and store every item, in order.
    pub async fn build(&self, items: impl IntoIterator<Item = SourceText>) -> Result<BuildReport> {
        let items: Vec<SourceText> = match self.limit {
            Some(limit) => items.into_iter().take(limit).collect(),
            None => items.into_iter().collect(),
        };

        info!(
            "Building embedding cache ({}) from {} texts",
            self.store.name(),
            items.len()
        );

        let mut report = BuildReport::default();
        for item in items {
            info!("Embedding commit {}", item.id);

            match self.embed_one(&item).await {
                Ok(()) => report.embedded += 1,
                Err(e) => match self.policy {
                    FailurePolicy::Abort => return Err(e),
                    FailurePolicy::Skip => {
                        warn!("Skipping {}: {e}", item.id);
                        report.skipped.push(SkippedItem {
                            id: item.id,
                            reason: e.to_string(),
                        });
                    }
                },
            }
        }

        if report.is_complete() {
            info!("Embedded {} texts", report.embedded);
        } else {
            let ids: Vec<&str> = report.skipped.iter().map(|s| s.id.as_str()).collect();
            warn!(
                "Embedded {} texts, skipped {}: {}",
                report.embedded,
                ids.len(),
                ids.join(", ")
            );
        }

        Ok(report)
    }

    async fn embed_one(&self, item: &SourceText) -> Result<()> {
        let vector = self.provider.embed_text(&item.text).await?;
        debug!("Got {} dimensions for {}", vector.len(), item.id);

        self.store
            .upsert(EmbeddingRecord::new(item.id.clone(), item.text.clone(), vector))
            .await
    }
}
