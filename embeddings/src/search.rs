//! Nearest-neighbour search over the embedding cache.
//!
//! This is a brute-force scan: every query embeds once and then scores all
//! N cached vectors of dimension D, so a query costs O(N·D). That is fine
//! for a commit history; there is no approximate index behind it. Building
//! the JSON cache has its own quadratic cost, see [`crate::store`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;
use crate::similarity::{SearchResult, rank_top_k};
use crate::store::EmbeddingStore;

/// Ranks cached records against a free-text query.
pub struct SimilaritySearch {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn EmbeddingStore>,
}

impl SimilaritySearch {
    /// Create a search over `store`, embedding queries with `provider`.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn EmbeddingStore>) -> Self {
        Self { provider, store }
    }

    /// Return the `top_k` records most similar to `query`.
    ///
    /// An empty cache yields an empty list without calling the provider.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<SearchResult>> {
        if top_k == 0 {
            return Err(EmbeddingError::InvalidTopK);
        }

        let records = self.store.load_all().await?;
        if records.is_empty() {
            info!("Embedding cache ({}) is empty, nothing to search", self.store.name());
            return Ok(Vec::new());
        }

        debug!("Embedding query with {}", self.provider.name());
        let query_vector = self.provider.embed_text(query).await?;

        let results = rank_top_k(&query_vector, &records, top_k)?;
        debug!("Scored {} records, returning {}", records.len(), results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::StaticProvider;
    use crate::store::{EmbeddingRecord, InMemoryStore};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    async fn scenario_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        for (id, vector) in [
            ("c1", vec![1.0, 0.0]),
            ("c2", vec![0.0, 1.0]),
            ("c3", vec![0.7071, 0.7071]),
        ] {
            store
                .upsert(EmbeddingRecord::new(id, format!("message {id}"), vector))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_search_ranks_scenario() {
        let provider = Arc::new(StaticProvider::new().with_text("parser bug", vec![1.0, 0.0]));
        let search = SimilaritySearch::new(provider, scenario_store().await);

        let results = search.search("parser bug", 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert!((results[1].score - 0.7071).abs() < 1e-3);
    }

    #[tokio::test]
    async fn test_search_empty_store_skips_provider() {
        let provider = Arc::new(StaticProvider::new());
        let search = SimilaritySearch::new(provider.clone(), Arc::new(InMemoryStore::new()));

        assert_eq!(search.search("anything", 3).await.unwrap(), Vec::new());
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_search_top_k_larger_than_store() {
        let store = Arc::new(InMemoryStore::new());
        store
            .upsert(EmbeddingRecord::new("a", "", vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .upsert(EmbeddingRecord::new("b", "", vec![0.0, 1.0]))
            .await
            .unwrap();
        let provider = Arc::new(StaticProvider::new().with_fallback(vec![1.0, 1.0]));

        let results = SimilaritySearch::new(provider, store)
            .search("q", 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn test_search_rejects_zero_top_k() {
        let provider = Arc::new(StaticProvider::new().with_fallback(vec![1.0, 0.0]));
        let search = SimilaritySearch::new(provider, scenario_store().await);

        assert_matches!(search.search("q", 0).await, Err(EmbeddingError::InvalidTopK));
    }

    #[tokio::test]
    async fn test_search_query_dimension_mismatch() {
        let provider = Arc::new(StaticProvider::new().with_fallback(vec![1.0, 0.0, 0.0]));
        let search = SimilaritySearch::new(provider, scenario_store().await);

        assert_matches!(
            search.search("q", 2).await,
            Err(EmbeddingError::DimensionMismatch { .. })
        );
    }

    #[tokio::test]
    async fn test_search_propagates_provider_failure() {
        let provider = Arc::new(StaticProvider::new().failing_on("q"));
        let search = SimilaritySearch::new(provider, scenario_store().await);

        let err = search.search("q", 2).await.unwrap_err();
        assert!(err.is_provider_error());
    }
}
