//! # Embeddings
//!
//! Embedding cache and nearest-neighbour search over commit messages.
//!
//! ## Features
//!
//! - **Embedding Generation**: Convert text to dense vectors via an
//!   OpenAI-compatible API
//! - **Persistent Cache**: JSON-file or SQLite stores keyed by commit hash
//! - **Cache Building**: Embed a sequence of texts with an explicit failure policy
//! - **Similarity Search**: Rank cached vectors by cosine similarity
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  CacheBuilder ──► EmbeddingStore ◄── SimilaritySearch           │
//! │       │           (json / sqlite)          │                    │
//! │       ▼                                    ▼                    │
//! │  EmbeddingProvider                  EmbeddingProvider           │
//! │  (every text)                       (query only)                │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod provider;
pub mod search;
pub mod similarity;
pub mod sqlite;
pub mod store;

pub use builder::{BuildReport, CacheBuilder, FailurePolicy, SkippedItem, SourceText};
pub use config::ProviderConfig;
pub use error::{EmbeddingError, Result, StorageError};
pub use provider::{
    EmbeddingProvider, EmbeddingRequest, EmbeddingResponse, OpenAIProvider, StaticProvider,
};
pub use search::SimilaritySearch;
pub use similarity::{SearchResult, cosine_similarity, rank_top_k};
pub use sqlite::SqliteStore;
pub use store::{EmbeddingRecord, EmbeddingStore, InMemoryStore, JsonFileStore, StoreStats};

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
