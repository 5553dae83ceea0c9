//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Provider not configured.
    #[error("embedding provider not configured (is OPENAI_API_KEY set?)")]
    ProviderNotConfigured,

    /// API request failed.
    #[error("API request failed: {0}")]
    ApiRequest(String),

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// The provider did not answer within the configured timeout.
    #[error("embedding request timed out after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    /// Dimension mismatch.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `top_k` must be at least one.
    #[error("top_k must be a positive integer")]
    InvalidTopK,

    /// Backing store could not be read or written.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl EmbeddingError {
    /// Whether the error came from the embedding provider rather than the
    /// local cache.
    pub fn is_provider_error(&self) -> bool {
        matches!(
            self,
            Self::ProviderNotConfigured
                | Self::ApiRequest(_)
                | Self::InvalidResponse(_)
                | Self::RateLimited { .. }
                | Self::ProviderTimeout { .. }
                | Self::Http(_)
        )
    }
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create the cache directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to read the cache.
    #[error("failed to read file: {0}")]
    ReadFile(String),

    /// Failed to write the cache.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// The cache exists but its layout is not what we expect.
    #[error("corrupt cache: {0}")]
    Corrupt(String),

    /// SQLite error.
    #[error("database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for EmbeddingError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.into())
    }
}
