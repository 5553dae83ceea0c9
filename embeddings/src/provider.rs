//! Embedding providers.
//!
//! [`OpenAIProvider`] talks to an OpenAI-compatible `/embeddings` endpoint.
//! [`StaticProvider`] answers from a fixed table and never touches the
//! network, which is what the builder and search tests run against.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Embedding;
use crate::config::ProviderConfig;
use crate::error::{EmbeddingError, Result};

/// Request for generating embeddings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRequest {
    /// Text to embed.
    pub text: String,

    /// Model to use (provider-specific).
    pub model: Option<String>,
}

impl EmbeddingRequest {
    /// Create a new embedding request.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: None,
        }
    }

    /// Set the model to use.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Response from embedding generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingResponse {
    /// The generated embedding.
    pub embedding: Embedding,

    /// Model used to generate the embedding.
    pub model: String,

    /// Token usage (if available).
    pub tokens_used: Option<u64>,
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Get the model requests default to.
    fn model(&self) -> &str;

    /// Generate an embedding for the given text.
    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse>;

    /// Embed a bare string with the provider's default model.
    async fn embed_text(&self, text: &str) -> Result<Embedding> {
        Ok(self.embed(EmbeddingRequest::new(text)).await?.embedding)
    }
}

/// OpenAI embedding provider.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// Default model.
    model: String,

    /// Upper bound for one request, including reading the body.
    timeout: Duration,
}

impl OpenAIProvider {
    /// Create a provider from explicit configuration.
    pub fn new(config: ProviderConfig) -> Self {
        let timeout = config.timeout();
        Self {
            api_key: config.api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            model: config.model,
            timeout,
        }
    }

    /// Override the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether an API key is present.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn request(&self, api_key: &str, model: &str, text: &str) -> Result<OpenAIEmbeddingResponse> {
        let body = serde_json::json!({
            "input": text,
            "model": model
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(60);

            return Err(EmbeddingError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ApiRequest(format!(
                "API error ({status}): {error_text}"
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(EmbeddingError::ProviderNotConfigured)?;

        let model = request.model.unwrap_or_else(|| self.model.clone());

        debug!("Generating embedding with model: {model}");

        let result = tokio::time::timeout(self.timeout, self.request(api_key, &model, &request.text))
            .await
            .map_err(|_| EmbeddingError::ProviderTimeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            })??;

        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding in response".to_string()))?
            .embedding;

        if embedding.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "Embedding vector is empty".to_string(),
            ));
        }

        info!("Generated embedding with {} dimensions", embedding.len());

        Ok(EmbeddingResponse {
            embedding,
            model: result.model,
            tokens_used: result.usage.map(|u| u.total_tokens),
        })
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
    model: String,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    total_tokens: u64,
}

/// Deterministic provider that answers from a fixed table.
#[derive(Default)]
pub struct StaticProvider {
    vectors: HashMap<String, Embedding>,
    fallback: Option<Embedding>,
    failing: HashSet<String>,
    calls: AtomicUsize,
}

impl StaticProvider {
    /// Create an empty provider. Every lookup fails until texts are added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `text` with `embedding`.
    pub fn with_text(mut self, text: impl Into<String>, embedding: Embedding) -> Self {
        self.vectors.insert(text.into(), embedding);
        self
    }

    /// Answer unknown texts with `embedding`.
    pub fn with_fallback(mut self, embedding: Embedding) -> Self {
        self.fallback = Some(embedding);
        self
    }

    /// Fail with [`EmbeddingError::ApiRequest`] whenever `text` is requested.
    pub fn failing_on(mut self, text: impl Into<String>) -> Self {
        self.failing.insert(text.into());
        self
    }

    /// Number of `embed` calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn model(&self) -> &str {
        "static"
    }

    async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&request.text) {
            return Err(EmbeddingError::ApiRequest(format!(
                "static provider refused {:?}",
                request.text
            )));
        }

        let embedding = self
            .vectors
            .get(&request.text)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| {
                EmbeddingError::InvalidResponse(format!("no embedding for {:?}", request.text))
            })?;

        Ok(EmbeddingResponse {
            embedding,
            model: request.model.unwrap_or_else(|| self.model().to_string()),
            tokens_used: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OpenAIProvider {
        OpenAIProvider::new(
            ProviderConfig::new()
                .with_api_key("test-key")
                .with_base_url(server.uri()),
        )
    }

    #[test]
    fn test_embedding_request() {
        let request = EmbeddingRequest::new("Hello world").with_model("text-embedding-3-small");

        assert_eq!(request.text, "Hello world");
        assert_eq!(request.model, Some("text-embedding-3-small".to_string()));
    }

    #[tokio::test]
    async fn test_openai_embed_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "input": "Fix bug in parser",
                "model": "text-embedding-3-small"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.25, -0.5, 1.0], "index": 0}],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 4, "total_tokens": 4}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let response = provider_for(&server)
            .embed(EmbeddingRequest::new("Fix bug in parser"))
            .await
            .unwrap();

        assert_eq!(response.embedding, vec![0.25, -0.5, 1.0]);
        assert_eq!(response.tokens_used, Some(4));
    }

    #[tokio::test]
    async fn test_openai_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let err = provider_for(&server).embed_text("anything").await.unwrap_err();
        assert_matches!(err, EmbeddingError::RateLimited { retry_after_secs: 7 });
    }

    #[tokio::test]
    async fn test_openai_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = provider_for(&server).embed_text("anything").await.unwrap_err();
        assert_matches!(err, EmbeddingError::ApiRequest(ref msg) if msg.contains("boom"));
        assert!(err.is_provider_error());
    }

    #[tokio::test]
    async fn test_openai_empty_data_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let err = provider_for(&server).embed_text("anything").await.unwrap_err();
        assert_matches!(err, EmbeddingError::InvalidResponse(_));
    }

    #[tokio::test]
    async fn test_openai_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(serde_json::json!({
                        "data": [{"embedding": [1.0]}],
                        "model": "m"
                    })),
            )
            .mount(&server)
            .await;

        let err = provider_for(&server)
            .with_timeout(Duration::from_millis(100))
            .embed_text("slow")
            .await
            .unwrap_err();
        assert_matches!(err, EmbeddingError::ProviderTimeout { timeout_ms: 100 });
    }

    #[tokio::test]
    async fn test_openai_without_key() {
        let provider = OpenAIProvider::new(ProviderConfig::new());
        assert!(!provider.is_available());

        let err = provider.embed_text("anything").await.unwrap_err();
        assert_matches!(err, EmbeddingError::ProviderNotConfigured);
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticProvider::new()
            .with_text("known", vec![1.0, 0.0])
            .failing_on("broken");

        assert_eq!(provider.embed_text("known").await.unwrap(), vec![1.0, 0.0]);
        assert_matches!(
            provider.embed_text("broken").await,
            Err(EmbeddingError::ApiRequest(_))
        );
        assert_matches!(
            provider.embed_text("unknown").await,
            Err(EmbeddingError::InvalidResponse(_))
        );
        assert_eq!(provider.calls(), 3);
    }
}
