//! Configuration for the embedding provider.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default embedding model.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings handed to an [`crate::OpenAIProvider`] at construction time.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Model used for every request.
    pub model: String,

    /// API base URL, without the `/embeddings` suffix.
    pub base_url: String,

    /// API key. Never serialized and redacted from `Debug` output.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Upper bound for a single embedding request, in seconds.
    pub timeout_secs: u64,
}

impl ProviderConfig {
    /// Create a configuration with default values and no API key.
    pub fn new() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Fill the API key and base URL from `OPENAI_API_KEY` and
    /// `OPENAI_BASE_URL` when they are set.
    pub fn with_env(mut self) -> Self {
        let non_empty = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.api_key = Some(key);
        }
        if let Some(url) = non_empty("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the request timeout in seconds.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// The request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = ProviderConfig::new().with_api_key("sk-secret");
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("sk-secret"));

        let back: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.api_key, None);
        assert_eq!(back.model, DEFAULT_MODEL);
    }

    #[test]
    fn test_api_key_is_redacted_from_debug() {
        let config = ProviderConfig::new().with_api_key("sk-secret-123");
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret-123"));
        assert!(debug.contains("api_key: Some(\"<redacted>\")"));

        let unset = format!("{:?}", ProviderConfig::new());
        assert!(unset.contains("api_key: None"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ProviderConfig = serde_json::from_str(r#"{"timeout_secs": 5}"#).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }
}
