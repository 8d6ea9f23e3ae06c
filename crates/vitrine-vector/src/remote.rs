//! Remote embedding provider over HTTP.
//!
//! Posts JSON to an inference endpoint and reads back a vector:
//!
//! | Call | Request body | Response body |
//! |------|--------------|---------------|
//! | `embed_text` | `{"text": "..."}` | `{"embedding": [f32, ...]}` |
//! | `embed_image` | `{"image_base64": "..."}` | `{"embedding": [f32, ...]}` |
//!
//! # Feature Gate
//!
//! This module requires the `provider-http` feature.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vitrine_core::{Error, Result};

use crate::embedding::{EmbeddingProvider, require_image, require_text};

/// Connection settings for [`HttpEmbeddingProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpProviderConfig {
    /// Endpoint for text embeddings.
    pub text_url: String,
    /// Endpoint for image embeddings.
    pub image_url: String,
    /// Optional bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Text embedding dimension the model produces.
    pub text_dimension: usize,
    /// Image embedding dimension the model produces.
    pub image_dimension: usize,
    /// Per-request timeout, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

#[derive(Serialize)]
struct TextRequest<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct ImageRequest {
    image_base64: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Embedding provider backed by an HTTP inference service.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    config: HttpProviderConfig,
}

impl HttpEmbeddingProvider {
    /// Build a provider from its connection settings.
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: &B) -> Result<Vec<f32>> {
        let mut request = self.client.post(url).json(body);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::provider(format!("embedding request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "embedding endpoint returned {status}: {text}"
            )));
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("malformed embedding response: {e}")))?;
        Ok(parsed.embedding)
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        self.post(&self.config.text_url, &TextRequest { text }).await
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        require_image(image)?;
        let body = ImageRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode(image),
        };
        self.post(&self.config.image_url, &body).await
    }

    fn text_dimension(&self) -> usize {
        self.config.text_dimension
    }

    fn image_dimension(&self) -> usize {
        self.config.image_dimension
    }

    fn name(&self) -> &str {
        "http"
    }
}

impl std::fmt::Debug for HttpEmbeddingProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbeddingProvider")
            .field("text_url", &self.config.text_url)
            .field("image_url", &self.config.image_url)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> HttpProviderConfig {
        HttpProviderConfig {
            text_url: "http://127.0.0.1:9/text".into(),
            image_url: "http://127.0.0.1:9/image".into(),
            api_key: None,
            text_dimension: 1536,
            image_dimension: 1408,
            timeout_ms: 200,
        }
    }

    #[test]
    fn test_request_shapes() {
        let text = serde_json::to_value(TextRequest { text: "lamp" }).unwrap();
        assert_eq!(text["text"], "lamp");

        let image = ImageRequest {
            image_base64: base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]),
        };
        let image = serde_json::to_value(image).unwrap();
        assert_eq!(image["image_base64"], "AQID");
    }

    #[test]
    fn test_response_parse() {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"embedding": [0.5, -0.25]}"#).unwrap();
        assert_eq!(parsed.embedding, vec![0.5, -0.25]);
    }

    #[test]
    fn test_dimensions_from_config() {
        let provider = HttpEmbeddingProvider::new(config()).unwrap();
        assert_eq!(provider.text_dimension(), 1536);
        assert_eq!(provider.image_dimension(), 1408);
        assert_eq!(provider.name(), "http");
    }

    #[tokio::test]
    async fn test_empty_input_rejected_without_request() {
        let provider = HttpEmbeddingProvider::new(config()).unwrap();
        assert!(matches!(
            provider.embed_text("").await,
            Err(Error::Provider(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_provider_error() {
        let provider = HttpEmbeddingProvider::new(config()).unwrap();
        assert!(matches!(
            provider.embed_text("lamp").await,
            Err(Error::Provider(_))
        ));
    }
}
