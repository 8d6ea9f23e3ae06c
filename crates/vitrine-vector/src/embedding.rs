//! Embedding provider trait and in-process implementations.
//!
//! This module defines the `EmbeddingProvider` trait that abstracts over the
//! model that turns product text and images into fixed-length vectors.
//!
//! # Providers
//!
//! - `MockEmbeddingProvider`: Deterministic unit vectors derived from input bytes
//! - `StaticEmbeddingProvider`: Canned vectors with injectable failures and latency
//! - `HttpEmbeddingProvider`: Remote inference endpoint (requires `provider-http` feature)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use vitrine_core::{Dimensions, Error, Modality, Result};

/// Trait for generating text and image embeddings.
///
/// Implementations wrap a specific inference service and provide a uniform
/// async interface. The trait requires `Send + Sync` to allow sharing across
/// concurrent requests.
///
/// # Contract
///
/// Each modality has a fixed dimensionality. Empty input and upstream
/// failures are reported as [`Error::Provider`].
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a piece of text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed raw image bytes.
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Text embedding dimension.
    fn text_dimension(&self) -> usize;

    /// Image embedding dimension.
    fn image_dimension(&self) -> usize;

    /// The provider name for diagnostics.
    fn name(&self) -> &str;
}

/// Reject empty text before it reaches a model.
pub(crate) fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::provider("cannot embed empty text"));
    }
    Ok(())
}

/// Reject empty image payloads before they reach a model.
pub(crate) fn require_image(image: &[u8]) -> Result<()> {
    if image.is_empty() {
        return Err(Error::provider("cannot embed empty image"));
    }
    Ok(())
}

/// Check a provider's output against the backend's configured length.
pub(crate) fn check_embedding_dimension(
    dimensions: &Dimensions,
    modality: Modality,
    vector: &[f32],
) -> Result<()> {
    let expected = dimensions.for_modality(modality);
    if vector.len() != expected {
        return Err(Error::provider(format!(
            "provider returned a {}-dimensional {modality} embedding, backend expects {expected}",
            vector.len()
        )));
    }
    Ok(())
}

// ============================================================================
// Mock provider
// ============================================================================

/// A mock embedding provider for testing and offline use.
///
/// Generates deterministic vectors from the input bytes. The same input
/// always produces the same unit vector.
pub struct MockEmbeddingProvider {
    text_dimension: usize,
    image_dimension: usize,
}

impl MockEmbeddingProvider {
    /// Create a new mock provider with the given dimensions.
    pub fn new(text_dimension: usize, image_dimension: usize) -> Self {
        Self {
            text_dimension,
            image_dimension,
        }
    }

    fn deterministic_embedding(bytes: &[u8], dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0f32; dimension];

        for (i, val) in embedding.iter_mut().enumerate() {
            let byte_val = bytes[i % bytes.len()];
            // Mix in a second byte so inputs sharing a prefix still diverge
            let mixed = bytes[(i * 7 + 3) % bytes.len()];
            *val = ((byte_val as f32 + mixed as f32 * 0.5 + i as f32) % 256.0) / 256.0;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for val in &mut embedding {
                *val /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        Ok(Self::deterministic_embedding(
            text.as_bytes(),
            self.text_dimension,
        ))
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        require_image(image)?;
        Ok(Self::deterministic_embedding(image, self.image_dimension))
    }

    fn text_dimension(&self) -> usize {
        self.text_dimension
    }

    fn image_dimension(&self) -> usize {
        self.image_dimension
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ============================================================================
// Static provider
// ============================================================================

/// A provider that returns pre-registered vectors.
///
/// Unknown inputs fail with [`Error::Provider`]. A whole modality can be set
/// to fail, and an artificial delay can be added to every call to exercise
/// deadline handling.
pub struct StaticEmbeddingProvider {
    text_dimension: usize,
    image_dimension: usize,
    texts: HashMap<String, Vec<f32>>,
    images: HashMap<Vec<u8>, Vec<f32>>,
    failures: HashMap<Modality, String>,
    latency: Option<Duration>,
    calls: Mutex<Vec<Modality>>,
}

impl StaticEmbeddingProvider {
    /// Create an empty static provider.
    pub fn new(text_dimension: usize, image_dimension: usize) -> Self {
        Self {
            text_dimension,
            image_dimension,
            texts: HashMap::new(),
            images: HashMap::new(),
            failures: HashMap::new(),
            latency: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register the vector returned for `text`.
    pub fn with_text(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.texts.insert(text.into(), vector);
        self
    }

    /// Register the vector returned for `image`.
    pub fn with_image(mut self, image: impl Into<Vec<u8>>, vector: Vec<f32>) -> Self {
        self.images.insert(image.into(), vector);
        self
    }

    /// Make every call for `modality` fail with the given message.
    pub fn failing(mut self, modality: Modality, message: impl Into<String>) -> Self {
        self.failures.insert(modality, message.into());
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Modalities requested so far, in call order.
    pub fn calls(&self) -> Vec<Modality> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    async fn respond(&self, modality: Modality, found: Option<&Vec<f32>>) -> Result<Vec<f32>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(modality);
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(message) = self.failures.get(&modality) {
            return Err(Error::provider(message.clone()));
        }
        found
            .cloned()
            .ok_or_else(|| Error::provider(format!("no canned {modality} embedding for input")))
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbeddingProvider {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        require_text(text)?;
        self.respond(Modality::Text, self.texts.get(text)).await
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        require_image(image)?;
        self.respond(Modality::Image, self.images.get(image)).await
    }

    fn text_dimension(&self) -> usize {
        self.text_dimension
    }

    fn image_dimension(&self) -> usize {
        self.image_dimension
    }

    fn name(&self) -> &str {
        "static"
    }
}

// ============================================================================
// Tests
// ============================================================================
