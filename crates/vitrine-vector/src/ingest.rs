//! Batch record building.
//!
//! Turns product descriptions into [`VectorRecord`]s through an embedding
//! provider and writes them with bounded concurrency. One product failing
//! never aborts the batch; failures are collected in the report.

use futures::StreamExt;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use vitrine_core::{Error, Metadata, Modality, Result, VectorRecord};

use crate::backend::StorageBackend;
use crate::deadline::with_deadline;
use crate::embedding::{EmbeddingProvider, check_embedding_dimension};

/// Compose the text embedded for a product from its metadata.
///
/// One labelled line per non-empty field, in a fixed order: name,
/// description, category, brand, product code, then price with currency.
pub fn compose_product_text(metadata: &Metadata) -> String {
    let field = |key: &str| {
        metadata
            .get(key)
            .map(|v| v.to_string().trim().to_string())
            .filter(|v| !v.is_empty())
    };

    let mut lines = Vec::new();
    for (key, label) in [
        ("name", "Name"),
        ("description", "Description"),
        ("category", "Category"),
        ("brand", "Brand"),
        ("product_code", "Product code"),
    ] {
        if let Some(value) = field(key) {
            lines.push(format!("{label}: {value}"));
        }
    }
    if let Some(price) = field("price") {
        match field("currency") {
            Some(currency) => lines.push(format!("Price: {price} {currency}")),
            None => lines.push(format!("Price: {price}")),
        }
    }
    lines.join("\n")
}

/// One product to ingest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProductInput {
    /// Record id.
    pub id: String,

    /// Pass-through metadata.
    #[serde(default)]
    pub metadata: Metadata,

    /// Text to embed. Composed from metadata when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Image bytes to embed.
    #[serde(skip)]
    pub image: Option<Vec<u8>>,
}

impl ProductInput {
    /// Create an input with only an id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set explicit text.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set image bytes.
    pub fn with_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// The text that will be embedded, if any.
    pub fn embedding_text(&self) -> Option<String> {
        let text = match &self.text {
            Some(text) => text.clone(),
            None => compose_product_text(&self.metadata),
        };
        (!text.trim().is_empty()).then_some(text)
    }
}

/// A product that could not be ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestFailure {
    /// Product id.
    pub id: String,
    /// What went wrong.
    pub error: String,
}

/// Outcome of a batch ingest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Records written.
    pub upserted: usize,
    /// Products that failed.
    pub failed: Vec<IngestFailure>,
    /// Wall-clock time for the batch.
    pub duration_ms: u64,
}

impl IngestReport {
    /// Whether every product was written.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Builds and stores records for products.
pub struct RecordBuilder {
    provider: Arc<dyn EmbeddingProvider>,
    backend: Arc<dyn StorageBackend>,
    timeout: Duration,
}

impl RecordBuilder {
    /// Create a builder; `timeout` bounds each provider/backend call.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn StorageBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            backend,
            timeout,
        }
    }

    /// Embed a product into a record, without writing it.
    pub async fn build(&self, input: &ProductInput) -> Result<VectorRecord> {
        let text = input.embedding_text();
        let image = input.image.as_deref().filter(|i| !i.is_empty());
        if text.is_none() && image.is_none() {
            return Err(Error::validation(format!(
                "product '{}' has no text or image to embed",
                input.id
            )));
        }

        let (text_embedding, image_embedding) =
            tokio::try_join!(self.embed_text(text.as_deref()), self.embed_image(image))?;

        let mut record = VectorRecord::new(input.id.clone()).with_metadata(input.metadata.clone());
        record.text_embedding = text_embedding;
        record.image_embedding = image_embedding;
        Ok(record)
    }

    async fn embed_text(&self, text: Option<&str>) -> Result<Option<Vec<f32>>> {
        let Some(text) = text else {
            return Ok(None);
        };
        let vector = with_deadline("embed_text", self.timeout, self.provider.embed_text(text)).await?;
        check_embedding_dimension(&self.backend.dimensions(), Modality::Text, &vector)?;
        Ok(Some(vector))
    }

    async fn embed_image(&self, image: Option<&[u8]>) -> Result<Option<Vec<f32>>> {
        let Some(image) = image else {
            return Ok(None);
        };
        let vector =
            with_deadline("embed_image", self.timeout, self.provider.embed_image(image)).await?;
        check_embedding_dimension(&self.backend.dimensions(), Modality::Image, &vector)?;
        Ok(Some(vector))
    }

    /// Embed and upsert one product.
    pub async fn ingest_one(&self, input: &ProductInput) -> Result<()> {
        let record = self.build(input).await?;
        with_deadline("backend upsert", self.timeout, self.backend.upsert(record)).await
    }

    /// Embed and upsert many products, at most `concurrency` at a time.
    pub async fn ingest(&self, inputs: Vec<ProductInput>, concurrency: usize) -> IngestReport {
        let started = Instant::now();
        let total = inputs.len();

        let outcomes: Vec<(String, Result<()>)> = futures::stream::iter(inputs)
            .map(|input| async move {
                let outcome = self.ingest_one(&input).await;
                (input.id, outcome)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut report = IngestReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(()) => report.upserted += 1,
                Err(e) => {
                    warn!("Failed to ingest '{id}': {e}");
                    report.failed.push(IngestFailure {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }
        report.failed.sort_by(|a, b| a.id.cmp(&b.id));
        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Ingested {}/{} products ({} failed) in {}ms",
            report.upserted,
            total,
            report.failed.len(),
            report.duration_ms
        );
        report
    }
}

impl std::fmt::Debug for RecordBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordBuilder")
            .field("provider", &self.provider.name())
            .field("backend", &self.backend.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
