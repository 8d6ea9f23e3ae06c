//! Search orchestrator: the public entry point of the engine.
//!
//! A search embeds each present query modality, asks the storage backend
//! for per-modality candidates, fuses the two ranked lists with RRF when
//! both are present, and resolves the surviving ids to their metadata.
//!
//! # Concurrency
//!
//! The text and image paths run concurrently inside the calling task. No
//! work is spawned, so dropping the search future cancels every in-flight
//! provider and backend call. Without degraded mode the first failure
//! cancels the sibling path immediately.
//!
//! Every provider and backend call runs under a deadline and fails with
//! [`Error::Timeout`] when it elapses.

use futures::future::try_join_all;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use vitrine_core::{Error, Modality, Result, VectorRecord};

use crate::backend::StorageBackend;
use crate::deadline::with_deadline;
use crate::embedding::{EmbeddingProvider, check_embedding_dimension};
use crate::fusion::{FusedEntry, fuse, rank_single, ranks_from_neighbors};
use crate::types::{Degradation, NeighborList, SearchHit, SearchResults, VectorConfig};

/// Default number of results per search.
pub const DEFAULT_LIMIT: usize = 10;

// ============================================================================
// Request
// ============================================================================

/// A search query: text, image, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Natural-language query.
    pub text: Option<String>,

    /// Example image bytes.
    pub image: Option<Vec<u8>>,

    /// Maximum number of results.
    pub limit: usize,

    /// Proceed with the surviving modality if the other one fails.
    pub allow_degraded: bool,

    /// Per-call deadline override.
    pub timeout: Option<Duration>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: None,
            image: None,
            limit: DEFAULT_LIMIT,
            allow_degraded: false,
            timeout: None,
        }
    }
}

impl SearchRequest {
    /// Create an empty request with the default limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text query.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set the image query.
    pub fn with_image(mut self, image: impl Into<Vec<u8>>) -> Self {
        self.image = Some(image.into());
        self
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Allow single-modality fallback when one modality fails.
    pub fn allow_degraded(mut self) -> Self {
        self.allow_degraded = true;
        self
    }

    /// Override the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The text query, unless absent or blank.
    fn effective_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// The image query, unless absent or empty.
    fn effective_image(&self) -> Option<&[u8]> {
        self.image.as_deref().filter(|i| !i.is_empty())
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Tunables the orchestrator is constructed with.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    /// RRF smoothing constant.
    pub rrf_k: u32,

    /// Minimum per-modality candidate breadth.
    pub min_candidates: usize,

    /// Over-fetch factor applied to the limit.
    pub candidate_multiplier: usize,

    /// Default deadline for each provider/backend call.
    pub call_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self::from_config(&VectorConfig::default())
    }
}

impl SearchSettings {
    /// Settings taken from a vector configuration.
    pub fn from_config(config: &VectorConfig) -> Self {
        Self {
            rrf_k: config.rrf_k_constant,
            min_candidates: config.min_candidates,
            candidate_multiplier: config.candidate_multiplier,
            call_timeout: config.timeout(),
        }
    }

    /// Per-modality candidate breadth for a result limit.
    pub fn candidate_breadth(&self, limit: usize) -> usize {
        limit
            .saturating_mul(self.candidate_multiplier)
            .max(self.min_candidates)
            .max(limit)
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

#[derive(Clone, Copy)]
enum QueryInput<'a> {
    Text(&'a str),
    Image(&'a [u8]),
}

impl QueryInput<'_> {
    fn modality(&self) -> Modality {
        match self {
            Self::Text(_) => Modality::Text,
            Self::Image(_) => Modality::Image,
        }
    }
}

/// Stateless per call; holds only its provider and backend handles.
pub struct SearchOrchestrator {
    provider: Arc<dyn EmbeddingProvider>,
    backend: Arc<dyn StorageBackend>,
    settings: SearchSettings,
}

impl SearchOrchestrator {
    /// Create an orchestrator.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn StorageBackend>,
        settings: SearchSettings,
    ) -> Self {
        Self {
            provider,
            backend,
            settings,
        }
    }

    /// The configured settings.
    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    /// The storage backend.
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// The embedding provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Insert or replace a record under the call deadline.
    pub async fn upsert(&self, record: VectorRecord) -> Result<()> {
        with_deadline(
            "backend upsert",
            self.settings.call_timeout,
            self.backend.upsert(record),
        )
        .await
    }

    /// Delete a record under the call deadline.
    pub async fn delete(&self, id: &str) -> Result<()> {
        with_deadline(
            "backend delete",
            self.settings.call_timeout,
            self.backend.delete(id),
        )
        .await
    }

    /// Fetch a record under the call deadline.
    pub async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        with_deadline(
            "backend get",
            self.settings.call_timeout,
            self.backend.get(id),
        )
        .await
    }

    /// Run a search.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidArgument`] when neither query modality is present or
    ///   `limit` is zero
    /// - [`Error::Provider`] / [`Error::Timeout`] when a modality fails and
    ///   degraded mode was not requested (or no modality survived)
    /// - [`Error::Backend`] when the store fails
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResults> {
        let text = request.effective_text();
        let image = request.effective_image();

        if request.limit < 1 {
            return Err(Error::invalid_argument("limit must be at least 1"));
        }

        let limit = request.limit;
        let breadth = self.settings.candidate_breadth(limit);
        let timeout = request.timeout.unwrap_or(self.settings.call_timeout);
        debug!(
            "Search: text={} image={} limit={limit} candidates={breadth}",
            text.is_some(),
            image.is_some()
        );

        let mut degraded = Vec::new();
        let (text_list, image_list) = match (text, image) {
            (Some(t), Some(i)) => {
                let text_path = self.candidates(QueryInput::Text(t), breadth, timeout);
                let image_path = self.candidates(QueryInput::Image(i), breadth, timeout);

                if request.allow_degraded {
                    let (t, i) = tokio::join!(text_path, image_path);
                    match (t, i) {
                        (Ok(t), Ok(i)) => (Some(t), Some(i)),
                        (Ok(t), Err(e)) => {
                            degraded.push(drop_modality(Modality::Image, e)?);
                            (Some(t), None)
                        }
                        (Err(e), Ok(i)) => {
                            degraded.push(drop_modality(Modality::Text, e)?);
                            (None, Some(i))
                        }
                        (Err(e), Err(_)) => return Err(e),
                    }
                } else {
                    let (t, i) = tokio::try_join!(text_path, image_path)?;
                    (Some(t), Some(i))
                }
            }
            (Some(t), None) => (
                Some(self.candidates(QueryInput::Text(t), breadth, timeout).await?),
                None,
            ),
            (None, Some(i)) => (
                None,
                Some(self.candidates(QueryInput::Image(i), breadth, timeout).await?),
            ),
            (None, None) => {
                return Err(Error::invalid_argument(
                    "search needs a text query, an image query, or both",
                ));
            }
        };

        for list in [&text_list, &image_list].into_iter().flatten() {
            if let Some(d) = &list.degraded {
                degraded.push(d.clone());
            }
        }

        let mut fused = match (&text_list, &image_list) {
            (Some(t), Some(i)) => fuse(
                &ranks_from_neighbors(&t.items),
                &ranks_from_neighbors(&i.items),
                self.settings.rrf_k,
            ),
            (Some(t), None) => rank_single(
                &ranks_from_neighbors(&t.items),
                Modality::Text,
                self.settings.rrf_k,
            ),
            (None, Some(i)) => rank_single(
                &ranks_from_neighbors(&i.items),
                Modality::Image,
                self.settings.rrf_k,
            ),
            (None, None) => Vec::new(),
        };
        fused.truncate(limit);

        let items = self.resolve(fused, timeout, &mut degraded).await?;
        let total = items.len();
        Ok(SearchResults {
            items,
            total,
            backend: self.backend.name().to_string(),
            degraded,
        })
    }

    /// Embed one query modality and fetch its nearest neighbors.
    async fn candidates(
        &self,
        input: QueryInput<'_>,
        k: usize,
        timeout: Duration,
    ) -> Result<NeighborList> {
        let modality = input.modality();
        let vector = match input {
            QueryInput::Text(text) => {
                with_deadline("embed_text", timeout, self.provider.embed_text(text)).await?
            }
            QueryInput::Image(image) => {
                with_deadline("embed_image", timeout, self.provider.embed_image(image)).await?
            }
        };
        check_embedding_dimension(&self.backend.dimensions(), modality, &vector)?;

        let list = with_deadline(
            "search_nearest",
            timeout,
            self.backend.search_nearest(&vector, modality, k),
        )
        .await?;
        debug!(
            "{modality} candidates: {} from {}",
            list.items.len(),
            list.backend
        );
        Ok(list)
    }

    /// Attach metadata to fused entries, dropping (and flagging) any whose
    /// record disappeared since the search.
    async fn resolve(
        &self,
        fused: Vec<FusedEntry>,
        timeout: Duration,
        degraded: &mut Vec<Degradation>,
    ) -> Result<Vec<SearchHit>> {
        let records = try_join_all(fused.iter().map(|entry| {
            with_deadline("backend get", timeout, self.backend.get(&entry.id))
        }))
        .await?;

        let mut items = Vec::with_capacity(fused.len());
        let mut missing = Vec::new();
        for (entry, record) in fused.into_iter().zip(records) {
            match record {
                Some(record) => items.push(SearchHit {
                    source: entry.source(),
                    id: entry.id,
                    score: entry.score,
                    text_rank: entry.text_rank,
                    image_rank: entry.image_rank,
                    metadata: record.metadata,
                }),
                None => missing.push(entry.id),
            }
        }

        if !missing.is_empty() {
            warn!(
                "{} ranked records vanished before resolution: {}",
                missing.len(),
                missing.join(", ")
            );
            degraded.push(Degradation::UnresolvedHits { ids: missing });
        }
        Ok(items)
    }
}

/// Turn a recoverable modality failure into a degradation marker.
fn drop_modality(modality: Modality, error: Error) -> Result<Degradation> {
    if !error.is_modality_recoverable() {
        return Err(error);
    }
    warn!("Dropping {modality} query modality: {error}");
    Ok(Degradation::ModalityDropped {
        modality,
        reason: error.to_string(),
    })
}

impl std::fmt::Debug for SearchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchOrchestrator")
            .field("provider", &self.provider.name())
            .field("backend", &self.backend.name())
            .field("settings", &self.settings)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
