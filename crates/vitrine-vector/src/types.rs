//! Common types for the vector search module.
//!
//! These types are shared by every storage realization, the fusion ranker,
//! and the search orchestrator, and are always available regardless of
//! feature flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use vitrine_core::{Dimensions, Error, Metadata, Modality, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Which storage realization backs a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Dedicated nearest-neighbor index, one per modality.
    #[default]
    AnnIndex,
    /// General-purpose document store.
    DocumentStore,
}

impl BackendKind {
    /// Configuration spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnnIndex => "ann_index",
            Self::DocumentStore => "document_store",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ann_index" => Ok(Self::AnnIndex),
            "document_store" => Ok(Self::DocumentStore),
            other => Err(Error::config(format!(
                "unknown backend kind '{other}' (expected ann_index or document_store)"
            ))),
        }
    }
}

/// Names of the indexes/collections a backend writes to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionIds {
    /// Text embedding index name.
    #[serde(default = "default_text_index")]
    pub text_index: String,

    /// Image embedding index name.
    #[serde(default = "default_image_index")]
    pub image_index: String,

    /// Document collection name.
    #[serde(default = "default_documents")]
    pub documents: String,
}

fn default_text_index() -> String {
    "product_text".to_string()
}

fn default_image_index() -> String {
    "product_image".to_string()
}

fn default_documents() -> String {
    "products".to_string()
}

impl Default for CollectionIds {
    fn default() -> Self {
        Self {
            text_index: default_text_index(),
            image_index: default_image_index(),
            documents: default_documents(),
        }
    }
}

/// Bounded retry budget for backend calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on any single retry delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_attempts() -> usize {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Vector storage and search configuration.
///
/// Passed explicitly to backend and orchestrator constructors at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorConfig {
    /// Storage realization.
    #[serde(default)]
    pub backend_kind: BackendKind,

    /// Text embedding dimensionality.
    #[serde(default = "default_text_dimension")]
    pub text_dimension: usize,

    /// Image embedding dimensionality.
    #[serde(default = "default_image_dimension")]
    pub image_dimension: usize,

    /// Index and collection names.
    #[serde(default)]
    pub collections: CollectionIds,

    /// RRF smoothing constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k_constant: u32,

    /// Directory for persisted data. In-memory only when unset.
    #[serde(default)]
    pub db_path: Option<PathBuf>,

    /// Upper bound on records scored by brute-force fallback search.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// Minimum per-modality candidate breadth for search.
    #[serde(default = "default_min_candidates")]
    pub min_candidates: usize,

    /// Over-fetch factor applied to the requested limit.
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Deadline for each provider/backend call, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry budget for backend calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_text_dimension() -> usize {
    1536
}

fn default_image_dimension() -> usize {
    1408
}

fn default_rrf_k() -> u32 {
    60
}

fn default_candidate_limit() -> usize {
    1000
}

fn default_min_candidates() -> usize {
    50
}

fn default_candidate_multiplier() -> usize {
    3
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend_kind: BackendKind::default(),
            text_dimension: default_text_dimension(),
            image_dimension: default_image_dimension(),
            collections: CollectionIds::default(),
            rrf_k_constant: default_rrf_k(),
            db_path: None,
            candidate_limit: default_candidate_limit(),
            min_candidates: default_min_candidates(),
            candidate_multiplier: default_candidate_multiplier(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
        }
    }
}

impl VectorConfig {
    /// Configured dimensions as a pair.
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.text_dimension, self.image_dimension)
    }

    /// Per-call deadline.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject configurations no backend can run with.
    pub fn validate(&self) -> Result<()> {
        if self.text_dimension == 0 || self.image_dimension == 0 {
            return Err(Error::config("embedding dimensions must be greater than zero"));
        }
        if self.candidate_limit == 0 {
            return Err(Error::config("candidate_limit must be greater than zero"));
        }
        if self.candidate_multiplier == 0 {
            return Err(Error::config("candidate_multiplier must be greater than zero"));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::config("retry.max_attempts must be at least 1"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("timeout_ms must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// Nearest-neighbor results
// ============================================================================

/// One entry of a nearest-neighbor list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Record identifier.
    pub id: String,

    /// Cosine similarity to the query.
    pub score: f32,
}

impl Neighbor {
    /// Create a neighbor entry.
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score,
        }
    }
}

/// Output of `search_nearest`: neighbors, strictly ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborList {
    /// Neighbors by descending score, ties by ascending id.
    pub items: Vec<Neighbor>,

    /// Backend that produced the list.
    pub backend: String,

    /// Set when the list came from a fallback path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<Degradation>,
}

impl NeighborList {
    /// A full-fidelity list.
    pub fn new(items: Vec<Neighbor>, backend: impl Into<String>) -> Self {
        Self {
            items,
            backend: backend.into(),
            degraded: None,
        }
    }

    /// Mark the list as produced by a fallback path.
    pub fn with_degradation(mut self, degradation: Degradation) -> Self {
        self.degraded = Some(degradation);
        self
    }
}

// ============================================================================
// Degradation markers
// ============================================================================

/// A reduced-fidelity path taken while answering a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    /// The store had no native vector query; records were scored one by one.
    BruteForceScan {
        /// Modality that was scanned.
        modality: Modality,
        /// Records actually scored.
        candidates_scanned: usize,
        /// Configured bound on scored records.
        candidate_limit: usize,
        /// Whether records beyond the bound were skipped.
        truncated: bool,
    },
    /// A query modality failed and the request proceeded without it.
    ModalityDropped {
        /// Modality that was dropped.
        modality: Modality,
        /// Failure that caused the drop.
        reason: String,
    },
    /// Ranked ids whose records were deleted before metadata resolution.
    UnresolvedHits {
        /// Ids dropped from the results.
        ids: Vec<String>,
    },
}

impl fmt::Display for Degradation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BruteForceScan {
                modality,
                candidates_scanned,
                candidate_limit,
                truncated,
            } => {
                write!(
                    f,
                    "brute-force {modality} scan over {candidates_scanned} records (limit {candidate_limit})"
                )?;
                if *truncated {
                    f.write_str(", truncated")?;
                }
                Ok(())
            }
            Self::ModalityDropped { modality, reason } => {
                write!(f, "{modality} query dropped: {reason}")
            }
            Self::UnresolvedHits { ids } => {
                write!(f, "{} hits vanished before resolution", ids.len())
            }
        }
    }
}

// ============================================================================
// Search results
// ============================================================================

/// Which query modalities contributed a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HitSource {
    /// Text list only.
    Text,
    /// Image list only.
    Image,
    /// Both lists.
    Both,
}

impl HitSource {
    /// Source for a hit with the given per-modality ranks.
    pub fn from_ranks(text_rank: Option<usize>, image_rank: Option<usize>) -> Self {
        match (text_rank.is_some(), image_rank.is_some()) {
            (true, true) => Self::Both,
            (false, true) => Self::Image,
            _ => Self::Text,
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Record identifier.
    pub id: String,

    /// RRF score (higher is better).
    pub score: f64,

    /// Contributing modalities.
    pub source: HitSource,

    /// 1-based rank in the text candidate list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_rank: Option<usize>,

    /// 1-based rank in the image candidate list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_rank: Option<usize>,

    /// Record metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Collection of search hits with metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Ordered hits, best first.
    pub items: Vec<SearchHit>,

    /// Number of hits returned.
    pub total: usize,

    /// Backend that served the request.
    pub backend: String,

    /// Every reduced-fidelity path taken.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

impl SearchResults {
    /// Whether any fallback path contributed to these results.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Hit ids in order.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(|h| h.id.as_str()).collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
