//! Multi-modal embedding storage and fusion ranking for Vitrine.
//!
//! This crate stores product embeddings in two parallel spaces (text and
//! image), finds nearest neighbors in each, and merges the per-modality
//! rankings with Reciprocal Rank Fusion.
//!
//! # Features
//!
//! - `vector-lancedb`: Enable LanceDB tables as the ANN index per modality
//! - `provider-http`: Enable the HTTP embedding provider
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     vitrine-vector                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  EmbeddingProvider trait                                    │
//! │  ├── MockEmbeddingProvider / StaticEmbeddingProvider        │
//! │  └── HttpEmbeddingProvider (feature: provider-http)         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  StorageBackend trait                                       │
//! │  ├── AnnIndexBackend (FlatIndex | LancedbIndex)             │
//! │  ├── DocumentStoreBackend (Memory | Redb document store)    │
//! │  └── RetryingBackend (bounded backoff wrapper)              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Fusion (RRF over per-modality ranks)                       │
//! │  SearchOrchestrator (embed → search → fuse → resolve)       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  RecordBuilder (batch embed + upsert)                       │
//! │  Persistence (JSON snapshot of the in-memory index)         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use vitrine_vector::{
//!     create_storage_backend, MockEmbeddingProvider, SearchOrchestrator,
//!     SearchRequest, SearchSettings, VectorConfig,
//! };
//! use std::sync::Arc;
//!
//! let config = VectorConfig::default();
//! let opened = create_storage_backend(&config).await?;
//! let provider = Arc::new(MockEmbeddingProvider::new(
//!     config.text_dimension,
//!     config.image_dimension,
//! ));
//! let search = SearchOrchestrator::new(
//!     provider,
//!     opened.backend.clone(),
//!     SearchSettings::from_config(&config),
//! );
//!
//! let results = search
//!     .search(SearchRequest::new().with_text("walnut desk lamp").with_limit(5))
//!     .await?;
//! for hit in results.items {
//!     println!("{}: {:.5} ({:?})", hit.id, hit.score, hit.source);
//! }
//! ```

// Core modules (always available)
pub mod backend;
pub mod embedding;
pub mod types;

// Scoring and ranking
pub mod fusion;
pub mod similarity;

// Storage realizations
pub mod ann;
pub mod document;
pub mod redb_store;
pub mod retry;

// Orchestration, ingestion and persistence
pub mod deadline;
pub mod ingest;
pub mod persistence;
pub mod search;

// Feature-gated modules
#[cfg(feature = "vector-lancedb")]
pub mod lancedb;

#[cfg(feature = "provider-http")]
pub mod remote;

// Re-exports: core types
pub use types::{
    BackendKind, CollectionIds, Degradation, HitSource, Neighbor, NeighborList, RetryConfig,
    SearchHit, SearchResults, VectorConfig,
};

// Re-exports: traits
pub use backend::StorageBackend;
pub use document::DocumentStore;
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider, StaticEmbeddingProvider};

// Re-exports: backends
pub use ann::{AnnIndexBackend, FlatIndex, VectorIndex};
pub use document::{DocumentStoreBackend, MemoryDocumentStore};
pub use redb_store::RedbDocumentStore;
pub use retry::RetryingBackend;

// Re-exports: ranking and search
pub use fusion::{FusedEntry, RankedId, fuse, rank_single, rrf_contribution};
pub use search::{SearchOrchestrator, SearchRequest, SearchSettings};
pub use similarity::cosine_similarity;

// Re-exports: ingestion and persistence
pub use ingest::{IngestFailure, IngestReport, ProductInput, RecordBuilder, compose_product_text};
pub use persistence::{SnapshotMetadata, load_snapshot, save_snapshot};

// Re-exports: factory
pub use backend::{OpenedBackend, create_storage_backend};

// Feature-gated re-exports
#[cfg(feature = "vector-lancedb")]
pub use lancedb::LancedbIndex;

#[cfg(feature = "provider-http")]
pub use remote::{HttpEmbeddingProvider, HttpProviderConfig};
