//! Storage backend trait and factory.
//!
//! The `StorageBackend` trait is the one seam between the search
//! orchestrator and whatever store holds the records. Two realizations
//! exist:
//!
//! - [`AnnIndexBackend`](crate::ann::AnnIndexBackend): a dedicated
//!   nearest-neighbor index per modality plus a record catalog
//! - [`DocumentStoreBackend`](crate::document::DocumentStoreBackend): a
//!   general document store with native vector query or an explicit,
//!   flagged brute-force fallback
//!
//! [`create_storage_backend`] selects and wires one from a [`VectorConfig`].

use async_trait::async_trait;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use vitrine_core::{Dimensions, Error, Modality, Result, VectorRecord};

use crate::ann::{AnnIndexBackend, FlatIndex, VectorIndex};
use crate::document::{DocumentStoreBackend, MemoryDocumentStore};
use crate::persistence;
use crate::redb_store::RedbDocumentStore;
use crate::retry::RetryingBackend;
use crate::types::{BackendKind, NeighborList, VectorConfig};

/// File name of the ANN snapshot inside `db_path`.
pub const ANN_SNAPSHOT_FILE: &str = "ann-snapshot.json";

/// Trait for record storage with per-modality nearest-neighbor search.
///
/// # Contract
///
/// - `upsert` validates before writing and replaces a record atomically,
///   preserving its original `created_at`.
/// - `get` returns `Ok(None)` for unknown ids.
/// - `delete` succeeds for unknown ids.
/// - `search_nearest` returns at most `k` neighbors by descending cosine
///   similarity, ties by ascending id. `k < 1` or a query of the wrong
///   length fails with [`Error::InvalidArgument`] before any I/O.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Insert or replace a record.
    async fn upsert(&self, record: VectorRecord) -> Result<()>;

    /// Fetch a record by id.
    async fn get(&self, id: &str) -> Result<Option<VectorRecord>>;

    /// Remove a record. Absent ids are not an error.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Nearest neighbors of `query` in the `modality` embedding space.
    async fn search_nearest(
        &self,
        query: &[f32],
        modality: Modality,
        k: usize,
    ) -> Result<NeighborList>;

    /// Number of stored records.
    async fn len(&self) -> Result<usize>;

    /// Whether the backend holds no records.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Configured dimensionality per modality.
    fn dimensions(&self) -> Dimensions;

    /// The backend name for diagnostics.
    fn name(&self) -> &str;
}

/// Check `search_nearest` arguments before touching the store.
pub fn validate_query(
    dimensions: &Dimensions,
    query: &[f32],
    modality: Modality,
    k: usize,
) -> Result<()> {
    if k < 1 {
        return Err(Error::invalid_argument("k must be at least 1"));
    }
    let expected = dimensions.for_modality(modality);
    if query.len() != expected {
        return Err(Error::invalid_argument(format!(
            "{modality} query has {} dimensions, expected {expected}",
            query.len()
        )));
    }
    Ok(())
}

// ============================================================================
// Factory
// ============================================================================

/// A configured backend plus whatever it needs to persist on shutdown.
pub struct OpenedBackend {
    /// The backend, wrapped with the configured retry budget.
    pub backend: Arc<dyn StorageBackend>,
    snapshot: Option<(PathBuf, Arc<AnnIndexBackend>)>,
}

impl OpenedBackend {
    /// Persist in-memory state, if this backend has any to persist.
    pub async fn flush(&self) -> Result<()> {
        if let Some((path, ann)) = &self.snapshot {
            persistence::save_snapshot(path, ann).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for OpenedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedBackend")
            .field("backend", &self.backend.name())
            .field("snapshot", &self.snapshot.as_ref().map(|(p, _)| p))
            .finish()
    }
}

/// Create a storage backend from configuration.
///
/// - `ann_index`: flat in-memory indexes (LanceDB tables under `db_path`
///   when the `vector-lancedb` feature is enabled). With a `db_path`, the
///   catalog is restored from and flushed to a JSON snapshot.
/// - `document_store`: a redb file at `<db_path>/<documents>.redb`, or an
///   in-memory store when no `db_path` is configured.
///
/// Every backend is wrapped in a [`RetryingBackend`].
pub async fn create_storage_backend(config: &VectorConfig) -> Result<OpenedBackend> {
    config.validate()?;
    let dimensions = config.dimensions();

    let (inner, snapshot): (Arc<dyn StorageBackend>, _) = match config.backend_kind {
        BackendKind::AnnIndex => {
            let (text_index, image_index) = open_indexes(config).await?;
            let ann = Arc::new(AnnIndexBackend::new(dimensions, text_index, image_index));

            let snapshot = match &config.db_path {
                Some(dir) => {
                    tokio::fs::create_dir_all(dir)
                        .await
                        .map_err(|e| Error::io_with_path(e, dir))?;
                    let path = dir.join(ANN_SNAPSHOT_FILE);
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        let (metadata, records) = persistence::load_snapshot(&path).await?;
                        ann.restore(&metadata, records).await?;
                    }
                    Some((path, Arc::clone(&ann)))
                }
                None => None,
            };
            (ann as Arc<dyn StorageBackend>, snapshot)
        }
        BackendKind::DocumentStore => {
            let backend: Arc<dyn StorageBackend> = match &config.db_path {
                Some(dir) => {
                    let path = dir.join(format!("{}.redb", config.collections.documents));
                    let store = RedbDocumentStore::open(&path).await?;
                    Arc::new(DocumentStoreBackend::new(
                        store,
                        dimensions,
                        config.candidate_limit,
                    ))
                }
                None => Arc::new(DocumentStoreBackend::new(
                    MemoryDocumentStore::new(),
                    dimensions,
                    config.candidate_limit,
                )),
            };
            (backend, None)
        }
    };

    info!(
        "Opened {} storage backend ({} text dims, {} image dims)",
        inner.name(),
        dimensions.text,
        dimensions.image
    );

    Ok(OpenedBackend {
        backend: Arc::new(RetryingBackend::new(inner, config.retry.clone())),
        snapshot,
    })
}

#[cfg(feature = "vector-lancedb")]
async fn open_indexes(
    config: &VectorConfig,
) -> Result<(Box<dyn VectorIndex>, Box<dyn VectorIndex>)> {
    use crate::lancedb::LancedbIndex;

    match &config.db_path {
        Some(dir) => {
            let uri = dir.join("lance");
            let uri = uri.to_string_lossy();
            let text =
                LancedbIndex::open(&uri, &config.collections.text_index, config.text_dimension)
                    .await?;
            let image =
                LancedbIndex::open(&uri, &config.collections.image_index, config.image_dimension)
                    .await?;
            Ok((Box::new(text), Box::new(image)))
        }
        None => Ok((Box::new(FlatIndex::new()), Box::new(FlatIndex::new()))),
    }
}

#[cfg(not(feature = "vector-lancedb"))]
async fn open_indexes(
    _config: &VectorConfig,
) -> Result<(Box<dyn VectorIndex>, Box<dyn VectorIndex>)> {
    Ok((Box::new(FlatIndex::new()), Box::new(FlatIndex::new())))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn small_config() -> VectorConfig {
        VectorConfig {
            text_dimension: 2,
            image_dimension: 2,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_query() {
        let dims = Dimensions::new(2, 3);
        assert!(validate_query(&dims, &[1.0, 0.0], Modality::Text, 1).is_ok());
        assert!(matches!(
            validate_query(&dims, &[1.0, 0.0], Modality::Text, 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            validate_query(&dims, &[1.0, 0.0], Modality::Image, 5),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_factory_ann_in_memory() {
        let opened = create_storage_backend(&small_config()).await.unwrap();
        assert_eq!(opened.backend.name(), "ann_index");
        assert!(opened.backend.is_empty().await.unwrap());
        opened.flush().await.unwrap();
    }

    #[tokio::test]
    async fn test_factory_document_store_in_memory() {
        let config = VectorConfig {
            backend_kind: BackendKind::DocumentStore,
            ..small_config()
        };
        let opened = create_storage_backend(&config).await.unwrap();
        assert_eq!(opened.backend.name(), "document_store");
    }

    #[tokio::test]
    async fn test_factory_rejects_invalid_config() {
        let config = VectorConfig {
            image_dimension: 0,
            ..small_config()
        };
        assert!(matches!(
            create_storage_backend(&config).await,
            Err(Error::Config(_))
        ));
    }

    #[cfg(not(feature = "vector-lancedb"))]
    #[tokio::test]
    async fn test_factory_ann_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = VectorConfig {
            db_path: Some(dir.path().to_path_buf()),
            ..small_config()
        };

        let opened = create_storage_backend(&config).await.unwrap();
        opened
            .backend
            .upsert(VectorRecord::new("p1").with_text_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        opened.flush().await.unwrap();
        assert!(dir.path().join(ANN_SNAPSHOT_FILE).exists());

        let reopened = create_storage_backend(&config).await.unwrap();
        let record = reopened.backend.get("p1").await.unwrap().unwrap();
        assert_eq!(record.text_embedding, Some(vec![1.0, 0.0]));
        assert!(record.created_at.is_some());
    }

    #[tokio::test]
    async fn test_factory_redb_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let config = VectorConfig {
            backend_kind: BackendKind::DocumentStore,
            db_path: Some(dir.path().to_path_buf()),
            ..small_config()
        };

        {
            let opened = create_storage_backend(&config).await.unwrap();
            opened
                .backend
                .upsert(VectorRecord::new("p1").with_image_embedding(vec![0.0, 1.0]))
                .await
                .unwrap();
        }
        assert!(dir.path().join("products.redb").exists());

        let reopened = create_storage_backend(&config).await.unwrap();
        assert_eq!(reopened.backend.len().await.unwrap(), 1);
    }
}
