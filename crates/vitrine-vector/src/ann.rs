//! Dedicated nearest-neighbor index backend.
//!
//! Keeps one [`VectorIndex`] per modality plus a catalog of full records.
//! A record is only findable in the modality whose index holds its vector.
//!
//! Writes hold the catalog write lock across both index updates and run on
//! a spawned task, so they finish even when the caller stops waiting. If
//! the second index update fails, the first is rolled back. The two indexes
//! and the catalog never disagree about a record.

use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use tokio::sync::RwLock as AsyncRwLock;
use vitrine_core::{Dimensions, Error, Modality, Result, VectorRecord};

use crate::backend::{StorageBackend, validate_query};
use crate::persistence::SnapshotMetadata;
use crate::similarity::top_k;
use crate::types::{Neighbor, NeighborList};

/// A single-modality vector index.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the vector for `id`.
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()>;

    /// Remove `id`. Absent ids are not an error.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Top `k` ids by cosine similarity, ties by ascending id.
    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Number of indexed vectors.
    async fn len(&self) -> Result<usize>;

    /// Index name for diagnostics.
    fn name(&self) -> &str;
}

// ============================================================================
// Flat index
// ============================================================================

/// Exact in-memory index: scores every vector on each query.
#[derive(Debug, Default)]
pub struct FlatIndex {
    vectors: RwLock<BTreeMap<String, Vec<f32>>>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned() -> Error {
    Error::backend("index lock poisoned")
}

#[async_trait]
impl VectorIndex for FlatIndex {
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(|_| poisoned())?;
        vectors.insert(id.to_string(), vector.to_vec());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut vectors = self.vectors.write().map_err(|_| poisoned())?;
        vectors.remove(id);
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let vectors = self.vectors.read().map_err(|_| poisoned())?;
        Ok(top_k(
            query,
            vectors.iter().map(|(id, v)| (id.as_str(), v.as_slice())),
            k,
        ))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.vectors.read().map_err(|_| poisoned())?.len())
    }

    fn name(&self) -> &str {
        "flat"
    }
}

// ============================================================================
// Backend
// ============================================================================

fn embedding_of(record: Option<&VectorRecord>, modality: Modality) -> Option<&[f32]> {
    record.and_then(|r| r.embedding(modality))
}

type Catalog = AsyncRwLock<HashMap<String, VectorRecord>>;

/// The per-modality indexes, shareable with a detached write task.
#[derive(Clone)]
struct Indexes {
    text: Arc<dyn VectorIndex>,
    image: Arc<dyn VectorIndex>,
}

impl Indexes {
    fn get(&self, modality: Modality) -> &dyn VectorIndex {
        match modality {
            Modality::Text => self.text.as_ref(),
            Modality::Image => self.image.as_ref(),
        }
    }

    /// Make `modality`'s index reflect `target`, whatever it held before.
    async fn sync(&self, modality: Modality, id: &str, target: Option<&[f32]>) -> Result<()> {
        match target {
            Some(vector) => self.get(modality).upsert(id, vector).await,
            None => self.get(modality).remove(id).await,
        }
    }

    /// Apply `next` over `previous` in both indexes, undoing the text index
    /// if the image index fails.
    async fn write(
        &self,
        id: &str,
        previous: Option<&VectorRecord>,
        next: Option<&VectorRecord>,
    ) -> Result<()> {
        self.sync(Modality::Text, id, embedding_of(next, Modality::Text))
            .await?;

        if let Err(e) = self
            .sync(Modality::Image, id, embedding_of(next, Modality::Image))
            .await
        {
            if let Err(undo) = self
                .sync(Modality::Text, id, embedding_of(previous, Modality::Text))
                .await
            {
                warn!("Rollback of text index for '{id}' failed: {undo}");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// A pending change to one record.
enum Write {
    Upsert(VectorRecord),
    Delete(String),
}

/// Apply `write` to the indexes and catalog under the catalog write lock.
async fn apply(indexes: &Indexes, catalog: &Catalog, write: Write) -> Result<()> {
    let mut catalog = catalog.write().await;
    match write {
        Write::Upsert(mut record) => {
            let previous = catalog.get(&record.id).cloned();
            record.stamp(previous.as_ref().and_then(|p| p.created_at), Utc::now());
            indexes
                .write(&record.id, previous.as_ref(), Some(&record))
                .await?;
            catalog.insert(record.id.clone(), record);
        }
        Write::Delete(id) => {
            let Some(previous) = catalog.get(&id).cloned() else {
                return Ok(());
            };
            indexes.write(&id, Some(&previous), None).await?;
            catalog.remove(&id);
        }
    }
    Ok(())
}

/// Storage backend over one index per modality.
pub struct AnnIndexBackend {
    dimensions: Dimensions,
    indexes: Indexes,
    catalog: Arc<Catalog>,
}

impl AnnIndexBackend {
    /// Create a backend over the given indexes.
    pub fn new(
        dimensions: Dimensions,
        text_index: Box<dyn VectorIndex>,
        image_index: Box<dyn VectorIndex>,
    ) -> Self {
        Self {
            dimensions,
            indexes: Indexes {
                text: Arc::from(text_index),
                image: Arc::from(image_index),
            },
            catalog: Arc::new(AsyncRwLock::new(HashMap::new())),
        }
    }

    /// In-memory backend with flat indexes.
    pub fn in_memory(dimensions: Dimensions) -> Self {
        Self::new(
            dimensions,
            Box::new(FlatIndex::new()),
            Box::new(FlatIndex::new()),
        )
    }

    /// Run `write` to completion on a separate task.
    async fn commit(&self, write: Write) -> Result<()> {
        let indexes = self.indexes.clone();
        let catalog = Arc::clone(&self.catalog);
        tokio::spawn(async move { apply(&indexes, &catalog, write).await })
            .await
            .map_err(|e| Error::backend(format!("index write task failed: {e}")))?
    }

    /// All records, ordered by id.
    pub async fn records(&self) -> Vec<VectorRecord> {
        let catalog = self.catalog.read().await;
        let mut records: Vec<VectorRecord> = catalog.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Reload records from a snapshot, keeping their stored timestamps.
    ///
    /// Rejects the snapshot if its dimensions differ from this backend's.
    pub async fn restore(
        &self,
        metadata: &SnapshotMetadata,
        records: Vec<VectorRecord>,
    ) -> Result<usize> {
        if metadata.dimensions != self.dimensions {
            return Err(Error::validation(format!(
                "snapshot dimensions {}x{} do not match backend {}x{}",
                metadata.dimensions.text,
                metadata.dimensions.image,
                self.dimensions.text,
                self.dimensions.image
            )));
        }
        for record in &records {
            record.validate(&self.dimensions)?;
        }

        let mut catalog = self.catalog.write().await;
        let count = records.len();
        for record in records {
            let previous = catalog.get(&record.id).cloned();
            self.indexes
                .write(&record.id, previous.as_ref(), Some(&record))
                .await?;
            catalog.insert(record.id.clone(), record);
        }
        debug!("Restored {count} records into ann index");
        Ok(count)
    }
}

#[async_trait]
impl StorageBackend for AnnIndexBackend {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        record.validate(&self.dimensions)?;
        self.commit(Write::Upsert(record)).await
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        Ok(self.catalog.read().await.get(id).cloned())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.commit(Write::Delete(id.to_string())).await
    }

    async fn search_nearest(
        &self,
        query: &[f32],
        modality: Modality,
        k: usize,
    ) -> Result<NeighborList> {
        validate_query(&self.dimensions, query, modality, k)?;

        // Held so a concurrent write is either fully visible or not at all
        let _catalog = self.catalog.read().await;
        let items = self.indexes.get(modality).nearest(query, k).await?;
        Ok(NeighborList::new(items, self.name()))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.catalog.read().await.len())
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn name(&self) -> &str {
        "ann_index"
    }
}

impl std::fmt::Debug for AnnIndexBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnnIndexBackend")
            .field("dimensions", &self.dimensions)
            .field("text_index", &self.indexes.text.name())
            .field("image_index", &self.indexes.image.name())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
