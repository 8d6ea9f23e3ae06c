//! Document store backend.
//!
//! Records live as whole documents in a general-purpose store. Nearest
//! neighbor search uses the store's native vector query when it has one.
//! Otherwise the backend scores a bounded candidate set itself: that path
//! is logged at `warn` and the result is marked with
//! [`Degradation::BruteForceScan`], so reduced recall is never silent.

use async_trait::async_trait;
use chrono::Utc;
use log::warn;
use std::collections::BTreeMap;
use std::sync::RwLock;
use vitrine_core::{Dimensions, Error, Modality, Result, VectorRecord};

use crate::backend::{StorageBackend, validate_query};
use crate::similarity::{rank_neighbors, top_k};
use crate::types::{Degradation, Neighbor, NeighborList};

/// A store of whole records keyed by id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write `record`, replacing any previous version in one step.
    ///
    /// Stamps timestamps inside the store's write critical section:
    /// `created_at` is carried over from the replaced record, if any.
    async fn put(&self, record: VectorRecord) -> Result<()>;

    /// Read a record by id.
    async fn fetch(&self, id: &str) -> Result<Option<VectorRecord>>;

    /// Remove a record. Absent ids are not an error.
    async fn remove(&self, id: &str) -> Result<()>;

    /// Up to `limit` records in ascending id order.
    async fn scan(&self, limit: usize) -> Result<Vec<VectorRecord>>;

    /// Number of stored records.
    async fn count(&self) -> Result<usize>;

    /// Native vector query, if the store has one.
    ///
    /// Returns `Ok(None)` when unsupported.
    async fn find_nearest(
        &self,
        _query: &[f32],
        _modality: Modality,
        _k: usize,
    ) -> Result<Option<Vec<Neighbor>>> {
        Ok(None)
    }

    /// Store name for diagnostics.
    fn name(&self) -> &str;
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory document store.
///
/// Without [`with_native_vector_query`](Self::with_native_vector_query) it
/// behaves like a plain key-value store and the backend falls back to
/// brute-force scoring.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: RwLock<BTreeMap<String, VectorRecord>>,
    native_vector_query: bool,
}

impl MemoryDocumentStore {
    /// Create an empty store without vector query support.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a native vector query.
    pub fn with_native_vector_query(mut self) -> Self {
        self.native_vector_query = true;
        self
    }
}

fn poisoned() -> Error {
    Error::backend("document store lock poisoned")
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, mut record: VectorRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        let created = records.get(&record.id).and_then(|r| r.created_at);
        record.stamp(created, Utc::now());
        records.insert(record.id.clone(), record);
        Ok(())
    }

    async fn fetch(&self, id: &str) -> Result<Option<VectorRecord>> {
        Ok(self.records.read().map_err(|_| poisoned())?.get(id).cloned())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.records.write().map_err(|_| poisoned())?.remove(id);
        Ok(())
    }

    async fn scan(&self, limit: usize) -> Result<Vec<VectorRecord>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.values().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(|_| poisoned())?.len())
    }

    async fn find_nearest(
        &self,
        query: &[f32],
        modality: Modality,
        k: usize,
    ) -> Result<Option<Vec<Neighbor>>> {
        if !self.native_vector_query {
            return Ok(None);
        }
        let records = self.records.read().map_err(|_| poisoned())?;
        let candidates = records
            .values()
            .filter_map(|r| r.embedding(modality).map(|v| (r.id.as_str(), v)));
        Ok(Some(top_k(query, candidates, k)))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Backend
// ============================================================================

/// Storage backend over any [`DocumentStore`].
pub struct DocumentStoreBackend<S> {
    store: S,
    dimensions: Dimensions,
    candidate_limit: usize,
}

impl<S: DocumentStore> DocumentStoreBackend<S> {
    /// Create a backend; `candidate_limit` bounds brute-force scoring.
    pub fn new(store: S, dimensions: Dimensions, candidate_limit: usize) -> Self {
        Self {
            store,
            dimensions,
            candidate_limit,
        }
    }

    async fn brute_force(&self, query: &[f32], modality: Modality, k: usize) -> Result<NeighborList> {
        // One read past the limit tells whether anything was left unscored
        let mut candidates = self.store.scan(self.candidate_limit.saturating_add(1)).await?;
        let truncated = candidates.len() > self.candidate_limit;
        candidates.truncate(self.candidate_limit);

        let degradation = Degradation::BruteForceScan {
            modality,
            candidates_scanned: candidates.len(),
            candidate_limit: self.candidate_limit,
            truncated,
        };
        warn!(
            "{} store has no native vector query; {degradation}",
            self.store.name()
        );

        let items = top_k(
            query,
            candidates
                .iter()
                .filter_map(|r| r.embedding(modality).map(|v| (r.id.as_str(), v))),
            k,
        );
        Ok(NeighborList::new(items, self.name()).with_degradation(degradation))
    }
}

#[async_trait]
impl<S: DocumentStore> StorageBackend for DocumentStoreBackend<S> {
    async fn upsert(&self, record: VectorRecord) -> Result<()> {
        record.validate(&self.dimensions)?;
        self.store.put(record).await
    }

    async fn get(&self, id: &str) -> Result<Option<VectorRecord>> {
        self.store.fetch(id).await
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.store.remove(id).await
    }

    async fn search_nearest(
        &self,
        query: &[f32],
        modality: Modality,
        k: usize,
    ) -> Result<NeighborList> {
        validate_query(&self.dimensions, query, modality, k)?;

        match self.store.find_nearest(query, modality, k).await? {
            // Re-rank so the tie-break holds whatever order the store used
            Some(items) => Ok(NeighborList::new(rank_neighbors(items, k), self.name())),
            None => self.brute_force(query, modality, k).await,
        }
    }

    async fn len(&self) -> Result<usize> {
        self.store.count().await
    }

    fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    fn name(&self) -> &str {
        "document_store"
    }
}

impl<S: DocumentStore> std::fmt::Debug for DocumentStoreBackend<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStoreBackend")
            .field("store", &self.store.name())
            .field("dimensions", &self.dimensions)
            .field("candidate_limit", &self.candidate_limit)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
