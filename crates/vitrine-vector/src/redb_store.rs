//! Redb-backed document store.
//!
//! Each record is stored as a JSON document under its id in a single redb
//! table. Every operation runs its transaction on the blocking thread pool.
//! Redb has no vector query, so searches through this store always take
//! the flagged brute-force path.

use async_trait::async_trait;
use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use std::sync::Arc;
use vitrine_core::{Error, Result, VectorRecord};

use crate::document::DocumentStore;

const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

fn backend_err(e: impl std::fmt::Display) -> Error {
    Error::backend(e.to_string())
}

/// Document store persisted in a redb file.
#[derive(Clone)]
pub struct RedbDocumentStore {
    db: Arc<Database>,
}

impl RedbDocumentStore {
    /// Open or create the store at `path`.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io_with_path(e, parent))?;
        }
        let path = path.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let db = Database::create(&path).map_err(backend_err)?;

            // Accessing the table creates it if it doesn't exist
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                let _table = write_txn.open_table(RECORDS).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;

            Ok(Self { db: Arc::new(db) })
        })
        .await
        .map_err(backend_err)?
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(backend_err)?
    }
}

fn decode(bytes: &[u8]) -> Result<VectorRecord> {
    serde_json::from_slice(bytes).map_err(|e| Error::backend(format!("corrupt record: {e}")))
}

#[async_trait]
impl DocumentStore for RedbDocumentStore {
    async fn put(&self, mut record: VectorRecord) -> Result<()> {
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write_txn.open_table(RECORDS).map_err(backend_err)?;
                let created = match table.get(record.id.as_str()).map_err(backend_err)? {
                    Some(existing) => decode(existing.value())?.created_at,
                    None => None,
                };
                record.stamp(created, Utc::now());
                let bytes = serde_json::to_vec(&record)?;
                table
                    .insert(record.id.as_str(), bytes.as_slice())
                    .map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn fetch(&self, id: &str) -> Result<Option<VectorRecord>> {
        let id = id.to_string();
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let table = read_txn.open_table(RECORDS).map_err(backend_err)?;
            match table.get(id.as_str()).map_err(backend_err)? {
                Some(value) => Ok(Some(decode(value.value())?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.blocking(move |db| {
            let write_txn = db.begin_write().map_err(backend_err)?;
            {
                let mut table = write_txn.open_table(RECORDS).map_err(backend_err)?;
                table.remove(id.as_str()).map_err(backend_err)?;
            }
            write_txn.commit().map_err(backend_err)?;
            Ok(())
        })
        .await
    }

    async fn scan(&self, limit: usize) -> Result<Vec<VectorRecord>> {
        self.blocking(move |db| {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let table = read_txn.open_table(RECORDS).map_err(backend_err)?;

            let mut records = Vec::new();
            for item in table.iter().map_err(backend_err)?.take(limit) {
                let (_, value) = item.map_err(backend_err)?;
                records.push(decode(value.value())?);
            }
            Ok(records)
        })
        .await
    }

    async fn count(&self) -> Result<usize> {
        self.blocking(|db| {
            let read_txn = db.begin_read().map_err(backend_err)?;
            let table = read_txn.open_table(RECORDS).map_err(backend_err)?;
            let len = table.len().map_err(backend_err)?;
            Ok(len as usize)
        })
        .await
    }

    fn name(&self) -> &str {
        "redb"
    }
}

impl std::fmt::Debug for RedbDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbDocumentStore").finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::StorageBackend;
    use crate::document::DocumentStoreBackend;
    use tempfile::TempDir;
    use vitrine_core::{Dimensions, Modality};

    async fn open_temp() -> (TempDir, RedbDocumentStore) {
        let dir = TempDir::new().unwrap();
        let store = RedbDocumentStore::open(&dir.path().join("products.redb"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn test_put_fetch_roundtrip() {
        let (_dir, store) = open_temp().await;
        let record = VectorRecord::new("p1")
            .with_text_embedding(vec![0.25, 0.5])
            .with_field("price", 19.99);
        store.put(record.clone()).await.unwrap();

        let fetched = store.fetch("p1").await.unwrap().unwrap();
        assert_eq!(fetched.text_embedding, record.text_embedding);
        assert_eq!(fetched.metadata, record.metadata);
        assert!(fetched.created_at.is_some());
        assert!(store.fetch("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_preserves_created_at() {
        let (_dir, store) = open_temp().await;
        store
            .put(VectorRecord::new("p1").with_text_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        let first = store.fetch("p1").await.unwrap().unwrap();
        store
            .put(VectorRecord::new("p1").with_text_embedding(vec![0.0, 1.0]))
            .await
            .unwrap();
        let second = store.fetch("p1").await.unwrap().unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(second.text_embedding, Some(vec![0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_scan_ordered_and_limited() {
        let (_dir, store) = open_temp().await;
        for id in ["c", "a", "b"] {
            store
                .put(VectorRecord::new(id).with_text_embedding(vec![1.0, 0.0]))
                .await
                .unwrap();
        }
        let scanned = store.scan(2).await.unwrap();
        let ids: Vec<_> = scanned.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_remove_idempotent() {
        let (_dir, store) = open_temp().await;
        store
            .put(VectorRecord::new("p1").with_text_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        store.remove("p1").await.unwrap();
        store.remove("p1").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_backend_search_is_brute_force() {
        let (_dir, store) = open_temp().await;
        let backend = DocumentStoreBackend::new(store, Dimensions::new(2, 2), 100);
        backend
            .upsert(VectorRecord::new("p1").with_image_embedding(vec![0.0, 1.0]))
            .await
            .unwrap();
        let result = backend
            .search_nearest(&[0.0, 1.0], Modality::Image, 1)
            .await
            .unwrap();
        assert_eq!(result.items[0].id, "p1");
        assert!(result.degraded.is_some());
    }

    #[tokio::test]
    async fn test_backend_rejects_nan_metadata_and_stays_readable() {
        let (_dir, store) = open_temp().await;
        let backend = DocumentStoreBackend::new(store, Dimensions::new(2, 2), 100);
        backend
            .upsert(VectorRecord::new("good").with_text_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();

        let err = backend
            .upsert(
                VectorRecord::new("bad")
                    .with_text_embedding(vec![1.0, 0.0])
                    .with_field("price", f64::NAN),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        assert!(backend.get("bad").await.unwrap().is_none());
        let result = backend
            .search_nearest(&[1.0, 0.0], Modality::Text, 5)
            .await
            .unwrap();
        assert_eq!(result.items.len(), 1);
        assert_eq!(result.items[0].id, "good");
    }

    #[tokio::test]
    async fn test_concurrent_puts() {
        let (_dir, store) = open_temp().await;
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .put(VectorRecord::new(format!("p{i:02}")).with_text_embedding(vec![1.0, 0.0]))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 16);
    }
}
