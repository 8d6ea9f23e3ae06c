//! Snapshot persistence for the in-memory ANN backend.
//!
//! A snapshot is a single JSON document holding every record plus a small
//! metadata header, so an in-memory index can survive restarts. Writes go
//! to a sibling temp file first and are renamed into place.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vitrine_core::{Dimensions, Error, Result, VectorRecord};

use crate::ann::AnnIndexBackend;
use crate::backend::StorageBackend;

/// Snapshot format understood by this build.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Header stored alongside snapshot records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// Snapshot format version.
    pub format_version: u32,

    /// Number of records in the snapshot.
    pub record_count: usize,

    /// Dimensions the records were validated against.
    pub dimensions: Dimensions,

    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
}

impl SnapshotMetadata {
    /// Metadata for a snapshot written now.
    pub fn new(dimensions: Dimensions, record_count: usize) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            record_count,
            dimensions,
            saved_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    metadata: SnapshotMetadata,
    records: Vec<VectorRecord>,
}

/// Write every record of `backend` to `path`.
pub async fn save_snapshot(path: &Path, backend: &AnnIndexBackend) -> Result<SnapshotMetadata> {
    let records = backend.records().await;
    let metadata = SnapshotMetadata::new(backend.dimensions(), records.len());
    let snapshot = Snapshot {
        metadata: metadata.clone(),
        records,
    };
    let json = serde_json::to_vec(&snapshot)?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| Error::io_with_path(e, &tmp))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io_with_path(e, path))?;

    info!(
        "Saved snapshot of {} records to {}",
        metadata.record_count,
        path.display()
    );
    Ok(metadata)
}

/// Read a snapshot written by [`save_snapshot`].
pub async fn load_snapshot(path: &Path) -> Result<(SnapshotMetadata, Vec<VectorRecord>)> {
    let json = tokio::fs::read(path)
        .await
        .map_err(|e| Error::io_with_path(e, path))?;
    let snapshot: Snapshot = serde_json::from_slice(&json)?;

    if snapshot.metadata.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(Error::validation(format!(
            "unsupported snapshot format version {}",
            snapshot.metadata.format_version
        )));
    }
    if snapshot.metadata.record_count != snapshot.records.len() {
        return Err(Error::validation(format!(
            "snapshot header claims {} records but holds {}",
            snapshot.metadata.record_count,
            snapshot.records.len()
        )));
    }

    Ok((snapshot.metadata, snapshot.records))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn populated() -> AnnIndexBackend {
        let backend = AnnIndexBackend::in_memory(Dimensions::new(2, 2));
        backend
            .upsert(
                VectorRecord::new("b")
                    .with_text_embedding(vec![1.0, 0.0])
                    .with_field("name", "Chair"),
            )
            .await
            .unwrap();
        backend
            .upsert(VectorRecord::new("a").with_image_embedding(vec![0.0, 1.0]))
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn test_save_and_load_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ann-snapshot.json");

        let saved = save_snapshot(&path, &populated().await).await.unwrap();
        assert_eq!(saved.record_count, 2);
        assert!(!dir.path().join("ann-snapshot.json.tmp").exists());

        let (metadata, records) = load_snapshot(&path).await.unwrap();
        assert_eq!(metadata.dimensions, Dimensions::new(2, 2));
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "a");
        assert_eq!(records[1].metadata["name"].as_str(), Some("Chair"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = load_snapshot(&dir.path().join("nope.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[tokio::test]
    async fn test_load_rejects_corrupt_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        let snapshot = Snapshot {
            metadata: SnapshotMetadata::new(Dimensions::new(2, 2), 5),
            records: vec![],
        };
        std::fs::write(&path, serde_json::to_vec(&snapshot).unwrap()).unwrap();

        assert!(matches!(
            load_snapshot(&path).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, b"not json").unwrap();

        assert!(matches!(
            load_snapshot(&path).await,
            Err(Error::Serialization(_))
        ));
    }
}
