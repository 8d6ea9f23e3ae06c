//! LanceDB vector index.
//!
//! One LanceDB table per modality, queried with cosine distance. Used as a
//! [`VectorIndex`] inside [`AnnIndexBackend`](crate::ann::AnnIndexBackend).
//!
//! # Schema
//!
//! | Column | Type | Purpose |
//! |--------|------|---------|
//! | `id` | Utf8 | Record identifier |
//! | `vector` | FixedSizeList<Float32> | Embedding vector |
//!
//! # Feature Gate
//!
//! This module requires the `vector-lancedb` feature.

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, RecordBatchReader,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::DistanceType;
use lancedb::query::{ExecutableQuery, QueryBase};
use std::sync::Arc;
use vitrine_core::{Error, Result};

use crate::ann::VectorIndex;
use crate::similarity::rank_neighbors;
use crate::types::Neighbor;

/// A single-modality index stored in a LanceDB table.
pub struct LancedbIndex {
    table: lancedb::Table,
    table_name: String,
    dimension: usize,
}

impl LancedbIndex {
    /// Open (creating if needed) the table `table_name` in the database at `uri`.
    pub async fn open(uri: &str, table_name: &str, dimension: usize) -> Result<Self> {
        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| Error::backend(format!("Failed to connect to LanceDB: {e}")))?;

        let existing = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| Error::backend(format!("Failed to list LanceDB tables: {e}")))?;

        let table = if existing.iter().any(|name| name == table_name) {
            connection
                .open_table(table_name)
                .execute()
                .await
                .map_err(|e| Error::backend(format!("Failed to open table: {e}")))?
        } else {
            connection
                .create_empty_table(table_name, make_schema(dimension as i32))
                .execute()
                .await
                .map_err(|e| Error::backend(format!("Failed to create LanceDB table: {e}")))?
        };

        Ok(Self {
            table,
            table_name: table_name.to_string(),
            dimension,
        })
    }
}

/// Rows fetched past `k` so ties at the cut can be ordered by id.
const TIE_MARGIN: usize = 16;

/// True when no unfetched row can tie with the k-th of `ranked`.
///
/// `ranked` is sorted and `requested` is how many rows were asked for.
fn boundary_settled(ranked: &[Neighbor], k: usize, requested: usize) -> bool {
    if ranked.len() < requested || ranked.len() <= k {
        return true;
    }
    match (k.checked_sub(1).and_then(|i| ranked.get(i)), ranked.last()) {
        (Some(kth), Some(last)) => last.score < kth.score,
        _ => true,
    }
}

impl LancedbIndex {
    async fn search_rows(&self, query: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        let results = self
            .table
            .vector_search(query.to_vec())
            .map_err(|e| Error::backend(format!("Failed to create vector search: {e}")))?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| Error::backend(format!("Vector search failed: {e}")))?;

        let batches: Vec<RecordBatch> = results
            .try_collect()
            .await
            .map_err(|e| Error::backend(format!("Failed to collect results: {e}")))?;

        let mut items = Vec::new();
        for batch in &batches {
            items.extend(parse_search_results(batch)?);
        }
        Ok(items)
    }
}

fn id_predicate(id: &str) -> String {
    format!("id = '{}'", id.replace('\'', "''"))
}

#[async_trait]
impl VectorIndex for LancedbIndex {
    async fn upsert(&self, id: &str, vector: &[f32]) -> Result<()> {
        let batch = build_record_batch(id, vector, self.dimension as i32)?;
        let schema = batch.schema();
        let reader: Box<dyn RecordBatchReader + Send> =
            Box::new(RecordBatchIterator::new(vec![Ok(batch)], schema));

        self.table
            .delete(&id_predicate(id))
            .await
            .map_err(|e| Error::backend(format!("Failed to replace vector: {e}")))?;
        self.table
            .add(reader)
            .execute()
            .await
            .map_err(|e| Error::backend(format!("Failed to add vector: {e}")))?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        self.table
            .delete(&id_predicate(id))
            .await
            .map_err(|e| Error::backend(format!("Failed to delete vector: {e}")))?;
        Ok(())
    }

    async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let mut requested = k.saturating_add(TIE_MARGIN);
        loop {
            let ranked = rank_neighbors(self.search_rows(query, requested).await?, requested);
            if boundary_settled(&ranked, k, requested) {
                return Ok(rank_neighbors(ranked, k));
            }
            requested = requested.saturating_mul(2);
        }
    }

    async fn len(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .map_err(|e| Error::backend(format!("Failed to count rows: {e}")))
    }

    fn name(&self) -> &str {
        "lancedb"
    }
}

impl std::fmt::Debug for LancedbIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LancedbIndex")
            .field("table", &self.table_name)
            .field("dimension", &self.dimension)
            .finish()
    }
}

// ============================================================================
// Arrow schema and batch construction
// ============================================================================

/// Create the Arrow schema for an index table.
fn make_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ),
    ]))
}

/// Build a one-row RecordBatch.
fn build_record_batch(id: &str, vector: &[f32], dimension: i32) -> Result<RecordBatch> {
    let values_array = Float32Array::from(vector.to_vec());
    let vector_array = FixedSizeListArray::try_new(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension,
        Arc::new(values_array),
        None,
    )
    .map_err(|e| Error::backend(format!("Failed to create vector array: {e}")))?;

    RecordBatch::try_new(
        make_schema(dimension),
        vec![
            Arc::new(StringArray::from(vec![id])),
            Arc::new(vector_array),
        ],
    )
    .map_err(|e| Error::backend(format!("Failed to create RecordBatch: {e}")))
}

/// Parse neighbors from a result batch; cosine distance becomes similarity.
fn parse_search_results(batch: &RecordBatch) -> Result<Vec<Neighbor>> {
    let id_col = batch
        .column_by_name("id")
        .ok_or_else(|| Error::backend("Missing 'id' column in results"))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| Error::backend("'id' column is not StringArray"))?;

    let distance_col = batch
        .column_by_name("_distance")
        .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

    let mut results = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let distance = distance_col.map(|c| c.value(i)).unwrap_or(1.0);
        results.push(Neighbor::new(id_col.value(i), 1.0 - distance));
    }
    Ok(results)
}

// ============================================================================
// Tests
// ============================================================================
