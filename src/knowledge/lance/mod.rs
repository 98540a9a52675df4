#[cfg(test)]
mod tests;

use super::{IndexedDocument, KnowledgeDocument, ScoredDocument, VectorIndex};
use crate::{RagError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const TABLE_NAME: &str = "knowledge";

/// Persistent vector index stored as a LanceDB directory
pub struct LanceIndex {
    path: PathBuf,
    connection: Connection,
    state: Mutex<LanceState>,
}

struct LanceState {
    table: Option<Table>,
    dimension: Option<usize>,
    next_seq: u64,
}

fn unavailable(path: &Path, what: &str, e: impl std::fmt::Display) -> RagError {
    RagError::StoreUnavailable(format!("{} at {}: {}", what, path.display(), e))
}

fn store_error(what: &str, e: impl std::fmt::Display) -> RagError {
    RagError::Store(format!("{}: {}", what, e))
}

impl LanceIndex {
    /// Open the index directory, creating an empty one when the path is missing.
    ///
    /// An existing path that is not a readable index is reported as
    /// [`RagError::StoreUnavailable`] rather than being discarded.
    #[inline]
    pub async fn open(path: &Path) -> Result<Self> {
        if path.exists() && !path.is_dir() {
            return Err(unavailable(path, "Snapshot path", "not a directory"));
        }

        let existed = path.exists();
        if !existed {
            std::fs::create_dir_all(path)
                .map_err(|e| unavailable(path, "Failed to create index directory", e))?;
        }

        let uri = path.to_string_lossy().to_string();
        debug!("Opening LanceDB knowledge index at {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| unavailable(path, "Failed to connect to LanceDB", e))?;

        let table_names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| unavailable(path, "Failed to list tables", e))?;

        let state = if table_names.iter().any(|name| name == TABLE_NAME) {
            let table = connection
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| unavailable(path, "Failed to open knowledge table", e))?;

            let schema = table
                .schema()
                .await
                .map_err(|e| unavailable(path, "Failed to read table schema", e))?;

            let dimension = vector_dimension(&schema)
                .ok_or_else(|| unavailable(path, "Invalid table schema", "no vector column"))?;

            let rows = table
                .count_rows(None)
                .await
                .map_err(|e| unavailable(path, "Failed to read knowledge table", e))?;

            info!(
                "Loaded knowledge index with {} documents ({} dimensions)",
                rows, dimension
            );

            LanceState {
                table: Some(table),
                dimension: Some(dimension),
                next_seq: rows as u64,
            }
        } else {
            if existed {
                warn!(
                    "No knowledge table found at {}, starting a fresh index",
                    path.display()
                );
            }
            LanceState {
                table: None,
                dimension: None,
                next_seq: 0,
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            connection,
            state: Mutex::new(state),
        })
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("seq", DataType::UInt64, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    fn create_record_batch(
        documents: &[IndexedDocument],
        vector_dim: usize,
        first_seq: u64,
    ) -> Result<RecordBatch> {
        let len = documents.len();
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        for document in documents {
            flat_values.extend_from_slice(&document.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| store_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from_iter_values(
                documents.iter().map(|d| d.id.as_str()),
            )),
            Arc::new(vector_array),
            Arc::new(StringArray::from_iter_values(
                documents.iter().map(|d| d.document.content.as_str()),
            )),
            Arc::new(StringArray::from_iter_values(
                documents.iter().map(|d| d.document.source.as_str()),
            )),
            Arc::new(UInt64Array::from_iter_values(
                (0..len as u64).map(|offset| first_seq + offset),
            )),
            Arc::new(StringArray::from_iter_values(
                documents.iter().map(|d| d.created_at.as_str()),
            )),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| store_error("Failed to create record batch", e))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<(u64, f32, KnowledgeDocument)>> {
        let contents = string_column(batch, "content")?;
        let sources = string_column(batch, "source")?;
        let seqs = batch
            .column_by_name("seq")
            .and_then(|col| col.as_any().downcast_ref::<UInt64Array>())
            .ok_or_else(|| RagError::Store("Missing or invalid seq column".to_string()))?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let rows = (0..batch.num_rows())
            .map(|row| {
                let distance = distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
                (
                    seqs.value(row),
                    distance,
                    KnowledgeDocument::new(contents.value(row), sources.value(row)),
                )
            })
            .collect();

        Ok(rows)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| RagError::Store(format!("Missing or invalid {} column", name)))
}

fn vector_dimension(schema: &Schema) -> Option<usize> {
    schema.fields().iter().find_map(|field| {
        if field.name() != "vector" {
            return None;
        }
        match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        }
    })
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn append(&self, documents: Vec<IndexedDocument>) -> Result<()> {
        let Some(first) = documents.first() else {
            return Ok(());
        };
        let vector_dim = first.vector.len();

        if vector_dim == 0 || documents.iter().any(|d| d.vector.len() != vector_dim) {
            return Err(RagError::Store(
                "Documents in a batch must share a non-zero vector dimension".to_string(),
            ));
        }

        let mut state = self.state.lock().await;

        if let Some(existing) = state.dimension {
            if existing != vector_dim {
                return Err(RagError::Store(format!(
                    "Vector dimension mismatch: index has {}, batch has {}",
                    existing, vector_dim
                )));
            }
        }

        let table = match &state.table {
            Some(table) => table.clone(),
            None => {
                info!(
                    "Creating knowledge table with {} dimensions at {}",
                    vector_dim,
                    self.path.display()
                );
                let table = self
                    .connection
                    .create_empty_table(TABLE_NAME, Self::create_schema(vector_dim))
                    .execute()
                    .await
                    .map_err(|e| store_error("Failed to create knowledge table", e))?;
                state.table = Some(table.clone());
                state.dimension = Some(vector_dim);
                table
            }
        };

        let count = documents.len();
        let batch = Self::create_record_batch(&documents, vector_dim, state.next_seq)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);

        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| store_error("Failed to insert documents", e))?;

        state.next_seq += count as u64;
        debug!("Persisted {} documents to LanceDB", count);
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredDocument>> {
        let (table, dimension) = {
            let state = self.state.lock().await;
            match (&state.table, state.dimension) {
                (Some(table), Some(dimension)) => (table.clone(), dimension),
                _ => return Ok(Vec::new()),
            }
        };

        if k == 0 {
            return Ok(Vec::new());
        }

        if query.len() != dimension {
            return Err(RagError::Store(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                dimension
            )));
        }

        let mut stream = table
            .vector_search(query)
            .map_err(|e| store_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| store_error("Failed to execute search", e))?;

        let mut rows = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| store_error("Failed to read result stream", e))?
        {
            rows.extend(Self::parse_search_batch(&batch)?);
        }

        rows.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        Ok(rows
            .into_iter()
            .take(k)
            .map(|(_, distance, document)| ScoredDocument {
                document,
                score: 1.0 - distance,
            })
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        let table = self.state.lock().await.table.clone();
        match table {
            Some(table) => table
                .count_rows(None)
                .await
                .map_err(|e| store_error("Failed to count rows", e)),
            None => Ok(0),
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.table.take().is_some() {
            info!("Dropping knowledge table for rebuild");
            self.connection
                .drop_table(TABLE_NAME)
                .await
                .map_err(|e| store_error("Failed to drop knowledge table", e))?;
        }

        state.dimension = None;
        state.next_seq = 0;
        Ok(())
    }
}
