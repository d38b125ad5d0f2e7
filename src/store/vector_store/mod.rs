
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info};

use super::{ChunkRecord, SimilarityMetric};
use crate::{PitwallError, config::StoreConfig};

/// Vector collection backed by LanceDB.
///
/// The collection is created once with a fixed vector dimension and
/// similarity metric; every insert and search is validated against that
/// dimension so stale records from a different embedding model can never
/// produce meaningless search results.
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    dimension: usize,
    metric: SimilarityMetric,
}

/// A search hit: the stored text plus its distance under the collection's
/// metric (smaller is more similar).
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub text: String,
    pub source_url: String,
    pub distance: f32,
}

impl VectorStore {
    /// Open (or create) the collection under the configured data directory.
    ///
    /// Creation is idempotent: if the table already exists its vector
    /// dimension is read from the schema and must match `dimension`; a
    /// mismatch is an error rather than a silent recreate.
    #[inline]
    pub async fn open(config: &StoreConfig, dimension: usize) -> crate::Result<Self> {
        let db_path = config.data_dir.join("vectors");
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                PitwallError::Store(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            table_name: config.collection.clone(),
            dimension,
            metric: config.metric,
        };

        store.ensure_collection().await?;

        info!(
            "Vector store ready: collection '{}', {} dimensions, {} metric",
            store.table_name, store.dimension, store.metric
        );
        Ok(store)
    }

    /// The similarity metric this collection was opened with.
    #[inline]
    pub fn metric(&self) -> SimilarityMetric {
        self.metric
    }

    /// Create the collection table if missing; verify its dimension if not.
    async fn ensure_collection(&self) -> crate::Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&self.table_name) {
            let existing = self.detect_existing_dimension().await?;
            if existing != self.dimension {
                return Err(PitwallError::Store(format!(
                    "Collection '{}' was created with {} dimensions but the configured \
                     embedding model produces {}; refusing to reuse it",
                    self.table_name, existing, self.dimension
                )));
            }
            debug!(
                "Collection '{}' already exists with matching dimension {}",
                self.table_name, existing
            );
            return Ok(());
        }

        let schema = self.schema();
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to create collection: {}", e)))?;

        info!(
            "Created collection '{}' with {} dimensions",
            self.table_name, self.dimension
        );
        Ok(())
    }

    /// Read the vector dimension from an existing table's schema.
    async fn detect_existing_dimension(&self) -> crate::Result<usize> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to open existing table: {}", e)))?;

        let schema = table
            .schema()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(*size as usize);
                }
            }
        }

        Err(PitwallError::Store(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.dimension as i32,
                ),
                false,
            ),
            Field::new("text", DataType::Utf8, false),
            Field::new("source_url", DataType::Utf8, false),
            Field::new("chunk_index", DataType::UInt32, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Insert a single record. Each insert succeeds or fails independently;
    /// duplicate texts are not guarded against.
    #[inline]
    pub async fn insert(&self, record: ChunkRecord) -> crate::Result<()> {
        self.insert_batch(vec![record]).await
    }

    /// Insert multiple records in one write.
    #[inline]
    pub async fn insert_batch(&self, records: Vec<ChunkRecord>) -> crate::Result<()> {
        if records.is_empty() {
            debug!("No records to insert");
            return Ok(());
        }

        for record in &records {
            if record.vector.len() != self.dimension {
                return Err(PitwallError::Store(format!(
                    "Record '{}' has a {}-dimension vector, collection expects {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }

        let record_batch = self.create_record_batch(&records)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to open table: {}", e)))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to insert records: {}", e)))?;

        debug!("Inserted {} records", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[ChunkRecord]) -> crate::Result<RecordBatch> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut source_urls = Vec::with_capacity(len);
        let mut chunk_indices = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * self.dimension);

        for record in records {
            ids.push(record.id.as_str());
            texts.push(record.text.as_str());
            source_urls.push(record.source_url.as_str());
            chunk_indices.push(record.chunk_index);
            created_ats.push(record.created_at.as_str());
            flat_values.extend_from_slice(&record.vector);
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| PitwallError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(source_urls)),
            Arc::new(UInt32Array::from(chunk_indices)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| PitwallError::Store(format!("Failed to create record batch: {}", e)))
    }

    /// Nearest-neighbor search under the collection's metric.
    ///
    /// Returns at most `limit` records ordered by ascending distance
    /// (descending similarity).
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> crate::Result<Vec<ScoredRecord>> {
        if query_vector.len() != self.dimension {
            return Err(PitwallError::Store(format!(
                "Query vector has {} dimensions, collection expects {}",
                query_vector.len(),
                self.dimension
            )));
        }

        debug!("Searching for nearest records with limit: {}", limit);

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to open table: {}", e)))?;

        let results = table
            .vector_search(query_vector)
            .map_err(|e| PitwallError::Store(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(self.metric.distance_type())
            .limit(limit)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to execute search: {}", e)))?;

        self.parse_search_results_stream(results).await
    }

    async fn parse_search_results_stream(
        &self,
        mut results: lancedb::arrow::SendableRecordBatchStream,
    ) -> crate::Result<Vec<ScoredRecord>> {
        let mut search_results = Vec::new();

        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to read result stream: {}", e)))?
        {
            search_results.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Parsed {} search results", search_results.len());
        Ok(search_results)
    }

    fn parse_search_batch(batch: &RecordBatch) -> crate::Result<Vec<ScoredRecord>> {
        let texts = string_column(batch, "text")?;
        let source_urls = string_column(batch, "source_url")?;

        let distances = batch
            .column_by_name("_distance")
            .map(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut search_results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let distance = distances
                .flatten()
                .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });

            search_results.push(ScoredRecord {
                text: texts.value(row).to_string(),
                source_url: source_urls.value(row).to_string(),
                distance,
            });
        }

        Ok(search_results)
    }

    /// Total number of records in the collection.
    #[inline]
    pub async fn count(&self) -> crate::Result<u64> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to open table: {}", e)))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| PitwallError::Store(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> crate::Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| PitwallError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| PitwallError::Store(format!("Invalid {} column type", name)))
}
