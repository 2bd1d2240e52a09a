// LanceDB-backed vector index
// Each collection is one LanceDB table under the configured vectors directory


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{CollectionRecord, IndexHit, RecordMetadata, VectorIndex};
use crate::config::Config;
use crate::{KbError, Result};

const ID_COLUMN: &str = "id";
const VECTOR_COLUMN: &str = "vector";
const RAW_TEXT_COLUMN: &str = "raw_text";
const TITLE_COLUMN: &str = "title";
const DISTANCE_COLUMN: &str = "_distance";
/// Delete filter selecting every row
const MATCH_ALL: &str = "true";

/// Vector index stored in an embedded LanceDB database
pub struct LanceIndex {
    connection: Connection,
}

impl LanceIndex {
    /// Open (or create) the database under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(&config.vector_database_path()).await
    }

    /// Open (or create) the database at `db_path`
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self> {
        debug!("Initializing LanceDB at path: {}", db_path.display());

        std::fs::create_dir_all(db_path).map_err(|e| {
            KbError::VectorIndex(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self { connection })
    }

    async fn open_table(&self, name: &str) -> Result<Table> {
        self.connection
            .open_table(name)
            .execute()
            .await
            .map_err(|e| match e {
                lancedb::Error::TableNotFound { .. } => {
                    KbError::CollectionNotFound(name.to_string())
                }
                other => KbError::VectorIndex(format!("Failed to open table {}: {}", name, other)),
            })
    }

    async fn table_names(&self) -> Result<Vec<String>> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to list tables: {}", e)))
    }
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(KbError::VectorIndex(
                "Vector dimension must be positive".to_string(),
            ));
        }

        self.connection
            .create_empty_table(name, create_schema(dimension)?)
            .execute()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to create table {}: {}", name, e)))?;

        info!("Created collection {} with {} dimensions", name, dimension);
        Ok(())
    }

    async fn drop_collection(&self, name: &str) -> Result<()> {
        if !self.has_collection(name).await? {
            return Err(KbError::CollectionNotFound(name.to_string()));
        }

        self.connection
            .drop_table(name)
            .await
            .map_err(|e| match e {
                lancedb::Error::TableNotFound { .. } => {
                    KbError::CollectionNotFound(name.to_string())
                }
                other => KbError::VectorIndex(format!("Failed to drop table {}: {}", name, other)),
            })?;

        info!("Dropped collection {}", name);
        Ok(())
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        Ok(self.table_names().await?.iter().any(|t| t == name))
    }

    async fn dimension(&self, name: &str) -> Result<usize> {
        let table = self.open_table(name).await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to get table schema: {}", e)))?;

        let field = schema.field_with_name(VECTOR_COLUMN).map_err(|_| {
            KbError::VectorIndex(format!("Table {} has no vector column", name))
        })?;

        match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size)
                .map_err(|_| KbError::VectorIndex(format!("Invalid vector size {}", size))),
            other => Err(KbError::VectorIndex(format!(
                "Unexpected vector column type {:?}",
                other
            ))),
        }
    }

    async fn add(&self, name: &str, records: &[CollectionRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No records to add to {}", name);
            return Ok(());
        }

        let table = self.open_table(name).await?;
        let dimension = self.dimension(name).await?;
        let batch = create_record_batch(records, dimension)?;

        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to insert records: {}", e)))?;

        debug!("Stored {} records in {}", records.len(), name);
        Ok(())
    }

    async fn fetch_all(&self, name: &str) -> Result<Vec<CollectionRecord>> {
        let table = self.open_table(name).await?;
        let total = count_rows(&table).await?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let stream = table
            .query()
            .limit(total)
            .execute()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to scan table {}: {}", name, e)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to read scan results: {}", e)))?;

        let mut records = Vec::with_capacity(total);
        for batch in &batches {
            records.extend(parse_record_batch(batch)?);
        }
        Ok(records)
    }

    async fn clear(&self, name: &str) -> Result<()> {
        let table = self.open_table(name).await?;
        table
            .delete(MATCH_ALL)
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to clear table {}: {}", name, e)))?;

        debug!("Cleared {}", name);
        Ok(())
    }

    async fn count(&self, name: &str) -> Result<usize> {
        let table = self.open_table(name).await?;
        count_rows(&table).await
    }

    async fn query(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<IndexHit>> {
        debug!("Searching {} for {} nearest vectors", name, limit);

        let table = self.open_table(name).await?;
        if count_rows(&table).await? == 0 {
            return Ok(Vec::new());
        }

        let stream = table
            .vector_search(vector)
            .map_err(|e| KbError::VectorIndex(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::L2)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to execute search: {}", e)))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| KbError::VectorIndex(format!("Failed to read result stream: {}", e)))?;

        let mut hits = Vec::new();
        for batch in &batches {
            hits.extend(parse_hit_batch(batch)?);
        }

        // Results arrive per batch; keep the overall order ascending
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(limit);

        debug!("Found {} hits in {}", hits.len(), name);
        Ok(hits)
    }
}

async fn count_rows(table: &Table) -> Result<usize> {
    table
        .count_rows(None)
        .await
        .map_err(|e| KbError::VectorIndex(format!("Failed to count rows: {}", e)))
}

fn create_schema(dimension: usize) -> Result<Arc<Schema>> {
    let size = i32::try_from(dimension)
        .map_err(|_| KbError::VectorIndex(format!("Vector dimension {} is too large", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), size),
            false,
        ),
        Field::new(RAW_TEXT_COLUMN, DataType::Utf8, false),
        Field::new(TITLE_COLUMN, DataType::Utf8, false),
    ])))
}

fn create_record_batch(records: &[CollectionRecord], dimension: usize) -> Result<RecordBatch> {
    let mut flat_values = Vec::with_capacity(records.len() * dimension);
    for record in records {
        if record.embedding.len() != dimension {
            return Err(KbError::VectorIndex(format!(
                "Record {} has {} dimensions, collection expects {}",
                record.id,
                record.embedding.len(),
                dimension
            )));
        }
        flat_values.extend_from_slice(&record.embedding);
    }

    let schema = create_schema(dimension)?;
    let size = i32::try_from(dimension)
        .map_err(|_| KbError::VectorIndex(format!("Vector dimension {} is too large", dimension)))?;
    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array =
        FixedSizeListArray::try_new(field, size, Arc::new(Float32Array::from(flat_values)), None)
            .map_err(|e| KbError::VectorIndex(format!("Failed to create vector array: {}", e)))?;

    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    let raw_texts: Vec<&str> = records.iter().map(|r| r.raw_text.as_str()).collect();
    let titles: Vec<&str> = records.iter().map(|r| r.metadata.title.as_str()).collect();

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(raw_texts)),
        Arc::new(StringArray::from(titles)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| KbError::VectorIndex(format!("Failed to create record batch: {}", e)))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| KbError::VectorIndex(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| KbError::VectorIndex(format!("Invalid {} column type", name)))
}

fn parse_record_batch(batch: &RecordBatch) -> Result<Vec<CollectionRecord>> {
    let ids = string_column(batch, ID_COLUMN)?;
    let raw_texts = string_column(batch, RAW_TEXT_COLUMN)?;
    let titles = string_column(batch, TITLE_COLUMN)?;
    let vectors = batch
        .column_by_name(VECTOR_COLUMN)
        .ok_or_else(|| KbError::VectorIndex("Missing vector column".to_string()))?
        .as_any()
        .downcast_ref::<FixedSizeListArray>()
        .ok_or_else(|| KbError::VectorIndex("Invalid vector column type".to_string()))?;

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let values = vectors.value(row);
        let embedding = values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| KbError::VectorIndex("Invalid vector item type".to_string()))?
            .values()
            .to_vec();

        records.push(CollectionRecord {
            id: ids.value(row).to_string(),
            embedding,
            raw_text: raw_texts.value(row).to_string(),
            metadata: RecordMetadata {
                title: titles.value(row).to_string(),
            },
        });
    }
    Ok(records)
}

fn parse_hit_batch(batch: &RecordBatch) -> Result<Vec<IndexHit>> {
    let ids = string_column(batch, ID_COLUMN)?;
    let raw_texts = string_column(batch, RAW_TEXT_COLUMN)?;
    let titles = string_column(batch, TITLE_COLUMN)?;
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .ok_or_else(|| KbError::VectorIndex("Missing distance column".to_string()))?
        .as_any()
        .downcast_ref::<Float32Array>()
        .ok_or_else(|| KbError::VectorIndex("Invalid distance column type".to_string()))?;

    (0..batch.num_rows())
        .map(|row| {
            if distances.is_null(row) {
                return Err(KbError::VectorIndex(format!(
                    "Search hit {} has no distance",
                    ids.value(row)
                )));
            }
            Ok(IndexHit {
                id: ids.value(row).to_string(),
                raw_text: raw_texts.value(row).to_string(),
                metadata: RecordMetadata {
                    title: titles.value(row).to_string(),
                },
                distance: distances.value(row),
            })
        })
        .collect()
}
