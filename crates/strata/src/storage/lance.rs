//! Cold tier: a LanceDB archive table
//!
//! The cold tier is the relational/columnar store: records are rows of the
//! `records` table, queried with SQL predicates built from [`RecordFilter`].
//! Its aggregate size is bounded by `max_total_bytes`.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, Int32Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray,
    TimestampMicrosecondArray,
};
use arrow_schema::{DataType, Field, Schema, TimeUnit};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::Table;
use lancedb::query::{ExecutableQuery, QueryBase};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, StrataError};
use crate::memory::types::{Category, MemoryRecord};
use crate::storage::{RecordFilter, TierBackend};

const RECORDS_TABLE: &str = "records";

pub struct ColdStore {
    table: Table,
    total_bytes: u64,
    row_count: usize,
    max_total_bytes: u64,
}

impl ColdStore {
    /// Connect to the LanceDB database at `path`, creating the records table if needed
    pub async fn open(path: &Path, max_total_bytes: u64) -> Result<Self> {
        let uri = path
            .to_str()
            .ok_or_else(|| StrataError::Storage("Invalid path encoding".to_string()))?;

        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to connect to LanceDB: {e}")))?;

        let names = connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to list tables: {e}")))?;

        let table = if names.iter().any(|n| n == RECORDS_TABLE) {
            debug!("Opening existing cold records table");
            connection
                .open_table(RECORDS_TABLE)
                .execute()
                .await
                .map_err(|e| StrataError::Storage(format!("Failed to open records table: {e}")))?
        } else {
            debug!("Creating cold records table");
            let schema = Self::records_schema();
            let batch = Self::records_to_batch(&[], schema.clone())?;
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            connection
                .create_table(RECORDS_TABLE, Box::new(batches))
                .execute()
                .await
                .map_err(|e| {
                    StrataError::Storage(format!("Failed to create records table: {e}"))
                })?
        };

        let mut store = Self {
            table,
            total_bytes: 0,
            row_count: 0,
            max_total_bytes,
        };

        let existing = store.fetch(None).await?;
        store.row_count = existing.len();
        store.total_bytes = existing.iter().map(MemoryRecord::content_bytes).sum();

        Ok(store)
    }

    pub fn max_total_bytes(&self) -> u64 {
        self.max_total_bytes
    }

    fn records_schema() -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("tags", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "created_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                false,
            ),
            Field::new(
                "last_accessed_at",
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
                true,
            ),
            Field::new("access_count", DataType::Int32, false),
            Field::new("project_id", DataType::Utf8, true),
            Field::new("content_bytes", DataType::Int64, false),
        ]))
    }

    /// Convert records to an Arrow RecordBatch
    fn records_to_batch(records: &[MemoryRecord], schema: Arc<Schema>) -> Result<RecordBatch> {
        let ids: Vec<String> = records.iter().map(|r| r.id.to_string()).collect();
        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();

        let contents: Vec<&str> = records.iter().map(|r| r.content.as_str()).collect();
        let categories: Vec<&str> = records.iter().map(|r| r.category.as_str()).collect();

        let tags = records
            .iter()
            .map(|r| serde_json::to_string(&r.tags))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let tag_refs: Vec<&str> = tags.iter().map(String::as_str).collect();

        let metadata = records
            .iter()
            .map(|r| serde_json::to_string(&r.metadata))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let metadata_refs: Vec<&str> = metadata.iter().map(String::as_str).collect();

        let created_at: Vec<i64> = records
            .iter()
            .map(|r| r.created_at.timestamp_micros())
            .collect();
        let last_accessed_at: Vec<Option<i64>> = records
            .iter()
            .map(|r| r.last_accessed_at.map(|t| t.timestamp_micros()))
            .collect();

        let access_counts: Vec<i32> = records
            .iter()
            .map(|r| i32::try_from(r.access_count).unwrap_or(i32::MAX))
            .collect();
        let project_ids: Vec<Option<&str>> =
            records.iter().map(|r| r.project_id.as_deref()).collect();
        let sizes: Vec<i64> = records
            .iter()
            .map(|r| i64::try_from(r.content_bytes()).unwrap_or(i64::MAX))
            .collect();

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(id_refs)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(categories)),
                Arc::new(StringArray::from(tag_refs)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(TimestampMicrosecondArray::from(created_at).with_timezone("UTC")),
                Arc::new(TimestampMicrosecondArray::from(last_accessed_at).with_timezone("UTC")),
                Arc::new(Int32Array::from(access_counts)),
                Arc::new(StringArray::from(project_ids)),
                Arc::new(Int64Array::from(sizes)),
            ],
        )
        .map_err(|e| StrataError::Storage(format!("Failed to create RecordBatch: {e}")))
    }

    fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<T>())
            .ok_or_else(|| StrataError::Storage(format!("Failed to get {name} column")))
    }

    fn timestamp(micros: i64, name: &str) -> Result<DateTime<Utc>> {
        Utc.timestamp_micros(micros)
            .single()
            .ok_or_else(|| StrataError::Storage(format!("Failed to parse {name} timestamp")))
    }

    /// Convert an Arrow RecordBatch row back to a record
    fn batch_to_record(batch: &RecordBatch, row: usize) -> Result<MemoryRecord> {
        let id_array = Self::column::<StringArray>(batch, "id")?;
        let content_array = Self::column::<StringArray>(batch, "content")?;
        let category_array = Self::column::<StringArray>(batch, "category")?;
        let tags_array = Self::column::<StringArray>(batch, "tags")?;
        let metadata_array = Self::column::<StringArray>(batch, "metadata")?;
        let created_at_array = Self::column::<TimestampMicrosecondArray>(batch, "created_at")?;
        let last_accessed_array =
            Self::column::<TimestampMicrosecondArray>(batch, "last_accessed_at")?;
        let access_count_array = Self::column::<Int32Array>(batch, "access_count")?;
        let project_array = Self::column::<StringArray>(batch, "project_id")?;

        let id = Uuid::parse_str(id_array.value(row))
            .map_err(|e| StrataError::Storage(format!("Failed to parse UUID: {e}")))?;

        let category: Category = category_array.value(row).parse()?;
        let tags = serde_json::from_str(tags_array.value(row))?;
        let metadata = serde_json::from_str(metadata_array.value(row))?;

        let created_at = Self::timestamp(created_at_array.value(row), "created_at")?;
        let last_accessed_at = if last_accessed_array.is_null(row) {
            None
        } else {
            Some(Self::timestamp(
                last_accessed_array.value(row),
                "last_accessed_at",
            )?)
        };

        let project_id = if project_array.is_null(row) {
            None
        } else {
            Some(project_array.value(row).to_string())
        };

        Ok(MemoryRecord {
            id,
            content: content_array.value(row).to_string(),
            category,
            tags,
            metadata,
            created_at,
            last_accessed_at,
            access_count: access_count_array.value(row).max(0) as u32,
            project_id,
        })
    }

    /// Run a query and decode every row, skipping rows that fail to decode
    async fn fetch(&self, predicate: Option<String>) -> Result<Vec<MemoryRecord>> {
        let query = match predicate {
            Some(sql) => self.table.query().only_if(sql),
            None => self.table.query(),
        };

        let stream = query
            .execute()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to query records: {e}")))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to collect query results: {e}")))?;

        let mut records = Vec::new();
        for batch in &batches {
            for row in 0..batch.num_rows() {
                match Self::batch_to_record(batch, row) {
                    Ok(record) => records.push(record),
                    Err(e) => warn!("Skipping undecodable cold row: {e}"),
                }
            }
        }
        Ok(records)
    }

    async fn delete_row(&self, id: Uuid) -> Result<()> {
        self.table
            .delete(&format!("id = '{id}'"))
            .await
            .map_err(|e| StrataError::Storage(format!("Failed to delete record: {e}")))?;
        Ok(())
    }
}

#[async_trait]
impl TierBackend for ColdStore {
    async fn put(&mut self, record: &MemoryRecord) -> Result<()> {
        let existing = self.get(record.id).await?;
        let existing_bytes = existing
            .as_ref()
            .map(MemoryRecord::content_bytes)
            .unwrap_or(0);

        let new_total = self.total_bytes - existing_bytes + record.content_bytes();
        if new_total > self.max_total_bytes {
            return Err(StrataError::Capacity(format!(
                "Cold tier full: {new_total} of {} bytes",
                self.max_total_bytes
            )));
        }

        let schema = Self::records_schema();
        let batch = Self::records_to_batch(std::slice::from_ref(record), schema.clone())?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if existing.is_some() {
            let mut upsert = self.table.merge_insert(&["id"]);
            upsert
                .when_matched_update_all(None)
                .when_not_matched_insert_all();
            upsert
                .execute(Box::new(batches))
                .await
                .map_err(|e| StrataError::Storage(format!("Failed to update record: {e}")))?;
        } else {
            self.table
                .add(Box::new(batches))
                .execute()
                .await
                .map_err(|e| StrataError::Storage(format!("Failed to insert record: {e}")))?;
            self.row_count += 1;
        }

        self.total_bytes = new_total;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<MemoryRecord>> {
        let mut records = self.fetch(Some(format!("id = '{id}'"))).await?;
        Ok(records.pop())
    }

    async fn delete(&mut self, id: Uuid) -> Result<bool> {
        let Some(existing) = self.get(id).await? else {
            return Ok(false);
        };

        self.delete_row(id).await?;
        self.row_count = self.row_count.saturating_sub(1);
        self.total_bytes = self.total_bytes.saturating_sub(existing.content_bytes());
        Ok(true)
    }

    async fn scan(&self) -> Result<Vec<MemoryRecord>> {
        self.fetch(None).await
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<MemoryRecord>> {
        self.fetch(filter.to_sql_clause()).await
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.row_count)
    }

    async fn total_bytes(&self) -> Result<u64> {
        Ok(self.total_bytes)
    }
}
