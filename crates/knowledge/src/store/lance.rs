//! LanceDB tables backing a persisted store.
//!
//! A store directory is a LanceDB database with two tables:
//!
//! ```text
//! chunks      id (insertion order), chunk columns, vector FixedSizeList<Float32>
//! store_info  key/value rows: format_version, provider, model, dimensions,
//!             chunk_count, built_at
//! ```
//!
//! Stores are written to a sibling staging directory and renamed into
//! place, so a reader sees either the previous store or the new one.

use crate::types::{Chunk, ChunkMetadata, ChunkSpan, StoreIdentity, StoreStats};
use arrow_array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator,
    StringArray, UInt64Array,
};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use medrag_core::{AppError, AppResult};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CHUNKS_TABLE: &str = "chunks";
pub const INFO_TABLE: &str = "store_info";

const FORMAT_VERSION: &str = "1";

/// One row of the chunks table.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub id: u64,
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Parsed `store_info` table.
#[derive(Debug, Clone)]
pub(crate) struct StoreInfo {
    pub identity: StoreIdentity,
    pub chunk_count: usize,
    pub built_at: Option<String>,
}

fn load_err(context: &'static str) -> impl Fn(lancedb::Error) -> AppError {
    move |e| AppError::StoreLoad(format!("{}: {}", context, e))
}

fn write_err(context: &'static str) -> impl Fn(lancedb::Error) -> AppError {
    move |e| AppError::Other(format!("{}: {}", context, e))
}

fn uri(dir: &Path) -> String {
    dir.to_string_lossy().to_string()
}

fn item_field() -> Arc<Field> {
    Arc::new(Field::new("item", DataType::Float32, true))
}

fn chunks_schema(dimensions: usize) -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::UInt64, false),
        Field::new("chunk_id", DataType::Utf8, false),
        Field::new("text", DataType::Utf8, false),
        Field::new("medical_specialty", DataType::Utf8, true),
        Field::new("description", DataType::Utf8, true),
        Field::new("extra", DataType::Utf8, false),
        Field::new("span_start", DataType::UInt64, true),
        Field::new("span_end", DataType::UInt64, true),
        Field::new(
            "vector",
            DataType::FixedSizeList(item_field(), dimensions as i32),
            false,
        ),
    ]))
}

fn info_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("key", DataType::Utf8, false),
        Field::new("value", DataType::Utf8, false),
    ]))
}

fn arrow_err(e: arrow_schema::ArrowError) -> AppError {
    AppError::Other(format!("Failed to build record batch: {}", e))
}

fn chunks_batch(dimensions: usize, entries: &[(Chunk, Vec<f32>)]) -> AppResult<RecordBatch> {
    let extras = entries
        .iter()
        .map(|(chunk, _)| serde_json::to_string(&chunk.metadata.extra))
        .collect::<Result<Vec<String>, _>>()?;

    let mut flat = Vec::with_capacity(entries.len() * dimensions);
    for (_, vector) in entries {
        flat.extend_from_slice(vector);
    }
    let vectors = FixedSizeListArray::try_new(
        item_field(),
        dimensions as i32,
        Arc::new(Float32Array::from(flat)),
        None,
    )
    .map_err(arrow_err)?;

    let columns: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from_iter_values(0..entries.len() as u64)),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|(c, _)| c.id()),
        )),
        Arc::new(StringArray::from_iter_values(
            entries.iter().map(|(c, _)| c.text.as_str()),
        )),
        Arc::new(
            entries
                .iter()
                .map(|(c, _)| c.metadata.medical_specialty.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(
            entries
                .iter()
                .map(|(c, _)| c.metadata.description.as_deref())
                .collect::<StringArray>(),
        ),
        Arc::new(StringArray::from(extras)),
        Arc::new(UInt64Array::from(
            entries
                .iter()
                .map(|(c, _)| c.span.as_ref().map(|s| s.start as u64))
                .collect::<Vec<_>>(),
        )),
        Arc::new(UInt64Array::from(
            entries
                .iter()
                .map(|(c, _)| c.span.as_ref().map(|s| s.end as u64))
                .collect::<Vec<_>>(),
        )),
        Arc::new(vectors),
    ];

    RecordBatch::try_new(chunks_schema(dimensions), columns).map_err(arrow_err)
}

pub(crate) fn info_batch(entries: &[(&str, String)]) -> AppResult<RecordBatch> {
    let keys = StringArray::from_iter_values(entries.iter().map(|(k, _)| *k));
    let values = StringArray::from_iter_values(entries.iter().map(|(_, v)| v.as_str()));
    let columns: Vec<ArrayRef> = vec![Arc::new(keys), Arc::new(values)];
    RecordBatch::try_new(info_schema(), columns).map_err(arrow_err)
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a T> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<T>())
        .ok_or_else(|| AppError::StoreLoad(format!("Chunks table has no valid '{}' column", name)))
}

fn optional_string(array: &StringArray, i: usize) -> Option<String> {
    (!array.is_null(i)).then(|| array.value(i).to_string())
}

fn optional_u64(array: &UInt64Array, i: usize) -> Option<u64> {
    (!array.is_null(i)).then(|| array.value(i))
}

fn batch_rows(batch: &RecordBatch) -> AppResult<Vec<StoredRow>> {
    let ids = column::<UInt64Array>(batch, "id")?;
    let chunk_ids = column::<StringArray>(batch, "chunk_id")?;
    let texts = column::<StringArray>(batch, "text")?;
    let specialties = column::<StringArray>(batch, "medical_specialty")?;
    let descriptions = column::<StringArray>(batch, "description")?;
    let extras = column::<StringArray>(batch, "extra")?;
    let starts = column::<UInt64Array>(batch, "span_start")?;
    let ends = column::<UInt64Array>(batch, "span_end")?;
    let vectors = column::<FixedSizeListArray>(batch, "vector")?;

    let mut rows = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        let chunk_id = chunk_ids.value(i).to_string();
        let extra: BTreeMap<String, String> =
            serde_json::from_str(extras.value(i)).map_err(|e| {
                AppError::StoreLoad(format!("Corrupt metadata for chunk {}: {}", chunk_id, e))
            })?;
        let span = match (optional_u64(starts, i), optional_u64(ends, i)) {
            (Some(start), Some(end)) => Some(ChunkSpan {
                start: start as usize,
                end: end as usize,
            }),
            _ => None,
        };

        let row = vectors.value(i);
        let values = row
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| AppError::StoreLoad("Vector column is not Float32".to_string()))?;

        rows.push(StoredRow {
            id: ids.value(i),
            chunk: Chunk {
                text: texts.value(i).to_string(),
                metadata: ChunkMetadata {
                    medical_specialty: optional_string(specialties, i),
                    description: optional_string(descriptions, i),
                    chunk_id,
                    extra,
                },
                span,
            },
            vector: values.values().to_vec(),
        });
    }
    Ok(rows)
}

fn sibling(dir: &Path, suffix: &str) -> AppResult<PathBuf> {
    let name = dir
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| AppError::InvalidInput(format!("Invalid store directory: {:?}", dir)))?;
    Ok(dir.with_file_name(format!(".{}.{}-{}", name, suffix, std::process::id())))
}

/// Write a store to `dir`, replacing whatever was there.
pub(crate) async fn write(
    dir: &Path,
    identity: &StoreIdentity,
    built_at: &str,
    entries: &[(Chunk, Vec<f32>)],
) -> AppResult<()> {
    let staging = sibling(dir, "staging")?;
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;

    if let Err(e) = write_tables(&staging, identity, built_at, entries).await {
        fs::remove_dir_all(&staging).ok();
        return Err(e);
    }

    swap_into_place(&staging, dir)?;

    tracing::info!(
        path = %dir.display(),
        chunks = entries.len(),
        dimensions = identity.dimensions,
        "Persisted vector store"
    );
    Ok(())
}

async fn write_tables(
    dir: &Path,
    identity: &StoreIdentity,
    built_at: &str,
    entries: &[(Chunk, Vec<f32>)],
) -> AppResult<()> {
    let conn = lancedb::connect(&uri(dir))
        .execute()
        .await
        .map_err(write_err("Failed to create store database"))?;

    let batch = chunks_batch(identity.dimensions, entries)?;
    let schema = batch.schema();
    conn.create_table(CHUNKS_TABLE, RecordBatchIterator::new(vec![Ok(batch)], schema))
        .execute()
        .await
        .map_err(write_err("Failed to write chunks table"))?;

    let info = info_batch(&[
        ("format_version", FORMAT_VERSION.to_string()),
        ("provider", identity.provider.clone()),
        ("model", identity.model.clone()),
        ("dimensions", identity.dimensions.to_string()),
        ("chunk_count", entries.len().to_string()),
        ("built_at", built_at.to_string()),
    ])?;
    let schema = info.schema();
    conn.create_table(INFO_TABLE, RecordBatchIterator::new(vec![Ok(info)], schema))
        .execute()
        .await
        .map_err(write_err("Failed to write store_info table"))?;

    Ok(())
}

fn swap_into_place(staging: &Path, dir: &Path) -> AppResult<()> {
    if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    if !dir.exists() {
        fs::rename(staging, dir)?;
        return Ok(());
    }

    let retired = sibling(dir, "old")?;
    if retired.exists() {
        fs::remove_dir_all(&retired)?;
    }
    fs::rename(dir, &retired)?;

    if let Err(e) = fs::rename(staging, dir) {
        // Put the previous store back before reporting.
        fs::rename(&retired, dir).ok();
        fs::remove_dir_all(staging).ok();
        return Err(e.into());
    }

    if let Err(e) = fs::remove_dir_all(&retired) {
        tracing::warn!(path = %retired.display(), "Failed to remove previous store: {}", e);
    }
    Ok(())
}

/// Open both tables of a store directory.
pub(crate) async fn open(dir: &Path) -> AppResult<(Table, StoreInfo)> {
    if !dir.is_dir() {
        return Err(AppError::StoreLoad(format!(
            "No vector store at {:?}. Run 'medrag index' first",
            dir
        )));
    }

    let conn = lancedb::connect(&uri(dir))
        .execute()
        .await
        .map_err(load_err("Failed to open store database"))?;
    let names = conn
        .table_names()
        .execute()
        .await
        .map_err(load_err("Failed to list store tables"))?;
    for required in [CHUNKS_TABLE, INFO_TABLE] {
        if !names.iter().any(|n| n == required) {
            return Err(AppError::StoreLoad(format!(
                "Store {:?} has no '{}' table",
                dir, required
            )));
        }
    }

    let info = read_info(&conn).await?;
    let table = conn
        .open_table(CHUNKS_TABLE)
        .execute()
        .await
        .map_err(load_err("Failed to open chunks table"))?;

    let rows = table
        .count_rows(None)
        .await
        .map_err(load_err("Failed to count chunks"))?;
    if rows != info.chunk_count {
        return Err(AppError::StoreLoad(format!(
            "store_info records {} chunks but the chunks table has {}",
            info.chunk_count, rows
        )));
    }

    let schema = table
        .schema()
        .await
        .map_err(load_err("Failed to read chunks schema"))?;
    let vector_dims = schema
        .field_with_name("vector")
        .ok()
        .and_then(|f| match f.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        });
    if vector_dims != Some(info.identity.dimensions) {
        return Err(AppError::StoreLoad(format!(
            "store_info records {} dimensions but the vector column holds {:?}",
            info.identity.dimensions, vector_dims
        )));
    }

    Ok((table, info))
}

async fn read_info(conn: &Connection) -> AppResult<StoreInfo> {
    let table = conn
        .open_table(INFO_TABLE)
        .execute()
        .await
        .map_err(load_err("Failed to open store_info table"))?;
    let batches = table
        .query()
        .execute()
        .await
        .map_err(load_err("Failed to read store_info"))?
        .try_collect::<Vec<_>>()
        .await
        .map_err(load_err("Failed to read store_info"))?;

    let mut values = BTreeMap::new();
    for batch in &batches {
        let keys = info_column(batch, "key")?;
        let vals = info_column(batch, "value")?;
        for i in 0..batch.num_rows() {
            values.insert(keys.value(i).to_string(), vals.value(i).to_string());
        }
    }

    let get = |key: &str| {
        values
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::StoreLoad(format!("store_info has no '{}' entry", key)))
    };
    let count = |key: &str| -> AppResult<usize> {
        let raw = get(key)?;
        raw.parse().map_err(|_| {
            AppError::StoreLoad(format!("Corrupt store_info: {} is '{}'", key, raw))
        })
    };

    let version = get("format_version")?;
    if version != FORMAT_VERSION {
        return Err(AppError::StoreLoad(format!(
            "Unsupported store format version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }

    Ok(StoreInfo {
        identity: StoreIdentity {
            provider: get("provider")?,
            model: get("model")?,
            dimensions: count("dimensions")?,
        },
        chunk_count: count("chunk_count")?,
        built_at: values.get("built_at").cloned(),
    })
}

fn info_column<'a>(batch: &'a RecordBatch, name: &str) -> AppResult<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| AppError::StoreLoad(format!("store_info has no valid '{}' column", name)))
}

fn collect_rows(batches: &[RecordBatch]) -> AppResult<Vec<StoredRow>> {
    let mut rows = Vec::new();
    for batch in batches {
        rows.extend(batch_rows(batch)?);
    }
    Ok(rows)
}

/// Every row, in no particular order.
pub(crate) async fn scan(table: &Table, limit: usize) -> AppResult<Vec<StoredRow>> {
    let batches = table
        .query()
        .limit(limit)
        .execute()
        .await
        .map_err(load_err("Failed to scan chunks"))?
        .try_collect::<Vec<_>>()
        .await
        .map_err(load_err("Failed to read chunks"))?;
    collect_rows(&batches)
}

/// Every row, nearest to `query` first by cosine distance.
///
/// Rows the vector query leaves out (an undefined cosine distance against a
/// zero or non-finite vector) are picked up with a plain scan.
pub(crate) async fn nearest(table: &Table, query: &[f32], limit: usize) -> AppResult<Vec<StoredRow>> {
    let usable = query.iter().all(|x| x.is_finite()) && query.iter().any(|x| *x != 0.0);

    let mut rows = Vec::new();
    if usable {
        let batches = table
            .query()
            .nearest_to(query.to_vec())
            .map_err(load_err("Failed to create vector query"))?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(load_err("Failed to execute vector query"))?
            .try_collect::<Vec<_>>()
            .await
            .map_err(load_err("Failed to collect vector query results"))?;
        rows = collect_rows(&batches)?;
    }

    if rows.len() < limit {
        let seen: HashSet<u64> = rows.iter().map(|r| r.id).collect();
        let rest = scan(table, limit).await?;
        rows.extend(rest.into_iter().filter(|r| !seen.contains(&r.id)));
    }
    Ok(rows)
}

/// Read store statistics without loading chunk rows.
pub async fn store_stats(dir: &Path) -> AppResult<StoreStats> {
    let (_, info) = open(dir).await?;

    let disk_bytes = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum();

    Ok(StoreStats {
        chunk_count: info.chunk_count,
        dimensions: info.identity.dimensions,
        provider: info.identity.provider,
        model: info.identity.model,
        built_at: info.built_at,
        disk_bytes,
    })
}
