//! Corpus loading and the chunk interchange file.
//!
//! A corpus is a CSV file with a header row (the layout of the public
//! transcription dataset), or a JSON array or JSON Lines file of records
//! shaped like
//! `{"transcription": "...", "medical_specialty": "...", "description": "..."}`,
//! or `{"text": "...", "metadata": {...}}` documents. Other scalar fields are
//! kept in `DocumentMetadata::extra`.

use crate::types::{Chunk, Document, DocumentMetadata};
use medrag_core::{AppError, AppResult};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

const TEXT_FIELD: &str = "transcription";
const ALT_TEXT_FIELD: &str = "text";
const NESTED_METADATA: &str = "metadata";

/// A document together with its row number in the corpus file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedDocument {
    pub doc_index: usize,
    pub document: Document,
}

/// Documents kept from a corpus file.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub documents: Vec<IndexedDocument>,

    /// Rows without a usable transcription
    pub dropped_rows: usize,
}

impl Corpus {
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Document)> {
        self.documents.iter().map(|d| (d.doc_index, &d.document))
    }
}

fn is_jsonl(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()),
        Some("jsonl") | Some("ndjson")
    )
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
}

/// Load a corpus file.
///
/// Row numbers count every record, dropped or not, so chunk ids stay
/// stable when blank rows are filtered.
pub fn load_corpus(path: &Path) -> AppResult<Corpus> {
    let records = read_records(path)?;
    let total = records.len();

    let mut corpus = Corpus::default();
    for (row, record) in records.into_iter().enumerate() {
        match record_to_document(row, record)? {
            Some(document) => corpus.documents.push(IndexedDocument {
                doc_index: row,
                document,
            }),
            None => corpus.dropped_rows += 1,
        }
    }

    if corpus.dropped_rows > 0 {
        tracing::warn!(
            dropped = corpus.dropped_rows,
            "Dropped corpus rows without a {} field",
            TEXT_FIELD
        );
    }
    tracing::info!(
        path = %path.display(),
        rows = total,
        documents = corpus.documents.len(),
        "Loaded corpus"
    );

    Ok(corpus)
}

fn read_records(path: &Path) -> AppResult<Vec<Value>> {
    if is_csv(path) {
        return read_csv_records(path);
    }

    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::InvalidInput(format!("Failed to read corpus {:?}: {}", path, e))
    })?;

    if is_jsonl(path) || !contents.trim_start().starts_with('[') {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(n, line)| {
                serde_json::from_str(line).map_err(|e| {
                    AppError::InvalidInput(format!("{:?} line {}: {}", path, n + 1, e))
                })
            })
            .collect()
    } else {
        serde_json::from_str(&contents)
            .map_err(|e| AppError::InvalidInput(format!("Failed to parse corpus {:?}: {}", path, e)))
    }
}

/// Each CSV row becomes an object keyed by header. Blank header cells (the
/// unnamed index column of a dataframe export) are skipped.
fn read_csv_records(path: &Path) -> AppResult<Vec<Value>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        AppError::InvalidInput(format!("Failed to read corpus {:?}: {}", path, e))
    })?;
    let headers = reader
        .headers()
        .map_err(|e| AppError::InvalidInput(format!("{:?} header: {}", path, e)))?
        .clone();

    let mut records = Vec::new();
    for (n, row) in reader.records().enumerate() {
        let row = row.map_err(|e| {
            AppError::InvalidInput(format!("{:?} record {}: {}", path, n + 1, e))
        })?;
        let fields: Map<String, Value> = headers
            .iter()
            .zip(row.iter())
            .filter(|(header, _)| !header.trim().is_empty())
            .map(|(header, value)| (header.to_string(), Value::String(value.to_string())))
            .collect();
        records.push(Value::Object(fields));
    }
    Ok(records)
}

fn record_to_document(row: usize, record: Value) -> AppResult<Option<Document>> {
    let Value::Object(mut fields) = record else {
        return Err(AppError::InvalidInput(format!(
            "Corpus row {} is not a JSON object",
            row
        )));
    };

    if let Some(Value::Object(nested)) = fields.remove(NESTED_METADATA) {
        for (key, value) in nested {
            fields.entry(key).or_insert(value);
        }
    }

    let text = match fields
        .remove(TEXT_FIELD)
        .or_else(|| fields.remove(ALT_TEXT_FIELD))
    {
        Some(Value::String(text)) if !text.trim().is_empty() => text,
        _ => return Ok(None),
    };

    let medical_specialty = take_string(&mut fields, "medical_specialty");
    let description = take_string(&mut fields, "description");

    let extra: BTreeMap<String, String> = fields
        .into_iter()
        .filter_map(|(key, value)| scalar_to_string(value).map(|v| (key, v)))
        .collect();

    Ok(Some(Document::new(
        text,
        DocumentMetadata {
            medical_specialty,
            description,
            extra,
        },
    )))
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    fields
        .remove(key)
        .and_then(scalar_to_string)
        .filter(|s| !s.trim().is_empty())
}

fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Write chunks to the interchange file.
///
/// `.jsonl` paths get one chunk per line; anything else a pretty JSON array.
pub fn write_chunks(path: &Path, chunks: &[Chunk]) -> AppResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);

    if is_jsonl(path) {
        for chunk in chunks {
            serde_json::to_writer(&mut writer, chunk)?;
            writer.write_all(b"\n")?;
        }
    } else {
        serde_json::to_writer_pretty(&mut writer, chunks)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), chunks = chunks.len(), "Wrote chunks");
    Ok(())
}

/// Read chunks written by `write_chunks` (or any compatible producer).
pub fn read_chunks(path: &Path) -> AppResult<Vec<Chunk>> {
    let file = std::fs::File::open(path).map_err(|e| {
        AppError::InvalidInput(format!("Failed to open chunk file {:?}: {}", path, e))
    })?;

    if is_jsonl(path) {
        let mut chunks = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let chunk = serde_json::from_str(&line).map_err(|e| {
                AppError::InvalidInput(format!("{:?} line {}: {}", path, n + 1, e))
            })?;
            chunks.push(chunk);
        }
        Ok(chunks)
    } else {
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            AppError::InvalidInput(format!("Failed to parse chunk file {:?}: {}", path, e))
        })
    }
}
