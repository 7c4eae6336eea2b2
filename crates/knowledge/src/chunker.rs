//! Recursive character chunker.
//!
//! Cuts are searched from the end of each window backwards, trying
//! paragraph breaks first, then line breaks, sentence ends, single spaces
//! and finally a bare character boundary. Consecutive chunks of a document
//! share exactly `chunk_overlap` characters, and every chunk is an exact
//! slice of the normalized text.

use crate::types::{Chunk, ChunkMetadata, ChunkSpan, Document};
use medrag_core::{AppError, AppResult};

/// Separators in priority order. A cut lands right after the separator.
const SEPARATORS: [&[char]; 6] = [
    &['\n', '\n'],
    &['\n'],
    &['.', ' '],
    &['?', ' '],
    &['!', ' '],
    &[' '],
];

/// Splits documents into overlapping, size-bounded chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    /// # Errors
    /// `InvalidInput` unless `chunk_size >= 1` and `chunk_overlap < chunk_size`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> AppResult<Self> {
        if chunk_size == 0 {
            return Err(AppError::InvalidInput(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(AppError::InvalidInput(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// Chunk one document. `doc_index` becomes the prefix of every chunk id.
    pub fn split(&self, doc_index: usize, document: &Document) -> Vec<Chunk> {
        let text = normalize_whitespace(&document.text);
        if text.is_empty() {
            tracing::debug!(doc_index, "Document is empty after normalization, no chunks");
            return Vec::new();
        }

        self.split_spans(&text)
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (span, text))| Chunk {
                text,
                metadata: ChunkMetadata {
                    medical_specialty: document.metadata.medical_specialty.clone(),
                    description: document.metadata.description.clone(),
                    chunk_id: format!("{}_{}", doc_index, chunk_index),
                    extra: document.metadata.extra.clone(),
                },
                span: Some(span),
            })
            .collect()
    }

    /// Chunk many documents, keeping document order then chunk order.
    pub fn split_all<'a, I>(&self, documents: I) -> Vec<Chunk>
    where
        I: IntoIterator<Item = (usize, &'a Document)>,
    {
        let mut chunks = Vec::new();
        let mut documents_seen = 0usize;
        for (doc_index, document) in documents {
            chunks.extend(self.split(doc_index, document));
            documents_seen += 1;
        }
        tracing::info!(
            documents = documents_seen,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            chunk_overlap = self.chunk_overlap,
            "Chunked corpus"
        );
        chunks
    }

    /// Split already-normalized text into pieces without metadata.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_spans(text)
            .into_iter()
            .map(|(_, piece)| piece)
            .collect()
    }

    fn split_spans(&self, text: &str) -> Vec<(ChunkSpan, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        let mut pieces = Vec::new();
        if total == 0 {
            return pieces;
        }

        let mut start = 0usize;
        loop {
            if total - start <= self.chunk_size {
                pieces.push(piece(&chars, start, total));
                break;
            }

            let window_end = start + self.chunk_size;
            let min_cut = start + self.chunk_overlap + 1;
            let cut = find_cut(&chars, min_cut, window_end);

            pieces.push(piece(&chars, start, cut));
            start = cut - self.chunk_overlap;
        }

        pieces
    }
}

fn piece(chars: &[char], start: usize, end: usize) -> (ChunkSpan, String) {
    (ChunkSpan { start, end }, chars[start..end].iter().collect())
}

/// Latest cut in `[min_cut, window_end]` at the highest-priority separator
/// that has one; `window_end` when none does.
fn find_cut(chars: &[char], min_cut: usize, window_end: usize) -> usize {
    for separator in SEPARATORS {
        let len = separator.len();
        let mut cut = window_end;
        while cut >= min_cut && cut >= len {
            if &chars[cut - len..cut] == separator {
                return cut;
            }
            cut -= 1;
        }
    }
    window_end
}

/// Collapse whitespace runs to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
