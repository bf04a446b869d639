//! Core data models used throughout the ingestion pipeline.
//!
//! A [`Document`] is identified by the content hash of its source file; its
//! chunks are owned by it and indexed `0..n` in split order.

use serde::{Deserialize, Serialize};

/// A document row as stored in SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub hash: String,
    pub ingested_at: i64,
    pub source_type: String,
    pub embedding_model: String,
}

/// Fields needed to create a [`Document`]; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub path: String,
    pub title: String,
    pub hash: String,
    pub source_type: String,
    pub embedding_model: String,
}

/// An accepted chunk ready to be written, in split order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub text: String,
    pub skip_ocr_fix: bool,
}

/// A chunk row as stored in SQLite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredChunk {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub content: String,
    pub skip_ocr_fix: bool,
}

/// Structural quality of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Trash,
    Acceptable,
    HighQuality,
}

/// An accepted chunk as handed to the indexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexedChunk {
    pub text: String,
    pub document_id: i64,
    pub path: String,
    pub title: String,
    pub chunk_index: i64,
    pub skip_ocr_fix: bool,
}

/// Provenance returned by a content lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentMetadata {
    pub id: i64,
    pub title: String,
    pub path: String,
    pub ingested_at: i64,
}
