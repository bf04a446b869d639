//! SQLite-backed metadata store for documents and their chunks.
//!
//! A document and all of its accepted chunks are written in one transaction,
//! so a crash or cancellation never leaves a document without its chunks.
//! Uniqueness of `hash` and `path` is enforced by the schema; violations
//! surface as [`IngestError::Duplicate`].

use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use std::path::Path;

use crate::db;
use crate::error::{IngestError, Result};
use crate::migrate;
use crate::models::{ChunkRecord, Document, DocumentMetadata, NewDocument, StoredChunk};

/// Characters of a query used for a content lookup.
pub const LOOKUP_PROBE_CHARS: usize = 50;

#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    /// Connect to the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a document row on its own and return its id.
    pub async fn insert_document(&self, doc: &NewDocument) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_document_row(&mut tx, doc).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Append chunks to an existing document, indexed `0..n` in order.
    pub async fn insert_chunks(&self, document_id: i64, chunks: &[ChunkRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        insert_chunk_rows(&mut tx, document_id, chunks).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Insert a document and its chunks atomically.
    pub async fn insert_document_with_chunks(
        &self,
        doc: &NewDocument,
        chunks: &[ChunkRecord],
    ) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let id = insert_document_row(&mut tx, doc).await?;
        insert_chunk_rows(&mut tx, id, chunks).await?;
        tx.commit().await?;
        tracing::debug!(document_id = id, chunks = chunks.len(), path = %doc.path, "document stored");
        Ok(id)
    }

    pub async fn contains_hash(&self, hash: &str) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE hash = ?")
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    pub async fn existing_hashes(&self) -> Result<HashSet<String>> {
        let hashes: Vec<String> = sqlx::query_scalar("SELECT hash FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(hashes.into_iter().collect())
    }

    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, path, title, hash, ingested_at, source_type, embedding_model \
             FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Document {
            id: row.get("id"),
            path: row.get("path"),
            title: row.get("title"),
            hash: row.get("hash"),
            ingested_at: row.get("ingested_at"),
            source_type: row.get("source_type"),
            embedding_model: row.get("embedding_model"),
        }))
    }

    /// Chunks of one document in index order.
    pub async fn chunks_for(&self, document_id: i64) -> Result<Vec<StoredChunk>> {
        let rows = sqlx::query(
            "SELECT id, document_id, chunk_index, content, skip_ocr_fix \
             FROM chunks WHERE document_id = ? ORDER BY chunk_index",
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredChunk {
                id: row.get("id"),
                document_id: row.get("document_id"),
                chunk_index: row.get("chunk_index"),
                content: row.get("content"),
                skip_ocr_fix: row.get("skip_ocr_fix"),
            })
            .collect())
    }

    /// Provenance of the first document with a chunk containing the leading
    /// [`LOOKUP_PROBE_CHARS`] characters of `text`.
    pub async fn find_by_content_substring(&self, text: &str) -> Result<Option<DocumentMetadata>> {
        let probe: String = text.trim().chars().take(LOOKUP_PROBE_CHARS).collect();
        if probe.is_empty() {
            return Ok(None);
        }

        let row = sqlx::query(
            r#"
            SELECT d.id, d.title, d.path, d.ingested_at
            FROM documents d
            JOIN chunks c ON c.document_id = d.id
            WHERE instr(c.content, ?) > 0
            ORDER BY d.id, c.chunk_index
            LIMIT 1
            "#,
        )
        .bind(&probe)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| DocumentMetadata {
            id: row.get("id"),
            title: row.get("title"),
            path: row.get("path"),
            ingested_at: row.get("ingested_at"),
        }))
    }

    /// Delete a document and, by cascade, its chunks.
    pub async fn delete_document(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_documents(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn count_chunks(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?)
    }
}

async fn insert_document_row(tx: &mut Transaction<'_, Sqlite>, doc: &NewDocument) -> Result<i64> {
    let now = chrono::Utc::now().timestamp();
    let result = sqlx::query(
        r#"
        INSERT INTO documents (path, title, hash, ingested_at, source_type, embedding_model)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&doc.path)
    .bind(&doc.title)
    .bind(&doc.hash)
    .bind(now)
    .bind(&doc.source_type)
    .bind(&doc.embedding_model)
    .execute(&mut **tx)
    .await
    .map_err(|e| IngestError::from_insert(e, &format!("{} ({})", doc.path, doc.hash)))?;

    Ok(result.last_insert_rowid())
}

async fn insert_chunk_rows(
    tx: &mut Transaction<'_, Sqlite>,
    document_id: i64,
    chunks: &[ChunkRecord],
) -> Result<()> {
    for (index, chunk) in chunks.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunks (document_id, chunk_index, content, skip_ocr_fix) VALUES (?, ?, ?, ?)",
        )
        .bind(document_id)
        .bind(index as i64)
        .bind(&chunk.text)
        .bind(chunk.skip_ocr_fix)
        .execute(&mut **tx)
        .await
        .map_err(|e| {
            IngestError::from_insert(e, &format!("chunk {} of document {}", index, document_id))
        })?;
    }
    Ok(())
}
