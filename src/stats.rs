//! Store statistics.
//!
//! A quick summary of what has been ingested: document and chunk counts,
//! the share of chunks flagged as clean enough to skip OCR fixes, and a
//! per-source-type breakdown. Used by `corpus stats`.

use sqlx::Row;
use std::path::Path;

use crate::error::Result;
use crate::store::MetadataStore;

/// Counts for one source type (file extension).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTypeStats {
    pub source_type: String,
    pub doc_count: i64,
    pub chunk_count: i64,
    pub last_ingested: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub documents: i64,
    pub chunks: i64,
    pub clean_chunks: i64,
    pub by_source_type: Vec<SourceTypeStats>,
}

pub async fn collect_stats(store: &MetadataStore) -> Result<StoreStats> {
    let documents = store.count_documents().await?;
    let chunks = store.count_chunks().await?;
    let clean_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE skip_ocr_fix = 1")
        .fetch_one(store.pool())
        .await?;

    let rows = sqlx::query(
        r#"
        SELECT
            d.source_type,
            COUNT(DISTINCT d.id) AS doc_count,
            COUNT(c.id) AS chunk_count,
            MAX(d.ingested_at) AS last_ingested
        FROM documents d
        LEFT JOIN chunks c ON c.document_id = d.id
        GROUP BY d.source_type
        ORDER BY doc_count DESC, d.source_type
        "#,
    )
    .fetch_all(store.pool())
    .await?;

    let by_source_type = rows
        .iter()
        .map(|row| SourceTypeStats {
            source_type: row.get("source_type"),
            doc_count: row.get("doc_count"),
            chunk_count: row.get("chunk_count"),
            last_ingested: row.get("last_ingested"),
        })
        .collect();

    Ok(StoreStats {
        documents,
        chunks,
        clean_chunks,
        by_source_type,
    })
}

/// Print a human-readable summary to stdout.
pub fn print_stats(db_path: &Path, stats: &StoreStats) {
    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    println!("Corpus store stats");
    println!("==================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.documents);
    println!("  Chunks:      {}", stats.chunks);
    println!(
        "  Clean:       {} / {} ({}%)",
        stats.clean_chunks,
        stats.chunks,
        if stats.chunks > 0 {
            (stats.clean_chunks * 100) / stats.chunks
        } else {
            0
        }
    );

    if !stats.by_source_type.is_empty() {
        println!();
        println!("  By source type:");
        println!(
            "  {:<12} {:>6} {:>8}   {}",
            "TYPE", "DOCS", "CHUNKS", "LAST INGESTED"
        );
        println!("  {}", "-".repeat(52));
        for s in &stats.by_source_type {
            let last = s
                .last_ingested
                .map(format_ts_relative)
                .unwrap_or_else(|| "never".to_string());
            println!(
                "  {:<12} {:>6} {:>8}   {}",
                s.source_type, s.doc_count, s.chunk_count, last
            );
        }
    }
    println!();
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    let plural = |n: i64| if n == 1 { "" } else { "s" };
    match delta {
        d if d < 0 => format_ts_iso(ts),
        d if d < 60 => "just now".to_string(),
        d if d < 3600 => format!("{} min{} ago", d / 60, plural(d / 60)),
        d if d < 86400 => format!("{} hour{} ago", d / 3600, plural(d / 3600)),
        d if d < 86400 * 30 => format!("{} day{} ago", d / 86400, plural(d / 86400)),
        _ => format_ts_iso(ts),
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkRecord, NewDocument};

    #[test]
    fn byte_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = chrono::Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 3600), "1 hour ago");
        assert_eq!(format_ts_relative(now - 3 * 86400), "3 days ago");
    }

    #[tokio::test]
    async fn collects_per_type_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::open(&dir.path().join("m.db")).await.unwrap();
        for (i, ext) in ["pdf", "pdf", "txt"].iter().enumerate() {
            store
                .insert_document_with_chunks(
                    &NewDocument {
                        path: format!("/doc{}.{}", i, ext),
                        title: format!("doc{}", i),
                        hash: format!("hash{}", i),
                        source_type: ext.to_string(),
                        embedding_model: "m".into(),
                    },
                    &[
                        ChunkRecord {
                            text: "clean chunk text".into(),
                            skip_ocr_fix: true,
                        },
                        ChunkRecord {
                            text: "noisier chunk text".into(),
                            skip_ocr_fix: false,
                        },
                    ],
                )
                .await
                .unwrap();
        }

        let stats = collect_stats(&store).await.unwrap();
        assert_eq!(stats.documents, 3);
        assert_eq!(stats.chunks, 6);
        assert_eq!(stats.clean_chunks, 3);
        assert_eq!(stats.by_source_type[0].source_type, "pdf");
        assert_eq!(stats.by_source_type[0].doc_count, 2);
        assert_eq!(stats.by_source_type[0].chunk_count, 4);
        assert!(stats.by_source_type[1].last_ingested.is_some());
    }
}
