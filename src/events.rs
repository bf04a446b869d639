//! Structured ingestion events.
//!
//! The pipeline reports what happened to every file through an
//! [`EventSink`]; it never formats user-facing text itself. The CLI picks a
//! sink: [`TracingSink`] for human logs, [`JsonSink`] for one JSON object per
//! line on stderr. Stdout stays free for command output.

use parking_lot::Mutex;
use serde::Serialize;
use std::io::Write;

/// Why a file produced no document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The content hash is already in the store.
    AlreadyIndexed { hash: String },
    /// Another version of the file is stored under the same path.
    PathTaken,
    /// No loader is registered for the file's extension.
    Unsupported,
    /// The loader returned no text.
    NoText,
    /// Normalization left nothing to chunk.
    NoChunks,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IngestEvent {
    Discovered {
        total: usize,
    },
    Skipped {
        path: String,
        #[serde(flatten)]
        reason: SkipReason,
    },
    Failed {
        path: String,
        error: String,
    },
    /// The garbage gate rejected the whole file.
    Rejected {
        path: String,
        trash: usize,
        total: usize,
    },
    Ingested {
        path: String,
        document_id: i64,
        accepted: usize,
        total: usize,
    },
    OcrCandidates {
        path: String,
        count: usize,
        report: Option<String>,
    },
    Progress {
        done: usize,
        total: usize,
    },
}

pub trait EventSink: Send + Sync {
    fn report(&self, event: IngestEvent);
}

/// Logs events through `tracing`.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn report(&self, event: IngestEvent) {
        match event {
            IngestEvent::Discovered { total } => {
                tracing::info!("discovered {} files", format_number(total));
            }
            IngestEvent::Skipped { path, reason } => match reason {
                SkipReason::AlreadyIndexed { hash } => {
                    tracing::info!(%path, hash = %&hash[..hash.len().min(12)], "already indexed, skipping");
                }
                other => tracing::info!(%path, reason = ?other, "skipped"),
            },
            IngestEvent::Failed { path, error } => {
                tracing::warn!(%path, %error, "failed");
            }
            IngestEvent::Rejected { path, trash, total } => {
                tracing::warn!(%path, trash, total, "rejected as garbage");
            }
            IngestEvent::Ingested {
                path,
                document_id,
                accepted,
                total,
            } => {
                tracing::info!(%path, document_id, accepted, total, "ingested");
            }
            IngestEvent::OcrCandidates {
                path,
                count,
                report,
            } => {
                tracing::info!(%path, count, report = report.as_deref().unwrap_or("-"), "OCR candidates found");
            }
            IngestEvent::Progress { done, total } => {
                tracing::debug!("{} / {} files", format_number(done), format_number(total));
            }
        }
    }
}

/// One JSON object per line on stderr.
pub struct JsonSink;

impl EventSink for JsonSink {
    fn report(&self, event: IngestEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// Discards events.
pub struct NoEvents;

impl EventSink for NoEvents {
    fn report(&self, _event: IngestEvent) {}
}

/// Collects events in memory, in arrival order.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<IngestEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<IngestEvent> {
        self.events.lock().clone()
    }
}

impl EventSink for MemorySink {
    fn report(&self, event: IngestEvent) {
        self.events.lock().push(event);
    }
}

fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}
