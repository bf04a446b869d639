//! Ingestion pipeline orchestration.
//!
//! Per file: dedup check → load → normalize → (optional) OCR candidate
//! detection → chunk → classify → garbage gate → store → index.
//!
//! Files run concurrently, bounded by `ingest.workers`; CPU-bound stages run
//! on the blocking pool. Each file reads one rule snapshot taken when its
//! processing starts, and its document plus chunks are committed in a single
//! transaction. A failure in one file is reported and counted; the run goes
//! on. Only fatal (configuration) errors abort it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunk::split_text;
use crate::config::Config;
use crate::dedup::ContentAddressedDeduper;
use crate::error::{IngestError, Result};
use crate::events::{EventSink, IngestEvent, NoEvents, SkipReason};
use crate::indexer::{Indexer, JsonlIndexer, NullIndexer};
use crate::loader::{Loader, LoaderRegistry};
use crate::models::{ChunkRecord, IndexedChunk, NewDocument, Quality};
use crate::normalize::normalize;
use crate::ocr::{self, OcrArtifactDetector};
use crate::quality::{classify, FileGarbageGate, GateReport};
use crate::rules::{RuleSnapshot, RuleStore};
use crate::store::MetadataStore;

/// Numeric settings for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub garbage_threshold: f64,
    pub similarity_threshold: f64,
    pub workers: usize,
    pub embedding_model: String,
    pub report_dir: PathBuf,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.chunking.chunk_size,
            chunk_overlap: config.chunking.chunk_overlap,
            garbage_threshold: config.quality.garbage_threshold,
            similarity_threshold: config.ocr.similarity_threshold,
            workers: config.ingest.workers,
            embedding_model: config.ingest.embedding_model.clone(),
            report_dir: config.ocr.report_dir.clone(),
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    Ingested {
        document_id: i64,
        accepted: usize,
        total: usize,
    },
    Skipped(SkipReason),
    Rejected(GateReport),
}

/// Counters for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub discovered: usize,
    pub ingested: usize,
    pub skipped: usize,
    pub rejected: usize,
    pub failed: usize,
    pub chunks_accepted: usize,
    pub chunks_rejected: usize,
}

/// Output of the CPU-bound stage for one file.
enum Prepared {
    NoText,
    Chunks {
        chunks: Vec<String>,
        qualities: Vec<Quality>,
        candidates: Option<(usize, Option<PathBuf>)>,
    },
}

#[derive(Clone)]
pub struct Pipeline {
    store: MetadataStore,
    deduper: ContentAddressedDeduper,
    rules: Arc<RuleStore>,
    loaders: Arc<LoaderRegistry>,
    detector: Option<Arc<OcrArtifactDetector>>,
    indexer: Arc<dyn Indexer>,
    events: Arc<dyn EventSink>,
    gate: FileGarbageGate,
    settings: Arc<PipelineSettings>,
}

impl Pipeline {
    /// A pipeline with the built-in loaders, no OCR detection, no index
    /// output, and no event reporting.
    pub fn new(settings: PipelineSettings, store: MetadataStore, rules: Arc<RuleStore>) -> Result<Self> {
        if settings.chunk_size == 0 || settings.chunk_overlap >= settings.chunk_size {
            return Err(IngestError::Config(format!(
                "invalid chunking: size {} overlap {}",
                settings.chunk_size, settings.chunk_overlap
            )));
        }
        if settings.workers == 0 {
            return Err(IngestError::Config("ingest.workers must be > 0".into()));
        }
        Ok(Self {
            deduper: ContentAddressedDeduper::new(store.clone()),
            store,
            rules,
            loaders: Arc::new(LoaderRegistry::with_builtin()),
            detector: None,
            indexer: Arc::new(NullIndexer),
            events: Arc::new(NoEvents),
            gate: FileGarbageGate::new(settings.garbage_threshold),
            settings: Arc::new(settings),
        })
    }

    /// Wire everything the configuration asks for: OCR detection (when
    /// `detect_ocr` or `ocr.detect` is set) and JSONL index output.
    pub fn from_config(
        config: &Config,
        store: MetadataStore,
        rules: Arc<RuleStore>,
        detect_ocr: bool,
    ) -> Result<Self> {
        let mut pipeline = Self::new(PipelineSettings::from_config(config), store, rules)?;
        if let Some(detector) = OcrArtifactDetector::from_config(&config.ocr, detect_ocr || config.ocr.detect)? {
            pipeline = pipeline.with_detector(detector);
        }
        if let Some(path) = &config.ingest.index_output {
            pipeline = pipeline.with_indexer(Arc::new(JsonlIndexer::open(path)?));
        }
        Ok(pipeline)
    }

    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = Arc::new(loaders);
        self
    }

    pub fn with_detector(mut self, detector: OcrArtifactDetector) -> Self {
        self.detector = Some(Arc::new(detector));
        self
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn Indexer>) -> Self {
        self.indexer = indexer;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    pub fn loaders(&self) -> &LoaderRegistry {
        &self.loaders
    }

    /// Process every path, at most `workers` at a time.
    pub async fn run(&self, paths: Vec<PathBuf>) -> Result<RunSummary> {
        let total = paths.len();
        let mut summary = RunSummary {
            discovered: total,
            ..RunSummary::default()
        };
        self.events.report(IngestEvent::Discovered { total });

        let permits = Arc::new(Semaphore::new(self.settings.workers));
        let mut tasks = JoinSet::new();
        for path in paths {
            let pipeline = self.clone();
            let permits = permits.clone();
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let outcome = pipeline.ingest_file(&path).await;
                (path, outcome)
            });
        }

        let mut done = 0;
        while let Some(joined) = tasks.join_next().await {
            done += 1;
            let (path, outcome) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "ingest task aborted");
                    summary.failed += 1;
                    continue;
                }
            };
            match outcome {
                Ok(FileOutcome::Ingested { accepted, total, .. }) => {
                    summary.ingested += 1;
                    summary.chunks_accepted += accepted;
                    summary.chunks_rejected += total - accepted;
                }
                Ok(FileOutcome::Skipped(_)) => summary.skipped += 1,
                Ok(FileOutcome::Rejected(report)) => {
                    summary.rejected += 1;
                    summary.chunks_rejected += report.total;
                }
                Err(e) if e.is_fatal() => {
                    tasks.abort_all();
                    return Err(e);
                }
                Err(e) => {
                    summary.failed += 1;
                    self.events.report(IngestEvent::Failed {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
            self.events.report(IngestEvent::Progress { done, total });
        }

        tracing::debug!(?summary, "run finished");
        Ok(summary)
    }

    /// Process one file end to end.
    pub async fn ingest_file(&self, path: &Path) -> Result<FileOutcome> {
        let shown = path.display().to_string();

        let Some(loader) = self.loaders.get(path) else {
            return Ok(self.skip(&shown, SkipReason::Unsupported));
        };

        let check = self.deduper.check(path).await?;
        if check.already_indexed {
            return Ok(self.skip(&shown, SkipReason::AlreadyIndexed { hash: check.hash }));
        }

        let snapshot = self.rules.snapshot();
        let settings = self.settings.clone();
        let detector = self.detector.clone();
        let owned = path.to_path_buf();
        let prepared = tokio::task::spawn_blocking(move || {
            prepare(&owned, loader.as_ref(), &snapshot, detector.as_deref(), &settings)
        })
        .await
        .map_err(|e| IngestError::load(path, format!("worker stopped: {}", e)))??;

        let (chunks, qualities, candidates) = match prepared {
            Prepared::NoText => return Ok(self.skip(&shown, SkipReason::NoText)),
            Prepared::Chunks {
                chunks,
                qualities,
                candidates,
            } => (chunks, qualities, candidates),
        };

        if let Some((count, report)) = candidates {
            self.events.report(IngestEvent::OcrCandidates {
                path: shown.clone(),
                count,
                report: report.map(|p| p.display().to_string()),
            });
        }

        if chunks.is_empty() {
            return Ok(self.skip(&shown, SkipReason::NoChunks));
        }

        let report = self.gate.assess(&qualities);
        if !report.accepted {
            self.events.report(IngestEvent::Rejected {
                path: shown,
                trash: report.trash,
                total: report.total,
            });
            return Ok(FileOutcome::Rejected(report));
        }

        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(&qualities)
            .filter(|(_, quality)| **quality != Quality::Trash)
            .map(|(chunk, quality)| ChunkRecord {
                text: chunk.trim().to_string(),
                skip_ocr_fix: *quality == Quality::HighQuality,
            })
            .collect();

        let doc = self.new_document(path, &check.hash);
        let document_id = match self.store.insert_document_with_chunks(&doc, &records).await {
            Ok(id) => id,
            Err(IngestError::Duplicate(_)) => {
                // lost a race with an identical file, or the path holds an older version
                let reason = if self.store.contains_hash(&check.hash).await? {
                    SkipReason::AlreadyIndexed { hash: check.hash }
                } else {
                    SkipReason::PathTaken
                };
                return Ok(self.skip(&shown, reason));
            }
            Err(e) => return Err(e),
        };

        let indexed: Vec<IndexedChunk> = records
            .into_iter()
            .enumerate()
            .map(|(i, record)| IndexedChunk {
                text: record.text,
                document_id,
                path: doc.path.clone(),
                title: doc.title.clone(),
                chunk_index: i as i64,
                skip_ocr_fix: record.skip_ocr_fix,
            })
            .collect();
        let accepted = indexed.len();

        let indexer = self.indexer.clone();
        let indexed_ok = tokio::task::spawn_blocking(move || indexer.index(&indexed))
            .await
            .map_err(|e| IngestError::Io(std::io::Error::other(e)))?;
        if let Err(e) = indexed_ok {
            // the document is committed; the index can be rebuilt from the store
            tracing::warn!(path = %shown, error = %e, "indexer failed");
        }

        self.events.report(IngestEvent::Ingested {
            path: shown,
            document_id,
            accepted,
            total: report.total,
        });
        Ok(FileOutcome::Ingested {
            document_id,
            accepted,
            total: report.total,
        })
    }

    /// Load and normalize one file without storing anything. `Ok(None)` when
    /// no loader handles it.
    pub async fn normalize_file(&self, path: &Path) -> Result<Option<String>> {
        let Some(loader) = self.loaders.get(path) else {
            return Ok(None);
        };
        let snapshot = self.rules.snapshot();
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || -> Result<String> {
            let raw = loader.load(&owned)?.join("\n\n");
            Ok(normalize(&raw, &snapshot))
        })
        .await
        .map_err(|e| IngestError::load(path, format!("worker stopped: {}", e)))??;
        Ok(Some(text))
    }

    fn skip(&self, path: &str, reason: SkipReason) -> FileOutcome {
        self.events.report(IngestEvent::Skipped {
            path: path.to_string(),
            reason: reason.clone(),
        });
        FileOutcome::Skipped(reason)
    }

    fn new_document(&self, path: &Path, hash: &str) -> NewDocument {
        let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        NewDocument {
            path: canonical.display().to_string(),
            title: path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            hash: hash.to_string(),
            source_type: path
                .extension()
                .map(|s| s.to_string_lossy().to_lowercase())
                .unwrap_or_default(),
            embedding_model: self.settings.embedding_model.clone(),
        }
    }
}

fn prepare(
    path: &Path,
    loader: &dyn Loader,
    rules: &RuleSnapshot,
    detector: Option<&OcrArtifactDetector>,
    settings: &PipelineSettings,
) -> Result<Prepared> {
    let raw = loader.load(path)?.join("\n\n");
    if raw.trim().is_empty() {
        return Ok(Prepared::NoText);
    }

    let cleaned = normalize(&raw, rules);
    tracing::debug!(
        path = %path.display(),
        raw = raw.len(),
        cleaned = cleaned.len(),
        rules = rules.version(),
        "normalized"
    );

    let candidates = match detector {
        Some(detector) => {
            let found = detector.detect_candidates(&cleaned, settings.similarity_threshold);
            report_candidates(path, &found, &settings.report_dir)
        }
        None => None,
    };

    let chunks = split_text(&cleaned, settings.chunk_size, settings.chunk_overlap)?;
    let qualities = chunks.iter().map(|chunk| classify(chunk)).collect();
    Ok(Prepared::Chunks {
        chunks,
        qualities,
        candidates,
    })
}

fn report_candidates(
    path: &Path,
    found: &BTreeMap<String, String>,
    report_dir: &Path,
) -> Option<(usize, Option<PathBuf>)> {
    if found.is_empty() {
        return None;
    }
    let report = match ocr::write_report(report_dir, path, found) {
        Ok(report) => Some(report),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not write OCR candidate report");
            None
        }
    };
    Some((found.len(), report))
}
