use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use corpus_ingest::config::Config;
use corpus_ingest::dictionary::WordList;
use corpus_ingest::events::{IngestEvent, MemorySink, SkipReason};
use corpus_ingest::indexer::{Indexer, MemoryIndexer};
use corpus_ingest::models::IndexedChunk;
use corpus_ingest::ocr::OcrArtifactDetector;
use corpus_ingest::rules::{Category, RuleStore};
use corpus_ingest::store::MetadataStore;
use corpus_ingest::{FileOutcome, IngestError, Pipeline, PipelineSettings};
use tempfile::TempDir;

const PROSE: &str = "The scribes of the abbey copied manuscripts by candlelight.\n\n\
    Each page was ruled by hand and the ink was mixed fresh every morning.";

struct Harness {
    tmp: TempDir,
    store: MetadataStore,
    rules: Arc<RuleStore>,
    events: Arc<MemorySink>,
    indexer: Arc<MemoryIndexer>,
    settings: PipelineSettings,
}

impl Harness {
    async fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("files")).unwrap();
        let store = MetadataStore::open(&tmp.path().join("db/metadata.db"))
            .await
            .unwrap();
        let rules = Arc::new(RuleStore::open(tmp.path().join("db/rules.json"), true).unwrap());
        let mut settings = PipelineSettings::from_config(&Config::minimal());
        settings.workers = 4;
        settings.report_dir = tmp.path().join("logs");
        Self {
            tmp,
            store,
            rules,
            events: Arc::new(MemorySink::new()),
            indexer: Arc::new(MemoryIndexer::new()),
            settings,
        }
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.settings.clone(), self.store.clone(), self.rules.clone())
            .unwrap()
            .with_events(self.events.clone())
            .with_indexer(self.indexer.clone())
    }

    fn file(&self, name: &str, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.tmp.path().join("files").join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn count<F: Fn(&IngestEvent) -> bool>(&self, pred: F) -> usize {
        self.events.events().iter().filter(|e| pred(e)).count()
    }
}

fn garbage(runs: usize) -> String {
    "@@ ## $$ %% ^^ && ** (( )) ;; ~~ ".repeat(runs)
}

#[tokio::test]
async fn ingests_clean_text() {
    let h = Harness::new().await;
    let path = h.file("abbey.txt", PROSE);

    let outcome = h.pipeline().ingest_file(&path).await.unwrap();
    let FileOutcome::Ingested { document_id, accepted, total } = outcome else {
        panic!("expected ingestion, got {:?}", outcome);
    };
    assert_eq!(accepted, 1);
    assert_eq!(total, 1);

    let doc = h.store.get_document(document_id).await.unwrap().unwrap();
    assert_eq!(doc.title, "abbey");
    assert_eq!(doc.source_type, "txt");
    assert_eq!(doc.embedding_model, "intfloat/multilingual-e5-small");

    let chunks = h.store.chunks_for(document_id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].skip_ocr_fix);
    assert!(chunks[0].content.starts_with("The scribes of the abbey"));
    assert!(!chunks[0].content.contains('\n'));
}

#[tokio::test]
async fn ligature_and_spacing_example_end_to_end() {
    let h = Harness::new().await;
    let path = h.file("example.txt", "The \u{FB01}rst line.\n\nA  double   space.");

    let FileOutcome::Ingested { document_id, accepted, total } =
        h.pipeline().ingest_file(&path).await.unwrap()
    else {
        panic!("expected ingestion");
    };
    assert_eq!((accepted, total), (1, 1));

    let chunks = h.store.chunks_for(document_id).await.unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].content, "The first line. A double space.");
    assert_eq!(chunks[0].chunk_index, 0);
    assert!(chunks[0].skip_ocr_fix);
}

#[tokio::test]
async fn indexer_failure_keeps_the_stored_document() {
    struct Unreachable;
    impl Indexer for Unreachable {
        fn index(&self, _chunks: &[IndexedChunk]) -> corpus_ingest::Result<()> {
            Err(IngestError::Io(std::io::Error::other("index offline")))
        }
    }

    let h = Harness::new().await;
    let path = h.file("abbey.txt", PROSE);
    let pipeline = h.pipeline().with_indexer(Arc::new(Unreachable));

    let outcome = pipeline.ingest_file(&path).await.unwrap();
    assert!(matches!(outcome, FileOutcome::Ingested { accepted: 1, .. }));
    assert_eq!(h.store.count_documents().await.unwrap(), 1);
    assert_eq!(h.count(|e| matches!(e, IngestEvent::Ingested { .. })), 1);
}

#[tokio::test]
async fn same_content_under_another_path_is_skipped() {
    let h = Harness::new().await;
    let a = h.file("a.txt", PROSE);
    let b = h.file("b.md", PROSE);
    let pipeline = h.pipeline();

    assert!(matches!(pipeline.ingest_file(&a).await.unwrap(), FileOutcome::Ingested { .. }));
    let second = pipeline.ingest_file(&b).await.unwrap();
    assert!(matches!(
        second,
        FileOutcome::Skipped(SkipReason::AlreadyIndexed { .. })
    ));
    assert_eq!(h.store.count_documents().await.unwrap(), 1);

    // unchanged file, second run
    let again = pipeline.ingest_file(&a).await.unwrap();
    assert!(matches!(again, FileOutcome::Skipped(SkipReason::AlreadyIndexed { .. })));
}

#[tokio::test]
async fn concurrent_duplicates_store_one_document() {
    let h = Harness::new().await;
    let paths: Vec<PathBuf> = (0..8)
        .map(|i| h.file(&format!("copy{}.txt", i), PROSE))
        .collect();

    let summary = h.pipeline().run(paths).await.unwrap();
    assert_eq!(summary.discovered, 8);
    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.skipped, 7);
    assert_eq!(summary.failed, 0);
    assert_eq!(h.store.count_documents().await.unwrap(), 1);
    assert_eq!(h.store.count_chunks().await.unwrap(), 1);
}

#[tokio::test]
async fn garbage_file_is_rejected_whole() {
    let h = Harness::new().await;
    let path = h.file("scan.txt", garbage(60));

    let outcome = h.pipeline().ingest_file(&path).await.unwrap();
    let FileOutcome::Rejected(report) = outcome else {
        panic!("expected rejection, got {:?}", outcome);
    };
    assert!(report.total > 0);
    assert_eq!(report.trash, report.total);
    assert_eq!(h.store.count_documents().await.unwrap(), 0);
    assert_eq!(h.count(|e| matches!(e, IngestEvent::Rejected { .. })), 1);
    assert!(h.indexer.chunks().is_empty());
}

#[tokio::test]
async fn trash_chunks_are_dropped_and_indices_stay_contiguous() {
    let mut h = Harness::new().await;
    h.settings.chunk_size = 120;
    h.settings.chunk_overlap = 10;
    h.settings.garbage_threshold = 0.9;
    let content = format!("{}\n\n{}\n\n{}", PROSE, garbage(12), PROSE.replace("abbey", "priory"));
    let path = h.file("mixed.txt", content);

    let outcome = h.pipeline().ingest_file(&path).await.unwrap();
    let FileOutcome::Ingested { document_id, accepted, total } = outcome else {
        panic!("expected ingestion, got {:?}", outcome);
    };
    assert!(accepted < total);

    let chunks = h.store.chunks_for(document_id).await.unwrap();
    assert_eq!(chunks.len(), accepted);
    let indices: Vec<i64> = chunks.iter().map(|c| c.chunk_index).collect();
    assert_eq!(indices, (0..accepted as i64).collect::<Vec<_>>());

    let indexed = h.indexer.chunks();
    assert_eq!(indexed.len(), accepted);
    assert!(indexed.iter().all(|c| c.document_id == document_id));
    assert_eq!(indexed.last().unwrap().chunk_index, accepted as i64 - 1);
}

#[tokio::test]
async fn unsupported_and_empty_files_are_skipped() {
    let h = Harness::new().await;
    let image = h.file("cover.png", [0u8, 1, 2, 3]);
    let empty = h.file("blank.txt", "   \n\n  ");
    let pipeline = h.pipeline();

    assert_eq!(
        pipeline.ingest_file(&image).await.unwrap(),
        FileOutcome::Skipped(SkipReason::Unsupported)
    );
    assert_eq!(
        pipeline.ingest_file(&empty).await.unwrap(),
        FileOutcome::Skipped(SkipReason::NoText)
    );
    assert_eq!(h.store.count_documents().await.unwrap(), 0);
}

#[tokio::test]
async fn broken_file_does_not_stop_the_run() {
    let h = Harness::new().await;
    let good = h.file("good.txt", PROSE);
    let bad = h.file("broken.docx", "this is not a zip archive");

    let summary = h.pipeline().run(vec![bad.clone(), good]).await.unwrap();
    assert_eq!(summary.ingested, 1);
    assert_eq!(summary.failed, 1);

    let failed: Vec<String> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            IngestEvent::Failed { path, .. } => Some(path),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![bad.display().to_string()]);
    assert_eq!(h.count(|e| matches!(e, IngestEvent::Progress { .. })), 2);
}

#[tokio::test]
async fn changed_file_at_stored_path_is_reported() {
    let h = Harness::new().await;
    let path = h.file("notes.txt", PROSE);
    let pipeline = h.pipeline();
    pipeline.ingest_file(&path).await.unwrap();

    fs::write(&path, PROSE.replace("candlelight", "lamplight")).unwrap();
    assert_eq!(
        pipeline.ingest_file(&path).await.unwrap(),
        FileOutcome::Skipped(SkipReason::PathTaken)
    );
    assert_eq!(h.store.count_documents().await.unwrap(), 1);
}

#[tokio::test]
async fn learned_rules_apply_to_later_files() {
    let h = Harness::new().await;
    h.rules
        .add_entry(Category::OcrArtifacts, r"\bscrihes\b", "scribes")
        .unwrap();
    let path = h.file("ocr.txt", PROSE.replace("scribes", "scrihes"));

    let FileOutcome::Ingested { document_id, .. } = h.pipeline().ingest_file(&path).await.unwrap() else {
        panic!("expected ingestion");
    };
    let chunks = h.store.chunks_for(document_id).await.unwrap();
    assert!(chunks[0].content.contains("The scribes of"));
}

#[tokio::test]
async fn ocr_candidates_are_reported_not_applied() {
    let h = Harness::new().await;
    let words = WordList::from_words([
        "the", "scribes", "abbey", "copied", "manuscripts", "candlelight", "each", "page",
        "ruled", "hand", "ink", "mixed", "fresh", "every", "morning",
    ]);
    let detector = OcrArtifactDetector::new(Arc::new(words), 2).unwrap();
    let version = h.rules.snapshot().version();
    let path = h.file("scan.txt", PROSE.replace("manuscripts", "manuscrlpts"));

    let outcome = h.pipeline().with_detector(detector).ingest_file(&path).await.unwrap();
    assert!(matches!(outcome, FileOutcome::Ingested { .. }));

    let reports: Vec<(usize, Option<String>)> = h
        .events
        .events()
        .into_iter()
        .filter_map(|e| match e {
            IngestEvent::OcrCandidates { count, report, .. } => Some((count, report)),
            _ => None,
        })
        .collect();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].0, 1);
    let report = Path::new(reports[0].1.as_deref().unwrap());
    let found = corpus_ingest::ocr::read_report(report).unwrap();
    assert_eq!(found["manuscrlpts"], "manuscripts");

    assert_eq!(h.rules.snapshot().version(), version);
}

#[tokio::test]
async fn stored_passage_can_be_looked_up() {
    let h = Harness::new().await;
    let path = h.file("abbey.txt", PROSE);
    h.pipeline().ingest_file(&path).await.unwrap();

    let meta = h
        .store
        .find_by_content_substring("Each page was ruled by hand and the ink was mixed fresh")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(meta.title, "abbey");
    assert!(meta.path.ends_with("abbey.txt"));
}
