//! # Corpus CLI (`corpus`)
//!
//! ## Usage
//!
//! ```bash
//! corpus --config ./config/corpus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corpus init` | Create the database schema and the default rule file |
//! | `corpus ingest` | Ingest every supported file under `ingest.root` |
//! | `corpus detect <file>` | Print OCR correction candidates for one file |
//! | `corpus rules show` | Print the normalization rules |
//! | `corpus rules add <category> <bad> <good>` | Add or replace one rule |
//! | `corpus rules learn <report>` | Ratify an OCR candidate report as word fixes |
//! | `corpus lookup "<text>"` | Find the document a passage came from |
//! | `corpus stats` | Document and chunk counts |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `info`).

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use corpus_ingest::config::{self, Config};
use corpus_ingest::dedup::ContentAddressedDeduper;
use corpus_ingest::events::{EventSink, JsonSink, TracingSink};
use corpus_ingest::ocr::{self, OcrArtifactDetector};
use corpus_ingest::rules::{Category, RuleStore};
use corpus_ingest::store::MetadataStore;
use corpus_ingest::{db, scan, stats, Pipeline, PipelineSettings};

/// Corpus ingestion CLI: normalize, chunk, grade, and store noisy documents.
#[derive(Parser)]
#[command(
    name = "corpus",
    about = "Content-addressed ingestion and normalization for noisy document corpora",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/corpus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and, if absent, the default rule file.
    ///
    /// Idempotent. With `--rebuild` the existing database is first moved
    /// aside to a timestamped backup.
    Init {
        #[arg(long)]
        rebuild: bool,
    },

    /// Ingest every supported file under the configured root.
    ///
    /// Files whose content hash is already stored are skipped, so re-running
    /// is cheap and safe.
    Ingest {
        /// Back up the database and start from an empty one.
        #[arg(long)]
        rebuild: bool,

        /// Detect OCR correction candidates (requires `ocr.dictionary`).
        #[arg(long)]
        detect_ocr: bool,

        /// Emit one JSON event per line on stderr instead of log lines.
        #[arg(long)]
        json: bool,

        /// Override `ingest.root`.
        #[arg(long)]
        root: Option<PathBuf>,

        /// Only list what would be processed.
        #[arg(long)]
        dry_run: bool,

        /// Process at most N files.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Print OCR correction candidates for one file.
    Detect {
        file: PathBuf,

        /// Minimum similarity, overriding `ocr.similarity_threshold`.
        #[arg(long)]
        threshold: Option<f64>,

        /// Also write a candidate report to `ocr.report_dir`.
        #[arg(long)]
        report: bool,
    },

    /// Inspect or edit normalization rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Find the document whose chunks contain a passage.
    Lookup { text: String },

    /// Show document and chunk counts.
    Stats,
}

#[derive(Subcommand)]
enum RulesAction {
    /// Print the rule file.
    Show {
        /// Only one category: ligatures, punctuation, ocr_artifacts.
        #[arg(long)]
        category: Option<String>,
    },
    /// Add or replace one rule.
    Add {
        category: String,
        bad: String,
        good: String,
    },
    /// Add every pair of an OCR candidate report as an anchored word fix.
    Learn { report: PathBuf },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Init { rebuild } => {
            if rebuild {
                if let Some(backup) = db::backup_existing(&cfg.db.path)? {
                    println!("Backed up existing database to {}", backup.display());
                }
            }
            let rules = RuleStore::open(&cfg.rules.path, true)?;
            let store = MetadataStore::open(&cfg.db.path).await?;
            store.close().await;
            println!("Database initialized at {}", cfg.db.path.display());
            println!(
                "Normalization rules at {} ({} entries)",
                rules.path().display(),
                rules.snapshot().rules().len()
            );
        }
        Commands::Ingest {
            rebuild,
            detect_ocr,
            json,
            root,
            dry_run,
            limit,
        } => {
            run_ingest(cfg, rebuild, detect_ocr, json, root, dry_run, limit).await?;
        }
        Commands::Detect {
            file,
            threshold,
            report,
        } => {
            let rules = Arc::new(RuleStore::open(&cfg.rules.path, false)?);
            let store = MetadataStore::open(&cfg.db.path).await?;
            let detector = OcrArtifactDetector::from_config(&cfg.ocr, true)?
                .context("OCR detection is not available")?;
            let pipeline = Pipeline::new(PipelineSettings::from_config(&cfg), store.clone(), rules)?;
            let Some(text) = pipeline.normalize_file(&file).await? else {
                bail!("no loader for {}", file.display());
            };
            let threshold = threshold.unwrap_or(cfg.ocr.similarity_threshold);
            let candidates =
                tokio::task::spawn_blocking(move || detector.detect_candidates(&text, threshold))
                    .await?;
            for (bad, good) in &candidates {
                println!("{} -> {}", bad, good);
            }
            println!("{} candidates", candidates.len());
            if report && !candidates.is_empty() {
                let path = ocr::write_report(&cfg.ocr.report_dir, &file, &candidates)?;
                println!("report: {}", path.display());
            }
            store.close().await;
        }
        Commands::Rules { action } => match action {
            RulesAction::Show { category } => {
                let rules = RuleStore::open(&cfg.rules.path, false)?;
                let snapshot = rules.snapshot();
                match category {
                    Some(name) => {
                        let category: Category = name.parse()?;
                        println!(
                            "{}",
                            serde_json::to_string_pretty(snapshot.rules().category(category))?
                        );
                    }
                    None => println!("{}", serde_json::to_string_pretty(snapshot.rules())?),
                }
            }
            RulesAction::Add {
                category,
                bad,
                good,
            } => {
                let rules = RuleStore::open(&cfg.rules.path, false)?;
                let snapshot = rules.add_entry(category.parse()?, &bad, &good)?;
                println!("rule added (version {})", snapshot.version());
            }
            RulesAction::Learn { report } => {
                let rules = RuleStore::open(&cfg.rules.path, false)?;
                let fixes = ocr::read_report(&report)?;
                let added = rules.learn(&fixes)?;
                println!("learned {} new word fixes ({} in report)", added, fixes.len());
            }
        },
        Commands::Lookup { text } => {
            let store = MetadataStore::open(&cfg.db.path).await?;
            match store.find_by_content_substring(&text).await? {
                Some(meta) => println!("{}", serde_json::to_string_pretty(&meta)?),
                None => println!("no match"),
            }
            store.close().await;
        }
        Commands::Stats => {
            let store = MetadataStore::open(&cfg.db.path).await?;
            let collected = stats::collect_stats(&store).await?;
            stats::print_stats(&cfg.db.path, &collected);
            store.close().await;
        }
    }

    Ok(())
}

async fn run_ingest(
    mut cfg: Config,
    rebuild: bool,
    detect_ocr: bool,
    json: bool,
    root: Option<PathBuf>,
    dry_run: bool,
    limit: Option<usize>,
) -> anyhow::Result<()> {
    if let Some(root) = root {
        cfg.ingest.root = root;
    }

    let mut files = scan::scan_corpus(&cfg.ingest)?;
    if let Some(limit) = limit {
        files.truncate(limit);
    }

    if dry_run {
        println!("ingest {} (dry-run)", cfg.ingest.root.display());
        println!("  files found: {}", files.len());
        if cfg.db.path.exists() {
            let store = MetadataStore::open(&cfg.db.path).await?;
            let pending = ContentAddressedDeduper::new(store.clone()).pending(&files).await?;
            println!("  not yet indexed: {}", pending.len());
            store.close().await;
        }
        return Ok(());
    }

    if rebuild {
        if let Some(backup) = db::backup_existing(&cfg.db.path)? {
            tracing::info!(backup = %backup.display(), "starting from an empty database");
        }
    }
    let rules = Arc::new(RuleStore::open(&cfg.rules.path, rebuild)?);
    let store = MetadataStore::open(&cfg.db.path).await?;

    let events: Arc<dyn EventSink> = if json {
        Arc::new(JsonSink)
    } else {
        Arc::new(TracingSink)
    };
    let pipeline = Pipeline::from_config(&cfg, store.clone(), rules, detect_ocr)?.with_events(events);

    let summary = tokio::select! {
        summary = pipeline.run(files) => summary?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted; files already committed are kept");
            store.close().await;
            bail!("ingest interrupted");
        }
    };

    println!("ingest {}", cfg.ingest.root.display());
    println!("  discovered: {}", summary.discovered);
    println!("  ingested documents: {}", summary.ingested);
    println!("  skipped: {}", summary.skipped);
    println!("  rejected as garbage: {}", summary.rejected);
    println!("  failed: {}", summary.failed);
    println!("  chunks accepted: {}", summary.chunks_accepted);
    println!("  chunks rejected: {}", summary.chunks_rejected);
    println!("ok");

    store.close().await;
    Ok(())
}
