//! # Corpus Ingest
//!
//! A content-addressed ingestion pipeline for noisy document corpora
//! (scanned PDFs, OCR output, legacy text files).
//!
//! Every file is hashed, loaded, normalized against a versioned rule set,
//! split into overlapping chunks, and scored for structural quality. Files
//! that are mostly garbage are rejected whole; the rest are stored in SQLite
//! with their accepted chunks and handed to a downstream indexer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌────────────┐   ┌──────────┐   ┌──────────┐
//! │  scan +  │──▶│  loaders  │──▶│ normalize  │──▶│ chunk +  │──▶│  SQLite  │
//! │  dedup   │   │ txt/pdf/… │   │ rules+OCR  │   │ quality  │   │ + index  │
//! └──────────┘   └───────────┘   └────────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! corpus init                         # create database and rule file
//! corpus ingest                       # ingest everything under ingest.root
//! corpus ingest --detect-ocr --json   # with OCR candidate reports, JSON events
//! corpus rules learn logs/ocr_candidates_book_2024-01-01_120000.json
//! corpus lookup "a passage copied from a chunk"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`rules`] | Versioned normalization rule store |
//! | [`mojibake`] | Repair of mis-decoded UTF-8 |
//! | [`normalize`] | Text normalization |
//! | [`dictionary`] | Word lists for OCR detection |
//! | [`ocr`] | OCR artifact candidate detection |
//! | [`chunk`] | Overlapping text chunker |
//! | [`quality`] | Chunk classification and garbage gate |
//! | [`dedup`] | Content hashing |
//! | [`loader`] | Per-extension document loaders |
//! | [`scan`] | Corpus discovery |
//! | [`db`] | Database connection and backups |
//! | [`migrate`] | Schema migrations |
//! | [`store`] | Document and chunk persistence |
//! | [`indexer`] | Downstream index hand-off |
//! | [`events`] | Structured ingestion events |
//! | [`pipeline`] | Orchestration |
//! | [`stats`] | Store statistics |

pub mod chunk;
pub mod config;
pub mod db;
pub mod dedup;
pub mod dictionary;
pub mod error;
pub mod events;
pub mod indexer;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod mojibake;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod quality;
pub mod rules;
pub mod scan;
pub mod stats;
pub mod store;

pub use error::{IngestError, Result};
pub use pipeline::{FileOutcome, Pipeline, PipelineSettings, RunSummary};
