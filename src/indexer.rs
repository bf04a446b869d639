//! Hand-off of accepted chunks to a downstream index.
//!
//! Embedding and vector storage happen outside this crate. An [`Indexer`]
//! receives each ingested document's accepted chunks, with provenance, after
//! the document has been committed to the store.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::models::IndexedChunk;

pub trait Indexer: Send + Sync {
    fn index(&self, chunks: &[IndexedChunk]) -> Result<()>;
}

/// Does nothing. Used when no index output is configured.
pub struct NullIndexer;

impl Indexer for NullIndexer {
    fn index(&self, _chunks: &[IndexedChunk]) -> Result<()> {
        Ok(())
    }
}

/// Appends chunks as JSON lines to a file.
pub struct JsonlIndexer {
    path: PathBuf,
    out: Mutex<BufWriter<File>>,
}

impl JsonlIndexer {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            out: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Indexer for JsonlIndexer {
    fn index(&self, chunks: &[IndexedChunk]) -> Result<()> {
        let mut out = self.out.lock();
        for chunk in chunks {
            serde_json::to_writer(&mut *out, chunk)?;
            out.write_all(b"\n")?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Keeps every indexed chunk in memory.
#[derive(Default)]
pub struct MemoryIndexer {
    chunks: Mutex<Vec<IndexedChunk>>,
}

impl MemoryIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunks(&self) -> Vec<IndexedChunk> {
        self.chunks.lock().clone()
    }
}

impl Indexer for MemoryIndexer {
    fn index(&self, chunks: &[IndexedChunk]) -> Result<()> {
        self.chunks.lock().extend_from_slice(chunks);
        Ok(())
    }
}
