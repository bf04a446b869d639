//! Content-addressed deduplication.
//!
//! Files are identified by the SHA-256 of their raw bytes, streamed so large
//! PDFs are never held in memory. The check against the store is advisory:
//! two identical files racing through the pipeline are settled by the
//! store's unique constraint on `hash`.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use crate::error::{IngestError, Result};
use crate::store::MetadataStore;

/// Hex-encoded SHA-256 of the file at `path`.
pub fn hash_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|e| IngestError::load(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| IngestError::load(path, e))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Result of a dedup check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupCheck {
    pub hash: String,
    pub already_indexed: bool,
}

#[derive(Clone)]
pub struct ContentAddressedDeduper {
    store: MetadataStore,
}

impl ContentAddressedDeduper {
    pub fn new(store: MetadataStore) -> Self {
        Self { store }
    }

    /// Hash `path` off the async runtime and look the hash up.
    pub async fn check(&self, path: &Path) -> Result<DedupCheck> {
        let owned: PathBuf = path.to_path_buf();
        let hash = tokio::task::spawn_blocking(move || hash_file(&owned))
            .await
            .map_err(|e| IngestError::Io(io::Error::other(e)))??;
        let already_indexed = self.store.contains_hash(&hash).await?;
        Ok(DedupCheck {
            hash,
            already_indexed,
        })
    }

    /// Files among `paths` whose content is not stored yet. Loads the known
    /// hashes once, so it suits previews over a whole corpus.
    pub async fn pending(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let known = self.store.existing_hashes().await?;
        let paths = paths.to_vec();
        tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut pending = Vec::new();
            for path in paths {
                if !known.contains(&hash_file(&path)?) {
                    pending.push(path);
                }
            }
            Ok(pending)
        })
        .await
        .map_err(|e| IngestError::Io(io::Error::other(e)))?
    }

    /// `(hash, should_process)`.
    pub async fn should_process(&self, path: &Path) -> Result<(String, bool)> {
        let check = self.check(path).await?;
        Ok((check.hash, !check.already_indexed))
    }
}
