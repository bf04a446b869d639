//! Error taxonomy for the ingestion core.
//!
//! Per-file errors ([`IngestError::Load`], [`IngestError::Duplicate`],
//! [`IngestError::Persistence`]) are contained by the pipeline; only
//! resource-initialization errors abort a run. See [`IngestError::is_fatal`].

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// Missing resource or invalid setting. Aborts the run.
    #[error("configuration error: {0}")]
    Config(String),

    /// A single file could not be extracted or produced no usable text.
    #[error("failed to load {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// Hash or path already present in the store.
    #[error("already ingested: {0}")]
    Duplicate(String),

    #[error("store error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// The rule file exists but cannot be used.
    #[error("normalization rules error: {0}")]
    Rules(String),

    #[error("invalid rule pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IngestError {
    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        IngestError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error should abort a whole run rather than a single file.
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Config(_) | IngestError::Rules(_))
    }

    /// Map a sqlx error, turning unique-constraint violations into
    /// [`IngestError::Duplicate`].
    pub(crate) fn from_insert(err: sqlx::Error, what: &str) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                IngestError::Duplicate(what.to_string())
            }
            _ => IngestError::Persistence(err),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
