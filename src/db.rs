use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Open (creating if needed) the SQLite database at `db_path`.
///
/// WAL mode lets readers proceed during per-file write transactions;
/// foreign keys are enforced so deleting a document removes its chunks.
pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Move an existing database (and its WAL sidecars) aside to
/// `<stem>_<YYYY-MM-DD_HHMMSS>.db`. Returns the backup path, or `None` when
/// there was nothing to move.
pub fn backup_existing(db_path: &Path) -> Result<Option<PathBuf>> {
    if !db_path.exists() {
        return Ok(None);
    }
    let stem = db_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "metadata".to_string());
    let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S").to_string();

    let mut backup = db_path.with_file_name(format!("{}_{}.db", stem, stamp));
    let mut n = 1;
    while backup.exists() {
        backup = db_path.with_file_name(format!("{}_{}_{}.db", stem, stamp, n));
        n += 1;
    }

    std::fs::rename(db_path, &backup)?;
    for suffix in ["-wal", "-shm"] {
        let sidecar = sidecar_path(db_path, suffix);
        if sidecar.exists() {
            std::fs::rename(&sidecar, sidecar_path(&backup, suffix))?;
        }
    }
    tracing::info!(from = %db_path.display(), to = %backup.display(), "existing database backed up");
    Ok(Some(backup))
}

fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = db_path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
