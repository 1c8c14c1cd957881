use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;

/// Open the SQLite database at `path`, creating it (and its parent
/// directory) if missing.
///
/// The pool is capped at a single connection so writes never interleave;
/// batch inserts stay atomic by construction.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            crate::error::Error::Config(format!(
                "failed to create {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .map_err(sqlx::Error::from)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}
