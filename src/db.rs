use anyhow::{bail, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Open a connection pool on the SQLite file at `path`.
///
/// With `create` set, the file and its parent directory are created when
/// missing; otherwise a missing file is an error.
pub async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    if create {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    } else if !path.exists() {
        bail!("database file not found: {}", path.display());
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
        .create_if_missing(create)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
