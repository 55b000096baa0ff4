use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema of one generation file. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Single-row manifest describing the generation
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS generation (
            id TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            fingerprint TEXT NOT NULL,
            source_path TEXT NOT NULL,
            settings TEXT NOT NULL DEFAULT '',
            chunk_count INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Embedded chunks
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            sequence INTEGER NOT NULL UNIQUE,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_entries_document ON entries(document_id, chunk_index)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
