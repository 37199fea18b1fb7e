//! Schema setup. Safe to run repeatedly.

use anyhow::Result;
use sqlx::SqlitePool;

/// Create the chunk table and its filter indexes if they do not exist.
///
/// Frequently-filtered metadata fields are denormalized into columns so
/// the search SQL can narrow candidates before similarity scoring; the
/// full metadata record lives in `metadata_json`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_chunks (
            id TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            source_type TEXT NOT NULL,
            sector TEXT NOT NULL,
            donor TEXT NOT NULL,
            section_type TEXT NOT NULL,
            year INTEGER NOT NULL,
            won INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(document_id, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    for sql in [
        "CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON document_chunks(document_id)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_source_type ON document_chunks(source_type)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_sector ON document_chunks(sector)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_donor ON document_chunks(donor)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_section_type ON document_chunks(section_type)",
        "CREATE INDEX IF NOT EXISTS idx_chunks_year ON document_chunks(year)",
    ] {
        sqlx::query(sql).execute(pool).await?;
    }

    Ok(())
}
