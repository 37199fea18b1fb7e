//! Database statistics overview.
//!
//! A quick summary of what's stored: document and chunk counts, per-source-
//! type and per-sector breakdowns, and counts per (source type, sector)
//! pair. Used by `bidvault stats` to confirm that ingestion is landing
//! where expected.

use anyhow::Result;

use crate::config::Config;
use crate::db;
use crate::store::VectorStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    let dims = config.embedding.dims.unwrap_or(0);
    let store = VectorStore::new(pool, dims);
    let stats = store.stats().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("BidVault — Database Stats");
    println!("=========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!("  Chunks:      {}", stats.total_chunks);

    print_breakdown("By source type:", &stats.by_source_type);
    print_breakdown("By sector:", &stats.by_sector);

    if !stats.by_source_and_sector.is_empty() {
        println!();
        println!("  By source type and sector:");
        for (source_type, sector, count) in &stats.by_source_and_sector {
            println!("  {:<32} {:>8}", format!("{} / {}", source_type, sector), count);
        }
    }

    println!();
    store.pool().close().await;
    Ok(())
}

fn print_breakdown(title: &str, rows: &[(String, i64)]) {
    if rows.is_empty() {
        return;
    }
    println!();
    println!("  {}", title);
    for (value, count) in rows {
        println!("  {:<20} {:>8}", value, count);
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_formatting() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }
}
