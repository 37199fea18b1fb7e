//! The search command: embed a query, run a filtered similarity search,
//! and print the results.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::db;
use crate::embedding;
use crate::store::{SearchFilters, VectorStore};

#[allow(clippy::too_many_arguments)]
pub async fn run_search(
    config: &Config,
    query: &str,
    filters: SearchFilters,
    top_k: usize,
    min_similarity: f32,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }
    let dims = config
        .embedding
        .dims
        .ok_or_else(|| anyhow::anyhow!("embedding.dims required for search"))?;

    let provider = embedding::create_provider(&config.embedding)?;
    let query_vec = embedding::embed_query(provider.as_ref(), &config.embedding, query).await?;

    let pool = db::connect(config).await?;
    let store = VectorStore::new(pool, dims);
    let results = store.search(&query_vec, &filters, top_k, min_similarity).await?;

    if results.is_empty() {
        println!("No results.");
        store.pool().close().await;
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let meta = &result.metadata;
        println!(
            "{}. [{:.2}] {} / {} / {} ({})",
            i + 1,
            result.similarity,
            meta.source_type,
            meta.sector,
            meta.donor,
            meta.year
        );
        if meta.section_hint.is_empty() {
            println!("    section: {}", meta.section_type);
        } else {
            println!("    section: {} (\"{}\")", meta.section_type, meta.section_hint);
        }
        if !meta.file_name.is_empty() {
            println!("    file: {}", meta.file_name);
        }
        println!("    excerpt: \"{}\"", excerpt(&result.text, 240));
        println!(
            "    document: {} chunk {}",
            result.document_id, meta.chunk_index
        );
        println!();
    }

    store.pool().close().await;
    Ok(())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let flat = text.replace('\n', " ");
    let flat = flat.trim();
    if flat.chars().count() <= max_chars {
        return flat.to_string();
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_flattens_and_truncates() {
        assert_eq!(excerpt("line one\nline two", 240), "line one line two");
        let long = "x".repeat(300);
        let cut = excerpt(&long, 240);
        assert!(cut.ends_with("..."));
        assert_eq!(cut.chars().count(), 243);
    }
}
