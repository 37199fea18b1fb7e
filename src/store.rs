//! SQLite-backed vector store with metadata filtering.
//!
//! Embeddings are stored as little-endian f32 BLOBs next to the chunk
//! text. Search narrows candidates with plain SQL over the denormalized
//! metadata columns, then scores the survivors with cosine similarity in
//! Rust. Batch inserts are transactional: a failed chunk rolls back the
//! whole document.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::PipelineError;
use crate::metadata::{DocumentMetadata, Donor, SectionType, Sector, SourceType};

/// A chunk ready for storage: text, vector, and its metadata record.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub document_id: String,
    pub chunk_index: i64,
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
}

/// Conjunctive metadata filters for search. `None` means unconstrained.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub source_type: Option<SourceType>,
    pub sector: Option<Sector>,
    pub donor: Option<Donor>,
    pub section_type: Option<SectionType>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    pub won: Option<bool>,
    pub document_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub text: String,
    pub similarity: f32,
    pub metadata: DocumentMetadata,
}

/// Totals and breakdowns for the stats command.
#[derive(Debug, Clone)]
pub struct StoreStats {
    pub total_chunks: i64,
    pub total_documents: i64,
    pub by_source_type: Vec<(String, i64)>,
    pub by_sector: Vec<(String, i64)>,
    /// Chunk counts per (source_type, sector) pair.
    pub by_source_and_sector: Vec<(String, String, i64)>,
}

enum Bind {
    Text(String),
    Int(i64),
}

pub struct VectorStore {
    pool: SqlitePool,
    dims: usize,
}

impl VectorStore {
    pub fn new(pool: SqlitePool, dims: usize) -> Self {
        Self { pool, dims }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn check_dims(&self, embedding: &[f32]) -> Result<(), PipelineError> {
        if embedding.len() != self.dims {
            return Err(PipelineError::DimensionMismatch {
                expected: self.dims,
                got: embedding.len(),
            });
        }
        Ok(())
    }

    /// Insert a single chunk. Returns its generated id.
    pub async fn store_chunk(&self, record: &ChunkRecord) -> Result<String, PipelineError> {
        let ids = self.store_chunks_batch(std::slice::from_ref(record)).await?;
        ids.into_iter()
            .next()
            .ok_or_else(|| PipelineError::Validation("insert returned no id".to_string()))
    }

    /// Insert a batch of chunks in one transaction. Every record is
    /// validated up front so a bad chunk stores nothing.
    pub async fn store_chunks_batch(
        &self,
        records: &[ChunkRecord],
    ) -> Result<Vec<String>, PipelineError> {
        for record in records {
            record.metadata.validate()?;
            self.check_dims(&record.embedding)?;
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());

        for record in records {
            let id = Uuid::new_v4().to_string();
            let metadata_json = serde_json::to_string(&record.metadata)
                .map_err(|e| PipelineError::Validation(format!("metadata not serializable: {}", e)))?;

            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (id, document_id, chunk_index, text, embedding, metadata_json,
                     source_type, sector, donor, section_type, year, won, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&record.document_id)
            .bind(record.chunk_index)
            .bind(&record.text)
            .bind(vec_to_blob(&record.embedding))
            .bind(&metadata_json)
            .bind(record.metadata.source_type.as_str())
            .bind(record.metadata.sector.as_str())
            .bind(record.metadata.donor.as_str())
            .bind(record.metadata.section_type.as_str())
            .bind(record.metadata.year as i64)
            .bind(record.metadata.won.map(i64::from))
            .bind(now)
            .execute(&mut *tx)
            .await?;

            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    /// Filtered similarity search. Candidates pass the SQL filters, then
    /// are scored by cosine similarity against `query_vec`, thresholded by
    /// `min_similarity`, and returned best-first up to `top_k`.
    pub async fn search(
        &self,
        query_vec: &[f32],
        filters: &SearchFilters,
        top_k: usize,
        min_similarity: f32,
    ) -> Result<Vec<SearchResult>, PipelineError> {
        self.check_dims(query_vec)?;

        let mut sql = String::from(
            "SELECT id, document_id, text, embedding, metadata_json FROM document_chunks",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut binds: Vec<Bind> = Vec::new();

        if let Some(st) = filters.source_type {
            clauses.push("source_type = ?");
            binds.push(Bind::Text(st.as_str().to_string()));
        }
        if let Some(s) = filters.sector {
            clauses.push("sector = ?");
            binds.push(Bind::Text(s.as_str().to_string()));
        }
        if let Some(d) = filters.donor {
            clauses.push("donor = ?");
            binds.push(Bind::Text(d.as_str().to_string()));
        }
        if let Some(s) = filters.section_type {
            clauses.push("section_type = ?");
            binds.push(Bind::Text(s.as_str().to_string()));
        }
        if let Some(y) = filters.year_min {
            clauses.push("year >= ?");
            binds.push(Bind::Int(y as i64));
        }
        if let Some(y) = filters.year_max {
            clauses.push("year <= ?");
            binds.push(Bind::Int(y as i64));
        }
        if let Some(w) = filters.won {
            clauses.push("won = ?");
            binds.push(Bind::Int(i64::from(w)));
        }
        if let Some(ref doc) = filters.document_id {
            clauses.push("document_id = ?");
            binds.push(Bind::Text(doc.clone()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = match bind {
                Bind::Text(s) => query.bind(s),
                Bind::Int(i) => query.bind(i),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut results: Vec<SearchResult> = Vec::new();
        for row in &rows {
            let blob: Vec<u8> = row.get("embedding");
            let similarity = cosine_similarity(query_vec, &blob_to_vec(&blob));
            if similarity < min_similarity {
                continue;
            }
            let metadata_json: String = row.get("metadata_json");
            let metadata: DocumentMetadata = serde_json::from_str(&metadata_json)
                .map_err(|e| PipelineError::Validation(format!("stored metadata unreadable: {}", e)))?;
            results.push(SearchResult {
                chunk_id: row.get("id"),
                document_id: row.get("document_id"),
                text: row.get("text"),
                similarity,
                metadata,
            });
        }

        // Sort: similarity desc, chunk id asc for determinism.
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(top_k);
        Ok(results)
    }

    /// Remove every chunk belonging to a document. Returns the number of
    /// chunks deleted.
    pub async fn delete_by_document(&self, document_id: &str) -> Result<u64, PipelineError> {
        let result = sqlx::query("DELETE FROM document_chunks WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<StoreStats, PipelineError> {
        let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks")
            .fetch_one(&self.pool)
            .await?;
        let total_documents: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT document_id) FROM document_chunks")
                .fetch_one(&self.pool)
                .await?;

        let by_source_type = self.breakdown("source_type").await?;
        let by_sector = self.breakdown("sector").await?;

        let rows = sqlx::query(
            "SELECT source_type, sector, COUNT(*) AS n FROM document_chunks \
             GROUP BY source_type, sector ORDER BY n DESC, source_type, sector",
        )
        .fetch_all(&self.pool)
        .await?;
        let by_source_and_sector = rows
            .iter()
            .map(|row| {
                (
                    row.get::<String, _>(0),
                    row.get::<String, _>(1),
                    row.get::<i64, _>(2),
                )
            })
            .collect();

        Ok(StoreStats {
            total_chunks,
            total_documents,
            by_source_type,
            by_sector,
            by_source_and_sector,
        })
    }

    async fn breakdown(&self, column: &str) -> Result<Vec<(String, i64)>, PipelineError> {
        // Column names come from the two callers above, never user input.
        let sql = format!(
            "SELECT {col}, COUNT(*) AS n FROM document_chunks GROUP BY {col} ORDER BY n DESC, {col}",
            col = column
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>(0), row.get::<i64, _>(1)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store(dims: usize) -> VectorStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        VectorStore::new(pool, dims)
    }

    fn record(document_id: &str, index: i64, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            document_id: document_id.to_string(),
            chunk_index: index,
            text: format!("chunk {} of {}", index, document_id),
            embedding,
            metadata: DocumentMetadata {
                source_type: SourceType::Proposal,
                year: 2022,
                chunk_index: index,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn store_chunk_round_trip() {
        let store = test_store(3).await;
        let id = store
            .store_chunk(&record("doc-9", 0, vec![0.0, 1.0, 0.0]))
            .await
            .unwrap();

        let results = store
            .search(&[0.0, 1.0, 0.0], &SearchFilters::default(), 8, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, id);
        assert_eq!(results[0].document_id, "doc-9");
    }

    #[tokio::test]
    async fn round_trip_exact_match() {
        let store = test_store(3).await;
        store
            .store_chunks_batch(&[record("doc-1", 0, vec![1.0, 0.0, 0.0])])
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.0, 0.0], &SearchFilters::default(), 8, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].similarity - 1.0).abs() < 1e-6);
        assert_eq!(results[0].document_id, "doc-1");
        assert_eq!(results[0].metadata.source_type, SourceType::Proposal);
    }

    #[tokio::test]
    async fn min_similarity_excludes_orthogonal() {
        let store = test_store(3).await;
        store
            .store_chunks_batch(&[
                record("doc-1", 0, vec![1.0, 0.0, 0.0]),
                record("doc-1", 1, vec![0.0, 1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store
            .search(&[1.0, 0.0, 0.0], &SearchFilters::default(), 8, 0.5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].metadata.chunk_index, 0);
    }

    #[tokio::test]
    async fn filters_are_conjunctive() {
        let store = test_store(2).await;
        let mut health = record("doc-1", 0, vec![1.0, 0.0]);
        health.metadata.sector = Sector::Health;
        health.metadata.year = 2020;
        let mut education = record("doc-2", 0, vec![1.0, 0.0]);
        education.metadata.sector = Sector::Education;
        education.metadata.year = 2024;
        store
            .store_chunks_batch(&[health, education])
            .await
            .unwrap();

        let filters = SearchFilters {
            sector: Some(Sector::Health),
            year_min: Some(2019),
            ..Default::default()
        };
        let results = store.search(&[1.0, 0.0], &filters, 8, 0.0).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id, "doc-1");

        // Same sector but a year window that excludes it.
        let filters = SearchFilters {
            sector: Some(Sector::Health),
            year_min: Some(2021),
            ..Default::default()
        };
        let results = store.search(&[1.0, 0.0], &filters, 8, 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let store = test_store(3).await;
        let err = store
            .store_chunks_batch(&[record("doc-1", 0, vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::DimensionMismatch { expected: 3, got: 2 }
        ));

        let err = store
            .search(&[1.0], &SearchFilters::default(), 8, 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn invalid_metadata_stores_nothing() {
        let store = test_store(2).await;
        let good = record("doc-1", 0, vec![1.0, 0.0]);
        let mut bad = record("doc-1", 1, vec![0.0, 1.0]);
        bad.metadata.year = 0;

        let err = store.store_chunks_batch(&[good, bad]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 0);
    }

    #[tokio::test]
    async fn delete_by_document_reports_count() {
        let store = test_store(2).await;
        store
            .store_chunks_batch(&[
                record("doc-1", 0, vec![1.0, 0.0]),
                record("doc-1", 1, vec![0.0, 1.0]),
                record("doc-2", 0, vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_document("doc-1").await.unwrap(), 2);
        assert_eq!(store.delete_by_document("doc-1").await.unwrap(), 0);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 1);
        assert_eq!(stats.total_documents, 1);
    }

    #[tokio::test]
    async fn stats_breakdowns() {
        let store = test_store(2).await;
        let mut health_a = record("doc-1", 0, vec![1.0, 0.0]);
        health_a.metadata.sector = Sector::Health;
        let mut health_b = record("doc-1", 1, vec![1.0, 0.0]);
        health_b.metadata.sector = Sector::Health;
        let mut cv = record("doc-2", 0, vec![0.0, 1.0]);
        cv.metadata.source_type = SourceType::Cv;
        cv.metadata.sector = Sector::Education;
        store
            .store_chunks_batch(&[health_a, health_b, cv])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.by_source_type[0], ("proposal".to_string(), 2));
        assert_eq!(stats.by_source_type[1], ("cv".to_string(), 1));
        // Counts are also grouped by the (source_type, sector) pair.
        assert_eq!(
            stats.by_source_and_sector[0],
            ("proposal".to_string(), "health".to_string(), 2)
        );
        assert_eq!(
            stats.by_source_and_sector[1],
            ("cv".to_string(), "education".to_string(), 1)
        );
    }
}
