//! Ingestion orchestration.
//!
//! One document flows through detect, extract, chunk, enrich, embed, and
//! store. A failure anywhere produces a failed [`IngestionOutcome`] for
//! that document instead of an `Err`, so folder ingestion keeps going and
//! callers get a uniform per-file report. Nothing is written for a
//! document unless all of its chunks embed and validate.

use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunker;
use crate::config::Config;
use crate::detector;
use crate::embedding;
use crate::error::PipelineError;
use crate::extractor;
use crate::metadata::{self, DocumentMetadata, SectionType};
use crate::store::{ChunkRecord, VectorStore};

const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt"];

#[derive(Debug, Clone)]
pub struct IngestionRequest {
    pub path: PathBuf,
    /// Caller-supplied metadata. Fields left at their defaults are
    /// auto-tagged from the document text.
    pub metadata: DocumentMetadata,
    /// Run detection, extraction, and chunking but skip embedding and
    /// storage.
    pub dry_run: bool,
}

/// Per-document report. `success` is false when any stage failed; the
/// failing stage's error message is in `error`.
#[derive(Debug, Clone)]
pub struct IngestionOutcome {
    pub file: PathBuf,
    pub document_id: String,
    pub success: bool,
    pub doc_type: Option<String>,
    pub page_count: usize,
    pub extraction_method: String,
    pub chunk_count: usize,
    pub chunks_stored: usize,
    pub warnings: Vec<String>,
    pub error: Option<String>,
    pub duration_ms: u128,
}

impl IngestionOutcome {
    fn failed(file: &Path, document_id: String, error: PipelineError) -> Self {
        Self {
            file: file.to_path_buf(),
            document_id,
            success: false,
            doc_type: None,
            page_count: 0,
            extraction_method: String::new(),
            chunk_count: 0,
            chunks_stored: 0,
            warnings: Vec::new(),
            error: Some(error.to_string()),
            duration_ms: 0,
        }
    }
}

pub struct Pipeline {
    config: Config,
    store: Option<VectorStore>,
}

impl Pipeline {
    pub fn new(config: Config, store: VectorStore) -> Self {
        Self {
            config,
            store: Some(store),
        }
    }

    /// A pipeline without a store; only dry-run requests will succeed.
    pub fn detached(config: Config) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Ingest one document. Never returns `Err`; failures are reported in
    /// the outcome so callers can continue with the next file.
    pub async fn ingest(&self, request: &IngestionRequest) -> IngestionOutcome {
        let started = Instant::now();
        let path = request.path.as_path();
        let document_id = request
            .metadata
            .document_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        info!(file = %path.display(), document_id, "ingesting");

        let mut outcome = match self.run_stages(path, &document_id, request).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "ingestion failed");
                IngestionOutcome::failed(path, document_id, e)
            }
        };
        outcome.duration_ms = started.elapsed().as_millis();
        outcome
    }

    async fn run_stages(
        &self,
        path: &Path,
        document_id: &str,
        request: &IngestionRequest,
    ) -> Result<IngestionOutcome, PipelineError> {
        let mut warnings = Vec::new();

        // Detect
        let detection = detector::detect(path)?;
        warnings.extend(detection.notes.iter().cloned());
        info!(
            doc_type = detection.doc_type.as_str(),
            pages = detection.page_count,
            confidence = detection.confidence,
            "detected"
        );

        // Extract
        let extraction = extractor::extract(path, &detection, &self.config)?;
        warnings.extend(extraction.warnings.iter().cloned());
        let chars = extraction.char_count();
        if chars < self.config.extraction.min_chars {
            return Err(PipelineError::ExtractionTooShort {
                chars,
                min: self.config.extraction.min_chars,
            });
        }
        info!(chars, method = %extraction.extraction_method, "extracted");

        // Chunk
        let chunks = chunker::chunk(&extraction.text, &self.config.chunking);
        if chunks.is_empty() {
            return Err(PipelineError::Extraction(
                "document produced no chunks".to_string(),
            ));
        }
        info!(chunks = chunks.len(), method = chunks[0].chunk_method.as_str(), "chunked");

        // Enrich document-level metadata, then stamp per-chunk fields.
        let mut base = request.metadata.clone();
        base.document_id = Some(document_id.to_string());
        if base.file_name.is_empty() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                base.file_name = name.to_string();
            }
        }
        // Tagging only needs the document head.
        let sample: String = extraction.text.chars().take(5000).collect();
        metadata::enrich(&mut base, &sample);

        let mut chunk_metas = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let mut meta = base.clone();
            meta.chunk_index = chunk.index as i64;
            meta.chunk_method = chunk.chunk_method.as_str().to_string();
            meta.section_hint = chunk.section_hint.clone();
            if meta.section_type == SectionType::General {
                meta.section_type = chunker::infer_section_type(&chunk.section_hint);
            }
            meta.validate()?;
            chunk_metas.push(meta);
        }

        let mut outcome = IngestionOutcome {
            file: path.to_path_buf(),
            document_id: document_id.to_string(),
            success: true,
            doc_type: Some(detection.doc_type.as_str().to_string()),
            page_count: detection.page_count,
            extraction_method: extraction.extraction_method.clone(),
            chunk_count: chunks.len(),
            chunks_stored: 0,
            warnings,
            error: None,
            duration_ms: 0,
        };

        if request.dry_run {
            return Ok(outcome);
        }

        let store = self.store.as_ref().ok_or_else(|| {
            PipelineError::Validation("pipeline has no store attached".to_string())
        })?;

        // Embed
        let provider = embedding::create_provider(&self.config.embedding)
            .map_err(|e| PipelineError::EmbeddingFailure(e.to_string()))?;
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedding::embed_texts(provider.as_ref(), &self.config.embedding, &texts)
            .await
            .map_err(|e| PipelineError::EmbeddingFailure(e.to_string()))?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::EmbeddingFailure(format!(
                "got {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        // Store
        let records: Vec<ChunkRecord> = chunks
            .iter()
            .zip(vectors)
            .zip(chunk_metas)
            .map(|((chunk, embedding), meta)| ChunkRecord {
                document_id: document_id.to_string(),
                chunk_index: chunk.index as i64,
                text: chunk.text.clone(),
                embedding,
                metadata: meta,
            })
            .collect();
        let ids = store.store_chunks_batch(&records).await?;
        outcome.chunks_stored = ids.len();
        info!(stored = ids.len(), "stored");

        Ok(outcome)
    }

    /// Ingest every supported file under `dir`, depth-first in path order.
    /// Documents are processed sequentially; one bad file does not stop
    /// the walk.
    pub async fn ingest_folder(
        &self,
        dir: &Path,
        base_metadata: &DocumentMetadata,
        dry_run: bool,
    ) -> Vec<IngestionOutcome> {
        let mut outcomes = Vec::new();
        let walker = WalkDir::new(dir).sort_by_file_name();
        for entry in walker.into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_lowercase())
                .unwrap_or_default();
            if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
                continue;
            }
            let request = IngestionRequest {
                path: path.to_path_buf(),
                metadata: DocumentMetadata {
                    document_id: None,
                    ..base_metadata.clone()
                },
                dry_run,
            };
            outcomes.push(self.ingest(&request).await);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    fn proposal_text() -> String {
        let mut text = String::from(
            "Technical Proposal for Community Health Services\n\n\
             Funded by the World Bank, 2021.\n\n",
        );
        text.push_str(&"The programme will strengthen county clinics. ".repeat(30));
        text
    }

    #[tokio::test]
    async fn dry_run_txt_succeeds_without_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "proposal.txt", &proposal_text());

        let pipeline = Pipeline::detached(Config::minimal());
        let outcome = pipeline
            .ingest(&IngestionRequest {
                path,
                metadata: DocumentMetadata::default(),
                dry_run: true,
            })
            .await;

        assert!(outcome.success, "error: {:?}", outcome.error);
        assert_eq!(outcome.doc_type.as_deref(), Some("text"));
        assert!(outcome.chunk_count >= 1);
        assert_eq!(outcome.chunks_stored, 0);
    }

    #[tokio::test]
    async fn unsupported_extension_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "slides.pptx", "not supported");

        let pipeline = Pipeline::detached(Config::minimal());
        let outcome = pipeline
            .ingest(&IngestionRequest {
                path,
                metadata: DocumentMetadata::default(),
                dry_run: true,
            })
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unsupported file type"));
    }

    #[tokio::test]
    async fn too_short_extraction_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "stub.txt", "too short");

        let pipeline = Pipeline::detached(Config::minimal());
        let outcome = pipeline
            .ingest(&IngestionRequest {
                path,
                metadata: DocumentMetadata::default(),
                dry_run: true,
            })
            .await;

        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("characters"));
    }

    #[tokio::test]
    async fn folder_walk_skips_unsupported_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir, "a.txt", &proposal_text());
        write_file(&dir, "b.txt", "too short to pass extraction");
        write_file(&dir, "ignored.csv", "x,y\n1,2");

        let pipeline = Pipeline::detached(Config::minimal());
        let outcomes = pipeline
            .ingest_folder(dir.path(), &DocumentMetadata::default(), true)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].success);
        assert!(!outcomes[1].success);
    }

    #[tokio::test]
    async fn caller_metadata_survives_enrichment() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "proposal.txt", &proposal_text());

        let pipeline = Pipeline::detached(Config::minimal());
        let outcome = pipeline
            .ingest(&IngestionRequest {
                path,
                metadata: DocumentMetadata {
                    document_id: Some("fixed-id".to_string()),
                    year: 2005,
                    ..Default::default()
                },
                dry_run: true,
            })
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.document_id, "fixed-id");
    }
}
