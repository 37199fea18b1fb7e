//! # BidVault
//!
//! A deterministic ingestion pipeline for bid and tender documents.
//!
//! BidVault turns a folder of proposals, RFPs, CVs, and reports into a
//! searchable SQLite vector store: it detects each file's format and
//! layout, extracts text with the right tool chain (including OCR for
//! scanned PDFs), chunks the text along document structure, tags every
//! chunk with typed metadata, and serves filtered similarity search.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ Detector │──▶│ Extractor │──▶│ Chunker  │──▶│ Metadata │
//! │ pdf/docx │   │ poppler/  │   │ headings │   │ keyword  │
//! │ /txt     │   │ tesseract │   │ /tokens  │   │ tagging  │
//! └──────────┘   └───────────┘   └──────────┘   └────┬─────┘
//!                                                    │
//!                                ┌─────────┐   ┌─────▼─────┐
//!                                │  Search │◀──│  SQLite   │
//!                                │ (cosine)│   │ embeddings│
//!                                └─────────┘   └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! bidvault init                             # create database
//! bidvault ingest proposal.pdf --sector health
//! bidvault ingest-folder ./archive/2023
//! bidvault search "community health worker training" --sector health
//! bidvault stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`detector`] | Format and layout detection |
//! | [`extractor`] | Text extraction (poppler, tesseract, OOXML) |
//! | [`chunker`] | Structure-aware chunking |
//! | [`metadata`] | Metadata schema and auto-tagging |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Filtered SQLite vector store |
//! | [`pipeline`] | Per-document ingestion orchestration |
//! | [`search`] | The search command |
//! | [`stats`] | The stats command |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunker;
pub mod config;
pub mod db;
pub mod detector;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod metadata;
pub mod migrate;
pub mod pipeline;
pub mod search;
pub mod stats;
pub mod store;
