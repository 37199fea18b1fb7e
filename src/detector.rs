//! Format and layout detection.
//!
//! Routing is by extension; PDFs get a content probe that samples the
//! first pages with `pdftotext` to decide whether the file is digital,
//! scanned, or a mix, so the extractor can pick the right tool chain
//! without rasterizing digital documents.

use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::error::PipelineError;
use crate::extractor::{self, DIGITAL_PAGE_MIN_CHARS};

/// How many leading pages to probe when classifying a PDF.
const SAMPLE_PAGES: usize = 10;

/// Share of digital sampled pages at or above which a PDF is digital.
const DIGITAL_RATIO: f64 = 0.9;
/// Share of digital sampled pages at or below which a PDF is scanned.
const SCANNED_RATIO: f64 = 0.1;

/// Assumed words per page when estimating Word document page counts.
const WORDS_PER_PAGE: usize = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocType {
    DigitalPdf,
    ScannedPdf,
    MixedPdf,
    Word,
    Text,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::DigitalPdf => "digital_pdf",
            DocType::ScannedPdf => "scanned_pdf",
            DocType::MixedPdf => "mixed_pdf",
            DocType::Word => "word",
            DocType::Text => "text",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub doc_type: DocType,
    pub page_count: usize,
    /// Classifier confidence in [0, 1]. Extension-only routes report 1.0.
    pub confidence: f64,
    pub needs_ocr: bool,
    pub notes: Vec<String>,
}

/// Classify a document by extension and, for PDFs, by sampling content.
pub fn detect(path: &Path) -> Result<DetectionResult, PipelineError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "pdf" => detect_pdf(path),
        "docx" | "doc" => detect_word(path),
        "txt" => detect_text(path),
        other => Err(PipelineError::UnsupportedFormat(if other.is_empty() {
            path.display().to_string()
        } else {
            format!(".{}", other)
        })),
    }
}

fn detect_pdf(path: &Path) -> Result<DetectionResult, PipelineError> {
    let page_count = pdf_page_count(path)?;
    let sample = page_count.min(SAMPLE_PAGES);

    let mut digital = 0usize;
    for page in 1..=sample {
        let raw = extractor::pdftotext_page(path, page)?;
        let non_ws = raw.chars().filter(|c| !c.is_whitespace()).count();
        if non_ws > DIGITAL_PAGE_MIN_CHARS {
            digital += 1;
        }
    }
    debug!(?path, page_count, sample, digital, "pdf probe complete");

    let (doc_type, confidence, needs_ocr, note) = classify_pdf(digital, sample);
    Ok(DetectionResult {
        doc_type,
        page_count,
        confidence,
        needs_ocr,
        notes: note.into_iter().collect(),
    })
}

/// Pure threshold classifier over the probe counts.
fn classify_pdf(digital: usize, sampled: usize) -> (DocType, f64, bool, Option<String>) {
    if sampled == 0 {
        return (
            DocType::ScannedPdf,
            0.7,
            true,
            Some("empty pages - assuming scanned".to_string()),
        );
    }

    let ratio = digital as f64 / sampled as f64;
    if ratio >= DIGITAL_RATIO {
        (DocType::DigitalPdf, ratio, false, None)
    } else if ratio <= SCANNED_RATIO {
        (DocType::ScannedPdf, 1.0 - ratio, true, None)
    } else {
        let scanned = sampled - digital;
        (
            DocType::MixedPdf,
            0.85,
            true,
            Some(format!("{}/{} sampled pages are scanned", scanned, sampled)),
        )
    }
}

fn pdf_page_count(path: &Path) -> Result<usize, PipelineError> {
    let mut cmd = Command::new("pdfinfo");
    cmd.arg(path);
    let out = extractor::run_tool(&mut cmd, "pdfinfo")?;
    let text = String::from_utf8_lossy(&out);
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("Pages:") {
            if let Ok(n) = rest.trim().parse::<usize>() {
                return Ok(n);
            }
        }
    }
    Err(PipelineError::Extraction(format!(
        "pdfinfo reported no page count for {}",
        path.display()
    )))
}

fn detect_word(path: &Path) -> Result<DetectionResult, PipelineError> {
    let mut notes = Vec::new();
    // Page count is an estimate from the word count; legacy .doc files
    // that fail to open as OOXML degrade to a single page here and fail
    // properly at extraction.
    let page_count = match extractor::extract_docx_text(path) {
        Ok(text) => estimate_pages(&text),
        Err(e) => {
            notes.push(format!("could not estimate page count: {}", e));
            1
        }
    };
    Ok(DetectionResult {
        doc_type: DocType::Word,
        page_count,
        confidence: 1.0,
        needs_ocr: false,
        notes,
    })
}

fn detect_text(_path: &Path) -> Result<DetectionResult, PipelineError> {
    // Plain text has no page concept; report one.
    Ok(DetectionResult {
        doc_type: DocType::Text,
        page_count: 1,
        confidence: 1.0,
        needs_ocr: false,
        notes: Vec::new(),
    })
}

fn estimate_pages(text: &str) -> usize {
    (text.split_whitespace().count() / WORDS_PER_PAGE).max(1)
}
