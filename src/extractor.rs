//! Text extraction for each supported document class.
//!
//! PDF handling shells out to poppler (`pdftotext`, `pdftoppm`) and
//! `tesseract` rather than linking a PDF library; the tools are treated as
//! external dependencies and their absence is reported as a configuration
//! error. Word documents are unpacked directly from the OOXML zip and
//! streamed with quick-xml. All extracted text passes through
//! [`clean_text`], which is idempotent.
//!
//! Extraction leaves structural markers in the text for the chunker:
//! `[H1]`..`[H3]` for Word heading styles and `[TABLE]`/`[/TABLE]` around
//! pipe-joined table rows. Pages are joined with a `--- PAGE BREAK ---`
//! separator line.

use regex::Regex;
use std::io::{self, Read};
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;
use tempfile::TempDir;
use tracing::debug;

use crate::config::Config;
use crate::detector::{DetectionResult, DocType};
use crate::error::PipelineError;

pub const PAGE_BREAK: &str = "\n\n--- PAGE BREAK ---\n\n";

/// A page sampled by the detector counts as digital above this many
/// non-whitespace characters. The same bar decides per-page OCR fallback
/// for mixed documents.
pub const DIGITAL_PAGE_MIN_CHARS: usize = 30;

/// OCR output below this many cleaned characters earns a per-page warning.
const OCR_MIN_CHARS: usize = 50;

#[derive(Debug, Clone)]
pub struct ExtractionResult {
    /// Full cleaned text, pages joined by [`PAGE_BREAK`] with empty pages
    /// dropped from the join.
    pub text: String,
    /// Cleaned per-page text, empty pages preserved.
    pub pages: Vec<String>,
    /// Tool chain that produced the text, e.g. "pdftotext" or
    /// "mixed (pdftotext + ocr, 3 OCR pages)".
    pub extraction_method: String,
    pub warnings: Vec<String>,
}

impl ExtractionResult {
    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

fn join_pages(pages: &[String]) -> String {
    pages
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(PAGE_BREAK)
        .trim()
        .to_string()
}

/// Extract text from `path` according to the detected document class.
pub fn extract(
    path: &Path,
    detection: &DetectionResult,
    cfg: &Config,
) -> Result<ExtractionResult, PipelineError> {
    match detection.doc_type {
        DocType::DigitalPdf => extract_pdf_digital(path, detection.page_count),
        DocType::ScannedPdf => extract_pdf_ocr(path, detection.page_count, cfg),
        DocType::MixedPdf => extract_pdf_mixed(path, detection.page_count, cfg),
        DocType::Word => {
            let text = clean_text(&extract_docx_text(path)?);
            Ok(ExtractionResult {
                pages: vec![text.clone()],
                text,
                extraction_method: "docx".to_string(),
                warnings: Vec::new(),
            })
        }
        DocType::Text => {
            let bytes = std::fs::read(path)?;
            let text = clean_text(&String::from_utf8_lossy(&bytes));
            Ok(ExtractionResult {
                pages: vec![text.clone()],
                text,
                extraction_method: "plain_text".to_string(),
                warnings: Vec::new(),
            })
        }
    }
}

// ============ Subprocess plumbing ============

pub(crate) fn run_tool(cmd: &mut Command, tool: &str) -> Result<Vec<u8>, PipelineError> {
    let output = cmd.output().map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            PipelineError::MissingDependency(tool.to_string())
        } else {
            PipelineError::Io(e)
        }
    })?;
    if !output.status.success() {
        return Err(PipelineError::Extraction(format!(
            "{} failed ({}): {}",
            tool,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Raw `pdftotext -layout` output for a single 1-based page. Layout mode
/// preserves the column whitespace the table heuristic needs.
pub(crate) fn pdftotext_page(path: &Path, page: usize) -> Result<String, PipelineError> {
    let page = page.to_string();
    let mut cmd = Command::new("pdftotext");
    cmd.args(["-layout", "-enc", "UTF-8", "-f", &page, "-l", &page])
        .arg(path)
        .arg("-");
    let out = run_tool(&mut cmd, "pdftotext")?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

fn render_pages(path: &Path, pages: usize, dpi: u32) -> Result<TempDir, PipelineError> {
    let dir = TempDir::new()?;
    let prefix = dir.path().join("page");
    let mut cmd = Command::new("pdftoppm");
    cmd.args([
        "-png",
        "-r",
        &dpi.to_string(),
        "-f",
        "1",
        "-l",
        &pages.to_string(),
    ])
    .arg(path)
    .arg(&prefix);
    run_tool(&mut cmd, "pdftoppm")?;
    Ok(dir)
}

/// pdftoppm zero-pads page numbers to the width of the page count, so try
/// the plausible widths.
fn find_page_image(dir: &Path, page: usize) -> Option<std::path::PathBuf> {
    for name in [
        format!("page-{}.png", page),
        format!("page-{:02}.png", page),
        format!("page-{:03}.png", page),
        format!("page-{:04}.png", page),
    ] {
        let candidate = dir.join(name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

fn ocr_image(image: &Path, cfg: &Config) -> Result<String, PipelineError> {
    let mut cmd = Command::new("tesseract");
    cmd.arg(image)
        .arg("stdout")
        .args(["-l", &cfg.ocr.lang, "--psm", &cfg.ocr.psm.to_string()]);
    let out = run_tool(&mut cmd, "tesseract")?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

// ============ PDF paths ============

fn extract_pdf_digital(path: &Path, pages: usize) -> Result<ExtractionResult, PipelineError> {
    let mut page_texts = Vec::with_capacity(pages);
    for page in 1..=pages.max(1) {
        let raw = pdftotext_page(path, page)?;
        page_texts.push(page_with_tables(&raw));
    }
    Ok(ExtractionResult {
        text: join_pages(&page_texts),
        pages: page_texts,
        extraction_method: "pdftotext".to_string(),
        warnings: Vec::new(),
    })
}

fn extract_pdf_ocr(
    path: &Path,
    pages: usize,
    cfg: &Config,
) -> Result<ExtractionResult, PipelineError> {
    let pages = pages.max(1);
    let dir = render_pages(path, pages, cfg.ocr.dpi)?;

    let mut warnings = Vec::new();
    let mut page_texts = Vec::with_capacity(pages);
    for page in 1..=pages {
        let text = match find_page_image(dir.path(), page) {
            Some(image) => clean_text(&ocr_image(&image, cfg)?),
            None => String::new(),
        };
        if text.chars().count() < OCR_MIN_CHARS {
            warnings.push(format!(
                "Page {}: OCR returned minimal text ({} chars)",
                page,
                text.chars().count()
            ));
        }
        debug!(page, chars = text.len(), "ocr page done");
        page_texts.push(text);
    }

    Ok(ExtractionResult {
        text: join_pages(&page_texts),
        pages: page_texts,
        extraction_method: "tesseract_ocr".to_string(),
        warnings,
    })
}

fn extract_pdf_mixed(
    path: &Path,
    pages: usize,
    cfg: &Config,
) -> Result<ExtractionResult, PipelineError> {
    let pages = pages.max(1);
    // Render everything up front; cheaper than per-page pdftoppm calls.
    let dir = render_pages(path, pages, cfg.ocr.dpi)?;

    let mut ocr_pages = 0usize;
    let mut warnings = Vec::new();
    let mut page_texts = Vec::with_capacity(pages);
    for page in 1..=pages {
        let raw = pdftotext_page(path, page)?;
        let non_ws = raw.chars().filter(|c| !c.is_whitespace()).count();
        if non_ws > DIGITAL_PAGE_MIN_CHARS {
            page_texts.push(page_with_tables(&raw));
        } else {
            ocr_pages += 1;
            let text = match find_page_image(dir.path(), page) {
                Some(image) => clean_text(&ocr_image(&image, cfg)?),
                None => {
                    warnings.push(format!("Page {}: rendered image missing, page skipped", page));
                    String::new()
                }
            };
            page_texts.push(text);
        }
    }

    if ocr_pages > 0 {
        warnings.push(format!("{} pages required OCR", ocr_pages));
    }

    Ok(ExtractionResult {
        text: join_pages(&page_texts),
        pages: page_texts,
        extraction_method: format!("mixed (pdftotext + ocr, {} OCR pages)", ocr_pages),
        warnings,
    })
}

/// Clean a raw layout-mode page and append any detected table blocks after
/// the prose. Tables must be detected before cleaning collapses the column
/// whitespace they are recognized by.
fn page_with_tables(raw: &str) -> String {
    let tables = detect_tables(raw);
    let mut text = clean_text(raw);
    for table in tables {
        text.push_str("\n\n");
        text.push_str(&table);
    }
    text
}

// ============ Table heuristic ============

static COLUMN_GAP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" {3,}").expect("valid gap regex"));

fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return false;
    }
    COLUMN_GAP_RE.find_iter(trimmed).count() >= 2
}

/// Find runs of two or more column-aligned lines in layout-mode text and
/// reformat them as pipe-separated rows inside `[TABLE]` markers.
fn detect_tables(raw: &str) -> Vec<String> {
    let lines: Vec<&str> = raw.lines().collect();
    let mut tables = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    let mut flush = |run: &mut Vec<&str>, tables: &mut Vec<String>| {
        if run.len() >= 2 {
            let rows: Vec<String> = run
                .iter()
                .map(|line| {
                    COLUMN_GAP_RE
                        .split(line.trim())
                        .map(str::trim)
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .collect();
            tables.push(format!("[TABLE]\n{}\n[/TABLE]", rows.join("\n")));
        }
        run.clear();
    };

    for line in lines {
        if is_tabular_line(line) {
            run.push(line);
        } else {
            flush(&mut run, &mut tables);
        }
    }
    flush(&mut run, &mut tables);
    tables
}

// ============ Word documents ============

/// Pull paragraph text out of a .docx, turning Heading1..Heading3 styles
/// into `[H1]`..`[H3]` markers and tables into `[TABLE]` blocks, in
/// document order.
pub(crate) fn extract_docx_text(path: &Path) -> Result<String, PipelineError> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PipelineError::Extraction(format!("not a valid .docx archive: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| PipelineError::Extraction(format!("missing word/document.xml: {}", e)))?
        .read_to_string(&mut xml)?;

    parse_docx_xml(&xml)
}

fn parse_docx_xml(xml: &str) -> Result<String, PipelineError> {
    use quick_xml::events::Event;

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut para = String::new();
    let mut style: Option<String> = None;

    let mut table_depth = 0usize;
    let mut rows: Vec<String> = Vec::new();
    let mut cells: Vec<String> = Vec::new();
    let mut cell = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| PipelineError::Extraction(format!("malformed document.xml: {}", e)))?;
        match event {
            Event::Start(ref e) => match e.name().as_ref() {
                b"w:p" => {
                    para.clear();
                    style = None;
                }
                b"w:tbl" => {
                    table_depth += 1;
                    if table_depth == 1 {
                        rows.clear();
                    }
                }
                b"w:tr" if table_depth == 1 => cells.clear(),
                b"w:tc" if table_depth == 1 => cell.clear(),
                _ => {}
            },
            Event::Empty(ref e) => match e.name().as_ref() {
                b"w:pStyle" => {
                    if let Ok(Some(attr)) = e.try_get_attribute("w:val") {
                        style = Some(String::from_utf8_lossy(&attr.value).into_owned());
                    }
                }
                b"w:tab" => {
                    if table_depth > 0 {
                        cell.push(' ');
                    } else {
                        para.push(' ');
                    }
                }
                b"w:br" => {
                    if table_depth == 0 {
                        para.push('\n');
                    }
                }
                _ => {}
            },
            Event::Text(t) => {
                let text = t
                    .unescape()
                    .map_err(|e| PipelineError::Extraction(format!("bad text node: {}", e)))?;
                if table_depth > 0 {
                    cell.push_str(&text);
                } else {
                    para.push_str(&text);
                }
            }
            Event::End(ref e) => match e.name().as_ref() {
                b"w:p" => {
                    if table_depth > 0 {
                        cell.push(' ');
                        continue;
                    }
                    let text = para.trim();
                    if !text.is_empty() {
                        match heading_level(style.as_deref()) {
                            Some(level) => {
                                out.push_str(&format!("\n[H{}] {}\n", level, text));
                            }
                            None => {
                                out.push_str(text);
                                out.push_str("\n\n");
                            }
                        }
                    }
                }
                b"w:tc" if table_depth == 1 => {
                    cells.push(cell.trim().to_string());
                }
                b"w:tr" if table_depth == 1 => {
                    if cells.iter().any(|c| !c.is_empty()) {
                        rows.push(cells.join(" | "));
                    }
                }
                b"w:tbl" => {
                    table_depth = table_depth.saturating_sub(1);
                    if table_depth == 0 && !rows.is_empty() {
                        out.push_str(&format!("\n[TABLE]\n{}\n[/TABLE]\n\n", rows.join("\n")));
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

/// "Heading1", "heading 2" etc. map to marker levels 1..3.
fn heading_level(style: Option<&str>) -> Option<u8> {
    let style = style?;
    let lower = style.to_lowercase();
    let rest = lower.strip_prefix("heading")?.trim();
    match rest {
        "1" => Some(1),
        "2" => Some(2),
        "3" => Some(3),
        _ => None,
    }
}

// ============ Text cleanup ============

static PAGE_BOILERPLATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?mi)^[ \t]*page[ \t]+\d+([ \t]+of[ \t]+\d+)?[ \t]*$").expect("valid regex")
});
static RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_\-=]{5,}").expect("valid regex"));
static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static HORIZ_WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{3,}").expect("valid regex"));

/// Normalize extracted text: strip nulls and CR, drop "Page N of M"
/// boilerplate lines, collapse horizontal rules, runs of blank lines, and
/// runs of horizontal whitespace. Applying it twice changes nothing.
pub fn clean_text(text: &str) -> String {
    let text = text.replace('\0', "");
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = PAGE_BOILERPLATE_RE.replace_all(&text, "");
    let text = RULE_RE.replace_all(&text, " ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");
    let text = HORIZ_WS_RE.replace_all(&text, "  ");
    text.trim().to_string()
}
