//! Structure-aware chunking.
//!
//! Three strategies, tried in order per document:
//! 1. structure-aware: split at `[H1]`/`[H2]`/`[H3]` heading markers left
//!    by extraction, carrying the heading into each chunk's section hint;
//! 2. paragraph: group blank-line-separated paragraphs up to the target
//!    size; a heading-looking paragraph closes the current chunk and
//!    starts a new section hint;
//! 3. token-based: fixed sliding window with overlap, cut back to the
//!    nearest sentence boundary when one is close.
//!
//! Each strategy drops pieces below the minimum size before it is judged;
//! a strategy is only accepted when at least two pieces survive, otherwise
//! the next one runs. A non-empty document always yields at least one
//! chunk.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::config::ChunkingConfig;
use crate::metadata::SectionType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkMethod {
    StructureAware,
    Paragraph,
    TokenBased,
}

impl ChunkMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkMethod::StructureAware => "structure_aware",
            ChunkMethod::Paragraph => "paragraph",
            ChunkMethod::TokenBased => "token_based",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub text: String,
    /// 0-based position within the document, assigned after filtering.
    pub index: usize,
    /// "H2: Technical Approach" style breadcrumb, empty for preamble text.
    pub section_hint: String,
    pub chunk_method: ChunkMethod,
}

static HEADING_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\[H([1-3])\]\s*(.*)$").expect("valid heading regex"));

static PARAGRAPH_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*\n").expect("valid paragraph regex"));

/// How far back from a window end to look for a sentence boundary.
const SENTENCE_SEARCH_WINDOW: usize = 200;

/// Maximum length for a paragraph to be considered a heading.
const HEADING_MAX_LEN: usize = 120;

/// Split extracted text into chunks using the best applicable strategy.
pub fn chunk(text: &str, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let text = text.trim();
    if text.is_empty() {
        return Vec::new();
    }

    let (method, pieces) = select_strategy(text, cfg);

    let mut chunks: Vec<Chunk> = pieces
        .into_iter()
        .map(|(piece, hint)| Chunk {
            text: piece.trim().to_string(),
            index: 0,
            section_hint: hint,
            chunk_method: method,
        })
        .collect();

    // A short but non-empty document still produces one chunk covering the
    // whole text, tagged token-based.
    if chunks.is_empty() {
        chunks.push(Chunk {
            text: text.to_string(),
            index: 0,
            section_hint: String::new(),
            chunk_method: ChunkMethod::TokenBased,
        });
    }

    for (i, c) in chunks.iter_mut().enumerate() {
        c.index = i;
    }
    chunks
}

fn select_strategy(text: &str, cfg: &ChunkingConfig) -> (ChunkMethod, Vec<(String, String)>) {
    if HEADING_MARKER_RE.is_match(text) {
        let pieces = keep_min_size(split_by_structure(text, cfg), cfg);
        if pieces.len() >= 2 {
            return (ChunkMethod::StructureAware, pieces);
        }
    }

    let paragraphs: Vec<&str> = PARAGRAPH_SPLIT_RE
        .split(text)
        .filter(|p| !p.trim().is_empty())
        .collect();
    if paragraphs.len() >= 2 {
        let pieces = keep_min_size(split_by_paragraphs(&paragraphs, cfg), cfg);
        if pieces.len() >= 2 {
            return (ChunkMethod::Paragraph, pieces);
        }
    }

    (
        ChunkMethod::TokenBased,
        keep_min_size(split_by_tokens(text, "", cfg), cfg),
    )
}

/// The minimum-size filter runs inside each strategy so a split whose
/// pieces are mostly too small falls through to the next strategy instead
/// of being accepted with the small pieces' text dropped.
fn keep_min_size(pieces: Vec<(String, String)>, cfg: &ChunkingConfig) -> Vec<(String, String)> {
    pieces
        .into_iter()
        .filter(|(piece, _)| piece.trim().chars().count() >= cfg.min_chunk_size)
        .collect()
}

/// One piece per heading-delimited section, preamble first. Oversized
/// sections are re-split with the sliding window, each piece keeping the
/// section's hint.
fn split_by_structure(text: &str, cfg: &ChunkingConfig) -> Vec<(String, String)> {
    struct Section {
        start: usize,
        hint: String,
    }

    let mut sections: Vec<Section> = Vec::new();
    for caps in HEADING_MARKER_RE.captures_iter(text) {
        let whole = caps.get(0).expect("match exists");
        let level = &caps[1];
        let title = caps[2].trim();
        sections.push(Section {
            start: whole.start(),
            hint: format!("H{}: {}", level, title),
        });
    }

    let mut pieces: Vec<(String, String)> = Vec::new();

    let preamble = text[..sections[0].start].trim();
    if !preamble.is_empty() {
        push_sized(preamble, "", cfg, &mut pieces);
    }

    for (i, section) in sections.iter().enumerate() {
        let end = sections
            .get(i + 1)
            .map(|next| next.start)
            .unwrap_or(text.len());
        let body = text[section.start..end].trim();
        if !body.is_empty() {
            push_sized(body, &section.hint, cfg, &mut pieces);
        }
    }

    pieces
}

fn push_sized(body: &str, hint: &str, cfg: &ChunkingConfig, out: &mut Vec<(String, String)>) {
    if body.len() > cfg.chunk_size {
        out.extend(split_by_tokens(body, hint, cfg));
    } else {
        out.push((body.to_string(), hint.to_string()));
    }
}

/// Group paragraphs into chunks of up to `chunk_size` characters. A
/// heading-looking paragraph flushes the accumulated text under the old
/// hint and opens a new section. A size-triggered flush carries its last
/// paragraph into the next chunk for continuity.
fn split_by_paragraphs(paragraphs: &[&str], cfg: &ChunkingConfig) -> Vec<(String, String)> {
    let mut pieces: Vec<(String, String)> = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_len = 0usize;
    let mut hint = String::new();

    for para in paragraphs {
        let para = para.trim();

        if looks_like_heading(para) {
            // Text before a heading belongs to the previous section, so it
            // is flushed without an overlap seed.
            if !buffer.is_empty() {
                pieces.push((buffer.join("\n\n"), hint.clone()));
                buffer.clear();
                buffer_len = 0;
            }
            hint = para.to_string();
        } else if buffer_len + para.len() > cfg.chunk_size && !buffer.is_empty() {
            pieces.push((buffer.join("\n\n"), hint.clone()));
            let carry = *buffer.last().expect("buffer is non-empty");
            buffer.clear();
            buffer.push(carry);
            buffer_len = carry.len() + 2;
        }

        buffer.push(para);
        buffer_len += para.len() + 2;
    }

    if !buffer.is_empty() {
        pieces.push((buffer.join("\n\n"), hint));
    }
    pieces
}

/// A short single-line paragraph with no sentence-final punctuation,
/// starting with an uppercase letter or digit, is treated as a heading.
fn looks_like_heading(para: &str) -> bool {
    if para.len() > HEADING_MAX_LEN || para.contains('\n') {
        return false;
    }
    if para.ends_with('.') || para.ends_with(',') || para.ends_with(';') {
        return false;
    }
    let Some(first) = para.chars().next() else {
        return false;
    };
    if !(first.is_ascii_uppercase() || first.is_ascii_digit()) {
        return false;
    }
    // Reject prose fragments that happen to be short.
    !para.chars().all(|c| !c.is_alphabetic() || c.is_lowercase())
}

/// Fixed sliding window of `chunk_size` characters advancing by
/// `chunk_size - overlap`. When a window ends mid-text, the cut moves back
/// to the last sentence boundary within the search window, if any.
fn split_by_tokens(text: &str, hint: &str, cfg: &ChunkingConfig) -> Vec<(String, String)> {
    let bytes = text.as_bytes();
    let len = text.len();
    let step = cfg.chunk_size.saturating_sub(cfg.overlap).max(1);

    let mut pieces: Vec<(String, String)> = Vec::new();
    let mut start = 0usize;

    while start < len {
        let mut end = (start + cfg.chunk_size).min(len);
        end = floor_char_boundary(text, end);

        if end < len {
            let search_from = end.saturating_sub(SENTENCE_SEARCH_WINDOW).max(start);
            if let Some(cut) = last_sentence_end(bytes, search_from, end) {
                end = cut;
            }
        }

        let piece = text[floor_char_boundary(text, start)..end].trim();
        if !piece.is_empty() {
            pieces.push((piece.to_string(), hint.to_string()));
        }

        if end >= len {
            break;
        }
        start += step;
    }

    pieces
}

/// Last position just after a `.`, `!`, or `?` followed by whitespace in
/// `bytes[from..to]`, or None.
fn last_sentence_end(bytes: &[u8], from: usize, to: usize) -> Option<usize> {
    let mut found = None;
    let mut i = from;
    while i + 1 < to {
        if matches!(bytes[i], b'.' | b'!' | b'?') && bytes[i + 1].is_ascii_whitespace() {
            found = Some(i + 1);
        }
        i += 1;
    }
    found
}

fn floor_char_boundary(text: &str, mut i: usize) -> usize {
    while i > 0 && !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Map a section hint like "H2: Work Plan and Staffing" to a section type
/// via substring patterns, first match in table order wins.
pub fn infer_section_type(hint: &str) -> SectionType {
    const PATTERNS: &[(SectionType, &[&str])] = &[
        (SectionType::ExecutiveSummary, &["executive summary"]),
        (
            SectionType::Methodology,
            &["technical approach", "methodology", "approach"],
        ),
        (SectionType::WorkPlan, &["work plan", "workplan"]),
        (
            SectionType::Team,
            &["team", "personnel", "key experts", "qualifications"],
        ),
        (
            SectionType::PastExperience,
            &["past experience", "previous experience", "similar assignments"],
        ),
        (
            SectionType::CompanyProfile,
            &["firm profile", "company profile", "about us"],
        ),
        (SectionType::Financial, &["financial", "budget", "cost"]),
        (
            SectionType::Requirements,
            &["eligibility", "mandatory", "evaluation criteria"],
        ),
        (
            SectionType::Scope,
            &["terms of reference", "scope of work"],
        ),
        (
            SectionType::Background,
            &["background", "introduction", "context"],
        ),
    ];

    let hint_lower = hint.to_lowercase();
    for (section, patterns) in PATTERNS {
        if patterns.iter().any(|p| hint_lower.contains(p)) {
            return *section;
        }
    }
    SectionType::General
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;

    fn cfg() -> ChunkingConfig {
        ChunkingConfig::default()
    }

    fn small_cfg() -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: 100,
            overlap: 20,
            min_chunk_size: 10,
        }
    }

    #[test]
    fn empty_text_yields_nothing() {
        assert!(chunk("", &cfg()).is_empty());
        assert!(chunk("   \n\n  ", &cfg()).is_empty());
    }

    #[test]
    fn short_document_yields_single_whole_chunk() {
        // Under min_chunk_size, so every strategy discards it, but the
        // document is non-empty.
        let text = "[H1] Scope\nBuild a well.\n\n[H2] Budget\nUSD 10,000.";
        let chunks = chunk(text, &cfg());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_method, ChunkMethod::TokenBased);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn structure_markers_drive_section_hints() {
        let body_a = "a".repeat(50);
        let body_b = "b".repeat(50);
        let text = format!(
            "[H1] Introduction\n{}\n\n[H2] Technical Approach\n{}",
            body_a, body_b
        );
        let chunks = chunk(&text, &small_cfg());
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chunk_method == ChunkMethod::StructureAware));
        assert_eq!(chunks[0].section_hint, "H1: Introduction");
        assert_eq!(chunks[1].section_hint, "H2: Technical Approach");
    }

    #[test]
    fn oversized_section_is_resplit_with_inherited_hint() {
        let long = "word ".repeat(100); // 500 chars, over chunk_size 100
        let text = format!("[H1] Scope of Work\n{}\n\n[H2] Team\nshort team section", long);
        let chunks = chunk(&text, &small_cfg());
        let scope_chunks: Vec<_> = chunks
            .iter()
            .filter(|c| c.section_hint == "H1: Scope of Work")
            .collect();
        assert!(scope_chunks.len() > 1);
    }

    #[test]
    fn paragraph_strategy_groups_and_tracks_headings() {
        let para = "This paragraph is long enough to count as content. ".repeat(2);
        let text = format!(
            "Technical Approach\n\n{}\n\nWork Plan\n\n{}\n\n{}",
            para, para, para
        );
        let chunks = chunk(&text, &small_cfg());
        assert!(chunks.len() >= 2);
        assert!(chunks.iter().all(|c| c.chunk_method == ChunkMethod::Paragraph));
        assert!(chunks.iter().any(|c| c.section_hint == "Work Plan"));
    }

    #[test]
    fn heading_flushes_preceding_text_with_old_hint() {
        let pre = "Submitted to the county government of Kisumu this quarter";
        let body = "We will deliver mobile outreach clinics in two subcounties.";
        let text = format!("{}.\n\nTechnical Approach\n\n{}", pre, body);
        let chunks = chunk(&text, &small_cfg());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, format!("{}.", pre));
        assert_eq!(chunks[0].section_hint, "");
        assert!(chunks[1].text.starts_with("Technical Approach"));
        assert_eq!(chunks[1].section_hint, "Technical Approach");
    }

    #[test]
    fn mostly_short_sections_fall_through_to_token() {
        // One section passes the minimum size, the other is far under it.
        // Accepting the structure split would silently drop the short
        // section, so the whole document falls through to the window.
        let short = "Our team has two members.";
        let long = "The methodology rests on participatory assessment. ".repeat(6);
        let text = format!("[H1] Team\n{}\n\n[H1] Methodology\n{}", short, long.trim());
        let chunks = chunk(&text, &cfg());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_method, ChunkMethod::TokenBased);
        assert!(chunks[0].text.contains(short));
        assert!(chunks[0].text.contains("participatory assessment"));
    }

    #[test]
    fn large_trailing_paragraph_still_seeds_next_chunk() {
        let a = "Alpha delivery narrative covers the first county. ".repeat(30);
        let b = "Beta continuation narrative covers the second county. ".repeat(30);
        let (a, b) = (a.trim().to_string(), b.trim().to_string());
        let text = format!("{}\n\n{}", a, b);
        let chunks = chunk(&text, &cfg());
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, a);
        // The seed is carried even though the paragraph is over half a chunk.
        assert!(chunks[1].text.starts_with(&a));
        assert!(chunks[1].text.ends_with(&b));
    }

    #[test]
    fn long_paragraph_document_shares_seed_across_boundaries() {
        // ~20k chars of distinct paragraphs, default sizes.
        let paragraphs: Vec<String> = (0..40)
            .map(|i| format!("Paragraph {:02}. {}", i, "Steady prose fills the page. ".repeat(17)))
            .collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunk(&text, &cfg());

        assert!(chunks.len() >= 10);
        assert!(chunks.iter().all(|c| c.chunk_method == ChunkMethod::Paragraph));
        for c in &chunks {
            assert!(c.text.len() <= cfg().chunk_size + 100, "oversized: {}", c.text.len());
        }
        // The trailing paragraph of each chunk seeds the next one.
        for pair in chunks.windows(2) {
            let last_para = pair[0].text.rsplit("\n\n").next().unwrap();
            assert!(
                pair[1].text.starts_with(last_para),
                "chunk {} does not continue from its predecessor",
                pair[1].index
            );
        }
    }

    #[test]
    fn token_strategy_overlaps_and_prefers_sentence_cuts() {
        let text = "One sentence here. Another sentence follows it. ".repeat(10);
        let text = text.trim().to_string();
        let chunks = chunk(&text, &small_cfg());
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chunk_method == ChunkMethod::TokenBased));
        // Cuts land after sentence punctuation.
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with('.'), "chunk should end at sentence: {:?}", c.text);
        }
    }

    #[test]
    fn token_strategy_is_utf8_safe() {
        let text = "é".repeat(300);
        let chunks = chunk(&text, &small_cfg());
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(c.text.chars().all(|ch| ch == 'é'));
        }
    }

    #[test]
    fn indices_are_sequential() {
        let text = "Sentence goes here. ".repeat(50);
        let chunks = chunk(&text, &small_cfg());
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
        }
    }

    #[test]
    fn heading_heuristic() {
        assert!(looks_like_heading("Technical Approach"));
        assert!(looks_like_heading("3. Work Plan"));
        assert!(!looks_like_heading("this starts lowercase"));
        assert!(!looks_like_heading("A sentence that ends with a period."));
        assert!(!looks_like_heading(&"x".repeat(130)));
    }

    #[test]
    fn section_type_inference() {
        assert_eq!(
            infer_section_type("H1: Executive Summary"),
            SectionType::ExecutiveSummary
        );
        assert_eq!(
            infer_section_type("H2: Technical Approach"),
            SectionType::Methodology
        );
        assert_eq!(infer_section_type("H2: Key Experts"), SectionType::Team);
        assert_eq!(
            infer_section_type("H3: Budget Breakdown"),
            SectionType::Financial
        );
        assert_eq!(infer_section_type("random words"), SectionType::General);
        assert_eq!(infer_section_type(""), SectionType::General);
    }
}
