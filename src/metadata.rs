//! Metadata schema and auto-tagging for stored chunks.
//!
//! Every chunk stored in the vector store carries a full [`DocumentMetadata`]
//! record. Required fields are enforced by [`DocumentMetadata::validate`];
//! unset classification fields are filled by [`enrich`], a deterministic,
//! table-driven keyword scorer over the document text.

use chrono::Datelike;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::error::PipelineError;

// ============ Enums ============

/// What kind of document a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Proposal,
    Rfp,
    Cv,
    Project,
    Certificate,
    Methodology,
    Financial,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    Health,
    Education,
    Infrastructure,
    Governance,
    Environment,
    Agriculture,
    Finance,
    Ict,
    Water,
    Energy,
    Humanitarian,
    #[default]
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Donor {
    WorldBank,
    Usaid,
    Afdb,
    Eu,
    Giz,
    Fcdo,
    Un,
    Gok,
    County,
    Private,
    Ngo,
    #[default]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    ExecutiveSummary,
    Methodology,
    WorkPlan,
    Team,
    PastExperience,
    CompanyProfile,
    Financial,
    Requirements,
    Scope,
    Background,
    #[default]
    General,
}

macro_rules! enum_strings {
    ($ty:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = PipelineError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok($ty::$variant),)+
                    other => Err(PipelineError::Validation(format!(
                        "unknown {} value: '{}'",
                        stringify!($ty),
                        other
                    ))),
                }
            }
        }
    };
}

enum_strings!(SourceType {
    Proposal => "proposal",
    Rfp => "rfp",
    Cv => "cv",
    Project => "project",
    Certificate => "certificate",
    Methodology => "methodology",
    Financial => "financial",
    Other => "other",
});

enum_strings!(Sector {
    Health => "health",
    Education => "education",
    Infrastructure => "infrastructure",
    Governance => "governance",
    Environment => "environment",
    Agriculture => "agriculture",
    Finance => "finance",
    Ict => "ict",
    Water => "water",
    Energy => "energy",
    Humanitarian => "humanitarian",
    General => "general",
});

enum_strings!(Donor {
    WorldBank => "world_bank",
    Usaid => "usaid",
    Afdb => "afdb",
    Eu => "eu",
    Giz => "giz",
    Fcdo => "fcdo",
    Un => "un",
    Gok => "gok",
    County => "county",
    Private => "private",
    Ngo => "ngo",
    Other => "other",
});

enum_strings!(SectionType {
    ExecutiveSummary => "executive_summary",
    Methodology => "methodology",
    WorkPlan => "work_plan",
    Team => "team",
    PastExperience => "past_experience",
    CompanyProfile => "company_profile",
    Financial => "financial",
    Requirements => "requirements",
    Scope => "scope",
    Background => "background",
    General => "general",
});

// ============ Metadata record ============

fn is_empty(s: &String) -> bool {
    s.is_empty()
}

/// Metadata attached to every stored chunk. Each chunk holds its own copy
/// of the document-level fields plus chunk-level overrides; records are
/// never shared between chunks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    // Required.
    #[serde(default)]
    pub source_type: SourceType,
    /// Year the source document was written. Must be >= 2000.
    #[serde(default)]
    pub year: i32,

    // Classification, auto-tagged when left at the sentinel default.
    #[serde(default)]
    pub sector: Sector,
    #[serde(default)]
    pub donor: Donor,
    /// Set by the chunker from each chunk's section hint.
    #[serde(default)]
    pub section_type: SectionType,

    // Document-level provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub file_name: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub client: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_language")]
    pub language: String,

    // Proposal-specific.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub won: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tender_value_usd: Option<f64>,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub bid_reference: String,

    // Chunk-level, set by the pipeline after chunking.
    #[serde(default)]
    pub chunk_index: i64,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub chunk_method: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub section_hint: String,

    // Document-library linkage, if the file came from a remote library.
    #[serde(default, skip_serializing_if = "is_empty")]
    pub library_item_id: String,
    #[serde(default, skip_serializing_if = "is_empty")]
    pub library_url: String,
}

fn default_country() -> String {
    "Kenya".to_string()
}
fn default_language() -> String {
    "en".to_string()
}

impl Default for DocumentMetadata {
    fn default() -> Self {
        Self {
            source_type: SourceType::Other,
            year: 0,
            sector: Sector::General,
            donor: Donor::Other,
            section_type: SectionType::General,
            document_id: None,
            file_name: String::new(),
            client: String::new(),
            country: default_country(),
            language: default_language(),
            won: None,
            tender_value_usd: None,
            bid_reference: String::new(),
            chunk_index: 0,
            chunk_method: String::new(),
            section_hint: String::new(),
            library_item_id: String::new(),
            library_url: String::new(),
        }
    }
}

impl DocumentMetadata {
    /// Checks required fields before storage.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.year < 2000 {
            return Err(PipelineError::Validation(
                "year is required and must be >= 2000".to_string(),
            ));
        }
        Ok(())
    }
}

// ============ Keyword tables ============

/// Keywords indicating a past bid or proposal document.
const PROPOSAL_KEYWORDS: &[&str] = &["proposal", "bid", "tender response", "bidding document"];

/// Keywords indicating an incoming tender / RFP. Checked against the raw
/// text; these phrases are also masked out before the proposal-group check
/// so "Request for Proposal" does not trip the "proposal" keyword.
const RFP_KEYWORDS: &[&str] = &[
    "rfp",
    "request for proposal",
    "invitation to tender",
    "tender notice",
];

const CV_KEYWORDS: &[&str] = &[
    "curriculum vitae",
    "resume",
    "personal profile",
    "years of experience",
];

const LEGAL_KEYWORDS: &[&str] = &["gazette", "law of kenya", "legal notice"];

const SECTOR_KEYWORDS: &[(Sector, &[&str])] = &[
    (
        Sector::Health,
        &[
            "health", "hospital", "clinic", "malaria", "hiv", "nutrition", "maternal", "medical",
            "disease",
        ],
    ),
    (
        Sector::Education,
        &[
            "education",
            "school",
            "learning",
            "literacy",
            "teacher",
            "curriculum",
            "university",
        ],
    ),
    (
        Sector::Infrastructure,
        &[
            "road",
            "bridge",
            "construction",
            "infrastructure",
            "transport",
            "highway",
            "building",
        ],
    ),
    (
        Sector::Governance,
        &[
            "governance",
            "public sector",
            "ministry",
            "government",
            "policy",
            "institutional",
            "county",
        ],
    ),
    (
        Sector::Environment,
        &[
            "environment",
            "climate",
            "conservation",
            "biodiversity",
            "forest",
            "carbon",
            "emission",
        ],
    ),
    (
        Sector::Agriculture,
        &[
            "agriculture",
            "farming",
            "crop",
            "livestock",
            "food security",
            "irrigation",
            "agri",
        ],
    ),
    (
        Sector::Water,
        &["water", "sanitation", "wash", "sewage", "borehole", "irrigation"],
    ),
    (
        Sector::Energy,
        &[
            "energy",
            "electricity",
            "solar",
            "renewable",
            "power",
            "grid",
            "generation",
        ],
    ),
    (
        Sector::Ict,
        &[
            "ict",
            "technology",
            "digital",
            "software",
            "system",
            "data",
            "information",
        ],
    ),
];

// Trailing spaces on short tokens ("wb ", "eu ") are a cheap word boundary.
const DONOR_KEYWORDS: &[(Donor, &[&str])] = &[
    (Donor::WorldBank, &["world bank", "ibrd", "ida", "wb "]),
    (
        Donor::Usaid,
        &["usaid", "u.s. agency", "united states agency"],
    ),
    (Donor::Afdb, &["african development bank", "afdb", "adb "]),
    (Donor::Eu, &["european union", "eu ", "european commission"]),
    (Donor::Giz, &["giz", "deutsche gesellschaft", "german"]),
    (
        Donor::Fcdo,
        &["fcdo", "foreign commonwealth", "dfid", "uk aid"],
    ),
    (
        Donor::Un,
        &["united nations", "undp", "unicef", "unhcr", "unfpa", "who "],
    ),
    (
        Donor::Gok,
        &[
            "government of kenya",
            "republic of kenya",
            "gok",
            "ministry of",
        ],
    ),
    (
        Donor::County,
        &[
            "county government",
            "county of",
            "nairobi county",
            "mombasa county",
        ],
    ),
];

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").expect("valid year regex"));

// ============ Auto-tagging ============

/// Infer the source type from document text. First matching keyword group
/// wins, in the order proposal, rfp, cv, legal-like.
pub fn auto_tag_source_type(text: &str) -> SourceType {
    let text_lower = text.to_lowercase();

    // Mask RFP phrases so their "proposal" substring cannot trip the
    // proposal group.
    let mut masked = text_lower.clone();
    for kw in RFP_KEYWORDS {
        if masked.contains(kw) {
            masked = masked.replace(kw, " ");
        }
    }

    if PROPOSAL_KEYWORDS.iter().any(|kw| masked.contains(kw)) {
        return SourceType::Proposal;
    }
    if RFP_KEYWORDS.iter().any(|kw| text_lower.contains(kw)) {
        return SourceType::Rfp;
    }
    if CV_KEYWORDS.iter().any(|kw| text_lower.contains(kw)) {
        return SourceType::Cv;
    }
    if LEGAL_KEYWORDS.iter().any(|kw| text_lower.contains(kw)) {
        return SourceType::Other;
    }
    SourceType::Other
}

/// Infer the sector by summed keyword occurrence counts. Highest score
/// wins; ties go to the earlier table entry; all-zero yields General.
pub fn auto_tag_sector(text: &str) -> Sector {
    let text_lower = text.to_lowercase();
    let mut best = Sector::General;
    let mut best_score = 0usize;

    for (sector, keywords) in SECTOR_KEYWORDS {
        let score: usize = keywords.iter().map(|kw| text_lower.matches(kw).count()).sum();
        if score > best_score {
            best = *sector;
            best_score = score;
        }
    }
    best
}

/// Infer the donor by first keyword match in table order.
pub fn auto_tag_donor(text: &str) -> Donor {
    let text_lower = text.to_lowercase();
    for (donor, keywords) in DONOR_KEYWORDS {
        if keywords.iter().any(|kw| text_lower.contains(kw)) {
            return *donor;
        }
    }
    Donor::Other
}

/// Find the most likely publication year in the first 5000 characters.
///
/// Candidates must fall in `[1990, current_year + 1]`. The most frequent
/// candidate wins; ties go to the one seen first. No candidate yields
/// `current_year`.
pub fn extract_year(text: &str, current_year: i32) -> i32 {
    let head: String = text.chars().take(5000).collect();

    let mut counts: HashMap<i32, usize> = HashMap::new();
    let mut order: Vec<i32> = Vec::new();

    for m in YEAR_RE.find_iter(&head) {
        let Ok(year) = m.as_str().parse::<i32>() else {
            continue;
        };
        if !(1990..=current_year + 1).contains(&year) {
            continue;
        }
        let entry = counts.entry(year).or_insert(0);
        if *entry == 0 {
            order.push(year);
        }
        *entry += 1;
    }

    let mut best = current_year;
    let mut best_count = 0usize;
    for year in order {
        let count = counts[&year];
        if count > best_count {
            best = year;
            best_count = count;
        }
    }
    best
}

/// Auto-fill classification fields that are unset or carry their sentinel
/// default, by analysing a sample of the document text. Deterministic for
/// a given `(metadata, text)` pair and keyword tables.
pub fn enrich(meta: &mut DocumentMetadata, text: &str) {
    if meta.source_type == SourceType::Other {
        meta.source_type = auto_tag_source_type(text);
    }
    if meta.year == 0 {
        meta.year = extract_year(text, chrono::Utc::now().year());
    }
    if meta.sector == Sector::General {
        meta.sector = auto_tag_sector(text);
    }
    if meta.donor == Donor::Other {
        meta.donor = auto_tag_donor(text);
    }
}
