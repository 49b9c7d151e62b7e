// src/document/models.rs
use serde::{Deserialize, Serialize};

/// Longest snippet carried on a SourceRef.
pub const MAX_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Heading,
    Paragraph,
    Table,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocType {
    #[serde(rename = "certificate_of_incorporation", alias = "CoI")]
    CertificateOfIncorporation,
    #[serde(rename = "moa_aoa", alias = "MoA_AoA")]
    MoaAoa,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

/// One block of OCR/layout output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub page: u32,
    pub segment_type: SegmentType,
}

/// Where a value came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub doc_id: String,
    pub page: u32,
    pub segment_type: SegmentType,
    pub snippet: String,
}

impl SourceRef {
    pub fn new(doc_id: &str, segment: &TextSegment, snippet: &str) -> Self {
        Self {
            doc_id: doc_id.to_string(),
            page: segment.page,
            segment_type: segment.segment_type,
            snippet: truncate_chars(snippet, MAX_SNIPPET_CHARS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: String,
    #[serde(default)]
    pub doc_type: DocType,
    pub text_segments: Vec<TextSegment>,
}

const COI_KEYWORDS: &[&str] = &[
    "certificate of incorporation",
    "registrar of companies",
    "corporate identity number",
];

const MOA_KEYWORDS: &[&str] = &[
    "memorandum of association",
    "articles of association",
    "authorised capital",
    "authorized capital",
    "main objects",
];

impl Document {
    /// The declared type, or a keyword-scored guess when it is `Unknown`.
    pub fn effective_type(&self) -> DocType {
        match self.doc_type {
            DocType::Unknown => Self::detect_type(&self.text_segments),
            declared => declared,
        }
    }

    pub fn detect_type(segments: &[TextSegment]) -> DocType {
        let text = segments
            .iter()
            .map(|s| s.text.to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");

        let coi_score = COI_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
        let moa_score = MOA_KEYWORDS.iter().filter(|k| text.contains(*k)).count();
        tracing::trace!("Doc type scores: coi={} moa={}", coi_score, moa_score);

        if coi_score > moa_score {
            DocType::CertificateOfIncorporation
        } else if moa_score > 0 {
            DocType::MoaAoa
        } else {
            DocType::Unknown
        }
    }
}

/// Truncates to at most `max` chars without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
