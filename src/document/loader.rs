// src/document/loader.rs
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::Path;

use crate::document::models::{DocType, Document, SegmentType, TextSegment};
use crate::utils::error::DocumentError;

/// Headings in a plain-text export are short and either upper-case or
/// open with a clause keyword.
const MAX_HEADING_CHARS: usize = 100;

static HEADING_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:ARTICLE|CLAUSE|SECTION|PART|SCHEDULE)\b").expect("Failed to compile HEADING_PREFIX_RE")
});

static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[ \t]*\n").expect("Failed to compile BLANK_LINE_RE")
});

/// Loads OCR output from disk.
/// `.json` files hold a serialized `Document`; anything else is treated as a
/// plain-text export and segmented with [`segments_from_text`].
pub fn load_document(path: &Path) -> Result<Document, DocumentError> {
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let document = if is_json {
        serde_json::from_str::<Document>(&content)?
    } else {
        let doc_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DocumentError::Unsupported(format!("cannot derive doc_id from {}", path.display())))?;
        let text_segments = segments_from_text(&content);
        let mut document = Document { doc_id: doc_id.to_string(), doc_type: DocType::Unknown, text_segments };
        document.doc_type = document.effective_type();
        document
    };

    tracing::info!(
        "Loaded document {} ({:?}, {} segments) from {}",
        document.doc_id,
        document.doc_type,
        document.text_segments.len(),
        path.display()
    );
    Ok(document)
}

/// Splits a plain-text export into segments.
/// Form feeds separate pages and blank lines separate segments.
pub fn segments_from_text(text: &str) -> Vec<TextSegment> {
    let mut segments = Vec::new();

    for (page_idx, page_text) in text.split('\u{c}').enumerate() {
        let page = page_idx as u32 + 1;
        let normalized = page_text.replace("\r\n", "\n");

        for block in BLANK_LINE_RE.split(&normalized) {
            let block = block.trim_matches('\n');
            if block.trim().is_empty() {
                continue;
            }
            segments.push(TextSegment {
                text: block.to_string(),
                page,
                segment_type: classify_block(block),
            });
        }
    }

    segments
}

fn classify_block(block: &str) -> SegmentType {
    let lines: Vec<&str> = block.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() >= 2 && lines.iter().all(|l| l.contains('\t')) {
        return SegmentType::Table;
    }

    let trimmed = block.trim();
    let has_letters = trimmed.chars().any(|c| c.is_alphabetic());
    let is_upper = has_letters && !trimmed.chars().any(|c| c.is_lowercase());
    if lines.len() == 1
        && trimmed.chars().count() < MAX_HEADING_CHARS
        && (is_upper || HEADING_PREFIX_RE.is_match(trimmed))
    {
        SegmentType::Heading
    } else {
        SegmentType::Paragraph
    }
}
