// src/extractors/fields.rs

// --- Imports ---
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::models::{DocType, Document, SourceRef, TextSegment};
use crate::extractors::candidate::{ExtractionMethod, FieldCandidate, FieldValue};
use crate::extractors::normalize::{normalize_currency, normalize_date};
use crate::extractors::patterns::{
    self, field_names, ContextScope, FieldRules, Matcher, PatternRule, ValueKind, MAX_COMPANY_NAME_CHARS,
    MOA_PRESENT_CONFIDENCE,
};
use crate::reconcile::confidence::{self, AdjustmentSet};
use crate::utils::config::Settings;

// Connector words between an anchor phrase and the value ("... is situated at:")
static ANCHOR_LEAD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[\s:\-.,]*(?:of\s+the\s+company\s*)?(?:(?:is|are|shall\s+be|will\s+be)\s+)?(?:(?:situated|situate|located)\s+)?(?:(?:at|in)\b)?[\s:\-.,]*")
        .expect("Failed to compile ANCHOR_LEAD_RE")
});

// --- Data Structures ---

/// Text lifted out of a segment by one rule, before normalization.
#[derive(Debug, Clone, PartialEq)]
struct RuleHit {
    value: String,
    raw: String,
}

/// Applies the pattern library to a document's segments.
pub struct FieldExtractor {
    processing_date: NaiveDate,
    anchor_window: usize,
}

impl FieldExtractor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            processing_date: settings.processing_date,
            anchor_window: settings.anchor_window,
        }
    }

    /// Every candidate the library yields for this document, in library
    /// then segment order. Never fails; no match means an empty result.
    pub fn extract(&self, document: &Document) -> Vec<FieldCandidate> {
        let doc_type = document.effective_type();
        tracing::info!("Extracting fields from {} as {:?}", document.doc_id, doc_type);

        let mut candidates = Vec::new();
        for field in patterns::rules_for(doc_type) {
            for segment in &document.text_segments {
                self.scan_segment(field, document, segment, &mut candidates);
            }
        }

        if doc_type == DocType::MoaAoa {
            if let Some(first) = document.text_segments.first() {
                candidates.push(FieldCandidate {
                    field_name: field_names::MOA_AOA_PRESENT.to_string(),
                    value: FieldValue::Flag(true),
                    raw_text: "MoA/AoA document detected".to_string(),
                    confidence: MOA_PRESENT_CONFIDENCE,
                    source_refs: vec![SourceRef::new(&document.doc_id, first, &first.text)],
                    extraction_method: ExtractionMethod::Regex,
                    needs_review: false,
                    issues: Vec::new(),
                });
            }
        }

        tracing::info!("Extracted {} field candidates from {}", candidates.len(), document.doc_id);
        candidates
    }

    /// The first accepted hit per scope wins within one segment.
    fn scan_segment(&self, field: &FieldRules, document: &Document, segment: &TextSegment, out: &mut Vec<FieldCandidate>) {
        let mut settled: Vec<ContextScope> = Vec::new();

        for rule in &field.rules {
            if !rule.scope.applies_to(segment.segment_type) || settled.contains(&rule.scope) {
                continue;
            }
            let Some(hit) = self.apply_rule(rule, segment) else {
                continue;
            };
            match self.build_candidate(field, rule, &document.doc_id, segment, hit) {
                Some(candidate) => {
                    tracing::debug!(
                        "Rule {} matched on page {}: {:?} ({:.2})",
                        rule.id,
                        segment.page,
                        candidate.value,
                        candidate.confidence
                    );
                    out.push(candidate);
                    settled.push(rule.scope);
                }
                None => tracing::debug!("Rule {} matched on page {} but the value was rejected", rule.id, segment.page),
            }
        }
    }

    fn apply_rule(&self, rule: &PatternRule, segment: &TextSegment) -> Option<RuleHit> {
        match &rule.matcher {
            Matcher::Pattern(re) => {
                let caps = re.captures(&segment.text)?;
                let value = caps.get(1)?.as_str().trim().to_string();
                Some(RuleHit { raw: value.clone(), value })
            }
            Matcher::Anchor(phrase) => anchor_window(&segment.text, phrase, self.anchor_window),
        }
    }

    fn build_candidate(
        &self,
        field: &FieldRules,
        rule: &PatternRule,
        doc_id: &str,
        segment: &TextSegment,
        hit: RuleHit,
    ) -> Option<FieldCandidate> {
        let mut issues = Vec::new();

        let value = match field.kind {
            ValueKind::Text => FieldValue::Text(collapse_whitespace(&hit.value)),
            ValueKind::CompanyName => {
                let name = collapse_whitespace(hit.value.trim_matches(|c: char| c == ',' || c == '"' || c.is_whitespace()));
                if name.is_empty() || name.chars().count() > MAX_COMPANY_NAME_CHARS {
                    return None;
                }
                FieldValue::Text(title_case(&name))
            }
            ValueKind::CompanyType => FieldValue::Text(title_case(&collapse_whitespace(&hit.value))),
            ValueKind::Cin => {
                let cin = hit.value.to_uppercase();
                if !patterns::is_valid_cin(&cin) {
                    issues.push(format!("CIN '{}' does not match the 21-character format", cin));
                }
                FieldValue::Text(cin)
            }
            ValueKind::Date => match normalize_date(&hit.value, self.processing_date) {
                Ok(iso) => FieldValue::Text(iso),
                Err(e) => {
                    tracing::warn!("{} candidate kept unnormalized ({}): {}", field.field_name, e.kind(), e);
                    issues.push(e.to_string());
                    FieldValue::Text(hit.value.clone())
                }
            },
            ValueKind::Amount => match normalize_currency(&hit.value) {
                Ok(amount) => FieldValue::Integer(amount),
                Err(e) => {
                    tracing::warn!("{} candidate kept unnormalized ({}): {}", field.field_name, e.kind(), e);
                    issues.push(e.to_string());
                    FieldValue::Text(hit.value.clone())
                }
            },
        };

        if matches!(&value, FieldValue::Text(s) if s.is_empty()) {
            return None;
        }

        let confidence = confidence::adjust(
            rule.base_confidence,
            &AdjustmentSet { segment: Some(segment.segment_type), ..Default::default() },
        );

        Some(FieldCandidate {
            field_name: field.field_name.to_string(),
            value,
            raw_text: hit.raw,
            confidence,
            source_refs: vec![SourceRef::new(doc_id, segment, &segment.text)],
            extraction_method: ExtractionMethod::Regex,
            needs_review: !issues.is_empty(),
            issues,
        })
    }
}

/// Rest of the anchor line plus up to `window` following lines, stopping at a blank line.
fn anchor_window(text: &str, phrase: &str, window: usize) -> Option<RuleHit> {
    let lines: Vec<&str> = text.lines().collect();
    let phrase = phrase.to_lowercase();

    for (idx, line) in lines.iter().enumerate() {
        let lower = line.to_lowercase();
        let Some(pos) = lower.find(&phrase) else {
            continue;
        };
        // Lowercasing can shift byte offsets for non-ASCII text.
        let tail_start = pos + phrase.len();
        let tail = if lower.len() == line.len() && line.is_char_boundary(tail_start) {
            &line[tail_start..]
        } else {
            ""
        };

        let mut raw_lines = vec![line.trim()];
        let mut parts = Vec::new();
        let lead = ANCHOR_LEAD_RE.replace(tail, "");
        if !lead.trim().is_empty() {
            parts.push(lead.trim().to_string());
        }
        for next in lines.iter().skip(idx + 1).take(window) {
            if next.trim().is_empty() {
                break;
            }
            raw_lines.push(next.trim());
            parts.push(next.trim().to_string());
        }

        if parts.is_empty() {
            return None;
        }
        return Some(RuleHit { value: parts.join(" "), raw: raw_lines.join("\n") });
    }
    None
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// "ACME INFRA PVT. LTD." -> "Acme Infra Pvt. Ltd."
pub fn title_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
