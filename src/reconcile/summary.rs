// src/reconcile/summary.rs
use crate::document::models::truncate_chars;
use crate::extractors::candidate::{ExtractionMethod, FieldCandidate, FieldValue};
use crate::extractors::patterns::field_names;
use crate::reconcile::confidence::{self, AdjustmentSet};
use crate::reconcile::models::FieldRecord;

pub const SUMMARY_BASE_CONFIDENCE: f64 = 0.80;
const FALLBACK_SUMMARY_CHARS: usize = 200;

/// Fields a summarization collaborator may attach a summary to.
pub const SUMMARIZABLE_FIELDS: &[&str] = &[field_names::MAIN_OBJECTS, field_names::INCLUSIVENESS_POLICY];

pub fn summary_field_name(field_name: &str) -> String {
    format!("{}_summary", field_name)
}

/// Builds the `<field>_summary` candidate for a summarizable record.
///
/// A collaborator-provided summary is recorded as `llm` and takes the LLM
/// penalty when `llm_used` is set. Without one, the leading text of the
/// clause stands in. Returns `None` for unsupported fields and records
/// without a text value.
pub fn summary_candidate(source: &FieldRecord, summary: Option<&str>, llm_used: bool) -> Option<FieldCandidate> {
    if !SUMMARIZABLE_FIELDS.contains(&source.field_name.as_str()) {
        return None;
    }
    let text = source.value.as_ref().and_then(FieldValue::as_text)?;

    let (summary, method, adjustments) = match summary.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => (s.to_string(), ExtractionMethod::Llm, AdjustmentSet { llm_used, ..Default::default() }),
        None => (fallback_summary(text), ExtractionMethod::Regex, AdjustmentSet::default()),
    };
    tracing::debug!("Summary for {} via {:?}", source.field_name, method);

    Some(FieldCandidate {
        field_name: summary_field_name(&source.field_name),
        value: FieldValue::Text(summary),
        raw_text: source.raw_text.clone().unwrap_or_else(|| text.to_string()),
        confidence: confidence::adjust(SUMMARY_BASE_CONFIDENCE, &adjustments),
        source_refs: source.source_refs.clone(),
        extraction_method: method,
        needs_review: false,
        issues: Vec::new(),
    })
}

fn fallback_summary(text: &str) -> String {
    if text.chars().count() <= FALLBACK_SUMMARY_CHARS {
        text.to_string()
    } else {
        format!("{}...", truncate_chars(text, FALLBACK_SUMMARY_CHARS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn objects(text: &str) -> FieldRecord {
        let mut record = FieldRecord::new(field_names::MAIN_OBJECTS);
        record.value = Some(FieldValue::Text(text.to_string()));
        record.raw_text = Some(text.to_string());
        record
    }

    #[test]
    fn llm_summary_is_penalized() {
        let c = summary_candidate(&objects("To carry on business."), Some("Infrastructure business."), true).unwrap();
        assert_eq!(c.field_name, "main_objects_summary");
        assert_eq!(c.extraction_method, ExtractionMethod::Llm);
        assert_eq!(c.confidence, 0.75);
    }

    #[test]
    fn fallback_truncates_long_clauses() {
        let long = "x".repeat(250);
        let c = summary_candidate(&objects(&long), None, false).unwrap();
        assert_eq!(c.extraction_method, ExtractionMethod::Regex);
        assert_eq!(c.confidence, SUMMARY_BASE_CONFIDENCE);
        assert_eq!(c.value.as_text().unwrap().chars().count(), 203);
        assert!(c.value.as_text().unwrap().ends_with("..."));
    }

    #[test]
    fn only_summarizable_fields() {
        let mut record = FieldRecord::new(field_names::COMPANY_NAME);
        record.value = Some(FieldValue::Text("Acme".into()));
        assert!(summary_candidate(&record, Some("x"), true).is_none());
        assert!(summary_candidate(&FieldRecord::new(field_names::MAIN_OBJECTS), None, false).is_none());
    }
}
