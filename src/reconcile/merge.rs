// src/reconcile/merge.rs
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};

use crate::document::models::SourceRef;
use crate::extractors::candidate::FieldCandidate;
use crate::reconcile::confidence::{self, AdjustmentSet};
use crate::reconcile::models::{Evidence, FieldRecord, Project};
use crate::reconcile::review::{self, ReviewEvent};
use crate::reconcile::validation::Validator;
use crate::utils::config::Settings;

/// Evidence sharing one normalized value.
struct ValueGroup<'a> {
    members: Vec<&'a Evidence>,
}

impl<'a> ValueGroup<'a> {
    fn max_confidence(&self) -> f64 {
        self.members.iter().map(|e| e.confidence).fold(0.0, f64::max)
    }

    fn latest_order(&self) -> usize {
        self.members.iter().map(|e| e.order).max().unwrap_or(0)
    }

    /// Highest confidence, then latest source.
    fn representative(&self) -> Option<&'a Evidence> {
        self.members.iter().copied().max_by(|a, b| rank(a.confidence, a.order, b.confidence, b.order))
    }

    fn distinct_sources(&self) -> usize {
        self.members.iter().filter_map(|e| e.doc_id()).collect::<HashSet<_>>().len()
    }
}

fn rank(conf_a: f64, order_a: usize, conf_b: f64, order_b: usize) -> Ordering {
    conf_a.partial_cmp(&conf_b).unwrap_or(Ordering::Equal).then(order_a.cmp(&order_b))
}

/// Owns canonical records: merges candidates into a project and applies
/// human decisions (see `review`).
#[derive(Debug, Clone)]
pub struct Reconciler {
    review_threshold: f64,
    validator: Validator,
}

impl Reconciler {
    pub fn new(settings: &Settings) -> Self {
        Self { review_threshold: settings.review_threshold, validator: Validator::new(settings) }
    }

    /// Folds new candidates into the project. Re-merging candidates that are
    /// already present leaves every record unchanged.
    pub fn merge(&self, mut project: Project, candidates: &[FieldCandidate]) -> Project {
        let mut touched = BTreeSet::new();

        for candidate in candidates {
            let order = match candidate.doc_id() {
                Some(doc_id) => project.register_document(doc_id),
                None => project.documents.len(),
            };
            let incoming = Evidence::from_candidate(candidate, order);
            let record = project
                .fields
                .entry(candidate.field_name.clone())
                .or_insert_with(|| FieldRecord::new(&candidate.field_name));

            match record.evidence.iter_mut().find(|e| e.same_observation(&incoming)) {
                Some(existing) => {
                    if incoming.confidence > existing.confidence {
                        existing.confidence = incoming.confidence;
                    }
                }
                None => record.evidence.push(incoming),
            }
            touched.insert(candidate.field_name.clone());
        }

        for field_name in &touched {
            if let Some(record) = project.fields.get_mut(field_name) {
                self.settle(record, None);
            }
        }

        tracing::info!(
            "Merged {} candidates into {} ({} fields touched, {} flagged)",
            candidates.len(),
            project.project_id,
            touched.len(),
            project.fields.values().filter(|r| r.needs_review).count()
        );
        project
    }

    /// Recomputes the canonical value from evidence, validates it and runs
    /// the flagger, applying `event` first when a human acted.
    pub(crate) fn settle(&self, record: &mut FieldRecord, event: Option<ReviewEvent>) {
        promote(record);
        record.warnings = self.validator.check(record);
        for warning in &record.warnings {
            tracing::warn!("{}: {}", warning.field_name, warning.message);
        }
        if let Some(event) = event {
            let state = std::mem::take(&mut record.review_state);
            record.review_state = state.transition(event);
        }
        review::evaluate(record, self.review_threshold);
        if record.has_conflict() {
            tracing::warn!(
                "Conflict on {}: {} distinct values, keeping {:?}",
                record.field_name,
                record.conflicting_values().len(),
                record.value
            );
        }
    }
}

/// Picks the canonical value: group promotable evidence by normalized value,
/// take the group with the best candidate (ties go to the latest document),
/// and score it with one corroboration bonus per extra distinct document.
fn promote(record: &mut FieldRecord) {
    let mut refs: Vec<SourceRef> = Vec::new();
    for source in record.evidence.iter().flat_map(|e| e.source_refs.iter()) {
        if !refs.contains(source) {
            refs.push(source.clone());
        }
    }
    record.source_refs = refs;

    let (value, confidence, raw_text, method, issues) = {
        let mut groups: Vec<(String, ValueGroup)> = Vec::new();
        for evidence in record.promotable_evidence() {
            match groups.iter_mut().find(|(key, _)| *key == evidence.normalized) {
                Some((_, group)) => group.members.push(evidence),
                None => groups.push((evidence.normalized.clone(), ValueGroup { members: vec![evidence] })),
            }
        }

        let winner = groups
            .iter()
            .map(|(_, group)| group)
            .max_by(|a, b| rank(a.max_confidence(), a.latest_order(), b.max_confidence(), b.latest_order()));

        match winner.and_then(|g| g.representative().map(|r| (g, r))) {
            Some((group, rep)) => {
                let extra_source_count = group.distinct_sources().saturating_sub(1);
                let confidence =
                    confidence::adjust(group.max_confidence(), &AdjustmentSet { extra_source_count, ..Default::default() });
                (Some(rep.value.clone()), confidence, Some(rep.raw_text.clone()), rep.method, rep.issues.clone())
            }
            None => {
                // Nothing promotable: surface the strongest rejected candidate's score.
                let best = record
                    .active_evidence()
                    .max_by(|a, b| rank(a.confidence, a.order, b.confidence, b.order));
                match best {
                    Some(e) => (None, confidence::clamp(e.confidence), Some(e.raw_text.clone()), e.method, e.issues.clone()),
                    None => (None, 0.0, None, record.extraction_method, Vec::new()),
                }
            }
        }
    };

    record.value = value;
    record.confidence = confidence;
    record.raw_text = raw_text;
    record.extraction_method = method;
    record.issues = issues;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::models::SegmentType;
    use crate::extractors::candidate::{ExtractionMethod, FieldValue};
    use crate::extractors::patterns::field_names;
    use crate::reconcile::review::{FlagReason, ReviewState};
    use chrono::NaiveDate;

    fn reconciler() -> Reconciler {
        Reconciler::new(&Settings::default().with_processing_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()))
    }

    fn candidate(field: &str, value: &str, confidence: f64, doc_id: &str) -> FieldCandidate {
        FieldCandidate {
            field_name: field.to_string(),
            value: FieldValue::Text(value.to_string()),
            raw_text: value.to_uppercase(),
            confidence,
            source_refs: vec![SourceRef {
                doc_id: doc_id.to_string(),
                page: 1,
                segment_type: SegmentType::Paragraph,
                snippet: value.to_string(),
            }],
            extraction_method: ExtractionMethod::Regex,
            needs_review: false,
            issues: Vec::new(),
        }
    }

    #[test]
    fn conflicting_names_keep_both_sources() {
        let candidates = vec![
            candidate(field_names::COMPANY_NAME, "Acme Pvt Ltd", 0.90, "doc-a"),
            candidate(field_names::COMPANY_NAME, "Acme Private Limited", 0.85, "doc-b"),
        ];
        let project = reconciler().merge(Project::new("p"), &candidates);
        let record = &project.fields[field_names::COMPANY_NAME];

        assert_eq!(record.value, Some(FieldValue::Text("Acme Pvt Ltd".into())));
        assert!(record.needs_review);
        assert!(record.has_conflict());
        assert_eq!(record.source_refs.len(), 2);
        match &record.review_state {
            ReviewState::Flagged { reasons } => assert!(reasons.contains(&FlagReason::MergeConflict)),
            other => panic!("expected flagged, got {:?}", other),
        }
    }

    #[test]
    fn agreement_across_documents_corroborates() {
        let candidates = vec![
            candidate(field_names::COMPANY_TYPE, "Private Limited", 0.85, "doc-a"),
            candidate(field_names::COMPANY_TYPE, "PRIVATE LIMITED", 0.80, "doc-b"),
            candidate(field_names::COMPANY_TYPE, "private limited.", 0.80, "doc-c"),
        ];
        let project = reconciler().merge(Project::new("p"), &candidates);
        let record = &project.fields[field_names::COMPANY_TYPE];
        assert_eq!(record.confidence, 0.95);
        assert!(!record.needs_review);
        assert_eq!(record.review_state, ReviewState::AutoAccepted);
        assert_eq!(record.value, Some(FieldValue::Text("Private Limited".into())));
    }

    #[test]
    fn same_document_matches_do_not_corroborate() {
        let candidates = vec![
            candidate(field_names::COMPANY_TYPE, "Private Limited", 0.85, "doc-a"),
            candidate(field_names::COMPANY_TYPE, "Private Limited", 0.80, "doc-a"),
        ];
        let project = reconciler().merge(Project::new("p"), &candidates);
        assert_eq!(project.fields[field_names::COMPANY_TYPE].confidence, 0.85);
    }

    #[test]
    fn tie_goes_to_latest_document() {
        let first = reconciler().merge(
            Project::new("p"),
            &[candidate(field_names::REGISTERED_OFFICE_ADDRESS, "12 MG Road", 0.80, "doc-a")],
        );
        let second =
            reconciler().merge(first, &[candidate(field_names::REGISTERED_OFFICE_ADDRESS, "14 MG Road", 0.80, "doc-b")]);
        let record = &second.fields[field_names::REGISTERED_OFFICE_ADDRESS];
        assert_eq!(record.value, Some(FieldValue::Text("14 MG Road".into())));
        assert_eq!(second.documents, vec!["doc-a", "doc-b"]);
    }

    #[test]
    fn merge_is_idempotent() {
        let candidates = vec![
            candidate(field_names::COMPANY_NAME, "Acme Pvt Ltd", 0.90, "doc-a"),
            candidate(field_names::COMPANY_NAME, "Acme Private Limited", 0.85, "doc-b"),
            candidate(field_names::COMPANY_TYPE, "Private Limited", 0.85, "doc-a"),
        ];
        let once = reconciler().merge(Project::new("p"), &candidates);
        let twice = reconciler().merge(once.clone(), &candidates);
        assert_eq!(once, twice);
    }

    #[test]
    fn malformed_cin_is_never_promoted() {
        let candidates = vec![
            candidate(field_names::CIN, "U72900KA2020PTC12345", 0.40, "doc-a"),
            candidate(field_names::CIN, "U72900KA2020PTC123456", 0.95, "doc-b"),
        ];
        let project = reconciler().merge(Project::new("p"), &candidates[..1]);
        let record = &project.fields[field_names::CIN];
        assert_eq!(record.value, None);
        assert!(record.needs_review);
        assert_eq!(record.evidence.len(), 1);

        let project = reconciler().merge(project, &candidates[1..]);
        let record = &project.fields[field_names::CIN];
        assert_eq!(record.value, Some(FieldValue::Text("U72900KA2020PTC123456".into())));
        assert!(!record.has_conflict());
        assert_eq!(record.evidence.len(), 2);
    }

    #[test]
    fn valid_cin_is_auto_accepted() {
        let project =
            reconciler().merge(Project::new("p"), &[candidate(field_names::CIN, "L17110MH1973PLC019786", 0.95, "doc-a")]);
        let record = &project.fields[field_names::CIN];
        assert!(record.confidence >= 0.95);
        assert!(!record.needs_review);
    }

    #[test]
    fn low_confidence_is_flagged_without_conflict_marker() {
        let project = reconciler().merge(
            Project::new("p"),
            &[candidate(field_names::REGISTERED_OFFICE_ADDRESS, "12 MG Road", 0.80, "doc-a")],
        );
        let record = &project.fields[field_names::REGISTERED_OFFICE_ADDRESS];
        assert_eq!(record.review_state, ReviewState::Flagged { reasons: vec![FlagReason::LowConfidence] });
    }

    #[test]
    fn later_conflict_reopens_auto_accepted() {
        let project =
            reconciler().merge(Project::new("p"), &[candidate(field_names::COMPANY_TYPE, "Private Limited", 0.90, "doc-a")]);
        assert_eq!(project.fields[field_names::COMPANY_TYPE].review_state, ReviewState::AutoAccepted);

        let project =
            reconciler().merge(project, &[candidate(field_names::COMPANY_TYPE, "Public Limited", 0.85, "doc-b")]);
        let record = &project.fields[field_names::COMPANY_TYPE];
        assert!(record.review_state.is_flagged());
        assert!(record.needs_review);
    }

    #[test]
    fn human_edit_supersedes_and_survives_remerge() {
        let r = reconciler();
        let candidates = vec![
            candidate(field_names::COMPANY_NAME, "Acme Pvt Ltd", 0.90, "doc-a"),
            candidate(field_names::COMPANY_NAME, "Acme Private Limited", 0.85, "doc-b"),
        ];
        let merged = r.merge(Project::new("p"), &candidates);
        let edited =
            r.apply_human_edit(merged, field_names::COMPANY_NAME, FieldValue::Text("Acme Private Limited".into()));
        let record = &edited.fields[field_names::COMPANY_NAME];
        assert_eq!(record.confidence, 1.0);
        assert_eq!(record.review_state, ReviewState::Reviewed);
        assert!(!record.needs_review);
        assert_eq!(record.source_refs.len(), 2);
        assert_eq!(record.extraction_method, ExtractionMethod::Manual);

        let remerged = r.merge(edited.clone(), &candidates);
        assert_eq!(remerged, edited);
    }

    #[test]
    fn human_edit_adds_bonus_to_existing_value() {
        let r = reconciler();
        let merged =
            r.merge(Project::new("p"), &[candidate(field_names::REGISTERED_OFFICE_ADDRESS, "12 MG Road", 0.70, "doc-a")]);
        let edited = r.apply_human_edit(merged, field_names::REGISTERED_OFFICE_ADDRESS, FieldValue::Text("12, MG Road".into()));
        let record = &edited.fields[field_names::REGISTERED_OFFICE_ADDRESS];
        assert_eq!(record.confidence, 0.80);
        assert_eq!(record.review_state, ReviewState::Reviewed);
        // Reviewed, but still below the threshold.
        assert!(record.needs_review);
    }

    #[test]
    fn confirm_resolves_conflict_until_new_evidence() {
        let r = reconciler();
        let merged = r.merge(
            Project::new("p"),
            &[
                candidate(field_names::COMPANY_NAME, "Acme Pvt Ltd", 0.90, "doc-a"),
                candidate(field_names::COMPANY_NAME, "Acme Private Limited", 0.85, "doc-b"),
            ],
        );
        let confirmed = r.confirm_field(merged, field_names::COMPANY_NAME);
        let record = &confirmed.fields[field_names::COMPANY_NAME];
        assert_eq!(record.confidence, 1.0);
        assert!(!record.has_conflict());
        assert_eq!(record.review_state, ReviewState::Reviewed);
        assert!(!record.needs_review);

        let reopened = r.merge(confirmed, &[candidate(field_names::COMPANY_NAME, "Acme Infra Limited", 0.95, "doc-c")]);
        let record = &reopened.fields[field_names::COMPANY_NAME];
        assert!(record.review_state.is_flagged());
        assert_eq!(record.value, Some(FieldValue::Text("Acme Pvt Ltd".into())));
    }

    #[test]
    fn fields_without_candidates_get_no_record() {
        let project =
            reconciler().merge(Project::new("p"), &[candidate(field_names::COMPANY_NAME, "Acme Pvt Ltd", 0.90, "doc-a")]);
        assert!(!project.fields.contains_key(field_names::CIN));
        let advisories = review::critical_advisories(&project);
        assert!(advisories.contains(&review::Advisory::CriticalFieldMissing { field: field_names::CIN.into() }));
    }
}
