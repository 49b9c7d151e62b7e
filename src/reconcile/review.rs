// src/reconcile/review.rs
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::extractors::candidate::{ExtractionMethod, FieldValue};
use crate::extractors::patterns::CRITICAL_FIELDS;
use crate::reconcile::confidence::{self, AdjustmentSet};
use crate::reconcile::merge::Reconciler;
use crate::reconcile::models::{Evidence, FieldRecord, HistoryAction, HistoryEntry, Project};

/// Why a field needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    LowConfidence,
    /// Evidence disagrees. Distinct from a plain low-confidence flag.
    MergeConflict,
    CriticalFieldMissing,
    ValidationWarning,
    /// The promoted candidate could not be normalized or was malformed.
    CandidateIssue,
    /// Candidates exist but none may be promoted (a malformed CIN).
    UnpromotedValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    Unreviewed,
    Flagged { reasons: Vec<FlagReason> },
    Reviewed,
    AutoAccepted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewEvent {
    /// The flagger ran after a merge or edit.
    Evaluated { reasons: Vec<FlagReason> },
    HumanConfirmed,
}

impl ReviewState {
    pub fn transition(self, event: ReviewEvent) -> ReviewState {
        match (self, event) {
            (_, ReviewEvent::HumanConfirmed) => ReviewState::Reviewed,
            (ReviewState::Unreviewed | ReviewState::AutoAccepted, ReviewEvent::Evaluated { reasons }) => {
                if reasons.is_empty() {
                    ReviewState::AutoAccepted
                } else {
                    ReviewState::Flagged { reasons }
                }
            }
            // Only a human clears a flag.
            (ReviewState::Flagged { reasons: previous }, ReviewEvent::Evaluated { reasons }) => {
                if reasons.is_empty() {
                    ReviewState::Flagged { reasons: previous }
                } else {
                    ReviewState::Flagged { reasons }
                }
            }
            // Reviewed holds against everything except a new conflict.
            (ReviewState::Reviewed, ReviewEvent::Evaluated { reasons }) => {
                if reasons.contains(&FlagReason::MergeConflict) {
                    ReviewState::Flagged { reasons }
                } else {
                    ReviewState::Reviewed
                }
            }
        }
    }

    pub fn is_flagged(&self) -> bool {
        matches!(self, ReviewState::Flagged { .. })
    }
}

/// Every flag condition that currently holds for a record.
pub fn flag_reasons(record: &FieldRecord, review_threshold: f64) -> Vec<FlagReason> {
    let mut reasons = Vec::new();
    if record.value.is_none() {
        reasons.push(FlagReason::UnpromotedValue);
        if CRITICAL_FIELDS.contains(&record.field_name.as_str()) {
            reasons.push(FlagReason::CriticalFieldMissing);
        }
    }
    if record.confidence < review_threshold {
        reasons.push(FlagReason::LowConfidence);
    }
    if record.has_conflict() {
        reasons.push(FlagReason::MergeConflict);
    }
    if !record.warnings.is_empty() {
        reasons.push(FlagReason::ValidationWarning);
    }
    if !record.issues.is_empty() {
        reasons.push(FlagReason::CandidateIssue);
    }
    reasons
}

/// Runs the flagger and settles `needs_review`.
///
/// `needs_review` is false only when confidence clears the threshold, no
/// conflict is open, the value has no format error and the state is not
/// flagged.
pub fn evaluate(record: &mut FieldRecord, review_threshold: f64) {
    let reasons = flag_reasons(record, review_threshold);
    let state = std::mem::take(&mut record.review_state);
    record.review_state = state.transition(ReviewEvent::Evaluated { reasons });
    record.needs_review = record.review_state.is_flagged()
        || record.confidence < review_threshold
        || record.has_conflict()
        || record.warnings.iter().any(|w| w.kind.is_format_error());
}

/// A project-level concern with no record to attach to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    CriticalFieldMissing { field: String },
}

/// Critical fields with no record, or with no promotable value.
pub fn critical_advisories(project: &Project) -> Vec<Advisory> {
    CRITICAL_FIELDS
        .iter()
        .filter(|field| project.fields.get(**field).map_or(true, |r| r.value.is_none()))
        .map(|field| Advisory::CriticalFieldMissing { field: field.to_string() })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReviewQueue<'a> {
    pub flagged: Vec<&'a FieldRecord>,
    pub advisories: Vec<Advisory>,
}

/// Everything waiting on a human, fields in name order.
pub fn review_queue(project: &Project) -> ReviewQueue<'_> {
    ReviewQueue {
        flagged: project.fields.values().filter(|r| r.needs_review).collect(),
        advisories: critical_advisories(project),
    }
}

impl Reconciler {
    /// Human replaces a field's value. An absent field becomes a manual
    /// entry at 1.00; an existing one gains the human-edit bonus. Earlier
    /// evidence stays on the record, superseded.
    pub fn apply_human_edit(&self, mut project: Project, field_name: &str, new_value: FieldValue) -> Project {
        let order = project.documents.len();
        let record = project.fields.entry(field_name.to_string()).or_insert_with(|| FieldRecord::new(field_name));

        let (confidence, action) = if record.value.is_none() {
            (confidence::adjust(0.0, &AdjustmentSet { is_manual: true, ..Default::default() }), HistoryAction::ManualEntry)
        } else {
            (
                confidence::adjust(record.confidence, &AdjustmentSet { is_human_edited: true, ..Default::default() }),
                HistoryAction::HumanEdit,
            )
        };

        for evidence in record.evidence.iter_mut() {
            evidence.superseded = true;
        }
        record.evidence.push(Evidence::manual(new_value.clone(), confidence, order));
        record.history.push(HistoryEntry {
            at: Utc::now(),
            action,
            method: ExtractionMethod::Manual,
            value: Some(new_value),
        });
        tracing::info!("Human {:?} on {}.{} ({:.2})", action, project.project_id, field_name, confidence);

        self.settle(record, Some(ReviewEvent::HumanConfirmed));
        project
    }

    /// Human verifies the current value as-is. Confidence is forced to 1.00
    /// and disagreeing evidence is superseded.
    pub fn confirm_field(&self, mut project: Project, field_name: &str) -> Project {
        let order = project.documents.len();
        let Some(record) = project.fields.get_mut(field_name) else {
            tracing::warn!("Cannot confirm {}: no such field in {}", field_name, project.project_id);
            return project;
        };
        let Some(value) = record.value.clone() else {
            tracing::warn!("Cannot confirm {}: no promotable value", field_name);
            return project;
        };

        let normalized = value.normalized();
        for evidence in record.evidence.iter_mut().filter(|e| e.normalized != normalized) {
            evidence.superseded = true;
        }
        let confidence = confidence::adjust(record.confidence, &AdjustmentSet { is_manual: true, ..Default::default() });
        let mut verified = Evidence::manual(value.clone(), confidence, order);
        if let Some(raw) = &record.raw_text {
            verified.raw_text = raw.clone();
        }
        record.evidence.push(verified);
        record.history.push(HistoryEntry {
            at: Utc::now(),
            action: HistoryAction::Confirmed,
            method: ExtractionMethod::Manual,
            value: Some(value),
        });
        tracing::info!("Confirmed {}.{}", project.project_id, field_name);

        self.settle(record, Some(ReviewEvent::HumanConfirmed));
        project
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::validation::WarningKind;
    use crate::utils::config::Settings;

    fn flagged(reasons: &[FlagReason]) -> ReviewState {
        ReviewState::Flagged { reasons: reasons.to_vec() }
    }

    fn evaluated(reasons: &[FlagReason]) -> ReviewEvent {
        ReviewEvent::Evaluated { reasons: reasons.to_vec() }
    }

    #[test]
    fn state_transitions() {
        let cases = vec![
            (ReviewState::Unreviewed, evaluated(&[]), ReviewState::AutoAccepted),
            (ReviewState::Unreviewed, evaluated(&[FlagReason::LowConfidence]), flagged(&[FlagReason::LowConfidence])),
            (ReviewState::AutoAccepted, evaluated(&[FlagReason::MergeConflict]), flagged(&[FlagReason::MergeConflict])),
            (flagged(&[FlagReason::LowConfidence]), evaluated(&[]), flagged(&[FlagReason::LowConfidence])),
            (flagged(&[FlagReason::LowConfidence]), ReviewEvent::HumanConfirmed, ReviewState::Reviewed),
            (ReviewState::Reviewed, evaluated(&[FlagReason::LowConfidence]), ReviewState::Reviewed),
            (ReviewState::Reviewed, evaluated(&[FlagReason::MergeConflict]), flagged(&[FlagReason::MergeConflict])),
        ];
        for (from, event, expected) in cases {
            assert_eq!(from.clone().transition(event.clone()), expected, "{:?} + {:?}", from, event);
        }
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_string(&flagged(&[FlagReason::MergeConflict])).unwrap();
        assert_eq!(json, r#"{"state":"flagged","reasons":["merge_conflict"]}"#);
        assert_eq!(serde_json::to_string(&ReviewState::AutoAccepted).unwrap(), r#"{"state":"auto_accepted"}"#);
    }

    #[test]
    fn missing_critical_fields_are_advisories_not_records() {
        let project = Project::new("p");
        let advisories = critical_advisories(&project);
        assert_eq!(advisories.len(), 3);
        assert!(advisories.contains(&Advisory::CriticalFieldMissing { field: "cin".into() }));
        assert!(project.fields.is_empty());
    }

    #[test]
    fn edit_of_absent_field_is_manual_entry() {
        let reconciler = Reconciler::new(&Settings::default());
        let project = reconciler.apply_human_edit(Project::new("p"), "cin", FieldValue::Text("U72900KA2020PTC123456".into()));
        let record = &project.fields["cin"];
        assert_eq!(record.confidence, 1.0);
        assert!(record.source_refs.is_empty());
        assert_eq!(record.review_state, ReviewState::Reviewed);
        assert!(!record.needs_review);
        assert_eq!(record.history[0].action, HistoryAction::ManualEntry);
        assert_eq!(record.history[0].method, ExtractionMethod::Manual);
        assert!(critical_advisories(&project).iter().all(|a| a != &Advisory::CriticalFieldMissing { field: "cin".into() }));
    }

    #[test]
    fn malformed_manual_cin_stays_in_review() {
        let reconciler = Reconciler::new(&Settings::default());
        let project = reconciler.apply_human_edit(Project::new("p"), "cin", FieldValue::Text("NOT-A-CIN".into()));
        let record = &project.fields["cin"];
        assert_eq!(record.review_state, ReviewState::Reviewed);
        assert_eq!(record.warnings[0].kind, WarningKind::InvalidCin);
        assert!(record.needs_review);
        assert_eq!(review_queue(&project).flagged.len(), 1);

        let project = reconciler.apply_human_edit(project, "cin", FieldValue::Text("U72900KA2020PTC123456".into()));
        let record = &project.fields["cin"];
        assert!(record.warnings.is_empty());
        assert!(!record.needs_review);
    }

    #[test]
    fn reviewed_amount_out_of_range_can_be_accepted() {
        let reconciler = Reconciler::new(&Settings::default());
        let project = reconciler.apply_human_edit(Project::new("p"), "authorized_share_capital", FieldValue::Integer(50));
        let record = &project.fields["authorized_share_capital"];
        assert_eq!(record.warnings[0].kind, WarningKind::AmountOutOfRange);
        assert!(!record.needs_review);
    }

    #[test]
    fn confirm_of_absent_field_is_noop() {
        let reconciler = Reconciler::new(&Settings::default());
        let project = reconciler.confirm_field(Project::new("p"), "cin");
        assert!(project.fields.is_empty());
    }
}
