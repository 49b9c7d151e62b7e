// src/reconcile/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

use crate::document::models::SourceRef;
use crate::extractors::candidate::{ExtractionMethod, FieldCandidate, FieldValue};
use crate::extractors::patterns::{self, field_names};
use crate::reconcile::review::ReviewState;
use crate::reconcile::validation::ValidationWarning;

/// One candidate as retained on a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub value: FieldValue,
    pub normalized: String,
    pub confidence: f64,
    pub source_refs: Vec<SourceRef>,
    pub raw_text: String,
    pub method: ExtractionMethod,
    /// Ingestion position of the source document. Manual entries sort last.
    pub order: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    /// Replaced by a human decision. Kept for provenance, ignored for voting.
    #[serde(default)]
    pub superseded: bool,
}

impl Evidence {
    pub fn from_candidate(candidate: &FieldCandidate, order: usize) -> Self {
        Self {
            value: candidate.value.clone(),
            normalized: candidate.value.normalized(),
            confidence: candidate.confidence,
            source_refs: candidate.source_refs.clone(),
            raw_text: candidate.raw_text.clone(),
            method: candidate.extraction_method,
            order,
            issues: candidate.issues.clone(),
            superseded: false,
        }
    }

    pub fn manual(value: FieldValue, confidence: f64, order: usize) -> Self {
        Self {
            raw_text: match &value {
                FieldValue::Text(s) => s.clone(),
                other => serde_json::to_string(other).unwrap_or_default(),
            },
            normalized: value.normalized(),
            value,
            confidence,
            source_refs: Vec::new(),
            method: ExtractionMethod::Manual,
            order,
            issues: Vec::new(),
            superseded: false,
        }
    }

    /// Two pieces of evidence are the same observation when they agree on
    /// value, method, raw text and provenance.
    pub fn same_observation(&self, other: &Evidence) -> bool {
        self.normalized == other.normalized
            && self.method == other.method
            && self.raw_text == other.raw_text
            && self.source_refs == other.source_refs
    }

    pub fn doc_id(&self) -> Option<&str> {
        self.source_refs.first().map(|s| s.doc_id.as_str())
    }

    /// CIN values must be well-formed to be promoted. Human entries always are.
    pub fn promotable(&self, field_name: &str) -> bool {
        field_name != field_names::CIN
            || self.method == ExtractionMethod::Manual
            || self.value.as_text().is_some_and(patterns::is_valid_cin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    HumanEdit,
    ManualEntry,
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub action: HistoryAction,
    pub method: ExtractionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

/// Canonical, post-merge value of one field within a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
    pub field_name: String,
    /// `None` while no candidate is eligible for promotion.
    pub value: Option<FieldValue>,
    pub confidence: f64,
    /// Provenance of every piece of evidence, conflicting ones included.
    pub source_refs: Vec<SourceRef>,
    pub raw_text: Option<String>,
    pub needs_review: bool,
    pub review_state: ReviewState,
    pub extraction_method: ExtractionMethod,
    /// Issues carried by the promoted candidate.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ValidationWarning>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<HistoryEntry>,
}

impl FieldRecord {
    pub fn new(field_name: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            value: None,
            confidence: 0.0,
            source_refs: Vec::new(),
            raw_text: None,
            needs_review: true,
            review_state: ReviewState::Unreviewed,
            extraction_method: ExtractionMethod::Regex,
            issues: Vec::new(),
            evidence: Vec::new(),
            warnings: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn active_evidence(&self) -> impl Iterator<Item = &Evidence> {
        self.evidence.iter().filter(|e| !e.superseded)
    }

    /// Active evidence that may become the canonical value.
    pub fn promotable_evidence(&self) -> impl Iterator<Item = &Evidence> {
        self.active_evidence().filter(move |e| e.promotable(&self.field_name))
    }

    /// Conflict is a query over retained evidence: more than one distinct
    /// normalized value among the promotable evidence.
    pub fn has_conflict(&self) -> bool {
        let mut values = self.promotable_evidence().map(|e| e.normalized.as_str());
        match values.next() {
            Some(first) => values.any(|v| v != first),
            None => false,
        }
    }

    /// Distinct normalized values among active evidence, in first-seen order.
    pub fn conflicting_values(&self) -> Vec<&FieldValue> {
        let mut seen = HashSet::new();
        self.promotable_evidence().filter(|e| seen.insert(e.normalized.as_str())).map(|e| &e.value).collect()
    }
}

/// The five keys of a stored field record. Round-trips exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistedField {
    pub value: Option<FieldValue>,
    pub confidence: f64,
    pub source_refs: Vec<SourceRef>,
    pub raw_text: Option<String>,
    pub needs_review: bool,
}

impl From<&FieldRecord> for PersistedField {
    fn from(record: &FieldRecord) -> Self {
        Self {
            value: record.value.clone(),
            confidence: record.confidence,
            source_refs: record.source_refs.clone(),
            raw_text: record.raw_text.clone(),
            needs_review: record.needs_review,
        }
    }
}

/// Fields reconciled across the documents of one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    /// Document ids in ingestion order.
    #[serde(default)]
    pub documents: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldRecord>,
}

impl Project {
    pub fn new(project_id: &str) -> Self {
        Self { project_id: project_id.to_string(), ..Default::default() }
    }

    /// Position of a document in ingestion order, registering it if new.
    pub fn register_document(&mut self, doc_id: &str) -> usize {
        match self.documents.iter().position(|d| d == doc_id) {
            Some(idx) => idx,
            None => {
                self.documents.push(doc_id.to_string());
                self.documents.len() - 1
            }
        }
    }

    /// The client-facing view: `field_name -> {value, confidence, source_refs, raw_text, needs_review}`.
    pub fn persisted_fields(&self) -> BTreeMap<String, PersistedField> {
        self.fields.iter().map(|(name, record)| (name.clone(), PersistedField::from(record))).collect()
    }
}
