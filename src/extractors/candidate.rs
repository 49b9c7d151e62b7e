// src/extractors/candidate.rs
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::document::models::SourceRef;

/// One structured table row: canonical column name to cell text.
pub type Row = BTreeMap<String, String>;

/// Value carried by a candidate or a canonical record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Integer(u64),
    Text(String),
    Rows(Vec<Row>),
}

impl FieldValue {
    /// Key used to decide whether two values agree.
    /// Case, surrounding punctuation and whitespace runs are ignored; wording is not.
    pub fn normalized(&self) -> String {
        match self {
            FieldValue::Flag(b) => b.to_string(),
            FieldValue::Integer(n) => n.to_string(),
            FieldValue::Text(s) => normalize_text(s),
            FieldValue::Rows(rows) => rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| format!("{}={}", k, normalize_text(v)))
                        .collect::<Vec<_>>()
                        .join(";")
                })
                .collect::<Vec<_>>()
                .join("|"),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rows(&self) -> Option<&[Row]> {
        match self {
            FieldValue::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    /// Parses CLI/API input: JSON literals are taken as-is, anything else is text.
    pub fn from_user_input(input: &str) -> Self {
        serde_json::from_str::<FieldValue>(input).unwrap_or_else(|_| FieldValue::Text(input.to_string()))
    }
}

fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '.' || c == ',' || c == ';' || c == ':')
        .to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Regex,
    Table,
    Llm,
    Manual,
}

/// One match attempt. Several may exist per field per document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldCandidate {
    pub field_name: String,
    pub value: FieldValue,
    pub raw_text: String,
    pub confidence: f64,
    pub source_refs: Vec<SourceRef>,
    pub extraction_method: ExtractionMethod,
    /// Set when the value could not be normalized or a table row was malformed.
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<String>,
}

impl FieldCandidate {
    pub fn doc_id(&self) -> Option<&str> {
        self.source_refs.first().map(|s| s.doc_id.as_str())
    }
}
