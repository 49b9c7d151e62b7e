// src/reconcile/validation.rs
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extractors::candidate::{FieldValue, Row};
use crate::extractors::normalize::normalize_date;
use crate::extractors::patterns::{self, field_names, MAX_COMPANY_NAME_CHARS};
use crate::reconcile::models::{FieldRecord, Project};
use crate::utils::config::{Settings, MIN_AMOUNT_INR};
use crate::utils::error::NormalizationError;

/// Shareholding percentages must total 100 within this tolerance.
const PERCENT_TOLERANCE: f64 = 0.5;

static DIN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}$").expect("Failed to compile DIN_RE"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    InvalidDate,
    FutureDate,
    InvalidAmount,
    AmountOutOfRange,
    InvalidCin,
    NameLength,
    InvalidDin,
    ShareholdingTotal,
}

impl WarningKind {
    /// The value itself is malformed. A human decision does not clear these;
    /// range and consistency warnings can be accepted on review.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            WarningKind::InvalidDate
                | WarningKind::FutureDate
                | WarningKind::InvalidAmount
                | WarningKind::InvalidCin
                | WarningKind::InvalidDin
        )
    }
}

/// Advisory attached to a record. Never blocks a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub field_name: String,
    pub kind: WarningKind,
    pub message: String,
}

impl ValidationWarning {
    fn new(field_name: &str, kind: WarningKind, message: String) -> Self {
        Self { field_name: field_name.to_string(), kind, message }
    }
}

/// Format and range checks per field type.
#[derive(Debug, Clone)]
pub struct Validator {
    processing_date: NaiveDate,
    max_amount_inr: u64,
}

impl Validator {
    pub fn new(settings: &Settings) -> Self {
        Self { processing_date: settings.processing_date, max_amount_inr: settings.max_amount_inr }
    }

    /// Warnings for every record of the project, in field order.
    pub fn validate(&self, project: &Project) -> Vec<ValidationWarning> {
        let warnings: Vec<ValidationWarning> = project.fields.values().flat_map(|r| self.check(r)).collect();
        if !warnings.is_empty() {
            tracing::warn!(
                project_id = %project.project_id,
                warning_count = warnings.len(),
                "Validation warnings detected"
            );
        }
        warnings
    }

    pub fn check(&self, record: &FieldRecord) -> Vec<ValidationWarning> {
        let Some(value) = &record.value else {
            return Vec::new();
        };
        let field = record.field_name.as_str();
        let mut warnings = Vec::new();

        match (field, value) {
            (field_names::DATE_OF_INCORPORATION, FieldValue::Text(s)) => self.check_date(field, s, &mut warnings),
            (field_names::AUTHORIZED_SHARE_CAPITAL, FieldValue::Integer(amount)) => {
                if *amount < MIN_AMOUNT_INR || *amount > self.max_amount_inr {
                    warnings.push(ValidationWarning::new(
                        field,
                        WarningKind::AmountOutOfRange,
                        format!("Amount {} outside [{}, {}]", amount, MIN_AMOUNT_INR, self.max_amount_inr),
                    ));
                }
            }
            (field_names::AUTHORIZED_SHARE_CAPITAL, FieldValue::Text(s)) => warnings.push(ValidationWarning::new(
                field,
                WarningKind::InvalidAmount,
                format!("Amount '{}' is not a normalized integer", s),
            )),
            (field_names::CIN, FieldValue::Text(s)) if !patterns::is_valid_cin(s) => warnings.push(ValidationWarning::new(
                field,
                WarningKind::InvalidCin,
                format!("CIN '{}' does not match the 21-character format", s),
            )),
            (field_names::COMPANY_NAME, FieldValue::Text(s)) => {
                let len = s.trim().chars().count();
                if len == 0 || len > MAX_COMPANY_NAME_CHARS {
                    warnings.push(ValidationWarning::new(
                        field,
                        WarningKind::NameLength,
                        format!("Company name length {} outside 1..={}", len, MAX_COMPANY_NAME_CHARS),
                    ));
                }
            }
            (field_names::BOARD_LIST, FieldValue::Rows(rows)) => check_dins(field, rows, &mut warnings),
            (field_names::SHAREHOLDING_SCHEDULE, FieldValue::Rows(rows)) => {
                check_percentages(field, rows, &mut warnings)
            }
            _ => {}
        }

        warnings
    }

    fn check_date(&self, field: &str, value: &str, warnings: &mut Vec<ValidationWarning>) {
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            if date > self.processing_date {
                warnings.push(ValidationWarning::new(
                    field,
                    WarningKind::FutureDate,
                    format!("Date {} is after the processing date {}", value, self.processing_date),
                ));
            }
            return;
        }
        let warning = match normalize_date(value, self.processing_date) {
            Err(err @ NormalizationError::FutureDate { .. }) => {
                ValidationWarning::new(field, WarningKind::FutureDate, err.to_string())
            }
            Ok(iso) => ValidationWarning::new(field, WarningKind::InvalidDate, format!("Date '{}' is not ISO-8601 (expected {})", value, iso)),
            Err(err) => ValidationWarning::new(field, WarningKind::InvalidDate, err.to_string()),
        };
        warnings.push(warning);
    }
}

/// Convenience wrapper over [`Validator::validate`].
pub fn validate(project: &Project, settings: &Settings) -> Vec<ValidationWarning> {
    Validator::new(settings).validate(project)
}

fn check_dins(field: &str, rows: &[Row], warnings: &mut Vec<ValidationWarning>) {
    for (idx, row) in rows.iter().enumerate() {
        let Some(din) = row.get("din").map(|d| d.trim()).filter(|d| !d.is_empty()) else {
            continue;
        };
        if !DIN_RE.is_match(din) {
            warnings.push(ValidationWarning::new(
                field,
                WarningKind::InvalidDin,
                format!("Row {}: DIN '{}' is not 8 digits", idx + 1, din),
            ));
        }
    }
}

fn check_percentages(field: &str, rows: &[Row], warnings: &mut Vec<ValidationWarning>) {
    let percents: Vec<f64> = rows
        .iter()
        .filter_map(|row| row.get("percentage"))
        .filter_map(|p| p.trim().trim_end_matches('%').trim().parse::<f64>().ok())
        .collect();
    if percents.is_empty() {
        return;
    }
    let total: f64 = percents.iter().sum();
    if (total - 100.0).abs() > PERCENT_TOLERANCE {
        warnings.push(ValidationWarning::new(
            field,
            WarningKind::ShareholdingTotal,
            format!("Shareholding percentages total {:.2}, expected 100", total),
        ));
    }
}
