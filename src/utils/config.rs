// src/utils/config.rs
use chrono::NaiveDate;
use std::path::PathBuf;

use crate::utils::error::AppError;

pub const DEFAULT_REVIEW_THRESHOLD: f64 = 0.85;
pub const MIN_AMOUNT_INR: u64 = 100;
/// 10,000,000 (one crore) x 1000.
pub const DEFAULT_MAX_AMOUNT_INR: u64 = 10_000_000 * 1000;
pub const DEFAULT_ANCHOR_WINDOW: usize = 3;

const ENV_REVIEW_THRESHOLD: &str = "CORP_EXTRACT_REVIEW_THRESHOLD";
const ENV_PROCESSING_DATE: &str = "CORP_EXTRACT_PROCESSING_DATE";
const ENV_MAX_AMOUNT: &str = "CORP_EXTRACT_MAX_AMOUNT";
const ENV_ANCHOR_WINDOW: &str = "CORP_EXTRACT_ANCHOR_WINDOW";

/// Tunables shared by the extractors and the reconciliation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub review_threshold: f64,
    /// Dates after this are rejected by the date normalizer.
    pub processing_date: NaiveDate,
    pub max_amount_inr: u64,
    pub anchor_window: usize,
    pub data_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            review_threshold: DEFAULT_REVIEW_THRESHOLD,
            processing_date: chrono::Local::now().date_naive(),
            max_amount_inr: DEFAULT_MAX_AMOUNT_INR,
            anchor_window: DEFAULT_ANCHOR_WINDOW,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl Settings {
    /// Defaults overridden by `CORP_EXTRACT_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        let mut settings = Self::default();

        if let Ok(raw) = std::env::var(ENV_REVIEW_THRESHOLD) {
            let threshold: f64 = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} must be a number, got '{}'", ENV_REVIEW_THRESHOLD, raw)))?;
            settings = settings.with_review_threshold(threshold)?;
            tracing::debug!("Using review threshold {} from {}", threshold, ENV_REVIEW_THRESHOLD);
        }

        if let Ok(raw) = std::env::var(ENV_PROCESSING_DATE) {
            settings.processing_date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|e| AppError::Config(format!("{} must be YYYY-MM-DD: {}", ENV_PROCESSING_DATE, e)))?;
            tracing::debug!("Using processing date {} from {}", settings.processing_date, ENV_PROCESSING_DATE);
        }

        if let Ok(raw) = std::env::var(ENV_MAX_AMOUNT) {
            settings.max_amount_inr = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} must be a positive integer, got '{}'", ENV_MAX_AMOUNT, raw)))?;
        }

        if let Ok(raw) = std::env::var(ENV_ANCHOR_WINDOW) {
            let window: usize = raw
                .trim()
                .parse()
                .map_err(|_| AppError::Config(format!("{} must be 2 or 3, got '{}'", ENV_ANCHOR_WINDOW, raw)))?;
            settings = settings.with_anchor_window(window);
        }

        Ok(settings)
    }

    pub fn with_review_threshold(mut self, threshold: f64) -> Result<Self, AppError> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(AppError::Config(format!("Review threshold must be within [0, 1], got {}", threshold)));
        }
        self.review_threshold = threshold;
        Ok(self)
    }

    pub fn with_processing_date(mut self, date: NaiveDate) -> Self {
        self.processing_date = date;
        self
    }

    pub fn with_anchor_window(mut self, window: usize) -> Self {
        // Anchor rules read two or three lines past the anchor.
        self.anchor_window = window.clamp(2, 3);
        self
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }
}
