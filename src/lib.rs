// src/lib.rs
//! Field extraction and multi-document reconciliation for company
//! incorporation documents (Certificate of Incorporation, MoA/AoA).

pub mod document;
pub mod extractors;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod utils;

pub use document::{Document, SourceRef, TextSegment};
pub use extractors::{FieldCandidate, FieldExtractor, FieldValue, TableExtractor};
pub use pipeline::Pipeline;
pub use reconcile::{FieldRecord, Project, Reconciler};
pub use utils::{AppError, Settings};
