// src/document/mod.rs
pub mod loader;
pub mod models;

pub use loader::{load_document, segments_from_text};
pub use models::{DocType, Document, SegmentType, SourceRef, TextSegment};
