// src/extractors/mod.rs
pub mod candidate;
pub mod fields;
pub mod normalize;
pub mod patterns;
pub mod tables;

// Re-export key extraction types for convenience
#[allow(unused_imports)]
pub use candidate::{ExtractionMethod, FieldCandidate, FieldValue, Row};
#[allow(unused_imports)]
pub use fields::FieldExtractor;
#[allow(unused_imports)]
pub use normalize::{normalize_currency, normalize_date};
#[allow(unused_imports)]
pub use patterns::PATTERN_LIBRARY_VERSION;
#[allow(unused_imports)]
pub use tables::{table_field_candidates, TableCandidate, TableExtractor, TableRow, TableType};
