// src/reconcile/mod.rs
pub mod confidence;
pub mod merge;
pub mod models;
pub mod review;
pub mod summary;
pub mod validation;

pub use merge::Reconciler;
pub use models::{Evidence, FieldRecord, PersistedField, Project};
pub use review::{review_queue, Advisory, FlagReason, ReviewQueue, ReviewState};
pub use summary::summary_candidate;
pub use validation::{validate, ValidationWarning, Validator};
