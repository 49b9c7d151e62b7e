// src/pipeline/mod.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::document::models::Document;
use crate::extractors::candidate::{FieldCandidate, FieldValue};
use crate::extractors::fields::FieldExtractor;
use crate::extractors::tables::{table_field_candidates, TableCandidate, TableExtractor};
use crate::reconcile::merge::Reconciler;
use crate::reconcile::models::Project;
use crate::reconcile::summary::summary_candidate;
use crate::storage::ProjectStore;
use crate::utils::config::Settings;
use crate::utils::error::AppError;

/// Everything extracted from one document.
#[derive(Debug, Clone)]
pub struct DocumentExtraction {
    pub doc_id: String,
    /// Field candidates followed by one candidate per detected table.
    pub candidates: Vec<FieldCandidate>,
    pub tables: Vec<TableCandidate>,
}

/// Runs the field and table extractors over one document.
pub fn extract_document(document: &Document, settings: &Settings) -> DocumentExtraction {
    let mut candidates = FieldExtractor::new(settings).extract(document);
    let tables = TableExtractor::new().extract_tables(document);
    candidates.extend(table_field_candidates(&tables));
    DocumentExtraction { doc_id: document.doc_id.clone(), candidates, tables }
}

/// Extracts documents in parallel and merges them one project at a time.
pub struct Pipeline {
    settings: Settings,
    reconciler: Reconciler,
    store: ProjectStore,
    project_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Pipeline {
    pub fn new(settings: Settings) -> Result<Self, AppError> {
        let store = ProjectStore::new(&settings.data_dir)?;
        Ok(Self { reconciler: Reconciler::new(&settings), settings, store, project_locks: Mutex::new(HashMap::new()) })
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    fn project_lock(&self, project_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.project_locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(project_id.to_string()).or_default().clone()
    }

    /// Extracts every document concurrently, then merges the results into
    /// the project in the order the documents were given.
    pub async fn ingest(&self, project_id: &str, documents: Vec<Document>) -> Result<Project, AppError> {
        tracing::info!("Ingesting {} documents into {}", documents.len(), project_id);

        let handles: Vec<_> = documents
            .into_iter()
            .map(|document| {
                let settings = self.settings.clone();
                tokio::task::spawn_blocking(move || extract_document(&document, &settings))
            })
            .collect();

        let mut extractions = Vec::with_capacity(handles.len());
        for handle in handles {
            extractions.push(handle.await?);
        }

        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let mut project = self.store.load_or_create(project_id)?;
        for extraction in &extractions {
            self.store.save_candidates(&extraction.doc_id, &extraction.candidates)?;
            project = self.reconciler.merge(project, &extraction.candidates);
        }
        self.store.save_project(&project)?;

        Ok(project)
    }

    pub async fn edit(&self, project_id: &str, field_name: &str, value: FieldValue) -> Result<Project, AppError> {
        self.update(project_id, |project| self.reconciler.apply_human_edit(project, field_name, value)).await
    }

    pub async fn confirm(&self, project_id: &str, field_name: &str) -> Result<Project, AppError> {
        self.update(project_id, |project| self.reconciler.confirm_field(project, field_name)).await
    }

    /// Attaches a summary of `field_name` as `<field_name>_summary`.
    pub async fn summarize(
        &self,
        project_id: &str,
        field_name: &str,
        summary: Option<String>,
        llm_used: bool,
    ) -> Result<Project, AppError> {
        self.update(project_id, |project| {
            let candidate = project
                .fields
                .get(field_name)
                .and_then(|record| summary_candidate(record, summary.as_deref(), llm_used));
            match candidate {
                Some(candidate) => self.reconciler.merge(project, &[candidate]),
                None => {
                    tracing::warn!("No summarizable value for {} in {}", field_name, project.project_id);
                    project
                }
            }
        })
        .await
    }

    /// Load, change and save a stored project while holding its lock.
    async fn update<F>(&self, project_id: &str, change: F) -> Result<Project, AppError>
    where
        F: FnOnce(Project) -> Project,
    {
        let lock = self.project_lock(project_id);
        let _guard = lock.lock().await;

        let project = change(self.store.load_project(project_id)?);
        self.store.save_project(&project)?;
        Ok(project)
    }
}
