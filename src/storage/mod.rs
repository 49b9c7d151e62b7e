// src/storage/mod.rs
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::extractors::candidate::FieldCandidate;
use crate::extractors::patterns::PATTERN_LIBRARY_VERSION;
use crate::reconcile::models::Project;
use crate::utils::error::StorageError;

/// Debug dump of one document's candidates.
#[derive(Serialize)]
struct CandidateDump<'a> {
    doc_id: &'a str,
    pattern_library_version: u32,
    candidates: &'a [FieldCandidate],
}

/// JSON files under a data directory:
/// `projects/<project_id>.json` and `docs/<doc_id>_candidates.json`.
pub struct ProjectStore {
    base_dir: PathBuf,
}

impl ProjectStore {
    /// Creates the store, making `projects/` and `docs/` if they don't exist
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        for dir in [base_path.join("projects"), base_path.join("docs")] {
            if !dir.exists() {
                fs::create_dir_all(&dir).map_err(StorageError::IoError)?;
            }
        }

        Ok(Self { base_dir: base_path })
    }

    fn project_path(&self, project_id: &str) -> PathBuf {
        self.base_dir.join("projects").join(format!("{}.json", project_id))
    }

    fn candidates_path(&self, doc_id: &str) -> PathBuf {
        self.base_dir.join("docs").join(format!("{}_candidates.json", doc_id))
    }

    /// Writes the project, keeping the previous version as `<id>.json.backup`
    pub fn save_project(&self, project: &Project) -> Result<PathBuf, StorageError> {
        let file_path = self.project_path(&project.project_id);

        if file_path.exists() {
            let backup = file_path.with_extension("json.backup");
            if let Err(e) = fs::copy(&file_path, &backup) {
                tracing::warn!("Failed to back up {}: {}", file_path.display(), e);
            }
        }

        write_json_atomic(&file_path, project)?;
        tracing::info!("Saved project to {}", file_path.display());

        Ok(file_path)
    }

    pub fn load_project(&self, project_id: &str) -> Result<Project, StorageError> {
        let file_path = self.project_path(project_id);
        if !file_path.exists() {
            return Err(StorageError::ProjectNotFound(project_id.to_string()));
        }

        let content = fs::read_to_string(&file_path).map_err(StorageError::IoError)?;
        let project = serde_json::from_str(&content).map_err(|e| StorageError::SerializationError(e.to_string()))?;
        tracing::debug!("Loaded project from {}", file_path.display());
        Ok(project)
    }

    /// Loads the project, or starts an empty one when none is stored yet
    pub fn load_or_create(&self, project_id: &str) -> Result<Project, StorageError> {
        match self.load_project(project_id) {
            Ok(project) => Ok(project),
            Err(StorageError::ProjectNotFound(_)) => {
                tracing::info!("Creating new project {}", project_id);
                Ok(Project::new(project_id))
            }
            Err(e) => Err(e),
        }
    }

    /// Stored project ids, sorted
    pub fn list_projects(&self) -> Result<Vec<String>, StorageError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(self.base_dir.join("projects")).map_err(StorageError::IoError)? {
            let path = entry.map_err(StorageError::IoError)?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Saves raw per-document candidates for debugging
    pub fn save_candidates(&self, doc_id: &str, candidates: &[FieldCandidate]) -> Result<PathBuf, StorageError> {
        let file_path = self.candidates_path(doc_id);
        let dump = CandidateDump { doc_id, pattern_library_version: PATTERN_LIBRARY_VERSION, candidates };
        write_json_atomic(&file_path, &dump)?;
        tracing::info!("Saved {} candidates to {}", candidates.len(), file_path.display());
        Ok(file_path)
    }
}

/// Serializes to a temp file beside the target, then renames over it.
fn write_json_atomic<T: Serialize + ?Sized>(file_path: &Path, data: &T) -> Result<(), StorageError> {
    let content = serde_json::to_string_pretty(data).map_err(|e| StorageError::SerializationError(e.to_string()))?;

    let tmp_path = file_path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp_path).map_err(StorageError::IoError)?;
    file.write_all(content.as_bytes()).map_err(StorageError::IoError)?;
    file.sync_all().map_err(StorageError::IoError)?;
    drop(file);

    fs::rename(&tmp_path, file_path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StorageError::IoError(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::candidate::FieldValue;
    use crate::reconcile::models::FieldRecord;

    fn sample_project() -> Project {
        let mut project = Project::new("acme");
        project.documents.push("coi".into());
        let mut record = FieldRecord::new("company_name");
        record.value = Some(FieldValue::Text("Acme Infra Private Limited".into()));
        record.confidence = 0.93;
        project.fields.insert("company_name".into(), record);
        project
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path()).unwrap();
        let project = sample_project();

        let path = store.save_project(&project).unwrap();
        assert!(path.ends_with("projects/acme.json"));
        assert_eq!(store.load_project("acme").unwrap(), project);
        assert_eq!(store.list_projects().unwrap(), vec!["acme"]);
    }

    #[test]
    fn second_save_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path()).unwrap();
        let mut project = sample_project();
        store.save_project(&project).unwrap();
        project.documents.push("moa".into());
        store.save_project(&project).unwrap();

        let backup = dir.path().join("projects").join("acme.json.backup");
        let previous: Project = serde_json::from_str(&fs::read_to_string(backup).unwrap()).unwrap();
        assert_eq!(previous.documents, vec!["coi"]);
        assert_eq!(store.load_project("acme").unwrap().documents, vec!["coi", "moa"]);
        assert_eq!(store.list_projects().unwrap(), vec!["acme"]);
    }

    #[test]
    fn missing_project() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path()).unwrap();
        assert!(matches!(store.load_project("nope"), Err(StorageError::ProjectNotFound(_))));
        assert_eq!(store.load_or_create("nope").unwrap(), Project::new("nope"));
    }

    #[test]
    fn candidates_written_per_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path()).unwrap();
        let path = store.save_candidates("coi", &[]).unwrap();
        let dump: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(dump["doc_id"], "coi");
        assert_eq!(dump["pattern_library_version"], PATTERN_LIBRARY_VERSION);
        assert_eq!(dump["candidates"], serde_json::json!([]));
    }
}
