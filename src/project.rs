//! Project file - `restforge.json` at the project root.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::entity::{merge_entities, Entity, MergeSummary};
use crate::error::{ErrorKind, Kinded};
use crate::output::write_atomic;

pub const PROJECT_FILE: &str = "restforge.json";

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("No project found at '{0}'")]
    NotFound(String),

    #[error("A project already exists at '{0}'")]
    AlreadyExists(String),

    #[error("Failed to access project file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse project file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Kinded for ProjectError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ProjectUnavailable
    }
}

/// A template attached to a project, pinned by version id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedTemplate {
    pub name: String,
    pub version_id: String,
    /// Display only; resolution always goes through `version_id`.
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub templates: Vec<AttachedTemplate>,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            entities: Vec::new(),
            templates: Vec::new(),
        }
    }

    pub fn file_path(root: &Path) -> PathBuf {
        root.join(PROJECT_FILE)
    }

    /// Create the project skeleton on disk. Fails if one already exists.
    pub fn create(name: &str, root: &Path) -> Result<Self, ProjectError> {
        let file = Self::file_path(root);
        if file.exists() {
            return Err(ProjectError::AlreadyExists(root.display().to_string()));
        }
        let project = Self::new(name, root);
        project.save()?;
        info!(project = %name, path = %root.display(), "created project");
        Ok(project)
    }

    pub fn load(root: &Path) -> Result<Self, ProjectError> {
        let file = Self::file_path(root);
        if !file.exists() {
            return Err(ProjectError::NotFound(root.display().to_string()));
        }
        let content = fs::read_to_string(&file).map_err(|e| ProjectError::Io {
            path: file.display().to_string(),
            source: e,
        })?;
        let mut project: Project = serde_json::from_str(&content).map_err(|e| ProjectError::Parse {
            path: file.display().to_string(),
            source: e,
        })?;
        // the directory the file was found in wins over a stale stored path
        project.path = root.to_path_buf();
        Ok(project)
    }

    pub fn save(&self) -> Result<(), ProjectError> {
        let file = Self::file_path(&self.path);
        let content = serde_json::to_string_pretty(self).map_err(|e| ProjectError::Parse {
            path: file.display().to_string(),
            source: e,
        })?;
        write_atomic(&file, &content).map_err(|e| ProjectError::Io {
            path: file.display().to_string(),
            source: e,
        })
    }

    pub fn attached(&self, name: &str) -> Option<&AttachedTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn merge_entities(&mut self, incoming: Vec<Entity>) -> MergeSummary {
        merge_entities(&mut self.entities, incoming)
    }

    /// The stored entity list as an ingestible JSON document.
    pub fn entity_document(&self) -> serde_json::Value {
        serde_json::to_value(&self.entities).unwrap_or_else(|_| serde_json::Value::Array(Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest;

    #[test]
    fn test_create_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("acme");

        let mut project = Project::create("acme", &root).unwrap();
        project
            .merge_entities(ingest::parse(r#"{"name":"User","properties":{"id":"string"}}"#).unwrap());
        project.templates.push(AttachedTemplate {
            name: "csharp-rest".into(),
            version_id: "v-1".into(),
            version: "1.0.0".into(),
        });
        project.save().unwrap();

        let loaded = Project::load(&root).unwrap();
        assert_eq!(loaded, project);
        assert_eq!(loaded.attached("csharp-rest").unwrap().version_id, "v-1");
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        Project::create("acme", dir.path()).unwrap();
        assert!(matches!(
            Project::create("acme", dir.path()),
            Err(ProjectError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::load(dir.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProjectUnavailable);
    }

    #[test]
    fn test_entity_document_reingests() {
        let mut project = Project::new("acme", ".");
        let entities = ingest::parse(r#"{"name":"User","properties":{"tags":["a"],"nick":null}}"#).unwrap();
        project.merge_entities(entities.clone());
        assert_eq!(ingest::parse_value(&project.entity_document()).unwrap(), entities);
    }
}
