//! Template catalog - manifest model, storage and sources
//!
//! Published versions are append-only: a version record never changes once
//! it is in a manifest, and a manifest refresh that tries to change one is
//! rejected as a whole.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Kinded};
use crate::output::write_atomic;

pub type TemplateName = String;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write manifest: {0}")]
    Write(String),

    #[error("Manifest source unavailable: {0}")]
    Unavailable(String),

    #[error("Template '{template}' version '{id}' was already published with different contents")]
    ImmutableVersion { template: String, id: String },
}

impl Kinded for ManifestError {
    fn kind(&self) -> ErrorKind {
        match self {
            ManifestError::ImmutableVersion { .. } => ErrorKind::ImmutableVersion,
            _ => ErrorKind::ManifestUnavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersion {
    pub id: String,
    pub version: String,
    pub commit: String,
    pub date_added: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_min_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: TemplateName,
    pub language: String,
    pub framework: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub versions: Vec<TemplateVersion>,
}

impl Template {
    pub fn version_by_id(&self, id: &str) -> Option<&TemplateVersion> {
        self.versions.iter().find(|v| v.id == id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub templates: Vec<Template>,
}

/// What a manifest refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestUpdate {
    pub new_templates: Vec<String>,
    pub new_versions: Vec<String>,
}

impl ManifestUpdate {
    pub fn is_empty(&self) -> bool {
        self.new_templates.is_empty() && self.new_versions.is_empty()
    }
}

impl Manifest {
    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn list(&self) -> Vec<&Template> {
        let mut templates: Vec<&Template> = self.templates.iter().collect();
        templates.sort_by(|a, b| a.name.cmp(&b.name));
        templates
    }

    pub fn register(&mut self, template: Template) {
        match self.templates.iter_mut().find(|t| t.name == template.name) {
            Some(slot) => *slot = template,
            None => self.templates.push(template),
        }
    }

    /// Fold a freshly fetched manifest into this one.
    ///
    /// New templates and new version ids are appended; template metadata is
    /// refreshed. Templates and versions missing from `incoming` are kept.
    /// A version id present in both with different contents fails the whole
    /// merge and leaves `self` untouched.
    pub fn merge(&mut self, incoming: Manifest) -> Result<ManifestUpdate, ManifestError> {
        let mut merged = self.clone();
        let mut update = ManifestUpdate::default();

        for template in incoming.templates {
            let Some(existing) = merged.templates.iter_mut().find(|t| t.name == template.name) else {
                update.new_templates.push(template.name.clone());
                merged.templates.push(template);
                continue;
            };

            existing.language = template.language;
            existing.framework = template.framework;
            existing.description = template.description;

            for version in template.versions {
                match existing.version_by_id(&version.id) {
                    Some(published) if *published == version => {}
                    Some(_) => {
                        return Err(ManifestError::ImmutableVersion {
                            template: existing.name.clone(),
                            id: version.id,
                        })
                    }
                    None => {
                        update
                            .new_versions
                            .push(format!("{}@{}", existing.name, version.version));
                        existing.versions.push(version);
                    }
                }
            }
        }

        *self = merged;
        Ok(update)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|e| ManifestError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| ManifestError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Load, treating a missing file as an empty catalog.
    pub fn load_or_default(path: &Path) -> Result<Self, ManifestError> {
        if !path.exists() {
            debug!(path = %path.display(), "no local manifest yet");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ManifestError::Write(e.to_string()))?;
        write_atomic(path, &content).map_err(|e| ManifestError::Write(e.to_string()))
    }
}

/// Where manifests come from. Transport details belong to implementations;
/// the core only consumes the materialized `Manifest`.
pub trait ManifestSource {
    fn describe(&self) -> String;
    fn fetch(&self) -> Result<Manifest, ManifestError>;
}

/// A manifest file, or a directory holding one template JSON per file.
pub struct FileManifestSource {
    path: PathBuf,
}

impl FileManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load_dir(&self) -> Result<Manifest, ManifestError> {
        let read_err = |e: std::io::Error| ManifestError::Read {
            path: self.path.display().to_string(),
            source: e,
        };
        let mut manifest = Manifest::default();
        for entry in fs::read_dir(&self.path).map_err(read_err)? {
            let path = entry.map_err(read_err)?.path();
            if path.extension().map_or(false, |e| e == "json") {
                let parsed = fs::read_to_string(&path)
                    .map_err(|e| e.to_string())
                    .and_then(|content| serde_json::from_str::<Template>(&content).map_err(|e| e.to_string()));
                match parsed {
                    Ok(template) => manifest.register(template),
                    Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable template file"),
                }
            }
        }
        manifest.templates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(manifest)
    }
}

impl ManifestSource for FileManifestSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn fetch(&self) -> Result<Manifest, ManifestError> {
        if self.path.is_dir() {
            self.load_dir()
        } else {
            Manifest::load(&self.path)
        }
    }
}

/// Pick a source for an opaque location string.
pub fn source_for(location: &str) -> Result<Box<dyn ManifestSource>, ManifestError> {
    if location.trim().is_empty() {
        return Err(ManifestError::Unavailable("no manifest source configured".into()));
    }
    if let Some(path) = location.strip_prefix("file://") {
        return Ok(Box::new(FileManifestSource::new(path)));
    }
    if location.contains("://") {
        return Err(ManifestError::Unavailable(format!(
            "no transport available for '{location}'"
        )));
    }
    Ok(Box::new(FileManifestSource::new(location)))
}

/// Refresh the local manifest at `local` from `source`.
pub fn update_manifest(source: &dyn ManifestSource, local: &Path) -> Result<ManifestUpdate, ManifestError> {
    let mut manifest = Manifest::load_or_default(local)?;
    let incoming = source.fetch()?;
    let update = manifest.merge(incoming)?;
    manifest.save(local)?;
    info!(
        source = %source.describe(),
        new_templates = update.new_templates.len(),
        new_versions = update.new_versions.len(),
        "manifest updated"
    );
    Ok(update)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn version(id: &str, v: &str) -> TemplateVersion {
        TemplateVersion {
            id: id.into(),
            version: v.into(),
            commit: format!("commit-{id}"),
            date_added: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            engine_min_version: None,
        }
    }

    fn template(name: &str, versions: Vec<TemplateVersion>) -> Template {
        Template {
            name: name.into(),
            language: "csharp".into(),
            framework: "httpclient".into(),
            description: String::new(),
            versions,
        }
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let manifest = Manifest {
            templates: vec![template("csharp-rest", vec![])],
        };
        assert!(manifest.get("csharp-rest").is_some());
        assert!(manifest.get("CSharp-Rest").is_none());
    }

    #[test]
    fn test_merge_appends() {
        let mut manifest = Manifest {
            templates: vec![template("csharp-rest", vec![version("a", "1.0.0")])],
        };
        let incoming = Manifest {
            templates: vec![
                template("csharp-rest", vec![version("a", "1.0.0"), version("b", "1.1.0")]),
                template("ts-fetch", vec![version("c", "0.1.0")]),
            ],
        };
        let update = manifest.merge(incoming).unwrap();
        assert_eq!(update.new_templates, vec!["ts-fetch"]);
        assert_eq!(update.new_versions, vec!["csharp-rest@1.1.0"]);
        assert_eq!(manifest.get("csharp-rest").unwrap().versions.len(), 2);
    }

    #[test]
    fn test_merge_keeps_versions_missing_upstream() {
        let mut manifest = Manifest {
            templates: vec![template("csharp-rest", vec![version("a", "1.0.0")])],
        };
        let incoming = Manifest {
            templates: vec![template("csharp-rest", vec![version("b", "2.0.0")])],
        };
        manifest.merge(incoming).unwrap();
        let ids: Vec<_> = manifest.get("csharp-rest").unwrap().versions.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_merge_rejects_changed_version() {
        let mut manifest = Manifest {
            templates: vec![template("csharp-rest", vec![version("a", "1.0.0")])],
        };
        let mut changed = version("a", "1.0.0");
        changed.commit = "rewritten".into();
        let incoming = Manifest {
            templates: vec![
                template("other", vec![]),
                template("csharp-rest", vec![changed]),
            ],
        };
        let before = manifest.clone();
        let err = manifest.merge(incoming).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ImmutableVersion);
        assert_eq!(manifest, before);
    }

    #[test]
    fn test_source_for_locations() {
        assert!(source_for("").is_err());
        assert!(source_for("https://example.com/manifest.json").is_err());
        assert_eq!(source_for("file:///tmp/m.json").unwrap().describe(), "/tmp/m.json");
        assert_eq!(source_for("manifest.json").unwrap().describe(), "manifest.json");
    }

    #[test]
    fn test_directory_source_and_update() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = dir.path().join("catalog");
        fs::create_dir(&catalog).unwrap();
        let t = template("csharp-rest", vec![version("a", "1.0.0")]);
        fs::write(catalog.join("csharp-rest.json"), serde_json::to_string(&t).unwrap()).unwrap();
        fs::write(catalog.join("broken.json"), "{").unwrap();
        fs::write(catalog.join("README.md"), "ignored").unwrap();

        let local = dir.path().join("local").join("manifest.json");
        let source = FileManifestSource::new(&catalog);
        let update = update_manifest(&source, &local).unwrap();
        assert_eq!(update.new_templates, vec!["csharp-rest"]);

        let saved = Manifest::load(&local).unwrap();
        assert_eq!(saved.templates, vec![t]);

        // second refresh is a no-op
        assert!(update_manifest(&source, &local).unwrap().is_empty());
    }
}
