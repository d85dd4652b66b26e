//! Explicit settings passed to the components that need them.

use serde::Serialize;
use std::path::{Path, PathBuf};

/// Directory under the project root holding local engine state.
pub const STATE_DIR: &str = ".restforge";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Where `template update` fetches from. Opaque to the core.
    pub manifest_source: String,
    /// The materialized local manifest.
    pub manifest_path: PathBuf,
}

impl Settings {
    pub fn new(manifest_source: impl Into<String>, manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            manifest_source: manifest_source.into(),
            manifest_path: manifest_path.into(),
        }
    }

    /// Settings for a project, falling back to the default manifest location
    /// when no path is given.
    pub fn for_project(project_root: &Path, manifest_source: Option<String>, manifest_path: Option<PathBuf>) -> Self {
        let manifest_path = manifest_path.unwrap_or_else(|| default_manifest_path(project_root));
        let manifest_source = manifest_source.unwrap_or_else(|| manifest_path.display().to_string());
        Self {
            manifest_source,
            manifest_path,
        }
    }
}

pub fn default_manifest_path(project_root: &Path) -> PathBuf {
    project_root.join(STATE_DIR).join(MANIFEST_FILE)
}
