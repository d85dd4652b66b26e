//! Staged file output.
//!
//! Content is written to a temporary file in the destination directory and
//! renamed over the target, so readers see either the old file or the new
//! one, never a partial write.

use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::render::{Artifact, RenderError};

/// Write `content` to `path` atomically, creating parent directories.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent)?;

    let mut staged = NamedTempFile::new_in(parent)?;
    staged.write_all(content.as_bytes())?;
    staged.as_file().sync_all()?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Reject absolute paths and anything that climbs out of the output root.
pub fn safe_relative_path(relative: &str) -> Option<PathBuf> {
    let path = Path::new(relative);
    if relative.is_empty() {
        return None;
    }
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}

/// Publish rendered artifacts under `root`. Returns the written paths.
pub fn publish(root: &Path, artifacts: &[Artifact]) -> Result<Vec<PathBuf>, RenderError> {
    let mut written = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        let relative = safe_relative_path(&artifact.path).ok_or_else(|| RenderError::IoFailure {
            path: artifact.path.clone(),
            message: "artifact path must be relative and stay inside the output directory".into(),
        })?;
        let target = root.join(relative);
        write_atomic(&target, &artifact.content).map_err(|e| RenderError::IoFailure {
            path: target.display().to_string(),
            message: e.to_string(),
        })?;
        debug!(path = %target.display(), bytes = artifact.content.len(), "published artifact");
        written.push(target);
    }
    Ok(written)
}
