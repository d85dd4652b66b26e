//! Template Version Resolver
//!
//! Selects the exact template version a project renders with. Without a pin
//! the highest semantic version wins; with a pin the pinned id must still
//! exist. A pinned template is never upgraded implicitly.

use semver::Version;
use serde::Serialize;
use std::cmp::Ordering;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::{ErrorKind, Kinded};
use crate::project::{AttachedTemplate, Project};
use crate::templates::{Manifest, Template, TemplateVersion};
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Error)]
pub enum TemplateResolutionError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template '{0}' is already added to this project")]
    AlreadyAdded(String),

    #[error("Template '{name}' pinned version '{version_id}' is no longer in the manifest")]
    VersionGone { name: String, version_id: String },

    #[error("Template '{name}' version {version} requires engine >= {required}, current is {current}")]
    Incompatible {
        name: String,
        version: String,
        required: String,
        current: String,
    },

    #[error("Template '{0}' has no usable version")]
    NoUsableVersion(String),
}

impl Kinded for TemplateResolutionError {
    fn kind(&self) -> ErrorKind {
        match self {
            TemplateResolutionError::NotFound(_) => ErrorKind::NotFound,
            TemplateResolutionError::AlreadyAdded(_) => ErrorKind::AlreadyAdded,
            TemplateResolutionError::VersionGone { .. } => ErrorKind::VersionGone,
            TemplateResolutionError::Incompatible { .. } => ErrorKind::Incompatible,
            TemplateResolutionError::NoUsableVersion(_) => ErrorKind::NoUsableVersion,
        }
    }
}

/// A template bound to one exact version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTemplate {
    pub name: String,
    pub language: String,
    pub framework: String,
    pub version: TemplateVersion,
}

impl ResolvedTemplate {
    fn bind(template: &Template, version: &TemplateVersion) -> Self {
        Self {
            name: template.name.clone(),
            language: template.language.clone(),
            framework: template.framework.clone(),
            version: version.clone(),
        }
    }
}

/// Resolve `name` against the manifest, honoring `pin` when given.
pub fn resolve(
    manifest: &Manifest,
    name: &str,
    pin: Option<&str>,
) -> Result<ResolvedTemplate, TemplateResolutionError> {
    let template = manifest
        .get(name)
        .ok_or_else(|| TemplateResolutionError::NotFound(name.to_string()))?;

    let version = match pin {
        Some(id) => {
            let version = template
                .version_by_id(id)
                .ok_or_else(|| TemplateResolutionError::VersionGone {
                    name: name.to_string(),
                    version_id: id.to_string(),
                })?;
            check_engine_version(template, version)?;
            version
        }
        None => latest(template)?,
    };

    debug!(template = %name, version = %version.version, id = %version.id, pinned = pin.is_some(), "resolved template");
    Ok(ResolvedTemplate::bind(template, version))
}

/// Highest-precedence compatible version of a template.
fn latest(template: &Template) -> Result<&TemplateVersion, TemplateResolutionError> {
    let candidates: Vec<(Version, &TemplateVersion)> = template
        .versions
        .iter()
        .filter_map(|v| match Version::parse(&v.version) {
            Ok(parsed) => Some((parsed, v)),
            Err(e) => {
                warn!(template = %template.name, version = %v.version, error = %e, "skipping version with invalid semver");
                None
            }
        })
        .filter(|(_, v)| match check_engine_version(template, v) {
            Ok(()) => true,
            Err(e) => {
                debug!(template = %template.name, version = %v.version, error = %e, "skipping incompatible version");
                false
            }
        })
        .collect();

    candidates
        .into_iter()
        .max_by(|a, b| compare(a, b))
        .map(|(_, v)| v)
        .ok_or_else(|| TemplateResolutionError::NoUsableVersion(template.name.clone()))
}

/// Semantic-version precedence (build metadata ignored), then `date_added`,
/// then id, so the order is total.
fn compare(a: &(Version, &TemplateVersion), b: &(Version, &TemplateVersion)) -> Ordering {
    let (va, ta) = a;
    let (vb, tb) = b;
    va.major
        .cmp(&vb.major)
        .then(va.minor.cmp(&vb.minor))
        .then(va.patch.cmp(&vb.patch))
        .then_with(|| va.pre.cmp(&vb.pre))
        .then_with(|| ta.date_added.cmp(&tb.date_added))
        .then_with(|| ta.id.cmp(&tb.id))
}

fn check_engine_version(
    template: &Template,
    version: &TemplateVersion,
) -> Result<(), TemplateResolutionError> {
    let Some(required) = &version.engine_min_version else {
        return Ok(());
    };
    let incompatible = || TemplateResolutionError::Incompatible {
        name: template.name.clone(),
        version: version.version.clone(),
        required: required.clone(),
        current: ENGINE_VERSION.to_string(),
    };
    let engine = Version::parse(ENGINE_VERSION).map_err(|_| incompatible())?;
    let min = Version::parse(required).map_err(|_| incompatible())?;
    if engine < min {
        return Err(incompatible());
    }
    Ok(())
}

/// Attach a template to a project at its latest version.
pub fn add(
    project: &mut Project,
    manifest: &Manifest,
    name: &str,
) -> Result<AttachedTemplate, TemplateResolutionError> {
    if project.attached(name).is_some() {
        return Err(TemplateResolutionError::AlreadyAdded(name.to_string()));
    }
    let resolved = resolve(manifest, name, None)?;
    let attached = AttachedTemplate {
        name: resolved.name,
        version_id: resolved.version.id,
        version: resolved.version.version,
    };
    project.templates.push(attached.clone());
    info!(project = %project.name, template = %name, version = %attached.version, "template added");
    Ok(attached)
}

/// Detach a template. Returns whether anything was removed; an absent name
/// is not an error here.
pub fn remove(project: &mut Project, name: &str) -> bool {
    let before = project.templates.len();
    project.templates.retain(|t| t.name != name);
    let removed = project.templates.len() != before;
    if removed {
        info!(project = %project.name, template = %name, "template removed");
    }
    removed
}

/// A newer version than the pin, if the manifest has one. Informational only.
pub fn available_upgrade(manifest: &Manifest, attached: &AttachedTemplate) -> Option<TemplateVersion> {
    let template = manifest.get(&attached.name)?;
    let newest = latest(template).ok()?;
    if newest.id == attached.version_id {
        return None;
    }
    match template.version_by_id(&attached.version_id) {
        Some(pinned) => {
            let newer = match (Version::parse(&newest.version), Version::parse(&pinned.version)) {
                (Ok(n), Ok(p)) => compare(&(n, newest), &(p, pinned)) == Ordering::Greater,
                _ => false,
            };
            newer.then(|| newest.clone())
        }
        // pin gone from the manifest; the latest is the only way forward
        None => Some(newest.clone()),
    }
}
