//! Renderer / Emitter
//!
//! Renderers turn a read-only `RootObject` into artifacts for one bound
//! template. They never touch the filesystem and never mutate the model;
//! the same model and template version always produce the same bytes.

pub mod csharp;
pub(crate) mod engine;
pub(crate) mod filters;
pub mod typescript;

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::aom::{Node, PropertyKind, RootObject};
use crate::error::{ErrorKind, Kinded};
use crate::hashing::sha256_hex;
use crate::resolver::ResolvedTemplate;

#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Unsupported construct at '{node}': {kind}")]
    UnsupportedConstruct { node: String, kind: String },

    #[error("I/O failure for '{path}': {message}")]
    IoFailure { path: String, message: String },

    #[error("No renderer for language '{language}' (framework '{framework}')")]
    NoRenderer { language: String, framework: String },

    #[error("Template engine error in '{template}': {message}")]
    Engine { template: String, message: String },

    #[error("Render cancelled before dispatch")]
    Cancelled,
}

impl Kinded for RenderError {
    fn kind(&self) -> ErrorKind {
        match self {
            RenderError::UnsupportedConstruct { .. } => ErrorKind::UnsupportedConstruct,
            RenderError::IoFailure { .. } => ErrorKind::IoFailure,
            RenderError::NoRenderer { .. } => ErrorKind::NoRenderer,
            RenderError::Engine { .. } => ErrorKind::Engine,
            RenderError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

impl RenderError {
    pub(crate) fn unsupported_property(node: &Node, kind: &PropertyKind) -> Self {
        RenderError::UnsupportedConstruct {
            node: node.path().to_string(),
            kind: format!("property of kind {kind}"),
        }
    }
}

/// One output file, relative to the template's output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub path: String,
    pub content: String,
    pub sha256: String,
}

impl Artifact {
    pub fn new(path: impl Into<String>, content: String) -> Self {
        let sha256 = sha256_hex(content.as_bytes());
        Self {
            path: path.into(),
            content,
            sha256,
        }
    }
}

pub trait Renderer: Send + Sync {
    /// Template language this renderer serves, lowercase.
    fn language(&self) -> &'static str;

    fn render(&self, model: &RootObject, template: &ResolvedTemplate) -> Result<Vec<Artifact>, RenderError>;
}

/// Language -> renderer.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    renderers: HashMap<String, Arc<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the C# and TypeScript renderers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(csharp::CSharpRenderer));
        registry.register(Arc::new(typescript::TypeScriptRenderer));
        registry
    }

    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        self.renderers.insert(renderer.language().to_lowercase(), renderer);
    }

    pub fn get(&self, language: &str) -> Option<&Arc<dyn Renderer>> {
        self.renderers.get(&language.to_lowercase())
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.renderers.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }

    pub fn render(&self, model: &RootObject, template: &ResolvedTemplate) -> Result<Vec<Artifact>, RenderError> {
        let renderer = self.get(&template.language).ok_or_else(|| RenderError::NoRenderer {
            language: template.language.clone(),
            framework: template.framework.clone(),
        })?;
        renderer.render(model, template)
    }
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

/// First line of every generated source file.
pub(crate) fn banner(template: &ResolvedTemplate) -> String {
    format!(
        "Generated by {} {} ({}). Do not edit.",
        template.name, template.version.version, template.version.commit
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::aom::RootObject;
    use crate::builder::build;
    use crate::ingest::parse_value;
    use crate::resolver::ResolvedTemplate;
    use crate::templates::TemplateVersion;
    use chrono::{TimeZone, Utc};

    pub fn model(value: serde_json::Value) -> RootObject {
        build(&parse_value(&value).unwrap(), "acme.shop").unwrap()
    }

    pub fn bound(name: &str, language: &str, framework: &str) -> ResolvedTemplate {
        ResolvedTemplate {
            name: name.into(),
            language: language.into(),
            framework: framework.into(),
            version: TemplateVersion {
                id: format!("{name}-v1"),
                version: "1.0.0".into(),
                commit: "0a1b2c3".into(),
                date_added: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                engine_min_version: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{bound, model};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = RendererRegistry::with_builtins();
        assert!(registry.get("CSharp").is_some());
        assert!(registry.get("typescript").is_some());
        assert_eq!(registry.languages(), vec!["csharp", "typescript"]);
    }

    #[test]
    fn test_registry_without_renderer() {
        let registry = RendererRegistry::with_builtins();
        let root = model(json!({"name": "User", "properties": {"id": "string"}}));
        let err = registry
            .render(&root, &bound("go-rest", "go", "nethttp"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoRenderer);
    }

    #[test]
    fn test_artifact_digest() {
        let a = Artifact::new("x.txt", "abc".to_string());
        assert_eq!(a.sha256, "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }
}
