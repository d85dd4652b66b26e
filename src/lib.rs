//! RestForge Core - REST Client Compiler
//!
//! # Pipeline
//! 1. Entities are ingested from JSON into canonical records
//! 2. Entities compile into a language-agnostic object model (AOM)
//! 3. Each attached template resolves to one exact, pinned version
//! 4. Renderers walk the read-only AOM and emit deterministic artifacts
//! 5. Artifacts are published with staged, atomic writes

pub mod aom;
pub mod builder;
pub mod config;
pub mod entity;
pub mod error;
pub mod hashing;
pub mod ingest;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod project;
pub mod render;
pub mod resolver;
pub mod templates;

pub use aom::{ModelError, Node, NodeKind, RootObject};
pub use config::Settings;
pub use entity::{DeclaredType, Entity, Property, Relationship};
pub use error::{ErrorKind, Kinded};
pub use hashing::{canonical_json, compute_job_hash};
pub use ingest::{Override, SchemaError};
pub use pipeline::{BuildError, BuildPipeline, BuildReport, BuildRequest, BuildState, CancellationToken};
pub use project::{AttachedTemplate, Project, ProjectError};
pub use render::{Artifact, RenderError, Renderer, RendererRegistry};
pub use resolver::{ResolvedTemplate, TemplateResolutionError};
pub use templates::{Manifest, ManifestError, Template, TemplateVersion};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
