//! Build Orchestrator - Single Entry Point
//!
//! Sequences ingestion, model construction, template resolution and render
//! for every template attached to a project. Ingestion and model errors are
//! fatal; resolution and render errors are recorded per template and never
//! abort sibling templates.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::aom::{ModelError, RootObject};
use crate::builder;
use crate::entity::merge_entities;
use crate::error::{ErrorKind, Kinded};
use crate::hashing::compute_job_hash;
use crate::ingest::{self, SchemaError};
use crate::output::{publish, safe_relative_path};
use crate::project::{AttachedTemplate, Project};
use crate::render::{Artifact, RenderError, RendererRegistry};
use crate::resolver::{self, TemplateResolutionError};
use crate::templates::Manifest;
use crate::ENGINE_VERSION;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Loaded,
    EntitiesIngested,
    ModelBuilt,
    Rendering,
    Completed,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildState::Loaded => "loaded",
            BuildState::EntitiesIngested => "entities_ingested",
            BuildState::ModelBuilt => "model_built",
            BuildState::Rendering => "rendering",
            BuildState::Completed => "completed",
            BuildState::Failed => "failed",
        })
    }
}

/// Shared cancel flag. Templates not yet dispatched when it is set get a
/// `cancelled` outcome; renders already running finish.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Fatal build failures.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Failed to fingerprint model: {0}")]
    Fingerprint(#[from] serde_json::Error),
}

impl Kinded for BuildError {
    fn kind(&self) -> ErrorKind {
        match self {
            BuildError::Schema(e) => e.kind(),
            BuildError::Model(e) => e.kind(),
            BuildError::Fingerprint(_) => ErrorKind::Serialization,
        }
    }
}

/// Per-template failure.
#[derive(Debug, Clone, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Resolution(#[from] TemplateResolutionError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

impl Kinded for TemplateError {
    fn kind(&self) -> ErrorKind {
        match self {
            TemplateError::Resolution(e) => e.kind(),
            TemplateError::Render(e) => e.kind(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub project: &'a Project,
    pub manifest: &'a Manifest,
    /// Raw entity JSON merged over the project's stored entities for this build only.
    pub extra_sources: Vec<String>,
    /// When set, artifacts are published under `<out_dir>/<template name>/`.
    pub out_dir: Option<PathBuf>,
}

impl<'a> BuildRequest<'a> {
    pub fn new(project: &'a Project, manifest: &'a Manifest) -> Self {
        Self {
            project,
            manifest,
            extra_sources: Vec::new(),
            out_dir: None,
        }
    }

    pub fn with_source(mut self, raw: impl Into<String>) -> Self {
        self.extra_sources.push(raw.into());
        self
    }

    pub fn with_output(mut self, out_dir: impl Into<PathBuf>) -> Self {
        self.out_dir = Some(out_dir.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedTemplate {
    pub version_id: String,
    pub version: String,
    pub job_hash: String,
    #[serde(serialize_with = "artifact_digests")]
    pub artifacts: Vec<Artifact>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub written: Vec<PathBuf>,
}

/// Reports carry paths and digests, not file contents.
fn artifact_digests<S: Serializer>(artifacts: &[Artifact], serializer: S) -> Result<S::Ok, S::Error> {
    #[derive(Serialize)]
    struct Digest<'a> {
        path: &'a str,
        sha256: &'a str,
    }
    serializer.collect_seq(artifacts.iter().map(|a| Digest {
        path: &a.path,
        sha256: &a.sha256,
    }))
}

#[derive(Debug, Clone)]
pub struct TemplateOutcome {
    pub template: String,
    pub result: Result<RenderedTemplate, TemplateError>,
}

impl TemplateOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&TemplateError> {
        self.result.as_ref().err()
    }

    pub fn rendered(&self) -> Option<&RenderedTemplate> {
        self.result.as_ref().ok()
    }
}

impl Serialize for TemplateOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct Failure {
            kind: ErrorKind,
            message: String,
        }

        #[derive(Serialize)]
        struct Record<'a> {
            template: &'a str,
            success: bool,
            #[serde(skip_serializing_if = "Option::is_none")]
            rendered: Option<&'a RenderedTemplate>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<Failure>,
        }

        Record {
            template: &self.template,
            success: self.is_success(),
            rendered: self.rendered(),
            error: self.error().map(|e| Failure {
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub build_id: String,
    pub created_at: DateTime<Utc>,
    pub project: String,
    pub engine_version: String,
    pub transitions: Vec<BuildState>,
    pub state: BuildState,
    pub model_fingerprint: String,
    pub outcomes: Vec<TemplateOutcome>,
}

impl BuildReport {
    pub fn is_success(&self) -> bool {
        self.state == BuildState::Completed
    }

    pub fn failures(&self) -> impl Iterator<Item = &TemplateOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn outcome(&self, template: &str) -> Option<&TemplateOutcome> {
        self.outcomes.iter().find(|o| o.template == template)
    }
}

/// Records state transitions as the build advances.
struct Transitions {
    build_id: String,
    taken: Vec<BuildState>,
}

impl Transitions {
    fn start(build_id: &str) -> Self {
        info!(build = %build_id, state = %BuildState::Loaded, "build started");
        Self {
            build_id: build_id.to_string(),
            taken: vec![BuildState::Loaded],
        }
    }

    fn advance(&mut self, to: BuildState) {
        let from = self.current();
        info!(build = %self.build_id, from = %from, to = %to, "build state");
        self.taken.push(to);
    }

    fn current(&self) -> BuildState {
        self.taken.last().copied().unwrap_or(BuildState::Loaded)
    }
}

/// The build orchestrator - single entry point for project builds.
#[derive(Debug, Clone)]
pub struct BuildPipeline {
    renderers: RendererRegistry,
}

impl BuildPipeline {
    pub fn new(renderers: RendererRegistry) -> Self {
        Self { renderers }
    }

    pub fn renderers(&self) -> &RendererRegistry {
        &self.renderers
    }

    /// Run a full build.
    ///
    /// Returns `Err` only for fatal failures before rendering. Once rendering
    /// starts every attached template gets an outcome and the report's state
    /// is `Failed` if any of them failed.
    pub fn build(&self, request: &BuildRequest<'_>, cancel: &CancellationToken) -> Result<BuildReport, BuildError> {
        let build_id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let project = request.project;
        let mut transitions = Transitions::start(&build_id);

        let mut entities = ingest::parse_value(&project.entity_document()).map_err(|e| fatal(&build_id, e))?;
        for raw in &request.extra_sources {
            let incoming = ingest::parse(raw).map_err(|e| fatal(&build_id, e))?;
            merge_entities(&mut entities, incoming);
        }
        transitions.advance(BuildState::EntitiesIngested);

        let model = builder::build(&entities, &project.name).map_err(|e| fatal(&build_id, e))?;
        let model_fingerprint = model.fingerprint().map_err(|e| fatal(&build_id, e))?;
        let model = Arc::new(model);
        transitions.advance(BuildState::ModelBuilt);

        transitions.advance(BuildState::Rendering);
        let outcomes = self.render_all(request, &model, &model_fingerprint, cancel);

        let failed = outcomes.iter().filter(|o| !o.is_success()).count();
        let state = if failed == 0 {
            BuildState::Completed
        } else {
            BuildState::Failed
        };
        transitions.advance(state);
        info!(
            build = %build_id,
            project = %project.name,
            templates = outcomes.len(),
            failed,
            "build finished"
        );

        Ok(BuildReport {
            build_id,
            created_at,
            project: project.name.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            state,
            transitions: transitions.taken,
            model_fingerprint,
            outcomes,
        })
    }

    /// One rayon worker per attached template, capped by the machine.
    /// Outcomes keep attach order.
    fn render_all(
        &self,
        request: &BuildRequest<'_>,
        model: &Arc<RootObject>,
        fingerprint: &str,
        cancel: &CancellationToken,
    ) -> Vec<TemplateOutcome> {
        let jobs = &request.project.templates;
        let run = || {
            jobs.par_iter()
                .map(|attached| self.run_template(request, Arc::clone(model), fingerprint, attached, cancel))
                .collect::<Vec<_>>()
        };

        match rayon::ThreadPoolBuilder::new().num_threads(worker_count(jobs.len())).build() {
            Ok(pool) => pool.install(run),
            Err(e) => {
                warn!(error = %e, "could not size render pool, using the global pool");
                run()
            }
        }
    }

    fn run_template(
        &self,
        request: &BuildRequest<'_>,
        model: Arc<RootObject>,
        fingerprint: &str,
        attached: &AttachedTemplate,
        cancel: &CancellationToken,
    ) -> TemplateOutcome {
        let result = if cancel.is_cancelled() {
            Err(TemplateError::Render(RenderError::Cancelled))
        } else {
            self.render_template(request, &model, fingerprint, attached)
        };

        if let Err(e) = &result {
            warn!(template = %attached.name, kind = %e.kind(), error = %e, "template failed");
        }
        TemplateOutcome {
            template: attached.name.clone(),
            result,
        }
    }

    fn render_template(
        &self,
        request: &BuildRequest<'_>,
        model: &RootObject,
        fingerprint: &str,
        attached: &AttachedTemplate,
    ) -> Result<RenderedTemplate, TemplateError> {
        let bound = resolver::resolve(request.manifest, &attached.name, Some(&attached.version_id))?;
        let artifacts = self.renderers.render(model, &bound)?;

        let written = match &request.out_dir {
            Some(out_dir) => publish(&template_dir(out_dir, &attached.name)?, &artifacts)?,
            None => Vec::new(),
        };
        info!(
            template = %bound.name,
            version = %bound.version.version,
            artifacts = artifacts.len(),
            written = written.len(),
            "template rendered"
        );

        Ok(RenderedTemplate {
            job_hash: compute_job_hash(&bound.name, &bound.version.id, fingerprint, ENGINE_VERSION),
            version_id: bound.version.id,
            version: bound.version.version,
            artifacts,
            written,
        })
    }
}

impl Default for BuildPipeline {
    fn default() -> Self {
        Self::new(RendererRegistry::with_builtins())
    }
}

fn fatal<E: Into<BuildError>>(build_id: &str, error: E) -> BuildError {
    let error = error.into();
    warn!(build = %build_id, state = %BuildState::Failed, kind = %error.kind(), error = %error, "build failed");
    error
}

fn template_dir(out_dir: &Path, template: &str) -> Result<PathBuf, RenderError> {
    safe_relative_path(template)
        .map(|relative| out_dir.join(relative))
        .ok_or_else(|| RenderError::IoFailure {
            path: template.to_string(),
            message: "template name is not a valid output directory".into(),
        })
}

fn worker_count(templates: usize) -> usize {
    let cap = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    templates.clamp(1, cap.max(1))
}
