//! RestForge CLI
//!
//! Commands: new, build, generate entity, template list|add|remove|update
//! Outputs JSON to stdout, logs to stderr
//! Returns non-zero on any failure

use clap::{Parser, Subcommand};
use serde_json::json;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use restforge_core::{
    ingest, resolver,
    templates::{self, Manifest},
    BuildPipeline, BuildRequest, CancellationToken, ErrorKind, Kinded, Override, Project, Settings,
};

#[derive(Parser)]
#[command(name = "restforge-cli")]
#[command(about = "RestForge CLI - REST client compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project directory
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Where `template update` fetches the manifest from
    #[arg(long, global = true, env = "RESTFORGE_MANIFEST_SOURCE")]
    manifest_source: Option<String>,

    /// Local manifest file (default: <project>/.restforge/manifest.json)
    #[arg(long, global = true, env = "RESTFORGE_MANIFEST_PATH")]
    manifest_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new project
    New {
        name: String,

        /// Directory to create the project in (default: ./<name>)
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Build every attached template
    Build {
        /// Output directory (default: <project>/generated)
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Extra entity JSON files included in this build only
        #[arg(long = "entities")]
        entities: Vec<PathBuf>,
    },

    /// Ingest input into the project
    Generate {
        #[command(subcommand)]
        target: GenerateTarget,
    },

    /// Manage attached templates and the local manifest
    Template {
        #[command(subcommand)]
        action: TemplateAction,
    },
}

#[derive(Subcommand)]
enum GenerateTarget {
    /// Ingest entity JSON (inline or a file path) and merge it into the project
    Entity {
        json: String,

        /// Type correction, e.g. User.nickname=string?
        #[arg(long = "override")]
        overrides: Vec<Override>,
    },
}

#[derive(Subcommand)]
enum TemplateAction {
    /// List templates in the manifest
    List,
    /// Attach a template at its latest version
    Add { name: String },
    /// Detach a template
    Remove { name: String },
    /// Refresh the local manifest from the configured source
    Update,
}

/// Error surfaced to the caller as `{"success": false, "error": {...}}`.
struct Failure {
    kind: ErrorKind,
    message: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

fn failure<E: Kinded + fmt::Display>(error: E) -> Failure {
    Failure {
        kind: error.kind(),
        message: error.to_string(),
    }
}

type CliResult = Result<ExitCode, Failure>;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let settings = Settings::for_project(&cli.project, cli.manifest_source.clone(), cli.manifest_path.clone());

    let result = match cli.command {
        Commands::New { name, path } => new_project(&name, path),
        Commands::Build { out, entities } => build(&cli.project, &settings, out, &entities),
        Commands::Generate {
            target: GenerateTarget::Entity { json, overrides },
        } => generate_entity(&cli.project, &json, &overrides),
        Commands::Template { action } => match action {
            TemplateAction::List => template_list(&cli.project, &settings),
            TemplateAction::Add { name } => template_add(&cli.project, &settings, &name),
            TemplateAction::Remove { name } => template_remove(&cli.project, &name),
            TemplateAction::Update => template_update(&settings),
        },
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            emit(&json!({
                "success": false,
                "error": { "kind": e.kind, "message": e.message },
            }));
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout stays machine-readable JSON.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "restforge_core=info".into()),
    );
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn emit(value: &serde_json::Value) {
    println!("{value:#}");
}

fn new_project(name: &str, path: Option<PathBuf>) -> CliResult {
    let root = path.unwrap_or_else(|| PathBuf::from(name));
    let project = Project::create(name, &root).map_err(failure)?;
    emit(&json!({
        "success": true,
        "project": project.name,
        "path": project.path,
    }));
    Ok(ExitCode::SUCCESS)
}

fn build(root: &Path, settings: &Settings, out: Option<PathBuf>, entities: &[PathBuf]) -> CliResult {
    let project = Project::load(root).map_err(failure)?;
    let manifest = Manifest::load_or_default(&settings.manifest_path).map_err(failure)?;

    let mut request = BuildRequest::new(&project, &manifest).with_output(out.unwrap_or_else(|| root.join("generated")));
    for path in entities {
        request = request.with_source(read_input(path)?);
    }

    let report = BuildPipeline::default()
        .build(&request, &CancellationToken::new())
        .map_err(failure)?;
    let value = serde_json::to_value(&report).map_err(|e| Failure {
        kind: ErrorKind::Serialization,
        message: e.to_string(),
    })?;
    emit(&value);

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn generate_entity(root: &Path, input: &str, overrides: &[Override]) -> CliResult {
    let mut project = Project::load(root).map_err(failure)?;
    let raw = if looks_inline(input) {
        input.to_string()
    } else {
        read_input(Path::new(input))?
    };

    let entities = ingest::parse_with_overrides(&raw, overrides).map_err(failure)?;
    let summary = project.merge_entities(entities);
    project.save().map_err(failure)?;

    emit(&json!({
        "success": true,
        "added": summary.added,
        "replaced": summary.replaced,
        "entities": project.entities.len(),
    }));
    Ok(ExitCode::SUCCESS)
}

fn template_list(root: &Path, settings: &Settings) -> CliResult {
    let manifest = Manifest::load_or_default(&settings.manifest_path).map_err(failure)?;
    // listing works outside a project; pins are shown only inside one
    let project = Project::load(root).ok();

    let templates: Vec<_> = manifest
        .list()
        .into_iter()
        .map(|t| {
            let latest = resolver::resolve(&manifest, &t.name, None).ok();
            let attached = project.as_ref().and_then(|p| p.attached(&t.name));
            json!({
                "name": t.name,
                "language": t.language,
                "framework": t.framework,
                "description": t.description,
                "latest": latest.map(|r| r.version.version),
                "pinned": attached.map(|a| &a.version),
                "upgrade": attached
                    .and_then(|a| resolver::available_upgrade(&manifest, a))
                    .map(|v| v.version),
            })
        })
        .collect();

    emit(&json!(templates));
    Ok(ExitCode::SUCCESS)
}

fn template_add(root: &Path, settings: &Settings, name: &str) -> CliResult {
    let mut project = Project::load(root).map_err(failure)?;
    let manifest = Manifest::load_or_default(&settings.manifest_path).map_err(failure)?;
    let attached = resolver::add(&mut project, &manifest, name).map_err(failure)?;
    project.save().map_err(failure)?;
    emit(&json!({ "success": true, "template": attached }));
    Ok(ExitCode::SUCCESS)
}

fn template_remove(root: &Path, name: &str) -> CliResult {
    let mut project = Project::load(root).map_err(failure)?;
    if !resolver::remove(&mut project, name) {
        return Err(Failure {
            kind: ErrorKind::NotFound,
            message: format!("Template '{name}' is not attached to this project"),
        });
    }
    project.save().map_err(failure)?;
    emit(&json!({ "success": true, "removed": name }));
    Ok(ExitCode::SUCCESS)
}

fn template_update(settings: &Settings) -> CliResult {
    let source = templates::source_for(&settings.manifest_source).map_err(failure)?;
    let update = templates::update_manifest(source.as_ref(), &settings.manifest_path).map_err(failure)?;
    emit(&json!({
        "success": true,
        "source": source.describe(),
        "update": update,
    }));
    Ok(ExitCode::SUCCESS)
}

fn looks_inline(input: &str) -> bool {
    matches!(input.trim_start().chars().next(), Some('{') | Some('['))
}

fn read_input(path: &Path) -> Result<String, Failure> {
    fs::read_to_string(path).map_err(|e| Failure {
        kind: ErrorKind::Malformed,
        message: format!("Failed to read '{}': {e}", path.display()),
    })
}
