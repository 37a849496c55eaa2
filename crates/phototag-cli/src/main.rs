use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use phototag_core::{
    spawn_detector, Classification, ClassificationPipeline, DetectionOutcome, Editor, FaceDetect,
    NameGenerator, Project, ProjectId, ProjectSummary, ScrfdDetector, UnavailableDetector,
};
use phototag_export::{DocumentsSink, ExportError, ExportSink, Exporter, PhotoLibrarySink};
use phototag_store::{ProjectStore, SqliteStore};
use std::io::{BufRead, Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "phototag", version, about = "Classify, catalogue and export photos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an image, classify it and save it as a project
    Import {
        /// Image file to import ("-" reads stdin)
        path: PathBuf,
        /// Save without asking for confirmation
        #[arg(short, long)]
        yes: bool,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// List projects, newest first
    List {
        #[arg(long)]
        json: bool,
    },
    /// List projects whose name contains QUERY (case-insensitive)
    Search {
        query: String,
        #[arg(long)]
        json: bool,
    },
    /// Show one project
    Show { id: ProjectId },
    /// Export a project to the photo library and documents
    Export { id: ProjectId },
    /// Delete a project
    Delete { id: ProjectId },
    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Import { path, yes, json } => import(&config, &path, yes, json).await,
        Commands::List { json } => {
            let store = open_store(&config)?;
            print_projects(&store.list()?, json)
        }
        Commands::Search { query, json } => {
            let store = open_store(&config)?;
            let found = store.search(&query)?;
            if found.is_empty() && !json {
                println!("No results found");
                return Ok(());
            }
            print_projects(&found, json)
        }
        Commands::Show { id } => {
            let store = open_store(&config)?;
            let project = store.get(&id)?.with_context(|| format!("project {id} not found"))?;
            println!("{}", serde_json::to_string_pretty(&project.summary())?);
            Ok(())
        }
        Commands::Export { id } => export(&config, &id),
        Commands::Delete { id } => {
            let mut store = open_store(&config)?;
            store.delete(&id)?;
            println!("Deleted {id}");
            Ok(())
        }
        Commands::Status => status(&config),
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    SqliteStore::open(&config.db_path)
        .with_context(|| format!("opening project store {}", config.db_path.display()))
}

/// Load SCRFD, or fall back to a detector that always degrades to "no face".
fn load_detector(config: &Config) -> Box<dyn FaceDetect> {
    let model_path = config.scrfd_model_path();
    match ScrfdDetector::load(&model_path, config.detection_threshold) {
        Ok(detector) => Box::new(detector),
        Err(err) => {
            tracing::warn!(
                path = %model_path.display(),
                error = %err,
                "face detector unavailable; imports will be marked as having no face"
            );
            Box::new(UnavailableDetector::new(err.to_string()))
        }
    }
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    if path == Path::new("-") {
        let mut bytes = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("reading image from stdin")?;
        return Ok(bytes);
    }
    std::fs::read(path).with_context(|| format!("reading {}", path.display()))
}

async fn import(config: &Config, path: &Path, yes: bool, json: bool) -> Result<()> {
    if path == Path::new("-") && !yes {
        bail!("--yes is required when the image is read from stdin");
    }
    let bytes = read_image(path)?;
    let mut store = open_store(config)?;

    let mut editor = Editor::new();
    let classification = classify_into(
        &store,
        load_detector(config),
        config.persist_name_counter,
        &mut editor,
        bytes,
    )
    .await
    .with_context(|| format!("cannot import {}", path.display()))?;

    if !json {
        print_classification(&classification);
    }

    if !yes && !confirm(&format!("Save as project {}?", classification.suggested_name))? {
        editor.discard();
        if json {
            println!("{}", serde_json::json!({ "saved": false, "classification": classification }));
        } else {
            println!("Discarded");
        }
        return Ok(());
    }

    let summary = save_project(&mut store, &config.documents_dir, editor.confirm()?)?;

    if json {
        let saved = serde_json::json!({
            "saved": true,
            "classification": classification,
            "project": summary,
        });
        println!("{saved}");
    } else {
        println!("Saved {} ({})", summary.name, summary.id);
    }
    Ok(())
}

/// Classify `bytes` into `editor`, naming from the store's counter when
/// `persist_name_counter` is set.
///
/// The spent name is written back before anything is confirmed, so a later
/// discard still never reuses it.
async fn classify_into(
    store: &SqliteStore,
    detector: Box<dyn FaceDetect>,
    persist_name_counter: bool,
    editor: &mut Editor,
    bytes: Vec<u8>,
) -> Result<Classification> {
    let names = match store.name_counter()? {
        Some(next) if persist_name_counter => NameGenerator::starting_at(next),
        _ => NameGenerator::new(),
    };
    let pipeline = ClassificationPipeline::new(spawn_detector(detector)?, names);

    let classification = editor.import(&pipeline, bytes).await?.classification.clone();
    if persist_name_counter {
        store.save_name_counter(pipeline.names().peek_next())?;
    }
    Ok(classification)
}

/// Insert a confirmed project, then keep a copy of it in the documents
/// directory. A failed copy is logged and the project stays saved.
fn save_project(
    store: &mut SqliteStore,
    documents_dir: &Path,
    project: Project,
) -> Result<ProjectSummary> {
    let summary = project.summary();
    store.insert(project.clone())?;
    save_to_documents(documents_dir, &project);
    Ok(summary)
}

fn save_to_documents(dir: &Path, project: &Project) -> Option<PathBuf> {
    let result = project
        .decode_image()
        .map_err(|source| ExportError::Decode {
            name: project.name.clone(),
            source,
        })
        .and_then(|image| DocumentsSink::new(dir).export(&image, &project.name));

    match result {
        Ok(path) => Some(path),
        Err(err) => {
            tracing::warn!(
                name = %project.name,
                dir = %dir.display(),
                error = %err,
                "project saved but not copied to documents"
            );
            None
        }
    }
}

fn print_classification(c: &Classification) {
    let face = match c.detection {
        DetectionOutcome::FaceFound => "yes",
        DetectionOutcome::NoFace | DetectionOutcome::Degraded => "no",
    };
    println!("name:        {}", c.suggested_name);
    println!("size:        {}x{} ({})", c.width, c.height, c.orientation);
    println!("face:        {face}");
}

/// Ask on stderr so stdout stays clean for `--json`.
fn confirm(prompt: &str) -> Result<bool> {
    ask(prompt, std::io::stdin().lock(), std::io::stderr())
}

fn ask(prompt: &str, mut input: impl BufRead, mut out: impl Write) -> Result<bool> {
    write!(out, "{prompt} [Y/n] ")?;
    out.flush()?;
    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "" | "y" | "yes")
}

fn print_projects(projects: &[Project], json: bool) -> Result<()> {
    let summaries: Vec<ProjectSummary> = projects.iter().map(|p| p.summary()).collect();
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("No projects yet");
        return Ok(());
    }
    for s in &summaries {
        println!("{}", format_summary_line(s));
    }
    Ok(())
}

fn format_summary_line(s: &ProjectSummary) -> String {
    let face = if s.has_face { "face" } else { "-" };
    let invalid = if s.valid_image { "" } else { "  [invalid image]" };
    format!(
        "{}  {:<20} {:<10} {:<4}  {}{invalid}",
        s.id,
        s.name,
        s.orientation,
        face,
        s.created_at.format("%Y-%m-%d %H:%M"),
    )
}

fn export(config: &Config, id: &ProjectId) -> Result<()> {
    let store = open_store(config)?;
    let project = store.get(id)?.with_context(|| format!("project {id} not found"))?;

    let exporter = Exporter::new()
        .with_sink(PhotoLibrarySink::new(&config.library_dir))
        .with_sink(DocumentsSink::new(&config.documents_dir));

    let report = exporter.export_project(&project)?;
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(path) => println!("  {}: {}", outcome.target, path.display()),
            Err(err) => eprintln!("  {}: {err}", outcome.target),
        }
    }
    println!("{}", report.message());
    report.into_result()?;
    Ok(())
}

fn status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let model_path = config.scrfd_model_path();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "projects": store.len()?,
            "next_name_index": store.name_counter()?.unwrap_or(1),
            "detector_model": model_path,
            "detector_model_present": model_path.exists(),
            "config": config,
        }))?
    );
    Ok(())
}
