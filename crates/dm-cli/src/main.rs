//! Documents RS command-line tool
//!
//! Operator entry point: migrations, uploads, listings and deletions against
//! the configured database and file storage.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dm_core::config::AppConfig;
use dm_db::{Database, PgDocumentStore, PoolConfig};
use dm_documents::{
    DocumentService, DocumentStore, OcrDispatcher, OcrJobHandler, OwnerLifecycleGuard,
    OwnerRegistry, UploadOrchestrator, OCR_JOB, OCR_QUEUE,
};
use dm_files::{AllowedFileTypes, FileService, LocalStorage, UploadedFile};
use dm_jobs::{JobQueue, JobWorker, MemoryJobQueue};

mod ocr;

use ocr::CommandOcrEngine;

#[derive(Parser)]
#[command(name = "documents", version, about = "Manage documents attached to records")]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long, env = "DM_CONFIG", default_value = "documents.toml")]
    config: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Attach files to an owner record
    Upload {
        owner_type: String,
        owner_id: i64,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Run queued OCR tasks through this command (e.g. "pdftotext - -")
        #[arg(long, env = "DM_OCR_COMMAND")]
        ocr_command: Option<String>,
    },

    /// List an owner's documents, newest first
    List {
        owner_type: String,
        owner_id: i64,
        /// Only documents whose file name or text contains this
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one document
    Show { id: i64 },

    /// Delete one document and its file
    Delete { id: i64 },

    /// Delete an owner record, applying the configured document policy
    DeleteOwner { owner_type: String, owner_id: i64 },
}

struct App {
    store: Arc<dyn DocumentStore>,
    registry: Arc<OwnerRegistry>,
    files: Arc<FileService>,
    config: AppConfig,
}

impl App {
    async fn connect(config: AppConfig) -> Result<(Self, Database)> {
        let db = Database::connect(&PoolConfig::from(&config.database))
            .await
            .context("connecting to database")?;

        let storage = LocalStorage::new(&config.storage.local_path, &config.storage.base_url);
        let files = FileService::new(
            Arc::new(storage),
            AllowedFileTypes::default().with_max_file_size(config.storage.max_file_size),
        );

        let app = Self {
            store: Arc::new(PgDocumentStore::new(db.pool().clone())),
            registry: Arc::new(OwnerRegistry::from_config(&config.documents.owners)),
            files: Arc::new(files),
            config,
        };
        Ok((app, db))
    }

    fn documents(&self) -> DocumentService {
        DocumentService::new(self.store.clone(), self.registry.clone(), self.files.clone())
            .loggable_morph(&self.config.documents.loggable_morph)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing(cli.json_logs);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        on_delete = %config.documents.on_delete,
        owners = config.documents.owners.len(),
        "Starting documents"
    );

    let (app, db) = App::connect(config).await?;
    let result = run(&app, &db, cli.command).await;
    db.close().await;
    result
}

async fn run(app: &App, db: &Database, command: Command) -> Result<()> {
    match command {
        Command::Migrate => db.migrate().await?,

        Command::Upload {
            owner_type,
            owner_id,
            files,
            ocr_command,
        } => {
            let mut uploads = Vec::with_capacity(files.len());
            for path in &files {
                let data = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("reading {}", path.display()))?;
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", path.display()))?;
                uploads.push(UploadedFile::new(name, data));
            }

            let queue = Arc::new(MemoryJobQueue::new());
            let orchestrator = UploadOrchestrator::new(
                app.store.clone(),
                app.registry.clone(),
                app.files.clone(),
                OcrDispatcher::new(queue.clone()),
            )
            .configure(&app.config.documents);

            let documents = orchestrator.store(&owner_type, owner_id, uploads).await?;
            print_json(&documents)?;

            let pending = queue.pending_count(OCR_QUEUE).await?;
            if pending > 0 {
                match ocr_command.as_deref().and_then(CommandOcrEngine::parse) {
                    Some(engine) => run_ocr(app, queue, engine).await?,
                    None => info!(pending, "OCR tasks queued, no OCR command configured"),
                }
            }
        }

        Command::List {
            owner_type,
            owner_id,
            search,
        } => {
            let documents = app
                .documents()
                .index(&owner_type, owner_id, search.as_deref())
                .await?;
            print_json(&documents)?;
        }

        Command::Show { id } => {
            let document = app.documents().show(id).await?;
            print_json(&document)?;
        }

        Command::Delete { id } => {
            let document = app.documents().destroy(id).await?;
            print_json(&document)?;
        }

        Command::DeleteOwner {
            owner_type,
            owner_id,
        } => {
            let guard = OwnerLifecycleGuard::new(
                app.config.documents.on_delete,
                app.store.clone(),
                app.registry.clone(),
                app.files.clone(),
            );
            let removed = guard.destroy_owner(&owner_type, owner_id).await?;
            info!(documents = removed.len(), "Owner deleted");
        }
    }

    Ok(())
}

/// Drain the OCR queue in-process
async fn run_ocr(app: &App, queue: Arc<MemoryJobQueue>, engine: CommandOcrEngine) -> Result<()> {
    let mut worker = JobWorker::new(queue.clone(), OCR_QUEUE);
    worker.register(
        OCR_JOB,
        OcrJobHandler::new(Arc::new(app.documents()), Arc::new(engine)),
    );

    let mut processed = 0;
    while worker.process_one().await? {
        processed += 1;
    }

    let failed = queue
        .list(OCR_QUEUE, None)
        .await?
        .into_iter()
        .filter(|job| job.error.is_some())
        .count();
    if failed > 0 {
        bail!("{} of {} OCR tasks failed", failed, processed);
    }

    info!(processed, "OCR tasks completed");
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,dm_documents=debug,sqlx=warn".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_upload() {
        let cli = Cli::try_parse_from([
            "documents",
            "upload",
            "Invoice",
            "7",
            "scan.pdf",
            "photo.png",
        ])
        .unwrap();

        match cli.command {
            Command::Upload {
                owner_type,
                owner_id,
                files,
                ..
            } => {
                assert_eq!(owner_type, "Invoice");
                assert_eq!(owner_id, 7);
                assert_eq!(files.len(), 2);
            }
            _ => panic!("expected upload"),
        }
    }

    #[test]
    fn test_upload_requires_files() {
        assert!(Cli::try_parse_from(["documents", "upload", "Invoice", "7"]).is_err());
    }
}
