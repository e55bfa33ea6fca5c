//! lexi-enrich - command-line front end for the enrichment pipeline
//!
//! Reads a word list (file or stdin), runs one enrichment task against the
//! configured backend, streams progress, and saves the collection.
//! Ctrl+C cancels the task; whatever was merged before that is kept.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use lexi_common::config::{load_toml_config, resolve_config_path, resolve_root_folder, TomlConfig};
use lexi_common::events::{EventBus, LexiEvent};
use lexi_common::store::KeyValueStore;
use lexi_enrich::config::{build_backend, build_task_manager};
use lexi_enrich::models::{Task, TaskOutcome};
use lexi_enrich::services::SharedCollection;
use tokio::io::AsyncReadExt;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for lexi-enrich
#[derive(Parser, Debug)]
#[command(name = "lexi-enrich")]
#[command(about = "Enrich a vocabulary list and merge it into the word collection")]
#[command(version)]
struct Args {
    /// Config file (defaults to $LEXI_CONFIG, then the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Folder holding the collection store (defaults to $LEXI_ROOT_FOLDER, then config)
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Word list to enrich, or "-" for stdin
    input: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match resolve_config_path(args.config.as_deref()) {
        Some(path) => load_toml_config(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => TomlConfig::default(),
    };

    // Initialize tracing (RUST_LOG wins over the config file)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting lexi-enrich {}", env!("CARGO_PKG_VERSION"));

    let raw = read_input(&args.input).await?;

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    let store = KeyValueStore::in_root_folder(&root_folder);
    info!("Collection store: {}", store.path().display());

    let collection = Arc::new(SharedCollection::load(&store).context("Failed to load word collection")?);
    info!("Collection holds {} word(s)", collection.len());

    let event_bus = EventBus::new(100);
    let mut events = event_bus.subscribe();

    let backend = Arc::new(build_backend(&config).context("Failed to build backend client")?);
    let manager = build_task_manager(&config, backend, collection.clone(), Arc::new(event_bus.clone()))
        .context("Invalid enrichment configuration")?;

    let task_id = manager.start(&raw).context("Failed to start enrichment task")?;
    info!(task_id = %task_id, "Enrichment task started");

    let wait = manager.wait(task_id);
    tokio::pin!(wait);
    let mut cancel_sent = false;

    let task = loop {
        tokio::select! {
            task = &mut wait => break task,
            event = events.recv() => match event {
                Ok(event) => report_event(&event),
                Err(RecvError::Lagged(missed)) => warn!("Progress display lagged; {} event(s) skipped", missed),
                Err(RecvError::Closed) => {}
            },
            result = signal::ctrl_c(), if !cancel_sent => {
                result.context("Failed to listen for Ctrl+C")?;
                info!("Received Ctrl+C, cancelling task");
                manager.cancel(task_id);
                cancel_sent = true;
            }
        }
    };

    while let Ok(event) = events.try_recv() {
        report_event(&event);
    }

    let task = task.context("Task disappeared from the registry")?;

    collection
        .save(&store)
        .with_context(|| format!("Failed to save collection to {}", store.path().display()))?;

    print_summary(&task, &collection);

    if task.error.is_some() {
        anyhow::bail!("Enrichment task failed");
    }
    Ok(())
}

async fn read_input(input: &str) -> Result<String> {
    if input == "-" {
        let mut raw = String::new();
        tokio::io::stdin()
            .read_to_string(&mut raw)
            .await
            .context("Failed to read word list from stdin")?;
        Ok(raw)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read word list from {}", input))
    }
}

fn report_event(event: &LexiEvent) {
    match event {
        LexiEvent::TaskStarted { total_items, .. } => {
            eprintln!("Processing {} item(s)...", total_items);
        }
        LexiEvent::TaskProgress { data, .. } => {
            eprintln!(
                "[{:>3}%] {} ({} added, {} skipped, {} failed)",
                data.progress, data.current_operation, data.added, data.skipped, data.failed
            );
        }
        LexiEvent::TaskCompleted { duration_ms, .. } => {
            eprintln!("Done in {:.1}s", *duration_ms as f64 / 1000.0);
        }
        LexiEvent::TaskFailed { error, .. } => eprintln!("Failed: {}", error),
        LexiEvent::TaskCancelled { .. } => eprintln!("Cancelled"),
    }
}

fn print_summary(task: &Task, collection: &SharedCollection) {
    let verdict = if task.is_cancelled() {
        "cancelled"
    } else {
        match task.outcome() {
            Some(TaskOutcome::Success) => "success",
            Some(TaskOutcome::PartialSuccess) => "partial success",
            Some(TaskOutcome::Failure) => "failure",
            Some(TaskOutcome::Informational) => "nothing new",
            None => "unfinished",
        }
    };

    println!("Result:  {}", verdict);
    println!(
        "Items:   {} total, {} added, {} skipped, {} failed",
        task.total_items, task.added, task.skipped, task.failed
    );
    if !task.failed_items.is_empty() {
        println!("Failed:  {}", task.failed_items.join(", "));
    }
    if let Some(error) = &task.error {
        println!("Error:   {}", error);
    }

    let stats = collection.statistics();
    let categories: Vec<String> = stats
        .by_category
        .iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect();
    println!("Collection: {} word(s) ({})", stats.total, categories.join(", "));
}
