// src/main.rs
use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;

use corp_extractor::document::{load_document, Document};
use corp_extractor::extractors::{FieldValue, PATTERN_LIBRARY_VERSION};
use corp_extractor::pipeline::{extract_document, Pipeline};
use corp_extractor::reconcile::{review_queue, Validator};
use corp_extractor::utils::{self, AppError, Settings};

/// Command Line Interface for corporate document field extraction
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory for stored projects
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Confidence below which fields are flagged for review (default: 0.85)
    #[arg(long, global = true)]
    review_threshold: Option<f64>,

    /// Dates after this (YYYY-MM-DD) are rejected (default: today)
    #[arg(long, global = true)]
    processing_date: Option<NaiveDate>,

    /// Lines read past an anchor phrase, 2 or 3 (default: 3)
    #[arg(long, global = true)]
    anchor_window: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print candidates and tables for documents without storing anything
    Extract {
        /// Document files (.json OCR output or plain text)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Extract documents and merge them into a project, in the order given
    Ingest {
        #[arg(short, long)]
        project: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Replace a field's value (JSON literal or plain text)
    Edit {
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        field: String,
        #[arg(short, long)]
        value: String,
    },
    /// Verify a field's current value
    Confirm {
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        field: String,
    },
    /// Attach a summary to main_objects or inclusiveness_policy
    Summarize {
        #[arg(short, long)]
        project: String,
        #[arg(short, long)]
        field: String,
        /// Summary text from the summarization service; omitted means fallback
        #[arg(short, long)]
        summary: Option<String>,
        /// The summary was produced by an LLM
        #[arg(long)]
        llm_used: bool,
    },
    /// Print validation warnings for a project
    Validate {
        #[arg(short, long)]
        project: String,
    },
    /// Print flagged fields and missing critical fields
    Review {
        #[arg(short, long)]
        project: String,
    },
    /// Print a project's fields
    Show {
        #[arg(short, long)]
        project: String,
        /// Include evidence, review state and history
        #[arg(long)]
        full: bool,
    },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let out = serde_json::to_string_pretty(value).map_err(|e| AppError::Processing(e.to_string()))?;
    println!("{}", out);
    Ok(())
}

fn load_documents(files: &[PathBuf]) -> Result<Vec<Document>, AppError> {
    files.iter().map(|f| load_document(f).map_err(AppError::from)).collect()
}

fn resolve_settings(args: &Args) -> Result<Settings, AppError> {
    let mut settings = Settings::from_env()?;
    if let Some(dir) = &args.data_dir {
        settings = settings.with_data_dir(dir);
    }
    if let Some(threshold) = args.review_threshold {
        settings = settings.with_review_threshold(threshold)?;
    }
    if let Some(date) = args.processing_date {
        settings = settings.with_processing_date(date);
    }
    if let Some(window) = args.anchor_window {
        settings = settings.with_anchor_window(window);
    }
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Setup Logging (reads RUST_LOG env var)
    utils::logging::setup_logging();

    // 2. Parse CLI Arguments and resolve settings
    let args = Args::parse();
    tracing::info!("Starting processing for args: {:?}", args);
    let settings = resolve_settings(&args)?;

    // 3. Extraction only touches the files given
    if let Command::Extract { files } = &args.command {
        let mut results = Vec::new();
        for document in load_documents(files)? {
            let extraction = extract_document(&document, &settings);
            results.push(serde_json::json!({
                "doc_id": extraction.doc_id,
                "pattern_library_version": PATTERN_LIBRARY_VERSION,
                "doc_type": document.effective_type(),
                "candidates": extraction.candidates,
                "tables": extraction.tables,
            }));
        }
        return print_json(&results);
    }

    // 4. Everything else goes through a stored project
    let pipeline = Pipeline::new(settings.clone())?;

    match args.command {
        Command::Extract { .. } => Ok(()),
        Command::Ingest { project, files } => {
            let documents = load_documents(&files)?;
            let project = pipeline.ingest(&project, documents).await?;
            let flagged = project.fields.values().filter(|r| r.needs_review).count();
            tracing::info!(
                "Project {} now has {} fields from {} documents ({} need review)",
                project.project_id,
                project.fields.len(),
                project.documents.len(),
                flagged
            );
            print_json(&project.persisted_fields())
        }
        Command::Edit { project, field, value } => {
            let project = pipeline.edit(&project, &field, FieldValue::from_user_input(&value)).await?;
            print_json(&project.fields.get(&field))
        }
        Command::Confirm { project, field } => {
            let project = pipeline.confirm(&project, &field).await?;
            print_json(&project.fields.get(&field))
        }
        Command::Summarize { project, field, summary, llm_used } => {
            let project = pipeline.summarize(&project, &field, summary, llm_used).await?;
            let summary_field = corp_extractor::reconcile::summary::summary_field_name(&field);
            print_json(&project.fields.get(&summary_field))
        }
        Command::Validate { project } => {
            let project = pipeline.store().load_project(&project)?;
            print_json(&Validator::new(&settings).validate(&project))
        }
        Command::Review { project } => {
            let project = pipeline.store().load_project(&project)?;
            print_json(&review_queue(&project))
        }
        Command::Show { project, full } => {
            let project = pipeline.store().load_project(&project)?;
            if full {
                print_json(&project)
            } else {
                print_json(&project.persisted_fields())
            }
        }
    }
}
