//! ayush-client - clinical coding command-line client
//!
//! Drives the remote extraction/mapping/validation pipeline for a patient,
//! shows staged progress, and reconciles ambiguous mappings.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{bail, Context, Result};
use ayush_client::models::PatientForm;
use ayush_client::services::identifier;
use ayush_client::services::{ApplyOutcome, RunSettlement};
use ayush_client::{ClientConfig, ClientError, PipelineClient};
use ayush_common::config::{load_or_default, LoggingConfig};
use ayush_common::events::ClientEvent;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for ayush-client
#[derive(Parser, Debug)]
#[command(name = "ayush-client")]
#[command(about = "Clinical coding client for the AYUSH diagnosis service")]
#[command(version)]
struct Args {
    /// Base URL of the diagnosis service API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bearer token for the diagnosis service
    #[arg(long, global = true, env = "AYUSH_ACCESS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the pipeline on clinical text for a patient
    Run {
        #[arg(long)]
        patient_id: i64,

        /// Free-text clinical notes
        #[arg(long)]
        text: String,

        /// Push a confident result to the health exchange
        #[arg(long)]
        auto_push: bool,

        /// Commit manual review candidate N (zero-based) after the run
        #[arg(long)]
        select: Option<usize>,
    },

    /// Show a patient's diagnosis history
    History {
        #[arg(long)]
        patient_id: i64,
    },

    /// Create a patient record
    AddPatient {
        #[arg(long)]
        name: String,

        #[arg(long)]
        ayush_id: String,

        #[arg(long)]
        age: String,
    },

    /// Canonicalize an identifier as the form would while typing
    Canonicalize { input: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config = load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&toml_config.logging)?;

    info!("Starting ayush-client {}", env!("CARGO_PKG_VERSION"));

    let config = ClientConfig::resolve(&toml_config, args.api_url.as_deref(), args.token.as_deref());

    match args.command {
        Command::Canonicalize { input } => {
            let canonical = identifier::canonicalize(&input);
            match identifier::validate(&canonical) {
                Ok(()) => println!("{} (valid)", canonical),
                Err(message) => println!("{} ({})", canonical, message),
            }
            Ok(())
        }
        Command::History { patient_id } => {
            let client = PipelineClient::from_config(config)?;
            client.select_patient(patient_id).await;
            let snapshot = client.snapshot().await;
            if snapshot.history.is_empty() {
                println!("No diagnoses yet for patient {}.", patient_id);
            }
            for record in &snapshot.history {
                println!(
                    "#{} {}  {} -> {}  ({:.0}%)",
                    record.id,
                    record.created_at.format("%Y-%m-%d %H:%M"),
                    record.ayush_term,
                    record.icd_code,
                    record.confidence_score * 100.0
                );
            }
            Ok(())
        }
        Command::AddPatient {
            name,
            ayush_id,
            age,
        } => {
            let client = PipelineClient::from_config(config)?;
            let form = PatientForm::new(name, &ayush_id, age);
            match client.create_patient(&form).await {
                Ok(patient) => {
                    println!("Created patient #{} {} ({})", patient.id, patient.name, patient.ayush_id);
                    Ok(())
                }
                Err(e) => report_client_error(e),
            }
        }
        Command::Run {
            patient_id,
            text,
            auto_push,
            select,
        } => run_pipeline(config, patient_id, text, auto_push, select).await,
    }
}

async fn run_pipeline(
    config: ClientConfig,
    patient_id: i64,
    text: String,
    auto_push: bool,
    select: Option<usize>,
) -> Result<()> {
    let client = PipelineClient::from_config(config)?;
    client.select_patient(patient_id).await;

    let mut events = client.subscribe();
    let progress = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ClientEvent::StageAdvanced {
                new_stage,
                progress_percent,
                ..
            } = event
            {
                println!("[{:>3}%] {}", progress_percent, new_stage.message());
            }
        }
    });

    client.set_pending_text(text).await;
    let settlement = client.run_selected(auto_push).await;
    progress.abort();

    let run = match settlement {
        Ok(RunSettlement::Displayed(run)) => run,
        Ok(RunSettlement::Superseded { .. }) => bail!("Run was superseded by a newer run"),
        Err(e) => return report_client_error(e),
    };

    if let Some(failure) = run.failure() {
        bail!("{} [{}]", failure.message, failure.classification);
    }

    if let Some(result) = run.result() {
        println!("AYUSH term: {}", result.ayush_term);
        if let Some(best) = &result.best {
            println!("Best match: {} {}", best.code, best.title);
        }
        if let Some(confidence) = result.confidence {
            println!("Confidence: {:.0}%", confidence * 100.0);
        }
        if let Some(reason) = &result.reason {
            println!("Reason: {}", reason);
        }
        for reason in &result.review_reasons {
            println!("Review: {}", reason);
        }
    }

    let snapshot = client.snapshot().await;
    if let Some(review) = &snapshot.manual_review {
        println!("Manual review candidates:");
        for (index, candidate) in review.candidates().iter().enumerate() {
            let marker = if candidate.same_identity(review.selected()) { "*" } else { " " };
            println!(
                " {} [{}] {} {} (from {}{})",
                marker,
                index,
                candidate.code,
                candidate.title,
                candidate.source_term,
                candidate
                    .score
                    .map(|s| format!(", score {:.2}", s))
                    .unwrap_or_default()
            );
        }

        if let Some(index) = select {
            if let Err(e) = client.select_candidate_index(index).await {
                return report_client_error(e);
            }
            match client.apply_manual_review().await {
                ApplyOutcome::Saved | ApplyOutcome::Failed(_) => {
                    let status = client
                        .snapshot()
                        .await
                        .manual_review
                        .map(|r| r.status().clone())
                        .unwrap_or_default();
                    if let Some(message) = status.success {
                        println!("{}", message);
                    }
                    if let Some(message) = status.error {
                        bail!(message);
                    }
                }
                ApplyOutcome::Skipped => println!("No persisted diagnosis to update."),
                ApplyOutcome::Discarded => println!("Run was replaced; selection not applied."),
            }
        }
    } else if select.is_some() {
        println!("No manual review candidates for this run.");
    }

    Ok(())
}

fn report_client_error(error: ClientError) -> Result<()> {
    if let ClientError::Remote(normalized) = &error {
        if let Some(detail) = &normalized.raw_detail {
            tracing::debug!(detail = %detail, "Raw failure detail");
        }
        bail!("{} [{}]", normalized.message, normalized.classification);
    }
    Err(error.into())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());

    let file_layer = match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = if file_layer.is_some() {
        None
    } else {
        Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}
