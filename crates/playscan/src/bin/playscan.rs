//! playscan - turn scanned theatrical scripts into structured scenes.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc};

use playscan::pipeline::PipelineConfig;
use playscan::storage::{JsonDirectorySink, SceneSink};
use playscan::{
    Database, ImportJob, ImportMode, ImportService, JobRunner, JobStore, SubmitRequest,
    SweepScheduler,
};

#[derive(Parser)]
#[command(name = "playscan")]
#[command(about = "Import scanned theatrical scripts as structured scenes")]
#[command(version)]
struct Cli {
    /// Config file path (defaults plus PLAYSCAN_* overrides when omitted)
    #[arg(short, long, global = true, env = "PLAYSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ModeArg {
    /// Store the draft on the job only
    Preview,
    /// Also save the draft as a scene
    Create,
}

impl From<ModeArg> for ImportMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Preview => ImportMode::Preview,
            ModeArg::Create => ImportMode::Create,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Submit files for import
    Submit {
        /// Owner the files belong to
        #[arg(short, long)]
        owner: String,
        /// Blob paths, each starting with `<owner>/`
        #[arg(required = true)]
        files: Vec<String>,
        /// Allow the files to be sent to the remote AI service
        #[arg(long)]
        consent: bool,
        #[arg(short, long, value_enum, default_value = "preview")]
        mode: ModeArg,
        /// Print progress events as NDJSON while the job runs
        #[arg(long)]
        stream: bool,
    },

    /// Show a job
    Status {
        #[arg(short, long)]
        owner: String,
        job_id: String,
    },

    /// List recent jobs
    List {
        #[arg(short, long)]
        owner: String,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },

    /// Re-run a failed or stuck job
    Retry {
        #[arg(short, long)]
        owner: String,
        job_id: String,
    },

    /// Run stale jobs once
    Sweep {
        /// Age in seconds after which a job counts as stale
        #[arg(long)]
        threshold_secs: Option<u64>,
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Sweep stale jobs periodically until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = playscan::telemetry::init(cli.json_logs, cli.verbose) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let service = build_service(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit {
            owner,
            files,
            consent,
            mode,
            stream,
        } => {
            let request = SubmitRequest::preview(owner, files, consent).with_mode(mode.into());
            let job = if stream {
                submit_streaming(&service, request).await?
            } else {
                let job = service.submit(request)?;
                wait_for_job(&service, &job).await?
            };
            print_job(&job)?;
        }
        Commands::Status { owner, job_id } => {
            print_job(&service.get_job(&owner, &job_id)?)?;
        }
        Commands::List { owner, limit } => {
            for job in service.list_jobs(&owner, limit)? {
                println!(
                    "{}  {:<13} {:>3}%  {}",
                    job.id,
                    job.status,
                    job.progress_percentage,
                    job.error_message
                        .as_deref()
                        .or(job.status_message.as_deref())
                        .unwrap_or("")
                );
            }
        }
        Commands::Retry { owner, job_id } => {
            print_job(&service.retry_job(&owner, &job_id).await?)?;
        }
        Commands::Sweep {
            threshold_secs,
            limit,
        } => {
            let config = service.config();
            let threshold = threshold_secs
                .map(Duration::from_secs)
                .unwrap_or(config.stale_threshold);
            let limit = limit.unwrap_or(config.sweep_batch_limit);
            let report = service.sweep_stale_jobs(threshold, limit).await?;
            println!(
                "{} stale, {} succeeded, {} failed, {} skipped",
                report.selected, report.succeeded, report.failed, report.skipped
            );
        }
        Commands::Watch => watch(service)?,
    }

    Ok(())
}

fn build_service(
    config_path: Option<&std::path::Path>,
) -> Result<ImportService, Box<dyn std::error::Error>> {
    let config = match config_path {
        Some(path) => playscan::load_config(path)?,
        None => playscan::load_default_config()?,
    };
    let pipeline = Arc::new(PipelineConfig::from_config(&config)?);

    let store = JobStore::new(Database::open(&pipeline.database_path)?);
    let sink = pipeline
        .scenes_directory
        .as_ref()
        .map(|dir| Arc::new(JsonDirectorySink::new(dir)) as Arc<dyn SceneSink>);

    let runner = JobRunner::from_config(pipeline, store, sink)?;
    Ok(ImportService::new(Arc::new(runner)))
}

async fn submit_streaming(
    service: &ImportService,
    request: SubmitRequest,
) -> Result<ImportJob, Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<playscan::StreamEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!("{}", event.to_line());
        }
    });

    let result = service.submit_streaming(request, tx).await;
    // The sender is dropped with the run, which ends the printer.
    let _ = printer.await;
    Ok(result?)
}

/// Polls a background job until it leaves `pending`/`processing`.
async fn wait_for_job(
    service: &ImportService,
    job: &ImportJob,
) -> Result<ImportJob, Box<dyn std::error::Error>> {
    let mut last_percent = None;
    loop {
        let current = service.get_job(&job.owner_id, &job.id)?;
        if !current.status.is_in_flight() {
            return Ok(current);
        }
        if last_percent != Some(current.progress_percentage) {
            eprintln!(
                "{:>3}%  {}",
                current.progress_percentage,
                current.status_message.as_deref().unwrap_or("")
            );
            last_percent = Some(current.progress_percentage);
        }
        tokio::time::sleep(Duration::from_millis(250)).await;
    }
}

fn watch(service: ImportService) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = SweepScheduler::new(service);
    let (trigger_tx, trigger_rx) = broadcast::channel(4);
    let handle = scheduler.start(trigger_rx)?;

    // Run one sweep right away.
    let _ = trigger_tx.send(());

    let (stop_tx, stop_rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })?;

    tracing::info!("Watching for stale jobs, press Ctrl-C to stop");
    let _ = stop_rx.recv();

    scheduler.stop();
    // Wake the loop so it sees the shutdown flag.
    let _ = trigger_tx.send(());
    if handle.join().is_err() {
        tracing::error!("Sweeper thread panicked");
    }
    Ok(())
}

fn print_job(job: &ImportJob) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(job)?);
    Ok(())
}
