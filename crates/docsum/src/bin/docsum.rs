//! docsum command-line client
//!
//! ```bash
//! docsum summarize ./report.docx --min 50 --max 500
//! docsum show <DOCUMENT_ID> --follow
//! docsum history --limit 10
//! ```
//!
//! The backend address comes from `--base-url`, then `DOCSUM_API_BASE_URL`,
//! then the config file, then `http://localhost:8000`.

use clap::{Parser, Subcommand};
use docsum::{
    ClientConfig, DocumentJobState, Error, JobStatus, PollEvent, StoreEvent, SummarizationJob,
    SummaryPipeline, UploadFile,
};
use std::path::PathBuf;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "docsum", version, about = "Upload documents and follow their summarization")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL (overrides config and environment)
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a document and summarize it
    Summarize {
        /// .docx, .odt or .txt file
        path: PathBuf,

        /// Minimum summary length in tokens
        #[arg(long = "min", default_value_t = 50, allow_negative_numbers = true)]
        min_length: i64,

        /// Maximum summary length in tokens
        #[arg(long = "max", default_value_t = 500, allow_negative_numbers = true)]
        max_length: i64,

        /// Summarization method (defaults to the configured one)
        #[arg(long)]
        method: Option<String>,

        /// Return right after the job is created
        #[arg(long)]
        no_wait: bool,
    },

    /// Show a document and its summarization state
    Show {
        document_id: String,

        /// Keep polling until the job settles
        #[arg(long)]
        follow: bool,
    },

    /// List uploaded documents
    History {
        #[arg(long, default_value_t = 10)]
        limit: u32,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsum=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
        config.validate()?;
    }
    tracing::debug!("Using backend at {}", config.api_root());

    let pipeline = SummaryPipeline::new(config)?;

    let result = match cli.command {
        Commands::Summarize {
            path,
            min_length,
            max_length,
            method,
            no_wait,
        } => summarize(&pipeline, path, min_length, max_length, method, no_wait).await,
        Commands::Show {
            document_id,
            follow,
        } => show(&pipeline, &document_id, follow).await,
        Commands::History { limit, offset } => history(&pipeline, limit, offset).await,
    };

    result.map_err(|err| anyhow::anyhow!(describe(&err)))
}

async fn summarize(
    pipeline: &SummaryPipeline,
    path: PathBuf,
    min_length: i64,
    max_length: i64,
    method: Option<String>,
    no_wait: bool,
) -> docsum::Result<()> {
    let file = UploadFile::from_path(&path).await?;
    let events = Followed::subscribe(pipeline);

    let submission = pipeline
        .submit_file(&file, min_length, max_length, method.as_deref())
        .await?;
    println!(
        "Uploaded {} as document {}",
        submission.document.filename, submission.document.id
    );
    println!("Job {}: {}", submission.job.id, submission.job.status);

    if no_wait {
        return Ok(());
    }
    let job = follow(pipeline, &submission.job.id, events).await?;
    print_outcome(&job)
}

async fn show(pipeline: &SummaryPipeline, document_id: &str, follow_job: bool) -> docsum::Result<()> {
    let events = Followed::subscribe(pipeline);
    let view = pipeline.open_document(document_id).await?;

    println!("Document {}: {}", view.document.id, view.document.filename);
    println!(
        "  {} bytes, uploaded {}, parsed: {}",
        view.document.size_bytes,
        view.document.uploaded_at.format("%Y-%m-%d %H:%M:%S"),
        view.document.parsed
    );

    let job = match &view.job_state {
        DocumentJobState::NotStarted => {
            println!("Summary: not started");
            return Ok(());
        }
        DocumentJobState::Tracked(job) => job.clone(),
    };
    println!("Job {}: {}", job.id, job.status);

    if job.status.is_terminal() {
        return print_outcome(&job);
    }
    if !follow_job {
        pipeline.poller().cancel();
        return Ok(());
    }
    let job = follow(pipeline, &job.id, events).await?;
    print_outcome(&job)
}

async fn history(pipeline: &SummaryPipeline, limit: u32, offset: u32) -> docsum::Result<()> {
    let page = pipeline.history(limit, offset).await?;
    println!(
        "{} document(s), showing {}-{}",
        page.total,
        page.offset + 1,
        page.offset as usize + page.items.len()
    );
    for item in &page.items {
        println!(
            "  {}  {}  {:>9} B  {}",
            item.id,
            item.uploaded_at.format("%Y-%m-%d %H:%M"),
            item.size_bytes,
            item.filename
        );
    }
    Ok(())
}

/// Store changes and poll notices, subscribed before the job exists
struct Followed {
    store: broadcast::Receiver<StoreEvent>,
    poll: broadcast::Receiver<PollEvent>,
}

impl Followed {
    fn subscribe(pipeline: &SummaryPipeline) -> Self {
        Self {
            store: pipeline.store().subscribe(),
            poll: pipeline.poller().events(),
        }
    }
}

/// Print status changes until the job settles or the user interrupts
async fn follow(
    pipeline: &SummaryPipeline,
    job_id: &str,
    mut events: Followed,
) -> docsum::Result<SummarizationJob> {
    let outcome = pipeline.wait_for_outcome(job_id);
    tokio::pin!(outcome);
    // The creation or lookup record was already printed.
    let mut last_status = pipeline.store().status_of(job_id);

    loop {
        tokio::select! {
            result = &mut outcome => return result,
            _ = tokio::signal::ctrl_c() => {
                pipeline.poller().cancel();
                return Err(Error::cancelled("interrupted; the job keeps running on the server"));
            }
            change = events.store.recv() => match change {
                Ok(StoreEvent { job }) if job.id == job_id => {
                    if last_status != Some(job.status) {
                        println!("Job {}: {}", job.id, job.status);
                        last_status = Some(job.status);
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} store events", skipped);
                }
                Err(RecvError::Closed) => return outcome.await,
            },
            event = events.poll.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Missed {} poll events", skipped);
                }
                Err(RecvError::Closed) => return outcome.await,
            },
        }
    }
}

fn report(event: &PollEvent) {
    match event {
        // Status lines come from the store.
        PollEvent::Status { .. } => {}
        PollEvent::Degraded {
            consecutive_failures,
            error,
            ..
        } => eprintln!(
            "Connection problems ({} failed status checks): {}. Still retrying.",
            consecutive_failures, error
        ),
        PollEvent::Recovered { .. } => eprintln!("Connection restored."),
        PollEvent::Settled { .. } => {}
    }
}

fn print_outcome(job: &SummarizationJob) -> docsum::Result<()> {
    match job.status {
        JobStatus::Done => {
            println!();
            println!("{}", job.summary_text.as_deref().unwrap_or(""));
            Ok(())
        }
        JobStatus::Failed => Err(docsum::ClassifiedError::unknown(format!(
            "Summarization failed: {}",
            job.failure_reason().unwrap_or("unknown reason")
        ))
        .into()),
        _ => Ok(()),
    }
}

fn describe(err: &Error) -> String {
    match err.as_classified() {
        Some(classified) => {
            let mut line = format!("[{}] {}", classified.kind, classified.message);
            if let Some(trace_id) = &classified.trace_id {
                line.push_str(&format!(" (trace id: {})", trace_id));
            }
            line
        }
        None => err.to_string(),
    }
}
