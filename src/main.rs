//! Command-line driver: runs the takeoff pipeline over normalized text
//! files and prints the session snapshot as JSON.
//!
//! Document readers are out of scope, so inputs are plain text; the
//! extraction instructions are likewise supplied by the operator, never
//! embedded here.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use takeoff::config;
use takeoff::derating::ServiceConditions;
use takeoff::models::document::Document;
use takeoff::models::enums::SourceFormat;
use takeoff::pipeline::cache::ExtractionCache;
use takeoff::pipeline::chunker::Chunker;
use takeoff::pipeline::client::{HttpExtractionClient, InstructionSet};
use takeoff::pipeline::fingerprint::fingerprint;
use takeoff::pipeline::orchestrator::{ExtractionOrchestrator, OrchestratorConfig};
use takeoff::pipeline::runner::PipelineRunner;
use takeoff::pipeline::usage::UsageTracker;
use takeoff::session::EstimateSession;

struct Args {
    instructions: PathBuf,
    inputs: Vec<PathBuf>,
    endpoint: String,
    model: String,
    cache: PathBuf,
    session_name: String,
    ambient_c: f64,
    bundled: u32,
    concurrency: usize,
}

fn usage() -> String {
    format!(
        "Usage: {} --instructions FILE [options] INPUT...\n\
         \n\
         Options:\n\
         \x20 --endpoint URL      extraction service ({})\n\
         \x20 --model NAME        extraction model ({})\n\
         \x20 --cache PATH        cache database (~/.takeoff/extraction-cache.db)\n\
         \x20 --session NAME      session name (takeoff)\n\
         \x20 --ambient C         ambient temperature in °C (30)\n\
         \x20 --bundled N         current-carrying conductors per raceway (3)\n\
         \x20 --concurrency N     extraction worker slots (4)",
        config::APP_NAME,
        config::DEFAULT_ENDPOINT,
        config::DEFAULT_MODEL,
    )
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        instructions: PathBuf::new(),
        inputs: Vec::new(),
        endpoint: config::DEFAULT_ENDPOINT.to_string(),
        model: config::DEFAULT_MODEL.to_string(),
        cache: config::default_cache_path(),
        session_name: config::APP_NAME.to_string(),
        ambient_c: 30.0,
        bundled: 3,
        concurrency: 4,
    };

    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next().ok_or_else(|| format!("{flag} needs a value"))
        };
        match arg.as_str() {
            "--instructions" => args.instructions = PathBuf::from(value("--instructions")?),
            "--endpoint" => args.endpoint = value("--endpoint")?,
            "--model" => args.model = value("--model")?,
            "--cache" => args.cache = PathBuf::from(value("--cache")?),
            "--session" => args.session_name = value("--session")?,
            "--ambient" => {
                args.ambient_c = value("--ambient")?
                    .parse()
                    .map_err(|e| format!("--ambient: {e}"))?
            }
            "--bundled" => {
                args.bundled = value("--bundled")?
                    .parse()
                    .map_err(|e| format!("--bundled: {e}"))?
            }
            "--concurrency" => {
                args.concurrency = value("--concurrency")?
                    .parse()
                    .map_err(|e| format!("--concurrency: {e}"))?
            }
            "--help" | "-h" => return Err(usage()),
            other if other.starts_with("--") => {
                return Err(format!("unknown option {other}\n\n{}", usage()))
            }
            other => args.inputs.push(PathBuf::from(other)),
        }
    }

    if args.instructions.as_os_str().is_empty() || args.inputs.is_empty() {
        return Err(usage());
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::FAILURE;
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "takeoff failed");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!("{} v{} starting", config::APP_NAME, config::APP_VERSION);

    let instruction_text = std::fs::read_to_string(&args.instructions)?;
    // The identity tracks the text, so editing the instructions retires
    // every cached response made under the old wording.
    let instructions =
        InstructionSet::new(&fingerprint("instructions", &instruction_text), &instruction_text);

    if let Some(parent) = args.cache.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let cache = Arc::new(ExtractionCache::open(&args.cache)?);
    let client = Arc::new(HttpExtractionClient::new(
        &args.endpoint,
        &args.model,
        config::DEFAULT_TIMEOUT_SECS,
    )?);
    let orchestrator = Arc::new(ExtractionOrchestrator::new(
        client,
        cache,
        Arc::new(UsageTracker::new()),
        OrchestratorConfig {
            max_concurrency: args.concurrency,
            ..OrchestratorConfig::default()
        },
    ));

    let conditions = ServiceConditions {
        ambient_c: args.ambient_c,
        bundled_conductors: args.bundled,
    };
    let chunker = Chunker::new(config::DEFAULT_CHUNK_SIZE, config::DEFAULT_CHUNK_OVERLAP)?;
    let runner = PipelineRunner::new(orchestrator, chunker, instructions, conditions);

    let mut session = EstimateSession::new(&args.session_name, conditions);
    for input in &args.inputs {
        let text = std::fs::read_to_string(input)?;
        let title = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| input.display().to_string());
        let format = input
            .extension()
            .map(|e| SourceFormat::from_extension(&e.to_string_lossy()))
            .unwrap_or(SourceFormat::PlainText);

        let document = Document::from_text(&title, format, &text);
        let takeoff = runner.process_document(&document).await;
        session.add_takeoff(takeoff);
    }

    let snapshot = session.snapshot();
    let usage = snapshot.usage;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    tracing::info!(
        documents = snapshot.documents.len(),
        attempts = usage.attempts,
        cache_hits = usage.cache_hits,
        "session complete"
    );

    Ok(())
}
