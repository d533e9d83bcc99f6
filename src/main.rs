mod config;

use std::path::PathBuf;
use std::thread;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing_subscriber::EnvFilter;

use repomirror_ingest::{CatalogSync, HostingClient};
use repomirror_store::{
    commit_mapping, file_mapping, format_timestamp, now_utc, open_index, repo_mapping, RunHistory,
    Timestamp,
};
use repomirror_types::{DocFilter, MirrorConfig};

/// Exit status after SIGINT/SIGTERM, as a shell reports an interrupted job.
const INTERRUPTED_EXIT: i32 = 130;

#[derive(Parser)]
#[command(name = "repomirror", about = "Mirror a Bitbucket Server catalog into a search index")]
struct Cli {
    /// Config file; falls back to $REPOMIRROR_CONFIG, then ./repomirror.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Create the repository, file and commit indices if missing
    Init,
    /// Crawl every project, repository and branch into the index
    Index,
    /// Show the last run and per-index document counts
    Status,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Record the run start on SIGINT/SIGTERM, then exit.
fn install_interrupt_handler(history: RunHistory, started: Timestamp) -> Result<()> {
    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("Failed to register signal handlers")?;
    thread::spawn(move || {
        if let Some(signal) = signals.forever().next() {
            tracing::warn!(signal, "interrupted, recording run start");
            if let Err(e) = history.record(started) {
                tracing::error!(error = %e, path = %history.path().display(), "failed to record run history");
            }
            std::process::exit(INTERRUPTED_EXIT);
        }
    });
    Ok(())
}

fn run_init(config: &MirrorConfig) -> Result<()> {
    let index = open_index(config).context("Failed to open search index")?;
    let names = &config.index.names;
    for (name, mapping) in [
        (&names.repo, repo_mapping()),
        (&names.file, file_mapping()),
        (&names.commit, commit_mapping()),
    ] {
        let created = index
            .ensure_index(name, Some(&mapping))
            .with_context(|| format!("Failed to create index '{}'", name))?;
        if created {
            println!("Created index '{}'", name);
        } else {
            println!("Index '{}' already exists", name);
        }
    }
    Ok(())
}

fn run_index(config: &MirrorConfig) -> Result<()> {
    let history = RunHistory::new(&config.run.history_file);
    let started = now_utc();
    match history.last_run() {
        Ok(Some(last)) => tracing::info!(
            last_run = %format_timestamp(last)?,
            elapsed_secs = (started - last).whole_seconds(),
            "resuming after previous run"
        ),
        Ok(None) => tracing::info!("no previous run recorded"),
        Err(e) => tracing::warn!(error = %e, "ignoring unreadable run history"),
    }
    install_interrupt_handler(history.clone(), started)?;

    let api = HostingClient::new(&config.hosting, config.retry)
        .context("Failed to build hosting client")?;
    let index = open_index(config).context("Failed to open search index")?;
    let summary = CatalogSync::new(&api, index.as_ref(), config)
        .run()
        .context("Indexing failed")?;

    history
        .record(started)
        .with_context(|| format!("Failed to write run history to {}", history.path().display()))?;

    println!(
        "Indexed {} projects, {} repositories, {} branches: {} files, {} new commits ({} already indexed)",
        summary.projects,
        summary.repositories,
        summary.branches,
        summary.files_indexed,
        summary.commits_indexed,
        summary.commits_already_indexed
    );
    Ok(())
}

fn run_status(config: &MirrorConfig) -> Result<()> {
    let history = RunHistory::new(&config.run.history_file);
    let last_run = match history.last_run() {
        Ok(Some(ts)) => format_timestamp(ts)?,
        Ok(None) => "never".to_string(),
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unreadable run history");
            "never".to_string()
        }
    };
    println!("LAST RUN  {}", last_run);

    let index = open_index(config).context("Failed to open search index")?;
    let names = &config.index.names;
    println!("{:<20} {:>10}", "INDEX", "DOCUMENTS");
    for name in [&names.repo, &names.file, &names.commit] {
        let count = index
            .count(name, &DocFilter::all())
            .with_context(|| format!("Failed to count '{}'", name))?;
        println!("{:<20} {:>10}", name, count);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let path = config::resolve_config_path(cli.config);
    let config = config::load(&path, std::env::var(config::TOKEN_ENV).ok())
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    match cli.command {
        Commands::Init => run_init(&config),
        Commands::Index => run_index(&config),
        Commands::Status => run_status(&config),
    }
}
