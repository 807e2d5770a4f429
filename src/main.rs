//! Upload Analyzer
//!
//! Accepts uploads over HTTP(S), analyzes each in an isolated worker and
//! stores a report per distinct content hash.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upload_analyzer::archive::ArchiveJob;
use upload_analyzer::config::Config;
use upload_analyzer::server;
use upload_analyzer::state::AppState;
use upload_analyzer::supervisor::{Supervisor, WorkerCommand};

#[derive(Parser, Debug)]
#[command(name = "upload-analyzer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Port to listen on (overrides SERVER_PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Directory holding one report per content hash (overrides REPORTS_DIR)
    #[arg(long, global = true)]
    pub reports_dir: Option<PathBuf>,

    /// Destination of the reports archive (overrides ARCHIVE_PATH)
    #[arg(long, global = true)]
    pub archive_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start and keep alive N request server processes (default)
    Supervise {
        /// Number of server processes (overrides WORKER_COUNT)
        #[arg(short, long)]
        workers: Option<usize>,
    },

    /// Run a single request server process
    Serve,

    /// Write the reports archive once and exit
    Archive,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upload_analyzer=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(dir) = &cli.reports_dir {
        config.pipeline.reports_dir = dir.clone();
    }
    if let Some(path) = &cli.archive_path {
        config.pipeline.archive_path = path.clone();
    }

    match &cli.command {
        None => cmd_supervise(&cli, config, None).await,
        Some(Commands::Supervise { workers }) => cmd_supervise(&cli, config, *workers).await,
        Some(Commands::Serve) => cmd_serve(config).await,
        Some(Commands::Archive) => cmd_archive(config).await,
    }
}

async fn cmd_supervise(cli: &Cli, mut config: Config, workers: Option<usize>) -> Result<()> {
    if let Some(workers) = workers.filter(|n| *n > 0) {
        config.supervisor.worker_count = workers;
    }

    tracing::info!("Starting Upload Analyzer v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Reports directory: {}", config.pipeline.reports_dir.display());

    // Children read their configuration from the environment
    let mut command =
        WorkerCommand::current_exe(["serve"]).context("Failed to locate current executable")?;
    if let Some(port) = cli.port {
        command = command.env("SERVER_PORT", port.to_string());
    }
    if let Some(dir) = &cli.reports_dir {
        command = command.env("REPORTS_DIR", dir);
    }
    if let Some(path) = &cli.archive_path {
        command = command.env("ARCHIVE_PATH", path);
    }

    let supervisor = Supervisor::new(command, config.supervisor);
    tokio::select! {
        _ = supervisor.run() => {},
        _ = server::shutdown_signal() => {
            tracing::info!("Supervisor stopping, workers will be terminated");
        },
    }

    Ok(())
}

async fn cmd_serve(config: Config) -> Result<()> {
    let state = AppState::new(config.pipeline);
    tracing::info!(
        pid = std::process::id(),
        slot = %std::env::var("WORKER_SLOT").unwrap_or_default(),
        reports_dir = %state.report_store().base_path().display(),
        "Request server starting"
    );
    server::run(&config.server, state).await?;
    Ok(())
}

async fn cmd_archive(config: Config) -> Result<()> {
    let job = ArchiveJob::new(config.pipeline.archive_command.clone());
    let path = job
        .run(&config.pipeline.reports_dir, &config.pipeline.archive_path)
        .await?;
    println!("{}", path.display());
    Ok(())
}
