pub mod commands;

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use reelpipe_core::{
    load_pipeline_config, BrowserError, ConfigError, Credentials, DeliveryError, DeliveryReport,
    DeliveryState, PipelineConfig, QueueError, QueueFile, RetrievalError, RetrievalReport,
    SessionError, SessionStore,
};

use commands::{DiscoverArgs, DiscoveryOutcome};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("discovery failed: {0}")]
    Browser(#[from] BrowserError),
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] RetrievalError),
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Reels discovery, retrieval and delivery pipeline", long_about = None)]
pub struct Cli {
    /// Path to reelpipe.toml
    #[arg(long, default_value = "configs/reelpipe.toml")]
    pub config: PathBuf,
    /// Base directory override (replaces paths.base_dir)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Debug-level logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scroll the reels feed and queue the posts seen
    Discover(DiscoverArgs),
    /// Download every queued post, then clear the queue
    Retrieve,
    /// Upload downloaded media and remove what was delivered
    Deliver,
    /// Discover, retrieve and deliver in one go
    Run(DiscoverArgs),
    /// Inspect the pending queue
    #[command(subcommand)]
    Queue(QueueCommands),
    /// Summarize queue, media folder and session state
    Status,
    /// Print a shell completion script
    Completions(CompletionsArgs),
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// List pending identifiers
    Show(QueueShowArgs),
}

#[derive(Args, Debug)]
pub struct QueueShowArgs {
    /// Maximum number of identifiers listed
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

/// Installs the fmt subscriber on stderr. `RUST_LOG` wins over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "reelpipe_core=debug,reelpipectl=debug,warn"
    } else {
        "reelpipe_core=info,reelpipectl=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Completions(args) = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(args.shell, &mut command, "reelpipectl", &mut io::stdout());
        return Ok(());
    }

    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Discover(args) => {
            let outcome = context.block_on(commands::discover::execute(&context, args))?;
            render(&outcome, cli.format)?;
        }
        Commands::Retrieve => {
            let report = context.block_on(commands::retrieve::execute(&context))?;
            render(&report, cli.format)?;
        }
        Commands::Deliver => {
            let report = context.block_on(commands::deliver::execute(&context))?;
            render(&report, cli.format)?;
        }
        Commands::Run(args) => {
            let report = context.block_on(async {
                let discovery = commands::discover::execute(&context, args).await?;
                let retrieval = commands::retrieve::execute(&context).await?;
                let delivery = commands::deliver::execute(&context).await?;
                Ok::<_, AppError>(PipelineRun {
                    discovery,
                    retrieval,
                    delivery,
                })
            })?;
            render(&report, cli.format)?;
        }
        Commands::Queue(QueueCommands::Show(args)) => {
            let listing = context.queue_show(args)?;
            render(&listing, cli.format)?;
        }
        Commands::Status => {
            let status = context.gather_status()?;
            render(&status, cli.format)?;
        }
        Commands::Completions(_) => {}
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
pub(crate) struct AppContext {
    config: PipelineConfig,
    config_path: PathBuf,
    credentials: Credentials,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config_path = cli.config.clone();
        let mut config = load_pipeline_config(&config_path)?;
        if let Some(dir) = &cli.data_dir {
            config = config.with_base_dir(dir);
        }
        Ok(Self {
            config,
            config_path,
            credentials: Credentials::from_env(),
        })
    }

    pub(crate) fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    pub(crate) fn queue(&self) -> QueueFile {
        QueueFile::new(self.config.queue_file())
    }

    pub(crate) fn session_store(&self) -> SessionStore {
        SessionStore::new(self.config.session_file())
    }

    fn block_on<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(future)
    }

    fn queue_show(&self, args: &QueueShowArgs) -> Result<QueueListing> {
        let queue = self.queue();
        let mut pending = self.block_on(async { queue.read().await.map_err(AppError::from) })?;
        let total = pending.len();
        if let Some(limit) = args.limit {
            pending.truncate(limit);
        }
        Ok(QueueListing {
            path: queue.path().to_path_buf(),
            total,
            pending,
        })
    }

    fn gather_status(&self) -> Result<StatusReport> {
        let queue = self.queue();
        let pending = self.block_on(async { queue.read().await.map_err(AppError::from) })?;
        let media_dir = self.config.media_dir();
        let media_waiting = count_media(&media_dir, &self.config.delivery.media_extensions)?;
        let session = self.session_store();
        Ok(StatusReport {
            config_path: self.config_path.clone(),
            queue_file: queue.path().to_path_buf(),
            queue_length: pending.len(),
            media_dir,
            media_waiting,
            session_file: session.path().to_path_buf(),
            session_present: session.exists(),
            instagram_credentials: self.credentials.instagram_login().is_ok(),
            telegram_credentials: self.credentials.telegram().is_ok(),
        })
    }
}

fn count_media(dir: &Path, extensions: &[String]) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(err.into()),
    };
    let mut count = 0;
    for entry in entries {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                extensions
                    .iter()
                    .any(|known| known.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false);
        if matches && path.is_file() {
            count += 1;
        }
    }
    Ok(count)
}

#[derive(Debug, Serialize)]
struct QueueListing {
    path: PathBuf,
    total: usize,
    pending: Vec<String>,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    config_path: PathBuf,
    queue_file: PathBuf,
    queue_length: usize,
    media_dir: PathBuf,
    media_waiting: usize,
    session_file: PathBuf,
    session_present: bool,
    instagram_credentials: bool,
    telegram_credentials: bool,
}

#[derive(Debug, Serialize)]
struct PipelineRun {
    discovery: DiscoveryOutcome,
    retrieval: RetrievalReport,
    delivery: DeliveryReport,
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl DisplayFallback for QueueListing {
    fn display(&self) -> String {
        if self.pending.is_empty() {
            return format!("Queue empty ({})", self.path.display());
        }
        let mut lines = vec![format!(
            "{} pending in {}",
            self.total,
            self.path.display()
        )];
        for identifier in &self.pending {
            lines.push(format!("  {identifier}"));
        }
        if self.total > self.pending.len() {
            lines.push(format!("  … {} more", self.total - self.pending.len()));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for StatusReport {
    fn display(&self) -> String {
        [
            format!("Config: {}", self.config_path.display()),
            format!(
                "Queue: {} pending ({})",
                self.queue_length,
                self.queue_file.display()
            ),
            format!(
                "Media: {} waiting ({})",
                self.media_waiting,
                self.media_dir.display()
            ),
            format!(
                "Session: {} ({})",
                if self.session_present { "saved" } else { "missing" },
                self.session_file.display()
            ),
            format!(
                "Credentials: instagram={} telegram={}",
                yes_no(self.instagram_credentials),
                yes_no(self.telegram_credentials)
            ),
        ]
        .join("\n")
    }
}

impl DisplayFallback for DiscoveryOutcome {
    fn display(&self) -> String {
        let report = &self.report;
        format!(
            "Discovery {}: collected {}/{} ({} duplicates, {} misses, {} scrolls, stop: {:?}); {} new in queue",
            report.run_id,
            report.collected.len(),
            report.target,
            report.duplicates,
            report.misses,
            report.scrolls,
            report.stop_reason,
            self.queued
        )
    }
}

impl DisplayFallback for RetrievalReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Retrieval {}: {} of {} retrieved, {} abandoned, {} calls",
            self.run_id,
            self.retrieved.len(),
            self.attempted,
            self.abandoned.len(),
            self.retriever_calls
        )];
        for artifact in &self.retrieved {
            lines.push(format!("  [ok] {}", artifact.media_path.display()));
        }
        for item in &self.abandoned {
            lines.push(format!(
                "  [abandoned] {} after {} attempts: {}",
                item.identifier, item.attempts, item.last_error
            ));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for DeliveryReport {
    fn display(&self) -> String {
        let mut lines = vec![format!(
            "Delivery {}: {} sent, {} failed",
            self.run_id,
            self.sent(),
            self.failed()
        )];
        for attempt in &self.attempts {
            let label = match attempt.state {
                DeliveryState::Pending => "pending",
                DeliveryState::Sent => "sent, not removed",
                DeliveryState::Deleted => "sent",
                DeliveryState::Failed => "failed",
            };
            lines.push(format!("  [{label}] {}", attempt.media_path.display()));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for PipelineRun {
    fn display(&self) -> String {
        [
            self.discovery.display(),
            self.retrieval.display(),
            self.delivery.display(),
        ]
        .join("\n")
    }
}
