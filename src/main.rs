#![warn(clippy::all, rust_2018_idioms)]

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::prelude::*;

use cwquery::app::config::{project_dirs, AppConfig};
use cwquery::app::credentials::CredentialCoordinator;
use cwquery::app::data_plane::cloudwatch_logs::presentation::{
    format_history, format_log_record, group_query_history,
};
use cwquery::app::data_plane::cloudwatch_logs::{
    AwsLogsClientProvider, ExecutionOptions, LogGroupCatalogCache, LogsClientProvider,
    QuerySession, SessionCommand, SessionMessage, SessionOutcome,
};
use cwquery::app::query::block::blocks;
use cwquery::app::query::focused_block;
use cwquery::app::query_files::{query_folders, QueryFileStore, DEFAULT_FOLDER};

const DEFAULT_LOG_FILTER: &str =
    "cwquery=info,aws_config=warn,aws_sigv4=warn,aws_smithy_runtime=warn,aws_smithy_runtime_api=warn,hyper=warn";

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_BRANCH"),
    "@",
    env!("GIT_COMMIT"),
    ")"
);

/// Multi-region CloudWatch Logs Insights queries
#[derive(Parser)]
#[command(name = "cwquery")]
#[command(version, long_version = LONG_VERSION, about)]
#[command(arg_required_else_help = true)]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mirror log output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query block from a file or stdin
    Run {
        /// Query file, `-` or nothing for stdin
        file: Option<PathBuf>,

        /// Run only the block around this 1-based line (default: the first block)
        #[arg(long)]
        line: Option<usize>,

        /// Print every session message as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Speak the session protocol: JSON commands on stdin, JSON messages on stdout.
    ///
    /// Every line carries a `session` number; `duplicate` opens the next one.
    Session,
    /// Show recently run queries
    History {
        #[arg(long)]
        env: String,
        #[arg(long)]
        region: String,
    },
    /// Show the full log record behind a `@ptr` value
    Record {
        #[arg(long)]
        env: String,
        #[arg(long)]
        region: String,
        pointer: String,
    },
    /// Manage saved query files
    #[command(subcommand)]
    Files(FilesCommand),
}

#[derive(Subcommand)]
enum FilesCommand {
    /// List saved query files
    List,
    /// Print a saved query file
    Show { name: String },
    /// Create an empty query file
    New {
        name: String,
        /// Folder to create it in, by directory name
        #[arg(long)]
        folder: Option<String>,
    },
    /// Rename a query file
    Rename { old: String, new: String },
    /// Delete a query file
    Delete { name: String },
}

fn log_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().join("logs"))
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER)
            .context("Failed to parse log filter")?,
    };

    let file_layer = match log_dir() {
        Some(log_dir) => {
            std::fs::create_dir_all(&log_dir)
                .with_context(|| format!("Failed to create {}", log_dir.display()))?;
            let log_path = log_dir.join("cwquery.log");
            let file = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&log_path)
                .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

            // Owner read/write only
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Err(e) =
                    std::fs::set_permissions(&log_path, std::fs::Permissions::from_mode(0o600))
                {
                    eprintln!("[SECURITY] Failed to set log file permissions: {}", e);
                }
            }

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    // Bridge log crate events from dependencies to tracing
    tracing_log::LogTracer::init().context("Failed to initialize log-to-tracing bridge")?;

    tracing::info!("Logging initialized, log dir: {:?}", log_dir());
    Ok(())
}

fn setup_panic_handler() {
    // Installed before logging so early panics still leave a crash log
    std::panic::set_hook(Box::new(|panic_info| {
        let crash_msg = format!(
            "cwquery crashed!\n\
             Panic occurred at: {}\n\
             Details: {}\n\
             Backtrace:\n{:?}\n",
            panic_info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
                .unwrap_or_else(|| "unknown location".to_string()),
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| panic_info.payload().downcast_ref::<String>().map(|s| s.as_str()))
                .unwrap_or("unknown panic"),
            std::backtrace::Backtrace::force_capture()
        );

        if let Some(log_dir) = log_dir() {
            let _ = std::fs::create_dir_all(&log_dir);
            let crash_log_path = log_dir.join("crash.log");

            if let Ok(mut file) = std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&crash_log_path)
            {
                use std::io::Write;
                let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
                let _ = writeln!(file, "\n=== CRASH at {} ===\n{}", timestamp, crash_msg);
            }

            eprintln!("\n{}", crash_msg);
            eprintln!("Crash log written to: {:?}", crash_log_path);
        } else {
            eprintln!("\n{}", crash_msg);
        }
    }));
}

/// Services shared by the subcommands
struct Services {
    config: AppConfig,
    provider: Arc<dyn LogsClientProvider>,
    catalog: LogGroupCatalogCache,
}

impl Services {
    fn new(config: AppConfig) -> Self {
        let credentials = Arc::new(CredentialCoordinator::new(
            config.authentication_command.clone(),
        ));
        Self {
            provider: Arc::new(AwsLogsClientProvider::new(credentials)),
            catalog: LogGroupCatalogCache::with_capacity(config.log_group_cache_capacity),
            config,
        }
    }

    fn session(&self) -> (QuerySession, tokio::sync::mpsc::UnboundedReceiver<SessionMessage>) {
        QuerySession::new(
            self.provider.clone(),
            self.catalog.clone(),
            ExecutionOptions::new().with_poll_interval(self.config.poll_interval()),
        )
    }
}

fn read_query_source(file: Option<&Path>) -> Result<String> {
    match file {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read query from stdin")?;
            Ok(text)
        }
    }
}

fn print_json(message: &SessionMessage) -> Result<()> {
    println!("{}", serde_json::to_string(message)?);
    Ok(())
}

async fn run_query(services: &Services, text: String, json: bool) -> Result<()> {
    let (mut session, mut messages) = services.session();
    session.handle(SessionCommand::Refresh { query: text }).await;

    if let Some(cancel) = session.cancellation_token() {
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("Canceling...");
                cancel.cancel();
            }
        });
    }

    let mut failed = None;
    while let Some(message) = messages.recv().await {
        if json {
            print_json(&message)?;
        }
        match message {
            SessionMessage::Started { log_groups, .. } => {
                for region in &log_groups {
                    eprintln!(
                        "{}: {} log groups",
                        region.region,
                        region.log_groups.len()
                    );
                }
            }
            SessionMessage::Results { row_count, .. } => eprintln!("{} rows so far", row_count),
            SessionMessage::Finished {
                status,
                title,
                statistics,
                ..
            } => {
                eprintln!(
                    "{} ({:?}): {} of {} records matched, {} bytes scanned",
                    title,
                    status,
                    statistics.records_matched,
                    statistics.records_scanned,
                    statistics.bytes_scanned
                );
                break;
            }
            SessionMessage::Error { message } => {
                failed = Some(message);
                break;
            }
            _ => {}
        }
    }
    session.wait().await;

    if let Some(message) = failed {
        bail!(message);
    }

    if !json {
        session.handle(SessionCommand::OpenRaw).await;
        if let Some(SessionMessage::RawTable { text }) = messages.recv().await {
            println!("{}", text);
        }
    }
    Ok(())
}

/// A session protocol line, addressed to one of the open sessions
#[derive(Serialize, Deserialize)]
struct Addressed<T> {
    #[serde(default)]
    session: usize,
    #[serde(flatten)]
    body: T,
}

/// Forward one session's messages, tagged with its number, to the writer
fn forward(
    session: usize,
    mut messages: mpsc::UnboundedReceiver<SessionMessage>,
    writer: mpsc::UnboundedSender<Addressed<SessionMessage>>,
) {
    tokio::spawn(async move {
        while let Some(body) = messages.recv().await {
            if writer.send(Addressed { session, body }).is_err() {
                break;
            }
        }
    });
}

async fn run_session(services: &Services) -> Result<()> {
    let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Addressed<SessionMessage>>();

    let writer = tokio::spawn(async move {
        while let Some(line) = writer_rx.recv().await {
            match serde_json::to_string(&line) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!("Failed to write session message: {}", e),
            }
        }
    });

    let (session, messages) = services.session();
    forward(0, messages, writer_tx.clone());
    let mut sessions: Vec<Option<QuerySession>> = vec![Some(session)];

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let command = match serde_json::from_str::<Addressed<SessionCommand>>(&line) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("Invalid session command {:?}: {}", line, e);
                let _ = writer_tx.send(Addressed {
                    session: 0,
                    body: SessionMessage::Error {
                        message: format!("Invalid command: {}", e),
                    },
                });
                continue;
            }
        };

        let Some(session) = sessions.get_mut(command.session).and_then(Option::as_mut) else {
            let _ = writer_tx.send(Addressed {
                session: command.session,
                body: SessionMessage::Error {
                    message: format!("No open session {}", command.session),
                },
            });
            continue;
        };

        match session.handle(command.body).await {
            SessionOutcome::Continue => {}
            SessionOutcome::Duplicated { session, messages } => {
                forward(sessions.len(), messages, writer_tx.clone());
                sessions.push(Some(session));
            }
            SessionOutcome::Closed => {
                sessions[command.session] = None;
                if sessions.iter().all(Option::is_none) {
                    break;
                }
            }
        }
    }

    for session in sessions.iter_mut().flatten() {
        session.cancel().await;
    }
    drop(sessions);
    drop(writer_tx);
    let _ = writer.await;
    Ok(())
}

fn files_command(config: &AppConfig, command: FilesCommand) -> Result<()> {
    let store = QueryFileStore::new(config.query_files_dir());

    match command {
        FilesCommand::List => {
            for name in store.list()? {
                println!("{}", name);
            }
        }
        FilesCommand::Show { name } => print!("{}", store.read(&name)?),
        FilesCommand::New { name, folder } => {
            let folders = query_folders(store.dir(), &config.extra_query_files_dirs);
            let folder = folder.unwrap_or_else(|| DEFAULT_FOLDER.to_string());
            let Some(dir) = folders.get(&folder) else {
                bail!(
                    "Unknown folder {}, expected one of {:?}",
                    folder,
                    folders.keys().collect::<Vec<_>>()
                );
            };
            let path = QueryFileStore::new(dir.clone()).create(&name)?;
            println!("{}", path.display());
        }
        FilesCommand::Rename { old, new } => {
            println!("{}", store.rename(&old, &new)?.display());
        }
        FilesCommand::Delete { name } => store.delete(&name)?,
    }
    Ok(())
}

async fn dispatch(services: &Services, command: Commands) -> Result<()> {
    match command {
        Commands::Run { file, line, json } => {
            let text = read_query_source(file.as_deref())?;
            let text = match line {
                Some(line) => focused_block(&text, line.saturating_sub(1)),
                None => {
                    let mut found = blocks(&text);
                    if found.is_empty() {
                        bail!("No query block found");
                    }
                    if found.len() > 1 {
                        eprintln!(
                            "Running the first of {} query blocks, pick another with --line",
                            found.len()
                        );
                    }
                    found.remove(0)
                }
            };
            run_query(services, text, json).await
        }
        Commands::Session => run_session(services).await,
        Commands::History { env, region } => {
            let client = services.provider.client(&env, &region).await?;
            let entries = client.describe_queries().await?;
            print!("{}", format_history(&group_query_history(&entries)));
            Ok(())
        }
        Commands::Record {
            env,
            region,
            pointer,
        } => {
            let client = services.provider.client(&env, &region).await?;
            let record = client.get_log_record(&pointer).await?;
            print!("{}", format_log_record(&record));
            Ok(())
        }
        Commands::Files(command) => files_command(&services.config, command),
    }
}

fn main() -> Result<()> {
    setup_panic_handler();

    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("Logging disabled: {:#}", e);
    }

    tracing::info!("cwquery {} starting", LONG_VERSION);

    let config = AppConfig::load(cli.config.as_deref())?;

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let services = Services::new(config);

    runtime.block_on(dispatch(&services, cli.command))
}
