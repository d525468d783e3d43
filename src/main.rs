//! FMS CLI - task board dashboard and one-shot commands

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use fms_controller::backend::{Backend, HttpBackend};
use fms_controller::config::{FmsConfig, SyncTimings};
use fms_controller::error::{AssignmentError, FixSuggestion, FmsError};
use fms_controller::model::Column;
use fms_controller::session::{SessionContext, SessionGuard, SessionStore};
use fms_controller::sync::{
    read_upload_file, AssignmentMutator, EventSink, SnapshotFetcher, SyncEvent, UploadJobTracker,
    UploadState,
};

#[derive(Parser)]
#[command(name = "fms")]
#[command(about = "FMS Controller - live task board for field service teams")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides FMS_API_URL and config.toml)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and remember the identity
    Login {
        #[arg(short, long)]
        username: String,

        /// Prompted on stdin when omitted
        #[arg(short, long, env = "FMS_PASSWORD")]
        password: Option<String>,
    },

    /// Forget the stored identity
    Logout,

    /// Open the live dashboard (default)
    Watch,

    /// Print the current board once
    Board,

    /// List workers that can be assigned
    Workers,

    /// Upload a file for a task and wait for processing
    Upload {
        /// Case number of the task
        case_number: String,

        /// File to upload
        file: PathBuf,
    },

    /// Assign a worker to a task
    Assign {
        /// Case number of the task
        case_number: String,

        #[arg(short, long)]
        worker: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (ignore if not present)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Watch);

    init_logging(matches!(command, Commands::Watch));

    if let Err(e) = run(command, cli.api_url).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(suggestion) = e
            .downcast_ref::<FmsError>()
            .and_then(|fms| fms.fix_suggestion())
        {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

/// stderr for one-shot commands; a log file (only when FMS_LOG is set) for the dashboard
fn init_logging(dashboard: bool) {
    if !dashboard {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
        return;
    }

    let Some(directive) = std::env::var("FMS_LOG").ok() else {
        return;
    };
    let dir = FmsConfig::config_dir();
    if std::fs::create_dir_all(&dir).is_err() {
        return;
    }
    let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("fms.log"))
    else {
        return;
    };

    let filter = if directive.trim().is_empty() {
        EnvFilter::new("info")
    } else {
        EnvFilter::new(directive)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
}

async fn run(command: Commands, api_url: Option<String>) -> anyhow::Result<()> {
    let config = FmsConfig::load()?
        .with_env()
        .with_api_url_override(api_url);
    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(config.api_url()?));
    let guard = SessionGuard::new(SessionStore::default_location());
    let timings = config.timings();

    match command {
        Commands::Login { username, password } => {
            let password = match password {
                Some(p) => p,
                None => prompt_password()?,
            };
            let context = guard.login(backend.as_ref(), &username, &password).await?;
            println!("{} Logged in as {}", "✓".green(), context.username().cyan().bold());
        }
        Commands::Logout => {
            match guard.enter() {
                Ok(context) => guard.logout(&context)?,
                Err(_) => guard.store().clear()?,
            }
            println!("{} Logged out", "✓".green());
        }
        Commands::Watch => {
            let context = guard.enter()?;
            fms_controller::tui::run(backend, guard, context, timings).await?;
        }
        Commands::Board => {
            let context = guard.enter()?;
            cancel_on_ctrl_c(&context);
            show_board(backend, &context).await?;
        }
        Commands::Workers => {
            let workers = backend
                .list_workers()
                .await
                .map_err(|e| FmsError::Fetch(e.into()))?;
            if workers.is_empty() {
                println!("{}", "No workers available".dimmed());
            }
            for worker in workers {
                println!("  {} {}", "◆".cyan(), worker);
            }
        }
        Commands::Upload { case_number, file } => {
            let context = guard.enter()?;
            cancel_on_ctrl_c(&context);
            upload(backend, &context, timings, &case_number, &file).await?;
        }
        Commands::Assign {
            case_number,
            worker,
        } => {
            let context = guard.enter()?;
            cancel_on_ctrl_c(&context);
            assign(backend, &context, &case_number, worker).await?;
        }
    }

    Ok(())
}

fn prompt_password() -> Result<String, FmsError> {
    eprint!("Password: ");
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn cancel_on_ctrl_c(context: &SessionContext) {
    let token = context.cancel_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

// ─────────────────────────────────────────────────────────────────────────────
// One-shot commands
// ─────────────────────────────────────────────────────────────────────────────

async fn show_board(backend: Arc<dyn Backend>, context: &SessionContext) -> Result<(), FmsError> {
    let fetcher = SnapshotFetcher::new(backend);
    let outcome = fetcher
        .fetch_outcome(context.username(), context.cancel_token())
        .await;
    if outcome.is_cancelled() {
        return Ok(());
    }

    let board = outcome.board?;
    let messages = outcome.messages.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Messages unavailable");
        Default::default()
    });

    for column in Column::ALL {
        let tasks = board.tasks(column);
        println!("{} ({})", column.to_string().bold(), tasks.len());
        for task in tasks {
            let mut line = format!("  {}", task.headline());
            if !task.fbg.is_empty() {
                line.push_str(&format!("  [{}]", task.fbg));
            }
            if let Some(assigned) = &task.assigned_to {
                line.push_str(&format!("  → {}", assigned));
            }
            match messages.get(&task.case_number) {
                Some(thread) if thread.has_new_message => {
                    println!("{}  {}", line, "✉ new".yellow());
                }
                _ => println!("{}", line),
            }
        }
    }
    Ok(())
}

async fn upload(
    backend: Arc<dyn Backend>,
    context: &SessionContext,
    timings: SyncTimings,
    case_number: &str,
    file: &Path,
) -> Result<(), FmsError> {
    let (file_name, bytes) = read_upload_file(file).await?;

    let cancel = context.child_token();
    let (sink, rx) = EventSink::channel(cancel.clone());
    let printer = tokio::spawn(print_events(rx));

    let tracker = UploadJobTracker::new(
        backend,
        sink,
        context.session().clone(),
        timings.upload_poll_interval,
    );
    let outcome = tracker.run(case_number, file_name, bytes, &cancel).await;

    // closes the channel so the printer finishes
    drop(tracker);
    let _ = printer.await;

    match outcome {
        Some(UploadState::Failed { reason }) => Err(FmsError::UploadJobFailed {
            case_number: case_number.to_string(),
            message: reason,
        }),
        _ => Ok(()),
    }
}

async fn assign(
    backend: Arc<dyn Backend>,
    context: &SessionContext,
    case_number: &str,
    worker: Option<String>,
) -> Result<(), FmsError> {
    let fetcher = SnapshotFetcher::new(backend.clone());
    let outcome = fetcher
        .fetch_outcome(context.username(), context.cancel_token())
        .await;
    if outcome.is_cancelled() {
        return Ok(());
    }
    let board = outcome.board?;
    let (_, task) = board
        .find(case_number)
        .ok_or_else(|| AssignmentError::UnknownTask {
            case_number: case_number.to_string(),
        })?;

    let cancel = context.child_token();
    let (sink, rx) = EventSink::channel(cancel.clone());
    let printer = tokio::spawn(print_events(rx));

    // no dashboard to reload
    let mutator = AssignmentMutator::new(backend, sink, Duration::ZERO);
    if let Some(worker) = worker {
        mutator.select_worker(case_number, worker);
    }
    let result = mutator.submit(task, &cancel).await;

    drop(mutator);
    let _ = printer.await;
    Ok(result?)
}

async fn print_events(mut rx: mpsc::UnboundedReceiver<SyncEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            SyncEvent::Alert(alert) if alert.is_error() => {
                eprintln!("{} {}: {}", "✗".red(), alert.title.red().bold(), alert.description);
            }
            SyncEvent::Alert(alert) => {
                println!("{} {}: {}", "✓".green(), alert.title.bold(), alert.description);
            }
            SyncEvent::UploadStateChanged { case_number, state } => {
                println!("{} {} {}", "→".cyan(), case_number, state.to_string().cyan());
            }
            _ => {}
        }
    }
}
