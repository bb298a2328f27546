use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use accounts_worker::background_jobs::jobs::{build_jobs, LibrarySyncJob, LIBRARY_SYNC_JOB_ID};
use accounts_worker::background_jobs::{
    create_scheduler, run_job_now, BackgroundJob, JobContext, JobRequestPoller,
};
use accounts_worker::catalog_store::SqliteGameCatalog;
use accounts_worker::config;
use accounts_worker::server_store::{JobAuditEntry, ServerStore, SqliteServerStore};
use accounts_worker::user::SqliteUserStore;

fn parse_path(s: &str) -> Result<PathBuf, String> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(format!("Error resolving path '{}': {}", s, msg));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir().map_err(|e| format!("Failed to get current dir: {}", e))?;
    Ok(cwd.join(original_path))
}

fn parse_dir(s: &str) -> Result<PathBuf, String> {
    let path = parse_path(s)?;
    if !path.exists() {
        return Err(format!("Directory does not exist: {}", s));
    }
    if !path.is_dir() {
        return Err(format!("Path is not a directory: {}", s));
    }
    Ok(path)
}

fn parse_json(s: &str) -> Result<JsonValue, String> {
    serde_json::from_str(s).map_err(|e| format!("Invalid JSON '{}': {}", s, e))
}

#[derive(Parser, Debug)]
#[clap(version = env!("WORKER_VERSION"))]
struct CliArgs {
    /// Path to TOML configuration file. Values in the file override CLI arguments.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory containing database files (catalog.db, user.db, server.db).
    /// Can also be specified in config file.
    #[clap(long, value_parser = parse_dir)]
    pub db_dir: Option<PathBuf>,

    /// Steam Web API key. Library sync is disabled without one.
    #[clap(long)]
    pub steam_api_key: Option<String>,

    /// URL of the mail relay that sends the moderator digest.
    #[clap(long)]
    pub mail_relay_url: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the scheduler until Ctrl+C.
    Serve,

    /// Run a single job now and wait for it to finish.
    Run {
        job_id: String,

        /// User to sync, shorthand for `--params '{"user_id": N}'`.
        #[clap(long)]
        user_id: Option<usize>,

        /// Job parameters as a JSON object.
        #[clap(long, value_parser = parse_json)]
        params: Option<JsonValue>,
    },

    /// Queue a run for the scheduler of a running `serve`.
    Enqueue {
        job_id: String,

        /// User to sync, shorthand for `--params '{"user_id": N}'`.
        #[clap(long)]
        user_id: Option<usize>,

        /// Job parameters as a JSON object.
        #[clap(long, value_parser = parse_json)]
        params: Option<JsonValue>,
    },

    /// List registered jobs and their last run.
    Jobs,

    /// Show recent runs and audit log entries, for one job or all of them.
    History {
        job_id: Option<String>,

        #[clap(long, default_value_t = 20)]
        limit: usize,
    },
}

/// Convert CLI args to CliConfig for config resolution
impl From<&CliArgs> for config::CliConfig {
    fn from(args: &CliArgs) -> Self {
        config::CliConfig {
            db_dir: args.db_dir.clone(),
            steam_api_key: args.steam_api_key.clone(),
            mail_relay_url: args.mail_relay_url.clone(),
        }
    }
}

fn run_params(
    job_id: &str,
    user_id: Option<usize>,
    params: Option<JsonValue>,
) -> Result<Option<JsonValue>> {
    match (user_id, params) {
        (Some(_), Some(_)) => bail!("--user-id and --params are mutually exclusive"),
        (Some(user_id), None) => {
            if job_id != LIBRARY_SYNC_JOB_ID {
                bail!("--user-id only applies to {}", LIBRARY_SYNC_JOB_ID);
            }
            Ok(Some(LibrarySyncJob::params(user_id)))
        }
        (None, params) => Ok(params),
    }
}

fn find_job<'a>(jobs: &'a [Arc<dyn BackgroundJob>], job_id: &str) -> Result<&'a dyn BackgroundJob> {
    match jobs.iter().find(|job| job.id() == job_id) {
        Some(job) => Ok(job.as_ref()),
        None => {
            let known: Vec<&str> = jobs.iter().map(|job| job.id()).collect();
            bail!("Unknown job '{}', registered jobs: {}", job_id, known.join(", "))
        }
    }
}

fn print_jobs(jobs: &[Arc<dyn BackgroundJob>], server_store: &dyn ServerStore) -> Result<()> {
    for job in jobs {
        let schedule = job.schedule().to_string();
        let last_run = match server_store.get_last_run(job.id())? {
            Some(run) => format!("{} at {}", run.status.as_str(), run.started_at.to_rfc3339()),
            None => "never run".to_string(),
        };
        println!("{:<16} {:<20} {}", job.id(), schedule, last_run);
    }
    Ok(())
}

fn print_audit_entry(entry: &JobAuditEntry) {
    let at = DateTime::from_timestamp(entry.timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| entry.timestamp.to_string());
    let detail = match (&entry.error, &entry.details) {
        (Some(error), _) => error.clone(),
        (None, Some(details)) => details.to_string(),
        (None, None) => String::new(),
    };
    println!("{} {:<16} {:<10} {}", at, entry.job_id, entry.event_type.as_str(), detail);
}

fn print_history(server_store: &dyn ServerStore, job_id: Option<&str>, limit: usize) -> Result<()> {
    let entries = match job_id {
        Some(job_id) => {
            for run in server_store.get_job_history(job_id, limit)? {
                println!(
                    "run {:<6} {:<10} {:<10} {} {}",
                    run.id,
                    run.status.as_str(),
                    run.triggered_by,
                    run.started_at.to_rfc3339(),
                    run.error_message.unwrap_or_default()
                );
            }
            server_store.get_job_audit_log_by_job(job_id, limit, 0)?
        }
        None => server_store.get_job_audit_log(limit, 0)?,
    };
    for entry in &entries {
        print_audit_entry(entry);
    }
    Ok(())
}

async fn serve(
    jobs: &[Arc<dyn BackgroundJob>],
    job_context: JobContext,
    server_store: Arc<dyn ServerStore>,
    request_poll: Duration,
    shutdown_token: CancellationToken,
) -> Result<()> {
    let (mut scheduler, scheduler_handle) = create_scheduler(
        Arc::clone(&server_store),
        shutdown_token.clone(),
        job_context,
    );
    for job in jobs {
        scheduler.register_job(Arc::clone(job)).await;
    }

    let poller = JobRequestPoller::new(scheduler_handle, server_store, request_poll);
    let poller_token = shutdown_token.clone();
    let poller_task = tokio::spawn(async move { poller.run(poller_token).await });

    let run = scheduler.run();
    tokio::pin!(run);

    tokio::select! {
        _ = &mut run => {
            info!("Scheduler stopped");
        },
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, initiating graceful shutdown");
            shutdown_token.cancel();
            (&mut run).await;
        }
    }

    shutdown_token.cancel();
    if let Err(e) = poller_task.await {
        error!("Job request poller task failed: {}", e);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    // Load TOML config if provided
    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Some(config::FileConfig::load(path)?)
        }
        None => None,
    };

    // Resolve final configuration (TOML overrides CLI)
    let cli_config: config::CliConfig = (&cli_args).into();
    let app_config = config::AppConfig::resolve(&cli_config, file_config)?;

    info!("Configuration loaded:");
    info!("  db_dir: {:?}", app_config.db_dir);
    info!(
        "  daily_mod_mail every {}h, spam_sweep every {}h ({} blocked avatars)",
        app_config.background_jobs.daily_mod_mail.interval_hours,
        app_config.background_jobs.spam_sweep.interval_hours,
        app_config.background_jobs.spam_sweep.spam_avatar_hashes.len()
    );

    info!("Opening game catalog at {:?}", app_config.catalog_db_path());
    let catalog = Arc::new(
        SqliteGameCatalog::new(app_config.catalog_db_path())
            .context("Failed to open catalog database")?,
    );
    info!("Opening user store at {:?}", app_config.user_db_path());
    let user_store = Arc::new(
        SqliteUserStore::new(app_config.user_db_path())
            .context("Failed to open user database")?,
    );
    info!("Opening server store at {:?}", app_config.server_db_path());
    let server_store: Arc<dyn ServerStore> = Arc::new(
        SqliteServerStore::new(app_config.server_db_path())
            .context("Failed to open server database")?,
    );

    // HTTP clients here are blocking; they are built and dropped outside the runtime.
    let jobs = build_jobs(&app_config, &user_store)?;

    let shutdown_token = CancellationToken::new();
    let job_context = JobContext::new(
        shutdown_token.child_token(),
        user_store,
        catalog,
        Arc::clone(&server_store),
    );

    match cli_args.command {
        Command::Serve => {
            let request_poll = Duration::from_secs(app_config.background_jobs.request_poll_secs);
            let runtime = tokio::runtime::Runtime::new().context("Failed to start runtime")?;
            runtime.block_on(serve(
                &jobs,
                job_context,
                server_store,
                request_poll,
                shutdown_token,
            ))
        }
        Command::Run {
            job_id,
            user_id,
            params,
        } => {
            let job = find_job(&jobs, &job_id)?;
            let params = run_params(&job_id, user_id, params)?;
            run_job_now(job, &job_context, params, "cli")
                .with_context(|| format!("Job {} failed", job_id))
        }
        Command::Enqueue {
            job_id,
            user_id,
            params,
        } => {
            let job = find_job(&jobs, &job_id)?;
            let params = run_params(&job_id, user_id, params)?;
            let run_key = job.run_key(params.as_ref())?;
            let request_id = server_store.enqueue_job_request(&job_id, params.as_ref())?;
            println!("Queued request {} for {}", request_id, run_key);
            Ok(())
        }
        Command::Jobs => print_jobs(&jobs, server_store.as_ref()),
        Command::History { job_id, limit } => {
            print_history(server_store.as_ref(), job_id.as_deref(), limit)
        }
    }
}
