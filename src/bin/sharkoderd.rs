//! `sharkoderd`: CLI entry point and long-running daemon for the
//! transcoding pipeline.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sharkoder::config::Config;
use sharkoder::App;

#[derive(Parser)]
#[command(name = "sharkoderd", version, about = "Unattended bulk video transcoding pipeline")]
struct Cli {
    /// Path to the JSON configuration snapshot (sharkoder.config.json).
    #[arg(long, global = true, default_value = "sharkoder.config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Starts the scheduler and blocks, running the pipeline until interrupted.
    Serve,
    /// Queues a remote path for transcoding.
    Add {
        remote_path: String,
        /// Source file size in bytes, used for the disk-space preflight check.
        #[arg(long)]
        source_size: u64,
        /// Park the job in `awaiting_approval` after encoding instead of
        /// uploading automatically.
        #[arg(long)]
        pause_before_upload: bool,
    },
    /// Cancels and deletes a job, cleaning any scratch it left behind.
    Rm { job_id: u64 },
    /// Moves a non-terminal job to `paused`.
    PauseJob { job_id: u64 },
    /// Returns a `paused` job to `waiting`.
    ResumeJob { job_id: u64 },
    /// Resets a terminal job back to `waiting`.
    Retry { job_id: u64 },
    /// Removes every job that is not `completed`.
    ClearAll,
    /// Approves a job parked in `awaiting_approval`.
    Approve { job_id: u64 },
    /// Rejects a job parked in `awaiting_approval`, sending it back to `ready_encode`.
    Reject { job_id: u64 },
    /// Prints job counts by status.
    Stats,
    /// Runs a full metadata cache rebuild.
    Index,
    /// Reconciles the metadata cache against the live remote tree.
    SyncIndex,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let _log_guard = sharkoder::logging::init(&config.log_dir())?;

    let app = App::build(config)?;

    match cli.command {
        Command::Serve => serve(&app),
        Command::Add { remote_path, source_size, pause_before_upload } => {
            let now_ms = now_ms();
            let id = app.scheduler.add_job(remote_path, source_size, now_ms)?;
            if pause_before_upload {
                if let Some(mut job) = app.store.get_job(id)? {
                    job.pause_before_upload = true;
                    app.store.update_job(&job)?;
                }
            }
            println!("queued job {id}");
            Ok(())
        }
        Command::Rm { job_id } => app.scheduler.remove_job(job_id),
        Command::PauseJob { job_id } => app.scheduler.pause_job(job_id),
        Command::ResumeJob { job_id } => app.scheduler.resume_job(job_id),
        Command::Retry { job_id } => app.scheduler.retry_job(job_id),
        Command::ClearAll => app.scheduler.clear_all(),
        Command::Approve { job_id } => app.scheduler.approve(job_id),
        Command::Reject { job_id } => app.scheduler.reject(job_id),
        Command::Stats => {
            for (status, count) in app.scheduler.stats()? {
                println!("{status:?}\t{count}");
            }
            Ok(())
        }
        Command::Index => app.metadata_cache.full_scan(now_ms() as i64),
        Command::SyncIndex => app.metadata_cache.incremental_sync(now_ms() as i64),
    }
}

/// Starts the scheduler and blocks until Ctrl-C/SIGTERM is observed, then
/// drains in-flight work cleanly.
fn serve(app: &App) -> anyhow::Result<()> {
    app.scheduler.start();
    tracing::info!("sharkoderd: scheduler started");

    let (tx, rx) = std::sync::mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    let _ = rx.recv();

    tracing::info!("sharkoderd: shutdown requested, draining pipeline");
    app.scheduler.stop();
    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("failed to read config at {}: {err}", path.display()))?;
    Ok(serde_json::from_str(&text)?)
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
