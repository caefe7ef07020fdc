//! deferq CLI: operator interface to the deferred job coordinator.

use chrono::{DateTime, TimeDelta, Utc};
use clap::{Parser, Subcommand};
use deferq::config::Config;
use deferq::coordinator::{Coordinator, Enqueued};
use deferq::db::Db;
use deferq::queue::JobQueue;
use deferq::registry::JobRegistry;
use deferq::store::TrackerStore;
use deferq::telemetry::{TelemetryConfig, init_telemetry};
use deferq::worker::{Worker, WorkerConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "deferq", about = "Deferred job coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker
    Serve {
        /// TOML file with job policies and commands
        #[arg(long, default_value = "jobs.toml")]
        jobs: PathBuf,
        /// Maximum jobs executing at once
        #[arg(long, default_value_t = 4)]
        max_concurrent: usize,
        /// Deliveries before a failing job is archived
        #[arg(long, default_value_t = 5)]
        max_attempts: i32,
    },
    /// Submit a job through the coordinator
    Enqueue {
        /// Job type as named in the jobs file
        job_type: String,
        /// TOML file with job policies and commands
        #[arg(long, default_value = "jobs.toml")]
        jobs: PathBuf,
        /// JSON array of job arguments
        #[arg(long)]
        args: Option<String>,
        /// Run at this time (RFC 3339)
        #[arg(long, conflicts_with = "in_secs")]
        at: Option<DateTime<Utc>>,
        /// Run this many seconds from now
        #[arg(long)]
        in_secs: Option<i64>,
    },
    /// Tracker operations
    Trackers {
        #[command(subcommand)]
        action: TrackerAction,
    },
    /// Throttle cache operations
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum TrackerAction {
    /// List trackers
    List {
        /// Only keys starting with this prefix
        #[arg(long)]
        prefix: Option<String>,
        /// Maximum trackers to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show the tracker for a key
    Show { key: String },
    /// Delete trackers left behind by executions that never cleaned up
    Purge {
        /// Only trackers scheduled (or written) longer ago than this
        #[arg(long, default_value_t = 24)]
        older_than_hours: i64,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Delete expired throttle entries
    Prune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Command::Serve {
            jobs,
            max_concurrent,
            max_attempts,
        } => cmd_serve(&config, jobs, max_concurrent, max_attempts).await,
        Command::Enqueue {
            job_type,
            jobs,
            args,
            at,
            in_secs,
        } => cmd_enqueue(&config, job_type, jobs, args, at, in_secs).await,
        Command::Trackers { action } => {
            let db = Db::open(&config).await?;
            match action {
                TrackerAction::List { prefix, limit } => {
                    cmd_trackers_list(&db, prefix, limit).await
                }
                TrackerAction::Show { key } => cmd_trackers_show(&db, key).await,
                TrackerAction::Purge { older_than_hours } => {
                    let cutoff = Utc::now() - TimeDelta::hours(older_than_hours);
                    let purged = db.purge_stale_trackers(cutoff).await?;
                    println!("Purged {purged} tracker(s) older than {cutoff}");
                    Ok(())
                }
            }
        }
        Command::Cache {
            action: CacheAction::Prune,
        } => {
            let db = Db::open(&config).await?;
            let pruned = db.purge_expired_cache().await?;
            println!("Pruned {pruned} expired cache entries");
            Ok(())
        }
    }
}

fn coordinator(config: &Config, db: &Arc<Db>) -> Coordinator<Db, Db> {
    let coordinator = Coordinator::new(Arc::clone(db), Arc::clone(db));
    match config.day_offset {
        Some(offset) => coordinator.with_day_offset(offset),
        None => coordinator,
    }
}

async fn cmd_serve(
    config: &Config,
    jobs: PathBuf,
    max_concurrent: usize,
    max_attempts: i32,
) -> anyhow::Result<()> {
    let _guard = init_telemetry(TelemetryConfig::from_config(config))?;

    let db = Arc::new(Db::open(config).await?);
    let registry = JobRegistry::load_from_file(&jobs)?;

    let worker = Worker::new(
        Arc::clone(&db),
        coordinator(config, &db),
        Arc::new(registry),
        config.queue_name.clone(),
        WorkerConfig {
            max_concurrent,
            max_attempts,
            ..WorkerConfig::default()
        },
    );

    let w = worker.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        w.shutdown();
    });

    worker.run().await?;
    Ok(())
}

async fn cmd_enqueue(
    config: &Config,
    job_type: String,
    jobs: PathBuf,
    args: Option<String>,
    at: Option<DateTime<Utc>>,
    in_secs: Option<i64>,
) -> anyhow::Result<()> {
    let registry = JobRegistry::load_from_file(&jobs)?;
    let descriptor = registry.require(&job_type)?;
    let db = Arc::new(Db::open(config).await?);

    let args: Vec<serde_json::Value> = match args {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };
    let scheduled_at = at.or_else(|| in_secs.map(|secs| Utc::now() + TimeDelta::seconds(secs)));

    let mut job = descriptor.invoke(args);
    if let Some(at) = scheduled_at {
        job = job.at(at);
    }

    let queue = JobQueue::new(
        Arc::clone(&db),
        coordinator(config, &db),
        config.queue_name.clone(),
    );
    let submission = queue.enqueue(&job).await?;

    match &submission.outcome {
        Enqueued::Admitted {
            provider_job_id,
            admission,
        } => {
            let id = provider_job_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            println!("Admitted ({}): {} as {id}", admission.as_str(), job.key());
        }
        Enqueued::Suppressed => {
            println!("Suppressed: {} is throttled", job.key());
        }
    }
    if let Some(tracker) = &submission.tracker {
        println!("Tracked:  {}", tracker.id.map(|id| id.to_string()).unwrap_or_default());
    }

    Ok(())
}

async fn cmd_trackers_list(db: &Db, prefix: Option<String>, limit: i64) -> anyhow::Result<()> {
    let trackers = db.list_trackers(prefix.as_deref(), limit).await?;

    if trackers.is_empty() {
        println!("No trackers found.");
        return Ok(());
    }

    println!(
        "{:<8}  {:<40}  {:<12}  {:<16}  UPDATED",
        "ID", "KEY", "PROVIDER_ID", "SCHEDULED"
    );
    println!("{}", "-".repeat(100));

    for tracker in &trackers {
        let id = tracker.id.map(|id| id.to_string()).unwrap_or_default();
        let key = if tracker.key.chars().count() > 40 {
            tracker.key.chars().take(40).collect::<String>()
        } else {
            tracker.key.clone()
        };
        let provider = tracker
            .provider_job_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());
        let scheduled = tracker
            .scheduled_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());
        let updated = tracker
            .updated_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{id:<8}  {key:<40}  {provider:<12}  {scheduled:<16}  {updated}");
    }

    println!("\n{} tracker(s)", trackers.len());
    Ok(())
}

async fn cmd_trackers_show(db: &Db, key: String) -> anyhow::Result<()> {
    let Some(tracker) = db.find_by_key(&key).await? else {
        anyhow::bail!("no tracker for key '{key}'");
    };

    println!("ID:          {}", tracker.id.map(|id| id.0.to_string()).unwrap_or_default());
    println!("Key:         {}", tracker.key);
    println!(
        "Provider ID: {}",
        tracker
            .provider_job_id
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string())
    );
    println!(
        "Scheduled:   {}",
        tracker
            .scheduled_at
            .map(|at| at.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(updated) = tracker.updated_at {
        println!("Updated:     {updated}");
    }
    if let Ok(Some(ttl)) = db.cache_ttl(&key).await {
        println!("Throttled:   {}s remaining", ttl.num_seconds());
    }

    Ok(())
}
