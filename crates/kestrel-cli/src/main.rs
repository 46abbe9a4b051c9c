mod store;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use kestrel_client::{ReqwestTransport, TransportConfig, WebhookNotifier};
use kestrel_core::circuit_gate::{CircuitGate, GateState};
use kestrel_core::job::{DEFAULT_PRIORITY, EnqueueRequest, JobStatus, WorkerConfig};
use kestrel_core::{
    DiscoveryConfig, DiscoveryCrawler, FetchAudit, FetchPipeline, JobQueue, PipelineConfig,
    TracingWorkerReporter, WorkerService,
};
use kestrel_db::{
    Database, DatabaseConfig, FetchJobRepository, FetchLogRepository, ResourceRepository,
};

use store::AnyStore;

type Pipeline = FetchPipeline<ReqwestTransport, AnyStore>;
type Crawler = DiscoveryCrawler<
    Pipeline,
    ResourceRepository,
    FetchJobRepository,
    Option<FetchLogRepository>,
    Option<WebhookNotifier>,
>;
type Worker = WorkerService<FetchJobRepository, Pipeline, ResourceRepository>;

#[derive(Parser)]
#[command(name = "kestrel", version, about = "Rate-limited ingestion of ESI war records")]
struct Cli {
    /// Webhook that receives a summary when discovery finds new resources
    #[arg(long, global = true, env = "KESTREL_WEBHOOK_URL")]
    webhook_url: Option<String>,

    /// Skip writing listing fetches to the fetch log
    #[arg(long, global = true, env = "KESTREL_NO_AUDIT", default_value_t = false)]
    no_audit: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one discovery pass and queue every unknown resource
    Discover {
        /// Exclusive upper bound for the first listing page (defaults to newest)
        #[arg(long)]
        seed: Option<i64>,
    },

    /// Re-queue known resources that are not finished yet
    Rescan {
        #[arg(short, long, env = "KESTREL_RESCAN_LIMIT", default_value_t = 1000)]
        limit: usize,
    },

    /// Queue specific resource ids
    Enqueue {
        #[arg(required = true)]
        ids: Vec<i64>,

        /// Lower values are dispatched first
        #[arg(short, long, default_value_t = DEFAULT_PRIORITY)]
        priority: i32,
    },

    /// Process queued jobs until interrupted
    Worker {
        #[command(flatten)]
        pool: PoolArgs,
    },

    /// Workers plus periodic discovery and rescan, until interrupted
    Run {
        #[command(flatten)]
        pool: PoolArgs,

        #[arg(long, env = "KESTREL_DISCOVERY_INTERVAL_SECS", default_value_t = 3600)]
        discovery_interval: u64,

        #[arg(long, env = "KESTREL_RESCAN_INTERVAL_SECS", default_value_t = 21600)]
        rescan_interval: u64,

        #[arg(long, env = "KESTREL_RESCAN_LIMIT", default_value_t = 1000)]
        rescan_limit: usize,
    },

    /// Show gate state and job counts
    Status,

    /// Operator toggle for the fleet-wide offline flag
    Gate {
        #[command(subcommand)]
        action: GateAction,
    },
}

#[derive(clap::Args)]
struct PoolArgs {
    /// Number of concurrent workers in this process
    #[arg(short, long, env = "KESTREL_WORKER_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Seconds to wait between polls when the queue is empty
    #[arg(long, env = "KESTREL_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval: u64,
}

#[derive(Subcommand)]
enum GateAction {
    /// Stop all upstream requests fleet-wide
    Offline,
    /// Clear the offline flag
    Online,
}

/// Everything the commands share, built once from the environment.
struct App {
    db: Database,
    store: AnyStore,
    pipeline: PipelineConfig,
    transport: TransportConfig,
    notifier: Option<WebhookNotifier>,
    audit: bool,
}

impl App {
    async fn connect(cli: &Cli) -> Result<Self> {
        let pipeline = PipelineConfig::from_env()?;
        let transport = TransportConfig::from_env()?;
        let store = AnyStore::from_env().await?;
        let db = connect_db().await?;
        let notifier = cli
            .webhook_url
            .as_deref()
            .map(WebhookNotifier::new)
            .transpose()
            .context("Invalid webhook configuration")?;

        Ok(Self {
            db,
            store,
            pipeline,
            transport,
            notifier,
            audit: !cli.no_audit,
        })
    }

    fn fetcher(&self) -> Result<Pipeline> {
        let transport = ReqwestTransport::with_config(&self.transport)
            .context("Failed to create HTTP client")?;
        Ok(FetchPipeline::from_config(
            transport,
            self.store.clone(),
            &self.pipeline,
        ))
    }

    fn crawler(&self, seed: Option<i64>) -> Result<Crawler> {
        let log = self.audit.then(|| self.db.fetch_log_repo());
        Ok(DiscoveryCrawler::new(
            FetchAudit::new(self.fetcher()?, log),
            self.db.resource_repo(),
            self.db.job_repo(),
            self.notifier.clone(),
            self.pipeline.endpoints()?,
            DiscoveryConfig::default().with_seed(seed),
        ))
    }

    fn workers(&self, pool: &PoolArgs) -> Result<Vec<Worker>> {
        let fetcher = self.fetcher()?;
        let endpoints = self.pipeline.endpoints()?;
        let prefix = WorkerConfig::default().worker_id;

        let workers = (0..pool.concurrency.max(1))
            .map(|i| {
                let config = WorkerConfig::default()
                    .with_worker_id(format!("{prefix}-{i}"))
                    .with_poll_interval(Duration::from_secs(pool.poll_interval.max(1)));
                WorkerService::new(
                    self.db.job_repo(),
                    fetcher.clone(),
                    self.db.resource_repo(),
                    endpoints.clone(),
                    config,
                )
            })
            .collect();
        Ok(workers)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("kestrel=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Gate { action } => cmd_gate(action).await,
        Commands::Discover { seed } => {
            let app = App::connect(&cli).await?;
            cmd_discover(&app, *seed).await
        }
        Commands::Rescan { limit } => {
            let app = App::connect(&cli).await?;
            cmd_rescan(&app, *limit).await
        }
        Commands::Enqueue { ids, priority } => {
            let app = App::connect(&cli).await?;
            cmd_enqueue(&app, ids, *priority).await
        }
        Commands::Worker { pool } => {
            let app = App::connect(&cli).await?;
            cmd_worker(&app, pool).await
        }
        Commands::Run {
            pool,
            discovery_interval,
            rescan_interval,
            rescan_limit,
        } => {
            let app = App::connect(&cli).await?;
            cmd_run(
                &app,
                pool,
                Duration::from_secs((*discovery_interval).max(1)),
                Duration::from_secs((*rescan_interval).max(1)),
                *rescan_limit,
            )
            .await
        }
        Commands::Status => {
            let app = App::connect(&cli).await?;
            cmd_status(&app).await
        }
    }
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env()?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await?;
    Ok(db)
}

/// Cancel `token` on Ctrl-C.
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
        token.cancel();
    });
}

async fn cmd_discover(app: &App, seed: Option<i64>) -> Result<()> {
    let report = app.crawler(seed)?.run().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn cmd_rescan(app: &App, limit: usize) -> Result<()> {
    let queued = app.crawler(None)?.rescan(limit).await?;
    println!("Queued {queued} unfinished resources for rescan");
    Ok(())
}

async fn cmd_enqueue(app: &App, ids: &[i64], priority: i32) -> Result<()> {
    let requests: Vec<_> = ids
        .iter()
        .map(|&id| EnqueueRequest::new(id).with_priority(priority))
        .collect();
    let queued = app.db.job_repo().enqueue_bulk(&requests).await?;
    println!("Queued {queued} jobs at priority {priority}");
    Ok(())
}

async fn cmd_worker(app: &App, pool: &PoolArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let handles = spawn_workers(app.workers(pool)?, &cancel);
    join_workers(handles).await;
    Ok(())
}

async fn cmd_run(
    app: &App,
    pool: &PoolArgs,
    discovery_interval: Duration,
    rescan_interval: Duration,
    rescan_limit: usize,
) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let handles = spawn_workers(app.workers(pool)?, &cancel);
    let crawler = app.crawler(None)?;

    let mut discovery = tokio::time::interval(discovery_interval);
    let mut rescan = tokio::time::interval(rescan_interval);
    discovery.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    rescan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = discovery.tick() => {
                interruptible(&cancel, "discovery", crawler.run()).await;
            }
            _ = rescan.tick() => {
                if let Some(Err(e)) = interruptible(&cancel, "rescan", crawler.rescan(rescan_limit)).await {
                    tracing::error!(error = %e, "Rescan failed");
                }
            }
        }
    }

    join_workers(handles).await;
    Ok(())
}

/// Drive `task` unless shutdown is requested first. A pass can sit in
/// throttle pauses for a minute, so Ctrl-C must not wait for it.
async fn interruptible<F: Future>(
    cancel: &CancellationToken,
    name: &str,
    task: F,
) -> Option<F::Output> {
    let output = cancel.run_until_cancelled(task).await;
    if output.is_none() {
        tracing::info!(task = name, "Interrupted by shutdown");
    }
    output
}

fn spawn_workers(
    workers: Vec<Worker>,
    cancel: &CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    workers
        .into_iter()
        .map(|worker| {
            let token = cancel.clone();
            tokio::spawn(async move {
                let reporter = TracingWorkerReporter;
                if let Err(e) = worker.run(token, &reporter).await {
                    tracing::error!(worker_id = %worker.worker_id(), error = %e, "Worker exited with error");
                }
            })
        })
        .collect()
}

async fn join_workers(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Worker task panicked");
        }
    }
}

async fn cmd_status(app: &App) -> Result<()> {
    let gate = CircuitGate::new(
        app.store.clone(),
        &app.pipeline.key_prefix,
        app.pipeline.gate.clone(),
    );
    let queue = app.db.job_repo();

    println!("Upstream gate: {}", gate.state().await?);
    if !app.store.is_shared() {
        println!("  (in-process store: REDIS_URL not set)");
    }

    println!("\nJobs:");
    for status in JobStatus::ALL {
        println!("  {:<10} {}", status.as_str(), queue.count_by_status(status).await?);
    }

    let (total, unfinished) = app.db.resource_repo().counts().await?;
    println!("\nResources: {total} stored, {unfinished} unfinished");

    let recent = app.db.fetch_log_repo().recent(5).await?;
    if !recent.is_empty() {
        println!("\nRecent fetch log:");
        for entry in recent {
            println!(
                "  {} [{}] {} observed, {} new, {}{}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                entry.outcome.as_str(),
                entry.items_observed,
                entry.items_new,
                entry.url,
                entry
                    .error_message
                    .map(|m| format!(" ({m})"))
                    .unwrap_or_default(),
            );
        }
    }

    Ok(())
}

async fn cmd_gate(action: &GateAction) -> Result<()> {
    let config = PipelineConfig::from_env()?;
    let store = AnyStore::from_env().await?;
    if !store.is_shared() {
        anyhow::bail!("Gate commands need REDIS_URL; an in-process flag would affect nothing");
    }

    let gate = CircuitGate::new(store, &config.key_prefix, config.gate.clone());
    gate.set_offline(matches!(action, GateAction::Offline))
        .await?;

    match gate.state().await? {
        GateState::Offline => println!("Upstream flagged offline fleet-wide"),
        state => println!("Offline flag cleared (gate: {state})"),
    }
    Ok(())
}
