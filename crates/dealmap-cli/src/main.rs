use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use dealmap_storage::{DealStore, MemoryDealStore, PgDealStore};
use dealmap_sync::{maybe_build_scheduler, parse_region_list, pipeline_from_config, RunTrigger, SyncConfig};
use dealmap_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "dealmap-cli")]
#[command(about = "Apartment deal ingestion and map search")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch, normalize and persist recent transactions.
    Sync(SyncArgs),
    /// Apply pending database migrations.
    Migrate,
    /// Run the HTTP API (and the sync schedule when enabled).
    Serve,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    /// Comma separated region codes; defaults to the catalog's default regions.
    #[arg(long)]
    regions: Option<String>,
    #[arg(long)]
    months: Option<u32>,
    #[arg(long)]
    max_per_region: Option<usize>,
    /// Fetch and normalize without writing anything.
    #[arg(long)]
    dry_run: bool,
    /// Replay provider pages from a fixture directory.
    #[arg(long)]
    fixtures: Option<PathBuf>,
    /// Anchor date (YYYY-MM-DD) for the trailing month window.
    #[arg(long)]
    as_of: Option<NaiveDate>,
    /// Record the run as scheduled, which writes ingest audit events.
    #[arg(long)]
    scheduled: bool,
}

impl SyncArgs {
    fn apply(self, mut config: SyncConfig) -> SyncConfig {
        if let Some(regions) = self.regions {
            config.regions = parse_region_list(&regions);
        }
        if let Some(months) = self.months {
            config.months = months;
        }
        if let Some(max) = self.max_per_region {
            config.max_per_region = max;
        }
        if self.fixtures.is_some() {
            config.fixtures_dir = self.fixtures;
        }
        config.dry_run |= self.dry_run;
        config.as_of = self.as_of.or(config.as_of);
        config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_files();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => run_sync(args).await?,
        Commands::Migrate => {
            let url = database_url().context("DATABASE_URL is required for migrate")?;
            let store = PgDealStore::connect(&url).await?;
            store.migrate().await?;
            println!("migrations applied");
        }
        Commands::Serve => run_serve().await?,
    }

    Ok(())
}

/// `.env.local` first; dotenvy never overrides a variable that is already set.
fn load_env_files() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();
}

fn database_url() -> Option<String> {
    std::env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty())
}

async fn run_sync(args: SyncArgs) -> Result<()> {
    let trigger = if args.scheduled {
        RunTrigger::Scheduled
    } else {
        RunTrigger::Manual
    };
    let config = args.apply(SyncConfig::from_env());

    let store: Arc<dyn DealStore> = match database_url() {
        Some(url) => Arc::new(PgDealStore::connect(&url).await?),
        None if config.dry_run => {
            info!("DATABASE_URL not set; dry run uses an in-memory store");
            Arc::new(MemoryDealStore::new())
        }
        None => bail!("DATABASE_URL is required unless --dry-run is set"),
    };

    let pipeline = pipeline_from_config(config, store).await?;
    let summary = pipeline.run_once(trigger).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    if !summary.is_success() {
        bail!("{} region(s) failed", summary.failures.len());
    }
    Ok(())
}

async fn run_serve() -> Result<()> {
    let store: Option<Arc<dyn DealStore>> = match database_url() {
        Some(url) => Some(Arc::new(PgDealStore::connect_lazy(&url)?)),
        None => {
            warn!("DATABASE_URL not set; data routes will answer 503");
            None
        }
    };

    let config = SyncConfig::from_env();
    let scheduler = match (&store, config.scheduler_enabled) {
        (Some(store), true) => {
            let pipeline = pipeline_from_config(config, Arc::clone(store)).await?;
            maybe_build_scheduler(Arc::new(pipeline)).await?
        }
        (None, true) => {
            warn!("scheduler enabled but no store configured; skipping");
            None
        }
        _ => None,
    };
    if let Some(scheduler) = &scheduler {
        scheduler.start().await.context("starting sync scheduler")?;
    }

    dealmap_web::serve(AppState::new(store), dealmap_web::port_from_env()).await
}
