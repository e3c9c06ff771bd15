//! Ingestion orchestration: region catalog, run configuration, the sync
//! pipeline and its cron schedule.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use dealmap_adapters::{FixtureTradeProvider, MolitTradeProvider, TradeProvider};
use dealmap_storage::{DealStore, HttpClientConfig, HttpFetcher, RetryBudget};
use tracing::info;

mod config;
mod pipeline;
mod regions;
mod scheduler;

pub use config::{parse_region_list, SyncConfig, DEFAULT_MAX_PER_REGION, DEFAULT_MONTHS};
pub use pipeline::{trailing_months, RegionFailure, RegionStats, RunTrigger, SyncPipeline, SyncRunSummary};
pub use regions::RegionRegistry;
pub use scheduler::maybe_build_scheduler;

pub const CRATE_NAME: &str = "dealmap-sync";

/// Fixture replay when `fixtures_dir` is set, otherwise the live API.
pub fn provider_from_config(config: &SyncConfig) -> Result<Arc<dyn TradeProvider>> {
    if let Some(dir) = &config.fixtures_dir {
        info!(dir = %dir.display(), "using fixture trade provider");
        return Ok(Arc::new(FixtureTradeProvider::new(dir.clone())));
    }
    let http = HttpFetcher::new(HttpClientConfig {
        timeout: Duration::from_secs(config.http_timeout_secs),
        user_agent: Some(config.user_agent.clone()),
        retry: RetryBudget {
            retries: config.http_retries,
            ..Default::default()
        },
    })?;
    let provider = MolitTradeProvider::from_env(http).context("configuring trade provider")?;
    Ok(Arc::new(provider))
}

pub async fn registry_from_config(config: &SyncConfig) -> Result<RegionRegistry> {
    match &config.regions_file {
        Some(path) => RegionRegistry::load(path).await,
        None => RegionRegistry::builtin(),
    }
}

pub async fn pipeline_from_config(config: SyncConfig, store: Arc<dyn DealStore>) -> Result<SyncPipeline> {
    let registry = registry_from_config(&config).await?;
    let provider = provider_from_config(&config)?;
    Ok(SyncPipeline::new(config, registry, provider, store))
}
