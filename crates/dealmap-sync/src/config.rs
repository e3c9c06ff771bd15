use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;

pub const DEFAULT_MONTHS: u32 = 3;
pub const DEFAULT_MAX_PER_REGION: usize = 8000;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Explicit region codes; empty means the catalog defaults.
    pub regions: Vec<String>,
    pub months: u32,
    pub max_per_region: usize,
    pub dry_run: bool,
    /// Anchor for the trailing month window; `None` means today (UTC).
    pub as_of: Option<NaiveDate>,
    pub http_timeout_secs: u64,
    /// Per-request retries on transient provider failures.
    pub http_retries: u32,
    pub user_agent: String,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    /// Replay provider pages from this directory instead of the live API.
    pub fixtures_dir: Option<PathBuf>,
    pub regions_file: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            months: DEFAULT_MONTHS,
            max_per_region: DEFAULT_MAX_PER_REGION,
            dry_run: false,
            as_of: None,
            http_timeout_secs: 20,
            http_retries: 0,
            user_agent: "dealmap-ingest/0.1".to_string(),
            scheduler_enabled: false,
            sync_cron: "0 0 18 * * *".to_string(),
            fixtures_dir: None,
            regions_file: None,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            regions: std::env::var("DEALMAP_REGIONS")
                .map(|v| parse_region_list(&v))
                .unwrap_or_default(),
            months: env_parse("DEALMAP_MONTHS").unwrap_or(defaults.months),
            max_per_region: env_parse("DEALMAP_MAX_PER_REGION").unwrap_or(defaults.max_per_region),
            dry_run: env_flag("DEALMAP_DRY_RUN"),
            as_of: None,
            http_timeout_secs: env_parse("DEALMAP_HTTP_TIMEOUT_SECS").unwrap_or(defaults.http_timeout_secs),
            http_retries: env_parse("DEALMAP_HTTP_RETRIES").unwrap_or(defaults.http_retries),
            user_agent: std::env::var("DEALMAP_USER_AGENT").unwrap_or(defaults.user_agent),
            scheduler_enabled: env_flag("DEALMAP_SCHEDULER_ENABLED"),
            sync_cron: std::env::var("DEALMAP_SYNC_CRON").unwrap_or(defaults.sync_cron),
            fixtures_dir: std::env::var("DEALMAP_FIXTURES_DIR").ok().map(PathBuf::from),
            regions_file: std::env::var("DEALMAP_REGIONS_FILE").ok().map(PathBuf::from),
        }
    }
}

/// Comma separated codes, blanks dropped.
pub fn parse_region_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}
