use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dealmap_core::query::{MapComplex, MapQuery, SearchPage, SearchQuery};
use dealmap_core::{AuditEntry, AuditEvent, ComplexUpsert, NormalizedDealInsert, RawDealInsert, RegionMeta};
use serde::Serialize;
use thiserror::Error;

/// Audit events read back by the freshness report.
pub const INGEST_EVENT_NAMES: [&str; 2] = ["ingest_success", "ingest_error"];

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store is unconfigured or cannot be reached; callers should retry later.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store query failed: {0}")]
    Query(String),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a raw insert: the row id for the hash, whether it was new or
/// already archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInsert {
    pub id: i64,
    pub inserted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFreshness {
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub count_24h: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedFreshness {
    pub last_deal_date: Option<NaiveDate>,
    pub count_24h: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FreshnessReport {
    pub checked_at: DateTime<Utc>,
    pub raw: RawFreshness,
    pub normalized: NormalizedFreshness,
    pub recent_ingest_runs: Vec<AuditEntry>,
}

/// Storage seam used by the ingestion pipeline and both query engines.
///
/// Every write is idempotent: re-running ingestion over the same window
/// inserts nothing new.
#[async_trait]
pub trait DealStore: Send + Sync {
    /// Insert or correct a region by code; returns its id.
    async fn upsert_region(&self, region: &RegionMeta) -> StoreResult<i64>;

    /// Find or create the complex for (region, name, neighborhood), merging
    /// attributes first-non-null-wins; returns its id.
    async fn resolve_complex(&self, upsert: &ComplexUpsert) -> StoreResult<i64>;

    /// Archive a raw record by content hash. A conflicting hash inserts
    /// nothing and returns the existing row's id with `inserted == false`.
    async fn insert_raw_deal(&self, raw: &RawDealInsert) -> StoreResult<RawInsert>;

    /// Returns `false` when the functional key already exists.
    async fn insert_normalized_deal(&self, deal: &NormalizedDealInsert) -> StoreResult<bool>;

    async fn record_audit(&self, event: &AuditEvent) -> StoreResult<()>;

    /// Ranked, paginated search. `today` anchors recency and the 3-month window.
    async fn search_complexes(&self, query: &SearchQuery, today: NaiveDate) -> StoreResult<SearchPage>;

    async fn map_complexes(&self, query: &MapQuery) -> StoreResult<Vec<MapComplex>>;

    async fn data_freshness(&self, now: DateTime<Utc>) -> StoreResult<FreshnessReport>;
}
