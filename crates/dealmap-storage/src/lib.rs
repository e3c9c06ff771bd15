//! Persistence and outbound HTTP for dealmap.
//!
//! [`DealStore`] is the seam between ingestion / query serving and the
//! backing store. [`PgDealStore`] targets PostgreSQL + PostGIS;
//! [`MemoryDealStore`] keeps everything in process for tests and dry runs.

mod fetch;
mod memory;
mod postgres;
mod store;

pub use fetch::{FetchError, HttpClientConfig, HttpFetcher, RetryBudget};
pub use memory::MemoryDealStore;
pub use postgres::PgDealStore;
pub use store::{
    DealStore, FreshnessReport, NormalizedFreshness, RawFreshness, RawInsert, StoreError, StoreResult,
};

pub const CRATE_NAME: &str = "dealmap-storage";
