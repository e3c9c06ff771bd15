//! Trade-data provider contract, the public apartment-trade API client,
//! the fixture replay provider and the raw record normalizer.

use async_trait::async_trait;
use dealmap_core::RawRecord;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

mod fixture;
mod molit;
pub mod normalize;
mod xml;

pub use fixture::FixtureTradeProvider;
pub use molit::{MolitTradeProvider, MOLIT_TRADE_ENDPOINT};
pub use normalize::{normalize_record, Rejection, FIELD_ALIASES};
pub use xml::parse_trade_page;

pub const CRATE_NAME: &str = "dealmap-adapters";

/// Rows requested per provider page.
pub const PAGE_SIZE: u32 = 1000;

/// Hard stop for a month whose reported total never converges.
pub const MAX_PAGES_PER_MONTH: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderContext {
    pub run_id: Uuid,
}

/// One (region, month) slice of the upstream data set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeRequest {
    region_code: String,
    deal_ymd: String,
}

impl TradeRequest {
    /// `region_code` must be 5 digits, `deal_ymd` 6 digits (`YYYYMM`).
    pub fn new(region_code: &str, deal_ymd: &str) -> Result<Self, ProviderError> {
        if !is_digits(region_code, 5) {
            return Err(ProviderError::InvalidRequest(format!(
                "region code {region_code:?} must be 5 digits"
            )));
        }
        if !is_digits(deal_ymd, 6) {
            return Err(ProviderError::InvalidRequest(format!(
                "deal month {deal_ymd:?} must be 6 digits"
            )));
        }
        Ok(Self {
            region_code: region_code.to_string(),
            deal_ymd: deal_ymd.to_string(),
        })
    }

    pub fn region_code(&self) -> &str {
        &self.region_code
    }

    pub fn deal_ymd(&self) -> &str {
        &self.deal_ymd
    }
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderPage {
    pub total_count: u64,
    pub items: Vec<RawRecord>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider misconfigured: {0}")]
    Config(String),
    #[error("invalid provider request: {0}")]
    InvalidRequest(String),
    #[error("provider transport failure: {0}")]
    Transport(String),
    #[error("provider returned http status {0}")]
    Http(u16),
    #[error("provider error {code}: {message}")]
    Upstream { code: String, message: String },
    #[error("could not decode provider response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait TradeProvider: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn fetch_page(
        &self,
        ctx: &ProviderContext,
        request: &TradeRequest,
        page_no: u32,
    ) -> Result<ProviderPage, ProviderError>;
}

/// Pull every page of one (region, month). Stops once the accumulated item
/// count reaches the reported total or a page comes back empty.
pub async fn fetch_month(
    provider: &dyn TradeProvider,
    ctx: &ProviderContext,
    request: &TradeRequest,
) -> Result<Vec<RawRecord>, ProviderError> {
    let mut all = Vec::new();
    let mut page_no = 1;
    loop {
        if page_no > MAX_PAGES_PER_MONTH {
            return Err(ProviderError::Decode(format!(
                "pagination for {}/{} did not finish within {MAX_PAGES_PER_MONTH} pages",
                request.region_code(),
                request.deal_ymd()
            )));
        }
        let page = provider.fetch_page(ctx, request, page_no).await?;
        let received = page.items.len();
        all.extend(page.items);
        debug!(
            region = request.region_code(),
            ymd = request.deal_ymd(),
            page_no,
            received,
            total = page.total_count,
            "fetched provider page"
        );
        if received == 0 || all.len() as u64 >= page.total_count {
            break;
        }
        page_no += 1;
    }
    Ok(all)
}
