use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use dealmap_core::MOLIT_SOURCE_NAME;

use crate::{parse_trade_page, ProviderContext, ProviderError, ProviderPage, TradeProvider, TradeRequest};

/// Replays captured provider pages from
/// `{root}/{region_code}/{deal_ymd}/page-{n}.xml`. A missing page file reads
/// as an empty page, i.e. "no trades that month".
#[derive(Debug, Clone)]
pub struct FixtureTradeProvider {
    root: PathBuf,
}

impl FixtureTradeProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn page_path(&self, request: &TradeRequest, page_no: u32) -> PathBuf {
        self.root
            .join(request.region_code())
            .join(request.deal_ymd())
            .join(format!("page-{page_no}.xml"))
    }
}

#[async_trait]
impl TradeProvider for FixtureTradeProvider {
    fn source_name(&self) -> &'static str {
        MOLIT_SOURCE_NAME
    }

    async fn fetch_page(
        &self,
        _ctx: &ProviderContext,
        request: &TradeRequest,
        page_no: u32,
    ) -> Result<ProviderPage, ProviderError> {
        let path = self.page_path(request, page_no);
        if !path.exists() {
            return Ok(ProviderPage::default());
        }
        let body = fs::read(&path)
            .map_err(|err| ProviderError::Transport(format!("reading {}: {err}", path.display())))?;
        parse_trade_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn missing_month_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FixtureTradeProvider::new(dir.path());
        let request = TradeRequest::new("11680", "202601").unwrap();
        let page = provider
            .fetch_page(&ProviderContext { run_id: Uuid::nil() }, &request, 1)
            .await
            .unwrap();
        assert_eq!(page, ProviderPage::default());
    }

    #[tokio::test]
    async fn reads_page_files_from_region_month_layout() {
        let dir = tempfile::tempdir().unwrap();
        let month_dir = dir.path().join("11680").join("202608");
        fs::create_dir_all(&month_dir).unwrap();
        fs::write(
            month_dir.join("page-1.xml"),
            "<response><header><resultCode>000</resultCode></header><body><items>\
             <item><aptNm>Test Tower</aptNm></item></items><totalCount>1</totalCount></body></response>",
        )
        .unwrap();

        let provider = FixtureTradeProvider::new(dir.path());
        let request = TradeRequest::new("11680", "202608").unwrap();
        let page = provider
            .fetch_page(&ProviderContext { run_id: Uuid::nil() }, &request, 1)
            .await
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.items[0]["aptNm"], "Test Tower");
    }
}
