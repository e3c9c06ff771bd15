use std::fmt;

use async_trait::async_trait;
use dealmap_core::MOLIT_SOURCE_NAME;
use dealmap_storage::{FetchError, HttpFetcher};
use reqwest::Url;

use crate::{parse_trade_page, ProviderContext, ProviderError, ProviderPage, TradeProvider, TradeRequest, PAGE_SIZE};

pub const MOLIT_TRADE_ENDPOINT: &str =
    "https://apis.data.go.kr/1613000/RTMSDataSvcAptTradeDev/getRTMSDataSvcAptTradeDev";

pub const API_KEY_ENV: &str = "DATA_GO_KR_API_KEY";

/// Client for the public apartment-trade API (one XML page per call).
#[derive(Clone)]
pub struct MolitTradeProvider {
    http: HttpFetcher,
    endpoint: Url,
    service_key: String,
}

impl fmt::Debug for MolitTradeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MolitTradeProvider")
            .field("endpoint", &self.endpoint.as_str())
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl MolitTradeProvider {
    pub fn new(http: HttpFetcher, service_key: impl Into<String>) -> Result<Self, ProviderError> {
        let service_key = service_key.into();
        if service_key.trim().is_empty() {
            return Err(ProviderError::Config(format!("{API_KEY_ENV} is empty")));
        }
        let endpoint = Url::parse(MOLIT_TRADE_ENDPOINT)
            .map_err(|err| ProviderError::Config(format!("invalid endpoint: {err}")))?;
        Ok(Self {
            http,
            endpoint,
            service_key,
        })
    }

    pub fn from_env(http: HttpFetcher) -> Result<Self, ProviderError> {
        let key = std::env::var(API_KEY_ENV)
            .map_err(|_| ProviderError::Config(format!("missing {API_KEY_ENV}")))?;
        Self::new(http, key)
    }

    pub fn with_endpoint(mut self, endpoint: Url) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn page_url(&self, request: &TradeRequest, page_no: u32) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("serviceKey", &self.service_key)
            .append_pair("LAWD_CD", request.region_code())
            .append_pair("DEAL_YMD", request.deal_ymd())
            .append_pair("numOfRows", &PAGE_SIZE.to_string())
            .append_pair("pageNo", &page_no.to_string());
        url
    }
}

#[async_trait]
impl TradeProvider for MolitTradeProvider {
    fn source_name(&self) -> &'static str {
        MOLIT_SOURCE_NAME
    }

    async fn fetch_page(
        &self,
        ctx: &ProviderContext,
        request: &TradeRequest,
        page_no: u32,
    ) -> Result<ProviderPage, ProviderError> {
        let url = self.page_url(request, page_no);
        let body = self
            .http
            .get(ctx.run_id, self.source_name(), &url)
            .await
            .map_err(|err| match err {
                FetchError::Status { status, .. } => ProviderError::Http(status),
                FetchError::Transport(inner) => ProviderError::Transport(inner.to_string()),
            })?;
        parse_trade_page(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealmap_storage::HttpClientConfig;

    fn provider() -> MolitTradeProvider {
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        MolitTradeProvider::new(http, "secret-key").unwrap()
    }

    #[test]
    fn page_url_carries_all_parameters() {
        let request = TradeRequest::new("11680", "202608").unwrap();
        let url = provider().page_url(&request, 3);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(url.as_str().starts_with(MOLIT_TRADE_ENDPOINT));
        assert!(pairs.contains(&("LAWD_CD".into(), "11680".into())));
        assert!(pairs.contains(&("DEAL_YMD".into(), "202608".into())));
        assert!(pairs.contains(&("numOfRows".into(), "1000".into())));
        assert!(pairs.contains(&("pageNo".into(), "3".into())));
        assert!(pairs.contains(&("serviceKey".into(), "secret-key".into())));
    }

    #[test]
    fn blank_key_is_a_config_error() {
        let http = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        assert!(matches!(
            MolitTradeProvider::new(http, "  "),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_key() {
        assert!(!format!("{:?}", provider()).contains("secret-key"));
    }
}
