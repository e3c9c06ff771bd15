use std::time::Duration;

use anyhow::Context;
use reqwest::{StatusCode, Url};
use thiserror::Error;
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

/// Extra attempts allowed per request after a transient failure. Zero by
/// default: re-running ingestion is safe, so the client fails fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    pub retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryBudget {
    fn default() -> Self {
        Self {
            retries: 0,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryBudget {
    /// Doubling delay before retry number `retry` (zero based), capped.
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub retry: RetryBudget,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            retry: RetryBudget::default(),
        }
    }
}

/// Outbound failures. URLs are stripped because provider query strings
/// carry the service key.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(reqwest::Error),
    #[error("upstream answered {status} for {path}")]
    Status { status: u16, path: String },
}

impl FetchError {
    /// Timeouts, connection failures, throttling and 5xx answers.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(err) => err.is_timeout() || err.is_connect(),
            FetchError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS.as_u16() || (500..600).contains(status)
            }
        }
    }
}

/// Shared reqwest client for provider calls.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryBudget,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building provider http client")?;
        Ok(Self {
            client,
            retry: config.retry,
        })
    }

    pub fn retry_budget(&self) -> RetryBudget {
        self.retry
    }

    /// GET `url` and return the body of a 2xx answer. Spans log only the path.
    pub async fn get(&self, run_id: Uuid, source: &str, url: &Url) -> Result<Vec<u8>, FetchError> {
        let span = info_span!("provider_fetch", %run_id, source, path = url.path());
        async {
            let mut retry = 0;
            loop {
                match self.get_once(url).await {
                    Err(err) if err.is_transient() && retry < self.retry.retries => {
                        let delay = self.retry.delay(retry);
                        debug!(retry, ?delay, error = %err, "transient fetch failure; retrying");
                        tokio::time::sleep(delay).await;
                        retry += 1;
                    }
                    outcome => return outcome,
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn get_once(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.without_url()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                path: url.path().to_string(),
            });
        }
        let body = resp
            .bytes()
            .await
            .map_err(|err| FetchError::Transport(err.without_url()))?;
        Ok(body.to_vec())
    }
}
