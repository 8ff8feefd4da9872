//! GraphQL client for a Mina daemon, backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::ClientError;
use crate::queries;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::types::{
    AccountData, BestChainData, DaemonStatus, DaemonStatusData, GraphQlResponse,
    RawAccount, RawBlock,
};

/// Queries the indexer issues against a daemon.
#[async_trait]
pub trait MinaClient: Send + Sync {
    async fn daemon_status(&self) -> Result<DaemonStatus, ClientError>;

    /// The node's best chain, oldest block first, limited to the last
    /// `max_length` blocks.
    async fn best_chain(&self, max_length: u32) -> Result<Vec<RawBlock>, ClientError>;

    async fn account(&self, public_key: &str) -> Result<Option<RawAccount>, ClientError>;
}

/// Configuration for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP GraphQL client with retry on transient failures.
pub struct HttpClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpClient {
    /// Create a client for the daemon's GraphQL endpoint.
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once<T: DeserializeOwned>(&self, query: &str) -> Result<T, ClientError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "query": query }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }

        let body: GraphQlResponse<T> = resp.json().await?;
        if !body.errors.is_empty() {
            return Err(ClientError::GraphQl(
                body.errors.into_iter().map(|e| e.message).collect(),
            ));
        }
        body.data
            .ok_or_else(|| ClientError::Decode("response has no data".into()))
    }

    /// Run a query, retrying transient failures per the retry policy.
    pub async fn query<T: DeserializeOwned>(&self, query: &str) -> Result<T, ClientError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(query).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_retryable() => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            url = %self.url,
                            "retrying request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(
                            attempt,
                            error = %e,
                            url = %self.url,
                            "max retries exceeded"
                        );
                        return Err(e);
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl MinaClient for HttpClient {
    async fn daemon_status(&self) -> Result<DaemonStatus, ClientError> {
        let data: DaemonStatusData = self.query(queries::DAEMON_STATUS).await?;
        Ok(data.daemon_status)
    }

    async fn best_chain(&self, max_length: u32) -> Result<Vec<RawBlock>, ClientError> {
        let data: BestChainData = self.query(&queries::best_chain(max_length)).await?;
        Ok(data.best_chain)
    }

    async fn account(&self, public_key: &str) -> Result<Option<RawAccount>, ClientError> {
        let data: AccountData = self.query(&queries::account(public_key)).await?;
        Ok(data.account)
    }
}
