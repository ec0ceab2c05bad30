use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;

use super::{ByteStream, Fetcher};
use crate::error::{BuildError, FetchError};

/// Timeouts applied by [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    /// Time allowed to establish a connection
    pub connect_timeout: Duration,
    /// Longest pause between two reads of a response
    pub read_timeout: Duration,
    /// How long an unused pooled connection is kept
    pub pool_idle_timeout: Duration,
    /// TCP keepalive interval
    pub tcp_keepalive: Duration,
    /// Total time for one request, body included
    pub timeout: Duration,
}

impl Default for HttpFetcherConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            pool_idle_timeout: Duration::from_secs(10),
            tcp_keepalive: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP fetcher sharing one pooled client across all requests
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeouts
    pub fn new() -> Result<Self, BuildError> {
        Self::with_config(&HttpFetcherConfig::default())
    }

    pub fn with_config(config: &HttpFetcherConfig) -> Result<Self, BuildError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn get(&self, location: &str) -> Result<ByteStream, FetchError> {
        let resp = self.client.get(location).send().await?.error_for_status()?;

        tracing::trace!(
            url = location,
            status = %resp.status(),
            content_length = ?resp.content_length(),
            "response received"
        );

        let body = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }
}
