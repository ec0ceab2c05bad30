mod http;
mod local;

pub use http::{HttpFetcher, HttpFetcherConfig};
pub use local::LocalFileFetcher;

use async_trait::async_trait;
use std::pin::Pin;
use tokio::io::AsyncRead;

use crate::error::FetchError;

/// Readable body of a fetched resource
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

/// Trait for opening a resource as a byte stream
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Open the resource at `location`; dropping the stream releases it
    async fn get(&self, location: &str) -> Result<ByteStream, FetchError>;
}

/// Sends `http://` and `https://` locations over HTTP and opens everything
/// else as a local file.
pub struct SchemeFetcher {
    http: HttpFetcher,
    local: LocalFileFetcher,
}

impl SchemeFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            local: LocalFileFetcher,
        }
    }
}

pub fn is_http_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[async_trait]
impl Fetcher for SchemeFetcher {
    async fn get(&self, location: &str) -> Result<ByteStream, FetchError> {
        if is_http_url(location) {
            self.http.get(location).await
        } else {
            self.local.get(location).await
        }
    }
}
