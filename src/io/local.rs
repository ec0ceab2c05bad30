use async_trait::async_trait;
use std::path::Path;

use super::{ByteStream, Fetcher};
use crate::error::FetchError;

/// Opens plain filesystem paths and `file://` URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileFetcher;

#[async_trait]
impl Fetcher for LocalFileFetcher {
    async fn get(&self, location: &str) -> Result<ByteStream, FetchError> {
        let path = location.strip_prefix("file://").unwrap_or(location);
        if path.contains("://") {
            return Err(FetchError::Unsupported(location.to_string()));
        }

        let file = tokio::fs::File::open(Path::new(path)).await?;
        Ok(Box::pin(file))
    }
}
