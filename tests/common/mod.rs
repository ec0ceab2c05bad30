#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use tokio_util::io::StreamReader;

use urlzip::{ArchiveStream, ByteStream, FetchError, Fetcher, SourceDescriptor};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub async fn serve(server: &MockServer, route: &str, body: Vec<u8>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body))
        .mount(server)
        .await;
}

pub fn sources<S: AsRef<str>>(locations: &[S]) -> Vec<SourceDescriptor> {
    locations
        .iter()
        .map(|l| SourceDescriptor::new(l.as_ref()).unwrap())
        .collect()
}

/// Read a stream to its end, returning the bytes and the terminal error, if any
pub async fn drain(mut stream: ArchiveStream) -> (Vec<u8>, Option<io::Error>) {
    let mut bytes = Vec::new();
    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(err) => return (bytes, Some(err)),
        }
    }
    (bytes, None)
}

/// Serves bodies from memory. A location ending in `boom` panics; one ending
/// in `broken` yields a few bytes and then fails with a connection reset.
pub struct MemoryFetcher(pub HashMap<String, Vec<u8>>);

impl MemoryFetcher {
    pub fn new(bodies: &[(&str, &[u8])]) -> Self {
        Self(
            bodies
                .iter()
                .map(|(location, body)| (location.to_string(), body.to_vec()))
                .collect(),
        )
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn get(&self, location: &str) -> Result<ByteStream, FetchError> {
        if location.ends_with("boom") {
            panic!("fetcher exploded on {location}");
        }
        if location.ends_with("broken") {
            let chunks: Vec<io::Result<Bytes>> = vec![
                Ok(Bytes::from_static(b"half a ")),
                Ok(Bytes::from_static(b"body")),
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            ];
            return Ok(Box::pin(StreamReader::new(futures::stream::iter(chunks))));
        }
        match self.0.get(location) {
            Some(body) => Ok(Box::pin(io::Cursor::new(body.clone()))),
            None => Err(FetchError::Unsupported(location.to_string())),
        }
    }
}
