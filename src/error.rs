//! Error types for urlzip.
//!
//! Assembly stops at the first failure; [`AssemblyError`] says which stage
//! failed and for which source location.

use std::io;
use thiserror::Error;

/// Result type alias for assembly operations
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Error returned by an archive assembly run.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The fetcher could not produce a byte stream for the source
    #[error("failed to fetch {location}: {source}")]
    Fetch {
        location: String,
        #[source]
        source: FetchError,
    },

    /// The archive layer refused to open an entry for the source
    #[error("failed to create archive entry for {location}: {source}")]
    CreateEntry {
        location: String,
        #[source]
        source: io::Error,
    },

    /// Reading from the fetched stream or writing into the entry failed
    #[error("failed to copy {location} into the archive: {source}")]
    Copy {
        location: String,
        #[source]
        source: io::Error,
    },

    /// Writing the central directory or end record failed
    #[error("failed to finalize archive: {0}")]
    Finalize(#[source] io::Error),

    /// The background assembly task panicked
    #[error("archive assembly panicked: {0}")]
    Panicked(String),

    /// The default assembler could not be constructed
    #[error("assembler setup failed: {0}")]
    Setup(#[from] BuildError),
}

impl AssemblyError {
    /// Location of the source that was being processed, if any.
    pub fn location(&self) -> Option<&str> {
        match self {
            AssemblyError::Fetch { location, .. }
            | AssemblyError::CreateEntry { location, .. }
            | AssemblyError::Copy { location, .. } => Some(location),
            AssemblyError::Finalize(_) | AssemblyError::Panicked(_) | AssemblyError::Setup(_) => {
                None
            }
        }
    }
}

/// Error returned by a [`Fetcher`](crate::io::Fetcher).
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport failure or non-success status
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The fetcher does not understand this location
    #[error("unsupported location: {0}")]
    Unsupported(String),

    /// Failure from a caller-supplied fetcher
    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

/// Error returned while building an [`Assembler`](crate::Assembler).
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
}

/// Error returned when constructing a [`SourceDescriptor`](crate::SourceDescriptor).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("source location must not be empty")]
    EmptyLocation,
}

/// A descriptor could not be rendered as JSON.
///
/// Only ever logged; it never aborts assembly.
#[derive(Debug, Error)]
#[error("failed to serialize source descriptor: {0}")]
pub struct SerializationError(#[from] serde_json::Error);
