use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{DescriptorError, SerializationError};

/// A resource to fetch, plus whatever metadata the caller wants to carry along.
///
/// Descriptors are processed positionally: two descriptors with the same
/// location are two separate archive entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptor")]
pub struct SourceDescriptor {
    #[serde(rename = "url")]
    location: String,
    #[serde(rename = "extra")]
    metadata: Value,
}

#[derive(Deserialize)]
struct RawDescriptor {
    #[serde(rename = "url", alias = "location")]
    location: String,
    #[serde(rename = "extra", alias = "metadata", default)]
    metadata: Value,
}

impl TryFrom<RawDescriptor> for SourceDescriptor {
    type Error = DescriptorError;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        Ok(SourceDescriptor::new(raw.location)?.with_metadata(raw.metadata))
    }
}

impl SourceDescriptor {
    pub fn new(location: impl Into<String>) -> Result<Self, DescriptorError> {
        let location = location.into();
        if location.is_empty() {
            return Err(DescriptorError::EmptyLocation);
        }
        Ok(Self {
            location,
            metadata: Value::Null,
        })
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn metadata(&self) -> &Value {
        &self.metadata
    }

    /// Render the descriptor as a compact JSON object (`{"url":..,"extra":..}`).
    pub fn to_json(&self) -> Result<String, SerializationError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => f.write_str(&json),
            Err(err) => {
                tracing::warn!(location = %self.location, error = %err, "descriptor not renderable");
                f.write_str(&self.location)
            }
        }
    }
}
