//! Error types for schema resolution.
//!
//! Covers reading the build manifest, fetching and parsing an external
//! schema, and looking fields up in the resolved schemas.

use thiserror::Error;

/// Errors that can occur while resolving or querying field schemas.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The dependency reference does not start with a known prefix.
    #[error("invalid dependency reference '{0}' (\"git@\" or \"file://\" prefix expected)")]
    InvalidReferenceFormat(String),

    /// The configured schema base URL is empty or not http(s).
    #[error("invalid schema base URL '{0}' (http or https expected)")]
    InvalidBaseUrl(String),

    /// Downloading the schema document failed.
    #[error("can't download schema (URL: {url}): {reason}")]
    Fetch { url: String, reason: String },

    /// The schema document does not have the expected shape.
    #[error("unexpected schema format: {0}")]
    SchemaFormat(String),

    /// A field references a schema that was never loaded.
    #[error("schema '{0}' is not defined as a build dependency")]
    UndefinedSchema(String),

    /// The download was abandoned through a [`CancellationToken`](crate::CancellationToken).
    #[error("schema download cancelled")]
    Cancelled,
}

/// Convenience alias for results with [`SchemaError`].
pub type Result<T> = std::result::Result<T, SchemaError>;
