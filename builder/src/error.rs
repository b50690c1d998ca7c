//! Error types for the package build pipeline.
//!
//! Each stage has its own error enum; the pipeline wraps whichever one
//! occurred into a [`BuildError`] naming the stage and the offending file.

use std::fmt;
use std::path::PathBuf;

use pkgbuild_core::tree::TreeError;
use pkgbuild_core::{ManifestError, ValidationError};
use pkgbuild_schema::SchemaError;
use thiserror::Error;

/// Errors raised while replacing external field references.
#[derive(Debug, Error)]
pub enum InjectError {
    /// A field references a schema that is not declared as a dependency.
    #[error("schema '{0}' is not defined as a build dependency")]
    UndefinedSchema(String),

    /// The referenced schema has no definition at the field's path.
    #[error("field '{path}' not found in schema '{schema}'")]
    FieldNotFound { schema: String, path: String },

    /// The field definitions are structurally invalid.
    #[error("invalid field definitions: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised while synchronizing linked files.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Reading or writing a file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `.link` file has no usable first line.
    #[error("malformed link file {path}: {reason}")]
    MalformedLink { path: PathBuf, reason: String },

    /// An included path points outside the repository root.
    #[error("path '{0}' escapes the repository root")]
    PathEscape(String),

    /// The link search pattern could not be built.
    #[error("invalid link pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

impl LinkError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LinkError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while encoding saved-object fields.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The document is not valid JSON, or a value failed to serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value does not have the shape the encoder expects.
    #[error("unexpected document shape: {0}")]
    UnexpectedShape(String),
}

/// A build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading the package and build manifests.
    Manifest,
    /// Copying linked files into the build directory.
    Links,
    /// Encoding object-valued saved-object attributes.
    SavedObjects,
    /// Loading external schemas.
    Schema,
    /// Replacing external field references.
    Fields,
    /// Adding dynamic mappings to index templates.
    Mappings,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Manifest => "manifest",
            Stage::Links => "linked files",
            Stage::SavedObjects => "saved objects",
            Stage::Schema => "schema",
            Stage::Fields => "fields",
            Stage::Mappings => "dynamic mappings",
        };
        f.write_str(name)
    }
}

/// Underlying cause of a [`BuildError`].
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Inject(#[from] InjectError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),
}

/// A failed build: the stage and file that failed, and why.
#[derive(Debug, Error)]
#[error("{stage} stage failed on {}: {source}", path.display())]
pub struct BuildError {
    pub stage: Stage,
    pub path: PathBuf,
    #[source]
    pub source: StageError,
}

impl BuildError {
    pub fn new(stage: Stage, path: impl Into<PathBuf>, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Convenience alias for results with [`BuildError`].
pub type Result<T> = std::result::Result<T, BuildError>;
