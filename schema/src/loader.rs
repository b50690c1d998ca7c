//! External schema loading and the per-build schema table.
//!
//! [`SchemaResolver`] turns the dependency declared in a package's build
//! manifest into a list of field definitions, and [`SchemaResolver::resolve`]
//! collects them into a [`SchemaTable`] keyed by schema name.
//!
//! ```
//! use std::sync::Arc;
//! use pkgbuild_schema::{EcsDependency, SchemaFetcher, SchemaResolver, Result};
//!
//! struct Canned;
//! impl SchemaFetcher for Canned {
//!     fn fetch(&self, _url: &str) -> Result<Vec<u8>> {
//!         Ok(b"- key: ecs\n  fields:\n    - name: message\n      type: match_only_text\n".to_vec())
//!     }
//! }
//!
//! let resolver = SchemaResolver::builder().fetcher(Arc::new(Canned)).build().unwrap();
//! let dep = EcsDependency { reference: Some("git@v8.11.0".into()), import_mappings: false };
//! let fields = resolver.load_schema(&dep).unwrap();
//! assert_eq!(fields[0].name, "message");
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pkgbuild_core::FieldDefinition;
use tracing::debug;

use crate::config::{BuildManifest, EcsDependency, SchemaUrls};
use crate::error::{Result, SchemaError};
use crate::fetch::{
    CancellationToken, DEFAULT_FETCH_TIMEOUT, HttpFetcher, SchemaFetcher, fetch_with_deadline,
};
use crate::lookup::{FieldLookup, LookupStrategy};

/// Schema name under which the ECS dependency is registered.
pub const ECS_SCHEMA_NAME: &str = "ecs";

const GIT_REFERENCE_PREFIX: &str = "git@";
const LOCAL_FILE_PREFIX: &str = "file://";

/// Resolved schemas of one build, keyed by schema name.
#[derive(Debug, Default)]
pub struct SchemaTable {
    schemas: HashMap<String, Box<dyn FieldLookup>>,
    strategy: LookupStrategy,
}

impl SchemaTable {
    /// Creates an empty table using the default lookup strategy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table using `strategy` for schemas inserted later.
    pub fn with_strategy(strategy: LookupStrategy) -> Self {
        Self {
            schemas: HashMap::new(),
            strategy,
        }
    }

    /// Registers `fields` under `name`, replacing any previous schema.
    pub fn insert(&mut self, name: impl Into<String>, fields: Vec<FieldDefinition>) {
        self.schemas.insert(name.into(), self.strategy.build(fields));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Finds the definition at `path` in schema `schema`.
    ///
    /// A path with no definition is `Ok(None)`; deciding whether that is
    /// an error is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::UndefinedSchema`] if no schema is registered
    /// under `schema`.
    pub fn lookup(&self, schema: &str, path: &str) -> Result<Option<&FieldDefinition>> {
        let lookup = self
            .schemas
            .get(schema)
            .ok_or_else(|| SchemaError::UndefinedSchema(schema.to_string()))?;
        Ok(lookup.find(path))
    }
}

/// Loads external field schemas.
///
/// Built with [`SchemaResolver::builder`].
pub struct SchemaResolver {
    fetcher: Arc<dyn SchemaFetcher>,
    urls: SchemaUrls,
    timeout: Duration,
    cancel: CancellationToken,
    local_root: Option<PathBuf>,
    strategy: LookupStrategy,
}

impl SchemaResolver {
    /// Returns a new [`SchemaResolverBuilder`].
    pub fn builder() -> SchemaResolverBuilder {
        SchemaResolverBuilder::new()
    }

    /// Loads the ECS schema named by `dep`.
    ///
    /// A dependency without a reference yields an empty schema. A `git@`
    /// reference is downloaded from the configured base URL; a `file://`
    /// reference is read from disk, relative paths being resolved against
    /// the local root when one is configured.
    ///
    /// # Errors
    ///
    /// - [`SchemaError::InvalidReferenceFormat`] for an unknown prefix.
    /// - [`SchemaError::InvalidBaseUrl`] / [`SchemaError::Fetch`] /
    ///   [`SchemaError::Cancelled`] when downloading fails.
    /// - [`SchemaError::SchemaFormat`] if the document is not a list whose
    ///   first entry holds the schema's `fields`.
    pub fn load_schema(&self, dep: &EcsDependency) -> Result<Vec<FieldDefinition>> {
        let Some(reference) = dep.reference.as_deref() else {
            debug!("ECS dependency isn't defined");
            return Ok(Vec::new());
        };

        let content = if let Some(path) = reference.strip_prefix(LOCAL_FILE_PREFIX) {
            let mut path = PathBuf::from(path);
            if let Some(root) = self.local_root.as_ref().filter(|_| path.is_relative()) {
                path = root.join(path);
            }
            debug!(path = %path.display(), "reading local ECS schema");
            std::fs::read(&path)?
        } else if let Some(git_reference) = reference.strip_prefix(GIT_REFERENCE_PREFIX) {
            let url = self.urls.ecs_schema_url(git_reference)?;
            debug!(reference, url = %url, "pulling ECS dependency");
            fetch_with_deadline(Arc::clone(&self.fetcher), &url, self.timeout, &self.cancel)?
        } else {
            return Err(SchemaError::InvalidReferenceFormat(reference.to_string()));
        };

        parse_schema(&content)
    }

    /// Builds the schema table for a package's build manifest.
    ///
    /// Only dependencies with a reference are registered, so fields pointing
    /// at an undeclared schema fail with [`SchemaError::UndefinedSchema`].
    pub fn resolve(&self, manifest: Option<&BuildManifest>) -> Result<SchemaTable> {
        let mut table = SchemaTable::with_strategy(self.strategy);
        let Some(manifest) = manifest else {
            return Ok(table);
        };

        let ecs = &manifest.dependencies.ecs;
        if ecs.reference.is_some() {
            let fields = self.load_schema(ecs)?;
            debug!(schema = ECS_SCHEMA_NAME, top_level = fields.len(), "schema loaded");
            table.insert(ECS_SCHEMA_NAME, fields);
        }
        Ok(table)
    }
}

/// Extracts the field list from a Beats-style fields document, where the
/// schema is the `fields` of the first top-level entry.
fn parse_schema(content: &[u8]) -> Result<Vec<FieldDefinition>> {
    let entries: Vec<FieldDefinition> = serde_yaml::from_slice(content)
        .map_err(|e| SchemaError::SchemaFormat(format!("not a field definition list: {e}")))?;
    entries
        .into_iter()
        .next()
        .map(|first| first.fields)
        .ok_or_else(|| SchemaError::SchemaFormat("document has no top-level entry".to_string()))
}

/// Builder for [`SchemaResolver`].
///
/// Defaults: HTTP fetching from [`SchemaUrls::default`] with a 30 second
/// timeout, a token that is never cancelled and indexed lookups.
pub struct SchemaResolverBuilder {
    fetcher: Option<Arc<dyn SchemaFetcher>>,
    urls: SchemaUrls,
    timeout: Duration,
    cancel: CancellationToken,
    local_root: Option<PathBuf>,
    strategy: LookupStrategy,
}

impl SchemaResolverBuilder {
    pub fn new() -> Self {
        Self {
            fetcher: None,
            urls: SchemaUrls::default(),
            timeout: DEFAULT_FETCH_TIMEOUT,
            cancel: CancellationToken::new(),
            local_root: None,
            strategy: LookupStrategy::default(),
        }
    }

    /// Replaces the HTTP fetcher.
    pub fn fetcher(mut self, fetcher: Arc<dyn SchemaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn urls(mut self, urls: SchemaUrls) -> Self {
        self.urls = urls;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Directory relative `file://` references are resolved against.
    pub fn local_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.local_root = Some(root.into());
        self
    }

    pub fn lookup_strategy(mut self, strategy: LookupStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builds the resolver, creating an [`HttpFetcher`] if none was set.
    pub fn build(self) -> Result<SchemaResolver> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpFetcher::new(self.timeout)?),
        };
        Ok(SchemaResolver {
            fetcher,
            urls: self.urls,
            timeout: self.timeout,
            cancel: self.cancel,
            local_root: self.local_root,
            strategy: self.strategy,
        })
    }
}

impl Default for SchemaResolverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
