//! External field schema resolution for integration package builds.
//!
//! Packages may import field definitions from an external, versioned schema
//! (ECS) instead of spelling them out. This crate reads the dependency from
//! the package's build manifest, downloads or reads the schema document and
//! answers dotted-path lookups against it.
//!
//! # Quick start
//!
//! ```no_run
//! use pkgbuild_schema::{BuildManifest, SchemaResolver, ECS_SCHEMA_NAME};
//!
//! let manifest = BuildManifest::read("packages/nginx").unwrap();
//! let resolver = SchemaResolver::builder()
//!     .local_root("packages/nginx")
//!     .build()
//!     .unwrap();
//! let table = resolver.resolve(manifest.as_ref()).unwrap();
//!
//! if let Some(ip) = table.lookup(ECS_SCHEMA_NAME, "source.ip").unwrap() {
//!     println!("source.ip is of type {:?}", ip.field_type);
//! }
//! ```

mod config;
mod error;
mod fetch;
mod loader;
mod lookup;

pub use config::{
    BUILD_MANIFEST_PATH, BuildManifest, DEFAULT_ECS_BASE_URL, Dependencies, EcsDependency,
    SchemaUrls,
};
pub use error::{Result, SchemaError};
pub use fetch::{
    CancellationToken, DEFAULT_FETCH_TIMEOUT, HttpFetcher, SchemaFetcher, fetch_with_deadline,
};
pub use loader::{ECS_SCHEMA_NAME, SchemaResolver, SchemaResolverBuilder, SchemaTable};
pub use lookup::{FieldLookup, IndexedLookup, LookupStrategy, WalkLookup};
