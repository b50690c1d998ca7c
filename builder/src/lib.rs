//! Build pipeline for integration packages.
//!
//! Building a package turns its sources into the form consumed by the
//! package registry. This crate implements the transformations applied to
//! a build directory:
//!
//! - [`links`]: `.link` placeholders are replaced with the repository files
//!   they point at, and their checksums are kept current.
//! - [`saved_objects`]: object-valued Kibana saved-object attributes are
//!   encoded as JSON strings.
//! - [`fields`]: fields declared with `external: ecs` are replaced with
//!   their ECS definitions.
//! - [`mappings`]: ECS dynamic templates are added to index templates.
//!
//! [`Pipeline`] runs them in that order. Stages report progress through a
//! [`BuildObserver`]; [`build_package`] uses [`TracingObserver`].
//!
//! # Example
//!
//! ```no_run
//! use pkgbuild::{BuildOptions, build_package};
//!
//! let options = BuildOptions::new(
//!     "packages/nginx",
//!     "build/packages/nginx/1.20.0",
//!     ".",
//! )
//! .with_jobs(4);
//!
//! let summary = build_package(&options).unwrap();
//! for path in &summary.relinked {
//!     println!("updated checksum in {}", path.display());
//! }
//! ```

pub mod error;
pub mod fields;
pub mod links;
pub mod mappings;
pub mod observer;
pub mod pipeline;
pub mod rootfs;
pub mod saved_objects;
mod workers;

pub use error::{BuildError, EncodeError, InjectError, LinkError, Result, Stage, StageError};
pub use fields::{FieldsStage, inject};
pub use links::{Link, LinksStage, check_links, discover_links, materialize, update_checksums};
pub use mappings::{EcsMappings, MappingsStage, inject_mappings};
pub use observer::{BuildEvent, BuildObserver, RecordingObserver, TracingObserver};
pub use pipeline::{BuildOptions, BuildSummary, Pipeline, build_package};
pub use rootfs::RootedFs;
pub use saved_objects::{SavedObjectsStage, encode_saved_object};
