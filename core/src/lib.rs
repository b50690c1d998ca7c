//! Core models for building integration packages.
//!
//! This crate defines the data the build pipeline operates on:
//!
//! - [`tree`]: an order-preserving YAML/JSON document tree with path
//!   navigation ([`tree::navigate`]) and child splicing ([`tree::splice`]).
//! - [`FieldDefinition`]: a field of a package's `fields/*.yml` files or of
//!   an external schema such as ECS.
//! - [`PackageManifest`]: the parts of `manifest.yml` that select which
//!   build steps apply.
//!
//! Validation ([`validate_fields`]) rejects field definitions the injector
//! cannot process, such as nameless entries or external references that
//! declare their own children.
//!
//! # Example
//!
//! ```
//! use pkgbuild_core::*;
//!
//! let yaml = "- name: source\n  type: group\n  fields:\n    - name: ip\n      external: ecs\n";
//! let defs: Vec<FieldDefinition> = serde_yaml::from_str(yaml).unwrap();
//!
//! assert!(defs[0].is_group());
//! assert!(defs[0].has_external_references());
//! assert!(validate_fields(&defs).is_empty());
//! ```

mod package;
pub mod tree;
mod types;
mod validate;

pub use package::{MANIFEST_FILE, ManifestError, PackageManifest, PackageType};
pub use types::*;
pub use validate::{ValidationError, validate_fields};
