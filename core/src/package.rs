use std::path::Path;

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of package and data stream manifests.
pub const MANIFEST_FILE: &str = "manifest.yml";

/// Errors raised while reading a package manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Declared kind of an integration package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    /// Package made of data streams, each with its own manifest.
    #[default]
    Integration,
    /// Single-input package configured from the package manifest itself.
    Input,
    /// Any other package type (content packs, ...).
    #[serde(other)]
    Other,
}

impl PackageType {
    /// Returns `true` when index templates are declared per data stream
    /// rather than in the package manifest.
    pub fn has_entity_manifests(self) -> bool {
        !matches!(self, PackageType::Input)
    }
}

/// The subset of a package's `manifest.yml` the build pipeline reads.
///
/// # Examples
///
/// ```
/// use pkgbuild_core::{PackageManifest, PackageType};
///
/// let manifest = PackageManifest::from_slice(
///     b"format_version: 3.0.2\nname: sql_input\nversion: 1.2.0\ntype: input\n",
///     "manifest.yml",
/// ).unwrap();
/// assert_eq!(manifest.package_type, PackageType::Input);
/// assert!(manifest.format_version_at_least((2, 3, 0)));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageManifest {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    pub version: String,
    /// Version of the package specification the package conforms to.
    #[serde(default)]
    pub format_version: Option<String>,
    #[serde(rename = "type", default)]
    pub package_type: PackageType,
}

impl PackageManifest {
    /// Parses manifest bytes; `origin` is only used in error messages.
    pub fn from_slice(bytes: &[u8], origin: &str) -> Result<Self, ManifestError> {
        serde_yaml::from_slice(bytes).map_err(|source| ManifestError::Yaml {
            path: origin.to_string(),
            source,
        })
    }

    /// Reads a manifest file.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_slice(&bytes, &path.display().to_string())
    }

    /// Reads `manifest.yml` at the root of a package.
    pub fn read_from_package_root(package_root: impl AsRef<Path>) -> Result<Self, ManifestError> {
        Self::read(package_root.as_ref().join(MANIFEST_FILE))
    }

    /// Compares `format_version` against `minimum` with semver ordering,
    /// so a pre-release such as `2.3.0-rc1` is older than `2.3.0`. A missing
    /// or unparsable version compares as lower.
    pub fn format_version_at_least(&self, minimum: (u64, u64, u64)) -> bool {
        let (major, minor, patch) = minimum;
        self.format_version
            .as_deref()
            .and_then(|raw| Version::parse(raw.trim()).ok())
            .is_some_and(|version| version >= Version::new(major, minor, patch))
    }
}
