//! Build manifest and schema source configuration.
//!
//! A package declares its external field dependencies in
//! `_dev/build/build.yml`:
//!
//! ```yaml
//! dependencies:
//!   ecs:
//!     reference: git@v8.11.0
//!     import_mappings: true
//! ```
//!
//! Where remote schemas are downloaded from is controlled separately by
//! [`SchemaUrls`], which can be loaded from its own YAML file.

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchemaError};

/// Location of the build manifest relative to the package root.
pub const BUILD_MANIFEST_PATH: &str = "_dev/build/build.yml";

/// Default base URL ECS schemas are downloaded from.
pub const DEFAULT_ECS_BASE_URL: &str = "https://raw.githubusercontent.com/elastic/ecs";

/// Path of the Beats-flavoured ECS fields file inside a tagged ECS tree.
const ECS_SCHEMA_FILE: &str = "generated/beats/fields.ecs.yml";

/// The ECS dependency of a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcsDependency {
    /// Versioned reference such as `git@v8.11.0` or `file:///tmp/fields.ecs.yml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Whether the bundled ECS dynamic mappings are added to index templates.
    #[serde(default)]
    pub import_mappings: bool,
}

/// External dependencies declared by a package.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub ecs: EcsDependency,
}

/// Contents of `_dev/build/build.yml`.
///
/// # Examples
///
/// ```
/// # use pkgbuild_schema::BuildManifest;
/// let manifest: BuildManifest = serde_yaml::from_str(
///     "dependencies:\n  ecs:\n    reference: git@v8.11.0\n",
/// ).unwrap();
/// assert_eq!(manifest.dependencies.ecs.reference.as_deref(), Some("git@v8.11.0"));
/// assert!(!manifest.imports_ecs_mappings());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    #[serde(default)]
    pub dependencies: Dependencies,
}

impl BuildManifest {
    /// Reads the build manifest of the package at `package_root`.
    ///
    /// A package without a build manifest has no external dependencies, so a
    /// missing file yields `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file exists but cannot be read, or
    /// [`SchemaError::Yaml`] if it is malformed.
    pub fn read(package_root: impl AsRef<Path>) -> Result<Option<Self>> {
        let path = package_root.as_ref().join(BUILD_MANIFEST_PATH);
        match std::fs::File::open(&path) {
            Ok(file) => {
                let manifest = serde_yaml::from_reader(BufReader::new(file))?;
                Ok(Some(manifest))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Saves the manifest as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_yaml::to_writer(BufWriter::new(file), self)?;
        Ok(())
    }

    /// Returns `true` if the package asks for the ECS dynamic mappings.
    pub fn imports_ecs_mappings(&self) -> bool {
        self.dependencies.ecs.import_mappings
    }
}

/// Base URLs external schemas are fetched from.
///
/// # Examples
///
/// ```
/// # use pkgbuild_schema::SchemaUrls;
/// let urls = SchemaUrls::default();
/// assert_eq!(
///     urls.ecs_schema_url("v8.11.0").unwrap(),
///     "https://raw.githubusercontent.com/elastic/ecs/v8.11.0/generated/beats/fields.ecs.yml",
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaUrls {
    /// Base URL of the ECS repository's raw content.
    #[serde(default = "default_ecs_base")]
    pub ecs_base: String,
}

fn default_ecs_base() -> String {
    DEFAULT_ECS_BASE_URL.to_string()
}

impl Default for SchemaUrls {
    fn default() -> Self {
        Self {
            ecs_base: default_ecs_base(),
        }
    }
}

impl SchemaUrls {
    /// Loads URL overrides from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let urls = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(urls)
    }

    /// Builds the download URL of the ECS fields file for `git_reference`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::InvalidBaseUrl`] if the base URL is empty or
    /// does not use the http or https scheme.
    pub fn ecs_schema_url(&self, git_reference: &str) -> Result<String> {
        let base = self.ecs_base.trim_end_matches('/');
        let has_host = |rest: &str| !rest.is_empty() && !rest.starts_with('/');
        let valid = match base.split_once("://") {
            Some(("http" | "https", rest)) => has_host(rest),
            _ => false,
        };
        if !valid {
            return Err(SchemaError::InvalidBaseUrl(self.ecs_base.clone()));
        }
        Ok(format!("{base}/{git_reference}/{ECS_SCHEMA_FILE}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_missing_build_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(BuildManifest::read(dir.path()).unwrap(), None);
    }

    #[test]
    fn test_read_build_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BUILD_MANIFEST_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            "dependencies:\n  ecs:\n    reference: git@v8.11.0\n    import_mappings: true\n",
        )
        .unwrap();

        let manifest = BuildManifest::read(dir.path()).unwrap().unwrap();
        assert_eq!(
            manifest.dependencies.ecs.reference.as_deref(),
            Some("git@v8.11.0")
        );
        assert!(manifest.imports_ecs_mappings());
    }

    #[test]
    fn test_read_malformed_build_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BUILD_MANIFEST_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "dependencies: [").unwrap();

        let err = BuildManifest::read(dir.path()).unwrap_err();
        assert!(matches!(err, SchemaError::Yaml(_)));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(BUILD_MANIFEST_PATH);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        let mut manifest = BuildManifest::default();
        manifest.dependencies.ecs.reference = Some("git@1.10".into());
        manifest.save(&path).unwrap();

        let loaded = BuildManifest::read(dir.path()).unwrap().unwrap();
        assert_eq!(loaded, manifest);
    }

    #[test]
    fn test_schema_url_trims_trailing_slash() {
        let urls = SchemaUrls {
            ecs_base: "http://localhost:8080/ecs/".into(),
        };
        assert_eq!(
            urls.ecs_schema_url("v1.12.0").unwrap(),
            "http://localhost:8080/ecs/v1.12.0/generated/beats/fields.ecs.yml"
        );
    }

    #[test]
    fn test_schema_url_rejects_other_schemes() {
        for base in ["ftp://example.com", "", "example.com/ecs", "https://"] {
            let urls = SchemaUrls {
                ecs_base: base.into(),
            };
            assert!(
                matches!(urls.ecs_schema_url("v1"), Err(SchemaError::InvalidBaseUrl(_))),
                "accepted {base:?}"
            );
        }
    }

    #[test]
    fn test_schema_urls_default_when_key_missing() {
        let urls: SchemaUrls = serde_yaml::from_str("{}").unwrap();
        assert_eq!(urls, SchemaUrls::default());
    }
}
