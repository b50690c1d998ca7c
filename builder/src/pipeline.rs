//! Build sequencing.
//!
//! [`Pipeline::run`] applies the build stages to a package's build
//! directory, in order:
//!
//! 1. linked files are copied in from the repository,
//! 2. saved-object attributes are JSON-encoded,
//! 3. external field references are replaced with schema definitions,
//! 4. ECS dynamic mappings are added to index templates, when requested.
//!
//! The build directory is expected to hold a copy of the package already.
//! Stages only talk to each other through the files they write, and the
//! first failure stops the build, leaving the directory partially built.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pkgbuild_core::PackageManifest;
use pkgbuild_schema::{
    BuildManifest, CancellationToken, DEFAULT_FETCH_TIMEOUT, SchemaFetcher, SchemaResolver,
    SchemaUrls,
};
use tracing::{debug, info};

use crate::error::{BuildError, Result, Stage};
use crate::fields::FieldsStage;
use crate::links::LinksStage;
use crate::mappings::{EcsMappings, MappingsStage};
use crate::observer::{BuildEvent, BuildObserver, TracingObserver};
use crate::saved_objects::SavedObjectsStage;

/// Oldest package format that supports embedded ECS mappings.
pub const MIN_FORMAT_VERSION_FOR_MAPPINGS: (u64, u64, u64) = (2, 3, 0);

/// Where a build reads from and writes to, and how.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Package sources, holding `manifest.yml`, `_dev/build/build.yml` and
    /// the `.link` files.
    pub package_root: PathBuf,
    /// Directory being built.
    pub build_root: PathBuf,
    /// Root that linked files are resolved against.
    pub repository_root: PathBuf,
    /// Number of files processed concurrently by per-file stages.
    pub jobs: usize,
    pub schema_urls: SchemaUrls,
    pub fetch_timeout: Duration,
}

impl BuildOptions {
    pub fn new(
        package_root: impl Into<PathBuf>,
        build_root: impl Into<PathBuf>,
        repository_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            package_root: package_root.into(),
            build_root: build_root.into(),
            repository_root: repository_root.into(),
            jobs: 1,
            schema_urls: SchemaUrls::default(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    /// Sets the worker count; zero is treated as one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_schema_urls(mut self, urls: SchemaUrls) -> Self {
        self.schema_urls = urls;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// What a build did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    /// Files materialized from `.link` placeholders.
    pub linked_files: Vec<PathBuf>,
    /// Placeholders rewritten with a new checksum.
    pub relinked: Vec<PathBuf>,
    pub saved_objects_written: usize,
    pub fields_files_written: usize,
    /// `None` when the mappings stage did not apply to the package.
    pub manifests_written: Option<usize>,
}

/// Runs the build stages for one package.
pub struct Pipeline<'a> {
    options: BuildOptions,
    observer: &'a dyn BuildObserver,
    fetcher: Option<Arc<dyn SchemaFetcher>>,
    cancel: CancellationToken,
}

impl<'a> Pipeline<'a> {
    pub fn new(options: BuildOptions, observer: &'a dyn BuildObserver) -> Self {
        Self {
            options,
            observer,
            fetcher: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `fetcher` for remote schemas instead of HTTP.
    pub fn fetcher(mut self, fetcher: Arc<dyn SchemaFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Token that aborts a pending schema download when cancelled.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Builds the package.
    pub fn run(&self) -> Result<BuildSummary> {
        let options = &self.options;
        info!(
            package = %options.package_root.display(),
            build = %options.build_root.display(),
            jobs = options.jobs,
            "building package"
        );

        let package = PackageManifest::read_from_package_root(&options.package_root)
            .map_err(|e| BuildError::new(Stage::Manifest, &options.package_root, e))?;
        let build_manifest = BuildManifest::read(&options.package_root)
            .map_err(|e| BuildError::new(Stage::Manifest, &options.package_root, e))?;
        debug!(
            name = package.name.as_str(),
            package_type = ?package.package_type,
            format_version = ?package.format_version,
            build_manifest = build_manifest.is_some(),
            "manifests loaded"
        );

        let mut summary = BuildSummary::default();

        let links = LinksStage::new(self.observer).run(
            &options.package_root,
            &options.build_root,
            &options.repository_root,
        )?;
        for link in links {
            if !link.up_to_date {
                summary.relinked.push(link.link_path);
            }
            summary.linked_files.extend(link.target_path);
        }

        summary.saved_objects_written = SavedObjectsStage::new(self.observer)
            .jobs(options.jobs)
            .run(&options.build_root)?;

        self.observer.on_event(&BuildEvent::StageStarted(Stage::Schema));
        let table = self
            .resolver()?
            .resolve(build_manifest.as_ref())
            .map_err(|e| BuildError::new(Stage::Schema, self.schema_path(), e))?;
        self.observer.on_event(&BuildEvent::StageFinished {
            stage: Stage::Schema,
            written: 0,
        });

        summary.fields_files_written = FieldsStage::new(&table, self.observer)
            .jobs(options.jobs)
            .run(&options.build_root)?;

        summary.manifests_written = match self.mappings_skip_reason(&package, build_manifest.as_ref()) {
            Some(reason) => {
                self.observer.on_event(&BuildEvent::StageSkipped {
                    stage: Stage::Mappings,
                    reason,
                });
                None
            }
            None => {
                let mappings = EcsMappings::bundled()
                    .map_err(|e| BuildError::new(Stage::Mappings, &options.build_root, e))?;
                let written = MappingsStage::new(&mappings, self.observer)
                    .jobs(options.jobs)
                    .run(&options.build_root, package.package_type)?;
                Some(written)
            }
        };

        info!(package = package.name.as_str(), "package built");
        Ok(summary)
    }

    fn resolver(&self) -> Result<SchemaResolver> {
        let mut builder = SchemaResolver::builder()
            .urls(self.options.schema_urls.clone())
            .timeout(self.options.fetch_timeout)
            .cancellation(self.cancel.clone())
            .local_root(&self.options.package_root);
        if let Some(fetcher) = &self.fetcher {
            builder = builder.fetcher(Arc::clone(fetcher));
        }
        builder
            .build()
            .map_err(|e| BuildError::new(Stage::Schema, self.schema_path(), e))
    }

    fn schema_path(&self) -> PathBuf {
        self.options.package_root.join(pkgbuild_schema::BUILD_MANIFEST_PATH)
    }

    fn mappings_skip_reason(
        &self,
        package: &PackageManifest,
        build_manifest: Option<&BuildManifest>,
    ) -> Option<String> {
        if !build_manifest.is_some_and(BuildManifest::imports_ecs_mappings) {
            return Some("ECS mappings are not imported".to_string());
        }
        if !package.format_version_at_least(MIN_FORMAT_VERSION_FOR_MAPPINGS) {
            let (major, minor, patch) = MIN_FORMAT_VERSION_FOR_MAPPINGS;
            return Some(format!(
                "format version {} is older than {major}.{minor}.{patch}",
                package.format_version.as_deref().unwrap_or("(unset)")
            ));
        }
        None
    }
}

/// Builds a package, logging progress through `tracing`.
pub fn build_package(options: &BuildOptions) -> Result<BuildSummary> {
    Pipeline::new(options.clone(), &TracingObserver).run()
}
