//! Linked file synchronization.
//!
//! A package can reuse a file living elsewhere in the repository through a
//! `<name>.link` placeholder. The first line of the placeholder holds the
//! included file's path, relative to the repository root, optionally
//! followed by the SHA-256 checksum of its contents:
//!
//! ```text
//! packages/shared/elasticsearch/ingest_pipeline/default.yml 6f1ed002ab5595859014ebf0951522d9...
//! ```
//!
//! Building a package copies the included contents to `<name>` in the build
//! directory. A placeholder whose checksum is missing or different is
//! rewritten with the current one.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{self, BuildError, LinkError, Stage};
use crate::observer::{BuildEvent, BuildObserver};
use crate::rootfs::RootedFs;

/// Extension of link placeholder files.
pub const LINK_EXTENSION: &str = "link";

/// A `.link` placeholder and, once resolved, the contents it points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// The `.link` file itself.
    pub link_path: PathBuf,
    /// Path of the included file relative to the repository root.
    pub included_path: String,
    /// Checksum recorded in the placeholder, if any.
    pub stored_checksum: Option<String>,
    /// Where the contents were written by [`materialize`].
    pub target_path: Option<PathBuf>,
    pub resolved_content: Option<Vec<u8>>,
    pub resolved_checksum: Option<String>,
    /// `true` when the stored checksum matches the included contents.
    pub up_to_date: bool,
}

impl Link {
    /// Parses the contents of the placeholder at `link_path`.
    ///
    /// # Examples
    ///
    /// ```
    /// use pkgbuild::Link;
    ///
    /// let link = Link::parse("data_stream/access/fields/ecs.yml.link", "shared/ecs.yml abc123\n").unwrap();
    /// assert_eq!(link.included_path, "shared/ecs.yml");
    /// assert_eq!(link.stored_checksum.as_deref(), Some("abc123"));
    /// assert!(!link.up_to_date);
    /// ```
    pub fn parse(link_path: impl Into<PathBuf>, contents: &str) -> Result<Self, LinkError> {
        let link_path = link_path.into();
        let mut parts = contents
            .lines()
            .next()
            .unwrap_or_default()
            .split_whitespace();

        let Some(included_path) = parts.next() else {
            return Err(LinkError::MalformedLink {
                path: link_path,
                reason: "file is empty or first line is missing".to_string(),
            });
        };

        Ok(Self {
            included_path: included_path.to_string(),
            stored_checksum: parts.next().map(str::to_string),
            link_path,
            target_path: None,
            resolved_content: None,
            resolved_checksum: None,
            up_to_date: false,
        })
    }

    /// Reads and parses the placeholder at `link_path`.
    pub fn read(link_path: impl AsRef<Path>) -> Result<Self, LinkError> {
        let link_path = link_path.as_ref();
        let contents =
            std::fs::read_to_string(link_path).map_err(|e| LinkError::io(link_path, e))?;
        Self::parse(link_path, &contents)
    }

    /// Location of the materialized file: the placeholder's path with
    /// `source_root` replaced by `destination_root` and the `.link`
    /// extension removed.
    pub fn destination(
        &self,
        source_root: &Path,
        destination_root: &Path,
    ) -> Result<PathBuf, LinkError> {
        Ok(self
            .placeholder_destination(source_root, destination_root)?
            .with_extension(""))
    }

    /// Location of a copy of the placeholder itself below `destination_root`.
    fn placeholder_destination(
        &self,
        source_root: &Path,
        destination_root: &Path,
    ) -> Result<PathBuf, LinkError> {
        let relative = self
            .link_path
            .strip_prefix(source_root)
            .map_err(|_| LinkError::PathEscape(self.link_path.display().to_string()))?;
        Ok(destination_root.join(relative))
    }

    /// Placeholder contents recording the current checksum.
    fn updated_contents(&self) -> Result<String, LinkError> {
        let checksum = self.resolved_checksum.as_deref().ok_or_else(|| self.unresolved())?;
        Ok(format!("{} {}", self.included_path.replace('\\', "/"), checksum))
    }

    /// Rewrites the placeholder with the current checksum when it is stale.
    /// Returns `true` if the file was written.
    fn update_checksum(&self) -> Result<bool, LinkError> {
        if self.up_to_date {
            return Ok(false);
        }
        write_file(&self.link_path, self.updated_contents()?.as_bytes())?;
        Ok(true)
    }

    fn unresolved(&self) -> LinkError {
        LinkError::MalformedLink {
            path: self.link_path.clone(),
            reason: format!("included file '{}' has not been resolved", self.included_path),
        }
    }
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Finds and parses every `.link` file below `source_root`, sorted by
/// path.
pub fn discover_links(source_root: impl AsRef<Path>) -> Result<Vec<Link>, LinkError> {
    let source_root = source_root.as_ref();
    let pattern = format!(
        "{}/**/*.{LINK_EXTENSION}",
        glob::Pattern::escape(&source_root.to_string_lossy())
    );

    let mut paths = Vec::new();
    for entry in glob::glob(&pattern)? {
        let path = entry.map_err(|e| {
            let path = e.path().to_path_buf();
            LinkError::io(path, std::io::Error::from(e))
        })?;
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(Link::read).collect()
}

/// Reads the included contents of each link through `fs` and compares
/// their checksum with the stored one.
pub fn resolve(links: Vec<Link>, fs: &RootedFs) -> Result<Vec<Link>, LinkError> {
    links
        .into_iter()
        .map(|mut link| {
            let content = fs.read(&link.included_path)?;
            let computed = checksum(&content);
            link.up_to_date = link.stored_checksum.as_deref() == Some(computed.as_str());
            link.resolved_content = Some(content);
            link.resolved_checksum = Some(computed);
            Ok(link)
        })
        .collect()
}

/// Writes the included contents of every resolved link below
/// `destination_root`, and rewrites stale placeholders with the current
/// checksum.
///
/// Contents are written even when the link is up to date. Returns the
/// placeholders that were rewritten.
pub fn materialize(
    links: &mut [Link],
    source_root: impl AsRef<Path>,
    destination_root: impl AsRef<Path>,
) -> Result<Vec<PathBuf>, LinkError> {
    let source_root = source_root.as_ref();
    let destination_root = destination_root.as_ref();

    let mut relinked = Vec::new();
    for link in links.iter_mut() {
        let target = link.destination(source_root, destination_root)?;
        let content = link.resolved_content.as_deref().ok_or_else(|| link.unresolved())?;
        write_file(&target, content)?;
        link.target_path = Some(target);

        if link.update_checksum()? {
            relinked.push(link.link_path.clone());
        }
    }
    Ok(relinked)
}

/// Returns the links below `source_root` whose stored checksum is missing
/// or out of date. Nothing is written.
pub fn check_links(
    source_root: impl AsRef<Path>,
    repository_root: impl AsRef<Path>,
) -> Result<Vec<Link>, LinkError> {
    let fs = RootedFs::new(repository_root)?;
    let links = resolve(discover_links(source_root)?, &fs)?;
    Ok(links.into_iter().filter(|link| !link.up_to_date).collect())
}

/// Rewrites the stale placeholders below `source_root` with the current
/// checksum, without copying any contents. Returns the rewritten links.
pub fn update_checksums(
    source_root: impl AsRef<Path>,
    repository_root: impl AsRef<Path>,
) -> Result<Vec<Link>, LinkError> {
    let fs = RootedFs::new(repository_root)?;
    let mut updated = Vec::new();
    for link in resolve(discover_links(source_root)?, &fs)? {
        if link.update_checksum()? {
            updated.push(link);
        }
    }
    Ok(updated)
}

/// Materializes the linked files of a package into its build directory.
pub struct LinksStage<'a> {
    observer: &'a dyn BuildObserver,
}

impl<'a> LinksStage<'a> {
    pub fn new(observer: &'a dyn BuildObserver) -> Self {
        Self { observer }
    }

    /// Copies every linked file below `source_root` to the matching place
    /// below `destination_root`, reading included files from
    /// `repository_root`. Copies of the placeholders found in
    /// `destination_root` are deleted. Returns the resolved links.
    pub fn run(
        &self,
        source_root: &Path,
        destination_root: &Path,
        repository_root: &Path,
    ) -> error::Result<Vec<Link>> {
        self.observer.on_event(&BuildEvent::StageStarted(Stage::Links));
        let fail = |e: LinkError| BuildError::new(Stage::Links, source_root, e);

        let fs = RootedFs::new(repository_root).map_err(fail)?;
        let mut links = resolve(discover_links(source_root).map_err(fail)?, &fs).map_err(fail)?;
        for link in links.iter().filter(|link| !link.up_to_date) {
            self.observer.on_event(&BuildEvent::LinkOutdated {
                link_path: link.link_path.clone(),
                included_path: link.included_path.clone(),
            });
        }

        let relinked = materialize(&mut links, source_root, destination_root).map_err(fail)?;
        for link in &links {
            let copied = link.placeholder_destination(source_root, destination_root).map_err(fail)?;
            if copied != link.link_path {
                remove_placeholder(&copied).map_err(fail)?;
            }
        }
        for path in links.iter().filter_map(|link| link.target_path.clone()).chain(relinked) {
            self.observer.on_event(&BuildEvent::FileWritten {
                stage: Stage::Links,
                path,
            });
        }

        self.observer.on_event(&BuildEvent::StageFinished {
            stage: Stage::Links,
            written: links.len(),
        });
        Ok(links)
    }
}

/// Deletes a placeholder copied into the build directory, if present.
fn remove_placeholder(path: &Path) -> Result<(), LinkError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(LinkError::io(path, e)),
    }
}

pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> Result<(), LinkError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LinkError::io(parent, e))?;
    }
    std::fs::write(path, bytes).map_err(|e| LinkError::io(path, e))
}
