//! Read-only file access confined to a root directory.

use std::path::{Component, Path, PathBuf};

use crate::error::LinkError;

/// Reads files addressed relative to a root directory, refusing any path
/// that would resolve outside of it.
///
/// Absolute paths, `..` segments climbing above the root and symbolic
/// links pointing outside the root are all rejected with
/// [`LinkError::PathEscape`].
#[derive(Debug, Clone)]
pub struct RootedFs {
    root: PathBuf,
}

impl RootedFs {
    /// Opens `root`, which must be an existing directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, LinkError> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root).map_err(|e| LinkError::io(root, e))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a `/`-separated relative path to a location inside the root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, LinkError> {
        let escape = || LinkError::PathEscape(relative.to_string());

        let mut normalized = PathBuf::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => normalized.push(part),
                Component::CurDir => {}
                Component::ParentDir => {
                    if !normalized.pop() {
                        return Err(escape());
                    }
                }
                Component::RootDir | Component::Prefix(_) => return Err(escape()),
            }
        }

        let joined = self.root.join(&normalized);
        let canonical = std::fs::canonicalize(&joined).map_err(|e| LinkError::io(&joined, e))?;
        if !canonical.starts_with(&self.root) {
            return Err(escape());
        }
        Ok(canonical)
    }

    /// Reads the file at `relative`.
    pub fn read(&self, relative: &str) -> Result<Vec<u8>, LinkError> {
        let path = self.resolve(relative)?;
        std::fs::read(&path).map_err(|e| LinkError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, RootedFs) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("packages/shared")).unwrap();
        std::fs::write(dir.path().join("packages/shared/pipeline.yml"), "processors: []\n").unwrap();
        let fs = RootedFs::new(dir.path()).unwrap();
        (dir, fs)
    }

    #[test]
    fn test_read_relative_path() {
        let (_dir, fs) = repo();
        assert_eq!(fs.read("packages/shared/pipeline.yml").unwrap(), b"processors: []\n");
        assert_eq!(
            fs.read("packages/other/../shared/./pipeline.yml").unwrap(),
            b"processors: []\n"
        );
    }

    #[test]
    fn test_rejects_absolute_path() {
        let (_dir, fs) = repo();
        assert!(matches!(fs.read("/etc/passwd"), Err(LinkError::PathEscape(_))));
    }

    #[test]
    fn test_rejects_parent_escape() {
        let (_dir, fs) = repo();
        assert!(matches!(
            fs.read("packages/../../outside.yml"),
            Err(LinkError::PathEscape(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let (_dir, fs) = repo();
        assert!(matches!(fs.read("packages/missing.yml"), Err(LinkError::Io { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_rejects_symlink_escape() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.yml"), "x").unwrap();

        let (dir, fs) = repo();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("packages/escape")).unwrap();

        assert!(matches!(
            fs.read("packages/escape/secret.yml"),
            Err(LinkError::PathEscape(_))
        ));
    }
}
