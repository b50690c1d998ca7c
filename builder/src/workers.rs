//! Per-file work distribution shared by the build stages.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use tracing::debug;

use crate::error::{BuildError, Result, Stage};
use crate::links::LINK_EXTENSION;

/// Expands `patterns` relative to `root`, keeping pattern order and the
/// sorted order of each pattern's matches. `.link` placeholders are never
/// returned.
pub(crate) fn glob_files(stage: Stage, root: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>> {
    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let mut files = Vec::new();
    for pattern in patterns {
        let full = format!("{escaped_root}/{pattern}");
        let matches = glob::glob(&full).map_err(|e| BuildError::new(stage, root, e))?;
        for entry in matches {
            let path = entry.map_err(|e| {
                let path = e.path().to_path_buf();
                BuildError::new(stage, path, std::io::Error::from(e))
            })?;
            if path.is_file() && !is_link_placeholder(&path) {
                files.push(path);
            }
        }
    }
    Ok(files)
}

fn is_link_placeholder(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == LINK_EXTENSION)
}

/// Applies `work` to every file, on a pool of `jobs` threads when `jobs`
/// is greater than one.
///
/// Results come back in file order; when several files fail, the error of
/// the first one in that order is returned.
pub(crate) fn map_files<T, F>(files: &[PathBuf], jobs: usize, work: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&Path) -> Result<T> + Send + Sync,
{
    if jobs > 1 && files.len() > 1 {
        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => {
                let results: Vec<Result<T>> =
                    pool.install(|| files.par_iter().map(|path| work(path.as_path())).collect());
                return results.into_iter().collect();
            }
            Err(e) => debug!(error = %e, "thread pool unavailable, processing files sequentially"),
        }
    }
    files.iter().map(|path| work(path.as_path())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_files_reports_first_error_in_file_order() {
        let files: Vec<PathBuf> = (0..16).map(|i| PathBuf::from(format!("f{i:02}.yml"))).collect();
        for jobs in [1, 4] {
            let err = map_files(&files, jobs, |path| {
                let name = path.to_string_lossy();
                if name == "f05.yml" || name == "f11.yml" {
                    Err(BuildError::new(
                        Stage::Fields,
                        path,
                        std::io::Error::other("boom"),
                    ))
                } else {
                    Ok(name.len())
                }
            })
            .unwrap_err();
            assert_eq!(err.path, PathBuf::from("f05.yml"), "jobs = {jobs}");
        }
    }

    #[test]
    fn test_map_files_keeps_order() {
        let files: Vec<PathBuf> = (0..8).map(|i| PathBuf::from(i.to_string())).collect();
        let out = map_files(&files, 3, |path| Ok(path.to_path_buf())).unwrap();
        assert_eq!(out, files);
    }

    #[test]
    fn test_glob_files_in_pattern_order() {
        let dir = tempfile::tempdir().unwrap();
        for rel in [
            "fields/b.yml",
            "fields/a.yml",
            "data_stream/x/fields/c.yml",
            "fields/readme.md",
            "fields/shared.yml.link",
        ] {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, "").unwrap();
        }

        let files = glob_files(
            Stage::Fields,
            dir.path(),
            &["fields/*", "data_stream/*/fields/*.yml"],
        )
        .unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(
            rel,
            vec!["fields/a.yml", "fields/b.yml", "fields/readme.md", "data_stream/x/fields/c.yml"]
        );
    }
}
