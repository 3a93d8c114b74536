//! Manifest discovery: walk up the directory tree looking for `apm.yml`,
//! mirroring Cargo/Git/npm project-file discovery (and the teacher's own
//! `find_manifest` for `agpm.toml`).

use super::MANIFEST_FILE_NAME;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Search for `apm.yml` starting at `start` and walking up to the filesystem
/// root. Returns the path to the manifest if found.
pub fn find_manifest_from(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(MANIFEST_FILE_NAME);
        if candidate.is_file() {
            return Ok(candidate);
        }
        if !dir.pop() {
            anyhow::bail!("no {MANIFEST_FILE_NAME} found in {} or any parent directory", start.display());
        }
    }
}

/// Search for `apm.yml` starting at the current working directory.
pub fn find_manifest() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("reading current directory")?;
    find_manifest_from(&cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_manifest_in_start_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("apm.yml"), "name: x\nversion: \"1.0.0\"\n").unwrap();
        let found = find_manifest_from(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("apm.yml"));
    }

    #[test]
    fn finds_manifest_in_ancestor_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("apm.yml"), "name: x\nversion: \"1.0.0\"\n").unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();
        let found = find_manifest_from(&nested).unwrap();
        assert_eq!(found, dir.path().join("apm.yml"));
    }

    #[test]
    fn errors_when_no_manifest_exists() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(find_manifest_from(&nested).is_err());
    }
}
