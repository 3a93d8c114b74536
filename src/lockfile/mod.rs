//! Lockfile (`apm.lock`) parsing and atomic writes.
//!
//! Unlike the teacher's TOML `agpm.lock`, `apm.lock` is YAML (per the
//! manifest/lockfile contract), but keeps the teacher's atomic-write
//! discipline: write to a sibling temp file, `fsync`, then rename over the
//! target (`lockfile/io.rs` there, [`LockFile::save`] here via
//! [`crate::utils::fs::atomic_write`]).

use crate::utils::fs::atomic_write;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const LOCKFILE_FILE_NAME: &str = "apm.lock";
const LOCKFILE_VERSION: &str = "1";
const APM_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One resolved entry in the dependency graph, per the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockedDependency {
    pub repo_url: String,
    pub host: String,
    pub resolved_commit: String,
    pub resolved_ref: String,
    pub version: Option<String>,
    pub virtual_path: Option<String>,
    pub is_virtual: bool,
    pub depth: u32,
    pub resolved_by: String,
}

/// Serialized dependency graph, ordered by `(depth ascending, repo_url ascending)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockFile {
    pub lockfile_version: String,
    pub apm_version: String,
    pub generated_at: String,
    pub dependencies: Vec<LockedDependency>,
}

impl Default for LockFile {
    fn default() -> Self {
        Self {
            lockfile_version: LOCKFILE_VERSION.to_string(),
            apm_version: APM_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            dependencies: Vec::new(),
        }
    }
}

impl LockFile {
    pub fn new(mut dependencies: Vec<LockedDependency>) -> Self {
        Self::sort(&mut dependencies);
        Self {
            lockfile_version: LOCKFILE_VERSION.to_string(),
            apm_version: APM_VERSION.to_string(),
            generated_at: Utc::now().to_rfc3339(),
            dependencies,
        }
    }

    fn sort(dependencies: &mut [LockedDependency]) {
        dependencies.sort_by(|a, b| a.depth.cmp(&b.depth).then_with(|| a.repo_url.cmp(&b.repo_url)));
    }

    /// Load the lockfile from disk. A missing file is not an error: it
    /// yields an empty lockfile, matching the teacher's `load` behavior for
    /// a first-time install.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading lockfile {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let lockfile: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("parsing lockfile {}", path.display()))?;
        if lockfile.lockfile_version != LOCKFILE_VERSION {
            anyhow::bail!(
                "lockfile {} has version {} but this build expects version {}",
                path.display(),
                lockfile.lockfile_version,
                LOCKFILE_VERSION
            );
        }
        Ok(lockfile)
    }

    /// Save the lockfile atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut sorted = self.clone();
        Self::sort(&mut sorted.dependencies);
        let content = serde_yaml::to_string(&sorted).context("serializing lockfile")?;
        atomic_write(path, content.as_bytes())
            .with_context(|| format!("writing lockfile {}", path.display()))
    }

    pub fn find(&self, repo_url: &str) -> Option<&LockedDependency> {
        self.dependencies.iter().find(|d| d.repo_url == repo_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dep(repo_url: &str, depth: u32) -> LockedDependency {
        LockedDependency {
            repo_url: repo_url.to_string(),
            host: "github.com".to_string(),
            resolved_commit: "a".repeat(40),
            resolved_ref: "main".to_string(),
            version: None,
            virtual_path: None,
            is_virtual: false,
            depth,
            resolved_by: "root".to_string(),
        }
    }

    #[test]
    fn missing_lockfile_loads_as_empty() {
        let dir = tempdir().unwrap();
        let lockfile = LockFile::load(&dir.path().join("apm.lock")).unwrap();
        assert!(lockfile.dependencies.is_empty());
        assert_eq!(lockfile.lockfile_version, "1");
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("apm.lock");
        let lockfile = LockFile::new(vec![dep("owner/b", 1), dep("owner/a", 0)]);
        lockfile.save(&path).unwrap();
        let loaded = LockFile::load(&path).unwrap();
        assert_eq!(loaded.dependencies.len(), 2);
        assert_eq!(loaded.dependencies[0].repo_url, "owner/a");
        assert_eq!(loaded.dependencies[1].repo_url, "owner/b");
    }

    #[test]
    fn ordering_is_depth_then_repo_url() {
        let lockfile = LockFile::new(vec![dep("z/z", 0), dep("a/a", 1), dep("a/a", 0)]);
        let urls: Vec<_> = lockfile.dependencies.iter().map(|d| (d.depth, d.repo_url.clone())).collect();
        assert_eq!(urls, vec![(0, "a/a".to_string()), (0, "z/z".to_string()), (1, "a/a".to_string())]);
    }

    #[test]
    fn rejects_future_lockfile_version() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("apm.lock");
        std::fs::write(
            &path,
            "lockfile_version: \"99\"\napm_version: \"0.1.0\"\ngenerated_at: \"2024-01-01T00:00:00Z\"\ndependencies: []\n",
        )
        .unwrap();
        assert!(LockFile::load(&path).is_err());
    }
}
