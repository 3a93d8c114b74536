//! Read-only verification: compare the lockfile against the installed tree
//! and against the manifest, per §4.3's last paragraph.

use crate::lockfile::LockFile;
use crate::manifest::Manifest;
use std::path::Path;

/// Three-way diff between the manifest, the lockfile, and the on-disk tree.
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Locked entries present on disk under `apm_modules/`.
    pub matched: Vec<String>,
    /// Locked entries whose install directory is missing.
    pub missing_on_disk: Vec<String>,
    /// Dependencies declared in `apm.yml` with no corresponding lockfile entry.
    pub declared_unlocked: Vec<String>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing_on_disk.is_empty() && self.declared_unlocked.is_empty()
    }
}

/// Verify `lockfile` against `project_root/apm_modules` and against `manifest`.
pub fn verify(manifest: &Manifest, lockfile: &LockFile, project_root: &Path) -> VerifyReport {
    let mut report = VerifyReport::default();
    let modules_root = project_root.join("apm_modules");

    for dep in &lockfile.dependencies {
        let install_dir = modules_root.join(&dep.repo_url);
        if install_dir.exists() || dep.is_virtual {
            report.matched.push(dep.repo_url.clone());
        } else {
            report.missing_on_disk.push(dep.repo_url.clone());
        }
    }

    for declared in &manifest.dependencies.apm {
        let known = lockfile.dependencies.iter().any(|d| declared.starts_with(d.repo_url.as_str()));
        if !known {
            report.declared_unlocked.push(declared.clone());
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lockfile::LockedDependency;
    use tempfile::tempdir;

    fn locked(repo_url: &str, is_virtual: bool) -> LockedDependency {
        LockedDependency {
            repo_url: repo_url.to_string(),
            host: "github.com".to_string(),
            resolved_commit: "a".repeat(40),
            resolved_ref: "main".to_string(),
            version: None,
            virtual_path: None,
            is_virtual,
            depth: 1,
            resolved_by: "root".to_string(),
        }
    }

    #[test]
    fn missing_install_dir_is_reported() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::scaffold("proj");
        let lockfile = LockFile::new(vec![locked("owner/repo", false)]);
        let report = verify(&manifest, &lockfile, dir.path());
        assert_eq!(report.missing_on_disk, vec!["owner/repo".to_string()]);
        assert!(!report.is_clean());
    }

    #[test]
    fn virtual_dependency_is_always_matched() {
        let dir = tempdir().unwrap();
        let manifest = Manifest::scaffold("proj");
        let lockfile = LockFile::new(vec![locked("owner/repo", true)]);
        let report = verify(&manifest, &lockfile, dir.path());
        assert_eq!(report.matched, vec!["owner/repo".to_string()]);
    }

    #[test]
    fn declared_dependency_without_lock_entry_is_reported() {
        let dir = tempdir().unwrap();
        let mut manifest = Manifest::scaffold("proj");
        manifest.dependencies.apm.push("owner/unlocked".to_string());
        let lockfile = LockFile::default();
        let report = verify(&manifest, &lockfile, dir.path());
        assert_eq!(report.declared_unlocked, vec!["owner/unlocked".to_string()]);
    }

    #[test]
    fn present_install_dir_is_matched() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("apm_modules/owner/repo")).unwrap();
        let manifest = Manifest::scaffold("proj");
        let lockfile = LockFile::new(vec![locked("owner/repo", false)]);
        let report = verify(&manifest, &lockfile, dir.path());
        assert_eq!(report.matched, vec!["owner/repo".to_string()]);
        assert!(report.is_clean());
    }
}
