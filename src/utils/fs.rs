//! Atomic filesystem writes and shared directory-skip rules.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Write `content` to `path` atomically: write to a sibling `.tmp` file,
/// `fsync`, then rename over the target. Used for `apm.lock` and for every
/// `AGENTS.md`/`CLAUDE.md`/synchronized file C4 and C5 produce, so a crash
/// mid-write never leaves a half-written file on disk.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent directory for {}", path.display()))?;
    }

    let temp_path = path.with_extension(match path.extension() {
        Some(ext) => format!("{}.tmp", ext.to_string_lossy()),
        None => "tmp".to_string(),
    });

    {
        use std::io::Write;
        let mut file = fs::File::create(&temp_path)
            .with_context(|| format!("creating temp file {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("writing temp file {}", temp_path.display()))?;
        file.sync_all().context("syncing temp file to disk")?;
    }

    fs::rename(&temp_path, path)
        .with_context(|| format!("renaming {} to {}", temp_path.display(), path.display()))?;
    Ok(())
}

pub fn atomic_write_str(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Directory names that discovery (C4) and traversal never descend into.
pub const SKIP_DIRS: &[&str] = &[".git", "node_modules", ".apm/compiled", "apm_modules"];

pub fn is_skipped_dir(name: &str) -> bool {
    SKIP_DIRS.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn atomic_write_creates_parent_dirs_and_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deep/file.yml");
        atomic_write_str(&path, "hello: world\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello: world\n");
        assert!(!path.with_extension("yml.tmp").exists());
    }

    #[test]
    fn atomic_write_overwrites_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("file.txt");
        atomic_write_str(&path, "first").unwrap();
        atomic_write_str(&path, "second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn skip_dirs_cover_apm_modules() {
        assert!(is_skipped_dir("apm_modules"));
        assert!(!is_skipped_dir("src"));
    }
}
