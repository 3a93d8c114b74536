//! Test scaffolding shared between this crate's own tests and the
//! integration tests under `tests/`.
//!
//! Scaled down from the teacher's `test_utils` (which builds full mock Git
//! remotes via `git_helper`): this crate's integration tests exercise the
//! manifest/compile/sync pipeline against a local project tree, never a
//! network fetch, so there's no fixture equivalent to `GitRepoFixture`.

use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scaffolded project directory: an `apm.yml`, optionally an `apm.lock`,
/// and whatever primitive files a test wants to discover.
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// An empty temp directory with no manifest.
    pub fn empty() -> Self {
        Self { dir: TempDir::new().expect("create temp dir") }
    }

    /// A project with a minimal `apm.yml` (`name`/`version` only).
    pub fn with_manifest(name: &str) -> Self {
        let project = Self::empty();
        project.write_manifest(&format!("name: {name}\nversion: \"1.0.0\"\n"));
        project
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_manifest(&self, yaml: &str) {
        std::fs::write(self.path().join("apm.yml"), yaml).expect("write apm.yml");
    }

    pub fn write_lockfile(&self, yaml: &str) {
        std::fs::write(self.path().join("apm.lock"), yaml).expect("write apm.lock");
    }

    /// Write a file at a project-relative path, creating parent directories.
    pub fn write_file(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(&path, content).expect("write file");
        path
    }

    /// Convenience for an instruction primitive with the two required
    /// frontmatter fields.
    pub fn write_instruction(&self, relative: &str, apply_to: &str, body: &str) -> PathBuf {
        let content = format!(
            "---\ndescription: test instruction\napplyTo: \"{apply_to}\"\n---\n{body}\n"
        );
        self.write_file(relative, &content)
    }

    pub fn read_file(&self, relative: &str) -> String {
        std::fs::read_to_string(self.path().join(relative)).expect("read file")
    }

    pub fn file_exists(&self, relative: &str) -> bool {
        self.path().join(relative).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_manifest_writes_name_and_version() {
        let project = TestProject::with_manifest("demo");
        assert!(project.file_exists("apm.yml"));
        assert!(project.read_file("apm.yml").contains("demo"));
    }

    #[test]
    fn write_instruction_includes_required_fields() {
        let project = TestProject::empty();
        project.write_instruction(".apm/rust.instructions.md", "**/*.rs", "Use idiomatic Rust.");
        let content = project.read_file(".apm/rust.instructions.md");
        assert!(content.contains("applyTo"));
        assert!(content.contains("description"));
    }
}
