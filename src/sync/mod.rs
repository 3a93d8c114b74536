//! Integration synchronizer (C5): mirrors each installed package's prompts,
//! agents/chatmodes, commands, and skills into `.github/`/`.claude/`
//! sub-trees under the nuke-and-regenerate protocol, and keeps `.gitignore`
//! aware of the managed globs.
//!
//! Grounded in the teacher's `installer.rs`: `update_gitignore`'s
//! marker-delimited section splitting, and `cleanup_empty_dirs`'s bottom-up
//! empty-directory removal. The nuke-and-regenerate discipline itself
//! replaces the teacher's diff-based `cleanup_removed_artifacts` with an
//! unconditional delete-then-recopy, per the synchronizer's own rationale:
//! it eliminates a class of stale-file bugs and makes uninstall trivially
//! correct.

use crate::manifest::Target;
use crate::utils::fs::{atomic_write, atomic_write_str};
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const APM_INFIX: &str = "-apm";
const SKILL_MARKER: &str = ".apm-managed";

const GITIGNORE_BEGIN: &str = "# APM managed entries - do not edit below this line";
const GITIGNORE_END: &str = "# End of APM managed entries";

/// A package contributing source files to synchronize, in the declaration
/// order recorded by C3 (BFS order), which the nuke-and-regenerate protocol
/// must preserve so ties between packages resolve deterministically.
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub repo_identifier: String,
    pub root: PathBuf,
}

/// Paths removed and (re)written by a single [`sync`] call.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub removed: Vec<PathBuf>,
    pub written: Vec<PathBuf>,
}

/// Run the nuke-and-regenerate protocol for `project_root` against the
/// currently installed `packages`. `minimal` targets do no directory
/// integration at all, per §4.4's target rules.
pub fn sync(project_root: &Path, packages: &[InstalledPackage], target: Target) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    if target == Target::Minimal {
        return Ok(report);
    }

    nuke(project_root, target, &mut report)?;

    for package in packages {
        regenerate_package(project_root, package, target, &mut report)?;
    }

    update_gitignore(project_root, target)?;

    Ok(report)
}

fn github_enabled(target: Target) -> bool {
    matches!(target, Target::Vscode | Target::All)
}

fn claude_enabled(target: Target) -> bool {
    matches!(target, Target::Claude | Target::All)
}

/// Delete every file matching the managed globs, plus any skill directory
/// carrying the [`SKILL_MARKER`]. User files, lacking the `-apm` infix or
/// the marker, are left untouched.
fn nuke(project_root: &Path, target: Target, report: &mut SyncReport) -> Result<()> {
    if github_enabled(target) {
        remove_matching(&project_root.join(".github/prompts"), ".prompt.md", report)?;
        remove_matching(&project_root.join(".github/agents"), ".agent.md", report)?;
        remove_matching(&project_root.join(".github/agents"), ".chatmode.md", report)?;
        remove_managed_skill_dirs(&project_root.join(".github/skills"), report)?;
    }
    if claude_enabled(target) {
        remove_matching(&project_root.join(".claude/commands"), ".md", report)?;
        remove_managed_skill_dirs(&project_root.join(".claude/skills"), report)?;
    }
    Ok(())
}

/// Remove every file directly under `dir` whose name is `*-apm<ext>`.
fn remove_matching(dir: &Path, ext: &str, report: &mut SyncReport) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    let suffix = format!("{APM_INFIX}{ext}");
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.file_name().map(|n| n.to_string_lossy().ends_with(suffix.as_str())).unwrap_or(false) {
            std::fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
            report.removed.push(path);
        }
    }
    cleanup_empty_dirs(dir, project_root_boundary(dir));
    Ok(())
}

/// Remove every direct child directory of `skills_dir` that carries the
/// [`SKILL_MARKER`] file, i.e. was written by a previous sync.
fn remove_managed_skill_dirs(skills_dir: &Path, report: &mut SyncReport) -> Result<()> {
    if !skills_dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(skills_dir).with_context(|| format!("reading {}", skills_dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() && path.join(SKILL_MARKER).is_file() {
            std::fs::remove_dir_all(&path).with_context(|| format!("removing {}", path.display()))?;
            report.removed.push(path);
        }
    }
    Ok(())
}

/// The ancestor directory at which bottom-up empty-directory cleanup must
/// stop: the `.github` or `.claude` boundary, whichever is an ancestor.
fn project_root_boundary(dir: &Path) -> &Path {
    for ancestor in dir.ancestors() {
        if ancestor.file_name().map(|n| n == ".github" || n == ".claude").unwrap_or(false) {
            return ancestor;
        }
    }
    dir
}

fn cleanup_empty_dirs(leaf: &Path, boundary: &Path) {
    let mut current = Some(leaf);
    while let Some(dir) = current {
        if dir == boundary || dir.parent().is_none() {
            break;
        }
        match std::fs::remove_dir(dir) {
            Ok(()) => current = dir.parent(),
            Err(_) => break,
        }
    }
}

/// Copy `package`'s source files into the target directories, applying the
/// `-apm` suffix transform, and the command frontmatter re-key.
fn regenerate_package(
    project_root: &Path,
    package: &InstalledPackage,
    target: Target,
    report: &mut SyncReport,
) -> Result<()> {
    let apm_dir = package.root.join(".apm");

    if github_enabled(target) {
        copy_suffixed(&apm_dir.join("prompts"), ".prompt.md", &project_root.join(".github/prompts"), report)?;
        copy_suffixed(&apm_dir.join("agents"), ".agent.md", &project_root.join(".github/agents"), report)?;
        copy_suffixed(&apm_dir.join("chatmodes"), ".chatmode.md", &project_root.join(".github/agents"), report)?;
        sync_skills(&apm_dir.join("skills"), &project_root.join(".github/skills"), report)?;
    }
    if claude_enabled(target) {
        copy_commands(&apm_dir.join("commands"), &project_root.join(".claude/commands"), report)?;
        sync_skills(&apm_dir.join("skills"), &project_root.join(".claude/skills"), report)?;
    }

    Ok(())
}

fn suffixed_name(file_name: &str, ext: &str) -> Option<String> {
    file_name.strip_suffix(ext).map(|stem| format!("{stem}{APM_INFIX}{ext}"))
}

fn copy_suffixed(src_dir: &Path, ext: &str, dest_dir: &Path, report: &mut SyncReport) -> Result<()> {
    if !src_dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(src_dir).with_context(|| format!("reading {}", src_dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(dest_name) = suffixed_name(&file_name, ext) else {
            continue;
        };
        let content = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let dest = dest_dir.join(dest_name);
        atomic_write(&dest, &content)?;
        report.written.push(dest);
    }
    Ok(())
}

const PRESERVED_COMMAND_FIELDS: &[&str] = &["allowed-tools", "argument-hint", "description", "model"];

/// Commands get a frontmatter re-key: only [`PRESERVED_COMMAND_FIELDS`]
/// survive, the body is copied unmodified.
fn copy_commands(src_dir: &Path, dest_dir: &Path, report: &mut SyncReport) -> Result<()> {
    if !src_dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(src_dir).with_context(|| format!("reading {}", src_dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() || path.extension().map(|e| e.to_string_lossy() != "md").unwrap_or(true) {
            continue;
        }
        let Some(file_name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let Some(dest_name) = suffixed_name(&file_name, ".md") else {
            continue;
        };

        let content = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let rekeyed = rekey_command_frontmatter(&content);
        let dest = dest_dir.join(dest_name);
        atomic_write_str(&dest, &rekeyed)?;
        report.written.push(dest);
    }
    Ok(())
}

fn rekey_command_frontmatter(content: &str) -> String {
    let parsed = crate::markdown::frontmatter::parse(content);
    if parsed.metadata.is_empty() {
        return parsed.body;
    }

    let preserved: BTreeMap<&str, &serde_yaml::Value> = PRESERVED_COMMAND_FIELDS
        .iter()
        .filter_map(|&key| parsed.metadata.get(key).map(|v| (key, v)))
        .collect();

    if preserved.is_empty() {
        return parsed.body;
    }

    let mut frontmatter = String::from("---\n");
    for (key, value) in preserved {
        let rendered = serde_yaml::to_string(value).unwrap_or_default();
        let rendered = rendered.trim_end_matches('\n');
        if rendered.contains('\n') {
            frontmatter.push_str(&format!("{key}:\n{rendered}\n"));
        } else {
            frontmatter.push_str(&format!("{key}: {rendered}\n"));
        }
    }
    frontmatter.push_str("---\n");

    format!("{frontmatter}{}", parsed.body)
}

/// Mirror each `<skill-name>/` directory under `src_skills` into
/// `dest_skills`, recursively copying its files and writing the
/// [`SKILL_MARKER`] so a later nuke phase can identify it as APM-managed.
fn sync_skills(src_skills: &Path, dest_skills: &Path, report: &mut SyncReport) -> Result<()> {
    if !src_skills.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(src_skills).with_context(|| format!("reading {}", src_skills.display()))? {
        let entry = entry?;
        let src = entry.path();
        if !src.is_dir() {
            continue;
        }
        let Some(name) = src.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        let dest = dest_skills.join(&name);
        copy_dir_recursive(&src, &dest, report)?;
        let marker = dest.join(SKILL_MARKER);
        atomic_write_str(&marker, "")?;
        report.written.push(marker);
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dest: &Path, report: &mut SyncReport) -> Result<()> {
    std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;
    for entry in std::fs::read_dir(src).with_context(|| format!("reading {}", src.display()))? {
        let entry = entry?;
        let path = entry.path();
        let dest_path = dest.join(entry.file_name());
        if path.is_dir() {
            copy_dir_recursive(&path, &dest_path, report)?;
        } else {
            let content = std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            atomic_write(&dest_path, &content)?;
            report.written.push(dest_path);
        }
    }
    Ok(())
}

/// Ensure `.gitignore` lists the managed globs relevant to `target`,
/// preserving everything else byte-for-byte. Reuses the teacher's
/// marker-delimited section approach; never removes entries.
fn update_gitignore(project_root: &Path, target: Target) -> Result<()> {
    let gitignore_path = project_root.join(".gitignore");

    let mut patterns: Vec<&str> = Vec::new();
    if github_enabled(target) {
        patterns.extend([
            ".github/prompts/*-apm.prompt.md",
            ".github/agents/*-apm.agent.md",
            ".github/agents/*-apm.chatmode.md",
            ".github/skills/",
        ]);
    }
    if claude_enabled(target) {
        patterns.extend([".claude/commands/*-apm.md", ".claude/skills/"]);
    }
    if patterns.is_empty() {
        return Ok(());
    }

    let existing = if gitignore_path.is_file() {
        std::fs::read_to_string(&gitignore_path).with_context(|| format!("reading {}", gitignore_path.display()))?
    } else {
        String::new()
    };

    let mut before: Vec<&str> = Vec::new();
    let mut existing_managed: Vec<&str> = Vec::new();
    let mut after: Vec<&str> = Vec::new();
    let mut section = 0; // 0 = before, 1 = inside, 2 = after

    for line in existing.lines() {
        match section {
            0 if line == GITIGNORE_BEGIN => section = 1,
            0 => before.push(line),
            1 if line == GITIGNORE_END => section = 2,
            1 => existing_managed.push(line),
            _ => after.push(line),
        }
    }

    let mut merged: Vec<String> = existing_managed.iter().map(|s| s.to_string()).collect();
    for pattern in &patterns {
        if !merged.iter().any(|m| m == pattern) {
            merged.push(pattern.to_string());
        }
    }
    merged.sort();

    let mut content = String::new();
    if before.is_empty() && after.is_empty() {
        content.push_str("# .gitignore - APM managed entries\n\n");
    }
    for line in &before {
        content.push_str(line);
        content.push('\n');
    }
    if !before.is_empty() && !before.last().unwrap().trim().is_empty() {
        content.push('\n');
    }
    content.push_str(GITIGNORE_BEGIN);
    content.push('\n');
    for line in &merged {
        content.push_str(line);
        content.push('\n');
    }
    content.push_str(GITIGNORE_END);
    content.push('\n');
    if !after.is_empty() {
        content.push('\n');
        for line in &after {
            content.push_str(line);
            content.push('\n');
        }
    }

    atomic_write_str(&gitignore_path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn minimal_target_performs_no_integration() {
        let dir = tempdir().unwrap();
        let report = sync(dir.path(), &[], Target::Minimal).unwrap();
        assert!(report.written.is_empty());
        assert!(!dir.path().join(".gitignore").is_file());
    }

    #[test]
    fn prompt_and_agent_files_are_copied_with_apm_infix() {
        let dir = tempdir().unwrap();
        let pkg_root = dir.path().join("apm_modules/owner/repo");
        write(&pkg_root.join(".apm/prompts/review.prompt.md"), "Review this.\n");
        write(&pkg_root.join(".apm/agents/bot.agent.md"), "---\nname: bot\n---\nBot body");

        let packages = vec![InstalledPackage {
            repo_identifier: "owner/repo".to_string(),
            root: pkg_root,
        }];
        let report = sync(dir.path(), &packages, Target::Vscode).unwrap();

        assert!(dir.path().join(".github/prompts/review-apm.prompt.md").is_file());
        assert!(dir.path().join(".github/agents/bot-apm.agent.md").is_file());
        assert!(report.written.iter().any(|p| p.ends_with("review-apm.prompt.md")));
    }

    #[test]
    fn nuke_removes_stale_apm_files_but_not_user_files() {
        let dir = tempdir().unwrap();
        write(&dir.path().join(".github/prompts/stale-apm.prompt.md"), "old");
        write(&dir.path().join(".github/prompts/custom.prompt.md"), "mine");

        sync(dir.path(), &[], Target::Vscode).unwrap();

        assert!(!dir.path().join(".github/prompts/stale-apm.prompt.md").exists());
        assert!(dir.path().join(".github/prompts/custom.prompt.md").is_file());
    }

    #[test]
    fn command_frontmatter_is_rekeyed() {
        let content = "---\nallowed-tools: [Read]\ndescription: reviews\nsecret: drop-me\n---\nBody text\n";
        let rekeyed = rekey_command_frontmatter(content);
        assert!(rekeyed.contains("allowed-tools"));
        assert!(rekeyed.contains("description"));
        assert!(!rekeyed.contains("secret"));
        assert!(rekeyed.contains("Body text"));
    }

    #[test]
    fn skill_directories_are_synced_and_marked() {
        let dir = tempdir().unwrap();
        let pkg_root = dir.path().join("apm_modules/owner/repo");
        write(&pkg_root.join(".apm/skills/reviewer/SKILL.md"), "---\nname: reviewer\n---\nBody");
        write(&pkg_root.join(".apm/skills/reviewer/helper.py"), "print('hi')");

        let packages = vec![InstalledPackage {
            repo_identifier: "owner/repo".to_string(),
            root: pkg_root,
        }];
        sync(dir.path(), &packages, Target::All).unwrap();

        assert!(dir.path().join(".github/skills/reviewer/SKILL.md").is_file());
        assert!(dir.path().join(".github/skills/reviewer/helper.py").is_file());
        assert!(dir.path().join(".github/skills/reviewer/.apm-managed").is_file());
        assert!(dir.path().join(".claude/skills/reviewer/SKILL.md").is_file());
    }

    #[test]
    fn skill_directory_is_removed_on_next_nuke_when_package_gone() {
        let dir = tempdir().unwrap();
        let pkg_root = dir.path().join("apm_modules/owner/repo");
        write(&pkg_root.join(".apm/skills/reviewer/SKILL.md"), "---\nname: reviewer\n---\nBody");
        let packages = vec![InstalledPackage {
            repo_identifier: "owner/repo".to_string(),
            root: pkg_root,
        }];
        sync(dir.path(), &packages, Target::Vscode).unwrap();
        assert!(dir.path().join(".github/skills/reviewer").is_dir());

        sync(dir.path(), &[], Target::Vscode).unwrap();
        assert!(!dir.path().join(".github/skills/reviewer").exists());
    }

    #[test]
    fn gitignore_preserves_user_content_and_is_idempotent() {
        let dir = tempdir().unwrap();
        write(&dir.path().join(".gitignore"), "node_modules/\ntarget/\n");

        sync(dir.path(), &[], Target::Vscode).unwrap();
        let first = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert!(first.contains("node_modules/"));
        assert!(first.contains(GITIGNORE_BEGIN));
        assert!(first.contains(".github/prompts/*-apm.prompt.md"));

        sync(dir.path(), &[], Target::Vscode).unwrap();
        let second = fs::read_to_string(dir.path().join(".gitignore")).unwrap();
        assert_eq!(first, second);
    }
}
