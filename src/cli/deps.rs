//! `apm deps`: inspect and modify installed dependencies.
//!
//! `list`/`tree` read `apm.lock` directly; `verify` wires
//! [`crate::resolver::verify::verify`]; `uninstall` removes a declared
//! dependency from `apm.yml` and re-resolves, mirroring `install`'s C3
//! wiring but for a shrinking dependency set rather than a growing one.

use crate::core::Environment;
use crate::fetch::GitFetchDriver;
use crate::lockfile::{LockFile, LockedDependency, LOCKFILE_FILE_NAME};
use crate::manifest::{self, Manifest};
use crate::resolver::{verify, Resolver};
use anyhow::{anyhow, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct DepsArgs {
    #[command(subcommand)]
    command: DepsCommand,
}

#[derive(Subcommand, Debug)]
enum DepsCommand {
    /// List locked dependencies, one per line.
    List,
    /// Print locked dependencies indented by resolution depth.
    Tree,
    /// Compare `apm.lock` against the manifest and the installed tree.
    Verify,
    /// Remove a dependency from `apm.yml` and re-resolve.
    Uninstall {
        /// Dependency reference (or its prefix) to remove.
        package: String,
    },
}

pub async fn execute(args: DepsArgs, project_root: &Path) -> Result<()> {
    match args.command {
        DepsCommand::List => list(project_root),
        DepsCommand::Tree => tree(project_root),
        DepsCommand::Verify => verify_cmd(project_root),
        DepsCommand::Uninstall { package } => uninstall(project_root, &package).await,
    }
}

fn load_lockfile(project_root: &Path) -> Result<(LockFile, std::path::PathBuf)> {
    let manifest_path = manifest::find_manifest_from(project_root)?;
    let root = manifest_path.parent().unwrap_or(project_root).to_path_buf();
    let lockfile = LockFile::load(&root.join(LOCKFILE_FILE_NAME))?;
    Ok((lockfile, root))
}

fn list(project_root: &Path) -> Result<()> {
    let (lockfile, _) = load_lockfile(project_root)?;
    if lockfile.dependencies.is_empty() {
        println!("no dependencies locked");
        return Ok(());
    }
    for dep in &lockfile.dependencies {
        println!("{} {}", dep.repo_url, short_commit(dep));
    }
    Ok(())
}

fn tree(project_root: &Path) -> Result<()> {
    let (lockfile, _) = load_lockfile(project_root)?;
    for dep in &lockfile.dependencies {
        let indent = "  ".repeat(dep.depth.saturating_sub(1) as usize);
        println!("{indent}{} {} (via {})", dep.repo_url, short_commit(dep), dep.resolved_by);
    }
    Ok(())
}

fn short_commit(dep: &LockedDependency) -> String {
    dep.resolved_commit.chars().take(8).collect()
}

fn verify_cmd(project_root: &Path) -> Result<()> {
    let manifest_path = manifest::find_manifest_from(project_root)?;
    let root = manifest_path.parent().unwrap_or(project_root).to_path_buf();
    let manifest = Manifest::load(&manifest_path)?;
    let lockfile = LockFile::load(&root.join(LOCKFILE_FILE_NAME))?;

    let report = verify(&manifest, &lockfile, &root);
    for repo_url in &report.matched {
        println!("{} {}", "ok".green(), repo_url);
    }
    for repo_url in &report.missing_on_disk {
        println!("{} {} locked but not installed", "missing:".red(), repo_url);
    }
    for declared in &report.declared_unlocked {
        println!("{} {} declared but not locked", "unlocked:".yellow(), declared);
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("apm.lock is out of sync; run `apm install`"))
    }
}

async fn uninstall(project_root: &Path, package: &str) -> Result<()> {
    let manifest_path = manifest::find_manifest_from(project_root)?;
    let root = manifest_path.parent().unwrap_or(project_root).to_path_buf();
    let mut manifest = Manifest::load(&manifest_path)?;

    let before = manifest.dependencies.apm.len();
    manifest.dependencies.apm.retain(|d| !d.starts_with(package));
    if manifest.dependencies.apm.len() == before {
        return Err(anyhow!("no dependency matching `{package}` in {}", manifest::MANIFEST_FILE_NAME));
    }

    let lockfile_path = root.join(LOCKFILE_FILE_NAME);
    let previous_lockfile = LockFile::load(&lockfile_path)?;

    let driver = GitFetchDriver::new();
    let env = Environment::from_process(&root);
    let resolver = Resolver::new(&driver, &env, root.clone());
    let outcome = resolver.resolve(&manifest, false, Some(&previous_lockfile), None).await?;

    for removed in previous_lockfile.dependencies.iter().filter(|d| !outcome.lockfile.dependencies.iter().any(|k| k.repo_url == d.repo_url)) {
        let install_dir = root.join("apm_modules").join(&removed.repo_url);
        if install_dir.exists() {
            std::fs::remove_dir_all(&install_dir)?;
        }
    }

    outcome.lockfile.save(&lockfile_path)?;
    std::fs::write(&manifest_path, manifest.to_yaml()?)?;

    println!("{} removed `{package}`; run `apm compile` to regenerate output", "✓".green());
    Ok(())
}
