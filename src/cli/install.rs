//! `apm install`: resolve `dependencies.apm` transitively and fetch each
//! one, writing `apm.lock`.
//!
//! Wires C1 (`DependencyRef::parse`, inside the resolver), C2
//! ([`GitFetchDriver`]), and C3 ([`Resolver`]) together the way the
//! teacher's `InstallCommand::execute` wires its own source-cache and
//! resolver stages, but without the teacher's worktree/parallel-checkout
//! machinery (no concurrent version sets to isolate here).

use crate::core::Environment;
use crate::fetch::GitFetchDriver;
use crate::lockfile::{LockFile, LOCKFILE_FILE_NAME};
use crate::manifest::{self, Manifest};
use crate::resolver::Resolver;
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::Path;

#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Package references to install or restrict installation to. With no
    /// `apm.yml`, exactly one reference bootstraps a manifest around it.
    packages: Vec<String>,

    /// Fail instead of re-resolving if `apm.lock` doesn't already cover
    /// every declared dependency at its locked commit.
    #[arg(long)]
    frozen: bool,

    /// Resolve and report without writing `apm.lock` or fetching anything
    /// the lockfile doesn't already record.
    #[arg(long = "dry-run")]
    dry_run: bool,
}

pub async fn execute(args: InstallArgs, project_root: &Path) -> Result<()> {
    let existing_manifest_path = manifest::find_manifest_from(project_root).ok();

    let (manifest, root, bootstrapped) = match existing_manifest_path {
        Some(path) => {
            let root = path.parent().unwrap_or(project_root).to_path_buf();
            (Manifest::load(&path)?, root, false)
        }
        None if args.packages.len() == 1 => {
            let manifest = crate::resolver::bootstrap_manifest(project_root, &args.packages[0]);
            (manifest, project_root.to_path_buf(), true)
        }
        None if !args.packages.is_empty() => {
            let name = project_root.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "project".to_string());
            let mut manifest = Manifest::scaffold(&name);
            manifest.dependencies.apm = args.packages.clone();
            (manifest, project_root.to_path_buf(), true)
        }
        None => {
            return Err(anyhow!(
                "no {} found in {} or any parent directory; pass a package reference to bootstrap one",
                manifest::MANIFEST_FILE_NAME,
                project_root.display()
            ));
        }
    };

    let lockfile_path = root.join(LOCKFILE_FILE_NAME);
    let existing_lockfile = if lockfile_path.exists() { Some(LockFile::load(&lockfile_path)?) } else { None };

    let selected = (!bootstrapped && !args.packages.is_empty()).then_some(args.packages.as_slice());

    let driver = GitFetchDriver::new();
    let env = Environment::from_process(&root);
    let resolver = Resolver::new(&driver, &env, root.clone());
    let outcome = resolver.resolve(&manifest, args.frozen, existing_lockfile.as_ref(), selected).await?;

    println!(
        "{} resolved {} dependenc{}",
        "✓".green(),
        outcome.graph.len(),
        if outcome.graph.len() == 1 { "y" } else { "ies" }
    );
    if !outcome.graph.conflicts.is_empty() {
        println!("{} {} conflicting edge(s) kept the first-resolved package", "note:".yellow(), outcome.graph.conflicts.len());
    }

    if args.dry_run {
        println!("(dry run: apm.lock not written)");
        return Ok(());
    }

    outcome.lockfile.save(&lockfile_path)?;

    if bootstrapped {
        let manifest_path = root.join(manifest::MANIFEST_FILE_NAME);
        std::fs::write(&manifest_path, manifest.to_yaml()?)?;
        println!("{} wrote {}", "✓".green(), manifest_path.display());
    }

    Ok(())
}
