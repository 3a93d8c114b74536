//! `apm compile`: run the primitive engine (C4) and then the integration
//! synchronizer (C5) in one pass — this crate has no separate `sync`
//! subcommand, since every compile must re-sync to keep `.github`/`.claude`
//! consistent with whatever C4 just wrote.
//!
//! Grounded in the teacher's `cli/validate.rs` for the `--validate`
//! reporting style (issues printed, never fatal) and in `primitives::compile`
//! / `sync::sync` for the actual work.

use crate::lockfile::{LockFile, LOCKFILE_FILE_NAME};
use crate::manifest::{self, Manifest, PlacementStrategy, Target};
use crate::primitives::{self, placement::compute_placement, PrimitiveVariant};
use crate::reference::DependencyRef;
use crate::sync::{self, InstalledPackage};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::Path;

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum TargetArg {
    Vscode,
    Claude,
    All,
    Minimal,
}

impl From<TargetArg> for Target {
    fn from(value: TargetArg) -> Self {
        match value {
            TargetArg::Vscode => Target::Vscode,
            TargetArg::Claude => Target::Claude,
            TargetArg::All => Target::All,
            TargetArg::Minimal => Target::Minimal,
        }
    }
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum StrategyArg {
    Distributed,
    SingleFile,
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    /// Override target detection (`vscode`, `claude`, `all`, `minimal`).
    #[arg(long)]
    target: Option<TargetArg>,

    /// Override the manifest's placement strategy.
    #[arg(long)]
    strategy: Option<StrategyArg>,

    /// Shorthand for `--strategy single-file`.
    #[arg(long)]
    single_agents: bool,

    /// Report what would be written without touching disk.
    #[arg(long = "dry-run")]
    dry_run: bool,

    /// Print per-file placement details.
    #[arg(short, long)]
    verbose: bool,

    /// Skip constitution injection even in single-file mode.
    #[arg(long = "no-constitution")]
    no_constitution: bool,

    /// Disable relative-link rewriting during rendering.
    #[arg(long = "no-links")]
    no_links: bool,

    /// Remove previously generated `AGENTS.md` files outside the current
    /// placement plan before writing the new ones.
    #[arg(long)]
    clean: bool,

    /// Check every discovered primitive's required frontmatter fields and
    /// report the results; never blocks compilation.
    #[arg(long)]
    validate: bool,
}

pub fn execute(args: CompileArgs, project_root: &Path) -> Result<()> {
    let manifest_path = manifest::find_manifest_from(project_root)?;
    let root = manifest_path.parent().unwrap_or(project_root).to_path_buf();
    let manifest = Manifest::load(&manifest_path)?;

    let lockfile_path = root.join(LOCKFILE_FILE_NAME);
    let lockfile = LockFile::load(&lockfile_path)?;
    let dependency_roots = installed_packages(&lockfile, &root);

    let collection = primitives::build_collection(&root, &dependency_roots);

    if args.validate {
        let issues = primitives::validate(&collection);
        if issues.is_empty() {
            println!("{} no missing required fields", "✓".green());
        } else {
            for issue in &issues {
                println!(
                    "{} {} is missing required field `{}` for a {:?} primitive",
                    "warning:".yellow(),
                    issue.file_path.display(),
                    issue.missing_field,
                    issue.variant
                );
            }
        }
    }

    let mut options = manifest.compilation.clone();
    if let Some(strategy) = args.strategy {
        options.strategy = match strategy {
            StrategyArg::Distributed => PlacementStrategy::Distributed,
            StrategyArg::SingleFile => PlacementStrategy::SingleFile,
        };
    }
    if args.single_agents {
        options.strategy = PlacementStrategy::SingleFile;
    }
    if args.no_links {
        options.resolve_links = false;
    }

    let target = primitives::detect_target(args.target.map(Target::from), &manifest, &root);

    if args.clean {
        let files = primitives::compile::project_files(&root, &options.exclude);
        let instructions: Vec<_> = collection
            .of_variant(PrimitiveVariant::Instruction)
            .map(|p| crate::primitives::placement::InstructionSpec {
                id: p.file_path.to_string_lossy().to_string(),
                apply_to: p.apply_to().unwrap_or("**/*").to_string(),
            })
            .collect();
        let plan = compute_placement(&files, &instructions, options.min_instructions_per_file);
        let removed = primitives::clean_stale_outputs(&root, &plan)?;
        if args.verbose {
            for path in &removed {
                println!("{} removed stale {}", "-".red(), path.display());
            }
        }
    }

    let report = primitives::compile_primitives(&collection, &root, &options, target, args.dry_run, args.no_constitution)?;
    if args.verbose {
        for path in &report.written {
            println!("{} {}", "wrote".cyan(), path.display());
        }
    }
    println!("{} compiled {} file(s) for target {:?}", "✓".green(), report.written.len(), target);

    if !args.dry_run {
        let sync_report = sync::sync(&root, &dependency_roots_as_packages(&dependency_roots), target)?;
        println!(
            "{} synchronized ({} removed, {} written)",
            "✓".green(),
            sync_report.removed.len(),
            sync_report.written.len()
        );
    }

    Ok(())
}

/// Reconstruct each locked dependency's install path the way C1 originally
/// computed it, since the lockfile stores the canonical reference's parts
/// rather than the derived path itself.
fn installed_packages(lockfile: &LockFile, project_root: &Path) -> Vec<(String, std::path::PathBuf)> {
    lockfile
        .dependencies
        .iter()
        .map(|dep| {
            let dep_ref = DependencyRef {
                host: dep.host.clone(),
                repo_path: dep.repo_url.split('/').map(str::to_string).collect(),
                reference: Some(dep.resolved_ref.clone()),
                alias: None,
                virtual_path: dep.virtual_path.clone(),
            };
            let install_path = dep_ref.install_path();
            (dep.repo_url.clone(), project_root.join(install_path))
        })
        .collect()
}

fn dependency_roots_as_packages(dependency_roots: &[(String, std::path::PathBuf)]) -> Vec<InstalledPackage> {
    dependency_roots
        .iter()
        .map(|(repo_identifier, root)| InstalledPackage { repo_identifier: repo_identifier.clone(), root: root.clone() })
        .collect()
}
