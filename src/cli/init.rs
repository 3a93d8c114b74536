//! `apm init`: scaffold a new `apm.yml` in the project root.
//!
//! Mirrors the teacher's `InitCommand`: refuse to overwrite an existing
//! manifest unless `--force`, create the target directory if missing. The
//! teacher also seeds `.gitignore` at init time; here that's left to
//! `apm compile`, which calls [`crate::sync::sync`] and keeps the managed
//! section current on every run rather than only at project creation.

use crate::manifest::{Manifest, MANIFEST_FILE_NAME};
use anyhow::{anyhow, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Directory to create the manifest in (defaults to the project root).
    #[arg(long)]
    path: Option<PathBuf>,

    /// Overwrite an existing manifest.
    #[arg(short, long)]
    force: bool,
}

pub fn execute(args: InitArgs, project_root: &Path) -> Result<()> {
    let target_dir = args.path.unwrap_or_else(|| project_root.to_path_buf());
    let manifest_path = target_dir.join(MANIFEST_FILE_NAME);

    if manifest_path.exists() && !args.force {
        return Err(anyhow!(
            "manifest already exists at {}; use --force to overwrite",
            manifest_path.display()
        ));
    }

    if !target_dir.exists() {
        std::fs::create_dir_all(&target_dir)?;
    }

    let name = target_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());
    let manifest = Manifest::scaffold(&name);
    std::fs::write(&manifest_path, manifest.to_yaml()?)?;

    println!("{} wrote {}", "✓".green(), manifest_path.display());
    println!("\nNext: add a dependency to {} under dependencies.apm, then run `apm install`.", MANIFEST_FILE_NAME);

    Ok(())
}
