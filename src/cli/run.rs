//! `apm run <name>`: execute a shell command declared in `apm.yml`'s
//! `scripts` table.
//!
//! Shells out the same way C2's `GitFetchDriver::run_git` does — piped
//! stdout/stderr and an explicit working directory — except here the
//! command is user-declared rather than `git`, so stdout/stderr are
//! inherited straight through to the terminal instead of being captured.

use crate::manifest::{self, Manifest};
use anyhow::{anyhow, Result};
use clap::Args;
use std::path::Path;
use std::process::Command;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Name of an entry in `apm.yml`'s `scripts` table.
    script: String,
}

pub fn execute(args: RunArgs, project_root: &Path) -> Result<()> {
    let manifest_path = manifest::find_manifest_from(project_root)?;
    let root = manifest_path.parent().unwrap_or(project_root).to_path_buf();
    let manifest = Manifest::load(&manifest_path)?;

    let command = manifest.scripts.get(&args.script).ok_or_else(|| {
        anyhow!("no script named `{}` in {}", args.script, manifest::MANIFEST_FILE_NAME)
    })?;

    let status = shell_command(command).current_dir(&root).status()?;
    if !status.success() {
        return Err(anyhow!("script `{}` exited with {status}", args.script));
    }
    Ok(())
}

#[cfg(unix)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell_command(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}
