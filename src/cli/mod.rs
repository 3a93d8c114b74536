//! Command-line surface.
//!
//! Five top-level commands, matching the external interface one-to-one:
//! `init`, `install`, `compile`, `deps` (with `list`/`tree`/`verify`/
//! `uninstall` subcommands), and `run`. Mirrors the teacher's `Cli`/
//! `Commands`/`execute_with_config` split in `cli/mod.rs`, scaled down from
//! its twelve subcommands to these five and without the teacher's
//! update-check background task.

pub mod compile;
pub mod deps;
pub mod init;
pub mod install;
pub mod run;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Logging and display configuration derived from the global flags, applied
/// by `main` before dispatch.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub log_level: Option<String>,
}

/// APM: a dependency manager and build tool for AI-agent context artifacts.
#[derive(Parser, Debug)]
#[command(name = "apm", version, about, long_about = None)]
pub struct Cli {
    /// Enable debug-level logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all logging regardless of RUST_LOG.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the project root (defaults to the current directory).
    #[arg(long, global = true, value_name = "DIR")]
    pub project_root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new `apm.yml` manifest.
    Init(init::InitArgs),
    /// Resolve and fetch dependencies, writing `apm.lock`.
    Install(install::InstallArgs),
    /// Run the primitive engine and integration synchronizer.
    Compile(compile::CompileArgs),
    /// Inspect or modify installed dependencies.
    Deps(deps::DepsArgs),
    /// Run a script declared in `apm.yml`'s `scripts` table.
    Run(run::RunArgs),
}

impl Cli {
    /// Derive the logging configuration from the global flags, following the
    /// same precedence as the teacher's `build_config`: an explicit
    /// `RUST_LOG` always wins, `--verbose` asks for debug absent that, and
    /// `--quiet` suppresses logging unless `RUST_LOG` overrides it.
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.quiet {
            None
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            Some("info".to_string())
        };
        CliConfig { log_level }
    }

    fn project_root(&self) -> Result<PathBuf> {
        match &self.project_root {
            Some(path) => Ok(path.clone()),
            None => Ok(std::env::current_dir()?),
        }
    }

    pub async fn execute(self) -> Result<()> {
        let project_root = self.project_root()?;
        match self.command {
            Commands::Init(args) => init::execute(args, &project_root),
            Commands::Install(args) => install::execute(args, &project_root).await,
            Commands::Compile(args) => compile::execute(args, &project_root),
            Commands::Deps(args) => deps::execute(args, &project_root).await,
            Commands::Run(args) => run::execute(args, &project_root),
        }
    }
}
