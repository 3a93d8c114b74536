//! APM - a dependency manager and build tool for AI-agent context artifacts.
//!
//! APM resolves Git-hosted collections of markdown instructions, prompts,
//! chat modes, agents, and skills into a project's `apm_modules/` tree, the
//! same way Cargo resolves crates, then compiles the installed primitives
//! into a distributed set of `AGENTS.md`/`CLAUDE.md` files and synchronizes
//! them into the tool-specific locations each target editor expects.
//!
//! # Core Modules
//!
//! - [`core`] - environment context, error taxonomy, and the
//!   `{success, warnings, errors, value}` result bundle
//! - [`reference`] - dependency reference parsing and host classification (C1)
//! - [`fetch`] - the Git/HTTP fetch driver (C2)
//! - [`manifest`] - `apm.yml` parsing
//! - [`lockfile`] - `apm.lock` parsing and atomic writes
//! - [`resolver`] - transitive dependency resolution (C3)
//! - [`markdown`] - frontmatter extraction shared by C4
//! - [`primitives`] - primitive discovery, conflict resolution, and placement (C4)
//! - [`sync`] - integration synchronization (C5)
//! - [`config`] - global configuration (`~/.apm/config.yml`)
//! - [`cli`] - command-line entry points
//! - [`utils`] - cross-cutting helpers: atomic writes, hashing, URL sanitization

pub mod cli;
pub mod config;
pub mod core;
pub mod fetch;
pub mod lockfile;
pub mod manifest;
pub mod markdown;
pub mod primitives;
pub mod reference;
pub mod resolver;
pub mod sync;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
