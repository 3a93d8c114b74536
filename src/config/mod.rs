//! Global configuration (`~/.apm/config.yml`).
//!
//! Mirrors the teacher's global config file (there, `~/.agpm/config.toml`;
//! here, YAML). Per the design note, this file is read-only from the core's
//! perspective — writing it is `apm config`'s job, external to this crate's
//! scope. This crate clones directly into each dependency's `apm_modules/`
//! destination rather than through an intermediate object cache, so unlike
//! the teacher there is no cache-directory concept to configure here.

mod global;

pub use global::GlobalConfig;
