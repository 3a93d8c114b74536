//! Explicit environment context.
//!
//! Per the design note on global mutable state removal, process-wide current
//! directory and environment variable reads are folded into this struct and
//! threaded through the pipeline rather than read ad hoc. Only the reference
//! resolver (C1, for the default host) and the fetch driver (C2, for tokens)
//! consult it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Injectable environment-variable and filesystem-root context.
///
/// Production code builds this once from `std::env` at startup
/// ([`Environment::from_process`]); tests build it with fixed values so
/// parsing and token-selection logic never depends on the ambient process
/// environment.
#[derive(Debug, Clone)]
pub struct Environment {
    /// The project root directory (where `apm.yml` lives).
    pub project_root: PathBuf,
    vars: HashMap<String, String>,
}

const DEFAULT_HOST: &str = "github.com";

impl Environment {
    /// Build from a fixed variable map, useful in tests.
    pub fn new(project_root: impl Into<PathBuf>, vars: HashMap<String, String>) -> Self {
        Self {
            project_root: project_root.into(),
            vars,
        }
    }

    /// Build from the real process environment.
    pub fn from_process(project_root: impl Into<PathBuf>) -> Self {
        let mut vars = HashMap::new();
        for key in [
            "GITHUB_HOST",
            "GITHUB_APM_PAT",
            "GITHUB_TOKEN",
            "ADO_APM_PAT",
            "APM_DEBUG",
        ] {
            if let Ok(value) = std::env::var(key) {
                vars.insert(key.to_string(), value);
            }
        }
        Self::new(project_root, vars)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// The default host used when a reference string carries none.
    pub fn default_host(&self) -> &str {
        self.get("GITHUB_HOST").unwrap_or(DEFAULT_HOST)
    }

    /// Whether the explicit hostname in `GITHUB_HOST` was set (used by the
    /// supported-host predicate to allow exactly that one extra hostname).
    pub fn github_host_override(&self) -> Option<&str> {
        self.get("GITHUB_HOST")
    }

    pub fn debug_enabled(&self) -> bool {
        matches!(self.get("APM_DEBUG"), Some(v) if v == "1" || v.eq_ignore_ascii_case("true"))
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_falls_back() {
        let env = Environment::new("/tmp/proj", HashMap::new());
        assert_eq!(env.default_host(), "github.com");
    }

    #[test]
    fn default_host_honors_override() {
        let mut vars = HashMap::new();
        vars.insert("GITHUB_HOST".to_string(), "git.internal.example".to_string());
        let env = Environment::new("/tmp/proj", vars);
        assert_eq!(env.default_host(), "git.internal.example");
        assert_eq!(env.github_host_override(), Some("git.internal.example"));
    }

    #[test]
    fn debug_flag_parses_truthy_values() {
        let mut vars = HashMap::new();
        vars.insert("APM_DEBUG".to_string(), "true".to_string());
        let env = Environment::new("/tmp/proj", vars);
        assert!(env.debug_enabled());
    }
}
