//! `~/.apm/config.yml`: per-host token overrides and a default source alias.
//!
//! Adapts the teacher's `~/.agpm/config.toml` (a `[sources]` table of
//! authenticated URLs) to this crate's simpler contract: a flat `tokens` map
//! from host to token, consulted by C2 only as a fallback beneath
//! environment variables, and a `default_host` override equivalent to
//! `GITHUB_HOST`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Parsed `~/.apm/config.yml`. Manifest (`apm.yml`) values always win over
/// this file, per §3's "merged underneath" rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(default)]
    pub default_host: Option<String>,
}

impl GlobalConfig {
    /// Platform-conventional path to the global config file.
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("unable to determine home directory"))?;
        Ok(home.join(".apm").join("config.yml"))
    }

    /// Load from `path`, or an empty config if the file doesn't exist. Never
    /// hard-fails on a missing file, since most projects never create one.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading global config {}", path.display()))?;
        serde_yaml::from_str(&content).with_context(|| format!("parsing global config {}", path.display()))
    }

    /// Token for `host`, if configured. Environment-variable sources
    /// (`GITHUB_APM_PAT`, `ADO_APM_PAT`, `GITHUB_TOKEN`) are consulted first
    /// by C2; this is the last resort beneath all of those.
    pub fn token_for(&self, host: &str) -> Option<&str> {
        self.tokens.get(host).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_as_empty() {
        let dir = tempdir().unwrap();
        let config = GlobalConfig::load(&dir.path().join("config.yml")).unwrap();
        assert!(config.tokens.is_empty());
        assert!(config.default_host.is_none());
    }

    #[test]
    fn parses_tokens_and_default_host() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yml");
        std::fs::write(&path, "tokens:\n  github.com: ghp_abc\ndefault_host: acme.ghe.com\n").unwrap();
        let config = GlobalConfig::load(&path).unwrap();
        assert_eq!(config.token_for("github.com"), Some("ghp_abc"));
        assert_eq!(config.default_host.as_deref(), Some("acme.ghe.com"));
    }
}
