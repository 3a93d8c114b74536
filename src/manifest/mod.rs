//! Manifest (`apm.yml`) parsing and scaffolding.
//!
//! Mirrors the teacher's separation between the manifest data structure and
//! discovery helpers (`manifest/helpers.rs` there walks up the directory tree
//! looking for `agpm.toml`; `find_manifest` here does the same for `apm.yml`),
//! adapted to this crate's YAML manifest and flatter dependency model (no
//! named sources table, no version-constraint solving).

pub mod helpers;

pub use helpers::find_manifest;

use crate::core::ApmError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const MANIFEST_FILE_NAME: &str = "apm.yml";

/// `target` field: which editor(s) a package's primitives are written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Vscode,
    Claude,
    All,
    Minimal,
}

/// `type` field: the dominant primitive kind a package provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageType {
    Instructions,
    Skill,
    Hybrid,
    Prompts,
}

/// `dependencies` table: the declared-dependency list plus the opaque MCP
/// passthrough (never interpreted by the core, per the spec's Non-goals).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default)]
    pub apm: Vec<String>,
    #[serde(default)]
    pub mcp: Vec<serde_yaml::Value>,
}

/// Projection of `apm.yml`'s `compilation` table (C4's placement algorithm
/// inputs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    Distributed,
    SingleFile,
}

impl Default for PlacementStrategy {
    fn default() -> Self {
        PlacementStrategy::Distributed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompilationOptions {
    #[serde(default)]
    pub strategy: PlacementStrategy,
    #[serde(default = "default_true")]
    pub resolve_links: bool,
    #[serde(default = "default_min_instructions")]
    pub min_instructions_per_file: usize,
    #[serde(default)]
    pub source_attribution: bool,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub output: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_min_instructions() -> usize {
    1
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self {
            strategy: PlacementStrategy::Distributed,
            resolve_links: true,
            min_instructions_per_file: 1,
            source_attribution: false,
            exclude: Vec::new(),
            output: None,
        }
    }
}

/// The raw, possibly-incomplete form of `apm.yml` as deserialized by serde,
/// before the fatal-field check in [`Manifest::from_str`] is applied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawManifest {
    name: Option<String>,
    version: Option<serde_yaml::Value>,
    description: Option<String>,
    author: Option<String>,
    license: Option<String>,
    target: Option<Target>,
    #[serde(rename = "type")]
    package_type: Option<PackageType>,
    #[serde(default)]
    dependencies: Dependencies,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default)]
    compilation: CompilationOptions,
}

/// Top-level `apm.yml` keys `RawManifest` actually deserializes. Anything
/// else is ignored with a warning rather than rejected.
const KNOWN_MANIFEST_KEYS: &[&str] = &[
    "name",
    "version",
    "description",
    "author",
    "license",
    "target",
    "type",
    "dependencies",
    "scripts",
    "compilation",
];

/// Parsed contents of a package's `apm.yml`. Missing `name` or `version` is
/// fatal for that package, per the data model.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub license: Option<String>,
    pub target: Option<Target>,
    pub package_type: Option<PackageType>,
    pub dependencies: Dependencies,
    pub scripts: BTreeMap<String, String>,
    pub compilation: CompilationOptions,
    /// Set when `version` was a bare YAML number coerced to a string.
    pub version_coercion_warning: Option<String>,
    /// Every non-fatal warning raised while parsing this manifest (unknown
    /// keys, the version coercion above), already logged via `tracing::warn!`
    /// at parse time and repeated here for callers that want to surface them
    /// directly (e.g. `apm init`/`apm install` echoing them to the user).
    pub warnings: Vec<String>,
}

/// Top-level keys present in `content` but absent from [`KNOWN_MANIFEST_KEYS`].
/// Non-mapping documents (or documents `serde_yaml` itself already rejected
/// above) yield no unknown keys here; that failure already surfaced as a
/// fatal `YamlError`.
fn unknown_keys(content: &str) -> Vec<String> {
    let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(content) else {
        return Vec::new();
    };
    map.keys()
        .filter_map(|k| k.as_str())
        .filter(|k| !KNOWN_MANIFEST_KEYS.contains(k))
        .map(str::to_string)
        .collect()
}

impl Manifest {
    /// Parse `apm.yml` contents. A numeric `version` scalar (e.g. `version: 1.0`)
    /// is coerced to its string form with a warning rather than rejected, since
    /// YAML happily parses `1.0` as a float. Unknown top-level keys are ignored
    /// with a warning rather than rejected, so an `apm.yml` written against a
    /// newer schema version still loads.
    pub fn from_str(content: &str, package: &str) -> Result<Self, ApmError> {
        let raw: RawManifest = serde_yaml::from_str(content).map_err(|e| ApmError::YamlError {
            file: package.to_string(),
            source: e,
        })?;

        let mut warnings = Vec::new();
        for key in unknown_keys(content) {
            let warning = format!("unknown key `{key}` in {package} ignored");
            tracing::warn!("{}", warning);
            warnings.push(warning);
        }

        let name = raw.name.ok_or_else(|| ApmError::ManifestMissingField {
            package: package.to_string(),
            field: "name".to_string(),
        })?;

        let (version, version_coercion_warning) = match raw.version {
            Some(serde_yaml::Value::String(s)) => (s, None),
            Some(value @ serde_yaml::Value::Number(_)) => {
                let coerced = value.as_f64().map(|f| f.to_string()).unwrap_or_else(|| format!("{value:?}"));
                (
                    coerced.clone(),
                    Some(format!(
                        "version `{coerced}` was a numeric YAML scalar, coerced to a string"
                    )),
                )
            }
            Some(other) => {
                return Err(ApmError::ManifestMissingField {
                    package: package.to_string(),
                    field: format!("version (unexpected value {other:?})"),
                });
            }
            None => {
                return Err(ApmError::ManifestMissingField {
                    package: package.to_string(),
                    field: "version".to_string(),
                });
            }
        };

        if let Some(warning) = &version_coercion_warning {
            tracing::warn!("{} in {}", warning, package);
            warnings.push(warning.clone());
        }

        Ok(Manifest {
            name,
            version,
            description: raw.description,
            author: raw.author,
            license: raw.license,
            target: raw.target,
            package_type: raw.package_type,
            dependencies: raw.dependencies,
            scripts: raw.scripts,
            compilation: raw.compilation,
            version_coercion_warning,
            warnings,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ApmError> {
        let content = std::fs::read_to_string(path).map_err(|e| ApmError::IoError {
            operation: "reading manifest".to_string(),
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content, &path.display().to_string())
    }

    /// Emit a minimal manifest for `apm init`: name from the project
    /// directory, version `1.0.0`, no dependencies.
    pub fn scaffold(name: &str) -> Self {
        Manifest {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            description: None,
            author: None,
            license: None,
            target: None,
            package_type: None,
            dependencies: Dependencies::default(),
            scripts: BTreeMap::new(),
            compilation: CompilationOptions::default(),
            version_coercion_warning: None,
            warnings: Vec::new(),
        }
    }

    /// Bootstrap a minimal manifest whose sole dependency is `package_ref`,
    /// per the resolver's bootstrapping rule (§4.3).
    pub fn bootstrap_with_dependency(project_name: &str, package_ref: &str) -> Self {
        let mut manifest = Self::scaffold(project_name);
        manifest.dependencies.apm.push(package_ref.to_string());
        manifest
    }

    pub fn to_yaml(&self) -> Result<String> {
        let raw = RawManifest {
            name: Some(self.name.clone()),
            version: Some(serde_yaml::Value::String(self.version.clone())),
            description: self.description.clone(),
            author: self.author.clone(),
            license: self.license.clone(),
            target: self.target,
            package_type: self.package_type,
            dependencies: self.dependencies.clone(),
            scripts: self.scripts.clone(),
            compilation: self.compilation.clone(),
        };
        serde_yaml::to_string(&raw).context("serializing manifest to YAML")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_manifest() {
        let yaml = "name: my-pkg\nversion: \"1.0.0\"\n";
        let manifest = Manifest::from_str(yaml, "apm.yml").unwrap();
        assert_eq!(manifest.name, "my-pkg");
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.version_coercion_warning.is_none());
    }

    #[test]
    fn missing_name_is_fatal() {
        let yaml = "version: \"1.0.0\"\n";
        let err = Manifest::from_str(yaml, "apm.yml").unwrap_err();
        assert!(matches!(err, ApmError::ManifestMissingField { field, .. } if field == "name"));
    }

    #[test]
    fn missing_version_is_fatal() {
        let yaml = "name: my-pkg\n";
        let err = Manifest::from_str(yaml, "apm.yml").unwrap_err();
        assert!(matches!(err, ApmError::ManifestMissingField { field, .. } if field == "version"));
    }

    #[test]
    fn numeric_version_is_coerced_with_warning() {
        let yaml = "name: my-pkg\nversion: 1.0\n";
        let manifest = Manifest::from_str(yaml, "apm.yml").unwrap();
        assert_eq!(manifest.version, "1");
        assert!(manifest.version_coercion_warning.is_some());
    }

    #[test]
    fn scaffold_produces_minimal_manifest() {
        let manifest = Manifest::scaffold("my-project");
        assert_eq!(manifest.name, "my-project");
        assert_eq!(manifest.version, "1.0.0");
        assert!(manifest.dependencies.apm.is_empty());
    }

    #[test]
    fn bootstrap_adds_sole_dependency() {
        let manifest = Manifest::bootstrap_with_dependency("my-project", "owner/repo");
        assert_eq!(manifest.dependencies.apm, vec!["owner/repo".to_string()]);
    }

    #[test]
    fn unknown_top_level_key_is_ignored_with_warning() {
        let yaml = "name: my-pkg\nversion: \"1.0.0\"\nhomepage: https://example.com\n";
        let manifest = Manifest::from_str(yaml, "apm.yml").unwrap();
        assert_eq!(manifest.warnings.len(), 1);
        assert!(manifest.warnings[0].contains("homepage"));
    }

    #[test]
    fn mcp_dependencies_are_opaque() {
        let yaml = "name: my-pkg\nversion: \"1.0.0\"\ndependencies:\n  mcp:\n    - name: server\n      extra: 1\n";
        let manifest = Manifest::from_str(yaml, "apm.yml").unwrap();
        assert_eq!(manifest.dependencies.mcp.len(), 1);
    }
}
