//! Dependency reference grammar and host resolution (C1).
//!
//! Parses a dependency string — short (`owner/repo`), virtual
//! (`owner/repo/prompts/review.prompt.md`), or fully-qualified
//! (`dev.azure.com/org/proj/_git/repo#v1.0.0`) — into a canonical
//! [`DependencyRef`], with no I/O performed anywhere in this module.

pub mod host;

use crate::core::{ApmError, Environment};
use host::{HostFamily, classify_host};
use std::path::PathBuf;

/// The four file extensions that mark a `virtual_path` as a single-file
/// reference rather than a sub-directory package.
const TYPED_EXTENSIONS: &[&str] =
    &[".prompt.md", ".instructions.md", ".chatmode.md", ".agent.md"];

/// What a non-empty `virtual_path` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualKind {
    /// A single typed markdown file.
    File,
    /// A manifest listing individual files (path contains `collections/`).
    Collection,
    /// A directory within the repository, installed recursively.
    SubDirectory,
}

/// The canonical, normalized form of a declared dependency.
///
/// Equality and hashing are defined over `(host, repo_path, virtual_path)`
/// only — `reference` and `alias` do not participate, since two strings
/// naming the same artifact at different refs are still the same package
/// for conflict-resolution purposes (first-wins applies to the *reference*,
/// not the key).
#[derive(Debug, Clone)]
pub struct DependencyRef {
    pub host: String,
    pub repo_path: Vec<String>,
    pub reference: Option<String>,
    pub alias: Option<String>,
    pub virtual_path: Option<String>,
}

impl PartialEq for DependencyRef {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.repo_path == other.repo_path
            && self.virtual_path == other.virtual_path
    }
}
impl Eq for DependencyRef {}

impl std::hash::Hash for DependencyRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.host.hash(state);
        self.repo_path.hash(state);
        self.virtual_path.hash(state);
    }
}

const DEFAULT_HOST: &str = "github.com";
const PATH_COMPONENT_RE: &str = r"^[A-Za-z0-9._-]+$";

fn valid_path_component(s: &str) -> bool {
    use std::sync::OnceLock;
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| regex::Regex::new(PATH_COMPONENT_RE).expect("valid regex")).is_match(s)
}

impl DependencyRef {
    /// Parse a dependency string, left to right: trailing `@alias`, then
    /// trailing `#ref`, then the repository locator itself.
    pub fn parse(input: &str, env: &Environment) -> Result<Self, ApmError> {
        let (without_alias, alias) = split_alias(input);
        let (locator, reference) = split_ref(without_alias);

        let (host, path_str) = split_host_and_path(locator, env)?;
        let family = classify_host(&host, env)?;

        let mut segments: Vec<String> =
            path_str.split('/').filter(|s| !s.is_empty() && *s != "_git").map(str::to_string).collect();

        let required = family.repo_path_len();
        if segments.len() < required {
            return Err(ApmError::InvalidReference {
                reference: input.to_string(),
                reason: format!(
                    "expected at least {required} path component(s) for host '{host}', found {}",
                    segments.len()
                ),
            });
        }

        let virtual_segments: Vec<String> = segments.split_off(required);
        let repo_path = segments;

        for component in &repo_path {
            if !valid_path_component(component) {
                return Err(ApmError::InvalidReference {
                    reference: input.to_string(),
                    reason: format!("invalid path component '{component}'"),
                });
            }
        }

        let virtual_path = if virtual_segments.is_empty() {
            None
        } else {
            Some(virtual_segments.join("/"))
        };

        // Validate the virtual path shape eagerly so a malformed reference
        // fails at parse time rather than later during fetch.
        if let Some(vp) = &virtual_path {
            classify_virtual_path(vp).map_err(|_| ApmError::InvalidVirtualExtension {
                virtual_path: vp.clone(),
            })?;
        }

        Ok(Self {
            host,
            repo_path,
            reference,
            alias,
            virtual_path,
        })
    }

    pub fn is_virtual(&self) -> bool {
        self.virtual_path.is_some()
    }

    pub fn is_azure_devops(&self) -> bool {
        self.host == "dev.azure.com" || self.host.ends_with(".visualstudio.com")
    }

    pub fn host_family(&self, env: &Environment) -> Result<HostFamily, ApmError> {
        classify_host(&self.host, env)
    }

    /// Classify the kind of thing `virtual_path` names, or `None` for a
    /// whole-repository dependency.
    pub fn virtual_kind(&self) -> Option<VirtualKind> {
        self.virtual_path.as_deref().and_then(|vp| classify_virtual_path(vp).ok())
    }

    /// The canonical string form: `host/repo_path[/virtual_path][#ref][@alias]`,
    /// omitting the leading `host/` when it equals the compile-time default
    /// host (`github.com`). Host omission does not consult `GITHUB_HOST`, so
    /// the round trip `parse(d.to_canonical_string())` holds whenever no
    /// override is in effect — the case the invariant is stated for.
    pub fn to_canonical_string(&self) -> String {
        let mut out = String::new();
        if self.host != DEFAULT_HOST {
            out.push_str(&self.host);
            out.push('/');
        }
        out.push_str(&self.repo_path.join("/"));
        if let Some(vp) = &self.virtual_path {
            out.push('/');
            out.push_str(vp);
        }
        if let Some(r) = &self.reference {
            out.push('#');
            out.push_str(r);
        }
        if let Some(a) = &self.alias {
            out.push('@');
            out.push_str(a);
        }
        out
    }

    /// The canonical key: the install path relative to `apm_modules/`.
    ///
    /// Whole-repository packages nest under `repo_path` verbatim. File and
    /// collection packages collapse onto a single leaf directory named
    /// `{repo}-{stem}` (stem = virtual filename with its typed extension
    /// stripped). Sub-directory packages append `virtual_path` verbatim.
    pub fn install_path(&self) -> PathBuf {
        let mut components = self.repo_path.clone();
        let repo_name = components.pop().expect("repo_path has at least one component");

        match (&self.virtual_path, self.virtual_kind()) {
            (Some(vp), Some(VirtualKind::File | VirtualKind::Collection)) => {
                let file_name = vp.rsplit('/').next().unwrap_or(vp);
                let stem = strip_typed_extension(file_name).unwrap_or(file_name);
                components.push(format!("{repo_name}-{stem}"));
            }
            (Some(vp), Some(VirtualKind::SubDirectory)) => {
                components.push(repo_name);
                for seg in vp.split('/') {
                    components.push(seg.to_string());
                }
            }
            _ => {
                components.push(repo_name);
            }
        }

        let mut path = PathBuf::from("apm_modules");
        for c in components {
            path.push(c);
        }
        path
    }
}

fn strip_typed_extension(file_name: &str) -> Option<&str> {
    TYPED_EXTENSIONS.iter().find_map(|ext| file_name.strip_suffix(ext))
}

/// Classify a non-empty virtual path per §4.1's validation rule.
fn classify_virtual_path(virtual_path: &str) -> Result<VirtualKind, ()> {
    if virtual_path.split('/').any(|seg| seg == "collections") {
        return Ok(VirtualKind::Collection);
    }
    let final_segment = virtual_path.rsplit('/').next().unwrap_or(virtual_path);
    if TYPED_EXTENSIONS.iter().any(|ext| final_segment.ends_with(ext)) {
        return Ok(VirtualKind::File);
    }
    if final_segment.contains('.') {
        return Err(());
    }
    Ok(VirtualKind::SubDirectory)
}

/// Split a trailing `@alias`, being careful not to consume the `@` in a
/// leading `git@host:` SSH prefix.
fn split_alias(input: &str) -> (&str, Option<String>) {
    let search_start = if input.starts_with("git@") {
        input.find(':').map(|i| i + 1).unwrap_or(0)
    } else {
        0
    };

    match input[search_start..].rfind('@') {
        Some(rel_pos) => {
            let pos = search_start + rel_pos;
            (&input[..pos], Some(input[pos + 1..].to_string()))
        }
        None => (input, None),
    }
}

/// Split a trailing `#ref`.
fn split_ref(input: &str) -> (&str, Option<String>) {
    match input.rfind('#') {
        Some(pos) => (&input[..pos], Some(input[pos + 1..].to_string())),
        None => (input, None),
    }
}

/// Determine `(host, path)` from a repository locator, per the four-step
/// recognition order in §4.1.
fn split_host_and_path(locator: &str, env: &Environment) -> Result<(String, String), ApmError> {
    use std::sync::OnceLock;
    static SSH_RE: OnceLock<regex::Regex> = OnceLock::new();
    let ssh_re =
        SSH_RE.get_or_init(|| regex::Regex::new(r"^git@([^:]+):(.+)$").expect("valid regex"));

    if let Some(caps) = ssh_re.captures(locator) {
        let host = caps[1].to_string();
        let path = caps[2].strip_suffix(".git").unwrap_or(&caps[2]).to_string();
        return Ok((host, path));
    }

    if let Some(rest) = locator.strip_prefix("https://").or_else(|| locator.strip_prefix("http://")) {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let path = path.strip_suffix(".git").unwrap_or(path);
        return Ok((authority.to_string(), path.to_string()));
    }

    let first_segment = locator.split('/').next().unwrap_or("");
    if first_segment.contains('.') {
        // Validate eagerly: an unsupported "hostname-shaped" first segment
        // is a hard parse failure, not a bare owner/repo with a dotted name.
        classify_host(first_segment, env)?;
        let rest = locator.strip_prefix(first_segment).unwrap_or("").trim_start_matches('/');
        return Ok((first_segment.to_string(), rest.to_string()));
    }

    Ok((env.default_host().to_string(), locator.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env() -> Environment {
        Environment::new("/tmp/proj", HashMap::new())
    }

    #[test]
    fn s1_bare_owner_repo() {
        let r = DependencyRef::parse("owner/repo", &env()).unwrap();
        assert_eq!(r.host, "github.com");
        assert_eq!(r.repo_path, vec!["owner", "repo"]);
        assert_eq!(r.reference, None);
        assert!(!r.is_virtual());
    }

    #[test]
    fn s2_azure_devops_with_git_segment_and_ref() {
        let r = DependencyRef::parse("dev.azure.com/org/proj/_git/repo#v1.0.0", &env()).unwrap();
        assert_eq!(r.host, "dev.azure.com");
        assert_eq!(r.repo_path, vec!["org", "proj", "repo"]);
        assert_eq!(r.reference, Some("v1.0.0".to_string()));
        assert!(r.is_azure_devops());
    }

    #[test]
    fn s3_single_file_virtual_package() {
        let r = DependencyRef::parse("owner/repo/prompts/review.prompt.md", &env()).unwrap();
        assert_eq!(r.virtual_path.as_deref(), Some("prompts/review.prompt.md"));
        assert!(r.is_virtual());
        assert_eq!(r.install_path(), PathBuf::from("apm_modules/owner/repo-review"));
    }

    #[test]
    fn s4_invalid_virtual_extension() {
        let err = DependencyRef::parse("owner/repo/some/path.txt", &env()).unwrap_err();
        assert!(matches!(err, ApmError::InvalidVirtualExtension { .. }));
    }

    #[test]
    fn subdirectory_package_has_no_typed_extension() {
        let r = DependencyRef::parse("owner/repo/skills/reviewer", &env()).unwrap();
        assert_eq!(r.virtual_kind(), Some(VirtualKind::SubDirectory));
        assert_eq!(r.install_path(), PathBuf::from("apm_modules/owner/repo/skills/reviewer"));
    }

    #[test]
    fn collection_path_is_detected() {
        let r = DependencyRef::parse("owner/repo/collections/team.yml", &env()).unwrap();
        assert_eq!(r.virtual_kind(), Some(VirtualKind::Collection));
    }

    #[test]
    fn ssh_locator_with_alias_and_ref() {
        let r = DependencyRef::parse("git@github.com:owner/repo.git#main@short", &env()).unwrap();
        assert_eq!(r.host, "github.com");
        assert_eq!(r.repo_path, vec!["owner", "repo"]);
        assert_eq!(r.reference, Some("main".to_string()));
        assert_eq!(r.alias, Some("short".to_string()));
    }

    #[test]
    fn property_parse_of_canonical_string_round_trips() {
        let cases = [
            "owner/repo",
            "owner/repo#v1.2.3",
            "owner/repo/prompts/review.prompt.md#main",
            "acme.ghe.com/team/project",
            "dev.azure.com/org/proj/repo#v1.0.0",
        ];
        for case in cases {
            let parsed = DependencyRef::parse(case, &env()).unwrap();
            let canonical = parsed.to_canonical_string();
            let reparsed = DependencyRef::parse(&canonical, &env()).unwrap();
            assert_eq!(parsed, reparsed, "round trip failed for {case}");
            assert_eq!(parsed.reference, reparsed.reference);
        }
    }

    #[test]
    fn equality_ignores_reference_and_alias() {
        let a = DependencyRef::parse("owner/repo#v1.0.0", &env()).unwrap();
        let b = DependencyRef::parse("owner/repo#v2.0.0@my-alias", &env()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unsupported_host_rejected() {
        let err = DependencyRef::parse("gitlab.example.com/owner/repo", &env()).unwrap_err();
        assert!(matches!(err, ApmError::UnsupportedHost { .. }));
    }
}
