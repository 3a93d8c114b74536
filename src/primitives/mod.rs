//! Primitive discovery, conflict resolution, and target detection (C4).
//!
//! Discovery walks the project tree and each installed dependency's `.apm/`
//! subtree for markdown primitives, following the glob layout documented in
//! the teacher's `pattern.rs` (`glob::Pattern` over a `walkdir` traversal,
//! relative-path matching, symlinks never followed). Frontmatter parsing
//! delegates to [`crate::markdown::frontmatter`].
//!
//! The data model's four variants are Instruction, Chatmode/Agent (the two
//! extensions are declared equivalent), Context, and Skill. `.memory.md`
//! files are a distinct discovery glob but share the Context variant's
//! namespace and role (cross-reference targets, never emitted standalone).

pub mod compile;
pub mod placement;

pub use compile::{clean_stale_outputs, compile as compile_primitives, CompileReport};
pub use placement::PlacementPlan;

use crate::core::ApmError;
use crate::manifest::{Manifest, Target};
use crate::markdown::frontmatter;
use crate::utils::fs::is_skipped_dir;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// The kind of primitive a discovered file represents, per the data model's
/// four-variant `Primitive` record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveVariant {
    Instruction,
    ChatmodeAgent,
    Context,
    Skill,
}

/// A single discovered primitive: frontmatter plus body, tagged with where
/// it came from for conflict resolution.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub variant: PrimitiveVariant,
    pub name: String,
    pub file_path: PathBuf,
    pub body: String,
    pub metadata: HashMap<String, serde_yaml::Value>,
    /// `"local"` for project-root files, otherwise the dependency's
    /// canonical install path.
    pub source_tag: String,
}

impl Primitive {
    pub fn apply_to(&self) -> Option<&str> {
        self.metadata.get("applyTo").and_then(|v| v.as_str())
    }

    fn is_local(&self) -> bool {
        self.source_tag == "local"
    }
}

/// A conflict recorded when a later insert lost to an earlier one sharing
/// `(variant, name)`.
#[derive(Debug, Clone)]
pub struct PrimitiveConflict {
    pub name: String,
    pub variant: PrimitiveVariant,
    pub winning_source: String,
    pub losing_sources: Vec<String>,
    pub file_path: PathBuf,
}

/// The set of primitives surviving conflict resolution, plus a log of what
/// was rejected.
#[derive(Debug, Default)]
pub struct PrimitiveCollection {
    primitives: HashMap<(PrimitiveVariant, String), Primitive>,
    pub conflicts: Vec<PrimitiveConflict>,
}

impl PrimitiveCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `incoming`, applying the local-always-wins / first-inserted
    /// rule for dependency sources.
    pub fn insert(&mut self, incoming: Primitive) {
        let key = (incoming.variant, incoming.name.clone());

        match self.primitives.get(&key) {
            None => {
                self.primitives.insert(key, incoming);
            }
            Some(existing) if existing.is_local() => {
                self.conflicts.push(PrimitiveConflict {
                    name: incoming.name.clone(),
                    variant: incoming.variant,
                    winning_source: existing.source_tag.clone(),
                    losing_sources: vec![incoming.source_tag.clone()],
                    file_path: incoming.file_path.clone(),
                });
            }
            Some(existing) if incoming.is_local() => {
                let losing = vec![existing.source_tag.clone()];
                let winning = incoming.source_tag.clone();
                let file_path = existing.file_path.clone();
                self.primitives.insert(key.clone(), incoming);
                self.conflicts.push(PrimitiveConflict {
                    name: key.1,
                    variant: key.0,
                    winning_source: winning,
                    losing_sources: losing,
                    file_path,
                });
            }
            Some(existing) => {
                // Both are dependency sources: first-inserted (BFS order) wins.
                self.conflicts.push(PrimitiveConflict {
                    name: incoming.name.clone(),
                    variant: incoming.variant,
                    winning_source: existing.source_tag.clone(),
                    losing_sources: vec![incoming.source_tag.clone()],
                    file_path: incoming.file_path.clone(),
                });
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Primitive> {
        self.primitives.values()
    }

    pub fn len(&self) -> usize {
        self.primitives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primitives.is_empty()
    }

    pub fn of_variant(&self, variant: PrimitiveVariant) -> impl Iterator<Item = &Primitive> {
        self.primitives.values().filter(move |p| p.variant == variant)
    }
}

/// `(variant, typed suffix, glob pattern)` triples for the discovery walk.
/// The suffix is carried alongside the variant because `ChatmodeAgent` and
/// `Context` each cover two distinct extensions.
fn discovery_patterns(root_marker: &str) -> Vec<(PrimitiveVariant, &'static str, String)> {
    use PrimitiveVariant::{ChatmodeAgent, Context, Instruction};
    vec![
        (ChatmodeAgent, ".agent.md", format!("**/{root_marker}agents/*.agent.md")),
        (ChatmodeAgent, ".agent.md", "**/.github/agents/*.agent.md".to_string()),
        (ChatmodeAgent, ".agent.md", "**/*.agent.md".to_string()),
        (ChatmodeAgent, ".chatmode.md", format!("**/{root_marker}chatmodes/*.chatmode.md")),
        (ChatmodeAgent, ".chatmode.md", "**/.github/chatmodes/*.chatmode.md".to_string()),
        (ChatmodeAgent, ".chatmode.md", "**/*.chatmode.md".to_string()),
        (Instruction, ".instructions.md", format!("**/{root_marker}instructions/*.instructions.md")),
        (Instruction, ".instructions.md", "**/.github/instructions/*.instructions.md".to_string()),
        (Instruction, ".instructions.md", "**/*.instructions.md".to_string()),
        (Context, ".context.md", format!("**/{root_marker}context/*.context.md")),
        (Context, ".context.md", "**/.github/context/*.context.md".to_string()),
        (Context, ".context.md", "**/*.context.md".to_string()),
        (Context, ".memory.md", format!("**/{root_marker}memory/*.memory.md")),
        (Context, ".memory.md", "**/.github/memory/*.memory.md".to_string()),
        (Context, ".memory.md", "**/*.memory.md".to_string()),
    ]
}

/// Walk `root`, skipping [`is_skipped_dir`] directories, and parse every file
/// matching any of the local discovery globs plus a top-level `SKILL.md`.
pub fn discover_local(root: &Path) -> Vec<Primitive> {
    discover_with_patterns(root, &discovery_patterns(".apm/"), "local")
}

/// Walk `package_root`'s `.apm/` subtree (flat `agents/`, `chatmodes/`,
/// `instructions/`, `context/`, `memory/`) plus an optional package-root
/// `SKILL.md`, tagging every result with `source_tag`.
pub fn discover_dependency(package_root: &Path, source_tag: &str) -> Vec<Primitive> {
    use PrimitiveVariant::{ChatmodeAgent, Context, Instruction};
    let apm_dir = package_root.join(".apm");
    let dep_patterns = vec![
        (ChatmodeAgent, ".agent.md", "agents/*.agent.md".to_string()),
        (ChatmodeAgent, ".chatmode.md", "chatmodes/*.chatmode.md".to_string()),
        (Instruction, ".instructions.md", "instructions/*.instructions.md".to_string()),
        (Context, ".context.md", "context/*.context.md".to_string()),
        (Context, ".memory.md", "memory/*.memory.md".to_string()),
    ];

    let mut found = if apm_dir.is_dir() {
        discover_with_patterns(&apm_dir, &dep_patterns, source_tag)
    } else {
        Vec::new()
    };

    let skill_path = package_root.join("SKILL.md");
    if skill_path.is_file()
        && let Some(primitive) = parse_file(&skill_path, PrimitiveVariant::Skill, "SKILL.md", source_tag)
    {
        found.push(primitive);
    }

    found
}

fn discover_with_patterns(
    base: &Path,
    patterns: &[(PrimitiveVariant, &'static str, String)],
    source_tag: &str,
) -> Vec<Primitive> {
    let Ok(base) = base.canonicalize() else {
        return Vec::new();
    };

    let compiled: Vec<(PrimitiveVariant, &'static str, glob::Pattern)> = patterns
        .iter()
        .filter_map(|(variant, suffix, pat)| glob::Pattern::new(pat).ok().map(|p| (*variant, *suffix, p)))
        .collect();

    let mut found = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for entry in WalkDir::new(&base)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.path().file_name().map(|n| !is_skipped_dir(&n.to_string_lossy())).unwrap_or(true))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(&base) else {
            continue;
        };
        let relative_str = relative.to_string_lossy();

        for (variant, suffix, pattern) in &compiled {
            if pattern.matches(&relative_str) && seen.insert(path.to_path_buf()) {
                if let Some(primitive) = parse_file(path, *variant, suffix, source_tag) {
                    found.push(primitive);
                }
                break;
            }
        }
    }

    let skill_path = base.join("SKILL.md");
    if skill_path.is_file()
        && seen.insert(skill_path.clone())
        && let Some(primitive) = parse_file(&skill_path, PrimitiveVariant::Skill, "SKILL.md", source_tag)
    {
        found.push(primitive);
    }

    found
}

fn parse_file(path: &Path, variant: PrimitiveVariant, suffix: &str, source_tag: &str) -> Option<Primitive> {
    let content = std::fs::read_to_string(path).ok()?;
    let parsed = frontmatter::parse(&content);

    if let Some(reason) = &parsed.warning {
        let err = ApmError::FrontmatterMalformed {
            path: path.display().to_string(),
            reason: reason.clone(),
        };
        tracing::warn!("{}", err);
    }

    let name = parsed.get_str("name").map(str::to_string).unwrap_or_else(|| file_stem_name(path, suffix));

    Some(Primitive {
        variant,
        name,
        file_path: path.to_path_buf(),
        body: parsed.body,
        metadata: parsed.metadata,
        source_tag: source_tag.to_string(),
    })
}

fn file_stem_name(path: &Path, suffix: &str) -> String {
    let file_name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    file_name.strip_suffix(suffix).map(str::to_string).unwrap_or(file_name)
}

/// Choose `vscode`, `claude`, `all`, or `minimal` by explicit override,
/// manifest field, then directory presence (§4.4's precedence order).
pub fn detect_target(explicit: Option<Target>, manifest: &Manifest, root: &Path) -> Target {
    if let Some(target) = explicit {
        return target;
    }
    if let Some(target) = manifest.target {
        return target;
    }

    let has_github = root.join(".github").is_dir();
    let has_claude = root.join(".claude").is_dir();

    match (has_github, has_claude) {
        (true, true) => Target::All,
        (true, false) => Target::Vscode,
        (false, true) => Target::Claude,
        (false, false) => Target::Minimal,
    }
}

/// One missing-required-field finding from [`validate`].
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub file_path: PathBuf,
    pub variant: PrimitiveVariant,
    pub missing_field: &'static str,
}

/// Check every primitive against its variant's required frontmatter fields
/// (§3 of the data model: Instruction needs `description`/`applyTo`,
/// Chatmode/Agent needs `description`, Skill needs `name`/`description`;
/// Context has no required fields). Used by `apm compile --validate`, which
/// reports these without writing any output.
pub fn validate(collection: &PrimitiveCollection) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    for primitive in collection.iter() {
        let required: &[&str] = match primitive.variant {
            PrimitiveVariant::Instruction => &["description", "applyTo"],
            PrimitiveVariant::ChatmodeAgent => &["description"],
            PrimitiveVariant::Context => &[],
            PrimitiveVariant::Skill => &["name", "description"],
        };
        for &field in required {
            if !primitive.metadata.contains_key(field) {
                issues.push(ValidationIssue {
                    file_path: primitive.file_path.clone(),
                    variant: primitive.variant,
                    missing_field: field,
                });
            }
        }
    }
    issues
}

/// Build the full collection for `project_root`, scanning local files first
/// (so later dependency inserts lose ties per the local-always-wins rule)
/// then each dependency in `dependency_roots` order (BFS/declaration order).
/// Each entry's canonical repo identifier is tagged `dependency:<repo_identifier>`.
pub fn build_collection(project_root: &Path, dependency_roots: &[(String, PathBuf)]) -> PrimitiveCollection {
    let mut collection = PrimitiveCollection::new();

    for primitive in discover_local(project_root) {
        collection.insert(primitive);
    }

    for (repo_identifier, package_root) in dependency_roots {
        let source_tag = format!("dependency:{repo_identifier}");
        for primitive in discover_dependency(package_root, &source_tag) {
            collection.insert(primitive);
        }
    }

    collection
}
