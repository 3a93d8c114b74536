//! Compiles a [`PrimitiveCollection`] into `AGENTS.md`/`CLAUDE.md` output,
//! driven by the placement plan from [`super::placement`]. Output files are
//! written with [`atomic_write_str`] so a crash mid-compile never leaves a
//! half-written managed file, matching the teacher's atomic-write discipline
//! for every generated file.

use super::placement::{compute_placement, InstructionSpec, PlacementPlan};
use super::{Primitive, PrimitiveCollection, PrimitiveVariant};
use crate::manifest::{CompilationOptions, PlacementStrategy, Target};
use crate::utils::fs::{atomic_write_str, is_skipped_dir};
use crate::utils::hash::short_hash;
use anyhow::Result;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

const CONSTITUTION_BEGIN: &str = "<!-- SPEC-KIT CONSTITUTION: BEGIN -->";
const CONSTITUTION_END: &str = "<!-- SPEC-KIT CONSTITUTION: END -->";
const CONSTITUTION_CANDIDATES: &[&str] = &[".apm/constitution.md", ".specify/memory/constitution.md"];

fn context_link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+\.context\.md)\)").expect("static pattern is valid"))
}

/// Paths written by a single [`compile`] call, for CLI reporting.
#[derive(Debug, Default)]
pub struct CompileReport {
    pub written: Vec<PathBuf>,
}

/// Compile `collection` for `project_root` under `target`, honoring
/// `options.strategy`. `minimal` always compiles a single root `AGENTS.md`
/// regardless of the configured strategy, per §4.4's target rules.
///
/// `dry_run` computes the same plan and reports every path that would be
/// written, without touching the filesystem. `skip_constitution` disables
/// constitution injection for this call regardless of whether a
/// `constitution.md` is present (`apm compile --no-constitution`).
pub fn compile(
    collection: &PrimitiveCollection,
    project_root: &Path,
    options: &CompilationOptions,
    target: Target,
    dry_run: bool,
    skip_constitution: bool,
) -> Result<CompileReport> {
    let mut report = CompileReport::default();

    if target == Target::Minimal || matches!(options.strategy, PlacementStrategy::SingleFile) {
        let content = compile_single_file(collection, options, project_root, skip_constitution)?;
        let path = project_root.join("AGENTS.md");
        write_output(&path, &with_build_id(&content), dry_run)?;
        report.written.push(path);
    } else {
        let files = project_files(project_root, &options.exclude);
        let instructions: Vec<InstructionSpec> = collection
            .of_variant(PrimitiveVariant::Instruction)
            .map(|p| InstructionSpec {
                id: p.file_path.to_string_lossy().to_string(),
                apply_to: p.apply_to().unwrap_or("**/*").to_string(),
            })
            .collect();

        let plan = compute_placement(&files, &instructions, options.min_instructions_per_file);

        for (dir, ids) in &plan.assignments {
            let content = render_group(collection, ids, options.resolve_links, project_root);
            let path = if dir.is_empty() { project_root.join("AGENTS.md") } else { project_root.join(dir).join("AGENTS.md") };
            write_output(&path, &with_build_id(&content), dry_run)?;
            report.written.push(path);
        }
    }

    if matches!(target, Target::Claude | Target::All) {
        let root_agents = project_root.join("AGENTS.md");
        let body = if dry_run {
            report.written.iter().find(|p| *p == &root_agents).map(|_| String::new())
        } else {
            std::fs::read_to_string(&root_agents).ok()
        };
        if let Some(body) = body {
            let path = project_root.join("CLAUDE.md");
            write_output(&path, &body, dry_run)?;
            report.written.push(path);
        }
    }

    Ok(report)
}

fn write_output(path: &Path, content: &str, dry_run: bool) -> Result<()> {
    if dry_run {
        return Ok(());
    }
    atomic_write_str(path, content)
}

fn compile_single_file(
    collection: &PrimitiveCollection,
    options: &CompilationOptions,
    project_root: &Path,
    skip_constitution: bool,
) -> Result<String> {
    let all_ids: Vec<String> =
        collection.of_variant(PrimitiveVariant::Instruction).map(|p| p.file_path.to_string_lossy().to_string()).collect();
    let mut body = render_group(collection, &all_ids, options.resolve_links, project_root);
    if !skip_constitution {
        body = inject_constitution(body, project_root)?;
    }
    Ok(body)
}

/// Remove previously compiled `AGENTS.md` files (identified by the build-ID
/// trailer) at directories no longer present in `plan`'s assignments, for
/// `apm compile --clean`. The root `AGENTS.md`/`CLAUDE.md` are never removed
/// by this pass since every compile rewrites them.
pub fn clean_stale_outputs(project_root: &Path, plan: &PlacementPlan) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    let Ok(root_canon) = project_root.canonicalize() else {
        return Ok(removed);
    };

    for entry in WalkDir::new(&root_canon)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.path().file_name().map(|n| !is_skipped_dir(&n.to_string_lossy())).unwrap_or(true))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if path.file_name().map(|n| n != "AGENTS.md").unwrap_or(true) {
            continue;
        }
        let Ok(relative) = path.strip_prefix(&root_canon) else {
            continue;
        };
        let dir = relative.parent().map(|p| p.to_string_lossy().replace('\\', "/")).unwrap_or_default();
        if dir.is_empty() || plan.assignments.contains_key(&dir) {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        if content.contains("<!-- build:") {
            std::fs::remove_file(path)?;
            removed.push(path.to_path_buf());
        }
    }

    Ok(removed)
}

fn render_group(collection: &PrimitiveCollection, ids: &[String], resolve_links: bool, project_root: &Path) -> String {
    let mut groups: BTreeMap<String, Vec<&Primitive>> = BTreeMap::new();

    for id in ids {
        if let Some(primitive) = collection.iter().find(|p| p.file_path.to_string_lossy() == *id) {
            groups.entry(primitive.apply_to().unwrap_or("**/*").to_string()).or_default().push(primitive);
        }
    }

    let mut body = String::from("# AGENTS.md\n\n");
    for (apply_to, mut primitives) in groups {
        primitives.sort_by(|a, b| a.file_path.cmp(&b.file_path));
        body.push_str(&format!("<!-- instructions matching: {apply_to} -->\n\n"));
        for primitive in primitives {
            body.push_str(&resolve_links_in(&primitive.body, collection, resolve_links, project_root));
            body.push('\n');
        }
    }
    body
}

fn resolve_links_in(body: &str, collection: &PrimitiveCollection, resolve_links: bool, project_root: &Path) -> String {
    if !resolve_links {
        return body.to_string();
    }

    context_link_regex()
        .replace_all(body, |caps: &Captures| {
            let text = &caps[1];
            let target = &caps[2];
            let name = target.rsplit('/').next().unwrap_or(target).trim_end_matches(".context.md");

            match collection.of_variant(PrimitiveVariant::Context).find(|p| p.name == name) {
                Some(primitive) => {
                    let relative = primitive.file_path.strip_prefix(project_root).unwrap_or(&primitive.file_path);
                    format!("[{text}]({})", relative.display())
                }
                None => format!("[{text}]({target})"),
            }
        })
        .to_string()
}

/// Inject the project's constitution (if any) into the root `AGENTS.md`
/// body, between `SPEC-KIT CONSTITUTION` markers. Deterministic in terms of
/// `content`, so recompiling with an unchanged constitution reproduces the
/// same block byte-for-byte (idempotent by construction).
fn inject_constitution(body: String, project_root: &Path) -> Result<String> {
    let Some(path) = CONSTITUTION_CANDIDATES.iter().map(|p| project_root.join(p)).find(|p| p.is_file()) else {
        return Ok(body);
    };

    let content = std::fs::read_to_string(&path)?;
    let hash = short_hash(&content);
    let block = format!("{CONSTITUTION_BEGIN}\n<!-- hash: {hash} -->\n{content}\n{CONSTITUTION_END}\n");
    Ok(format!("{body}\n{block}"))
}

/// Append the build-ID trailer: the first 12 hex chars of SHA-256 over
/// `content`, with the trailer line itself elided from the hashed bytes.
fn with_build_id(content: &str) -> String {
    let hash = short_hash(content);
    format!("{content}\n<!-- build: {hash} -->\n")
}

pub(crate) fn project_files(root: &Path, exclude: &[String]) -> Vec<String> {
    let exclude_patterns: Vec<glob::Pattern> = exclude.iter().filter_map(|e| glob::Pattern::new(e).ok()).collect();
    let Ok(root_canon) = root.canonicalize() else {
        return Vec::new();
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(&root_canon)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.path().file_name().map(|n| !is_skipped_dir(&n.to_string_lossy())).unwrap_or(true))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(&root_canon) else {
            continue;
        };
        let relative_str = relative.to_string_lossy().replace('\\', "/");
        if exclude_patterns.iter().any(|p| p.matches(&relative_str)) {
            continue;
        }
        files.push(relative_str);
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn primitive(name: &str, file_path: &str, apply_to: &str, body: &str) -> Primitive {
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("applyTo".to_string(), serde_yaml::Value::String(apply_to.to_string()));
        Primitive {
            variant: PrimitiveVariant::Instruction,
            name: name.to_string(),
            file_path: PathBuf::from(file_path),
            body: body.to_string(),
            metadata,
            source_tag: "local".to_string(),
        }
    }

    #[test]
    fn build_id_trailer_changes_with_content() {
        let a = with_build_id("hello");
        let b = with_build_id("world");
        assert_ne!(a, b);
        assert!(a.contains("<!-- build:"));
    }

    #[test]
    fn single_file_strategy_writes_one_root_agents_md() {
        let dir = tempdir().unwrap();
        let mut collection = PrimitiveCollection::new();
        collection.insert(primitive("rust-style", "rust.instructions.md", "**/*.rs", "Use idiomatic Rust."));

        let options = CompilationOptions {
            strategy: PlacementStrategy::SingleFile,
            ..CompilationOptions::default()
        };
        let report = compile(&collection, dir.path(), &options, Target::Minimal, false, false).unwrap();
        assert_eq!(report.written, vec![dir.path().join("AGENTS.md")]);
        let content = fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();
        assert!(content.contains("Use idiomatic Rust."));
    }

    #[test]
    fn constitution_is_injected_between_markers() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".apm")).unwrap();
        fs::write(dir.path().join(".apm/constitution.md"), "Be helpful.\n").unwrap();

        let collection = PrimitiveCollection::new();
        let options = CompilationOptions {
            strategy: PlacementStrategy::SingleFile,
            ..CompilationOptions::default()
        };
        compile(&collection, dir.path(), &options, Target::Minimal, false, false).unwrap();
        let content = fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();
        assert!(content.contains(CONSTITUTION_BEGIN));
        assert!(content.contains("Be helpful."));
        assert!(content.contains(CONSTITUTION_END));
    }

    #[test]
    fn claude_target_mirrors_root_agents_into_claude_md() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let mut collection = PrimitiveCollection::new();
        collection.insert(primitive("rust-style", "rust.instructions.md", "*.rs", "Use idiomatic Rust."));

        let options = CompilationOptions::default();
        compile(&collection, dir.path(), &options, Target::Claude, false, false).unwrap();
        assert!(dir.path().join("AGENTS.md").is_file());
        assert!(dir.path().join("CLAUDE.md").is_file());
    }

    #[test]
    fn context_links_are_rewritten_to_actual_location() {
        let dir = tempdir().unwrap();
        let mut collection = PrimitiveCollection::new();
        collection.insert(Primitive {
            variant: PrimitiveVariant::Context,
            name: "api-notes".to_string(),
            file_path: dir.path().join(".apm/context/api-notes.context.md"),
            body: "notes".to_string(),
            metadata: std::collections::HashMap::new(),
            source_tag: "local".to_string(),
        });
        collection.insert(primitive(
            "rust-style",
            "rust.instructions.md",
            "**/*.rs",
            "See [the notes](api-notes.context.md) for background.",
        ));

        let options = CompilationOptions {
            strategy: PlacementStrategy::SingleFile,
            ..CompilationOptions::default()
        };
        compile(&collection, dir.path(), &options, Target::Minimal, false, false).unwrap();
        let content = fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();
        assert!(content.contains(".apm/context/api-notes.context.md"));
    }

    #[test]
    fn dry_run_reports_paths_without_writing() {
        let dir = tempdir().unwrap();
        let mut collection = PrimitiveCollection::new();
        collection.insert(primitive("rust-style", "rust.instructions.md", "**/*.rs", "Use idiomatic Rust."));

        let options = CompilationOptions {
            strategy: PlacementStrategy::SingleFile,
            ..CompilationOptions::default()
        };
        let report = compile(&collection, dir.path(), &options, Target::Minimal, true, false).unwrap();
        assert_eq!(report.written, vec![dir.path().join("AGENTS.md")]);
        assert!(!dir.path().join("AGENTS.md").exists());
    }

    #[test]
    fn skip_constitution_omits_injection_even_when_present() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".apm")).unwrap();
        fs::write(dir.path().join(".apm/constitution.md"), "Be helpful.\n").unwrap();

        let collection = PrimitiveCollection::new();
        let options = CompilationOptions {
            strategy: PlacementStrategy::SingleFile,
            ..CompilationOptions::default()
        };
        compile(&collection, dir.path(), &options, Target::Minimal, false, true).unwrap();
        let content = fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();
        assert!(!content.contains(CONSTITUTION_BEGIN));
    }

    #[test]
    fn clean_removes_stale_outputs_outside_current_plan() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("old")).unwrap();
        fs::write(dir.path().join("old/AGENTS.md"), with_build_id("stale content")).unwrap();
        fs::write(dir.path().join("old/NOT_MANAGED.md"), "hand-written, leave alone").unwrap();

        let plan = PlacementPlan::default();
        let removed = clean_stale_outputs(dir.path(), &plan).unwrap();
        assert_eq!(removed, vec![dir.path().canonicalize().unwrap().join("old/AGENTS.md")]);
        assert!(!dir.path().join("old/AGENTS.md").exists());
        assert!(dir.path().join("old/NOT_MANAGED.md").exists());
    }

    #[test]
    fn clean_preserves_outputs_still_in_plan() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("kept")).unwrap();
        fs::write(dir.path().join("kept/AGENTS.md"), with_build_id("current content")).unwrap();

        let mut plan = PlacementPlan::default();
        plan.assignments.insert("kept".to_string(), vec!["some-id".to_string()]);
        let removed = clean_stale_outputs(dir.path(), &plan).unwrap();
        assert!(removed.is_empty());
        assert!(dir.path().join("kept/AGENTS.md").exists());
    }
}
