//! The distributed placement algorithm: a pure function over an in-memory
//! file list and instruction set, with no I/O, so it can be exhaustively
//! unit-tested against synthetic directory trees (the teacher keeps its own
//! resolution algorithms, e.g. `version/constraints/resolver.rs`, free of
//! side effects and tested apart from the I/O shell that calls them).

use std::collections::{BTreeMap, BTreeSet};

/// Above this relevance, a directory qualifies as a selective-multi
/// placement site.
pub const SELECTIVE_MULTI_THRESHOLD: f64 = 0.7;

/// An instruction to be placed, identified by `id` (its source file path,
/// used for deterministic output ordering) and its `applyTo` glob.
#[derive(Debug, Clone)]
pub struct InstructionSpec {
    pub id: String,
    pub apply_to: String,
}

/// Directory -> instruction ids placed there, after coverage and
/// `min_instructions_per_file` folding. Directories are in lexicographic
/// order (a `BTreeMap`); the root is the empty string.
#[derive(Debug, Default, Clone)]
pub struct PlacementPlan {
    pub assignments: BTreeMap<String, Vec<String>>,
}

impl PlacementPlan {
    pub fn at(&self, dir: &str) -> &[String] {
        self.assignments.get(dir).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Compute where each instruction should live so that, for every file
/// matching an instruction's `applyTo` glob, upward traversal from the
/// file's directory encounters that instruction exactly where the
/// three-tier strategy (or the coverage guarantee) puts it.
///
/// `files` are project-relative paths using `/` separators.
pub fn compute_placement(
    files: &[String],
    instructions: &[InstructionSpec],
    min_instructions_per_file: usize,
) -> PlacementPlan {
    let candidate_dirs = all_directories(files);
    let mut assignments: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    assignments.entry(String::new()).or_default();

    for instr in instructions {
        let Ok(pattern) = glob::Pattern::new(&instr.apply_to) else {
            continue;
        };

        let matching_files: Vec<&String> = files.iter().filter(|f| pattern.matches(f)).collect();
        if matching_files.is_empty() {
            continue;
        }

        let matching_set = matching_set_dirs(&matching_files);
        let score = matching_set.len() as f64 / candidate_dirs.len().max(1) as f64;

        let mut placement_dirs: BTreeSet<String> = BTreeSet::new();

        if score <= 0.33 {
            placement_dirs.insert(lowest_common_ancestor(&matching_set));
        } else if score <= 0.66 {
            let qualifying = maximal_relevant_dirs(&candidate_dirs, files, &pattern, SELECTIVE_MULTI_THRESHOLD);
            if qualifying.is_empty() {
                placement_dirs.insert(lowest_common_ancestor(&matching_set));
            } else {
                placement_dirs.extend(qualifying);
            }
        } else {
            placement_dirs.insert(String::new());
        }

        // Coverage guarantee: every matching file must see this instruction
        // by upward traversal, even if that means an extra root copy.
        let covered = matching_files
            .iter()
            .all(|f| placement_dirs.iter().any(|d| is_ancestor_or_self(d, &parent_dir(f))));
        if !covered {
            placement_dirs.insert(String::new());
        }

        for dir in placement_dirs {
            assignments.entry(dir).or_default().insert(instr.id.clone());
        }
    }

    fold_min_instructions(&mut assignments, min_instructions_per_file);

    PlacementPlan {
        assignments: assignments
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(dir, ids)| (dir, ids.into_iter().collect()))
            .collect(),
    }
}

fn all_directories(files: &[String]) -> BTreeSet<String> {
    let mut dirs = BTreeSet::new();
    dirs.insert(String::new());
    for file in files {
        let parts: Vec<&str> = file.split('/').collect();
        for i in 0..parts.len().saturating_sub(1) {
            dirs.insert(parts[..=i].join("/"));
        }
    }
    dirs
}

fn is_under(dir: &str, file: &str) -> bool {
    dir.is_empty() || file.starts_with(&format!("{dir}/"))
}

/// The directories that directly contain a matching file (not their
/// ancestors; ancestor containment is `relevance`'s concern, computed
/// separately with `is_under`).
fn matching_set_dirs(matching_files: &[&String]) -> BTreeSet<String> {
    matching_files.iter().map(|f| parent_dir(f)).collect()
}

/// Longest common path prefix of `dirs`, broken down by `/`-separated
/// component (lower depth wins when the set is a singleton at the root).
fn lowest_common_ancestor(dirs: &BTreeSet<String>) -> String {
    let mut iter = dirs.iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let mut common: Vec<&str> = if first.is_empty() { Vec::new() } else { first.split('/').collect() };

    for dir in iter {
        let parts: Vec<&str> = if dir.is_empty() { Vec::new() } else { dir.split('/').collect() };
        let shared = common.iter().zip(parts.iter()).take_while(|(a, b)| a == b).count();
        common.truncate(shared);
    }

    common.join("/")
}

fn maximal_relevant_dirs(
    candidate_dirs: &BTreeSet<String>,
    files: &[String],
    pattern: &glob::Pattern,
    threshold: f64,
) -> BTreeSet<String> {
    let mut qualifying: BTreeSet<String> = BTreeSet::new();

    for dir in candidate_dirs {
        let under: Vec<&String> = files.iter().filter(|f| is_under(dir, f)).collect();
        if under.is_empty() {
            continue;
        }
        let matching = under.iter().filter(|f| pattern.matches(f)).count();
        let relevance = matching as f64 / under.len() as f64;
        if relevance >= threshold {
            qualifying.insert(dir.clone());
        }
    }

    // Keep only the topmost qualifying directories: drop any whose parent
    // chain already contains a qualifying ancestor.
    qualifying.iter().filter(|d| !qualifying.iter().any(|other| is_ancestor_of(other, d))).cloned().collect()
}

fn is_ancestor_of(ancestor: &str, dir: &str) -> bool {
    if ancestor == dir {
        return false;
    }
    ancestor.is_empty() || dir.starts_with(&format!("{ancestor}/"))
}

fn is_ancestor_or_self(dir: &str, file_dir: &str) -> bool {
    dir.is_empty() || dir == file_dir || file_dir.starts_with(&format!("{dir}/"))
}

fn parent_dir(file: &str) -> String {
    file.rsplit_once('/').map(|(dir, _)| dir.to_string()).unwrap_or_default()
}

fn depth(dir: &str) -> usize {
    if dir.is_empty() {
        0
    } else {
        dir.matches('/').count() + 1
    }
}

fn parent_of(dir: &str) -> String {
    dir.rsplit_once('/').map(|(parent, _)| parent.to_string()).unwrap_or_default()
}

/// Fold directories holding fewer than `min_instructions_per_file`
/// instructions upward into their parent. The root is exempt. Processed
/// deepest-first so cascading folds (child into parent into grandparent)
/// settle in one pass.
fn fold_min_instructions(assignments: &mut BTreeMap<String, BTreeSet<String>>, min_instructions_per_file: usize) {
    let mut dirs: Vec<String> = assignments.keys().cloned().collect();
    dirs.sort_by(|a, b| depth(b).cmp(&depth(a)).then_with(|| a.cmp(b)));

    for dir in dirs {
        if dir.is_empty() {
            continue;
        }
        let count = assignments.get(&dir).map(BTreeSet::len).unwrap_or(0);
        if count > 0 && count < min_instructions_per_file {
            let ids = assignments.remove(&dir).unwrap_or_default();
            let parent = parent_of(&dir);
            assignments.entry(parent).or_default().extend(ids);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(paths: &[&str]) -> Vec<String> {
        paths.iter().map(|s| s.to_string()).collect()
    }

    fn instr(id: &str, apply_to: &str) -> InstructionSpec {
        InstructionSpec {
            id: id.to_string(),
            apply_to: apply_to.to_string(),
        }
    }

    #[test]
    fn narrow_instruction_placed_at_lowest_common_ancestor() {
        let files = files(&["src/auth/login.rs", "src/auth/session.rs", "docs/readme.md", "tests/it.rs"]);
        let instructions = vec![instr("auth-style", "src/auth/*.rs")];
        let plan = compute_placement(&files, &instructions, 1);
        assert_eq!(plan.at("src/auth"), &["auth-style".to_string()]);
        assert!(plan.at("").is_empty());
    }

    #[test]
    fn broad_instruction_placed_at_root() {
        let files = files(&["a/x.rs", "b/y.rs", "c/z.rs"]);
        let instructions = vec![instr("global-style", "**/*.rs")];
        let plan = compute_placement(&files, &instructions, 1);
        assert_eq!(plan.at(""), &["global-style".to_string()]);
    }

    #[test]
    fn every_matching_file_is_covered_by_upward_traversal() {
        let files = files(&[
            "pkg-a/src/one.rs",
            "pkg-a/src/two.rs",
            "pkg-a/docs/readme.md",
            "pkg-b/src/three.rs",
            "pkg-c/notes.md",
        ]);
        let instructions = vec![instr("rust-style", "**/*.rs")];
        let plan = compute_placement(&files, &instructions, 1);
        // every *.rs file must see rust-style by upward traversal
        for dir in ["pkg-a/src", "pkg-b/src"] {
            let covered = plan.assignments.keys().any(|d| is_ancestor_or_self(d, dir));
            assert!(covered, "{dir} not covered");
        }
    }

    #[test]
    fn selective_multi_places_at_maximal_qualifying_directories() {
        let files = files(&[
            "pkg-a/src/one.rs",
            "pkg-a/src/two.rs",
            "pkg-b/src/three.rs",
            "pkg-b/src/four.rs",
            "pkg-c/notes.md",
            "pkg-c/a.md",
            "pkg-c/b.md",
            "pkg-c/c.md",
        ]);
        let instructions = vec![instr("rust-style", "**/*.rs")];
        let plan = compute_placement(&files, &instructions, 1);
        assert_eq!(plan.at("pkg-a"), &["rust-style".to_string()]);
        assert_eq!(plan.at("pkg-b"), &["rust-style".to_string()]);
        assert!(plan.at("pkg-a/src").is_empty());
        assert!(plan.at("pkg-b/src").is_empty());
        assert!(plan.at("").is_empty());
    }

    #[test]
    fn min_instructions_per_file_folds_sparse_directories_upward() {
        let files = files(&["a/b/only.rs"]);
        let instructions = vec![instr("solo", "a/b/*.rs")];
        let plan = compute_placement(&files, &instructions, 2);
        assert!(plan.at("a/b").is_empty());
        assert_eq!(plan.at("a"), &["solo".to_string()]);
    }

    #[test]
    fn root_is_exempt_from_min_instructions_folding() {
        let files = files(&["x.rs"]);
        let instructions = vec![instr("only-one", "*.rs")];
        let plan = compute_placement(&files, &instructions, 5);
        assert_eq!(plan.at(""), &["only-one".to_string()]);
    }
}
