//! Transitive dependency resolver (C3).
//!
//! BFS over the dependency graph using `petgraph::graph::DiGraph` with
//! `NodeIndex`-based edges, matching the teacher's `resolver/dependency_graph.rs`
//! arena-plus-indices approach. Each BFS depth is a parallel batch of C2
//! fetches bounded by a semaphore sized off `available_parallelism`, mirroring
//! the teacher's `cache::GIT_SEMAPHORE` sizing convention (there `cores * 3`;
//! here the spec's `min(8, cores)`).

pub mod graph;
pub mod verify;

pub use graph::{ConflictRecord, DependencyGraph, ResolvedNode};
pub use verify::{verify, VerifyReport};

use crate::core::{ApmError, Environment};
use crate::fetch::FetchDriver;
use crate::lockfile::LockFile;
use crate::manifest::Manifest;
use crate::reference::DependencyRef;
use anyhow::Result;
use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;

fn fetch_semaphore() -> Arc<Semaphore> {
    static SEM: OnceLock<Arc<Semaphore>> = OnceLock::new();
    SEM.get_or_init(|| {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Arc::new(Semaphore::new(cores.min(8)))
    })
    .clone()
}

/// A unit of work discovered during BFS: a reference plus the bookkeeping
/// needed to record its edge once resolved.
struct QueueItem {
    dep_ref: DependencyRef,
    depth: u32,
    parent: Option<String>,
}

/// Result of a full resolution pass.
pub struct ResolveOutcome {
    pub graph: DependencyGraph,
    pub lockfile: LockFile,
}

/// Drives C2 across the BFS frontier and assembles the resulting graph and
/// lockfile. Holds no mutable state between calls.
pub struct Resolver<'a> {
    driver: &'a dyn FetchDriver,
    env: &'a Environment,
    project_root: PathBuf,
}

impl<'a> Resolver<'a> {
    pub fn new(driver: &'a dyn FetchDriver, env: &'a Environment, project_root: impl Into<PathBuf>) -> Self {
        Self {
            driver,
            env,
            project_root: project_root.into(),
        }
    }

    /// Resolve `manifest`'s `dependencies.apm` to a full graph and lockfile.
    ///
    /// In `--frozen` mode, `existing_lockfile` is treated as an oracle: refs
    /// not matching it fail the resolve, and commit SHAs come from it rather
    /// than the network.
    pub async fn resolve(
        &self,
        manifest: &Manifest,
        frozen: bool,
        existing_lockfile: Option<&LockFile>,
        selected: Option<&[String]>,
    ) -> Result<ResolveOutcome> {
        if frozen && existing_lockfile.is_none() {
            anyhow::bail!(ApmError::FrozenLockfileMismatch {
                reason: "--frozen requested but no apm.lock is present".to_string(),
            });
        }

        let roots: Vec<&String> = match selected {
            Some(names) => manifest
                .dependencies
                .apm
                .iter()
                .filter(|d| names.iter().any(|n| d.starts_with(n.as_str())))
                .collect(),
            None => manifest.dependencies.apm.iter().collect(),
        };

        let mut graph = DependencyGraph::new();
        let mut queue: VecDeque<QueueItem> = VecDeque::new();

        for raw in roots {
            let dep_ref = DependencyRef::parse(raw, self.env)?;
            queue.push_back(QueueItem {
                dep_ref,
                depth: 1,
                parent: None,
            });
        }

        while !queue.is_empty() {
            let batch: Vec<QueueItem> = queue.drain(..).collect();
            let mut next_batch = Vec::new();
            // Keys claimed by this batch's in-flight fetches, so two siblings
            // at the same depth depending on the same child (the diamond
            // case) schedule only one fetch between them rather than racing
            // two clones into the same destination.
            let mut in_flight: HashSet<String> = HashSet::new();
            let mut deferred_conflicts: Vec<(String, Option<String>)> = Vec::new();

            let mut handles = Vec::new();
            for item in batch {
                let key = item.dep_ref.install_path().to_string_lossy().to_string();
                if graph.contains_key(&key) {
                    if let Some(parent_key) = &item.parent {
                        if let Some(parent_node) = graph.node(parent_key) {
                            if parent_node.parent.as_deref() == Some(key.as_str()) {
                                tracing::warn!("{}", ApmError::CycleDetected { key: key.clone() });
                            }
                        }
                    }
                    graph.record_conflict_edge(&key, item.parent.clone());
                    continue;
                }
                if !in_flight.insert(key.clone()) {
                    deferred_conflicts.push((key, item.parent.clone()));
                    continue;
                }
                let sem = fetch_semaphore();
                handles.push(self.resolve_one(item, key, frozen, existing_lockfile, sem));
            }

            let resolved = futures::future::join_all(handles).await;
            for outcome in resolved {
                let (node, children) = outcome?;
                let key = node.canonical_key.clone();
                graph.insert(node);
                for (child_ref, depth) in children {
                    next_batch.push(QueueItem {
                        dep_ref: child_ref,
                        depth,
                        parent: Some(key.clone()),
                    });
                }
            }

            for (key, parent) in deferred_conflicts {
                graph.record_conflict_edge(&key, parent);
            }

            queue.extend(next_batch);
        }

        let lockfile = LockFile::new(graph.to_locked_dependencies());
        Ok(ResolveOutcome {
            graph,
            lockfile,
        })
    }

    async fn resolve_one(
        &self,
        item: QueueItem,
        key: String,
        frozen: bool,
        existing_lockfile: Option<&LockFile>,
        semaphore: Arc<Semaphore>,
    ) -> Result<(ResolvedNode, Vec<(DependencyRef, u32)>)> {
        let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");

        let dest = self.project_root.join(item.dep_ref.install_path());

        let resolved_commit = if frozen {
            let locked = existing_lockfile
                .and_then(|lf| lf.find(&item.dep_ref.repo_path.join("/")))
                .ok_or_else(|| ApmError::FrozenLockfileMismatch {
                    reason: format!("{} is not present in apm.lock", item.dep_ref.to_canonical_string()),
                })?;
            locked.resolved_commit.clone()
        } else if item.dep_ref.is_virtual() {
            let path = item.dep_ref.virtual_path.clone().unwrap_or_default();
            self.driver.download_file(&item.dep_ref, &path, &dest, self.env).await?.commit
        } else {
            self.driver.clone_into(&item.dep_ref, &dest, self.env).await?.commit
        };

        let mut children = Vec::new();
        if !item.dep_ref.is_virtual() {
            let manifest_path = dest.join(crate::manifest::MANIFEST_FILE_NAME);
            if manifest_path.is_file() {
                let child_manifest = Manifest::load(&manifest_path).ok();
                if let Some(child_manifest) = child_manifest {
                    for dep in &child_manifest.dependencies.apm {
                        if let Ok(child_ref) = DependencyRef::parse(dep, self.env) {
                            children.push((child_ref, item.depth + 1));
                        }
                    }
                }
            }
        }

        let node = ResolvedNode {
            canonical_key: key,
            dep_ref: item.dep_ref,
            depth: item.depth,
            parent: item.parent,
            resolved_commit,
        };

        Ok((node, children))
    }
}

/// Bootstrap a minimal manifest when none exists and the user passed an
/// explicit package argument (§4.3's bootstrapping rule).
pub fn bootstrap_manifest(project_root: &Path, package_ref: &str) -> Manifest {
    let project_name =
        project_root.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_else(|| "project".to_string());
    Manifest::bootstrap_with_dependency(&project_name, package_ref)
}
