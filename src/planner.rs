//! Turning a deduplicated selection into per-repository sync plans

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::selection::SelectionModel;
use crate::tree::{NodeKind, RepoTree};

/// Identity of a remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    pub owner: String,
    pub name: String,
}

impl RepoKey {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Everything one repository's sync task needs.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    pub repo: RepoKey,
    pub default_branch: String,
    pub local_path: PathBuf,
    /// Sparse-checkout patterns in first-seen order. Never deduplicated:
    /// repeated downloads accumulate coverage rather than replace it.
    pub patterns: Vec<String>,
}

/// Build one plan per repository from the selection's minimal set.
///
/// The repository root itself selects everything (`*`); any other node
/// becomes a root-anchored pattern (`/` + repo-relative path), which scopes
/// directories to their whole subtree without matching same-named paths
/// elsewhere. Plans appear in first-seen selection order.
pub fn plan(tree: &RepoTree, selection: &SelectionModel, local_root: &Path) -> Vec<SyncPlan> {
    let mut plans: Vec<SyncPlan> = Vec::new();

    for id in selection.minimal(tree) {
        let key = RepoKey::new(tree.repo_owner(id), tree.repo_name(id));
        let pattern = if tree.node(id).kind == NodeKind::Repository {
            "*".to_string()
        } else {
            format!("/{}", tree.path_in_repo(id))
        };

        match plans.iter_mut().find(|p| p.repo == key) {
            Some(existing) => existing.patterns.push(pattern),
            None => plans.push(SyncPlan {
                local_path: local_root.join(&key.name),
                default_branch: tree.repo_default_branch(id).to_string(),
                repo: key,
                patterns: vec![pattern],
            }),
        }
    }

    debug!("planned {} repository syncs", plans.len());
    plans
}
