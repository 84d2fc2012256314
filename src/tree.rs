//! In-memory model of remote repository content trees
//!
//! Nodes live in an arena owned by [`RepoTree`]; identity is a [`NodeId`]
//! index, parent links support the upward walks needed to resolve a node's
//! repository root and repo-relative path. Children are materialized lazily
//! on expansion, and re-expansion is a full replace; the previous subtree
//! is detached wholesale, never diffed.

use tracing::{debug, warn};

use crate::error::FetchError;
use crate::remote::{ContentRecord, RemotePager, RepoRecord};

/// Index of a node inside a [`RepoTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// What a node represents; fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Repository,
    Directory,
    File,
}

/// Display state of a node's checkbox. `Indeterminate` is derived for
/// rendering only; the authoritative state is the explicit checked flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckState {
    Unchecked,
    Checked,
    Indeterminate,
}

#[derive(Debug)]
pub struct TreeNode {
    pub kind: NodeKind,
    pub name: String,
    /// Byte size; meaningful only for `File` nodes.
    pub size: Option<u64>,
    /// Present only on `Repository` roots.
    owner: Option<String>,
    default_branch: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    pub(crate) checked: bool,
}

/// Arena of repository/content nodes across all listed repositories.
#[derive(Debug, Default)]
pub struct RepoTree {
    nodes: Vec<TreeNode>,
    roots: Vec<NodeId>,
}

impl RepoTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id.0]
    }

    /// Repository roots, in listing order.
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// File nodes are never expandable; repositories and directories are.
    pub fn is_expandable(&self, id: NodeId) -> bool {
        self.node(id).kind != NodeKind::File
    }

    fn push(&mut self, node: TreeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Add a repository root from a listing record.
    pub fn add_repository(&mut self, record: &RepoRecord) -> NodeId {
        let id = self.push(TreeNode {
            kind: NodeKind::Repository,
            name: record.name.clone(),
            size: None,
            owner: Some(record.owner.login.clone()),
            default_branch: Some(record.default_branch.clone()),
            parent: None,
            children: Vec::new(),
            checked: false,
        });
        self.roots.push(id);
        id
    }

    /// Add a child from a contents record; `"file"` records become
    /// non-expandable `File` nodes, everything else a `Directory`.
    fn add_content(&mut self, parent: NodeId, record: &ContentRecord) -> NodeId {
        let (kind, size) = if record.kind == "file" {
            (NodeKind::File, Some(record.size))
        } else {
            (NodeKind::Directory, None)
        };
        let checked = self.node(parent).checked;
        let id = self.push(TreeNode {
            kind,
            name: record.name.clone(),
            size,
            owner: None,
            default_branch: None,
            parent: Some(parent),
            children: Vec::new(),
            checked,
        });
        self.node_mut(parent).children.push(id);
        id
    }

    /// Walk to the repository root this node belongs to.
    pub fn repo_root(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            current = parent;
        }
        current
    }

    pub fn repo_owner(&self, id: NodeId) -> &str {
        self.node(self.repo_root(id))
            .owner
            .as_deref()
            .unwrap_or_default()
    }

    pub fn repo_name(&self, id: NodeId) -> &str {
        &self.node(self.repo_root(id)).name
    }

    pub fn repo_default_branch(&self, id: NodeId) -> &str {
        self.node(self.repo_root(id))
            .default_branch
            .as_deref()
            .unwrap_or_default()
    }

    /// Path relative to the repository root; `""` for the root itself.
    pub fn path_in_repo(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            segments.push(self.node(current).name.as_str());
            current = parent;
        }
        segments.reverse();
        segments.join("/")
    }

    /// Collect `id` and every node beneath it.
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.node(current).children.iter().copied());
        }
        out
    }

    /// Derived checkbox display state: explicit check wins, a checked
    /// descendant renders the node indeterminate.
    pub fn display_state(&self, id: NodeId) -> CheckState {
        if self.node(id).checked {
            return CheckState::Checked;
        }
        let mut stack: Vec<NodeId> = self.node(id).children.clone();
        while let Some(current) = stack.pop() {
            if self.node(current).checked {
                return CheckState::Indeterminate;
            }
            stack.extend(self.node(current).children.iter().copied());
        }
        CheckState::Unchecked
    }

    /// Replace the repository roots with a fresh listing of the user's
    /// repositories. Any previous tree content is discarded.
    pub async fn load_repositories(&mut self, pager: &RemotePager) -> Result<(), FetchError> {
        let records: Vec<RepoRecord> = pager.fetch_all(&pager.session().repos_url()).await?;
        self.nodes.clear();
        self.roots.clear();
        for record in &records {
            self.add_repository(record);
        }
        debug!("loaded {} repositories", self.roots.len());
        Ok(())
    }

    /// Expand a repository or directory node: discard its children and
    /// repopulate them from the directory-contents listing, in API order.
    /// On fetch failure the children remain empty. Returns the detached
    /// node ids so the caller can evict them from its selection set. The
    /// error path cannot report that list, but detached nodes are
    /// force-unchecked, so a selection still holding one drops it at the
    /// next `minimal`/`dedup` instead of planning it.
    ///
    /// New children inherit the node's effective checked state, so a
    /// directory checked before expansion covers nodes discovered later.
    pub async fn expand(
        &mut self,
        id: NodeId,
        pager: &RemotePager,
    ) -> Result<Vec<NodeId>, FetchError> {
        if !self.is_expandable(id) {
            warn!("ignoring expand of non-expandable node {:?}", self.node(id).name);
            return Ok(Vec::new());
        }

        // Full replace: detach the old subtree before fetching.
        let old_children: Vec<NodeId> = std::mem::take(&mut self.node_mut(id).children);
        let detached: Vec<NodeId> = old_children
            .iter()
            .flat_map(|&child| self.subtree(child))
            .collect();
        for &stale in &detached {
            self.node_mut(stale).parent = None;
            self.node_mut(stale).checked = false;
        }

        let owner = self.repo_owner(id).to_string();
        let repo = self.repo_name(id).to_string();
        let path = self.path_in_repo(id);
        let url = pager.session().contents_url(&owner, &repo, &path);

        let records: Vec<ContentRecord> = pager.fetch_all(&url).await?;
        for record in &records {
            self.add_content(id, record);
        }
        debug!(
            "expanded {owner}/{repo}:{path} into {} entries",
            records.len()
        );
        Ok(detached)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::remote::OwnerRecord;

    pub fn repo_record(owner: &str, name: &str, branch: &str) -> RepoRecord {
        RepoRecord {
            name: name.to_string(),
            owner: OwnerRecord {
                login: owner.to_string(),
            },
            default_branch: branch.to_string(),
        }
    }

    pub fn dir_record(name: &str) -> ContentRecord {
        ContentRecord {
            name: name.to_string(),
            kind: "dir".to_string(),
            size: 0,
        }
    }

    pub fn file_record(name: &str, size: u64) -> ContentRecord {
        ContentRecord {
            name: name.to_string(),
            kind: "file".to_string(),
            size,
        }
    }

    /// Attach a directory child without going through the network path.
    pub fn add_dir(tree: &mut RepoTree, parent: NodeId, name: &str) -> NodeId {
        tree.add_content(parent, &dir_record(name))
    }

    pub fn add_file(tree: &mut RepoTree, parent: NodeId, name: &str, size: u64) -> NodeId {
        tree.add_content(parent, &file_record(name, size))
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::session::Session;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sample_tree() -> (RepoTree, NodeId, NodeId, NodeId) {
        let mut tree = RepoTree::new();
        let root = tree.add_repository(&repo_record("alice", "backend", "main"));
        let app = add_dir(&mut tree, root, "app");
        let src = add_dir(&mut tree, app, "src");
        (tree, root, app, src)
    }

    #[test]
    fn path_in_repo_walks_to_root() {
        let (tree, root, app, src) = sample_tree();
        assert_eq!(tree.path_in_repo(root), "");
        assert_eq!(tree.path_in_repo(app), "app");
        assert_eq!(tree.path_in_repo(src), "app/src");
    }

    #[test]
    fn repo_metadata_is_resolved_via_the_root() {
        let (tree, _root, _app, src) = sample_tree();
        assert_eq!(tree.repo_owner(src), "alice");
        assert_eq!(tree.repo_name(src), "backend");
        assert_eq!(tree.repo_default_branch(src), "main");
    }

    #[test]
    fn files_are_never_expandable() {
        let (mut tree, root, _, _) = sample_tree();
        let file = add_file(&mut tree, root, "README.md", 12);
        assert!(!tree.is_expandable(file));
        assert!(tree.is_expandable(root));
    }

    #[test]
    fn display_state_derives_indeterminate_from_descendants() {
        let (mut tree, root, app, src) = sample_tree();
        assert_eq!(tree.display_state(root), CheckState::Unchecked);

        tree.node_mut(src).checked = true;
        assert_eq!(tree.display_state(src), CheckState::Checked);
        assert_eq!(tree.display_state(app), CheckState::Indeterminate);
        assert_eq!(tree.display_state(root), CheckState::Indeterminate);
    }

    async fn pager_for(server: &MockServer) -> RemotePager {
        let session = Session::with_credentials(server.uri(), "alice", "secret");
        RemotePager::new(Arc::new(session))
    }

    async fn mount_contents(
        server: &MockServer,
        url_path: &str,
        body: serde_json::Value,
    ) {
        Mock::given(method("GET"))
            .and(path(url_path))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .and(path(url_path))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn expand_populates_children_in_api_order() {
        let server = MockServer::start().await;
        mount_contents(
            &server,
            "/api/v1/repos/alice/backend/contents/",
            serde_json::json!([
                {"name": "zeta", "type": "dir", "size": 0},
                {"name": "alpha", "type": "file", "size": 3},
            ]),
        )
        .await;

        let pager = pager_for(&server).await;
        let mut tree = RepoTree::new();
        let root = tree.add_repository(&repo_record("alice", "backend", "main"));

        tree.expand(root, &pager).await.unwrap();
        let names: Vec<_> = tree
            .children(root)
            .iter()
            .map(|&c| tree.node(c).name.clone())
            .collect();
        // API order preserved, not re-sorted
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert_eq!(tree.node(tree.children(root)[1]).size, Some(3));
    }

    #[tokio::test]
    async fn expand_failure_leaves_children_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/alice/backend/contents/"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "errors": [],
                "message": "Not Found"
            })))
            .mount(&server)
            .await;

        let pager = pager_for(&server).await;
        let mut tree = RepoTree::new();
        let root = tree.add_repository(&repo_record("alice", "backend", "main"));

        assert!(tree.expand(root, &pager).await.is_err());
        assert!(tree.children(root).is_empty());
    }

    #[tokio::test]
    async fn re_expansion_replaces_children_and_reports_detached_nodes() {
        let server = MockServer::start().await;
        mount_contents(
            &server,
            "/api/v1/repos/alice/backend/contents/",
            serde_json::json!([{"name": "src", "type": "dir", "size": 0}]),
        )
        .await;

        let pager = pager_for(&server).await;
        let mut tree = RepoTree::new();
        let root = tree.add_repository(&repo_record("alice", "backend", "main"));

        let first = tree.expand(root, &pager).await.unwrap();
        assert!(first.is_empty());
        let old_child = tree.children(root)[0];

        let detached = tree.expand(root, &pager).await.unwrap();
        assert_eq!(detached, vec![old_child]);
        assert_eq!(tree.children(root).len(), 1);
        assert_ne!(tree.children(root)[0], old_child);
    }

    #[tokio::test]
    async fn failed_re_expansion_keeps_stale_selections_out_of_plans() {
        use crate::planner::plan;
        use crate::selection::SelectionModel;
        use std::path::Path as FsPath;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/alice/backend/contents/"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"name": "src", "type": "dir", "size": 0}
            ])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/alice/backend/contents/"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/repos/alice/backend/contents/"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "errors": [],
                "message": "Internal Server Error"
            })))
            .mount(&server)
            .await;

        let pager = pager_for(&server).await;
        let mut tree = RepoTree::new();
        let root = tree.add_repository(&repo_record("alice", "backend", "main"));
        let mut selection = SelectionModel::new();

        tree.expand(root, &pager).await.unwrap();
        let src = tree.children(root)[0];
        selection.set_checked(&mut tree, src, true);

        // the failed re-expansion cannot report the detached ids
        assert!(tree.expand(root, &pager).await.is_err());
        assert!(tree.children(root).is_empty());

        assert!(selection.minimal(&tree).is_empty());
        assert!(plan(&tree, &selection, FsPath::new("/tmp/mirror")).is_empty());
        selection.dedup(&tree);
        assert!(selection.is_empty());
    }

    #[tokio::test]
    async fn expansion_under_a_checked_node_inherits_the_check() {
        let server = MockServer::start().await;
        mount_contents(
            &server,
            "/api/v1/repos/alice/backend/contents/",
            serde_json::json!([{"name": "src", "type": "dir", "size": 0}]),
        )
        .await;

        let pager = pager_for(&server).await;
        let mut tree = RepoTree::new();
        let root = tree.add_repository(&repo_record("alice", "backend", "main"));
        tree.node_mut(root).checked = true;

        tree.expand(root, &pager).await.unwrap();
        let child = tree.children(root)[0];
        assert!(tree.node(child).checked);
    }
}
