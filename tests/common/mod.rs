/// Common test utilities and helpers for sparsesync tests
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run a git command in `cwd`, panicking with the transcript on failure.
pub fn git(cwd: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("failed to execute git");
    if !output.status.success() {
        panic!(
            "git {:?} in {:?} failed:\n{}",
            args,
            cwd,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A directory of local git repositories laid out like a Gitea server:
/// `{root}/{owner}/{name}.git`. Git's local transport lets the sync engine
/// pull from these paths exactly as it would from an HTTP remote.
pub struct LocalGitServer {
    root: TempDir,
}

impl LocalGitServer {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Value to use as the session's service URL.
    pub fn url(&self) -> String {
        self.root.path().display().to_string()
    }

    /// Create `{owner}/{name}.git` with one commit on branch `main`
    /// containing `files` as `(relative path, content)` pairs.
    pub fn add_repo(&self, owner: &str, name: &str, files: &[(&str, &str)]) -> PathBuf {
        let dir = self.root.path().join(owner).join(format!("{name}.git"));
        std::fs::create_dir_all(&dir).expect("failed to create repo dir");

        git(&dir, &["init"]);
        git(&dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&dir, &["config", "user.email", "test@example.com"]);
        git(&dir, &["config", "user.name", "Test"]);

        for (path, content) in files {
            let file = dir.join(path);
            if let Some(parent) = file.parent() {
                std::fs::create_dir_all(parent).expect("failed to create file dir");
            }
            std::fs::write(&file, content).expect("failed to write file");
        }
        git(&dir, &["add", "-A"]);
        git(&dir, &["commit", "-m", "seed"]);

        dir
    }
}

/// Read the sparse-checkout pattern file of a synced local repository.
pub fn sparse_patterns(repo: &Path) -> Vec<String> {
    let content = std::fs::read_to_string(repo.join(".git/info/sparse-checkout"))
        .expect("sparse-checkout file missing");
    content.lines().map(str::to_string).collect()
}
