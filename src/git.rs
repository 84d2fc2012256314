//! Local git operations for one repository sync
//!
//! A sync is five strictly sequential stages: ensure the directory, init
//! the repository once (remote `origin`, sparse checkout enabled), append
//! the plan's patterns to the sparse-checkout file, pull the remote default
//! branch into local `master` with streamed progress, then hard-reset the
//! working tree. The hard reset makes the worktree reflect exactly the
//! accumulated patterns; local edits are discarded, since this is a read-only
//! mirror, not a working copy.

use anyhow::{anyhow, bail, Context, Result as AnyResult};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command as AsyncCommand;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::error::{PreconditionError, SyncError, SyncStage};
use crate::planner::{RepoKey, SyncPlan};
use crate::session::Session;
use crate::sync::CancelFlag;

/// Relative path of the sparse-checkout pattern file inside a repository.
const SPARSE_CHECKOUT_FILE: &str = ".git/info/sparse-checkout";

/// Events emitted by a running sync task.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A sync stage is starting.
    Stage { repo: RepoKey, stage: SyncStage },
    /// One progress line reported by the git transport.
    Progress { repo: RepoKey, line: String },
    /// The repository's sync finished successfully.
    Succeeded { repo: RepoKey },
    /// The repository's sync aborted; siblings are unaffected.
    Failed { repo: RepoKey, message: String },
}

/// Executes one repository's sync plan against the local filesystem.
#[derive(Debug, Clone)]
pub struct RepoSyncer {
    session: Arc<Session>,
}

impl RepoSyncer {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Run all stages of `plan`. Stage and progress events are sent on
    /// `events`; any stage failure aborts this repository only. The cancel
    /// flag is honored between stages; a sync already past its last
    /// suspension point runs to completion.
    pub async fn sync(
        &self,
        plan: &SyncPlan,
        events: &UnboundedSender<SyncEvent>,
        cancel: &CancelFlag,
    ) -> Result<(), SyncError> {
        info!("syncing {} into {}", plan.repo, plan.local_path.display());

        self.stage(plan, events, cancel, SyncStage::EnsureDir, self.ensure_local_dir(plan))
            .await?;
        self.stage(plan, events, cancel, SyncStage::Init, self.ensure_repository(plan))
            .await?;
        self.stage(plan, events, cancel, SyncStage::Patterns, self.append_patterns(plan))
            .await?;
        self.stage(plan, events, cancel, SyncStage::Pull, self.pull(plan, events))
            .await?;
        self.stage(plan, events, cancel, SyncStage::Reset, self.hard_reset(plan))
            .await?;

        info!("sync of {} complete", plan.repo);
        Ok(())
    }

    async fn stage<F>(
        &self,
        plan: &SyncPlan,
        events: &UnboundedSender<SyncEvent>,
        cancel: &CancelFlag,
        stage: SyncStage,
        work: F,
    ) -> Result<(), SyncError>
    where
        F: std::future::Future<Output = AnyResult<()>>,
    {
        if cancel.is_cancelled() {
            return Err(SyncError::new(
                plan.repo.clone(),
                stage,
                anyhow!("cancelled before {stage}"),
            ));
        }
        let _ = events.send(SyncEvent::Stage {
            repo: plan.repo.clone(),
            stage,
        });
        work.await
            .map_err(|source| SyncError::new(plan.repo.clone(), stage, source))
    }

    /// Create the local repository directory; pre-existing content is fine.
    async fn ensure_local_dir(&self, plan: &SyncPlan) -> AnyResult<()> {
        tokio::fs::create_dir_all(&plan.local_path)
            .await
            .with_context(|| {
                format!("failed to create directory {}", plan.local_path.display())
            })?;
        Ok(())
    }

    /// Initialize the repository exactly once: on first contact, init with
    /// local branch `master`, register `origin` and enable sparse checkout.
    /// An already-initialized repository is opened in place untouched.
    async fn ensure_repository(&self, plan: &SyncPlan) -> AnyResult<()> {
        let path = &plan.local_path;
        if path.join(".git").is_dir() {
            debug!("{} already initialized", plan.repo);
            return Ok(());
        }

        let remote_url = self.session.clone_url(&plan.repo.owner, &plan.repo.name);
        run_git(&["init"], path).await?;
        // Pin the unborn local branch to `master`, the branch every pull
        // lands on, regardless of the host's init.defaultBranch.
        run_git(&["symbolic-ref", "HEAD", "refs/heads/master"], path).await?;
        run_git(&["remote", "add", "origin", &remote_url], path).await?;
        run_git(&["config", "core.sparseCheckout", "true"], path).await?;
        debug!("initialized {} with origin {remote_url}", plan.repo);
        Ok(())
    }

    /// Append the plan's patterns to the sparse-checkout file. Append, not
    /// overwrite: repeated download runs accumulate coverage. Duplicate
    /// lines are harmless to git.
    async fn append_patterns(&self, plan: &SyncPlan) -> AnyResult<()> {
        let info_dir = plan.local_path.join(".git/info");
        tokio::fs::create_dir_all(&info_dir)
            .await
            .context("failed to create .git/info")?;

        let file_path = plan.local_path.join(SPARSE_CHECKOUT_FILE);
        let mut content = String::new();
        for pattern in &plan.patterns {
            content.push_str(pattern);
            content.push('\n');
        }

        use tokio::io::AsyncWriteExt;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)
            .await
            .with_context(|| format!("failed to open {}", file_path.display()))?;
        file.write_all(content.as_bytes())
            .await
            .context("failed to append sparse-checkout patterns")?;
        file.flush().await?;
        Ok(())
    }

    /// Pull the remote default branch into local `master`, forwarding each
    /// transport progress line as an event.
    async fn pull(&self, plan: &SyncPlan, events: &UnboundedSender<SyncEvent>) -> AnyResult<()> {
        let refspec = format!("{}:master", plan.default_branch);
        let mut child = AsyncCommand::new("git")
            .args(["pull", "--progress", "origin", &refspec])
            .current_dir(&plan.local_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .context("failed to spawn git pull")?;

        let stderr = child
            .stderr
            .take()
            .context("git pull stderr was not captured")?;
        let transcript = stream_progress(stderr, &plan.repo, events).await;

        let status = child.wait().await.context("failed to wait for git pull")?;
        if !status.success() {
            let tail: Vec<&str> = transcript.lines().rev().take(5).collect();
            bail!(
                "git pull origin {refspec} failed: {}",
                tail.into_iter().rev().collect::<Vec<_>>().join(" | ")
            );
        }
        Ok(())
    }

    /// Reset the working tree to the fetched commit so it reflects exactly
    /// the sparse-checkout patterns.
    async fn hard_reset(&self, plan: &SyncPlan) -> AnyResult<()> {
        run_git(&["reset", "--hard", "HEAD"], &plan.local_path).await
    }
}

/// Run a git subcommand to completion, failing on non-zero exit.
async fn run_git(args: &[&str], cwd: &Path) -> AnyResult<()> {
    let output = AsyncCommand::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .await
        .with_context(|| format!("failed to execute git {}", args.join(" ")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}

/// Forward git's progress output line by line. Git separates progress
/// updates with `\r` and regular messages with `\n`; both delimit events.
/// Returns the full transcript for error reporting.
async fn stream_progress<R>(
    mut reader: R,
    repo: &RepoKey,
    events: &UnboundedSender<SyncEvent>,
) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut transcript = String::new();
    let mut line: Vec<u8> = Vec::new();
    let mut buf = [0u8; 4096];

    loop {
        let read = match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for &byte in &buf[..read] {
            if byte == b'\r' || byte == b'\n' {
                flush_line(&mut line, &mut transcript, repo, events);
            } else {
                line.push(byte);
            }
        }
    }
    flush_line(&mut line, &mut transcript, repo, events);
    transcript
}

fn flush_line(
    line: &mut Vec<u8>,
    transcript: &mut String,
    repo: &RepoKey,
    events: &UnboundedSender<SyncEvent>,
) {
    if line.is_empty() {
        return;
    }
    let text = String::from_utf8_lossy(line).into_owned();
    transcript.push_str(&text);
    transcript.push('\n');
    let _ = events.send(SyncEvent::Progress {
        repo: repo.clone(),
        line: text,
    });
    line.clear();
}

/// Verify git is available before any sync task starts. Without it the
/// whole download operation is refused up front.
pub fn check_git_installed() -> Result<(), PreconditionError> {
    match std::process::Command::new("git").arg("--version").output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(PreconditionError::GitUnavailable(
            "git --version exited with failure".to_string(),
        )),
        Err(e) => Err(PreconditionError::GitUnavailable(e.to_string())),
    }
}
