//! Parallel execution of repository sync plans
//!
//! Each plan runs as an independent task on a semaphore-bounded pool. A
//! failed repository reports its own error and never aborts or rolls back
//! its siblings; already-completed syncs stay completed.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::error::{PreconditionError, SyncError};
use crate::git::{check_git_installed, RepoSyncer, SyncEvent};
use crate::planner::{RepoKey, SyncPlan};
use crate::session::Session;

/// Default worker-pool cap shared by fetches and syncs.
pub const DEFAULT_MAX_PARALLEL: usize = 15;

/// Cooperative cancellation flag checked at task suspension points.
/// Never set by default, so an unconfigured run goes to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Results from a complete sync run.
#[derive(Debug)]
pub struct SyncSummary {
    pub total: usize,
    pub succeeded: Vec<RepoKey>,
    pub failed: Vec<SyncError>,
    pub duration: Duration,
}

impl SyncSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Drives concurrent [`RepoSyncer`] tasks over a set of plans.
#[derive(Clone)]
pub struct SyncEngine {
    syncer: RepoSyncer,
    max_parallel: usize,
    cancel: CancelFlag,
}

impl SyncEngine {
    pub fn new(session: Arc<Session>, max_parallel: usize) -> Self {
        Self {
            syncer: RepoSyncer::new(session),
            max_parallel: max_parallel.max(1),
            cancel: CancelFlag::new(),
        }
    }

    /// Flag that callers may set to stop dispatching and wind down running
    /// tasks at their next suspension point.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Execute every plan, streaming events to `events`. Refuses to start
    /// anything if git is unavailable on this host.
    pub async fn run(
        &self,
        plans: Vec<SyncPlan>,
        events: UnboundedSender<SyncEvent>,
    ) -> Result<SyncSummary, PreconditionError> {
        check_git_installed()?;

        let start = Instant::now();
        let total = plans.len();
        info!(
            "syncing {total} repositories with up to {} parallel tasks",
            self.max_parallel
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut tasks = FuturesUnordered::new();

        for plan in plans {
            let semaphore = Arc::clone(&semaphore);
            let syncer = self.syncer.clone();
            let events = events.clone();
            let cancel = self.cancel.clone();

            tasks.push(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                let repo = plan.repo.clone();
                match syncer.sync(&plan, &events, &cancel).await {
                    Ok(()) => {
                        let _ = events.send(SyncEvent::Succeeded { repo: repo.clone() });
                        Ok(repo)
                    }
                    Err(err) => {
                        let _ = events.send(SyncEvent::Failed {
                            repo: repo.clone(),
                            message: err.to_string(),
                        });
                        Err(err)
                    }
                }
            });
        }

        let mut succeeded = Vec::new();
        let mut failed = Vec::new();
        while let Some(result) = tasks.next().await {
            match result {
                Ok(repo) => succeeded.push(repo),
                Err(err) => {
                    error!("{err:#}");
                    failed.push(err);
                }
            }
        }

        let summary = SyncSummary {
            total,
            succeeded,
            failed,
            duration: start.elapsed(),
        };
        info!(
            "sync run finished in {:.2}s: {} succeeded, {} failed",
            summary.duration.as_secs_f64(),
            summary.succeeded.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}
