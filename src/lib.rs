//! sparsesync - Selective sparse-checkout mirroring for Gitea repositories
//!
//! sparsesync discovers the repositories a Gitea account can reach, lets the
//! user pick repositories, directories or single files out of their content
//! trees, and materializes exactly those paths locally with git's
//! sparse-checkout machinery. Repeated runs accumulate coverage instead of
//! re-cloning.
//!
//! ## Core Features
//!
//! - **Gitea Integration**: Paginated repository and content-tree discovery
//! - **Lazy Trees**: Directories fetch their children only when expanded
//! - **Tri-state Selection**: Checkbox semantics with propagation and dedup
//! - **Sparse Sync**: init-once local mirrors, pattern accumulation, bounded
//!   parallel pulls
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`session`]: Authenticated Gitea API session
//! - [`remote`]: Paginated fetching of API collections
//! - [`tree`]: Lazily expanded repository/content tree
//! - [`selection`]: Tri-state checkbox model over the tree
//! - [`planner`]: Selection to per-repository sync plans
//! - [`git`]: Sparse-checkout sync of one repository
//! - [`sync`]: Bounded-parallel execution of sync plans

pub mod config;
pub mod error;
pub mod git;
pub mod health;
pub mod planner;
pub mod remote;
pub mod selection;
pub mod session;
pub mod sync;
pub mod tree;

pub use config::Config;
pub use error::{FetchError, PreconditionError, SyncError, SyncStage};
pub use git::{RepoSyncer, SyncEvent};
pub use planner::{plan, RepoKey, SyncPlan};
pub use remote::{ContentRecord, RemotePager, RepoRecord};
pub use selection::SelectionModel;
pub use session::Session;
pub use sync::{CancelFlag, SyncEngine, SyncSummary};
pub use tree::{CheckState, NodeId, NodeKind, RepoTree};
