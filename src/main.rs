use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sparsesync::health::{HealthCheck, PASSWORD_ENV};
use sparsesync::tree::NodeKind;
use sparsesync::{
    plan, Config, NodeId, RemotePager, RepoTree, SelectionModel, Session, SyncEngine, SyncEvent,
};

#[derive(Parser)]
#[command(name = "sparsesync")]
#[command(about = "Selective sparse-checkout mirroring for Gitea repositories")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (defaults to XDG config location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Gitea server URL (overrides configuration)
    #[arg(long)]
    url: Option<String>,

    /// Account username (overrides configuration)
    #[arg(long)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List repositories visible to the account
    Repos {
        /// Case-insensitive substring filter on repository names
        #[arg(long)]
        filter: Option<String>,
    },

    /// Show one level of a repository's content tree
    Tree {
        /// Repository as owner/name
        repo: String,

        /// Directory path inside the repository (defaults to the root)
        path: Option<String>,
    },

    /// Mirror the selected repositories and paths via sparse checkout
    Fetch {
        /// Selection as owner/repo or owner/repo:path/inside (repeatable)
        #[arg(long = "select", required = true)]
        selections: Vec<String>,

        /// Destination directory (overrides configuration)
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Maximum parallel sync tasks (overrides configuration)
        #[arg(long)]
        parallel: Option<usize>,
    },

    /// System health check and diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);
    info!("Starting sparsesync v{}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(cli.config)?;
    if let Some(url) = cli.url {
        config.service.url = url;
    }
    if let Some(user) = cli.user {
        config.service.username = Some(user);
    }

    match cli.command {
        Commands::Repos { filter } => cmd_repos(filter, &config).await,
        Commands::Tree { repo, path } => cmd_tree(repo, path, &config).await,
        Commands::Fetch {
            selections,
            dest,
            parallel,
        } => cmd_fetch(selections, dest, parallel, &config).await,
        Commands::Doctor => cmd_doctor(&config).await,
    }
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}

/// Load configuration from specified path or default location
fn load_config(config_path: Option<PathBuf>) -> Result<Config> {
    match config_path {
        Some(path) => Config::load(&path),
        None => Config::load_or_default(),
    }
}

/// Authenticate against the configured Gitea server
async fn login(config: &Config) -> Result<Arc<Session>> {
    let username = config
        .service
        .username
        .clone()
        .context("No username configured; set service.username or pass --user")?;
    let password = std::env::var(PASSWORD_ENV)
        .with_context(|| format!("{PASSWORD_ENV} is not set"))?;

    let session = Session::login(&config.service.url, &username, &password)
        .await
        .with_context(|| format!("Login to {} failed", config.service.url))?;
    Ok(session)
}

fn pager_for(session: Arc<Session>, config: &Config) -> RemotePager {
    RemotePager::with_page_size(session, config.service.page_size)
}

/// Split `owner/repo` or `owner/repo:path` into its parts
fn parse_selector(selector: &str) -> Result<(String, String, Option<String>)> {
    let (repo_part, path) = match selector.split_once(':') {
        Some((repo, path)) => (repo, Some(path.trim_matches('/').to_string())),
        None => (selector, None),
    };
    let Some((owner, name)) = repo_part.split_once('/') else {
        bail!("Invalid selection {selector:?}: expected owner/repo or owner/repo:path");
    };
    if owner.is_empty() || name.is_empty() {
        bail!("Invalid selection {selector:?}: expected owner/repo or owner/repo:path");
    }
    Ok((owner.to_string(), name.to_string(), path.filter(|p| !p.is_empty())))
}

/// Find a repository root in the loaded tree
fn find_repo(tree: &RepoTree, owner: &str, name: &str) -> Result<NodeId> {
    tree.roots()
        .iter()
        .copied()
        .find(|&root| tree.repo_owner(root) == owner && tree.repo_name(root) == name)
        .with_context(|| format!("Repository {owner}/{name} not found on the server"))
}

/// Walk (and expand) the tree down to `path` under `root`.
///
/// Each node is expanded at most once per invocation of the command, tracked
/// in `expanded`. Re-expanding a shared parent would detach the subtree a
/// previous selector already resolved and checked, silently dropping that
/// selection.
async fn resolve_path(
    tree: &mut RepoTree,
    selection: &mut SelectionModel,
    expanded: &mut HashSet<NodeId>,
    pager: &RemotePager,
    root: NodeId,
    path: &str,
) -> Result<NodeId> {
    let mut current = root;
    for segment in path.split('/') {
        if !tree.is_expandable(current) {
            bail!(
                "{} is a file; {path:?} does not name a directory entry",
                tree.path_in_repo(current)
            );
        }
        if expanded.insert(current) {
            let detached = tree.expand(current, pager).await?;
            selection.evict(&detached);
        }

        current = tree
            .children(current)
            .iter()
            .copied()
            .find(|&child| tree.node(child).name == segment)
            .with_context(|| {
                format!(
                    "No entry named {segment:?} under {}/{}",
                    tree.repo_name(root),
                    tree.path_in_repo(current)
                )
            })?;
    }
    Ok(current)
}

/// List repositories that can be mirrored
async fn cmd_repos(filter: Option<String>, config: &Config) -> Result<()> {
    let session = login(config).await?;
    let pager = pager_for(session, config);

    let mut tree = RepoTree::new();
    tree.load_repositories(&pager).await?;

    let needle = filter.map(|f| f.to_lowercase());
    let mut shown = 0usize;
    for &root in tree.roots() {
        let name = &tree.node(root).name;
        if let Some(needle) = &needle {
            if !name.to_lowercase().contains(needle) {
                continue;
            }
        }
        shown += 1;
        println!(
            "  {}/{} (default branch: {})",
            tree.repo_owner(root),
            name,
            tree.repo_default_branch(root)
        );
    }
    println!("{shown} of {} repositories", tree.roots().len());

    Ok(())
}

/// Show one directory level of a repository
async fn cmd_tree(repo: String, path: Option<String>, config: &Config) -> Result<()> {
    let (owner, name, _) = parse_selector(&repo)?;
    let session = login(config).await?;
    let pager = pager_for(session, config);

    let mut tree = RepoTree::new();
    let mut selection = SelectionModel::new();
    let mut expanded = HashSet::new();
    tree.load_repositories(&pager).await?;

    let root = find_repo(&tree, &owner, &name)?;
    let path = path.unwrap_or_default();
    let path = path.trim_matches('/');
    let node = if path.is_empty() {
        root
    } else {
        resolve_path(&mut tree, &mut selection, &mut expanded, &pager, root, path).await?
    };

    tree.expand(node, &pager).await?;
    println!("{owner}/{name}:/{path}");
    for &child in tree.children(node) {
        match tree.node(child).kind {
            NodeKind::File => {
                let size = tree.node(child).size.unwrap_or(0);
                println!("  {} ({size} bytes)", tree.node(child).name);
            }
            _ => println!("  {}/", tree.node(child).name),
        }
    }

    Ok(())
}

/// Sync the selected repositories and paths
async fn cmd_fetch(
    selections: Vec<String>,
    dest: Option<PathBuf>,
    parallel: Option<usize>,
    config: &Config,
) -> Result<()> {
    let session = login(config).await?;
    let pager = pager_for(Arc::clone(&session), config);

    let mut tree = RepoTree::new();
    let mut selection = SelectionModel::new();
    let mut expanded = HashSet::new();
    tree.load_repositories(&pager).await?;

    for selector in &selections {
        let (owner, name, path) = parse_selector(selector)?;
        let root = find_repo(&tree, &owner, &name)?;
        let node = match path {
            Some(path) => {
                resolve_path(&mut tree, &mut selection, &mut expanded, &pager, root, &path).await?
            }
            None => root,
        };
        selection.set_checked(&mut tree, node, true);
    }
    selection.dedup(&tree);

    let dest = dest.unwrap_or_else(|| config.destination_path());
    let plans = plan(&tree, &selection, &dest);
    println!("Syncing {} repositories into {}", plans.len(), dest.display());

    let max_parallel = parallel.unwrap_or(config.sync.max_parallel);
    let engine = SyncEngine::new(session, max_parallel);
    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                SyncEvent::Stage { repo, stage } => println!("  {repo}: {stage}"),
                SyncEvent::Progress { repo, line } => println!("  {repo}: {line}"),
                SyncEvent::Succeeded { repo } => println!("✅ {repo}"),
                SyncEvent::Failed { repo, message } => println!("❌ {repo}: {message}"),
            }
        }
    });

    let summary = engine.run(plans, events_tx).await?;
    printer.await?;

    println!();
    println!("Sync complete in {:.2}s", summary.duration.as_secs_f64());
    println!("   ✅ Succeeded: {}", summary.succeeded.len());
    println!("   ❌ Failed: {}", summary.failed.len());

    if !summary.all_succeeded() {
        for err in &summary.failed {
            println!("   ❌ {}: {err}", err.repo);
        }
        bail!("{} of {} repositories failed to sync", summary.failed.len(), summary.total);
    }

    Ok(())
}

/// System health check and diagnostics
async fn cmd_doctor(config: &Config) -> Result<()> {
    let health = HealthCheck::run(config).await;
    print_health_report(&health);
    if !health.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print health check report to stdout
fn print_health_report(health: &HealthCheck) {
    use sparsesync::health::CheckResult;

    fn print_check(name: &str, result: &CheckResult) {
        println!("{}:", name);
        let icon = if result.passed {
            if result.is_warning {
                "⚠️ "
            } else {
                "✅"
            }
        } else {
            "❌"
        };
        println!("  {} {}", icon, result.message);
        if let Some(details) = &result.details {
            for line in details.lines() {
                println!("     {}", line);
            }
        }
    }

    println!("🔍 sparsesync System Diagnostics");
    println!();

    for (name, result) in health.all_checks() {
        print_check(name, result);
        println!();
    }

    if health.all_passed() {
        println!("✅ All checks passed");
    } else {
        println!("❌ Some checks failed");
    }
}
