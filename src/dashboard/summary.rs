//! Dashboard data assembly
//!
//! [`RepoStatus::load`] gathers everything the dashboard shows in one pass.
//! [`DashboardLoader`] runs it off the UI thread and hands the result back
//! over a channel, so a slow network never stalls the tick.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use super::github::{CommitDetail, CommitSummary, GithubError, Release, RepoDataSource, RepoInfo};

/// Placeholder shown when the repository has no release
pub const NO_RELEASE: &str = "N/A";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Number of recent commits to list
    pub recent_commits: usize,
    /// Branch for the latest-commit panel; the default branch when empty
    pub branch: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            recent_commits: 5,
            branch: String::new(),
        }
    }
}

/// Snapshot of one repository
#[derive(Debug, Clone)]
pub struct RepoStatus {
    pub repo: String,
    pub info: RepoInfo,
    pub commits: u64,
    pub prs: u64,
    pub last_release: Option<Release>,
    pub recent_commits: Vec<CommitSummary>,
    pub last_commit: Option<CommitDetail>,
    pub loaded_at: OffsetDateTime,
}

impl RepoStatus {
    pub fn load(
        source: &dyn RepoDataSource,
        repo: &str,
        options: &LoadOptions,
    ) -> Result<Self, GithubError> {
        info!("Loading dashboard data for {}", repo);

        let info = source.get_repo_info(repo)?;
        let commits = source.get_commits_since(repo, None)?;
        let prs = source.get_prs(repo, None)?;
        let last_release = source.get_last_release(repo)?;
        let recent_commits = source.get_last_x_commits(repo, options.recent_commits)?;

        let branch = if options.branch.trim().is_empty() {
            info.default_branch.as_str()
        } else {
            options.branch.trim()
        };
        // An empty repository has no head commit; the rest is still useful
        let last_commit = match source.get_last_commit(repo, branch) {
            Ok(commit) => Some(commit),
            Err(e) => {
                warn!("Failed to load last commit of {}@{}: {}", repo, branch, e);
                None
            }
        };

        let status = Self {
            repo: repo.to_string(),
            info,
            commits,
            prs,
            last_release,
            recent_commits,
            last_commit,
            loaded_at: OffsetDateTime::now_utc(),
        };
        debug!("Status data: {:?}", status.rows());
        info!("Dashboard data loaded");
        Ok(status)
    }

    pub fn last_release_label(&self) -> String {
        self.last_release
            .as_ref()
            .map(|r| r.title().to_string())
            .unwrap_or_else(|| NO_RELEASE.to_string())
    }

    /// Label/value pairs of the status panel
    pub fn rows(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Name", self.info.name.clone()),
            (
                "Description",
                self.info.description.clone().unwrap_or_default(),
            ),
            ("Stars", self.info.stars.to_string()),
            ("Forks", self.info.forks.to_string()),
            ("Open issues", self.info.open_issues.to_string()),
            ("Default branch", self.info.default_branch.clone()),
            ("Commits", self.commits.to_string()),
            ("Pull requests", self.prs.to_string()),
            ("Last release", self.last_release_label()),
        ]
    }
}

/// Result of one background load
#[derive(Debug)]
pub enum LoadEvent {
    Loaded(Box<RepoStatus>),
    Failed(String),
}

/// Runs [`RepoStatus::load`] on a worker thread, one load at a time
pub struct DashboardLoader {
    source: Arc<dyn RepoDataSource + Send + Sync>,
    tx: Sender<LoadEvent>,
    rx: Receiver<LoadEvent>,
    in_flight: bool,
}

impl DashboardLoader {
    pub fn new(source: Arc<dyn RepoDataSource + Send + Sync>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            tx,
            rx,
            in_flight: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight
    }

    /// Start a load unless one is already running. Returns whether one was started.
    pub fn request(&mut self, repo: &str, options: &LoadOptions) -> bool {
        if self.in_flight {
            debug!("Dashboard load already in flight");
            return false;
        }

        let source = Arc::clone(&self.source);
        let tx = self.tx.clone();
        let repo = repo.to_string();
        let options = options.clone();

        let spawned = thread::Builder::new()
            .name("dashboard-loader".to_string())
            .spawn(move || {
                let event = match RepoStatus::load(source.as_ref(), &repo, &options) {
                    Ok(status) => LoadEvent::Loaded(Box::new(status)),
                    Err(e) => {
                        warn!("Dashboard load failed: {}", e);
                        LoadEvent::Failed(e.to_string())
                    }
                };
                let _ = tx.send(event);
            });

        match spawned {
            Ok(_) => {
                self.in_flight = true;
                true
            }
            Err(e) => {
                warn!("Failed to start dashboard loader: {}", e);
                false
            }
        }
    }

    /// Finished load, if any. Never blocks.
    pub fn try_recv(&mut self) -> Option<LoadEvent> {
        match self.rx.try_recv() {
            Ok(event) => {
                self.in_flight = false;
                Some(event)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
