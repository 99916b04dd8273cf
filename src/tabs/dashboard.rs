//! Dashboard tab: repository status plus a live tail of the application log

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::core::ansi::Style;
use crate::dashboard::github::RepoDataSource;
use crate::dashboard::logtail::{LogTail, LogUpdate};
use crate::dashboard::summary::{DashboardLoader, LoadEvent, LoadOptions, RepoStatus};
use crate::ui::view::OutputView;

/// How often the log directory is polled
pub const LOG_POLL_INTERVAL: Duration = Duration::from_secs(1);
const LOG_SCROLLBACK: usize = 2000;

pub struct DashboardTab {
    repo: Option<String>,
    options: LoadOptions,
    loader: DashboardLoader,
    status: Option<RepoStatus>,
    error: Option<String>,
    refresh: Option<Duration>,
    last_request: Option<Instant>,

    log_tail: LogTail,
    log_view: OutputView,
    logs_collapsed: bool,
    last_log_poll: Option<Instant>,
}

impl DashboardTab {
    /// `repo` is `owner/name`; `refresh_secs` of 0 disables automatic reloads
    pub fn new(
        source: Arc<dyn RepoDataSource + Send + Sync>,
        repo: Option<String>,
        options: LoadOptions,
        log_dir: PathBuf,
        refresh_secs: u64,
    ) -> Self {
        Self {
            repo,
            options,
            loader: DashboardLoader::new(source),
            status: None,
            error: None,
            refresh: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            last_request: None,
            log_tail: LogTail::new(log_dir),
            log_view: OutputView::new(LOG_SCROLLBACK),
            logs_collapsed: false,
            last_log_poll: None,
        }
    }

    /// Start loading repository data in the background
    pub fn reload(&mut self) -> bool {
        let Some(repo) = self.repo.clone() else {
            self.error = Some("Set git.user and git.repo in the config file".to_string());
            return false;
        };
        self.last_request = Some(Instant::now());
        let started = self.loader.request(&repo, &self.options);
        if started {
            info!("Loading dashboard data...");
        }
        started
    }

    /// Collect finished loads, poll the log file and run the auto refresh.
    /// Returns whether anything visible changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = false;

        while let Some(event) = self.loader.try_recv() {
            match event {
                LoadEvent::Loaded(status) => {
                    self.status = Some(*status);
                    self.error = None;
                }
                LoadEvent::Failed(message) => self.error = Some(message),
            }
            changed = true;
        }

        let poll_due = self
            .last_log_poll
            .map_or(true, |last| now.duration_since(last) >= LOG_POLL_INTERVAL);
        if poll_due {
            self.last_log_poll = Some(now);
            changed |= self.poll_logs();
        }

        if let (Some(every), Some(last)) = (self.refresh, self.last_request) {
            if now.duration_since(last) >= every && !self.loader.is_loading() {
                changed |= self.reload();
            }
        }

        changed
    }

    fn poll_logs(&mut self) -> bool {
        match self.log_tail.poll() {
            Ok(LogUpdate::Unchanged) => false,
            Ok(LogUpdate::Appended(text)) => {
                self.log_view.push_text(&text, Style::default());
                true
            }
            Ok(LogUpdate::Restarted(text)) => {
                self.log_view.clear();
                self.log_view.push_text(&text, Style::default());
                true
            }
            Err(e) => {
                error!("Error reading log: {}", e);
                false
            }
        }
    }

    pub fn toggle_logs(&mut self) {
        self.logs_collapsed = !self.logs_collapsed;
    }

    pub fn logs_collapsed(&self) -> bool {
        self.logs_collapsed
    }

    /// File name of the log being tailed
    pub fn log_file(&self) -> Option<String> {
        self.log_tail
            .current_file()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn log_view(&self) -> &OutputView {
        &self.log_view
    }

    pub fn log_view_mut(&mut self) -> &mut OutputView {
        &mut self.log_view
    }

    pub fn status(&self) -> Option<&RepoStatus> {
        self.status.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    pub fn repo(&self) -> Option<&str> {
        self.repo.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::summary::tests::FakeSource;
    use std::fs;
    use std::thread;

    fn dashboard(repo: Option<&str>, log_dir: PathBuf) -> DashboardTab {
        DashboardTab::new(
            Arc::new(FakeSource::default()),
            repo.map(str::to_string),
            LoadOptions::default(),
            log_dir,
            0,
        )
    }

    #[test]
    fn test_reload_without_repo_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut tab = dashboard(None, dir.path().to_path_buf());
        assert!(!tab.reload());
        assert!(tab.error().unwrap().contains("git.repo"));
    }

    #[test]
    fn test_reload_delivers_status_through_tick() {
        let dir = tempfile::tempdir().unwrap();
        let mut tab = dashboard(Some("octocat/demo"), dir.path().to_path_buf());
        assert!(tab.reload());

        let deadline = Instant::now() + Duration::from_secs(5);
        while tab.status().is_none() && Instant::now() < deadline {
            tab.tick(Instant::now());
            thread::sleep(Duration::from_millis(5));
        }
        let status = tab.status().expect("status loaded");
        assert_eq!(status.info.name, "demo");
        assert!(!tab.is_loading());
    }

    #[test]
    fn test_tick_tails_logs_once_per_interval() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("repodeck.log");
        fs::write(&log, "started\n").unwrap();

        let mut tab = dashboard(None, dir.path().to_path_buf());
        let start = Instant::now();
        assert!(tab.tick(start));
        assert_eq!(tab.log_view().plain_text(), "started\n");
        assert_eq!(tab.log_file().as_deref(), Some("repodeck.log"));

        fs::write(&log, "started\nmore\n").unwrap();
        assert!(!tab.tick(start + Duration::from_millis(100)));
        assert!(tab.tick(start + LOG_POLL_INTERVAL));
        assert_eq!(tab.log_view().plain_text(), "started\nmore\n");
    }

    #[test]
    fn test_toggle_logs() {
        let dir = tempfile::tempdir().unwrap();
        let mut tab = dashboard(None, dir.path().to_path_buf());
        assert!(!tab.logs_collapsed());
        tab.toggle_logs();
        assert!(tab.logs_collapsed());
        tab.toggle_logs();
        assert!(!tab.logs_collapsed());
    }
}
