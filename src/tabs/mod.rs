//! Application tabs.
//!
//! - **dashboard**: repository status and log tail
//! - **terminal**: shell session with styled output and a command line

pub mod dashboard;
pub mod terminal;

pub use dashboard::DashboardTab;
pub use terminal::TerminalTab;

/// Which tab is in front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabKind {
    Dashboard,
    Terminal,
}

impl TabKind {
    pub const ALL: [TabKind; 2] = [TabKind::Dashboard, TabKind::Terminal];

    pub fn title(self) -> &'static str {
        match self {
            TabKind::Dashboard => "Dashboard",
            TabKind::Terminal => "Terminal",
        }
    }

    /// Function key that selects this tab
    pub fn hotkey(self) -> u8 {
        self.index() as u8 + 1
    }

    pub fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}
