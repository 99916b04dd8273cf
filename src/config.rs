//! Configuration and color scheme management for repodeck.
//!
//! This module provides:
//! - TOML configuration file loading from `~/.repodeck/config.toml`
//! - Required-key presence checks against the raw document
//! - The dark/light display mode and the UI color schemes for each
//!
//! # Configuration File
//!
//! ```toml
//! app_title = "RepoDeck"
//! mode = "dark"            # "dark" or "light"
//!
//! [git]
//! user = "octocat"
//! repo = "hello-world"
//! token = ""               # falls back to $GITHUB_TOKEN
//! branch = "main"
//!
//! [paths]
//! engine = "C:/Program Files/Epic Games/UE_5.3/Engine/Binaries/Win64/UnrealEditor.exe"
//! project = "C:/Projects/Game/Game.uproject"
//! git = "git"
//!
//! [dashboard]
//! recent_commits = 5
//! refresh_secs = 300     # 0 = reload with F5 only
//!
//! [terminal]
//! shell = "cmd.exe /Q"
//!
//! [logging]
//! dir = "logs"
//! level = "info"
//! ```
//!
//! The configuration is an explicit value: components receive what they need
//! at construction and changes are saved back with [`Config::save`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Keys that must be present before the app starts
pub const REQUIRED_KEYS: &[&str] = &["app_title", "git"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Missing required configuration keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Display mode of the UI chrome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Dark,
    Light,
}

impl Mode {
    pub fn toggled(self) -> Self {
        match self {
            Mode::Dark => Mode::Light,
            Mode::Light => Mode::Dark,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Dark => "dark",
            Mode::Light => "light",
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Window / tab bar title
    pub app_title: String,
    /// Display mode, `dark` or `light`
    pub mode: String,
    pub git: GitConfig,
    pub paths: ToolPaths,
    pub dashboard: DashboardConfig,
    pub terminal: TerminalConfig,
    pub logging: LoggingConfig,
    /// Keys this version does not know, written back unchanged on save
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_title: "RepoDeck".to_string(),
            mode: "dark".to_string(),
            git: GitConfig::default(),
            paths: ToolPaths::default(),
            dashboard: DashboardConfig::default(),
            terminal: TerminalConfig::default(),
            logging: LoggingConfig::default(),
            extra: toml::Table::new(),
        }
    }
}

/// Hosted repository the dashboard reports on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub user: String,
    pub repo: String,
    pub token: String,
    pub branch: String,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            repo: String::new(),
            token: String::new(),
            branch: "main".to_string(),
            extra: toml::Table::new(),
        }
    }
}

impl GitConfig {
    /// `owner/repo`, or `None` when either half is missing
    pub fn full_name(&self) -> Option<String> {
        if self.user.trim().is_empty() || self.repo.trim().is_empty() {
            None
        } else {
            Some(format!("{}/{}", self.user.trim(), self.repo.trim()))
        }
    }

    /// Token from the config, else from `GITHUB_TOKEN`
    pub fn resolve_token(&self) -> Option<String> {
        let token = self.token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
        std::env::var("GITHUB_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())
    }
}

/// Paths to external tools
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Engine executable
    pub engine: String,
    /// Project file opened by the engine
    pub project: String,
    /// Version-control executable
    pub git: String,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            engine: String::new(),
            project: String::new(),
            git: "git".to_string(),
            extra: toml::Table::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Number of recent commits listed
    pub recent_commits: usize,
    /// Automatic reload interval in seconds, 0 disables it
    pub refresh_secs: u64,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            recent_commits: 5,
            refresh_secs: 300,
            extra: toml::Table::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Shell command line; platform default when unset
    pub shell: Option<String>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log directory; `~/.repodeck/logs` when unset
    pub dir: Option<PathBuf>,
    /// Default filter when `RUST_LOG` is not set
    pub level: Option<String>,
    #[serde(flatten)]
    pub extra: toml::Table,
}

impl Config {
    /// Load configuration from `path`
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load `path`, writing a default configuration there first if it is missing
    pub fn load_or_init(path: &Path) -> Result<Self> {
        if !path.exists() {
            Self::default().save(path)?;
        }
        Self::load(path)
    }

    /// Save configuration to `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Display mode; anything other than `dark` counts as light
    pub fn mode(&self) -> Mode {
        if self.mode.eq_ignore_ascii_case("dark") {
            Mode::Dark
        } else {
            Mode::Light
        }
    }

    /// Flip dark/light. An unknown mode becomes `light`.
    pub fn toggle_mode(&mut self) -> Mode {
        let known = ["dark", "light"]
            .iter()
            .any(|m| self.mode.eq_ignore_ascii_case(m));
        let next = if known { self.mode().toggled() } else { Mode::Light };
        self.mode = next.as_str().to_string();
        next
    }

    /// Shell command line for the terminal tab
    pub fn shell(&self) -> String {
        self.terminal
            .shell
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(crate::core::pty::default_shell)
    }

    /// Directory for log files
    pub fn log_dir(&self) -> PathBuf {
        self.logging
            .dir
            .clone()
            .unwrap_or_else(|| app_dir().join("logs"))
    }

    /// Get the color scheme for the current mode
    pub fn get_color_scheme(&self) -> ColorScheme {
        ColorScheme::for_mode(self.mode())
    }
}

/// Top-level keys missing from the document at `path`
pub fn missing_keys(path: &Path, required: &[&str]) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = content.parse().map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(required
        .iter()
        .filter(|key| !table.contains_key(**key))
        .map(|key| key.to_string())
        .collect())
}

/// Whether every key in `required` is present in the document at `path`
pub fn check_config(path: &Path, required: &[&str]) -> Result<bool> {
    Ok(missing_keys(path, required)?.is_empty())
}

/// `~/.repodeck`
pub fn app_dir() -> PathBuf {
    home_dir()
        .map(|home| home.join(".repodeck"))
        .unwrap_or_else(|| PathBuf::from(".repodeck"))
}

/// Default config file path
pub fn default_config_path() -> PathBuf {
    app_dir().join("config.toml")
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Colors of the UI chrome (terminal output keeps its own ANSI palette)
#[derive(Debug, Clone)]
pub struct ColorScheme {
    pub background: Color,
    pub foreground: Color,
    pub muted: Color,
    pub accent: Color,

    pub tab_bar_bg: Color,
    pub tab_active_bg: Color,
    pub tab_active_fg: Color,
    pub tab_inactive_fg: Color,

    pub status_bar_bg: Color,
    pub status_bar_fg: Color,

    pub panel_title: Color,
    pub error: Color,

    pub log_bg: Color,
    pub log_fg: Color,
}

impl ColorScheme {
    pub fn for_mode(mode: Mode) -> Self {
        match mode {
            Mode::Dark => Self::dark(),
            Mode::Light => Self::light(),
        }
    }

    pub fn dark() -> Self {
        Self {
            background: Color::new(26, 27, 38),
            foreground: Color::new(192, 202, 245),
            muted: Color::new(86, 95, 137),
            accent: Color::new(122, 162, 247),

            tab_bar_bg: Color::new(36, 40, 59),
            tab_active_bg: Color::new(122, 162, 247),
            tab_active_fg: Color::new(26, 27, 38),
            tab_inactive_fg: Color::new(169, 177, 214),

            status_bar_bg: Color::new(36, 40, 59),
            status_bar_fg: Color::new(169, 177, 214),

            panel_title: Color::new(158, 206, 106),
            error: Color::new(247, 118, 142),

            log_bg: Color::new(30, 30, 30),
            log_fg: Color::new(255, 255, 255),
        }
    }

    pub fn light() -> Self {
        Self {
            background: Color::new(253, 246, 227),
            foreground: Color::new(88, 110, 117),
            muted: Color::new(147, 161, 161),
            accent: Color::new(38, 139, 210),

            tab_bar_bg: Color::new(238, 232, 213),
            tab_active_bg: Color::new(38, 139, 210),
            tab_active_fg: Color::new(253, 246, 227),
            tab_inactive_fg: Color::new(101, 123, 131),

            status_bar_bg: Color::new(238, 232, 213),
            status_bar_fg: Color::new(101, 123, 131),

            panel_title: Color::new(133, 153, 0),
            error: Color::new(220, 50, 47),

            log_bg: Color::new(30, 30, 30),
            log_fg: Color::new(255, 255, 255),
        }
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode(), Mode::Dark);
        assert_eq!(config.dashboard.recent_commits, 5);
        assert_eq!(config.git.branch, "main");
        assert!(config.git.full_name().is_none());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            app_title = "Studio"
            [git]
            user = "octocat"
            repo = "hello-world"
            "#,
        )
        .unwrap();
        assert_eq!(config.app_title, "Studio");
        assert_eq!(config.git.full_name().as_deref(), Some("octocat/hello-world"));
        assert_eq!(config.dashboard.recent_commits, 5);
        assert_eq!(config.paths.git, "git");
    }

    #[test]
    fn test_save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.git.user = "octocat".to_string();
        config.git.repo = "spoon-knife".to_string();
        config.dashboard.recent_commits = 8;
        config.terminal.shell = Some("pwsh.exe -NoLogo".to_string());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.git.repo, "spoon-knife");
        assert_eq!(loaded.dashboard.recent_commits, 8);
        assert_eq!(loaded.shell(), "pwsh.exe -NoLogo");
    }

    #[test]
    fn test_save_keeps_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            app_title = "T"
            theme_accent = "teal"

            [git]
            user = "octocat"
            repo = "hello-world"
            remote = "upstream"

            [workflow]
            steps = ["build"]
            "#,
        )
        .unwrap();

        let mut config = Config::load(&path).unwrap();
        config.toggle_mode();
        config.save(&path).unwrap();

        let raw: toml::Table = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme_accent"].as_str(), Some("teal"));
        assert_eq!(raw["git"]["remote"].as_str(), Some("upstream"));
        let steps = raw["workflow"]["steps"].as_array().unwrap();
        assert_eq!(steps[0].as_str(), Some("build"));
        assert_eq!(raw["mode"].as_str(), Some("light"));
    }

    #[test]
    fn test_load_or_init_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load_or_init(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.app_title, "RepoDeck");
        assert!(check_config(&path, REQUIRED_KEYS).unwrap());
    }

    #[test]
    fn test_missing_required_keys_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "mode = \"light\"\n[git]\nuser = \"a\"\n").unwrap();

        assert!(!check_config(&path, REQUIRED_KEYS).unwrap());
        assert_eq!(missing_keys(&path, REQUIRED_KEYS).unwrap(), vec!["app_title"]);
    }

    #[test]
    fn test_invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "app_title = ").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_toggle_mode() {
        let mut config = Config::default();
        assert_eq!(config.toggle_mode(), Mode::Light);
        assert_eq!(config.mode, "light");
        assert_eq!(config.toggle_mode(), Mode::Dark);

        config.mode = "sepia".to_string();
        assert_eq!(config.toggle_mode(), Mode::Light);
        assert_eq!(config.get_color_scheme().background, ColorScheme::light().background);
    }

    #[test]
    fn test_token_prefers_config_value() {
        let git = GitConfig {
            token: " abc ".to_string(),
            ..GitConfig::default()
        };
        assert_eq!(git.resolve_token().as_deref(), Some("abc"));
    }
}
