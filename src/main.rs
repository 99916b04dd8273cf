//! repodeck - A repository dashboard with a built-in shell terminal
//!
//! repodeck shows an at-a-glance status of one GitHub repository next to an
//! interactive shell running on a pseudo terminal, in a tabbed terminal UI.
//!
//! # Quick Start
//!
//! ```text
//! repodeck                     # Config from ~/.repodeck/config.toml
//! repodeck -c ./deck.toml      # Another config file
//! repodeck -s "pwsh.exe -NoLogo"
//! ```
//!
//! # Keybindings
//!
//! | Key | Action |
//! |-----|--------|
//! | F1 / F2, Ctrl+Left/Right | Switch tab |
//! | F5 | Reload dashboard |
//! | F4 | Collapse/expand logs |
//! | Ctrl+Alt+M | Toggle dark/light mode |
//! | PageUp / PageDown | Scroll output |
//! | Ctrl+V | Paste into the command line |
//! | Ctrl+Q | Quit |

mod config;
mod core;
mod dashboard;
mod tabs;
mod ui;

use std::env;
use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::SetTitle;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{check_config, missing_keys, Config, ConfigError, REQUIRED_KEYS};
use crate::core::session::ShellSession;
use crate::dashboard::github::GithubClient;
use crate::dashboard::summary::LoadOptions;
use crate::tabs::{DashboardTab, TabKind, TerminalTab};
use crate::ui::renderer::terminal_output_size;
use crate::ui::{Renderer, StatusInfo};

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// UI poll interval
const TICK: Duration = Duration::from_millis(50);

/// Command line options
#[derive(Debug, Default, PartialEq)]
struct Args {
    config_path: Option<PathBuf>,
    shell: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Command {
    Run(Args),
    Help,
    Version,
}

fn print_version() {
    eprintln!("repodeck {}", VERSION);
}

fn print_help() {
    eprintln!("repodeck {} - Repository dashboard with a built-in shell", VERSION);
    eprintln!();
    eprintln!("Usage: repodeck [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <PATH>   Config file (default: ~/.repodeck/config.toml)");
    eprintln!("  -s, --shell <CMD>     Shell command line for the terminal tab");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  F1 / F2               Dashboard / Terminal (also Ctrl+Left/Right)");
    eprintln!("  F5                    Reload dashboard");
    eprintln!("  F4                    Collapse or expand the log panel");
    eprintln!("  Ctrl+Alt+M            Toggle dark/light mode");
    eprintln!("  PageUp / PageDown     Scroll output");
    eprintln!("  Ctrl+V                Paste");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!();
    eprintln!("Logs: RUST_LOG overrides [logging] level");
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Command, String> {
    let mut args = args.into_iter().skip(1);
    let mut parsed = Args::default();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => return Ok(Command::Help),
            "-v" | "--version" => return Ok(Command::Version),
            "-c" | "--config" => {
                let path = args.next().ok_or("Missing config path argument")?;
                parsed.config_path = Some(PathBuf::from(path));
            }
            "-s" | "--shell" => {
                let shell = args.next().ok_or("Missing shell argument")?;
                parsed.shell = Some(shell);
            }
            other => return Err(format!("Unknown argument: {}. Use -h for help.", other)),
        }
    }

    Ok(Command::Run(parsed))
}

/// Host name for log file names, reduced to `[A-Za-z0-9-]`
fn host_name() -> String {
    let raw = env::var("COMPUTERNAME")
        .or_else(|_| env::var("HOSTNAME"))
        .ok()
        .or_else(|| fs::read_to_string("/etc/hostname").ok())
        .unwrap_or_default();
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if cleaned.is_empty() {
        "localhost".to_string()
    } else {
        cleaned
    }
}

/// `repodeck-<DDMMYYYYHHMMSS>-<host>.log`
fn log_file_name(started: OffsetDateTime, host: &str) -> String {
    let stamp = started
        .format(format_description!(
            "[day][month][year][hour][minute][second]"
        ))
        .unwrap_or_else(|_| started.unix_timestamp().to_string());
    format!("repodeck-{}-{}.log", stamp, host)
}

/// Send tracing output to a fresh file in the log directory
fn init_logging(config: &Config) -> anyhow::Result<PathBuf> {
    let dir = config.log_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

    // Local time is only available while single-threaded
    let started = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let path = dir.join(log_file_name(started, &host_name()));
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let default_level = config.logging.level.as_deref().unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")?;

    Ok(path)
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args(env::args()) {
        Ok(Command::Run(args)) => args,
        Ok(Command::Help) => {
            print_help();
            return Ok(());
        }
        Ok(Command::Version) => {
            print_version();
            return Ok(());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    let config_path = args
        .config_path
        .unwrap_or_else(config::default_config_path);
    let mut config = Config::load_or_init(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    if !check_config(&config_path, REQUIRED_KEYS)? {
        let missing = missing_keys(&config_path, REQUIRED_KEYS)?;
        return Err(ConfigError::MissingKeys(missing).into());
    }

    let log_path = init_logging(&config)?;
    info!("repodeck {} starting", VERSION);
    info!("Config: {}", config_path.display());
    info!("Log file: {}", log_path.display());

    // Ask before the UI takes over the console
    if config.git.resolve_token().is_none() && io::stdin().is_terminal() {
        warn!("GitHub token is missing in the configuration");
        let mut input = io::stdin().lock();
        let mut output = io::stdout();
        if let Err(e) = store_prompted_token(&mut config, &config_path, &mut input, &mut output) {
            warn!("{:#}", e);
        }
    }

    let shell = args.shell.unwrap_or_else(|| config.shell());
    let result = run(config, config_path, &shell);
    if let Err(e) = &result {
        error!("Exiting with error: {:#}", e);
    }
    info!("repodeck stopped");
    result
}

/// What a key press asks the main loop to do
enum Action {
    None,
    Redraw,
    Quit,
}

struct App {
    config: Config,
    config_path: PathBuf,
    active: TabKind,
    dashboard: DashboardTab,
    terminal: Result<TerminalTab, String>,
    renderer: Renderer,
    size: (u16, u16),
}

fn run(config: Config, config_path: PathBuf, shell: &str) -> anyhow::Result<()> {
    let token = config.git.resolve_token();
    if token.is_none() {
        warn!("No GitHub token configured, requests are unauthenticated");
    }
    let client = GithubClient::new(token).context("Failed to create GitHub client")?;

    let repo = config.git.full_name();
    let options = LoadOptions {
        recent_commits: config.dashboard.recent_commits,
        branch: config.git.branch.clone(),
    };
    let mut dashboard = DashboardTab::new(
        Arc::new(client),
        repo,
        options,
        config.log_dir(),
        config.dashboard.refresh_secs,
    );
    dashboard.reload();

    let terminal = match ShellSession::spawn(shell) {
        Ok((session, output)) => Ok(TerminalTab::new(Box::new(session), output)),
        Err(e) => {
            error!("Failed to start shell: {}", e);
            Err(e.to_string())
        }
    };

    let mut renderer = Renderer::with_color_scheme(config.get_color_scheme());
    renderer.init()?;
    let mut stdout = std::io::stdout();
    let _ = execute!(stdout, SetTitle(&config.app_title));

    let mut app = App {
        config,
        config_path,
        active: TabKind::Dashboard,
        dashboard,
        terminal,
        renderer,
        size: Renderer::size()?,
    };
    app.resize(app.size.0, app.size.1);
    app.main_loop()
}

impl App {
    fn main_loop(&mut self) -> anyhow::Result<()> {
        self.render()?;

        loop {
            let mut dirty = false;

            if let Ok(terminal) = &mut self.terminal {
                dirty |= terminal.tick() && self.active == TabKind::Terminal;
            }
            dirty |= self.dashboard.tick(Instant::now()) && self.active == TabKind::Dashboard;

            if event::poll(TICK)? {
                match event::read()? {
                    Event::Key(key) if key.kind == KeyEventKind::Press => {
                        match self.handle_key(key) {
                            Action::Quit => break,
                            Action::Redraw => dirty = true,
                            Action::None => {}
                        }
                    }
                    Event::Resize(width, height) => {
                        self.resize(width, height);
                        dirty = true;
                    }
                    _ => {}
                }
            }

            if dirty {
                self.render()?;
            }
        }

        info!("Quit requested");
        Ok(())
    }

    fn resize(&mut self, width: u16, height: u16) {
        self.size = (width, height);
        if let Ok(terminal) = &mut self.terminal {
            let (cols, rows) = terminal_output_size(width, height);
            terminal.resize(cols, rows);
        }
    }

    /// Rows moved by PageUp/PageDown
    fn page_rows(&self) -> usize {
        let (_, rows) = terminal_output_size(self.size.0, self.size.1);
        (rows as usize).saturating_sub(1).max(1)
    }

    fn handle_key(&mut self, key: KeyEvent) -> Action {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('q') if ctrl && !alt => return Action::Quit,
            KeyCode::Char('m') | KeyCode::Char('M') if ctrl && alt => {
                self.toggle_mode();
                return Action::Redraw;
            }
            KeyCode::F(1) => return self.switch_to(TabKind::Dashboard),
            KeyCode::F(2) => return self.switch_to(TabKind::Terminal),
            KeyCode::Left if ctrl => return self.switch_to(self.active.prev()),
            KeyCode::Right if ctrl => return self.switch_to(self.active.next()),
            KeyCode::F(5) => {
                self.dashboard.reload();
                return Action::Redraw;
            }
            KeyCode::F(4) => {
                self.dashboard.toggle_logs();
                return Action::Redraw;
            }
            _ => {}
        }

        let page = self.page_rows();
        match self.active {
            TabKind::Dashboard => match key.code {
                KeyCode::PageUp => self.dashboard.log_view_mut().scroll_up(page),
                KeyCode::PageDown => self.dashboard.log_view_mut().scroll_down(page),
                _ => return Action::None,
            },
            TabKind::Terminal => {
                let Ok(terminal) = &mut self.terminal else {
                    return Action::None;
                };
                match key.code {
                    KeyCode::Enter => {
                        terminal.submit();
                    }
                    KeyCode::Char('v') if ctrl && !alt => {
                        terminal.input_mut().paste_from_clipboard();
                    }
                    // Ctrl+Alt is AltGr on Windows keyboards
                    KeyCode::Char(c) if !ctrl || alt => terminal.input_mut().insert_char(c),
                    KeyCode::Backspace => terminal.input_mut().backspace(),
                    KeyCode::Delete => terminal.input_mut().delete(),
                    KeyCode::Left => terminal.input_mut().move_left(),
                    KeyCode::Right => terminal.input_mut().move_right(),
                    KeyCode::Home => terminal.input_mut().home(),
                    KeyCode::End => terminal.input_mut().end(),
                    KeyCode::PageUp => terminal.view_mut().scroll_up(page),
                    KeyCode::PageDown => terminal.view_mut().scroll_down(page),
                    _ => return Action::None,
                }
            }
        }
        Action::Redraw
    }

    fn switch_to(&mut self, tab: TabKind) -> Action {
        if self.active == tab {
            return Action::None;
        }
        self.active = tab;
        Action::Redraw
    }

    /// Flip dark/light and save the choice right away
    fn toggle_mode(&mut self) {
        let mode = self.config.toggle_mode();
        info!("Display mode: {}", mode.as_str());
        self.renderer.set_color_scheme(self.config.get_color_scheme());
        if let Err(e) = save_config(&self.config, &self.config_path) {
            warn!("{:#}", e);
        }
    }

    fn render(&self) -> anyhow::Result<()> {
        let shell_state = match &self.terminal {
            Ok(t) if t.is_running() => "running",
            Ok(_) => "exited",
            Err(_) => "unavailable",
        };
        let message = if self.dashboard.is_loading() {
            Some("loading...")
        } else {
            None
        };
        let status = StatusInfo {
            mode: self.config.mode().as_str(),
            shell: shell_state,
            message,
        };

        let title = &self.config.app_title;
        match self.active {
            TabKind::Dashboard => self
                .renderer
                .render_dashboard(title, &self.dashboard, &status)?,
            TabKind::Terminal => self.renderer.render_terminal(
                title,
                self.terminal.as_ref().map_err(String::as_str),
                &status,
            )?,
        }
        Ok(())
    }
}

/// Ask for a GitHub token on the console; an empty answer means none
fn prompt_token<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> io::Result<Option<String>> {
    write!(output, "GitHub token (empty to continue unauthenticated): ")?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let token = line.trim();
    Ok((!token.is_empty()).then(|| token.to_string()))
}

/// Prompt for a token and save it into `git.token`.
/// Returns whether one was entered.
fn store_prompted_token<R: BufRead, W: Write>(
    config: &mut Config,
    config_path: &Path,
    input: &mut R,
    output: &mut W,
) -> anyhow::Result<bool> {
    let Some(token) = prompt_token(input, output).context("Failed to read token")? else {
        return Ok(false);
    };
    config.git.token = token;
    save_config(config, config_path)?;
    info!("GitHub token saved to {}", config_path.display());
    Ok(true)
}

fn save_config(config: &Config, path: &Path) -> anyhow::Result<()> {
    config
        .save(path)
        .with_context(|| format!("Failed to save config {}", path.display()))
}
