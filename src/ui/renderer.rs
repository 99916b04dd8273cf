//! Screen renderer for the tabbed UI.
//!
//! Draws the whole frame on every call:
//!
//! ```text
//! row 0        tab bar        F1 Dashboard │ F2 Terminal          <title>
//! rows 1..h-1  active tab     dashboard panels, or output + input line
//! row h-1      status bar     mode, shell state, shortcuts
//! ```
//!
//! Frames are wrapped in a synchronized update with autowrap off, so a
//! partially drawn frame is never shown.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Attribute, Color as CtColor, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{self, Clear, ClearType},
};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;
use unicode_width::UnicodeWidthChar;

use crate::config::{Color, ColorScheme};
use crate::core::ansi::{Attrs, Style};
use crate::tabs::{DashboardTab, TabKind, TerminalTab};
use crate::ui::input::InputLine;
use crate::ui::view::OutputView;

/// Begin a render frame (synchronized update, hide cursor, disable autowrap)
fn begin_frame<W: Write>(out: &mut W) -> io::Result<()> {
    write!(out, "\x1b[?2026h")?; // Begin synchronized update
    write!(out, "\x1b[?7l")?; // Disable autowrap
    execute!(out, Hide)?;
    Ok(())
}

/// End a render frame, placing the cursor if one should be shown
fn end_frame<W: Write>(out: &mut W, cursor: Option<(u16, u16)>) -> io::Result<()> {
    if let Some((x, y)) = cursor {
        execute!(out, MoveTo(x, y), Show)?;
    }
    write!(out, "\x1b[?7h")?; // Enable autowrap
    write!(out, "\x1b[?2026l")?; // End synchronized update
    out.flush()?;
    Ok(())
}

/// Execute a render operation with frame guards, ensuring cleanup on error
fn with_frame<W: Write, F>(out: &mut W, f: F) -> io::Result<()>
where
    F: FnOnce(&mut W) -> io::Result<Option<(u16, u16)>>,
{
    begin_frame(out)?;
    let result = f(out);
    // Always end frame, even on error
    let cursor = result.as_ref().ok().copied().flatten();
    let _ = end_frame(out, cursor);
    result.map(|_| ())
}

/// Rows taken by the tab bar, input line and status bar
const TERMINAL_CHROME_ROWS: u16 = 3;

/// Size of the terminal output area for a screen of `width` x `height`
pub fn terminal_output_size(width: u16, height: u16) -> (u16, u16) {
    (width, height.saturating_sub(TERMINAL_CHROME_ROWS))
}

/// Write `text` within `max_cols` columns, dropping control characters.
/// Returns the columns used.
fn write_clipped<W: Write>(out: &mut W, text: &str, max_cols: usize) -> io::Result<usize> {
    let mut used = 0;
    for ch in text.chars() {
        if ch.is_control() {
            continue;
        }
        let w = ch.width().unwrap_or(0);
        if used + w > max_cols {
            break;
        }
        write!(out, "{}", ch)?;
        used += w;
    }
    Ok(used)
}

/// Display width of `text`, ignoring control characters
fn text_width(text: &str) -> usize {
    text.chars()
        .filter(|c| !c.is_control())
        .map(|c| c.width().unwrap_or(0))
        .sum()
}

/// `YYYY-MM-DD HH:MM` for an RFC 3339 timestamp, else the input
fn short_date(value: &str) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    OffsetDateTime::parse(value, &Rfc3339)
        .ok()
        .and_then(|date| date.format(&format).ok())
        .unwrap_or_else(|| value.to_string())
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

/// Visible part of the input line: the text after `skip` chars, and the
/// cursor column relative to it, for a field `avail` columns wide
fn input_viewport(input: &InputLine, avail: usize) -> (usize, usize) {
    let cursor_col = input.cursor_col();
    let mut skip = 0;
    let mut skipped_cols = 0;
    if avail == 0 {
        return (0, 0);
    }
    for ch in input.text().chars() {
        if cursor_col - skipped_cols < avail {
            break;
        }
        skipped_cols += ch.width().unwrap_or(0);
        skip += 1;
    }
    (skip, cursor_col - skipped_cols)
}

/// One line of the dashboard panel
#[derive(Debug, Clone, PartialEq)]
pub enum PanelLine {
    Title(String),
    Text(String),
    Muted(String),
    Error(String),
    Blank,
}

/// Dashboard content above the log panel
pub fn dashboard_lines(tab: &DashboardTab) -> Vec<PanelLine> {
    let mut lines = Vec::new();

    if let Some(error) = tab.error() {
        lines.push(PanelLine::Error(format!("Error: {}", error)));
        lines.push(PanelLine::Blank);
    }

    let Some(status) = tab.status() else {
        let hint = match (tab.repo(), tab.is_loading()) {
            (None, _) => "No repository configured".to_string(),
            (Some(repo), true) => format!("Loading {} ...", repo),
            (Some(repo), false) => format!("{}: press F5 to load", repo),
        };
        lines.push(PanelLine::Muted(hint));
        return lines;
    };

    lines.push(PanelLine::Title(format!("Status  {}", status.repo)));
    for (label, value) in status.rows() {
        lines.push(PanelLine::Text(format!("  {:<16}{}", label, value)));
    }

    lines.push(PanelLine::Blank);
    lines.push(PanelLine::Title("Recent commits".to_string()));
    if status.recent_commits.is_empty() {
        lines.push(PanelLine::Muted("  none".to_string()));
    }
    for commit in &status.recent_commits {
        lines.push(PanelLine::Text(format!(
            "  {}  {:>6} {:>6}  {:<16}  {}  {}",
            short_sha(&commit.sha),
            format!("+{}", commit.stats.additions),
            format!("-{}", commit.stats.deletions),
            short_date(&commit.date),
            commit.author,
            commit.message
        )));
    }

    if let Some(commit) = &status.last_commit {
        lines.push(PanelLine::Blank);
        lines.push(PanelLine::Title("Last commit".to_string()));
        lines.push(PanelLine::Text(format!(
            "  {}  {}",
            short_sha(&commit.sha),
            commit.short_message
        )));
        lines.push(PanelLine::Text(format!(
            "  {} <{}>  {}",
            commit.author_name,
            commit.author_email,
            short_date(&commit.author_date)
        )));
        lines.push(PanelLine::Muted(format!(
            "  {} file(s) changed",
            commit.files_changed
        )));
    }

    let loaded = status
        .loaded_at
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    lines.push(PanelLine::Blank);
    lines.push(PanelLine::Muted(format!("Updated {} UTC", loaded)));
    lines
}

/// What the status bar reports besides the shortcuts
pub struct StatusInfo<'a> {
    pub mode: &'a str,
    pub shell: &'a str,
    pub message: Option<&'a str>,
}

/// Full-screen renderer
pub struct Renderer {
    initialized: bool,
    pub color_scheme: ColorScheme,
}

impl Renderer {
    pub fn with_color_scheme(color_scheme: ColorScheme) -> Self {
        Self {
            initialized: false,
            color_scheme,
        }
    }

    pub fn set_color_scheme(&mut self, scheme: ColorScheme) {
        self.color_scheme = scheme;
    }

    /// Enter raw mode and the alternate screen
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            terminal::EnterAlternateScreen,
            Clear(ClearType::All)
        )?;
        stdout.flush()?;

        self.initialized = true;
        Ok(())
    }

    /// Restore the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }

        let mut stdout = io::stdout();

        // Restore terminal state (in case of abnormal exit)
        write!(stdout, "\x1b[?7h")?; // Enable autowrap
        write!(stdout, "\x1b[?2026l")?; // End synchronized update (if active)
        stdout.flush()?;

        execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            terminal::LeaveAlternateScreen
        )?;
        terminal::disable_raw_mode()?;
        self.initialized = false;
        Ok(())
    }

    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }

    /// Draw the terminal tab
    pub fn render_terminal(
        &self,
        title: &str,
        tab: Result<&TerminalTab, &str>,
        status: &StatusInfo,
    ) -> io::Result<()> {
        let (width, height) = Self::size()?;
        let mut stdout = io::BufWriter::with_capacity(65536, io::stdout().lock());

        with_frame(&mut stdout, |out| {
            self.render_tab_bar(out, width, title, TabKind::Terminal)?;
            let cursor = match tab {
                Ok(tab) => {
                    let (_, rows) = terminal_output_size(width, height);
                    self.render_output(out, 1, width, rows, tab.view(), true)?;
                    self.render_input(out, height.saturating_sub(2), width, tab.input())?
                }
                Err(message) => {
                    self.clear_rows(out, 1, height.saturating_sub(1), width)?;
                    self.put_line(
                        out,
                        1,
                        width,
                        &format!("Shell unavailable: {}", message),
                        self.color_scheme.error,
                        self.color_scheme.background,
                    )?;
                    None
                }
            };
            self.render_status_bar(out, width, height, status)?;
            Ok(cursor)
        })
    }

    /// Draw the dashboard tab
    pub fn render_dashboard(
        &self,
        title: &str,
        tab: &DashboardTab,
        status: &StatusInfo,
    ) -> io::Result<()> {
        let (width, height) = Self::size()?;
        let mut stdout = io::BufWriter::with_capacity(65536, io::stdout().lock());
        let cs = &self.color_scheme;

        with_frame(&mut stdout, |out| {
            self.render_tab_bar(out, width, title, TabKind::Dashboard)?;

            let content_top = 1;
            let content_rows = height.saturating_sub(2);
            let log_rows = if tab.logs_collapsed() {
                1.min(content_rows)
            } else {
                (content_rows / 2).max(3).min(content_rows)
            };
            let panel_rows = content_rows - log_rows;

            let lines = dashboard_lines(tab);
            for row in 0..panel_rows {
                let y = content_top + row;
                let (text, fg) = match lines.get(row as usize) {
                    Some(PanelLine::Title(t)) => (t.as_str(), cs.panel_title),
                    Some(PanelLine::Text(t)) => (t.as_str(), cs.foreground),
                    Some(PanelLine::Muted(t)) => (t.as_str(), cs.muted),
                    Some(PanelLine::Error(t)) => (t.as_str(), cs.error),
                    Some(PanelLine::Blank) | None => ("", cs.foreground),
                };
                self.put_line(out, y, width, text, fg, cs.background)?;
            }

            if log_rows > 0 {
                let header_y = content_top + panel_rows;
                let marker = if tab.logs_collapsed() { '▶' } else { '▼' };
                let header = match tab.log_file() {
                    Some(name) => format!("{} Logs (F4)  {}", marker, name),
                    None => format!("{} Logs (F4)", marker),
                };
                self.put_line(out, header_y, width, &header, cs.accent, cs.tab_bar_bg)?;
                if log_rows > 1 {
                    self.render_log(out, header_y + 1, width, log_rows - 1, tab.log_view())?;
                }
            }

            self.render_status_bar(out, width, height, status)?;
            Ok(None)
        })
    }

    fn render_tab_bar<W: Write>(
        &self,
        out: &mut W,
        width: u16,
        title: &str,
        active: TabKind,
    ) -> io::Result<()> {
        let cs = &self.color_scheme;
        execute!(out, MoveTo(0, 0))?;
        execute!(
            out,
            SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
            SetForegroundColor(cs.tab_inactive_fg.to_crossterm())
        )?;
        write!(out, "{:width$}", "", width = width as usize)?;
        execute!(out, MoveTo(0, 0))?;

        let mut used = 0;
        for (i, tab) in TabKind::ALL.iter().enumerate() {
            if *tab == active {
                execute!(
                    out,
                    SetBackgroundColor(cs.tab_active_bg.to_crossterm()),
                    SetForegroundColor(cs.tab_active_fg.to_crossterm())
                )?;
            } else {
                execute!(
                    out,
                    SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
                    SetForegroundColor(cs.tab_inactive_fg.to_crossterm())
                )?;
            }
            let label = format!(" F{} {} ", tab.hotkey(), tab.title());
            used += write_clipped(out, &label, (width as usize).saturating_sub(used))?;

            if i < TabKind::ALL.len() - 1 {
                execute!(
                    out,
                    SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
                    SetForegroundColor(cs.muted.to_crossterm())
                )?;
                used += write_clipped(out, "│", (width as usize).saturating_sub(used))?;
            }
        }

        let title_width = text_width(title) + 1;
        if used + title_width < width as usize {
            execute!(
                out,
                MoveTo(width - title_width as u16, 0),
                SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
                SetForegroundColor(cs.accent.to_crossterm()),
                SetAttribute(Attribute::Bold)
            )?;
            write_clipped(out, title, title_width)?;
            execute!(out, SetAttribute(Attribute::Reset))?;
        }

        execute!(out, ResetColor)?;
        Ok(())
    }

    fn render_status_bar<W: Write>(
        &self,
        out: &mut W,
        width: u16,
        height: u16,
        status: &StatusInfo,
    ) -> io::Result<()> {
        let cs = &self.color_scheme;
        if height < 2 {
            return Ok(());
        }
        execute!(
            out,
            MoveTo(0, height - 1),
            SetBackgroundColor(cs.status_bar_bg.to_crossterm()),
            SetForegroundColor(cs.status_bar_fg.to_crossterm())
        )?;

        let mut left = format!(" {} │ shell: {}", status.mode, status.shell);
        if let Some(message) = status.message {
            left.push_str(" │ ");
            left.push_str(message);
        }
        let shortcuts = "F5 reload  F4 logs  Ctrl+Alt+M mode  Ctrl+Q quit ";

        let width = width as usize;
        let left_len = text_width(&left);
        let right_len = text_width(shortcuts);
        let used = write_clipped(out, &left, width)?;
        if left_len + right_len < width {
            let padding = width - left_len - right_len;
            write!(out, "{:padding$}{}", "", shortcuts, padding = padding)?;
        } else {
            write!(out, "{:pad$}", "", pad = width - used)?;
        }

        execute!(out, ResetColor)?;
        Ok(())
    }

    /// Draw styled output lines, oldest first, from row `top`
    fn render_output<W: Write>(
        &self,
        out: &mut W,
        top: u16,
        width: u16,
        rows: u16,
        view: &OutputView,
        show_scroll: bool,
    ) -> io::Result<()> {
        let cs = &self.color_scheme;
        let mut y = top;

        for line in view.visible_lines(rows as usize) {
            execute!(out, MoveTo(0, y))?;
            let mut used = 0;
            for span in &line.spans {
                self.apply_style(out, &span.style)?;
                used += write_clipped(out, &span.text, (width as usize).saturating_sub(used))?;
            }
            self.apply_style(out, &Style::default())?;
            write!(out, "{:pad$}", "", pad = (width as usize).saturating_sub(used))?;
            y += 1;
        }
        self.clear_rows(out, y, top + rows, width)?;

        if show_scroll && view.is_scrolled() && rows > 0 {
            let indicator = format!("[↑ {} lines]", view.scroll_offset());
            let indicator_width = text_width(&indicator) as u16;
            if indicator_width < width {
                execute!(
                    out,
                    MoveTo(width - indicator_width, top),
                    SetBackgroundColor(cs.tab_active_bg.to_crossterm()),
                    SetForegroundColor(cs.tab_active_fg.to_crossterm())
                )?;
                write!(out, "{}", indicator)?;
            }
        }

        execute!(out, SetAttribute(Attribute::Reset), ResetColor)?;
        Ok(())
    }

    fn render_log<W: Write>(
        &self,
        out: &mut W,
        top: u16,
        width: u16,
        rows: u16,
        view: &OutputView,
    ) -> io::Result<()> {
        let cs = &self.color_scheme;
        let mut y = top;
        for line in view.visible_lines(rows as usize) {
            self.put_line(out, y, width, &line.text(), cs.log_fg, cs.log_bg)?;
            y += 1;
        }
        while y < top + rows {
            self.put_line(out, y, width, "", cs.log_fg, cs.log_bg)?;
            y += 1;
        }
        Ok(())
    }

    /// Draw the input line; returns where the cursor goes
    fn render_input<W: Write>(
        &self,
        out: &mut W,
        y: u16,
        width: u16,
        input: &InputLine,
    ) -> io::Result<Option<(u16, u16)>> {
        let cs = &self.color_scheme;
        const PROMPT: &str = "> ";
        let prompt_width = PROMPT.len();

        execute!(
            out,
            MoveTo(0, y),
            SetBackgroundColor(cs.tab_bar_bg.to_crossterm()),
            SetForegroundColor(cs.accent.to_crossterm())
        )?;
        let mut used = write_clipped(out, PROMPT, width as usize)?;

        let avail = (width as usize).saturating_sub(prompt_width + 1);
        let (skip, cursor_col) = input_viewport(input, avail);
        let visible: String = input.text().chars().skip(skip).collect();

        execute!(out, SetForegroundColor(cs.foreground.to_crossterm()))?;
        used += write_clipped(out, &visible, avail)?;
        write!(out, "{:pad$}", "", pad = (width as usize).saturating_sub(used))?;
        execute!(out, ResetColor)?;

        if (width as usize) <= prompt_width {
            return Ok(None);
        }
        Ok(Some(((prompt_width + cursor_col) as u16, y)))
    }

    fn apply_style<W: Write>(&self, out: &mut W, style: &Style) -> io::Result<()> {
        let cs = &self.color_scheme;
        execute!(
            out,
            SetAttribute(Attribute::Reset),
            SetBackgroundColor(cs.background.to_crossterm())
        )?;
        if style.is_plain() {
            return execute!(out, SetForegroundColor(cs.foreground.to_crossterm()));
        }

        let fg = match style.fg {
            Some(color) => {
                let (r, g, b) = color.rgb();
                CtColor::Rgb { r, g, b }
            }
            None => cs.foreground.to_crossterm(),
        };
        execute!(out, SetForegroundColor(fg))?;

        if style.attrs.contains(Attrs::BOLD) {
            execute!(out, SetAttribute(Attribute::Bold))?;
        }
        if style.attrs.contains(Attrs::UNDERLINE) {
            execute!(out, SetAttribute(Attribute::Underlined))?;
        }
        Ok(())
    }

    /// One full-width row of plain text
    fn put_line<W: Write>(
        &self,
        out: &mut W,
        y: u16,
        width: u16,
        text: &str,
        fg: Color,
        bg: Color,
    ) -> io::Result<()> {
        execute!(
            out,
            MoveTo(0, y),
            SetBackgroundColor(bg.to_crossterm()),
            SetForegroundColor(fg.to_crossterm())
        )?;
        let used = write_clipped(out, text, width as usize)?;
        write!(out, "{:pad$}", "", pad = (width as usize).saturating_sub(used))?;
        execute!(out, ResetColor)?;
        Ok(())
    }

    fn clear_rows<W: Write>(&self, out: &mut W, from: u16, to: u16, width: u16) -> io::Result<()> {
        let cs = &self.color_scheme;
        for y in from..to {
            self.put_line(out, y, width, "", cs.foreground, cs.background)?;
        }
        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::summary::tests::FakeSource;
    use crate::dashboard::summary::LoadOptions;
    use std::sync::Arc;

    #[test]
    fn test_write_clipped_respects_wide_chars() {
        let mut out = Vec::new();
        let used = write_clipped(&mut out, "ab日本", 4).unwrap();
        assert_eq!(used, 4);
        assert_eq!(String::from_utf8(out).unwrap(), "ab日");
    }

    #[test]
    fn test_write_clipped_drops_controls() {
        let mut out = Vec::new();
        write_clipped(&mut out, "a\x1b[31mb", 10).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a[31mb");
    }

    #[test]
    fn test_terminal_output_size() {
        assert_eq!(terminal_output_size(80, 24), (80, 21));
        assert_eq!(terminal_output_size(80, 2), (80, 0));
    }

    #[test]
    fn test_input_viewport_keeps_cursor_visible() {
        let mut input = InputLine::new();
        input.insert_str("0123456789");
        assert_eq!(input_viewport(&input, 20), (0, 10));
        assert_eq!(input_viewport(&input, 5), (6, 4));

        input.home();
        assert_eq!(input_viewport(&input, 5), (0, 0));
    }

    #[test]
    fn test_short_date_and_sha() {
        assert_eq!(short_date("2024-05-01T09:30:00Z"), "2024-05-01 09:30");
        assert_eq!(short_date("yesterday"), "yesterday");
        assert_eq!(short_sha("7fd1a60b01f91b314f59955a4e4d4e80d8edf11d"), "7fd1a60");
        assert_eq!(short_sha("abc"), "abc");
    }

    #[test]
    fn test_dashboard_lines_without_repo() {
        let dir = tempfile::tempdir().unwrap();
        let tab = DashboardTab::new(
            Arc::new(FakeSource::default()),
            None,
            LoadOptions::default(),
            dir.path().to_path_buf(),
            0,
        );
        assert_eq!(
            dashboard_lines(&tab),
            vec![PanelLine::Muted("No repository configured".to_string())]
        );
    }
}
