//! Styled scrollback for terminal output

use std::collections::VecDeque;

use unicode_width::UnicodeWidthChar;

use crate::core::ansi::{Segment, Style};

/// Default scrollback length in lines
pub const DEFAULT_SCROLLBACK: usize = 5000;
const TAB_WIDTH: usize = 8;
/// Columns after which an unterminated line wraps
const MAX_LINE_WIDTH: usize = 4096;

/// Run of text sharing one style
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputLine {
    pub spans: Vec<Span>,
    /// Display width in columns
    width: usize,
}

impl OutputLine {
    #[cfg(test)]
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn text(&self) -> String {
        self.spans.iter().map(|s| s.text.as_str()).collect()
    }

    fn push_char(&mut self, ch: char, style: Style) {
        match self.spans.last_mut() {
            Some(span) if span.style == style => span.text.push(ch),
            _ => self.spans.push(Span {
                text: ch.to_string(),
                style,
            }),
        }
        self.width += ch.width().unwrap_or(0);
    }
}

/// Append-only output lines with a scroll position.
///
/// The last line is always the open one new text is appended to.
/// `scroll_offset` counts lines up from the bottom; 0 follows new output.
#[derive(Debug)]
pub struct OutputView {
    lines: VecDeque<OutputLine>,
    max_lines: usize,
    scroll_offset: usize,
}

impl Default for OutputView {
    fn default() -> Self {
        Self::new(DEFAULT_SCROLLBACK)
    }
}

impl OutputView {
    pub fn new(max_lines: usize) -> Self {
        let mut lines = VecDeque::new();
        lines.push_back(OutputLine::default());
        Self {
            lines,
            max_lines: max_lines.max(1),
            scroll_offset: 0,
        }
    }

    pub fn push_segment(&mut self, segment: &Segment) {
        self.push_text(&segment.text, segment.style);
    }

    /// Append text, splitting lines on `\n`. Tabs expand to the next stop,
    /// other control characters are dropped. A line reaching
    /// `MAX_LINE_WIDTH` columns continues on a new one.
    pub fn push_text(&mut self, text: &str, style: Style) {
        for ch in text.chars() {
            match ch {
                '\n' => self.new_line(),
                '\t' => {
                    let pad = TAB_WIDTH - self.open_line().width % TAB_WIDTH;
                    for _ in 0..pad {
                        self.put_char(' ', style);
                    }
                }
                c if c.is_control() => {}
                c => self.put_char(c, style),
            }
        }
    }

    fn put_char(&mut self, ch: char, style: Style) {
        let width = ch.width().unwrap_or(0);
        if self.open_line().width + width > MAX_LINE_WIDTH {
            self.new_line();
        }
        self.open_line().push_char(ch, style);
    }

    fn open_line(&mut self) -> &mut OutputLine {
        if self.lines.is_empty() {
            self.lines.push_back(OutputLine::default());
        }
        let last = self.lines.len() - 1;
        &mut self.lines[last]
    }

    fn new_line(&mut self) {
        self.lines.push_back(OutputLine::default());
        if self.scroll_offset > 0 {
            // Keep the viewed content still while output arrives
            self.scroll_offset += 1;
        }
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
        self.clamp_scroll();
    }

    /// Start a new line unless the open one is empty
    pub fn ensure_line_start(&mut self) {
        if !self.open_line().spans.is_empty() {
            self.new_line();
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.lines.push_back(OutputLine::default());
        self.scroll_offset = 0;
    }

    #[cfg(test)]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    #[cfg(test)]
    pub fn lines(&self) -> impl Iterator<Item = &OutputLine> {
        self.lines.iter()
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn is_scrolled(&self) -> bool {
        self.scroll_offset > 0
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(n);
        self.clamp_scroll();
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }

    pub fn scroll_to_end(&mut self) {
        self.scroll_offset = 0;
    }

    fn clamp_scroll(&mut self) {
        self.scroll_offset = self.scroll_offset.min(self.lines.len().saturating_sub(1));
    }

    /// Lines to draw in a window `height` rows tall, oldest first
    pub fn visible_lines(&self, height: usize) -> impl Iterator<Item = &OutputLine> {
        let end = self.lines.len() - self.scroll_offset.min(self.lines.len());
        let start = end.saturating_sub(height);
        self.lines.range(start..end)
    }

    /// All text, lines joined with `\n`
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        self.lines
            .iter()
            .map(OutputLine::text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ansi::{AnsiColor, Attrs};

    fn red() -> Style {
        Style {
            fg: Some(AnsiColor::Red),
            attrs: Attrs::empty(),
        }
    }

    #[test]
    fn test_newlines_split_lines() {
        let mut view = OutputView::default();
        view.push_text("one\ntwo\nthr", Style::default());
        view.push_text("ee", Style::default());
        assert_eq!(view.plain_text(), "one\ntwo\nthree");
        assert_eq!(view.line_count(), 3);
    }

    #[test]
    fn test_style_changes_split_spans() {
        let mut view = OutputView::default();
        view.push_text("ab", red());
        view.push_text("c", red());
        view.push_text("d", Style::default());
        let line = view.lines().next().unwrap();
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[0].text, "abc");
        assert_eq!(line.spans[0].style, red());
    }

    #[test]
    fn test_control_chars_and_tabs() {
        let mut view = OutputView::default();
        view.push_text("a\tb\x07\x08c", Style::default());
        assert_eq!(view.plain_text(), "a       bc");
        assert_eq!(view.lines().next().unwrap().width(), 10);
    }

    #[test]
    fn test_wide_chars_count_two_columns() {
        let mut view = OutputView::default();
        view.push_text("日本", Style::default());
        assert_eq!(view.lines().next().unwrap().width(), 4);
    }

    #[test]
    fn test_scrollback_is_capped() {
        let mut view = OutputView::new(3);
        view.push_text("1\n2\n3\n4\n5", Style::default());
        assert_eq!(view.plain_text(), "3\n4\n5");
    }

    #[test]
    fn test_unterminated_line_wraps_at_width_cap() {
        let mut view = OutputView::default();
        let progress = "#".repeat(MAX_LINE_WIDTH * 2 + 5);
        view.push_text(&progress, Style::default());

        let widths: Vec<usize> = view.lines().map(|line| line.width()).collect();
        assert_eq!(widths, vec![MAX_LINE_WIDTH, MAX_LINE_WIDTH, 5]);
    }

    #[test]
    fn test_wide_char_is_not_split_by_wrap() {
        let mut view = OutputView::default();
        view.push_text(&"a".repeat(MAX_LINE_WIDTH - 1), Style::default());
        view.push_text("日", Style::default());

        let last = view.lines().last().unwrap();
        assert_eq!(last.text(), "日");
        assert_eq!(view.line_count(), 2);
    }

    #[test]
    fn test_scrolling() {
        let mut view = OutputView::default();
        for i in 0..10 {
            view.push_text(&format!("line {}\n", i), Style::default());
        }
        // 10 full lines plus the open empty one
        let tail: Vec<String> = view.visible_lines(2).map(OutputLine::text).collect();
        assert_eq!(tail, vec!["line 9", ""]);

        view.scroll_up(3);
        let window: Vec<String> = view.visible_lines(2).map(OutputLine::text).collect();
        assert_eq!(window, vec!["line 6", "line 7"]);

        // New output keeps the scrolled window in place
        view.push_text("more\n", Style::default());
        assert_eq!(view.scroll_offset(), 4);

        view.scroll_up(1000);
        assert_eq!(view.scroll_offset(), view.line_count() - 1);

        view.scroll_to_end();
        assert!(!view.is_scrolled());
    }

    #[test]
    fn test_clear() {
        let mut view = OutputView::default();
        view.push_text("x\ny", Style::default());
        view.scroll_up(1);
        view.clear();
        assert_eq!(view.plain_text(), "");
        assert_eq!(view.scroll_offset(), 0);
    }
}
