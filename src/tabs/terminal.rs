//! Terminal tab: bridges a shell session to the output view and input line
//!
//! The UI loop calls [`TerminalTab::tick`] every frame. It drains whatever
//! the reader thread queued, runs it through the ANSI parser and appends the
//! styled segments to the scrollback. Submitting the input line sends one
//! newline-terminated write to the shell.

use tracing::debug;

use crate::core::ansi::{AnsiColor, AnsiParser, Attrs, Style};
use crate::core::session::{OutputConsumer, SessionHandle};
use crate::ui::input::InputLine;
use crate::ui::view::OutputView;

/// Shown once after the shell ends
pub const EXITED_MARKER: &str = "[process exited]";

pub struct TerminalTab {
    session: Box<dyn SessionHandle>,
    output: OutputConsumer,
    parser: AnsiParser,
    view: OutputView,
    input: InputLine,
    exit_reported: bool,
    size: (u16, u16),
}

impl TerminalTab {
    pub fn new(session: Box<dyn SessionHandle>, output: OutputConsumer) -> Self {
        Self {
            session,
            output,
            parser: AnsiParser::new(),
            view: OutputView::default(),
            input: InputLine::new(),
            exit_reported: false,
            size: (0, 0),
        }
    }

    /// Apply queued output. Returns whether the view changed.
    pub fn tick(&mut self) -> bool {
        // Sampled before draining so output pushed before the exit is shown first
        let running = self.session.is_running();
        let mut changed = false;

        for chunk in self.output.drain() {
            for segment in self.parser.feed(&chunk) {
                self.view.push_segment(&segment);
            }
            self.view.scroll_to_end();
            changed = true;
        }

        if !running && !self.exit_reported {
            self.exit_reported = true;
            debug!("Shell session ended");
            let muted = Style {
                fg: Some(AnsiColor::BrightBlack),
                attrs: Attrs::empty(),
            };
            self.view.ensure_line_start();
            self.view.push_text(EXITED_MARKER, muted);
            self.view.push_text("\n", Style::default());
            self.view.scroll_to_end();
            changed = true;
        }

        changed
    }

    /// Send the input line to the shell. Empty input is ignored.
    /// Returns whether anything was written.
    pub fn submit(&mut self) -> bool {
        if self.input.is_empty() {
            return false;
        }
        let mut command = self.input.take();
        command.push('\n');
        self.session.write(&command);
        true
    }

    /// Propagate the output area size to the pseudo terminal
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if self.size != (cols, rows) && cols > 0 && rows > 0 {
            self.size = (cols, rows);
            self.session.resize(cols, rows);
        }
    }

    pub fn is_running(&self) -> bool {
        self.session.is_running()
    }

    pub fn view(&self) -> &OutputView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut OutputView {
        &mut self.view
    }

    pub fn input(&self) -> &InputLine {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputLine {
        &mut self.input
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::session::output_queue;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Default)]
    struct Recorded {
        writes: Vec<String>,
        resizes: Vec<(u16, u16)>,
        exited: bool,
    }

    /// Session double sharing its record with the test
    struct RecordingSession(Rc<RefCell<Recorded>>);

    impl SessionHandle for RecordingSession {
        fn write(&self, text: &str) {
            self.0.borrow_mut().writes.push(text.to_string());
        }

        fn is_running(&self) -> bool {
            !self.0.borrow().exited
        }

        fn resize(&self, cols: u16, rows: u16) {
            self.0.borrow_mut().resizes.push((cols, rows));
        }
    }

    fn tab() -> (TerminalTab, Rc<RefCell<Recorded>>, crate::core::session::OutputProducer) {
        let record = Rc::new(RefCell::new(Recorded::default()));
        let (producer, consumer) = output_queue();
        let tab = TerminalTab::new(Box::new(RecordingSession(record.clone())), consumer);
        (tab, record, producer)
    }

    fn type_text(tab: &mut TerminalTab, text: &str) {
        for ch in text.chars() {
            tab.input_mut().insert_char(ch);
        }
    }

    #[test]
    fn test_submit_writes_command_once() {
        let (mut tab, record, _producer) = tab();
        type_text(&mut tab, "ls");

        assert!(tab.submit());
        assert_eq!(record.borrow().writes, vec!["ls\n"]);
        assert!(tab.input().is_empty());
    }

    #[test]
    fn test_empty_submit_writes_nothing() {
        let (mut tab, record, _producer) = tab();
        assert!(!tab.submit());
        assert!(record.borrow().writes.is_empty());
    }

    #[test]
    fn test_whitespace_is_sent_verbatim() {
        let (mut tab, record, _producer) = tab();
        type_text(&mut tab, " ");
        tab.submit();
        assert_eq!(record.borrow().writes, vec![" \n"]);
    }

    #[test]
    fn test_tick_applies_styled_output_in_order() {
        let (mut tab, _record, producer) = tab();
        producer.push("\x1b[31mHel".to_string());
        producer.push("lo\x1b[0m World\r\n".to_string());
        producer.push("\x1b[2Jready> ".to_string());

        assert!(tab.tick());
        assert_eq!(tab.view().plain_text(), "Hello World\nready> ");

        let first = tab.view().lines().next().unwrap();
        assert_eq!(first.spans[0].text, "Hello");
        assert_eq!(first.spans[0].style.fg, Some(AnsiColor::Red));
        assert_eq!(first.spans[1].style, Style::default());
    }

    #[test]
    fn test_idle_tick_is_noop() {
        let (mut tab, _record, _producer) = tab();
        assert!(!tab.tick());
        assert_eq!(tab.view().plain_text(), "");
    }

    #[test]
    fn test_tick_scrolls_to_newest_output() {
        let (mut tab, _record, producer) = tab();
        producer.push("a\nb\nc\n".to_string());
        tab.tick();
        tab.view_mut().scroll_up(2);

        producer.push("d\n".to_string());
        tab.tick();
        assert!(!tab.view().is_scrolled());
    }

    #[test]
    fn test_exit_marker_shown_once_after_output() {
        let (mut tab, record, producer) = tab();
        producer.push("bye".to_string());
        record.borrow_mut().exited = true;

        assert!(tab.tick());
        assert_eq!(
            tab.view().plain_text(),
            format!("bye\n{}\n", EXITED_MARKER)
        );
        assert!(!tab.tick());
    }

    #[test]
    fn test_resize_only_on_change() {
        let (mut tab, record, _producer) = tab();
        tab.resize(80, 24);
        tab.resize(80, 24);
        tab.resize(0, 24);
        tab.resize(100, 30);
        assert_eq!(record.borrow().resizes, vec![(80, 24), (100, 30)]);
    }
}
