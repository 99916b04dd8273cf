//! Single-line command editor

use tracing::warn;
use unicode_width::UnicodeWidthChar;

/// Text field of the terminal tab. `cursor` is a char index.
#[derive(Debug, Default)]
pub struct InputLine {
    buffer: String,
    cursor: usize,
}

impl InputLine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg(test)]
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Display column of the cursor
    pub fn cursor_col(&self) -> usize {
        self.buffer
            .chars()
            .take(self.cursor)
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.buffer
            .char_indices()
            .nth(char_index)
            .map(|(i, _)| i)
            .unwrap_or(self.buffer.len())
    }

    fn char_len(&self) -> usize {
        self.buffer.chars().count()
    }

    pub fn insert_char(&mut self, ch: char) {
        if ch.is_control() {
            return;
        }
        let at = self.byte_index(self.cursor);
        self.buffer.insert(at, ch);
        self.cursor += 1;
    }

    /// Insert pasted text; line breaks become spaces, other controls are dropped
    pub fn insert_str(&mut self, text: &str) {
        let mut last_was_break = false;
        for ch in text.chars() {
            match ch {
                '\r' | '\n' => {
                    if !last_was_break {
                        self.insert_char(' ');
                    }
                    last_was_break = true;
                    continue;
                }
                '\t' => self.insert_char(' '),
                c => self.insert_char(c),
            }
            last_was_break = false;
        }
    }

    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.buffer.remove(at);
    }

    pub fn delete(&mut self) {
        if self.cursor < self.char_len() {
            let at = self.byte_index(self.cursor);
            self.buffer.remove(at);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.char_len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.char_len();
    }

    /// Take the text out, leaving the field empty
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.buffer)
    }

    /// Paste the clipboard text at the cursor. Returns whether anything was inserted.
    pub fn paste_from_clipboard(&mut self) -> bool {
        let text = match arboard::Clipboard::new().and_then(|mut c| c.get_text()) {
            Ok(text) => text,
            Err(e) => {
                warn!("Clipboard paste failed: {}", e);
                return false;
            }
        };
        let before = self.buffer.len();
        self.insert_str(&text);
        self.buffer.len() != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(text: &str) -> InputLine {
        let mut input = InputLine::new();
        for ch in text.chars() {
            input.insert_char(ch);
        }
        input
    }

    #[test]
    fn test_typing_and_editing() {
        let mut input = typed("gti");
        input.move_left();
        input.move_left();
        input.backspace();
        input.end();
        assert_eq!(input.text(), "ti");

        input.home();
        input.insert_char('g');
        input.move_right();
        input.delete();
        assert_eq!(input.text(), "gt");
        input.end();
        input.insert_char('i');
        input.insert_char('t');
        assert_eq!(input.text(), "gtit");
    }

    #[test]
    fn test_multibyte_cursor() {
        let mut input = typed("héllo");
        input.home();
        input.move_right();
        input.move_right();
        input.backspace();
        assert_eq!(input.text(), "hllo");
        assert_eq!(input.cursor(), 1);

        let wide = typed("日本");
        assert_eq!(wide.cursor_col(), 4);
    }

    #[test]
    fn test_bounds_are_safe() {
        let mut input = InputLine::new();
        input.backspace();
        input.delete();
        input.move_left();
        input.move_right();
        assert!(input.is_empty());
        assert_eq!(input.cursor(), 0);
    }

    #[test]
    fn test_controls_are_ignored() {
        let input = typed("a\x1bb\x07");
        assert_eq!(input.text(), "ab");
    }

    #[test]
    fn test_paste_flattens_lines() {
        let mut input = InputLine::new();
        input.insert_str("echo one\r\necho\ttwo\n");
        assert_eq!(input.text(), "echo one echo two ");
    }

    #[test]
    fn test_take_clears() {
        let mut input = typed("ls -la");
        assert_eq!(input.take(), "ls -la");
        assert!(input.is_empty());
        assert_eq!(input.cursor(), 0);
    }
}
