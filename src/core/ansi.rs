//! ANSI stream parser
//!
//! Turns raw shell output into plain-text segments tagged with the style
//! that was active when each run was emitted. Only a small subset of the
//! escape-sequence families is interpreted:
//!
//! - SGR (`ESC [ <params> m`): foreground color, bold, underline, reset
//! - other CSI sequences (cursor movement, erase, modes): stripped
//! - OSC (`ESC ] ... BEL` or `ESC ] ... ESC \`): stripped
//!
//! Everything else passes through as literal text. This is not a terminal
//! emulator: there is no cursor, no screen grid and no scrollback reflow.

use bitflags::bitflags;

const ESC: u8 = 0x1B;
const BEL: u8 = 0x07;

/// Longest partial escape sequence held back between `feed` calls.
const MAX_PENDING_ESCAPE: usize = 4096;

/// The 16 foreground colors the parser renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnsiColor {
    Black,
    Red,
    Green,
    Yellow,
    Blue,
    Magenta,
    Cyan,
    White,
    BrightBlack,
    BrightRed,
    BrightGreen,
    BrightYellow,
    BrightBlue,
    BrightMagenta,
    BrightCyan,
    BrightWhite,
}

impl AnsiColor {
    pub const ALL: [AnsiColor; 16] = [
        AnsiColor::Black,
        AnsiColor::Red,
        AnsiColor::Green,
        AnsiColor::Yellow,
        AnsiColor::Blue,
        AnsiColor::Magenta,
        AnsiColor::Cyan,
        AnsiColor::White,
        AnsiColor::BrightBlack,
        AnsiColor::BrightRed,
        AnsiColor::BrightGreen,
        AnsiColor::BrightYellow,
        AnsiColor::BrightBlue,
        AnsiColor::BrightMagenta,
        AnsiColor::BrightCyan,
        AnsiColor::BrightWhite,
    ];

    /// Map an SGR foreground code (30-37, 90-97) to a color.
    pub fn from_sgr(code: u16) -> Option<Self> {
        match code {
            30..=37 => Some(Self::ALL[(code - 30) as usize]),
            90..=97 => Some(Self::ALL[(code - 90 + 8) as usize]),
            _ => None,
        }
    }

    /// Tag name attached to text drawn in this color
    pub fn tag(&self) -> &'static str {
        match self {
            AnsiColor::Black => "fg_black",
            AnsiColor::Red => "fg_red",
            AnsiColor::Green => "fg_green",
            AnsiColor::Yellow => "fg_yellow",
            AnsiColor::Blue => "fg_blue",
            AnsiColor::Magenta => "fg_magenta",
            AnsiColor::Cyan => "fg_cyan",
            AnsiColor::White => "fg_white",
            AnsiColor::BrightBlack => "fg_bright_black",
            AnsiColor::BrightRed => "fg_bright_red",
            AnsiColor::BrightGreen => "fg_bright_green",
            AnsiColor::BrightYellow => "fg_bright_yellow",
            AnsiColor::BrightBlue => "fg_bright_blue",
            AnsiColor::BrightMagenta => "fg_bright_magenta",
            AnsiColor::BrightCyan => "fg_bright_cyan",
            AnsiColor::BrightWhite => "fg_bright_white",
        }
    }

    /// Fixed display color as `(r, g, b)`
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            AnsiColor::Black => (0x00, 0x00, 0x00),
            AnsiColor::Red => (0xff, 0x55, 0x55),
            AnsiColor::Green => (0x50, 0xfa, 0x7b),
            AnsiColor::Yellow => (0xf1, 0xfa, 0x8c),
            AnsiColor::Blue => (0x62, 0x72, 0xa4),
            AnsiColor::Magenta => (0xff, 0x79, 0xc6),
            AnsiColor::Cyan => (0x8b, 0xe9, 0xfd),
            AnsiColor::White => (0xf8, 0xf8, 0xf2),
            AnsiColor::BrightBlack => (0x44, 0x47, 0x5a),
            AnsiColor::BrightRed => (0xff, 0x6e, 0x6e),
            AnsiColor::BrightGreen => (0x69, 0xff, 0x94),
            AnsiColor::BrightYellow => (0xff, 0xff, 0xa5),
            AnsiColor::BrightBlue => (0xca, 0xa9, 0xff),
            AnsiColor::BrightMagenta => (0xff, 0x92, 0xdf),
            AnsiColor::BrightCyan => (0x9a, 0xed, 0xfe),
            AnsiColor::BrightWhite => (0xff, 0xff, 0xff),
        }
    }
}

bitflags! {
    /// Text attributes, independent of each other and of the color
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Attrs: u8 {
        const BOLD      = 0b0001;
        const UNDERLINE = 0b0010;
    }
}

pub const TAG_BOLD: &str = "attr_bold";
pub const TAG_UNDERLINE: &str = "attr_underline";

/// Style active at the moment a run of text was emitted
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Style {
    pub fg: Option<AnsiColor>,
    pub attrs: Attrs,
}

impl Style {
    pub fn is_plain(&self) -> bool {
        self.fg.is_none() && self.attrs.is_empty()
    }

    /// Tag names in display order: foreground, bold, underline
    pub fn tags(&self) -> Vec<&'static str> {
        let mut tags = Vec::with_capacity(3);
        if let Some(fg) = self.fg {
            tags.push(fg.tag());
        }
        if self.attrs.contains(Attrs::BOLD) {
            tags.push(TAG_BOLD);
        }
        if self.attrs.contains(Attrs::UNDERLINE) {
            tags.push(TAG_UNDERLINE);
        }
        tags
    }

    fn apply_sgr_codes(&mut self, codes: &[u16]) {
        let mut codes = codes.iter().copied();
        while let Some(code) = codes.next() {
            match code {
                // Extended color (`5;n` or `2;r;g;b`): consumed without effect
                38 | 48 | 58 => match codes.next() {
                    Some(5) => {
                        codes.next();
                    }
                    Some(2) => {
                        codes.by_ref().take(3).for_each(drop);
                    }
                    _ => {}
                },
                _ => self.apply_sgr(code),
            }
        }
    }

    fn apply_sgr(&mut self, code: u16) {
        match code {
            0 => *self = Style::default(),
            1 => self.attrs.insert(Attrs::BOLD),
            4 => self.attrs.insert(Attrs::UNDERLINE),
            30..=37 | 90..=97 => self.fg = AnsiColor::from_sgr(code),
            39 => self.fg = None,
            // Background, 256-color, truecolor, italic, ...: consumed, no effect
            _ => {}
        }
    }
}

/// A run of plain text plus the style it was emitted with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub style: Style,
}

impl Segment {
    #[allow(dead_code)]
    pub fn tags(&self) -> Vec<&'static str> {
        self.style.tags()
    }
}

/// Result of scanning for an escape sequence at an `ESC` byte
#[derive(Debug, PartialEq)]
enum Scan<'a> {
    /// SGR sequence of `len` bytes with its raw parameter string
    Sgr { len: usize, params: &'a str },
    /// Recognized sequence that is dropped (OSC, non-SGR CSI)
    Strip { len: usize },
    /// Input ends before the sequence could be classified
    Incomplete,
    /// Not a recognized sequence; the ESC is literal text
    Literal,
}

fn is_csi_param(byte: u8) -> bool {
    matches!(byte, b'0'..=b'9' | b';' | b':' | b'<' | b'=' | b'>' | b'?')
}

/// Classify the escape sequence starting at `input[0] == ESC`.
fn scan_escape(input: &str) -> Scan<'_> {
    let bytes = input.as_bytes();
    debug_assert_eq!(bytes.first(), Some(&ESC));

    match bytes.get(1) {
        None => Scan::Incomplete,
        Some(b'[') => {
            let mut i = 2;
            while i < bytes.len() && is_csi_param(bytes[i]) {
                i += 1;
            }
            match bytes.get(i) {
                None => Scan::Incomplete,
                Some(&final_byte) if final_byte.is_ascii_alphabetic() => {
                    let params = &input[2..i];
                    let sgr = final_byte == b'm'
                        && params.bytes().all(|b| b.is_ascii_digit() || b == b';');
                    if sgr {
                        Scan::Sgr { len: i + 1, params }
                    } else {
                        Scan::Strip { len: i + 1 }
                    }
                }
                Some(_) => Scan::Literal,
            }
        }
        Some(b']') => {
            let mut i = 2;
            while i < bytes.len() {
                match bytes[i] {
                    BEL => return Scan::Strip { len: i + 1 },
                    ESC => match bytes.get(i + 1) {
                        Some(b'\\') => return Scan::Strip { len: i + 2 },
                        None => return Scan::Incomplete,
                        Some(_) => {}
                    },
                    b'\n' => return Scan::Literal,
                    _ => {}
                }
                i += 1;
            }
            Scan::Incomplete
        }
        Some(_) => Scan::Literal,
    }
}

/// Parse an SGR parameter string such as `1;31` into codes.
///
/// Fields that are not numbers are dropped; an empty result means reset.
pub fn parse_sgr_params(params: &str) -> Vec<u16> {
    let codes: Vec<u16> = params
        .split(';')
        .filter_map(|field| field.parse::<u16>().ok())
        .collect();
    if codes.is_empty() {
        vec![0]
    } else {
        codes
    }
}

/// Incremental SGR parser.
///
/// Style state persists across `feed` calls until a reset code arrives.
#[derive(Debug, Default)]
pub struct AnsiParser {
    style: Style,
    /// Partial escape sequence left at the end of the previous chunk
    pending: String,
}

impl AnsiParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current style state
    #[allow(dead_code)]
    pub fn style(&self) -> Style {
        self.style
    }

    /// Parse one chunk of output into styled segments.
    ///
    /// Never fails: malformed escape data is passed through as text.
    pub fn feed(&mut self, chunk: &str) -> Vec<Segment> {
        let mut input = std::mem::take(&mut self.pending);
        input.push_str(chunk);

        let mut segments = Vec::new();
        let mut run = String::new();
        let mut pos = 0;

        while pos < input.len() {
            let rest = &input[pos..];
            if !rest.starts_with('\x1b') {
                let next = rest.find('\x1b').unwrap_or(rest.len());
                run.push_str(&rest[..next]);
                pos += next;
                continue;
            }

            match scan_escape(rest) {
                Scan::Sgr { len, params } => {
                    self.flush_run(&mut run, &mut segments);
                    self.style.apply_sgr_codes(&parse_sgr_params(params));
                    pos += len;
                }
                Scan::Strip { len } => pos += len,
                Scan::Incomplete if rest.len() <= MAX_PENDING_ESCAPE => {
                    self.pending = rest.to_string();
                    break;
                }
                Scan::Incomplete | Scan::Literal => {
                    run.push('\x1b');
                    pos += 1;
                }
            }
        }

        self.flush_run(&mut run, &mut segments);
        segments
    }

    fn flush_run(&self, run: &mut String, segments: &mut Vec<Segment>) {
        // Cursor-return semantics are not emulated
        let text: String = run.chars().filter(|&c| c != '\r').collect();
        run.clear();
        if !text.is_empty() {
            segments.push(Segment {
                text,
                style: self.style,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(segments: &[Segment]) -> Vec<(String, Vec<&'static str>)> {
        segments
            .iter()
            .map(|s| (s.text.clone(), s.tags()))
            .collect()
    }

    #[test]
    fn test_red_then_reset() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b[31mHello\x1b[0m World");
        assert_eq!(
            tagged(&out),
            vec![
                ("Hello".to_string(), vec!["fg_red"]),
                (" World".to_string(), vec![]),
            ]
        );
    }

    #[test]
    fn test_bold_survives_default_foreground() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b[1;32mOK\x1b[39m");
        assert_eq!(
            tagged(&out),
            vec![("OK".to_string(), vec!["fg_green", "attr_bold"])]
        );
        assert!(parser.style().fg.is_none());
        assert!(parser.style().attrs.contains(Attrs::BOLD));
    }

    #[test]
    fn test_non_sgr_csi_is_stripped() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b[2Jready> ");
        assert_eq!(tagged(&out), vec![("ready> ".to_string(), vec![])]);
    }

    #[test]
    fn test_private_mode_and_cursor_sequences_are_stripped() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b[?25l\x1b[1;1Hab\x1b[Kc\x1b[?25h");
        assert_eq!(tagged(&out), vec![("abc".to_string(), vec![])]);
    }

    #[test]
    fn test_osc_title_is_dropped() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b]0;C:\\Windows\\system32\\cmd.exe\x07prompt\x1b]2;t\x1b\\>");
        assert_eq!(tagged(&out), vec![("prompt>".to_string(), vec![])]);
        assert!(parser.style().is_plain());
    }

    #[test]
    fn test_osc_does_not_touch_style() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b[34m\x1b]0;\x1b[0m\x07x");
        assert_eq!(tagged(&out), vec![("x".to_string(), vec!["fg_blue"])]);
    }

    #[test]
    fn test_reset_clears_everything() {
        for reset in ["\x1b[0m", "\x1b[m", "\x1b[;m"] {
            let mut parser = AnsiParser::new();
            parser.feed("\x1b[1;4;95m");
            let out = parser.feed(&format!("{}plain", reset));
            assert_eq!(tagged(&out), vec![("plain".to_string(), vec![])]);
            assert!(parser.style().is_plain());
        }
    }

    #[test]
    fn test_every_foreground_code_sets_exactly_one_color() {
        let mut parser = AnsiParser::new();
        for code in (30..=37).chain(90..=97) {
            parser.feed("\x1b[31m");
            let out = parser.feed(&format!("\x1b[{}mx", code));
            let tags = out[0].tags();
            let fg: Vec<_> = tags.iter().filter(|t| t.starts_with("fg_")).collect();
            assert_eq!(fg.len(), 1);
            assert_eq!(parser.style().fg, AnsiColor::from_sgr(code));
        }
        parser.feed("\x1b[39m");
        assert!(parser.style().fg.is_none());
    }

    #[test]
    fn test_bold_and_underline_are_independent() {
        let mut parser = AnsiParser::new();
        parser.feed("\x1b[1m");
        parser.feed("\x1b[4m");
        parser.feed("\x1b[33m");
        let out = parser.feed("x");
        assert_eq!(out[0].tags(), vec!["fg_yellow", "attr_bold", "attr_underline"]);
        parser.feed("\x1b[39m");
        assert_eq!(parser.style().attrs, Attrs::BOLD | Attrs::UNDERLINE);
    }

    #[test]
    fn test_unsupported_codes_have_no_effect() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b[3;41;38;5;31;48;2;1;30;4;107mx");
        assert_eq!(tagged(&out), vec![("x".to_string(), vec![])]);
    }

    #[test]
    fn test_plain_text_round_trip() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("line one\r\nline two\n");
        assert_eq!(tagged(&out), vec![("line one\nline two\n".to_string(), vec![])]);

        parser.feed("\x1b[4m");
        let out = parser.feed("still underlined");
        assert_eq!(
            tagged(&out),
            vec![("still underlined".to_string(), vec!["attr_underline"])]
        );
    }

    #[test]
    fn test_unrecognized_escape_passes_through() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("a\x1b(Bb\x1b[1 qc");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, "a\x1b(Bb\x1b[1 qc");
    }

    #[test]
    fn test_osc_broken_by_newline_is_literal() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\x1b]0;title\nrest");
        assert_eq!(out[0].text, "\x1b]0;title\nrest");
    }

    #[test]
    fn test_determinism_across_instances() {
        let chunk = "\x1b]0;t\x07\x1b[1;31mERR\x1b[0m ok \x1b[4;92mwarn\x1b[K\r\n";
        let mut a = AnsiParser::new();
        let mut b = AnsiParser::new();
        assert_eq!(a.feed(chunk), b.feed(chunk));
        assert_eq!(a.style(), b.style());
    }

    #[test]
    fn test_split_feed_matches_whole_feed_state() {
        let chunk = "\x1b[1mA\x1b[36mB\x1b[0mC\x1b[4;93mD";
        for split in 0..=chunk.len() {
            if !chunk.is_char_boundary(split) {
                continue;
            }
            let mut whole = AnsiParser::new();
            whole.feed(chunk);

            let mut parts = AnsiParser::new();
            parts.feed(&chunk[..split]);
            parts.feed(&chunk[split..]);
            assert_eq!(whole.style(), parts.style(), "split at {}", split);
        }
    }

    #[test]
    fn test_straddling_sequence_is_completed_by_next_feed() {
        let mut parser = AnsiParser::new();
        let first = parser.feed("abc\x1b[3");
        assert_eq!(tagged(&first), vec![("abc".to_string(), vec![])]);
        let second = parser.feed("2mgreen");
        assert_eq!(tagged(&second), vec![("green".to_string(), vec!["fg_green"])]);

        let first = parser.feed("\x1b]0;long ti");
        assert!(first.is_empty());
        let second = parser.feed("tle\x07done");
        assert_eq!(second[0].text, "done");
    }

    #[test]
    fn test_oversized_partial_escape_degrades_to_text() {
        let mut parser = AnsiParser::new();
        let chunk = format!("\x1b]0;{}", "x".repeat(MAX_PENDING_ESCAPE));
        let out = parser.feed(&chunk);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].text, chunk);
    }

    #[test]
    fn test_carriage_return_only_segment_is_dropped() {
        let mut parser = AnsiParser::new();
        let out = parser.feed("\r\x1b[32m\rok");
        assert_eq!(tagged(&out), vec![("ok".to_string(), vec!["fg_green"])]);
    }

    #[test]
    fn test_parse_sgr_params() {
        assert_eq!(parse_sgr_params("1;31"), vec![1, 31]);
        assert_eq!(parse_sgr_params(""), vec![0]);
        assert_eq!(parse_sgr_params("1;;4"), vec![1, 4]);
        assert_eq!(parse_sgr_params("99999"), vec![0]);
    }

    #[test]
    fn test_color_table() {
        assert_eq!(AnsiColor::from_sgr(31), Some(AnsiColor::Red));
        assert_eq!(AnsiColor::from_sgr(97), Some(AnsiColor::BrightWhite));
        assert_eq!(AnsiColor::from_sgr(38), None);
        assert_eq!(AnsiColor::Red.rgb(), (0xff, 0x55, 0x55));
        assert_eq!(AnsiColor::BrightBlue.tag(), "fg_bright_blue");
    }
}
