//! Core terminal plumbing.
//!
//! - **pty**: platform pseudo-terminal transport (ConPTY / portable-pty)
//! - **session**: shell session, reader thread and pending output queue
//! - **ansi**: ANSI SGR parser producing styled text segments
//!
//! # Data flow
//!
//! ```text
//! shell ─▶ pty ─▶ reader thread ─▶ output queue ─▶ UI tick ─▶ AnsiParser ─▶ OutputView
//!   ▲                                                              │
//!   └──────────── pty write ◀── "cmd\n" ◀── InputLine ◀────────────┘ (user)
//! ```

pub mod ansi;
pub mod pty;
pub mod session;
