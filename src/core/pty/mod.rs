//! Pseudo-terminal transport
//!
//! Hides the platform pty APIs behind [`PtyTransport`]:
//!
//! - **conpty** (Windows): ConPTY via the `windows` crate, non-blocking reads
//! - **native** (Unix): `portable-pty`, reads block until output or hangup

use std::io;
use std::sync::Arc;

use thiserror::Error;

#[cfg(windows)]
mod conpty;
#[cfg(unix)]
mod native;

#[cfg(windows)]
pub use conpty::ConPty;
#[cfg(unix)]
pub use native::NativePty;

/// Initial pty size until the UI reports the real view size
pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 30;

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("Failed to read from PTY: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    Resize(String),

    #[error("Failed to close PTY: {0}")]
    Close(String),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Raw I/O with a child process attached to a pseudo terminal.
///
/// Reads happen on the session's reader thread while writes, resizes and
/// `close` come from the UI thread, so implementations must tolerate
/// concurrent read-while-write.
pub trait PtyTransport: Send + Sync {
    /// Read whatever output is available. `Ok(0)` means nothing right now.
    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize>;

    /// Forward bytes verbatim to the child's input
    fn write(&self, data: &[u8]) -> Result<usize>;

    fn resize(&self, cols: u16, rows: u16) -> Result<()>;

    /// Whether the child process is still alive
    fn is_running(&self) -> bool;

    /// Ask the child to end. Must not wait for it to exit.
    fn close(&self) -> Result<()>;
}

/// Shell started when the configuration names none
pub fn default_shell() -> String {
    if cfg!(windows) {
        "cmd.exe /Q".to_string()
    } else {
        std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
    }
}

/// Spawn `command_line` attached to a new pseudo terminal.
pub fn spawn(command_line: &str, cols: u16, rows: u16) -> Result<Arc<dyn PtyTransport>> {
    if command_line.trim().is_empty() {
        return Err(PtyError::Spawn {
            command: command_line.to_string(),
            message: "empty command line".to_string(),
        });
    }

    #[cfg(windows)]
    let pty: Arc<dyn PtyTransport> = Arc::new(ConPty::spawn(command_line, cols, rows)?);
    #[cfg(unix)]
    let pty: Arc<dyn PtyTransport> = Arc::new(NativePty::spawn(command_line, cols, rows)?);

    Ok(pty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_is_a_spawn_error() {
        let err = spawn("   ", DEFAULT_COLS, DEFAULT_ROWS).err();
        assert!(matches!(err, Some(PtyError::Spawn { .. })));
    }

    #[test]
    fn test_missing_executable_is_a_spawn_error() {
        let err = spawn("/definitely/not/a/shell-binary", DEFAULT_COLS, DEFAULT_ROWS).err();
        assert!(matches!(err, Some(PtyError::Spawn { .. })));
    }

    #[test]
    fn test_default_shell_is_not_empty() {
        assert!(!default_shell().trim().is_empty());
    }
}
