//! Unix pseudo terminal backed by `portable-pty`

use std::io::{self, Read, Write};
use std::sync::Mutex;

use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use super::{PtyError, PtyTransport, Result};

/// A child process running on a native pty.
///
/// The reader, writer and child each sit behind their own lock so a read
/// blocked on the reader thread never stalls a write from the UI thread.
pub struct NativePty {
    master: Mutex<Box<dyn MasterPty + Send>>,
    reader: Mutex<Box<dyn Read + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    child: Mutex<Box<dyn Child + Send + Sync>>,
}

fn lock_poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "pty lock poisoned")
}

impl NativePty {
    /// Spawn a whitespace-separated command line (`program arg1 arg2 ...`)
    pub fn spawn(command_line: &str, cols: u16, rows: u16) -> Result<Self> {
        let spawn_error = |message: String| PtyError::Spawn {
            command: command_line.to_string(),
            message,
        };

        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| spawn_error("empty command line".to_string()))?;

        let pair = native_pty_system()
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| spawn_error(format!("{:#}", e)))?;

        let mut cmd = CommandBuilder::new(program);
        cmd.args(parts);
        cmd.env("TERM", "xterm");
        if let Ok(cwd) = std::env::current_dir() {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| spawn_error(format!("{:#}", e)))?;
        // Only the child keeps the slave open, so reads end when it exits
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| spawn_error(format!("{:#}", e)))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| spawn_error(format!("{:#}", e)))?;

        debug!("Spawned `{}` on native pty", command_line);

        Ok(Self {
            master: Mutex::new(pair.master),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            child: Mutex::new(child),
        })
    }
}

impl PtyTransport for NativePty {
    fn read_nonblocking(&self, buf: &mut [u8]) -> Result<usize> {
        let mut reader = self.reader.lock().map_err(|_| PtyError::Read(lock_poisoned()))?;
        match reader.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted || e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(PtyError::Read(e)),
        }
    }

    fn write(&self, data: &[u8]) -> Result<usize> {
        let mut writer = self.writer.lock().map_err(|_| PtyError::Write(lock_poisoned()))?;
        writer.write_all(data).map_err(PtyError::Write)?;
        writer.flush().map_err(PtyError::Write)?;
        Ok(data.len())
    }

    fn resize(&self, cols: u16, rows: u16) -> Result<()> {
        let master = self
            .master
            .lock()
            .map_err(|_| PtyError::Resize("pty lock poisoned".to_string()))?;
        master
            .resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Resize(format!("{:#}", e)))
    }

    fn is_running(&self) -> bool {
        match self.child.lock() {
            Ok(mut child) => matches!(child.try_wait(), Ok(None)),
            Err(_) => false,
        }
    }

    fn close(&self) -> Result<()> {
        let mut child = self
            .child
            .lock()
            .map_err(|_| PtyError::Close("pty lock poisoned".to_string()))?;
        if matches!(child.try_wait(), Ok(Some(_))) {
            return Ok(());
        }
        child.kill().map_err(|e| PtyError::Close(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn test_cat_echoes_input() {
        let pty = NativePty::spawn("cat", 80, 24).expect("spawn cat");
        assert!(pty.is_running());
        pty.write(b"hello-pty\n").expect("write");

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut seen = String::new();
        let mut buf = [0u8; 1024];
        while !seen.contains("hello-pty") && Instant::now() < deadline {
            let n = pty.read_nonblocking(&mut buf).unwrap_or(0);
            seen.push_str(&String::from_utf8_lossy(&buf[..n]));
        }
        assert!(seen.contains("hello-pty"), "got {:?}", seen);

        pty.close().expect("close");
        let deadline = Instant::now() + Duration::from_secs(5);
        while pty.is_running() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(!pty.is_running());
    }
}
