//! Incremental tail of the newest log file in a directory

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::debug;

use crate::core::session::Utf8Decoder;

/// Upper bound on bytes returned by one poll
const MAX_READ_PER_POLL: u64 = 256 * 1024;

/// What changed since the previous poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogUpdate {
    Unchanged,
    /// New text at the end of the same file
    Appended(String),
    /// A different file (or a truncated one) is being tailed; the view
    /// restarts with this text
    Restarted(String),
}

/// Tails the most recently modified `*.log` file of a directory
#[derive(Debug)]
pub struct LogTail {
    dir: PathBuf,
    current: Option<PathBuf>,
    offset: u64,
    decoder: Utf8Decoder,
}

impl LogTail {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            current: None,
            offset: 0,
            decoder: Utf8Decoder::new(),
        }
    }

    pub fn current_file(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn poll(&mut self) -> io::Result<LogUpdate> {
        let latest = newest_log(&self.dir)?;
        let mut restarted = false;

        if latest != self.current {
            debug!("Tailing {:?}", latest);
            self.current = latest;
            self.offset = 0;
            self.decoder = Utf8Decoder::new();
            restarted = true;
        }

        let Some(path) = self.current.clone() else {
            return Ok(if restarted {
                LogUpdate::Restarted(String::new())
            } else {
                LogUpdate::Unchanged
            });
        };

        let mut file = File::open(&path)?;
        let len = file.metadata()?.len();
        if len < self.offset {
            debug!("{} shrank, reading from the start", path.display());
            self.offset = 0;
            self.decoder = Utf8Decoder::new();
            restarted = true;
        }

        let mut bytes = Vec::new();
        if len > self.offset {
            file.seek(SeekFrom::Start(self.offset))?;
            file.take(MAX_READ_PER_POLL).read_to_end(&mut bytes)?;
            self.offset += bytes.len() as u64;
        }
        // A character cut by the read limit is completed on the next poll
        let text = self.decoder.decode(&bytes);

        Ok(if restarted {
            LogUpdate::Restarted(text)
        } else if text.is_empty() {
            LogUpdate::Unchanged
        } else {
            LogUpdate::Appended(text)
        })
    }
}

/// Newest `*.log` file in `dir`; `None` when there is none or the directory is missing
fn newest_log(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map_or(true, |ext| ext != "log") {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified()?;
        // Same timestamp: the later name wins, log names embed their start time
        let is_newer = newest
            .as_ref()
            .map_or(true, |(time, best)| (modified, &path) > (*time, best));
        if is_newer {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}
