//! Session management
//!
//! A [`ShellSession`] owns one child shell on a pseudo terminal plus the
//! background thread that reads its output. The reader never touches UI
//! state: it decodes bytes to text and pushes chunks onto the pending
//! output queue, which the UI thread drains on its own schedule.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::pty::{self, PtyError, PtyTransport};

/// Sleep when a read returned nothing
pub const IDLE_BACKOFF: Duration = Duration::from_millis(10);
/// Sleep after a failed read
pub const ERROR_BACKOFF: Duration = Duration::from_millis(50);
/// How long `close` waits for the reader thread before detaching it
pub const CLOSE_GRACE: Duration = Duration::from_millis(200);

const READ_BUFFER_SIZE: usize = 4096;

/// Create the pending output queue (unbounded, FIFO).
pub fn output_queue() -> (OutputProducer, OutputConsumer) {
    let (tx, rx) = mpsc::channel();
    (OutputProducer { tx }, OutputConsumer { rx })
}

/// Reader-thread end of the pending output queue
#[derive(Clone)]
pub struct OutputProducer {
    tx: Sender<String>,
}

impl OutputProducer {
    /// Push a chunk; returns false once the consumer is gone
    pub fn push(&self, chunk: String) -> bool {
        self.tx.send(chunk).is_ok()
    }
}

/// UI-thread end of the pending output queue
pub struct OutputConsumer {
    rx: Receiver<String>,
}

impl OutputConsumer {
    /// Next chunk in arrival order, without blocking
    pub fn try_pop(&self) -> Option<String> {
        match self.rx.try_recv() {
            Ok(chunk) => Some(chunk),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Everything queued right now, in arrival order
    pub fn drain(&self) -> Vec<String> {
        std::iter::from_fn(|| self.try_pop()).collect()
    }

    /// True when the producer is gone and nothing is left to read
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

/// Incremental byte-to-text decoder.
///
/// Decodes UTF-8, holding back an incomplete multi-byte sequence at the end
/// of a read until the next one. Bytes that are not valid UTF-8 are decoded
/// as Latin-1, so nothing is ever dropped.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    tail: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.tail);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest = &input[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        // Truncated sequence at the end: wait for more bytes
                        None => {
                            self.tail = after.to_vec();
                            break;
                        }
                        Some(len) => {
                            out.extend(after[..len].iter().map(|&b| b as char));
                            rest = &after[len..];
                        }
                    }
                }
            }
        }
        out
    }

    /// Release a held partial sequence as Latin-1
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.tail).iter().map(|&b| b as char).collect()
    }
}

/// Why the read loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadStop {
    Cancelled,
    ChildExited,
    ConsumerGone,
}

/// Body of the reader thread.
///
/// Runs until `running` is cleared, the child exits, or the consumer goes
/// away. The flag is checked at the top of every iteration, so after it is
/// cleared at most one in-flight read or backoff sleep completes, and
/// nothing more is pushed. When the child exits, bytes of an unfinished
/// UTF-8 sequence are pushed as Latin-1.
pub fn reader_loop(pty: &dyn PtyTransport, running: &AtomicBool, queue: &OutputProducer) {
    let mut decoder = Utf8Decoder::new();
    if read_until_stopped(pty, running, queue, &mut decoder) == ReadStop::ChildExited {
        let rest = decoder.finish();
        if !rest.is_empty() {
            queue.push(rest);
        }
    }
}

fn read_until_stopped(
    pty: &dyn PtyTransport,
    running: &AtomicBool,
    queue: &OutputProducer,
    decoder: &mut Utf8Decoder,
) -> ReadStop {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];

    while running.load(Ordering::SeqCst) {
        match pty.read_nonblocking(&mut buffer) {
            Ok(n) if n > 0 => {
                let text = decoder.decode(&buffer[..n]);
                if text.is_empty() {
                    continue;
                }
                if !running.load(Ordering::SeqCst) {
                    return ReadStop::Cancelled;
                }
                if !queue.push(text) {
                    debug!("Output queue consumer dropped, stopping reader");
                    return ReadStop::ConsumerGone;
                }
            }
            Ok(_) => {
                if !pty.is_running() {
                    info!("Shell process exited");
                    running.store(false, Ordering::SeqCst);
                    return ReadStop::ChildExited;
                }
                thread::sleep(IDLE_BACKOFF);
            }
            Err(e) => {
                if !pty.is_running() {
                    info!("Shell process exited ({})", e);
                    running.store(false, Ordering::SeqCst);
                    return ReadStop::ChildExited;
                }
                debug!("Transient read error: {}", e);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    ReadStop::Cancelled
}

/// The write side of a session, as seen by the terminal tab.
pub trait SessionHandle {
    /// Best-effort send of `text` to the shell's input
    fn write(&self, text: &str);

    fn is_running(&self) -> bool;

    fn resize(&self, cols: u16, rows: u16);
}

/// A shell process on a pseudo terminal plus its reader thread.
///
/// Creating the session acquires both; dropping it releases both.
pub struct ShellSession {
    pty: Arc<dyn PtyTransport>,
    running: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
    command_line: String,
}

impl ShellSession {
    /// Spawn `command_line` and start reading its output.
    pub fn spawn(command_line: &str) -> Result<(Self, OutputConsumer), PtyError> {
        let pty = pty::spawn(command_line, pty::DEFAULT_COLS, pty::DEFAULT_ROWS)?;
        info!("Started shell: {}", command_line);
        Ok(Self::attach(pty, command_line))
    }

    /// Start a reader thread on an already spawned transport.
    pub fn attach(pty: Arc<dyn PtyTransport>, command_line: &str) -> (Self, OutputConsumer) {
        let (producer, consumer) = output_queue();
        let running = Arc::new(AtomicBool::new(true));

        let reader_pty = pty.clone();
        let reader_running = running.clone();
        let reader_thread = thread::Builder::new()
            .name("pty-reader".to_string())
            .spawn(move || reader_loop(reader_pty.as_ref(), &reader_running, &producer));

        let reader_thread = match reader_thread {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("Failed to start reader thread: {}", e);
                running.store(false, Ordering::SeqCst);
                None
            }
        };

        let session = Self {
            pty,
            running,
            reader_thread,
            command_line: command_line.to_string(),
        };
        (session, consumer)
    }

    /// Stop reading and ask the child to end, without waiting on it.
    pub fn close(&mut self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("Closing shell: {}", self.command_line);
        }

        if let Err(e) = self.pty.close() {
            warn!("Error while closing shell: {}", e);
        }

        if let Some(handle) = self.reader_thread.take() {
            let deadline = Instant::now() + CLOSE_GRACE;
            while !handle.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                debug!("Reader thread still blocked in read, detaching");
            }
        }
    }
}

impl SessionHandle for ShellSession {
    fn write(&self, text: &str) {
        if let Err(e) = self.pty.write(text.as_bytes()) {
            warn!("Failed to write to shell: {}", e);
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn resize(&self, cols: u16, rows: u16) {
        if let Err(e) = self.pty.resize(cols, rows) {
            debug!("{}", e);
        }
    }
}

impl Drop for ShellSession {
    fn drop(&mut self) {
        self.close();
    }
}
