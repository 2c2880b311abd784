//! Line-atomic console sink.
//!
//! Progress lines go to stdout; warnings and errors go to stderr. Each line is
//! formatted in full and written with one `write_all` under the stream's lock,
//! so lines from concurrent walk workers never interleave mid-line.

use std::io::{self, Write};
use std::sync::Arc;

use colored::Colorize;
use parking_lot::Mutex;

type Sink = Mutex<Box<dyn Write + Send>>;

/// Console output shared by all walk workers.
pub struct Console {
    out: Sink,
    err: Sink,
    color: bool,
}

impl Console {
    /// Console on the process's stdout and stderr.
    #[must_use]
    pub fn stdio(color: bool) -> Self {
        Self::with_writers(Box::new(io::stdout()), Box::new(io::stderr()), color)
    }

    #[must_use]
    pub fn with_writers(
        out: Box<dyn Write + Send>,
        err: Box<dyn Write + Send>,
        color: bool,
    ) -> Self {
        Self {
            out: Mutex::new(out),
            err: Mutex::new(err),
            color,
        }
    }

    pub fn info(&self, message: &str) {
        write_line(&self.out, &format!("{message}\n"));
    }

    pub fn warning(&self, message: &str) {
        let tag = if self.color {
            "warning:".yellow().bold().to_string()
        } else {
            "warning:".to_string()
        };
        write_line(&self.err, &format!("{tag} {message}\n"));
    }

    /// `message` is expected to start with its `[OSTM-NNNN]` code.
    pub fn error(&self, message: &str) {
        let tag = if self.color {
            "error:".red().bold().to_string()
        } else {
            "error:".to_string()
        };
        write_line(&self.err, &format!("{tag} {message}\n"));
    }

    pub fn flush(&self) {
        let _ = self.out.lock().flush();
        let _ = self.err.lock().flush();
    }
}

fn write_line(sink: &Sink, line: &str) {
    let mut guard = sink.lock();
    let _ = guard.write_all(line.as_bytes());
    let _ = guard.flush();
}

/// In-memory writer whose contents can be read back after being handed to a
/// [`Console`]. Used to capture output in tests and embedding callers.
#[derive(Debug, Clone, Default)]
pub struct CaptureBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl CaptureBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for CaptureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Console writing into two capture buffers, uncolored.
#[must_use]
pub fn capture() -> (Console, CaptureBuffer, CaptureBuffer) {
    let out = CaptureBuffer::new();
    let err = CaptureBuffer::new();
    let console = Console::with_writers(Box::new(out.clone()), Box::new(err.clone()), false);
    (console, out, err)
}
