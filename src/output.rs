//! Operator-facing report output.
//!
//! The checker writes two streams: the stdout report (the per-table checksum
//! blocks) and a prefixed stderr diagnostic stream (`INFO: `, `WARNING: `,
//! `ERROR: `). Both targets are injected, so tests capture them in memory
//! instead of scraping the process's file descriptors.

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Cloneable handle over one injected `Write` target. Lines are written
/// whole; write errors are ignored (there is nowhere to report them).
#[derive(Clone)]
pub struct Sink {
    inner: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Sink {
    pub fn new(target: Box<dyn Write + Send>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(target)),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(io::stderr()))
    }

    /// In-memory sink; the returned buffer observes everything written.
    pub fn capture() -> (Self, Arc<Mutex<Vec<u8>>>) {
        #[derive(Clone)]
        struct Buf(Arc<Mutex<Vec<u8>>>);
        impl Write for Buf {
            fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(bytes);
                Ok(bytes.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }
        let buf = Arc::new(Mutex::new(Vec::new()));
        (Self::new(Box::new(Buf(Arc::clone(&buf)))), buf)
    }

    pub fn line(&self, line: &str) {
        let mut target = self.inner.lock().unwrap();
        let _ = writeln!(target, "{}", line);
    }
}

/// The driver's stdout/stderr pair with the report's prefix conventions.
#[derive(Clone)]
pub struct OutputSink {
    out: Sink,
    err: Sink,
}

impl OutputSink {
    pub fn new(out: Sink, err: Sink) -> Self {
        Self { out, err }
    }

    pub fn stdio() -> Self {
        Self::new(Sink::stdout(), Sink::stderr())
    }

    /// Captured pair for tests: (sink, stdout buffer, stderr buffer).
    pub fn capture() -> (Self, Arc<Mutex<Vec<u8>>>, Arc<Mutex<Vec<u8>>>) {
        let (out, out_buf) = Sink::capture();
        let (err, err_buf) = Sink::capture();
        (Self::new(out, err), out_buf, err_buf)
    }

    /// One line of the stdout report.
    pub fn out_line(&self, line: &str) {
        self.out.line(line);
    }

    pub fn info(&self, msg: &str) {
        self.err.line(&format!("INFO: {}", msg));
    }

    pub fn warn(&self, msg: &str) {
        self.err.line(&format!("WARNING: {}", msg));
    }

    pub fn error(&self, msg: &str) {
        self.err.line(&format!("ERROR: {}", msg));
    }

    /// Unprefixed stderr line (separators, blank spacing).
    pub fn err_line(&self, line: &str) {
        self.err.line(line);
    }
}

/// Formats a byte count the way operators expect progress lines to read.
pub fn human_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "K", "M", "G", "T"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value.abs() >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{}B", bytes)
    } else {
        format!("{:.2}{}", value, UNITS[unit])
    }
}
