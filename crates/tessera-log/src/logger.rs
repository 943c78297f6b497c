//! Logger handle with scoped capture.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

struct Inner {
  sink: Box<dyn Write + Send>,
  /// Depth of live capture guards. Messages are buffered while non-zero.
  capture_depth: usize,
  buffer: Vec<String>,
}

/// A cloneable handle that writes log lines to its own sink.
///
/// Clones share the sink and the capture state, so a component can hand a
/// clone to its workers and still flush everything in order.
#[derive(Clone)]
pub struct Logger {
  inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for Logger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let inner = self.lock();
    f.debug_struct("Logger")
      .field("capture_depth", &inner.capture_depth)
      .field("buffered", &inner.buffer.len())
      .finish()
  }
}

impl Default for Logger {
  fn default() -> Self {
    Self::stderr()
  }
}

impl Logger {
  /// A logger writing to the process's stderr.
  pub fn stderr() -> Self {
    Self::new(io::stderr())
  }

  /// A logger writing to `sink`.
  pub fn new(sink: impl Write + Send + 'static) -> Self {
    Self {
      inner: Arc::new(Mutex::new(Inner {
        sink: Box::new(sink),
        capture_depth: 0,
        buffer: Vec::new(),
      })),
    }
  }

  /// A logger that discards everything.
  pub fn sink() -> Self {
    Self::new(io::sink())
  }

  /// Log a single message. Buffered while a [`CaptureGuard`] is alive.
  pub fn log(&self, message: impl Into<String>) {
    let message = message.into();
    let mut inner = self.lock();
    if inner.capture_depth > 0 {
      inner.buffer.push(message);
      return;
    }
    write_line(&mut inner.sink, &message);
  }

  /// Start buffering messages until the returned guard is flushed or dropped.
  ///
  /// Guards nest; the buffer is written out when the outermost one ends.
  pub fn capture(&self) -> CaptureGuard {
    self.lock().capture_depth += 1;
    CaptureGuard {
      logger: self.clone(),
      active: true,
    }
  }

  /// Whether a capture is currently active.
  pub fn is_capturing(&self) -> bool {
    self.lock().capture_depth > 0
  }

  /// An `io::Write` adapter that turns each written line into a log message.
  ///
  /// Useful for redirecting output that would otherwise go to stdout.
  pub fn writer(&self) -> LogWriter {
    LogWriter {
      logger: self.clone(),
      pending: Vec::new(),
    }
  }

  fn end_capture(&self) {
    let mut inner = self.lock();
    inner.capture_depth = inner.capture_depth.saturating_sub(1);
    if inner.capture_depth > 0 {
      return;
    }

    let buffered = std::mem::take(&mut inner.buffer);
    for message in &buffered {
      write_line(&mut inner.sink, message);
    }
    if let Err(e) = inner.sink.flush() {
      warn!(error = %e, "failed to flush log sink");
    }
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }
}

fn write_line(sink: &mut Box<dyn Write + Send>, message: &str) {
  if let Err(e) = writeln!(sink, "{}", message) {
    warn!(error = %e, "failed to write log message");
  }
}

/// Buffers a [`Logger`]'s messages for as long as it lives.
#[must_use = "dropping the guard immediately ends the capture"]
pub struct CaptureGuard {
  logger: Logger,
  active: bool,
}

impl CaptureGuard {
  /// End the capture now and write the buffered messages.
  pub fn flush(mut self) {
    self.finish();
  }

  fn finish(&mut self) {
    if self.active {
      self.active = false;
      self.logger.end_capture();
    }
  }
}

impl Drop for CaptureGuard {
  fn drop(&mut self) {
    self.finish();
  }
}

/// `io::Write` adapter returned by [`Logger::writer`].
///
/// Blank lines are dropped; an unterminated trailing line is logged on flush
/// or drop.
pub struct LogWriter {
  logger: Logger,
  pending: Vec<u8>,
}

impl LogWriter {
  fn emit_complete_lines(&mut self) {
    while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
      let line: Vec<u8> = self.pending.drain(..=pos).collect();
      self.emit(&line[..line.len() - 1]);
    }
  }

  fn emit(&self, line: &[u8]) {
    let text = String::from_utf8_lossy(line);
    let text = text.trim_end_matches('\r');
    if !text.trim().is_empty() {
      self.logger.log(text);
    }
  }
}

impl Write for LogWriter {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    self.pending.extend_from_slice(buf);
    self.emit_complete_lines();
    Ok(buf.len())
  }

  fn flush(&mut self) -> io::Result<()> {
    if !self.pending.is_empty() {
      let rest = std::mem::take(&mut self.pending);
      self.emit(&rest);
    }
    Ok(())
  }
}

impl Drop for LogWriter {
  fn drop(&mut self) {
    let _ = self.flush();
  }
}
