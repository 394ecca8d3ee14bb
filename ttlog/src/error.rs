//! Crate-wide error taxonomy.
//!
//! Grounded on quill's `quill::QuillError` (`core/QuillError.h`), a
//! single exception type wrapping a message string. duck-ttlog never
//! pulls in `thiserror`/`anyhow` anywhere in its workspace, so this stays
//! a hand-written `enum` + `Display`/`Error` impl, matching that texture.
//!
//! Only the synchronous categories of the error taxonomy are ever
//! returned as `Result<_, QuillError>`. The asynchronous ones
//! (`FormatFailure`, `BackendTaskFailure`, `SinkIOError`,
//! `SignalHandlerTimeout`) are constructed by the backend worker and
//! handed to the configured `error_notifier` instead.

use std::fmt;

#[derive(Debug, Clone)]
pub enum QuillError {
  /// A bounded ring buffer was constructed with `capacity < 1024`.
  CapacityTooSmall { requested: usize },
  /// A pattern string referenced an unknown attribute token.
  InvalidPattern { message: String },
  /// A second backend was started while one already holds the process-wide lock.
  DuplicateBackend { message: String },
  /// A single record exceeds the unbounded queue's configured `max_capacity`.
  MessageTooLarge { size: usize, max_capacity: usize },
  /// A bounded queue had no space and the queue policy is `Dropping`.
  QueueFull { thread_id: u64 },
  /// Formatting a record's arguments failed; the backend substitutes a diagnostic line.
  FormatFailure { message: String, location: String, error: String },
  /// An unexpected failure inside the backend's main loop; the loop continues.
  BackendTaskFailure { message: String },
  /// A sink's `write_log` or `flush_sink` failed; other sinks still receive the event.
  SinkIOError { sink: String, message: String },
  /// The POSIX alarm guarding a signal handler fired before the handler completed.
  SignalHandlerTimeout { signal: i32 },
}

impl fmt::Display for QuillError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::CapacityTooSmall { requested } => {
        write!(f, "capacity must be at least 1024, got {requested}")
      },
      Self::InvalidPattern { message } => write!(f, "invalid pattern: {message}"),
      Self::DuplicateBackend { message } => write!(f, "duplicate backend: {message}"),
      Self::MessageTooLarge { size, max_capacity } => write!(
        f,
        "message of {size} bytes exceeds unbounded_queue_max_capacity of {max_capacity} bytes"
      ),
      Self::QueueFull { thread_id } => write!(f, "queue full on thread {thread_id}"),
      Self::FormatFailure { message, location, error } => write!(
        f,
        "[Could not format log statement. message: \"{message}\", location: \"{location}\", error: \"{error}\"]"
      ),
      Self::BackendTaskFailure { message } => write!(f, "backend task failure: {message}"),
      Self::SinkIOError { sink, message } => write!(f, "sink '{sink}' io error: {message}"),
      Self::SignalHandlerTimeout { signal } => {
        write!(f, "signal handler timed out while handling signal {signal}")
      },
    }
  }
}

impl std::error::Error for QuillError {}
