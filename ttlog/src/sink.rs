//! Polymorphic output endpoint contract and its name-keyed registry.
//!
//! Grounded on `core/SinkManager.h` for the manager shape, and on
//! duck-ttlog's `listener::LogListener` trait for the contract's spirit
//! (`handle`/`on_start`/`on_shutdown` become `write_log`/`run_periodic_tasks`
//! here). Concrete sinks (file rotation, colored console, JSON, syslog)
//! are external-collaborator code per scope; only a minimal
//! in-memory sink and a line-oriented stdout sink ship here as test/demo
//! fixtures, mirroring how duck-ttlog ships `stdout_listener` /
//! `file_listener` alongside the bare `LogListener` contract.

use crate::error::QuillError;
use crate::level::LogLevel;
use crate::metadata::MacroMetadata;
use crate::pattern::PatternFormatterOptions;
use crate::spinlock::Spinlock;
use std::cell::UnsafeCell;
use std::sync::{Arc, Weak};

/// What any sink implementation must provide. A `write_log`/`flush_sink`
/// failure is reported through the backend's `error_notifier` as a
/// [`QuillError::SinkIOError`]; dispatch continues to the remaining sinks.
pub trait Sink: Send {
  #[allow(clippy::too_many_arguments)]
  fn write_log(
    &mut self,
    metadata: &'static MacroMetadata,
    timestamp_ns: u64,
    thread_id: u64,
    thread_name: &str,
    logger_name: &str,
    level: LogLevel,
    raw_message: &str,
    formatted_line: &str,
  ) -> Result<(), QuillError>;

  fn flush_sink(&mut self) -> Result<(), QuillError>;

  /// Called by the backend during periodic maintenance.
  fn run_periodic_tasks(&mut self) {}

  /// Filter chain; the backend skips dispatch to this sink when `false`.
  fn apply_all_filters(&self, _level: LogLevel) -> bool {
    true
  }

  /// A sink may demand its own pattern formatting options instead of the
  /// logger's default.
  fn pattern_override(&self) -> Option<&PatternFormatterOptions> {
    None
  }
}

/// Name-keyed registry. Sinks are strongly owned by the loggers that
/// reference them and only weakly tracked here, so a sink is dropped
/// automatically once no logger references it.
#[derive(Default)]
pub struct SinkManager {
  lock: Spinlock,
  sinks: UnsafeCell<Vec<(String, Weak<std::sync::Mutex<dyn Sink>>)>>,
}

unsafe impl Sync for SinkManager {}

impl SinkManager {
  pub fn new() -> Self {
    Self { lock: Spinlock::new(), sinks: UnsafeCell::new(Vec::new()) }
  }

  /// Registers a weak reference to a sink a logger already owns strongly.
  pub fn track(&self, name: impl Into<String>, sink: &Arc<std::sync::Mutex<dyn Sink>>) {
    let _guard = self.lock.lock();
    let sinks = unsafe { &mut *self.sinks.get() };
    let name = name.into();
    sinks.retain(|(_, weak)| weak.strong_count() > 0);
    sinks.push((name, Arc::downgrade(sink)));
  }

  pub fn get(&self, name: &str) -> Option<Arc<std::sync::Mutex<dyn Sink>>> {
    let _guard = self.lock.lock();
    let sinks = unsafe { &*self.sinks.get() };
    sinks.iter().find(|(n, _)| n == name).and_then(|(_, weak)| weak.upgrade())
  }
}

/// In-memory sink fixture for tests: records every formatted line.
#[derive(Default)]
pub struct MemorySink {
  pub lines: Vec<String>,
  pub flush_count: usize,
}

impl Sink for MemorySink {
  fn write_log(
    &mut self,
    _metadata: &'static MacroMetadata,
    _timestamp_ns: u64,
    _thread_id: u64,
    _thread_name: &str,
    _logger_name: &str,
    _level: LogLevel,
    _raw_message: &str,
    formatted_line: &str,
  ) -> Result<(), QuillError> {
    self.lines.push(formatted_line.to_string());
    Ok(())
  }

  fn flush_sink(&mut self) -> Result<(), QuillError> {
    self.flush_count += 1;
    Ok(())
  }
}

/// Line-oriented stdout sink fixture, grounded loosely on duck-ttlog's
/// `stdout_listener` for styling (kept ANSI-free here; colorizing is an
/// external collaborator's concern per scope).
#[derive(Default)]
pub struct StdoutSink;

impl Sink for StdoutSink {
  fn write_log(
    &mut self,
    _metadata: &'static MacroMetadata,
    _timestamp_ns: u64,
    _thread_id: u64,
    _thread_name: &str,
    _logger_name: &str,
    _level: LogLevel,
    _raw_message: &str,
    formatted_line: &str,
  ) -> Result<(), QuillError> {
    print!("{formatted_line}");
    Ok(())
  }

  fn flush_sink(&mut self) -> Result<(), QuillError> {
    use std::io::Write;
    std::io::stdout()
      .flush()
      .map_err(|e| QuillError::SinkIOError { sink: "stdout".to_string(), message: e.to_string() })
  }
}
