//! Addressable routing unit and its process-wide registry.
//!
//! Grounded on `core/LoggerManager.h` / `core/LoggerBase.h`: a sorted,
//! name-keyed registry behind the same spinlock pattern the thread-context
//! and sink managers use. `create_or_get_logger` is idempotent on
//! name collision. A logger is immutable in name/sinks/pattern
//! options/clock source once published; level and validity are mutable
//! and atomic.

use crate::level::{AtomicLevel, LogLevel};
use crate::pattern::{PatternFormatter, PatternFormatterOptions};
use crate::sink::Sink;
use crate::spinlock::Spinlock;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
  Tsc,
  System,
  User,
}

pub struct Logger {
  name: Arc<str>,
  sinks: Vec<Arc<Mutex<dyn Sink>>>,
  pattern_options: PatternFormatterOptions,
  clock_source: ClockSource,
  effective_level: AtomicLevel,
  backtrace_flush_level: AtomicLevel,
  valid: AtomicBool,
  pattern_formatter: Mutex<Option<PatternFormatter>>,
  backtrace_storage: Mutex<Option<crate::backtrace::BacktraceStorage>>,
  immediate_flush_threshold: Option<usize>,
  immediate_flush_counter: AtomicUsize,
}

impl Logger {
  fn new(
    name: Arc<str>,
    sinks: Vec<Arc<Mutex<dyn Sink>>>,
    pattern_options: PatternFormatterOptions,
    clock_source: ClockSource,
    initial_level: LogLevel,
  ) -> Self {
    Self {
      name,
      sinks,
      pattern_options,
      clock_source,
      effective_level: AtomicLevel::new(initial_level),
      backtrace_flush_level: AtomicLevel::new(LogLevel::None),
      valid: AtomicBool::new(true),
      pattern_formatter: Mutex::new(None),
      backtrace_storage: Mutex::new(None),
      immediate_flush_threshold: None,
      immediate_flush_counter: AtomicUsize::new(0),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn clock_source(&self) -> ClockSource {
    self.clock_source
  }

  pub fn sinks(&self) -> &[Arc<Mutex<dyn Sink>>] {
    &self.sinks
  }

  pub fn is_valid(&self) -> bool {
    self.valid.load(Ordering::Acquire)
  }

  pub fn mark_invalid(&self) {
    self.valid.store(false, Ordering::Release);
  }

  pub fn effective_level(&self) -> LogLevel {
    self.effective_level.load()
  }

  pub fn set_level(&self, level: LogLevel) {
    self.effective_level.store(level);
  }

  pub fn set_backtrace_flush_level(&self, level: LogLevel) {
    self.backtrace_flush_level.store(level);
  }

  pub fn backtrace_flush_level(&self) -> LogLevel {
    self.backtrace_flush_level.load()
  }

  /// Early-out check on the producer's hot path: is `level` severe enough
  /// to bother encoding a record at all?
  pub fn should_log(&self, level: LogLevel) -> bool {
    level >= self.effective_level() || level == LogLevel::Backtrace
  }

  /// Lazily constructs the shared pattern formatter on first use.
  pub fn with_pattern_formatter<R>(&self, f: impl FnOnce(&mut PatternFormatter) -> R) -> R {
    let mut guard = self.pattern_formatter.lock().unwrap_or_else(|e| e.into_inner());
    if guard.is_none() {
      *guard = PatternFormatter::new(&self.pattern_options).ok();
    }
    f(guard.as_mut().expect("pattern compiled at logger construction"))
  }

  pub fn init_backtrace(&self, capacity: usize) {
    let mut guard = self.backtrace_storage.lock().unwrap_or_else(|e| e.into_inner());
    match guard.as_mut() {
      Some(storage) => storage.reinit(capacity),
      None => *guard = Some(crate::backtrace::BacktraceStorage::new(capacity)),
    }
  }

  pub fn with_backtrace_storage<R>(
    &self,
    f: impl FnOnce(Option<&mut crate::backtrace::BacktraceStorage>) -> R,
  ) -> R {
    let mut guard = self.backtrace_storage.lock().unwrap_or_else(|e| e.into_inner());
    f(guard.as_mut())
  }

  /// Increments the immediate-flush counter; returns `true` when the
  /// configured threshold is reached and a synchronous flush should fire.
  pub fn note_emitted_and_should_flush(&self) -> bool {
    let Some(threshold) = self.immediate_flush_threshold else { return false };
    let count = self.immediate_flush_counter.fetch_add(1, Ordering::Relaxed) + 1;
    if count >= threshold {
      self.immediate_flush_counter.store(0, Ordering::Relaxed);
      true
    } else {
      false
    }
  }
}

/// Process-wide, name-sorted logger registry.
#[derive(Default)]
pub struct LoggerManager {
  lock: Spinlock,
  loggers: UnsafeCell<Vec<Arc<Logger>>>,
  removal_pending: AtomicBool,
}

unsafe impl Sync for LoggerManager {}

impl LoggerManager {
  pub fn new() -> Self {
    Self { lock: Spinlock::new(), loggers: UnsafeCell::new(Vec::new()), removal_pending: AtomicBool::new(false) }
  }

  /// Idempotent on name collision: returns the existing logger if present.
  pub fn create_or_get(
    &self,
    name: &str,
    sinks: Vec<Arc<Mutex<dyn Sink>>>,
    pattern_options: PatternFormatterOptions,
    clock_source: ClockSource,
    initial_level: LogLevel,
  ) -> Arc<Logger> {
    let _guard = self.lock.lock();
    let loggers = unsafe { &mut *self.loggers.get() };

    match loggers.binary_search_by(|l| l.name().cmp(name)) {
      Ok(idx) => loggers[idx].clone(),
      Err(idx) => {
        let logger = Arc::new(Logger::new(Arc::from(name), sinks, pattern_options, clock_source, initial_level));
        loggers.insert(idx, logger.clone());
        logger
      },
    }
  }

  pub fn get(&self, name: &str) -> Option<Arc<Logger>> {
    let _guard = self.lock.lock();
    let loggers = unsafe { &*self.loggers.get() };
    loggers.binary_search_by(|l| l.name().cmp(name)).ok().map(|idx| loggers[idx].clone())
  }

  /// Asynchronous removal: marks the logger invalid immediately;
  /// physical removal happens on the backend's next cleanup pass once all
  /// thread contexts are drained.
  pub fn remove(&self, logger: &Logger) {
    logger.mark_invalid();
    self.removal_pending.store(true, Ordering::Release);
  }

  pub fn snapshot(&self) -> Vec<Arc<Logger>> {
    let _guard = self.lock.lock();
    unsafe { &*self.loggers.get() }.clone()
  }

  /// Backend-side cleanup: physically drops invalid loggers once the
  /// caller confirms every thread context is fully drained.
  pub fn reclaim_invalid(&self, all_queues_drained: bool) {
    if !self.removal_pending.swap(false, Ordering::AcqRel) || !all_queues_drained {
      if !all_queues_drained {
        // Re-arm: we deferred, so the next tick must re-check.
        self.removal_pending.store(true, Ordering::Release);
      }
      return;
    }
    let _guard = self.lock.lock();
    unsafe { &mut *self.loggers.get() }.retain(|l| l.is_valid());
  }
}
