//! Producer-side API and the hot-path encode sequence.
//!
//! Grounded on `core/Logger.h` / `frontend/Frontend.h`: `log()` is the one
//! function every call site macro-expands into. It resolves (and lazily
//! creates) the calling thread's [`ThreadContext`], reserves a contiguous
//! window in its queue, writes a small fixed header followed by the
//! logger name and the call site's encoded arguments, and publishes the
//! write. No locks and no allocation on this path once a thread's context
//! and queue already exist.
//!
//! Wire layout per queued record, matching [`crate::backend`]'s decode:
//! `[u8 kind][u64 timestamp][payload]`, where `payload` depends on `kind`:
//! - `Log` and the `LogWithRuntimeMetadata*` variants: `[usize decode_fn]
//!   [usize metadata_ptr][logger_name: len-prefixed][args bytes]`
//! - `InitBacktrace`: `[usize capacity]`
//! - `FlushBacktrace`: no payload
//! - `Flush` / `LoggerRemovalRequest`: `[usize flag_ptr]` (an
//!   `Arc<AtomicBool>` leaked via `Arc::into_raw`, reclaimed by the backend
//!   via `Arc::from_raw`)

use crate::codec::{ArgsCodec, Codec, DecodeFn};
use crate::error::QuillError;
use crate::level::LogLevel;
use crate::logger::{ClockSource, Logger, LoggerManager};
use crate::metadata::{EventKind, MacroMetadata};
use crate::pattern::PatternFormatterOptions;
use crate::sink::{Sink, SinkManager};
use crate::spsc::QueuePolicy;
use crate::thread_context::{Queue, ThreadContext, ThreadContextManager};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

thread_local! {
  static CONTEXT: RefCell<Option<Arc<ThreadContext>>> = const { RefCell::new(None) };
}

#[derive(Clone)]
pub struct FrontendOptions {
  pub use_unbounded_queue: bool,
  pub initial_queue_capacity: usize,
  pub unbounded_max_capacity: usize,
  pub queue_policy: QueuePolicy,
}

impl Default for FrontendOptions {
  fn default() -> Self {
    Self {
      use_unbounded_queue: true,
      initial_queue_capacity: 64 * 1024,
      unbounded_max_capacity: 256 * 1024 * 1024,
      queue_policy: QueuePolicy::Blocking,
    }
  }
}

/// The producer-facing surface: logger/sink registries plus the
/// condition variable the backend sleeps on between drain passes.
pub struct Frontend {
  pub(crate) thread_contexts: ThreadContextManager,
  pub(crate) loggers: LoggerManager,
  pub(crate) sinks: SinkManager,
  options: FrontendOptions,
  wake: Arc<(Mutex<bool>, Condvar)>,
}

impl Default for Frontend {
  fn default() -> Self {
    Self::new(FrontendOptions::default())
  }
}

impl Frontend {
  pub fn new(options: FrontendOptions) -> Self {
    Self {
      thread_contexts: ThreadContextManager::new(),
      loggers: LoggerManager::new(),
      sinks: SinkManager::new(),
      options,
      wake: Arc::new((Mutex::new(false), Condvar::new())),
    }
  }

  pub(crate) fn wake_handle(&self) -> Arc<(Mutex<bool>, Condvar)> {
    self.wake.clone()
  }

  fn notify_backend(&self) {
    let (lock, cvar) = &*self.wake;
    *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
    cvar.notify_one();
  }

  fn create_thread_context(&self) -> Arc<ThreadContext> {
    let ctx = if self.options.use_unbounded_queue {
      self.thread_contexts.register_unbounded(
        self.options.initial_queue_capacity,
        self.options.unbounded_max_capacity,
        self.options.queue_policy,
      )
    } else {
      self.thread_contexts.register_bounded(self.options.initial_queue_capacity, self.options.queue_policy)
    };
    ctx.expect("queue construction uses validated defaults")
  }

  /// Returns (lazily creating) the calling thread's context.
  pub fn thread_context(&self) -> Arc<ThreadContext> {
    CONTEXT.with(|cell| {
      let mut slot = cell.borrow_mut();
      if let Some(ctx) = slot.as_ref() {
        if ctx.is_valid() {
          return ctx.clone();
        }
      }
      let ctx = self.create_thread_context();
      *slot = Some(ctx.clone());
      ctx
    })
  }

  /// Forces context creation for the calling thread ahead of its first log
  /// call, so that call does not pay the lazy-init cost.
  pub fn preallocate(&self) {
    self.thread_context();
  }

  pub fn get_thread_local_queue_capacity(&self) -> usize {
    match &self.thread_context().queue {
      Queue::Bounded(q, _) => q.capacity(),
      Queue::Unbounded(q, _) => q.capacity(),
    }
  }

  /// Shrinks future writes on the calling thread's unbounded queue; a
  /// no-op on bounded queues and a no-op if `capacity` would not at least
  /// halve the current one.
  pub fn shrink_thread_local_queue(&self, capacity: usize) -> Result<(), QuillError> {
    match &self.thread_context().queue {
      Queue::Unbounded(q, _) => q.shrink(capacity),
      Queue::Bounded(_, _) => Ok(()),
    }
  }

  pub fn create_or_get_logger(
    &self,
    name: &str,
    sinks: Vec<Arc<Mutex<dyn Sink>>>,
    pattern_options: PatternFormatterOptions,
    clock_source: ClockSource,
    initial_level: LogLevel,
  ) -> Arc<Logger> {
    for (i, sink) in sinks.iter().enumerate() {
      self.sinks.track(format!("{name}#{i}"), sink);
    }
    let initial_level = env_log_level().unwrap_or(initial_level);
    self.loggers.create_or_get(name, sinks, pattern_options, clock_source, initial_level)
  }

  pub fn get_logger(&self, name: &str) -> Option<Arc<Logger>> {
    self.loggers.get(name)
  }

  /// Asynchronous removal: takes effect once the backend observes every
  /// thread context drained.
  pub fn remove_logger(&self, logger: &Logger) {
    self.loggers.remove(logger);
    self.notify_backend();
  }

  /// Blocks the calling thread until every record already queued ahead of
  /// this call has been dispatched and the logger is fully removed.
  pub fn remove_logger_blocking(&self, logger: &Arc<Logger>) -> Result<(), QuillError> {
    let flag = Arc::new(AtomicBool::new(false));
    self.enqueue_control(EventKind::LoggerRemovalRequest, flag.clone())?;
    self.loggers.remove(logger);
    self.spin_until_flagged(&flag);
    self.notify_backend();
    Ok(())
  }

  /// Blocks the calling thread until every sink reachable from `logger`
  /// has observed every record queued ahead of this call.
  pub fn flush(&self, logger: &Logger) -> Result<(), QuillError> {
    let flag = Arc::new(AtomicBool::new(false));
    self.enqueue_control(EventKind::Flush, flag.clone())?;
    let _ = logger;
    self.notify_backend();
    self.spin_until_flagged(&flag);
    Ok(())
  }

  fn spin_until_flagged(&self, flag: &Arc<AtomicBool>) {
    let mut spins = 0u32;
    while !flag.load(Ordering::Acquire) {
      if spins < 1000 {
        std::hint::spin_loop();
      } else {
        std::thread::sleep(Duration::from_micros(50));
      }
      spins = spins.saturating_add(1);
    }
  }

  fn enqueue_control(&self, kind: EventKind, flag: Arc<AtomicBool>) -> Result<(), QuillError> {
    let ctx = self.thread_context();
    let header = 1 + 8 + std::mem::size_of::<usize>();
    let flag_ptr = Arc::into_raw(flag) as usize;

    let now = epoch_ns_now();
    let write = |dest: *mut u8| unsafe {
      dest.write(kind as u8);
      dest.add(1).cast::<u64>().write_unaligned(now);
      dest.add(9).cast::<usize>().write_unaligned(flag_ptr);
    };
    self.write_record(&ctx, header, write)
  }

  /// Requests backtrace storage of the given capacity for `logger`.
  pub fn init_backtrace(&self, logger: &Logger, capacity: usize) -> Result<(), QuillError> {
    logger.init_backtrace(capacity);
    Ok(())
  }

  /// The hot-path encode call every logging macro expands into.
  #[allow(clippy::too_many_arguments)]
  pub fn log<A: ArgsCodec>(
    &self,
    logger: &Logger,
    metadata: &'static MacroMetadata,
    decode_fn: DecodeFn,
    args: A,
  ) -> Result<(), QuillError> {
    if !logger.should_log(metadata.level()) {
      return Ok(());
    }

    let ctx = self.thread_context();
    let timestamp = match logger.clock_source() {
      ClockSource::Tsc => read_tsc_now(),
      ClockSource::System | ClockSource::User => epoch_ns_now(),
    };

    let logger_name = logger.name();
    let header = 1 + 8 + 2 * std::mem::size_of::<usize>();
    let name_size = Codec::compute_encoded_size(logger_name);
    let args_size = args.encoded_size();
    let total = header + name_size + args_size;

    let metadata_ptr = metadata as *const MacroMetadata as usize;
    let decode_fn_ptr = decode_fn as usize;

    let write = |dest: *mut u8| unsafe {
      let mut offset = 0usize;
      dest.write(metadata.event() as u8);
      offset += 1;
      dest.add(offset).cast::<u64>().write_unaligned(timestamp);
      offset += 8;
      dest.add(offset).cast::<usize>().write_unaligned(decode_fn_ptr);
      offset += std::mem::size_of::<usize>();
      dest.add(offset).cast::<usize>().write_unaligned(metadata_ptr);
      offset += std::mem::size_of::<usize>();
      Codec::encode(logger_name, dest.add(offset));
      offset += name_size;
      args.encode(dest.add(offset));
    };

    self.write_record(&ctx, total, write)?;

    if logger.note_emitted_and_should_flush() {
      self.flush(logger)?;
    } else {
      self.notify_backend();
    }
    Ok(())
  }

  /// Shared reserve/write/publish sequence for both control records and
  /// full log records, honoring the thread context's queue-full policy.
  fn write_record(&self, ctx: &ThreadContext, total: usize, write: impl FnOnce(*mut u8)) -> Result<(), QuillError> {
    loop {
      let attempt = match &ctx.queue {
        Queue::Bounded(q, _) => q.prepare_write(total).map(Ok),
        Queue::Unbounded(q, _) => match q.prepare_write(total) {
          Ok(ptr) => ptr.map(Ok),
          Err(e) => Some(Err(e)),
        },
      };

      match attempt {
        Some(Ok(ptr)) => {
          write(ptr);
          match &ctx.queue {
            Queue::Bounded(q, _) => q.finish_and_commit_write(total),
            Queue::Unbounded(q, _) => q.finish_and_commit_write(total),
          }
          return Ok(());
        },
        Some(Err(err)) => return Err(err),
        None => match ctx.queue.policy() {
          QueuePolicy::Blocking => {
            ctx.failure_counter.fetch_add(1, Ordering::Relaxed);
            std::hint::spin_loop();
          },
          QueuePolicy::Dropping => {
            ctx.failure_counter.fetch_add(1, Ordering::Relaxed);
            crate::diagnostics::queue_full(ctx.thread_id);
            return Err(QuillError::QueueFull { thread_id: ctx.thread_id });
          },
        },
      }
    }
  }
}

/// `QUILL_LOG_LEVEL`, if set and parseable, overrides every logger's
/// initial level from the moment it is first created.
fn env_log_level() -> Option<LogLevel> {
  std::env::var("QUILL_LOG_LEVEL").ok()?.parse().ok()
}

fn epoch_ns_now() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

#[cfg(target_arch = "x86_64")]
fn read_tsc_now() -> u64 {
  unsafe { std::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
fn read_tsc_now() -> u64 {
  epoch_ns_now()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::codec::decode_fn;
  use crate::metadata::EventKind;
  use crate::sink::MemorySink;

  static META: MacroMetadata = MacroMetadata::new("f.rs:1", "f", "{}", "", LogLevel::Info, EventKind::Log);

  #[test]
  fn logging_below_effective_level_is_a_hot_path_noop() {
    let frontend = Frontend::default();
    let sink: Arc<Mutex<dyn Sink>> = Arc::new(Mutex::new(MemorySink::default()));
    let logger = frontend.create_or_get_logger(
      "quiet",
      vec![sink],
      PatternFormatterOptions::default(),
      ClockSource::System,
      LogLevel::Error,
    );
    let result = frontend.log(&logger, &META, decode_fn::<(i64,)>(), (1i64,));
    assert!(result.is_ok());
  }

  #[test]
  fn logging_at_or_above_effective_level_queues_a_record() {
    let frontend = Frontend::default();
    let sink: Arc<Mutex<dyn Sink>> = Arc::new(Mutex::new(MemorySink::default()));
    let logger = frontend.create_or_get_logger(
      "loud",
      vec![sink],
      PatternFormatterOptions::default(),
      ClockSource::System,
      LogLevel::Info,
    );
    frontend.log(&logger, &META, decode_fn::<(i64,)>(), (42i64,)).unwrap();
    assert!(!frontend.thread_context().queue.is_empty());
  }

  #[test]
  fn quill_log_level_env_var_overrides_initial_level() {
    // SAFETY: no other test in this process reads or writes this variable.
    unsafe { std::env::set_var("QUILL_LOG_LEVEL", "warning") };
    let frontend = Frontend::default();
    let sink: Arc<Mutex<dyn Sink>> = Arc::new(Mutex::new(MemorySink::default()));
    let logger = frontend.create_or_get_logger(
      "env-level",
      vec![sink],
      PatternFormatterOptions::default(),
      ClockSource::System,
      LogLevel::Info,
    );
    unsafe { std::env::remove_var("QUILL_LOG_LEVEL") };
    assert_eq!(logger.effective_level(), LogLevel::Warning);
  }
}
