//! The single dedicated consumer thread: drain, order, dispatch.
//!
//! Grounded on `backend/BackendWorker.h`'s main loop shape: repeatedly
//! drain every registered thread context's queue into its transit-event
//! buffer, merge the buffers' fronts by timestamp (waiting out a grace
//! period so a slower producer's earlier-stamped record is not skipped
//! past), dispatch the next-ready record to its logger's sinks, and
//! periodically run maintenance (RDTSC resync, sink housekeeping,
//! reclaiming invalid loggers and thread contexts). Sleeps on a
//! condition variable between passes that found no ready work.

use crate::backend_lock::BackendLock;
use crate::clock::RdtscClock;
use crate::codec::{ArgsVec, Codec, DecodeFn, FormatValue};
use crate::config::BackendOptions;
use crate::error::QuillError;
use crate::frontend::Frontend;
use crate::level::LogLevel;
use crate::logger::{ClockSource, LoggerManager};
use crate::metadata::{EventKind, MacroMetadata};
use crate::named_args;
use crate::pattern::{FormatContext, PatternFormatter};
use crate::sink::Sink;
use crate::spsc::QueuePolicy;
use crate::thread_context::{Queue, ThreadContext, ThreadContextManager};
use crate::transit::TransitEvent;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

static CONTROL_METADATA: MacroMetadata =
  MacroMetadata::new("<control>:0", "<control>", "", "", LogLevel::None, EventKind::None);

fn epoch_ns_now() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

/// Handle to a running backend thread. Dropping it without calling
/// [`BackendHandle::stop`] detaches the thread; it keeps running until
/// the process exits.
pub struct BackendHandle {
  stop_flag: Arc<AtomicBool>,
  wake: Arc<(Mutex<bool>, Condvar)>,
  join: Option<JoinHandle<()>>,
}

impl BackendHandle {
  /// Signals the backend to finish its current pass and exit. Blocks
  /// until the thread has joined. Honors
  /// `wait_for_queues_to_empty_before_exit` inside the loop itself.
  pub fn stop(&mut self) {
    self.stop_flag.store(true, Ordering::Release);
    let (lock, cvar) = &*self.wake;
    *lock.lock().unwrap_or_else(|e| e.into_inner()) = true;
    cvar.notify_one();
    if let Some(join) = self.join.take() {
      let _ = join.join();
    }
  }
}

impl Drop for BackendHandle {
  fn drop(&mut self) {
    if self.join.is_some() {
      self.stop();
    }
  }
}

pub struct Backend;

impl Backend {
  /// Spawns the backend thread. Fails immediately if another backend
  /// with the same name is already running.
  pub fn start(frontend: Arc<Frontend>, options: BackendOptions) -> Result<BackendHandle, QuillError> {
    let lock = BackendLock::acquire(&options.thread_name)?;
    crate::thread_context::set_default_transit_capacity(options.transit_event_buffer_initial_capacity);
    let stop_flag = Arc::new(AtomicBool::new(false));
    let wake = frontend.wake_handle();

    let thread_stop_flag = stop_flag.clone();
    let thread_wake = wake.clone();
    let thread_name = options.thread_name.clone();

    let join = std::thread::Builder::new()
      .name(thread_name)
      .spawn(move || {
        let _lock = lock;
        apply_cpu_affinity(options.cpu_affinity);
        crate::diagnostics::backend_started(&options.thread_name);
        run_loop(&frontend, &options, &thread_stop_flag, &thread_wake);
        crate::diagnostics::backend_stopped(&options.thread_name);
      })
      .map_err(|e| QuillError::BackendTaskFailure { message: e.to_string() })?;

    Ok(BackendHandle { stop_flag, wake, join: Some(join) })
  }
}

#[cfg(target_os = "linux")]
fn apply_cpu_affinity(_core: Option<usize>) {
  // Pinning requires a direct syscall (`sched_setaffinity`) this crate does
  // not bind; best-effort no-op until a CPU-affinity crate joins the stack.
}

#[cfg(not(target_os = "linux"))]
fn apply_cpu_affinity(_core: Option<usize>) {}

fn all_contexts_drained(contexts: &[Arc<ThreadContext>]) -> bool {
  contexts.iter().all(|ctx| ctx.queue.is_empty() && unsafe { ctx.transit_buffer() }.is_empty())
}

/// Runs `step`, catching a panic instead of letting it unwind out of the
/// backend thread. A caught panic is reported through `error_notifier` as
/// a [`QuillError::BackendTaskFailure`] and the loop carries on.
fn guarded_step<T>(options: &BackendOptions, step_name: &'static str, step: impl FnOnce() -> T) -> Option<T> {
  match std::panic::catch_unwind(AssertUnwindSafe(step)) {
    Ok(value) => Some(value),
    Err(payload) => {
      let message = panic_payload_message(payload);
      (options.error_notifier)(QuillError::BackendTaskFailure { message: format!("{step_name}: {message}") });
      None
    },
  }
}

fn panic_payload_message(payload: Box<dyn std::any::Any + Send>) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "backend worker panicked".to_string()
  }
}

fn run_loop(frontend: &Frontend, options: &BackendOptions, stop_flag: &AtomicBool, wake: &Arc<(Mutex<bool>, Condvar)>) {
  let mut rdtsc = RdtscClock::new(options.rdtsc_resync_interval);
  let mut last_maintenance = Instant::now();
  let mut contexts = frontend.thread_contexts.snapshot();

  loop {
    if frontend.thread_contexts.has_new_contexts() {
      contexts = frontend.thread_contexts.snapshot();
    }

    for ctx in &contexts {
      guarded_step(options, "drain", || drain_context(ctx, &frontend.loggers, &rdtsc, options));
    }

    let dispatched_any = guarded_step(options, "dispatch", || dispatch_ready(&contexts, &frontend.loggers, options))
      .unwrap_or(false);

    if last_maintenance.elapsed() >= options.maintenance_interval {
      guarded_step(options, "maintenance", || run_maintenance(frontend, &mut rdtsc, options, &contexts));
      last_maintenance = Instant::now();
    }

    let stopping = stop_flag.load(Ordering::Acquire);
    if stopping {
      let drained = all_contexts_drained(&contexts);
      if drained || !options.wait_for_queues_to_empty_before_exit {
        break;
      }
    }

    if !dispatched_any {
      park_until_woken_or_timeout(wake, options.sleep_duration);
    }
  }
}

fn park_until_woken_or_timeout(wake: &Arc<(Mutex<bool>, Condvar)>, timeout: Duration) {
  let (lock, cvar) = &**wake;
  let guard = lock.lock().unwrap_or_else(|e| e.into_inner());
  if *guard {
    drop(guard);
    *lock.lock().unwrap_or_else(|e| e.into_inner()) = false;
    return;
  }
  let (mut guard, _) = cvar.wait_timeout_while(guard, timeout, |woken| !*woken).unwrap_or_else(|e| e.into_inner());
  *guard = false;
}

fn finish_read(ctx: &ThreadContext, n: usize) {
  match &ctx.queue {
    Queue::Bounded(q, _) => {
      q.finish_read(n);
      q.commit_read();
    },
    Queue::Unbounded(q, _) => {
      q.finish_read(n);
      q.commit_read();
    },
  }
}

/// Replaces any byte failing `options.is_printable` with a `\xNN` escape.
/// Applied to string arguments only, and only when at least one is present.
fn sanitize_string(s: &str, is_printable: &(dyn Fn(u8) -> bool + Send + Sync)) -> String {
  let mut out = String::with_capacity(s.len());
  for b in s.bytes() {
    if is_printable(b) {
      out.push(b as char);
    } else {
      out.push_str(&format!("\\x{b:02x}"));
    }
  }
  out
}

fn sanitize_args(args: &mut ArgsVec, options: &BackendOptions) {
  let has_string_arg = args.iter().any(|arg| matches!(arg, FormatValue::Str(_)));
  if !has_string_arg {
    return;
  }
  for arg in args.iter_mut() {
    if let FormatValue::Str(s) = arg {
      if s.bytes().any(|b| !(options.is_printable)(b)) {
        *s = sanitize_string(s, &*options.is_printable);
      }
    }
  }
}

/// Decodes every record currently available in `ctx`'s queue into its
/// transit-event buffer. Never blocks: stops as soon as the queue
/// reports empty (or, for an unbounded queue, no further linked ring).
fn drain_context(ctx: &ThreadContext, loggers: &LoggerManager, rdtsc: &RdtscClock, options: &BackendOptions) {
  loop {
    let ptr = match &ctx.queue {
      Queue::Bounded(q, _) => q.prepare_read(),
      Queue::Unbounded(q, _) => q.prepare_read().ptr,
    };
    let Some(ptr) = ptr else { break };

    // SAFETY: `ptr` was just returned by `prepare_read` and remains valid
    // until the matching `finish_read` below; only the backend thread
    // calls this function.
    let kind = EventKind::from_u8(unsafe { *ptr });
    let timestamp_raw = unsafe { ptr.add(1).cast::<u64>().read_unaligned() };

    match kind {
      EventKind::Flush | EventKind::LoggerRemovalRequest => {
        let flag_ptr = unsafe { ptr.add(9).cast::<usize>().read_unaligned() };
        let total = 9 + std::mem::size_of::<usize>();
        // SAFETY: `flag_ptr` was produced by `Arc::into_raw` on the frontend side.
        let flag = unsafe { Arc::from_raw(flag_ptr as *const AtomicBool) };
        let event = TransitEvent {
          timestamp_ns: timestamp_raw,
          metadata: &CONTROL_METADATA,
          logger_name: Arc::from(""),
          thread_id: ctx.thread_id,
          thread_name: Arc::from(ctx.thread_name.as_str()),
          args: Default::default(),
          formatted: String::new(),
          flush_flag: (kind == EventKind::Flush).then(|| flag.clone()),
          removal_flag: (kind == EventKind::LoggerRemovalRequest).then_some(flag),
        };
        unsafe { ctx.transit_buffer() }.push_back(event);
        finish_read(ctx, total);
      },
      _ => {
        let usize_bytes = std::mem::size_of::<usize>();
        let mut offset = 1 + 8;
        let decode_fn_ptr = unsafe { ptr.add(offset).cast::<usize>().read_unaligned() };
        offset += usize_bytes;
        let metadata_ptr = unsafe { ptr.add(offset).cast::<usize>().read_unaligned() };
        offset += usize_bytes;
        // SAFETY: points at a `'static MacroMetadata` the macro layer built.
        let metadata: &'static MacroMetadata = unsafe { &*(metadata_ptr as *const MacroMetadata) };

        let (name_value, name_len) = unsafe { <str as Codec>::decode(ptr.add(offset)) };
        offset += name_len;
        let logger_name = match name_value {
          FormatValue::Str(s) => s,
          _ => unreachable!("logger name is always string-encoded"),
        };

        // SAFETY: `decode_fn_ptr` was produced from a `DecodeFn` item by the
        // frontend's `log()` call for the exact argument tuple type used here.
        let decode_fn: DecodeFn = unsafe { std::mem::transmute::<usize, DecodeFn>(decode_fn_ptr) };
        let (mut args, args_len) = unsafe { decode_fn(ptr.add(offset)) };
        offset += args_len;
        sanitize_args(&mut args, options);

        let logger = loggers.get(&logger_name);
        let timestamp_ns = match logger.as_ref().map(|l| l.clock_source()) {
          Some(ClockSource::Tsc) => rdtsc.time_since_epoch(timestamp_raw),
          _ => timestamp_raw,
        };

        let event = TransitEvent {
          timestamp_ns,
          metadata,
          logger_name: Arc::from(logger_name.as_str()),
          thread_id: ctx.thread_id,
          thread_name: Arc::from(ctx.thread_name.as_str()),
          args,
          formatted: String::new(),
          flush_flag: None,
          removal_flag: None,
        };
        unsafe { ctx.transit_buffer() }.push_back(event);
        finish_read(ctx, offset);
      },
    }
  }
}

/// Repeatedly pops and dispatches the globally-oldest transit event whose
/// grace period has elapsed, across every context, until none qualifies.
/// Returns whether anything was dispatched this pass.
fn dispatch_ready(contexts: &[Arc<ThreadContext>], loggers: &LoggerManager, options: &BackendOptions) -> bool {
  let grace_ns = options.transit_event_buffer_grace_period.as_nanos() as u64;
  let mut dispatched_any = false;

  loop {
    let now = epoch_ns_now();
    let mut best: Option<(usize, u64)> = None;

    for (idx, ctx) in contexts.iter().enumerate() {
      // SAFETY: only the backend thread reads transit buffers.
      if let Some(event) = unsafe { ctx.transit_buffer() }.front() {
        if now.saturating_sub(event.timestamp_ns) >= grace_ns
          && best.map_or(true, |(_, ts)| event.timestamp_ns < ts)
        {
          best = Some((idx, event.timestamp_ns));
        }
      }
    }

    let Some((idx, _)) = best else { break };
    // SAFETY: see above.
    let event = unsafe { contexts[idx].transit_buffer() }.pop_front().expect("front() just confirmed non-empty");
    dispatch_one(event, loggers, options);
    dispatched_any = true;
  }

  dispatched_any
}

/// Substitutes `{}` placeholders in call-site order. Callers with a
/// `{name}`-bearing format pass the positional form `named_args::split`
/// produces, not the raw `message_format`.
fn render_message(format: &str, args: &[FormatValue]) -> String {
  let mut out = String::with_capacity(format.len());
  let mut arg_iter = args.iter();
  let mut rest = format;
  while let Some(open) = rest.find('{') {
    out.push_str(&rest[..open]);
    match rest[open..].find('}') {
      Some(close) => {
        if let Some(value) = arg_iter.next() {
          out.push_str(&value.to_string());
        }
        rest = &rest[open + close + 1..];
      },
      None => {
        out.push_str(&rest[open..]);
        rest = "";
        break;
      },
    }
  }
  out.push_str(rest);
  out
}

fn report_sink_failure(options: &BackendOptions, result: Result<(), QuillError>) {
  if let Err(err) = result {
    (options.error_notifier)(err);
  }
}

fn dispatch_one(event: TransitEvent, loggers: &LoggerManager, options: &BackendOptions) {
  if let Some(flag) = &event.flush_flag {
    for logger in loggers.snapshot() {
      for sink in logger.sinks() {
        let result = sink.lock().unwrap_or_else(|e| e.into_inner()).flush_sink();
        report_sink_failure(options, result);
      }
    }
    flag.store(true, Ordering::Release);
    return;
  }

  if let Some(flag) = &event.removal_flag {
    flag.store(true, Ordering::Release);
    return;
  }

  let Some(logger) = loggers.get(&event.logger_name) else { return };
  if !logger.is_valid() {
    return;
  }

  let level = event.metadata.level();
  let message = if event.metadata.has_named_args() {
    let split = named_args::split(event.metadata.message_format());
    render_message(&split.positional_format, &event.args)
  } else {
    render_message(event.metadata.message_format(), &event.args)
  };

  if level == LogLevel::Backtrace {
    logger.with_backtrace_storage(|storage| {
      if let Some(storage) = storage {
        storage.store(crate::backtrace::StoredTransitEvent {
          timestamp_ns: event.timestamp_ns,
          thread_id: event.thread_id,
          thread_name: event.thread_name.to_string(),
          formatted: message.clone(),
        });
      }
    });
    return;
  }

  let default_ctx = FormatContext {
    metadata: event.metadata,
    timestamp_ns: event.timestamp_ns,
    level,
    logger_name: &event.logger_name,
    thread_id: event.thread_id,
    thread_name: &event.thread_name,
    message: &message,
    level_description: options.level_description(level),
    level_short_code: options.level_short_code(level),
    args: &event.args,
  };
  let formatted = logger.with_pattern_formatter(|formatter| formatter.format(&default_ctx));

  for sink in logger.sinks() {
    let mut guard = sink.lock().unwrap_or_else(|e| e.into_inner());
    if guard.apply_all_filters(level) {
      // Sinks sharing the logger's default pattern reuse `formatted`;
      // sinks that carry an override recompute their own line.
      let override_options = guard.pattern_override().cloned();
      let line = match override_options {
        Some(options) => match PatternFormatter::new(&options) {
          Ok(mut formatter) => formatter.format(&default_ctx),
          Err(_) => formatted.clone(),
        },
        None => formatted.clone(),
      };
      let result = guard.write_log(
        event.metadata,
        event.timestamp_ns,
        event.thread_id,
        &event.thread_name,
        &event.logger_name,
        level,
        &message,
        &line,
      );
      drop(guard);
      report_sink_failure(options, result);
    }
  }

  let flush_level = logger.backtrace_flush_level();
  if flush_level != LogLevel::None && level >= flush_level {
    logger.with_backtrace_storage(|storage| {
      if let Some(storage) = storage {
        storage.process(|stored| {
          for sink in logger.sinks() {
            let result = sink.lock().unwrap_or_else(|e| e.into_inner()).write_log(
              event.metadata,
              stored.timestamp_ns,
              stored.thread_id,
              &stored.thread_name,
              &event.logger_name,
              LogLevel::Backtrace,
              &stored.formatted,
              &stored.formatted,
            );
            report_sink_failure(options, result);
          }
        });
      }
    });
  }
}

fn run_maintenance(frontend: &Frontend, rdtsc: &mut RdtscClock, options: &BackendOptions, contexts: &[Arc<ThreadContext>]) {
  rdtsc.resync_if_due();

  for logger in frontend.loggers.snapshot() {
    for sink in logger.sinks() {
      sink.lock().unwrap_or_else(|e| e.into_inner()).run_periodic_tasks();
    }
  }

  for ctx in contexts {
    let dropped = ctx.failure_counter.swap(0, Ordering::Relaxed);
    if dropped > 0 {
      let message = match ctx.queue.policy() {
        QueuePolicy::Dropping => format!("Dropped {dropped} messages from thread {}", ctx.thread_id),
        QueuePolicy::Blocking => format!("Experienced {dropped} blocking occurrences on thread {}", ctx.thread_id),
      };
      (options.error_notifier)(QuillError::BackendTaskFailure { message });
    }
    // SAFETY: called from the backend thread only.
    unsafe { ctx.transit_buffer() }.try_shrink();
  }

  let drained = all_contexts_drained(contexts);
  frontend.loggers.reclaim_invalid(drained);
  if drained {
    // SAFETY: called from the backend thread only.
    unsafe { ThreadContextManager::reclaim_invalid(&frontend.thread_contexts) };
  }
}
