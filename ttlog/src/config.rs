//! Typed configuration surface for the backend worker.
//!
//! Grounded on `backend/BackendOptions.h`: one plain struct of knobs, no
//! external config file format, consumed by [`crate::backend::Backend::start`].
//! Field defaults mirror quill's; anything resolution-worthy (cpu
//! affinity, thread naming) follows duck-ttlog's `worker` module instead
//! of inventing a new convention.

use crate::level::LogLevel;
use std::sync::Arc;
use std::time::Duration;

/// Invoked by the backend whenever an asynchronous failure occurs on its
/// thread (format failures, sink I/O errors, signal handler timeouts).
/// Never called for synchronous errors, which are returned directly as a
/// `Result<_, QuillError>` to the caller that triggered them.
pub type ErrorNotifier = Arc<dyn Fn(crate::error::QuillError) + Send + Sync>;

#[derive(Clone)]
pub struct BackendOptions {
  /// How long the backend sleeps between drain passes when every queue
  /// was empty on the previous pass.
  pub sleep_duration: Duration,
  /// How long the backend waits for straggling producers before it
  /// finalizes an ordering decision across thread contexts.
  pub transit_event_buffer_grace_period: Duration,
  /// Name given to the spawned OS thread.
  pub thread_name: String,
  /// Pin the backend thread to this CPU core, best-effort (`None` = no affinity).
  pub cpu_affinity: Option<usize>,
  /// Initial per-context transit event buffer capacity (rounded to a power of two).
  pub transit_event_buffer_initial_capacity: usize,
  /// How often the backend runs sink maintenance / RDTSC resync.
  pub maintenance_interval: Duration,
  /// Invoked on every asynchronous backend-side failure.
  pub error_notifier: ErrorNotifier,
  /// When `true`, `Backend::stop` blocks until every producer queue and
  /// transit buffer has drained instead of returning immediately.
  pub wait_for_queues_to_empty_before_exit: bool,
  /// Overrides [`LogLevel::description`] for one or more levels.
  pub level_descriptions: Option<[&'static str; 11]>,
  /// Overrides [`LogLevel::short_code`] for one or more levels.
  pub level_short_codes: Option<[&'static str; 11]>,
  /// Predicate deciding whether a raw byte is safe to print verbatim when
  /// sanitizing a message for a plain-text sink; non-printable bytes are
  /// escaped as `\xNN` instead.
  pub is_printable: Arc<dyn Fn(u8) -> bool + Send + Sync>,
  /// Resync interval for the RDTSC-sourced clock.
  pub rdtsc_resync_interval: Duration,
  /// Install SIGINT/SIGTERM/SIGSEGV handlers that flush every logger
  /// before re-raising the signal.
  pub install_signal_handler: bool,
  /// Signals handled when `install_signal_handler` is set.
  pub catchable_signals: Vec<i32>,
}

impl Default for BackendOptions {
  fn default() -> Self {
    Self {
      sleep_duration: Duration::from_micros(500),
      transit_event_buffer_grace_period: Duration::from_millis(1),
      thread_name: "ttlog-backend".to_string(),
      cpu_affinity: None,
      transit_event_buffer_initial_capacity: 128,
      maintenance_interval: Duration::from_secs(1),
      error_notifier: Arc::new(|err| eprintln!("ttlog backend error: {err}")),
      wait_for_queues_to_empty_before_exit: true,
      level_descriptions: None,
      level_short_codes: None,
      is_printable: Arc::new(|b| (0x20..=0x7e).contains(&b)),
      rdtsc_resync_interval: Duration::from_secs(500),
      install_signal_handler: false,
      catchable_signals: default_catchable_signals(),
    }
  }
}

impl BackendOptions {
  pub fn level_description(&self, level: LogLevel) -> &'static str {
    match &self.level_descriptions {
      Some(table) => table[level as usize],
      None => level.description(),
    }
  }

  pub fn level_short_code(&self, level: LogLevel) -> &'static str {
    match &self.level_short_codes {
      Some(table) => table[level as usize],
      None => level.short_code(),
    }
  }
}

#[cfg(unix)]
fn default_catchable_signals() -> Vec<i32> {
  vec![libc_signals::SIGINT, libc_signals::SIGTERM, libc_signals::SIGSEGV, libc_signals::SIGABRT]
}

#[cfg(not(unix))]
fn default_catchable_signals() -> Vec<i32> {
  Vec::new()
}

#[cfg(unix)]
mod libc_signals {
  // Mirrors the handful of signal numbers `signal-hook` re-exports, kept
  // local so this module has no direct `libc` dependency of its own.
  pub const SIGINT: i32 = 2;
  pub const SIGTERM: i32 = 15;
  pub const SIGABRT: i32 = 6;
  pub const SIGSEGV: i32 = 11;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_options_use_standard_level_labels() {
    let opts = BackendOptions::default();
    assert_eq!(opts.level_description(LogLevel::Warning), "WARNING");
    assert_eq!(opts.level_short_code(LogLevel::Error), "E");
  }

  #[test]
  fn level_descriptions_can_be_overridden() {
    let mut table = [""; 11];
    table[LogLevel::Info as usize] = "INF";
    let opts = BackendOptions { level_descriptions: Some(table), ..Default::default() };
    assert_eq!(opts.level_description(LogLevel::Info), "INF");
  }
}
