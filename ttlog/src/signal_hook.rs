//! POSIX signal handling: flush, snapshot, then re-raise.
//!
//! Grounded on duck-ttlog's `signal_hook::SignalHook`, which runs
//! `signal_hook::iterator::Signals` on a dedicated thread rather than
//! inside the actual async-signal context — simpler and sufficient for
//! the crash-reporting use case, at the cost of not being strictly
//! async-signal-safe. First-thread-wins: a second signal arriving while
//! the first is still being handled re-raises immediately instead of
//! racing the same snapshot. A watchdog thread stands in for
//! quill's POSIX `alarm()` guard, since this crate has no `libc`
//! dependency to call `alarm` directly: if handling does not finish
//! within `guard_timeout`, the process aborts rather than hang.

use crate::error::QuillError;
use crate::frontend::Frontend;
use crate::snapshot::SnapshotWriter;
use signal_hook::iterator::{Handle, Signals};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

static HANDLING: AtomicBool = AtomicBool::new(false);

pub struct SignalGuard {
  handle: Handle,
  join: Option<JoinHandle<()>>,
}

impl SignalGuard {
  pub fn stop(&mut self) {
    self.handle.close();
    if let Some(join) = self.join.take() {
      let _ = join.join();
    }
  }
}

impl Drop for SignalGuard {
  fn drop(&mut self) {
    self.stop();
  }
}

/// Installs handlers for `signals`, each of which snapshots outstanding
/// transit state and flushes every logger before re-raising the signal's
/// default behavior.
pub fn install(
  frontend: Arc<Frontend>,
  writer: Arc<SnapshotWriter>,
  signals: &[i32],
  guard_timeout: Duration,
) -> Result<SignalGuard, QuillError> {
  let mut iterator = Signals::new(signals)
    .map_err(|e| QuillError::BackendTaskFailure { message: format!("signal registration failed: {e}") })?;
  let handle = iterator.handle();

  let join = std::thread::spawn(move || {
    for signal in &mut iterator {
      if HANDLING.swap(true, Ordering::AcqRel) {
        // Another signal is already being handled; don't race its snapshot.
        let _ = signal_hook::low_level::emulate_default_handler(signal);
        continue;
      }

      let watchdog_timeout = guard_timeout;
      let watchdog_done = Arc::new(AtomicBool::new(false));
      let watchdog = {
        let watchdog_done = watchdog_done.clone();
        std::thread::spawn(move || {
          let start = Instant::now();
          while !watchdog_done.load(Ordering::Acquire) {
            if start.elapsed() >= watchdog_timeout {
              eprintln!("[ttlog] signal handler exceeded {watchdog_timeout:?}, aborting");
              std::process::abort();
            }
            std::thread::sleep(Duration::from_millis(10));
          }
        })
      };

      eprintln!("[ttlog] signal {signal} received");
      // SAFETY: see `crate::snapshot` docs; this is the crash path.
      if let Err(e) = unsafe { writer.snapshot_and_write(&frontend, format!("signal-{signal}")) } {
        eprintln!("[ttlog] failed to write signal snapshot: {e}");
      }
      for logger in frontend.loggers.snapshot() {
        let _ = frontend.flush(&logger);
      }

      watchdog_done.store(true, Ordering::Release);
      let _ = watchdog.join();
      HANDLING.store(false, Ordering::Release);
      let _ = signal_hook::low_level::emulate_default_handler(signal);
    }
  });

  Ok(SignalGuard { handle, join: Some(join) })
}
