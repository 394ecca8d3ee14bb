//! Panic-triggered crash snapshot, additive to normal signal handling.
//!
//! Grounded on duck-ttlog's `panic_hook::PanicHook`: wraps (rather than
//! replaces) whatever panic hook is already installed, captures a
//! snapshot of every thread context's still-undispatched transit events,
//! and chains into the previous hook so default panic reporting still
//! happens.

use crate::frontend::Frontend;
use crate::snapshot::SnapshotWriter;
use std::sync::Arc;

pub struct PanicHook;

impl PanicHook {
  pub fn install(frontend: Arc<Frontend>, writer: Arc<SnapshotWriter>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
      eprintln!("[ttlog] panic hook captured: {info}");

      // SAFETY: the process is unwinding (and commonly about to abort), so
      // the backend thread racing this snapshot is an accepted crash-path
      // risk (see `crate::snapshot` docs) rather than a normal-path one.
      match unsafe { writer.snapshot_and_write(&frontend, "panic") } {
        Ok(()) => eprintln!("[ttlog] panic snapshot written"),
        Err(e) => eprintln!("[ttlog] failed to write panic snapshot: {e}"),
      }

      previous(info);
    }));
  }
}
