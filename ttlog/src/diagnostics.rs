//! Optional self-observability for the backend's own lifecycle.
//!
//! Grounded on duck-ttlog's use of `tracing`/`tracing-subscriber` for its
//! own internals. This module never logs through the engine it
//! instruments — doing so would recurse — it only emits `tracing` events,
//! gated behind the `diagnostics` feature so a consumer who wants zero
//! ambient overhead can compile it out entirely.

#[cfg(feature = "diagnostics")]
mod enabled {
  use std::sync::Arc;

  pub fn backend_started(thread_name: &str) {
    tracing::info!(target: "ttlog::backend", thread_name, "backend thread started");
  }

  pub fn backend_stopped(thread_name: &str) {
    tracing::info!(target: "ttlog::backend", thread_name, "backend thread stopped");
  }

  pub fn queue_full(thread_id: u64) {
    tracing::warn!(target: "ttlog::frontend", thread_id, "producer queue full, applying configured policy");
  }

  pub fn sink_error(sink: &str, message: &str) {
    tracing::error!(target: "ttlog::sink", sink, message, "sink reported an error");
  }

  pub fn install_tracing_subscriber() -> Arc<dyn Fn() + Send + Sync> {
    let _ = tracing_subscriber::fmt::try_init();
    Arc::new(|| {})
  }
}

#[cfg(not(feature = "diagnostics"))]
mod disabled {
  pub fn backend_started(_thread_name: &str) {}
  pub fn backend_stopped(_thread_name: &str) {}
  pub fn queue_full(_thread_id: u64) {}
  pub fn sink_error(_sink: &str, _message: &str) {}
}

#[cfg(feature = "diagnostics")]
pub use enabled::*;
#[cfg(not(feature = "diagnostics"))]
pub use disabled::*;
