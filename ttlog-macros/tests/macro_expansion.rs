//! Exercises the `log!`/`info!`/etc. expansions against the real engine,
//! the way no unit test inside this proc-macro crate itself could
//! (expansion only becomes real code in a crate that also depends on
//! `ttlog`).

use std::sync::{Arc, Mutex};
use ttlog::config::BackendOptions;
use ttlog::frontend::Frontend;
use ttlog::level::LogLevel;
use ttlog::logger::ClockSource;
use ttlog::pattern::PatternFormatterOptions;
use ttlog::sink::{MemorySink, Sink};
use ttlog::Backend;
use ttlog_macros::{error, info};

#[test]
fn info_and_error_macros_expand_to_working_log_calls() {
  let frontend = Arc::new(Frontend::default());
  let sink = Arc::new(Mutex::new(MemorySink::default()));
  let dyn_sink: Arc<Mutex<dyn Sink>> = sink.clone();
  let logger = frontend.create_or_get_logger(
    "macro-test",
    vec![dyn_sink],
    PatternFormatterOptions { pattern: "%(message)".to_string(), ..Default::default() },
    ClockSource::System,
    LogLevel::Info,
  );

  let options = BackendOptions { thread_name: "macro-expansion-backend".to_string(), ..Default::default() };
  let mut backend = Backend::start(frontend.clone(), options).unwrap();

  info!(&frontend, &logger, "starting up on port {}", 8080).unwrap();
  error!(&frontend, &logger, "request {} failed: {}", 42, "timeout").unwrap();
  frontend.flush(&logger).unwrap();

  let lines = sink.lock().unwrap().lines.clone();
  assert_eq!(lines, vec!["starting up on port 8080\n", "request 42 failed: timeout\n"]);

  backend.stop();
}
