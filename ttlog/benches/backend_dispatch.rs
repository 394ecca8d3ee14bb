//! End-to-end encode -> drain -> order -> dispatch latency through a live
//! backend thread, measured via `Frontend::flush`'s round trip.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::{Arc, Mutex};
use ttlog::codec::decode_fn;
use ttlog::config::BackendOptions;
use ttlog::frontend::{Frontend, FrontendOptions};
use ttlog::level::LogLevel;
use ttlog::logger::ClockSource;
use ttlog::metadata::{EventKind, MacroMetadata};
use ttlog::pattern::PatternFormatterOptions;
use ttlog::sink::{MemorySink, Sink};
use ttlog::Backend;

static META: MacroMetadata = MacroMetadata::new(
  "benches/backend_dispatch.rs:0",
  "bench",
  "iteration {} on worker {}",
  "",
  LogLevel::Info,
  EventKind::Log,
);

fn configure_criterion() -> Criterion {
  Criterion::default().sample_size(30)
}

fn run_dispatch_round(records_per_call: usize) {
  let frontend = Arc::new(Frontend::new(FrontendOptions::default()));
  let sink: Arc<Mutex<dyn Sink>> = Arc::new(Mutex::new(MemorySink::default()));
  let logger = frontend.create_or_get_logger(
    "bench",
    vec![sink],
    PatternFormatterOptions::default(),
    ClockSource::System,
    LogLevel::Info,
  );

  let mut options = BackendOptions::default();
  options.thread_name = format!("bench-backend-{:?}", std::thread::current().id());
  options.sleep_duration = std::time::Duration::from_micros(50);
  let mut handle = Backend::start(frontend.clone(), options).expect("single backend per bench thread");

  for i in 0..records_per_call {
    frontend.log(&logger, &META, decode_fn::<(i64, i64)>(), (i as i64, 0i64)).unwrap();
  }
  frontend.flush(&logger).unwrap();

  handle.stop();
}

fn bench_dispatch_batch_sizes(c: &mut Criterion) {
  let mut group = c.benchmark_group("backend_dispatch_batch_size");
  for records in [1usize, 100, 1000].iter() {
    group.bench_with_input(BenchmarkId::new("records", records), records, |b, &records| {
      b.iter(|| run_dispatch_round(records));
    });
  }
  group.finish();
}

criterion_group! {
  name = benches;
  config = configure_criterion();
  targets = bench_dispatch_batch_sizes,
}

criterion_main!(benches);
