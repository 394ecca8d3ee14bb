//! Push/pop throughput for the bounded and unbounded SPSC queues.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ttlog::spsc::{BoundedSpscQueue, UnboundedSpscQueue};

fn configure_criterion() -> Criterion {
  Criterion::default().sample_size(50)
}

fn write_and_drain_bounded(capacity: usize, record_size: usize, records: usize) {
  let q = BoundedSpscQueue::new(capacity).unwrap();
  let payload = vec![0xABu8; record_size];

  for _ in 0..records {
    let ptr = loop {
      if let Some(ptr) = q.prepare_write(record_size) {
        break ptr;
      }
      // drain one record to make room; producer and consumer share a
      // thread here since the bench measures raw protocol overhead, not
      // cross-thread handoff.
      if let Some(read_ptr) = q.prepare_read() {
        let _ = std::hint::black_box(unsafe { std::slice::from_raw_parts(read_ptr, record_size) });
        q.finish_read(record_size);
        q.commit_read();
      }
    };
    unsafe {
      std::ptr::copy_nonoverlapping(payload.as_ptr(), ptr, record_size);
    }
    q.finish_and_commit_write(record_size);

    if let Some(read_ptr) = q.prepare_read() {
      let _ = std::hint::black_box(unsafe { std::slice::from_raw_parts(read_ptr, record_size) });
      q.finish_read(record_size);
      q.commit_read();
    }
  }
}

fn write_and_drain_unbounded(initial_capacity: usize, record_size: usize, records: usize) {
  let q = UnboundedSpscQueue::new(initial_capacity, 1 << 30).unwrap();
  let payload = vec![0xABu8; record_size];

  for _ in 0..records {
    let ptr = q.prepare_write(record_size).unwrap().expect("below max_capacity");
    unsafe {
      std::ptr::copy_nonoverlapping(payload.as_ptr(), ptr, record_size);
    }
    q.finish_and_commit_write(record_size);

    let read = q.prepare_read();
    if let Some(read_ptr) = read.ptr {
      let _ = std::hint::black_box(unsafe { std::slice::from_raw_parts(read_ptr, record_size) });
      q.finish_read(record_size);
      q.commit_read();
    }
  }
}

fn bench_bounded_record_sizes(c: &mut Criterion) {
  let mut group = c.benchmark_group("bounded_spsc_record_size");
  for record_size in [32usize, 128, 512].iter() {
    group.bench_with_input(BenchmarkId::new("bytes", record_size), record_size, |b, &record_size| {
      b.iter(|| write_and_drain_bounded(1 << 16, record_size, 1000));
    });
  }
  group.finish();
}

fn bench_unbounded_growth(c: &mut Criterion) {
  let mut group = c.benchmark_group("unbounded_spsc_growth");
  for initial_capacity in [1024usize, 4096, 16384].iter() {
    group.bench_with_input(BenchmarkId::new("initial_capacity", initial_capacity), initial_capacity, |b, &cap| {
      b.iter(|| write_and_drain_unbounded(cap, 64, 1000));
    });
  }
  group.finish();
}

criterion_group! {
  name = benches;
  config = configure_criterion();
  targets = bench_bounded_record_sizes, bench_unbounded_growth,
}

criterion_main!(benches);
