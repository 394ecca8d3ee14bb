//! Correlates a CPU timestamp-counter reading to wall-clock time.
//!
//! Grounded on the `tianbaoluo-nanolog-rs` reference's `TscClock`: sample
//! the counter paired with the wall clock, derive ticks-per-nanosecond,
//! and periodically resync. The backend lazily instantiates this clock on
//! the first TSC-sourced event and never resyncs on the hot path.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

#[cfg(target_arch = "x86_64")]
#[inline]
fn read_tsc() -> u64 {
  unsafe { std::arch::x86_64::_rdtsc() }
}

#[cfg(not(target_arch = "x86_64"))]
#[inline]
fn read_tsc() -> u64 {
  // Portable fallback: nanoseconds since an arbitrary monotonic origin.
  // `tsc_to_epoch_ns` treats this as "ticks" at 1 tick/ns, which keeps the
  // conversion math identical across architectures.
  static ORIGIN: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
  ORIGIN.get_or_init(Instant::now).elapsed().as_nanos() as u64
}

fn epoch_ns_now() -> u64 {
  SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos() as u64
}

pub struct RdtscClock {
  resync_interval: Duration,
  last_resync: Instant,
  base_tsc: u64,
  base_epoch_ns: u64,
  ticks_per_ns: f64,
}

impl RdtscClock {
  pub fn new(resync_interval: Duration) -> Self {
    let mut clock = Self {
      resync_interval,
      last_resync: Instant::now(),
      base_tsc: read_tsc(),
      base_epoch_ns: epoch_ns_now(),
      ticks_per_ns: 1.0,
    };
    clock.calibrate();
    clock
  }

  fn calibrate(&mut self) {
    let tsc_before = read_tsc();
    let wall_before = epoch_ns_now();
    std::thread::sleep(Duration::from_millis(1));
    let tsc_after = read_tsc();
    let wall_after = epoch_ns_now();

    let tsc_delta = tsc_after.saturating_sub(tsc_before) as f64;
    let wall_delta = wall_after.saturating_sub(wall_before) as f64;
    if wall_delta > 0.0 {
      self.ticks_per_ns = tsc_delta / wall_delta;
    }
    self.base_tsc = tsc_after;
    self.base_epoch_ns = wall_after;
  }

  /// Refreshes the anchor pairing. Called by the backend during periodic
  /// maintenance, bounded by `resync_interval`; never on the hot path.
  pub fn resync_if_due(&mut self) {
    if self.last_resync.elapsed() >= self.resync_interval {
      self.calibrate();
      self.last_resync = Instant::now();
    }
  }

  /// Converts a raw TSC reading into nanoseconds since the Unix epoch
  /// using the most recent anchor pair.
  pub fn time_since_epoch(&self, tsc: u64) -> u64 {
    let delta_ticks = tsc as i128 - self.base_tsc as i128;
    let delta_ns = if self.ticks_per_ns > 0.0 { (delta_ticks as f64 / self.ticks_per_ns) as i128 } else { 0 };
    (self.base_epoch_ns as i128 + delta_ns).max(0) as u64
  }

  pub fn now_tsc(&self) -> u64 {
    read_tsc()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn converts_current_tsc_close_to_wall_clock() {
    let clock = RdtscClock::new(Duration::from_millis(500));
    let now = clock.now_tsc();
    let converted = clock.time_since_epoch(now);
    let wall = epoch_ns_now();
    let diff = (converted as i128 - wall as i128).unsigned_abs();
    assert!(diff < Duration::from_secs(1).as_nanos(), "diff {diff} ns too large");
  }
}
