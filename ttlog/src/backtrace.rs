//! Bounded ring of deferred events per logger.
//!
//! Grounded on `backend/BacktraceStorage.h`. Configured per logger via
//! `InitBacktrace(n)`; overwrites in FIFO order once full; `process`
//! drains everything in insertion order through a callback.

pub struct StoredTransitEvent {
  pub timestamp_ns: u64,
  pub thread_id: u64,
  pub thread_name: String,
  pub formatted: String,
}

pub struct BacktraceStorage {
  capacity: usize,
  ring: Vec<StoredTransitEvent>,
  next: usize,
  len: usize,
}

impl BacktraceStorage {
  pub fn new(capacity: usize) -> Self {
    Self { capacity: capacity.max(1), ring: Vec::with_capacity(capacity), next: 0, len: 0 }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Re-initializing with a new capacity clears existing contents, matching
  /// `InitBacktrace` being callable again on an already-initialized logger.
  pub fn reinit(&mut self, capacity: usize) {
    self.capacity = capacity.max(1);
    self.ring.clear();
    self.next = 0;
    self.len = 0;
  }

  pub fn store(&mut self, event: StoredTransitEvent) {
    if self.ring.len() < self.capacity {
      self.ring.push(event);
    } else {
      self.ring[self.next] = event;
    }
    self.next = (self.next + 1) % self.capacity;
    self.len = self.ring.len();
  }

  /// Emits all stored events in insertion order and clears storage.
  pub fn process(&mut self, mut callback: impl FnMut(&StoredTransitEvent)) {
    if self.len == 0 {
      return;
    }
    let start = if self.ring.len() < self.capacity { 0 } else { self.next };
    for i in 0..self.ring.len() {
      callback(&self.ring[(start + i) % self.ring.len()]);
    }
    self.ring.clear();
    self.next = 0;
    self.len = 0;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn event(ts: u64) -> StoredTransitEvent {
    StoredTransitEvent { timestamp_ns: ts, thread_id: 1, thread_name: "t".into(), formatted: ts.to_string() }
  }

  #[test]
  fn flushes_last_n_events_in_insertion_order() {
    let mut storage = BacktraceStorage::new(3);
    for i in 0..5 {
      storage.store(event(i));
    }
    let mut seen = Vec::new();
    storage.process(|e| seen.push(e.timestamp_ns));
    assert_eq!(seen, vec![2, 3, 4]);
  }
}
