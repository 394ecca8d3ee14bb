//! Backend-side decoded record and its per-thread-context ring.
//!
//! Grounded on `backend/TransitEvent.h` / `backend/TransitEventBuffer.h`.
//! The backend never allocates per event on its hot path: it reuses a
//! per-context ring that doubles on overflow, the same "grow instead of
//! allocate-per-item" shape as duck-ttlog's `EventBuilder` object pool.

use crate::codec::ArgsVec;
use crate::metadata::MacroMetadata;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// A decoded, backend-owned representation of one queued record.
pub struct TransitEvent {
  pub timestamp_ns: u64,
  pub metadata: &'static MacroMetadata,
  pub logger_name: Arc<str>,
  pub thread_id: u64,
  pub thread_name: Arc<str>,
  pub args: ArgsVec,
  pub formatted: String,
  /// Set when this event's kind is `Flush`: the backend flips it to `true`
  /// once every sink has been flushed and all prior events observed.
  pub flush_flag: Option<Arc<AtomicBool>>,
  /// Set when this event's kind is `LoggerRemovalRequest`.
  pub removal_flag: Option<Arc<AtomicBool>>,
}

/// Power-of-two ring of [`TransitEvent`], grown by doubling on overflow.
pub struct TransitEventBuffer {
  initial_capacity: usize,
  slots: Vec<Option<TransitEvent>>,
  head: usize,
  len: usize,
}

impl TransitEventBuffer {
  pub fn new(initial_capacity: usize) -> Self {
    let capacity = initial_capacity.next_power_of_two().max(2);
    Self {
      initial_capacity: capacity,
      slots: (0..capacity).map(|_| None).collect(),
      head: 0,
      len: 0,
    }
  }

  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }

  fn grow(&mut self) {
    let old_capacity = self.slots.len();
    let new_capacity = old_capacity * 2;
    let mut new_slots: Vec<Option<TransitEvent>> = (0..new_capacity).map(|_| None).collect();
    for i in 0..self.len {
      new_slots[i] = self.slots[(self.head + i) % old_capacity].take();
    }
    self.slots = new_slots;
    self.head = 0;
  }

  /// Publishes `event` as the new back of the ring, growing if full.
  pub fn push_back(&mut self, event: TransitEvent) {
    if self.len == self.slots.len() {
      self.grow();
    }
    let idx = (self.head + self.len) % self.slots.len();
    self.slots[idx] = Some(event);
    self.len += 1;
  }

  pub fn front(&self) -> Option<&TransitEvent> {
    if self.len == 0 {
      None
    } else {
      self.slots[self.head].as_ref()
    }
  }

  pub fn pop_front(&mut self) -> Option<TransitEvent> {
    if self.len == 0 {
      return None;
    }
    let event = self.slots[self.head].take();
    self.head = (self.head + 1) % self.slots.len();
    self.len -= 1;
    event
  }

  /// Returns backing memory to `initial_capacity` if currently empty and larger.
  pub fn try_shrink(&mut self) {
    if self.len == 0 && self.slots.len() > self.initial_capacity {
      self.slots = (0..self.initial_capacity).map(|_| None).collect();
      self.head = 0;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metadata::{EventKind, MacroMetadata};

  static META: MacroMetadata =
    MacroMetadata::new("f.rs:1", "f", "msg", "", crate::level::LogLevel::Info, EventKind::Log);

  fn event(ts: u64) -> TransitEvent {
    TransitEvent {
      timestamp_ns: ts,
      metadata: &META,
      logger_name: Arc::from("root"),
      thread_id: 1,
      thread_name: Arc::from("t"),
      args: Default::default(),
      formatted: String::new(),
      flush_flag: None,
      removal_flag: None,
    }
  }

  #[test]
  fn grows_past_initial_capacity_and_preserves_order() {
    let mut buf = TransitEventBuffer::new(2);
    for i in 0..10 {
      buf.push_back(event(i));
    }
    assert_eq!(buf.len(), 10);
    for i in 0..10 {
      assert_eq!(buf.pop_front().unwrap().timestamp_ns, i);
    }
    assert!(buf.is_empty());
  }

  #[test]
  fn shrinks_back_to_initial_capacity_when_empty() {
    let mut buf = TransitEventBuffer::new(2);
    for i in 0..10 {
      buf.push_back(event(i));
    }
    while buf.pop_front().is_some() {}
    buf.try_shrink();
    assert_eq!(buf.slots.len(), 2);
  }
}
