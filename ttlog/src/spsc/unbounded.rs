//! A singly-linked list of [`BoundedSpscQueue`] rings that grows on demand.
//!
//! Grounded on `core/UnboundedSPSCQueue.h`: a `producer` pointer always
//! names the ring being written, a `consumer` pointer the ring being
//! read; growth allocates a new, larger ring and publishes it via an
//! atomic `next` pointer on the node being vacated.

use super::BoundedSpscQueue;
use crate::error::QuillError;
use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};

struct Node {
  ring: BoundedSpscQueue,
  next: AtomicPtr<Node>,
}

impl Node {
  fn new(capacity: usize) -> Result<Box<Self>, QuillError> {
    Ok(Box::new(Self { ring: BoundedSpscQueue::new(capacity)?, next: AtomicPtr::new(std::ptr::null_mut()) }))
  }
}

pub struct UnboundedSpscQueue {
  max_capacity: usize,
  producer: UnsafeCell<NonNull<Node>>,
  consumer: UnsafeCell<NonNull<Node>>,
}

// SAFETY: `producer` is touched only by the single producer thread,
// `consumer` only by the single consumer thread; cross-visibility of newly
// linked nodes is established through the `AtomicPtr` on `Node::next`.
unsafe impl Send for UnboundedSpscQueue {}
unsafe impl Sync for UnboundedSpscQueue {}

/// Result of [`UnboundedSpscQueue::prepare_read`]: whether the consumer just
/// crossed into a newly allocated (or shrunk) ring, so the backend can
/// surface a capacity-change notification.
pub struct PrepareRead {
  pub ptr: Option<*const u8>,
  pub previous_capacity: usize,
  pub new_capacity: usize,
  pub reallocated: bool,
}

impl UnboundedSpscQueue {
  pub fn new(initial_capacity: usize, max_capacity: usize) -> Result<Self, QuillError> {
    let node = Box::leak(Node::new(initial_capacity)?).into();
    Ok(Self { max_capacity, producer: UnsafeCell::new(node), consumer: UnsafeCell::new(node) })
  }

  fn producer_node(&self) -> &Node {
    unsafe { (*self.producer.get()).as_ref() }
  }

  fn consumer_node(&self) -> &Node {
    unsafe { (*self.consumer.get()).as_ref() }
  }

  pub fn producer_capacity(&self) -> usize {
    self.producer_node().ring.capacity()
  }

  pub fn capacity(&self) -> usize {
    self.consumer_node().ring.capacity()
  }

  /// Producer only.
  pub fn prepare_write(&self, n: usize) -> Result<Option<*mut u8>, QuillError> {
    if let Some(ptr) = self.producer_node().ring.prepare_write(n) {
      return Ok(Some(ptr));
    }
    self.handle_full_queue(n)
  }

  pub fn finish_write(&self, n: usize) {
    self.producer_node().ring.finish_write(n);
  }

  pub fn commit_write(&self) {
    self.producer_node().ring.commit_write();
  }

  pub fn finish_and_commit_write(&self, n: usize) {
    self.finish_write(n);
    self.commit_write();
  }

  fn handle_full_queue(&self, n: usize) -> Result<Option<*mut u8>, QuillError> {
    let mut capacity = self.producer_node().ring.capacity() * 2;
    while capacity < n {
      capacity *= 2;
    }

    if capacity > self.max_capacity {
      if n > self.max_capacity {
        return Err(QuillError::MessageTooLarge { size: n, max_capacity: self.max_capacity });
      }
      return Ok(None);
    }

    self.producer_node().ring.commit_write();

    let next_node: NonNull<Node> = Box::leak(Node::new(capacity)?).into();
    self.producer_node().next.store(next_node.as_ptr(), Ordering::Release);
    unsafe { *self.producer.get() = next_node };

    let write_pos = self.producer_node().ring.prepare_write(n);
    Ok(write_pos)
  }

  /// Shrinks future writes to a smaller ring. The consumer frees the larger
  /// ring once it finishes draining it.
  pub fn shrink(&self, capacity: usize) -> Result<(), QuillError> {
    if capacity > self.producer_node().ring.capacity() / 2 {
      return Ok(());
    }
    let next_node: NonNull<Node> = Box::leak(Node::new(capacity)?).into();
    self.producer_node().next.store(next_node.as_ptr(), Ordering::Release);
    unsafe { *self.producer.get() = next_node };
    Ok(())
  }

  /// Consumer only.
  pub fn prepare_read(&self) -> PrepareRead {
    if let Some(ptr) = self.consumer_node().ring.prepare_read() {
      return PrepareRead { ptr: Some(ptr), previous_capacity: 0, new_capacity: 0, reallocated: false };
    }

    let next = self.consumer_node().next.load(Ordering::Acquire);
    let Some(next_node) = NonNull::new(next) else {
      return PrepareRead { ptr: None, previous_capacity: 0, new_capacity: 0, reallocated: false };
    };

    // Race against a late producer commit: retry the current ring once more.
    if let Some(ptr) = self.consumer_node().ring.prepare_read() {
      return PrepareRead { ptr: Some(ptr), previous_capacity: 0, new_capacity: 0, reallocated: false };
    }

    self.consumer_node().ring.commit_read();
    let previous_capacity = self.consumer_node().ring.capacity();

    let old = unsafe { std::mem::replace(&mut *self.consumer.get(), next_node) };
    unsafe { drop(Box::from_raw(old.as_ptr())) };

    let new_capacity = self.consumer_node().ring.capacity();
    let ptr = self.consumer_node().ring.prepare_read();

    PrepareRead { ptr, previous_capacity, new_capacity, reallocated: true }
  }

  pub fn finish_read(&self, n: usize) {
    self.consumer_node().ring.finish_read(n);
  }

  pub fn commit_read(&self) {
    self.consumer_node().ring.commit_read();
  }

  /// Consumer only.
  pub fn empty(&self) -> bool {
    self.consumer_node().ring.empty() && self.consumer_node().next.load(Ordering::Relaxed).is_null()
  }
}

impl Drop for UnboundedSpscQueue {
  fn drop(&mut self) {
    let mut current = Some(unsafe { *self.consumer.get() });
    while let Some(node) = current {
      let boxed = unsafe { Box::from_raw(node.as_ptr()) };
      let next = boxed.next.load(Ordering::Relaxed);
      current = NonNull::new(next);
      drop(boxed);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grows_when_current_ring_is_full() {
    let q = UnboundedSpscQueue::new(1024, 1 << 20).unwrap();
    let initial_capacity = q.producer_capacity();

    // Force growth by writing more than the current ring can hold without draining.
    for _ in 0..4 {
      let n = initial_capacity;
      if q.prepare_write(n).unwrap().is_none() {
        panic!("unexpected backpressure before max_capacity reached");
      }
      q.finish_and_commit_write(n);
    }

    assert!(q.producer_capacity() >= initial_capacity);
  }

  #[test]
  fn message_larger_than_max_capacity_errors() {
    let q = UnboundedSpscQueue::new(1024, 2048).unwrap();
    let err = q.prepare_write(4096).unwrap_err();
    assert!(matches!(err, QuillError::MessageTooLarge { .. }));
  }
}
