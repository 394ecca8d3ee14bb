//! The queue layer: a bounded SPSC ring buffer and an unbounded SPSC
//! queue built on top of it.

pub mod bounded;
pub mod unbounded;

pub use bounded::BoundedSpscQueue;
pub use unbounded::{PrepareRead, UnboundedSpscQueue};

/// Queue full/overflow policy for a thread context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePolicy {
  /// Spin/yield until space appears, incrementing the failure counter each iteration.
  Blocking,
  /// Increment the failure counter and return without logging.
  Dropping,
}

pub(crate) fn next_power_of_two(n: usize) -> usize {
  n.next_power_of_two()
}
