//! Per-producer-thread state and its process-wide registry.
//!
//! Grounded on `core/ThreadContextManager.h`. Every thread that logs gets
//! exactly one [`ThreadContext`], created lazily on first use and
//! registered with the [`ThreadContextManager`]. On thread exit the
//! thread-local destructor only marks the context invalid: teardown must
//! not free, since the backend still holds a shared reference. The
//! manager reclaims it once the backend
//! observes an invalid context with an empty queue and empty transit
//! buffer.

use crate::error::QuillError;
use crate::spinlock::Spinlock;
use crate::spsc::{BoundedSpscQueue, QueuePolicy, UnboundedSpscQueue};
use crate::transit::TransitEventBuffer;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Initial capacity new thread contexts allocate their transit buffer
/// with, set once from [`crate::config::BackendOptions::transit_event_buffer_initial_capacity`]
/// when the backend starts.
static DEFAULT_TRANSIT_CAPACITY: AtomicUsize = AtomicUsize::new(128);

pub(crate) fn set_default_transit_capacity(capacity: usize) {
  DEFAULT_TRANSIT_CAPACITY.store(capacity.max(1), Ordering::Relaxed);
}

pub enum Queue {
  Bounded(BoundedSpscQueue, QueuePolicy),
  Unbounded(UnboundedSpscQueue, QueuePolicy),
}

impl Queue {
  pub fn policy(&self) -> QueuePolicy {
    match self {
      Self::Bounded(_, p) | Self::Unbounded(_, p) => *p,
    }
  }

  pub fn is_empty(&self) -> bool {
    match self {
      Self::Bounded(q, _) => q.empty(),
      Self::Unbounded(q, _) => q.empty(),
    }
  }
}

pub struct ThreadContext {
  pub thread_id: u64,
  pub thread_name: String,
  pub queue: Queue,
  /// Backend-exclusive; see module docs for why an `UnsafeCell` is used
  /// instead of a `Mutex` (mirrors the SPSC queue's single-consumer invariant).
  transit_buffer: UnsafeCell<TransitEventBuffer>,
  pub valid: AtomicBool,
  pub failure_counter: AtomicU64,
}

// SAFETY: `transit_buffer` is only ever accessed by the backend thread,
// which is the sole consumer of this context's queue.
unsafe impl Sync for ThreadContext {}

impl ThreadContext {
  fn new(queue: Queue) -> Self {
    let thread_id = thread_id_u64();
    let thread_name = std::thread::current().name().unwrap_or("unnamed").to_string();
    Self {
      thread_id,
      thread_name,
      queue,
      transit_buffer: UnsafeCell::new(TransitEventBuffer::new(DEFAULT_TRANSIT_CAPACITY.load(Ordering::Relaxed))),
      valid: AtomicBool::new(true),
      failure_counter: AtomicU64::new(0),
    }
  }

  /// # Safety
  /// Must only be called from the backend thread.
  #[allow(clippy::mut_from_ref)]
  pub unsafe fn transit_buffer(&self) -> &mut TransitEventBuffer {
    unsafe { &mut *self.transit_buffer.get() }
  }

  pub fn is_valid(&self) -> bool {
    self.valid.load(Ordering::Acquire)
  }

  pub fn mark_invalid(&self) {
    self.valid.store(false, Ordering::Release);
  }

  /// Whether this context is safe for the backend to physically drop:
  /// invalid, queue drained, transit buffer drained.
  ///
  /// # Safety
  /// Must only be called from the backend thread (reads `transit_buffer`).
  pub unsafe fn reclaimable(&self) -> bool {
    !self.is_valid() && self.queue.is_empty() && unsafe { self.transit_buffer() }.is_empty()
  }
}

fn thread_id_u64() -> u64 {
  use std::hash::{Hash, Hasher};
  let mut hasher = std::collections::hash_map::DefaultHasher::new();
  std::thread::current().id().hash(&mut hasher);
  hasher.finish()
}

/// Process-wide registry of all [`ThreadContext`]s. The backend
/// iterates a cached snapshot and only re-fetches it when
/// [`ThreadContextManager::has_new_contexts`] reports a change, so the
/// hot path of neither side touches the spinlock after first-use
/// registration.
pub struct ThreadContextManager {
  lock: Spinlock,
  contexts: UnsafeCell<Vec<Arc<ThreadContext>>>,
  new_context_flag: AtomicBool,
}

// SAFETY: `contexts` is only mutated while holding `lock`; reads from
// `snapshot()` clone the `Arc` vector under the same lock.
unsafe impl Sync for ThreadContextManager {}

impl Default for ThreadContextManager {
  fn default() -> Self {
    Self::new()
  }
}

impl ThreadContextManager {
  pub fn new() -> Self {
    Self { lock: Spinlock::new(), contexts: UnsafeCell::new(Vec::new()), new_context_flag: AtomicBool::new(false) }
  }

  pub fn register_bounded(&self, capacity: usize, policy: QueuePolicy) -> Result<Arc<ThreadContext>, QuillError> {
    let queue = Queue::Bounded(BoundedSpscQueue::new(capacity)?, policy);
    Ok(self.register(ThreadContext::new(queue)))
  }

  pub fn register_unbounded(
    &self,
    initial_capacity: usize,
    max_capacity: usize,
    policy: QueuePolicy,
  ) -> Result<Arc<ThreadContext>, QuillError> {
    let queue = Queue::Unbounded(UnboundedSpscQueue::new(initial_capacity, max_capacity)?, policy);
    Ok(self.register(ThreadContext::new(queue)))
  }

  fn register(&self, context: ThreadContext) -> Arc<ThreadContext> {
    let context = Arc::new(context);
    let _guard = self.lock.lock();
    unsafe { &mut *self.contexts.get() }.push(context.clone());
    self.new_context_flag.store(true, Ordering::Release);
    context
  }

  pub fn has_new_contexts(&self) -> bool {
    self.new_context_flag.swap(false, Ordering::AcqRel)
  }

  /// Backend-side cached snapshot refresh.
  pub fn snapshot(&self) -> Vec<Arc<ThreadContext>> {
    let _guard = self.lock.lock();
    unsafe { &*self.contexts.get() }.clone()
  }

  /// Backend-side cleanup pass: physically drops any context that is
  /// invalid and fully drained.
  ///
  /// # Safety
  /// Must only be called from the backend thread.
  pub unsafe fn reclaim_invalid(&self) {
    let _guard = self.lock.lock();
    unsafe { &mut *self.contexts.get() }.retain(|ctx| !unsafe { ctx.reclaimable() });
  }
}
