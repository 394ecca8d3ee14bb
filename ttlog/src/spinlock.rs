//! A tiny spinlock used to guard the logger/sink/thread-context manager
//! registries on their write path. Grounded directly on `core/Spinlock.h`.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
pub struct Spinlock(AtomicBool);

impl Spinlock {
  pub const fn new() -> Self {
    Self(AtomicBool::new(false))
  }

  pub fn lock(&self) -> LockGuard<'_> {
    while self.0.swap(true, Ordering::Acquire) {
      std::hint::spin_loop();
    }
    LockGuard(self)
  }
}

pub struct LockGuard<'a>(&'a Spinlock);

impl Drop for LockGuard<'_> {
  fn drop(&mut self) {
    self.0 .0.store(false, Ordering::Release);
  }
}
