//! Process-wide (and, best-effort, machine-wide) duplicate-backend guard.
//!
//! Grounded on `backend/BackendManager.h`'s named OS primitive: only one
//! backend thread for a given name may run at a time. A named mutex has
//! no portable std equivalent, so this uses an exclusively-created lock
//! file under the system temp directory as the named primitive instead —
//! `create_new` fails if another process (or an earlier, not-yet-dropped
//! instance in this one) already holds it, giving the same first-wins
//! detection across process boundaries.

use crate::error::QuillError;
use std::fs::{self, File};
use std::path::PathBuf;

pub struct BackendLock {
  path: PathBuf,
  _file: File,
}

impl BackendLock {
  pub fn acquire(name: &str) -> Result<Self, QuillError> {
    let path = std::env::temp_dir().join(format!("ttlog-backend-{name}.lock"));
    let file = fs::OpenOptions::new().write(true).create_new(true).open(&path).map_err(|_| {
      QuillError::DuplicateBackend { message: format!("a backend named '{name}' is already running") }
    })?;
    Ok(Self { path, _file: file })
  }
}

impl Drop for BackendLock {
  fn drop(&mut self) {
    let _ = fs::remove_file(&self.path);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn second_acquire_of_same_name_fails_while_first_is_held() {
    let name = "test-duplicate-detection";
    let first = BackendLock::acquire(name).unwrap();
    let second = BackendLock::acquire(name);
    assert!(matches!(second, Err(QuillError::DuplicateBackend { .. })));
    drop(first);
    assert!(BackendLock::acquire(name).is_ok());
  }
}
