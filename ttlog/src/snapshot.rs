//! Crash/shutdown persistence of outstanding transit state.
//!
//! Grounded on duck-ttlog's `snapshot::SnapshotWriter`: CBOR-encode then
//! LZ4-block-compress a bundle of still-undispatched records and write it
//! atomically to disk, so a crash or forced shutdown does not silently
//! drop records the backend had decoded but not yet handed to a sink.
//! This is additive to the normal dispatch path, not a replacement:
//! it only runs from [`crate::panic_hook`] / [`crate::signal_hook`] or an
//! explicit operator call.

use crate::error::QuillError;
use crate::frontend::Frontend;
use chrono::Utc;
use lz4::block::{compress, CompressionMode};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SnapshotRecord {
  pub timestamp_ns: u64,
  pub logger_name: String,
  pub thread_id: u64,
  pub thread_name: String,
  pub level: u8,
  pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Snapshot {
  pub service: String,
  pub hostname: String,
  pub pid: u32,
  pub created_at: String,
  pub reason: String,
  pub records: Vec<SnapshotRecord>,
}

pub struct SnapshotWriter {
  service: String,
  storage_path: String,
}

impl SnapshotWriter {
  pub fn new(service: impl Into<String>, storage_path: impl Into<String>) -> Self {
    Self { service: service.into(), storage_path: storage_path.into() }
  }

  /// Drains every thread context's transit-event buffer into a snapshot.
  ///
  /// # Safety
  /// Must only be called when the backend thread is guaranteed not to be
  /// concurrently draining the same buffers — i.e. from a panic/signal
  /// handler that will itself abort the process, or after `Backend::stop`
  /// has joined.
  pub unsafe fn create_snapshot(&self, frontend: &Frontend, reason: impl Into<String>) -> Option<Snapshot> {
    let mut records = Vec::new();
    for ctx in frontend.thread_contexts.snapshot() {
      let buffer = unsafe { ctx.transit_buffer() };
      while let Some(event) = buffer.pop_front() {
        records.push(SnapshotRecord {
          timestamp_ns: event.timestamp_ns,
          logger_name: event.logger_name.to_string(),
          thread_id: event.thread_id,
          thread_name: event.thread_name.to_string(),
          level: event.metadata.level() as u8,
          message: if event.formatted.is_empty() { event.metadata.message_format().to_string() } else { event.formatted },
        });
      }
    }

    if records.is_empty() {
      return None;
    }

    Some(Snapshot {
      service: self.service.clone(),
      hostname: gethostname::gethostname().to_string_lossy().into_owned(),
      pid: std::process::id(),
      created_at: Utc::now().format("%Y%m%d%H%M%S").to_string(),
      reason: reason.into(),
      records,
    })
  }

  pub fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), QuillError> {
    let cbor = serde_cbor::to_vec(snapshot)
      .map_err(|e| QuillError::BackendTaskFailure { message: format!("cbor encode failed: {e}") })?;
    let compressed = compress(&cbor, Some(CompressionMode::DEFAULT), true)
      .map_err(|e| QuillError::BackendTaskFailure { message: format!("lz4 compress failed: {e}") })?;

    let path = if self.storage_path.is_empty() { "./tmp".to_string() } else { self.storage_path.clone() };
    fs::create_dir_all(&path)
      .map_err(|e| QuillError::BackendTaskFailure { message: format!("create_dir_all failed: {e}") })?;

    let filename = format!("{path}/ttlog-{}-{}-{}.bin", snapshot.pid, snapshot.created_at, snapshot.reason);
    let tmp_filename = format!("{filename}.tmp");
    {
      let mut file = File::create(&tmp_filename)
        .map_err(|e| QuillError::BackendTaskFailure { message: format!("create snapshot file failed: {e}") })?;
      file
        .write_all(&compressed)
        .map_err(|e| QuillError::BackendTaskFailure { message: format!("write snapshot failed: {e}") })?;
      file.sync_all().map_err(|e| QuillError::BackendTaskFailure { message: format!("sync failed: {e}") })?;
    }
    fs::rename(&tmp_filename, &filename)
      .map_err(|e| QuillError::BackendTaskFailure { message: format!("rename failed: {e}") })?;
    Ok(())
  }

  /// # Safety
  /// Same contract as [`SnapshotWriter::create_snapshot`].
  pub unsafe fn snapshot_and_write(&self, frontend: &Frontend, reason: impl Into<String>) -> Result<(), QuillError> {
    match unsafe { self.create_snapshot(frontend, reason) } {
      Some(snapshot) => self.write_snapshot(&snapshot),
      None => Ok(()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn write_snapshot_round_trips_through_cbor_and_lz4() {
    let snapshot = Snapshot {
      service: "svc".to_string(),
      hostname: "host".to_string(),
      pid: 1,
      created_at: "19700101000000".to_string(),
      reason: "test".to_string(),
      records: vec![SnapshotRecord {
        timestamp_ns: 1,
        logger_name: "root".to_string(),
        thread_id: 1,
        thread_name: "main".to_string(),
        level: 4,
        message: "hello".to_string(),
      }],
    };
    let dir = std::env::temp_dir().join("ttlog-snapshot-test");
    let writer = SnapshotWriter::new("svc", dir.to_string_lossy().into_owned());
    assert!(writer.write_snapshot(&snapshot).is_ok());
    let _ = std::fs::remove_dir_all(&dir);
  }
}
