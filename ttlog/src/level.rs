//! Log severity levels, grounded on duck-ttlog's `event::LogLevel`
//! (repr(u8), explicit discriminants) and extended with the
//! `Backtrace`/`Critical` levels the backend worker relies on.

use std::str::FromStr;
use std::sync::atomic::Ordering;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
  TraceL3 = 0,
  TraceL2 = 1,
  TraceL1 = 2,
  Debug = 3,
  Info = 4,
  Notice = 5,
  Warning = 6,
  Error = 7,
  Critical = 8,
  Backtrace = 9,
  None = 10,
}

impl LogLevel {
  pub const fn from_u8(v: u8) -> Self {
    match v {
      0 => Self::TraceL3,
      1 => Self::TraceL2,
      2 => Self::TraceL1,
      3 => Self::Debug,
      4 => Self::Info,
      5 => Self::Notice,
      6 => Self::Warning,
      7 => Self::Error,
      8 => Self::Critical,
      9 => Self::Backtrace,
      _ => Self::None,
    }
  }

  /// Default human-readable description, overridable via `BackendOptions`.
  pub const fn description(self) -> &'static str {
    match self {
      Self::TraceL3 => "TRACE_L3",
      Self::TraceL2 => "TRACE_L2",
      Self::TraceL1 => "TRACE_L1",
      Self::Debug => "DEBUG",
      Self::Info => "INFO",
      Self::Notice => "NOTICE",
      Self::Warning => "WARNING",
      Self::Error => "ERROR",
      Self::Critical => "CRITICAL",
      Self::Backtrace => "BACKTRACE",
      Self::None => "NONE",
    }
  }

  /// Default fixed-width short code, overridable via `BackendOptions`.
  pub const fn short_code(self) -> &'static str {
    match self {
      Self::TraceL3 => "T3",
      Self::TraceL2 => "T2",
      Self::TraceL1 => "T1",
      Self::Debug => "D",
      Self::Info => "I",
      Self::Notice => "N",
      Self::Warning => "W",
      Self::Error => "E",
      Self::Critical => "C",
      Self::Backtrace => "BT",
      Self::None => "-",
    }
  }
}

impl FromStr for LogLevel {
  type Err = ();

  /// Accepts the same spellings `description()` produces, case-insensitively,
  /// plus a couple of common aliases (`TRACE`, `WARN`). Used to parse the
  /// `QUILL_LOG_LEVEL` environment variable.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s.to_ascii_uppercase().as_str() {
      "TRACE_L3" => Self::TraceL3,
      "TRACE_L2" => Self::TraceL2,
      "TRACE_L1" | "TRACE" => Self::TraceL1,
      "DEBUG" => Self::Debug,
      "INFO" => Self::Info,
      "NOTICE" => Self::Notice,
      "WARNING" | "WARN" => Self::Warning,
      "ERROR" => Self::Error,
      "CRITICAL" => Self::Critical,
      "BACKTRACE" => Self::Backtrace,
      "NONE" => Self::None,
      _ => return Err(()),
    })
  }
}

/// An atomic `LogLevel` cell used for a logger's effective level and
/// backtrace-flush threshold.
#[derive(Debug)]
pub struct AtomicLevel(std::sync::atomic::AtomicU8);

impl AtomicLevel {
  pub fn new(level: LogLevel) -> Self {
    Self(std::sync::atomic::AtomicU8::new(level as u8))
  }

  pub fn load(&self) -> LogLevel {
    LogLevel::from_u8(self.0.load(Ordering::Acquire))
  }

  pub fn store(&self, level: LogLevel) {
    self.0.store(level as u8, Ordering::Release);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_standard_labels_case_insensitively() {
    assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
    assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warning);
    assert_eq!("Trace".parse::<LogLevel>().unwrap(), LogLevel::TraceL1);
  }

  #[test]
  fn rejects_unknown_labels() {
    assert!("nonsense".parse::<LogLevel>().is_err());
  }
}
