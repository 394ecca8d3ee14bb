//! Caches and incrementally updates a formatted wall-clock string.
//!
//! Grounded on `backend/TimestampFormatter.h`'s strftime-caching trick,
//! but takes a simpler strategy: recompute the
//! whole-second prefix with `chrono` only when the timestamp crosses into
//! a new second, and otherwise just rewrite the cached sub-second digits.
//! This mirrors the `PrefixCache` pattern the `tianbaoluo-nanolog-rs`
//! reference implementation uses for the same trade-off.

use crate::error::QuillError;
use chrono::{DateTime, Local, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timezone {
  LocalTime,
  GmtTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubSecond {
  None,
  Millis,
  Micros,
  Nanos,
}

pub struct TimestampFormatter {
  prefix_pattern: String,
  suffix_pattern: String,
  sub_second: SubSecond,
  timezone: Timezone,
  cached_second: i64,
  cached_prefix: String,
  cached_suffix: String,
}

impl TimestampFormatter {
  pub fn new(pattern: &str, timezone: Timezone) -> Result<Self, QuillError> {
    const TOKENS: [(&str, SubSecond); 3] =
      [("%Qms", SubSecond::Millis), ("%Qus", SubSecond::Micros), ("%Qns", SubSecond::Nanos)];

    let mut found: Option<(usize, SubSecond)> = None;
    for (token, kind) in TOKENS {
      if let Some(pos) = pattern.find(token) {
        if found.is_some() {
          return Err(QuillError::InvalidPattern {
            message: "%Qms, %Qus and %Qns are mutually exclusive".to_string(),
          });
        }
        found = Some((pos, kind));
      }
    }

    let (prefix_pattern, suffix_pattern, sub_second) = match found {
      Some((pos, kind)) => (pattern[..pos].to_string(), pattern[pos + 4..].to_string(), kind),
      None => (pattern.to_string(), String::new(), SubSecond::None),
    };

    Ok(Self {
      prefix_pattern,
      suffix_pattern,
      sub_second,
      timezone,
      cached_second: i64::MIN,
      cached_prefix: String::new(),
      cached_suffix: String::new(),
    })
  }

  pub fn format_timestamp(&mut self, time_since_epoch_ns: u64) -> String {
    let ns = time_since_epoch_ns as i64;
    let secs = ns.div_euclid(1_000_000_000);
    let sub_ns = ns.rem_euclid(1_000_000_000) as u32;

    if secs != self.cached_second {
      self.cached_second = secs;
      let dt: DateTime<Utc> = Utc.timestamp_opt(secs, 0).single().unwrap_or_default();
      match self.timezone {
        Timezone::GmtTime => {
          self.cached_prefix = dt.format(&self.prefix_pattern).to_string();
          self.cached_suffix = dt.format(&self.suffix_pattern).to_string();
        },
        Timezone::LocalTime => {
          let local: DateTime<Local> = dt.with_timezone(&Local);
          self.cached_prefix = local.format(&self.prefix_pattern).to_string();
          self.cached_suffix = local.format(&self.suffix_pattern).to_string();
        },
      }
    }

    let mut out = self.cached_prefix.clone();
    match self.sub_second {
      SubSecond::None => {},
      SubSecond::Millis => out.push_str(&format!("{:03}", sub_ns / 1_000_000)),
      SubSecond::Micros => out.push_str(&format!("{:06}", sub_ns / 1_000)),
      SubSecond::Nanos => out.push_str(&format!("{sub_ns:09}")),
    }
    out.push_str(&self.cached_suffix);
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_multiple_subsecond_tokens() {
    assert!(TimestampFormatter::new("%H:%M:%S.%Qms.%Qus", Timezone::GmtTime).is_err());
  }

  #[test]
  fn formats_with_nanosecond_subsecond_and_caches_whole_seconds() {
    let mut f = TimestampFormatter::new("%H:%M:%S.%Qns", Timezone::GmtTime).unwrap();
    assert_eq!(f.format_timestamp(123_000_000), "00:00:00.123000000");
    // same whole second, different sub-second digits: prefix reused, suffix recomputed.
    assert_eq!(f.format_timestamp(999_999_999), "00:00:00.999999999");
    // crosses into the next second.
    assert_eq!(f.format_timestamp(1_000_000_000), "00:00:01.000000000");
  }

  #[test]
  fn formats_without_any_subsecond_token() {
    let mut f = TimestampFormatter::new("%Y-%m-%d", Timezone::GmtTime).unwrap();
    assert_eq!(f.format_timestamp(0), "1970-01-01");
  }
}
