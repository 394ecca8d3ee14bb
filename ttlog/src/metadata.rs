//! Immutable per-call-site descriptor.
//!
//! Grounded directly on `core/MacroMetadata.h`: everything here is a
//! `'static` reference so a `MacroMetadata` can live in a `static` built
//! by the logging macros at compile time and be passed across the queue
//! as a plain pointer-sized value.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
  None,
  Log,
  InitBacktrace,
  FlushBacktrace,
  Flush,
  LogWithRuntimeMetadataDeepCopy,
  LogWithRuntimeMetadataHybridCopy,
  LogWithRuntimeMetadataShallowCopy,
  LoggerRemovalRequest,
}

impl EventKind {
  pub const fn from_u8(v: u8) -> Self {
    match v {
      1 => Self::Log,
      2 => Self::InitBacktrace,
      3 => Self::FlushBacktrace,
      4 => Self::Flush,
      5 => Self::LogWithRuntimeMetadataDeepCopy,
      6 => Self::LogWithRuntimeMetadataHybridCopy,
      7 => Self::LogWithRuntimeMetadataShallowCopy,
      8 => Self::LoggerRemovalRequest,
      _ => Self::None,
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct MacroMetadata {
  source_location: &'static str,
  caller_function: &'static str,
  message_format: &'static str,
  tags: &'static str,
  level: crate::level::LogLevel,
  event: EventKind,
}

impl MacroMetadata {
  pub const fn new(
    source_location: &'static str,
    caller_function: &'static str,
    message_format: &'static str,
    tags: &'static str,
    level: crate::level::LogLevel,
    event: EventKind,
  ) -> Self {
    Self { source_location, caller_function, message_format, tags, level, event }
  }

  pub const fn source_location(&self) -> &'static str {
    self.source_location
  }

  pub const fn caller_function(&self) -> &'static str {
    self.caller_function
  }

  pub const fn message_format(&self) -> &'static str {
    self.message_format
  }

  pub const fn tags(&self) -> &'static str {
    self.tags
  }

  pub const fn level(&self) -> crate::level::LogLevel {
    self.level
  }

  pub const fn event(&self) -> EventKind {
    self.event
  }

  /// `"path/file.rs:NN"` split into `(full_path, line)`.
  pub fn file_and_line(&self) -> (&'static str, &'static str) {
    match self.source_location.rfind(':') {
      Some(pos) => (&self.source_location[..pos], &self.source_location[pos + 1..]),
      None => (self.source_location, ""),
    }
  }

  /// Source file name and line number, without any leading directory components.
  pub fn short_source_location(&self) -> &'static str {
    let (path, _) = self.file_and_line();
    match path.rfind(['/', '\\']) {
      Some(pos) => &self.source_location[pos + 1..],
      None => self.source_location,
    }
  }

  /// Source file basename only: no leading directory components, no line number.
  pub fn file_name(&self) -> &'static str {
    let (path, _) = self.file_and_line();
    match path.rfind(['/', '\\']) {
      Some(pos) => &path[pos + 1..],
      None => path,
    }
  }

  /// Whether `message_format` contains `{name}`-style named arguments, used by
  /// the pattern formatter to decide whether to use the named-args split path.
  pub fn has_named_args(&self) -> bool {
    let bytes = self.message_format.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
      if bytes[i] == b'{' {
        if i + 1 < bytes.len() && bytes[i + 1] == b'{' {
          i += 2;
          continue;
        }
        let start = i + 1;
        if let Some(rel_end) = bytes[start..].iter().position(|&b| b == b'}') {
          let name = &self.message_format[start..start + rel_end];
          if !name.is_empty() && name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
            return true;
          }
          i = start + rel_end + 1;
          continue;
        }
      }
      i += 1;
    }
    false
  }
}
