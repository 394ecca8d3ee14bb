//! Compiles a user pattern into a precomputed field order.
//!
//! Grounded on `backend/PatternFormatter.h` / `core/PatternFormatterOptions.h`.
//! quill builds an `fmt`-compatible format string plus an
//! attribute→positional-index map at construction time so the hot path
//! only ever substitutes into a fixed positional args array. This
//! reimplementation keeps that two-phase shape (compile once, substitute
//! per event) but represents the compiled pattern directly as a `Vec` of
//! literal/field parts rather than through a borrowed `fmt` string, since
//! Rust has no runtime-built `format!` equivalent to delegate to.

use crate::codec::FormatValue;
use crate::error::QuillError;
use crate::level::LogLevel;
use crate::metadata::MacroMetadata;
use crate::named_args;
use crate::timestamp::{TimestampFormatter as Timestamp, Timezone};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
  Time,
  FileName,
  CallerFunction,
  LogLevel,
  LogLevelShortCode,
  LineNumber,
  Logger,
  FullPath,
  ThreadId,
  ThreadName,
  ProcessId,
  SourceLocation,
  ShortSourceLocation,
  Message,
  Tags,
  NamedArgs,
}

impl Attribute {
  fn parse(name: &str) -> Option<Self> {
    Some(match name {
      "time" => Self::Time,
      "file_name" => Self::FileName,
      "caller_function" => Self::CallerFunction,
      "log_level" => Self::LogLevel,
      "log_level_short_code" => Self::LogLevelShortCode,
      "line_number" => Self::LineNumber,
      "logger" => Self::Logger,
      "full_path" => Self::FullPath,
      "thread_id" => Self::ThreadId,
      "thread_name" => Self::ThreadName,
      "process_id" => Self::ProcessId,
      "source_location" => Self::SourceLocation,
      "short_source_location" => Self::ShortSourceLocation,
      "message" => Self::Message,
      "tags" => Self::Tags,
      "named_args" => Self::NamedArgs,
      _ => return None,
    })
  }
}

enum Part {
  Literal(String),
  Field(Attribute, Option<FieldSpec>),
}

#[derive(Clone, Copy)]
enum Align {
  Left,
  Right,
  Center,
}

struct FieldSpec {
  align: Align,
  width: usize,
}

impl FieldSpec {
  fn parse(spec: &str) -> Option<Self> {
    let (align, rest) = match spec.as_bytes().first()? {
      b'<' => (Align::Left, &spec[1..]),
      b'>' => (Align::Right, &spec[1..]),
      b'^' => (Align::Center, &spec[1..]),
      _ => (Align::Left, spec),
    };
    rest.parse::<usize>().ok().map(|width| Self { align, width })
  }

  fn apply(&self, value: &str) -> String {
    if value.len() >= self.width {
      return value.to_string();
    }
    let pad = self.width - value.len();
    match self.align {
      Align::Left => format!("{value}{}", " ".repeat(pad)),
      Align::Right => format!("{}{value}", " ".repeat(pad)),
      Align::Center => {
        let left = pad / 2;
        let right = pad - left;
        format!("{}{value}{}", " ".repeat(left), " ".repeat(right))
      },
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternSuffix {
  Newline,
  Char(char),
  NoSuffix,
}

#[derive(Clone)]
pub struct PatternFormatterOptions {
  pub pattern: String,
  pub timestamp_pattern: String,
  pub timezone: Timezone,
  pub pattern_suffix: PatternSuffix,
  pub add_metadata_to_multi_line_logs: bool,
  pub strip_path_prefix: Option<String>,
}

impl Default for PatternFormatterOptions {
  fn default() -> Self {
    Self {
      pattern: "%(time) [%(thread_id)] %(log_level) %(logger) - %(message)".to_string(),
      timestamp_pattern: "%H:%M:%S.%Qns".to_string(),
      timezone: Timezone::GmtTime,
      pattern_suffix: PatternSuffix::Newline,
      add_metadata_to_multi_line_logs: true,
      strip_path_prefix: None,
    }
  }
}

/// Everything the formatter needs to know about one record, resolved by
/// the backend before calling [`PatternFormatter::format`].
pub struct FormatContext<'a> {
  pub metadata: &'static MacroMetadata,
  pub timestamp_ns: u64,
  pub level: LogLevel,
  pub logger_name: &'a str,
  pub thread_id: u64,
  pub thread_name: &'a str,
  pub message: &'a str,
  pub level_description: &'a str,
  pub level_short_code: &'a str,
  pub args: &'a [FormatValue],
}

pub struct PatternFormatter {
  parts: Vec<Part>,
  timestamp_formatter: Timestamp,
  suffix: PatternSuffix,
  add_metadata_to_multi_line_logs: bool,
  strip_path_prefix: Option<String>,
}

impl PatternFormatter {
  pub fn new(options: &PatternFormatterOptions) -> Result<Self, QuillError> {
    let mut parts = Vec::new();
    let bytes = options.pattern.as_bytes();
    let mut i = 0;
    let mut literal_start = 0;

    while i < bytes.len() {
      if bytes[i] == b'%' && bytes.get(i + 1) == Some(&b'(') {
        if literal_start < i {
          parts.push(Part::Literal(options.pattern[literal_start..i].to_string()));
        }
        let close = options.pattern[i..].find(')').ok_or_else(|| QuillError::InvalidPattern {
          message: format!("unterminated token starting at byte {i}"),
        })?;
        let token = &options.pattern[i + 2..i + close];
        let (name, spec) = match token.split_once(':') {
          Some((n, s)) => (n, Some(s)),
          None => (token, None),
        };
        let attribute = Attribute::parse(name)
          .ok_or_else(|| QuillError::InvalidPattern { message: format!("unknown attribute '{name}'") })?;
        parts.push(Part::Field(attribute, spec.and_then(FieldSpec::parse)));

        i += close + 1;
        literal_start = i;
      } else {
        i += 1;
      }
    }
    if literal_start < options.pattern.len() {
      parts.push(Part::Literal(options.pattern[literal_start..].to_string()));
    }

    let has_named_args = parts.iter().any(|p| matches!(p, Part::Field(Attribute::NamedArgs, _)));

    Ok(Self {
      parts,
      timestamp_formatter: Timestamp::new(&options.timestamp_pattern, options.timezone)?,
      suffix: options.pattern_suffix,
      add_metadata_to_multi_line_logs: options.add_metadata_to_multi_line_logs && !has_named_args,
      strip_path_prefix: options.strip_path_prefix.clone(),
    })
  }

  fn strip_path<'a>(&self, path: &'a str) -> &'a str {
    match &self.strip_path_prefix {
      Some(prefix) if path.starts_with(prefix.as_str()) => &path[prefix.len()..],
      _ => path,
    }
  }

  fn resolve(&mut self, ctx: &FormatContext<'_>, attribute: Attribute) -> String {
    let (full_path, line) = ctx.metadata.file_and_line();
    match attribute {
      Attribute::Time => self.timestamp_formatter.format_timestamp(ctx.timestamp_ns),
      Attribute::FileName => ctx.metadata.file_name().to_string(),
      Attribute::CallerFunction => ctx.metadata.caller_function().to_string(),
      Attribute::LogLevel => ctx.level_description.to_string(),
      Attribute::LogLevelShortCode => ctx.level_short_code.to_string(),
      Attribute::LineNumber => line.to_string(),
      Attribute::Logger => ctx.logger_name.to_string(),
      Attribute::FullPath => self.strip_path(full_path).to_string(),
      Attribute::ThreadId => ctx.thread_id.to_string(),
      Attribute::ThreadName => ctx.thread_name.to_string(),
      Attribute::ProcessId => std::process::id().to_string(),
      Attribute::SourceLocation => self.strip_path(ctx.metadata.source_location()).to_string(),
      Attribute::ShortSourceLocation => ctx.metadata.short_source_location().to_string(),
      Attribute::Message => ctx.message.to_string(),
      Attribute::Tags => ctx.metadata.tags().to_string(),
      Attribute::NamedArgs => {
        let split = named_args::split(ctx.metadata.message_format());
        split
          .names
          .iter()
          .zip(ctx.args.iter())
          .map(|(name, value)| if name.is_empty() { value.to_string() } else { format!("{name}={value}") })
          .collect::<Vec<_>>()
          .join(", ")
      },
    }
  }

  fn format_one_line(&mut self, ctx: &FormatContext<'_>, message: &str) -> String {
    let mut out = String::new();
    let parts_len = self.parts.len();
    for idx in 0..parts_len {
      // Work around borrowing `self.parts` while calling `&mut self.resolve`.
      let (attribute, spec) = match &self.parts[idx] {
        Part::Literal(text) => {
          out.push_str(text);
          continue;
        },
        Part::Field(attribute, spec) => (*attribute, spec.as_ref().map(|s| (s.align, s.width))),
      };
      let mut ctx_override = FormatContext { message, ..clone_ctx(ctx) };
      ctx_override.message = message;
      let value = self.resolve(&ctx_override, attribute);
      let value = match spec {
        Some((align, width)) => FieldSpec { align, width }.apply(&value),
        None => value,
      };
      out.push_str(&value);
    }
    match self.suffix {
      PatternSuffix::Newline => out.push('\n'),
      PatternSuffix::Char(c) => out.push(c),
      PatternSuffix::NoSuffix => {},
    }
    out
  }

  /// Formats one record. When `add_metadata_to_multi_line_logs` is active
  /// and the message contains embedded newlines, each line is formatted
  /// (and suffixed) separately so metadata prefixes every line.
  pub fn format(&mut self, ctx: &FormatContext<'_>) -> String {
    if self.add_metadata_to_multi_line_logs && ctx.message.contains('\n') {
      let mut out = String::new();
      for line in ctx.message.split('\n') {
        out.push_str(&self.format_one_line(ctx, line));
      }
      out
    } else {
      self.format_one_line(ctx, ctx.message)
    }
  }
}

fn clone_ctx<'a>(ctx: &FormatContext<'a>) -> FormatContext<'a> {
  FormatContext {
    metadata: ctx.metadata,
    timestamp_ns: ctx.timestamp_ns,
    level: ctx.level,
    logger_name: ctx.logger_name,
    thread_id: ctx.thread_id,
    thread_name: ctx.thread_name,
    message: ctx.message,
    level_description: ctx.level_description,
    level_short_code: ctx.level_short_code,
    args: ctx.args,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::metadata::EventKind;

  static META: MacroMetadata =
    MacroMetadata::new("src/main.rs:42", "main", "{}", "", LogLevel::Info, EventKind::Log);

  #[test]
  fn s1_formats_time_level_message_in_gmt() {
    let options = PatternFormatterOptions {
      pattern: "%(time) %(log_level) %(message)".to_string(),
      timestamp_pattern: "%H:%M:%S.%Qns".to_string(),
      timezone: Timezone::GmtTime,
      ..Default::default()
    };
    let mut formatter = PatternFormatter::new(&options).unwrap();
    let ctx = FormatContext {
      metadata: &META,
      timestamp_ns: 123_000_000,
      level: LogLevel::Info,
      logger_name: "root",
      thread_id: 1,
      thread_name: "main",
      message: "hello",
      level_description: "INFO",
      level_short_code: "I",
      args: &[],
    };
    assert_eq!(formatter.format(&ctx), "00:00:00.123000000 INFO hello\n");
  }

  #[test]
  fn s5_no_suffix_pattern_ends_without_newline() {
    let options = PatternFormatterOptions {
      pattern: "%(time:<24) [%(logger)] %(message)".to_string(),
      timestamp_pattern: "%H:%M:%S".to_string(),
      timezone: Timezone::GmtTime,
      pattern_suffix: PatternSuffix::NoSuffix,
      ..Default::default()
    };
    let mut formatter = PatternFormatter::new(&options).unwrap();
    let ctx = FormatContext {
      metadata: &META,
      timestamp_ns: 0,
      level: LogLevel::Info,
      logger_name: "root",
      thread_id: 1,
      thread_name: "main",
      message: "hello",
      level_description: "INFO",
      level_short_code: "I",
      args: &[],
    };
    let out = formatter.format(&ctx);
    assert!(!out.ends_with('\n'));
    assert!(out.starts_with("00:00:00"));
  }

  #[test]
  fn rejects_unknown_attribute() {
    let options = PatternFormatterOptions { pattern: "%(nonsense)".to_string(), ..Default::default() };
    assert!(PatternFormatter::new(&options).is_err());
  }

  #[test]
  fn file_name_is_the_bare_basename_without_line_number() {
    assert_eq!(META.file_name(), "main.rs");
    assert_eq!(META.short_source_location(), "main.rs:42");
  }

  #[test]
  fn named_args_attribute_renders_key_value_pairs() {
    static NAMED_META: MacroMetadata =
      MacroMetadata::new("src/main.rs:9", "main", "user {user} did {action}", "", LogLevel::Info, EventKind::Log);
    let options = PatternFormatterOptions { pattern: "%(named_args)".to_string(), ..Default::default() };
    let mut formatter = PatternFormatter::new(&options).unwrap();
    let args = [FormatValue::Str("alice".to_string()), FormatValue::Str("login".to_string())];
    let ctx = FormatContext {
      metadata: &NAMED_META,
      timestamp_ns: 0,
      level: LogLevel::Info,
      logger_name: "root",
      thread_id: 1,
      thread_name: "main",
      message: "user alice did login",
      level_description: "INFO",
      level_short_code: "I",
      args: &args,
    };
    assert_eq!(formatter.format(&ctx), "user=alice, action=login\n");
  }
}
