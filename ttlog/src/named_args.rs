//! Cached `{name}`-placeholder split of a call site's raw message format.
//!
//! Grounded on `backend/PatternFormatter.h`'s named-args handling: a
//! format string is parsed for named tokens once, then every subsequent
//! record from that call site reuses the cached split instead of
//! re-scanning the format. Positional substitution still runs through
//! the same `{}`-counting path `render_message` already used, so only
//! the format string fed to it changes; the names themselves are kept
//! alongside for [`crate::pattern::Attribute::NamedArgs`] to zip against
//! the decoded argument values.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct NamedArgsSplit {
  /// `message_format` with every `{name}` replaced by a plain `{}`.
  pub positional_format: String,
  /// One entry per placeholder in order; empty for an already-positional `{}`.
  pub names: Vec<String>,
}

static CACHE: Mutex<Option<HashMap<usize, Arc<NamedArgsSplit>>>> = Mutex::new(None);

/// Returns the cached split for `format`, parsing it on first use. Keyed
/// by the format string's address: every call site's `message_format` is
/// a distinct `'static` string literal, so the address is stable for the
/// life of the process.
pub fn split(format: &'static str) -> Arc<NamedArgsSplit> {
  let key = format.as_ptr() as usize;
  let mut guard = CACHE.lock().unwrap_or_else(|e| e.into_inner());
  let map = guard.get_or_insert_with(HashMap::new);
  if let Some(existing) = map.get(&key) {
    return existing.clone();
  }
  let parsed = Arc::new(parse(format));
  map.insert(key, parsed.clone());
  parsed
}

fn parse(format: &str) -> NamedArgsSplit {
  let mut positional_format = String::with_capacity(format.len());
  let mut names = Vec::new();
  let bytes = format.as_bytes();
  let mut i = 0;
  let mut literal_start = 0;

  while i < bytes.len() {
    if bytes[i] == b'{' {
      if bytes.get(i + 1) == Some(&b'{') {
        i += 2;
        continue;
      }
      if let Some(rel_end) = format[i + 1..].find('}') {
        let name = &format[i + 1..i + 1 + rel_end];
        positional_format.push_str(&format[literal_start..i]);
        positional_format.push_str("{}");
        names.push(name.to_string());
        i = i + 1 + rel_end + 1;
        literal_start = i;
        continue;
      }
    }
    i += 1;
  }
  positional_format.push_str(&format[literal_start..]);
  NamedArgsSplit { positional_format, names }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn splits_named_placeholders_into_positional_form_and_name_list() {
    let split = parse("user {user} did {action} at {}");
    assert_eq!(split.positional_format, "user {} did {} at {}");
    assert_eq!(split.names, vec!["user".to_string(), "action".to_string(), "".to_string()]);
  }

  #[test]
  fn repeated_split_of_the_same_literal_hits_the_cache() {
    static FMT: &str = "x={x}";
    let first = split(FMT);
    let second = split(FMT);
    assert!(Arc::ptr_eq(&first, &second));
  }
}
