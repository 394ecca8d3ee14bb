//! Per-argument encode/decode contract.
//!
//! quill's `Codec<T>` is a C++ template specialized per argument
//! type; there the per-record "decoder pointer" in the wire format names
//! a function that knows how to walk every argument of one specific call
//! site. Here that maps to one trait (`Codec`) per primitive argument
//! type, composed over a whole argument tuple by [`ArgsCodec`] (a
//! `macro_rules!`-generated trait impl over tuples, mirroring how quill
//! groups a call site's `Codec<T>` chain into a single decode
//! walk). Each distinct argument-tuple type used by a call site
//! monomorphizes its own [`DecodeFn`], which is the pointer actually
//! stored in the queue record.

use smallvec::{smallvec, SmallVec};
use std::fmt;

/// Most call sites carry few arguments, so decoded values live inline up
/// to 4 of them before spilling to the heap.
pub type ArgsVec = SmallVec<[FormatValue; 4]>;

/// A decoded argument value, formatter-ready.
#[derive(Debug, Clone)]
pub enum FormatValue {
  Str(String),
  I64(i64),
  U64(u64),
  F64(f64),
  Bool(bool),
}

impl fmt::Display for FormatValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Str(s) => write!(f, "{s}"),
      Self::I64(v) => write!(f, "{v}"),
      Self::U64(v) => write!(f, "{v}"),
      Self::F64(v) => write!(f, "{v}"),
      Self::Bool(v) => write!(f, "{v}"),
    }
  }
}

/// Per-argument-type encode/decode contract.
pub trait Codec {
  fn compute_encoded_size(&self) -> usize;

  /// # Safety
  /// `cursor` must point at `compute_encoded_size()` writable bytes.
  unsafe fn encode(&self, cursor: *mut u8);

  /// # Safety
  /// `cursor` must point at a value this impl previously encoded.
  /// Returns the decoded value and the number of bytes consumed.
  unsafe fn decode(cursor: *const u8) -> (FormatValue, usize);
}

macro_rules! impl_codec_int {
  ($($t:ty => $variant:ident),* $(,)?) => {
    $(
      impl Codec for $t {
        fn compute_encoded_size(&self) -> usize {
          std::mem::size_of::<$t>()
        }

        unsafe fn encode(&self, cursor: *mut u8) {
          unsafe { std::ptr::copy_nonoverlapping(self.to_ne_bytes().as_ptr(), cursor, std::mem::size_of::<$t>()) };
        }

        unsafe fn decode(cursor: *const u8) -> (FormatValue, usize) {
          let mut buf = [0u8; std::mem::size_of::<$t>()];
          unsafe { std::ptr::copy_nonoverlapping(cursor, buf.as_mut_ptr(), buf.len()) };
          (FormatValue::$variant(<$t>::from_ne_bytes(buf) as _), buf.len())
        }
      }
    )*
  };
}

impl_codec_int!(i8 => I64, i16 => I64, i32 => I64, i64 => I64, isize => I64);
impl_codec_int!(u8 => U64, u16 => U64, u32 => U64, u64 => U64, usize => U64);

impl Codec for f32 {
  fn compute_encoded_size(&self) -> usize {
    4
  }
  unsafe fn encode(&self, cursor: *mut u8) {
    unsafe { std::ptr::copy_nonoverlapping(self.to_ne_bytes().as_ptr(), cursor, 4) };
  }
  unsafe fn decode(cursor: *const u8) -> (FormatValue, usize) {
    let mut buf = [0u8; 4];
    unsafe { std::ptr::copy_nonoverlapping(cursor, buf.as_mut_ptr(), 4) };
    (FormatValue::F64(f32::from_ne_bytes(buf) as f64), 4)
  }
}

impl Codec for f64 {
  fn compute_encoded_size(&self) -> usize {
    8
  }
  unsafe fn encode(&self, cursor: *mut u8) {
    unsafe { std::ptr::copy_nonoverlapping(self.to_ne_bytes().as_ptr(), cursor, 8) };
  }
  unsafe fn decode(cursor: *const u8) -> (FormatValue, usize) {
    let mut buf = [0u8; 8];
    unsafe { std::ptr::copy_nonoverlapping(cursor, buf.as_mut_ptr(), 8) };
    (FormatValue::F64(f64::from_ne_bytes(buf)), 8)
  }
}

impl Codec for bool {
  fn compute_encoded_size(&self) -> usize {
    1
  }
  unsafe fn encode(&self, cursor: *mut u8) {
    unsafe { *cursor = *self as u8 };
  }
  unsafe fn decode(cursor: *const u8) -> (FormatValue, usize) {
    (FormatValue::Bool(unsafe { *cursor } != 0), 1)
  }
}

/// Length-prefixed (u32) UTF-8 bytes. Shared by `&str` and `String`.
impl Codec for str {
  fn compute_encoded_size(&self) -> usize {
    4 + self.len()
  }
  unsafe fn encode(&self, cursor: *mut u8) {
    unsafe {
      let len = self.len() as u32;
      std::ptr::copy_nonoverlapping(len.to_ne_bytes().as_ptr(), cursor, 4);
      std::ptr::copy_nonoverlapping(self.as_ptr(), cursor.add(4), self.len());
    }
  }
  unsafe fn decode(cursor: *const u8) -> (FormatValue, usize) {
    unsafe {
      let mut len_buf = [0u8; 4];
      std::ptr::copy_nonoverlapping(cursor, len_buf.as_mut_ptr(), 4);
      let len = u32::from_ne_bytes(len_buf) as usize;
      let bytes = std::slice::from_raw_parts(cursor.add(4), len);
      (FormatValue::Str(String::from_utf8_lossy(bytes).into_owned()), 4 + len)
    }
  }
}

impl Codec for String {
  fn compute_encoded_size(&self) -> usize {
    Codec::compute_encoded_size(self.as_str())
  }
  unsafe fn encode(&self, cursor: *mut u8) {
    unsafe { Codec::encode(self.as_str(), cursor) };
  }
  unsafe fn decode(cursor: *const u8) -> (FormatValue, usize) {
    unsafe { <str as Codec>::decode(cursor) }
  }
}

/// Composes a whole argument tuple's `Codec` chain into one decode walk,
/// the Rust analogue of quill's per-call-site `decoder_ptr`.
pub trait ArgsCodec {
  fn encoded_size(&self) -> usize;
  /// # Safety: `cursor` must point at `encoded_size()` writable bytes.
  unsafe fn encode(&self, cursor: *mut u8);
  /// # Safety: `cursor` must point at a payload this impl previously encoded.
  unsafe fn decode(cursor: *const u8) -> (ArgsVec, usize);
}

pub type DecodeFn = unsafe fn(*const u8) -> (ArgsVec, usize);

/// Monomorphizes and returns the decode function pointer for an argument tuple type.
pub fn decode_fn<A: ArgsCodec>() -> DecodeFn {
  <A as ArgsCodec>::decode
}

macro_rules! impl_args_codec {
  () => {
    impl ArgsCodec for () {
      fn encoded_size(&self) -> usize { 0 }
      unsafe fn encode(&self, _cursor: *mut u8) {}
      unsafe fn decode(_cursor: *const u8) -> (ArgsVec, usize) {
        (smallvec![], 0)
      }
    }
  };
  ($($name:ident : $idx:tt),+) => {
    impl<$($name: Codec),+> ArgsCodec for ($($name,)+) {
      fn encoded_size(&self) -> usize {
        0 $(+ Codec::compute_encoded_size(&self.$idx))+
      }

      unsafe fn encode(&self, cursor: *mut u8) {
        let mut offset: usize = 0;
        $(
          unsafe { Codec::encode(&self.$idx, cursor.add(offset)) };
          offset += Codec::compute_encoded_size(&self.$idx);
        )+
        let _ = offset;
      }

      unsafe fn decode(cursor: *const u8) -> (ArgsVec, usize) {
        let mut values = smallvec![];
        let mut offset: usize = 0;
        $(
          let (value, consumed) = unsafe { <$name as Codec>::decode(cursor.add(offset)) };
          values.push(value);
          offset += consumed;
        )+
        (values, offset)
      }
    }
  };
}

impl_args_codec!();
impl_args_codec!(A:0);
impl_args_codec!(A:0, B:1);
impl_args_codec!(A:0, B:1, C:2);
impl_args_codec!(A:0, B:1, C:2, D:3);
impl_args_codec!(A:0, B:1, C:2, D:3, E:4);
impl_args_codec!(A:0, B:1, C:2, D:3, E:4, F:5);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn round_trips_mixed_tuple() {
    let args: (i64, String, bool) = (-7, "hi".to_string(), true);
    let size = args.encoded_size();
    let mut buf = vec![0u8; size];
    unsafe { args.encode(buf.as_mut_ptr()) };

    let (values, consumed) = unsafe { <(i64, String, bool) as ArgsCodec>::decode(buf.as_ptr()) };
    assert_eq!(consumed, size);
    assert_eq!(values.len(), 3);
    assert!(matches!(values[0], FormatValue::I64(-7)));
    assert!(matches!(&values[1], FormatValue::Str(s) if s == "hi"));
    assert!(matches!(values[2], FormatValue::Bool(true)));
  }
}
