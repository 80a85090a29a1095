//! The typed value model.
//!
//! Every cell in the database holds a [`Value`]: a tagged sum over the
//! fixed-width numeric types, strings, a handful of annotated formats
//! (hex/oct/bin keep their textual form), timestamps, and an opaque blob.
//! The tag numbering is part of the on-disk format and the canonical hash,
//! so it must never be reordered.

use std::fmt;

use serde::Serialize;

/// Wire-level type tag for a [`Value`].
///
/// The discriminants are stored on disk as a little-endian `u16` and are
/// mixed into every entry hash, so they are frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u16)]
pub enum TypeTag {
    I8 = 0,
    I16 = 1,
    I32 = 2,
    I64 = 3,
    U8 = 4,
    U16 = 5,
    U32 = 6,
    U64 = 7,
    F32 = 8,
    F64 = 9,
    Cstr = 10,
    Char = 11,
    Bool = 12,
    Hex = 13,
    Oct = 14,
    Bin = 15,
    Size = 16,
    Datetime = 17,
    Duration = 18,
    Any = 19,
    Null = 20,
}

impl TypeTag {
    /// Decode a tag from its wire representation.
    pub fn from_u16(raw: u16) -> Option<Self> {
        Some(match raw {
            0 => TypeTag::I8,
            1 => TypeTag::I16,
            2 => TypeTag::I32,
            3 => TypeTag::I64,
            4 => TypeTag::U8,
            5 => TypeTag::U16,
            6 => TypeTag::U32,
            7 => TypeTag::U64,
            8 => TypeTag::F32,
            9 => TypeTag::F64,
            10 => TypeTag::Cstr,
            11 => TypeTag::Char,
            12 => TypeTag::Bool,
            13 => TypeTag::Hex,
            14 => TypeTag::Oct,
            15 => TypeTag::Bin,
            16 => TypeTag::Size,
            17 => TypeTag::Datetime,
            18 => TypeTag::Duration,
            19 => TypeTag::Any,
            20 => TypeTag::Null,
            _ => return None,
        })
    }

    /// Canonical lowercase name ("i32", "cstr", "datetime", ...).
    pub fn name(self) -> &'static str {
        match self {
            TypeTag::I8 => "i8",
            TypeTag::I16 => "i16",
            TypeTag::I32 => "i32",
            TypeTag::I64 => "i64",
            TypeTag::U8 => "u8",
            TypeTag::U16 => "u16",
            TypeTag::U32 => "u32",
            TypeTag::U64 => "u64",
            TypeTag::F32 => "f32",
            TypeTag::F64 => "f64",
            TypeTag::Cstr => "cstr",
            TypeTag::Char => "char",
            TypeTag::Bool => "bool",
            TypeTag::Hex => "hex",
            TypeTag::Oct => "oct",
            TypeTag::Bin => "bin",
            TypeTag::Size => "size",
            TypeTag::Datetime => "datetime",
            TypeTag::Duration => "duration",
            TypeTag::Any => "any",
            TypeTag::Null => "null",
        }
    }

    /// Parse a canonical name back into a tag.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "i8" => TypeTag::I8,
            "i16" => TypeTag::I16,
            "i32" => TypeTag::I32,
            "i64" => TypeTag::I64,
            "u8" => TypeTag::U8,
            "u16" => TypeTag::U16,
            "u32" => TypeTag::U32,
            "u64" => TypeTag::U64,
            "f32" => TypeTag::F32,
            "f64" => TypeTag::F64,
            "cstr" => TypeTag::Cstr,
            "char" => TypeTag::Char,
            "bool" => TypeTag::Bool,
            "hex" => TypeTag::Hex,
            "oct" => TypeTag::Oct,
            "bin" => TypeTag::Bin,
            "size" => TypeTag::Size,
            "datetime" => TypeTag::Datetime,
            "duration" => TypeTag::Duration,
            "any" => TypeTag::Any,
            "null" => TypeTag::Null,
            _ => return None,
        })
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A single typed cell value.
///
/// String-carrying variants own their bytes; `Clone` is a deep copy.
/// `Char` is a single byte, matching the one-byte wire encoding.
/// `Datetime` is a nanosecond-resolution epoch timestamp, `Duration` is a
/// signed nanosecond span. `Hex`/`Oct`/`Bin` carry the *textual* form of a
/// formatted integer ("0xFF", "0o17", "0b1010").
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Cstr(String),
    Char(u8),
    Bool(bool),
    Hex(String),
    Oct(String),
    Bin(String),
    Size(u64),
    Datetime(u64),
    Duration(i64),
    Any(Vec<u8>),
    Null,
}

impl Value {
    /// The wire tag for this value.
    pub fn tag(&self) -> TypeTag {
        match self {
            Value::I8(_) => TypeTag::I8,
            Value::I16(_) => TypeTag::I16,
            Value::I32(_) => TypeTag::I32,
            Value::I64(_) => TypeTag::I64,
            Value::U8(_) => TypeTag::U8,
            Value::U16(_) => TypeTag::U16,
            Value::U32(_) => TypeTag::U32,
            Value::U64(_) => TypeTag::U64,
            Value::F32(_) => TypeTag::F32,
            Value::F64(_) => TypeTag::F64,
            Value::Cstr(_) => TypeTag::Cstr,
            Value::Char(_) => TypeTag::Char,
            Value::Bool(_) => TypeTag::Bool,
            Value::Hex(_) => TypeTag::Hex,
            Value::Oct(_) => TypeTag::Oct,
            Value::Bin(_) => TypeTag::Bin,
            Value::Size(_) => TypeTag::Size,
            Value::Datetime(_) => TypeTag::Datetime,
            Value::Duration(_) => TypeTag::Duration,
            Value::Any(_) => TypeTag::Any,
            Value::Null => TypeTag::Null,
        }
    }

    /// Canonical type name of this value.
    pub fn type_name(&self) -> &'static str {
        self.tag().name()
    }

    /// True for the `Null` variant.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Size in bytes of any heap-backed payload (0 for scalars).
    pub fn payload_len(&self) -> usize {
        match self {
            Value::Cstr(s) | Value::Hex(s) | Value::Oct(s) | Value::Bin(s) => s.len(),
            Value::Any(b) => b.len(),
            _ => 0,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_roundtrip() {
        for raw in 0..=20u16 {
            let tag = TypeTag::from_u16(raw).unwrap();
            assert_eq!(tag as u16, raw);
            assert_eq!(TypeTag::from_name(tag.name()), Some(tag));
        }
        assert_eq!(TypeTag::from_u16(21), None);
        assert_eq!(TypeTag::from_name("quaternion"), None);
    }

    #[test]
    fn test_value_tags() {
        assert_eq!(Value::I32(7).tag(), TypeTag::I32);
        assert_eq!(Value::Cstr("x".into()).tag(), TypeTag::Cstr);
        assert_eq!(Value::Null.tag(), TypeTag::Null);
        assert_eq!(Value::default(), Value::Null);
    }

    #[test]
    fn test_deep_copy() {
        let original = Value::Cstr("owned".to_string());
        let copy = original.clone();
        drop(original);
        assert_eq!(copy, Value::Cstr("owned".to_string()));

        let blob = Value::Any(vec![1, 2, 3]);
        assert_eq!(blob.clone(), blob);
        assert_eq!(blob.payload_len(), 3);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Datetime(0).type_name(), "datetime");
        assert_eq!(Value::Hex("0xFF".into()).type_name(), "hex");
        assert_eq!(TypeTag::Bool.to_string(), "bool");
    }
}
