//! Canonical content hashing.
//!
//! Entry integrity rests on a 64-bit FNV-1a over a canonical byte stream:
//! key bytes, two tag bytes (little-endian), the value's type-specific
//! bytes, the metadata bytes, then the two timestamps as little-endian
//! u64s. A final avalanche step (two multiplies, three xor-shifts) spreads
//! the low-entropy tail before the state is formatted as 16 uppercase hex
//! characters. The stream is defined purely in terms of byte widths, so
//! the result is identical on every platform.

use crate::value::Value;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Incremental 64-bit FNV-1a with the final avalanche mix.
///
/// Also used to derive commit ids, so the mixing rules live here rather
/// than next to the entry type.
#[derive(Debug, Clone)]
pub struct Fnv1a {
    state: u64,
}

impl Fnv1a {
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Mix a run of bytes into the state.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.state ^= u64::from(b);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    pub fn write_u16_le(&mut self, v: u16) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u64_le(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Finish with the avalanche step.
    pub fn finish(&self) -> u64 {
        let mut h = self.state;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^= h >> 33;
        h
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a 64-bit hash as 16 uppercase hex characters.
pub fn format_hash(hash: u64) -> String {
    format!("{:016X}", hash)
}

/// Compute the canonical hash of an entry's observable fields.
pub fn hash_entry(
    key: &str,
    value: &Value,
    metadata: Option<&str>,
    created_at: u64,
    updated_at: u64,
) -> String {
    let mut hasher = Fnv1a::new();
    hasher.write(key.as_bytes());
    hasher.write_u16_le(value.tag() as u16);
    write_value_bytes(&mut hasher, value);
    if let Some(metadata) = metadata {
        hasher.write(metadata.as_bytes());
    }
    hasher.write_u64_le(created_at);
    hasher.write_u64_le(updated_at);
    format_hash(hasher.finish())
}

/// Mix a value's type-specific canonical bytes.
///
/// Fixed-width numerics contribute their little-endian bytes (floats via
/// their IEEE-754 bit patterns), strings and blobs contribute their raw
/// bytes with no length prefix, and `Null` contributes nothing.
fn write_value_bytes(hasher: &mut Fnv1a, value: &Value) {
    match value {
        Value::I8(v) => hasher.write(&[*v as u8]),
        Value::U8(v) => hasher.write(&[*v]),
        Value::Char(v) => hasher.write(&[*v]),
        Value::Bool(v) => hasher.write(&[u8::from(*v)]),
        Value::I16(v) => hasher.write(&v.to_le_bytes()),
        Value::U16(v) => hasher.write(&v.to_le_bytes()),
        Value::I32(v) => hasher.write(&v.to_le_bytes()),
        Value::U32(v) => hasher.write(&v.to_le_bytes()),
        Value::F32(v) => hasher.write(&v.to_bits().to_le_bytes()),
        Value::I64(v) => hasher.write(&v.to_le_bytes()),
        Value::U64(v) => hasher.write(&v.to_le_bytes()),
        Value::F64(v) => hasher.write(&v.to_bits().to_le_bytes()),
        Value::Size(v) => hasher.write(&v.to_le_bytes()),
        Value::Datetime(v) => hasher.write(&v.to_le_bytes()),
        Value::Duration(v) => hasher.write(&v.to_le_bytes()),
        Value::Cstr(s) | Value::Hex(s) | Value::Oct(s) | Value::Bin(s) => {
            hasher.write(s.as_bytes())
        }
        Value::Any(b) => hasher.write(b),
        Value::Null => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_16_uppercase_hex() {
        let h = hash_entry("key", &Value::I32(42), None, 1, 2);
        assert_eq!(h.len(), 16);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash_entry("user_1", &Value::Cstr("alice".into()), Some("note"), 10, 20);
        let b = hash_entry("user_1", &Value::Cstr("alice".into()), Some("note"), 10, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn test_every_field_is_significant() {
        let base = hash_entry("k", &Value::U64(7), Some("m"), 100, 200);

        assert_ne!(base, hash_entry("k2", &Value::U64(7), Some("m"), 100, 200));
        assert_ne!(base, hash_entry("k", &Value::U64(8), Some("m"), 100, 200));
        assert_ne!(base, hash_entry("k", &Value::U64(7), Some("m2"), 100, 200));
        assert_ne!(base, hash_entry("k", &Value::U64(7), None, 100, 200));
        assert_ne!(base, hash_entry("k", &Value::U64(7), Some("m"), 101, 200));
        assert_ne!(base, hash_entry("k", &Value::U64(7), Some("m"), 100, 201));
    }

    #[test]
    fn test_type_tag_disambiguates_same_bytes() {
        // i64 7 and u64 7 have identical payload bytes; the tag must split them.
        let signed = hash_entry("k", &Value::I64(7), None, 0, 0);
        let unsigned = hash_entry("k", &Value::U64(7), None, 0, 0);
        assert_ne!(signed, unsigned);

        // Same textual payload, different formatted-integer tags.
        let hex = hash_entry("k", &Value::Hex("101".into()), None, 0, 0);
        let bin = hash_entry("k", &Value::Bin("101".into()), None, 0, 0);
        assert_ne!(hex, bin);
    }

    #[test]
    fn test_float_bit_patterns() {
        let pos = hash_entry("k", &Value::F64(0.0), None, 0, 0);
        let neg = hash_entry("k", &Value::F64(-0.0), None, 0, 0);
        assert_ne!(pos, neg);
    }

    #[test]
    fn test_null_contributes_nothing_but_tag() {
        let a = hash_entry("k", &Value::Null, None, 0, 0);
        let b = hash_entry("k", &Value::Null, None, 0, 0);
        assert_eq!(a, b);
        // Still distinct from an empty string value (tags differ).
        assert_ne!(a, hash_entry("k", &Value::Cstr(String::new()), None, 0, 0));
    }

    #[test]
    fn test_incremental_matches_one_shot() {
        let mut split = Fnv1a::new();
        split.write(b"hello ");
        split.write(b"world");

        let mut whole = Fnv1a::new();
        whole.write(b"hello world");

        assert_eq!(split.finish(), whole.finish());
    }
}
