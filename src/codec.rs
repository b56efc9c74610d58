//! Coded-value protocol.
//!
//! This is the byte layer under every codec: raw fixed-width reads and writes plus the
//! variable-length "coded" integers used for plain numbers, lengths, back-references and reserved
//! markers.
//!
//! Layout of a coded value, by first byte:
//!
//! - `0x00..=0x7F`: the value itself (0..=127)
//! - `0x80..=0x9F`: sign in bit 4, 12-bit magnitude over 2 bytes
//! - `0xA0..=0xBF`: sign in bit 4, 20-bit magnitude over 3 bytes
//! - `0xC0..=0xDF`: sign in bit 4, 28-bit magnitude over 4 bytes
//! - `0xE0`: raw little-endian `i32` follows
//! - `0xE1`: raw little-endian `i64` follows (long codes only)
//! - `0xF0..=0xFF`: reserved marker, code in the low nibble
//!
//! Magnitude bytes after the first are most-significant first.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{PickleError, Result};

///< 2-byte coding, 12-bit magnitude
pub const CODE_TIER_2: u8 = 0x80;
///< 3-byte coding, 20-bit magnitude
pub const CODE_TIER_3: u8 = 0xA0;
///< 4-byte coding, 28-bit magnitude
pub const CODE_TIER_4: u8 = 0xC0;
///< Raw little-endian i32 follows
pub const CODE_RAW_INT: u8 = 0xE0;
///< Raw little-endian i64 follows
pub const CODE_RAW_LONG: u8 = 0xE1;
///< Reserved markers occupy 0xF0..=0xFF
pub const CODE_MARKER_BASE: u8 = 0xF0;
const SIGN_BIT: u8 = 0x10;

/// Marker for `Either::Left` / `Result::Err`.
pub const MARKER_EITHER_LEFT: u8 = 1;
/// Marker for `Either::Right` / `Result::Ok`.
pub const MARKER_EITHER_RIGHT: u8 = 2;
/// Marker for a present optional value.
pub const MARKER_OPTION_SOME: u8 = 3;
/// Marker for a positively infinite duration.
pub const MARKER_DURATION_INF: u8 = 1;
/// Marker for a negatively infinite duration.
pub const MARKER_DURATION_MINUS_INF: u8 = 2;
/// Marker for an undefined duration.
pub const MARKER_DURATION_UNDEFINED: u8 = 3;

/// A coded value as read from the stream: either a reserved marker or a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code<T> {
    /// A reserved marker, `0..=15`.
    Marker(u8),
    /// A plain signed value.
    Value(T),
}

/// The three-way reading of a coded int in a length/reference position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// A reserved marker.
    Marker(u8),
    /// Length 0.
    Empty,
    /// A positive count.
    Count(usize),
    /// A back-reference with its 1-based table index.
    Ref(usize),
}

impl Code<i32> {
    /// Classifies the code as a marker, empty, count or back-reference.
    pub fn shape(self) -> Shape {
        match self {
            Code::Marker(marker) => Shape::Marker(marker),
            Code::Value(0) => Shape::Empty,
            Code::Value(n) if n > 0 => Shape::Count(n as usize),
            Code::Value(n) => Shape::Ref(n.unsigned_abs() as usize),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Code<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Code::Marker(marker) => write!(f, "marker {}", marker),
            Code::Value(value) => write!(f, "value {}", value),
        }
    }
}

/// Bounds-checked sequential reader over a byte buffer.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    reader: Bytes,
}

impl Decoder {
    pub fn new(reader: Bytes) -> Self {
        Self { reader }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.reader.remaining()
    }

    /// Returns the unread part of the buffer.
    pub fn into_inner(self) -> Bytes {
        self.reader
    }

    #[inline]
    fn ensure(&self, len: usize) -> Result<()> {
        if self.reader.remaining() < len {
            return Err(PickleError::InsufficientData);
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.reader.get_u8())
    }

    /// Reads a fixed-width little-endian `i32` with no coding.
    pub fn read_raw_int(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.reader.get_i32_le())
    }

    /// Reads a fixed-width little-endian `i64` with no coding.
    pub fn read_raw_long(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.reader.get_i64_le())
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.reader.get_f32_le())
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.reader.get_f64_le())
    }

    /// Splits off the next `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.reader.split_to(len))
    }

    /// Reads a UTF-8 string of `len` bytes.
    pub fn read_str(&mut self, len: usize) -> Result<String> {
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| PickleError::Decode(e.to_string()))
    }

    /// Decodes the 2/3/4-byte signed magnitude codings.
    ///
    /// Only the shortest coding of a value is accepted: a tier must not hold a magnitude the tier
    /// below it could hold, and a negative sign needs a non-zero magnitude.
    fn read_tiered(&mut self, first: u8, context: &'static str) -> Result<i32> {
        let (extra, min_magnitude) = match first & 0xE0 {
            CODE_TIER_2 => (1, 0),
            CODE_TIER_3 => (2, 1 << 12),
            _ => (3, 1 << 20),
        };
        self.ensure(extra)?;
        let mut magnitude = (first & 0x0F) as i32;
        for _ in 0..extra {
            magnitude = (magnitude << 8) | self.reader.get_u8() as i32;
        }
        let negative = first & SIGN_BIT != 0;
        let value = if negative { -magnitude } else { magnitude };
        let too_short = if negative {
            magnitude == 0 || magnitude < min_magnitude
        } else {
            magnitude < min_magnitude.max(0x80)
        };
        if too_short {
            return Err(non_canonical(context, first, value as i64));
        }
        Ok(value)
    }

    /// Reads a raw `i32` escape, which is only valid past the 28-bit tier.
    fn read_escaped_int(&mut self, context: &'static str) -> Result<i32> {
        let value = self.read_raw_int()?;
        if value.unsigned_abs() < 1 << 28 {
            return Err(non_canonical(context, CODE_RAW_INT, value as i64));
        }
        Ok(value)
    }

    /// Reads a coded int.
    ///
    /// # Errors
    /// Returns `MalformedCode` for first bytes outside the int layout (including `0xE1`).
    pub fn read_int_code(&mut self) -> Result<Code<i32>> {
        let first = self.read_u8()?;
        match first {
            0x00..=0x7F => Ok(Code::Value(first as i32)),
            0x80..=0xDF => Ok(Code::Value(self.read_tiered(first, "int")?)),
            CODE_RAW_INT => Ok(Code::Value(self.read_escaped_int("int")?)),
            CODE_MARKER_BASE..=0xFF => Ok(Code::Marker(first & 0x0F)),
            other => Err(PickleError::MalformedCode {
                context: "int",
                byte: other,
            }),
        }
    }

    /// Reads a coded long.
    pub fn read_long_code(&mut self) -> Result<Code<i64>> {
        let first = self.read_u8()?;
        match first {
            0x00..=0x7F => Ok(Code::Value(first as i64)),
            0x80..=0xDF => Ok(Code::Value(self.read_tiered(first, "long")? as i64)),
            CODE_RAW_INT => Ok(Code::Value(self.read_escaped_int("long")? as i64)),
            CODE_RAW_LONG => {
                let value = self.read_raw_long()?;
                if i32::try_from(value).is_ok() {
                    return Err(non_canonical("long", CODE_RAW_LONG, value));
                }
                Ok(Code::Value(value))
            }
            CODE_MARKER_BASE..=0xFF => Ok(Code::Marker(first & 0x0F)),
            other => Err(PickleError::MalformedCode {
                context: "long",
                byte: other,
            }),
        }
    }

    /// Reads a coded int that must be a plain value.
    pub fn read_int(&mut self) -> Result<i32> {
        match self.read_int_code()? {
            Code::Value(value) => Ok(value),
            Code::Marker(marker) => Err(PickleError::UnknownMarker {
                type_name: "int",
                marker,
            }),
        }
    }

    /// Reads a coded long that must be a plain value.
    pub fn read_long(&mut self) -> Result<i64> {
        match self.read_long_code()? {
            Code::Value(value) => Ok(value),
            Code::Marker(marker) => Err(PickleError::UnknownMarker {
                type_name: "long",
                marker,
            }),
        }
    }
}

fn non_canonical(context: &'static str, byte: u8, value: i64) -> PickleError {
    PickleError::NonCanonicalCode {
        context,
        byte,
        value,
    }
}

/// Growable writer producing the coded-value layout.
#[derive(Debug, Default)]
pub struct Encoder {
    writer: BytesMut,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            writer: BytesMut::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.writer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writer.is_empty()
    }

    pub fn freeze(self) -> Bytes {
        self.writer.freeze()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.writer.put_u8(value);
    }

    pub fn write_raw_int(&mut self, value: i32) {
        self.writer.put_i32_le(value);
    }

    pub fn write_raw_long(&mut self, value: i64) {
        self.writer.put_i64_le(value);
    }

    pub fn write_f32(&mut self, value: f32) {
        self.writer.put_f32_le(value);
    }

    pub fn write_f64(&mut self, value: f64) {
        self.writer.put_f64_le(value);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.writer.put_slice(bytes);
    }

    /// Writes a coded int using the shortest coding for its magnitude.
    pub fn write_int(&mut self, value: i32) {
        if (0..=0x7F).contains(&value) {
            self.writer.put_u8(value as u8);
            return;
        }
        let magnitude = value.unsigned_abs();
        if magnitude >= 1 << 28 {
            self.writer.put_u8(CODE_RAW_INT);
            self.writer.put_i32_le(value);
            return;
        }
        let sign = if value < 0 { SIGN_BIT } else { 0 };
        if magnitude < 1 << 12 {
            self.writer.put_u8(CODE_TIER_2 | sign | (magnitude >> 8) as u8);
            self.writer.put_u8(magnitude as u8);
        } else if magnitude < 1 << 20 {
            self.writer.put_u8(CODE_TIER_3 | sign | (magnitude >> 16) as u8);
            self.writer.put_u8((magnitude >> 8) as u8);
            self.writer.put_u8(magnitude as u8);
        } else {
            self.writer.put_u8(CODE_TIER_4 | sign | (magnitude >> 24) as u8);
            self.writer.put_u8((magnitude >> 16) as u8);
            self.writer.put_u8((magnitude >> 8) as u8);
            self.writer.put_u8(magnitude as u8);
        }
    }

    /// Writes a coded long. Values in `i32` range share the int coding.
    pub fn write_long(&mut self, value: i64) {
        match i32::try_from(value) {
            Ok(value) => self.write_int(value),
            Err(_) => {
                self.writer.put_u8(CODE_RAW_LONG);
                self.writer.put_i64_le(value);
            }
        }
    }

    /// Writes a reserved marker.
    pub fn write_marker(&mut self, marker: u8) {
        debug_assert!(marker <= 0x0F, "marker {} out of range", marker);
        self.writer.put_u8(CODE_MARKER_BASE | (marker & 0x0F));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_int(value: i32) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.write_int(value);
        enc.freeze().to_vec()
    }

    #[test]
    fn small_values_take_one_byte() {
        assert_eq!(encoded_int(0), vec![0x00]);
        assert_eq!(encoded_int(127), vec![0x7F]);
    }

    #[test]
    fn tier_boundaries() {
        assert_eq!(encoded_int(128), vec![0x80, 0x80]);
        assert_eq!(encoded_int(-1), vec![0x90, 0x01]);
        assert_eq!(encoded_int(4095), vec![0x8F, 0xFF]);
        assert_eq!(encoded_int(4096), vec![0xA0, 0x10, 0x00]);
        assert_eq!(encoded_int(-(1 << 20)), vec![0xD0, 0x10, 0x00, 0x00]);
        assert_eq!(encoded_int(1 << 28)[0], CODE_RAW_INT);
        assert_eq!(encoded_int(i32::MIN)[0], CODE_RAW_INT);
    }

    #[test]
    fn int_codes_read_back() {
        let values = [
            0,
            1,
            127,
            128,
            -1,
            -127,
            4095,
            -4096,
            1 << 20,
            (1 << 28) - 1,
            1 << 28,
            i32::MAX,
            i32::MIN,
        ];
        let mut enc = Encoder::new();
        for v in values {
            enc.write_int(v);
        }
        let mut dec = Decoder::new(enc.freeze());
        for v in values {
            assert_eq!(dec.read_int_code().unwrap(), Code::Value(v));
        }
        assert_eq!(dec.remaining(), 0);
    }

    #[test]
    fn long_codes_read_back() {
        let values = [0i64, -5, 1_000_000_000, i32::MAX as i64 + 1, i64::MIN, i64::MAX];
        let mut enc = Encoder::new();
        for v in values {
            enc.write_long(v);
        }
        let mut dec = Decoder::new(enc.freeze());
        for v in values {
            assert_eq!(dec.read_long_code().unwrap(), Code::Value(v));
        }
    }

    #[test]
    fn markers_are_distinct_from_values() {
        let mut enc = Encoder::new();
        enc.write_marker(MARKER_OPTION_SOME);
        enc.write_int(3);
        let mut dec = Decoder::new(enc.freeze());
        assert_eq!(dec.read_int_code().unwrap(), Code::Marker(MARKER_OPTION_SOME));
        assert_eq!(dec.read_int_code().unwrap(), Code::Value(3));
    }

    #[test]
    fn raw_long_prefix_is_malformed_for_ints() {
        let mut dec = Decoder::new(Bytes::from_static(&[CODE_RAW_LONG, 0, 0, 0, 0, 0, 0, 0, 0]));
        assert!(matches!(
            dec.read_int_code(),
            Err(PickleError::MalformedCode { context: "int", byte: CODE_RAW_LONG })
        ));
    }

    #[test]
    fn unused_prefixes_are_malformed() {
        let mut dec = Decoder::new(Bytes::from_static(&[0xE7]));
        assert!(matches!(
            dec.read_long_code(),
            Err(PickleError::MalformedCode { byte: 0xE7, .. })
        ));
    }

    #[test]
    fn truncated_tier_is_insufficient_data() {
        let mut dec = Decoder::new(Bytes::from_static(&[0xA0, 0x01]));
        assert!(matches!(dec.read_int_code(), Err(PickleError::InsufficientData)));
    }

    #[test]
    fn negative_zero_is_rejected() {
        let mut dec = Decoder::new(Bytes::from_static(&[0x90, 0x00]));
        assert!(matches!(
            dec.read_int_code(),
            Err(PickleError::NonCanonicalCode { context: "int", byte: 0x90, value: 0 })
        ));
    }

    #[test]
    fn longer_codings_than_needed_are_rejected() {
        let cases: [&'static [u8]; 6] = [
            &[0x80, 0x05],
            &[0xA0, 0x00, 0x7F],
            &[0xB0, 0x0F, 0xFF],
            &[0xC0, 0x0F, 0xFF, 0xFF],
            &[CODE_RAW_INT, 0xFF, 0xFF, 0xFF, 0x0F],
            &[CODE_RAW_INT, 0x01, 0x00, 0x00, 0xF0],
        ];
        for raw in cases {
            let mut dec = Decoder::new(Bytes::from_static(raw));
            assert!(
                matches!(dec.read_int_code(), Err(PickleError::NonCanonicalCode { .. })),
                "{:02X?} should be rejected",
                raw
            );
        }
        let mut dec = Decoder::new(Bytes::from_static(&[CODE_RAW_LONG, 5, 0, 0, 0, 0, 0, 0, 0]));
        assert!(matches!(
            dec.read_long_code(),
            Err(PickleError::NonCanonicalCode { context: "long", value: 5, .. })
        ));
    }

    #[test]
    fn shortest_codings_at_tier_edges_are_accepted() {
        let cases: [(&'static [u8], i32); 6] = [
            (&[0x80, 0x80], 128),
            (&[0x90, 0x01], -1),
            (&[0x90, 0x7F], -127),
            (&[0xA0, 0x10, 0x00], 4096),
            (&[0xD0, 0x10, 0x00, 0x00], -(1 << 20)),
            (&[CODE_RAW_INT, 0x00, 0x00, 0x00, 0x10], 1 << 28),
        ];
        for (raw, value) in cases {
            let mut dec = Decoder::new(Bytes::from_static(raw));
            assert_eq!(dec.read_int_code().unwrap(), Code::Value(value));
        }
    }

    #[test]
    fn shape_classification() {
        assert_eq!(Code::Value(0i32).shape(), Shape::Empty);
        assert_eq!(Code::Value(7i32).shape(), Shape::Count(7));
        assert_eq!(Code::Value(-2i32).shape(), Shape::Ref(2));
        assert_eq!(Code::<i32>::Marker(3).shape(), Shape::Marker(3));
    }
}
