//! Primitive codecs.
//!
//! - `()` consumes no bytes
//! - `bool`, `u8` and `i8` are a single raw byte
//! - `i16`, `u16` and `char` are widened through the coded int
//! - `i32`/`u32` are coded ints, `i64`/`u64`/`isize`/`usize` coded longs (unsigned values are
//!   bit-cast to the signed width)
//! - `i128`/`u128` are two raw longs, low half first
//! - `f32`/`f64` are raw little-endian IEEE 754
//! - strings are a coded length followed by UTF-8, deduplicated by content when short
//! - `Uuid` is two raw longs, high bits first

use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use uuid::Uuid;

use crate::codec::Shape;
use crate::state::invalid_coding;
use crate::*;

// --- unit ---
impl Pickler for () {
    fn pickle<'a>(&'a self, _state: &mut PickleState<'a>) -> Result<()> {
        Ok(())
    }
}
impl Unpickler for () {
    fn unpickle(_state: &mut UnpickleState) -> Result<Self> {
        Ok(())
    }
}

// --- bool ---
/// Encodes a `bool` as a single byte: 1 for `true`, 0 for `false`.
impl Pickler for bool {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_u8(u8::from(*self));
        Ok(())
    }
}
/// Decodes a `bool` from a single byte. 1 is `true`, any other byte is `false`.
impl Unpickler for bool {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(state.decoder().read_u8()? == 1)
    }
}

// --- byte ---
impl Pickler for u8 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_u8(*self);
        Ok(())
    }
}
impl Unpickler for u8 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        state.decoder().read_u8()
    }
}
impl Pickler for i8 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_u8(*self as u8);
        Ok(())
    }
}
impl Unpickler for i8 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(state.decoder().read_u8()? as i8)
    }
}

// --- types widened through the coded int ---
macro_rules! impl_widened_int {
    ($($t:ty),*) => {
        $(
            impl Pickler for $t {
                fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
                    state.encoder().write_int(i32::from(*self));
                    Ok(())
                }
            }
            impl Unpickler for $t {
                fn unpickle(state: &mut UnpickleState) -> Result<Self> {
                    let v = state.decoder().read_int()?;
                    <$t>::try_from(v).map_err(|_| {
                        PickleError::Decode(format!(
                            "Value {} out of range for {}",
                            v,
                            stringify!($t)
                        ))
                    })
                }
            }
        )*
    };
}
impl_widened_int!(i16, u16);

// --- char ---
/// Encodes a `char` as its Unicode scalar value through the coded int.
impl Pickler for char {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_int(*self as i32);
        Ok(())
    }
}
impl Unpickler for char {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let v = state.decoder().read_int()?;
        u32::try_from(v)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| PickleError::Decode(format!("Invalid Unicode scalar value: {}", v)))
    }
}

// --- int / long ---
impl Pickler for i32 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_int(*self);
        Ok(())
    }
}
impl Unpickler for i32 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        state.decoder().read_int()
    }
}
impl Pickler for u32 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_int(*self as i32);
        Ok(())
    }
}
impl Unpickler for u32 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(state.decoder().read_int()? as u32)
    }
}
impl Pickler for i64 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_long(*self);
        Ok(())
    }
}
impl Unpickler for i64 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        state.decoder().read_long()
    }
}
impl Pickler for u64 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_long(*self as i64);
        Ok(())
    }
}
impl Unpickler for u64 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(state.decoder().read_long()? as u64)
    }
}
/// Encodes `isize` as a coded long regardless of the platform's pointer width.
impl Pickler for isize {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_long(*self as i64);
        Ok(())
    }
}
impl Unpickler for isize {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let v = state.decoder().read_long()?;
        isize::try_from(v)
            .map_err(|_| PickleError::Decode(format!("Value {} too large for isize", v)))
    }
}
impl Pickler for usize {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_long(*self as u64 as i64);
        Ok(())
    }
}
impl Unpickler for usize {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let v = state.decoder().read_long()? as u64;
        usize::try_from(v)
            .map_err(|_| PickleError::Decode(format!("Value {} too large for usize", v)))
    }
}

// --- 128-bit ---
/// Writes two raw longs, low half first.
pub(crate) fn write_u128(enc: &mut Encoder, value: u128) {
    enc.write_raw_long(value as u64 as i64);
    enc.write_raw_long((value >> 64) as u64 as i64);
}

impl Pickler for i128 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        write_u128(state.encoder(), *self as u128);
        Ok(())
    }
}
impl Unpickler for i128 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(u128::unpickle(state)? as i128)
    }
}
impl Pickler for u128 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        write_u128(state.encoder(), *self);
        Ok(())
    }
}
impl Unpickler for u128 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let dec = state.decoder();
        let low = dec.read_raw_long()? as u64 as u128;
        let high = dec.read_raw_long()? as u64 as u128;
        Ok((high << 64) | low)
    }
}

// --- f32/f64 ---
/// Encodes an `f32` as 4 bytes (little-endian IEEE 754).
impl Pickler for f32 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_f32(*self);
        Ok(())
    }
}
impl Unpickler for f32 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        state.decoder().read_f32()
    }
}
/// Encodes an `f64` as 8 bytes (little-endian IEEE 754).
impl Pickler for f64 {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.encoder().write_f64(*self);
        Ok(())
    }
}
impl Unpickler for f64 {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        state.decoder().read_f64()
    }
}

// --- String ---
/// A string header as read from the stream.
enum StrCode {
    Empty,
    Shared(Rc<str>),
    Fresh(String),
}

fn read_str_code(state: &mut UnpickleState, type_name: &'static str) -> Result<StrCode> {
    match state.decoder().read_int_code()?.shape() {
        Shape::Empty => Ok(StrCode::Empty),
        Shape::Ref(index) => state
            .immutable_ref(index)?
            .map(StrCode::Shared)
            .ok_or(PickleError::NullReference { type_name }),
        Shape::Count(len) => Ok(StrCode::Fresh(state.decoder().read_str(len)?)),
        other => Err(invalid_coding(type_name, other)),
    }
}

/// Writes a string: 0 when empty, a back-reference when an equal string is already in the
/// immutable table, otherwise the length and UTF-8 content. Strings below the configured threshold
/// are registered after their content.
pub fn pickle_str(value: &str, state: &mut PickleState<'_>) -> Result<()> {
    if value.is_empty() {
        state.encoder().write_int(0);
        return Ok(());
    }
    if let Some(index) = state.immutable_ref_for(value) {
        return state.write_ref(index);
    }
    state.write_len(value.len())?;
    state.encoder().write_bytes(value.as_bytes());
    if state.config().dedups_string(value.len()) {
        state.add_immutable_ref(value);
    }
    Ok(())
}

/// Reads a string as a shared handle. Back-references return the table's own `Rc`.
pub fn unpickle_shared_str(state: &mut UnpickleState) -> Result<Rc<str>> {
    match read_str_code(state, "Rc<str>")? {
        StrCode::Empty => Ok(Rc::from("")),
        StrCode::Shared(value) => Ok(value),
        StrCode::Fresh(value) => {
            let value: Rc<str> = Rc::from(value);
            if state.config().dedups_string(value.len()) {
                state.add_immutable_ref(value.clone());
            }
            Ok(value)
        }
    }
}

/// Reads a string into an owned `String`.
pub fn unpickle_string(state: &mut UnpickleState) -> Result<String> {
    match read_str_code(state, "String")? {
        StrCode::Empty => Ok(String::new()),
        StrCode::Shared(value) => Ok(String::from(&*value)),
        StrCode::Fresh(value) => {
            if state.config().dedups_string(value.len()) {
                state.add_immutable_ref(Rc::from(value.as_str()));
            }
            Ok(value)
        }
    }
}

impl Pickler for str {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_str(self, state)
    }
}
impl Pickler for String {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_str(self, state)
    }
}
impl Unpickler for String {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_string(state)
    }
}
impl Unpickler for Box<str> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(unpickle_string(state)?.into_boxed_str())
    }
}
/// Decodes an `Rc<str>`. Two occurrences of the same short string yield the same allocation.
impl Unpickler for Rc<str> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_shared_str(state)
    }
}
impl Unpickler for Arc<str> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(Arc::from(unpickle_string(state)?))
    }
}

// --- Bytes ---
/// Encodes `Bytes` as a coded length followed by the raw bytes. Byte buffers are not deduplicated.
impl Pickler for Bytes {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        state.write_len(self.len())?;
        state.encoder().write_bytes(self);
        Ok(())
    }
}
impl Unpickler for Bytes {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        match state.decoder().read_int_code()?.shape() {
            Shape::Empty => Ok(Bytes::new()),
            Shape::Count(len) => state.decoder().read_bytes(len),
            other => Err(invalid_coding("Bytes", other)),
        }
    }
}

// --- UUID ---
/// Encodes a `Uuid` as two raw longs: the high 64 bits, then the low 64 bits.
impl Pickler for Uuid {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        let bits = self.as_u128();
        let enc = state.encoder();
        enc.write_raw_long((bits >> 64) as u64 as i64);
        enc.write_raw_long(bits as u64 as i64);
        Ok(())
    }
}
impl Unpickler for Uuid {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let dec = state.decoder();
        let high = dec.read_raw_long()? as u64 as u128;
        let low = dec.read_raw_long()? as u64 as u128;
        Ok(Uuid::from_u128((high << 64) | low))
    }
}

// --- Box / Rc / Arc / & ---
/// Smart pointers pickle transparently through to their pointee, so two pointers to one value
/// share a single identity entry.
impl<T: Pickler + ?Sized> Pickler for Box<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        (**self).pickle(state)
    }
}
impl<T: Unpickler> Unpickler for Box<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(Box::new(T::unpickle(state)?))
    }
}
impl<T: Pickler + ?Sized> Pickler for Rc<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        (**self).pickle(state)
    }
}
/// Decodes through [`Unpickler::unpickle_rc`], so an `Rc` pickled twice comes back as one
/// allocation.
impl<T: Unpickler> Unpickler for Rc<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        T::unpickle_rc(state)
    }
}
impl<T: Pickler + ?Sized> Pickler for Arc<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        (**self).pickle(state)
    }
}
impl<T: Unpickler> Unpickler for Arc<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(Arc::new(T::unpickle(state)?))
    }
}
impl<T: Pickler + ?Sized> Pickler for &T {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        (**self).pickle(state)
    }
}

// --- Tuple ---
/// Tuples are their elements in order, with no header and no table entry.
macro_rules! impl_tuple {
    ($($T:ident : $idx:tt),+) => {
        impl<$($T: Pickler),+> Pickler for ($($T,)+) {
            fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
                $(
                    self.$idx.pickle(state)?;
                )+
                Ok(())
            }
        }
        impl<$($T: Unpickler),+> Unpickler for ($($T,)+) {
            fn unpickle(state: &mut UnpickleState) -> Result<Self> {
                Ok(($(
                    $T::unpickle(state)?,
                )+))
            }
        }
    };
}

impl_tuple!(T0: 0);
impl_tuple!(T0: 0, T1: 1);
impl_tuple!(T0: 0, T1: 1, T2: 2);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9, T10: 10);
impl_tuple!(T0: 0, T1: 1, T2: 2, T3: 3, T4: 4, T5: 5, T6: 6, T7: 7, T8: 8, T9: 9, T10: 10, T11: 11);
