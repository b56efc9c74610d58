//! # refpack
//!
//! A compact binary pickling library for Rust with back-reference deduplication of shared values.
//!
//! - Variable-length "coded" integers biased toward small magnitudes for lengths, tags and references
//! - Short strings are deduplicated by content through an immutable reference table
//! - Options, either values, collections, maps and derived structs/enums are deduplicated by identity
//!   through an identity reference table, so shared (acyclic) structures are written once
//! - Custom derive macros for structs and enums
//! - Feature-gated support for optional dependencies
//!
//! ## Wire model
//!
//! Every pickle/unpickle operation owns one session ([`PickleState`] / [`UnpickleState`]). A session
//! holds two append-only reference tables addressed by 1-based indices on the wire. Index 1 is the
//! null slot in both tables. A value is registered only after its content has been fully written
//! (or read), so cyclic object graphs cannot be represented.
//!
//! Whenever a length, tag or reference can appear the codec reads a coded value, which is one of:
//!
//! - a reserved marker (`Some`, `Left`, `Right`, infinite durations, ...),
//! - a non-negative count, where 0 means "empty" and never touches a table,
//! - a negative back-reference whose magnitude indexes a reference table.
//!
//! ## Attribute Macros
//!
//! - `#[refpack(skip)]`: The field is not written. On unpickle it is set to `Default::default()`.
//!
//! ## Feature Flags
//!
//! - `indexmap`: Enables pickling of `IndexMap` and `IndexSet` collections.
//! - `chrono`: Enables pickling of `chrono::TimeDelta` (through the duration codec) and
//!   `chrono::DateTime<Utc>`.
//! - `rust_decimal`: Enables pickling of `rust_decimal::Decimal`.
//! - `ulid`: Enables pickling of `ulid::Ulid` (same wire form as UUID).
//! - `ahash`: Enables pickling of `ahash::AHashMap` and `ahash::AHashSet`.
//! - `smol_str`: Enables pickling of `smol_str::SmolStr` (deduplicated like `String`).

pub mod codec;
pub mod collections;
mod config;
pub mod core;
mod duration;
mod features;
pub mod refs;
mod state;

use std::rc::Rc;

use bytes::Bytes;
pub use codec::{Code, Decoder, Encoder, Shape};
pub use collections::{Buildable, Either};
pub use config::{Config, DEFAULT_STRING_DEDUP_THRESHOLD};
pub use duration::Duration;
pub use refpack_derive::{Pickle, Unpickle};
pub use refs::RefTableKind;
pub use state::{Decoded, Header, PickleState, UnpickleState};

/// Errors that can occur during pickling or unpickling.
#[derive(Debug, thiserror::Error)]
pub enum PickleError {
    /// The value could not be pickled (e.g., a length that does not fit the wire format).
    #[error("Encode error: {0}")]
    Encode(String),
    /// The value could not be unpickled (e.g., invalid UTF-8 or an out-of-range number).
    #[error("Decode error: {0}")]
    Decode(String),
    /// The buffer did not contain enough data to complete the operation.
    #[error("Insufficient data in buffer")]
    InsufficientData,
    /// The first byte of a coded value does not start any known coding.
    #[error("Malformed coded value: byte 0x{byte:02X} in {context} context")]
    MalformedCode { context: &'static str, byte: u8 },
    /// A coded value is not in its shortest form (including a negative zero).
    #[error("Non-canonical coding of {value} behind byte 0x{byte:02X} in {context} context")]
    NonCanonicalCode {
        context: &'static str,
        byte: u8,
        value: i64,
    },
    /// A coded value has a shape the codec does not accept for its type.
    #[error("Invalid coding for {expected}: {code}")]
    InvalidCoding { expected: &'static str, code: String },
    /// A reserved marker the codec does not recognize for its type.
    #[error("Unknown reserved marker {marker} for {type_name}")]
    UnknownMarker { type_name: &'static str, marker: u8 },
    /// A back-reference points outside the populated range of its table.
    #[error("Unresolvable back-reference {index} into the {table} table ({len} entries)")]
    UnresolvableReference {
        table: RefTableKind,
        index: usize,
        len: usize,
    },
    /// A back-reference to the null slot where the type has no null form.
    #[error("Null back-reference for non-nullable {type_name}")]
    NullReference { type_name: &'static str },
    /// A back-reference resolves to an entry of a different type.
    #[error("Back-reference {index} into the {table} table does not hold a {type_name}")]
    ReferenceTypeMismatch {
        table: RefTableKind,
        index: usize,
        type_name: &'static str,
    },
    /// A fixed-size container received a different number of elements.
    #[error("Length mismatch for {type_name}: expected {expected}, got {actual}")]
    LengthMismatch {
        type_name: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Enum-specific decode error
    #[error(transparent)]
    EnumDecode(#[from] EnumDecodeError),
}

/// The result type used throughout this crate for pickle/unpickle operations.
///
/// All `Pickler` and `Unpickler` trait methods return this type.
pub type Result<T> = std::result::Result<T, PickleError>;

/// Derive-specific error types for enum operations
#[derive(Debug, thiserror::Error)]
pub enum EnumDecodeError {
    #[error("Unknown variant index {index} for enum {enum_name}")]
    UnknownVariant {
        index: usize,
        enum_name: &'static str,
    },
}

/// Trait for types that can be pickled into the refpack binary format.
///
/// Most users should use `#[derive(Pickle)]` instead of manual implementation.
///
/// # Errors
/// Returns `PickleError` if the value cannot be pickled.
pub trait Pickler {
    /// Pickle the value into the session's buffer.
    ///
    /// Nested values must be pickled through the same `state` so that back-references stay aligned
    /// with the decoder's tables. The borrow of `self` lasts as long as the session, which keeps
    /// identity entries (keyed by address) pointing at live, unchanged values.
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()>;
}

/// Trait for types that can be unpickled from the refpack binary format.
///
/// Most users should use `#[derive(Unpickle)]` instead of manual implementation.
///
/// # Errors
/// Returns `PickleError` if the value cannot be unpickled or the data is invalid.
pub trait Unpickler: Sized {
    /// Unpickle the value from the session's reader.
    ///
    /// Nested values must be unpickled through the same `state`; the reference tables live for the
    /// whole top-level operation.
    fn unpickle(state: &mut UnpickleState) -> Result<Self>;

    /// Unpickle the value into a shared handle.
    ///
    /// Types that live in the identity table override this to register the returned `Rc` itself,
    /// so back-references resolve to the same allocation and nothing is deep-copied. `Rc<T>`
    /// decodes through here.
    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        Ok(Rc::new(Self::unpickle(state)?))
    }
}

/// Convenience function to pickle a value to bytes with the default [`Config`].
///
/// # Example
/// ```rust
/// use refpack::{pickle, unpickle, Pickle, Unpickle};
///
/// #[derive(Pickle, Unpickle, Clone, PartialEq, Debug)]
/// struct MyStruct {
///     id: u32,
///     name: String,
/// }
///
/// let value = MyStruct { id: 42, name: "hello".to_string() };
/// let mut buf = pickle(&value).unwrap();
/// let decoded: MyStruct = unpickle(&mut buf).unwrap();
/// assert_eq!(value, decoded);
/// ```
pub fn pickle<T: Pickler + ?Sized>(value: &T) -> Result<Bytes> {
    pickle_with_config(value, Config::default())
}

/// Pickles a value to bytes with an explicit [`Config`].
pub fn pickle_with_config<T: Pickler + ?Sized>(value: &T, config: Config) -> Result<Bytes> {
    let mut state = PickleState::with_config(config);
    state.pickle(value)?;
    Ok(state.finish())
}

/// Convenience function to unpickle a value from bytes with the default [`Config`].
///
/// On success `reader` is advanced past the consumed bytes. On failure it is left untouched, so the
/// same bytes can be unpickled again from scratch.
pub fn unpickle<T: Unpickler>(reader: &mut Bytes) -> Result<T> {
    unpickle_with_config(reader, Config::default())
}

/// Unpickles a value from bytes with an explicit [`Config`].
///
/// The config must match the one the bytes were pickled with.
pub fn unpickle_with_config<T: Unpickler>(reader: &mut Bytes, config: Config) -> Result<T> {
    let mut state = UnpickleState::with_config(reader.clone(), config);
    match state.unpickle::<T>() {
        Ok(value) => {
            *reader = state.into_reader();
            Ok(value)
        }
        Err(err) => {
            tracing::debug!(
                error = %err,
                remaining = state.remaining(),
                target_type = std::any::type_name::<T>(),
                "unpickle failed"
            );
            Err(err)
        }
    }
}
