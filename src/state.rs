use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use bytes::Bytes;

use crate::codec::{Code, Decoder, Encoder, Shape};
use crate::refs::{IdentityKey, RefIndex, RefTable, RefTableKind, NULL_REF};
use crate::{Config, PickleError, Pickler, Result, Unpickler};

/// Header of a composite (struct or enum) value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    /// Fresh content follows. Structs always carry 0, enums the 0-based variant index.
    Fresh(usize),
    /// An identity back-reference with its 1-based table index.
    Ref(usize),
}

/// A value read from the stream, before it is handed back through [`UnpickleState::finish`] or
/// [`UnpickleState::finish_rc`].
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// Fresh content. It is registered in the identity table when finished.
    Fresh(T),
    /// Content that never enters the identity table: empty containers and the null option.
    Plain(T),
    /// An identity back-reference.
    Ref(usize),
}

/// Mutable session for one top-level unpickle: the reader plus both reference tables.
///
/// The tables hold `Rc` handles, so a session is neither `Send` nor `Sync`. Independent sessions
/// may run on separate threads.
pub struct UnpickleState {
    dec: Decoder,
    config: Config,
    immutable_refs: RefTable<Rc<str>>,
    identity_refs: RefTable<Rc<dyn Any>>,
}

impl UnpickleState {
    pub fn new(reader: Bytes) -> Self {
        Self::with_config(reader, Config::default())
    }

    /// Creates a session with both tables pre-populated from `config`.
    pub fn with_config(reader: Bytes, config: Config) -> Self {
        let immutable_refs = RefTable::with_reserved(
            RefTableKind::Immutable,
            config.well_known_strings.iter().map(|s| Rc::from(s.as_str())),
        );
        Self {
            dec: Decoder::new(reader),
            config,
            immutable_refs,
            identity_refs: RefTable::new(RefTableKind::Identity),
        }
    }

    /// Unpickles one value of type `T` within this session.
    pub fn unpickle<T: Unpickler>(&mut self) -> Result<T> {
        T::unpickle(self)
    }

    pub fn decoder(&mut self) -> &mut Decoder {
        &mut self.dec
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn remaining(&self) -> usize {
        self.dec.remaining()
    }

    /// Ends the session and returns the unread bytes.
    pub fn into_reader(self) -> Bytes {
        self.dec.into_inner()
    }

    pub fn immutable_refs(&self) -> &RefTable<Rc<str>> {
        &self.immutable_refs
    }

    pub fn identity_refs(&self) -> &RefTable<Rc<dyn Any>> {
        &self.identity_refs
    }

    /// Appends a string to the immutable table.
    pub fn add_immutable_ref(&mut self, value: Rc<str>) -> usize {
        let index = self.immutable_refs.push(value);
        tracing::trace!(table = "immutable", index, "registered reference");
        index
    }

    /// Resolves an immutable back-reference. `Ok(None)` is the null slot.
    pub fn immutable_ref(&self, index: usize) -> Result<Option<Rc<str>>> {
        let entry = self.immutable_refs.resolve(index)?;
        tracing::trace!(table = "immutable", index, "resolved back-reference");
        Ok(entry.cloned())
    }

    /// Registers a fully unpickled value in the identity table.
    ///
    /// Must only be called once the value's whole content has been read, so that references made
    /// by its children get lower indices, exactly as on the pickling side.
    ///
    /// The table keeps its own clone of `value`. For owned trees that is one copy per level, so a
    /// chain of depth `d` costs `O(size * d)` to decode. Values decoded through `Rc<T>` go through
    /// [`register_shared`](Self::register_shared) instead and are never copied.
    pub fn register_identity<T: Clone + 'static>(&mut self, value: &T) -> usize {
        let entry: Rc<dyn Any> = Rc::new(value.clone());
        let index = self.identity_refs.push(entry);
        tracing::trace!(
            table = "identity",
            index,
            type_name = std::any::type_name::<T>(),
            "registered reference"
        );
        index
    }

    /// Registers a shared handle in the identity table without copying its value.
    pub fn register_shared<T: 'static>(&mut self, value: &Rc<T>) -> usize {
        let entry: Rc<dyn Any> = value.clone();
        let index = self.identity_refs.push(entry);
        tracing::trace!(
            table = "identity",
            index,
            type_name = std::any::type_name::<T>(),
            "registered shared reference"
        );
        index
    }

    /// Resolves an identity back-reference. `Ok(None)` is the null slot.
    ///
    /// # Errors
    /// `UnresolvableReference` for an index past the table, `ReferenceTypeMismatch` if the entry was
    /// registered as another type.
    pub fn identity_ref<T: Clone + 'static>(&self, index: usize) -> Result<Option<T>> {
        let Some(entry) = self.identity_refs.resolve(index)? else {
            return Ok(None);
        };
        tracing::trace!(table = "identity", index, "resolved back-reference");
        entry
            .downcast_ref::<T>()
            .cloned()
            .map(Some)
            .ok_or(PickleError::ReferenceTypeMismatch {
                table: RefTableKind::Identity,
                index,
                type_name: std::any::type_name::<T>(),
            })
    }

    /// Resolves an identity back-reference for a type with no null form.
    pub fn shared<T: Clone + 'static>(&self, index: usize) -> Result<T> {
        self.identity_ref(index)?.ok_or(PickleError::NullReference {
            type_name: std::any::type_name::<T>(),
        })
    }

    /// Resolves an identity back-reference to the table's own handle.
    ///
    /// Entries registered through [`register_shared`](Self::register_shared) come back
    /// pointer-equal.
    pub fn shared_rc<T: 'static>(&self, index: usize) -> Result<Rc<T>> {
        let type_name = std::any::type_name::<T>();
        let entry = self
            .identity_refs
            .resolve(index)?
            .ok_or(PickleError::NullReference { type_name })?;
        tracing::trace!(table = "identity", index, "resolved shared back-reference");
        Rc::clone(entry)
            .downcast::<T>()
            .map_err(|_| PickleError::ReferenceTypeMismatch {
                table: RefTableKind::Identity,
                index,
                type_name,
            })
    }

    /// Hands back a decoded value as an owned `T`, registering fresh content.
    pub fn finish<T: Clone + 'static>(&mut self, decoded: Decoded<T>) -> Result<T> {
        match decoded {
            Decoded::Fresh(value) => {
                self.register_identity(&value);
                Ok(value)
            }
            Decoded::Plain(value) => Ok(value),
            Decoded::Ref(index) => self.shared(index),
        }
    }

    /// Hands back a decoded value as a shared handle, registering fresh content without a copy.
    pub fn finish_rc<T: 'static>(&mut self, decoded: Decoded<T>) -> Result<Rc<T>> {
        match decoded {
            Decoded::Fresh(value) => {
                let value = Rc::new(value);
                self.register_shared(&value);
                Ok(value)
            }
            Decoded::Plain(value) => Ok(Rc::new(value)),
            Decoded::Ref(index) => self.shared_rc(index),
        }
    }

    /// Reads the header of a struct: 0 for fresh content or a back-reference.
    pub fn read_struct_header<T: ?Sized>(&mut self) -> Result<Header> {
        match self.dec.read_int_code()?.shape() {
            Shape::Empty => Ok(Header::Fresh(0)),
            Shape::Ref(index) => Ok(Header::Ref(index)),
            other => Err(invalid_coding(std::any::type_name::<T>(), other)),
        }
    }

    /// Reads the header of an enum: variant index + 1 for fresh content or a back-reference.
    pub fn read_enum_header<T: ?Sized>(&mut self) -> Result<Header> {
        match self.dec.read_int_code()?.shape() {
            Shape::Count(tag) => Ok(Header::Fresh(tag - 1)),
            Shape::Ref(index) => Ok(Header::Ref(index)),
            other => Err(invalid_coding(std::any::type_name::<T>(), other)),
        }
    }
}

impl std::fmt::Debug for UnpickleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnpickleState")
            .field("remaining", &self.dec.remaining())
            .field("immutable_refs", &self.immutable_refs.len())
            .field("identity_refs", &self.identity_refs.len())
            .finish_non_exhaustive()
    }
}

pub(crate) fn invalid_coding(expected: &'static str, shape: Shape) -> PickleError {
    let code = match shape {
        Shape::Marker(marker) => Code::<i64>::Marker(marker).to_string(),
        Shape::Empty => Code::Value(0i64).to_string(),
        Shape::Count(n) => format!("value {}", n),
        Shape::Ref(index) => format!("value -{}", index),
    };
    PickleError::InvalidCoding { expected, code }
}

/// Mutable session for one top-level pickle: the writer plus the encoder-side reference indices.
///
/// Identity entries are keyed by address, so every value pickled in a session stays borrowed for
/// the session's lifetime `'a`. A value cannot be dropped or mutated while the session could still
/// mistake a later value at the same address for it:
///
/// ```compile_fail
/// use refpack::PickleState;
///
/// let mut state = PickleState::new();
/// for i in 0..3 {
///     let values = vec![i, i + 10];
///     state.pickle(&values).unwrap();
/// }
/// let _bytes = state.finish();
/// ```
pub struct PickleState<'a> {
    enc: Encoder,
    config: Config,
    immutable_refs: RefIndex<Rc<str>>,
    identity_refs: RefIndex<IdentityKey>,
    borrowed: PhantomData<&'a ()>,
}

impl Default for PickleState<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> PickleState<'a> {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        let immutable_refs = RefIndex::with_reserved(
            RefTableKind::Immutable,
            config.well_known_strings.iter().map(|s| Rc::from(s.as_str())),
        );
        Self {
            enc: Encoder::new(),
            config,
            immutable_refs,
            identity_refs: RefIndex::new(RefTableKind::Identity),
            borrowed: PhantomData,
        }
    }

    /// Pickles one value within this session. `value` stays borrowed until the session ends.
    pub fn pickle<T: Pickler + ?Sized>(&mut self, value: &'a T) -> Result<()> {
        value.pickle(self)
    }

    pub fn encoder(&mut self) -> &mut Encoder {
        &mut self.enc
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Ends the session and returns the written bytes.
    pub fn finish(self) -> Bytes {
        self.enc.freeze()
    }

    pub fn immutable_refs(&self) -> &RefIndex<Rc<str>> {
        &self.immutable_refs
    }

    pub fn identity_refs(&self) -> &RefIndex<IdentityKey> {
        &self.identity_refs
    }

    /// Writes a coded length.
    pub fn write_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            PickleError::Encode(format!("Length {} exceeds the coded int range", len))
        })?;
        self.enc.write_int(len);
        Ok(())
    }

    /// Writes a back-reference to a 1-based table index.
    pub fn write_ref(&mut self, index: usize) -> Result<()> {
        let index = i32::try_from(index).map_err(|_| {
            PickleError::Encode(format!(
                "Reference index {} exceeds the coded int range",
                index
            ))
        })?;
        self.enc.write_int(-index);
        Ok(())
    }

    /// Writes the null back-reference.
    pub fn write_null(&mut self) {
        self.enc.write_int(-(NULL_REF as i32));
    }

    pub fn immutable_ref_for(&self, value: &str) -> Option<usize> {
        self.immutable_refs.get(value)
    }

    pub fn add_immutable_ref(&mut self, value: &str) -> usize {
        self.immutable_refs.insert(Rc::from(value))
    }

    /// Looks up a value already pickled in this session by identity.
    ///
    /// Always `None` when [`Config::deduplicate`] is off.
    pub fn identity_ref_for<T: ?Sized + 'static>(&self, value: &T) -> Option<usize> {
        if !self.config.deduplicate {
            return None;
        }
        self.identity_refs.get(&IdentityKey::of(value))
    }

    /// Registers a value whose content has just been written.
    pub fn add_identity_ref<T: ?Sized + 'static>(&mut self, value: &'a T) -> usize {
        self.identity_refs.insert(IdentityKey::of(value))
    }

    /// Writes the back-reference for `value` if it was already pickled. Returns whether it did.
    pub fn write_identity_ref<T: ?Sized + 'static>(&mut self, value: &'a T) -> Result<bool> {
        match self.identity_ref_for(value) {
            Some(index) => {
                self.write_ref(index)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes the fresh-content header of a struct.
    pub fn write_struct_header(&mut self) {
        self.enc.write_int(0);
    }

    /// Writes the fresh-content header of an enum variant.
    pub fn write_enum_header(&mut self, variant: usize) -> Result<()> {
        self.write_len(variant + 1)
    }
}

impl std::fmt::Debug for PickleState<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PickleState")
            .field("written", &self.enc.len())
            .field("immutable_refs", &self.immutable_refs.len())
            .field("identity_refs", &self.identity_refs.len())
            .finish_non_exhaustive()
    }
}
