//! Reference tables.
//!
//! Both sides of a stream keep two tables in lock step: the immutable table (content-deduplicated
//! strings) and the identity table (values deduplicated by identity). Entries are addressed on the
//! wire with 1-based indices; index 1 is the null slot and is present from the start.
//!
//! The decoder side stores the values themselves in a [`RefTable`]. The encoder side only needs to
//! map a value back to the index it was given, which is what [`RefIndex`] does.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use crate::{PickleError, Result};

/// Wire index of the null slot.
pub const NULL_REF: usize = 1;

/// Which of the two session tables an index addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefTableKind {
    Immutable,
    Identity,
}

impl fmt::Display for RefTableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTableKind::Immutable => f.write_str("immutable"),
            RefTableKind::Identity => f.write_str("identity"),
        }
    }
}

/// Append-only table of decoded values.
///
/// Slot `i` holds wire index `i + 1`; slot 0 is the null slot.
#[derive(Debug)]
pub struct RefTable<T> {
    kind: RefTableKind,
    entries: Vec<Option<T>>,
}

impl<T> RefTable<T> {
    /// Creates a table holding only the null slot.
    pub fn new(kind: RefTableKind) -> Self {
        Self {
            kind,
            entries: vec![None],
        }
    }

    /// Creates a table with the null slot followed by `reserved` well-known entries.
    pub fn with_reserved<I: IntoIterator<Item = T>>(kind: RefTableKind, reserved: I) -> Self {
        let mut table = Self::new(kind);
        table.entries.extend(reserved.into_iter().map(Some));
        table
    }

    pub fn kind(&self) -> RefTableKind {
        self.kind
    }

    /// Number of populated indices, the null slot included. Valid wire indices are `1..=len()`.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false: the null slot is populated from the start.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an entry and returns its wire index.
    pub fn push(&mut self, value: T) -> usize {
        self.entries.push(Some(value));
        self.entries.len()
    }

    /// Resolves a wire index. `Ok(None)` is the null slot.
    ///
    /// # Errors
    /// Returns `UnresolvableReference` if the index is 0 or past the last entry.
    pub fn resolve(&self, index: usize) -> Result<Option<&T>> {
        match index.checked_sub(1).and_then(|slot| self.entries.get(slot)) {
            Some(entry) => Ok(entry.as_ref()),
            None => Err(PickleError::UnresolvableReference {
                table: self.kind,
                index,
                len: self.entries.len(),
            }),
        }
    }
}

/// Identity of a value being pickled: its concrete type and address.
///
/// The address is only stable while the value is borrowed; `PickleState<'a>` holds that borrow
/// for the whole session. The type is part of the key because a value and its first field share an
/// address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    type_id: TypeId,
    addr: usize,
}

impl IdentityKey {
    pub fn of<T: ?Sized + 'static>(value: &T) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            addr: (value as *const T).cast::<()>() as usize,
        }
    }
}

/// Encoder-side mirror of a [`RefTable`]: maps keys to the wire index they were assigned.
#[derive(Debug)]
pub struct RefIndex<K> {
    kind: RefTableKind,
    indices: HashMap<K, usize>,
    len: usize,
}

impl<K: Eq + Hash> RefIndex<K> {
    pub fn new(kind: RefTableKind) -> Self {
        Self {
            kind,
            indices: HashMap::new(),
            len: NULL_REF,
        }
    }

    /// Reserves indices for well-known keys after the null slot, in order.
    pub fn with_reserved<I: IntoIterator<Item = K>>(kind: RefTableKind, reserved: I) -> Self {
        let mut index = Self::new(kind);
        for key in reserved {
            index.insert(key);
        }
        index
    }

    pub fn kind(&self) -> RefTableKind {
        self.kind
    }

    /// Number of assigned indices, the null slot included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get<Q>(&self, key: &Q) -> Option<usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.indices.get(key).copied()
    }

    /// Assigns the next index to `key` and returns it.
    ///
    /// A key registered twice keeps its first index, but the counter still advances so the
    /// encoder stays aligned with the decoder, which appends on every registration.
    pub fn insert(&mut self, key: K) -> usize {
        self.len += 1;
        let index = self.len;
        self.indices.entry(key).or_insert(index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_slot_is_index_one() {
        let table: RefTable<u32> = RefTable::new(RefTableKind::Identity);
        assert_eq!(table.len(), 1);
        assert!(table.resolve(NULL_REF).unwrap().is_none());
    }

    #[test]
    fn push_returns_wire_indices() {
        let mut table = RefTable::with_reserved(RefTableKind::Immutable, ["a", "b"]);
        assert_eq!(table.resolve(2).unwrap(), Some(&"a"));
        assert_eq!(table.resolve(3).unwrap(), Some(&"b"));
        assert_eq!(table.push("c"), 4);
        assert_eq!(table.resolve(4).unwrap(), Some(&"c"));
    }

    #[test]
    fn out_of_range_indices_fail() {
        let table: RefTable<u32> = RefTable::new(RefTableKind::Identity);
        assert!(matches!(
            table.resolve(0),
            Err(PickleError::UnresolvableReference { index: 0, len: 1, .. })
        ));
        assert!(matches!(
            table.resolve(2),
            Err(PickleError::UnresolvableReference {
                table: RefTableKind::Identity,
                index: 2,
                len: 1
            })
        ));
    }

    #[test]
    fn index_mirrors_table_numbering() {
        let mut table = RefTable::with_reserved(RefTableKind::Immutable, ["x"]);
        let mut index = RefIndex::with_reserved(RefTableKind::Immutable, ["x"]);
        assert_eq!(index.get("x"), Some(2));
        assert_eq!(index.insert("y"), table.push("y"));
        assert_eq!(index.len(), table.len());
    }

    #[test]
    fn identity_key_separates_types_at_one_address() {
        struct Outer {
            inner: u64,
        }
        let outer = Outer { inner: 7 };
        assert_ne!(IdentityKey::of(&outer), IdentityKey::of(&outer.inner));
        assert_eq!(IdentityKey::of(&outer), IdentityKey::of(&outer));
    }
}
