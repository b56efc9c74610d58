//! Generic container codecs.
//!
//! Options, either values, sequences, arrays and maps are deduplicated by identity: a container is
//! registered in the identity table once its whole content has been written (or read), and any
//! later occurrence of the same container is a back-reference. Empty sequences and maps are written
//! as length 0 and never touch the table.
//!
//! Each algorithm is a free function taking the element codec as a closure, so it can be reused
//! with element types that have no `Pickler`/`Unpickler` impl of their own. The trait impls below
//! plug in `T::pickle` / `T::unpickle`. The `decode_*_with` functions stop short of registration
//! and return a [`Decoded`], which the caller finishes either as an owned value or as an `Rc`.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap, HashSet, LinkedList, VecDeque};
use std::hash::{BuildHasher, Hash};

use std::rc::Rc;

use crate::codec::{Shape, MARKER_EITHER_LEFT, MARKER_EITHER_RIGHT, MARKER_OPTION_SOME};
use crate::refs::NULL_REF;
use crate::state::invalid_coding;
use crate::*;

/// A value of one of two types.
///
/// `Result<T, E>` shares the wire form, with `Err` as the left branch and `Ok` as the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

impl<L, R> Either<L, R> {
    pub fn is_left(&self) -> bool {
        matches!(self, Either::Left(_))
    }

    pub fn is_right(&self) -> bool {
        matches!(self, Either::Right(_))
    }

    pub fn left(self) -> Option<L> {
        match self {
            Either::Left(l) => Some(l),
            Either::Right(_) => None,
        }
    }

    pub fn right(self) -> Option<R> {
        match self {
            Either::Left(_) => None,
            Either::Right(r) => Some(r),
        }
    }
}

impl<T, E> From<std::result::Result<T, E>> for Either<E, T> {
    fn from(value: std::result::Result<T, E>) -> Self {
        match value {
            Ok(v) => Either::Right(v),
            Err(e) => Either::Left(e),
        }
    }
}

impl<L, R> From<Either<L, R>> for std::result::Result<R, L> {
    fn from(value: Either<L, R>) -> Self {
        match value {
            Either::Left(l) => Err(l),
            Either::Right(r) => Ok(r),
        }
    }
}

/// A container that can be built from a known number of items.
///
/// `builder` receives a capacity hint that never exceeds the unread byte count, so a corrupt
/// length cannot force a huge allocation.
pub trait Buildable<T>: Sized {
    type Builder;

    fn builder(len: usize) -> Self::Builder;

    fn push(builder: &mut Self::Builder, item: T);

    /// Finalizes the container.
    ///
    /// # Errors
    /// Fixed-size containers return `LengthMismatch` if the item count is wrong.
    fn finish(builder: Self::Builder) -> Result<Self>;
}

impl<T> Buildable<T> for Vec<T> {
    type Builder = Vec<T>;

    fn builder(len: usize) -> Self::Builder {
        Vec::with_capacity(len)
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.push(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

impl<T> Buildable<T> for VecDeque<T> {
    type Builder = VecDeque<T>;

    fn builder(len: usize) -> Self::Builder {
        VecDeque::with_capacity(len)
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.push_back(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

impl<T> Buildable<T> for LinkedList<T> {
    type Builder = LinkedList<T>;

    fn builder(_len: usize) -> Self::Builder {
        LinkedList::new()
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.push_back(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

impl<T: Ord> Buildable<T> for BinaryHeap<T> {
    type Builder = Vec<T>;

    fn builder(len: usize) -> Self::Builder {
        Vec::with_capacity(len)
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.push(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(BinaryHeap::from(builder))
    }
}

impl<T> Buildable<T> for Box<[T]> {
    type Builder = Vec<T>;

    fn builder(len: usize) -> Self::Builder {
        Vec::with_capacity(len)
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.push(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder.into_boxed_slice())
    }
}

impl<T, const N: usize> Buildable<T> for [T; N] {
    type Builder = Vec<T>;

    fn builder(len: usize) -> Self::Builder {
        Vec::with_capacity(len.min(N))
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.push(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        builder.try_into().map_err(|items: Vec<T>| PickleError::LengthMismatch {
            type_name: std::any::type_name::<Self>(),
            expected: N,
            actual: items.len(),
        })
    }
}

impl<T: Eq + Hash, S: BuildHasher + Default> Buildable<T> for HashSet<T, S> {
    type Builder = HashSet<T, S>;

    fn builder(len: usize) -> Self::Builder {
        HashSet::with_capacity_and_hasher(len, S::default())
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.insert(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

impl<T: Ord> Buildable<T> for BTreeSet<T> {
    type Builder = BTreeSet<T>;

    fn builder(_len: usize) -> Self::Builder {
        BTreeSet::new()
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.insert(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

impl<K: Eq + Hash, V, S: BuildHasher + Default> Buildable<(K, V)> for HashMap<K, V, S> {
    type Builder = HashMap<K, V, S>;

    fn builder(len: usize) -> Self::Builder {
        HashMap::with_capacity_and_hasher(len, S::default())
    }

    fn push(builder: &mut Self::Builder, (key, value): (K, V)) {
        builder.insert(key, value);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

impl<K: Ord, V> Buildable<(K, V)> for BTreeMap<K, V> {
    type Builder = BTreeMap<K, V>;

    fn builder(_len: usize) -> Self::Builder {
        BTreeMap::new()
    }

    fn push(builder: &mut Self::Builder, (key, value): (K, V)) {
        builder.insert(key, value);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}

// --- Option ---
/// Writes `None` as the null back-reference, otherwise the `Some` marker and the value.
pub fn pickle_option_with<'a, T, F>(
    value: &'a Option<T>,
    state: &mut PickleState<'a>,
    pickle_value: F,
) -> Result<()>
where
    T: 'static,
    F: FnOnce(&'a T, &mut PickleState<'a>) -> Result<()>,
{
    let Some(inner) = value else {
        state.write_null();
        return Ok(());
    };
    if state.write_identity_ref(value)? {
        return Ok(());
    }
    state.encoder().write_marker(MARKER_OPTION_SOME);
    pickle_value(inner, state)?;
    state.add_identity_ref(value);
    Ok(())
}

/// Reads an optional value up to, but not including, registration. The null slot is `None`.
///
/// # Errors
/// Returns `InvalidCoding` for anything other than the `Some` marker or a back-reference.
pub fn decode_option_with<T, F>(
    state: &mut UnpickleState,
    unpickle_value: F,
) -> Result<Decoded<Option<T>>>
where
    F: FnOnce(&mut UnpickleState) -> Result<T>,
{
    match state.decoder().read_int_code()?.shape() {
        Shape::Marker(MARKER_OPTION_SOME) => Ok(Decoded::Fresh(Some(unpickle_value(state)?))),
        Shape::Ref(NULL_REF) => Ok(Decoded::Plain(None)),
        Shape::Ref(index) => Ok(Decoded::Ref(index)),
        other => Err(invalid_coding("optional type", other)),
    }
}

/// Reads an optional value.
pub fn unpickle_option_with<T, F>(
    state: &mut UnpickleState,
    unpickle_value: F,
) -> Result<Option<T>>
where
    T: Clone + 'static,
    F: FnOnce(&mut UnpickleState) -> Result<T>,
{
    let decoded = decode_option_with(state, unpickle_value)?;
    state.finish(decoded)
}

impl<T: Pickler + 'static> Pickler for Option<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_option_with(self, state, T::pickle)
    }
}

impl<T: Unpickler + Clone + 'static> Unpickler for Option<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_option_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_option_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

// --- Either / Result ---
fn pickle_branch<'a, C, F>(
    container: &'a C,
    marker: u8,
    state: &mut PickleState<'a>,
    pickle_value: F,
) -> Result<()>
where
    C: ?Sized + 'static,
    F: FnOnce(&mut PickleState<'a>) -> Result<()>,
{
    if state.write_identity_ref(container)? {
        return Ok(());
    }
    state.encoder().write_marker(marker);
    pickle_value(state)?;
    state.add_identity_ref(container);
    Ok(())
}

/// Writes the branch marker followed by the branch value.
pub fn pickle_either_with<'a, L, R, FL, FR>(
    value: &'a Either<L, R>,
    state: &mut PickleState<'a>,
    pickle_left: FL,
    pickle_right: FR,
) -> Result<()>
where
    L: 'static,
    R: 'static,
    FL: FnOnce(&'a L, &mut PickleState<'a>) -> Result<()>,
    FR: FnOnce(&'a R, &mut PickleState<'a>) -> Result<()>,
{
    match value {
        Either::Left(l) => pickle_branch(value, MARKER_EITHER_LEFT, state, |s| pickle_left(l, s)),
        Either::Right(r) => {
            pickle_branch(value, MARKER_EITHER_RIGHT, state, |s| pickle_right(r, s))
        }
    }
}

/// Reads an either value up to, but not including, registration.
///
/// # Errors
/// Returns `InvalidCoding` for anything other than a branch marker or a back-reference.
pub fn decode_either_with<L, R, FL, FR>(
    state: &mut UnpickleState,
    unpickle_left: FL,
    unpickle_right: FR,
) -> Result<Decoded<Either<L, R>>>
where
    FL: FnOnce(&mut UnpickleState) -> Result<L>,
    FR: FnOnce(&mut UnpickleState) -> Result<R>,
{
    match state.decoder().read_int_code()?.shape() {
        Shape::Marker(MARKER_EITHER_LEFT) => Ok(Decoded::Fresh(Either::Left(unpickle_left(state)?))),
        Shape::Marker(MARKER_EITHER_RIGHT) => {
            Ok(Decoded::Fresh(Either::Right(unpickle_right(state)?)))
        }
        Shape::Ref(index) => Ok(Decoded::Ref(index)),
        other => Err(invalid_coding("either type", other)),
    }
}

/// Reads an either value.
///
/// # Errors
/// As [`decode_either_with`], plus `NullReference` for the null slot.
pub fn unpickle_either_with<L, R, FL, FR>(
    state: &mut UnpickleState,
    unpickle_left: FL,
    unpickle_right: FR,
) -> Result<Either<L, R>>
where
    L: Clone + 'static,
    R: Clone + 'static,
    FL: FnOnce(&mut UnpickleState) -> Result<L>,
    FR: FnOnce(&mut UnpickleState) -> Result<R>,
{
    let decoded = decode_either_with(state, unpickle_left, unpickle_right)?;
    state.finish(decoded)
}

impl<L: Pickler + 'static, R: Pickler + 'static> Pickler for Either<L, R> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_either_with(self, state, L::pickle, R::pickle)
    }
}

impl<L, R> Unpickler for Either<L, R>
where
    L: Unpickler + Clone + 'static,
    R: Unpickler + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_either_with(state, L::unpickle, R::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_either_with(state, L::unpickle, R::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<T: Pickler + 'static, E: Pickler + 'static> Pickler for std::result::Result<T, E> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        match self {
            Err(e) => pickle_branch(self, MARKER_EITHER_LEFT, state, |s| e.pickle(s)),
            Ok(v) => pickle_branch(self, MARKER_EITHER_RIGHT, state, |s| v.pickle(s)),
        }
    }
}

/// Decodes through `Either<E, T>`, which is also the type kept in the identity table. An
/// `Rc<Result<T, E>>` is therefore rebuilt on every back-reference rather than shared.
impl<T, E> Unpickler for std::result::Result<T, E>
where
    T: Unpickler + Clone + 'static,
    E: Unpickler + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_either_with(state, E::unpickle, T::unpickle).map(Into::into)
    }
}

// --- Sequences ---
/// Writes a sequence: a back-reference if `container` was already written, 0 when empty,
/// otherwise the length followed by each item.
pub fn pickle_seq_with<'a, C, T, I, F>(
    container: &'a C,
    items: I,
    state: &mut PickleState<'a>,
    mut pickle_item: F,
) -> Result<()>
where
    C: ?Sized + 'static,
    T: 'a,
    I: ExactSizeIterator<Item = &'a T>,
    F: FnMut(&'a T, &mut PickleState<'a>) -> Result<()>,
{
    if state.write_identity_ref(container)? {
        return Ok(());
    }
    let len = items.len();
    if len == 0 {
        state.encoder().write_int(0);
        return Ok(());
    }
    state.write_len(len)?;
    for item in items {
        pickle_item(item, state)?;
    }
    state.add_identity_ref(container);
    Ok(())
}

/// Reads a sequence into any [`Buildable`] container, up to but not including registration.
pub fn decode_seq_with<C, T, F>(
    state: &mut UnpickleState,
    mut unpickle_item: F,
) -> Result<Decoded<C>>
where
    C: Buildable<T>,
    F: FnMut(&mut UnpickleState) -> Result<T>,
{
    match state.decoder().read_int_code()?.shape() {
        Shape::Empty => Ok(Decoded::Plain(C::finish(C::builder(0))?)),
        Shape::Ref(index) => Ok(Decoded::Ref(index)),
        Shape::Count(len) => {
            let mut builder = C::builder(len.min(state.remaining()));
            for _ in 0..len {
                let item = unpickle_item(state)?;
                C::push(&mut builder, item);
            }
            Ok(Decoded::Fresh(C::finish(builder)?))
        }
        other => Err(invalid_coding(std::any::type_name::<C>(), other)),
    }
}

/// Reads a sequence into any [`Buildable`] container.
pub fn unpickle_seq_with<C, T, F>(state: &mut UnpickleState, unpickle_item: F) -> Result<C>
where
    C: Buildable<T> + Clone + 'static,
    F: FnMut(&mut UnpickleState) -> Result<T>,
{
    let decoded = decode_seq_with(state, unpickle_item)?;
    state.finish(decoded)
}

// --- Maps ---
/// Writes a map: like a sequence, with each entry written as key then value.
pub fn pickle_map_with<'a, C, K, V, I, FK, FV>(
    container: &'a C,
    entries: I,
    state: &mut PickleState<'a>,
    mut pickle_key: FK,
    mut pickle_value: FV,
) -> Result<()>
where
    C: ?Sized + 'static,
    K: 'a,
    V: 'a,
    I: ExactSizeIterator<Item = (&'a K, &'a V)>,
    FK: FnMut(&'a K, &mut PickleState<'a>) -> Result<()>,
    FV: FnMut(&'a V, &mut PickleState<'a>) -> Result<()>,
{
    if state.write_identity_ref(container)? {
        return Ok(());
    }
    let len = entries.len();
    if len == 0 {
        state.encoder().write_int(0);
        return Ok(());
    }
    state.write_len(len)?;
    for (key, value) in entries {
        pickle_key(key, state)?;
        pickle_value(value, state)?;
    }
    state.add_identity_ref(container);
    Ok(())
}

/// Reads a map into any [`Buildable`] container of key/value pairs, up to but not including
/// registration.
pub fn decode_map_with<M, K, V, FK, FV>(
    state: &mut UnpickleState,
    mut unpickle_key: FK,
    mut unpickle_value: FV,
) -> Result<Decoded<M>>
where
    M: Buildable<(K, V)>,
    FK: FnMut(&mut UnpickleState) -> Result<K>,
    FV: FnMut(&mut UnpickleState) -> Result<V>,
{
    decode_seq_with(state, |state| {
        let key = unpickle_key(state)?;
        let value = unpickle_value(state)?;
        Ok((key, value))
    })
}

/// Reads a map into any [`Buildable`] container of key/value pairs.
pub fn unpickle_map_with<M, K, V, FK, FV>(
    state: &mut UnpickleState,
    unpickle_key: FK,
    unpickle_value: FV,
) -> Result<M>
where
    M: Buildable<(K, V)> + Clone + 'static,
    FK: FnMut(&mut UnpickleState) -> Result<K>,
    FV: FnMut(&mut UnpickleState) -> Result<V>,
{
    let decoded = decode_map_with(state, unpickle_key, unpickle_value)?;
    state.finish(decoded)
}

impl<T: Pickler + 'static> Pickler for [T] {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}

impl<T: Pickler + 'static> Pickler for Vec<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
impl<T: Unpickler + Clone + 'static> Unpickler for Vec<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<T: Unpickler + Clone + 'static> Unpickler for Box<[T]> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }
}

impl<T: Pickler + 'static> Pickler for VecDeque<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
impl<T: Unpickler + Clone + 'static> Unpickler for VecDeque<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<T: Pickler + 'static> Pickler for LinkedList<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
impl<T: Unpickler + Clone + 'static> Unpickler for LinkedList<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<T: Pickler + 'static> Pickler for BinaryHeap<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
impl<T: Unpickler + Ord + Clone + 'static> Unpickler for BinaryHeap<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<T: Pickler + 'static, const N: usize> Pickler for [T; N] {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
/// Decodes a fixed-size array. The coded length must equal `N`.
impl<T: Unpickler + Clone + 'static, const N: usize> Unpickler for [T; N] {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

// --- Sets ---
impl<T: Pickler + 'static, S: 'static> Pickler for HashSet<T, S> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
impl<T, S> Unpickler for HashSet<T, S>
where
    T: Unpickler + Eq + Hash + Clone + 'static,
    S: BuildHasher + Default + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<T: Pickler + 'static> Pickler for BTreeSet<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
impl<T: Unpickler + Ord + Clone + 'static> Unpickler for BTreeSet<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

// --- Maps ---
impl<K: Pickler + 'static, V: Pickler + 'static, S: 'static> Pickler for HashMap<K, V, S> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_map_with(self, self.iter(), state, K::pickle, V::pickle)
    }
}
impl<K, V, S> Unpickler for HashMap<K, V, S>
where
    K: Unpickler + Eq + Hash + Clone + 'static,
    V: Unpickler + Clone + 'static,
    S: BuildHasher + Default + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_map_with(state, K::unpickle, V::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_map_with(state, K::unpickle, V::unpickle)?;
        state.finish_rc(decoded)
    }
}

impl<K: Pickler + 'static, V: Pickler + 'static> Pickler for BTreeMap<K, V> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_map_with(self, self.iter(), state, K::pickle, V::pickle)
    }
}
impl<K, V> Unpickler for BTreeMap<K, V>
where
    K: Unpickler + Ord + Clone + 'static,
    V: Unpickler + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_map_with(state, K::unpickle, V::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_map_with(state, K::unpickle, V::unpickle)?;
        state.finish_rc(decoded)
    }
}
