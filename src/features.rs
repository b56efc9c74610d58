#[cfg(feature = "ahash")]
use ahash::{AHashMap, AHashSet};
#[cfg(feature = "chrono")]
use chrono::{DateTime, TimeDelta, Utc};
#[cfg(feature = "indexmap")]
use indexmap::{IndexMap, IndexSet};
#[cfg(feature = "rust_decimal")]
use rust_decimal::Decimal;
#[cfg(feature = "smol_str")]
use smol_str::SmolStr;
#[cfg(feature = "ulid")]
use ulid::Ulid;

#[allow(unused_imports)]
use std::rc::Rc;

#[allow(unused_imports)]
use crate::collections::*;
#[allow(unused_imports)]
use crate::*;

// --- IndexSet ---
#[cfg(feature = "indexmap")]
impl<T, S> Buildable<T> for IndexSet<T, S>
where
    T: Eq + std::hash::Hash,
    S: std::hash::BuildHasher + Default,
{
    type Builder = IndexSet<T, S>;

    fn builder(len: usize) -> Self::Builder {
        IndexSet::with_capacity_and_hasher(len, S::default())
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.insert(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}
#[cfg(feature = "indexmap")]
impl<T: Pickler + 'static, S: 'static> Pickler for IndexSet<T, S> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
/// Decodes an `IndexSet`, keeping the pickled iteration order.
#[cfg(feature = "indexmap")]
impl<T, S> Unpickler for IndexSet<T, S>
where
    T: Unpickler + Eq + std::hash::Hash + Clone + 'static,
    S: std::hash::BuildHasher + Default + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

// --- IndexMap ---
#[cfg(feature = "indexmap")]
impl<K, V, S> Buildable<(K, V)> for IndexMap<K, V, S>
where
    K: Eq + std::hash::Hash,
    S: std::hash::BuildHasher + Default,
{
    type Builder = IndexMap<K, V, S>;

    fn builder(len: usize) -> Self::Builder {
        IndexMap::with_capacity_and_hasher(len, S::default())
    }

    fn push(builder: &mut Self::Builder, (key, value): (K, V)) {
        builder.insert(key, value);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}
#[cfg(feature = "indexmap")]
impl<K: Pickler + 'static, V: Pickler + 'static, S: 'static> Pickler for IndexMap<K, V, S> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_map_with(self, self.iter(), state, K::pickle, V::pickle)
    }
}
#[cfg(feature = "indexmap")]
impl<K, V, S> Unpickler for IndexMap<K, V, S>
where
    K: Unpickler + Eq + std::hash::Hash + Clone + 'static,
    V: Unpickler + Clone + 'static,
    S: std::hash::BuildHasher + Default + Clone + 'static,
{
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_map_with(state, K::unpickle, V::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_map_with(state, K::unpickle, V::unpickle)?;
        state.finish_rc(decoded)
    }
}

// --- TimeDelta ---
/// Encodes a `TimeDelta` through the duration codec as a nanosecond count.
#[cfg(feature = "chrono")]
impl Pickler for TimeDelta {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        let nanos = self.num_nanoseconds().ok_or_else(|| {
            PickleError::Encode(format!("TimeDelta {} overflows i64 nanoseconds", self))
        })?;
        Duration::Finite(nanos).write_to(state.encoder());
        Ok(())
    }
}
/// Decodes a `TimeDelta`. Infinite and undefined durations are rejected.
#[cfg(feature = "chrono")]
impl Unpickler for TimeDelta {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        match Duration::unpickle(state)? {
            Duration::Finite(nanos) => Ok(TimeDelta::nanoseconds(nanos)),
            other => Err(PickleError::Decode(format!(
                "{:?} is not representable as TimeDelta",
                other
            ))),
        }
    }
}

// --- DateTime<Utc> ---
/// Encodes a `DateTime<Utc>` as a coded long of nanoseconds since the Unix epoch.
#[cfg(feature = "chrono")]
impl Pickler for DateTime<Utc> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        let nanos = self.timestamp_nanos_opt().ok_or_else(|| {
            PickleError::Encode(format!("DateTime {} overflows i64 nanoseconds", self))
        })?;
        state.encoder().write_long(nanos);
        Ok(())
    }
}
#[cfg(feature = "chrono")]
impl Unpickler for DateTime<Utc> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(DateTime::from_timestamp_nanos(state.decoder().read_long()?))
    }
}

// --- Decimal ---
/// Encodes a `Decimal` as its scale (coded int) followed by its 96-bit mantissa as an `i128`.
#[cfg(feature = "rust_decimal")]
impl Pickler for Decimal {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        let enc = state.encoder();
        enc.write_int(self.scale() as i32);
        crate::core::write_u128(enc, self.mantissa() as u128);
        Ok(())
    }
}
#[cfg(feature = "rust_decimal")]
impl Unpickler for Decimal {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let scale = u32::unpickle(state)?;
        let mantissa = i128::unpickle(state)?;
        Decimal::try_from_i128_with_scale(mantissa, scale)
            .map_err(|e| PickleError::Decode(format!("Invalid Decimal: {}", e)))
    }
}

// --- ULID ---
/// Encodes a `Ulid` like a `Uuid`: two raw longs, high bits first.
#[cfg(feature = "ulid")]
impl Pickler for Ulid {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        let bits = u128::from(*self);
        let enc = state.encoder();
        enc.write_raw_long((bits >> 64) as u64 as i64);
        enc.write_raw_long(bits as u64 as i64);
        Ok(())
    }
}
#[cfg(feature = "ulid")]
impl Unpickler for Ulid {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        let dec = state.decoder();
        let high = dec.read_raw_long()? as u64 as u128;
        let low = dec.read_raw_long()? as u64 as u128;
        Ok(Ulid::from((high << 64) | low))
    }
}

// --- SmolStr ---
/// Encodes a `SmolStr` with the string codec, deduplicated like `String`.
#[cfg(feature = "smol_str")]
impl Pickler for SmolStr {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        crate::core::pickle_str(self.as_str(), state)
    }
}
#[cfg(feature = "smol_str")]
impl Unpickler for SmolStr {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        Ok(SmolStr::new(crate::core::unpickle_shared_str(state)?))
    }
}

// --- AHashSet ---
#[cfg(feature = "ahash")]
impl<T: Eq + std::hash::Hash> Buildable<T> for AHashSet<T> {
    type Builder = AHashSet<T>;

    fn builder(len: usize) -> Self::Builder {
        AHashSet::with_capacity(len)
    }

    fn push(builder: &mut Self::Builder, item: T) {
        builder.insert(item);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}
#[cfg(feature = "ahash")]
impl<T: Pickler + 'static> Pickler for AHashSet<T> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_seq_with(self, self.iter(), state, T::pickle)
    }
}
#[cfg(feature = "ahash")]
impl<T: Unpickler + Eq + std::hash::Hash + Clone + 'static> Unpickler for AHashSet<T> {
    fn unpickle(state: &mut UnpickleState) -> Result<Self> {
        unpickle_seq_with(state, T::unpickle)
    }

    fn unpickle_rc(state: &mut UnpickleState) -> Result<Rc<Self>> {
        let decoded = decode_seq_with(state, T::unpickle)?;
        state.finish_rc(decoded)
    }
}

// --- AHashMap ---
#[cfg(feature = "ahash")]
impl<K: Eq + std::hash::Hash, V> Buildable<(K, V)> for AHashMap<K, V> {
    type Builder = AHashMap<K, V>;

    fn builder(len: usize) -> Self::Builder {
        AHashMap::with_capacity(len)
    }

    fn push(builder: &mut Self::Builder, (key, value): (K, V)) {
        builder.insert(key, value);
    }

    fn finish(builder: Self::Builder) -> Result<Self> {
        Ok(builder)
    }
}
#[cfg(feature = "ahash")]
impl<K: Pickler + 'static, V: Pickler + 'static> Pickler for AHashMap<K, V> {
    fn pickle<'a>(&'a self, state: &mut PickleState<'a>) -> Result<()> {
        pickle_map_with(self, self.iter(), state, K::pickle, V::pickle)
    }
}
#[cfg(feature = "ahash")]
impl<K, V> Unpickler for AHashMap<K, V>
where
    K: Unpickler + Eq + std::hash::Hash + Clone + 'static,
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
