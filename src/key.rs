//! Key comparison strategy, chosen per key type at compile time.
//!
//! Every node stores a `HashSlot`. For scalar keys the slot is `NoHash`, a
//! zero-sized type: comparing two integers is as cheap as comparing their
//! hashes, so nothing is cached and the node pays no extra bytes. Every
//! other key stores a `CachedHash` written once at insert; probing rejects
//! a chain entry on a hash mismatch before running `Eq`, and rehashing
//! reuses the stored value instead of calling `K: Hash` again.

use core::hash::Hash;
use core::num::{
    NonZeroI128, NonZeroI16, NonZeroI32, NonZeroI64, NonZeroI8, NonZeroIsize, NonZeroU128,
    NonZeroU16, NonZeroU32, NonZeroU64, NonZeroU8, NonZeroUsize,
};
use std::borrow::Cow;
use std::ffi::{CString, OsString};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

/// Per-node hash storage.
pub trait HashSlot: Copy + core::fmt::Debug {
    /// Build the slot for a freshly created node whose key hashes to `hash`.
    fn new(hash: u32) -> Self;

    /// Cheap pre-check run before full key equality. `false` means the keys
    /// are certainly different.
    fn may_match(&self, hash: u32) -> bool;

    /// The stored hash, if this slot keeps one.
    fn stored(&self) -> Option<u32>;
}

/// Slot for keys whose equality is as cheap as a hash comparison.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct NoHash;

impl HashSlot for NoHash {
    #[inline]
    fn new(_hash: u32) -> Self {
        NoHash
    }

    #[inline]
    fn may_match(&self, _hash: u32) -> bool {
        true
    }

    #[inline]
    fn stored(&self) -> Option<u32> {
        None
    }
}

/// Slot caching the 32-bit hash of a key with non-trivial equality.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CachedHash(u32);

impl HashSlot for CachedHash {
    #[inline]
    fn new(hash: u32) -> Self {
        CachedHash(hash)
    }

    #[inline]
    fn may_match(&self, hash: u32) -> bool {
        self.0 == hash
    }

    #[inline]
    fn stored(&self) -> Option<u32> {
        Some(self.0)
    }
}

/// Keys usable in a `ChainHashMap`.
///
/// Implementing this for your own key type is one line; pick `NoHash` only
/// when `Eq` is a handful of machine instructions:
///
/// ```
/// use chain_hashmap::{CachedHash, MapKey};
///
/// #[derive(Hash, PartialEq, Eq)]
/// struct Name(String);
///
/// impl MapKey for Name {
///     type Slot = CachedHash;
/// }
/// ```
pub trait MapKey: Hash + Eq {
    /// Hash storage kept in every node holding this key.
    type Slot: HashSlot;
}

macro_rules! scalar_keys {
    ($($t:ty),* $(,)?) => {
        $(impl MapKey for $t {
            type Slot = NoHash;
        })*
    };
}

scalar_keys!(
    u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, bool, char, (),
    NonZeroU8, NonZeroU16, NonZeroU32, NonZeroU64, NonZeroU128, NonZeroUsize,
    NonZeroI8, NonZeroI16, NonZeroI32, NonZeroI64, NonZeroI128, NonZeroIsize,
);

macro_rules! cached_keys {
    ($($t:ty),* $(,)?) => {
        $(impl MapKey for $t {
            type Slot = CachedHash;
        })*
    };
}

cached_keys!(String, PathBuf, OsString, CString);

impl<T: ?Sized + Hash + Eq> MapKey for &T {
    type Slot = CachedHash;
}

impl<T: Hash + Eq> MapKey for Vec<T> {
    type Slot = CachedHash;
}

impl<T: ?Sized + Hash + Eq> MapKey for Box<T> {
    type Slot = CachedHash;
}

impl<T: ?Sized + Hash + Eq> MapKey for Rc<T> {
    type Slot = CachedHash;
}

impl<T: ?Sized + Hash + Eq> MapKey for Arc<T> {
    type Slot = CachedHash;
}

impl<T: ?Sized + ToOwned + Hash + Eq> MapKey for Cow<'_, T> {
    type Slot = CachedHash;
}

impl<T: Hash + Eq> MapKey for Option<T> {
    type Slot = CachedHash;
}

impl<T: Hash + Eq, const N: usize> MapKey for [T; N] {
    type Slot = CachedHash;
}

macro_rules! tuple_keys {
    ($(($($n:ident),+)),* $(,)?) => {
        $(impl<$($n: Hash + Eq),+> MapKey for ($($n,)+) {
            type Slot = CachedHash;
        })*
    };
}

tuple_keys!((A), (A, B), (A, B, C), (A, B, C, D), (A, B, C, D, E), (A, B, C, D, E, F));
