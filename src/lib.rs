//! chain-hashmap: a single-threaded, insertion-ordered hash map with
//! separate chaining, stable node handles and cached key hashes.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: amortized O(1) insert/find/remove with an iteration order that
//!   does not depend on bucket layout, and cheap collision handling for
//!   keys whose equality is expensive.
//! - Layers:
//!   - `key`: compile-time choice of per-node hash storage. Scalar keys
//!     store nothing (`NoHash`); every other key caches its 32-bit hash
//!     (`CachedHash`) so chain probes reject mismatches without `Eq`.
//!   - `node`: one key/value pair with two overlaid link sets: `down` for
//!     its bucket chain and `prev`/`next` for the global order list.
//!   - `directory`: the bucket-head array plus the element count.
//!   - `range`: `Copy` cursor pairs over the global list, and the iterators
//!     built on them.
//!   - `ChainHashMap<K, V, S>`: the public facade.
//!
//! Constraints
//! - Single-threaded; no interior mutability, no atomics.
//! - Nodes live in a `slotmap` arena. Links are generational keys, so a
//!   removed node's handle never resolves to a later entry.
//! - The bucket count is always a power of two and never below the element
//!   count: an insert that would exceed it doubles the directory first.
//! - The directory is allocated lazily, with 8 buckets by default.
//!
//! Ordering
//! - Inserts append to the tail of the global list; upserts keep their
//!   position. `sort_by` reorders the list once; it does not keep later
//!   inserts sorted.
//! - Rehashing relinks `down` pointers only. Nodes never move, so a
//!   `Range` stays valid across rehashes and sorts.
//!
//! Failure semantics
//! - `rehash` returns `RehashError` for zero, non power of two, or too
//!   small bucket counts and leaves the map untouched.
//! - Misses are `None`, `false` or an empty `Range`; nothing panics except
//!   `Index` on a missing key.
//! - Using a `Range` after removing its first entry is a caller bug: a
//!   debug assertion in `remove_range`, an empty range elsewhere.
//!
//! Notes and non-goals
//! - No automatic shrinking; `clear` keeps the directory so a refill does
//!   not reallocate. `clear` followed by a small `rehash` shrinks it.
//! - There is no shared "default value" returned on a miss; `get` returns
//!   `Option<&V>`.

pub mod chain_hash_map;
mod chain_hash_map_proptest;
mod directory;
pub mod key;
mod node;
pub mod range;

// Public surface
pub use chain_hash_map::{ChainHashMap, RehashError};
pub use directory::{Stats, INITIAL_BUCKETS};
pub use key::{CachedHash, HashSlot, MapKey, NoHash};
pub use range::Range;
