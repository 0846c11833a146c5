#![cfg(test)]

// Property tests for ChainHashMap kept inside the crate so they can check
// the internal link structure after every operation.

use crate::chain_hash_map::{ChainHashMap, RehashError};
use crate::key::{CachedHash, MapKey};
use proptest::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}
impl MapKey for Key {
    type Slot = CachedHash;
}

#[derive(Clone, Debug)]
enum OpI {
    Insert(usize, i32),
    InsertNew(usize, i32),
    Upsert(usize, i32),
    Remove(usize),
    RemoveFirst,
    Find(usize),
    Contains(String),
    Rehash(u8),
    SortKeys,
    Clear,
    Iterate,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<OpI>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=24).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            6 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::Insert(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| OpI::InsertNew(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| OpI::Upsert(i, d)),
            3 => idx.clone().prop_map(OpI::Remove),
            1 => Just(OpI::RemoveFirst),
            2 => idx.clone().prop_map(OpI::Find),
            1 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(OpI::Contains),
            1 => (0u8..8).prop_map(OpI::Rehash),
            1 => Just(OpI::SortKeys),
            1 => Just(OpI::Clear),
            1 => Just(OpI::Iterate),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (pool.clone(), ops))
    })
}

// State-machine equivalence against a HashMap plus an order vector.
// Invariants exercised after every op:
// - `len` equals the number of distinct live keys.
// - Every live key is findable, its range starts at it, and holds the latest value.
// - Iteration order equals the model order (insertion order, or the sorted
//   order followed by later inserts).
// - `bucket_count` is a power of two and never below `len`.
// - Both link structures agree (`check_invariants`).
fn run_scenario<S: BuildHasher + Clone>(
    sut: &mut ChainHashMap<Key, i32, S>,
    pool: &[String],
    ops: Vec<OpI>,
) -> Result<(), TestCaseError> {
    let mut model: HashMap<Key, i32> = HashMap::new();
    let mut order: Vec<Key> = Vec::new();

    for op in ops {
        match op {
            OpI::Insert(i, v) => {
                let k = key_from(pool, i);
                let r = sut.insert(k.clone(), v);
                prop_assert_eq!(r.first(sut), Some((&k, &v)));
                if model.insert(k.clone(), v).is_none() {
                    order.push(k);
                }
            }
            OpI::InsertNew(i, v) => {
                let k = key_from(pool, i);
                let before = sut.len();
                let r = sut.insert_new(k.clone(), v);
                let expected = *model.entry(k.clone()).or_insert_with(|| {
                    order.push(k.clone());
                    v
                });
                prop_assert_eq!(r.first(sut), Some((&k, &expected)));
                prop_assert_eq!(sut.len(), model.len());
                prop_assert!(sut.len() == before || sut.len() == before + 1);
            }
            OpI::Upsert(i, d) => {
                let k = key_from(pool, i);
                let v = sut.get_or_insert_default(k.clone());
                *v = v.wrapping_add(d);
                let m = model.entry(k.clone()).or_insert_with(|| {
                    order.push(k.clone());
                    0
                });
                *m = m.wrapping_add(d);
            }
            OpI::Remove(i) => {
                let k = key_from(pool, i);
                let removed = sut.remove_entry(&k);
                prop_assert_eq!(removed.map(|(_, v)| v), model.remove(&k));
                order.retain(|o| o != &k);
                prop_assert!(sut.find(&k).is_empty(sut));
            }
            OpI::RemoveFirst => {
                let rest = sut.remove_range(sut.range());
                if !order.is_empty() {
                    let k = order.remove(0);
                    model.remove(&k);
                }
                prop_assert_eq!(rest.first(sut).map(|(k, _)| k), order.first());
            }
            OpI::Find(i) => {
                let k = key_from(pool, i);
                let r = sut.find(&k);
                prop_assert_eq!(r.first(sut).map(|(_, v)| v), model.get(&k));
                if let Some(pos) = order.iter().position(|o| o == &k) {
                    let tail: Vec<&Key> = r.iter(sut).map(|(k, _)| k).collect();
                    let expected: Vec<&Key> = order[pos..].iter().collect();
                    prop_assert_eq!(tail, expected);
                }
            }
            OpI::Contains(s) => {
                let has = sut.contains_key(s.as_str());
                prop_assert_eq!(has, model.contains_key(&Key(s)));
            }
            OpI::Rehash(shift) => {
                let n = 1usize << shift;
                let before = sut.bucket_count();
                match sut.rehash(n) {
                    Ok(()) => prop_assert_eq!(sut.bucket_count(), n),
                    Err(e) => {
                        prop_assert_eq!(
                            e,
                            RehashError::BelowCount {
                                requested: n,
                                count: model.len()
                            }
                        );
                        prop_assert_eq!(sut.bucket_count(), before);
                    }
                }
            }
            OpI::SortKeys => {
                sut.sort_keys();
                order.sort();
            }
            OpI::Clear => {
                let buckets = sut.bucket_count();
                sut.clear();
                model.clear();
                order.clear();
                prop_assert_eq!(sut.bucket_count(), buckets);
            }
            OpI::Iterate => {
                let back: Vec<&Key> = sut.keys().rev().collect();
                let expected: Vec<&Key> = order.iter().rev().collect();
                prop_assert_eq!(back, expected);
            }
        }

        sut.check_invariants();
        prop_assert_eq!(sut.len(), model.len());
        let seen: Vec<&Key> = sut.keys().collect();
        let expected: Vec<&Key> = order.iter().collect();
        prop_assert_eq!(seen, expected);
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
        let buckets = sut.bucket_count();
        prop_assert!(buckets == 0 || (buckets.is_power_of_two() && buckets >= sut.len()));
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        let mut sut: ChainHashMap<Key, i32> = ChainHashMap::new();
        run_scenario(&mut sut, &pool, ops)?;
    }
}

// Collision variant using a constant hasher to stress equality resolution.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Property: Same state-machine invariants as above, with every key in one
// chain. This stresses chain unlinking at the head, middle and tail.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        let mut sut: ChainHashMap<Key, i32, ConstBuildHasher> =
            ChainHashMap::with_hasher(ConstBuildHasher);
        run_scenario(&mut sut, &pool, ops)?;
    }
}

// Property: scalar keys (no cached hash) keep the same findability and
// growth guarantees across random inserts and removals.
proptest! {
    #[test]
    fn prop_scalar_keys_growth(keys in proptest::collection::vec(0u16..512, 1..300)) {
        let mut sut: ChainHashMap<u16, usize> = ChainHashMap::new();
        let mut model: HashMap<u16, usize> = HashMap::new();
        for (i, k) in keys.iter().copied().enumerate() {
            if i % 4 == 3 {
                prop_assert_eq!(sut.remove(&k), model.remove(&k).is_some());
            } else {
                let before = sut.bucket_count();
                sut.insert(k, i);
                model.insert(k, i);
                let after = sut.bucket_count();
                prop_assert!(after == before || after == (before * 2).max(8));
            }
            prop_assert_eq!(sut.len(), model.len());
        }
        sut.check_invariants();
        for (k, v) in &model {
            prop_assert_eq!(sut.get(k), Some(v));
        }
    }
}

/// Hash is a function of the key only: the same key in two maps with the
/// same hasher lands in the same bucket.
#[test]
fn hash_is_hasher_dependent_only() {
    let mut a: ChainHashMap<Key, i32, ConstBuildHasher> =
        ChainHashMap::with_hasher(ConstBuildHasher);
    let mut b: ChainHashMap<Key, i32, ConstBuildHasher> =
        ChainHashMap::with_hasher(ConstBuildHasher);
    for (i, k) in ["x", "y", "z"].iter().enumerate() {
        a.insert(Key(k.to_string()), i as i32);
        b.insert(Key(k.to_string()), i as i32);
    }
    assert_eq!(a.stats(), b.stats());
    a.check_invariants();
}
