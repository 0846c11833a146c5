//! ChainHashMap: chained buckets plus one global order list over a node arena.

use crate::directory::{Directory, Stats, INITIAL_BUCKETS};
use crate::key::{HashSlot, MapKey};
use crate::node::Node;
use crate::range::{IntoIter, Iter, IterMut, Keys, Nodes, Range, Values, ValuesMut};
use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::ops::Index;
use hashbrown::hash_map::DefaultHashBuilder;
use slotmap::{DefaultKey, SlotMap};

/// An insertion-ordered hash map with separate chaining.
///
/// Nodes live in a generational arena and never move; the directory only
/// holds chain heads. Iteration follows the global list, which starts in
/// insertion order and can be reordered in place with [`sort_by`].
///
/// [`sort_by`]: ChainHashMap::sort_by
pub struct ChainHashMap<K: MapKey, V, S = DefaultHashBuilder> {
    hasher: S,
    nodes: Nodes<K, V>,
    directory: Option<Directory>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
    initial_buckets: usize,
}

/// Why `rehash` refused a bucket count. The map is untouched in every case.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RehashError {
    Zero,
    NotPowerOfTwo(usize),
    BelowCount { requested: usize, count: usize },
}

impl fmt::Display for RehashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RehashError::Zero => f.write_str("bucket count must be non-zero"),
            RehashError::NotPowerOfTwo(n) => write!(f, "bucket count {n} is not a power of two"),
            RehashError::BelowCount { requested, count } => write!(
                f,
                "bucket count {requested} is below the element count {count}"
            ),
        }
    }
}

impl std::error::Error for RehashError {}

impl<K: MapKey, V> ChainHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }

    /// The first insert allocates `buckets` (rounded up to a power of two,
    /// at least 8) instead of the default 8.
    pub fn with_buckets(buckets: usize) -> Self {
        Self::with_buckets_and_hasher(buckets, Default::default())
    }
}

impl<K: MapKey, V, S: Default> Default for ChainHashMap<K, V, S> {
    fn default() -> Self {
        Self::with_hasher(S::default())
    }
}

// Structural operations: nothing here hashes a key.
impl<K: MapKey, V, S> ChainHashMap<K, V, S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_buckets_and_hasher(INITIAL_BUCKETS, hasher)
    }

    pub fn with_buckets_and_hasher(buckets: usize, hasher: S) -> Self {
        Self {
            hasher,
            nodes: SlotMap::with_key(),
            directory: None,
            head: None,
            tail: None,
            initial_buckets: buckets.max(INITIAL_BUCKETS).next_power_of_two(),
        }
    }

    pub(crate) fn nodes(&self) -> &Nodes<K, V> {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Nodes<K, V> {
        &mut self.nodes
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn len(&self) -> usize {
        let count = self.directory.as_ref().map_or(0, |d| d.count);
        debug_assert_eq!(count, self.nodes.len());
        count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buckets in the directory; 0 until the first insert or `rehash`.
    pub fn bucket_count(&self) -> usize {
        self.directory.as_ref().map_or(0, Directory::bucket_count)
    }

    pub fn load_factor(&self) -> f64 {
        match self.bucket_count() {
            0 => 0.0,
            n => self.len() as f64 / n as f64,
        }
    }

    /// Every entry, head to tail.
    pub fn range(&self) -> Range {
        match self.head {
            Some(h) => Range::new(h, self.tail),
            None => Range::empty(),
        }
    }

    pub fn first(&self) -> Option<(&K, &V)> {
        self.range().first(self)
    }

    pub fn last(&self) -> Option<(&K, &V)> {
        self.range().last(self)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(&self.nodes, self.range())
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        let range = self.range();
        IterMut::new(&mut self.nodes, range)
    }

    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys(self.iter())
    }

    pub fn values(&self) -> Values<'_, K, V> {
        Values(self.iter())
    }

    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut(self.iter_mut())
    }

    /// Drop every entry in global order. The directory keeps its size.
    pub fn clear(&mut self) {
        let mut cur = self.head.take();
        while let Some(k) = cur {
            cur = self.nodes.remove(k).and_then(|n| n.next);
        }
        self.tail = None;
        debug_assert!(self.nodes.is_empty());
        if let Some(d) = self.directory.as_mut() {
            d.reset_heads();
        }
    }

    /// Bucket occupancy. Read-only.
    pub fn stats(&self) -> Stats {
        match &self.directory {
            None => Stats::default(),
            Some(d) => {
                let nodes = &self.nodes;
                Stats::from_chains(d.count, d.chain_lengths(|k| nodes[k].down))
            }
        }
    }

    /// Reorder the global list. Buckets are untouched, so lookups are
    /// unaffected; entries inserted afterwards still go to the tail.
    pub fn sort_by<F>(&mut self, mut cmp: F)
    where
        F: FnMut((&K, &V), (&K, &V)) -> Ordering,
    {
        let mut order = self.order();
        let nodes = &self.nodes;
        order.sort_by(|&a, &b| {
            let (a, b) = (&nodes[a], &nodes[b]);
            cmp((&a.key, &a.value), (&b.key, &b.value))
        });
        self.relink_order(&order);
    }

    pub fn sort_by_key<T, F>(&mut self, mut f: F)
    where
        T: Ord,
        F: FnMut(&K, &V) -> T,
    {
        self.sort_by(|(ka, va), (kb, vb)| f(ka, va).cmp(&f(kb, vb)));
    }

    pub fn sort_keys(&mut self)
    where
        K: Ord,
    {
        self.sort_by(|(a, _), (b, _)| a.cmp(b));
    }

    fn order(&self) -> Vec<DefaultKey> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cur = self.head;
        while let Some(k) = cur {
            order.push(k);
            cur = self.nodes[k].next;
        }
        order
    }

    fn relink_order(&mut self, order: &[DefaultKey]) {
        let mut prev = None;
        for &k in order {
            let n = &mut self.nodes[k];
            n.prev = prev;
            n.next = None;
            if let Some(p) = prev {
                self.nodes[p].next = Some(k);
            }
            prev = Some(k);
        }
        self.head = order.first().copied();
        self.tail = order.last().copied();
    }

    fn link_tail(&mut self, k: DefaultKey) {
        self.nodes[k].prev = self.tail;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(k),
            None => self.head = Some(k),
        }
        self.tail = Some(k);
    }

    fn unlink_list(&mut self, k: DefaultKey) {
        let (prev, next) = {
            let n = &self.nodes[k];
            (n.prev, n.next)
        };
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
    }
}

impl<K: MapKey, V, S: BuildHasher> ChainHashMap<K, V, S> {
    #[inline]
    fn make_hash<Q>(&self, q: &Q) -> u32
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q) as u32
    }

    fn node_hash(&self, k: DefaultKey) -> Option<u32> {
        let n = self.nodes.get(k)?;
        Some(n.slot.stored().unwrap_or_else(|| self.make_hash(&n.key)))
    }

    fn find_key<Q>(&self, q: &Q, hash: u32) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut cur = self.directory.as_ref()?.head(hash);
        while let Some(k) = cur {
            let n = &self.nodes[k];
            if n.matches(hash, |key| key.borrow() == q) {
                return Some(k);
            }
            cur = n.down;
        }
        None
    }

    /// Range from the entry for `q` to the tail; empty on a miss.
    pub fn find<Q>(&self, q: &Q) -> Range
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        match self.find_key(q, self.make_hash(q)) {
            Some(k) => Range::new(k, self.tail),
            None => Range::empty(),
        }
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.get_key_value(q).map(|(_, v)| v)
    }

    pub fn get_key_value<Q>(&self, q: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.find_key(q, self.make_hash(q))?;
        let n = &self.nodes[k];
        Some((&n.key, &n.value))
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.find_key(q, self.make_hash(q))?;
        Some(&mut self.nodes[k].value)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find_key(q, self.make_hash(q)).is_some()
    }

    /// Insert or overwrite. An existing entry keeps its key and its place in
    /// the global order; only the value is replaced.
    pub fn insert(&mut self, key: K, value: V) -> Range {
        let hash = self.make_hash(&key);
        let k = match self.find_key(&key, hash) {
            Some(k) => {
                self.nodes[k].value = value;
                k
            }
            None => self.insert_node(key, value, hash),
        };
        Range::new(k, self.tail)
    }

    /// Insert only if `key` is absent. Either way the returned range starts
    /// at the entry for `key`.
    pub fn insert_new(&mut self, key: K, value: V) -> Range {
        let hash = self.make_hash(&key);
        let k = match self.find_key(&key, hash) {
            Some(k) => k,
            None => self.insert_node(key, value, hash),
        };
        Range::new(k, self.tail)
    }

    /// Value for `key`, inserting `default()` at the tail on a miss.
    pub fn get_or_insert_with<F>(&mut self, key: K, default: F) -> &mut V
    where
        F: FnOnce() -> V,
    {
        let hash = self.make_hash(&key);
        let k = match self.find_key(&key, hash) {
            Some(k) => k,
            None => self.insert_node(key, default(), hash),
        };
        &mut self.nodes[k].value
    }

    pub fn get_or_insert_default(&mut self, key: K) -> &mut V
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Caller guarantees `key` is absent.
    fn insert_node(&mut self, key: K, value: V, hash: u32) -> DefaultKey {
        let k = self.nodes.insert(Node::new(key, value, hash));
        self.link_tail(k);

        let initial = self.initial_buckets;
        let dir = self.directory.get_or_insert_with(|| {
            log::trace!("allocating directory with {initial} buckets");
            Directory::allocate(0, initial)
        });
        self.nodes[k].down = dir.head(hash);
        dir.set_head(hash, Some(k));
        dir.count += 1;

        if dir.count > dir.bucket_count() {
            let grown = dir.bucket_count() * 2;
            log::trace!("growing directory to {grown} buckets at {} entries", dir.count);
            self.relink(grown);
        }
        k
    }

    pub fn remove<Q>(&mut self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.remove_entry(q).is_some()
    }

    pub fn remove_entry<Q>(&mut self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let k = self.find_key(q, self.make_hash(q))?;
        self.remove_node(k)
    }

    /// Remove the entry `range` starts at and return the rest of `range`.
    ///
    /// `range` must come from this map and still start at a live entry;
    /// this is only checked in debug builds; release builds treat a stale
    /// range as empty.
    pub fn remove_range(&mut self, range: Range) -> Range {
        debug_assert!(
            range.first.map_or(true, |k| self.nodes.contains_key(k)),
            "remove_range called with a stale range"
        );
        if range.is_empty_in(&self.nodes) {
            return Range::empty();
        }
        let Some(first) = range.first else {
            return Range::empty();
        };
        let rest = if range.last == Some(first) {
            Range::empty()
        } else {
            Range {
                first: self.nodes[first].next,
                last: range.last,
            }
        };
        self.remove_node(first);
        rest
    }

    /// Keep only the entries for which `f` returns `true`, visiting them in
    /// global order.
    pub fn retain<F>(&mut self, mut f: F)
    where
        F: FnMut(&K, &mut V) -> bool,
    {
        let mut cur = self.head;
        while let Some(k) = cur {
            let n = &mut self.nodes[k];
            cur = n.next;
            if !f(&n.key, &mut n.value) {
                self.remove_node(k);
            }
        }
    }

    fn remove_node(&mut self, k: DefaultKey) -> Option<(K, V)> {
        let hash = self.node_hash(k)?;
        let dir = self.directory.as_mut()?;

        let mut prev: Option<DefaultKey> = None;
        let mut cur = dir.head(hash);
        while let Some(c) = cur {
            if c == k {
                break;
            }
            prev = Some(c);
            cur = self.nodes[c].down;
        }
        debug_assert_eq!(cur, Some(k), "node missing from its bucket chain");

        let down = self.nodes[k].down;
        match prev {
            Some(p) => self.nodes[p].down = down,
            None => dir.set_head(hash, down),
        }
        dir.count -= 1;

        self.unlink_list(k);
        self.nodes.remove(k).map(|n| (n.key, n.value))
    }

    /// Rebuild the directory with exactly `bucket_count` buckets.
    ///
    /// Nodes stay where they are, so ranges survive. Never shrinks below the
    /// current element count; `clear` followed by a small `rehash` is the way
    /// to release a large directory.
    pub fn rehash(&mut self, bucket_count: usize) -> Result<(), RehashError> {
        let count = self.len();
        let checked = if bucket_count == 0 {
            Err(RehashError::Zero)
        } else if !bucket_count.is_power_of_two() {
            Err(RehashError::NotPowerOfTwo(bucket_count))
        } else if bucket_count < count {
            Err(RehashError::BelowCount {
                requested: bucket_count,
                count,
            })
        } else {
            Ok(())
        };
        if let Err(e) = checked {
            log::debug!("rehash rejected: {e}");
            return Err(e);
        }
        self.relink(bucket_count);
        log::debug!("rehashed to {bucket_count} buckets: {}", self.stats());
        Ok(())
    }

    /// Replace the directory and thread every node's `down` link into it.
    fn relink(&mut self, bucket_count: usize) {
        let mut dir = Directory::allocate(self.nodes.len(), bucket_count);
        let mut cur = self.head;
        while let Some(k) = cur {
            let Some(hash) = self.node_hash(k) else {
                break;
            };
            let n = &mut self.nodes[k];
            n.down = dir.head(hash);
            dir.set_head(hash, Some(k));
            cur = n.next;
        }
        self.directory = Some(dir);
    }
}

#[cfg(test)]
impl<K: MapKey, V, S: BuildHasher> ChainHashMap<K, V, S> {
    /// Walk both link structures and check they agree with each other.
    pub(crate) fn check_invariants(&self) {
        let Some(dir) = &self.directory else {
            assert!(self.nodes.is_empty());
            assert!(self.head.is_none() && self.tail.is_none());
            return;
        };
        assert!(dir.bucket_count().is_power_of_two());
        assert!(dir.count <= dir.bucket_count());
        assert_eq!(dir.count, self.nodes.len());

        let mut in_list = slotmap::SecondaryMap::new();
        let mut prev = None;
        let mut cur = self.head;
        while let Some(k) = cur {
            let n = &self.nodes[k];
            assert_eq!(n.prev, prev, "prev link out of sync");
            assert!(in_list.insert(k, ()).is_none(), "cycle in global list");
            prev = Some(k);
            cur = n.next;
        }
        assert_eq!(self.tail, prev);
        assert_eq!(in_list.len(), dir.count);

        let mut in_chain = 0;
        for (k, n) in &self.nodes {
            let hash = self.node_hash(k).unwrap_or_default();
            assert_eq!(self.make_hash(&n.key), hash, "cached hash is stale");
            let mut c = dir.head(hash);
            let mut found = false;
            while let Some(ck) = c {
                found |= ck == k;
                c = self.nodes[ck].down;
            }
            assert!(found, "node missing from its bucket");
        }
        for h in 0..dir.bucket_count() as u32 {
            let mut c = dir.head(h);
            while let Some(ck) = c {
                in_chain += 1;
                c = self.nodes[ck].down;
            }
        }
        assert_eq!(in_chain, dir.count, "node in more than one chain");
    }
}

impl<K, V, S> fmt::Debug for ChainHashMap<K, V, S>
where
    K: MapKey + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S> Clone for ChainHashMap<K, V, S>
where
    K: MapKey + Clone,
    V: Clone,
    S: BuildHasher + Clone,
{
    /// Same entries in the same order, with the same bucket count.
    fn clone(&self) -> Self {
        let buckets = self.initial_buckets.max(self.bucket_count());
        let mut out = Self::with_buckets_and_hasher(buckets, self.hasher.clone());
        out.initial_buckets = self.initial_buckets;
        if self.directory.is_some() {
            out.directory = Some(Directory::allocate(0, buckets));
        }
        let mut cur = self.head;
        while let Some(k) = cur {
            let n = &self.nodes[k];
            let hash = n.slot.stored().unwrap_or_else(|| self.make_hash(&n.key));
            out.insert_node(n.key.clone(), n.value.clone(), hash);
            cur = n.next;
        }
        out
    }
}

impl<K, V, S> PartialEq for ChainHashMap<K, V, S>
where
    K: MapKey,
    V: PartialEq,
    S: BuildHasher,
{
    /// Same keys mapped to equal values; order is not compared.
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(k, v)| other.get(k).map_or(false, |ov| v == ov))
    }
}

impl<K, V, S> Eq for ChainHashMap<K, V, S>
where
    K: MapKey,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for ChainHashMap<K, V, S>
where
    K: MapKey + Borrow<Q>,
    Q: ?Sized + Hash + Eq,
    S: BuildHasher,
{
    type Output = V;

    /// Panics if `key` is absent.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not present in ChainHashMap")
    }
}

impl<K: MapKey, V, S: BuildHasher> Extend<(K, V)> for ChainHashMap<K, V, S> {
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: MapKey, V, S: BuildHasher + Default> FromIterator<(K, V)> for ChainHashMap<K, V, S> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut m = Self::default();
        m.extend(iter);
        m
    }
}

impl<K: MapKey, V, S> IntoIterator for ChainHashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self.nodes, self.head)
    }
}

impl<'a, K: MapKey, V, S> IntoIterator for &'a ChainHashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K: MapKey, V, S> IntoIterator for &'a mut ChainHashMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::hash::Hasher;
    use std::rc::Rc;

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
        } // every key lands in bucket 0
    }

    /// Counts `Eq` calls so tests can see whether the cached hash filtered a probe.
    #[derive(Debug)]
    struct Probe {
        id: u32,
        hash: u32,
        eq_calls: Rc<Cell<usize>>,
    }
    impl PartialEq for Probe {
        fn eq(&self, other: &Self) -> bool {
            self.eq_calls.set(self.eq_calls.get() + 1);
            self.id == other.id
        }
    }
    impl Eq for Probe {}
    impl Hash for Probe {
        fn hash<H: Hasher>(&self, state: &mut H) {
            state.write_u32(self.hash);
        }
    }
    impl MapKey for Probe {
        type Slot = crate::key::CachedHash;
    }

    /// Hashes `u32` input to itself, so tests can pick buckets.
    #[derive(Clone, Default)]
    struct IdentityBuildHasher;
    struct IdentityHasher(u64);
    impl BuildHasher for IdentityBuildHasher {
        type Hasher = IdentityHasher;
        fn build_hasher(&self) -> Self::Hasher {
            IdentityHasher(0)
        }
    }
    impl Hasher for IdentityHasher {
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 = (self.0 << 8) | b as u64;
            }
        }
        fn write_u32(&mut self, n: u32) {
            self.0 = n as u64;
        }
        fn finish(&self) -> u64 {
            self.0
        }
    }

    fn keys_in_order<K: MapKey + Clone, V, S>(m: &ChainHashMap<K, V, S>) -> Vec<K> {
        m.keys().cloned().collect()
    }

    /// Invariant: upsert keeps one entry per key and the latest value wins.
    #[test]
    fn insert_overwrites_existing_value() {
        let mut m: ChainHashMap<i32, &str> = ChainHashMap::new();
        m.insert(1, "a");
        m.insert(2, "b");
        m.insert(1, "c");
        assert_eq!(m.len(), 2);
        assert_eq!(m.find(&1).first(&m), Some((&1, &"c")));
        assert_eq!(m.find(&2).first(&m), Some((&2, &"b")));
        assert_eq!(keys_in_order(&m), vec![1, 2]);
    }

    /// Invariant: `insert_new` never touches an existing entry.
    #[test]
    fn insert_new_is_idempotent() {
        let mut m: ChainHashMap<String, i32> = ChainHashMap::new();
        let r1 = m.insert_new("k".to_string(), 1);
        let r2 = m.insert_new("k".to_string(), 2);
        assert_eq!(r1, r2);
        assert_eq!(m.len(), 1);
        assert_eq!(m.get("k"), Some(&1));
    }

    /// Invariant: the returned range runs from the affected entry to the tail.
    #[test]
    fn insert_range_extends_to_tail() {
        let mut m: ChainHashMap<u32, u32> = ChainHashMap::new();
        for i in 0..5 {
            m.insert(i, i * 10);
        }
        let r = m.insert(2, 99);
        let seen: Vec<_> = r.iter(&m).map(|(k, v)| (*k, *v)).collect();
        assert_eq!(seen, vec![(2, 99), (3, 30), (4, 40)]);
        assert_eq!(r.last(&m), Some((&4, &40)));
    }

    /// Invariant: the directory is lazy and starts at 8 buckets.
    #[test]
    fn directory_allocated_on_first_insert() {
        let mut m: ChainHashMap<u8, ()> = ChainHashMap::new();
        assert_eq!(m.bucket_count(), 0);
        assert!(m.find(&1).is_empty(&m));
        m.insert(1, ());
        assert_eq!(m.bucket_count(), INITIAL_BUCKETS);
    }

    /// Invariant: the ninth key doubles 8 buckets to 16, once, and nothing is lost.
    #[test]
    fn ninth_insert_doubles_buckets() {
        let mut m: ChainHashMap<u64, u64> = ChainHashMap::new();
        for i in 0..8 {
            m.insert(i, i);
        }
        assert_eq!(m.bucket_count(), 8);
        m.insert(8, 8);
        assert_eq!(m.bucket_count(), 16);
        for i in 0..9 {
            assert_eq!(m.get(&i), Some(&i));
        }
    }

    #[test]
    fn with_buckets_rounds_up() {
        let mut m: ChainHashMap<u32, ()> = ChainHashMap::with_buckets(100);
        m.insert(0, ());
        assert_eq!(m.bucket_count(), 128);
        let mut small: ChainHashMap<u32, ()> = ChainHashMap::with_buckets(2);
        small.insert(0, ());
        assert_eq!(small.bucket_count(), 8);
    }

    /// Invariant: a cached-hash key with a different hash in the same bucket
    /// never reaches `Eq`.
    #[test]
    fn cached_hash_filters_eq_in_chain() {
        let calls = Rc::new(Cell::new(0));
        let probe = |id, hash| Probe {
            id,
            hash,
            eq_calls: calls.clone(),
        };
        let mut m: ChainHashMap<Probe, i32, IdentityBuildHasher> =
            ChainHashMap::with_hasher(IdentityBuildHasher);
        // 1 and 9 share bucket 1 of 8.
        m.insert(probe(1, 1), 10);
        m.insert(probe(2, 9), 20);
        calls.set(0);
        assert_eq!(m.get(&probe(1, 1)), Some(&10));
        assert_eq!(calls.get(), 1);
        assert_eq!(m.get(&probe(3, 17)), None);
        assert_eq!(calls.get(), 1);
    }

    /// Invariant: with every key colliding, lookup still resolves by equality.
    #[test]
    fn full_collisions_resolve_by_eq() {
        let mut m: ChainHashMap<String, i32, ConstBuildHasher> =
            ChainHashMap::with_hasher(ConstBuildHasher);
        for i in 0..20 {
            m.insert(format!("k{i}"), i);
        }
        for i in 0..20 {
            assert_eq!(m.get(format!("k{i}").as_str()), Some(&i));
        }
        let s = m.stats();
        assert_eq!(s.max_load, 20);
        assert_eq!(s.free_buckets, s.bucket_count - 1);

        // Removing from the middle, head and tail of a single chain.
        assert!(m.remove("k10"));
        assert!(m.remove("k19"));
        assert!(m.remove("k0"));
        assert_eq!(m.len(), 17);
        for i in (1..19).filter(|&i| i != 10) {
            assert_eq!(m.get(format!("k{i}").as_str()), Some(&i));
        }
    }

    /// Invariant: removal drops exactly one entry and leaves the rest intact.
    #[test]
    fn remove_existing_and_missing() {
        let mut m: ChainHashMap<u32, String> = ChainHashMap::new();
        for i in 0..10 {
            m.insert(i, i.to_string());
        }
        assert!(m.remove(&4));
        assert!(!m.remove(&4));
        assert!(!m.remove(&42));
        assert_eq!(m.len(), 9);
        assert!(m.find(&4).is_empty(&m));
        for i in (0..10).filter(|&i| i != 4) {
            assert_eq!(m.get(&i), Some(&i.to_string()));
        }
        assert_eq!(keys_in_order(&m), vec![0, 1, 2, 3, 5, 6, 7, 8, 9]);
        assert_eq!(m.remove_entry(&9), Some((9, "9".to_string())));
        assert_eq!(m.last(), Some((&8, &"8".to_string())));
    }

    /// Invariant: `remove_range` hands back the range past the removed entry.
    #[test]
    fn remove_range_walks_forward() {
        let mut m: ChainHashMap<u32, ()> = (0..6).map(|i| (i, ())).collect();
        let mut r = m.find(&2);
        r = m.remove_range(r);
        assert_eq!(r.first(&m), Some((&3, &())));
        while !r.is_empty(&m) {
            r = m.remove_range(r);
        }
        assert_eq!(keys_in_order(&m), vec![0, 1]);
        assert!(m.remove_range(Range::empty()).is_empty(&m));
    }

    /// Invariant: a range whose last entry is removed through it ends there.
    #[test]
    fn remove_range_single_entry() {
        let mut m: ChainHashMap<u32, ()> = (0..3).map(|i| (i, ())).collect();
        let mut r = m.find(&0);
        r.pop_last(&m);
        r.pop_last(&m);
        assert_eq!(r.iter(&m).count(), 1);
        let rest = m.remove_range(r);
        assert!(rest.is_empty(&m));
        assert_eq!(keys_in_order(&m), vec![1, 2]);
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "stale range")]
    fn remove_range_stale_panics_in_debug() {
        let mut m: ChainHashMap<u32, ()> = ChainHashMap::new();
        let r = m.insert(1, ());
        m.remove(&1);
        m.remove_range(r);
    }

    /// Invariant: clear keeps capacity and the map is reusable.
    #[test]
    fn clear_keeps_directory() {
        let mut m: ChainHashMap<u32, u32> = (0..100).map(|i| (i, i)).collect();
        let buckets = m.bucket_count();
        m.clear();
        assert!(m.is_empty());
        assert_eq!(m.bucket_count(), buckets);
        assert!(m.first().is_none());
        assert_eq!(m.stats().free_buckets, buckets);
        m.insert(7, 7);
        assert_eq!(keys_in_order(&m), vec![7]);
    }

    /// Invariant: invalid rehash targets are rejected without mutation.
    #[test]
    fn rehash_validation() {
        let mut m: ChainHashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
        assert_eq!(m.bucket_count(), 16);
        assert_eq!(m.rehash(0), Err(RehashError::Zero));
        assert_eq!(m.rehash(24), Err(RehashError::NotPowerOfTwo(24)));
        assert_eq!(
            m.rehash(8),
            Err(RehashError::BelowCount {
                requested: 8,
                count: 10
            })
        );
        assert_eq!(m.bucket_count(), 16);
        assert_eq!(m.rehash(64), Ok(()));
        assert_eq!(m.bucket_count(), 64);
        assert!((0..10).all(|i| m.get(&i) == Some(&i)));
    }

    /// Invariant: ranges over the global list survive a rehash.
    #[test]
    fn range_survives_rehash() {
        let mut m: ChainHashMap<String, u32> = ChainHashMap::new();
        for i in 0..5 {
            m.insert(i.to_string(), i);
        }
        let r = m.find("2");
        m.rehash(1024).unwrap();
        let vals: Vec<u32> = r.iter(&m).map(|(_, v)| *v).collect();
        assert_eq!(vals, vec![2, 3, 4]);
    }

    /// Invariant: shrinking is only possible after clear.
    #[test]
    fn clear_then_shrink() {
        let mut m: ChainHashMap<u32, ()> = (0..1000).map(|i| (i, ())).collect();
        assert_eq!(m.bucket_count(), 1024);
        assert!(m.rehash(8).is_err());
        m.clear();
        assert_eq!(m.rehash(8), Ok(()));
        assert_eq!(m.bucket_count(), 8);
    }

    #[test]
    fn rehash_allocates_empty_map() {
        let mut m: ChainHashMap<u32, ()> = ChainHashMap::new();
        m.rehash(32).unwrap();
        assert_eq!(m.bucket_count(), 32);
        m.insert(1, ());
        assert_eq!(m.bucket_count(), 32);
    }

    /// Invariant: sorting changes iteration order only; later inserts append.
    #[test]
    fn sort_then_append() {
        let mut m: ChainHashMap<u32, &str> = ChainHashMap::new();
        for (k, v) in [(3, "c"), (1, "a"), (2, "b")] {
            m.insert(k, v);
        }
        m.sort_keys();
        assert_eq!(keys_in_order(&m), vec![1, 2, 3]);
        m.insert(0, "z");
        assert_eq!(keys_in_order(&m), vec![1, 2, 3, 0]);
        assert_eq!(m.get(&0), Some(&"z"));
        m.sort_by(|(_, a), (_, b)| b.cmp(a));
        assert_eq!(keys_in_order(&m), vec![0, 3, 2, 1]);
        let back: Vec<u32> = m.keys().rev().copied().collect();
        assert_eq!(back, vec![1, 2, 3, 0]);
        for k in 0..4 {
            assert!(m.contains_key(&k));
        }
    }

    #[test]
    fn sort_by_key_on_values() {
        let mut m: ChainHashMap<&str, i32> = ChainHashMap::new();
        m.insert("x", 5);
        m.insert("y", -1);
        m.insert("z", 3);
        m.sort_by_key(|_, v| *v);
        assert_eq!(m.values().copied().collect::<Vec<_>>(), vec![-1, 3, 5]);
        assert_eq!(m.first(), Some((&"y", &-1)));
    }

    /// Invariant: `get_or_insert_default` is upsert-or-default.
    #[test]
    fn get_or_insert_default_counts() {
        let mut m: ChainHashMap<&str, usize> = ChainHashMap::new();
        for w in ["a", "b", "a", "c", "a"] {
            *m.get_or_insert_default(w) += 1;
        }
        assert_eq!(m["a"], 3);
        assert_eq!(m["b"], 1);
        assert_eq!(keys_in_order(&m), vec!["a", "b", "c"]);
    }

    #[test]
    fn get_or_insert_with_is_lazy() {
        let mut m: ChainHashMap<u32, u32> = ChainHashMap::new();
        let calls = Cell::new(0);
        let mut make = || {
            calls.set(calls.get() + 1);
            7
        };
        assert_eq!(*m.get_or_insert_with(1, &mut make), 7);
        assert_eq!(*m.get_or_insert_with(1, &mut make), 7);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn retain_in_order() {
        let mut m: ChainHashMap<u32, u32> = (0..20).map(|i| (i, i)).collect();
        let mut visited = Vec::new();
        m.retain(|k, v| {
            visited.push(*k);
            *v += 1;
            k % 3 == 0
        });
        assert_eq!(visited, (0..20).collect::<Vec<_>>());
        assert_eq!(keys_in_order(&m), vec![0, 3, 6, 9, 12, 15, 18]);
        assert_eq!(m.get(&9), Some(&10));
        assert!(!m.contains_key(&10));
    }

    #[test]
    fn iter_mut_and_values_mut() {
        let mut m: ChainHashMap<u32, u32> = (0..5).map(|i| (i, i)).collect();
        for (k, v) in m.iter_mut() {
            *v += *k;
        }
        for v in m.values_mut() {
            *v *= 10;
        }
        assert_eq!(m.values().copied().collect::<Vec<_>>(), vec![0, 20, 40, 60, 80]);
        let r = m.find(&3);
        for (_, v) in r.iter_mut(&mut m) {
            *v = 0;
        }
        assert_eq!(m.values().copied().collect::<Vec<_>>(), vec![0, 20, 40, 0, 0]);
        if let Some(v) = m.find(&1).first_value_mut(&mut m) {
            *v = 1;
        }
        assert_eq!(m[&1], 1);
    }

    #[test]
    fn into_iter_yields_insertion_order() {
        let mut m: ChainHashMap<String, u32> = ChainHashMap::new();
        for k in ["delta", "alpha", "charlie", "bravo"] {
            m.insert(k.to_string(), k.len() as u32);
        }
        m.remove("alpha");
        let it = m.into_iter();
        assert_eq!(it.len(), 3);
        let keys: Vec<String> = it.map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["delta", "charlie", "bravo"]);
    }

    #[test]
    fn clone_and_eq() {
        let mut m: ChainHashMap<String, u32> = ChainHashMap::new();
        for i in 0..40 {
            m.insert(format!("{i:03}"), i);
        }
        let c = m.clone();
        assert_eq!(c, m);
        assert_eq!(c.bucket_count(), m.bucket_count());
        assert_eq!(keys_in_order(&c), keys_in_order(&m));

        let mut sorted = m.clone();
        sorted.sort_by(|(a, _), (b, _)| b.cmp(a));
        assert_eq!(sorted, m);
        sorted.insert("000".to_string(), 99);
        assert_ne!(sorted, m);
    }

    #[test]
    fn debug_lists_entries_in_order() {
        let mut m: ChainHashMap<u8, char> = ChainHashMap::new();
        m.insert(2, 'b');
        m.insert(1, 'a');
        assert_eq!(format!("{m:?}"), "{2: 'b', 1: 'a'}");
    }

    #[test]
    #[should_panic(expected = "key not present")]
    fn index_missing_panics() {
        let m: ChainHashMap<u8, u8> = ChainHashMap::new();
        let _ = m[&3];
    }

    /// Invariant: each entry is dropped exactly once by remove, clear, and drop.
    #[test]
    fn values_dropped_once() {
        let token = Rc::new(());
        {
            let mut m: ChainHashMap<u32, Rc<()>> = ChainHashMap::new();
            for i in 0..30 {
                m.insert(i, token.clone());
            }
            assert_eq!(Rc::strong_count(&token), 31);
            m.insert(0, token.clone());
            assert_eq!(Rc::strong_count(&token), 31);
            m.remove(&1);
            assert_eq!(Rc::strong_count(&token), 30);
            m.clear();
            assert_eq!(Rc::strong_count(&token), 1);
            for i in 0..5 {
                m.insert(i, token.clone());
            }
        }
        assert_eq!(Rc::strong_count(&token), 1);
    }

    #[test]
    fn stats_track_load() {
        let mut m: ChainHashMap<u32, (), IdentityBuildHasher> =
            ChainHashMap::with_hasher(IdentityBuildHasher);
        assert_eq!(m.stats(), Stats::default());
        // Buckets 0, 0, 1 of 8.
        m.insert(0, ());
        m.insert(8, ());
        m.insert(1, ());
        let s = m.stats();
        assert_eq!(s.count, 3);
        assert_eq!(s.bucket_count, 8);
        assert_eq!(s.free_buckets, 6);
        assert_eq!(s.max_load, 2);
        assert_eq!(s.histogram, vec![6, 1, 1]);
        assert!((s.average_load - 1.5).abs() < 1e-9);
        assert!((m.load_factor() - 0.375).abs() < 1e-9);
    }
}
