//! Range: a non-owning inclusive cursor pair over the global order list.
//!
//! A `Range` names its first and last node. It is empty when `first` is
//! absent or when the node before `first` is `last`; popping from either
//! end therefore never needs an end marker node. Ranges are plain `Copy`
//! values: they stay meaningful across rehashing and sorting (nodes never
//! move), and degrade to empty when the node they start at is removed.

use crate::chain_hash_map::ChainHashMap;
use crate::key::MapKey;
use crate::node::Node;
use core::iter::FusedIterator;
use slotmap::{DefaultKey, SecondaryMap, SlotMap};

pub(crate) type Nodes<K, V> = SlotMap<DefaultKey, Node<K, V, <K as MapKey>::Slot>>;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Range {
    pub(crate) first: Option<DefaultKey>,
    pub(crate) last: Option<DefaultKey>,
}

impl Range {
    /// A range that is empty in every map.
    pub const fn empty() -> Self {
        Range {
            first: None,
            last: None,
        }
    }

    pub(crate) fn new(first: DefaultKey, last: Option<DefaultKey>) -> Self {
        Range {
            first: Some(first),
            last,
        }
    }

    pub(crate) fn is_empty_in<K: MapKey, V>(&self, nodes: &Nodes<K, V>) -> bool {
        match self.first.and_then(|k| nodes.get(k)) {
            None => true,
            Some(n) => n.prev == self.last,
        }
    }

    fn pop_first_in<'a, K: MapKey, V>(
        &mut self,
        nodes: &'a Nodes<K, V>,
    ) -> Option<(&'a K, &'a V)> {
        if self.is_empty_in(nodes) {
            return None;
        }
        let n = nodes.get(self.first?)?;
        self.first = n.next;
        Some((&n.key, &n.value))
    }

    fn pop_last_in<'a, K: MapKey, V>(
        &mut self,
        nodes: &'a Nodes<K, V>,
    ) -> Option<(&'a K, &'a V)> {
        if self.is_empty_in(nodes) {
            return None;
        }
        let n = nodes.get(self.last?)?;
        self.last = n.prev;
        Some((&n.key, &n.value))
    }

    pub fn is_empty<K: MapKey, V, S>(&self, map: &ChainHashMap<K, V, S>) -> bool {
        self.is_empty_in(map.nodes())
    }

    /// The entry this range starts at.
    pub fn first<'a, K: MapKey, V, S>(
        &self,
        map: &'a ChainHashMap<K, V, S>,
    ) -> Option<(&'a K, &'a V)> {
        if self.is_empty(map) {
            return None;
        }
        map.nodes().get(self.first?).map(|n| (&n.key, &n.value))
    }

    /// The entry this range ends at.
    pub fn last<'a, K: MapKey, V, S>(
        &self,
        map: &'a ChainHashMap<K, V, S>,
    ) -> Option<(&'a K, &'a V)> {
        if self.is_empty(map) {
            return None;
        }
        map.nodes().get(self.last?).map(|n| (&n.key, &n.value))
    }

    /// Advance past the first entry, returning it.
    pub fn pop_first<'a, K: MapKey, V, S>(
        &mut self,
        map: &'a ChainHashMap<K, V, S>,
    ) -> Option<(&'a K, &'a V)> {
        self.pop_first_in(map.nodes())
    }

    /// Retreat past the last entry, returning it.
    pub fn pop_last<'a, K: MapKey, V, S>(
        &mut self,
        map: &'a ChainHashMap<K, V, S>,
    ) -> Option<(&'a K, &'a V)> {
        self.pop_last_in(map.nodes())
    }

    pub fn first_value_mut<'a, K: MapKey, V, S>(
        &self,
        map: &'a mut ChainHashMap<K, V, S>,
    ) -> Option<&'a mut V> {
        if self.is_empty(map) {
            return None;
        }
        map.nodes_mut().get_mut(self.first?).map(|n| &mut n.value)
    }

    pub fn iter<'a, K: MapKey, V, S>(self, map: &'a ChainHashMap<K, V, S>) -> Iter<'a, K, V> {
        Iter::new(map.nodes(), self)
    }

    pub fn iter_mut<'a, K: MapKey, V, S>(
        self,
        map: &'a mut ChainHashMap<K, V, S>,
    ) -> IterMut<'a, K, V> {
        IterMut::new(map.nodes_mut(), self)
    }
}

/// Borrowing iterator over a range in global order.
pub struct Iter<'a, K: MapKey, V> {
    nodes: &'a Nodes<K, V>,
    range: Range,
}

impl<'a, K: MapKey, V> Iter<'a, K, V> {
    pub(crate) fn new(nodes: &'a Nodes<K, V>, range: Range) -> Self {
        Self { nodes, range }
    }

    /// What is left to visit.
    pub fn remaining(&self) -> Range {
        self.range
    }
}

impl<K: MapKey, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes,
            range: self.range,
        }
    }
}

impl<'a, K: MapKey, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.range.pop_first_in(self.nodes)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.range.is_empty_in(self.nodes) {
            (0, Some(0))
        } else {
            (1, Some(self.nodes.len()))
        }
    }
}

impl<K: MapKey, V> DoubleEndedIterator for Iter<'_, K, V> {
    #[inline]
    fn next_back(&mut self) -> Option<Self::Item> {
        self.range.pop_last_in(self.nodes)
    }
}

impl<K: MapKey, V> FusedIterator for Iter<'_, K, V> {}

/// Mutable iterator over a range in global order.
///
/// Splits the arena into per-node borrows up front, so building one costs a
/// pass over every live node.
pub struct IterMut<'a, K, V> {
    entries: SecondaryMap<DefaultKey, (&'a K, &'a mut V, Option<DefaultKey>)>,
    cur: Option<DefaultKey>,
    last: Option<DefaultKey>,
}

impl<'a, K: MapKey, V> IterMut<'a, K, V> {
    pub(crate) fn new(nodes: &'a mut Nodes<K, V>, range: Range) -> Self {
        let (cur, last) = if range.is_empty_in(nodes) {
            (None, None)
        } else {
            (range.first, range.last)
        };
        let entries = nodes
            .iter_mut()
            .map(|(k, n)| (k, (&n.key, &mut n.value, n.next)))
            .collect();
        Self { entries, cur, last }
    }
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        let k = self.cur?;
        let (key, value, next) = self.entries.remove(k)?;
        self.cur = if Some(k) == self.last { None } else { next };
        Some((key, value))
    }
}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

/// Keys in global order.
pub struct Keys<'a, K: MapKey, V>(pub(crate) Iter<'a, K, V>);

impl<'a, K: MapKey, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K: MapKey, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(k, _)| k)
    }
}

/// Values in global order.
pub struct Values<'a, K: MapKey, V>(pub(crate) Iter<'a, K, V>);

impl<'a, K: MapKey, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<K: MapKey, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.0.next_back().map(|(_, v)| v)
    }
}

/// Mutable values in global order.
pub struct ValuesMut<'a, K, V>(pub(crate) IterMut<'a, K, V>);

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(_, v)| v)
    }
}

/// Owning iterator in global order.
pub struct IntoIter<K: MapKey, V> {
    nodes: Nodes<K, V>,
    cur: Option<DefaultKey>,
}

impl<K: MapKey, V> IntoIter<K, V> {
    pub(crate) fn new(nodes: Nodes<K, V>, head: Option<DefaultKey>) -> Self {
        Self { nodes, cur: head }
    }
}

impl<K: MapKey, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.nodes.remove(self.cur?)?;
        self.cur = n.next;
        Some((n.key, n.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.nodes.len(), Some(self.nodes.len()))
    }
}

impl<K: MapKey, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K: MapKey, V> FusedIterator for IntoIter<K, V> {}
