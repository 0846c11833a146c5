//! Node: one key/value pair threaded into two intrusive lists.

use crate::key::HashSlot;
use slotmap::DefaultKey;

/// A live entry. `down` chains nodes sharing a bucket (singly linked,
/// newest first); `prev`/`next` thread every node into the global order.
#[derive(Debug)]
pub(crate) struct Node<K, V, H> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) slot: H,
    pub(crate) down: Option<DefaultKey>,
    pub(crate) prev: Option<DefaultKey>,
    pub(crate) next: Option<DefaultKey>,
}

impl<K, V, H: HashSlot> Node<K, V, H> {
    pub(crate) fn new(key: K, value: V, hash: u32) -> Self {
        Self {
            key,
            value,
            slot: H::new(hash),
            down: None,
            prev: None,
            next: None,
        }
    }

    /// Full comparison against a probe: the slot's O(1) pre-check first,
    /// then `eq` only if the slot cannot rule the node out.
    #[inline]
    pub(crate) fn matches(&self, hash: u32, eq: impl FnOnce(&K) -> bool) -> bool {
        self.slot.may_match(hash) && eq(&self.key)
    }
}
