//! Directory: bucket heads plus the element count, owned by the map.

use core::fmt;
use slotmap::DefaultKey;

/// Bucket count of the first allocation.
pub const INITIAL_BUCKETS: usize = 8;

/// Chain heads indexed by `hash & (bucket_count - 1)`.
///
/// The header (`count`, and the bucket count as the slice length) sits next
/// to the one heap allocation holding the heads.
#[derive(Debug)]
pub(crate) struct Directory {
    pub(crate) count: usize,
    heads: Box<[Option<DefaultKey>]>,
}

impl Directory {
    /// Fresh directory with every head empty. Dropping the previous one
    /// (if any) is the caller's business.
    pub(crate) fn allocate(count: usize, bucket_count: usize) -> Self {
        assert!(
            bucket_count.is_power_of_two(),
            "bucket count must be a power of two"
        );
        Self {
            count,
            heads: vec![None; bucket_count].into_boxed_slice(),
        }
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    pub(crate) fn bucket_of(&self, hash: u32) -> usize {
        (hash as usize) & (self.heads.len() - 1)
    }

    #[inline]
    pub(crate) fn head(&self, hash: u32) -> Option<DefaultKey> {
        self.heads[self.bucket_of(hash)]
    }

    #[inline]
    pub(crate) fn set_head(&mut self, hash: u32, head: Option<DefaultKey>) {
        let b = self.bucket_of(hash);
        self.heads[b] = head;
    }

    /// Empty every bucket, keeping the allocation.
    pub(crate) fn reset_heads(&mut self) {
        self.heads.fill(None);
        self.count = 0;
    }

    /// Chain length per bucket, computed by following `down` links.
    pub(crate) fn chain_lengths<'a>(
        &'a self,
        down: impl Fn(DefaultKey) -> Option<DefaultKey> + 'a,
    ) -> impl Iterator<Item = usize> + 'a {
        self.heads.iter().map(move |&head| {
            let mut len = 0;
            let mut cur = head;
            while let Some(k) = cur {
                len += 1;
                cur = down(k);
            }
            len
        })
    }
}

/// Bucket occupancy snapshot returned by `ChainHashMap::stats`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    /// Live entries.
    pub count: usize,
    /// Buckets in the directory; 0 before the first insert.
    pub bucket_count: usize,
    /// Buckets with an empty chain.
    pub free_buckets: usize,
    /// Longest chain.
    pub max_load: usize,
    /// Mean chain length over non-empty buckets.
    pub average_load: f64,
    /// `count / bucket_count`.
    pub load_factor: f64,
    /// `histogram[n]` is the number of buckets whose chain holds `n` nodes.
    pub histogram: Vec<usize>,
}

impl Stats {
    pub(crate) fn from_chains(count: usize, chains: impl Iterator<Item = usize>) -> Self {
        let mut stats = Stats {
            count,
            ..Stats::default()
        };
        for len in chains {
            stats.bucket_count += 1;
            if len == 0 {
                stats.free_buckets += 1;
            }
            stats.max_load = stats.max_load.max(len);
            if stats.histogram.len() <= len {
                stats.histogram.resize(len + 1, 0);
            }
            stats.histogram[len] += 1;
        }
        let used = stats.bucket_count - stats.free_buckets;
        if used > 0 {
            stats.average_load = count as f64 / used as f64;
        }
        if stats.bucket_count > 0 {
            stats.load_factor = count as f64 / stats.bucket_count as f64;
        }
        stats
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} entries in {} buckets ({} free), max chain {}, avg chain {:.2}",
            self.count, self.bucket_count, self.free_buckets, self.max_load, self.average_load
        )
    }
}
