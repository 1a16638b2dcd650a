//! The bucket table: a fixed-size array of chained buckets plus the map's
//! immutable configuration and the element counter.

use core::hash::{BuildHasher, Hash};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::bucket::Bucket;

/// A fixed set of buckets with the sentinels linked forward through the
/// array, so the whole table reads as one chained list. Immutable after
/// construction except for the chains themselves and the element counter.
pub(crate) struct Table<K, V, S> {
    buckets: Box<[Bucket<K, V>]>,
    len: AtomicUsize,
    pub(crate) hash_builder: S,
}

impl<K, V, S> Table<K, V, S> {
    pub(crate) fn new(bucket_count: usize, hash_builder: S) -> Self {
        assert!(bucket_count > 0, "a hash map needs at least one bucket");

        let mut buckets: Box<[Bucket<K, V>]> =
            (0..bucket_count).map(|_| Bucket::new()).collect();

        // The slice is at its final address now; wire up the forward links
        // and close each empty circle.
        let base = buckets.as_mut_ptr();
        for i in 0..bucket_count {
            let next_bucket = if i + 1 < bucket_count {
                unsafe { base.add(i + 1) as *const Bucket<K, V> }
            } else {
                core::ptr::null()
            };
            unsafe { (*base.add(i)).link(next_bucket) };
        }

        Table {
            buckets,
            len: AtomicUsize::new(0),
            hash_builder,
        }
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub(crate) fn buckets(&self) -> &[Bucket<K, V>] {
        &self.buckets
    }

    #[inline]
    pub(crate) fn bucket_at(&self, index: usize) -> &Bucket<K, V> {
        &self.buckets[index]
    }

    #[inline]
    pub(crate) fn bucket_index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    #[inline]
    pub(crate) fn bucket_for(&self, hash: u64) -> &Bucket<K, V> {
        &self.buckets[self.bucket_index(hash)]
    }

    #[inline]
    pub(crate) fn hash_of<Q>(&self, key: &Q) -> u64
    where
        S: BuildHasher,
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub(crate) fn set_len(&self, len: usize) {
        self.len.store(len, Ordering::Release);
    }

    /// Credits one linked node. Called by the thread whose publishing CAS
    /// succeeded, so any observer of the new count also observes the link.
    #[inline]
    pub(crate) fn node_linked(&self) {
        self.len.fetch_add(1, Ordering::Release);
    }

    /// Debits one unlinked node. Called only by the unlinking thread.
    #[inline]
    pub(crate) fn node_unlinked(&self) {
        self.len.fetch_sub(1, Ordering::Release);
    }
}
