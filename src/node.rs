//! Chain nodes: data entries and the per-bucket sentinels.

use core::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned};

use crate::bucket::Bucket;

/// A unit in a bucket chain.
///
/// Every node carries an atomic `next` pointer. A data node holds a cached
/// hash, the key and the mapped value; a sentinel node marks the end of its
/// bucket's circle and links to the following bucket so that global
/// iteration can hop across bucket boundaries.
pub(crate) struct Node<K, V> {
    pub(crate) next: Atomic<Node<K, V>>,
    kind: NodeKind<K, V>,
}

enum NodeKind<K, V> {
    Sentinel {
        next_bucket: *const Bucket<K, V>,
    },
    Data {
        hash: u64,
        key: K,
        // The value sits behind its own atomic pointer so that assignment
        // keeps node identity: readers observe either the old or the new
        // allocation, never a torn value.
        value: Atomic<V>,
    },
}

impl<K, V> Node<K, V> {
    pub(crate) fn sentinel(next_bucket: *const Bucket<K, V>) -> Self {
        Node {
            next: Atomic::null(),
            kind: NodeKind::Sentinel { next_bucket },
        }
    }

    pub(crate) fn data(hash: u64, key: K, value: V) -> Self {
        Node {
            next: Atomic::null(),
            kind: NodeKind::Data {
                hash,
                key,
                value: Atomic::new(value),
            },
        }
    }

    #[inline]
    pub(crate) fn is_sentinel(&self) -> bool {
        matches!(self.kind, NodeKind::Sentinel { .. })
    }

    /// The bucket following this sentinel's bucket, or null for the last.
    #[inline]
    pub(crate) fn next_bucket(&self) -> *const Bucket<K, V> {
        match self.kind {
            NodeKind::Sentinel { next_bucket } => next_bucket,
            NodeKind::Data { .. } => unreachable!("data nodes do not link buckets"),
        }
    }

    pub(crate) fn set_next_bucket(&mut self, bucket: *const Bucket<K, V>) {
        match &mut self.kind {
            NodeKind::Sentinel { next_bucket } => *next_bucket = bucket,
            NodeKind::Data { .. } => unreachable!("data nodes do not link buckets"),
        }
    }

    #[inline]
    pub(crate) fn hash(&self) -> u64 {
        match self.kind {
            NodeKind::Data { hash, .. } => hash,
            NodeKind::Sentinel { .. } => unreachable!("sentinel nodes carry no data"),
        }
    }

    #[inline]
    pub(crate) fn key(&self) -> &K {
        match &self.kind {
            NodeKind::Data { key, .. } => key,
            NodeKind::Sentinel { .. } => unreachable!("sentinel nodes carry no data"),
        }
    }

    #[inline]
    fn value_slot(&self) -> &Atomic<V> {
        match &self.kind {
            NodeKind::Data { value, .. } => value,
            NodeKind::Sentinel { .. } => unreachable!("sentinel nodes carry no data"),
        }
    }

    /// Snapshots the current value.
    pub(crate) fn read_value(&self, guard: &Guard) -> V
    where
        V: Clone,
    {
        let value = self.value_slot().load(Ordering::Acquire, guard);
        unsafe { value.deref() }.clone()
    }

    /// Replaces the value with a single atomic pointer swap and returns the
    /// previous one. The displaced allocation is retired, not freed, since
    /// pinned readers may still be looking at it.
    pub(crate) fn replace_value(&self, value: V, guard: &Guard) -> V
    where
        V: Clone,
    {
        let old = self.value_slot().swap(Owned::new(value), Ordering::AcqRel, guard);
        let previous = unsafe { old.deref() }.clone();
        unsafe { guard.defer_destroy(old) };
        previous
    }
}

impl<K, V> Drop for Node<K, V> {
    fn drop(&mut self) {
        if let NodeKind::Data { value, .. } = &self.kind {
            // By the time a node is destroyed no guard can reach it, so the
            // value allocation is released directly.
            let guard = unsafe { epoch::unprotected() };
            let value = value.load(Ordering::Relaxed, guard);
            if !value.is_null() {
                drop(unsafe { value.into_owned() });
            }
        }
    }
}
