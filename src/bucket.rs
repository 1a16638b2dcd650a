//! Buckets: circular, sentinel-anchored chains traversed lock-free.
//!
//! Each bucket is a singly-linked circle. The sentinel is permanent and
//! inline; an empty bucket's sentinel points at itself, and a populated one
//! reaches the sentinel again after the last data node. New nodes are linked
//! only at the tail (the slot whose `next` is the sentinel), which is what
//! lets a single compare-and-exchange serialise racing insertions of the
//! same key. A data node whose `next` is null is reserved by an in-flight
//! removal; traversals that run into one restart from the sentinel.

use core::borrow::Borrow;
use core::sync::atomic::Ordering;

use crossbeam_epoch::{Guard, Shared};
use crossbeam_utils::Backoff;

use crate::node::Node;

pub(crate) struct Bucket<K, V> {
    sentinel: Node<K, V>,
}

/// Outcome of a bucket search.
///
/// `prev` is the node whose `next` was observed to reach the result, so it
/// is the CAS anchor for both insertion (`Tail`) and unlinking (`Hit`).
pub(crate) enum Search<'g, K, V> {
    Hit {
        prev: Shared<'g, Node<K, V>>,
        node: Shared<'g, Node<K, V>>,
    },
    Tail {
        prev: Shared<'g, Node<K, V>>,
    },
}

impl<K, V> Bucket<K, V> {
    pub(crate) fn new() -> Self {
        Bucket {
            sentinel: Node::sentinel(core::ptr::null()),
        }
    }

    /// Finishes construction once the bucket has its final address: records
    /// the forward bucket link and closes the empty circle.
    pub(crate) fn link(&mut self, next_bucket: *const Bucket<K, V>) {
        self.sentinel.set_next_bucket(next_bucket);
        let sentinel = &self.sentinel as *const Node<K, V>;
        self.sentinel.next.store(Shared::from(sentinel), Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn sentinel_ptr(&self) -> *const Node<K, V> {
        &self.sentinel
    }

    #[inline]
    pub(crate) fn sentinel_shared<'g>(&self) -> Shared<'g, Node<K, V>> {
        Shared::from(self.sentinel_ptr())
    }

    /// Loads the first node in the bucket: a data node, or the sentinel
    /// itself when the bucket is empty.
    #[inline]
    pub(crate) fn first<'g>(&self, guard: &'g Guard) -> Shared<'g, Node<K, V>> {
        self.sentinel.next.load(Ordering::Acquire, guard)
    }

    /// Quiescent head replacement, used while splicing into a table nobody
    /// else can reach yet (rehash, clone).
    #[inline]
    pub(crate) fn set_first(&self, node: Shared<'_, Node<K, V>>) {
        self.sentinel.next.store(node, Ordering::Relaxed);
    }

    /// Quiescent reset to the empty circle, detaching the current chain.
    pub(crate) fn reset(&self) {
        self.sentinel.next.store(self.sentinel_shared(), Ordering::Relaxed);
    }

    /// Walks the chain looking for `key`.
    ///
    /// Runs under the caller's pinned guard, so every loaded node stays
    /// allocated for the duration. Observing a null `next` means some node
    /// on the path is reserved by a concurrent removal and the walk cannot
    /// make progress; back off and restart from the sentinel.
    pub(crate) fn search<'g, Q>(&self, hash: u64, key: &Q, guard: &'g Guard) -> Search<'g, K, V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
    {
        let backoff = Backoff::new();
        'restart: loop {
            let mut prev = self.sentinel_shared();
            loop {
                let cur = unsafe { prev.deref() }.next.load(Ordering::Acquire, guard);
                if cur.is_null() {
                    backoff.snooze();
                    continue 'restart;
                }
                let node = unsafe { cur.deref() };
                if node.is_sentinel() {
                    debug_assert_eq!(
                        cur.as_raw(),
                        self.sentinel_ptr(),
                        "walked into a foreign bucket"
                    );
                    return Search::Tail { prev };
                }
                if node.hash() == hash && node.key().borrow() == key {
                    return Search::Hit { prev, node: cur };
                }
                prev = cur;
            }
        }
    }
}

impl<K, V> Drop for Bucket<K, V> {
    fn drop(&mut self) {
        // The chain owns itself through the circle; break it by walking once
        // around and freeing every data node. Runs with exclusive access.
        let guard = unsafe { crossbeam_epoch::unprotected() };
        let sentinel = self.sentinel_ptr();
        let mut cur = self.sentinel.next.load(Ordering::Relaxed, guard);
        while !cur.is_null() && cur.as_raw() != sentinel {
            let next = unsafe { cur.deref() }.next.load(Ordering::Relaxed, guard);
            drop(unsafe { cur.into_owned() });
            cur = next;
        }
    }
}
