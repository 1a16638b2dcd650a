//! Iterators over the map.
//!
//! Both iterator types own an epoch guard and a raw pointer to their current
//! node. The guard keeps every node loaded through it allocated, so a
//! position stays readable even if the element is removed concurrently; the
//! walk simply ends early when it runs into a node that has been severed
//! from its chain.
//!
//! [`Iter`] is the global iterator: on reaching a sentinel it chases the
//! sentinel's next-bucket link and continues in the following bucket, so the
//! whole table reads as one sequence. [`BucketIter`] never leaves its
//! bucket; its end position is the bucket's sentinel. Equality between any
//! two iterators is node identity, and [`before`](Iter::before) gives an
//! arbitrary but total address order for use as a sort key.

use core::marker::PhantomData;
use core::sync::atomic::Ordering;

use crossbeam_epoch::{Guard, Shared};

use crate::node::Node;

/// Follows a just-loaded successor, skipping sentinels across buckets until
/// it reaches a data node or falls off the last bucket.
pub(crate) fn skip_sentinels<'g, K, V>(
    mut cur: Shared<'g, Node<K, V>>,
    guard: &'g Guard,
) -> *const Node<K, V> {
    loop {
        if cur.is_null() {
            // A severed node; the walk cannot continue.
            return core::ptr::null();
        }
        let node = unsafe { cur.deref() };
        if !node.is_sentinel() {
            return cur.as_raw();
        }
        let next_bucket = node.next_bucket();
        if next_bucket.is_null() {
            return core::ptr::null();
        }
        cur = unsafe { &*next_bucket }.first(guard);
    }
}

/// An iterator over all entries of a [`HashMap`](crate::HashMap).
///
/// Yields `(key, value)` clones. The end position is detached from any node;
/// [`is_end`](Iter::is_end) reports it. Created by
/// [`HashMap::iter`](crate::HashMap::iter) and
/// [`HashMap::find`](crate::HashMap::find).
pub struct Iter<'a, K, V> {
    guard: Guard,
    node: *const Node<K, V>,
    _marker: PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(guard: Guard, node: *const Node<K, V>) -> Self {
        debug_assert!(node.is_null() || !unsafe { &*node }.is_sentinel());
        Iter {
            guard,
            node,
            _marker: PhantomData,
        }
    }

    /// Whether this iterator is past the last element.
    #[inline]
    pub fn is_end(&self) -> bool {
        self.node.is_null()
    }

    /// The key at the current position, or `None` at the end.
    pub fn key(&self) -> Option<&K> {
        if self.node.is_null() {
            return None;
        }
        Some(unsafe { &*self.node }.key())
    }

    /// A snapshot of the value at the current position, or `None` at the
    /// end. Reads the value slot at call time, so concurrent assignments to
    /// this entry are visible.
    pub fn value(&self) -> Option<V>
    where
        V: Clone,
    {
        if self.node.is_null() {
            return None;
        }
        Some(unsafe { &*self.node }.read_value(&self.guard))
    }

    /// An arbitrary but total order on positions (by node address), usable
    /// as a key in ordered collections of iterators.
    pub fn before(&self, other: &Self) -> bool {
        (self.node as usize) < (other.node as usize)
    }

    pub(crate) fn node(&self) -> *const Node<K, V> {
        self.node
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        if self.node.is_null() {
            return None;
        }
        let node = unsafe { &*self.node };
        let item = (node.key().clone(), node.read_value(&self.guard));
        let next = node.next.load(Ordering::Acquire, &self.guard);
        self.node = skip_sentinels(next, &self.guard);
        Some(item)
    }
}

impl<'a, 'b, K, V> PartialEq<Iter<'b, K, V>> for Iter<'a, K, V> {
    fn eq(&self, other: &Iter<'b, K, V>) -> bool {
        self.node == other.node
    }
}

impl<'a, 'b, K, V> PartialEq<BucketIter<'b, K, V>> for Iter<'a, K, V> {
    fn eq(&self, other: &BucketIter<'b, K, V>) -> bool {
        self.node == other.node
    }
}

/// An iterator over the entries of a single bucket.
///
/// Yields `(key, value)` clones and never crosses into another bucket: the
/// bucket's own sentinel is the end position, so the range stays valid even
/// while the tail of the bucket moves under concurrent insertions. Created
/// by [`HashMap::bucket_iter`](crate::HashMap::bucket_iter),
/// [`HashMap::bucket_end`](crate::HashMap::bucket_end) and
/// [`HashMap::equal_range`](crate::HashMap::equal_range).
pub struct BucketIter<'a, K, V> {
    guard: Guard,
    node: *const Node<K, V>,
    _marker: PhantomData<&'a (K, V)>,
}

impl<'a, K, V> BucketIter<'a, K, V> {
    pub(crate) fn new(guard: Guard, node: *const Node<K, V>) -> Self {
        BucketIter {
            guard,
            node,
            _marker: PhantomData,
        }
    }

    /// Whether this iterator is at its bucket's end.
    pub fn is_end(&self) -> bool {
        self.node.is_null() || unsafe { &*self.node }.is_sentinel()
    }

    /// The key at the current position, or `None` at the end.
    pub fn key(&self) -> Option<&K> {
        if self.is_end() {
            return None;
        }
        Some(unsafe { &*self.node }.key())
    }

    /// A snapshot of the value at the current position, or `None` at the
    /// end.
    pub fn value(&self) -> Option<V>
    where
        V: Clone,
    {
        if self.is_end() {
            return None;
        }
        Some(unsafe { &*self.node }.read_value(&self.guard))
    }

    /// An arbitrary but total order on positions (by node address).
    pub fn before(&self, other: &Self) -> bool {
        (self.node as usize) < (other.node as usize)
    }

    /// Converts this bucket-local iterator into a global one at the same
    /// element. Converting an end iterator is a precondition violation: a
    /// bucket end does not correspond to any global position.
    pub fn into_global(self) -> Iter<'a, K, V> {
        debug_assert!(
            self.node.is_null() || !unsafe { &*self.node }.is_sentinel(),
            "a bucket end iterator has no global counterpart"
        );
        Iter::new(self.guard, self.node)
    }
}

impl<'a, K, V> Iterator for BucketIter<'a, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = (K, V);

    fn next(&mut self) -> Option<(K, V)> {
        if self.is_end() {
            return None;
        }
        let node = unsafe { &*self.node };
        let item = (node.key().clone(), node.read_value(&self.guard));
        // Stop as-is on the sentinel or on a severed node's null.
        self.node = node.next.load(Ordering::Acquire, &self.guard).as_raw();
        Some(item)
    }
}

impl<'a, 'b, K, V> PartialEq<BucketIter<'b, K, V>> for BucketIter<'a, K, V> {
    fn eq(&self, other: &BucketIter<'b, K, V>) -> bool {
        self.node == other.node
    }
}

impl<'a, 'b, K, V> PartialEq<Iter<'b, K, V>> for BucketIter<'a, K, V> {
    fn eq(&self, other: &Iter<'b, K, V>) -> bool {
        self.node == other.node
    }
}

/// An iterator over the keys of a [`HashMap`](crate::HashMap).
pub struct Keys<'a, K, V> {
    pub(crate) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = K;

    fn next(&mut self) -> Option<K> {
        self.inner.next().map(|(k, _)| k)
    }
}

/// An iterator over the values of a [`HashMap`](crate::HashMap).
pub struct Values<'a, K, V> {
    pub(crate) inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V>
where
    K: Clone,
    V: Clone,
{
    type Item = V;

    fn next(&mut self) -> Option<V> {
        self.inner.next().map(|(_, v)| v)
    }
}
