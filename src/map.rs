//! The concurrent hash map façade.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::mem;
use core::sync::atomic::Ordering;

use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::Backoff;

use crate::bucket::Search;
use crate::iter::{skip_sentinels, BucketIter, Iter, Keys, Values};
use crate::node::Node;
use crate::table::Table;

/// The hasher used when none is supplied, a fast deterministic fold hash.
pub type DefaultHashBuilder = foldhash::fast::FixedState;

/// A lock-free concurrent hash map.
///
/// Keys are distributed over a fixed number of buckets; each bucket is a
/// circular singly-linked chain anchored by a permanent sentinel, mutated
/// exclusively through compare-and-exchange on per-node `next` pointers.
/// Insertions link only at the chain tail, removals run a two-phase
/// sever-then-unlink protocol, and `clear` swaps in a whole fresh bucket
/// table with a single compare-and-exchange. Unlinked nodes are reclaimed
/// through epoch guards, so readers never observe freed memory.
///
/// Lookups, insertions, assignments, removals, `clear` and iteration are
/// safe to call from any number of threads concurrently. Operations taking
/// `&mut self` ([`rehash`](HashMap::rehash), [`swap`](HashMap::swap)) are
/// exclusive by construction; [`Clone`] and `==` read without synchronising
/// and should not race with writers that care about a consistent snapshot.
///
/// The bucket count is fixed at construction and only changes through an
/// explicit [`rehash`](HashMap::rehash).
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use zincir::HashMap;
///
/// let map = Arc::new(HashMap::with_buckets(64));
///
/// let handles: Vec<_> = (0..4)
///     .map(|t| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.insert(t * 100 + i, i);
///             }
///         })
///     })
///     .collect();
/// for handle in handles {
///     handle.join().unwrap();
/// }
///
/// assert_eq!(map.len(), 400);
/// assert_eq!(map.get(&205), Some(5));
/// ```
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    table: Atomic<Table<K, V, S>>,
}

unsafe impl<K: Send, V: Send, S: Send> Send for HashMap<K, V, S> {}
unsafe impl<K: Send + Sync, V: Send + Sync, S: Sync> Sync for HashMap<K, V, S> {}

impl<K, V> HashMap<K, V, DefaultHashBuilder> {
    /// Creates an empty map with `bucket_count` buckets and the default
    /// hasher.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use zincir::HashMap;
    ///
    /// let map = HashMap::with_buckets(16);
    /// map.insert("meaning", 42);
    /// assert_eq!(map.get(&"meaning"), Some(42));
    /// assert_eq!(map.remove(&"meaning"), Some(42));
    /// assert!(map.is_empty());
    /// ```
    pub fn with_buckets(bucket_count: usize) -> Self {
        Self::with_buckets_and_hasher(bucket_count, DefaultHashBuilder::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map with `bucket_count` buckets and the given
    /// hasher.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    pub fn with_buckets_and_hasher(bucket_count: usize, hash_builder: S) -> Self {
        HashMap {
            table: Atomic::new(Table::new(bucket_count, hash_builder)),
        }
    }

    /// Snapshots the current table for the lifetime of `guard`.
    fn table_ref<'g>(&self, guard: &'g Guard) -> &'g Table<K, V, S> {
        let table = self.table.load(Ordering::Acquire, guard);
        debug_assert!(!table.is_null());
        unsafe { table.deref() }
    }

    /// Returns the number of elements.
    ///
    /// A snapshot: under concurrent churn the count may trail or lead
    /// in-flight operations, but any observed count covers at least that
    /// many completed insertions.
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        self.table_ref(&guard).len()
    }

    /// Whether the map holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of buckets.
    pub fn bucket_count(&self) -> usize {
        let guard = epoch::pin();
        self.table_ref(&guard).bucket_count()
    }

    /// The theoretical upper bound on the number of elements.
    pub fn max_len(&self) -> usize {
        usize::MAX
    }

    /// The theoretical upper bound on the number of buckets.
    pub fn max_bucket_count(&self) -> usize {
        usize::MAX
    }

    /// Returns a copy of the map's hasher.
    pub fn hasher(&self) -> S
    where
        S: Clone,
    {
        let guard = epoch::pin();
        self.table_ref(&guard).hash_builder.clone()
    }

    /// The number of elements currently in bucket `index`.
    ///
    /// Walks the bucket's chain, so this is linear in the bucket's size.
    ///
    /// # Panics
    ///
    /// Panics if `index >= bucket_count()`.
    pub fn bucket_len(&self, index: usize) -> usize {
        let guard = epoch::pin();
        let bucket = self.table_ref(&guard).bucket_at(index);
        let sentinel = bucket.sentinel_ptr();
        let mut count = 0;
        let mut cur = bucket.first(&guard);
        while !cur.is_null() && cur.as_raw() != sentinel {
            count += 1;
            cur = unsafe { cur.deref() }.next.load(Ordering::Acquire, &guard);
        }
        count
    }

    /// An iterator over all entries, in bucket order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let guard = epoch::pin();
        let first = {
            let table = self.table_ref(&guard);
            let head = table.bucket_at(0).first(&guard);
            skip_sentinels(head, &guard)
        };
        Iter::new(guard, first)
    }

    /// An iterator over all keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// An iterator over all values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// An iterator over the entries of bucket `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= bucket_count()`.
    pub fn bucket_iter(&self, index: usize) -> BucketIter<'_, K, V> {
        let guard = epoch::pin();
        let node = {
            let table = self.table_ref(&guard);
            table.bucket_at(index).first(&guard).as_raw()
        };
        BucketIter::new(guard, node)
    }

    /// The end position of bucket `index`, for comparison against iterators
    /// produced by [`bucket_iter`](HashMap::bucket_iter) and
    /// [`equal_range`](HashMap::equal_range).
    ///
    /// # Panics
    ///
    /// Panics if `index >= bucket_count()`.
    pub fn bucket_end(&self, index: usize) -> BucketIter<'_, K, V> {
        let guard = epoch::pin();
        let node = {
            let table = self.table_ref(&guard);
            table.bucket_at(index).sentinel_ptr()
        };
        BucketIter::new(guard, node)
    }

    /// Exchanges the contents of two maps, including bucket counts and
    /// hashers. Live iterators keep their elements and are afterwards
    /// associated with the opposite map.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.table, &mut other.table);
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    /// The index of the bucket that holds (or would hold) `key`.
    pub fn bucket_of<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + ?Sized,
    {
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        table.bucket_index(table.hash_of(key))
    }

    /// Returns a snapshot of the value for `key`, if present.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let hash = table.hash_of(key);
        match table.bucket_for(hash).search(hash, key, &guard) {
            Search::Hit { node, .. } => Some(unsafe { node.deref() }.read_value(&guard)),
            Search::Tail { .. } => None,
        }
    }

    /// Whether the map holds an entry for `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Returns a global iterator positioned at `key`'s entry, or at the end
    /// if the key is absent.
    pub fn find<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let node = {
            let table = self.table_ref(&guard);
            let hash = table.hash_of(key);
            match table.bucket_for(hash).search(hash, key, &guard) {
                Search::Hit { node, .. } => node.as_raw(),
                Search::Tail { .. } => core::ptr::null(),
            }
        };
        Iter::new(guard, node)
    }

    /// Returns the bucket-local range of entries matching `key`: a pair of
    /// iterators spanning at most one element, equal to each other when the
    /// key is absent.
    ///
    /// The bounds are bucket-local on purpose: the element after a match may
    /// sit in another bucket, and a global successor could not be resolved
    /// race-free. If the match is caught mid-removal the call retries until
    /// the chain is coherent again.
    pub fn equal_range<Q>(&self, key: &Q) -> (BucketIter<'_, K, V>, BucketIter<'_, K, V>)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let first_guard = epoch::pin();
        let second_guard = epoch::pin();
        let (first, second) = {
            let table = self.table_ref(&first_guard);
            let hash = table.hash_of(key);
            let bucket = table.bucket_for(hash);
            let backoff = Backoff::new();
            loop {
                match bucket.search(hash, key, &first_guard) {
                    Search::Tail { .. } => {
                        break (bucket.sentinel_ptr(), bucket.sentinel_ptr())
                    }
                    Search::Hit { node, .. } => {
                        let next =
                            unsafe { node.deref() }.next.load(Ordering::Acquire, &second_guard);
                        if next.is_null() {
                            // The match is reserved by an in-flight removal.
                            backoff.snooze();
                            continue;
                        }
                        break (node.as_raw(), next.as_raw());
                    }
                }
            }
        };
        (
            BucketIter::new(first_guard, first),
            BucketIter::new(second_guard, second),
        )
    }

    /// Inserts `key ↦ value`, assigning over the old value if the key is
    /// already present. Returns the previous value.
    ///
    /// Assignment replaces the value behind the existing node with a single
    /// atomic store; concurrent readers of the entry observe either value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let hash = table.hash_of(&key);
        let bucket = table.bucket_for(hash);
        let backoff = Backoff::new();
        loop {
            match bucket.search(hash, &key, &guard) {
                Search::Hit { node, .. } => {
                    return Some(unsafe { node.deref() }.replace_value(value, &guard));
                }
                Search::Tail { prev } => {
                    let new = Owned::new(Node::data(hash, key.clone(), value.clone()));
                    new.next.store(bucket.sentinel_shared(), Ordering::Relaxed);
                    match unsafe { prev.deref() }.next.compare_exchange(
                        bucket.sentinel_shared(),
                        new,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    ) {
                        Ok(_) => {
                            table.node_linked();
                            return None;
                        }
                        Err(e) => {
                            // The tail moved under us; reclaim and retry.
                            drop(e.new);
                            backoff.snooze();
                        }
                    }
                }
            }
        }
    }

    /// Inserts `key ↦ value` only if the key is absent. Returns a snapshot
    /// of the blocking value when one exists, leaving the map unchanged.
    pub fn insert_if_absent(&self, key: K, value: V) -> Option<V> {
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let hash = table.hash_of(&key);
        let bucket = table.bucket_for(hash);
        let backoff = Backoff::new();
        loop {
            match bucket.search(hash, &key, &guard) {
                Search::Hit { node, .. } => {
                    return Some(unsafe { node.deref() }.read_value(&guard));
                }
                Search::Tail { prev } => {
                    let new = Owned::new(Node::data(hash, key.clone(), value.clone()));
                    new.next.store(bucket.sentinel_shared(), Ordering::Relaxed);
                    match unsafe { prev.deref() }.next.compare_exchange(
                        bucket.sentinel_shared(),
                        new,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    ) {
                        Ok(_) => {
                            table.node_linked();
                            return None;
                        }
                        Err(e) => {
                            drop(e.new);
                            backoff.snooze();
                        }
                    }
                }
            }
        }
    }

    /// Returns the value for `key`, inserting `value` first if the key is
    /// absent.
    pub fn get_or_insert(&self, key: K, value: V) -> V {
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let hash = table.hash_of(&key);
        let bucket = table.bucket_for(hash);
        let backoff = Backoff::new();
        loop {
            match bucket.search(hash, &key, &guard) {
                Search::Hit { node, .. } => {
                    return unsafe { node.deref() }.read_value(&guard);
                }
                Search::Tail { prev } => {
                    let new = Owned::new(Node::data(hash, key.clone(), value.clone()));
                    new.next.store(bucket.sentinel_shared(), Ordering::Relaxed);
                    match unsafe { prev.deref() }.next.compare_exchange(
                        bucket.sentinel_shared(),
                        new,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                        &guard,
                    ) {
                        Ok(_) => {
                            table.node_linked();
                            return value;
                        }
                        Err(e) => {
                            drop(e.new);
                            backoff.snooze();
                        }
                    }
                }
            }
        }
    }

    /// Returns the value for `key`, inserting a default-constructed value
    /// first if the key is absent.
    pub fn get_or_default(&self, key: K) -> V
    where
        V: Default,
    {
        self.get_or_insert(key, V::default())
    }

    /// Removes `key`'s entry and returns its value.
    ///
    /// Removal is two-phase. The node's outgoing link is first atomically
    /// exchanged with null, reserving the node: traversals that reach it
    /// restart, tail insertions past it become impossible, and competing
    /// removals back off. The reserved node is then unlinked from its
    /// predecessor with a compare-and-exchange. The only way that unlink can
    /// fail is a concurrent removal of the predecessor (which leaves null in
    /// its place), so on failure the link is restored and the whole attempt
    /// retries.
    ///
    /// Returns only once the key is unobservable, even when a competing
    /// thread performs the actual unlink.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let table = self.table_ref(&guard);
        let hash = table.hash_of(key);
        let bucket = table.bucket_for(hash);
        let backoff = Backoff::new();
        loop {
            let (prev, cur) = match bucket.search(hash, key, &guard) {
                Search::Tail { .. } => return None,
                Search::Hit { prev, node } => (prev, node),
            };
            let node = unsafe { cur.deref() };

            // Phase one: reserve the node by severing its outgoing link.
            let next = node.next.swap(Shared::null(), Ordering::AcqRel, &guard);
            if next.is_null() {
                // Another thread owns this removal; wait until the node is
                // actually gone before reporting the key absent.
                backoff.snooze();
                continue;
            }

            // Phase two: unlink from the predecessor.
            match unsafe { prev.deref() }.next.compare_exchange(
                cur,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    table.node_unlinked();
                    let value = node.read_value(&guard);
                    unsafe { guard.defer_destroy(cur) };
                    return Some(value);
                }
                Err(e) => {
                    // Insertion happens at the tail and a competing removal
                    // of this node would have backed off on the reservation,
                    // so the predecessor itself must have been removed, and
                    // its removal left null behind.
                    debug_assert!(
                        e.current.is_null(),
                        "unlink failed against a live predecessor"
                    );
                    node.next.store(next, Ordering::Release);
                    backoff.snooze();
                }
            }
        }
    }

    /// Removes the entry at `pos` and returns an iterator to its successor.
    ///
    /// `pos` must point at a live element of this map. If the element is
    /// removed concurrently while this call runs, the iterator-validity
    /// precondition is violated; debug builds report it.
    ///
    /// # Panics
    ///
    /// Panics if `pos` is an end iterator.
    pub fn remove_at(&self, pos: &Iter<'_, K, V>) -> Iter<'_, K, V> {
        assert!(!pos.is_end(), "cannot remove at an end iterator");

        // Resolve the successor before removing, under a guard of its own.
        let next_guard = epoch::pin();
        let node = unsafe { &*pos.node() };
        let next = {
            let successor = node.next.load(Ordering::Acquire, &next_guard);
            skip_sentinels(successor, &next_guard)
        };

        let key = node.key().clone();
        let _removed = self.remove(&key);
        debug_assert!(
            _removed.is_some(),
            "iterator invalidated by a concurrent removal"
        );

        Iter::new(next_guard, next)
    }

    /// Removes every element by publishing a fresh, empty bucket table with
    /// one compare-and-exchange.
    ///
    /// If the publish loses a race against a concurrent `clear`, the other
    /// call has already produced the emptied state and this one returns
    /// quietly.
    pub fn clear(&self)
    where
        S: Clone,
    {
        let guard = epoch::pin();
        let current = self.table.load(Ordering::Acquire, &guard);
        let table = unsafe { current.deref() };
        let empty = Owned::new(Table::new(table.bucket_count(), table.hash_builder.clone()));
        match self.table.compare_exchange(
            current,
            empty,
            Ordering::AcqRel,
            Ordering::Acquire,
            &guard,
        ) {
            Ok(_) => unsafe { guard.defer_destroy(current) },
            Err(e) => drop(e.new),
        }
    }

    /// Changes the bucket count to `new_bucket_count`, redistributing every
    /// entry. A no-op when the count is unchanged.
    ///
    /// The existing nodes are spliced into the new table rather than copied,
    /// and their cached hashes make the redistribution hasher-free. The
    /// exclusive borrow is what makes this sound: no concurrent operation
    /// can hold a reference into either table.
    ///
    /// # Panics
    ///
    /// Panics if `new_bucket_count` is zero.
    pub fn rehash(&mut self, new_bucket_count: usize)
    where
        S: Clone,
    {
        assert!(new_bucket_count > 0, "cannot rehash to zero buckets");

        let guard = unsafe { epoch::unprotected() };
        let old_shared = self.table.load(Ordering::Relaxed, guard);
        let old = unsafe { old_shared.deref() };
        if old.bucket_count() == new_bucket_count {
            return;
        }

        let new_table = Table::new(new_bucket_count, old.hash_builder.clone());
        let mut moved = 0;
        for bucket in old.buckets() {
            let sentinel = bucket.sentinel_ptr();
            let mut cur = bucket.first(guard);
            // Detach the chain so the old bucket drops as an empty circle.
            bucket.reset();
            while cur.as_raw() != sentinel {
                debug_assert!(!cur.is_null(), "reserved node in a quiescent map");
                let node = unsafe { cur.deref() };
                let next = node.next.load(Ordering::Relaxed, guard);
                // Order is not preserved anyway, so splice at the head.
                let target = new_table.bucket_for(node.hash());
                node.next.store(target.first(guard), Ordering::Relaxed);
                target.set_first(cur);
                moved += 1;
                cur = next;
            }
        }
        new_table.set_len(moved);

        self.table.store(Owned::new(new_table), Ordering::Release);
        drop(unsafe { old_shared.into_owned() });
    }
}

impl<K, V, S> Drop for HashMap<K, V, S> {
    fn drop(&mut self) {
        let guard = unsafe { epoch::unprotected() };
        let table = self.table.load(Ordering::Relaxed, guard);
        if !table.is_null() {
            drop(unsafe { table.into_owned() });
        }
    }
}

impl<K, V, S> Clone for HashMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher + Clone,
{
    /// Deep-copies the map: fresh nodes, same bucket count, same hasher.
    ///
    /// Not synchronised against concurrent writers; the copy reflects some
    /// interleaving of them.
    fn clone(&self) -> Self {
        let guard = epoch::pin();
        let src = self.table_ref(&guard);
        let table = Table::new(src.bucket_count(), src.hash_builder.clone());
        let unprot = unsafe { epoch::unprotected() };
        for (index, bucket) in src.buckets().iter().enumerate() {
            let dst = table.bucket_at(index);
            let dst_sentinel = dst.sentinel_shared();
            let mut tail = dst_sentinel;
            let src_sentinel = bucket.sentinel_ptr();
            let mut cur = bucket.first(&guard);
            while !cur.is_null() && cur.as_raw() != src_sentinel {
                let node = unsafe { cur.deref() };
                let copy = Owned::new(Node::data(
                    node.hash(),
                    node.key().clone(),
                    node.read_value(&guard),
                ));
                copy.next.store(dst_sentinel, Ordering::Relaxed);
                let copy = copy.into_shared(unprot);
                unsafe { tail.deref() }.next.store(copy, Ordering::Relaxed);
                tail = copy;
                cur = node.next.load(Ordering::Acquire, &guard);
            }
        }
        table.set_len(src.len());
        HashMap {
            table: Atomic::new(table),
        }
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + PartialEq + 'static,
    S: BuildHasher,
{
    /// Two maps are equal when they hold the same key ↦ value associations,
    /// regardless of bucket count or hasher.
    ///
    /// Not synchronised against concurrent writers on either side.
    fn eq(&self, other: &Self) -> bool {
        if core::ptr::eq(self, other) {
            return true;
        }
        let self_guard = epoch::pin();
        let other_guard = epoch::pin();
        let lhs = self.table_ref(&self_guard);
        let rhs = other.table_ref(&other_guard);
        if lhs.len() == 0 && rhs.len() == 0 {
            return true;
        }
        if lhs.len() != rhs.len() {
            return false;
        }
        // Keys are unique on both sides and the sizes match, so walking one
        // side and probing the other decides equality.
        for bucket in lhs.buckets() {
            let sentinel = bucket.sentinel_ptr();
            let mut cur = bucket.first(&self_guard);
            while !cur.is_null() && cur.as_raw() != sentinel {
                let node = unsafe { cur.deref() };
                let hash = rhs.hash_of(node.key());
                match rhs.bucket_for(hash).search(hash, node.key(), &other_guard) {
                    Search::Hit { node: found, .. } => {
                        let found = unsafe { found.deref() };
                        if found.read_value(&other_guard) != node.read_value(&self_guard) {
                            return false;
                        }
                    }
                    Search::Tail { .. } => return false,
                }
                cur = node.next.load(Ordering::Acquire, &self_guard);
            }
        }
        true
    }
}

impl<K, V, S> Eq for HashMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + Eq + 'static,
    S: BuildHasher,
{
}

impl<K, V, S> fmt::Debug for HashMap<K, V, S>
where
    K: Hash + Eq + Clone + fmt::Debug + 'static,
    V: Clone + fmt::Debug + 'static,
    S: BuildHasher,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S>
where
    K: Hash + Eq + Clone + 'static,
    V: Clone + 'static,
    S: BuildHasher,
{
    type Item = (K, V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
