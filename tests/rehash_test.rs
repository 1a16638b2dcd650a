use zincir::HashMap;

fn filled(buckets: usize, keys: impl Iterator<Item = i32>) -> HashMap<i32, i32> {
    let map = HashMap::with_buckets(buckets);
    for i in keys {
        map.insert(i * i, 2 * i);
    }
    map
}

#[test]
fn test_equality_ignores_bucket_count_and_order() {
    let ascending = filled(5, 1..=10);
    let descending = filled(7, (1..=10).rev());
    assert_eq!(ascending, descending);
    assert_eq!(descending, ascending);
}

#[test]
fn test_equality_basics() {
    let a: HashMap<i32, i32> = HashMap::with_buckets(5);
    let b: HashMap<i32, i32> = HashMap::with_buckets(9);
    assert_eq!(a, a);
    assert_eq!(a, b);

    a.insert(1, 1);
    assert_ne!(a, b);

    b.insert(1, 2);
    assert_ne!(a, b);

    b.insert(1, 1);
    assert_eq!(a, b);
}

#[test]
fn test_rehash_preserves_contents() {
    let mut map = filled(5, 1..=10);
    let snapshot = map.clone();

    map.rehash(3);
    assert_eq!(map.bucket_count(), 3);
    assert_eq!(map.len(), 10);
    assert_eq!(map, snapshot);
    assert_eq!(map.get(&49), Some(14));

    map.rehash(11);
    assert_eq!(map.bucket_count(), 11);
    assert_eq!(map, snapshot);
}

#[test]
fn test_rehash_same_count_is_noop() {
    let mut map = filled(5, 1..=10);
    let snapshot = map.clone();
    map.rehash(5);
    assert_eq!(map.bucket_count(), 5);
    assert_eq!(map, snapshot);
}

#[test]
fn test_rehash_to_single_bucket() {
    let mut map = filled(5, 1..=10);
    map.rehash(1);
    assert_eq!(map.bucket_count(), 1);
    assert_eq!(map.len(), 10);
    assert_eq!(map.bucket_len(0), 10);
    for i in 1..=10 {
        assert_eq!(map.get(&(i * i)), Some(2 * i));
    }
}

#[test]
fn test_clone_is_deep() {
    let source = filled(5, 1..=10);
    let copy = source.clone();
    assert_eq!(copy, source);
    assert_eq!(copy.bucket_count(), source.bucket_count());

    source.remove(&49);
    assert_eq!(copy.len(), 10);
    assert_eq!(copy.get(&49), Some(14));
    assert_ne!(copy, source);
}

#[test]
fn test_clone_assignment() {
    let source = filled(5, 1..=10);
    let mut target = filled(3, 1..=2);
    assert_ne!(target, source);
    target = source.clone();
    assert_eq!(target, source);
    assert_eq!(target.bucket_count(), 5);
}

#[test]
fn test_swap_exchanges_contents() {
    let mut a = filled(5, 1..=10);
    let mut b: HashMap<i32, i32> = HashMap::with_buckets(3);
    b.insert(100, 1);

    a.swap(&mut b);

    assert_eq!(a.len(), 1);
    assert_eq!(a.bucket_count(), 3);
    assert_eq!(a.get(&100), Some(1));

    assert_eq!(b.len(), 10);
    assert_eq!(b.bucket_count(), 5);
    assert_eq!(b.get(&49), Some(14));
}

#[test]
fn test_clear_then_refill_after_rehash() {
    let mut map = filled(5, 1..=10);
    map.rehash(4);
    map.clear();
    assert!(map.is_empty());
    assert_eq!(map.bucket_count(), 4);

    for i in 1..=10 {
        map.insert(i, i);
    }
    assert_eq!(map.len(), 10);
}
