use std::collections::HashMap as StdHashMap;
use std::sync::Arc;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use zincir::HashMap;

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_insert_read() {
    let map = Arc::new(HashMap::with_buckets(128));
    let mut handles = vec![];

    for t in 0..4i64 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                let key = t * 1000 + i;
                m.insert(key, key * 2);
            }
        }));
    }

    for _ in 0..4 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                let _ = m.get(&500);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), 4000);
    for t in 0..4i64 {
        for i in 0..1000 {
            let key = t * 1000 + i;
            assert_eq!(map.get(&key), Some(key * 2));
        }
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_remove_disjoint() {
    let map = Arc::new(HashMap::with_buckets(64));
    for i in 0..4000 {
        map.insert(i, i);
    }

    let mut handles = vec![];
    for t in 0..4 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..1000 {
                assert!(m.remove(&(t * 1000 + i)).is_some());
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert!(map.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_remove_same_keys() {
    // All threads fight over the same keys; each removal must be won by
    // exactly one thread.
    let map = Arc::new(HashMap::with_buckets(2));
    for i in 0..512 {
        map.insert(i, i);
    }

    let mut handles = vec![];
    for _ in 0..8 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            let mut won = 0usize;
            for i in 0..512 {
                if m.remove(&i).is_some() {
                    won += 1;
                }
            }
            won
        }));
    }

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, 512);
    assert!(map.is_empty());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_assign_single_key() {
    let map = Arc::new(HashMap::with_buckets(4));
    map.insert(0, 0);

    let mut handles = vec![];
    for t in 1..=8 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..1000 {
                m.insert(0, t);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(map.len(), 1);
    let final_value = map.get(&0).unwrap();
    assert!((1..=8).contains(&final_value));
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_churn_matches_per_thread_tally() {
    const THREADS: i64 = 4;
    const KEYS_PER_THREAD: i64 = 100;
    const ITERATIONS: usize = 25_000;

    let map = Arc::new(HashMap::with_buckets(32));
    let mut handles = vec![];

    for t in 0..THREADS {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            let base = t * KEYS_PER_THREAD;
            let mut rng = StdRng::seed_from_u64(0xEBE5 + t as u64);
            let mut tally: StdHashMap<i64, u64> = StdHashMap::new();

            for _ in 0..ITERATIONS {
                let key = base + rng.gen_range(0..KEYS_PER_THREAD);
                if rng.gen_range(0..10) == 0 {
                    let removed = m.remove(&key);
                    assert_eq!(removed, tally.remove(&key));
                } else {
                    let next = tally.get(&key).copied().unwrap_or(0) + 1;
                    assert_eq!(m.insert(key, next), tally.insert(key, next));
                }
            }
            tally
        }));
    }

    let mut expected_total = 0;
    for (t, handle) in handles.into_iter().enumerate() {
        let tally = handle.join().unwrap();
        expected_total += tally.len();
        let base = t as i64 * KEYS_PER_THREAD;
        for key in base..base + KEYS_PER_THREAD {
            assert_eq!(map.get(&key), tally.get(&key).copied());
        }
    }

    assert_eq!(map.len(), expected_total);
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_mixed_operations() {
    let map = Arc::new(HashMap::with_buckets(64));
    let mut handles = vec![];

    for t in 0..8 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..500 {
                let key = t * 500 + i;
                m.insert(key, key);
                assert_eq!(m.get(&key), Some(key));
                let (first, _last) = m.equal_range(&key);
                assert_eq!(first.key(), Some(&key));
                if i % 3 == 0 {
                    m.remove(&key);
                }
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_clear_and_insert() {
    let map = Arc::new(HashMap::with_buckets(16));
    let mut handles = vec![];

    for t in 0..4i64 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for i in 0..2000 {
                m.insert(t * 2000 + i, i);
                if i % 512 == 0 {
                    m.clear();
                }
            }
        }));
    }

    // Readers iterate while tables are being swapped out underneath them.
    for _ in 0..2 {
        let m = map.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..200 {
                let _ = m.iter().count();
                let _ = m.len();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Whatever survived must be readable and consistently counted.
    let entries = map.iter().count();
    assert_eq!(entries, map.len());
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_readers_survive_removal_of_their_position() {
    let map = Arc::new(HashMap::with_buckets(1));
    for i in 0..1000 {
        map.insert(i, i);
    }

    let reader = {
        let m = map.clone();
        thread::spawn(move || {
            let mut seen = 0usize;
            for _ in 0..100 {
                // The walk may end early when it runs into severed nodes,
                // but it must never crash or loop forever.
                seen += m.iter().count();
            }
            seen
        })
    };

    for i in 0..1000 {
        map.remove(&i);
    }

    let _ = reader.join().unwrap();
    assert!(map.is_empty());
}
