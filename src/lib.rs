//! Zincir: a lock-free concurrent hash map built from chained buckets.
//!
//! Every bucket is a circular singly-linked list anchored by a permanent
//! sentinel node; the sentinels are threaded through the bucket array so the
//! whole map reads as one chain. All mutation goes through atomic
//! compare-and-exchange on per-node `next` pointers:
//!
//! - **Insertion** links new nodes only at the chain tail, so racing
//!   insertions of the same key serialise through a single converging CAS.
//! - **Removal** is two-phase: sever the node's outgoing link (reserving it
//!   with a null that makes every competing traversal restart), then unlink
//!   it from its predecessor.
//! - **Clear** swaps the entire bucket table for a fresh one with one CAS.
//!
//! Reclamation is epoch-based: nodes unlinked while readers are pinned stay
//! allocated until those readers are done, which is what makes traversal
//! under concurrent mutation safe.
//!
//! # Example
//!
//! ```
//! use zincir::HashMap;
//!
//! let map = HashMap::with_buckets(16);
//!
//! map.insert("a", 1);
//! map.insert("b", 2);
//! assert_eq!(map.len(), 2);
//!
//! assert_eq!(map.get(&"a"), Some(1));
//! assert_eq!(map.insert("a", 10), Some(1));
//! assert_eq!(map.remove(&"b"), Some(2));
//! assert_eq!(map.get(&"b"), None);
//! ```
//!
//! Operations on `&self` (lookups, insertion, assignment, removal, `clear`,
//! iteration) are safe under full concurrency. `rehash` and `swap` take
//! `&mut self`; `Clone` and `==` are unsynchronised reads. See the type
//! documentation on [`HashMap`] for details.

#![warn(missing_docs)]

mod bucket;
mod iter;
mod map;
mod node;
mod table;

pub use iter::{BucketIter, Iter, Keys, Values};
pub use map::{DefaultHashBuilder, HashMap};
