//! Unbounded lock-free MPMC queue with a recycling node pool.
//!
//! ## Features
//!
//! - `Queue`: unbounded multi-producer multi-consumer FIFO. Producers and
//!   consumers never take a lock; nodes vacated by consumers are pushed onto
//!   a lock-free free list and reused by later producers instead of going back
//!   to the allocator.
//! - `TaggedPtr` / `AtomicTaggedPtr`: a pointer and a one-bit flag packed into
//!   one word, read and swapped as a unit. The queue uses the bit to mark a
//!   node as "busy" while its value slot is in transition, so the pool never
//!   hands out a node that a consumer is still draining.
//!
//! Nodes are only released to the global allocator when the queue itself is
//! dropped. Address reuse through *other* allocations therefore cannot alias a
//! node that a concurrent operation still holds.
//!
//! ## Usage
//!
//! ```rust
//! use ambar::Queue;
//!
//! let q = Queue::new();
//! q.push("hello".to_string());
//! q.push("world".to_string());
//!
//! assert_eq!(q.try_pop().as_deref(), Some("hello"));
//! assert_eq!(q.try_pop().as_deref(), Some("world"));
//! assert_eq!(q.try_pop(), None);
//! ```
//!
//! Enable the `tracing` feature to get `trace`/`debug` events from the pool
//! and teardown paths.

#![warn(missing_docs)]

mod node;
mod pool;
pub mod queue;
pub mod tagged;
mod trace;
mod utils;

pub use queue::Queue;
pub use tagged::{AtomicTaggedPtr, Snapshot, TaggedPtr};
