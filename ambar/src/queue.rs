//! Unbounded lock-free MPMC queue backed by a recycling node pool.

use core::fmt;
use core::hint::spin_loop;
use core::ptr;
use core::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crossbeam_utils::Backoff;

use crate::node::Node;
use crate::pool::Pool;
use crate::tagged::{AtomicTaggedPtr, TaggedPtr};
use crate::trace::{debug, trace};
use crate::utils::CacheAligned;

/// An unbounded multi-producer multi-consumer FIFO queue.
///
/// `before_first` always points at a dummy node whose value has been moved
/// out (or never existed). The front element lives in the dummy's successor.
/// Popping promotes that successor to be the new dummy and hands the old one
/// to the pool, where later pushes pick it up again.
///
/// # Examples
///
/// ```
/// use ambar::Queue;
/// use std::sync::Arc;
/// use std::thread;
///
/// let q = Arc::new(Queue::new());
/// let producer = {
///     let q = q.clone();
///     thread::spawn(move || {
///         for i in 0..100 {
///             q.push(i);
///         }
///     })
/// };
/// producer.join().unwrap();
///
/// let drained: Vec<_> = std::iter::from_fn(|| q.try_pop()).collect();
/// assert_eq!(drained, (0..100).collect::<Vec<_>>());
/// ```
///
/// # Panics
///
/// A panic while moving or dropping a `T` inside `push`/`try_pop` can leave
/// the queue's links inconsistent. No recovery is attempted.
pub struct Queue<T> {
    /// Dummy head. Stamped, so a recycled dummy cannot satisfy a stale CAS.
    before_first: CacheAligned<AtomicTaggedPtr<Node<T>>>,
    /// Tail cache. Only the producer that linked a node stores it here.
    last: CacheAligned<AtomicPtr<Node<T>>>,
    /// Vacant nodes waiting for reuse.
    pool: CacheAligned<Pool<T>>,
    /// Nodes ever taken from the global allocator, dummy included.
    allocated: AtomicUsize,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Creates an empty queue holding a single dummy node and an empty pool.
    pub fn new() -> Queue<T> {
        let dummy = Node::alloc();

        Queue {
            before_first: CacheAligned::new(AtomicTaggedPtr::new(TaggedPtr::new(dummy, false))),
            last: CacheAligned::new(AtomicPtr::new(dummy)),
            pool: CacheAligned::new(Pool::new()),
            allocated: AtomicUsize::new(1),
        }
    }

    /// Appends `value` at the back of the queue.
    ///
    /// Reuses a pooled node when one is ready, otherwise allocates.
    pub fn push(&self, value: T) {
        let node = self.acquire_node();

        // SAFETY: `node` came out of the pool or the allocator, so this thread
        // owns it and its slot is vacant.
        unsafe {
            (*node).write(value);
            // Busy until the consumer that takes this value has moved it out.
            (*node)
                .next
                .store(TaggedPtr::new(ptr::null_mut(), true), Ordering::Release);
        }

        self.link(node);
    }

    /// Removes the front element, or returns `None` if the queue was observed
    /// empty. Never waits.
    pub fn try_pop(&self) -> Option<T> {
        let backoff = Backoff::new();

        let (dummy, front) = loop {
            let head = self.before_first.load(Ordering::Acquire);
            let dummy = head.ptr();
            // SAFETY: nodes are only freed by `Drop`.
            let next = unsafe { (*dummy).next.load(Ordering::Acquire) };
            let front = next.ptr();

            if front.is_null() {
                // `dummy` may have been retired and relinked into the pool
                // after we loaded it; only trust the null if it is still the
                // head.
                if self.before_first.load(Ordering::Acquire) == head {
                    return None;
                }
                continue;
            }

            if self
                .before_first
                .compare_exchange_weak(
                    head,
                    TaggedPtr::new(front, false),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                break (dummy, front);
            }

            backoff.spin();
        };

        // SAFETY: winning the CAS makes this thread the only consumer of
        // `front`'s value. `front` stays busy until the bit is cleared below,
        // so even if it is retired meanwhile no producer can reuse it.
        let value = unsafe { (*front).take() };
        unsafe { (*front).next.set_bit(false, Ordering::Release) };

        self.retire(dummy);
        Some(value)
    }

    /// Returns `true` if the queue was empty at the moment of the check.
    pub fn is_empty(&self) -> bool {
        let head = self.before_first.load(Ordering::Acquire);
        // SAFETY: nodes are only freed by `Drop`.
        unsafe { (*head.ptr()).next.load(Ordering::Acquire).ptr().is_null() }
    }

    /// Number of nodes this queue has taken from the global allocator,
    /// including its initial dummy.
    ///
    /// Nodes are recycled, so after any number of push/pop cycles this stays
    /// bounded by the deepest the queue has been (plus nodes transiently held
    /// by in-flight operations), not by the number of operations.
    pub fn allocated_nodes(&self) -> usize {
        self.allocated.load(Ordering::Relaxed)
    }

    fn acquire_node(&self) -> *mut Node<T> {
        if let Some(node) = self.pool.acquire() {
            return node;
        }

        self.allocated.fetch_add(1, Ordering::Relaxed);
        trace!(allocated = self.allocated_nodes(), "pool miss, allocating node");
        Node::alloc()
    }

    /// Links `node` after the current tail and publishes it as the new tail.
    fn link(&self, node: *mut Node<T>) {
        let backoff = Backoff::new();

        loop {
            let last = self.last.load(Ordering::Acquire);
            // SAFETY: nodes are only freed by `Drop`.
            let last_ref = unsafe { &*last };
            let next = last_ref.next.load(Ordering::Acquire);

            // A non-null successor means another producer linked after `last`
            // and has not stored the tail yet. A moved tail means `next` may
            // belong to a node that has since left the chain.
            if next.ptr().is_null() && self.last.load(Ordering::Acquire) == last {
                // Keep `last`'s busy bit: its consumer may still be draining it.
                if last_ref
                    .next
                    .compare_exchange_weak(
                        next,
                        next.tagged().with_ptr(node),
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    // No CAS: only the producer that linked `node` advances the
                    // tail past it.
                    self.last.store(node, Ordering::Release);
                    return;
                }
            }

            backoff.spin();
        }
    }

    /// Hands the old dummy to the pool.
    fn retire(&self, node: *mut Node<T>) {
        // The producer that linked our front element after `node` may not have
        // moved the tail past `node` yet. Pooling it now would let a producer
        // holding the stale tail link onto a free-list node.
        while self.last.load(Ordering::Acquire) == node {
            spin_loop();
        }

        self.pool.release(node);
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        debug!(allocated = self.allocated_nodes(), "releasing queue nodes");

        let dummy = self.before_first.load(Ordering::Relaxed).ptr();

        // SAFETY: `&mut self` rules out concurrent operations; every node in
        // the chain after the dummy holds a live value.
        unsafe {
            let mut node = (*dummy).next.load(Ordering::Relaxed).ptr();
            Node::dealloc(dummy);

            while !node.is_null() {
                let next = (*node).next.load(Ordering::Relaxed).ptr();
                (*node).drop_value();
                Node::dealloc(node);
                node = next;
            }
        }
        // Pooled nodes are freed when `self.pool` drops.
    }
}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("is_empty", &self.is_empty())
            .field("allocated_nodes", &self.allocated_nodes())
            .finish_non_exhaustive()
    }
}
