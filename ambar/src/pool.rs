use core::sync::atomic::Ordering;

use crossbeam_utils::Backoff;

use crate::node::Node;
use crate::tagged::{AtomicTaggedPtr, TaggedPtr};
use crate::trace::trace;

/// Lock-free stack of vacant nodes.
///
/// The head's flag is unused; the flag that matters is each pooled node's own
/// busy bit, which [`Pool::acquire`] checks and swaps against in one step.
pub(crate) struct Pool<T> {
    head: AtomicTaggedPtr<Node<T>>,
}

impl<T> Pool<T> {
    pub(crate) fn new() -> Self {
        Pool {
            head: AtomicTaggedPtr::null(),
        }
    }

    /// Pops a reusable node.
    ///
    /// Returns `None` when the caller has to allocate: either the pool is
    /// empty or its head is still busy, i.e. the consumer that vacated it has
    /// not finished moving its value out. Busy heads are never waited on.
    pub(crate) fn acquire(&self) -> Option<*mut Node<T>> {
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire);
            let node = head.ptr();

            if node.is_null() {
                trace!("free list empty");
                return None;
            }

            // Pooled nodes are only freed by `Drop`, so the read is sound even
            // if another thread pops `node` first; the stamped CAS below then
            // fails.
            let next = unsafe { (*node).next.load(Ordering::Acquire) };

            if next.bit() {
                trace!(node = ?node, "free list head busy");
                return None;
            }

            if self
                .head
                .compare_exchange_weak(
                    head,
                    TaggedPtr::new(next.ptr(), false),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return Some(node);
            }

            backoff.spin();
        }
    }

    /// Pushes a vacant node.
    ///
    /// The node's `next` pointer is rewritten to link into the pool while its
    /// busy bit is left as is: a consumer may still be draining it and will
    /// clear the bit later.
    pub(crate) fn release(&self, node: *mut Node<T>) {
        let backoff = Backoff::new();
        // The caller has unlinked `node`; only its busy bit can still change
        // under us.
        let node_ref = unsafe { &*node };

        loop {
            let head = self.head.load(Ordering::Acquire);
            node_ref.next.set_ptr(head.ptr(), Ordering::Release);

            if self
                .head
                .compare_exchange_weak(
                    head,
                    TaggedPtr::new(node, false),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
            {
                return;
            }

            backoff.spin();
        }
    }
}

impl<T> Drop for Pool<T> {
    fn drop(&mut self) {
        let mut node = self.head.load(Ordering::Relaxed).ptr();

        while !node.is_null() {
            unsafe {
                let next = (*node).next.load(Ordering::Relaxed).ptr();
                Node::dealloc(node);
                node = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_pool_asks_for_allocation() {
        let pool = Pool::<u32>::new();
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn test_lifo_reuse() {
        let pool = Pool::<u32>::new();
        let a = Node::alloc();
        let b = Node::alloc();

        pool.release(a);
        pool.release(b);

        assert_eq!(pool.acquire(), Some(b));
        assert_eq!(pool.acquire(), Some(a));
        assert!(pool.acquire().is_none());

        unsafe {
            Node::dealloc(a);
            Node::dealloc(b);
        }
    }

    #[test]
    fn test_busy_head_is_skipped_until_cleared() {
        let pool = Pool::<u32>::new();
        let node = Node::alloc();

        unsafe { (*node).next.set_bit(true, Ordering::Release) };
        pool.release(node);

        // Still draining: the pool refuses to hand it out.
        assert!(pool.acquire().is_none());

        let next = unsafe { (*node).next.load(Ordering::Acquire) };
        assert!(next.bit(), "release must keep the busy bit");
        assert!(next.ptr().is_null());

        unsafe { (*node).next.set_bit(false, Ordering::Release) };
        assert_eq!(pool.acquire(), Some(node));

        unsafe { Node::dealloc(node) };
    }

    #[test]
    fn test_drop_frees_pooled_nodes() {
        let pool = Pool::<String>::new();
        for _ in 0..16 {
            pool.release(Node::alloc());
        }
        drop(pool);
    }
}
