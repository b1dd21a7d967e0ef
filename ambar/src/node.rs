use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::ptr;

use crate::tagged::AtomicTaggedPtr;

/// Storage cell shared by the queue chain and the free list.
///
/// A node moves through these phases, driven by whichever thread owns it:
///
/// 1. vacant in the pool (`next` links to the next pooled node, busy clear);
/// 2. constructing: acquired by a producer, value being written;
/// 3. occupied: linked into the chain with busy set;
/// 4. draining: promoted to dummy by a consumer that is moving the value out;
/// 5. vacant: busy cleared, waiting to be retired to the pool.
///
/// Only the busy flag in `next` is observed atomically by other threads. The
/// value slot itself is touched exclusively by the thread that owns the node
/// in phase 2 or 4.
pub(crate) struct Node<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    /// Next node in the queue chain or in the pool, depending on where this
    /// node is reachable from. The flag is the busy bit.
    pub(crate) next: AtomicTaggedPtr<Node<T>>,
}

impl<T> Node<T> {
    /// Heap-allocates a vacant node.
    pub(crate) fn alloc() -> *mut Node<T> {
        Box::into_raw(Box::new(Node {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            next: AtomicTaggedPtr::null(),
        }))
    }

    /// Frees a node without touching its value slot.
    ///
    /// # Safety
    ///
    /// `node` must come from [`Node::alloc`], be unreachable from any other
    /// thread, and its slot must be vacant (or already dropped).
    pub(crate) unsafe fn dealloc(node: *mut Node<T>) {
        drop(unsafe { Box::from_raw(node) });
    }

    /// Moves `value` into the slot.
    ///
    /// # Safety
    ///
    /// The caller owns the node and the slot is vacant.
    pub(crate) unsafe fn write(&self, value: T) {
        unsafe { self.value.get().write(MaybeUninit::new(value)) };
    }

    /// Moves the value out, leaving the slot vacant.
    ///
    /// # Safety
    ///
    /// The caller owns the node and the slot is occupied.
    pub(crate) unsafe fn take(&self) -> T {
        unsafe { self.value.get().read().assume_init() }
    }

    /// Drops the value in place, leaving the slot vacant.
    ///
    /// # Safety
    ///
    /// Same as [`Node::take`].
    pub(crate) unsafe fn drop_value(&self) {
        unsafe { ptr::drop_in_place((*self.value.get()).as_mut_ptr()) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_nodes_leave_the_tag_bit_free() {
        assert!(core::mem::align_of::<Node<u8>>() >= 2);
        assert!(core::mem::align_of::<Node<()>>() >= 2);
    }

    #[test]
    fn test_fresh_node_is_unlinked_and_idle() {
        let node = Node::<String>::alloc();
        let next = unsafe { (*node).next.load(Ordering::Relaxed) };
        assert!(next.ptr().is_null());
        assert!(!next.bit());
        unsafe { Node::dealloc(node) };
    }

    #[test]
    fn test_slot_reuse_does_not_leak_previous_value() {
        let first = Arc::new(());
        let second = Arc::new(());
        let node = Node::<Arc<()>>::alloc();

        unsafe {
            (*node).write(first.clone());
            let out = (*node).take();
            assert!(Arc::ptr_eq(&out, &first));
            drop(out);

            (*node).write(second.clone());
            assert_eq!(Arc::strong_count(&first), 1);
            assert_eq!(Arc::strong_count(&second), 2);

            (*node).drop_value();
            assert_eq!(Arc::strong_count(&second), 1);
            Node::dealloc(node);
        }
    }
}
