use ambar::{AtomicTaggedPtr, TaggedPtr};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

fn boxed(v: u64) -> *mut u64 {
    Box::into_raw(Box::new(v))
}

#[test]
fn test_rebuild_keeps_other_component() {
    let a = boxed(1);
    let b = boxed(2);

    let t = TaggedPtr::new(a, false);
    assert_eq!(t.with_bit(true).ptr(), a);
    assert!(t.with_bit(true).with_ptr(b).bit());
    assert_eq!(t.with_ptr(b).ptr(), b);
    assert!(!t.with_ptr(b).bit());

    let raw = TaggedPtr::new(a, true).into_raw();
    assert_eq!(TaggedPtr::<u64>::from_raw(raw).ptr(), a);
    assert!(TaggedPtr::<u64>::from_raw(raw).bit());

    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

#[test]
fn test_cas_compares_flag_and_pointer_together() {
    let a = boxed(1);
    let b = boxed(2);
    let cell = AtomicTaggedPtr::new(TaggedPtr::new(a, false));

    let seen = cell.load(Ordering::Acquire);
    cell.set_bit(true, Ordering::AcqRel);

    // Same pointer, different flag: the swap must not happen.
    assert!(
        cell.compare_exchange_weak(seen, TaggedPtr::new(b, false), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
    );
    assert_eq!(cell.load(Ordering::Acquire).ptr(), a);

    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

#[test]
fn test_stale_snapshot_fails_after_aba() {
    let a = boxed(1);
    let b = boxed(2);
    let cell = AtomicTaggedPtr::new(TaggedPtr::new(a, false));

    let stale = cell.load(Ordering::Acquire);

    // A -> B -> A: pointer and flag are back where they were.
    cell.store(TaggedPtr::new(b, false), Ordering::Release);
    cell.store(TaggedPtr::new(a, false), Ordering::Release);

    let now = cell.load(Ordering::Acquire);
    assert_eq!(now.tagged(), stale.tagged());
    assert_ne!(now.stamp(), stale.stamp());

    assert!(
        cell.compare_exchange_weak(stale, TaggedPtr::new(b, false), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
    );

    let mut swapped = false;
    for _ in 0..1000 {
        let now = cell.load(Ordering::Acquire);
        if cell
            .compare_exchange_weak(now, TaggedPtr::new(b, false), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            swapped = true;
            break;
        }
    }
    assert!(swapped);
    assert_eq!(cell.load(Ordering::Acquire).ptr(), b);

    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

#[test]
fn test_set_ptr_preserves_bit_set_bit_preserves_ptr() {
    let a = boxed(1);
    let b = boxed(2);
    let cell = AtomicTaggedPtr::new(TaggedPtr::new(a, true));

    let prev = cell.set_ptr(b, Ordering::AcqRel);
    assert_eq!(prev.ptr(), a);
    let now = cell.load(Ordering::Acquire);
    assert_eq!(now.ptr(), b);
    assert!(now.bit());

    cell.set_bit(false, Ordering::AcqRel);
    let now = cell.load(Ordering::Acquire);
    assert_eq!(now.ptr(), b);
    assert!(!now.bit());

    unsafe {
        drop(Box::from_raw(a));
        drop(Box::from_raw(b));
    }
}

#[test]
#[cfg_attr(miri, ignore)]
fn test_concurrent_flag_flips_never_tear_pointer() {
    let a = boxed(1);
    let cell = Arc::new(AtomicTaggedPtr::new(TaggedPtr::new(a, false)));
    let addr = a as usize;
    let mut handles = vec![];

    for t in 0..4 {
        let cell = cell.clone();
        handles.push(thread::spawn(move || {
            for i in 0..10_000 {
                cell.set_bit((i + t) % 2 == 0, Ordering::AcqRel);
                assert_eq!(cell.load(Ordering::Acquire).ptr() as usize, addr);
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    // Every successful update bumped the stamp exactly once.
    assert_eq!(cell.load(Ordering::Acquire).stamp(), 4 * 10_000);

    unsafe { drop(Box::from_raw(a)) };
}
