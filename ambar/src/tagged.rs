//! Tagged pointers.
//!
//! A [`TaggedPtr<T>`] is a `*mut T` whose least significant bit carries a
//! flag. Any `T` aligned to two bytes or more has that bit clear in every
//! valid address, so pointer and flag fit in a single `usize`.
//!
//! [`AtomicTaggedPtr<T>`] stores a tagged pointer next to a modification
//! stamp and updates both with one double-word atomic. Every successful store
//! or CAS bumps the stamp, so a [`Snapshot`] taken before an A-B-A sequence
//! no longer compares equal and a stale CAS fails even though pointer and flag
//! look unchanged.

use core::fmt;
use core::marker::PhantomData;
use core::sync::atomic::Ordering;

#[cfg(target_pointer_width = "64")]
type Word = u128;
#[cfg(target_pointer_width = "64")]
type AtomicWord = portable_atomic::AtomicU128;

#[cfg(not(target_pointer_width = "64"))]
type Word = u64;
#[cfg(not(target_pointer_width = "64"))]
type AtomicWord = portable_atomic::AtomicU64;

/// Low bit of the packed word.
const TAG_MASK: usize = 1;

/// The stamp occupies the upper half of the double word.
const STAMP_SHIFT: u32 = usize::BITS;

/// A pointer to `T` and a one-bit flag packed into one word.
pub struct TaggedPtr<T> {
    raw: usize,
    _marker: PhantomData<*mut T>,
}

impl<T> TaggedPtr<T> {
    /// A null pointer with the flag cleared.
    #[inline]
    pub const fn null() -> Self {
        Self::from_raw(0)
    }

    /// Packs `ptr` and `bit` into one word.
    ///
    /// `ptr` must have its low bit clear (checked in debug builds).
    #[inline]
    pub fn new(ptr: *mut T, bit: bool) -> Self {
        debug_assert_eq!(ptr as usize & TAG_MASK, 0, "unaligned pointer");
        Self::from_raw(ptr as usize | bit as usize)
    }

    /// Rebuilds a tagged pointer from its packed word.
    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the packed word.
    #[inline]
    pub const fn into_raw(self) -> usize {
        self.raw
    }

    /// Returns the pointer component.
    #[inline]
    pub fn ptr(self) -> *mut T {
        (self.raw & !TAG_MASK) as *mut T
    }

    /// Returns the flag component.
    #[inline]
    pub const fn bit(self) -> bool {
        self.raw & TAG_MASK != 0
    }

    /// Returns `true` if the pointer component is null, whatever the flag.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.raw & !TAG_MASK == 0
    }

    /// Returns a copy pointing at `ptr`, keeping the flag.
    #[inline]
    pub fn with_ptr(self, ptr: *mut T) -> Self {
        Self::new(ptr, self.bit())
    }

    /// Returns a copy with the flag set to `bit`, keeping the pointer.
    #[inline]
    pub fn with_bit(self, bit: bool) -> Self {
        Self::new(self.ptr(), bit)
    }
}

impl<T> Clone for TaggedPtr<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for TaggedPtr<T> {}

impl<T> PartialEq for TaggedPtr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for TaggedPtr<T> {}

impl<T> Default for TaggedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for TaggedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedPtr")
            .field("ptr", &self.ptr())
            .field("bit", &self.bit())
            .finish()
    }
}

/// A tagged pointer as loaded from an [`AtomicTaggedPtr`], together with the
/// stamp it carried at that moment.
///
/// Pass it back as the expected value of
/// [`AtomicTaggedPtr::compare_exchange_weak`].
pub struct Snapshot<T> {
    tagged: TaggedPtr<T>,
    stamp: usize,
}

impl<T> Snapshot<T> {
    /// The tagged pointer that was loaded.
    #[inline]
    pub fn tagged(self) -> TaggedPtr<T> {
        self.tagged
    }

    /// Shorthand for `self.tagged().ptr()`.
    #[inline]
    pub fn ptr(self) -> *mut T {
        self.tagged.ptr()
    }

    /// Shorthand for `self.tagged().bit()`.
    #[inline]
    pub fn bit(self) -> bool {
        self.tagged.bit()
    }

    /// The modification stamp of the cell when this snapshot was taken.
    #[inline]
    pub fn stamp(self) -> usize {
        self.stamp
    }

    #[inline]
    fn pack(self) -> Word {
        ((self.stamp as Word) << STAMP_SHIFT) | self.tagged.raw as Word
    }

    #[inline]
    fn unpack(word: Word) -> Self {
        Self {
            tagged: TaggedPtr::from_raw(word as usize),
            stamp: (word >> STAMP_SHIFT) as usize,
        }
    }

    /// The word that replaces this snapshot when `tagged` is written over it.
    #[inline]
    fn successor(self, tagged: TaggedPtr<T>) -> Word {
        Snapshot {
            tagged,
            stamp: self.stamp.wrapping_add(1),
        }
        .pack()
    }
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Snapshot<T> {}

impl<T> PartialEq for Snapshot<T> {
    fn eq(&self, other: &Self) -> bool {
        self.tagged == other.tagged && self.stamp == other.stamp
    }
}

impl<T> Eq for Snapshot<T> {}

impl<T> fmt::Debug for Snapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("ptr", &self.ptr())
            .field("bit", &self.bit())
            .field("stamp", &self.stamp)
            .finish()
    }
}

/// An atomically updated [`TaggedPtr<T>`].
///
/// Loads, stores and CAS always move pointer, flag and stamp together.
///
/// # Examples
///
/// ```
/// use ambar::{AtomicTaggedPtr, TaggedPtr};
/// use std::sync::atomic::Ordering;
///
/// let mut value = 7u64;
/// let ptr: *mut u64 = &mut value;
/// let cell = AtomicTaggedPtr::new(TaggedPtr::new(ptr, false));
///
/// let before = cell.set_bit(true, Ordering::AcqRel);
/// assert!(!before.bit());
///
/// let after = cell.load(Ordering::Acquire);
/// assert!(after.bit());
/// assert_eq!(after.ptr(), ptr);
/// assert_eq!(after.stamp(), before.stamp() + 1);
/// ```
pub struct AtomicTaggedPtr<T> {
    word: AtomicWord,
    _marker: PhantomData<*mut T>,
}

unsafe impl<T: Send + Sync> Send for AtomicTaggedPtr<T> {}
unsafe impl<T: Send + Sync> Sync for AtomicTaggedPtr<T> {}

impl<T> AtomicTaggedPtr<T> {
    /// Creates a cell holding `tagged` with stamp zero.
    #[inline]
    pub fn new(tagged: TaggedPtr<T>) -> Self {
        Self {
            word: AtomicWord::new(tagged.raw as Word),
            _marker: PhantomData,
        }
    }

    /// Creates a cell holding a null pointer with the flag cleared.
    #[inline]
    pub fn null() -> Self {
        Self::new(TaggedPtr::null())
    }

    /// Loads the current tagged pointer and stamp.
    #[inline]
    pub fn load(&self, order: Ordering) -> Snapshot<T> {
        Snapshot::unpack(self.word.load(order))
    }

    /// Replaces the tagged pointer, bumping the stamp.
    ///
    /// `order` applies to the write; the read half is relaxed.
    pub fn store(&self, tagged: TaggedPtr<T>, order: Ordering) {
        self.update(order, |_| tagged);
    }

    /// Compares the whole cell (pointer, flag and stamp) with `current` and,
    /// if equal, writes `new` with the next stamp.
    ///
    /// May fail spuriously. Returns the previous snapshot on success and the
    /// observed one on failure.
    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: Snapshot<T>,
        new: TaggedPtr<T>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<Snapshot<T>, Snapshot<T>> {
        match self.word.compare_exchange_weak(
            current.pack(),
            current.successor(new),
            success,
            failure,
        ) {
            Ok(prev) => Ok(Snapshot::unpack(prev)),
            Err(prev) => Err(Snapshot::unpack(prev)),
        }
    }

    /// Atomically replaces the pointer component, keeping whatever flag the
    /// cell holds at the moment of the write. Returns the snapshot replaced.
    pub fn set_ptr(&self, ptr: *mut T, order: Ordering) -> Snapshot<T> {
        self.update(order, |tagged| tagged.with_ptr(ptr))
    }

    /// Atomically replaces the flag, keeping whatever pointer the cell holds
    /// at the moment of the write. Returns the snapshot replaced.
    pub fn set_bit(&self, bit: bool, order: Ordering) -> Snapshot<T> {
        self.update(order, |tagged| tagged.with_bit(bit))
    }

    fn update(&self, order: Ordering, f: impl Fn(TaggedPtr<T>) -> TaggedPtr<T>) -> Snapshot<T> {
        let mut current = self.load(Ordering::Relaxed);
        loop {
            match self.word.compare_exchange_weak(
                current.pack(),
                current.successor(f(current.tagged)),
                order,
                Ordering::Relaxed,
            ) {
                Ok(prev) => return Snapshot::unpack(prev),
                Err(actual) => current = Snapshot::unpack(actual),
            }
        }
    }
}

impl<T> Default for AtomicTaggedPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for AtomicTaggedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(Ordering::Relaxed), f)
    }
}
