use core::ops::Deref;

/// Pads and aligns `T` to a cache line so the queue's head, tail and pool
/// atomics do not false-share.
///
/// Line sizes: 256B on s390x, 128B on aarch64 (Apple M-series, Neoverse),
/// 64B elsewhere.
#[cfg_attr(target_arch = "s390x", repr(align(256)))]
#[cfg_attr(target_arch = "aarch64", repr(align(128)))]
#[cfg_attr(not(any(target_arch = "s390x", target_arch = "aarch64")), repr(align(64)))]
#[derive(Debug)]
pub(crate) struct CacheAligned<T>(T);

impl<T> CacheAligned<T> {
    pub(crate) const fn new(t: T) -> Self {
        Self(t)
    }
}

impl<T> Deref for CacheAligned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}
