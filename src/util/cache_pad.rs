use core::{
    fmt,
    ops::{Deref, DerefMut},
};

/// Aligns the wrapped value to the size of a cache line.
///
/// Each in-flight counter of an adaptive lock sits in its own `CachePadded`.
/// Lock-free critical sections touch their counter on every entry and exit,
/// and without padding those writes would keep invalidating the line holding
/// the policy word and the other regime's counter ([false sharing]).
///
/// The alignment is 128 bytes on `x86_64` and `aarch64`, whose prefetchers
/// pull in pairs of 64-byte lines, and 64 bytes elsewhere. With the
/// `no-cache-pad` feature, which suits targets without a data cache, the
/// wrapper adds no alignment at all.
///
/// [false sharing]: https://en.wikipedia.org/wiki/False_sharing
#[cfg_attr(
    all(
        not(feature = "no-cache-pad"),
        any(target_arch = "x86_64", target_arch = "aarch64")
    ),
    repr(align(128))
)]
#[cfg_attr(
    all(
        not(feature = "no-cache-pad"),
        not(any(target_arch = "x86_64", target_arch = "aarch64"))
    ),
    repr(align(64))
)]
#[derive(Clone, Copy, Default, Hash, PartialEq, Eq)]
pub struct CachePadded<T>(T);

impl<T> CachePadded<T> {
    /// Wraps `value`.
    pub const fn new(value: T) -> Self {
        Self(value)
    }

    /// Returns the wrapped value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CachePadded<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T: fmt::Debug> fmt::Debug for CachePadded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

#[cfg(all(test, not(loom), not(feature = "no-cache-pad")))]
mod tests {
    use super::*;

    #[test]
    fn counters_do_not_share_a_line() {
        let align = core::mem::align_of::<CachePadded<isize>>();
        assert!(align >= 64, "cache padding must be at least 64 bytes, got {align}");
        assert_eq!(core::mem::size_of::<CachePadded<isize>>(), align);
        assert_eq!(*CachePadded::new(7isize), 7);
    }
}
