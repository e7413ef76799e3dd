//! Spinning underlying locks.
//!
//! These are the default underlying locks of the adaptive locks:
//!
//! - [`Spinlock`], a [`RawMutex`] used by [`AdaptiveMutex`];
//! - [`RwSpinlock`], a [`RawRwLock`] used by [`AdaptiveRwLock`].
//!
//! Neither needs an operating system or an allocator. A waiting context
//! spins with an exponential [`Backoff`] instead of parking, so these are a
//! good fit for short critical sections and for `no_std` code. Hosted code
//! with long locked phases may prefer an OS-backed lock through the
//! `with_lock_api` constructors.
//!
//! [`AdaptiveMutex`]: crate::AdaptiveMutex
//! [`AdaptiveRwLock`]: crate::AdaptiveRwLock
use crate::{
    blocking::{RawMutex, RawRwLock},
    loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering::*},
    util::Backoff,
};
use core::fmt;

/// A test-and-test-and-set spinlock.
#[derive(Debug)]
pub struct Spinlock {
    locked: AtomicBool,
}

/// A readers-writer spinlock.
///
/// The lock is a single word: the low bit is set while a writer holds the
/// lock, and the remaining bits count the readers. Readers are admitted
/// whenever no writer holds the lock, so a steady stream of readers can
/// starve writers.
pub struct RwSpinlock {
    state: AtomicUsize,
}

// === impl Spinlock ===

impl Spinlock {
    loom_const_fn! {
        /// Returns a new, unlocked `Spinlock`.
        #[must_use]
        pub fn new() -> Self {
            Self { locked: AtomicBool::new(false) }
        }
    }
}

impl Default for Spinlock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawMutex for Spinlock {
    type GuardMarker = ();

    #[cfg_attr(test, track_caller)]
    fn lock(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock() {
            // Wait with plain loads, so that waiters don't keep stealing the
            // cache line from the holder.
            while self.is_locked() {
                backoff.spin();
            }
        }
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    fn try_lock(&self) -> bool {
        test_dbg!(self
            .locked
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_ok())
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    unsafe fn unlock(&self) {
        test_dbg!(self.locked.store(false, Release));
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.locked.load(Relaxed)
    }
}

// === impl RwSpinlock ===

const WRITER: usize = 0b1;
const ONE_READER: usize = 0b10;
const MAX_READERS: usize = usize::MAX / ONE_READER - 1;

impl RwSpinlock {
    loom_const_fn! {
        /// Returns a new, unlocked `RwSpinlock`.
        #[must_use]
        pub fn new() -> Self {
            Self { state: AtomicUsize::new(0) }
        }
    }

    /// Returns how many readers hold the lock right now.
    ///
    /// The count may be stale by the time it is returned; use it only for
    /// debugging.
    #[inline]
    #[must_use]
    pub fn reader_count(&self) -> usize {
        self.state.load(Relaxed) / ONE_READER
    }
}

impl Default for RwSpinlock {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl RawRwLock for RwSpinlock {
    type GuardMarker = ();

    #[cfg_attr(test, track_caller)]
    fn lock_shared(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock_shared() {
            backoff.spin();
        }
    }

    #[cfg_attr(test, track_caller)]
    fn try_lock_shared(&self) -> bool {
        let mut state = self.state.load(Relaxed);
        loop {
            if state & WRITER != 0 {
                return false;
            }
            assert!(
                state / ONE_READER < MAX_READERS,
                "RwSpinlock reader count overflowed"
            );
            match test_dbg!(self.state.compare_exchange_weak(
                state,
                state + ONE_READER,
                Acquire,
                Relaxed
            )) {
                Ok(_) => return true,
                Err(actual) => state = actual,
            }
        }
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    unsafe fn unlock_shared(&self) {
        let _prev = test_dbg!(self.state.fetch_sub(ONE_READER, Release));
        debug_assert!(
            _prev >= ONE_READER && _prev & WRITER == 0,
            "released a shared lock that was not held (state {_prev:#b})"
        );
    }

    #[cfg_attr(test, track_caller)]
    fn lock_exclusive(&self) {
        let mut backoff = Backoff::new();
        loop {
            if self.state.load(Relaxed) == 0
                && test_dbg!(self
                    .state
                    .compare_exchange_weak(0, WRITER, Acquire, Relaxed)
                    .is_ok())
            {
                return;
            }
            backoff.spin();
        }
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    fn try_lock_exclusive(&self) -> bool {
        test_dbg!(self
            .state
            .compare_exchange(0, WRITER, Acquire, Relaxed)
            .is_ok())
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    unsafe fn unlock_exclusive(&self) {
        let _prev = test_dbg!(self.state.swap(0, Release));
        debug_assert_eq!(_prev, WRITER, "released an exclusive lock that was not held");
    }

    #[inline]
    fn is_locked(&self) -> bool {
        self.state.load(Relaxed) != 0
    }

    #[inline]
    fn is_locked_exclusive(&self) -> bool {
        self.state.load(Relaxed) & WRITER != 0
    }
}

impl fmt::Debug for RwSpinlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.load(Relaxed);
        f.debug_struct("RwSpinlock")
            .field("readers", &(state / ONE_READER))
            .field("writer", &(state & WRITER != 0))
            .finish()
    }
}
