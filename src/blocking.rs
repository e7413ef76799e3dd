//! Traits for the lock underlying an adaptive lock.
//!
//! In the [`Locked`](crate::Policy::Locked) regime, an adaptive lock's
//! critical sections take a conventional lock, its *underlying* lock, which
//! also serializes policy transitions:
//!
//! - an [`AdaptiveMutex`](crate::AdaptiveMutex) is built on a [`RawMutex`];
//! - an [`AdaptiveRwLock`](crate::AdaptiveRwLock) is built on a
//!   [`RawRwLock`], whose exclusive side is used by writers and by
//!   transitions.
//!
//! The spinlocks in [`spin`](crate::spin) implement these traits and work
//! without an operating system. With the "lock_api" feature flag, every
//! [`lock_api::RawMutex`] and [`lock_api::RawRwLock`] (such as `parking_lot`'s)
//! implements them too.

/// A mutex that can serve as the underlying lock of an
/// [`AdaptiveMutex`](crate::AdaptiveMutex).
///
/// This mirrors [`lock_api::RawMutex`], so that depending on `lock_api` stays
/// optional. To plug in a custom mutex, implement `lock_api::RawMutex` for it
/// and enable the "lock_api" feature, rather than implementing this trait.
///
/// # Safety
///
/// The mutex must really be exclusive: `lock` and a successful `try_lock`
/// must not return while another context holds the mutex.
pub unsafe trait RawMutex {
    /// Decides whether guards over this mutex are [`Send`]; see
    /// [`lock_api::GuardSend`] and [`lock_api::GuardNoSend`].
    type GuardMarker;

    /// Takes the mutex, waiting for as long as another context holds it.
    fn lock(&self);

    /// Takes the mutex if it is free, returning whether it was taken.
    fn try_lock(&self) -> bool;

    /// Releases the mutex.
    ///
    /// # Safety
    ///
    /// The current context must hold the mutex, having taken it with
    /// [`lock`](Self::lock) or [`try_lock`](Self::try_lock).
    unsafe fn unlock(&self);

    /// Returns whether any context holds the mutex.
    fn is_locked(&self) -> bool;
}

/// A readers-writer lock that can serve as the underlying lock of an
/// [`AdaptiveRwLock`](crate::AdaptiveRwLock).
///
/// This mirrors [`lock_api::RawRwLock`]; as with [`RawMutex`], custom locks
/// should implement the `lock_api` trait instead.
///
/// # Safety
///
/// While an exclusive lock is held, no other shared or exclusive lock may be
/// granted. While any shared lock is held, no exclusive lock may be granted.
pub unsafe trait RawRwLock {
    /// Decides whether guards over this lock are [`Send`].
    type GuardMarker;

    /// Takes a shared lock, waiting while an exclusive one is held.
    fn lock_shared(&self);

    /// Takes a shared lock if no exclusive one is held, returning whether it
    /// was taken.
    fn try_lock_shared(&self) -> bool;

    /// Releases a shared lock.
    ///
    /// # Safety
    ///
    /// The current context must hold a shared lock.
    unsafe fn unlock_shared(&self);

    /// Takes the exclusive lock, waiting while any lock is held.
    fn lock_exclusive(&self);

    /// Takes the exclusive lock if no lock is held, returning whether it was
    /// taken.
    fn try_lock_exclusive(&self) -> bool;

    /// Releases the exclusive lock.
    ///
    /// # Safety
    ///
    /// The current context must hold the exclusive lock.
    unsafe fn unlock_exclusive(&self);

    /// Returns whether any shared or exclusive lock is held.
    fn is_locked(&self) -> bool;

    /// Returns whether the exclusive lock is held.
    fn is_locked_exclusive(&self) -> bool;
}

feature! {
    #![feature = "lock_api"]

    unsafe impl<T: lock_api::RawMutex> RawMutex for T {
        type GuardMarker = <T as lock_api::RawMutex>::GuardMarker;

        #[inline]
        #[track_caller]
        fn lock(&self) {
            <T as lock_api::RawMutex>::lock(self)
        }

        #[inline]
        #[track_caller]
        fn try_lock(&self) -> bool {
            <T as lock_api::RawMutex>::try_lock(self)
        }

        #[inline]
        #[track_caller]
        unsafe fn unlock(&self) {
            <T as lock_api::RawMutex>::unlock(self)
        }

        #[inline]
        fn is_locked(&self) -> bool {
            <T as lock_api::RawMutex>::is_locked(self)
        }
    }

    unsafe impl<T: lock_api::RawRwLock> RawRwLock for T {
        type GuardMarker = <T as lock_api::RawRwLock>::GuardMarker;

        #[inline]
        #[track_caller]
        fn lock_shared(&self) {
            <T as lock_api::RawRwLock>::lock_shared(self)
        }

        #[inline]
        #[track_caller]
        fn try_lock_shared(&self) -> bool {
            <T as lock_api::RawRwLock>::try_lock_shared(self)
        }

        #[inline]
        #[track_caller]
        unsafe fn unlock_shared(&self) {
            <T as lock_api::RawRwLock>::unlock_shared(self)
        }

        #[inline]
        #[track_caller]
        fn lock_exclusive(&self) {
            <T as lock_api::RawRwLock>::lock_exclusive(self)
        }

        #[inline]
        #[track_caller]
        fn try_lock_exclusive(&self) -> bool {
            <T as lock_api::RawRwLock>::try_lock_exclusive(self)
        }

        #[inline]
        #[track_caller]
        unsafe fn unlock_exclusive(&self) {
            <T as lock_api::RawRwLock>::unlock_exclusive(self)
        }

        #[inline]
        fn is_locked(&self) -> bool {
            <T as lock_api::RawRwLock>::is_locked(self)
        }

        #[inline]
        fn is_locked_exclusive(&self) -> bool {
            <T as lock_api::RawRwLock>::is_locked_exclusive(self)
        }
    }
}
