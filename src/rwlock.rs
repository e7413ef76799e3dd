//! An adaptive [readers-writer lock].
//!
//! See the documentation for the [`AdaptiveRwLock`] type for details.
//!
//! [readers-writer lock]: https://en.wikipedia.org/wiki/Readers%E2%80%93writer_lock
use crate::{
    blocking::RawRwLock,
    policy::{Policy, PolicyError, Regime, Ticket},
    spin::RwSpinlock,
    transition::{AtomicPolicy, Counter},
    util::Backoff,
};
use core::{fmt, marker::PhantomData};

#[cfg(test)]
mod tests;

/// A readers-writer lock whose synchronization [`Policy`] can be switched at
/// runtime.
///
/// This is the shared/exclusive counterpart of
/// [`AdaptiveMutex`](crate::AdaptiveMutex). In the
/// [`Locked`](Policy::Locked) regime, it behaves like an ordinary
/// readers-writer lock: any number of readers, or a single writer, may be
/// inside a critical section at a time. In the [`LockFree`](Policy::LockFree)
/// regime, neither readers nor writers touch the underlying lock.
///
/// Readers and writers are counted separately in each regime. A call to
/// [`set_policy`] waits until *every* reader and *every* writer that entered
/// under the previous regime has exited. A single straggling reader is
/// enough to hold up a transition, even if no writers are in flight.
///
/// Policy transitions are serialized by taking the underlying lock
/// exclusively.
///
/// Like `AdaptiveMutex`, this is a raw lock that does not own the data it
/// protects.
///
/// # Examples
///
/// ```
/// use adaptive_lock::{AdaptiveRwLock, Policy, Regime};
///
/// let lock = AdaptiveRwLock::new(Regime::Locked);
///
/// {
///     // Any number of readers may hold the lock at once.
///     let r1 = lock.read();
///     let r2 = lock.read();
///     assert_eq!(r1.regime(), Regime::Locked);
///     assert_eq!(lock.readers(Regime::Locked), 2);
/// }
///
/// lock.set_policy(Policy::LockFree).unwrap();
/// assert_eq!(lock.write().regime(), Regime::LockFree);
/// ```
///
/// [`set_policy`]: AdaptiveRwLock::set_policy
pub struct AdaptiveRwLock<Lock = RwSpinlock> {
    policy: AtomicPolicy,
    lock: Lock,
    lock_free_readers: Counter,
    locked_readers: Counter,
    lock_free_writers: Counter,
    locked_writers: Counter,
    backoff: Backoff,
}

/// An RAII implementation of a shared critical section of an
/// [`AdaptiveRwLock`]. When this structure is dropped (falls out of scope),
/// the critical section ends.
///
/// This structure is created by the [`read`] method on [`AdaptiveRwLock`].
///
/// [`read`]: AdaptiveRwLock::read
#[must_use = "if unused, the critical section will immediately end"]
pub struct AdaptiveRwLockReadGuard<'lock, Lock: RawRwLock = RwSpinlock> {
    lock: &'lock AdaptiveRwLock<Lock>,
    regime: Regime,
    _marker: PhantomData<Lock::GuardMarker>,
}

/// An RAII implementation of an exclusive critical section of an
/// [`AdaptiveRwLock`]. When this structure is dropped (falls out of scope),
/// the critical section ends.
///
/// This structure is created by the [`write`] method on [`AdaptiveRwLock`].
///
/// [`write`]: AdaptiveRwLock::write
#[must_use = "if unused, the critical section will immediately end"]
pub struct AdaptiveRwLockWriteGuard<'lock, Lock: RawRwLock = RwSpinlock> {
    lock: &'lock AdaptiveRwLock<Lock>,
    regime: Regime,
    _marker: PhantomData<Lock::GuardMarker>,
}

impl AdaptiveRwLock {
    loom_const_fn! {
        /// Returns a new `AdaptiveRwLock` in the given `regime`, using a
        /// [`RwSpinlock`] as the underlying lock.
        #[must_use]
        pub fn new(regime: Regime) -> Self {
            Self::with_raw_rwlock(regime, RwSpinlock::new())
        }
    }
}

impl<Lock> AdaptiveRwLock<Lock> {
    loom_const_fn! {
        /// Returns a new `AdaptiveRwLock` in the given `regime`, using the
        /// provided `lock` as the underlying lock.
        #[must_use]
        pub fn with_raw_rwlock(regime: Regime, lock: Lock) -> Self {
            Self {
                policy: AtomicPolicy::new(regime),
                lock,
                lock_free_readers: Counter::new(),
                locked_readers: Counter::new(),
                lock_free_writers: Counter::new(),
                locked_writers: Counter::new(),
                backoff: Backoff::new(),
            }
        }
    }

    /// Sets the [`Backoff`] used while [`set_policy`](Self::set_policy) waits
    /// for critical sections in the old regime to exit.
    #[must_use]
    pub fn with_backoff(self, backoff: Backoff) -> Self {
        Self { backoff, ..self }
    }

    /// Returns the current synchronization policy.
    #[inline]
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy.load()
    }

    /// Returns the number of shared critical sections currently in flight in
    /// `regime`.
    ///
    /// # Note
    ///
    /// This method is not synchronized with critical sections entering or
    /// exiting, and its value may become out of date as soon as it is read.
    /// This is **not** intended to be used for synchronization purposes! It is
    /// intended only for debugging purposes or for use as a heuristic.
    #[inline]
    #[must_use]
    pub fn readers(&self, regime: Regime) -> usize {
        match regime {
            Regime::Locked => self.locked_readers.in_flight(),
            Regime::LockFree => self.lock_free_readers.in_flight(),
        }
    }

    /// Returns the number of exclusive critical sections currently in flight
    /// in `regime`.
    ///
    /// As with [`readers`](Self::readers), this is a snapshot that is **not**
    /// intended for synchronization.
    #[inline]
    #[must_use]
    pub fn writers(&self, regime: Regime) -> usize {
        match regime {
            Regime::Locked => self.locked_writers.in_flight(),
            Regime::LockFree => self.lock_free_writers.in_flight(),
        }
    }
}

feature! {
    #![feature = "lock_api"]

    impl<Lock: lock_api::RawRwLock> AdaptiveRwLock<Lock> {
        loom_const_fn! {
            /// Returns a new `AdaptiveRwLock` in the given `regime`, using
            /// the [`lock_api::RawRwLock`] implementation `Lock` as the
            /// underlying lock.
            #[must_use]
            pub fn with_lock_api(regime: Regime) -> Self {
                Self::with_raw_rwlock(regime, Lock::INIT)
            }
        }
    }
}

impl<Lock: RawRwLock> AdaptiveRwLock<Lock> {
    /// Enters a shared critical section, returning a [`Ticket`] that must be
    /// passed to [`release_shared`](Self::release_shared) to end it.
    ///
    /// In the locked regime, this takes the underlying lock in shared mode,
    /// blocking while a writer holds it.
    #[cfg_attr(test, track_caller)]
    pub fn acquire_shared(&self) -> Ticket {
        self.policy.enter(&self.lock_free_readers, &self.locked_readers, || {
            self.lock.lock_shared()
        })
    }

    /// Ends a shared critical section started by
    /// [`acquire_shared`](Self::acquire_shared).
    ///
    /// # Safety
    ///
    /// `ticket` must have been returned by `acquire_shared` on *this*
    /// `AdaptiveRwLock`, and not by `acquire_exclusive`.
    #[cfg_attr(test, track_caller)]
    pub unsafe fn release_shared(&self, ticket: Ticket) {
        match ticket.regime() {
            Regime::Locked => {
                self.locked_readers.exit();
                self.lock.unlock_shared();
            }
            Regime::LockFree => self.lock_free_readers.exit(),
        }
    }

    /// Enters an exclusive critical section, returning a [`Ticket`] that must
    /// be passed to [`release_exclusive`](Self::release_exclusive) to end it.
    ///
    /// In the locked regime, this takes the underlying lock exclusively,
    /// blocking while any reader or writer holds it.
    #[cfg_attr(test, track_caller)]
    pub fn acquire_exclusive(&self) -> Ticket {
        self.policy.enter(&self.lock_free_writers, &self.locked_writers, || {
            self.lock.lock_exclusive()
        })
    }

    /// Ends an exclusive critical section started by
    /// [`acquire_exclusive`](Self::acquire_exclusive).
    ///
    /// # Safety
    ///
    /// `ticket` must have been returned by `acquire_exclusive` on *this*
    /// `AdaptiveRwLock`, and not by `acquire_shared`.
    #[cfg_attr(test, track_caller)]
    pub unsafe fn release_exclusive(&self, ticket: Ticket) {
        match ticket.regime() {
            Regime::Locked => {
                self.locked_writers.exit();
                self.lock.unlock_exclusive();
            }
            Regime::LockFree => self.lock_free_writers.exit(),
        }
    }

    /// Enters a shared critical section, returning an RAII guard which ends
    /// it when dropped.
    #[cfg_attr(test, track_caller)]
    pub fn read(&self) -> AdaptiveRwLockReadGuard<'_, Lock> {
        let ticket = self.acquire_shared();
        AdaptiveRwLockReadGuard {
            lock: self,
            regime: ticket.regime(),
            _marker: PhantomData,
        }
    }

    /// Enters an exclusive critical section, returning an RAII guard which
    /// ends it when dropped.
    #[cfg_attr(test, track_caller)]
    pub fn write(&self) -> AdaptiveRwLockWriteGuard<'_, Lock> {
        let ticket = self.acquire_exclusive();
        AdaptiveRwLockWriteGuard {
            lock: self,
            regime: ticket.regime(),
            _marker: PhantomData,
        }
    }

    /// Runs `f` inside a shared critical section, returning its result.
    pub fn with_read<U>(&self, f: impl FnOnce() -> U) -> U {
        let _guard = self.read();
        f()
    }

    /// Runs `f` inside an exclusive critical section, returning its result.
    pub fn with_write<U>(&self, f: impl FnOnce() -> U) -> U {
        let _guard = self.write();
        f()
    }

    /// Switches the synchronization policy to `target`.
    ///
    /// This behaves like [`AdaptiveMutex::set_policy`], except that the
    /// underlying lock is taken exclusively, and that the transition waits
    /// for the old regime's readers *and* writers to drain. It keeps waiting
    /// as long as either count is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Transitional`] if `target` is a transitional
    /// policy.
    ///
    /// [`AdaptiveMutex::set_policy`]: crate::AdaptiveMutex::set_policy
    #[cfg_attr(test, track_caller)]
    pub fn set_policy(&self, target: Policy) -> Result<(), PolicyError> {
        let target = Regime::try_from(target)?;
        let draining = match target {
            Regime::Locked => [&self.lock_free_readers, &self.lock_free_writers],
            Regime::LockFree => [&self.locked_readers, &self.locked_writers],
        };

        self.lock.lock_exclusive();
        self.policy.transition("AdaptiveRwLock", target, &draining, self.backoff);
        unsafe {
            // Safety: we took the exclusive lock above.
            self.lock.unlock_exclusive();
        }

        Ok(())
    }
}

impl<Lock: Default> Default for AdaptiveRwLock<Lock> {
    /// Returns a new `AdaptiveRwLock` in the [`Locked`](Policy::Locked)
    /// regime.
    fn default() -> Self {
        Self::with_raw_rwlock(Regime::Locked, Lock::default())
    }
}

impl<Lock: fmt::Debug> fmt::Debug for AdaptiveRwLock<Lock> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveRwLock")
            .field("policy", &self.policy)
            .field("lock_free_readers", &self.lock_free_readers)
            .field("locked_readers", &self.locked_readers)
            .field("lock_free_writers", &self.lock_free_writers)
            .field("locked_writers", &self.locked_writers)
            .field("lock", &self.lock)
            .finish()
    }
}

// === impl AdaptiveRwLockReadGuard ===

impl<Lock: RawRwLock> AdaptiveRwLockReadGuard<'_, Lock> {
    /// Returns the regime this critical section was entered in.
    #[inline]
    #[must_use]
    pub fn regime(&self) -> Regime {
        self.regime
    }
}

impl<Lock: RawRwLock> Drop for AdaptiveRwLockReadGuard<'_, Lock> {
    #[inline]
    #[cfg_attr(test, track_caller)]
    fn drop(&mut self) {
        unsafe {
            // Safety: the guard owns a ticket from `acquire_shared`.
            self.lock.release_shared(Ticket::new(self.regime))
        }
    }
}

impl<Lock: RawRwLock> fmt::Debug for AdaptiveRwLockReadGuard<'_, Lock> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveRwLockReadGuard")
            .field("regime", &self.regime)
            .finish_non_exhaustive()
    }
}

// === impl AdaptiveRwLockWriteGuard ===

impl<Lock: RawRwLock> AdaptiveRwLockWriteGuard<'_, Lock> {
    /// Returns the regime this critical section was entered in.
    #[inline]
    #[must_use]
    pub fn regime(&self) -> Regime {
        self.regime
    }
}

impl<Lock: RawRwLock> Drop for AdaptiveRwLockWriteGuard<'_, Lock> {
    #[inline]
    #[cfg_attr(test, track_caller)]
    fn drop(&mut self) {
        unsafe {
            // Safety: the guard owns a ticket from `acquire_exclusive`.
            self.lock.release_exclusive(Ticket::new(self.regime))
        }
    }
}

impl<Lock: RawRwLock> fmt::Debug for AdaptiveRwLockWriteGuard<'_, Lock> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveRwLockWriteGuard")
            .field("regime", &self.regime)
            .finish_non_exhaustive()
    }
}
