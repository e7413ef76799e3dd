//! An adaptive [mutual exclusion] lock.
//!
//! See the documentation for the [`AdaptiveMutex`] type for details.
//!
//! [mutual exclusion]: https://en.wikipedia.org/wiki/Mutual_exclusion
use crate::{
    blocking::RawMutex,
    policy::{Policy, PolicyError, Regime, Ticket},
    spin::Spinlock,
    transition::{AtomicPolicy, Counter},
    util::Backoff,
};
use core::{fmt, marker::PhantomData};


/// A mutual exclusion lock whose synchronization [`Policy`] can be switched
/// at runtime.
///
/// In the [`Locked`](Policy::Locked) regime, every critical section takes the
/// underlying `Lock`, exactly like an ordinary mutex. In the
/// [`LockFree`](Policy::LockFree) regime, critical sections skip the
/// underlying lock entirely and run unsynchronized. This is intended for data
/// whose access pattern alternates between phases with concurrent writers,
/// which need protection, and phases that are known to be read-only or
/// otherwise quiesced, which do not.
///
/// Switching between the regimes is done with [`set_policy`]. A switch waits
/// until every critical section that was entered under the *old* regime has
/// exited, so that no critical section ever runs unsynchronized while another
/// one is relying on the lock (or vice versa).
///
/// Unlike a [`Mutex`], an `AdaptiveMutex` does not own the data it protects:
/// in the lock-free regime, several critical sections may run at once, so it
/// cannot hand out `&mut` references. It is a *raw* lock, bracketing critical
/// sections with [`lock`] (which returns an RAII guard) or with the
/// lower-level [`acquire`] and [`release`] pair.
///
/// # Fairness
///
/// This is *not* a fair mutex. In the locked regime, it is exactly as fair as
/// the underlying `Lock`.
///
/// # Examples
///
/// ```
/// use adaptive_lock::{AdaptiveMutex, Policy, Regime};
///
/// let lock = AdaptiveMutex::new(Regime::Locked);
/// {
///     let guard = lock.lock();
///     assert_eq!(guard.regime(), Regime::Locked);
///     // ... mutate the shared data ...
/// }
///
/// // The writers are done; from now on, critical sections run lock-free.
/// lock.set_policy(Policy::LockFree).unwrap();
/// assert_eq!(lock.lock().regime(), Regime::LockFree);
/// ```
///
/// [`set_policy`]: AdaptiveMutex::set_policy
/// [`lock`]: AdaptiveMutex::lock
/// [`acquire`]: AdaptiveMutex::acquire
/// [`release`]: AdaptiveMutex::release
/// [`Mutex`]: https://doc.rust-lang.org/std/sync/struct.Mutex.html
pub struct AdaptiveMutex<Lock = Spinlock> {
    policy: AtomicPolicy,
    lock: Lock,
    lock_free: Counter,
    locked: Counter,
    backoff: Backoff,
}

/// An RAII implementation of a critical section of an [`AdaptiveMutex`].
/// When this structure is dropped (falls out of scope), the critical section
/// ends, releasing the underlying lock if it was taken.
///
/// This structure is created by the [`lock`](AdaptiveMutex::lock) method on
/// [`AdaptiveMutex`].
#[must_use = "if unused, the critical section will immediately end"]
pub struct AdaptiveMutexGuard<'a, Lock: RawMutex = Spinlock> {
    mutex: &'a AdaptiveMutex<Lock>,
    regime: Regime,
    _marker: PhantomData<Lock::GuardMarker>,
}

impl AdaptiveMutex {
    loom_const_fn! {
        /// Returns a new `AdaptiveMutex` in the given `regime`, using a
        /// [`Spinlock`] as the underlying lock.
        ///
        /// # Examples
        ///
        /// ```
        /// use adaptive_lock::{AdaptiveMutex, Policy, Regime};
        ///
        /// let lock = AdaptiveMutex::new(Regime::LockFree);
        /// assert_eq!(lock.policy(), Policy::LockFree);
        /// ```
        #[must_use]
        pub fn new(regime: Regime) -> Self {
            Self::with_raw_mutex(regime, Spinlock::new())
        }
    }
}

impl<Lock> AdaptiveMutex<Lock> {
    loom_const_fn! {
        /// Returns a new `AdaptiveMutex` in the given `regime`, using the
        /// provided `lock` as the underlying lock.
        ///
        /// The underlying lock is taken by critical sections in the locked
        /// regime, and by [`set_policy`](Self::set_policy) to serialize
        /// transitions.
        #[must_use]
        pub fn with_raw_mutex(regime: Regime, lock: Lock) -> Self {
            Self {
                policy: AtomicPolicy::new(regime),
                lock,
                lock_free: Counter::new(),
                locked: Counter::new(),
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
    ///
    /// This never blocks. The returned value may be out of date as soon as it
    /// is returned, if another thread is calling
    /// [`set_policy`](Self::set_policy).
    #[inline]
    #[must_use]
    pub fn policy(&self) -> Policy {
        self.policy.load()
    }

    /// Returns the number of critical sections currently in flight in
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
    pub fn in_flight(&self, regime: Regime) -> usize {
        match regime {
            Regime::Locked => self.locked.in_flight(),
            Regime::LockFree => self.lock_free.in_flight(),
        }
    }
}

feature! {
    #![feature = "lock_api"]

    impl<Lock: lock_api::RawMutex> AdaptiveMutex<Lock> {
        loom_const_fn! {
            /// Returns a new `AdaptiveMutex` in the given `regime`, using the
            /// [`lock_api::RawMutex`] implementation `Lock` as the underlying
            /// lock.
            ///
            /// This allows using an OS-backed mutex, such as
            /// `parking_lot::RawMutex`, so that critical sections in the
            /// locked regime park rather than spin while they wait.
            #[must_use]
            pub fn with_lock_api(regime: Regime) -> Self {
                Self::with_raw_mutex(regime, Lock::INIT)
            }
        }
    }
}

impl<Lock: RawMutex> AdaptiveMutex<Lock> {
    /// Enters a critical section, returning a [`Ticket`] that must be passed
    /// to [`release`](Self::release) to end it.
    ///
    /// If the current policy is [`Locked`](Policy::Locked) or
    /// [`TransitioningToLocked`](Policy::TransitioningToLocked), this takes
    /// the underlying lock, blocking until it is available. Otherwise, this
    /// returns immediately without touching the underlying lock.
    ///
    /// Prefer [`lock`](Self::lock), which ends the critical section
    /// automatically.
    #[cfg_attr(test, track_caller)]
    pub fn acquire(&self) -> Ticket {
        self.policy
            .enter(&self.lock_free, &self.locked, || self.lock.lock())
    }

    /// Ends a critical section started by [`acquire`](Self::acquire).
    ///
    /// If the critical section took the underlying lock, it is released.
    ///
    /// # Safety
    ///
    /// `ticket` must have been returned by `acquire` on *this*
    /// `AdaptiveMutex`. If the underlying lock's guards are not [`Send`]
    /// (see [`RawMutex::GuardMarker`]), the ticket must be released on the
    /// thread that acquired it.
    #[cfg_attr(test, track_caller)]
    pub unsafe fn release(&self, ticket: Ticket) {
        match ticket.regime() {
            Regime::Locked => {
                self.locked.exit();
                self.lock.unlock();
            }
            Regime::LockFree => self.lock_free.exit(),
        }
    }

    /// Enters a critical section, returning an RAII guard which ends it when
    /// dropped.
    ///
    /// This blocks only if the policy requires the underlying lock and
    /// another thread is holding it.
    #[cfg_attr(test, track_caller)]
    pub fn lock(&self) -> AdaptiveMutexGuard<'_, Lock> {
        let ticket = self.acquire();
        AdaptiveMutexGuard {
            mutex: self,
            regime: ticket.regime(),
            _marker: PhantomData,
        }
    }

    /// Runs `f` inside a critical section, returning its result.
    pub fn with<U>(&self, f: impl FnOnce() -> U) -> U {
        let _guard = self.lock();
        f()
    }

    /// Switches the synchronization policy to `target`.
    ///
    /// This first takes the underlying lock, so that only one transition
    /// runs at a time. If the policy already equals `target`, it returns
    /// immediately. Otherwise it publishes the transitional policy for
    /// `target` (from which point new critical sections already behave as
    /// `target`), then spins until every critical section entered under the
    /// previous regime has exited, and finally publishes `target`.
    ///
    /// The wait has no timeout. A critical section that never ends stalls the
    /// transition forever; in particular, calling `set_policy` from inside a
    /// critical section of the same lock deadlocks.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Transitional`] if `target` is a transitional
    /// policy. Only [`Policy::Locked`] and [`Policy::LockFree`] are valid
    /// targets.
    #[cfg_attr(test, track_caller)]
    pub fn set_policy(&self, target: Policy) -> Result<(), PolicyError> {
        let target = Regime::try_from(target)?;
        let draining = match target {
            Regime::Locked => &self.lock_free,
            Regime::LockFree => &self.locked,
        };

        self.lock.lock();
        self.policy.transition("AdaptiveMutex", target, &[draining], self.backoff);
        unsafe {
            // Safety: we locked the underlying lock above.
            self.lock.unlock();
        }

        Ok(())
    }
}

impl<Lock: Default> Default for AdaptiveMutex<Lock> {
    /// Returns a new `AdaptiveMutex` in the [`Locked`](Policy::Locked) regime.
    fn default() -> Self {
        Self::with_raw_mutex(Regime::Locked, Lock::default())
    }
}

impl<Lock: fmt::Debug> fmt::Debug for AdaptiveMutex<Lock> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveMutex")
            .field("policy", &self.policy)
            .field("lock_free", &self.lock_free)
            .field("locked", &self.locked)
            .field("lock", &self.lock)
            .finish()
    }
}

// === impl AdaptiveMutexGuard ===

impl<Lock: RawMutex> AdaptiveMutexGuard<'_, Lock> {
    /// Returns the regime this critical section was entered in.
    #[inline]
    #[must_use]
    pub fn regime(&self) -> Regime {
        self.regime
    }
}

impl<Lock: RawMutex> Drop for AdaptiveMutexGuard<'_, Lock> {
    #[inline]
    #[cfg_attr(test, track_caller)]
    fn drop(&mut self) {
        unsafe {
            // Safety: the guard was created from a ticket returned by this
            // mutex's `acquire`, and owns it.
            self.mutex.release(Ticket::new(self.regime))
        }
    }
}

impl<Lock: RawMutex> fmt::Debug for AdaptiveMutexGuard<'_, Lock> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptiveMutexGuard")
            .field("regime", &self.regime)
            .finish_non_exhaustive()
    }
}
