//! The policy transition protocol shared by [`AdaptiveMutex`] and
//! [`AdaptiveRwLock`].
//!
//! Every critical section is counted in exactly one in-flight [`Counter`],
//! chosen by the regime it committed to on entry. A transition publishes a
//! transitional policy (after which no new critical section can join the old
//! regime's counters) and then waits for the old regime's counters to drain
//! before publishing the target policy.
//!
//! The one subtle interleaving is an acquire that loads a lock-free policy,
//! is preempted, and only increments the lock-free counter after a
//! transition to [`Policy::Locked`] has already seen that counter at zero.
//! Both sides therefore follow a store, `SeqCst` fence, load sequence:
//!
//! ```text
//!   acquire                          transition
//!   lock_free += 1                   policy = TransitioningToLocked
//!   fence(SeqCst)                    fence(SeqCst)
//!   load policy                      load lock_free
//! ```
//!
//! and at least one of the two loads observes the other side's store. If the
//! acquire sees the transitional policy, it backs out and takes the lock; if
//! the transition sees the increment, it waits for the matching release.
//!
//! [`AdaptiveMutex`]: crate::AdaptiveMutex
//! [`AdaptiveRwLock`]: crate::AdaptiveRwLock
use crate::{
    loom::sync::atomic::{fence, AtomicIsize, AtomicU8, Ordering::*},
    policy::{Policy, Regime, Ticket},
    util::{Backoff, CachePadded},
};
use core::fmt;

/// An atomically updated [`Policy`].
pub(crate) struct AtomicPolicy(AtomicU8);

/// The number of critical sections in flight in one regime.
pub(crate) struct Counter(CachePadded<AtomicIsize>);

/// Counters above this are assumed to be the result of a leak rather than of
/// real concurrency.
const MAX_IN_FLIGHT: isize = isize::MAX / 2;

// === impl AtomicPolicy ===

impl AtomicPolicy {
    loom_const_fn! {
        pub(crate) fn new(regime: Regime) -> Self {
            Self(AtomicU8::new(Policy::from_regime(regime) as u8))
        }
    }

    #[inline]
    pub(crate) fn load(&self) -> Policy {
        let bits = self.0.load(SeqCst);
        match Policy::from_bits(bits) {
            Some(policy) => policy,
            None => unreachable!("adaptive lock policy word corrupted: {bits}"),
        }
    }

    #[inline]
    fn store(&self, policy: Policy) {
        test_dbg!(self.0.store(policy as u8, SeqCst));
    }

    /// Enters a critical section.
    ///
    /// If the current policy admits lock-free entry, the section is counted
    /// in `lock_free` and no lock is taken. Otherwise, `lock` is called to
    /// take the underlying lock and the section is counted in `locked`.
    #[inline]
    #[cfg_attr(test, track_caller)]
    pub(crate) fn enter(
        &self,
        lock_free: &Counter,
        locked: &Counter,
        lock: impl FnOnce(),
    ) -> Ticket {
        if test_dbg!(self.load()).admits(Regime::LockFree) {
            lock_free.enter();
            fence(SeqCst);
            if test_dbg!(self.load()).admits(Regime::LockFree) {
                return Ticket::new(Regime::LockFree);
            }

            // A transition to `Locked` was published before our increment
            // could be seen by it. Undo the increment and take the lock.
            lock_free.exit();
            trace!("adaptive lock: entry raced with transition to locked; taking the lock");
        }

        lock();
        locked.enter();
        Ticket::new(Regime::Locked)
    }

    /// Moves the policy to `target`.
    ///
    /// The caller must hold the lock that serializes transitions for the
    /// whole call, and `draining` must be the counters of `target.opposite()`.
    /// Spins until every one of them reaches zero.
    #[cfg_attr(not(any(test, feature = "tracing", loom)), allow(unused_variables))]
    pub(crate) fn transition(
        &self,
        lock: &'static str,
        target: Regime,
        draining: &[&Counter],
        mut backoff: Backoff,
    ) {
        let from = self.load();
        if from == Policy::from_regime(target) {
            trace!(lock, %target, "set_policy: already in target regime");
            return;
        }
        debug_assert!(
            !from.is_transitional(),
            "found {from} while holding the transition lock; a previous transition was abandoned"
        );

        self.store(Policy::transitioning_to(target));
        fence(SeqCst);
        trace!(lock, %from, %target, "set_policy: published transitional policy; draining");

        let mut rounds = 0;
        // Keep waiting while *any* of the old regime's counters is non-zero.
        while draining.iter().any(|counter| !counter.is_drained()) {
            backoff.spin();
            rounds += 1;
        }

        self.store(Policy::from_regime(target));
        debug!(lock, %from, %target, rounds, "set_policy: transition complete");
    }
}

impl fmt::Debug for AtomicPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

// === impl Counter ===

impl Counter {
    loom_const_fn! {
        pub(crate) fn new() -> Self {
            Self(CachePadded::new(AtomicIsize::new(0)))
        }
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    pub(crate) fn enter(&self) {
        let prev = test_dbg!(self.0.fetch_add(1, SeqCst));
        assert!(
            prev < MAX_IN_FLIGHT,
            "in-flight critical section counter overflow! are tickets being leaked?"
        );
    }

    #[inline]
    #[cfg_attr(test, track_caller)]
    pub(crate) fn exit(&self) {
        let _prev = test_dbg!(self.0.fetch_sub(1, SeqCst));
        debug_assert!(
            _prev > 0,
            "released a critical section that was never entered (in-flight count was {_prev})"
        );
    }

    #[inline]
    fn is_drained(&self) -> bool {
        self.0.load(SeqCst) <= 0
    }

    /// A snapshot of the in-flight count. Not for synchronization.
    #[inline]
    pub(crate) fn in_flight(&self) -> usize {
        self.0.load(Relaxed).max(0) as usize
    }
}

impl fmt::Debug for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0.load(Relaxed), f)
    }
}
