//! Synchronization policies.
//!
//! A [`Policy`] is the synchronization regime an adaptive lock is currently
//! operating in. Two of its values are *stable* ([`Policy::Locked`] and
//! [`Policy::LockFree`]); the other two are *transitional*, and are only
//! observed while a call to `set_policy` is waiting for critical sections
//! entered under the previous regime to exit.
//!
//! A [`Regime`] names one of the two stable regimes. It is the type of a
//! policy *target*, and it is recorded in every [`Ticket`] so that releasing a
//! critical section always undoes exactly what acquiring it did.
use core::fmt;

/// The synchronization policy of an adaptive lock.
///
/// The discriminants are the lock's in-memory encoding of the policy. Note
/// that [`Policy::Locked`] is zero: a lock constructed with [`Default`] starts
/// out locked.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Policy {
    /// Conventional mutual exclusion: every critical section takes the
    /// underlying lock.
    Locked = 0,
    /// No synchronization: critical sections run without taking the
    /// underlying lock.
    LockFree = 1,
    /// A transition to [`Policy::Locked`] is in progress.
    ///
    /// New critical sections already take the underlying lock, while the
    /// transition waits for lock-free critical sections that started earlier
    /// to exit.
    TransitioningToLocked = 2,
    /// A transition to [`Policy::LockFree`] is in progress.
    ///
    /// New critical sections already run lock-free, while the transition
    /// waits for locked critical sections that started earlier to exit.
    TransitioningToLockFree = 3,
}

/// One of the two stable synchronization regimes.
///
/// This is both the target of a policy transition and the branch a critical
/// section committed to when it was entered (see [`Ticket::regime`]).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Regime {
    /// The critical section holds the underlying lock.
    Locked,
    /// The critical section runs without synchronization.
    LockFree,
}

/// Proof that a critical section was entered, and in which [`Regime`].
///
/// A `Ticket` is returned by the raw `acquire` methods of the adaptive locks
/// and must be handed back to the matching `release` method of the *same*
/// lock. Because the ticket remembers which branch was taken on entry,
/// release never has to guess it from the current policy, which may have
/// moved on in the meantime.
///
/// Most code should prefer the RAII guards returned by
/// [`AdaptiveMutex::lock`](crate::AdaptiveMutex::lock),
/// [`AdaptiveRwLock::read`](crate::AdaptiveRwLock::read) and
/// [`AdaptiveRwLock::write`](crate::AdaptiveRwLock::write), which manage the
/// ticket themselves.
#[derive(Debug, Eq, PartialEq)]
#[must_use = "a `Ticket` must be passed back to the lock's release method, or \
    the critical section never ends and policy transitions will hang"]
pub struct Ticket {
    regime: Regime,
}

/// Errors returned when a [`Policy`] is used where only a stable one is valid.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// A transitional policy was passed as the target of `set_policy`.
    #[error("cannot switch to {0}: only `locked` and `lock-free` are valid targets")]
    Transitional(Policy),
    /// A byte did not encode any [`Policy`].
    #[error("{0} is not a valid policy encoding")]
    InvalidEncoding(u8),
}

// === impl Policy ===

impl Policy {
    /// Returns the regime this policy is in, or is transitioning to.
    ///
    /// # Examples
    ///
    /// ```
    /// use adaptive_lock::{Policy, Regime};
    ///
    /// assert_eq!(Policy::Locked.target(), Regime::Locked);
    /// assert_eq!(Policy::TransitioningToLockFree.target(), Regime::LockFree);
    /// ```
    #[inline]
    #[must_use]
    pub const fn target(self) -> Regime {
        match self {
            Self::Locked | Self::TransitioningToLocked => Regime::Locked,
            Self::LockFree | Self::TransitioningToLockFree => Regime::LockFree,
        }
    }

    /// Returns `true` if a policy transition is in progress.
    #[inline]
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::TransitioningToLocked | Self::TransitioningToLockFree
        )
    }

    /// Returns `true` if a critical section may be entered in `regime` while
    /// this policy is current.
    ///
    /// A transitional policy admits the regime it is moving *to*: once a
    /// transition has been published, new critical sections already behave
    /// as the target regime, so that the old regime's in-flight count can
    /// only shrink.
    #[inline]
    #[must_use]
    pub const fn admits(self, regime: Regime) -> bool {
        matches!(
            (self.target(), regime),
            (Regime::Locked, Regime::Locked) | (Regime::LockFree, Regime::LockFree)
        )
    }

    #[inline]
    pub(crate) const fn from_regime(regime: Regime) -> Self {
        match regime {
            Regime::Locked => Self::Locked,
            Regime::LockFree => Self::LockFree,
        }
    }

    /// The transitional policy published while moving to `regime`.
    #[inline]
    pub(crate) const fn transitioning_to(regime: Regime) -> Self {
        match regime {
            Regime::Locked => Self::TransitioningToLocked,
            Regime::LockFree => Self::TransitioningToLockFree,
        }
    }

    #[inline]
    pub(crate) const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::Locked),
            1 => Some(Self::LockFree),
            2 => Some(Self::TransitioningToLocked),
            3 => Some(Self::TransitioningToLockFree),
            _ => None,
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Locked => "locked",
            Self::LockFree => "lock-free",
            Self::TransitioningToLocked => "transitioning to locked",
            Self::TransitioningToLockFree => "transitioning to lock-free",
        })
    }
}

impl From<Regime> for Policy {
    #[inline]
    fn from(regime: Regime) -> Self {
        Self::from_regime(regime)
    }
}

impl TryFrom<u8> for Policy {
    type Error = PolicyError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Self::from_bits(bits).ok_or(PolicyError::InvalidEncoding(bits))
    }
}

impl From<Policy> for u8 {
    #[inline]
    fn from(policy: Policy) -> Self {
        policy as u8
    }
}

// === impl Regime ===

impl Regime {
    /// Returns the other regime.
    ///
    /// A transition to a regime must wait for every critical section that
    /// entered under the *opposite* regime to exit.
    #[inline]
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Locked => Self::LockFree,
            Self::LockFree => Self::Locked,
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&Policy::from_regime(*self), f)
    }
}

impl TryFrom<Policy> for Regime {
    type Error = PolicyError;

    /// Converts a stable policy into its regime, rejecting transitional
    /// policies.
    fn try_from(policy: Policy) -> Result<Self, Self::Error> {
        if policy.is_transitional() {
            return Err(PolicyError::Transitional(policy));
        }
        Ok(policy.target())
    }
}

// === impl Ticket ===

impl Ticket {
    #[inline]
    pub(crate) const fn new(regime: Regime) -> Self {
        Self { regime }
    }

    /// Returns the regime the critical section was entered in.
    #[inline]
    #[must_use]
    pub const fn regime(&self) -> Regime {
        self.regime
    }
}
