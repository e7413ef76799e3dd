/// An [exponential backoff] for spin loops.
///
/// Both the default [`Spinlock`](crate::spin::Spinlock) and the policy
/// transition drain spin with a `Backoff`: each call to [`Backoff::spin`]
/// issues twice as many spin loop hints as the previous one, up to a maximum.
///
/// The backoff used while a transition waits for in-flight critical sections
/// can be configured with
/// [`AdaptiveMutex::with_backoff`](crate::AdaptiveMutex::with_backoff) and
/// [`AdaptiveRwLock::with_backoff`](crate::AdaptiveRwLock::with_backoff).
///
/// [exponential backoff]: https://en.wikipedia.org/wiki/Exponential_backoff
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Backoff {
    exp: u8,
    max: u8,
}

// === impl Backoff ===

impl Backoff {
    /// The largest exponent a `Backoff` can reach, and the one used by
    /// [`Backoff::new()`]. A single spin then issues up to 256 hints.
    pub const DEFAULT_MAX_EXPONENT: u8 = 8;

    /// Returns a backoff that stops growing at
    /// [`DEFAULT_MAX_EXPONENT`](Self::DEFAULT_MAX_EXPONENT).
    #[must_use]
    pub const fn new() -> Self {
        Self {
            exp: 0,
            max: Self::DEFAULT_MAX_EXPONENT,
        }
    }

    /// Returns a new exponential backoff with the provided max exponent.
    ///
    /// A lower maximum keeps a waiting transition more responsive, at the
    /// cost of more frequent loads of the in-flight counters.
    ///
    /// # Panics
    ///
    /// If `max` is greater than [`Self::DEFAULT_MAX_EXPONENT`].
    #[must_use]
    pub const fn with_max_exponent(max: u8) -> Self {
        assert!(max <= Self::DEFAULT_MAX_EXPONENT);
        Self { exp: 0, max }
    }

    /// Returns the maximum exponent this backoff will reach.
    #[inline]
    #[must_use]
    pub const fn max_exponent(&self) -> u8 {
        self.max
    }

    /// Waits a little, and doubles the next wait.
    ///
    /// Call this each time a spin loop finds that another context has not
    /// made progress yet. The `n`th call issues `2^n` [spin loop hints] (a
    /// `pause` or `yield` instruction on most targets), until `n` reaches the
    /// maximum exponent; later calls keep spinning for `2^max` hints.
    ///
    /// Under loom, this yields to the model's scheduler instead.
    ///
    /// [spin loop hints]: core::hint::spin_loop
    #[inline(always)]
    pub fn spin(&mut self) {
        #[cfg_attr(loom, allow(unused_variables))]
        let spins = 1 << self.exp;

        #[cfg(not(loom))]
        for _ in 0..spins {
            crate::loom::hint::spin_loop();
        }

        #[cfg(loom)]
        {
            test_debug!("would back off for {spins} spins");
            crate::loom::thread::yield_now();
        }

        self.exp = core::cmp::min(self.exp + 1, self.max);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
