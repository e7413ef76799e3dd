//! Switches the crate's atomics, threads and cells between [`loom`]'s
//! model-checked versions (under `cfg(loom)`) and the real ones.
//!
//! Outside of loom, `model` runs its closure once on real threads, so that
//! the same tests serve both as loom models and as ordinary stress tests.
//!
//! [`loom`]: https://crates.io/crates/loom
#![allow(dead_code, unused_imports)]

#[cfg(loom)]
pub(crate) use loom::{cell, hint, model, thread};

#[cfg(loom)]
pub(crate) mod sync {
    pub(crate) use loom::sync::*;
}

#[cfg(not(loom))]
pub(crate) use portable_atomic::hint;

#[cfg(not(loom))]
pub(crate) mod sync {
    pub(crate) mod atomic {
        pub(crate) use portable_atomic::{
            fence, AtomicBool, AtomicIsize, AtomicU8, AtomicUsize, Ordering,
        };
    }

    #[cfg(test)]
    pub(crate) use alloc::sync::Arc;
}

/// Runs `f` once, inside a span named after the current test.
#[cfg(all(test, not(loom)))]
pub(crate) fn model(f: impl FnOnce()) {
    let _trace = crate::util::test::trace_init();
    let test = std::thread::current();
    let _span = tracing::info_span!("model", test = test.name().unwrap_or("?")).entered();
    f();
    tracing::debug!("model finished");
}
