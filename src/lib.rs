#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg, doc_cfg_hide))]
#![cfg_attr(docsrs, doc(cfg_hide(docsrs, loom)))]
#![cfg_attr(not(any(test, feature = "std")), no_std)]
#![warn(missing_docs, missing_debug_implementations)]

#[cfg(test)]
extern crate alloc;

pub(crate) mod loom;

#[macro_use]
pub mod util;

pub mod blocking;
pub mod mutex;
pub mod policy;
pub mod rwlock;
pub mod spin;
mod transition;

#[doc(inline)]
pub use self::mutex::{AdaptiveMutex, AdaptiveMutexGuard};
#[doc(inline)]
pub use self::policy::{Policy, PolicyError, Regime, Ticket};
#[doc(inline)]
pub use self::rwlock::{AdaptiveRwLock, AdaptiveRwLockReadGuard, AdaptiveRwLockWriteGuard};
