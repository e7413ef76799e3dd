//! End-to-end scenarios exercising the public API from ordinary threads.
#![cfg(not(loom))]

mod util;

use adaptive_lock::{AdaptiveMutex, AdaptiveRwLock, Policy, Regime};
use std::{
    cell::UnsafeCell,
    sync::{
        atomic::{AtomicUsize, Ordering::SeqCst},
        Arc, Barrier,
    },
    thread,
    time::Duration,
};

/// A counter that is only ever touched inside an adaptive lock's critical
/// sections.
struct Counter {
    lock: AdaptiveMutex,
    value: UnsafeCell<u64>,
}

unsafe impl Sync for Counter {}

impl Counter {
    fn increment(&self) -> Regime {
        let guard = self.lock.lock();
        unsafe { *self.value.get() += 1 };
        guard.regime()
    }
}

#[test]
fn locked_increments_are_not_lost() {
    const THREADS: usize = 8;
    const INCREMENTS: u64 = 10_000;

    util::trace_init();
    let counter = Counter {
        lock: AdaptiveMutex::new(Regime::Locked),
        value: UnsafeCell::new(0),
    };

    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..INCREMENTS {
                    assert_eq!(counter.increment(), Regime::Locked);
                }
            });
        }
    });

    assert_eq!(counter.value.into_inner(), THREADS as u64 * INCREMENTS);
}

#[test]
fn transition_to_locked_waits_for_every_lock_free_section() {
    const THREADS: usize = 4;

    util::trace_init();
    let lock = Arc::new(AdaptiveMutex::new(Regime::LockFree));
    let exited = Arc::new(AtomicUsize::new(0));
    // The workers and the thread changing the policy.
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    let workers = (0..THREADS)
        .map(|_| {
            let lock = lock.clone();
            let exited = exited.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let ticket = lock.acquire();
                assert_eq!(ticket.regime(), Regime::LockFree);
                barrier.wait();

                thread::sleep(Duration::from_millis(20));
                exited.fetch_add(1, SeqCst);
                unsafe { lock.release(ticket) };
            })
        })
        .collect::<Vec<_>>();

    // All four critical sections are in flight once the barrier releases.
    barrier.wait();
    assert_eq!(lock.in_flight(Regime::LockFree), THREADS);
    lock.set_policy(Policy::Locked).unwrap();

    assert_eq!(exited.load(SeqCst), THREADS);
    assert_eq!(lock.policy(), Policy::Locked);
    assert_eq!(lock.in_flight(Regime::LockFree), 0);

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn rwlock_phases() {
    const READERS: usize = 4;
    const ROUNDS: usize = 1_000;

    util::trace_init();
    let lock = Arc::new(AdaptiveRwLock::new(Regime::Locked));
    let reads = Arc::new(AtomicUsize::new(0));

    // Build phase: writers under the lock.
    for _ in 0..ROUNDS {
        lock.with_write(|| ());
    }

    // Read phase: readers race with the switch to lock-free.
    let readers = (0..READERS)
        .map(|_| {
            let lock = lock.clone();
            let reads = reads.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    lock.with_read(|| reads.fetch_add(1, SeqCst));
                }
            })
        })
        .collect::<Vec<_>>();

    lock.set_policy(Policy::LockFree).unwrap();
    assert_eq!(lock.policy(), Policy::LockFree);
    assert_eq!(lock.read().regime(), Regime::LockFree);

    for reader in readers {
        reader.join().unwrap();
    }

    assert_eq!(reads.load(SeqCst), READERS * ROUNDS);
    assert_eq!(lock.readers(Regime::Locked), 0);
    assert_eq!(lock.readers(Regime::LockFree), 0);
}
