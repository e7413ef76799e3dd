use super::*;
use crate::loom::{self, cell::UnsafeCell, sync::Arc, thread};

struct Guarded {
    lock: AdaptiveRwLock,
    value: UnsafeCell<usize>,
}

unsafe impl Sync for Guarded {}

impl Guarded {
    fn new(regime: Regime) -> Self {
        Self {
            lock: AdaptiveRwLock::new(regime),
            value: UnsafeCell::new(0),
        }
    }

    fn increment(&self) {
        let _guard = self.lock.write();
        self.value.with_mut(|value| unsafe { *value += 1 });
    }

    fn read(&self) -> usize {
        let _guard = self.lock.read();
        self.value.with(|value| unsafe { *value })
    }
}

#[test]
fn locked_readers_and_writer() {
    loom::model(|| {
        let shared = Arc::new(Guarded::new(Regime::Locked));

        const READERS: usize = if cfg!(loom) { 1 } else { 4 };
        let readers = (0..READERS)
            .map(|_| {
                let shared = shared.clone();
                thread::spawn(move || shared.read())
            })
            .collect::<Vec<_>>();

        shared.increment();

        for reader in readers {
            let seen = reader.join().unwrap();
            assert!(seen <= 1, "reader saw {seen}");
        }
        assert_eq!(shared.read(), 1);
    });
}

#[test]
fn transition_to_locked_waits_for_lock_free_reader() {
    loom::model(|| {
        let shared = Arc::new(Guarded::new(Regime::LockFree));

        let reader = thread::spawn({
            let shared = shared.clone();
            move || shared.read()
        });

        shared.lock.set_policy(Policy::Locked).unwrap();
        shared.increment();

        let seen = reader.join().unwrap();
        assert!(seen <= 1, "reader saw {seen}");
        assert_eq!(shared.lock.readers(Regime::LockFree), 0);
    });
}

#[test]
fn transition_to_lock_free_waits_for_locked_writer() {
    loom::model(|| {
        let shared = Arc::new(Guarded::new(Regime::Locked));

        let writer = thread::spawn({
            let shared = shared.clone();
            move || shared.increment()
        });

        shared.lock.set_policy(Policy::LockFree).unwrap();
        writer.join().unwrap();
        assert_eq!(shared.read(), 1);
    });
}

#[cfg(not(loom))]
mod std_threads {
    use super::*;
    use crate::{
        loom::sync::atomic::{AtomicBool, AtomicUsize, Ordering::*},
        util::test::{assert_send_sync, trace_init, trace_init_with_default},
    };
    use std::time::Duration;

    /// Starts `set_policy(Locked)` on another thread, and waits until it has
    /// published the transitional policy.
    fn begin_transition_to_locked(
        lock: &Arc<AdaptiveRwLock>,
    ) -> (thread::JoinHandle<()>, Arc<AtomicBool>) {
        let done = Arc::new(AtomicBool::new(false));
        let setter = thread::spawn({
            let lock = lock.clone();
            let done = done.clone();
            move || {
                lock.set_policy(Policy::Locked).unwrap();
                done.store(true, SeqCst);
            }
        });

        while lock.policy() != Policy::TransitioningToLocked {
            thread::yield_now();
        }
        (setter, done)
    }

    #[test]
    fn lone_lock_free_reader_blocks_transition() {
        let _trace = trace_init();
        let lock = Arc::new(AdaptiveRwLock::new(Regime::LockFree));

        let reader = lock.acquire_shared();
        assert_eq!(reader.regime(), Regime::LockFree);
        assert_eq!(lock.writers(Regime::LockFree), 0);

        let (setter, done) = begin_transition_to_locked(&lock);
        std::thread::sleep(Duration::from_millis(10));
        assert!(!done.load(SeqCst), "transition finished with a reader in flight");

        unsafe { lock.release_shared(reader) };
        setter.join().unwrap();
        assert_eq!(lock.policy(), Policy::Locked);
    }

    #[test]
    fn lone_lock_free_writer_blocks_transition() {
        let _trace = trace_init();
        let lock = Arc::new(AdaptiveRwLock::new(Regime::LockFree));

        let writer = lock.acquire_exclusive();
        assert_eq!(writer.regime(), Regime::LockFree);
        assert_eq!(lock.readers(Regime::LockFree), 0);

        let (setter, done) = begin_transition_to_locked(&lock);
        std::thread::sleep(Duration::from_millis(10));
        assert!(!done.load(SeqCst), "transition finished with a writer in flight");

        unsafe { lock.release_exclusive(writer) };
        setter.join().unwrap();
        assert_eq!(lock.policy(), Policy::Locked);
    }

    #[test]
    fn transition_waits_for_both_readers_and_writers() {
        let _trace = trace_init();
        let lock = Arc::new(AdaptiveRwLock::new(Regime::LockFree));

        let reader = lock.acquire_shared();
        let writer = lock.acquire_exclusive();
        let (setter, done) = begin_transition_to_locked(&lock);

        // The writers have drained, but the reader is still in flight.
        unsafe { lock.release_exclusive(writer) };
        std::thread::sleep(Duration::from_millis(10));
        assert!(!done.load(SeqCst));
        assert_eq!(lock.policy(), Policy::TransitioningToLocked);

        unsafe { lock.release_shared(reader) };
        setter.join().unwrap();
        assert_eq!(lock.policy(), Policy::Locked);
    }

    #[test]
    fn transitions_only_drain_the_old_regime() {
        let _trace = trace_init();
        let lock = AdaptiveRwLock::new(Regime::LockFree);

        // Counted as in flight in the locked regime, without holding the
        // underlying lock, so that only the counters are in the way.
        lock.locked_readers.enter();
        lock.locked_writers.enter();
        lock.set_policy(Policy::Locked).unwrap();
        assert_eq!(lock.policy(), Policy::Locked);
        lock.locked_readers.exit();
        lock.locked_writers.exit();

        lock.lock_free_readers.enter();
        lock.lock_free_writers.enter();
        lock.set_policy(Policy::LockFree).unwrap();
        assert_eq!(lock.policy(), Policy::LockFree);
        lock.lock_free_readers.exit();
        lock.lock_free_writers.exit();
    }

    #[test]
    fn lock_free_does_not_touch_underlying_lock() {
        let _trace = trace_init();
        let lock = AdaptiveRwLock::new(Regime::LockFree);

        lock.lock.lock_exclusive();
        let r = lock.read();
        let w = lock.write();
        assert_eq!(r.regime(), Regime::LockFree);
        assert_eq!(w.regime(), Regime::LockFree);
        assert_eq!(lock.readers(Regime::LockFree), 1);
        assert_eq!(lock.writers(Regime::LockFree), 1);
        drop((r, w));
        unsafe { lock.lock.unlock_exclusive() };
    }

    #[test]
    fn locked_writer_excludes_readers() {
        let _trace = trace_init();
        let lock = Arc::new(AdaptiveRwLock::new(Regime::Locked));
        let read = Arc::new(AtomicBool::new(false));

        let writer = lock.write();
        let reader = thread::spawn({
            let lock = lock.clone();
            let read = read.clone();
            move || {
                lock.with_read(|| read.store(true, SeqCst));
            }
        });

        std::thread::sleep(Duration::from_millis(10));
        assert!(!read.load(SeqCst), "reader entered while a writer held the lock");

        drop(writer);
        reader.join().unwrap();
        assert!(read.load(SeqCst));
        assert_eq!(lock.with_write(|| 7), 7);
    }

    #[test]
    fn set_policy_is_idempotent() {
        let _trace = trace_init();
        let lock = AdaptiveRwLock::new(Regime::LockFree);

        // Already lock-free: the outstanding reader is not waited on.
        let reader = lock.acquire_shared();
        assert_eq!(reader.regime(), Regime::LockFree);
        lock.set_policy(Policy::LockFree).unwrap();
        assert_eq!(lock.policy(), Policy::LockFree);
        assert_eq!(lock.readers(Regime::LockFree), 1);
        unsafe { lock.release_shared(reader) };

        lock.set_policy(Policy::Locked).unwrap();
        let writer = lock.acquire_exclusive();
        assert_eq!(writer.regime(), Regime::Locked);
        unsafe { lock.release_exclusive(writer) };

        lock.set_policy(Policy::Locked).unwrap();
        assert_eq!(lock.policy(), Policy::Locked);
        assert_eq!(lock.read().regime(), Regime::Locked);
        assert_eq!(lock.readers(Regime::Locked), 0);
        assert_eq!(lock.writers(Regime::Locked), 0);
    }

    #[test]
    fn mixed_traffic_drains_on_every_transition() {
        const THREADS: usize = 4;
        const ITERS: usize = 2_000;
        const FLIPS: usize = 20;

        struct State {
            lock: AdaptiveRwLock,
            locked_readers: AtomicUsize,
            locked_writers: AtomicUsize,
            lock_free_inside: AtomicUsize,
            total: AtomicUsize,
        }

        let _trace = trace_init_with_default("adaptive_lock=info");
        let state = Arc::new(State {
            lock: AdaptiveRwLock::new(Regime::LockFree),
            locked_readers: AtomicUsize::new(0),
            locked_writers: AtomicUsize::new(0),
            lock_free_inside: AtomicUsize::new(0),
            total: AtomicUsize::new(0),
        });

        let workers = (0..THREADS)
            .map(|t| {
                let state = state.clone();
                thread::spawn(move || {
                    for i in 0..ITERS {
                        if (i + t) % 3 == 0 {
                            let guard = state.lock.write();
                            match guard.regime() {
                                Regime::Locked => {
                                    let prev = state.locked_writers.fetch_add(1, SeqCst);
                                    assert_eq!(prev, 0, "two locked writers at once");
                                    assert_eq!(
                                        state.locked_readers.load(SeqCst),
                                        0,
                                        "locked reader inside with a locked writer"
                                    );
                                    state.total.fetch_add(1, Relaxed);
                                    state.locked_writers.fetch_sub(1, SeqCst);
                                }
                                Regime::LockFree => {
                                    state.lock_free_inside.fetch_add(1, SeqCst);
                                    state.total.fetch_add(1, Relaxed);
                                    state.lock_free_inside.fetch_sub(1, SeqCst);
                                }
                            }
                            drop(guard);
                        } else {
                            let guard = state.lock.read();
                            match guard.regime() {
                                Regime::Locked => {
                                    state.locked_readers.fetch_add(1, SeqCst);
                                    assert_eq!(
                                        state.locked_writers.load(SeqCst),
                                        0,
                                        "locked writer inside with a locked reader"
                                    );
                                    state.total.fetch_add(1, Relaxed);
                                    state.locked_readers.fetch_sub(1, SeqCst);
                                }
                                Regime::LockFree => {
                                    state.lock_free_inside.fetch_add(1, SeqCst);
                                    state.total.fetch_add(1, Relaxed);
                                    state.lock_free_inside.fetch_sub(1, SeqCst);
                                }
                            }
                            drop(guard);
                        }
                    }
                })
            })
            .collect::<Vec<_>>();

        for _ in 0..FLIPS {
            state.lock.set_policy(Policy::Locked).unwrap();
            // No lock-free reader or writer survives a transition to locked.
            assert_eq!(state.lock_free_inside.load(SeqCst), 0);
            thread::yield_now();
            state.lock.set_policy(Policy::LockFree).unwrap();
            thread::yield_now();
        }

        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(state.total.load(SeqCst), THREADS * ITERS);
        for regime in [Regime::Locked, Regime::LockFree] {
            assert_eq!(state.lock.readers(regime), 0);
            assert_eq!(state.lock.writers(regime), 0);
        }
    }

    #[test]
    fn transitional_targets_are_rejected() {
        let lock = AdaptiveRwLock::new(Regime::LockFree);
        assert_eq!(
            lock.set_policy(Policy::TransitioningToLocked),
            Err(PolicyError::Transitional(Policy::TransitioningToLocked))
        );
        assert_eq!(lock.policy(), Policy::LockFree);
    }

    #[test]
    fn default_is_locked() {
        let lock = AdaptiveRwLock::<RwSpinlock>::default();
        assert_eq!(lock.policy(), Policy::Locked);
        assert_eq!(lock.read().regime(), Regime::Locked);
    }

    #[test]
    fn custom_backoff() {
        let lock = AdaptiveRwLock::new(Regime::Locked).with_backoff(Backoff::with_max_exponent(2));
        lock.set_policy(Policy::LockFree).unwrap();
        assert_eq!(lock.policy(), Policy::LockFree);
    }

    #[test]
    fn send_sync() {
        assert_send_sync::<AdaptiveRwLock>();
        assert_send_sync::<AdaptiveRwLockReadGuard<'_>>();
        assert_send_sync::<AdaptiveRwLockWriteGuard<'_>>();
    }

    #[cfg(feature = "lock_api")]
    #[test]
    fn parking_lot_underlying_lock() {
        let _trace = trace_init();
        let lock = AdaptiveRwLock::<parking_lot::RawRwLock>::with_lock_api(Regime::LockFree);

        {
            let _r1 = lock.read();
            let _r2 = lock.read();
            assert_eq!(lock.readers(Regime::LockFree), 2);
        }

        lock.set_policy(Policy::Locked).unwrap();
        let r = lock.read();
        assert_eq!(r.regime(), Regime::Locked);
        assert!(RawRwLock::is_locked(&lock.lock));
        drop(r);
        assert!(!RawRwLock::is_locked(&lock.lock));
    }
}

#[cfg(not(loom))]
mod prop {
    use super::*;
    use crate::util::test::trace_init;
    use core::ops::Range;
    use proptest::{collection::vec, num::usize::ANY};

    const FUZZ_RANGE: Range<usize> = 0..100;

    #[derive(Debug)]
    enum Op {
        Read,
        Write,
        Release(usize),
        SetPolicy(Regime),
    }

    #[derive(Debug)]
    enum Held {
        Read(Ticket),
        Write(Ticket),
    }

    impl Held {
        fn regime(&self) -> Regime {
            match self {
                Held::Read(ticket) | Held::Write(ticket) => ticket.regime(),
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn counters_match_outstanding_tickets(ops in vec(ANY, FUZZ_RANGE)) {
            let ops = ops
                .iter()
                .map(|i| match i % 5 {
                    0 => Op::Read,
                    1 => Op::Write,
                    2 => Op::Release(i / 5),
                    3 => Op::SetPolicy(Regime::Locked),
                    4 => Op::SetPolicy(Regime::LockFree),
                    _ => unreachable!(),
                })
                .collect::<Vec<_>>();

            let _trace = trace_init();
            let _span = tracing::info_span!("fuzz").entered();
            tracing::info!(?ops);
            run_fuzz(ops);
        }
    }

    /// Applies `ops` to a lock on a single thread, skipping any operation
    /// that would block forever because this thread holds what it waits on.
    fn run_fuzz(ops: Vec<Op>) {
        let lock = AdaptiveRwLock::new(Regime::Locked);
        let mut held: Vec<Held> = Vec::new();

        let count = |held: &[Held], write: bool, regime: Regime| {
            held.iter()
                .filter(|h| matches!(h, Held::Write(_)) == write && h.regime() == regime)
                .count()
        };

        for op in ops {
            let policy = lock.policy();
            assert!(!policy.is_transitional(), "single-threaded transitions always complete");

            let locked_readers = count(&held, false, Regime::Locked);
            let locked_writers = count(&held, true, Regime::Locked);
            let lock_free = count(&held, false, Regime::LockFree) + count(&held, true, Regime::LockFree);

            match op {
                Op::Read => {
                    if policy == Policy::Locked && locked_writers > 0 {
                        continue;
                    }
                    let ticket = lock.acquire_shared();
                    assert_eq!(ticket.regime(), policy.target());
                    held.push(Held::Read(ticket));
                }
                Op::Write => {
                    if policy == Policy::Locked && locked_readers + locked_writers > 0 {
                        continue;
                    }
                    let ticket = lock.acquire_exclusive();
                    assert_eq!(ticket.regime(), policy.target());
                    held.push(Held::Write(ticket));
                }
                Op::Release(i) => {
                    if held.is_empty() {
                        continue;
                    }
                    match held.swap_remove(i % held.len()) {
                        Held::Read(ticket) => unsafe { lock.release_shared(ticket) },
                        Held::Write(ticket) => unsafe { lock.release_exclusive(ticket) },
                    }
                }
                Op::SetPolicy(target) => {
                    // `set_policy` takes the underlying lock exclusively, and
                    // then waits for the other regime to drain.
                    let would_block = locked_readers + locked_writers > 0
                        || (target == Regime::Locked && policy == Policy::LockFree && lock_free > 0);
                    if would_block {
                        continue;
                    }
                    lock.set_policy(target.into()).unwrap();
                    assert_eq!(lock.policy(), Policy::from(target));
                }
            }

            for regime in [Regime::Locked, Regime::LockFree] {
                assert_eq!(lock.readers(regime), count(&held, false, regime), "{regime} readers");
                assert_eq!(lock.writers(regime), count(&held, true, regime), "{regime} writers");
            }
        }

        for h in held {
            match h {
                Held::Read(ticket) => unsafe { lock.release_shared(ticket) },
                Held::Write(ticket) => unsafe { lock.release_exclusive(ticket) },
            }
        }
        assert!(!RawRwLock::is_locked(&lock.lock));
    }
}
