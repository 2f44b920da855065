use {
    crate::{BackendChoice, BootstrapLock, Guard},
    std::{
        mem,
        panic::{self, AssertUnwindSafe},
        sync::{
            Arc, Barrier,
            atomic::{AtomicBool, AtomicUsize, Ordering::SeqCst},
            mpsc,
        },
        thread,
        time::{Duration, Instant},
    },
    tracing::{Event, Metadata, Subscriber, span},
};

const SETTLE: Duration = Duration::from_millis(100);
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

fn assert_unlocked(lock: &BootstrapLock) {
    assert_eq!(lock.depth(), None);
    assert_eq!(lock.is_locked(), false);
    assert_eq!(lock.is_held_by_current_thread(), false);
}

fn acquire_in_other_thread(lock: &BootstrapLock) {
    thread::scope(|s| s.spawn(|| drop(lock.acquire())).join().unwrap());
}

fn fresh(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    assert_unlocked(&lock);
    assert_eq!(lock.backend_choice(), None);
}

fn first_acquire_constructs_backend(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    drop(lock.acquire());
    assert_eq!(lock.backend_choice(), Some(choice));
    assert_unlocked(&lock);
}

fn concurrent_first_acquire(choice: BackendChoice) {
    const THREADS: usize = 8;
    let lock = BootstrapLock::with_backend(choice);
    let barrier = Barrier::new(THREADS);
    let done = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                let _guard = lock.acquire();
                assert_eq!(lock.backend_choice(), Some(choice));
                done.fetch_add(1, SeqCst);
            });
        }
    });
    assert_eq!(done.load(SeqCst), THREADS);
    assert_unlocked(&lock);
}

fn depth_follows_nesting(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    let mut guards = Vec::new();
    // push = acquire, pop = release
    let ops = [1, 1, 0, 1, 1, 1, 0, 0, 1, 0, 0, 0, 1, 0];
    for op in ops {
        if op == 1 {
            guards.push(lock.acquire());
        } else {
            drop(guards.pop().unwrap());
        }
        if guards.is_empty() {
            assert_unlocked(&lock);
        } else {
            assert_eq!(lock.depth(), Some(guards.len() as u64));
            assert!(lock.is_locked());
            assert!(lock.is_held_by_current_thread());
        }
    }
}

fn guards_are_interchangeable(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    let outer = lock.acquire();
    let inner = lock.acquire();
    drop(outer);
    assert_eq!(lock.depth(), Some(1));
    drop(inner);
    assert_unlocked(&lock);
}

fn nested_hold_blocks_others(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    let b_acquired = AtomicBool::new(false);
    let a1 = lock.acquire();
    let a2 = lock.acquire();
    assert_eq!(lock.depth(), Some(2));
    thread::scope(|s| {
        s.spawn(|| {
            let _guard = lock.acquire();
            b_acquired.store(true, SeqCst);
            assert_eq!(lock.depth(), Some(1));
        });
        drop(a2);
        assert_eq!(lock.depth(), Some(1));
        thread::sleep(SETTLE);
        assert_eq!(b_acquired.load(SeqCst), false);
        drop(a1);
    });
    assert_eq!(b_acquired.load(SeqCst), true);
    assert_unlocked(&lock);
}

fn free_lock_does_not_block(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    acquire_in_other_thread(&lock);
    drop(lock.acquire());
    acquire_in_other_thread(&lock);
    assert_unlocked(&lock);
}

fn mutual_exclusion(choice: BackendChoice) {
    const THREADS: usize = 4;
    const ITERATIONS: usize = 500;
    let lock = BootstrapLock::with_backend(choice);
    let inside = AtomicUsize::new(0);
    let total = AtomicUsize::new(0);
    thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for i in 0..ITERATIONS {
                    let _outer = lock.acquire();
                    assert_eq!(inside.fetch_add(1, SeqCst), 0);
                    {
                        let _inner = lock.acquire();
                        assert_eq!(inside.load(SeqCst), 1);
                    }
                    if i % 16 == 0 {
                        thread::yield_now();
                    }
                    total.fetch_add(1, SeqCst);
                    assert_eq!(inside.fetch_sub(1, SeqCst), 1);
                }
            });
        }
    });
    assert_eq!(total.load(SeqCst), THREADS * ITERATIONS);
    assert_unlocked(&lock);
}

fn no_lost_wakeup(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    let (tx, rx) = mpsc::channel();
    let guard = lock.acquire();
    thread::scope(|s| {
        s.spawn(|| {
            let _guard = lock.acquire();
            tx.send(Instant::now()).unwrap();
        });
        thread::sleep(SETTLE);
        assert!(rx.try_recv().is_err());
        let released_at = Instant::now();
        drop(guard);
        let acquired_at = rx.recv_timeout(TEST_TIMEOUT).unwrap();
        assert!(acquired_at >= released_at);
    });
    assert_unlocked(&lock);
}

fn release_before_waiter_arrives(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    for _ in 0..3 {
        drop(lock.acquire());
    }
    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        s.spawn(|| {
            drop(lock.acquire());
            tx.send(()).unwrap();
        });
        rx.recv_timeout(TEST_TIMEOUT).unwrap();
    });
    assert_unlocked(&lock);
}

fn held_by_current_thread(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    let barrier1 = Barrier::new(2);
    let barrier2 = Barrier::new(2);
    thread::scope(|s| {
        let handle = s.spawn(|| {
            let _guard = lock.acquire();
            assert_eq!(lock.is_held_by_current_thread(), true);
            barrier1.wait();
            barrier2.wait();
        });
        barrier1.wait();
        assert_eq!(lock.is_locked(), true);
        assert_eq!(lock.is_held_by_current_thread(), false);
        assert_eq!(lock.depth(), None);
        barrier2.wait();
        handle.join().unwrap();
    });
    assert_unlocked(&lock);
}

fn forget_and_force_release(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    mem::forget(lock.acquire());
    let guard = lock.acquire();
    assert_eq!(lock.depth(), Some(2));
    drop(guard);
    assert_eq!(lock.depth(), Some(1));
    assert!(lock.is_locked());
    unsafe {
        lock.force_release();
    }
    assert_unlocked(&lock);
}

fn released_on_unwind(choice: BackendChoice) {
    let lock = BootstrapLock::with_backend(choice);
    let result = thread::scope(|s| {
        s.spawn(|| {
            panic::catch_unwind::<_, ()>(AssertUnwindSafe(|| {
                let _outer = lock.acquire();
                let _inner = lock.acquire();
                panic!("bootstrap step failed");
            }))
        })
        .join()
        .unwrap()
    });
    assert!(result.is_err());
    assert_unlocked(&lock);
    drop(lock.acquire());
}

/// Acquires the lock from inside every event, like a log sink guarded by the bootstrap
/// lock would.
struct AcquiringSubscriber {
    lock: &'static BootstrapLock,
    events: Arc<AtomicUsize>,
}

impl Subscriber for AcquiringSubscriber {
    fn enabled(&self, _: &Metadata<'_>) -> bool {
        true
    }

    fn new_span(&self, _: &span::Attributes<'_>) -> span::Id {
        span::Id::from_u64(1)
    }

    fn record(&self, _: &span::Id, _: &span::Record<'_>) {}

    fn record_follows_from(&self, _: &span::Id, _: &span::Id) {}

    fn event(&self, _: &Event<'_>) {
        drop(self.lock.acquire());
        self.events.fetch_add(1, SeqCst);
    }

    fn enter(&self, _: &span::Id) {}

    fn exit(&self, _: &span::Id) {}
}

fn subscriber_acquires_during_init(choice: BackendChoice) {
    let lock: &'static BootstrapLock = Box::leak(Box::new(BootstrapLock::with_backend(choice)));
    let events = Arc::new(AtomicUsize::new(0));
    let subscriber = AcquiringSubscriber {
        lock,
        events: events.clone(),
    };
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        tracing::subscriber::with_default(subscriber, || {
            let guard = lock.acquire();
            assert_eq!(lock.depth(), Some(1));
            drop(guard);
        });
        tx.send(()).unwrap();
    });
    rx.recv_timeout(TEST_TIMEOUT)
        .expect("first acquire deadlocked");
    assert!(events.load(SeqCst) >= 1);
    assert_eq!(lock.backend_choice(), Some(choice));
    assert_unlocked(lock);
}

fn guard_knows_its_lock(choice: BackendChoice) {
    let lock1 = BootstrapLock::with_backend(choice);
    let lock2 = BootstrapLock::with_backend(choice);
    let guard1: Guard<'_> = lock1.acquire();
    let guard2: Guard<'_> = lock2.acquire();
    assert_eq!(guard1.lock(), &lock1);
    assert_ne!(guard1.lock(), &lock2);
    assert_eq!(guard2.lock(), &lock2);
}

macro_rules! for_each_backend {
    ($($name:ident,)*) => {
        mod critical_region {
            $(
                #[test]
                fn $name() {
                    super::$name(crate::BackendChoice::CriticalRegion);
                }
            )*
        }

        mod signal_object {
            $(
                #[test]
                fn $name() {
                    super::$name(crate::BackendChoice::SignalObject);
                }
            )*
        }
    };
}

for_each_backend! {
    fresh,
    first_acquire_constructs_backend,
    concurrent_first_acquire,
    depth_follows_nesting,
    guards_are_interchangeable,
    nested_hold_blocks_others,
    free_lock_does_not_block,
    mutual_exclusion,
    no_lost_wakeup,
    release_before_waiter_arrives,
    held_by_current_thread,
    forget_and_force_release,
    released_on_unwind,
    guard_knows_its_lock,
    subscriber_acquires_during_init,
}

#[test]
fn global_is_a_singleton() {
    let a = BootstrapLock::global();
    let b = thread::spawn(|| BootstrapLock::global() as *const BootstrapLock as usize)
        .join()
        .unwrap();
    assert_eq!(a as *const BootstrapLock as usize, b);
}

#[test]
fn debug() {
    let lock = BootstrapLock::with_backend(BackendChoice::CriticalRegion);
    let guard = lock.acquire();
    let lock_str = format!("{lock:?}");
    assert!(lock_str.contains("CriticalRegion"));
    assert!(lock_str.contains("locked: true"));
    assert!(format!("{guard:?}").starts_with("Guard"));
}
