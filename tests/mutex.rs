//! Priority-inheriting mutex scenarios on the hosted port

mod common;

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use common::{kernel, leak, run, spawn, task, stack, entry, Trace};
use quickcheck::{Arbitrary, Gen};
use tickos::{Kernel, Mutex};

const WORKERS: i32 = 4;
const ITERATIONS: usize = 1000;

/// Four equal-priority tasks hammer one mutex while simulated tick
/// interrupts preempt them at random points, inside and outside the
/// critical section.
#[test]
fn mutex_excludes_equal_priority_workers() {
    let k = kernel();
    let mtx = leak(Mutex::new());
    let occupied = leak(AtomicI32::new(0));
    let owner = leak(AtomicI32::new(-1));
    let finished = leak(AtomicUsize::new(0));

    run(k, |k| {
        mtx.create(k);
        for id in 0..WORKERS {
            spawn(k, 1, move || {
                let mut gen = Gen::new(100);
                let mut preempt = |k: &Kernel| {
                    if u8::arbitrary(&mut gen) % 4 == 0 {
                        k.isr(|| k.tick());
                    }
                };

                for _ in 0..ITERATIONS {
                    preempt(k);
                    mtx.lock(k).unwrap();
                    assert_eq!(occupied.load(Ordering::SeqCst), 0);
                    assert_eq!(owner.load(Ordering::SeqCst), -1);
                    occupied.store(1, Ordering::SeqCst);
                    owner.store(id, Ordering::SeqCst);

                    preempt(k);
                    assert_eq!(occupied.load(Ordering::SeqCst), 1);
                    assert_eq!(owner.load(Ordering::SeqCst), id);
                    preempt(k);

                    occupied.store(0, Ordering::SeqCst);
                    owner.store(-1, Ordering::SeqCst);
                    mtx.unlock(k);
                }
                finished.fetch_add(1, Ordering::SeqCst);
                0
            });
        }
    });

    assert_eq!(finished.load(Ordering::SeqCst), WORKERS as usize);
}

/// L holds the mutex, H blocks on it, M is ready in between. L must run at
/// H's priority until it unlocks, and M only runs after H is done.
#[test]
fn owner_inherits_waiter_priority() {
    let k = kernel();
    let mtx = leak(Mutex::new());
    let (low, medium, high) = (task(), task(), task());
    let trace = Trace::new();

    let t = trace.clone();
    run(k, |k| {
        let th = t.clone();
        let high_body = entry(move || {
            th.push("H start");
            mtx.lock(k).unwrap();
            th.push("H locked");
            assert_eq!(low.prio_current(k), 1);
            mtx.unlock(k);
            0
        });
        let tm = t.clone();
        let medium_body = entry(move || {
            tm.push("M");
            0
        });

        let tl = t.clone();
        k.task_create(
            low,
            1,
            stack(),
            entry(move || {
                mtx.lock(k).unwrap();
                k.task_create(high, 3, stack(), high_body);
                // H is blocked on us now
                assert_eq!(low.prio_current(k), 3);
                assert_eq!(low.prio_base(k), 1);

                k.task_create(medium, 2, stack(), medium_body);
                tl.push("L unlock");
                mtx.unlock(k);

                assert_eq!(low.prio_current(k), 1);
                tl.push("L end");
                0
            }),
        );
    });

    assert_eq!(trace.events(), ["H start", "L unlock", "H locked", "M", "L end"]);
}

/// Chain L <- LM <- H across two mutexes: H's priority reaches L through
/// LM, and releasing the inner mutex only partially deboosts LM.
#[test]
fn inheritance_follows_chain_of_owners() {
    let k = kernel();
    let (inner, outer) = (leak(Mutex::new()), leak(Mutex::new()));
    let (low, low_mid, high) = (task(), task(), task());
    let progress = leak(AtomicUsize::new(0));

    let step = move |expected: usize| {
        assert_eq!(progress.fetch_add(1, Ordering::SeqCst), expected);
    };

    run(k, |k| {
        let high_body = entry(move || {
            step(4);
            outer.lock(k).unwrap();
            step(10);
            assert_eq!(high.prio_current(k), 4);
            outer.unlock(k);
            step(11);
            0
        });

        let low_mid_body = entry(move || {
            step(1);
            outer.lock(k).unwrap();
            step(2);
            inner.lock(k).unwrap();
            // L handed `inner` over
            step(7);
            assert_eq!(low_mid.prio_current(k), 4);
            inner.unlock(k);
            // H still waits on `outer`
            assert_eq!(low_mid.prio_current(k), 4);
            step(8);
            assert!(outer.is_owned_by(k, low_mid));
            step(9);
            outer.unlock(k);
            step(12);
            assert_eq!(low_mid.prio_current(k), 2);
            0
        });

        k.task_create(
            low,
            1,
            stack(),
            entry(move || {
                step(0);
                inner.lock(k).unwrap();
                k.task_create(low_mid, 2, stack(), low_mid_body);
                step(3);
                assert_eq!(low.prio_current(k), 2);

                k.task_create(high, 4, stack(), high_body);
                step(5);
                assert_eq!(low_mid.prio_current(k), 4);
                assert_eq!(low.prio_current(k), 4);

                step(6);
                inner.unlock(k);
                step(13);
                assert_eq!(low.prio_current(k), 1);
                assert_eq!(k.task_join(low_mid), 0);
                assert_eq!(k.task_join(high), 0);
                0
            }),
        );
    });

    assert_eq!(progress.load(Ordering::SeqCst), 14);
}

#[test]
fn uncontended_lock_allowed_under_scheduler_lock() {
    let k = kernel();
    let mtx = leak(Mutex::new());

    run(k, |k| {
        let me = task();
        k.task_create(
            me,
            2,
            stack(),
            entry(move || {
                k.scheduler_lock();
                mtx.lock(k).unwrap();
                assert!(mtx.is_owned_by(k, me));
                mtx.unlock(k);
                k.scheduler_unlock();
                0
            }),
        );
    });
}

#[test]
#[should_panic(expected = "mutex relock by owner")]
fn relock_by_owner_halts() {
    let k = kernel();
    let mtx = leak(Mutex::new());

    run(k, |k| {
        spawn(k, 2, move || {
            mtx.lock(k).unwrap();
            mtx.lock(k).unwrap();
            0
        });
    });
}

#[test]
#[should_panic(expected = "mutex unlock by non-owner")]
fn unlock_by_non_owner_halts() {
    let k = kernel();
    let mtx = leak(Mutex::new());

    run(k, |k| {
        spawn(k, 3, move || {
            mtx.lock(k).unwrap();
            k.delay(2);
            mtx.unlock(k);
            0
        });
        spawn(k, 2, move || {
            mtx.unlock(k);
            0
        });
    });
}

#[test]
#[should_panic(expected = "mutex destroyed while in use")]
fn destroy_of_owned_mutex_halts() {
    let k = kernel();
    let mtx = leak(Mutex::new());

    run(k, |k| {
        spawn(k, 2, move || {
            mtx.lock(k).unwrap();
            mtx.destroy(k);
            0
        });
    });
}
