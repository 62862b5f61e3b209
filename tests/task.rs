//! Task lifecycle, scheduling and timer scenarios on the hosted port

mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use common::{entry, kernel, leak, run, spawn, stack, task, Trace};
use tickos::{Kernel, TaskState, Timer, CFG_PRIO_CNT};

#[test]
fn start_without_tasks_returns() {
    let k = kernel();
    run(k, |_| {});
    assert_eq!(k.ticks_now(), 0);
}

#[test]
fn join_returns_exit_value_and_frees_the_task() {
    let k = kernel();
    let child = task();

    run(k, |k| {
        spawn(k, 1, move || {
            // more urgent: runs to completion inside task_create
            k.task_create(child, 2, stack(), entry(|| 42));
            assert_eq!(child.state(k), TaskState::Terminated);
            assert_eq!(k.task_join(child), 42);
            assert_eq!(child.state(k), TaskState::Unused);

            // equally urgent: join has to wait for it
            k.task_create(child, 1, stack(), entry(|| 7));
            assert_eq!(child.state(k), TaskState::Ready);
            assert_eq!(k.task_join(child), 7);
            0
        });
    });
}

#[test]
fn delay_sleeps_exact_ticks() {
    let k = kernel();

    run(k, |k| {
        spawn(k, 2, move || {
            let start = k.ticks_now();
            k.delay(0);
            assert_eq!(k.ticks_now(), start);
            k.delay(4);
            assert_eq!(Kernel::ticks_diff(start, k.ticks_now()), 4);
            0
        });
    });
}

#[test]
fn tick_rotates_equal_priorities() {
    let k = kernel();
    let trace = Trace::new();

    let t = trace.clone();
    run(k, |k| {
        for name in ["A", "B"] {
            let t = t.clone();
            spawn(k, 1, move || {
                for _ in 0..3 {
                    t.push(name);
                    k.isr(|| k.tick());
                }
                0
            });
        }
    });

    assert_eq!(trace.events(), ["A", "B", "A", "B", "A", "B"]);
}

#[test]
fn more_urgent_task_preempts_on_creation() {
    let k = kernel();
    let trace = Trace::new();

    let t = trace.clone();
    run(k, |k| {
        spawn(k, 2, move || {
            t.push("low");
            let th = t.clone();
            spawn(k, 5, move || {
                th.push("high");
                0
            });
            t.push("low again");
            0
        });
    });

    assert_eq!(trace.events(), ["low", "high", "low again"]);
}

#[test]
fn scheduler_unlock_defers_preemption() {
    let k = kernel();
    let trace = Trace::new();

    let t = trace.clone();
    run(k, |k| {
        spawn(k, 1, move || {
            k.scheduler_lock();
            let th = t.clone();
            spawn(k, 3, move || {
                th.push("high");
                0
            });
            t.push("locked");
            k.scheduler_unlock();
            t.push("unlocked");
            k.yield_now();
            t.push("low end");
            0
        });
    });

    assert_eq!(trace.events(), ["locked", "unlocked", "high", "low end"]);
}

#[test]
fn periodic_timer_fires_until_destroyed() {
    let k = kernel();
    let timer = leak(Timer::new());
    let fired = leak(AtomicU32::new(0));

    run(k, |k| {
        timer.create(
            k,
            2,
            3,
            leak(move |_: &Kernel| {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
        );
        spawn(k, 1, move || {
            // fires at ticks 2, 5, 8 and 11
            k.delay(11);
            assert_eq!(fired.load(Ordering::SeqCst), 4);
            assert!(timer.is_armed(k));

            timer.destroy(k);
            timer.destroy(k);
            assert!(!timer.is_armed(k));
            assert_eq!(k.timers_armed(), 0);

            k.delay(10);
            assert_eq!(fired.load(Ordering::SeqCst), 4);
            0
        });
    });
}

#[test]
fn zero_timeout_timer_fires_on_next_tick() {
    let k = kernel();
    let (a, b) = (leak(Timer::new()), leak(Timer::new()));
    let fired_a = leak(AtomicU32::new(0));
    let fired_b = leak(AtomicU32::new(0));

    run(k, |k| {
        a.create(k, 0, 0, leak(move |k: &Kernel| fired_a.store(k.ticks_now(), Ordering::SeqCst)));
        b.create(k, 1, 0, leak(move |k: &Kernel| fired_b.store(k.ticks_now(), Ordering::SeqCst)));
        spawn(k, 1, move || {
            k.delay(3);
            0
        });
    });

    assert_eq!(fired_a.load(Ordering::SeqCst), 1);
    assert_eq!(fired_b.load(Ordering::SeqCst), 1);
}

#[test]
#[should_panic(expected = "invalid priority")]
fn idle_priority_is_reserved() {
    let k = kernel();
    run(k, |k| {
        spawn(k, 0, || 0);
    });
}

#[test]
#[should_panic(expected = "invalid priority")]
fn priority_beyond_range_halts() {
    let k = kernel();
    run(k, |k| {
        spawn(k, CFG_PRIO_CNT as u8, || 0);
    });
}

#[test]
#[should_panic(expected = "blocking call with scheduler locked")]
fn blocking_with_scheduler_locked_halts() {
    let k = kernel();
    run(k, |k| {
        spawn(k, 1, move || {
            k.scheduler_lock();
            k.delay(1);
            0
        });
    });
}

#[test]
#[should_panic(expected = "task joins itself")]
fn self_join_halts() {
    let k = kernel();
    let me = task();
    run(k, |k| {
        k.task_create(me, 1, stack(), entry(move || k.task_join(me)));
    });
}
